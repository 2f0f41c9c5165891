//! Wire codec for the duplex task protocol.
//!
//! Text frames carry JSON control envelopes (`header` + `payload`); binary
//! frames carry raw audio and only appear in the synthesis direction.

mod inbound;
mod outbound;

pub use inbound::{
    InboundEventKind, InboundHeader, InboundMessage, InboundPayload, Output, Sentence,
    UNKNOWN_ERROR,
};
pub use outbound::{
    Action, Input, OutboundHeader, OutboundMessage, OutboundPayload, STREAMING_DUPLEX,
    TASK_GROUP_AUDIO,
};

use bytes::Bytes;

use crate::error::Result;
use crate::ports::Frame;

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Control(InboundMessage),
    Audio(Bytes),
}

/// Decode one inbound frame.
///
/// Malformed JSON is a [`Codec`](crate::RealtimeError::Codec) error; the
/// receive loop logs it and keeps going.
pub fn decode(frame: Frame) -> Result<Inbound> {
    match frame {
        Frame::Text(text) => Ok(Inbound::Control(serde_json::from_str(&text)?)),
        Frame::Binary(audio) => Ok(Inbound::Audio(audio)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RealtimeError;

    #[test]
    fn binary_frames_decode_as_audio() {
        let frame = Frame::Binary(Bytes::from_static(&[1, 2, 3]));
        assert_eq!(
            decode(frame).unwrap(),
            Inbound::Audio(Bytes::from_static(&[1, 2, 3]))
        );
    }

    #[test]
    fn text_frames_decode_as_control() {
        let text = InboundMessage::started("abc").encode().unwrap();
        let Inbound::Control(msg) = decode(Frame::Text(text)).unwrap() else {
            panic!("expected control message");
        };
        assert_eq!(msg.event(), InboundEventKind::TaskStarted);
    }

    #[test]
    fn malformed_text_is_a_codec_error() {
        let err = decode(Frame::Text("not json".into())).unwrap_err();
        assert!(matches!(err, RealtimeError::Codec(_)));
    }
}
