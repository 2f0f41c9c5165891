//! Interrupt-and-restart tests for `SynthesisPipeline`.
//!
//! On return from `interrupt()`:
//! - no audio of the abandoned task reaches the consumer any more,
//! - no background task of the abandoned task is alive,
//! - a replacement task with a fresh id accepts text immediately.

mod common;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_test::assert_ok;

use common::{RecordingSink, ScriptedConnector, drain, next_event};
use dashscope_core::protocol::{Action, InboundMessage};
use dashscope_core::{ChannelSink, EventKind, RealtimeEvent, TtsConfig};
use dashscope_voice::SynthesisPipeline;

const DEADLINE: Option<Duration> = Some(Duration::from_secs(5));

const QUEUED: [&[u8]; 5] = [b"q-1", b"q-2", b"q-3", b"q-4", b"q-5"];

#[tokio::test]
async fn interrupt_drops_queued_frames_and_restarts() {
    let (connector, mut peers) = ScriptedConnector::new();
    let consumer = RecordingSink::gated();
    let (sink, mut events) = ChannelSink::new();
    let pipeline = SynthesisPipeline::new(
        connector.clone(),
        TtsConfig::default(),
        consumer.clone(),
        Arc::new(sink),
    );

    let old_id = pipeline.start().await.unwrap();
    let mut old_peer = peers.next().await;
    old_peer.expect_run_task().await;
    pipeline.submit_text("a long paragraph").await.unwrap();
    old_peer.next_control().await;

    // The consumer is stuck on the first frame while five more queue up.
    old_peer.send_audio(b"in-flight");
    for frame in QUEUED {
        old_peer.send_audio(frame);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pipeline.live_deliveries(), 1);

    // Interrupt waits for the in-flight callback to return.
    let (new_id, ()) = tokio::join!(pipeline.interrupt(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        consumer.release(100);
    });
    let new_id = new_id.unwrap();

    assert_ne!(new_id, old_id);
    assert_eq!(pipeline.live_deliveries(), 0);
    assert!(old_peer.client_closed());
    let delivered = consumer.chunks();
    for frame in QUEUED {
        assert!(!delivered.contains(&Bytes::from_static(frame)));
    }
    assert!(delivered.len() <= 1);

    // Late traffic for the abandoned task goes nowhere.
    old_peer.send_audio(b"late");
    old_peer.finished();

    // The replacement task is ready immediately.
    let mut new_peer = peers.next().await;
    let run = new_peer.expect_run_task().await;
    assert_eq!(run.header.task_id, new_id.as_str());
    assert_eq!(connector.opened(), 2);

    pipeline.submit_text("something else").await.unwrap();
    let next = new_peer.next_control().await;
    assert_eq!(next.action(), Action::ContinueTask);
    assert_eq!(next.header.task_id, new_id.as_str());

    let (finish, ()) = tokio::join!(pipeline.request_finish(DEADLINE), async {
        new_peer.send_audio(b"fresh");
        assert_eq!(new_peer.next_control().await.action(), Action::FinishTask);
        new_peer.finished();
    });
    assert_ok!(finish);
    assert_eq!(consumer.chunks().last(), Some(&Bytes::from_static(b"fresh")));

    // The abandoned task never got a terminal event.
    let seen = drain(&mut events);
    assert!(
        !seen
            .iter()
            .any(|e| e.task_id() == &old_id && (e.is_terminal() || e.kind() == EventKind::AudioChunk))
    );
    assert_eq!(
        seen.iter()
            .filter(|e| e.task_id() == &new_id && e.is_terminal())
            .count(),
        1
    );
}

#[tokio::test]
async fn late_messages_for_the_old_id_are_rejected_by_the_new_session() {
    let (connector, mut peers) = ScriptedConnector::new();
    let (sink, mut events) = ChannelSink::new();
    let pipeline = SynthesisPipeline::new(
        connector,
        TtsConfig::default(),
        RecordingSink::new(),
        Arc::new(sink),
    );

    let old_id = pipeline.start().await.unwrap();
    // Held open: a hang-up would fail the task instead of interrupting it.
    let mut old_peer = peers.next().await;
    old_peer.expect_run_task().await;
    assert_eq!(next_event(&mut events).await.kind(), EventKind::Started);

    let new_id = pipeline.interrupt().await.unwrap();
    let mut new_peer = peers.next().await;
    new_peer.expect_run_task().await;
    assert_eq!(
        next_event(&mut events).await,
        RealtimeEvent::Started {
            task_id: new_id.clone()
        }
    );

    // A message still tagged with the old id shows up on the new channel.
    new_peer.send(&InboundMessage::finished(old_id.as_str()));
    new_peer.send(&InboundMessage::failed(old_id.as_str(), "Stale", "old task"));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(drain(&mut events).is_empty());
    assert!(pipeline.is_active().await);
    assert_eq!(pipeline.task_id().await, Some(new_id));
}

#[tokio::test]
async fn detailed_interrupt_names_the_abandoned_task() {
    let (connector, mut peers) = ScriptedConnector::new();
    let pipeline = SynthesisPipeline::new(
        connector,
        TtsConfig::default(),
        RecordingSink::new(),
        Arc::new(dashscope_core::NoopSink),
    );

    let none = pipeline.interrupt_detailed().await.unwrap();
    assert_eq!(none.abandoned, None);
    let _first_peer = peers.next().await;

    let next = pipeline.interrupt_detailed().await.unwrap();
    assert_eq!(next.abandoned, Some(none.replacement.clone()));
    assert_ne!(next.replacement, none.replacement);
    assert_eq!(pipeline.task_id().await, Some(next.replacement));
}

#[tokio::test]
async fn interrupt_without_a_session_starts_one() {
    let (connector, mut peers) = ScriptedConnector::new();
    let pipeline = SynthesisPipeline::new(
        connector,
        TtsConfig::default(),
        RecordingSink::new(),
        Arc::new(dashscope_core::NoopSink),
    );

    let task_id = pipeline.interrupt().await.unwrap();
    let mut peer = peers.next().await;
    let run = peer.expect_run_task().await;
    assert_eq!(run.header.task_id, task_id.as_str());
    assert!(pipeline.is_active().await);
    assert_eq!(pipeline.live_deliveries(), 0);
}

#[tokio::test]
async fn repeated_interrupts_leave_one_live_delivery_at_most() {
    let (connector, mut peers) = ScriptedConnector::new();
    let pipeline = SynthesisPipeline::new(
        connector,
        TtsConfig::default(),
        RecordingSink::new(),
        Arc::new(dashscope_core::NoopSink),
    );

    pipeline.start().await.unwrap();
    let mut ids = vec![pipeline.task_id().await.unwrap()];
    let mut held = vec![peers.next().await];
    for _ in 0..3 {
        pipeline.submit_text("x").await.unwrap();
        assert_eq!(pipeline.live_deliveries(), 1);
        ids.push(pipeline.interrupt().await.unwrap());
        assert_eq!(pipeline.live_deliveries(), 0);
        held.push(peers.next().await);
    }

    ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    ids.dedup();
    assert_eq!(ids.len(), 4);
}
