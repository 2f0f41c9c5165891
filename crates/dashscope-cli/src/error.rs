//! CLI-specific error types and exit code mapping.

use dashscope_core::RealtimeError;
use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Realtime task or transport failure.
    #[error("{0}")]
    Realtime(String),

    /// Argument validation error.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// IO error (file not found, permission denied, etc.).
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The service could not be reached.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl CliError {
    /// Map error to appropriate exit code.
    ///
    /// Exit codes follow sysexits.h where one fits.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Realtime(_) => 1,
            Self::Arguments(_) => 2,   // EX_USAGE
            Self::Unavailable(_) => 69, // EX_UNAVAILABLE
            Self::Io(_) => 74,         // EX_IOERR
            Self::Config(_) => 78,     // EX_CONFIG
        }
    }
}

impl From<RealtimeError> for CliError {
    fn from(err: RealtimeError) -> Self {
        match err {
            RealtimeError::Config(msg) => Self::Config(msg),
            RealtimeError::Audio(msg) => Self::Io(msg),
            RealtimeError::Connect(msg) => Self::Unavailable(msg),
            RealtimeError::InvalidState { .. } => Self::Arguments(err.to_string()),
            other => Self::Realtime(other.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Exit code for an error surfaced at the composition root.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(cli) = err.downcast_ref::<CliError>() {
        return cli.exit_code();
    }
    if let Some(realtime) = err.downcast_ref::<RealtimeError>() {
        return CliError::from(realtime.clone()).exit_code();
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_errors_map_to_categories() {
        assert_eq!(
            CliError::from(RealtimeError::Config("bad".into())).exit_code(),
            78
        );
        assert_eq!(
            CliError::from(RealtimeError::Audio("missing.wav".into())).exit_code(),
            74
        );
        assert_eq!(
            CliError::from(RealtimeError::Connect("refused".into())).exit_code(),
            69
        );
        assert_eq!(CliError::from(RealtimeError::ChannelClosed).exit_code(), 1);
    }

    #[test]
    fn exit_code_downcasts_through_anyhow() {
        let err = anyhow::Error::new(RealtimeError::Config("no key".into()));
        assert_eq!(exit_code(&err), 78);

        let err = anyhow::Error::new(CliError::Arguments("empty text".into()));
        assert_eq!(exit_code(&err), 2);

        assert_eq!(exit_code(&anyhow::anyhow!("other")), 1);
    }
}
