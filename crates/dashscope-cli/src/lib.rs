//! `dashscope` command-line front end.
//!
//! Thin adapter over `dashscope-voice`: argument parsing, configuration
//! assembly from flags and the environment, and terminal output.

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Only used by the binary entry point
use dotenvy as _;
use tracing_subscriber as _;

pub mod commands;
pub mod config;
pub mod error;
pub mod handlers;
pub mod parser;

pub use commands::{Commands, SpeakArgs, TranscribeArgs};
pub use error::{CliError, exit_code};
pub use parser::Cli;
