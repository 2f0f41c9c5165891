//! Command handlers.
//!
//! Each handler builds its pipeline from the assembled configuration,
//! drives it to completion and formats the result for the terminal.

pub mod config;
pub mod speak;
pub mod transcribe;
