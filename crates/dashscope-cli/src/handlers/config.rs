//! `config` command handler.

use anyhow::Result;

use dashscope_core::{API_KEY_ENV, AsrConfig, TtsConfig};

use crate::config::connection_config;

/// Print the effective configuration. A missing API key is reported, not
/// treated as an error.
pub fn execute(url: Option<&str>) -> Result<()> {
    println!("Connection:");
    match connection_config(url) {
        Ok(connection) => {
            println!("  url:           {}", connection.url);
            println!("  api key:       {}", connection.redacted_key());
            match connection.start_timeout {
                Some(timeout) => println!("  start timeout: {timeout:?}"),
                None => println!("  start timeout: none"),
            }
        }
        Err(err) => {
            println!("  {err}");
            println!("  (set {API_KEY_ENV} or add it to .env)");
        }
    }

    println!();
    println!("Recognition defaults:");
    println!("{}", serde_json::to_string_pretty(&AsrConfig::default())?);
    println!();
    println!("Synthesis defaults:");
    println!("{}", serde_json::to_string_pretty(&TtsConfig::default())?);
    Ok(())
}
