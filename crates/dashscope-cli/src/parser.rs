//! Main CLI parser and top-level argument handling.

use clap::Parser;

use crate::commands::Commands;

/// Realtime speech recognition and synthesis over DashScope.
#[derive(Parser, Debug)]
#[command(name = "dashscope")]
#[command(about = "Stream audio to DashScope ASR and text to DashScope TTS")]
#[command(version)]
pub struct Cli {
    /// Override the websocket endpoint for this invocation
    #[arg(long, global = true, env = "DASHSCOPE_WS_URL")]
    pub url: Option<String>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_args() {
        let cli = Cli::parse_from([
            "dashscope",
            "--verbose",
            "--url",
            "ws://localhost:9000",
            "config",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.url.as_deref(), Some("ws://localhost:9000"));
        assert!(matches!(cli.command, Some(Commands::Config)));
    }

    #[test]
    fn test_global_args_after_subcommand() {
        let cli = Cli::parse_from(["dashscope", "config", "-v"]);
        assert!(cli.verbose);
    }
}
