//! CLI entry point - the composition root.

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use dashscope_cli::config::connection_config;
use dashscope_cli::{Cli, Commands, exit_code, handlers};

#[tokio::main]
async fn main() {
    // Load environment variables before clap reads `env` defaults
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli).await {
        eprintln!("Error: {err:#}");
        std::process::exit(exit_code(&err));
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Transcribe(args) => {
            let connection = connection_config(cli.url.as_deref())?;
            handlers::transcribe::execute(connection, args).await?;
        }
        Commands::Speak(args) => {
            let connection = connection_config(cli.url.as_deref())?;
            handlers::speak::execute(connection, args).await?;
        }
        Commands::Config => {
            handlers::config::execute(cli.url.as_deref())?;
        }
    }

    Ok(())
}
