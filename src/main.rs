use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use maxwin::core::config::Config;

#[derive(Parser)]
#[command(name = "maxwin")]
#[command(about = "Terminal chat client and relay server for the Max-Win-Win sales advisor")]
#[command(long_about = "Maxwin talks to the Max-Win-Win B2B sales advisor. Run it without a \
subcommand for the full-screen chat interface, or `maxwin serve` for the relay \
server that assembles the advisor prompt and bridges the model provider.\n\n\
Environment Variables:\n\
  MAXWIN_API_KEY    Provider API key (required by the server)\n\
  RUST_LOG          Diagnostic log filter (e.g. maxwin=debug)")]
struct Cli {
    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Relay endpoint the chat client talks to
    #[arg(long)]
    endpoint: Option<String>,

    /// Append the session transcript to this file
    #[arg(long)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay server
    Serve {
        /// Listen address (overrides the configured one)
        #[arg(long)]
        listen: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "maxwin=warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Some(Command::Serve { listen }) => maxwin::server::run(config, listen).await,
        None => maxwin::ui::chat_loop::run(config, cli.endpoint, cli.log_file).await,
    }
}
