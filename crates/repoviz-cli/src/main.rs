mod cmd_analyze;
mod cmd_serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use repoviz_core::AnalyzerConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "repoviz",
    version,
    about = "Analyze and visualize GitHub repositories with a coding agent"
)]
struct Cli {
    /// Config file (default: ./repoviz.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API server
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value = "5002")]
        port: u16,
    },
    /// Analyze one repository and print the result
    Analyze {
        /// GitHub URL or owner/repo shorthand
        repo: String,
        /// Analysis type: overview, structure, dependencies, diagram
        #[arg(long = "type", default_value = "overview")]
        kind: String,
        /// Let the agent read the repository from the web instead of cloning it
        #[arg(long)]
        remote: bool,
        /// Output the full result (response + event log) as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;
    let config = AnalyzerConfig::discover(cli.config.as_deref(), &cwd)?;

    match cli.cmd {
        Command::Serve { bind, port } => cmd_serve::execute(config, &bind, port),
        Command::Analyze {
            repo,
            kind,
            remote,
            json,
        } => cmd_analyze::execute(config, &repo, &kind, remote, json),
    }
}

/// Log to stderr; `RUST_LOG` overrides the default `info` level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Cancel `cancel` on Ctrl+C.
fn ctrlc_cancel(cancel: CancellationToken) {
    let _ = ctrlc::set_handler(move || {
        cancel.cancel();
    });
}
