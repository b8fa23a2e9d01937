use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nx_gateway::bootstrap::run_server;
use nx_gateway::config::{load_gateway_config, load_project_file};

#[derive(Parser)]
#[command(name = "nexus", about = "Nexus Core — multi-tenant agent runtime")]
struct Cli {
    /// Path to the gateway config file (JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the gateway (default).
    Serve,
    /// Validate config and project files, then exit.
    ConfigValidate,
    /// Print the effective gateway config.
    ConfigShow,
    /// Print the version.
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let config = load_gateway_config(cli.config.as_deref())?;
            run_server(config).await
        }
        Some(Command::ConfigValidate) => {
            let config = load_gateway_config(cli.config.as_deref())?;
            let mut failed = false;
            for path in &config.project_files {
                match load_project_file(path) {
                    Ok(project) => {
                        println!("ok: {} ({})", path.display(), project.id);
                    }
                    Err(e) => {
                        eprintln!("error: {}: {e}", path.display());
                        failed = true;
                    }
                }
            }
            if failed {
                std::process::exit(1);
            }
            println!("config is valid");
            Ok(())
        }
        Some(Command::ConfigShow) => {
            let config = load_gateway_config(cli.config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Command::Version) => {
            println!("nexus {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Structured JSON tracing. `LOG_LEVEL` (or `RUST_LOG`) overrides the
/// default filter.
fn init_tracing() {
    let filter = std::env::var("LOG_LEVEL")
        .ok()
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info,nx_gateway=debug"));

    tracing_subscriber::fmt().with_env_filter(filter).json().init();
}
