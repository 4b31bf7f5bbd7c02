#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use support_chat::{config::Config, run_server, telemetry};

/// Conversational support backend
#[cfg(feature = "cli")]
#[derive(Debug, Parser)]
#[command(name = "support-chat", version, about)]
struct Args {
    /// Listen host, overrides API_HOST
    #[arg(long)]
    host: Option<String>,

    /// Listen port, overrides API_PORT
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database file, overrides DATABASE_PATH
    #[arg(long)]
    database: Option<std::path::PathBuf>,
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    // RUST_LOG may come from .env
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let mut cfg = Config::from_env()?;
    if let Some(host) = args.host {
        cfg.api_host = host;
    }
    if let Some(port) = args.port {
        cfg.api_port = port;
    }
    if let Some(database) = args.database {
        cfg.database_path = database;
    }

    run_server(cfg).await
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}
