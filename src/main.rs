use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use teacart::booking::cleanup::cleanup_old_bookings;
use teacart::config::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Tea delivery booking server.
#[derive(Parser, Debug)]
#[command(name = "teacart", version, about)]
struct Cli {
    /// Config file (default: teacart.toml in the platform config dir)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Listen host (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Listen port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the stored form of a password, for seeding a credential by hand
    HashPassword {
        plaintext: String,
    },
    /// Delete bookings from previous days once, then exit
    Cleanup,
}

fn init_tracing() {
    // RUST_LOG controls the level (e.g. RUST_LOG=teacart=debug,tower_http=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    }) {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            config.validate()?;
            teacart::gateway::run_gateway(config).await
        }
        Command::HashPassword { plaintext } => {
            println!("{}", teacart::auth::password::hash_password(&plaintext));
            Ok(())
        }
        Command::Cleanup => {
            let store = teacart::store::create_store(&config.store)?;
            let schedule = config.cleanup_schedule()?;
            let removed =
                cleanup_old_bookings(store.as_ref(), schedule.timezone(), chrono::Utc::now())
                    .context("Booking cleanup failed")?;
            store.close().context("Failed to close store")?;
            println!("Removed {removed} old booking(s)");
            Ok(())
        }
    }
}
