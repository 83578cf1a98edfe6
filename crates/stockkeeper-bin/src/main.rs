#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

use clap::{Parser, Subcommand};
use stockkeeper::{CONFIG, tokio, tracing};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

mod config;
mod serve;

pub(crate) use config::CONFIG_BIN;
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate the database
    Migrate {},
    /// Run the server - The database must be migrated before running the server
    Serve {},
    /// Print the version of the server
    Version {},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    match cli.command {
        Some(Commands::Migrate {}) => {
            print_info();
            migrate().await?;
        }
        Some(Commands::Serve {}) => {
            print_info();
            serve_and_maybe_migrate().await?;
        }
        Some(Commands::Version {}) => {
            println!("{VERSION}");
        }
        None => {
            if CONFIG_BIN.debug.auto_serve {
                print_info();
                serve_and_maybe_migrate().await?;
            } else {
                eprintln!("No subcommand provided. Use --help for more information.");
                anyhow::bail!("No subcommand provided");
            }
        }
    }

    Ok(())
}

async fn serve_and_maybe_migrate() -> anyhow::Result<()> {
    if CONFIG_BIN.debug.migrate_before_serve {
        migrate().await?;
    }
    serve().await
}

async fn migrate() -> anyhow::Result<()> {
    println!("Migrating database...");
    let pool = stockkeeper::implementations::postgres::get_pool(&CONFIG.pg).await?;
    stockkeeper::implementations::postgres::migrate(&pool).await?;
    println!("Database migration complete.");
    Ok(())
}

async fn serve() -> anyhow::Result<()> {
    tracing::info!(
        "Starting server on {}:{}...",
        CONFIG.bind_ip,
        CONFIG.listen_port
    );
    let bind_addr = std::net::SocketAddr::from((CONFIG.bind_ip, CONFIG.listen_port));
    serve::serve(bind_addr).await
}

fn print_info() {
    println!("Stockkeeper Version: {VERSION}");
    tracing::info!("Stockkeeper Version: {VERSION}");
}
