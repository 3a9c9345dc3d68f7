use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use chris_matcher::{
    client::ChrisClient,
    config::Config,
    server::{build_router, AppState},
};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the server and configure it using a config file.
    Config {
        /// Path to the config file.
        #[arg(short)]
        file: String,
        /// Log into CUBE on startup instead of waiting for /api/login.
        #[arg(long)]
        login: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { file, login } => {
            let config = Config::from_file(file).await?;

            let state = if login {
                let client =
                    ChrisClient::login(&config.cube.address, config.cube.credentials()?).await?;
                AppState::with_client(client)
            } else {
                AppState::default()
            };

            let listener = tokio::net::TcpListener::bind(config.server.addr).await?;

            info!(addr = ?config.server.addr, "starting server");

            axum::serve(listener, build_router(state))
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                    info!("shutting down");
                })
                .await?;
        }
    }

    Ok(())
}
