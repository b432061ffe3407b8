//! scorebridge - sheet music ⇄ audio conversion service
//!
//! Entry point: parse CLI arguments, load configuration, bootstrap the
//! data directories, probe the external tools, and serve the HTTP API.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scorebridge::{build_router, AppState, Config};

/// Command-line arguments for scorebridge
#[derive(Parser, Debug)]
#[command(name = "scorebridge")]
#[command(about = "Sheet music <-> audio conversion service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "SCOREBRIDGE_PORT")]
    port: Option<u16>,

    /// Root data directory for uploads and outputs
    #[arg(short, long, env = "SCOREBRIDGE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Path to a TOML config file
    #[arg(short, long, env = "SCOREBRIDGE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scorebridge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    info!("Starting scorebridge on port {}", config.port);
    info!("Data directory: {}", config.data_dir.display());

    let state = AppState::new(config);
    state
        .staging
        .ensure_dirs()
        .context("Failed to create data directories")?;

    probe_external_tools().await;

    let port = state.config.port;
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Warn at startup for each missing conversion tool. A missing tool is
/// not fatal here; jobs that need it fail with a typed error instead.
async fn probe_external_tools() {
    let tools = [
        ("pdftoppm", "poppler-utils; needed for PDF uploads"),
        ("oemer", "pip install oemer; needed for score recognition"),
        ("python3", "with music21; needed for notation conversion"),
        ("fluidsynth", "fluidsynth package; needed for audio synthesis"),
        ("ffmpeg", "ffmpeg package; needed for MP3 encoding"),
        ("basic-pitch", "pip install basic-pitch; needed for transcription"),
        ("midi2ly", "ships with LilyPond; needed for score rendering"),
        ("lilypond", "lilypond package; needed for score rendering"),
    ];

    for (tool, hint) in tools {
        match tokio::process::Command::new(tool)
            .arg("--version")
            .output()
            .await
        {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(tool, hint, "external tool not found; jobs needing it will fail");
            }
            Err(err) => {
                warn!(tool, error = %err, "failed to probe external tool");
            }
            Ok(_) => {
                debug!(tool, "external tool available");
            }
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
