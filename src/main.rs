use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use quillpost::app::{build_router, AppState};
use quillpost::config::AppConfig;
use quillpost::db::maintenance::recompute_derived_fields;

/// Quillpost blog server
#[derive(Parser, Debug)]
#[command(name = "quillpost")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./quillpost.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Recompute plain text and reading time for every stored post
    Recompute,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quillpost=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Recompute => recompute(config).await,
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("Starting Quillpost server...");

    let addr = config.site_addr.clone();
    if config.admin_password().is_none() {
        tracing::warn!("No admin password configured, admin login is disabled");
    }

    let state = AppState::from_config(config).await?;
    let app = build_router(state);

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

/// Rewrite every post's derived text fields from its stored document.
async fn recompute(config: AppConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    recompute_derived_fields(state.posts.as_ref()).await?;
    Ok(())
}
