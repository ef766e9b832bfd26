//! Schema Governance - migration gating for regulated records
//!
//! Detects drift between the declared data model and the applied revision
//! chain, classifies and gates pending revisions per deployment environment,
//! renders compliance reports, and keeps an append-only audit trail.
//!
//! - CLI (`check-chain`, `drift`, `run`, `report`) for release pipelines
//! - HTTP (`serve`) for dashboard queries and audit writes

mod audit;
mod cli;
mod config;
mod drift;
mod error;
mod history;
mod models;
mod pipeline;
mod report;
mod routes;
mod state;

use crate::cli::{Cli, Command};
use crate::config::Settings;
use crate::routes::create_router;
use crate::state::AppState;
use clap::Parser;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();

    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    cli.apply_to(&mut settings);
    info!("📋 Configuration loaded successfully");

    match &cli.command {
        Command::Serve => {
            serve(settings).await?;
            Ok(ExitCode::SUCCESS)
        }
        command => {
            let code = cli::execute(command, &settings).map_err(|e| {
                error!("❌ {:#}", e);
                e
            })?;
            Ok(code)
        }
    }
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    info!("🚀 Starting Schema Governance server...");

    let state = Arc::new(AppState::bootstrap(&settings).await?);
    info!(
        "✅ Loaded {} revision(s) from {}",
        state.history.read().await.len(),
        settings.paths.revisions_dir.display()
    );

    let app = create_router(state, &settings);
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   ─── Chain & Drift ───");
    info!("   GET  /api/revisions              - Ordered revision chain");
    info!("   POST /api/revisions/reload       - Re-read the revision store");
    info!("   GET  /api/drift                  - Declared model vs applied chain");
    info!("");
    info!("   ─── Governance ───");
    info!("   POST /api/governance/runs        - Classify and gate pending revisions");
    info!("   GET  /api/governance/runs/latest - Latest run document");
    info!("   GET  /api/governance/dashboard   - Markdown dashboard");
    info!("   GET  /api/governance/score       - Stability score");
    info!("   GET  /api/governance/summary     - Plain-text compliance summary");
    info!("");
    info!("   ─── Audit Trail (append-only) ───");
    info!("   POST /api/audit                  - Append a record");
    info!("   GET  /api/audit                  - List records");
    info!("   GET  /api/audit/{{id}}             - Fetch a record");
    info!("   PUT  /api/audit/{{id}}             - Refused (409)");
    info!("   DELETE /api/audit/{{id}}           - Refused (409)");
    info!("");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,schema_governance=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
