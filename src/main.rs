//! OmniView: Gemini model availability daemon.
//!
//! Keeps a list of projects (named API credentials), probes every
//! project × model cell on demand, and aggregates the results into
//! session statistics. Clients drive it over a JSON-RPC Unix socket.
//!
//! - Projects persisted to SQLite, read once at startup
//! - Probes fanned out concurrently, optionally bounded and timed out
//! - Session stats live in memory and reset on restart

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

mod catalog;
mod checks;
mod config;
mod gateway;
mod projects;
mod server;

use checks::CheckOrchestrator;
use config::Config;
use gateway::gemini::GeminiGateway;
use gateway::ProbeGateway;
use projects::kv::KvStore;
use projects::ProjectStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "omniview=info".into()),
        )
        .with_target(false)
        .init();

    info!("OmniView v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().context("Failed to load configuration")?;

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create {}", config.data_dir.display()))?;

    // ── Project Store ───────────────────────────────────────────────
    let kv = KvStore::open(&config.db_path).context("Failed to open project database")?;
    let projects = Arc::new(ProjectStore::load(kv).context("Failed to load projects")?);

    if projects.is_empty() {
        info!("No projects yet, add one via: ov.projects.add");
        info!("   Example: {{\"jsonrpc\":\"2.0\",\"method\":\"ov.projects.add\",\"params\":{{\"name\":\"prod\",\"credential\":\"AIza...\"}},\"id\":1}}");
    }

    // ── Gateway + Orchestrator ──────────────────────────────────────
    let gateway: Arc<dyn ProbeGateway> = Arc::new(GeminiGateway::with_base_url(&config.gemini_base_url));
    let settings = config.check_settings();
    info!(
        provider = gateway.provider_id(),
        concurrency = ?settings.concurrency,
        probe_timeout = ?settings.probe_timeout,
        models = catalog::CORE_MODELS.len(),
        "Check orchestrator ready"
    );
    let orchestrator = CheckOrchestrator::new(Arc::clone(&projects), gateway, settings);

    // ── JSON-RPC Server ─────────────────────────────────────────────
    let srv = server::Server::new(
        config.socket_path.clone(),
        projects,
        orchestrator,
        config.pulse_interval(),
    );
    srv.run().await?;

    Ok(())
}
