//! PreBot server
//!
//! Entry point for the PreBot chat site.

use std::sync::Arc;

use anyhow::Context;
use mimalloc::MiMalloc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use prebot::config::{AppConfig, LogFormat};

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenvy::dotenv();

    let config = Arc::new(AppConfig::load().context("failed to load configuration")?);

    init_tracing(config.log.format)?;

    prebot::server::start_server(config).await
}

/// Initialize tracing (M-LOG-STRUCTURED).
fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("invalid log filter")?;

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init()?,
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).try_init()?,
    }
    Ok(())
}
