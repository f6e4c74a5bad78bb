//! Dashboard server entrypoint.
//! Boots the Axum HTTP server with the live registries and the snapshot-backed session.

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use wapyrus::{telemetry, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cfg = AppConfig::load_default().context("loading config")?;
    let bind = cfg.bind_addr.clone();
    let app = wapyrus::app(cfg)?;

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    tracing::info!(addr = %bind, "dashboard listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
