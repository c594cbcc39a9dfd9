//! Collaborative code-sharing web server.
//!
//! Run with: cargo run -p codeshare-server
//!
//! Then open http://localhost:3000 in your browser.
//!
//! Environment:
//! - `CODESHARE_ADDR` - listen address (default `127.0.0.1:3000`)
//! - `CODESHARE_CONFIG` - path to a JSON `SyncConfig` file
//! - `CODESHARE_DATABASE_URL` - SQLite URL (requires the `sqlite` feature)
//! - `RUST_LOG` - tracing filter (default `info`)

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use codeshare_core::{SessionStore, SyncConfig};
use codeshare_session::storage::MemoryStore;
use codeshare_transport::websocket::{AppState, create_router};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_ADDR: &str = "127.0.0.1:3000";

fn load_config() -> anyhow::Result<SyncConfig> {
    match std::env::var("CODESHARE_CONFIG") {
        Ok(path) => {
            let config = SyncConfig::from_json_file(&path)
                .with_context(|| format!("loading config from {path}"))?;
            tracing::info!("Loaded config from {path}");
            Ok(config)
        }
        Err(_) => Ok(SyncConfig::default()),
    }
}

fn memory_store() -> Arc<dyn SessionStore> {
    tracing::info!("Using in-memory session store");
    Arc::new(MemoryStore::new())
}

#[cfg(feature = "sqlite")]
async fn open_store() -> anyhow::Result<Arc<dyn SessionStore>> {
    let Ok(url) = std::env::var("CODESHARE_DATABASE_URL") else {
        return Ok(memory_store());
    };
    let store = codeshare_session::storage::SqliteStore::new(&url)
        .await
        .with_context(|| format!("opening {url}"))?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
#[allow(clippy::unused_async)]
async fn open_store() -> anyhow::Result<Arc<dyn SessionStore>> {
    if std::env::var("CODESHARE_DATABASE_URL").is_ok() {
        tracing::warn!("CODESHARE_DATABASE_URL ignored: built without the sqlite feature");
    }
    Ok(memory_store())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = load_config()?;
    let store = open_store().await?;
    let app = create_router(AppState::from_store(store, config));

    let addr: SocketAddr = std::env::var("CODESHARE_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()
        .context("parsing CODESHARE_ADDR")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("Server listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
