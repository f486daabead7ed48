use std::net::SocketAddr;

use spanlight_core::error::{Result, SpanlightError};
use spanlight_store::Store;

use crate::http;

pub async fn run_receiver(store: Store, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| SpanlightError::Io(format!("bind receiver listener failed: {e}")))?;
    tracing::info!(%addr, "otlp receiver listening");
    axum::serve(listener, http::router(store))
        .await
        .map_err(|e| SpanlightError::Io(format!("receiver server failed: {e}")))
}
