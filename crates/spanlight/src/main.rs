mod api;

use std::net::SocketAddr;

use anyhow::Context;
use spanlight_core::config::Config;
use spanlight_store::Store;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("ENV").map(|v| v != "production").unwrap_or(true) {
        let _ = dotenvy::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let cfg = Config::from_env();
    let receiver_addr: SocketAddr = cfg
        .receiver_addr
        .parse()
        .context("parse RECEIVER_ADDR")?;
    let api_addr: SocketAddr = cfg.api_addr.parse().context("parse API_ADDR")?;

    let store = Store::connect(&cfg)
        .await
        .context("connect to clickhouse")?;
    tracing::info!(
        clickhouse = %cfg.clickhouse_url(),
        db = %cfg.clickhouse_db,
        "store connected"
    );

    let receiver_task = tokio::spawn(spanlight_ingest::server::run_receiver(
        store.clone(),
        receiver_addr,
    ));
    let api_task = tokio::spawn(api::run_api_server(store, api_addr));

    // Either server exiting is fatal; the process restarts under its
    // supervisor rather than limping along half-up.
    tokio::select! {
        res = receiver_task => {
            res.context("receiver task panicked")?.context("receiver server")?;
        }
        res = api_task => {
            res.context("api task panicked")?.context("api server")?;
        }
    }

    Ok(())
}
