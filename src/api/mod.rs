pub mod routes;

use anyhow::{Context, Result};
use axum::Router;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::TcpListener;
use tracing::info;

pub async fn run_server(state: routes::ApiState) -> Result<()> {
    let port = state.config.api_port;
    let app: Router = routes::router(state);

    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API server: {addr}"))?;

    info!(address = %addr, "SignalTrack API server started");

    axum::serve(listener, app)
        .await
        .context("API server failed")?;

    Ok(())
}
