use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;

/// Bind and run one service router until ctrl-c. Shutdown is graceful:
/// the listener stops accepting and in-flight requests drain before the
/// future resolves.
pub async fn run(name: &str, port: u16, app: Router) -> Result<()> {
    let addr = format!("0.0.0.0:{port}");
    println!("nivo {name} listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .with_context(|| format!("running {name} server"))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
