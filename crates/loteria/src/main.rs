//! `loteria-server`: runs the Lotería WebSocket server.
//!
//! Environment:
//! - `LOTERIA_BIND`: listen address (default `0.0.0.0:8080`)
//! - `RUST_LOG`: log filter (default `info`)

use loteria::DEFAULT_BIND;
use loteria::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), LoteriaError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let bind = std::env::var("LOTERIA_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let server = LoteriaServer::builder().bind(&bind).build().await?;
    tracing::info!(addr = %server.local_addr()?, "listening");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}
