//! `LoteriaServer` builder and accept loop.
//!
//! This is the entry point for running a Lotería server. It ties the
//! layers together: transport → protocol → room registry.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use loteria_protocol::{Codec, JsonCodec, PlayerId};
use loteria_room::{RoomConfig, RoomRegistry};

use crate::handler::handle_connection;
use crate::{LoteriaError, WebSocketTransport};

/// Address the binary binds to when `LOTERIA_BIND` is unset.
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Gateway settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_addr: String,
    /// How long a new connection has to upgrade and send its handshake.
    pub handshake_timeout: Duration,
    /// A connection silent for this long is closed. Heartbeats count.
    pub idle_timeout: Duration,
    /// Settings for every room.
    pub room: RoomConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(15),
            room: RoomConfig::default(),
        }
    }
}

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) registry: Arc<RoomRegistry>,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
    next_player_id: AtomicU64,
}

impl<C: Codec> ServerState<C> {
    /// Identity for a freshly handshaken connection. Never reused.
    pub(crate) fn next_player_id(&self) -> PlayerId {
        PlayerId(self.next_player_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// Builder for configuring and starting a Lotería server.
///
/// # Example
///
/// ```rust,no_run
/// use loteria::prelude::*;
///
/// # async fn run() -> Result<(), LoteriaError> {
/// let server = LoteriaServer::builder()
///     .bind("0.0.0.0:8080")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct LoteriaServerBuilder {
    config: ServerConfig,
}

impl LoteriaServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the configuration shared by every room.
    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.config.room = config;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Binds the listener and builds the server with the JSON codec.
    pub async fn build(self) -> Result<LoteriaServer<JsonCodec>, LoteriaError> {
        self.build_with_codec(JsonCodec).await
    }

    /// Binds the listener and builds the server with a custom codec.
    pub async fn build_with_codec<C: Codec>(self, codec: C) -> Result<LoteriaServer<C>, LoteriaError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;
        let registry = Arc::new(RoomRegistry::new(self.config.room.clone()));

        let state = Arc::new(ServerState {
            registry,
            codec,
            config: self.config,
            next_player_id: AtomicU64::new(1),
        });

        Ok(LoteriaServer { transport, state })
    }
}

impl Default for LoteriaServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Lotería server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct LoteriaServer<C: Codec = JsonCodec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl LoteriaServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> LoteriaServerBuilder {
        LoteriaServerBuilder::new()
    }
}

impl<C: Codec> LoteriaServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, LoteriaError> {
        Ok(self.transport.local_addr()?)
    }

    /// The room registry shared by every connection.
    pub fn registry(&self) -> Arc<RoomRegistry> {
        Arc::clone(&self.state.registry)
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), LoteriaError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes.
    ///
    /// Each connection is handled in its own task, so connections already
    /// accepted keep running after the loop stops.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<(), LoteriaError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "Lotería server running");
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                accepted = self.transport.accept() => accepted,
                () = &mut shutdown => {
                    tracing::info!("shutdown requested, no longer accepting connections");
                    return Ok(());
                }
            };

            match accepted {
                Ok((stream, peer)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, state).await {
                            tracing::debug!(%peer, error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
