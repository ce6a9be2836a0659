//! Relay server
//!
//! Owns the TCP listener and the shared room registry, and spawns one
//! handler task per accepted connection until the shutdown future resolves.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{error, info};

use crate::error::AppError;
use crate::handler::handle_connection;
use crate::registry::RoomRegistry;

/// Accept loop plus the registry shared by every connection
pub struct RelayServer {
    listener: TcpListener,
    registry: Arc<RoomRegistry>,
}

impl RelayServer {
    /// Bind the listener with a fresh, empty registry
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, AppError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            registry: Arc::new(RoomRegistry::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared registry, for inspection
    pub fn registry(&self) -> Arc<RoomRegistry> {
        self.registry.clone()
    }

    /// Run the accept loop until `shutdown` completes
    ///
    /// Connections already accepted keep running on their own tasks.
    pub async fn run<F>(self, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down collaboration server...");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            info!("New connection from {}", addr);
                            let registry = self.registry.clone();

                            // Spawn handler task for each connection
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, registry).await {
                                    error!("Connection handler error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }
    }
}
