//! `CardroomServer` builder and serve loop.
//!
//! This is the entry point for running a Cardroom backend. It ties the
//! layers together: HTTP binding → request handlers → room registry.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use cardroom_room::{RoomConfig, RoomRegistry};
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::handler::RequestHandlers;
use crate::http;
use crate::CardroomError;

/// Builder for configuring and starting a Cardroom server.
///
/// # Example
///
/// ```rust,ignore
/// use cardroom::prelude::*;
///
/// let server = CardroomServer::builder()
///     .bind("0.0.0.0:8080")
///     .build()
///     .await?;
/// server.run().await
/// ```
#[derive(Debug, Clone, Default)]
pub struct CardroomServerBuilder {
    config: ServerConfig,
}

impl CardroomServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets how long `listen` blocks before a gateway timeout.
    pub fn listen_timeout(mut self, timeout: Duration) -> Self {
        self.config.listen_timeout = timeout;
        self
    }

    /// Sets the per-room configuration.
    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.config.room = config;
        self
    }

    /// Binds the listener and creates an empty registry.
    pub async fn build(self) -> Result<CardroomServer, CardroomError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        let registry = RoomRegistry::new(self.config.room.clone());
        let handlers = RequestHandlers::new(registry, self.config.listen_timeout);

        tracing::debug!(
            addr = %self.config.bind_addr,
            listen_timeout = ?self.config.listen_timeout,
            "server built"
        );
        Ok(CardroomServer { listener, handlers })
    }
}

/// A bound Cardroom server.
///
/// Call [`run()`](Self::run) to start serving requests.
pub struct CardroomServer {
    listener: TcpListener,
    handlers: RequestHandlers,
}

impl CardroomServer {
    /// Creates a new builder.
    pub fn builder() -> CardroomServerBuilder {
        CardroomServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The registry backing this server.
    pub fn registry(&self) -> &RoomRegistry {
        self.handlers.registry()
    }

    /// Serves until Ctrl-C.
    pub async fn run(self) -> Result<(), CardroomError> {
        self.run_until(shutdown_signal()).await
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), CardroomError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.listener.local_addr()?;
        tracing::info!(%addr, "Cardroom server listening");

        let app = http::router(self.handlers);
        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        tracing::info!("Cardroom server shut down");
        Ok(())
    }
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    }
}
