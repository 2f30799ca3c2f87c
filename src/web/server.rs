// TunnelWatch - web/server.rs
//
// Binds the listen socket and serves the router on the tokio runtime.

use crate::util::error::ServerError;
use crate::web::router::build_router;
use crate::web::state::WebState;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// A bound, not yet serving, HTTP server.
pub struct Server {
    listener: TcpListener,
    router: Router,
}

impl Server {
    /// Bind the listen socket.
    pub async fn bind(addr: &str, state: WebState) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self {
            listener,
            router: build_router(state),
        })
    }

    /// Address actually bound (useful when binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|source| ServerError::Serve { source })
    }

    /// Serve until the listener fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let addr = self.local_addr()?;
        tracing::info!(%addr, "HTTP server listening");

        axum::serve(self.listener, self.router)
            .await
            .map_err(|source| ServerError::Serve { source })
    }
}
