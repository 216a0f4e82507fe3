//! Wyoming TCP listener and connection pool
//!
//! Accepts connections and runs each handler on its own task, tracked in a
//! [`JoinSet`] so graceful stop can wait for them. A listener failure sets
//! the running gauge to zero and is fatal to the server.

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use super::{connection, WyomingContext};
use crate::Result;

/// The Wyoming protocol server
pub struct WyomingServer {
    port: u16,
    ctx: WyomingContext,
}

impl WyomingServer {
    /// Create a server that will listen on `port`
    #[must_use]
    pub fn new(port: u16, ctx: WyomingContext) -> Self {
        Self { port, ctx }
    }

    /// Bind the configured port and accept until `shutdown` fires
    ///
    /// # Errors
    ///
    /// Returns an error when binding or accepting fails.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;
        self.serve(listener, shutdown).await
    }

    /// Accept connections on an already-bound listener until `shutdown` fires
    ///
    /// # Errors
    ///
    /// Returns an error when accepting fails.
    pub async fn serve(&self, listener: TcpListener, shutdown: watch::Receiver<bool>) -> Result<()> {
        tracing::info!(port = self.port, "wyoming server listening");
        self.ctx.metrics.running.set(1);

        let mut connections = JoinSet::new();
        let mut shutdown_rx = shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.ctx.metrics.connections_accepted.inc();
                        connections.spawn(connection::handle(
                            stream,
                            peer,
                            self.ctx.clone(),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        self.ctx.metrics.connection_errors.inc();
                        self.ctx.metrics.running.set(0);
                        tracing::error!(error = %e, "wyoming listener failed");
                        return Err(e.into());
                    }
                },
                // Reap finished handlers so the set stays small.
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        self.ctx.metrics.running.set(0);
        tracing::info!(open = connections.len(), "wyoming server stopping");
        while connections.join_next().await.is_some() {}
        Ok(())
    }
}
