//! Daemon - the main gateway service
//!
//! Wires the worker backends to the Wyoming server, the HTTP API, and the
//! mDNS advertiser, and runs them until interrupted.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::api::{self, ApiState};
use crate::config::Config;
use crate::discovery::MdnsAdvertiser;
use crate::logging::LogBuffer;
use crate::metrics::Metrics;
use crate::workers::{
    Generator, HttpGenerator, HttpSynthesizer, HttpTranscriber, ModelContainer, ModelLoader,
};
use crate::wyoming::{WyomingContext, WyomingServer};
use crate::{config::SettingsStore, Result};

/// Builds [`HttpGenerator`] instances for the configured completion host
struct HttpModelLoader {
    base_url: String,
}

#[async_trait]
impl ModelLoader for HttpModelLoader {
    async fn load(&self, model: &str) -> Result<Arc<dyn Generator>> {
        Ok(Arc::new(HttpGenerator::new(self.base_url.clone(), model)))
    }
}

/// The gateway daemon
pub struct Daemon {
    config: Config,
    logs: Arc<LogBuffer>,
}

impl Daemon {
    /// Create a daemon from loaded configuration
    #[must_use]
    pub fn new(config: Config, logs: Arc<LogBuffer>) -> Self {
        Self { config, logs }
    }

    /// Run until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if a server fails to start or fails while running.
    pub async fn run(self) -> Result<()> {
        let metrics = Arc::new(Metrics::new()?);
        let settings = SettingsStore::new(self.config.settings.clone());

        let synthesizer = Arc::new(HttpSynthesizer::new(self.config.tts_url.clone()));
        let transcriber = Arc::new(HttpTranscriber::new(self.config.stt_url.clone()));

        let models = self.config.llm_url.as_ref().map(|url| {
            Arc::new(ModelContainer::new(
                Arc::new(HttpModelLoader { base_url: url.clone() }),
                self.config.llm_models.clone(),
            ))
        });

        let wyoming_ctx = WyomingContext {
            synthesizer: synthesizer.clone(),
            transcriber: transcriber.clone(),
            settings: settings.clone(),
            metrics: Arc::clone(&metrics),
        };

        let api_state = Arc::new(ApiState {
            settings,
            metrics: Arc::clone(&metrics),
            synthesizer,
            transcriber,
            models,
            logs: self.logs,
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let wyoming = WyomingServer::new(self.config.wyoming_port, wyoming_ctx);
        let wyoming_shutdown = shutdown_rx.clone();
        let mut wyoming_task =
            tokio::spawn(async move { wyoming.run(wyoming_shutdown).await });

        let http_port = self.config.http_port;
        let http_shutdown = shutdown_rx.clone();
        let http_task =
            tokio::spawn(async move { api::serve(api_state, http_port, http_shutdown).await });

        let advertiser = if self.config.mdns_enabled {
            match MdnsAdvertiser::new() {
                Ok(advertiser) => {
                    if let Err(e) = advertiser.start(self.config.wyoming_port) {
                        tracing::warn!(error = %e, "mDNS advertisement failed");
                    }
                    Some(advertiser)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "mDNS unavailable");
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(
            wyoming_port = self.config.wyoming_port,
            http_port = self.config.http_port,
            "gateway running"
        );

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, shutting down");
            }
            result = &mut wyoming_task => {
                let _ = shutdown_tx.send(true);
                let _ = http_task.await;
                return result.map_err(|e| crate::Error::Config(format!("wyoming task failed: {e}")))?;
            }
        }

        if let Some(advertiser) = &advertiser {
            advertiser.stop();
        }
        let _ = shutdown_tx.send(true);
        let _ = wyoming_task.await;
        let _ = http_task.await;

        tracing::info!("gateway stopped");
        Ok(())
    }
}
