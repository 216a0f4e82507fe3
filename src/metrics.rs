//! Gateway metrics
//!
//! One process-wide Prometheus registry owned by a [`Metrics`] struct that
//! is passed into handlers rather than reached through globals. Rendered by
//! `GET /metrics`.

use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};

use crate::{Error, Result};

/// Counters and gauges for the gateway
pub struct Metrics {
    registry: Registry,

    /// Total TCP connections accepted
    pub connections_accepted: IntCounter,
    /// Currently open TCP connections
    pub connections_active: IntGauge,
    /// Connection-level errors (framing, schema, worker failures)
    pub connection_errors: IntCounter,
    /// Frames decoded from clients
    pub frames_decoded: IntCounter,
    /// Frames written to clients
    pub frames_encoded: IntCounter,
    /// Synthesis requests started (one-shot and per streamed unit)
    pub synthesize_requests: IntCounter,
    /// Per-sentence synthesis deadline expiries
    pub synthesis_timeouts: IntCounter,
    /// Transcriptions started
    pub transcribe_requests: IntCounter,
    /// Chat completion requests started
    pub chat_requests: IntCounter,
    /// 1 while the Wyoming listener is accepting, 0 after a listener failure
    pub running: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, help))
        .map_err(|e| Error::Config(format!("bad metric {name}: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| Error::Config(format!("failed to register {name}: {e}")))?;
    Ok(counter)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge> {
    let gauge = IntGauge::with_opts(Opts::new(name, help))
        .map_err(|e| Error::Config(format!("bad metric {name}: {e}")))?;
    registry
        .register(Box::new(gauge.clone()))
        .map_err(|e| Error::Config(format!("failed to register {name}: {e}")))?;
    Ok(gauge)
}

impl Metrics {
    /// Create the registry and register every gateway metric
    ///
    /// # Errors
    ///
    /// Returns an error when registration fails (duplicate names).
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let metrics = Self {
            connections_accepted: counter(
                &registry,
                "aria_connections_accepted_total",
                "Total Wyoming TCP connections accepted",
            )?,
            connections_active: gauge(
                &registry,
                "aria_connections_active",
                "Currently open Wyoming TCP connections",
            )?,
            connection_errors: counter(
                &registry,
                "aria_connection_errors_total",
                "Connection-level protocol and worker errors",
            )?,
            frames_decoded: counter(
                &registry,
                "aria_frames_decoded_total",
                "Wyoming frames decoded from clients",
            )?,
            frames_encoded: counter(
                &registry,
                "aria_frames_encoded_total",
                "Wyoming frames written to clients",
            )?,
            synthesize_requests: counter(
                &registry,
                "aria_synthesize_requests_total",
                "Synthesis invocations sent to the TTS backend",
            )?,
            synthesis_timeouts: counter(
                &registry,
                "aria_synthesis_timeouts_total",
                "Per-sentence synthesis deadline expiries",
            )?,
            transcribe_requests: counter(
                &registry,
                "aria_transcribe_requests_total",
                "Transcriptions sent to the STT backend",
            )?,
            chat_requests: counter(
                &registry,
                "aria_chat_requests_total",
                "Chat completion requests",
            )?,
            running: gauge(
                &registry,
                "aria_wyoming_running",
                "1 while the Wyoming listener is accepting connections",
            )?,
            registry,
        };
        Ok(metrics)
    }

    /// Render the registry in Prometheus text exposition format
    #[must_use]
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut out = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut out) {
            tracing::warn!(error = %e, "metrics encoding failed");
        }
        String::from_utf8(out).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_contains_registered_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.connections_accepted.inc();
        metrics.running.set(1);

        let text = metrics.render();
        assert!(text.contains("aria_connections_accepted_total 1"));
        assert!(text.contains("aria_wyoming_running 1"));
    }

    #[test]
    fn registries_are_independent() {
        // Two instances must not collide (no global registry).
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.frames_decoded.inc();
        assert!(b.render().contains("aria_frames_decoded_total 0"));
    }
}
