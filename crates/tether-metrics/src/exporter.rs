// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus exporter for the `tether_*` metrics.

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use tether_core::{AdapterType, HealthStatus, PluginAdapter, TetherError};

use crate::recording;

/// Installs the Prometheus recorder and renders the text exposition format.
pub struct PrometheusExporter {
    handle: PrometheusHandle,
}

impl PrometheusExporter {
    /// Installs the recorder globally. Only one recorder can be installed per
    /// process; a second call fails.
    pub fn install() -> Result<Self, TetherError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            TetherError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();
        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl PluginAdapter for PrometheusExporter {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Observability
    }

    async fn health_check(&self) -> Result<HealthStatus, TetherError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TetherError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetricsAggregator;
    use tokio::time::Instant;

    #[tokio::test]
    async fn aggregator_observations_reach_a_local_recorder() {
        // A local recorder avoids clashing with the global one.
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            let mut agg = MetricsAggregator::new();
            agg.on_message_sent(1);
            agg.on_message_sent(2);
            agg.on_message_acked();
            let _ = agg.snapshot(Instant::now());
        });

        let rendered = handle.render();
        assert!(rendered.contains("tether_messages_sent_total 2"));
        assert!(rendered.contains("tether_message_retries_total 1"));
        assert!(rendered.contains("tether_messages_acked_total 1"));
    }
}
