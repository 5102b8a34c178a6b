// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection metrics for the Tether transport.
//!
//! [`MetricsAggregator`] is a pure observer: it is fed session events by
//! reference and keeps the [`ConnectionMetrics`] snapshot shown to the UI.
//! Every observation is also mirrored to the metrics-rs facade, so any
//! installed recorder collects the `tether_*` series. With the `prometheus`
//! feature, [`PrometheusExporter`] installs such a recorder.

pub mod aggregator;
#[cfg(feature = "prometheus")]
pub mod exporter;
pub mod recording;

pub use aggregator::{ConnectionMetrics, MetricsAggregator};
#[cfg(feature = "prometheus")]
pub use exporter::PrometheusExporter;
pub use recording::register_metrics;
