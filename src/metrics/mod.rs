//! Optional metrics for the counting caches (feature `metrics`).
//!
//! Counters live inside each cache's state and are read through
//! `metrics_snapshot()`; [`exporter::PrometheusTextExporter`] turns a snapshot
//! into Prometheus text.

pub mod exporter;
pub mod metrics_impl;
pub mod snapshot;
pub mod traits;
