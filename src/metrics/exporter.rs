use std::io::Write;

use parking_lot::Mutex;

use crate::metrics::snapshot::{AdaptiveMetricsSnapshot, CountingCacheMetricsSnapshot};
use crate::metrics::traits::MetricsExporter;

/// Prometheus text exporter for counting-cache snapshots.
///
/// Writes the Prometheus text exposition format, so the output can be scraped
/// by Prometheus or forwarded to an OpenTelemetry collector. Write errors are
/// logged and otherwise ignored; monitoring must never fail a cache caller.
#[derive(Debug)]
pub struct PrometheusTextExporter<W: Write + Send> {
    prefix: String,
    writer: Mutex<W>,
}

impl<W: Write + Send> PrometheusTextExporter<W> {
    pub fn new(prefix: impl Into<String>, writer: W) -> Self {
        Self {
            prefix: prefix.into(),
            writer: Mutex::new(writer),
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write_metric(&self, kind: &str, suffix: &str, value: u64) {
        let name = self.metric_name(suffix);
        let mut writer = self.writer.lock();
        let result = writeln!(writer, "# TYPE {name} {kind}")
            .and_then(|()| writeln!(writer, "{name} {value}"));
        if let Err(err) = result {
            log::warn!("failed to export metric {name}: {err}");
        }
    }

    fn write_counter(&self, suffix: &str, value: u64) {
        self.write_metric("counter", suffix, value);
    }

    fn write_gauge(&self, suffix: &str, value: u64) {
        self.write_metric("gauge", suffix, value);
    }

    fn metric_name(&self, suffix: &str) -> String {
        if self.prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}_{}", self.prefix, suffix)
        }
    }

    fn export_adaptive(&self, adaptive: &AdaptiveMetricsSnapshot) {
        self.write_counter("lfu_ghost_hits_total", adaptive.lfu_ghost_hits);
        self.write_counter("mfu_ghost_hits_total", adaptive.mfu_ghost_hits);
        self.write_counter("lfu_fraction_increases_total", adaptive.fraction_increases);
        self.write_counter("lfu_fraction_decreases_total", adaptive.fraction_decreases);
        self.write_counter("lfu_evictions_total", adaptive.lfu_evictions);
        self.write_counter("mfu_evictions_total", adaptive.mfu_evictions);
        self.write_counter("lfu_to_mfu_promotions_total", adaptive.lfu_to_mfu_promotions);
        self.write_gauge("lfu_fraction_promil", u64::from(adaptive.lfu_fraction_promil));
        self.write_gauge("lfu_queue_len", adaptive.lfu_count as u64);
        self.write_gauge("mfu_queue_len", adaptive.mfu_count as u64);
        self.write_gauge("lfu_ghost_len", adaptive.lfu_ghost_len as u64);
        self.write_gauge("mfu_ghost_len", adaptive.mfu_ghost_len as u64);
    }
}

impl<W: Write + Send> MetricsExporter<CountingCacheMetricsSnapshot> for PrometheusTextExporter<W> {
    fn export(&self, snapshot: &CountingCacheMetricsSnapshot) {
        self.write_counter("get_calls_total", snapshot.get_calls);
        self.write_counter("get_hits_total", snapshot.get_hits);
        self.write_counter("get_misses_total", snapshot.get_misses);
        self.write_counter("cache_calls_total", snapshot.cache_calls);
        self.write_counter("cache_rejections_total", snapshot.cache_rejections);
        self.write_counter("cache_replacements_total", snapshot.cache_replacements);
        self.write_counter("reuse_hits_total", snapshot.reuse_hits);
        self.write_counter("reuse_misses_total", snapshot.reuse_misses);
        self.write_counter("probe_hits_total", snapshot.probe_hits);
        self.write_counter("evicted_entries_total", snapshot.evicted_entries);
        self.write_counter("trimmed_entries_total", snapshot.trimmed_entries);
        self.write_counter("removed_entries_total", snapshot.removed_entries);
        self.write_counter("released_entries_total", snapshot.released_entries);
        self.write_counter("params_refreshes_total", snapshot.params_refreshes);
        self.write_gauge("entries", snapshot.count as u64);
        self.write_gauge("size_bytes", snapshot.size_in_bytes as u64);
        self.write_gauge("in_use_entries", snapshot.in_use_count() as u64);
        self.write_gauge("in_use_size_bytes", snapshot.in_use_size_in_bytes() as u64);
        self.write_gauge("eviction_queue_entries", snapshot.eviction_queue_count as u64);
        self.write_gauge(
            "eviction_queue_size_bytes",
            snapshot.eviction_queue_size_in_bytes as u64,
        );
        self.write_gauge("max_entries", snapshot.max_entries as u64);
        self.write_gauge("max_size_bytes", snapshot.max_size_bytes as u64);
        if let Some(adaptive) = &snapshot.adaptive {
            self.export_adaptive(adaptive);
        }
    }
}
