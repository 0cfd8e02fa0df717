//! Thread-safe anomaly collector: the first of the two genuinely shared
//! resources in this pipeline (design note: "only two global mutable
//! things"). Guarded by a single mutex; counters and histogram buckets are
//! updated under the lock.

use crate::model::rows::{AnomalyKind, AnomalyRow, Severity};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

struct Inner {
    rows: Vec<AnomalyRow>,
    by_kind: BTreeMap<&'static str, u64>,
    by_severity: BTreeMap<&'static str, u64>,
    // name -> (bucket label -> count)
    timer_histograms: BTreeMap<String, BTreeMap<&'static str, u64>>,
}

pub struct AnomalySink {
    inner: Mutex<Inner>,
}

impl Default for AnomalySink {
    fn default() -> Self {
        Self::new()
    }
}

impl AnomalySink {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                rows: Vec::new(),
                by_kind: BTreeMap::new(),
                by_severity: BTreeMap::new(),
                timer_histograms: BTreeMap::new(),
            }),
        }
    }

    pub fn emit(&self, row: AnomalyRow) {
        let mut guard = self.inner.lock().expect("anomaly sink mutex poisoned");
        *guard.by_kind.entry(kind_label(row.kind)).or_insert(0) += 1;
        *guard.by_severity.entry(severity_label(row.severity)).or_insert(0) += 1;
        guard.rows.push(row);
    }

    pub fn extend(&self, rows: impl IntoIterator<Item = AnomalyRow>) {
        for row in rows {
            self.emit(row);
        }
    }

    /// Drain all buffered rows, leaving counters/histograms intact.
    pub fn drain(&self) -> Vec<AnomalyRow> {
        let mut guard = self.inner.lock().expect("anomaly sink mutex poisoned");
        std::mem::take(&mut guard.rows)
    }

    pub fn counters_by_kind(&self) -> BTreeMap<String, u64> {
        let guard = self.inner.lock().expect("anomaly sink mutex poisoned");
        guard.by_kind.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    pub fn counters_by_severity(&self) -> BTreeMap<String, u64> {
        let guard = self.inner.lock().expect("anomaly sink mutex poisoned");
        guard.by_severity.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    pub fn total(&self) -> u64 {
        let guard = self.inner.lock().expect("anomaly sink mutex poisoned");
        guard.by_kind.values().sum()
    }

    /// Record a duration observation under a named timer, bucketed log-scale.
    pub fn observe_duration(&self, name: &str, d: Duration) {
        let bucket = duration_bucket(d);
        let mut guard = self.inner.lock().expect("anomaly sink mutex poisoned");
        *guard
            .timer_histograms
            .entry(name.to_string())
            .or_default()
            .entry(bucket)
            .or_insert(0) += 1;
    }

    pub fn timer_histograms(&self) -> BTreeMap<String, BTreeMap<String, u64>> {
        let guard = self.inner.lock().expect("anomaly sink mutex poisoned");
        guard
            .timer_histograms
            .iter()
            .map(|(name, buckets)| {
                (
                    name.clone(),
                    buckets.iter().map(|(b, c)| (b.to_string(), *c)).collect(),
                )
            })
            .collect()
    }
}

fn kind_label(kind: AnomalyKind) -> &'static str {
    match kind {
        AnomalyKind::ParseFailed => "PARSE_FAILED",
        AnomalyKind::EncodingError => "ENCODING_ERROR",
        AnomalyKind::Timeout => "TIMEOUT",
        AnomalyKind::MemoryLimit => "MEMORY_LIMIT",
        AnomalyKind::LangUnknown => "LANG_UNKNOWN",
        AnomalyKind::Minified => "MINIFIED",
        AnomalyKind::TooLarge => "TOO_LARGE",
        AnomalyKind::BinaryFile => "BINARY_FILE",
        AnomalyKind::PermissionDenied => "PERMISSION_DENIED",
        AnomalyKind::IoError => "IO_ERROR",
        AnomalyKind::SymlinkOutOfRoot => "SYMLINK_OUT_OF_ROOT",
        AnomalyKind::SymlinkCycle => "SYMLINK_CYCLE",
        AnomalyKind::GeneratedCode => "GENERATED_CODE",
        AnomalyKind::SkippedByRule => "SKIPPED_BY_RULE",
        AnomalyKind::DynamicImport => "DYNAMIC_IMPORT",
        AnomalyKind::EvalUsage => "EVAL_USAGE",
        AnomalyKind::UnknownFlow => "UNKNOWN_FLOW",
        AnomalyKind::Unknown => "UNKNOWN",
    }
}

fn severity_label(s: Severity) -> &'static str {
    match s {
        Severity::Info => "info",
        Severity::Warn => "warn",
        Severity::Error => "error",
    }
}

/// Log-scale bucket boundaries, matching `anomalies.py`'s `_duration_bucket`
/// exactly: <1µs, <1ms, <10ms, <50ms, <100ms, <500ms, <1s, <2.5s, <5s, <10s,
/// <30s, <60s, >=60s.
fn duration_bucket(d: Duration) -> &'static str {
    let micros = d.as_micros();
    if micros < 1 {
        "lt_1us"
    } else if micros < 1_000 {
        "lt_1ms"
    } else if micros < 10_000 {
        "lt_10ms"
    } else if micros < 50_000 {
        "lt_50ms"
    } else if micros < 100_000 {
        "lt_100ms"
    } else if micros < 500_000 {
        "lt_500ms"
    } else if micros < 1_000_000 {
        "lt_1s"
    } else if micros < 2_500_000 {
        "lt_2_5s"
    } else if micros < 5_000_000 {
        "lt_5s"
    } else if micros < 10_000_000 {
        "lt_10s"
    } else if micros < 30_000_000 {
        "lt_30s"
    } else if micros < 60_000_000 {
        "lt_60s"
    } else {
        "ge_60s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::rows::{AnomalyKind, Severity};

    fn row(kind: AnomalyKind, severity: Severity) -> AnomalyRow {
        AnomalyRow {
            path: "a.py".into(),
            blob_sha: None,
            kind,
            severity,
            detail: "test".into(),
            byte_start: None,
            byte_end: None,
            timestamp: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn counters_increment_per_kind_and_severity() {
        let sink = AnomalySink::new();
        sink.emit(row(AnomalyKind::ParseFailed, Severity::Error));
        sink.emit(row(AnomalyKind::ParseFailed, Severity::Error));
        sink.emit(row(AnomalyKind::Timeout, Severity::Warn));

        assert_eq!(sink.counters_by_kind()["PARSE_FAILED"], 2);
        assert_eq!(sink.counters_by_kind()["TIMEOUT"], 1);
        assert_eq!(sink.counters_by_severity()["error"], 2);
        assert_eq!(sink.total(), 3);
    }

    #[test]
    fn drain_empties_rows_but_keeps_counters() {
        let sink = AnomalySink::new();
        sink.emit(row(AnomalyKind::Unknown, Severity::Info));
        let drained = sink.drain();
        assert_eq!(drained.len(), 1);
        assert!(sink.drain().is_empty());
        assert_eq!(sink.total(), 1);
    }

    #[test]
    fn duration_buckets_match_boundaries() {
        assert_eq!(duration_bucket(Duration::from_micros(0)), "lt_1us");
        assert_eq!(duration_bucket(Duration::from_micros(500)), "lt_1ms");
        assert_eq!(duration_bucket(Duration::from_millis(5)), "lt_10ms");
        assert_eq!(duration_bucket(Duration::from_millis(999)), "lt_1s");
        assert_eq!(duration_bucket(Duration::from_secs(1)), "lt_2_5s");
        assert_eq!(duration_bucket(Duration::from_secs(61)), "ge_60s");
    }
}
