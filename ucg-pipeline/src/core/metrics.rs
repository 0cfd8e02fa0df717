//! The second of the two genuinely shared mutable resources: a lock-protected
//! registry of run-wide counters. Distinct from `AnomalySink` because it
//! tracks pipeline progress (files seen, rows emitted) rather than failures.

use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    counters: BTreeMap<&'static str, u64>,
}

pub struct MetricsRegistry {
    inner: Mutex<Inner>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn incr(&self, name: &'static str, by: u64) {
        let mut guard = self.inner.lock().expect("metrics mutex poisoned");
        *guard.counters.entry(name).or_insert(0) += by;
    }

    pub fn get(&self, name: &'static str) -> u64 {
        let guard = self.inner.lock().expect("metrics mutex poisoned");
        *guard.counters.get(name).unwrap_or(&0)
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        let guard = self.inner.lock().expect("metrics mutex poisoned");
        guard.counters.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incr_accumulates() {
        let m = MetricsRegistry::new();
        m.incr("files_parsed", 1);
        m.incr("files_parsed", 2);
        assert_eq!(m.get("files_parsed"), 3);
    }
}
