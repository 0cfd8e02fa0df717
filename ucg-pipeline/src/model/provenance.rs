//! Provenance record attached to every emitted row.
//!
//! Immutable after construction: no `&mut` accessors are exposed, and every
//! field that participates in an ID is a pure function of its inputs (no
//! wall-clock, no hashmap iteration order, no thread id).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A confidence value is either a string label or a number in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfidenceValue {
    Text(String),
    Number(f64),
}

impl From<f64> for ConfidenceValue {
    fn from(v: f64) -> Self {
        ConfidenceValue::Number(v)
    }
}

impl From<&str> for ConfidenceValue {
    fn from(v: &str) -> Self {
        ConfidenceValue::Text(v.to_string())
    }
}

/// Immutable origin record carried by every row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub path: String,
    pub blob_sha: String,
    pub language: String,
    pub grammar_sha: String,
    pub run_id: String,
    pub config_hash: String,
    pub byte_start: usize,
    pub byte_end: usize,
    pub line_start: usize,
    pub line_end: usize,
    pub enricher_versions: BTreeMap<String, String>,
    pub confidence: BTreeMap<String, ConfidenceValue>,
}

impl Provenance {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        path: impl Into<String>,
        blob_sha: impl Into<String>,
        language: impl Into<String>,
        grammar_sha: impl Into<String>,
        run_id: impl Into<String>,
        config_hash: impl Into<String>,
        byte_start: usize,
        byte_end: usize,
        line_start: usize,
        line_end: usize,
    ) -> Self {
        Self {
            path: path.into(),
            blob_sha: blob_sha.into(),
            language: language.into(),
            grammar_sha: grammar_sha.into(),
            run_id: run_id.into(),
            config_hash: config_hash.into(),
            byte_start,
            byte_end,
            line_start,
            line_end,
            enricher_versions: BTreeMap::new(),
            confidence: BTreeMap::new(),
        }
    }

    pub fn with_enricher_version(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.enricher_versions.insert(name.into(), version.into());
        self
    }

    pub fn with_confidence(mut self, key: impl Into<String>, value: impl Into<ConfidenceValue>) -> Self {
        self.confidence.insert(key.into(), value.into());
        self
    }

    /// Provenance completeness invariant from the testable-properties list:
    /// non-empty path/blob_sha/run_id/config_hash/grammar_sha and valid spans.
    pub fn is_complete(&self) -> bool {
        !self.path.is_empty()
            && !self.blob_sha.is_empty()
            && !self.run_id.is_empty()
            && !self.config_hash.is_empty()
            && !self.grammar_sha.is_empty()
            && self.byte_end >= self.byte_start
            && self.line_end >= self.line_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Provenance {
        Provenance::new("a.py", "deadbeef", "python", "gsha", "run1", "cfg1", 0, 10, 1, 1)
    }

    #[test]
    fn complete_provenance_passes() {
        assert!(sample().is_complete());
    }

    #[test]
    fn empty_path_is_incomplete() {
        let mut p = sample();
        p.path.clear();
        assert!(!p.is_complete());
    }

    #[test]
    fn inverted_span_is_incomplete() {
        let mut p = sample();
        p.byte_end = 0;
        p.byte_start = 5;
        assert!(!p.is_complete());
    }
}
