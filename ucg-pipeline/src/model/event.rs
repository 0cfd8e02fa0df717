//! Parse-event contract: the sole input to the builders.
//!
//! A `ParserDriver` turns file bytes into a `ParseStream` carrying an
//! iterator of `CstEvent`s. Builders never see a tree-sitter `Tree` directly;
//! this indirection is what lets non-tree-sitter drivers plug in.

use crate::model::language::LanguageKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Enter,
    Exit,
    Token,
}

/// A single streamed record describing the start, end, or token within a CST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CstEvent {
    pub kind: EventKind,
    pub type_name: String,
    pub byte_start: usize,
    pub byte_end: usize,
    pub line_start: usize,
    pub line_end: usize,
}

impl CstEvent {
    pub fn new(
        kind: EventKind,
        type_name: impl Into<String>,
        byte_start: usize,
        byte_end: usize,
        line_start: usize,
        line_end: usize,
    ) -> Self {
        Self {
            kind,
            type_name: type_name.into(),
            byte_start,
            byte_end,
            line_start,
            line_end,
        }
    }

    /// Registry-enforced invariants: non-negative spans, end>=start, non-empty type.
    pub fn is_valid(&self) -> bool {
        !self.type_name.is_empty() && self.byte_end >= self.byte_start && self.line_end >= self.line_start
    }

    /// Text covered by this event's span, slicing the original source.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        let len = source.len();
        let s = self.byte_start.min(len);
        let e = self.byte_end.min(len).max(s);
        &source[s..e]
    }
}

/// Metadata describing the file being parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMeta {
    pub path: String,
    pub real_path: String,
    pub blob_sha: String,
    pub size_bytes: u64,
    pub mtime_ns: i128,
    pub run_id: String,
    pub config_hash: String,
    pub is_text: bool,
    pub encoding: String,
    pub encoding_confidence: f64,
    pub language: Option<LanguageKind>,
    pub flags: BTreeSet<String>,
}

/// Language driver identity, mixed into every provenance record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverInfo {
    pub language: LanguageKind,
    pub grammar_name: String,
    pub grammar_sha: String,
    pub version: String,
}

/// The output of a single driver invocation: file metadata, driver identity,
/// an ok flag, optional error, and the raw source (kept alongside events so
/// builders can slice text by byte range without re-reading the file).
pub struct ParseStream {
    pub meta: FileMeta,
    pub driver: DriverInfo,
    pub ok: bool,
    pub error: Option<String>,
    pub source: String,
    pub events: Vec<CstEvent>,
}
