//! Shared per-file context threaded through every builder.
//!
//! One `BuilderCtx` is constructed per file and handed (by reference) to the
//! Normalizer, CFG, DFG, Symbols, and Effects builders in turn. None of it
//! is mutated after construction — the builders' own walk state lives in
//! their own stacks, not here.

use crate::adapter::{self, LanguageAdapter};
use crate::config::model::Limits;
use crate::model::language::LanguageKind;
use crate::model::provenance::Provenance;

pub struct BuilderCtx<'a> {
    pub file_id: String,
    pub path: String,
    pub blob_sha: String,
    pub lang: LanguageKind,
    pub source: &'a str,
    pub run_id: String,
    pub config_hash: String,
    pub grammar_sha: String,
    pub adapter: Box<dyn LanguageAdapter>,
    pub limits: Limits,
}

impl<'a> BuilderCtx<'a> {
    pub fn new(
        file_id: String,
        path: String,
        blob_sha: String,
        lang: LanguageKind,
        source: &'a str,
        run_id: String,
        config_hash: String,
        grammar_sha: String,
        limits: Limits,
    ) -> Self {
        Self {
            file_id,
            path,
            blob_sha,
            lang,
            source,
            run_id,
            config_hash,
            grammar_sha,
            adapter: adapter::for_language(lang),
            limits,
        }
    }

    pub fn provenance(&self, byte_start: usize, byte_end: usize, line_start: usize, line_end: usize) -> Provenance {
        Provenance::new(
            self.path.clone(),
            self.blob_sha.clone(),
            self.lang.to_string(),
            self.grammar_sha.clone(),
            self.run_id.clone(),
            self.config_hash.clone(),
            byte_start,
            byte_end,
            line_start.max(1),
            line_end.max(1),
        )
    }

    pub fn slice<'s>(&'s self, byte_start: usize, byte_end: usize) -> &'s str {
        let len = self.source.len();
        let s = byte_start.min(len);
        let e = byte_end.min(len).max(s);
        &self.source[s..e]
    }
}
