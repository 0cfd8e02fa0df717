//! Language taxonomy and helpers.
//!
//! This module defines a compact enum for supported languages and small
//! utilities for file-extension based detection. Language→grammar mapping
//! lives in `adapter` and `parser`, not here.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Supported languages. Keep the set tight and add variants deliberately.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageKind {
    Python,
    JavaScript,
    TypeScript,
    Rust,
    Dart,
}

impl Display for LanguageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LanguageKind::Python => "python",
            LanguageKind::JavaScript => "javascript",
            LanguageKind::TypeScript => "typescript",
            LanguageKind::Rust => "rust",
            LanguageKind::Dart => "dart",
        })
    }
}

impl LanguageKind {
    /// Best-effort detection by file extension. `None` for unsupported extensions.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let e = ext.to_ascii_lowercase();
        match e.as_str() {
            "py" | "pyi" => Some(Self::Python),
            "js" | "mjs" | "cjs" | "jsx" => Some(Self::JavaScript),
            "ts" | "tsx" => Some(Self::TypeScript),
            "rs" => Some(Self::Rust),
            "dart" => Some(Self::Dart),
            _ => None,
        }
    }

    /// Whether this crate bundles a tree-sitter grammar for the language.
    /// Dart is kept as a variant for parity with the taxonomy upstream but has
    /// no bundled grammar here; its driver reports `LangUnknown`.
    pub fn has_driver(self) -> bool {
        !matches!(self, LanguageKind::Dart)
    }
}
