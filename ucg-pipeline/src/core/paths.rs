//! Path normalization and glob helpers.
//!
//! These utilities ensure paths are stable, portable, and comparable across
//! platforms before they are baked into content-addressed IDs.

use crate::model::language::LanguageKind;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Convert a path into a repository-relative string with stable `/` separators.
///
/// # Example
/// ```
/// use std::path::Path;
/// use ucg_pipeline::core::paths::to_unix_sep;
///
/// assert_eq!(to_unix_sep(r"lib\src\foo.py"), "lib/src/foo.py");
/// ```
pub fn to_unix_sep<S: AsRef<str>>(s: S) -> String {
    s.as_ref().replace('\\', "/")
}

/// Repo-relative, forward-slash path for a file under `root`.
pub fn normalize_repo_rel_str(root: &Path, p: &Path) -> String {
    let root_abs = dunce::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let abs = dunce::canonicalize(p).unwrap_or_else(|_| {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            root_abs.join(p)
        }
    });
    let rel = abs.strip_prefix(&root_abs).unwrap_or(&abs);
    to_unix_sep(rel.to_string_lossy())
}

/// Detect programming language from file extension.
///
/// # Example
/// ```
/// use std::path::Path;
/// use ucg_pipeline::core::paths::detect_language;
/// use ucg_pipeline::model::language::LanguageKind;
///
/// assert_eq!(detect_language(Path::new("foo.py")), Some(LanguageKind::Python));
/// assert_eq!(detect_language(Path::new("foo.yaml")), None);
/// ```
pub fn detect_language(path: &Path) -> Option<LanguageKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    LanguageKind::from_extension(&ext)
}

/// Build a `GlobSet` from patterns, skipping invalid or empty ones. `None`
/// when the input is empty or every pattern is invalid.
pub fn build_globset(patterns: &[String]) -> Option<GlobSet> {
    if patterns.is_empty() {
        return None;
    }
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        if pat.trim().is_empty() {
            continue;
        }
        if let Ok(g) = Glob::new(pat) {
            builder.add(g);
        }
    }
    builder.build().ok()
}

pub fn matches_any(path: &Path, set: Option<&GlobSet>) -> bool {
    set.is_some_and(|gs| gs.is_match(to_unix_sep(path.to_string_lossy())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globset_matches_generated_files() {
        let gs = build_globset(&["**/*.g.py".to_string()]);
        assert!(matches_any(Path::new("models/user.g.py"), gs.as_ref()));
        assert!(!matches_any(Path::new("models/user.py"), gs.as_ref()));
    }

    #[test]
    fn empty_patterns_build_no_globset() {
        assert!(build_globset(&[]).is_none());
    }
}
