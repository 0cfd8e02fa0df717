//! Filesystem discovery: a thin `walkdir`-based scan behind the literal
//! interface the spec calls for. File discovery/classification proper is an
//! external collaborator; this is intentionally the same shallow heuristic
//! the teacher ships, not a reimplementation of a richer discovery system.

use crate::config::model::UcgConfig;
use crate::core::ids::hash_content;
use crate::core::paths::{build_globset, detect_language, matches_any};
use crate::model::language::LanguageKind;
use anyhow::{Result, bail};
use globset::GlobSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub repo_rel_path: String,
    pub language: Option<LanguageKind>,
    pub size: u64,
    pub is_generated: bool,
    pub blob_sha: String,
}

#[derive(Debug, Clone)]
pub struct ScanResult {
    pub root: PathBuf,
    pub files: Vec<ScannedFile>,
}

/// Walk `root`, apply ignore/generated globs and size limits, hash contents,
/// and return files sorted `(path, blob_sha)` per the ordering requirement.
pub fn scan_repo(root: &Path, cfg: &UcgConfig) -> Result<ScanResult> {
    if !root.exists() {
        bail!("fs_scan: root does not exist: {}", root.display());
    }
    info!(root = %root.display(), "fs_scan: start");

    let ignore_globs: Option<GlobSet> = build_globset(&cfg.filters.ignore_globs);
    let generated_globs: Option<GlobSet> = if cfg.filters.exclude_generated {
        build_globset(&cfg.filters.generated_globs)
    } else {
        None
    };

    let mut skipped_ignored = 0usize;
    let mut skipped_too_big = 0usize;
    let mut skipped_generated = 0usize;
    let mut files = Vec::<ScannedFile>::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(keep_entry);

    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();

        if matches_any(path, ignore_globs.as_ref()) {
            skipped_ignored += 1;
            debug!(path = %path.display(), "fs_scan: ignored by glob");
            continue;
        }

        let is_generated = matches_any(path, generated_globs.as_ref());
        if cfg.filters.exclude_generated && is_generated {
            skipped_generated += 1;
            debug!(path = %path.display(), "fs_scan: excluded as generated");
            continue;
        }

        let meta = match fs::metadata(path) {
            Ok(m) => m,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "fs_scan: metadata failed");
                continue;
            }
        };
        let size = meta.len();
        if size as usize > cfg.limits.max_file_bytes {
            skipped_too_big += 1;
            debug!(path = %path.display(), size, "fs_scan: too large, skipping");
            continue;
        }

        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "fs_scan: read failed");
                continue;
            }
        };

        let language = detect_language(path);
        let repo_rel_path = crate::core::paths::normalize_repo_rel_str(root, path);
        let blob_sha = hash_content(&bytes);

        files.push(ScannedFile {
            path: path.to_path_buf(),
            repo_rel_path,
            language,
            size,
            is_generated,
            blob_sha,
        });
    }

    // Deterministic processing order (spec §5): lexicographic (path, blob_sha).
    files.sort_by(|a, b| (&a.repo_rel_path, &a.blob_sha).cmp(&(&b.repo_rel_path, &b.blob_sha)));

    info!(
        total = files.len(),
        ignored = skipped_ignored,
        too_big = skipped_too_big,
        generated = skipped_generated,
        "fs_scan: done"
    );

    Ok(ScanResult {
        root: root.to_path_buf(),
        files,
    })
}

fn keep_entry(entry: &DirEntry) -> bool {
    if entry.file_type().is_dir() {
        if let Some(name) = entry.file_name().to_str() {
            return !matches!(name, ".git" | "node_modules" | "build" | "target" | ".venv" | "__pycache__");
        }
    }
    true
}
