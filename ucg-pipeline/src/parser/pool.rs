//! A bounded thread pool whose sole job is parse-stream production.
//!
//! Per spec §5: parser drivers run on a fixed-size pool and results are
//! yielded in strict input order via a sliding window keyed by submission
//! index. Builders themselves stay single-threaded and synchronous; only
//! this pool is concurrent.

use crate::core::fs_scan::ScannedFile;
use crate::model::event::{FileMeta, ParseStream};
use crate::model::language::LanguageKind;
use crate::parser::driver::{ParserDriver, TreeSitterDriver};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread;

pub struct PoolOutcome {
    pub index: usize,
    pub file: ScannedFile,
    /// `None` when the file could not even be read (IO error); the
    /// orchestrator turns this into an IO_ERROR anomaly and still accounts
    /// for the file in `files_total`.
    pub stream: Option<ParseStream>,
    pub read_error: Option<String>,
}

/// Run parse jobs for `files` on `worker_count` threads, returning results in
/// the exact order `files` was given (the sliding window is internal: each
/// call to `next()` blocks until the result at the next expected index is
/// ready, even if later indices finished first).
pub fn run(files: Vec<ScannedFile>, worker_count: usize, run_id: &str, config_hash: &str) -> Vec<PoolOutcome> {
    let total = files.len();
    if total == 0 {
        return Vec::new();
    }
    let worker_count = worker_count.max(1).min(total);

    let jobs: Mutex<VecDeque<(usize, ScannedFile)>> =
        Mutex::new(files.into_iter().enumerate().collect());
    let jobs = Arc::new(jobs);
    let results: Mutex<BTreeMap<usize, PoolOutcome>> = Mutex::new(BTreeMap::new());
    let results = Arc::new(results);

    thread::scope(|scope| {
        for _ in 0..worker_count {
            let jobs = Arc::clone(&jobs);
            let results = Arc::clone(&results);
            let run_id = run_id.to_string();
            let config_hash = config_hash.to_string();
            scope.spawn(move || loop {
                let next = jobs.lock().expect("jobs mutex poisoned").pop_front();
                let Some((index, file)) = next else {
                    break;
                };
                let outcome = process_one(index, file, &run_id, &config_hash);
                results.lock().expect("results mutex poisoned").insert(index, outcome);
            });
        }
    });

    let mut results = Arc::try_unwrap(results)
        .unwrap_or_else(|_| panic!("worker threads still hold a reference"))
        .into_inner()
        .expect("results mutex poisoned");

    let mut ordered = Vec::with_capacity(total);
    for idx in 0..total {
        if let Some(outcome) = results.remove(&idx) {
            ordered.push(outcome);
        }
    }
    ordered
}

fn process_one(index: usize, file: ScannedFile, run_id: &str, config_hash: &str) -> PoolOutcome {
    let source = match std::fs::read_to_string(&file.path) {
        Ok(s) => s,
        Err(err) => {
            return PoolOutcome {
                index,
                file,
                stream: None,
                read_error: Some(err.to_string()),
            };
        }
    };

    let Some(lang) = file.language else {
        return PoolOutcome {
            index,
            file,
            stream: None,
            read_error: Some("LangUnknown".to_string()),
        };
    };

    let meta = FileMeta {
        path: file.repo_rel_path.clone(),
        real_path: file.path.to_string_lossy().to_string(),
        blob_sha: file.blob_sha.clone(),
        size_bytes: file.size,
        mtime_ns: 0,
        run_id: run_id.to_string(),
        config_hash: config_hash.to_string(),
        is_text: true,
        encoding: "utf-8".to_string(),
        encoding_confidence: 1.0,
        language: Some(lang),
        flags: BTreeSet::new(),
    };

    let driver = TreeSitterDriver::new(lang);
    let stream = match driver.parse(&meta, &source) {
        Ok(s) => Some(s),
        Err(err) => {
            return PoolOutcome {
                index,
                file,
                stream: None,
                read_error: Some(err.to_string()),
            };
        }
    };

    PoolOutcome {
        index,
        file,
        stream,
        read_error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_empty_output() {
        let out = run(Vec::new(), 4, "run1", "cfg1");
        assert!(out.is_empty());
    }

    #[test]
    fn preserves_submission_order_regardless_of_thread_count() {
        let files: Vec<ScannedFile> = (0..5)
            .map(|i| ScannedFile {
                path: format!("/tmp/does-not-exist-{i}.py").into(),
                repo_rel_path: format!("f{i}.py"),
                language: Some(LanguageKind::Python),
                size: 0,
                is_generated: false,
                blob_sha: format!("sha{i}"),
            })
            .collect();
        let out = run(files, 3, "run1", "cfg1");
        let order: Vec<String> = out.iter().map(|o| o.file.repo_rel_path.clone()).collect();
        assert_eq!(order, vec!["f0.py", "f1.py", "f2.py", "f3.py", "f4.py"]);
    }
}
