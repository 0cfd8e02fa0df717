//! Ties the pieces together: `fs_scan` discovers files, `parser::pool` turns
//! them into `ParseStream`s on a bounded pool, and this module runs the fixed
//! Normalizer -> CFG -> DFG -> Symbols -> Effects sequence per file into the
//! `UcgStore`. One orchestrator thread owns the store buffers; only parsing
//! is concurrent (spec §5 "Scheduling model").

use crate::builders::context::BuilderCtx;
use crate::builders::{cfg, dfg, effects, normalizer, symbols};
use crate::config::model::{FeatureFlags, Limits, UcgConfig};
use crate::core::anomaly::AnomalySink;
use crate::core::ids;
use crate::core::metrics::MetricsRegistry;
use crate::core::time;
use crate::model::event::ParseStream;
use crate::model::language::LanguageKind;
use crate::model::provenance::Provenance;
use crate::model::rows::{AnomalyKind, AnomalyRow, Emission, NodeKind, NodeRow, Severity};
use crate::parser::pool;
use crate::store::UcgStore;
use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Returned to the CLI once a run finishes: enough to print a one-line
/// status or dump as JSON, matching the "never silently discards input"
/// user-visible-behavior requirement (spec §5).
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub files_total: usize,
    pub files_parsed: usize,
    pub files_failed: usize,
    pub row_counts: BTreeMap<String, u64>,
    pub anomalies_total: u64,
    pub out_dir: PathBuf,
}

struct FileBuildOutput {
    emissions: Vec<Emission>,
    anomalies: Vec<AnomalyRow>,
}

/// Run the full pipeline over `root`, publishing the Store at `out_dir`.
pub fn run(root: &Path, out_dir: &Path, cfg: &UcgConfig, run_id: &str) -> Result<RunSummary> {
    let config_hash = cfg.config_hash();
    let scan = crate::core::fs_scan::scan_repo(root, cfg)?;
    let files_total = scan.files.len();
    info!(files_total, root = %root.display(), "orchestrator: scan complete");

    let worker_count = thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
    let outcomes = pool::run(scan.files, worker_count, run_id, &config_hash);

    let anomaly_sink = AnomalySink::new();
    let metrics = MetricsRegistry::new();
    let mut store = UcgStore::new(out_dir, &cfg.store, cfg.features.provenance_v2)?;

    let mut files_parsed = 0usize;
    let mut files_failed = 0usize;
    let timeout = Duration::from_millis(cfg.limits.per_file_timeout_ms);

    for (i, outcome) in outcomes.into_iter().enumerate() {
        metrics.incr("files_total", 1);
        let repo_rel_path = outcome.file.repo_rel_path.clone();
        let blob_sha = outcome.file.blob_sha.clone();

        let Some(stream) = outcome.stream else {
            let detail = outcome.read_error.unwrap_or_else(|| "unknown read error".to_string());
            let kind = if outcome.file.language.is_none() { AnomalyKind::LangUnknown } else { AnomalyKind::IoError };
            anomaly_sink.emit(AnomalyRow {
                path: repo_rel_path,
                blob_sha: Some(blob_sha),
                kind,
                severity: Severity::Error,
                detail,
                byte_start: None,
                byte_end: None,
                timestamp: time::now_iso8601(),
            });
            files_failed += 1;
            continue;
        };

        if !stream.ok {
            anomaly_sink.emit(AnomalyRow {
                path: repo_rel_path,
                blob_sha: Some(blob_sha),
                kind: AnomalyKind::ParseFailed,
                severity: Severity::Error,
                detail: stream.error.unwrap_or_else(|| "parse failed".to_string()),
                byte_start: None,
                byte_end: None,
                timestamp: time::now_iso8601(),
            });
            files_failed += 1;
            continue;
        }

        let lang = outcome.file.language.unwrap_or(LanguageKind::Python);
        let file_id = ids::file_id(&lang.to_string(), &blob_sha, &repo_rel_path);
        let grammar_sha = stream.driver.grammar_sha.clone();
        let source_len = stream.source.len();
        let line_count = stream.source.lines().count().max(1);

        match build_with_timeout(
            file_id.clone(),
            repo_rel_path.clone(),
            blob_sha.clone(),
            lang,
            run_id.to_string(),
            config_hash.clone(),
            grammar_sha.clone(),
            cfg.limits.clone(),
            cfg.features.clone(),
            stream,
            timeout,
        ) {
            Ok(output) => {
                for emission in output.emissions {
                    store.append(emission)?;
                }
                anomaly_sink.extend(output.anomalies);
                metrics.incr("files_parsed", 1);
                files_parsed += 1;
            }
            Err(()) => {
                warn!(path = %repo_rel_path, "orchestrator: per-file timeout, output abandoned");
                let file_node = NodeRow {
                    id: file_id,
                    kind: NodeKind::File,
                    name: Some(repo_rel_path.clone()),
                    path: repo_rel_path.clone(),
                    lang: lang.to_string(),
                    attrs_json: json!({}),
                    provenance: Provenance::new(
                        repo_rel_path.clone(),
                        blob_sha.clone(),
                        lang.to_string(),
                        grammar_sha,
                        run_id.to_string(),
                        config_hash.clone(),
                        0,
                        source_len,
                        1,
                        line_count,
                    ),
                };
                store.append(Emission::Node(file_node))?;
                anomaly_sink.emit(AnomalyRow {
                    path: repo_rel_path,
                    blob_sha: Some(blob_sha),
                    kind: AnomalyKind::Timeout,
                    severity: Severity::Error,
                    detail: format!("builder pipeline exceeded {}ms", cfg.limits.per_file_timeout_ms),
                    byte_start: None,
                    byte_end: None,
                    timestamp: time::now_iso8601(),
                });
                metrics.incr("files_failed", 1);
                files_failed += 1;
            }
        }

        if cfg.store.flush_every_n_files > 0 && (i + 1) % cfg.store.flush_every_n_files == 0 {
            store.flush_all()?;
        }
    }

    store.append_anomalies(anomaly_sink.drain())?;

    let receipt_extra = json!({
        "run_id": run_id,
        "root": root.display().to_string(),
        "files_total": files_total,
        "files_parsed": files_parsed,
        "files_failed": files_failed,
        "metrics": metrics.snapshot(),
        "anomalies_by_kind": anomaly_sink.counters_by_kind(),
        "anomalies_by_severity": anomaly_sink.counters_by_severity(),
        "timer_histograms": anomaly_sink.timer_histograms(),
    });
    let published = store.finalize(receipt_extra)?;
    let row_counts = store.row_counts();

    info!(files_total, files_parsed, files_failed, out_dir = %published.display(), "orchestrator: run complete");

    Ok(RunSummary {
        run_id: run_id.to_string(),
        files_total,
        files_parsed,
        files_failed,
        row_counts,
        anomalies_total: anomaly_sink.total(),
        out_dir: published,
    })
}

#[allow(clippy::too_many_arguments)]
fn build_with_timeout(
    file_id: String,
    path: String,
    blob_sha: String,
    lang: LanguageKind,
    run_id: String,
    config_hash: String,
    grammar_sha: String,
    limits: Limits,
    features: FeatureFlags,
    stream: ParseStream,
    timeout: Duration,
) -> Result<FileBuildOutput, ()> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let output = run_builders(file_id, path, blob_sha, lang, run_id, config_hash, grammar_sha, limits, features, stream);
        let _ = tx.send(output);
    });
    rx.recv_timeout(timeout).map_err(|_| ())
}

#[allow(clippy::too_many_arguments)]
fn run_builders(
    file_id: String,
    path: String,
    blob_sha: String,
    lang: LanguageKind,
    run_id: String,
    config_hash: String,
    grammar_sha: String,
    limits: Limits,
    features: FeatureFlags,
    stream: ParseStream,
) -> FileBuildOutput {
    let ctx = BuilderCtx::new(file_id, path, blob_sha, lang, &stream.source, run_id, config_hash, grammar_sha, limits);

    let mut emissions = Vec::new();
    let mut anomalies = Vec::new();

    let norm = normalizer::normalize(&ctx, &stream.events);
    emissions.extend(norm.emissions);
    anomalies.extend(norm.anomalies);
    if norm.aborted {
        return FileBuildOutput { emissions, anomalies };
    }

    if features.enable_cfg {
        let cfg_res = cfg::build_cfg(&ctx, &stream.events);
        emissions.extend(cfg_res.emissions);
        anomalies.extend(cfg_res.anomalies);
    }

    let alias_hints = if features.enable_dfg {
        let dfg_res = dfg::build_dfg(&ctx, &stream.events);
        emissions.extend(dfg_res.emissions);
        anomalies.extend(dfg_res.anomalies);
        dfg_res.alias_hints
    } else {
        Vec::new()
    };

    if features.enable_symbols {
        let sym_res = symbols::build_symbols(&ctx, &stream.events, &alias_hints);
        emissions.extend(sym_res.emissions);
    }

    if features.enable_effects {
        let eff_res = effects::build_effects(&ctx, &stream.events);
        emissions.extend(eff_res.emissions);
        anomalies.extend(eff_res.anomalies);
    }

    FileBuildOutput { emissions, anomalies }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::UcgConfig;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn run_over_small_repo_publishes_nodes_and_receipt() {
        let src_dir = tempdir().unwrap();
        fs::write(src_dir.path().join("a.py"), "def foo():\n    return 1\n").unwrap();
        fs::write(src_dir.path().join("b.py"), "class Bar:\n    def baz(self):\n        pass\n").unwrap();

        let out_dir = tempdir().unwrap();
        let out_path = out_dir.path().join("ucg_out");
        let cfg = UcgConfig::default();

        let summary = run(src_dir.path(), &out_path, &cfg, "run-test-1").unwrap();

        assert_eq!(summary.files_total, 2);
        assert_eq!(summary.files_parsed, 2);
        assert_eq!(summary.files_failed, 0);
        assert!(out_path.join("run_receipt.json").exists());
    }

    #[test]
    fn unparseable_language_is_counted_as_failed() {
        let src_dir = tempdir().unwrap();
        fs::write(src_dir.path().join("notes.txt"), "just text, no language\n").unwrap();

        let out_dir = tempdir().unwrap();
        let out_path = out_dir.path().join("ucg_out");
        let cfg = UcgConfig::default();

        let summary = run(src_dir.path(), &out_path, &cfg, "run-test-2").unwrap();

        assert_eq!(summary.files_total, 1);
        assert_eq!(summary.files_parsed, 0);
        assert_eq!(summary.files_failed, 1);
    }
}
