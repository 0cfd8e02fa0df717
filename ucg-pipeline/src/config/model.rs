//! Configuration data structures for the UCG pipeline.
//!
//! Split into logical groups for maintenance, mirroring the teacher's own
//! `GraphConfig` shape:
//! - [`UcgConfig`]: top-level container for all config groups
//! - [`Filters`]: which files to include/exclude
//! - [`Limits`]: size/depth/time guardrails for the builders
//! - [`StoreConfig`]: Store flush/compression/batch settings
//! - [`FeatureFlags`]: toggle optional builders and the v2 provenance sidecar

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UcgConfig {
    pub filters: Filters,
    pub limits: Limits,
    pub store: StoreConfig,
    pub features: FeatureFlags,
}

impl Default for UcgConfig {
    fn default() -> Self {
        Self {
            filters: Filters::default(),
            limits: Limits::default(),
            store: StoreConfig::default(),
            features: FeatureFlags::default(),
        }
    }
}

impl UcgConfig {
    /// Load configuration from `UCG_*` environment variables, falling back to
    /// defaults. Unknown variables are ignored; parse errors fall back to
    /// defaults. `_root` is accepted for parity with a future config-file
    /// lookup (none exists yet, same as the teacher's own TODO).
    pub fn load_from_env_or_default(_root: &Path) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(v) = env_usize("UCG_MAX_FILE_BYTES") {
            cfg.limits.max_file_bytes = v;
        }
        if let Some(v) = env_usize("UCG_MAX_SCOPE_DEPTH") {
            cfg.limits.max_scope_depth = v;
        }
        if let Some(v) = env_usize("UCG_MAX_PENDING_CONSTRUCTS") {
            cfg.limits.max_pending_constructs = v;
        }
        if let Some(v) = env_usize("UCG_MAX_CFG_BLOCKS_PER_FUNCTION") {
            cfg.limits.max_cfg_blocks_per_function = v;
        }
        if let Some(v) = env_usize("UCG_MAX_DFG_DEFS_PER_SCOPE") {
            cfg.limits.max_dfg_defs_per_scope = v;
        }
        if let Some(v) = env_usize("UCG_MAX_DFG_USES_PER_SCOPE") {
            cfg.limits.max_dfg_uses_per_scope = v;
        }
        if let Some(v) = env_u64("UCG_PER_FILE_TIMEOUT_MS") {
            cfg.limits.per_file_timeout_ms = v;
        }

        if let Some(v) = env_bool("UCG_EXCLUDE_GENERATED") {
            cfg.filters.exclude_generated = v;
        }
        if let Some(v) = env_list("UCG_GENERATED_GLOBS") {
            cfg.filters.generated_globs = v;
        }
        if let Some(v) = env_list("UCG_IGNORE_GLOBS") {
            cfg.filters.ignore_globs = v;
        }

        if let Some(v) = env_i32("UCG_ZSTD_LEVEL") {
            cfg.store.zstd_level = v;
        }
        if let Some(v) = env_usize("UCG_ROLL_ROWS") {
            cfg.store.roll_rows = v;
        }
        if let Some(v) = env_u64("UCG_MAX_STORE_BYTES") {
            cfg.store.max_store_bytes = Some(v);
        }
        if let Some(v) = env_usize("UCG_FLUSH_EVERY_N_FILES") {
            cfg.store.flush_every_n_files = v;
        }
        if let Some(v) = env_usize("UCG_NODE_EDGE_BATCH") {
            cfg.store.node_edge_batch = v;
        }
        if let Some(v) = env_usize("UCG_CFG_BATCH") {
            cfg.store.cfg_batch = v;
        }
        if let Some(v) = env_usize("UCG_DFG_BATCH") {
            cfg.store.dfg_batch = v;
        }
        if let Some(v) = env_usize("UCG_SYM_BATCH") {
            cfg.store.sym_batch = v;
        }
        if let Some(v) = env_usize("UCG_EFF_BATCH") {
            cfg.store.eff_batch = v;
        }

        if let Some(v) = env_bool("UCG_ENABLE_CFG") {
            cfg.features.enable_cfg = v;
        }
        if let Some(v) = env_bool("UCG_ENABLE_DFG") {
            cfg.features.enable_dfg = v;
        }
        if let Some(v) = env_bool("UCG_ENABLE_SYMBOLS") {
            cfg.features.enable_symbols = v;
        }
        if let Some(v) = env_bool("UCG_ENABLE_EFFECTS") {
            cfg.features.enable_effects = v;
        }
        if let Some(v) = env_bool("UCG_PROVENANCE_V2") {
            cfg.features.provenance_v2 = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Basic sanity validation; ensures limits and options are internally
    /// consistent before the pipeline starts burning CPU on a bad config.
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_file_bytes == 0 {
            return Err(anyhow!("max_file_bytes must be greater than 0"));
        }
        if self.store.roll_rows == 0 {
            return Err(anyhow!("roll_rows must be greater than 0"));
        }
        if !(1..=22).contains(&self.store.zstd_level) {
            return Err(anyhow!("zstd_level must be within 1..=22, got {}", self.store.zstd_level));
        }
        if self.limits.max_scope_depth == 0 {
            return Err(anyhow!("max_scope_depth must be greater than 0"));
        }
        Ok(())
    }

    /// Stable hash over the settings that influence emitted IDs/content, used
    /// as `config_hash` in every provenance record.
    pub fn config_hash(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        crate::core::ids::hash_content(canonical.as_bytes())
    }
}

/// File-level filtering rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filters {
    pub exclude_generated: bool,
    pub generated_globs: Vec<String>,
    pub ignore_globs: Vec<String>,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            exclude_generated: true,
            generated_globs: vec![
                "**/*.g.py".to_string(),
                "**/*_pb2.py".to_string(),
                "**/*.generated.ts".to_string(),
            ],
            ignore_globs: vec![
                "**/.git/**".to_string(),
                "**/node_modules/**".to_string(),
                "**/build/**".to_string(),
                "**/target/**".to_string(),
                "**/.venv/**".to_string(),
                "**/__pycache__/**".to_string(),
            ],
        }
    }
}

/// Guardrails for the builders: scope depth, pending-construct stack size,
/// CFG block cap, DFG def/use caps. Exceeding one of these aborts the
/// relevant builder for the current file and emits a MEMORY_LIMIT anomaly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    pub max_file_bytes: usize,
    pub max_scope_depth: usize,
    pub max_pending_constructs: usize,
    pub max_cfg_blocks_per_function: usize,
    pub max_dfg_defs_per_scope: usize,
    pub max_dfg_uses_per_scope: usize,
    pub per_file_timeout_ms: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_file_bytes: 2 * 1024 * 1024,
            max_scope_depth: 256,
            max_pending_constructs: 4096,
            max_cfg_blocks_per_function: 2048,
            max_dfg_defs_per_scope: 8192,
            max_dfg_uses_per_scope: 16384,
            per_file_timeout_ms: 10_000,
        }
    }
}

/// Store flush/compression/batch settings (spec §6 "Configuration options").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub zstd_level: i32,
    pub roll_rows: usize,
    pub max_store_bytes: Option<u64>,
    pub flush_every_n_files: usize,
    pub node_edge_batch: usize,
    pub cfg_batch: usize,
    pub dfg_batch: usize,
    pub sym_batch: usize,
    pub eff_batch: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            zstd_level: 3,
            roll_rows: 2_000_000,
            max_store_bytes: None,
            flush_every_n_files: 200,
            node_edge_batch: 4096,
            cfg_batch: 4096,
            dfg_batch: 4096,
            sym_batch: 4096,
            eff_batch: 4096,
        }
    }
}

/// Toggle optional builders and the v2 provenance sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub enable_cfg: bool,
    pub enable_dfg: bool,
    pub enable_symbols: bool,
    pub enable_effects: bool,
    pub provenance_v2: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_cfg: true,
            enable_dfg: true,
            enable_symbols: true,
            enable_effects: true,
            provenance_v2: false,
        }
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env::var(key).ok().and_then(|s| match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    })
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_i32(key: &str) -> Option<i32> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    let raw = env::var(key).ok()?;
    Some(
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(UcgConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_roll_rows_rejected() {
        let mut cfg = UcgConfig::default();
        cfg.store.roll_rows = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_hash_is_deterministic() {
        let a = UcgConfig::default().config_hash();
        let b = UcgConfig::default().config_hash();
        assert_eq!(a, b);
    }
}
