//! Streaming Parquet store for UCG rows, grounded on `ucg_store.py`'s
//! `UcgStore` class: adaptive per-table buffers, ZSTD compression, verified
//! flushes (write -> read back -> compare row count), a transaction log, and
//! atomic staging -> publish.

pub mod buffer;
pub mod convert;
pub mod schema;

use crate::config::model::StoreConfig;
use crate::model::rows::{AnomalyRow, Emission};
use crate::store::buffer::AdaptiveRowBuffer;
use anyhow::{Context, Result, bail};
use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

const SCHEMA_VERSION: &str = schema::SCHEMA_VERSION;
const TABLES: &[&str] = &[
    "nodes",
    "edges",
    "cfg_blocks",
    "cfg_edges",
    "dfg_nodes",
    "dfg_edges",
    "symbols",
    "aliases",
    "effects",
    "anomalies",
];

#[derive(Default, Serialize)]
struct TableCounters {
    file_idx: u32,
    rows_total: u64,
}

pub struct UcgStore {
    out_dir: PathBuf,
    staging: PathBuf,
    zstd_level: i32,
    roll_rows: usize,
    max_bytes: Option<u64>,
    provenance_v2: bool,

    node_schema: SchemaRef,
    edge_schema: SchemaRef,
    cfg_block_schema: SchemaRef,
    cfg_edge_schema: SchemaRef,
    dfg_node_schema: SchemaRef,
    dfg_edge_schema: SchemaRef,
    symbol_schema: SchemaRef,
    alias_schema: SchemaRef,
    effect_schema: SchemaRef,
    anomaly_schema: SchemaRef,

    node_buf: AdaptiveRowBuffer<crate::model::rows::NodeRow>,
    edge_buf: AdaptiveRowBuffer<crate::model::rows::EdgeRow>,
    cfg_block_buf: AdaptiveRowBuffer<crate::model::rows::CfgBlockRow>,
    cfg_edge_buf: AdaptiveRowBuffer<crate::model::rows::CfgEdgeRow>,
    dfg_node_buf: AdaptiveRowBuffer<crate::model::rows::DfgNodeRow>,
    dfg_edge_buf: AdaptiveRowBuffer<crate::model::rows::DfgEdgeRow>,
    symbol_buf: AdaptiveRowBuffer<crate::model::rows::SymbolRow>,
    alias_buf: AdaptiveRowBuffer<crate::model::rows::AliasRow>,
    effect_buf: AdaptiveRowBuffer<crate::model::rows::EffectRow>,
    anomaly_buf: AdaptiveRowBuffer<AnomalyRow>,

    nodes: TableCounters,
    edges: TableCounters,
    cfg_blocks: TableCounters,
    cfg_edges: TableCounters,
    dfg_nodes: TableCounters,
    dfg_edges: TableCounters,
    symbols: TableCounters,
    aliases: TableCounters,
    effects: TableCounters,
    anomalies: TableCounters,

    bytes_written: u64,
    transaction_log: Vec<String>,
}

impl UcgStore {
    pub fn new(out_dir: impl Into<PathBuf>, cfg: &StoreConfig, provenance_v2: bool) -> Result<Self> {
        let out_dir = out_dir.into();
        let staging = PathBuf::from(format!("{}.staging", out_dir.display()));

        if staging.exists() {
            fs::remove_dir_all(&staging).context("clearing stale staging directory")?;
        }
        for table in TABLES {
            fs::create_dir_all(staging.join(table)).with_context(|| format!("creating staging/{table}"))?;
        }

        let max_bytes = cfg.max_store_bytes;
        let roll_rows = cfg.roll_rows;

        Ok(Self {
            out_dir,
            staging,
            zstd_level: cfg.zstd_level,
            roll_rows,
            max_bytes,
            provenance_v2,

            node_schema: schema::node_schema(provenance_v2),
            edge_schema: schema::edge_schema(provenance_v2),
            cfg_block_schema: schema::cfg_block_schema(provenance_v2),
            cfg_edge_schema: schema::cfg_edge_schema(provenance_v2),
            dfg_node_schema: schema::dfg_node_schema(provenance_v2),
            dfg_edge_schema: schema::dfg_edge_schema(provenance_v2),
            symbol_schema: schema::symbol_schema(provenance_v2),
            alias_schema: schema::alias_schema(provenance_v2),
            effect_schema: schema::effect_schema(provenance_v2),
            anomaly_schema: schema::anomaly_schema(),

            node_buf: AdaptiveRowBuffer::new(roll_rows, max_bytes.map(|b| b as usize)),
            edge_buf: AdaptiveRowBuffer::new(roll_rows, max_bytes.map(|b| b as usize)),
            cfg_block_buf: AdaptiveRowBuffer::new(roll_rows, max_bytes.map(|b| b as usize)),
            cfg_edge_buf: AdaptiveRowBuffer::new(roll_rows, max_bytes.map(|b| b as usize)),
            dfg_node_buf: AdaptiveRowBuffer::new(roll_rows, max_bytes.map(|b| b as usize)),
            dfg_edge_buf: AdaptiveRowBuffer::new(roll_rows, max_bytes.map(|b| b as usize)),
            symbol_buf: AdaptiveRowBuffer::new(roll_rows, max_bytes.map(|b| b as usize)),
            alias_buf: AdaptiveRowBuffer::new(roll_rows, max_bytes.map(|b| b as usize)),
            effect_buf: AdaptiveRowBuffer::new(roll_rows, max_bytes.map(|b| b as usize)),
            anomaly_buf: AdaptiveRowBuffer::new(roll_rows, max_bytes.map(|b| b as usize)),

            nodes: TableCounters::default(),
            edges: TableCounters::default(),
            cfg_blocks: TableCounters::default(),
            cfg_edges: TableCounters::default(),
            dfg_nodes: TableCounters::default(),
            dfg_edges: TableCounters::default(),
            symbols: TableCounters::default(),
            aliases: TableCounters::default(),
            effects: TableCounters::default(),
            anomalies: TableCounters::default(),

            bytes_written: 0,
            transaction_log: Vec::new(),
        })
    }

    /// Append a single builder emission, rolling the owning table's buffer
    /// if it has reached its row or byte threshold.
    pub fn append(&mut self, emission: Emission) -> Result<()> {
        match emission {
            Emission::Node(row) => {
                let hint = row.attrs_json.to_string().len() + row.name.as_deref().unwrap_or("").len() + 128;
                self.node_buf.add(row, || hint);
                if self.node_buf.should_roll() {
                    self.flush_nodes()?;
                }
            }
            Emission::Edge(row) => {
                let hint = row.attrs_json.to_string().len() + 128;
                self.edge_buf.add(row, || hint);
                if self.edge_buf.should_roll() {
                    self.flush_edges()?;
                }
            }
            Emission::CfgBlock(row) => {
                let hint = row.attrs_json.to_string().len() + 96;
                self.cfg_block_buf.add(row, || hint);
                if self.cfg_block_buf.should_roll() {
                    self.flush_cfg_blocks()?;
                }
            }
            Emission::CfgEdge(row) => {
                self.cfg_edge_buf.add(row, || 96);
                if self.cfg_edge_buf.should_roll() {
                    self.flush_cfg_edges()?;
                }
            }
            Emission::DfgNode(row) => {
                let hint = row.attrs_json.to_string().len() + row.name.as_deref().unwrap_or("").len() + 96;
                self.dfg_node_buf.add(row, || hint);
                if self.dfg_node_buf.should_roll() {
                    self.flush_dfg_nodes()?;
                }
            }
            Emission::DfgEdge(row) => {
                self.dfg_edge_buf.add(row, || 96);
                if self.dfg_edge_buf.should_roll() {
                    self.flush_dfg_edges()?;
                }
            }
            Emission::Symbol(row) => {
                let hint = row.attrs_json.to_string().len() + row.name.len() + 96;
                self.symbol_buf.add(row, || hint);
                if self.symbol_buf.should_roll() {
                    self.flush_symbols()?;
                }
            }
            Emission::Alias(row) => {
                let hint = row.attrs_json.to_string().len() + 96;
                self.alias_buf.add(row, || hint);
                if self.alias_buf.should_roll() {
                    self.flush_aliases()?;
                }
            }
            Emission::Effect(row) => {
                let hint = row.attrs_json.to_string().len() + row.carrier.len() + 96;
                self.effect_buf.add(row, || hint);
                if self.effect_buf.should_roll() {
                    self.flush_effects()?;
                }
            }
        }

        if let Some(cap) = self.max_bytes {
            if self.bytes_written > cap {
                bail!("UcgStore exceeded max_bytes={cap} (written={})", self.bytes_written);
            }
        }
        Ok(())
    }

    /// Rows persisted per table so far (post-flush totals only; buffered-but-
    /// not-yet-rolled rows aren't counted until their buffer flushes).
    pub fn row_counts(&self) -> std::collections::BTreeMap<String, u64> {
        std::collections::BTreeMap::from([
            ("nodes".to_string(), self.nodes.rows_total),
            ("edges".to_string(), self.edges.rows_total),
            ("cfg_blocks".to_string(), self.cfg_blocks.rows_total),
            ("cfg_edges".to_string(), self.cfg_edges.rows_total),
            ("dfg_nodes".to_string(), self.dfg_nodes.rows_total),
            ("dfg_edges".to_string(), self.dfg_edges.rows_total),
            ("symbols".to_string(), self.symbols.rows_total),
            ("aliases".to_string(), self.aliases.rows_total),
            ("effects".to_string(), self.effects.rows_total),
            ("anomalies".to_string(), self.anomalies.rows_total),
        ])
    }

    pub fn append_anomalies(&mut self, rows: impl IntoIterator<Item = AnomalyRow>) -> Result<()> {
        for row in rows {
            self.anomaly_buf.add(row, || 128);
            if self.anomaly_buf.should_roll() {
                self.flush_anomalies()?;
            }
        }
        Ok(())
    }

    pub fn flush_all(&mut self) -> Result<()> {
        self.flush_nodes()?;
        self.flush_edges()?;
        self.flush_cfg_blocks()?;
        self.flush_cfg_edges()?;
        self.flush_dfg_nodes()?;
        self.flush_dfg_edges()?;
        self.flush_symbols()?;
        self.flush_aliases()?;
        self.flush_effects()?;
        self.flush_anomalies()?;
        Ok(())
    }

    fn flush_nodes(&mut self) -> Result<()> {
        if self.node_buf.is_empty() {
            return Ok(());
        }
        let batch = convert::node_rows_to_batch(&self.node_schema, self.node_buf.rows(), self.provenance_v2)?;
        let rows = self.verified_write("nodes", self.nodes.file_idx, batch)?;
        self.nodes.rows_total += rows;
        self.nodes.file_idx += 1;
        self.node_buf.clear();
        Ok(())
    }

    fn flush_edges(&mut self) -> Result<()> {
        if self.edge_buf.is_empty() {
            return Ok(());
        }
        let batch = convert::edge_rows_to_batch(&self.edge_schema, self.edge_buf.rows(), self.provenance_v2)?;
        let rows = self.verified_write("edges", self.edges.file_idx, batch)?;
        self.edges.rows_total += rows;
        self.edges.file_idx += 1;
        self.edge_buf.clear();
        Ok(())
    }

    fn flush_cfg_blocks(&mut self) -> Result<()> {
        if self.cfg_block_buf.is_empty() {
            return Ok(());
        }
        let batch = convert::cfg_block_rows_to_batch(&self.cfg_block_schema, self.cfg_block_buf.rows(), self.provenance_v2)?;
        let rows = self.verified_write("cfg_blocks", self.cfg_blocks.file_idx, batch)?;
        self.cfg_blocks.rows_total += rows;
        self.cfg_blocks.file_idx += 1;
        self.cfg_block_buf.clear();
        Ok(())
    }

    fn flush_cfg_edges(&mut self) -> Result<()> {
        if self.cfg_edge_buf.is_empty() {
            return Ok(());
        }
        let batch = convert::cfg_edge_rows_to_batch(&self.cfg_edge_schema, self.cfg_edge_buf.rows(), self.provenance_v2)?;
        let rows = self.verified_write("cfg_edges", self.cfg_edges.file_idx, batch)?;
        self.cfg_edges.rows_total += rows;
        self.cfg_edges.file_idx += 1;
        self.cfg_edge_buf.clear();
        Ok(())
    }

    fn flush_dfg_nodes(&mut self) -> Result<()> {
        if self.dfg_node_buf.is_empty() {
            return Ok(());
        }
        let batch = convert::dfg_node_rows_to_batch(&self.dfg_node_schema, self.dfg_node_buf.rows(), self.provenance_v2)?;
        let rows = self.verified_write("dfg_nodes", self.dfg_nodes.file_idx, batch)?;
        self.dfg_nodes.rows_total += rows;
        self.dfg_nodes.file_idx += 1;
        self.dfg_node_buf.clear();
        Ok(())
    }

    fn flush_dfg_edges(&mut self) -> Result<()> {
        if self.dfg_edge_buf.is_empty() {
            return Ok(());
        }
        let batch = convert::dfg_edge_rows_to_batch(&self.dfg_edge_schema, self.dfg_edge_buf.rows(), self.provenance_v2)?;
        let rows = self.verified_write("dfg_edges", self.dfg_edges.file_idx, batch)?;
        self.dfg_edges.rows_total += rows;
        self.dfg_edges.file_idx += 1;
        self.dfg_edge_buf.clear();
        Ok(())
    }

    fn flush_symbols(&mut self) -> Result<()> {
        if self.symbol_buf.is_empty() {
            return Ok(());
        }
        let batch = convert::symbol_rows_to_batch(&self.symbol_schema, self.symbol_buf.rows(), self.provenance_v2)?;
        let rows = self.verified_write("symbols", self.symbols.file_idx, batch)?;
        self.symbols.rows_total += rows;
        self.symbols.file_idx += 1;
        self.symbol_buf.clear();
        Ok(())
    }

    fn flush_aliases(&mut self) -> Result<()> {
        if self.alias_buf.is_empty() {
            return Ok(());
        }
        let batch = convert::alias_rows_to_batch(&self.alias_schema, self.alias_buf.rows(), self.provenance_v2)?;
        let rows = self.verified_write("aliases", self.aliases.file_idx, batch)?;
        self.aliases.rows_total += rows;
        self.aliases.file_idx += 1;
        self.alias_buf.clear();
        Ok(())
    }

    fn flush_effects(&mut self) -> Result<()> {
        if self.effect_buf.is_empty() {
            return Ok(());
        }
        let batch = convert::effect_rows_to_batch(&self.effect_schema, self.effect_buf.rows(), self.provenance_v2)?;
        let rows = self.verified_write("effects", self.effects.file_idx, batch)?;
        self.effects.rows_total += rows;
        self.effects.file_idx += 1;
        self.effect_buf.clear();
        Ok(())
    }

    fn flush_anomalies(&mut self) -> Result<()> {
        if self.anomaly_buf.is_empty() {
            return Ok(());
        }
        let batch = convert::anomaly_rows_to_batch(&self.anomaly_schema, self.anomaly_buf.rows())?;
        let rows = self.verified_write("anomalies", self.anomalies.file_idx, batch)?;
        self.anomalies.rows_total += rows;
        self.anomalies.file_idx += 1;
        self.anomaly_buf.clear();
        Ok(())
    }

    /// Write `batch` to `<staging>/<table>/ucg_<table>_<idx>.parquet`,
    /// appending `schema_version` if absent, then read it back and compare
    /// row counts; delete the partial file and fail hard on any mismatch.
    fn verified_write(&mut self, table: &str, idx: u32, batch: RecordBatch) -> Result<u64> {
        let batch = convert::with_schema_version_column(batch)?;
        let path = self.staging.join(table).join(format!("ucg_{table}_{idx:05}.parquet"));

        let result = (|| -> Result<u64> {
            let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
            let props = WriterProperties::builder()
                .set_compression(Compression::ZSTD(ZstdLevel::try_new(self.zstd_level)?))
                .set_dictionary_enabled(true)
                .build();
            let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
            writer.write(&batch)?;
            writer.close()?;

            let metadata = fs::metadata(&path)?;
            if metadata.len() == 0 {
                bail!("wrote zero-byte parquet file: {}", path.display());
            }

            let read_back = File::open(&path)?;
            let reader = SerializedFileReader::new(read_back)?;
            let read_rows = reader.metadata().file_metadata().num_rows() as u64;
            if read_rows != batch.num_rows() as u64 {
                bail!("row count mismatch for {}: wrote {}, read back {}", path.display(), batch.num_rows(), read_rows);
            }

            self.bytes_written += metadata.len();
            Ok(read_rows)
        })();

        match result {
            Ok(rows) => {
                self.transaction_log.push(format!("wrote_{table}:{}", path.file_name().unwrap().to_string_lossy()));
                info!(table, rows, path = %path.display(), "ucg_store: flushed table");
                Ok(rows)
            }
            Err(err) => {
                let _ = fs::remove_file(&path);
                warn!(table, path = %path.display(), error = %err, "ucg_store: verified write failed, partial file removed");
                Err(err)
            }
        }
    }

    /// Flush remaining buffers, write the receipt/catalog/schema-hint files,
    /// compute integrity hashes, and atomically publish staging into
    /// `out_dir`. Returns the published directory.
    pub fn finalize(&mut self, extra_receipt_fields: serde_json::Value) -> Result<PathBuf> {
        self.flush_all()?;

        let created_at_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();

        let mut receipt = serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "nodes_rows": self.nodes.rows_total,
            "edges_rows": self.edges.rows_total,
            "cfg_blocks_rows": self.cfg_blocks.rows_total,
            "cfg_edges_rows": self.cfg_edges.rows_total,
            "dfg_nodes_rows": self.dfg_nodes.rows_total,
            "dfg_edges_rows": self.dfg_edges.rows_total,
            "symbols_rows": self.symbols.rows_total,
            "aliases_rows": self.aliases.rows_total,
            "effects_rows": self.effects.rows_total,
            "anomaly_rows": self.anomalies.rows_total,
            "bytes_written": self.bytes_written,
            "compression": { "algorithm": "zstd", "level": self.zstd_level },
            "files": {
                "nodes": self.nodes.file_idx,
                "edges": self.edges.file_idx,
                "cfg_blocks": self.cfg_blocks.file_idx,
                "cfg_edges": self.cfg_edges.file_idx,
                "dfg_nodes": self.dfg_nodes.file_idx,
                "dfg_edges": self.dfg_edges.file_idx,
                "symbols": self.symbols.file_idx,
                "aliases": self.aliases.file_idx,
                "effects": self.effects.file_idx,
                "anomalies": self.anomalies.file_idx,
            },
            "created_at_epoch": created_at_epoch,
            "transaction_log": self.transaction_log,
            "provenance_v2": self.provenance_v2,
        });
        if let serde_json::Value::Object(extra) = extra_receipt_fields {
            if let serde_json::Value::Object(map) = &mut receipt {
                map.extend(extra);
            }
        }
        receipt["integrity"] = serde_json::to_value(self.compute_integrity_hashes()?)?;

        fs::write(self.staging.join("run_receipt.json"), serde_json::to_string_pretty(&receipt)?)
            .context("writing run_receipt.json")?;

        self.write_query_hints()?;
        self.atomic_publish()
    }

    fn compute_integrity_hashes(&self) -> Result<std::collections::BTreeMap<String, String>> {
        let mut hashes = std::collections::BTreeMap::new();
        for table in TABLES {
            let dir = self.staging.join(table);
            if !dir.exists() {
                continue;
            }
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                    continue;
                }
                let bytes = fs::read(&path)?;
                let mut hasher = Sha256::new();
                hasher.update(&bytes);
                let digest = hasher.finalize();
                let rel = path.strip_prefix(&self.staging).unwrap_or(&path);
                hashes.insert(rel.to_string_lossy().replace('\\', "/"), format!("{digest:x}"));
            }
        }
        Ok(hashes)
    }

    fn write_query_hints(&self) -> Result<()> {
        let catalog = serde_json::json!({
            "tables": {
                "nodes": { "path": "nodes/*.parquet", "row_count": self.nodes.rows_total },
                "edges": { "path": "edges/*.parquet", "row_count": self.edges.rows_total },
                "cfg_blocks": { "path": "cfg_blocks/*.parquet", "row_count": self.cfg_blocks.rows_total },
                "cfg_edges": { "path": "cfg_edges/*.parquet", "row_count": self.cfg_edges.rows_total },
                "dfg_nodes": { "path": "dfg_nodes/*.parquet", "row_count": self.dfg_nodes.rows_total },
                "dfg_edges": { "path": "dfg_edges/*.parquet", "row_count": self.dfg_edges.rows_total },
                "symbols": { "path": "symbols/*.parquet", "row_count": self.symbols.rows_total },
                "aliases": { "path": "aliases/*.parquet", "row_count": self.aliases.rows_total },
                "effects": { "path": "effects/*.parquet", "row_count": self.effects.rows_total },
                "anomalies": { "path": "anomalies/*.parquet", "row_count": self.anomalies.rows_total },
            }
        });
        fs::write(self.staging.join("catalog.json"), serde_json::to_string_pretty(&catalog)?).context("writing catalog.json")?;

        let sql = [
            "-- Auto-generated UCG schema for DuckDB".to_string(),
            TABLES
                .iter()
                .map(|t| format!("CREATE TABLE {t} AS SELECT * FROM read_parquet('{t}/*.parquet');"))
                .collect::<Vec<_>>()
                .join("\n"),
            String::new(),
            "-- Suggested indexes".to_string(),
            "CREATE INDEX idx_nodes_kind ON nodes(kind);".to_string(),
            "CREATE INDEX idx_nodes_path ON nodes(path);".to_string(),
            "CREATE INDEX idx_edges_src ON edges(src_id);".to_string(),
            "CREATE INDEX idx_edges_dst ON edges(dst_id);".to_string(),
        ]
        .join("\n");
        fs::write(self.staging.join("schema.sql"), sql).context("writing schema.sql")?;
        Ok(())
    }

    fn atomic_publish(&self) -> Result<PathBuf> {
        if self.out_dir.exists() {
            let backup = PathBuf::from(format!("{}.bak", self.out_dir.display()));
            if backup.exists() {
                fs::remove_dir_all(&backup).context("clearing stale .bak directory")?;
            }
            fs::rename(&self.out_dir, &backup).context("moving existing out_dir aside")?;
        }
        if let Some(parent) = self.out_dir.parent() {
            fs::create_dir_all(parent).context("creating out_dir parent")?;
        }
        fs::rename(&self.staging, &self.out_dir).context("publishing staging into out_dir")?;
        info!(out_dir = %self.out_dir.display(), "ucg_store: published");
        Ok(self.out_dir.clone())
    }
}

pub fn table_names() -> &'static [&'static str] {
    TABLES
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::StoreConfig;
    use crate::core::ids;
    use crate::model::provenance::Provenance;
    use crate::model::rows::{NodeKind, NodeRow};
    use tempfile::tempdir;

    fn sample_node(i: usize) -> NodeRow {
        NodeRow {
            id: ids::node_id("file", "f1", i, i + 1, "x"),
            kind: NodeKind::File,
            name: Some(format!("f{i}.py")),
            path: format!("f{i}.py"),
            lang: "python".to_string(),
            attrs_json: serde_json::json!({}),
            provenance: Provenance::new("f.py", "sha", "python", "gsha", "run1", "cfg1", 0, 10, 1, 1),
        }
    }

    #[test]
    fn append_and_finalize_publishes_out_dir() {
        let dir = tempdir().unwrap();
        let out_dir = dir.path().join("ucg_out");
        let mut cfg = StoreConfig::default();
        cfg.roll_rows = 1000;

        let mut store = UcgStore::new(&out_dir, &cfg, false).unwrap();
        for i in 0..5 {
            store.append(Emission::Node(sample_node(i))).unwrap();
        }
        let published = store.finalize(serde_json::json!({})).unwrap();

        assert!(published.join("run_receipt.json").exists());
        assert!(published.join("catalog.json").exists());
        assert!(published.join("nodes").read_dir().unwrap().count() > 0);
    }

    #[test]
    fn roll_rows_triggers_intermediate_flush() {
        let dir = tempdir().unwrap();
        let out_dir = dir.path().join("ucg_out");
        let mut cfg = StoreConfig::default();
        cfg.roll_rows = 2;

        let mut store = UcgStore::new(&out_dir, &cfg, false).unwrap();
        for i in 0..5 {
            store.append(Emission::Node(sample_node(i))).unwrap();
        }
        assert!(store.nodes.file_idx >= 2, "expected at least two rolled files before finalize");
        store.finalize(serde_json::json!({})).unwrap();
    }
}
