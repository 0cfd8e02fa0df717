//! Arrow schemas for every UCG table, grounded on `ucg_store.py`'s
//! `_node_schema()`/`_edge_schema()`/`_anomaly_schema()` helpers, extended to
//! the full table set this pipeline emits.

use arrow::datatypes::{DataType, Field, Schema};
use std::sync::Arc;

pub const SCHEMA_VERSION: &str = "1.0";

fn provenance_fields() -> Vec<Field> {
    vec![
        Field::new("path", DataType::Utf8, false),
        Field::new("blob_sha", DataType::Utf8, false),
        Field::new("language", DataType::Utf8, false),
        Field::new("grammar_sha", DataType::Utf8, false),
        Field::new("run_id", DataType::Utf8, false),
        Field::new("config_hash", DataType::Utf8, false),
        Field::new("byte_start", DataType::UInt64, false),
        Field::new("byte_end", DataType::UInt64, false),
        Field::new("line_start", DataType::UInt64, false),
        Field::new("line_end", DataType::UInt64, false),
    ]
}

/// The optional `provenance_v2` sidecar adds the enricher-version map and
/// confidence map as JSON-string columns rather than true Arrow `Map` arrays
/// — a deliberate simplification recorded in DESIGN.md.
fn provenance_v2_fields() -> Vec<Field> {
    vec![
        Field::new("enricher_versions_json", DataType::Utf8, true),
        Field::new("confidence_json", DataType::Utf8, true),
    ]
}

fn with_provenance(mut fields: Vec<Field>, provenance_v2: bool) -> Vec<Field> {
    fields.extend(provenance_fields());
    if provenance_v2 {
        fields.extend(provenance_v2_fields());
    }
    fields
}

pub fn node_schema(provenance_v2: bool) -> Arc<Schema> {
    let fields = with_provenance(
        vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("kind", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("attrs_json", DataType::Utf8, false),
        ],
        provenance_v2,
    );
    Arc::new(Schema::new(fields))
}

pub fn edge_schema(provenance_v2: bool) -> Arc<Schema> {
    let fields = with_provenance(
        vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("kind", DataType::Utf8, false),
            Field::new("src_id", DataType::Utf8, false),
            Field::new("dst_id", DataType::Utf8, false),
            Field::new("attrs_json", DataType::Utf8, false),
        ],
        provenance_v2,
    );
    Arc::new(Schema::new(fields))
}

pub fn cfg_block_schema(provenance_v2: bool) -> Arc<Schema> {
    let fields = with_provenance(
        vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("func_id", DataType::Utf8, false),
            Field::new("kind", DataType::Utf8, false),
            Field::new("index", DataType::UInt32, false),
            Field::new("attrs_json", DataType::Utf8, false),
        ],
        provenance_v2,
    );
    Arc::new(Schema::new(fields))
}

pub fn cfg_edge_schema(provenance_v2: bool) -> Arc<Schema> {
    let fields = with_provenance(
        vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("func_id", DataType::Utf8, false),
            Field::new("kind", DataType::Utf8, false),
            Field::new("src_block_id", DataType::Utf8, false),
            Field::new("dst_block_id", DataType::Utf8, false),
        ],
        provenance_v2,
    );
    Arc::new(Schema::new(fields))
}

pub fn dfg_node_schema(provenance_v2: bool) -> Arc<Schema> {
    let fields = with_provenance(
        vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("func_id", DataType::Utf8, false),
            Field::new("kind", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("version", DataType::UInt32, true),
            Field::new("attrs_json", DataType::Utf8, false),
        ],
        provenance_v2,
    );
    Arc::new(Schema::new(fields))
}

pub fn dfg_edge_schema(provenance_v2: bool) -> Arc<Schema> {
    let fields = with_provenance(
        vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("func_id", DataType::Utf8, false),
            Field::new("kind", DataType::Utf8, false),
            Field::new("src_id", DataType::Utf8, false),
            Field::new("dst_id", DataType::Utf8, false),
        ],
        provenance_v2,
    );
    Arc::new(Schema::new(fields))
}

pub fn symbol_schema(provenance_v2: bool) -> Arc<Schema> {
    let fields = with_provenance(
        vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("scope_id", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("kind", DataType::Utf8, false),
            Field::new("visibility", DataType::Utf8, false),
            Field::new("is_dynamic", DataType::Boolean, false),
            Field::new("attrs_json", DataType::Utf8, false),
        ],
        provenance_v2,
    );
    Arc::new(Schema::new(fields))
}

pub fn alias_schema(provenance_v2: bool) -> Arc<Schema> {
    let fields = with_provenance(
        vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("alias_kind", DataType::Utf8, false),
            Field::new("alias_id", DataType::Utf8, false),
            Field::new("target_symbol_id", DataType::Utf8, false),
            Field::new("alias_name", DataType::Utf8, false),
            Field::new("attrs_json", DataType::Utf8, false),
        ],
        provenance_v2,
    );
    Arc::new(Schema::new(fields))
}

pub fn effect_schema(provenance_v2: bool) -> Arc<Schema> {
    let fields = with_provenance(
        vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("kind", DataType::Utf8, false),
            Field::new("carrier", DataType::Utf8, false),
            Field::new("args_json", DataType::Utf8, false),
            Field::new("attrs_json", DataType::Utf8, false),
        ],
        provenance_v2,
    );
    Arc::new(Schema::new(fields))
}

/// Anomaly rows have no `Provenance` payload (they can describe a whole-file
/// failure before any span exists), so this schema is built by hand.
pub fn anomaly_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("path", DataType::Utf8, false),
        Field::new("blob_sha", DataType::Utf8, true),
        Field::new("kind", DataType::Utf8, false),
        Field::new("severity", DataType::Utf8, false),
        Field::new("detail", DataType::Utf8, false),
        Field::new("byte_start", DataType::UInt64, true),
        Field::new("byte_end", DataType::UInt64, true),
        Field::new("timestamp", DataType::Utf8, false),
    ]))
}
