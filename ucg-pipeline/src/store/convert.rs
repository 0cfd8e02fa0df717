//! Row-slice -> Arrow `RecordBatch` conversion, one function per table.
//!
//! Every row carries a `Provenance`; the ten provenance columns are appended
//! identically across tables, mirroring the flat column layout `_node_schema`
//! and `_edge_schema` use in `ucg_store.py`.

use crate::model::provenance::{ConfidenceValue, Provenance};
use crate::model::rows::*;
use crate::store::schema::SCHEMA_VERSION;
use anyhow::Result;
use arrow::array::{ArrayRef, BooleanBuilder, RecordBatch, StringBuilder, UInt32Builder, UInt64Builder};
use arrow::datatypes::SchemaRef;
use std::sync::Arc;

/// Shared column builders for the ten `Provenance` fields every row carries.
#[derive(Default)]
struct ProvenanceBuilders {
    path: StringBuilder,
    blob_sha: StringBuilder,
    language: StringBuilder,
    grammar_sha: StringBuilder,
    run_id: StringBuilder,
    config_hash: StringBuilder,
    byte_start: UInt64Builder,
    byte_end: UInt64Builder,
    line_start: UInt64Builder,
    line_end: UInt64Builder,
    enricher_versions_json: StringBuilder,
    confidence_json: StringBuilder,
}

impl ProvenanceBuilders {
    fn append(&mut self, p: &Provenance) {
        self.path.append_value(&p.path);
        self.blob_sha.append_value(&p.blob_sha);
        self.language.append_value(&p.language);
        self.grammar_sha.append_value(&p.grammar_sha);
        self.run_id.append_value(&p.run_id);
        self.config_hash.append_value(&p.config_hash);
        self.byte_start.append_value(p.byte_start as u64);
        self.byte_end.append_value(p.byte_end as u64);
        self.line_start.append_value(p.line_start as u64);
        self.line_end.append_value(p.line_end as u64);
        self.enricher_versions_json
            .append_value(serde_json::to_string(&p.enricher_versions).unwrap_or_default());
        self.confidence_json.append_value(confidence_json(p));
    }

    /// Finished arrays in schema order; caller decides whether to include
    /// the last two (provenance_v2 sidecar columns).
    fn finish(mut self, provenance_v2: bool) -> Vec<ArrayRef> {
        let mut out: Vec<ArrayRef> = vec![
            Arc::new(self.path.finish()),
            Arc::new(self.blob_sha.finish()),
            Arc::new(self.language.finish()),
            Arc::new(self.grammar_sha.finish()),
            Arc::new(self.run_id.finish()),
            Arc::new(self.config_hash.finish()),
            Arc::new(self.byte_start.finish()),
            Arc::new(self.byte_end.finish()),
            Arc::new(self.line_start.finish()),
            Arc::new(self.line_end.finish()),
        ];
        if provenance_v2 {
            out.push(Arc::new(self.enricher_versions_json.finish()));
            out.push(Arc::new(self.confidence_json.finish()));
        }
        out
    }
}

fn confidence_json(p: &Provenance) -> String {
    let map: std::collections::BTreeMap<&String, String> = p
        .confidence
        .iter()
        .map(|(k, v)| {
            let s = match v {
                ConfidenceValue::Text(t) => t.clone(),
                ConfidenceValue::Number(n) => n.to_string(),
            };
            (k, s)
        })
        .collect();
    serde_json::to_string(&map).unwrap_or_default()
}

fn schema_version_column(n: usize) -> ArrayRef {
    let mut b = StringBuilder::new();
    for _ in 0..n {
        b.append_value(SCHEMA_VERSION);
    }
    Arc::new(b.finish())
}

pub fn node_rows_to_batch(schema: &SchemaRef, rows: &[NodeRow], provenance_v2: bool) -> Result<RecordBatch> {
    let mut id = StringBuilder::new();
    let mut kind = StringBuilder::new();
    let mut name = StringBuilder::new();
    let mut attrs = StringBuilder::new();
    let mut prov = ProvenanceBuilders::default();

    for r in rows {
        id.append_value(&r.id);
        kind.append_value(node_kind_str(r.kind));
        match &r.name {
            Some(n) => name.append_value(n),
            None => name.append_null(),
        }
        attrs.append_value(r.attrs_json.to_string());
        prov.append(&r.provenance);
    }

    let mut cols: Vec<ArrayRef> = vec![Arc::new(id.finish()), Arc::new(kind.finish()), Arc::new(name.finish()), Arc::new(attrs.finish())];
    cols.extend(prov.finish(provenance_v2));
    Ok(RecordBatch::try_new(Arc::clone(schema), cols)?)
}

pub fn edge_rows_to_batch(schema: &SchemaRef, rows: &[EdgeRow], provenance_v2: bool) -> Result<RecordBatch> {
    let mut id = StringBuilder::new();
    let mut kind = StringBuilder::new();
    let mut src = StringBuilder::new();
    let mut dst = StringBuilder::new();
    let mut attrs = StringBuilder::new();
    let mut prov = ProvenanceBuilders::default();

    for r in rows {
        id.append_value(&r.id);
        kind.append_value(edge_kind_str(r.kind));
        src.append_value(&r.src_id);
        dst.append_value(&r.dst_id);
        attrs.append_value(r.attrs_json.to_string());
        prov.append(&r.provenance);
    }

    let mut cols: Vec<ArrayRef> = vec![
        Arc::new(id.finish()),
        Arc::new(kind.finish()),
        Arc::new(src.finish()),
        Arc::new(dst.finish()),
        Arc::new(attrs.finish()),
    ];
    cols.extend(prov.finish(provenance_v2));
    Ok(RecordBatch::try_new(Arc::clone(schema), cols)?)
}

pub fn cfg_block_rows_to_batch(schema: &SchemaRef, rows: &[CfgBlockRow], provenance_v2: bool) -> Result<RecordBatch> {
    let mut id = StringBuilder::new();
    let mut func_id = StringBuilder::new();
    let mut kind = StringBuilder::new();
    let mut index = UInt32Builder::new();
    let mut attrs = StringBuilder::new();
    let mut prov = ProvenanceBuilders::default();

    for r in rows {
        id.append_value(&r.id);
        func_id.append_value(&r.func_id);
        kind.append_value(cfg_block_kind_str(r.kind));
        index.append_value(r.index);
        attrs.append_value(r.attrs_json.to_string());
        prov.append(&r.provenance);
    }

    let mut cols: Vec<ArrayRef> = vec![
        Arc::new(id.finish()),
        Arc::new(func_id.finish()),
        Arc::new(kind.finish()),
        Arc::new(index.finish()),
        Arc::new(attrs.finish()),
    ];
    cols.extend(prov.finish(provenance_v2));
    Ok(RecordBatch::try_new(Arc::clone(schema), cols)?)
}

pub fn cfg_edge_rows_to_batch(schema: &SchemaRef, rows: &[CfgEdgeRow], provenance_v2: bool) -> Result<RecordBatch> {
    let mut id = StringBuilder::new();
    let mut func_id = StringBuilder::new();
    let mut kind = StringBuilder::new();
    let mut src = StringBuilder::new();
    let mut dst = StringBuilder::new();
    let mut prov = ProvenanceBuilders::default();

    for r in rows {
        id.append_value(&r.id);
        func_id.append_value(&r.func_id);
        kind.append_value(cfg_edge_kind_str(r.kind));
        src.append_value(&r.src_block_id);
        dst.append_value(&r.dst_block_id);
        prov.append(&r.provenance);
    }

    let mut cols: Vec<ArrayRef> = vec![
        Arc::new(id.finish()),
        Arc::new(func_id.finish()),
        Arc::new(kind.finish()),
        Arc::new(src.finish()),
        Arc::new(dst.finish()),
    ];
    cols.extend(prov.finish(provenance_v2));
    Ok(RecordBatch::try_new(Arc::clone(schema), cols)?)
}

pub fn dfg_node_rows_to_batch(schema: &SchemaRef, rows: &[DfgNodeRow], provenance_v2: bool) -> Result<RecordBatch> {
    let mut id = StringBuilder::new();
    let mut func_id = StringBuilder::new();
    let mut kind = StringBuilder::new();
    let mut name = StringBuilder::new();
    let mut version = UInt32Builder::new();
    let mut attrs = StringBuilder::new();
    let mut prov = ProvenanceBuilders::default();

    for r in rows {
        id.append_value(&r.id);
        func_id.append_value(&r.func_id);
        kind.append_value(dfg_node_kind_str(r.kind));
        match &r.name {
            Some(n) => name.append_value(n),
            None => name.append_null(),
        }
        match r.version {
            Some(v) => version.append_value(v),
            None => version.append_null(),
        }
        attrs.append_value(r.attrs_json.to_string());
        prov.append(&r.provenance);
    }

    let mut cols: Vec<ArrayRef> = vec![
        Arc::new(id.finish()),
        Arc::new(func_id.finish()),
        Arc::new(kind.finish()),
        Arc::new(name.finish()),
        Arc::new(version.finish()),
        Arc::new(attrs.finish()),
    ];
    cols.extend(prov.finish(provenance_v2));
    Ok(RecordBatch::try_new(Arc::clone(schema), cols)?)
}

pub fn dfg_edge_rows_to_batch(schema: &SchemaRef, rows: &[DfgEdgeRow], provenance_v2: bool) -> Result<RecordBatch> {
    let mut id = StringBuilder::new();
    let mut func_id = StringBuilder::new();
    let mut kind = StringBuilder::new();
    let mut src = StringBuilder::new();
    let mut dst = StringBuilder::new();
    let mut prov = ProvenanceBuilders::default();

    for r in rows {
        id.append_value(&r.id);
        func_id.append_value(&r.func_id);
        kind.append_value(dfg_edge_kind_str(r.kind));
        src.append_value(&r.src_id);
        dst.append_value(&r.dst_id);
        prov.append(&r.provenance);
    }

    let mut cols: Vec<ArrayRef> = vec![
        Arc::new(id.finish()),
        Arc::new(func_id.finish()),
        Arc::new(kind.finish()),
        Arc::new(src.finish()),
        Arc::new(dst.finish()),
    ];
    cols.extend(prov.finish(provenance_v2));
    Ok(RecordBatch::try_new(Arc::clone(schema), cols)?)
}

pub fn symbol_rows_to_batch(schema: &SchemaRef, rows: &[SymbolRow], provenance_v2: bool) -> Result<RecordBatch> {
    let mut id = StringBuilder::new();
    let mut scope_id = StringBuilder::new();
    let mut name = StringBuilder::new();
    let mut kind = StringBuilder::new();
    let mut visibility = StringBuilder::new();
    let mut is_dynamic = BooleanBuilder::new();
    let mut attrs = StringBuilder::new();
    let mut prov = ProvenanceBuilders::default();

    for r in rows {
        id.append_value(&r.id);
        scope_id.append_value(&r.scope_id);
        name.append_value(&r.name);
        kind.append_value(symbol_kind_str(r.kind));
        visibility.append_value(visibility_str(r.visibility));
        is_dynamic.append_value(r.is_dynamic);
        attrs.append_value(r.attrs_json.to_string());
        prov.append(&r.provenance);
    }

    let mut cols: Vec<ArrayRef> = vec![
        Arc::new(id.finish()),
        Arc::new(scope_id.finish()),
        Arc::new(name.finish()),
        Arc::new(kind.finish()),
        Arc::new(visibility.finish()),
        Arc::new(is_dynamic.finish()),
        Arc::new(attrs.finish()),
    ];
    cols.extend(prov.finish(provenance_v2));
    Ok(RecordBatch::try_new(Arc::clone(schema), cols)?)
}

pub fn alias_rows_to_batch(schema: &SchemaRef, rows: &[AliasRow], provenance_v2: bool) -> Result<RecordBatch> {
    let mut id = StringBuilder::new();
    let mut alias_kind = StringBuilder::new();
    let mut alias_id = StringBuilder::new();
    let mut target = StringBuilder::new();
    let mut alias_name = StringBuilder::new();
    let mut attrs = StringBuilder::new();
    let mut prov = ProvenanceBuilders::default();

    for r in rows {
        id.append_value(&r.id);
        alias_kind.append_value(alias_kind_str(r.alias_kind));
        alias_id.append_value(&r.alias_id);
        target.append_value(&r.target_symbol_id);
        alias_name.append_value(&r.alias_name);
        attrs.append_value(r.attrs_json.to_string());
        prov.append(&r.provenance);
    }

    let mut cols: Vec<ArrayRef> = vec![
        Arc::new(id.finish()),
        Arc::new(alias_kind.finish()),
        Arc::new(alias_id.finish()),
        Arc::new(target.finish()),
        Arc::new(alias_name.finish()),
        Arc::new(attrs.finish()),
    ];
    cols.extend(prov.finish(provenance_v2));
    Ok(RecordBatch::try_new(Arc::clone(schema), cols)?)
}

pub fn effect_rows_to_batch(schema: &SchemaRef, rows: &[EffectRow], provenance_v2: bool) -> Result<RecordBatch> {
    let mut id = StringBuilder::new();
    let mut kind = StringBuilder::new();
    let mut carrier = StringBuilder::new();
    let mut args = StringBuilder::new();
    let mut attrs = StringBuilder::new();
    let mut prov = ProvenanceBuilders::default();

    for r in rows {
        id.append_value(&r.id);
        kind.append_value(effect_kind_str(r.kind));
        carrier.append_value(&r.carrier);
        args.append_value(r.args_json.to_string());
        attrs.append_value(r.attrs_json.to_string());
        prov.append(&r.provenance);
    }

    let mut cols: Vec<ArrayRef> = vec![
        Arc::new(id.finish()),
        Arc::new(kind.finish()),
        Arc::new(carrier.finish()),
        Arc::new(args.finish()),
        Arc::new(attrs.finish()),
    ];
    cols.extend(prov.finish(provenance_v2));
    Ok(RecordBatch::try_new(Arc::clone(schema), cols)?)
}

pub fn anomaly_rows_to_batch(schema: &SchemaRef, rows: &[AnomalyRow]) -> Result<RecordBatch> {
    let mut path = StringBuilder::new();
    let mut blob_sha = StringBuilder::new();
    let mut kind = StringBuilder::new();
    let mut severity = StringBuilder::new();
    let mut detail = StringBuilder::new();
    let mut byte_start = UInt64Builder::new();
    let mut byte_end = UInt64Builder::new();
    let mut timestamp = StringBuilder::new();

    for r in rows {
        path.append_value(&r.path);
        match &r.blob_sha {
            Some(s) => blob_sha.append_value(s),
            None => blob_sha.append_null(),
        }
        kind.append_value(anomaly_kind_str(r.kind));
        severity.append_value(severity_str(r.severity));
        detail.append_value(&r.detail);
        match r.byte_start {
            Some(v) => byte_start.append_value(v as u64),
            None => byte_start.append_null(),
        }
        match r.byte_end {
            Some(v) => byte_end.append_value(v as u64),
            None => byte_end.append_null(),
        }
        timestamp.append_value(&r.timestamp);
    }

    let cols: Vec<ArrayRef> = vec![
        Arc::new(path.finish()),
        Arc::new(blob_sha.finish()),
        Arc::new(kind.finish()),
        Arc::new(severity.finish()),
        Arc::new(detail.finish()),
        Arc::new(byte_start.finish()),
        Arc::new(byte_end.finish()),
        Arc::new(timestamp.finish()),
    ];
    Ok(RecordBatch::try_new(Arc::clone(schema), cols)?)
}

/// Append a `schema_version` column if the given batch's schema doesn't
/// already carry one, per the `_verified_write` step in `ucg_store.py`.
pub fn with_schema_version_column(batch: RecordBatch) -> Result<RecordBatch> {
    if batch.schema().column_with_name("schema_version").is_some() {
        return Ok(batch);
    }
    let mut fields: Vec<_> = batch.schema().fields().iter().map(Arc::clone).collect();
    fields.push(Arc::new(arrow::datatypes::Field::new("schema_version", arrow::datatypes::DataType::Utf8, false)));
    let schema = Arc::new(arrow::datatypes::Schema::new(fields));
    let mut cols = batch.columns().to_vec();
    cols.push(schema_version_column(batch.num_rows()));
    Ok(RecordBatch::try_new(schema, cols)?)
}

fn node_kind_str(k: NodeKind) -> &'static str {
    match k {
        NodeKind::File => "file",
        NodeKind::Module => "module",
        NodeKind::Class => "class",
        NodeKind::Function => "function",
        NodeKind::Block => "block",
        NodeKind::Symbol => "symbol",
        NodeKind::Literal => "literal",
        NodeKind::EffectCarrier => "effect_carrier",
        NodeKind::Import => "import",
        NodeKind::Export => "export",
    }
}

fn edge_kind_str(k: EdgeKind) -> &'static str {
    match k {
        EdgeKind::Defines => "defines",
        EdgeKind::Declares => "declares",
        EdgeKind::Imports => "imports",
        EdgeKind::Exports => "exports",
        EdgeKind::Extends => "extends",
        EdgeKind::Implements => "implements",
        EdgeKind::Calls => "calls",
        EdgeKind::Reads => "reads",
        EdgeKind::Writes => "writes",
        EdgeKind::Throws => "throws",
        EdgeKind::Aliases => "aliases",
        EdgeKind::Decorates => "decorates",
    }
}

fn cfg_block_kind_str(k: CfgBlockKind) -> &'static str {
    match k {
        CfgBlockKind::Entry => "entry",
        CfgBlockKind::Predicate => "predicate",
        CfgBlockKind::Body => "body",
        CfgBlockKind::Handler => "handler",
        CfgBlockKind::Exit => "exit",
    }
}

fn cfg_edge_kind_str(k: CfgEdgeKind) -> &'static str {
    match k {
        CfgEdgeKind::Next => "next",
        CfgEdgeKind::True => "true",
        CfgEdgeKind::False => "false",
        CfgEdgeKind::Exception => "exception",
        CfgEdgeKind::Return => "return",
    }
}

fn dfg_node_kind_str(k: DfgNodeKind) -> &'static str {
    match k {
        DfgNodeKind::Param => "param",
        DfgNodeKind::VarDef => "var_def",
        DfgNodeKind::VarUse => "var_use",
        DfgNodeKind::Literal => "literal",
    }
}

fn dfg_edge_kind_str(k: DfgEdgeKind) -> &'static str {
    match k {
        DfgEdgeKind::DefUse => "def_use",
        DfgEdgeKind::ConstPart => "const_part",
        DfgEdgeKind::ArgToParam => "arg_to_param",
    }
}

fn symbol_kind_str(k: SymbolKind) -> &'static str {
    match k {
        SymbolKind::Module => "module",
        SymbolKind::Class => "class",
        SymbolKind::Function => "function",
        SymbolKind::Method => "method",
        SymbolKind::Variable => "variable",
        SymbolKind::Param => "param",
        SymbolKind::Import => "import",
        SymbolKind::Export => "export",
    }
}

fn visibility_str(v: Visibility) -> &'static str {
    match v {
        Visibility::Public => "public",
        Visibility::Private => "private",
        Visibility::Internal => "internal",
    }
}

fn alias_kind_str(k: AliasKind) -> &'static str {
    match k {
        AliasKind::Import => "import",
        AliasKind::Reexport => "reexport",
        AliasKind::Assign => "assign",
        AliasKind::StarImport => "star_import",
        AliasKind::Dynamic => "dynamic",
    }
}

fn effect_kind_str(k: EffectKind) -> &'static str {
    match k {
        EffectKind::Decorator => "decorator",
        EffectKind::Call => "call",
        EffectKind::StringLiteral => "string_literal",
        EffectKind::SqlLike => "sql_like",
        EffectKind::RouteLike => "route_like",
        EffectKind::EnvLookup => "env_lookup",
        EffectKind::ThrowLike => "throw_like",
        EffectKind::Annotation => "annotation",
        EffectKind::Unknown => "unknown",
    }
}

fn anomaly_kind_str(k: AnomalyKind) -> &'static str {
    match k {
        AnomalyKind::ParseFailed => "PARSE_FAILED",
        AnomalyKind::EncodingError => "ENCODING_ERROR",
        AnomalyKind::Timeout => "TIMEOUT",
        AnomalyKind::MemoryLimit => "MEMORY_LIMIT",
        AnomalyKind::LangUnknown => "LANG_UNKNOWN",
        AnomalyKind::Minified => "MINIFIED",
        AnomalyKind::TooLarge => "TOO_LARGE",
        AnomalyKind::BinaryFile => "BINARY_FILE",
        AnomalyKind::PermissionDenied => "PERMISSION_DENIED",
        AnomalyKind::IoError => "IO_ERROR",
        AnomalyKind::SymlinkOutOfRoot => "SYMLINK_OUT_OF_ROOT",
        AnomalyKind::SymlinkCycle => "SYMLINK_CYCLE",
        AnomalyKind::GeneratedCode => "GENERATED_CODE",
        AnomalyKind::SkippedByRule => "SKIPPED_BY_RULE",
        AnomalyKind::DynamicImport => "DYNAMIC_IMPORT",
        AnomalyKind::EvalUsage => "EVAL_USAGE",
        AnomalyKind::UnknownFlow => "UNKNOWN_FLOW",
        AnomalyKind::Unknown => "UNKNOWN",
    }
}

fn severity_str(s: Severity) -> &'static str {
    match s {
        Severity::Info => "info",
        Severity::Warn => "warn",
        Severity::Error => "error",
    }
}
