//! Row tables. Every table shares a `Provenance` payload and uses a tagged
//! sum type for its `kind` column rather than an open string, per the
//! "dynamic typing in rows" design note: `attrs_json` is a schema-less
//! sidecar for non-indexed hints only, never a substitute for a real column.

use crate::model::provenance::Provenance;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Module,
    Class,
    Function,
    Block,
    Symbol,
    Literal,
    EffectCarrier,
    Import,
    Export,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRow {
    pub id: String,
    pub kind: NodeKind,
    pub name: Option<String>,
    pub path: String,
    pub lang: String,
    pub attrs_json: Json,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Defines,
    Declares,
    Imports,
    Exports,
    Extends,
    Implements,
    Calls,
    Reads,
    Writes,
    Throws,
    Aliases,
    Decorates,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRow {
    pub id: String,
    pub kind: EdgeKind,
    pub src_id: String,
    pub dst_id: String,
    pub path: String,
    pub lang: String,
    pub attrs_json: Json,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CfgBlockKind {
    Entry,
    Predicate,
    Body,
    Handler,
    Exit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfgBlockRow {
    pub id: String,
    pub func_id: String,
    pub kind: CfgBlockKind,
    pub index: u32,
    pub path: String,
    pub lang: String,
    pub attrs_json: Json,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CfgEdgeKind {
    Next,
    True,
    False,
    Exception,
    Return,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfgEdgeRow {
    pub id: String,
    pub func_id: String,
    pub kind: CfgEdgeKind,
    pub src_block_id: String,
    pub dst_block_id: String,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DfgNodeKind {
    Param,
    VarDef,
    VarUse,
    Literal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DfgNodeRow {
    pub id: String,
    pub func_id: String,
    pub kind: DfgNodeKind,
    pub name: Option<String>,
    pub version: Option<u32>,
    pub path: String,
    pub lang: String,
    pub attrs_json: Json,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DfgEdgeKind {
    DefUse,
    ConstPart,
    ArgToParam,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DfgEdgeRow {
    pub id: String,
    pub func_id: String,
    pub kind: DfgEdgeKind,
    pub src_id: String,
    pub dst_id: String,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Module,
    Class,
    Function,
    Method,
    Variable,
    Param,
    Import,
    Export,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRow {
    pub id: String,
    pub scope_id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub visibility: Visibility,
    pub is_dynamic: bool,
    pub attrs_json: Json,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasKind {
    Import,
    Reexport,
    Assign,
    StarImport,
    Dynamic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasRow {
    pub id: String,
    pub alias_kind: AliasKind,
    pub alias_id: String,
    pub target_symbol_id: String,
    pub alias_name: String,
    pub attrs_json: Json,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Decorator,
    Call,
    StringLiteral,
    SqlLike,
    RouteLike,
    EnvLookup,
    ThrowLike,
    Annotation,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectRow {
    pub id: String,
    pub kind: EffectKind,
    pub carrier: String,
    pub args_json: Json,
    pub attrs_json: Json,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    ParseFailed,
    EncodingError,
    Timeout,
    MemoryLimit,
    LangUnknown,
    Minified,
    TooLarge,
    BinaryFile,
    PermissionDenied,
    IoError,
    SymlinkOutOfRoot,
    SymlinkCycle,
    GeneratedCode,
    SkippedByRule,
    DynamicImport,
    EvalUsage,
    UnknownFlow,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyRow {
    pub path: String,
    pub blob_sha: Option<String>,
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub detail: String,
    pub byte_start: Option<usize>,
    pub byte_end: Option<usize>,
    pub timestamp: String,
}

/// A single emission out of the builder pipeline, fed into the orchestrator's
/// per-table buffers. This is the Rust shape of the "coroutine yields tuples"
/// design note: a pull-style enum rather than separate typed channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Emission {
    Node(NodeRow),
    Edge(EdgeRow),
    CfgBlock(CfgBlockRow),
    CfgEdge(CfgEdgeRow),
    DfgNode(DfgNodeRow),
    DfgEdge(DfgEdgeRow),
    Symbol(SymbolRow),
    Alias(AliasRow),
    Effect(EffectRow),
}
