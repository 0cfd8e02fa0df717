//! Normalizer: streams `CstEvent`s into `NodeRow`/`EdgeRow` tuples.
//!
//! Maintains two stacks — `scope_stack` (active MODULE/CLASS/FUNCTION scopes)
//! and `pend_stack` (every currently-open CST construct) — per spec §4.2.

use crate::builders::context::BuilderCtx;
use crate::core::ids;
use crate::model::event::{CstEvent, EventKind};
use crate::model::rows::{AnomalyKind, AnomalyRow, EdgeKind, EdgeRow, Emission, NodeKind, NodeRow, Severity};
use serde_json::json;

const NAME_PROXIMITY_BYTES: usize = 64;

struct PendingConstruct {
    type_name: String,
    byte_start: usize,
    line_start: usize,
    is_scope: bool,
    scope_kind: Option<NodeKind>,
    name: Option<String>,
}

struct ScopeFrame {
    scope_id: String,
    kind: NodeKind,
}

pub struct NormalizeResult {
    pub emissions: Vec<Emission>,
    pub anomalies: Vec<AnomalyRow>,
    pub aborted: bool,
}

pub fn normalize(ctx: &BuilderCtx, events: &[CstEvent]) -> NormalizeResult {
    let mut emissions = Vec::new();
    let mut anomalies = Vec::new();
    let mut scope_stack: Vec<ScopeFrame> = Vec::new();
    let mut pend_stack: Vec<PendingConstruct> = Vec::new();
    let mut decorator_buffer: Vec<(String, usize)> = Vec::new(); // (node_id, byte_start)
    let mut aborted = false;

    // FILE node is the root of the DEFINES hierarchy.
    emissions.push(Emission::Node(NodeRow {
        id: ctx.file_id.clone(),
        kind: NodeKind::File,
        name: Some(ctx.path.clone()),
        path: ctx.path.clone(),
        lang: ctx.lang.to_string(),
        attrs_json: json!({}),
        provenance: ctx.provenance(0, ctx.source.len(), 1, ctx.source.lines().count().max(1)),
    }));

    for event in events {
        if aborted {
            break;
        }
        match event.kind {
            EventKind::Enter => {
                let is_scope = ctx.adapter.is_module(&event.type_name)
                    || ctx.adapter.is_class(&event.type_name)
                    || ctx.adapter.is_function(&event.type_name);
                let scope_kind = if ctx.adapter.is_module(&event.type_name) {
                    Some(NodeKind::Module)
                } else if ctx.adapter.is_class(&event.type_name) {
                    Some(NodeKind::Class)
                } else if ctx.adapter.is_function(&event.type_name) {
                    Some(NodeKind::Function)
                } else {
                    None
                };

                if is_scope {
                    if scope_stack.len() >= ctx.limits.max_scope_depth {
                        anomalies.push(memory_limit(ctx, event, "scope_stack depth exceeded"));
                        aborted = true;
                        continue;
                    }
                    let scope_id = ids::scope_id(&ctx.file_id, event.byte_start);
                    let parent_id = scope_stack
                        .last()
                        .map(|f| f.scope_id.clone())
                        .unwrap_or_else(|| ctx.file_id.clone());

                    emissions.push(Emission::Edge(EdgeRow {
                        id: ids::edge_id("defines", &parent_id, &scope_id, event.byte_start),
                        kind: EdgeKind::Defines,
                        src_id: parent_id,
                        dst_id: scope_id.clone(),
                        path: ctx.path.clone(),
                        lang: ctx.lang.to_string(),
                        attrs_json: json!({}),
                        provenance: ctx.provenance(event.byte_start, event.byte_start, event.line_start, event.line_start),
                    }));

                    // Drain any buffered decorators onto this newly opened scope.
                    for (deco_id, deco_byte) in decorator_buffer.drain(..) {
                        emissions.push(Emission::Edge(EdgeRow {
                            id: ids::edge_id("decorates", &deco_id, &scope_id, deco_byte),
                            kind: EdgeKind::Decorates,
                            src_id: deco_id,
                            dst_id: scope_id.clone(),
                            path: ctx.path.clone(),
                            lang: ctx.lang.to_string(),
                            attrs_json: json!({}),
                            provenance: ctx.provenance(deco_byte, deco_byte, event.line_start, event.line_start),
                        }));
                    }

                    scope_stack.push(ScopeFrame {
                        scope_id: scope_id.clone(),
                        kind: scope_kind.expect("is_scope implies scope_kind"),
                    });
                }

                pend_stack.push(PendingConstruct {
                    type_name: event.type_name.clone(),
                    byte_start: event.byte_start,
                    line_start: event.line_start,
                    is_scope,
                    scope_kind,
                    name: None,
                });

                if pend_stack.len() > ctx.limits.max_pending_constructs {
                    anomalies.push(memory_limit(ctx, event, "pend_stack depth exceeded"));
                    aborted = true;
                }
            }
            EventKind::Token => {
                if let Some(top) = pend_stack.last_mut() {
                    if top.name.is_none()
                        && ctx.adapter.is_identifier_token(&event.type_name)
                        && event.byte_start.saturating_sub(top.byte_start) <= NAME_PROXIMITY_BYTES
                    {
                        top.name = Some(event.text(ctx.source).to_string());
                    }
                }
            }
            EventKind::Exit => {
                let Some(top) = pend_stack.pop() else { continue };

                if top.is_scope {
                    let frame = scope_stack.pop().expect("scope pushed on matching ENTER");
                    emissions.push(Emission::Node(NodeRow {
                        id: frame.scope_id.clone(),
                        kind: frame.kind,
                        name: top.name.clone(),
                        path: ctx.path.clone(),
                        lang: ctx.lang.to_string(),
                        attrs_json: json!({}),
                        provenance: ctx.provenance(top.byte_start, event.byte_end, top.line_start, event.line_end),
                    }));
                } else if ctx.adapter.is_decorator(&top.type_name) {
                    let text = ctx.slice(top.byte_start, event.byte_end);
                    let carrier = decorator_carrier(text);
                    let node_id = ids::node_id("effect_carrier", &ctx.file_id, top.byte_start, event.byte_end, &carrier);
                    emissions.push(Emission::Node(NodeRow {
                        id: node_id.clone(),
                        kind: NodeKind::EffectCarrier,
                        name: Some(carrier),
                        path: ctx.path.clone(),
                        lang: ctx.lang.to_string(),
                        attrs_json: json!({ "carrier_kind": "decorator" }),
                        provenance: ctx.provenance(top.byte_start, event.byte_end, top.line_start, event.line_end),
                    }));
                    decorator_buffer.push((node_id, top.byte_start));
                } else if ctx.adapter.is_import(&top.type_name) {
                    let text = ctx.slice(top.byte_start, event.byte_end);
                    for (name, alias) in extract_import_names(text) {
                        let node_id = ids::node_id("import", &ctx.file_id, top.byte_start, event.byte_end, &name);
                        emissions.push(Emission::Node(NodeRow {
                            id: node_id.clone(),
                            kind: NodeKind::Import,
                            name: Some(alias.clone().unwrap_or_else(|| name.clone())),
                            path: ctx.path.clone(),
                            lang: ctx.lang.to_string(),
                            attrs_json: json!({ "source_name": name, "alias": alias }),
                            provenance: ctx.provenance(top.byte_start, event.byte_end, top.line_start, event.line_end),
                        }));
                        emissions.push(Emission::Edge(EdgeRow {
                            id: ids::edge_id("imports", &ctx.file_id, &node_id, top.byte_start),
                            kind: EdgeKind::Imports,
                            src_id: ctx.file_id.clone(),
                            dst_id: node_id,
                            path: ctx.path.clone(),
                            lang: ctx.lang.to_string(),
                            attrs_json: json!({}),
                            provenance: ctx.provenance(top.byte_start, event.byte_end, top.line_start, event.line_end),
                        }));
                    }
                } else if ctx.adapter.is_export(&top.type_name) {
                    let text = ctx.slice(top.byte_start, event.byte_end);
                    for (name, alias) in extract_export_names(text) {
                        let node_id = ids::node_id("export", &ctx.file_id, top.byte_start, event.byte_end, &name);
                        emissions.push(Emission::Node(NodeRow {
                            id: node_id.clone(),
                            kind: NodeKind::Export,
                            name: Some(alias.clone().unwrap_or_else(|| name.clone())),
                            path: ctx.path.clone(),
                            lang: ctx.lang.to_string(),
                            attrs_json: json!({ "source_name": name, "alias": alias }),
                            provenance: ctx.provenance(top.byte_start, event.byte_end, top.line_start, event.line_end),
                        }));
                        emissions.push(Emission::Edge(EdgeRow {
                            id: ids::edge_id("exports", &ctx.file_id, &node_id, top.byte_start),
                            kind: EdgeKind::Exports,
                            src_id: ctx.file_id.clone(),
                            dst_id: node_id,
                            path: ctx.path.clone(),
                            lang: ctx.lang.to_string(),
                            attrs_json: json!({}),
                            provenance: ctx.provenance(top.byte_start, event.byte_end, top.line_start, event.line_end),
                        }));
                    }
                } else if ctx.adapter.is_call(&top.type_name) {
                    let text = ctx.slice(top.byte_start, event.byte_end);
                    let callee = call_qualified_name(text);
                    if !callee.is_empty() {
                        let node_id = ids::node_id("symbol", &ctx.file_id, top.byte_start, event.byte_end, &callee);
                        emissions.push(Emission::Node(NodeRow {
                            id: node_id.clone(),
                            kind: NodeKind::Symbol,
                            name: Some(callee.clone()),
                            path: ctx.path.clone(),
                            lang: ctx.lang.to_string(),
                            attrs_json: json!({ "role": "callee" }),
                            provenance: ctx.provenance(top.byte_start, event.byte_end, top.line_start, event.line_end),
                        }));
                        let caller_id = scope_stack
                            .iter()
                            .rev()
                            .find(|f| f.kind == NodeKind::Function)
                            .map(|f| f.scope_id.clone())
                            .unwrap_or_else(|| ctx.file_id.clone());
                        emissions.push(Emission::Edge(EdgeRow {
                            id: ids::edge_id("calls", &caller_id, &node_id, top.byte_start),
                            kind: EdgeKind::Calls,
                            src_id: caller_id,
                            dst_id: node_id,
                            path: ctx.path.clone(),
                            lang: ctx.lang.to_string(),
                            attrs_json: json!({ "args_model_stub": [] }),
                            provenance: ctx.provenance(top.byte_start, event.byte_end, top.line_start, event.line_end),
                        }));
                    }
                } else if ctx.adapter.is_throw(&top.type_name) {
                    // Handled as an effect by the effects builder; the normalizer
                    // only needs structural nodes/edges here, so nothing to emit.
                    let _ = top.scope_kind;
                }
            }
        }
    }

    // Stream ended with open scopes: synthesize closures at file size.
    if !aborted {
        let file_end = ctx.source.len();
        while let Some(frame) = scope_stack.pop() {
            let pend = pend_stack.pop();
            let (byte_start, line_start, name) = pend
                .map(|p| (p.byte_start, p.line_start, p.name))
                .unwrap_or((0, 1, None));
            emissions.push(Emission::Node(NodeRow {
                id: frame.scope_id,
                kind: frame.kind,
                name,
                path: ctx.path.clone(),
                lang: ctx.lang.to_string(),
                attrs_json: json!({ "synthetic": true }),
                provenance: ctx.provenance(byte_start, file_end, line_start, line_start),
            }));
        }
    }

    NormalizeResult {
        emissions,
        anomalies,
        aborted,
    }
}

fn memory_limit(ctx: &BuilderCtx, event: &CstEvent, detail: &str) -> AnomalyRow {
    AnomalyRow {
        path: ctx.path.clone(),
        blob_sha: Some(ctx.blob_sha.clone()),
        kind: AnomalyKind::MemoryLimit,
        severity: Severity::Error,
        detail: detail.to_string(),
        byte_start: Some(event.byte_start),
        byte_end: Some(event.byte_end),
        timestamp: crate::core::time::now_iso8601(),
    }
}

/// Strip the leading `@`/annotation marker and trailing call parens, keeping
/// the dotted identifier path (e.g. `@router.post("/x")` -> `router.post`).
pub(crate) fn decorator_carrier(text: &str) -> String {
    let trimmed = text.trim().trim_start_matches('@');
    let head = trimmed.split(['(', ' ', '\n']).next().unwrap_or(trimmed);
    head.trim().to_string()
}

/// Best-effort qualified callee name: dotted identifier immediately preceding
/// the first `(`.
pub(crate) fn call_qualified_name(text: &str) -> String {
    let Some(paren_pos) = text.find('(') else {
        return String::new();
    };
    let head = &text[..paren_pos];
    let ident_chars = |c: char| c.is_alphanumeric() || c == '_' || c == '.';
    let start = head
        .char_indices()
        .rev()
        .take_while(|(_, c)| ident_chars(*c))
        .last()
        .map(|(i, _)| i)
        .unwrap_or(head.len());
    head[start..].trim().to_string()
}

/// Conservative text-slicing extraction of import bindings. Handles:
/// `import X`, `import X as Y`, `from M import A as B, C`, `import type X`,
/// `import { X as Y } from 'mod'`.
pub(crate) fn extract_import_names(text: &str) -> Vec<(String, Option<String>)> {
    let t = text.trim();
    let mut out = Vec::new();

    if let Some(brace_start) = t.find('{') {
        if let Some(brace_end) = t.find('}') {
            let inner = &t[brace_start + 1..brace_end.min(t.len())];
            for part in inner.split(',') {
                if let Some((name, alias)) = split_as(part) {
                    out.push((name, alias));
                }
            }
            return out;
        }
    }

    if let Some(rest) = t.strip_prefix("from ").or_else(|| t.strip_prefix("from")) {
        if let Some(import_pos) = rest.find("import") {
            let names_part = &rest[import_pos + "import".len()..];
            for part in names_part.split(',') {
                let part = part.trim();
                if part.is_empty() || part == "*" {
                    continue;
                }
                if let Some((name, alias)) = split_as(part) {
                    out.push((name, alias));
                }
            }
            return out;
        }
    }

    let rest = t
        .strip_prefix("import type ")
        .or_else(|| t.strip_prefix("import "))
        .unwrap_or(t);
    // `import X from 'mod'` (JS default import) or bare `import X`.
    let head = rest.split(" from ").next().unwrap_or(rest);
    for part in head.split(',') {
        if let Some((name, alias)) = split_as(part) {
            out.push((name, alias));
        }
    }
    out
}

pub(crate) fn extract_export_names(text: &str) -> Vec<(String, Option<String>)> {
    let t = text.trim();
    if t.starts_with("export default") {
        return vec![("default".to_string(), None)];
    }
    if let Some(brace_start) = t.find('{') {
        if let Some(brace_end) = t.find('}') {
            let inner = &t[brace_start + 1..brace_end.min(t.len())];
            return inner
                .split(',')
                .filter_map(split_as)
                .collect();
        }
    }
    let rest = t.strip_prefix("export ").unwrap_or(t);
    rest.split(',').filter_map(split_as).collect()
}

fn split_as(part: &str) -> Option<(String, Option<String>)> {
    let part = part.trim();
    if part.is_empty() {
        return None;
    }
    if let Some((name, alias)) = part.split_once(" as ") {
        Some((ident_only(name), Some(ident_only(alias))))
    } else {
        let name = ident_only(part);
        if name.is_empty() { None } else { Some((name, None)) }
    }
}

fn ident_only(s: &str) -> String {
    s.trim()
        .trim_matches(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.'))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::Limits;
    use crate::model::language::LanguageKind;
    use crate::parser::driver::{ParserDriver, TreeSitterDriver};
    use std::collections::BTreeSet;

    fn ctx(source: &str) -> (BuilderCtx, Vec<CstEvent>) {
        let meta = crate::model::event::FileMeta {
            path: "t.py".into(),
            real_path: "/tmp/t.py".into(),
            blob_sha: "sha".into(),
            size_bytes: source.len() as u64,
            mtime_ns: 0,
            run_id: "run1".into(),
            config_hash: "cfg1".into(),
            is_text: true,
            encoding: "utf-8".into(),
            encoding_confidence: 1.0,
            language: Some(LanguageKind::Python),
            flags: BTreeSet::new(),
        };
        let driver = TreeSitterDriver::new(LanguageKind::Python);
        let stream = driver.parse(&meta, source).unwrap();
        let ctx = BuilderCtx::new(
            "file1".into(),
            "t.py".into(),
            "sha".into(),
            LanguageKind::Python,
            Box::leak(source.to_string().into_boxed_str()),
            "run1".into(),
            "cfg1".into(),
            "gsha".into(),
            Limits::default(),
        );
        (ctx, stream.events)
    }

    #[test]
    fn emits_file_and_function_scope_with_defines_edge() {
        let (ctx, events) = ctx("def f():\n    return 1\n");
        let result = normalize(&ctx, &events);
        assert!(!result.aborted);
        let has_function = result.emissions.iter().any(|e| matches!(e, Emission::Node(n) if n.kind == NodeKind::Function));
        let has_defines = result.emissions.iter().any(|e| matches!(e, Emission::Edge(ed) if ed.kind == EdgeKind::Defines));
        assert!(has_function);
        assert!(has_defines);
    }

    #[test]
    fn decorator_plus_call_scenario() {
        let (ctx, events) = ctx("@router.post(\"/x\")\ndef h(): pass\n");
        let result = normalize(&ctx, &events);
        let deco = result.emissions.iter().find_map(|e| match e {
            Emission::Node(n) if n.kind == NodeKind::EffectCarrier => Some(n.clone()),
            _ => None,
        });
        assert!(deco.is_some());
        assert_eq!(deco.unwrap().name.as_deref(), Some("router.post"));
        let has_decorates = result.emissions.iter().any(|e| matches!(e, Emission::Edge(ed) if ed.kind == EdgeKind::Decorates));
        assert!(has_decorates);
    }

    #[test]
    fn import_from_extracts_aliases() {
        let names = extract_import_names("from pkg.mod import A as B, C");
        assert_eq!(names, vec![("A".to_string(), Some("B".to_string())), ("C".to_string(), None)]);
    }
}
