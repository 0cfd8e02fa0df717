//! Symbols/Aliases builder (spec §4.5).
//!
//! Re-walks the same event stream the Normalizer and DFG builder consumed,
//! maintaining its own scope stack so it can emit `SymbolRow`s for every
//! declared binding, then resolves DFG `alias_hints` into `AliasRow`s once
//! the whole file has been seen. Scope IDs are computed with the identical
//! `ids::scope_id(file_id, byte_start)` formula the other builders use, so
//! an `alias_hint.scope_id` always lines up with a scope this builder has
//! a symbol table for — the cross-builder coordination point in the spec.

use crate::builders::context::BuilderCtx;
use crate::builders::dfg::AliasHint;
use crate::builders::normalizer::{extract_export_names, extract_import_names};
use crate::core::ids;
use crate::model::event::{CstEvent, EventKind};
use crate::model::rows::{AliasKind, AliasRow, Emission, SymbolKind, SymbolRow, Visibility};
use serde_json::json;
use std::collections::HashMap;

const NAME_PROXIMITY_BYTES: usize = 64;

struct Frame {
    scope_id: String,
    is_class: bool,
    byte_start: usize,
    name: Option<String>,
}

struct PendingIdent {
    name: String,
    byte_start: usize,
}

struct AssignmentState {
    operator_seen: bool,
    lhs: Vec<PendingIdent>,
}

pub struct SymbolsResult {
    pub emissions: Vec<Emission>,
}

pub fn build_symbols(ctx: &BuilderCtx, events: &[CstEvent], alias_hints: &[AliasHint]) -> SymbolsResult {
    let mut emissions = Vec::new();

    // scope_id -> (name -> symbol_id), persists after a scope is popped so
    // alias resolution can run as a second pass over the whole file.
    let mut scope_tables: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut parent_of: HashMap<String, String> = HashMap::new();
    scope_tables.insert(ctx.file_id.clone(), HashMap::new());

    // Module symbol: one per file, rooted at the file's own id.
    emissions.push(Emission::Symbol(SymbolRow {
        id: ids::symbol_id(&ctx.file_id, &ctx.path, "module", 0),
        scope_id: ctx.file_id.clone(),
        name: ctx.path.clone(),
        kind: SymbolKind::Module,
        visibility: Visibility::Public,
        is_dynamic: false,
        attrs_json: json!({}),
        provenance: ctx.provenance(0, ctx.source.len(), 1, ctx.source.lines().count().max(1)),
    }));

    let mut stack: Vec<Frame> = Vec::new();
    let mut param_list_depth = 0u32;
    let mut current_assignment: Option<AssignmentState> = None;

    let current_scope = |stack: &[Frame]| -> String {
        stack
            .last()
            .map(|f| f.scope_id.clone())
            .unwrap_or_else(|| /* file is the root scope */ String::new())
    };

    for event in events {
        match event.kind {
            EventKind::Enter => {
                let is_class = ctx.adapter.is_class(&event.type_name);
                let is_function = ctx.adapter.is_function(&event.type_name);
                if is_class || is_function {
                    let scope_id = ids::scope_id(&ctx.file_id, event.byte_start);
                    let parent_id = stack
                        .last()
                        .map(|f| f.scope_id.clone())
                        .unwrap_or_else(|| ctx.file_id.clone());
                    parent_of.insert(scope_id.clone(), parent_id);
                    scope_tables.entry(scope_id.clone()).or_default();
                    stack.push(Frame {
                        scope_id,
                        is_class,
                        byte_start: event.byte_start,
                        name: None,
                    });
                }
                if ctx.adapter.is_param_list(&event.type_name) {
                    param_list_depth += 1;
                }
                if ctx.adapter.is_assign(&event.type_name) && current_assignment.is_none() {
                    current_assignment = Some(AssignmentState {
                        operator_seen: false,
                        lhs: Vec::new(),
                    });
                }
            }
            EventKind::Token => {
                // Name capture for the innermost open class/function.
                if let Some(top) = stack.last_mut() {
                    if top.name.is_none()
                        && ctx.adapter.is_identifier_token(&event.type_name)
                        && event.byte_start.saturating_sub(top.byte_start) <= NAME_PROXIMITY_BYTES
                    {
                        top.name = Some(event.text(ctx.source).to_string());
                    }
                }

                if param_list_depth > 0 && ctx.adapter.is_identifier_token(&event.type_name) {
                    let name = event.text(ctx.source).to_string();
                    let scope_id = current_scope(&stack);
                    if !scope_id.is_empty() {
                        let id = ids::symbol_id(&scope_id, &name, "param", event.byte_start);
                        emissions.push(Emission::Symbol(SymbolRow {
                            id: id.clone(),
                            scope_id: scope_id.clone(),
                            name: name.clone(),
                            kind: SymbolKind::Param,
                            visibility: visibility_of(&name),
                            is_dynamic: false,
                            attrs_json: json!({}),
                            provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
                        }));
                        scope_tables.entry(scope_id).or_default().insert(name, id);
                    }
                    continue;
                }

                if let Some(assignment) = current_assignment.as_mut() {
                    if !assignment.operator_seen && ctx.adapter.is_assignment_operator(event.text(ctx.source)) {
                        assignment.operator_seen = true;
                        continue;
                    }
                    if !assignment.operator_seen && ctx.adapter.is_identifier_token(&event.type_name) {
                        assignment.lhs.push(PendingIdent {
                            name: event.text(ctx.source).to_string(),
                            byte_start: event.byte_start,
                        });
                    }
                }
            }
            EventKind::Exit => {
                if ctx.adapter.is_param_list(&event.type_name) && param_list_depth > 0 {
                    param_list_depth -= 1;
                }

                if ctx.adapter.is_assign(&event.type_name) {
                    if let Some(assignment) = current_assignment.take() {
                        // Deepest-bound identifier wins (e.g. `self.foo = 1`
                        // binds `foo`, not the `self` qualifier) — see
                        // DESIGN.md open-question note on attribute LHS.
                        if let Some(lhs) = assignment.lhs.last() {
                            let scope_id = current_scope(&stack);
                            let root_scope = if scope_id.is_empty() { ctx.file_id.clone() } else { scope_id };
                            let id = ids::symbol_id(&root_scope, &lhs.name, "variable", lhs.byte_start);
                            let is_attribute = assignment.lhs.len() > 1;
                            let attrs_json = if is_attribute {
                                json!({ "binding_form": "attribute" })
                            } else {
                                json!({})
                            };
                            emissions.push(Emission::Symbol(SymbolRow {
                                id: id.clone(),
                                scope_id: root_scope.clone(),
                                name: lhs.name.clone(),
                                kind: SymbolKind::Variable,
                                visibility: visibility_of(&lhs.name),
                                is_dynamic: false,
                                attrs_json,
                                provenance: ctx.provenance(
                                    lhs.byte_start,
                                    lhs.byte_start + lhs.name.len(),
                                    event.line_start,
                                    event.line_start,
                                ),
                            }));
                            scope_tables.entry(root_scope).or_default().insert(lhs.name.clone(), id);
                        }
                    }
                } else if ctx.adapter.is_class(&event.type_name) || ctx.adapter.is_function(&event.type_name) {
                    if let Some(frame) = stack.pop() {
                        let parent_id = stack.last().map(|f| f.scope_id.clone()).unwrap_or_else(|| ctx.file_id.clone());
                        let parent_is_class = stack.last().map(|f| f.is_class).unwrap_or(false);
                        let kind = if frame.is_class {
                            SymbolKind::Class
                        } else if parent_is_class {
                            SymbolKind::Method
                        } else {
                            SymbolKind::Function
                        };
                        let name = frame.name.clone().unwrap_or_default();
                        let kind_tag = match kind {
                            SymbolKind::Class => "class",
                            SymbolKind::Method => "method",
                            _ => "function",
                        };
                        let id = ids::symbol_id(&parent_id, &name, kind_tag, frame.byte_start);
                        emissions.push(Emission::Symbol(SymbolRow {
                            id: id.clone(),
                            scope_id: parent_id.clone(),
                            name: name.clone(),
                            kind,
                            visibility: visibility_of(&name),
                            is_dynamic: false,
                            attrs_json: json!({}),
                            provenance: ctx.provenance(frame.byte_start, event.byte_end, event.line_start, event.line_end),
                        }));
                        scope_tables.entry(parent_id).or_default().insert(name, id);
                    }
                } else if ctx.adapter.is_import(&event.type_name) {
                    emit_import_symbols(ctx, event, &stack, &mut scope_tables, &mut emissions);
                } else if ctx.adapter.is_export(&event.type_name) {
                    emit_export_symbols(ctx, event, &stack, &mut scope_tables, &mut emissions);
                }
            }
        }
    }

    resolve_alias_hints(ctx, alias_hints, &scope_tables, &parent_of, &mut emissions);

    SymbolsResult { emissions }
}

fn emit_import_symbols(
    ctx: &BuilderCtx,
    event: &CstEvent,
    stack: &[Frame],
    scope_tables: &mut HashMap<String, HashMap<String, String>>,
    emissions: &mut Vec<Emission>,
) {
    let scope_id = stack.last().map(|f| f.scope_id.clone()).unwrap_or_else(|| ctx.file_id.clone());
    let text = event.text(ctx.source);
    let pairs = extract_import_names(text);

    if pairs.is_empty() && text.contains('*') {
        let id = ids::symbol_id(&scope_id, "*", "import_star", event.byte_start);
        emissions.push(Emission::Symbol(SymbolRow {
            id: id.clone(),
            scope_id: scope_id.clone(),
            name: "*".to_string(),
            kind: SymbolKind::Import,
            visibility: Visibility::Public,
            is_dynamic: true,
            attrs_json: json!({ "pattern": "star" }),
            provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
        }));
        emissions.push(Emission::Alias(AliasRow {
            id: ids::alias_id("star_import", &id, event.byte_start),
            alias_kind: AliasKind::StarImport,
            alias_id: id.clone(),
            target_symbol_id: id,
            alias_name: "*".to_string(),
            attrs_json: json!({}),
            provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
        }));
        return;
    }

    for (source_name, alias) in pairs {
        let source_id = ids::symbol_id(&scope_id, &source_name, "import_src", event.byte_start);
        emissions.push(Emission::Symbol(SymbolRow {
            id: source_id.clone(),
            scope_id: scope_id.clone(),
            name: source_name.clone(),
            kind: SymbolKind::Import,
            visibility: Visibility::Public,
            is_dynamic: false,
            attrs_json: json!({ "role": "source" }),
            provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
        }));

        match alias {
            Some(alias_name) => {
                let alias_sym_id = ids::symbol_id(&scope_id, &alias_name, "import_alias", event.byte_start);
                emissions.push(Emission::Symbol(SymbolRow {
                    id: alias_sym_id.clone(),
                    scope_id: scope_id.clone(),
                    name: alias_name.clone(),
                    kind: SymbolKind::Import,
                    visibility: visibility_of(&alias_name),
                    is_dynamic: false,
                    attrs_json: json!({ "role": "alias" }),
                    provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
                }));
                emissions.push(Emission::Alias(AliasRow {
                    id: ids::alias_id("import", &alias_sym_id, event.byte_start),
                    alias_kind: AliasKind::Import,
                    alias_id: alias_sym_id.clone(),
                    target_symbol_id: source_id,
                    alias_name: alias_name.clone(),
                    attrs_json: json!({}),
                    provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
                }));
                scope_tables.entry(scope_id.clone()).or_default().insert(alias_name, alias_sym_id);
            }
            None => {
                scope_tables.entry(scope_id.clone()).or_default().insert(source_name, source_id);
            }
        }
    }
}

fn emit_export_symbols(
    ctx: &BuilderCtx,
    event: &CstEvent,
    stack: &[Frame],
    scope_tables: &mut HashMap<String, HashMap<String, String>>,
    emissions: &mut Vec<Emission>,
) {
    let scope_id = stack.last().map(|f| f.scope_id.clone()).unwrap_or_else(|| ctx.file_id.clone());
    let text = event.text(ctx.source);
    for (source_name, alias) in extract_export_names(text) {
        let source_id = ids::symbol_id(&scope_id, &source_name, "export_src", event.byte_start);
        emissions.push(Emission::Symbol(SymbolRow {
            id: source_id.clone(),
            scope_id: scope_id.clone(),
            name: source_name.clone(),
            kind: SymbolKind::Export,
            visibility: Visibility::Public,
            is_dynamic: false,
            attrs_json: json!({ "role": "source" }),
            provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
        }));

        if let Some(alias_name) = alias {
            let alias_sym_id = ids::symbol_id(&scope_id, &alias_name, "export_alias", event.byte_start);
            emissions.push(Emission::Symbol(SymbolRow {
                id: alias_sym_id.clone(),
                scope_id: scope_id.clone(),
                name: alias_name.clone(),
                kind: SymbolKind::Export,
                visibility: Visibility::Public,
                is_dynamic: false,
                attrs_json: json!({ "role": "alias" }),
                provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
            }));
            emissions.push(Emission::Alias(AliasRow {
                id: ids::alias_id("reexport", &alias_sym_id, event.byte_start),
                alias_kind: AliasKind::Reexport,
                alias_id: alias_sym_id,
                target_symbol_id: source_id,
                alias_name,
                attrs_json: json!({}),
                provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
            }));
        }
    }
}

fn resolve_alias_hints(
    ctx: &BuilderCtx,
    alias_hints: &[AliasHint],
    scope_tables: &HashMap<String, HashMap<String, String>>,
    parent_of: &HashMap<String, String>,
    emissions: &mut Vec<Emission>,
) {
    for (i, hint) in alias_hints.iter().enumerate() {
        let Some(alias_symbol_id) = scope_tables.get(&hint.scope_id).and_then(|t| t.get(&hint.lhs_name)) else {
            continue;
        };

        let target = find_outward(scope_tables, parent_of, &hint.scope_id, &hint.rhs_name);
        let provenance = ctx.provenance(0, 0, 1, 1);

        match target {
            Some(target_id) => emissions.push(Emission::Alias(AliasRow {
                id: ids::alias_id("assign", alias_symbol_id, i),
                alias_kind: AliasKind::Assign,
                alias_id: alias_symbol_id.clone(),
                target_symbol_id: target_id,
                alias_name: hint.lhs_name.clone(),
                attrs_json: json!({}),
                provenance,
            })),
            None => emissions.push(Emission::Alias(AliasRow {
                id: ids::alias_id("dynamic", alias_symbol_id, i),
                alias_kind: AliasKind::Dynamic,
                alias_id: alias_symbol_id.clone(),
                target_symbol_id: String::new(),
                alias_name: hint.lhs_name.clone(),
                attrs_json: json!({ "reason": "rhs symbol not resolvable without cross-file analysis" }),
                provenance,
            })),
        }
    }
}

fn find_outward(
    scope_tables: &HashMap<String, HashMap<String, String>>,
    parent_of: &HashMap<String, String>,
    start_scope: &str,
    name: &str,
) -> Option<String> {
    let mut current = start_scope.to_string();
    loop {
        if let Some(id) = scope_tables.get(&current).and_then(|t| t.get(name)) {
            return Some(id.clone());
        }
        match parent_of.get(&current) {
            Some(parent) if parent != &current => current = parent.clone(),
            _ => return None,
        }
    }
}

fn visibility_of(name: &str) -> Visibility {
    if name.starts_with('_') {
        Visibility::Private
    } else {
        Visibility::Public
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::dfg::build_dfg;
    use crate::config::model::Limits;
    use crate::model::language::LanguageKind;
    use crate::parser::driver::{ParserDriver, TreeSitterDriver};
    use std::collections::BTreeSet;

    fn ctx(source: &'static str) -> (BuilderCtx, Vec<CstEvent>) {
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
            source,
            "run1".into(),
            "cfg1".into(),
            "gsha".into(),
            Limits::default(),
        );
        (ctx, stream.events)
    }

    #[test]
    fn simple_alias_resolves_to_target_symbol() {
        let (ctx, events) = ctx("def a():\n    original = get()\n    aliased = original\n    processed = aliased.process()\n");
        let dfg = build_dfg(&ctx, &events);
        let result = build_symbols(&ctx, &events, &dfg.alias_hints);

        let aliases: Vec<_> = result
            .emissions
            .iter()
            .filter_map(|e| match e {
                Emission::Alias(a) if a.alias_kind == AliasKind::Assign => Some(a),
                _ => None,
            })
            .collect();
        assert_eq!(aliases.len(), 1);
        assert_eq!(aliases[0].alias_name, "aliased");
        assert!(!aliases[0].target_symbol_id.is_empty());
    }

    #[test]
    fn import_with_alias_produces_alias_row() {
        let (ctx, events) = ctx("from pkg.mod import A as B\n");
        let dfg = build_dfg(&ctx, &events);
        let result = build_symbols(&ctx, &events, &dfg.alias_hints);
        let has_import_alias = result
            .emissions
            .iter()
            .any(|e| matches!(e, Emission::Alias(a) if a.alias_kind == AliasKind::Import && a.alias_name == "B"));
        assert!(has_import_alias);
    }

    #[test]
    fn function_symbol_emitted_with_module_scope() {
        let (ctx, events) = ctx("def f():\n    return 1\n");
        let dfg = build_dfg(&ctx, &events);
        let result = build_symbols(&ctx, &events, &dfg.alias_hints);
        let func = result.emissions.iter().find_map(|e| match e {
            Emission::Symbol(s) if s.kind == SymbolKind::Function => Some(s),
            _ => None,
        });
        assert!(func.is_some());
        assert_eq!(func.unwrap().name, "f");
    }
}
