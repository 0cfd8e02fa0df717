//! DFG builder — the hardest subsystem (spec §4.4).
//!
//! Produces intra-scope SSA-lite data flow without a full type system: a
//! stack of `Scope`s, each tracking `name -> VariableState`, plus a single
//! `current_assignment` record while inside an assignment's subtree.

use crate::builders::context::BuilderCtx;
use crate::core::ids;
use crate::model::event::{CstEvent, EventKind};
use crate::model::rows::{AnomalyKind, AnomalyRow, DfgEdgeKind, DfgEdgeRow, DfgNodeKind, DfgNodeRow, Emission, Severity};
use serde_json::json;
use std::collections::HashMap;

#[derive(Clone)]
struct VariableState {
    current_version: u32,
    latest_defining_node_id: String,
}

struct Scope {
    scope_id: String,
    is_class: bool,
    vars: HashMap<String, VariableState>,
    def_count: usize,
    use_count: usize,
    capped: bool,
}

impl Scope {
    fn new(scope_id: String, is_class: bool) -> Self {
        Self {
            scope_id,
            is_class,
            vars: HashMap::new(),
            def_count: 0,
            use_count: 0,
            capped: false,
        }
    }
}

struct PendingIdent {
    name: String,
    byte_start: usize,
    /// `self.foo`/`this.foo`-style attribute access, combined into one name
    /// at token time so it resolves against the enclosing class scope
    /// instead of the method's own scope (spec §8 scenario (d)).
    is_attribute: bool,
}

/// If `text` is `self`/`this` and immediately followed by `.identifier` in
/// source, combine into one logical name and report the chain's end byte so
/// the caller can suppress the attribute token that follows.
fn try_attribute_chain(source: &str, text: &str, byte_end: usize) -> Option<(String, usize)> {
    if text != "self" && text != "this" {
        return None;
    }
    let rest = source.get(byte_end..)?.strip_prefix('.')?;
    let ident_end = rest.find(|c: char| !(c.is_alphanumeric() || c == '_')).unwrap_or(rest.len());
    if ident_end == 0 {
        return None;
    }
    Some((format!("{text}.{}", &rest[..ident_end]), byte_end + 1 + ident_end))
}

struct AssignmentState {
    operator_seen: bool,
    lhs: Vec<PendingIdent>,
    rhs: Vec<PendingIdent>,
}

/// A lightweight record signaling a direct `lhs = rhs` identifier binding,
/// consumed by the Symbols/Aliases builder.
#[derive(Debug, Clone)]
pub struct AliasHint {
    pub lhs_name: String,
    pub rhs_name: String,
    pub scope_id: String,
}

pub struct DfgResult {
    pub emissions: Vec<Emission>,
    pub anomalies: Vec<AnomalyRow>,
    pub alias_hints: Vec<AliasHint>,
}

pub fn build_dfg(ctx: &BuilderCtx, events: &[CstEvent]) -> DfgResult {
    let mut emissions = Vec::new();
    let mut anomalies = Vec::new();
    let mut alias_hints = Vec::new();

    let mut scopes: Vec<Scope> = vec![Scope::new(ctx.file_id.clone(), false)];
    let mut node_stack: Vec<(String, usize)> = Vec::new();
    let mut current_assignment: Option<AssignmentState> = None;
    let mut param_list_depth: u32 = 0;
    let mut suppress_until: usize = 0;

    for event in events {
        match event.kind {
            EventKind::Enter => {
                if ctx.adapter.is_function(&event.type_name) {
                    let scope_id = ids::scope_id(&ctx.file_id, event.byte_start);
                    scopes.push(Scope::new(scope_id, false));
                } else if ctx.adapter.is_class(&event.type_name) {
                    let scope_id = ids::scope_id(&ctx.file_id, event.byte_start);
                    scopes.push(Scope::new(scope_id, true));
                }
                if ctx.adapter.is_param_list(&event.type_name) {
                    param_list_depth += 1;
                }
                if ctx.adapter.is_assign(&event.type_name) && current_assignment.is_none() {
                    current_assignment = Some(AssignmentState {
                        operator_seen: false,
                        lhs: Vec::new(),
                        rhs: Vec::new(),
                    });
                }
                node_stack.push((event.type_name.clone(), event.byte_start));
            }
            EventKind::Token => {
                handle_token(
                    ctx,
                    event,
                    &mut scopes,
                    &mut current_assignment,
                    &node_stack,
                    param_list_depth > 0,
                    &mut suppress_until,
                    &mut emissions,
                    &mut anomalies,
                );
            }
            EventKind::Exit => {
                node_stack.pop();

                if ctx.adapter.is_param_list(&event.type_name) && param_list_depth > 0 {
                    param_list_depth -= 1;
                }

                let closes_current_assignment = ctx.adapter.is_assign(&event.type_name) && current_assignment.is_some();
                if closes_current_assignment {
                    finish_assignment(ctx, event, &mut scopes, current_assignment.take().unwrap(), &mut alias_hints, &mut emissions, &mut anomalies);
                }

                if (ctx.adapter.is_function(&event.type_name) || ctx.adapter.is_class(&event.type_name)) && scopes.len() > 1 {
                    scopes.pop();
                }
            }
        }
    }

    DfgResult {
        emissions,
        anomalies,
        alias_hints,
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_token(
    ctx: &BuilderCtx,
    event: &CstEvent,
    scopes: &mut [Scope],
    current_assignment: &mut Option<AssignmentState>,
    node_stack: &[(String, usize)],
    in_param_list: bool,
    suppress_until: &mut usize,
    emissions: &mut Vec<Emission>,
    anomalies: &mut Vec<AnomalyRow>,
) {
    let raw_text = event.text(ctx.source);

    // Operators (`=`, `+=`, ...) are never identifier tokens; check before
    // the identifier-only handling below so assignment state still advances.
    if let Some(assignment) = current_assignment.as_mut() {
        if !assignment.operator_seen && !ctx.adapter.is_identifier_token(&event.type_name) && ctx.adapter.is_assignment_operator(raw_text) {
            assignment.operator_seen = true;
            return;
        }
    }

    if !ctx.adapter.is_identifier_token(&event.type_name) {
        return;
    }
    if event.byte_start < *suppress_until {
        // consumed as the attribute half of a `self.foo`/`this.foo` chain
        return;
    }

    let (name, is_attribute): (String, bool) = match try_attribute_chain(ctx.source, raw_text, event.byte_end) {
        Some((combined, chain_end)) => {
            *suppress_until = chain_end;
            (combined, true)
        }
        None => (raw_text.to_string(), false),
    };
    let text = name.as_str();

    if in_param_list {
        let scope = scopes.last_mut().expect("at least one scope always present");
        if scope.capped {
            return;
        }
        if scope.def_count >= ctx.limits.max_dfg_defs_per_scope {
            cap_scope(ctx, scope, event, anomalies);
            return;
        }
        let node_id = ids::dfg_def_id(&scope.scope_id, text, 0);
        emissions.push(Emission::DfgNode(DfgNodeRow {
            id: node_id.clone(),
            func_id: scope.scope_id.clone(),
            kind: DfgNodeKind::Param,
            name: Some(text.to_string()),
            version: Some(0),
            path: ctx.path.clone(),
            lang: ctx.lang.to_string(),
            attrs_json: json!({}),
            provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
        }));
        scope.vars.insert(
            text.to_string(),
            VariableState {
                current_version: 0,
                latest_defining_node_id: node_id,
            },
        );
        scope.def_count += 1;
        return;
    }

    if let Some(assignment) = current_assignment.as_mut() {
        let in_assign_target = node_stack.iter().any(|(t, _)| ctx.adapter.is_assign_target(t));
        if !assignment.operator_seen || in_assign_target {
            assignment.lhs.push(PendingIdent {
                name: text.to_string(),
                byte_start: event.byte_start,
                is_attribute,
            });
        } else {
            assignment.rhs.push(PendingIdent {
                name: text.to_string(),
                byte_start: event.byte_start,
                is_attribute,
            });
        }
        return;
    }

    emit_use_if_found(ctx, text, is_attribute, event, scopes, emissions, anomalies);
}

fn emit_use_if_found(
    ctx: &BuilderCtx,
    name: &str,
    is_attribute: bool,
    event: &CstEvent,
    scopes: &mut [Scope],
    emissions: &mut Vec<Emission>,
    anomalies: &mut Vec<AnomalyRow>,
) {
    let found = find_in_scopes(scopes, name);
    // `self.foo`/`this.foo` uses are counted against the class scope so
    // cross-method attribute DEF_USE shares one scope_id (spec §8 (d));
    // plain locals are counted against the innermost scope as before.
    let home_idx = if is_attribute {
        nearest_class_scope_idx(scopes).unwrap_or(scopes.len() - 1)
    } else {
        scopes.len() - 1
    };
    let current_scope = &mut scopes[home_idx];
    if current_scope.capped {
        return;
    }
    if current_scope.use_count >= ctx.limits.max_dfg_uses_per_scope {
        cap_scope(ctx, current_scope, event, anomalies);
        return;
    }
    current_scope.use_count += 1;

    let Some((owner_scope_id, version, def_node_id)) = found else {
        // Implicit reference to an unseen binding: emit VAR_USE, no DEF_USE.
        let use_id = ids::dfg_use_id(&current_scope.scope_id, name, 0, event.byte_start);
        emissions.push(Emission::DfgNode(DfgNodeRow {
            id: use_id,
            func_id: current_scope.scope_id.clone(),
            kind: DfgNodeKind::VarUse,
            name: Some(name.to_string()),
            version: None,
            path: ctx.path.clone(),
            lang: ctx.lang.to_string(),
            attrs_json: json!({ "resolved": false }),
            provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
        }));
        return;
    };

    let use_id = ids::dfg_use_id(&owner_scope_id, name, version, event.byte_start);
    emissions.push(Emission::DfgNode(DfgNodeRow {
        id: use_id.clone(),
        func_id: owner_scope_id.clone(),
        kind: DfgNodeKind::VarUse,
        name: Some(name.to_string()),
        version: Some(version),
        path: ctx.path.clone(),
        lang: ctx.lang.to_string(),
        attrs_json: json!({ "resolved": true }),
        provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
    }));
    emissions.push(Emission::DfgEdge(DfgEdgeRow {
        id: ids::edge_id("def_use", &def_node_id, &use_id, event.byte_start),
        func_id: owner_scope_id,
        kind: DfgEdgeKind::DefUse,
        src_id: def_node_id,
        dst_id: use_id,
        provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
    }));
}

/// Index of the nearest enclosing class scope, innermost first.
fn nearest_class_scope_idx(scopes: &[Scope]) -> Option<usize> {
    scopes.iter().rposition(|s| s.is_class)
}

/// Walk the scope stack outward (innermost first) looking for `name`.
fn find_in_scopes(scopes: &[Scope], name: &str) -> Option<(String, u32, String)> {
    for scope in scopes.iter().rev() {
        if let Some(state) = scope.vars.get(name) {
            return Some((scope.scope_id.clone(), state.current_version, state.latest_defining_node_id.clone()));
        }
    }
    None
}

fn cap_scope(ctx: &BuilderCtx, scope: &mut Scope, event: &CstEvent, anomalies: &mut Vec<AnomalyRow>) {
    scope.capped = true;
    anomalies.push(AnomalyRow {
        path: ctx.path.clone(),
        blob_sha: Some(ctx.blob_sha.clone()),
        kind: AnomalyKind::MemoryLimit,
        severity: Severity::Warn,
        detail: format!("DFG def/use cap exceeded for scope {}", scope.scope_id),
        byte_start: Some(event.byte_start),
        byte_end: Some(event.byte_end),
        timestamp: crate::core::time::now_iso8601(),
    });
}

/// EXIT assign: first all RHS uses (resolved at this moment), then each LHS
/// def gets a new version. This ordering is what makes `x = x + 1` use the
/// old version of `x` on the right before `x` is redefined.
fn finish_assignment(
    ctx: &BuilderCtx,
    event: &CstEvent,
    scopes: &mut [Scope],
    assignment: AssignmentState,
    alias_hints: &mut Vec<AliasHint>,
    emissions: &mut Vec<Emission>,
    anomalies: &mut Vec<AnomalyRow>,
) {
    for rhs in &assignment.rhs {
        let rhs_event = CstEvent::new(event.kind, "identifier", rhs.byte_start, rhs.byte_start + rhs.name.len(), event.line_start, event.line_start);
        emit_use_if_found(ctx, &rhs.name, rhs.is_attribute, &rhs_event, scopes, emissions, anomalies);
    }

    let scope_id = scopes.last().expect("at least one scope always present").scope_id.clone();

    for lhs in &assignment.lhs {
        let home_idx = if lhs.is_attribute {
            nearest_class_scope_idx(scopes).unwrap_or(scopes.len() - 1)
        } else {
            scopes.len() - 1
        };
        let scope = &mut scopes[home_idx];
        if scope.capped {
            continue;
        }
        if scope.def_count >= ctx.limits.max_dfg_defs_per_scope {
            cap_scope(ctx, scope, event, anomalies);
            continue;
        }
        let next_version = scope.vars.get(&lhs.name).map(|s| s.current_version + 1).unwrap_or(0);
        let def_id = ids::dfg_def_id(&scope.scope_id, &lhs.name, next_version);
        emissions.push(Emission::DfgNode(DfgNodeRow {
            id: def_id.clone(),
            func_id: scope.scope_id.clone(),
            kind: DfgNodeKind::VarDef,
            name: Some(lhs.name.clone()),
            version: Some(next_version),
            path: ctx.path.clone(),
            lang: ctx.lang.to_string(),
            attrs_json: json!({}),
            provenance: ctx.provenance(lhs.byte_start, lhs.byte_start + lhs.name.len(), event.line_start, event.line_start),
        }));
        scope.vars.insert(
            lhs.name.clone(),
            VariableState {
                current_version: next_version,
                latest_defining_node_id: def_id,
            },
        );
        scope.def_count += 1;
    }

    // Only a bare `lhs = rhs_name` where `rhs_name` resolves to a known
    // binding counts as an alias — `original = get()` has a one-identifier
    // RHS too (`get`), but `get` is a call target, not a binding, so no hint.
    if assignment.lhs.len() == 1 && assignment.rhs.len() == 1 {
        let rhs = &assignment.rhs[0];
        if find_in_scopes(scopes, &rhs.name).is_some() {
            alias_hints.push(AliasHint {
                lhs_name: assignment.lhs[0].name.clone(),
                rhs_name: rhs.name.clone(),
                scope_id,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::Limits;
    use crate::model::language::LanguageKind;
    use crate::parser::driver::{ParserDriver, TreeSitterDriver};
    use std::collections::BTreeSet;

    fn run(source: &'static str) -> DfgResult {
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
        build_dfg(&ctx, &stream.events)
    }

    #[test]
    fn ssa_reassignment_scenario() {
        let result = run("def f():\n    x = 10\n    y = x\n    x = 20\n    z = x\n");
        let defs: Vec<_> = result
            .emissions
            .iter()
            .filter_map(|e| match e {
                Emission::DfgNode(n) if n.kind == DfgNodeKind::VarDef && n.name.as_deref() == Some("x") => n.version,
                _ => None,
            })
            .collect();
        assert_eq!(defs, vec![0, 1]);

        let def_use_count = result
            .emissions
            .iter()
            .filter(|e| matches!(e, Emission::DfgEdge(ed) if ed.kind == DfgEdgeKind::DefUse))
            .count();
        assert_eq!(def_use_count, 2);
    }

    #[test]
    fn parameter_flow_scenario() {
        let result = run("def g(p1, p2):\n    x = p1\n    return p2\n");
        let params: Vec<_> = result
            .emissions
            .iter()
            .filter_map(|e| match e {
                Emission::DfgNode(n) if n.kind == DfgNodeKind::Param => n.name.clone(),
                _ => None,
            })
            .collect();
        assert_eq!(params, vec!["p1".to_string(), "p2".to_string()]);
    }

    #[test]
    fn self_attribute_def_use_shares_class_scope_across_methods() {
        let result = run("class C:\n    def __init__(self):\n        self.foo = 100\n    def get_foo(self):\n        return self.foo\n");

        let def = result.emissions.iter().find_map(|e| match e {
            Emission::DfgNode(n) if n.kind == DfgNodeKind::VarDef && n.name.as_deref() == Some("self.foo") => Some(n),
            _ => None,
        });
        let usage = result.emissions.iter().find_map(|e| match e {
            Emission::DfgNode(n) if n.kind == DfgNodeKind::VarUse && n.name.as_deref() == Some("self.foo") => Some(n),
            _ => None,
        });
        let def = def.expect("self.foo VAR_DEF present");
        let usage = usage.expect("self.foo VAR_USE present");
        assert_eq!(def.func_id, usage.func_id, "attribute def/use share the class-level scope");

        let has_def_use_edge = result
            .emissions
            .iter()
            .any(|e| matches!(e, Emission::DfgEdge(ed) if ed.kind == DfgEdgeKind::DefUse && ed.src_id == def.id && ed.dst_id == usage.id));
        assert!(has_def_use_edge, "self.foo use resolves to the __init__ def across methods");
    }

    #[test]
    fn simple_alias_hint_scenario() {
        let result = run("def a():\n    original = get()\n    aliased = original\n    processed = aliased.process()\n");
        assert_eq!(result.alias_hints.len(), 1);
        assert_eq!(result.alias_hints[0].lhs_name, "aliased");
        assert_eq!(result.alias_hints[0].rhs_name, "original");
    }
}
