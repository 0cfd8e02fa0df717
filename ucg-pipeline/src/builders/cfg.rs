//! CFG builder: per-function basic blocks and typed edges, per spec §4.3.
//!
//! Opened on ENTER of a function node, closed on its EXIT. Nested functions
//! (closures, methods defined inline) get their own independent CFG — we
//! push a fresh `FunctionCfg` per function ENTER rather than flattening.

use crate::builders::context::BuilderCtx;
use crate::core::ids;
use crate::model::event::{CstEvent, EventKind};
use crate::model::rows::{AnomalyKind, AnomalyRow, CfgBlockKind, CfgBlockRow, CfgEdgeKind, CfgEdgeRow, Emission, Severity};
use serde_json::json;

/// State for one open if/switch construct, linking its predicate to both
/// arms so the merge block at EXIT can wire them up regardless of how far
/// `current_block_id` wandered while the arm bodies were processed.
struct BranchFrame {
    predicate_id: String,
    true_end_id: Option<String>,
    true_end_kind: Option<CfgBlockKind>,
    false_start_id: Option<String>,
    false_end_id: Option<String>,
    false_end_kind: Option<CfgBlockKind>,
}

struct FunctionCfg {
    func_id: String,
    byte_start: usize,
    line_start: usize,
    next_index: u32,
    current_block_id: String,
    current_kind: CfgBlockKind,
    block_count: u32,
    overflowed: bool,
    /// `None` entries mark a branch construct whose predicate/arm blocks
    /// could not be allocated (cap overflow) — `close_branch` still needs a
    /// matching pop so nested constructs don't desync.
    branch_stack: Vec<Option<BranchFrame>>,
}

impl FunctionCfg {
    fn new(ctx: &BuilderCtx, func_byte_start: usize, line_start: usize) -> Self {
        let func_id = ids::scope_id(&ctx.file_id, func_byte_start);
        let entry_id = ids::cfg_block_id(&func_id, 0, "entry");
        Self {
            func_id,
            byte_start: func_byte_start,
            line_start,
            next_index: 1,
            current_block_id: entry_id,
            current_kind: CfgBlockKind::Entry,
            block_count: 1,
            overflowed: false,
            branch_stack: Vec::new(),
        }
    }

    fn alloc_block(&mut self, ctx: &BuilderCtx, kind: CfgBlockKind, tag: &str) -> Option<String> {
        if self.overflowed {
            return None;
        }
        if self.block_count >= ctx.limits.max_cfg_blocks_per_function as u32 {
            self.overflowed = true;
            return None;
        }
        let idx = self.next_index;
        self.next_index += 1;
        self.block_count += 1;
        Some(ids::cfg_block_id(&self.func_id, idx, tag))
    }
}

pub struct CfgResult {
    pub emissions: Vec<Emission>,
    pub anomalies: Vec<AnomalyRow>,
}

pub fn build_cfg(ctx: &BuilderCtx, events: &[CstEvent]) -> CfgResult {
    let mut emissions = Vec::new();
    let mut anomalies = Vec::new();
    let mut stack: Vec<FunctionCfg> = Vec::new();

    for event in events {
        match event.kind {
            EventKind::Enter => {
                if ctx.adapter.is_function(&event.type_name) {
                    stack.push(FunctionCfg::new(ctx, event.byte_start, event.line_start));
                    if let Some(f) = stack.last() {
                        emissions.push(emit_block(ctx, f, CfgBlockKind::Entry, 0, event));
                    }
                    continue;
                }

                let Some(f) = stack.last_mut() else { continue };
                if ctx.adapter.is_if(&event.type_name) || ctx.adapter.is_switch(&event.type_name) {
                    enter_branch(ctx, f, event, &mut emissions);
                } else if ctx.adapter.is_else(&event.type_name) {
                    enter_else(ctx, f, event, &mut emissions);
                }
            }
            EventKind::Exit => {
                if ctx.adapter.is_function(&event.type_name) {
                    if let Some(mut f) = stack.pop() {
                        finish_function(ctx, &mut f, event, &mut emissions, &mut anomalies);
                    }
                    continue;
                }

                let Some(f) = stack.last_mut() else { continue };

                if ctx.adapter.is_if(&event.type_name) || ctx.adapter.is_switch(&event.type_name) {
                    close_branch(ctx, f, event, &mut emissions);
                } else if ctx.adapter.is_while(&event.type_name) || ctx.adapter.is_for(&event.type_name) {
                    handle_loop(ctx, f, event, &mut emissions);
                } else if ctx.adapter.is_return(&event.type_name) {
                    handle_return(ctx, f, event, &mut emissions);
                } else if ctx.adapter.is_throw(&event.type_name) {
                    handle_throw(ctx, f, event, &mut emissions);
                } else if ctx.adapter.is_try(&event.type_name) {
                    handle_try(ctx, f, event, &mut emissions);
                }

                if f.overflowed {
                    anomalies.push(AnomalyRow {
                        path: ctx.path.clone(),
                        blob_sha: Some(ctx.blob_sha.clone()),
                        kind: AnomalyKind::MemoryLimit,
                        severity: Severity::Warn,
                        detail: "per-function CFG block cap exceeded".to_string(),
                        byte_start: Some(f.byte_start),
                        byte_end: Some(event.byte_end),
                        timestamp: crate::core::time::now_iso8601(),
                    });
                }
            }
            EventKind::Token => {}
        }
    }

    // Unfinished functions at EOF: synthesize EXIT + NEXT from current block.
    let file_end = ctx.source.len();
    while let Some(mut f) = stack.pop() {
        let synthetic_event = CstEvent::new(EventKind::Exit, "synthetic_eof", file_end, file_end, 1, 1);
        finish_function(ctx, &mut f, &synthetic_event, &mut emissions, &mut anomalies);
    }

    CfgResult { emissions, anomalies }
}

fn emit_block(ctx: &BuilderCtx, f: &FunctionCfg, kind: CfgBlockKind, index: u32, event: &CstEvent) -> Emission {
    let id = if index == 0 {
        f.current_block_id.clone()
    } else {
        ids::cfg_block_id(&f.func_id, index, block_tag(kind))
    };
    Emission::CfgBlock(CfgBlockRow {
        id,
        func_id: f.func_id.clone(),
        kind,
        index,
        path: ctx.path.clone(),
        lang: ctx.lang.to_string(),
        attrs_json: json!({}),
        provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
    })
}

fn block_tag(kind: CfgBlockKind) -> &'static str {
    match kind {
        CfgBlockKind::Entry => "entry",
        CfgBlockKind::Predicate => "predicate",
        CfgBlockKind::Body => "body",
        CfgBlockKind::Handler => "handler",
        CfgBlockKind::Exit => "exit",
    }
}

/// ENTER of an if/switch: close off the block that precedes it with a real
/// `Predicate` block, then open the true arm. Doing this at ENTER (rather
/// than waiting for EXIT) means a `return`/`throw` inside the true arm sees
/// the true-arm block as `current_block_id`, not whatever block the whole
/// construct happens to land on after its body already ran.
fn enter_branch(ctx: &BuilderCtx, f: &mut FunctionCfg, event: &CstEvent, out: &mut Vec<Emission>) {
    let prior_id = f.current_block_id.clone();
    let Some(predicate_id) = f.alloc_block(ctx, CfgBlockKind::Predicate, "predicate") else {
        f.branch_stack.push(None);
        return;
    };
    out.push(Emission::CfgBlock(CfgBlockRow {
        id: predicate_id.clone(),
        func_id: f.func_id.clone(),
        kind: CfgBlockKind::Predicate,
        index: f.next_index - 1,
        path: ctx.path.clone(),
        lang: ctx.lang.to_string(),
        attrs_json: json!({}),
        provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
    }));
    out.push(cfg_edge(ctx, f, CfgEdgeKind::Next, &prior_id, &predicate_id, event));

    let Some(true_id) = f.alloc_block(ctx, CfgBlockKind::Body, "true_arm") else {
        f.branch_stack.push(None);
        return;
    };
    out.push(Emission::CfgBlock(CfgBlockRow {
        id: true_id.clone(),
        func_id: f.func_id.clone(),
        kind: CfgBlockKind::Body,
        index: f.next_index - 1,
        path: ctx.path.clone(),
        lang: ctx.lang.to_string(),
        attrs_json: json!({ "arm": "true" }),
        provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
    }));
    out.push(cfg_edge(ctx, f, CfgEdgeKind::True, &predicate_id, &true_id, event));

    f.current_block_id = true_id;
    f.current_kind = CfgBlockKind::Body;
    f.branch_stack.push(Some(BranchFrame {
        predicate_id,
        true_end_id: None,
        true_end_kind: None,
        false_start_id: None,
        false_end_id: None,
        false_end_kind: None,
    }));
}

/// ENTER of an else/elif clause: record where the true arm left off, then
/// open a false arm hanging off the same predicate.
fn enter_else(ctx: &BuilderCtx, f: &mut FunctionCfg, event: &CstEvent, out: &mut Vec<Emission>) {
    let Some(Some(frame)) = f.branch_stack.last_mut() else { return };
    frame.true_end_id = Some(f.current_block_id.clone());
    frame.true_end_kind = Some(f.current_kind);
    let predicate_id = frame.predicate_id.clone();

    let Some(false_id) = f.alloc_block(ctx, CfgBlockKind::Body, "false_arm") else { return };
    out.push(Emission::CfgBlock(CfgBlockRow {
        id: false_id.clone(),
        func_id: f.func_id.clone(),
        kind: CfgBlockKind::Body,
        index: f.next_index - 1,
        path: ctx.path.clone(),
        lang: ctx.lang.to_string(),
        attrs_json: json!({ "arm": "false" }),
        provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
    }));
    out.push(cfg_edge(ctx, f, CfgEdgeKind::False, &predicate_id, &false_id, event));

    let Some(Some(frame)) = f.branch_stack.last_mut() else { return };
    frame.false_start_id = Some(false_id.clone());
    f.current_block_id = false_id;
    f.current_kind = CfgBlockKind::Body;
}

/// EXIT of an if/switch: merge whichever arms fell through (didn't already
/// end in an EXIT block via return/throw) into one successor block. An arm
/// with no else falls straight from the predicate's False edge to the merge.
fn close_branch(ctx: &BuilderCtx, f: &mut FunctionCfg, event: &CstEvent, out: &mut Vec<Emission>) {
    let Some(slot) = f.branch_stack.pop() else { return };
    let Some(mut frame) = slot else { return };

    if frame.false_start_id.is_some() {
        frame.false_end_id = Some(f.current_block_id.clone());
        frame.false_end_kind = Some(f.current_kind);
    } else if frame.true_end_id.is_none() {
        frame.true_end_id = Some(f.current_block_id.clone());
        frame.true_end_kind = Some(f.current_kind);
    }

    let Some(merge_id) = f.alloc_block(ctx, CfgBlockKind::Body, "merge") else { return };
    out.push(Emission::CfgBlock(CfgBlockRow {
        id: merge_id.clone(),
        func_id: f.func_id.clone(),
        kind: CfgBlockKind::Body,
        index: f.next_index - 1,
        path: ctx.path.clone(),
        lang: ctx.lang.to_string(),
        attrs_json: json!({ "merge": true }),
        provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
    }));

    if let Some(true_end_id) = &frame.true_end_id {
        if frame.true_end_kind != Some(CfgBlockKind::Exit) {
            out.push(cfg_edge(ctx, f, CfgEdgeKind::Next, true_end_id, &merge_id, event));
        }
    }

    match (&frame.false_start_id, &frame.false_end_id) {
        (Some(_), Some(false_end_id)) => {
            if frame.false_end_kind != Some(CfgBlockKind::Exit) {
                out.push(cfg_edge(ctx, f, CfgEdgeKind::Next, false_end_id, &merge_id, event));
            }
        }
        _ => {
            // No else/elif: the predicate's own False edge reaches the merge.
            out.push(cfg_edge(ctx, f, CfgEdgeKind::False, &frame.predicate_id, &merge_id, event));
        }
    }

    f.current_block_id = merge_id;
    f.current_kind = CfgBlockKind::Body;
}

fn handle_loop(ctx: &BuilderCtx, f: &mut FunctionCfg, event: &CstEvent, out: &mut Vec<Emission>) {
    let predicate_id = f.current_block_id.clone();
    let Some(body_id) = f.alloc_block(ctx, CfgBlockKind::Body, "loop_body") else { return };
    out.push(Emission::CfgBlock(CfgBlockRow {
        id: body_id.clone(),
        func_id: f.func_id.clone(),
        kind: CfgBlockKind::Body,
        index: f.next_index - 1,
        path: ctx.path.clone(),
        lang: ctx.lang.to_string(),
        attrs_json: json!({ "loop": "body" }),
        provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
    }));
    out.push(cfg_edge(ctx, f, CfgEdgeKind::True, &predicate_id, &body_id, event));
    out.push(cfg_edge(ctx, f, CfgEdgeKind::Next, &body_id, &predicate_id, event));

    let Some(after_id) = f.alloc_block(ctx, CfgBlockKind::Body, "after_loop") else { return };
    out.push(Emission::CfgBlock(CfgBlockRow {
        id: after_id.clone(),
        func_id: f.func_id.clone(),
        kind: CfgBlockKind::Body,
        index: f.next_index - 1,
        path: ctx.path.clone(),
        lang: ctx.lang.to_string(),
        attrs_json: json!({ "loop": "after" }),
        provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
    }));
    out.push(cfg_edge(ctx, f, CfgEdgeKind::False, &predicate_id, &after_id, event));

    f.current_block_id = after_id;
    f.current_kind = CfgBlockKind::Body;
}

fn handle_return(ctx: &BuilderCtx, f: &mut FunctionCfg, event: &CstEvent, out: &mut Vec<Emission>) {
    let from_id = f.current_block_id.clone();
    let Some(exit_id) = f.alloc_block(ctx, CfgBlockKind::Exit, "exit") else { return };
    out.push(Emission::CfgBlock(CfgBlockRow {
        id: exit_id.clone(),
        func_id: f.func_id.clone(),
        kind: CfgBlockKind::Exit,
        index: f.next_index - 1,
        path: ctx.path.clone(),
        lang: ctx.lang.to_string(),
        attrs_json: json!({}),
        provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
    }));
    out.push(cfg_edge(ctx, f, CfgEdgeKind::Return, &from_id, &exit_id, event));
    f.current_block_id = exit_id;
    f.current_kind = CfgBlockKind::Exit;
}

fn handle_throw(ctx: &BuilderCtx, f: &mut FunctionCfg, event: &CstEvent, out: &mut Vec<Emission>) {
    let from_id = f.current_block_id.clone();
    let Some(exit_id) = f.alloc_block(ctx, CfgBlockKind::Exit, "exit") else { return };
    out.push(Emission::CfgBlock(CfgBlockRow {
        id: exit_id.clone(),
        func_id: f.func_id.clone(),
        kind: CfgBlockKind::Exit,
        index: f.next_index - 1,
        path: ctx.path.clone(),
        lang: ctx.lang.to_string(),
        attrs_json: json!({}),
        provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
    }));
    out.push(cfg_edge(ctx, f, CfgEdgeKind::Exception, &from_id, &exit_id, event));
    f.current_block_id = exit_id;
    f.current_kind = CfgBlockKind::Exit;
}

fn handle_try(ctx: &BuilderCtx, f: &mut FunctionCfg, event: &CstEvent, out: &mut Vec<Emission>) {
    let from_id = f.current_block_id.clone();
    let Some(handler_id) = f.alloc_block(ctx, CfgBlockKind::Handler, "handler") else { return };
    out.push(Emission::CfgBlock(CfgBlockRow {
        id: handler_id.clone(),
        func_id: f.func_id.clone(),
        kind: CfgBlockKind::Handler,
        index: f.next_index - 1,
        path: ctx.path.clone(),
        lang: ctx.lang.to_string(),
        attrs_json: json!({}),
        provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
    }));
    out.push(cfg_edge(ctx, f, CfgEdgeKind::Exception, &from_id, &handler_id, event));

    let Some(after_id) = f.alloc_block(ctx, CfgBlockKind::Body, "after_handler") else { return };
    out.push(Emission::CfgBlock(CfgBlockRow {
        id: after_id.clone(),
        func_id: f.func_id.clone(),
        kind: CfgBlockKind::Body,
        index: f.next_index - 1,
        path: ctx.path.clone(),
        lang: ctx.lang.to_string(),
        attrs_json: json!({}),
        provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
    }));
    out.push(cfg_edge(ctx, f, CfgEdgeKind::Next, &handler_id, &after_id, event));

    f.current_block_id = after_id;
    f.current_kind = CfgBlockKind::Body;
}

fn finish_function(
    ctx: &BuilderCtx,
    f: &mut FunctionCfg,
    event: &CstEvent,
    out: &mut Vec<Emission>,
    anomalies: &mut Vec<AnomalyRow>,
) {
    if f.overflowed {
        let overflow_exit = ids::cfg_block_id(&f.func_id, u32::MAX - 1, "overflow_exit");
        out.push(Emission::CfgBlock(CfgBlockRow {
            id: overflow_exit.clone(),
            func_id: f.func_id.clone(),
            kind: CfgBlockKind::Exit,
            index: u32::MAX - 1,
            path: ctx.path.clone(),
            lang: ctx.lang.to_string(),
            attrs_json: json!({ "synthetic": true, "reason": "block_cap_overflow" }),
            provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
        }));
        out.push(cfg_edge(ctx, f, CfgEdgeKind::Next, &f.current_block_id.clone(), &overflow_exit, event));
        anomalies.push(AnomalyRow {
            path: ctx.path.clone(),
            blob_sha: Some(ctx.blob_sha.clone()),
            kind: AnomalyKind::MemoryLimit,
            severity: Severity::Warn,
            detail: "CFG block cap exceeded; synthesized overflow exit".to_string(),
            byte_start: Some(f.byte_start),
            byte_end: Some(event.byte_end),
            timestamp: crate::core::time::now_iso8601(),
        });
        return;
    }

    // If the current block is not already an EXIT (e.g. function body fell
    // through without an explicit return), synthesize one with a NEXT edge.
    if f.current_kind != CfgBlockKind::Exit {
        let exit_id = ids::cfg_block_id(&f.func_id, u32::MAX, "exit");
        out.push(Emission::CfgBlock(CfgBlockRow {
            id: exit_id.clone(),
            func_id: f.func_id.clone(),
            kind: CfgBlockKind::Exit,
            index: u32::MAX,
            path: ctx.path.clone(),
            lang: ctx.lang.to_string(),
            attrs_json: json!({}),
            provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
        }));
        out.push(cfg_edge(ctx, f, CfgEdgeKind::Next, &f.current_block_id.clone(), &exit_id, event));
    }

    let _ = f.line_start;
}

fn cfg_edge(ctx: &BuilderCtx, f: &FunctionCfg, kind: CfgEdgeKind, src: &str, dst: &str, event: &CstEvent) -> Emission {
    Emission::CfgEdge(CfgEdgeRow {
        id: ids::edge_id(cfg_edge_tag(kind), src, dst, event.byte_start),
        func_id: f.func_id.clone(),
        kind,
        src_block_id: src.to_string(),
        dst_block_id: dst.to_string(),
        provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
    })
}

fn cfg_edge_tag(kind: CfgEdgeKind) -> &'static str {
    match kind {
        CfgEdgeKind::Next => "next",
        CfgEdgeKind::True => "true",
        CfgEdgeKind::False => "false",
        CfgEdgeKind::Exception => "exception",
        CfgEdgeKind::Return => "return",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::Limits;
    use crate::model::language::LanguageKind;
    use crate::parser::driver::{ParserDriver, TreeSitterDriver};
    use std::collections::BTreeSet;

    fn run(source: &'static str) -> CfgResult {
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
        build_cfg(&ctx, &stream.events)
    }

    #[test]
    fn if_merge_scenario_produces_predicate_and_two_arms() {
        let result = run("def k(c):\n    if c:\n        return 1\n    return 2\n");
        let predicates = result.emissions.iter().filter(|e| matches!(e, Emission::CfgBlock(b) if b.kind == CfgBlockKind::Predicate)).count();
        let true_edges = result.emissions.iter().filter(|e| matches!(e, Emission::CfgEdge(ed) if ed.kind == CfgEdgeKind::True)).count();
        let false_edges = result.emissions.iter().filter(|e| matches!(e, Emission::CfgEdge(ed) if ed.kind == CfgEdgeKind::False)).count();
        let return_edges = result.emissions.iter().filter(|e| matches!(e, Emission::CfgEdge(ed) if ed.kind == CfgEdgeKind::Return)).count();
        assert_eq!(predicates, 1, "scenario (f): exactly one PREDICATE block");
        assert_eq!(true_edges, 1);
        assert_eq!(false_edges, 1);
        assert!(return_edges >= 1);

        let predicate_id = result
            .emissions
            .iter()
            .find_map(|e| match e {
                Emission::CfgBlock(b) if b.kind == CfgBlockKind::Predicate => Some(b.id.clone()),
                _ => None,
            })
            .unwrap();
        let true_edge_src = result
            .emissions
            .iter()
            .find_map(|e| match e {
                Emission::CfgEdge(ed) if ed.kind == CfgEdgeKind::True => Some(ed.src_block_id.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(true_edge_src, predicate_id, "TRUE edge originates at the predicate, not a post-return block");

        let true_arm_id = result
            .emissions
            .iter()
            .find_map(|e| match e {
                Emission::CfgEdge(ed) if ed.kind == CfgEdgeKind::True => Some(ed.dst_block_id.clone()),
                _ => None,
            })
            .unwrap();
        let return_from_true_arm = result.emissions.iter().any(|e| {
            matches!(e, Emission::CfgEdge(ed) if ed.kind == CfgEdgeKind::Return && ed.src_block_id == true_arm_id)
        });
        assert!(return_from_true_arm, "TRUE arm block is the one `return 1` returns from");
    }

    #[test]
    fn function_without_explicit_return_gets_synthesized_exit() {
        let result = run("def f():\n    x = 1\n");
        let exits = result.emissions.iter().filter(|e| matches!(e, Emission::CfgBlock(b) if b.kind == CfgBlockKind::Exit)).count();
        assert!(exits >= 1);
    }
}
