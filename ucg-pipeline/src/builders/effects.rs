//! Effects builder (spec §4.6): heuristic, conservative extraction of
//! decorators, calls, env lookups, and SQL/route-like string literals.
//!
//! Every row carries a `tier` in `attrs_json`: 0 = structural (decorator,
//! throw), 1 = qualified-name heuristic (call, env lookup), 2 = baseline
//! literal classification. A file whose effects are all tier 2 gets an
//! informational anomaly — downstream consumers should not trust tier-2
//! rows alone as evidence of behavior.

use crate::builders::context::BuilderCtx;
use crate::builders::normalizer::{call_qualified_name, decorator_carrier};
use crate::core::ids;
use crate::model::event::{CstEvent, EventKind};
use crate::model::rows::{AnomalyKind, AnomalyRow, EffectKind, EffectRow, Emission, Severity};
use serde_json::json;

const MAX_LITERAL_BYTES: usize = 512;

struct PendingConstruct {
    type_name: String,
    byte_start: usize,
    line_start: usize,
}

pub struct EffectsResult {
    pub emissions: Vec<Emission>,
    pub anomalies: Vec<AnomalyRow>,
}

pub fn build_effects(ctx: &BuilderCtx, events: &[CstEvent]) -> EffectsResult {
    let mut emissions = Vec::new();
    let mut pend_stack: Vec<PendingConstruct> = Vec::new();
    let mut max_tier_seen: Option<u8> = None;
    let mut effect_count: usize = 0;

    for event in events {
        match event.kind {
            EventKind::Enter => {
                pend_stack.push(PendingConstruct {
                    type_name: event.type_name.clone(),
                    byte_start: event.byte_start,
                    line_start: event.line_start,
                });
            }
            EventKind::Token => {
                if ctx.adapter.is_string_token(&event.type_name) {
                    let text = event.text(ctx.source);
                    if text.len() <= MAX_LITERAL_BYTES {
                        emit_string_literal(ctx, event, text, &mut emissions, &mut max_tier_seen, &mut effect_count);
                    }
                }
            }
            EventKind::Exit => {
                let Some(top) = pend_stack.pop() else { continue };

                if ctx.adapter.is_decorator(&top.type_name) {
                    let text = ctx.slice(top.byte_start, event.byte_end);
                    let carrier = decorator_carrier(text);
                    emissions.push(Emission::Effect(EffectRow {
                        id: ids::effect_id("decorator", &carrier, top.byte_start),
                        kind: EffectKind::Decorator,
                        carrier,
                        args_json: json!([]),
                        attrs_json: json!({ "tier": 0 }),
                        provenance: ctx.provenance(top.byte_start, event.byte_end, top.line_start, event.line_end),
                    }));
                    note_tier(&mut max_tier_seen, 0);
                    effect_count += 1;
                } else if ctx.adapter.is_call(&top.type_name) {
                    let text = ctx.slice(top.byte_start, event.byte_end);
                    let callee = call_qualified_name(text);
                    if !callee.is_empty() {
                        if is_env_lookup(&callee) {
                            emissions.push(Emission::Effect(EffectRow {
                                id: ids::effect_id("env_lookup", &callee, top.byte_start),
                                kind: EffectKind::EnvLookup,
                                carrier: callee,
                                args_json: json!([]),
                                attrs_json: json!({ "tier": 1 }),
                                provenance: ctx.provenance(top.byte_start, event.byte_end, top.line_start, event.line_end),
                            }));
                        } else {
                            emissions.push(Emission::Effect(EffectRow {
                                id: ids::effect_id("call", &callee, top.byte_start),
                                kind: EffectKind::Call,
                                carrier: callee,
                                args_json: json!([]),
                                attrs_json: json!({ "tier": 1 }),
                                provenance: ctx.provenance(top.byte_start, event.byte_end, top.line_start, event.line_end),
                            }));
                        }
                        note_tier(&mut max_tier_seen, 1);
                        effect_count += 1;
                    }
                } else if ctx.adapter.is_throw(&top.type_name) {
                    let text = ctx.slice(top.byte_start, event.byte_end);
                    let carrier = text.split_whitespace().take(6).collect::<Vec<_>>().join(" ");
                    emissions.push(Emission::Effect(EffectRow {
                        id: ids::effect_id("throw_like", &carrier, top.byte_start),
                        kind: EffectKind::ThrowLike,
                        carrier,
                        args_json: json!([]),
                        attrs_json: json!({ "tier": 0 }),
                        provenance: ctx.provenance(top.byte_start, event.byte_end, top.line_start, event.line_end),
                    }));
                    note_tier(&mut max_tier_seen, 0);
                    effect_count += 1;
                }
            }
        }
    }

    let mut anomalies = Vec::new();
    if effect_count > 0 && max_tier_seen == Some(2) {
        anomalies.push(AnomalyRow {
            path: ctx.path.clone(),
            blob_sha: Some(ctx.blob_sha.clone()),
            kind: AnomalyKind::Unknown,
            severity: Severity::Info,
            detail: "all extracted effects are tier-2 (baseline literal) heuristics; treat as best-effort only".to_string(),
            byte_start: None,
            byte_end: None,
            timestamp: crate::core::time::now_iso8601(),
        });
    }

    EffectsResult { emissions, anomalies }
}

fn note_tier(max_tier_seen: &mut Option<u8>, tier: u8) {
    *max_tier_seen = Some(max_tier_seen.map_or(tier, |m| m.max(tier)));
}

fn emit_string_literal(
    ctx: &BuilderCtx,
    event: &CstEvent,
    text: &str,
    emissions: &mut Vec<Emission>,
    max_tier_seen: &mut Option<u8>,
    effect_count: &mut usize,
) {
    let inner = text.trim_matches(|c| c == '"' || c == '\'' || c == '`');
    let lower = inner.trim().to_ascii_lowercase();

    let kind = if is_sql_like(&lower) {
        EffectKind::SqlLike
    } else if is_route_like(inner) {
        EffectKind::RouteLike
    } else {
        EffectKind::StringLiteral
    };

    // Plain non-classified literals are noisy; only emit when the token is
    // non-trivial (avoids flooding the table with single-char strings).
    if kind == EffectKind::StringLiteral && inner.trim().len() < 2 {
        return;
    }

    emissions.push(Emission::Effect(EffectRow {
        id: ids::effect_id("string_literal", inner, event.byte_start),
        kind,
        carrier: inner.to_string(),
        args_json: json!([]),
        attrs_json: json!({ "tier": 2 }),
        provenance: ctx.provenance(event.byte_start, event.byte_end, event.line_start, event.line_end),
    }));
    note_tier(max_tier_seen, 2);
    *effect_count += 1;
}

fn is_sql_like(lower_trimmed: &str) -> bool {
    const PREFIXES: &[&str] = &["select", "insert", "update", "delete", "with"];
    PREFIXES.iter().any(|p| lower_trimmed.starts_with(p)) || lower_trimmed.contains(" join ")
}

fn is_route_like(inner: &str) -> bool {
    let trimmed = inner.trim();
    if !trimmed.starts_with('/') {
        return false;
    }
    trimmed.contains('{') || trimmed.contains(':') || trimmed.matches('/').count() >= 2
}

fn is_env_lookup(qualified_name: &str) -> bool {
    qualified_name.starts_with("os.environ") || qualified_name.starts_with("os.getenv") || qualified_name.starts_with("process.env")
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn decorator_and_call_scenario_from_spec_scenario_f() {
        let (ctx, events) = ctx("@router.post(\"/x/{id}\")\ndef h(): pass\n");
        let result = build_effects(&ctx, &events);

        let deco = result
            .emissions
            .iter()
            .find_map(|e| match e {
                Emission::Effect(r) if r.kind == EffectKind::Decorator => Some(r),
                _ => None,
            })
            .expect("decorator effect emitted");
        assert_eq!(deco.carrier, "router.post");

        let route = result.emissions.iter().find_map(|e| match e {
            Emission::Effect(r) if r.kind == EffectKind::RouteLike => Some(r),
            _ => None,
        });
        assert!(route.is_some());
        assert!(route.unwrap().carrier.starts_with("/x"));
    }

    #[test]
    fn env_lookup_reclassified_from_call() {
        let (ctx, events) = ctx("def f():\n    x = os.environ.get(\"KEY\")\n");
        let result = build_effects(&ctx, &events);
        let has_env = result
            .emissions
            .iter()
            .any(|e| matches!(e, Emission::Effect(r) if r.kind == EffectKind::EnvLookup));
        assert!(has_env);
    }

    #[test]
    fn sql_like_literal_detected() {
        let (ctx, events) = ctx("def f():\n    q = \"SELECT * FROM users\"\n");
        let result = build_effects(&ctx, &events);
        let has_sql = result
            .emissions
            .iter()
            .any(|e| matches!(e, Emission::Effect(r) if r.kind == EffectKind::SqlLike));
        assert!(has_sql);
    }

    #[test]
    fn throw_like_emitted_for_raise() {
        let (ctx, events) = ctx("def f():\n    raise ValueError(\"bad\")\n");
        let result = build_effects(&ctx, &events);
        let has_throw = result
            .emissions
            .iter()
            .any(|e| matches!(e, Emission::Effect(r) if r.kind == EffectKind::ThrowLike));
        assert!(has_throw);
    }

    #[test]
    fn tier2_only_file_gets_informational_anomaly() {
        let (ctx, events) = ctx("def f():\n    q = \"hello world\"\n");
        let result = build_effects(&ctx, &events);
        assert!(!result.anomalies.is_empty());
        assert_eq!(result.anomalies[0].severity, Severity::Info);
    }
}
