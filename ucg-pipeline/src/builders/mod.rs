//! The five builders that turn a `CstEvent` stream into UCG rows. Each one
//! independently re-walks the same event slice — no shared mutable state
//! between them except the `AliasHint`s the DFG builder hands to Symbols —
//! so the orchestrator can run them in a fixed, simple sequence per file.

pub mod cfg;
pub mod context;
pub mod dfg;
pub mod effects;
pub mod normalizer;
pub mod symbols;

pub use context::BuilderCtx;
