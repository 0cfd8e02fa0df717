//! Wall-clock timestamps, isolated to one module so that the determinism
//! invariant ("byte-identical row contents modulo timestamps in the
//! receipt") has a single, obvious place where non-determinism is allowed in.

use chrono::Utc;

pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}
