//! Process-wide switches read from the environment once.
//!
//! Per-template settings live in [`crate::parser::CompileOptions`]; these
//! flags only toggle build-time optimisations and are meant for debugging
//! output differences between the interpreted and compiled paths.

use std::sync::OnceLock;

fn env_true(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|val| {
        let trimmed = val.trim();
        !trimmed.is_empty() && !matches!(trimmed, "0" | "false" | "FALSE" | "False")
    })
}

fn bool_from_env(key: &str) -> bool {
    env_true(key).unwrap_or(false)
}

/// Deterministic sub-trees are evaluated at build time unless `HBL_NO_FOLD` is set.
pub fn constant_folding() -> bool {
    static FOLD: OnceLock<bool> = OnceLock::new();
    *FOLD.get_or_init(|| !bool_from_env("HBL_NO_FOLD"))
}

/// Short `each` loops take unrolled branches unless `HBL_NO_UNROLL` is set.
pub fn loop_unrolling() -> bool {
    static UNROLL: OnceLock<bool> = OnceLock::new();
    *UNROLL.get_or_init(|| !bool_from_env("HBL_NO_UNROLL"))
}
