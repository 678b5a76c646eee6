//! Compiler configuration: compile flags and open-ended tuning knobs.
//!
//! A plain struct with `Default`, a few setter methods consumed in a
//! builder style, and an optional `from_toml` loader for the ambient
//! config-file story.

use crate::error::{CompileError, Result};
use serde::Deserialize;

/// Compile-time mode flags: what kind of source text the driver is
/// about to compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileMode {
    Program,
    Eval,
    FunctionBody,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Source runs in strict mode even without its own `"use strict"`
    /// directive (propagated into eval'd/Function-constructed code).
    pub strict: bool,
    /// This compilation is itself the body of a direct `eval` call.
    pub eval: bool,
    /// This compilation is a `Function`-constructor body rather than a
    /// program or eval chunk.
    pub funcexpr: bool,
    /// Disable the tail-call back-patch (`CALL` gaining `TAILCALL`, its
    /// `RETURN` elided) entirely, regardless of the `CALL`/`catch_depth`
    /// conditions the statement parser would otherwise accept. Mirrors
    /// the non-standard "omit `caller` property" knob that disables tail
    /// calls as a side effect.
    pub allow_tail_calls: bool,
    /// Bound on peephole optimizer passes, to guarantee termination on
    /// pathological jump chains.
    pub peephole_max_passes: u32,
    /// Trailing window size for constant-pool dedup. Exposed so tests can
    /// shrink it to exercise the "falls outside the window" edge case
    /// without constructing 256 distinct constants.
    pub const_window: usize,
    /// Force the shuffle-register reservation decision instead of using
    /// the pass-1 node-count heuristic (see `funcstate.rs`). `Some(true)`
    /// always reserves; `Some(false)` never does (and any instruction
    /// that would need to shuffle becomes a hard range error); `None`
    /// defers to the heuristic.
    pub force_shuffle_registers: Option<bool>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            strict: false,
            eval: false,
            funcexpr: false,
            allow_tail_calls: true,
            peephole_max_passes: 8,
            const_window: crate::constpool::GETCONST_MAX_CONSTS_CHECK,
            force_shuffle_registers: None,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_eval(mut self, eval: bool) -> Self {
        self.eval = eval;
        self
    }

    pub fn with_allow_tail_calls(mut self, allow: bool) -> Self {
        self.allow_tail_calls = allow;
        self
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| CompileError::internal(format!("invalid compiler config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_tail_calls_on_and_a_256_constant_window() {
        let cfg = CompilerConfig::new();
        assert!(cfg.allow_tail_calls);
        assert!(!cfg.strict);
        assert_eq!(cfg.const_window, 256);
    }

    #[test]
    fn builder_methods_chain() {
        let cfg = CompilerConfig::new().with_strict(true).with_eval(true);
        assert!(cfg.strict);
        assert!(cfg.eval);
    }

    #[test]
    fn from_toml_overrides_defaults() {
        let cfg = CompilerConfig::from_toml("allow_tail_calls = false\nstrict = true\n").unwrap();
        assert!(!cfg.allow_tail_calls);
        assert!(cfg.strict);
    }

    #[test]
    fn from_toml_rejects_garbage() {
        assert!(CompilerConfig::from_toml("not valid toml =====").is_err());
    }
}
