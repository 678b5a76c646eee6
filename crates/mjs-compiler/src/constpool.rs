//! Constant pool.
//!
//! Interns literal values within one function. Deduplication is a linear
//! scan over a bounded trailing window rather than a hash map, preserved
//! deliberately: a constant *can* reappear if enough distinct constants
//! separate the two occurrences, and that's part of the documented
//! behavior surface, not an implementation detail free to erase by
//! switching to a hash-based pool.

use crate::error::{CompileError, Result};
use crate::instr::BC_MAX;
use mjs_core::value::{Literal, same_value};

/// Size of the trailing window scanned for a dedup match.
pub const GETCONST_MAX_CONSTS_CHECK: usize = 256;

#[derive(Debug)]
pub struct ConstantPool {
    entries: Vec<Literal>,
    window: usize,
}

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool::with_window(GETCONST_MAX_CONSTS_CHECK)
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        ConstantPool::default()
    }

    /// Like `new`, but with a caller-chosen dedup window instead of the
    /// default 256 (`CompilerConfig::const_window`).
    pub fn with_window(window: usize) -> Self {
        ConstantPool {
            entries: Vec::new(),
            window,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: u32) -> Literal {
        self.entries[index as usize]
    }

    pub fn as_slice(&self) -> &[Literal] {
        &self.entries
    }

    /// Intern `lit`, returning its index. Scans at most the last `window`
    /// entries for a SameValue match before appending a new one.
    pub fn intern(&mut self, lit: Literal) -> Result<u32> {
        let window_start = self.entries.len().saturating_sub(self.window);
        for (i, existing) in self.entries[window_start..].iter().enumerate() {
            if same_value(existing, &lit) {
                return Ok((window_start + i) as u32);
            }
        }
        if self.entries.len() as u32 > BC_MAX {
            return Err(CompileError::range("too many constants in function", 0));
        }
        let idx = self.entries.len() as u32;
        self.entries.push(lit);
        Ok(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedups_within_window() {
        let mut pool = ConstantPool::new();
        let a = pool.intern(Literal::Number(1.0)).unwrap();
        let b = pool.intern(Literal::Number(1.0)).unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn nan_dedups_against_nan() {
        let mut pool = ConstantPool::new();
        let a = pool.intern(Literal::Number(f64::NAN)).unwrap();
        let b = pool.intern(Literal::Number(f64::NAN)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn positive_and_negative_zero_are_distinct_entries() {
        let mut pool = ConstantPool::new();
        let a = pool.intern(Literal::Number(0.0)).unwrap();
        let b = pool.intern(Literal::Number(-0.0)).unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn entries_beyond_the_window_are_not_deduped() {
        let mut pool = ConstantPool::new();
        let first = pool.intern(Literal::Number(42.0)).unwrap();
        for i in 0..GETCONST_MAX_CONSTS_CHECK {
            pool.intern(Literal::Number(i as f64 + 1000.0)).unwrap();
        }
        let later = pool.intern(Literal::Number(42.0)).unwrap();
        assert_ne!(first, later, "value fell outside the dedup window");
    }

    #[test]
    fn a_shrunk_window_falls_out_of_dedup_sooner() {
        let mut pool = ConstantPool::with_window(2);
        let first = pool.intern(Literal::Number(42.0)).unwrap();
        pool.intern(Literal::Number(1.0)).unwrap();
        pool.intern(Literal::Number(2.0)).unwrap();
        let later = pool.intern(Literal::Number(42.0)).unwrap();
        assert_ne!(first, later);
    }
}
