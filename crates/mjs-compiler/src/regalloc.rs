//! Register allocator: a temporary-register stack with a high-water
//! mark.
//!
//! Registers `0..num_args-1` hold formals; `temp_first` marks the first
//! freely-allocable register, frozen once the prologue finishes emitting
//! by setting `temp_first = temp_next`; `temp_next` is the current
//! allocation top; `temp_max` is the maximum ever reached and becomes
//! the function's `nregs`.

use crate::error::{CompileError, Result};
use crate::instr::BC_MAX;

#[derive(Debug, Default)]
pub struct RegisterAllocator {
    pub temp_first: u32,
    pub temp_next: u32,
    pub temp_max: u32,
}

/// A snapshot of `temp_next`, taken at the entry to an expression so the
/// allocator can "borrow" temps and restore them once the expression's
/// result has been placed in a non-temp destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempMark(u32);

impl RegisterAllocator {
    pub fn new() -> Self {
        RegisterAllocator::default()
    }

    /// Reserve `count` low registers (formals, implicit return value,
    /// shuffle registers, for-in enumerator state) before temps begin.
    pub fn reserve_low(&mut self, count: u32) -> Result<()> {
        self.temp_first += count;
        self.temp_next = self.temp_first;
        self.temp_max = self.temp_max.max(self.temp_next);
        if self.temp_first > BC_MAX {
            return Err(CompileError::range(
                "too many reserved registers before temp region",
                0,
            ));
        }
        Ok(())
    }

    /// Freeze the non-temp region: called once, right after the prologue
    /// finishes emitting.
    pub fn freeze_non_temp_region(&mut self) {
        self.temp_first = self.temp_next;
    }

    pub fn mark(&self) -> TempMark {
        TempMark(self.temp_next)
    }

    /// Restore to a previous mark, discarding any temps allocated since.
    /// Never lowers `temp_max`.
    pub fn restore(&mut self, mark: TempMark) {
        debug_assert!(mark.0 <= self.temp_next);
        self.temp_next = mark.0;
    }

    pub fn alloc_temp(&mut self) -> Result<u32> {
        let reg = self.temp_next;
        self.temp_next += 1;
        self.temp_max = self.temp_max.max(self.temp_next);
        if self.temp_next > BC_MAX {
            return Err(CompileError::range(
                "too many temporary registers in function",
                0,
            ));
        }
        Ok(reg)
    }

    pub fn alloc_temps(&mut self, count: u32) -> Result<u32> {
        let base = self.temp_next;
        for _ in 0..count {
            self.alloc_temp()?;
        }
        Ok(base)
    }

    pub fn is_temp(&self, reg: u32) -> bool {
        reg >= self.temp_first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formals_then_temps_allocate_in_order() {
        let mut ra = RegisterAllocator::new();
        ra.reserve_low(2).unwrap(); // two formals
        ra.freeze_non_temp_region();
        let t0 = ra.alloc_temp().unwrap();
        let t1 = ra.alloc_temp().unwrap();
        assert_eq!(t0, 2);
        assert_eq!(t1, 3);
        assert!(ra.is_temp(t0));
        assert!(!ra.is_temp(0));
    }

    #[test]
    fn restoring_a_mark_reuses_registers_but_keeps_high_water_mark() {
        let mut ra = RegisterAllocator::new();
        ra.freeze_non_temp_region();
        let mark = ra.mark();
        ra.alloc_temp().unwrap();
        ra.alloc_temp().unwrap();
        assert_eq!(ra.temp_max, 2);
        ra.restore(mark);
        assert_eq!(ra.temp_next, 0);
        assert_eq!(ra.temp_max, 2, "high-water mark must not be lowered");
    }

    #[test]
    fn invariant_temp_first_le_temp_next_le_temp_max() {
        let mut ra = RegisterAllocator::new();
        ra.reserve_low(1).unwrap();
        ra.freeze_non_temp_region();
        ra.alloc_temp().unwrap();
        assert!(ra.temp_first <= ra.temp_next);
        assert!(ra.temp_next <= ra.temp_max);
    }
}
