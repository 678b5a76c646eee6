//! Emitter: wraps `instr` encoding with the shuffle protocol and
//! `ivalue` materialization ("toregconst").
//!
//! Whether a function reserves its three shuffle registers is decided
//! before this emitter is constructed (see `funcstate.rs`'s prologue
//! sizing pass) — by the time statement/expression emission starts, the
//! slots are either fixed or known absent, never discovered mid-function.

use crate::constpool::ConstantPool;
use crate::error::{CompileError, Result};
use crate::instr::{
    self, CompilerInstruction, Opcode, RegConst, BC_MAX, SLOT_MAX,
};
use crate::ivalue::{ArithOp, Ispec, Ivalue, MaterializeFlags};
use crate::regalloc::RegisterAllocator;
use mjs_core::value::Literal;

/// Largest magnitude that fits the biased 24-bit `LDINT`/`LDINTX` pair
/// (signed; numbers that fit in a signed 24-bit integer).
const LDINT_MAX: i64 = (1 << 23) - 1;
const LDINT_MIN: i64 = -(1 << 23);

pub struct Emitter {
    instructions: Vec<CompilerInstruction>,
    shuffle_regs: Option<[u32; 3]>,
    current_line: u32,
}

impl Emitter {
    pub fn new(shuffle_regs: Option<[u32; 3]>) -> Self {
        Emitter {
            instructions: Vec::new(),
            shuffle_regs,
            current_line: 0,
        }
    }

    pub fn set_line(&mut self, line: u32) {
        self.current_line = line;
    }

    pub fn set_shuffle_regs(&mut self, regs: Option<[u32; 3]>) {
        self.shuffle_regs = regs;
    }

    pub fn pc(&self) -> usize {
        self.instructions.len()
    }

    /// The raw word at `idx`, for callers that need to inspect (not just
    /// patch) an already-emitted instruction, e.g. tail-call detection.
    pub fn instruction_word(&self, idx: usize) -> u32 {
        self.instructions[idx].word
    }

    pub fn into_instructions(self) -> Vec<CompilerInstruction> {
        self.instructions
    }

    fn push(&mut self, word: u32) -> usize {
        let idx = self.instructions.len();
        self.instructions.push(CompilerInstruction {
            word,
            line: self.current_line,
        });
        idx
    }

    pub fn patch(&mut self, idx: usize, word: u32) {
        self.instructions[idx].word = word;
    }

    fn shuffle_reg(&self, slot: usize) -> Result<u32> {
        self.shuffle_regs
            .map(|regs| regs[slot])
            .ok_or_else(|| CompileError::internal("shuffle required but no shuffle registers reserved"))
    }

    /// Spill an oversized B/C operand into a shuffle register, emitting
    /// the loading instruction first. Leaves short operands untouched.
    fn shuffle_operand(&mut self, operand: RegConst, slot: usize) -> Result<RegConst> {
        if operand.index <= SLOT_MAX {
            return Ok(operand);
        }
        if operand.index > BC_MAX {
            return Err(CompileError::range("operand index exceeds BC_MAX", self.current_line as u32));
        }
        let shuffle = self.shuffle_reg(slot)?;
        if operand.is_const {
            let word = instr::encode_a_bc(Opcode::LdConst, shuffle, operand.index)?;
            self.push(word);
        } else {
            let word = instr::encode_a_bc(Opcode::LdReg, shuffle, operand.index)?;
            self.push(word);
        }
        Ok(RegConst::reg(shuffle))
    }

    /// Emit an `OP A B C` instruction, shuffling any operand that
    /// overflows its slot. Returns the emitted word's index.
    pub fn emit_abc_regs(&mut self, op: Opcode, a: u32, b: RegConst, c: RegConst) -> Result<usize> {
        let b = self.shuffle_operand(b, 1)?;
        let c = self.shuffle_operand(c, 2)?;
        if a <= SLOT_MAX {
            let word = instr::encode_abc_regs(op, a, b, c)?;
            Ok(self.push(word))
        } else if a <= BC_MAX {
            let shuffle_a = self.shuffle_reg(0)?;
            let word = instr::encode_abc_regs(op, shuffle_a, b, c)?;
            let idx = self.push(word);
            let streg = instr::encode_a_bc(Opcode::StReg, shuffle_a, a)?;
            self.push(streg);
            Ok(idx)
        } else {
            Err(CompileError::range(
                "destination register index exceeds BC_MAX",
                self.current_line,
            ))
        }
    }

    /// Emit an `OP A BC` instruction where `a` identifies a register
    /// range/target (e.g. `CALL`, `CSREG`, `MPUTOBJ`). Oversized `a`
    /// switches to the opcode's indirect counterpart, loading the
    /// true index into shuffle1 first.
    pub fn emit_indirectable(&mut self, op: Opcode, a: u32, bc: u32) -> Result<usize> {
        if a <= SLOT_MAX {
            let word = instr::encode_a_bc(op, a, bc)?;
            return Ok(self.push(word));
        }
        let indirect = op
            .indirect()
            .ok_or_else(|| CompileError::internal("opcode has no indirect counterpart for shuffle"))?;
        if a > BC_MAX {
            return Err(CompileError::range("range-start index exceeds BC_MAX", self.current_line));
        }
        let shuffle_a = self.shuffle_reg(0)?;
        let ldint = instr::encode_a_bc(Opcode::LdInt, shuffle_a, a)?;
        self.push(ldint);
        let word = instr::encode_a_bc(indirect, shuffle_a, bc)?;
        Ok(self.push(word))
    }

    pub fn emit_a_bc(&mut self, op: Opcode, a: u32, bc: u32) -> Result<usize> {
        let word = instr::encode_a_bc(op, a, bc)?;
        Ok(self.push(word))
    }

    /// Emit a jump with a placeholder offset; returns the index to patch
    /// once the target PC is known.
    pub fn emit_jump_placeholder(&mut self, op: Opcode) -> Result<usize> {
        let word = instr::encode_abc_jump(op, 0)?;
        Ok(self.push(word))
    }

    pub fn patch_jump_to(&mut self, idx: usize, target_pc: usize) -> Result<()> {
        let opcode_bits = instr::decode_opcode(self.instructions[idx].word);
        let offset = target_pc as i64 - idx as i64;
        let biased = offset + instr::JUMP_BIAS as i64;
        if biased < 0 || biased > (1 << 26) - 1 {
            return Err(CompileError::range(
                "jump offset out of bytecode bounds",
                self.current_line,
            ));
        }
        let word = (opcode_bits << 26) | (biased as u32 & 0x03FF_FFFF);
        self.patch(idx, word);
        Ok(())
    }

    /// Materialize an ivalue into a concrete register/constant operand
    /// ("toregconst"), attempting algebraic folding first for
    /// `Arith` ivalues.
    pub fn toregconst(
        &mut self,
        ivalue: Ivalue,
        flags: MaterializeFlags,
        regalloc: &mut RegisterAllocator,
        constpool: &mut ConstantPool,
    ) -> Result<RegConst> {
        match ivalue {
            Ivalue::Plain(ispec) => self.materialize_ispec(ispec, flags, regalloc, constpool),
            Ivalue::Var(ispec) => self.materialize_ispec(ispec, flags, regalloc, constpool),
            Ivalue::Arith(op, lhs, rhs) => {
                self.emit_arith(op, lhs, rhs, regalloc, constpool)
            }
            Ivalue::Prop(obj, key) => self.emit_getprop(obj, key, regalloc, constpool),
            Ivalue::None => Err(CompileError::internal("materialized a None ivalue")),
        }
    }

    fn materialize_ispec(
        &mut self,
        ispec: Ispec,
        flags: MaterializeFlags,
        regalloc: &mut RegisterAllocator,
        constpool: &mut ConstantPool,
    ) -> Result<RegConst> {
        match ispec {
            Ispec::RegConst(rc) => {
                if rc.is_const {
                    return self.materialize_const_value(constpool.get(rc.index), flags, regalloc, constpool);
                }
                if flags.require_temp && !regalloc.is_temp(rc.index) {
                    let dest = regalloc.alloc_temp()?;
                    self.emit_abc_regs(Opcode::LdReg, dest, RegConst::reg(rc.index), RegConst::reg(0))?;
                    return Ok(RegConst::reg(dest));
                }
                Ok(rc)
            }
            Ispec::Value(lit) => self.materialize_literal(lit, flags, regalloc, constpool),
        }
    }

    fn materialize_literal(
        &mut self,
        lit: Literal,
        flags: MaterializeFlags,
        regalloc: &mut RegisterAllocator,
        constpool: &mut ConstantPool,
    ) -> Result<RegConst> {
        if let Literal::Number(n) = lit
            && n.fract() == 0.0
            && (LDINT_MIN..=LDINT_MAX).contains(&(n as i64))
            && !flags.allow_const
        {
            let dest = regalloc.alloc_temp()?;
            self.emit_ldint(dest, n as i64)?;
            return Ok(RegConst::reg(dest));
        }
        if flags.allow_const {
            let idx = constpool.intern(lit)?;
            if flags.require_short && idx > SLOT_MAX {
                return Err(CompileError::range("constant index too large for required-short slot", self.current_line));
            }
            return Ok(RegConst::constant(idx));
        }
        let dest = regalloc.alloc_temp()?;
        let idx = constpool.intern(lit)?;
        self.emit_abc_regs(Opcode::LdConst, dest, RegConst::constant(idx), RegConst::reg(0))?;
        Ok(RegConst::reg(dest))
    }

    fn emit_ldint(&mut self, dest: u32, value: i64) -> Result<()> {
        let biased = (value - LDINT_MIN) as u32;
        let low = biased & 0xFFFF;
        let high = biased >> 16;
        self.emit_a_bc(Opcode::LdInt, dest, low)?;
        self.emit_a_bc(Opcode::LdIntX, dest, high)?;
        Ok(())
    }

    fn materialize_const_value(
        &mut self,
        lit: Literal,
        flags: MaterializeFlags,
        regalloc: &mut RegisterAllocator,
        constpool: &mut ConstantPool,
    ) -> Result<RegConst> {
        self.materialize_literal(lit, flags, regalloc, constpool)
    }

    /// Fold or emit a binary arithmetic op.
    fn emit_arith(
        &mut self,
        op: ArithOp,
        lhs: Ispec,
        rhs: Ispec,
        regalloc: &mut RegisterAllocator,
        constpool: &mut ConstantPool,
    ) -> Result<RegConst> {
        let short_const = MaterializeFlags {
            allow_const: true,
            require_temp: false,
            require_short: true,
        };
        let lhs_rc = self.materialize_ispec(lhs, short_const, regalloc, constpool)?;
        let rhs_rc = self.materialize_ispec(rhs, short_const, regalloc, constpool)?;
        let dest = regalloc.alloc_temp()?;
        let opcode = match op {
            ArithOp::Add => Opcode::Add,
            ArithOp::Sub => Opcode::Sub,
            ArithOp::Mul => Opcode::Mul,
            ArithOp::Div => Opcode::Div,
        };
        self.emit_abc_regs(opcode, dest, lhs_rc, rhs_rc)?;
        Ok(RegConst::reg(dest))
    }

    fn emit_getprop(
        &mut self,
        obj: Ispec,
        key: Ispec,
        regalloc: &mut RegisterAllocator,
        constpool: &mut ConstantPool,
    ) -> Result<RegConst> {
        let short_const = MaterializeFlags {
            allow_const: true,
            require_temp: false,
            require_short: true,
        };
        let obj_rc = self.materialize_ispec(obj, short_const, regalloc, constpool)?;
        let key_rc = self.materialize_ispec(key, short_const, regalloc, constpool)?;
        let dest = regalloc.alloc_temp()?;
        self.emit_abc_regs(Opcode::GetProp, dest, obj_rc, key_rc)?;
        Ok(RegConst::reg(dest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_b_operand_is_spilled_to_shuffle_register() {
        let mut emitter = Emitter::new(Some([250, 251, 252]));
        let mut regalloc = RegisterAllocator::new();
        regalloc.reserve_low(253).unwrap();
        regalloc.freeze_non_temp_region();
        emitter
            .emit_abc_regs(Opcode::Add, 0, RegConst::reg(300), RegConst::reg(1))
            .unwrap();
        assert_eq!(emitter.pc(), 2, "one LDREG to shuffle2, then ADD");
    }

    #[test]
    fn short_operands_do_not_trigger_shuffle() {
        let mut emitter = Emitter::new(None);
        emitter
            .emit_abc_regs(Opcode::Add, 0, RegConst::reg(1), RegConst::reg(2))
            .unwrap();
        assert_eq!(emitter.pc(), 1);
    }

    #[test]
    fn shuffle_without_reserved_registers_errors() {
        let mut emitter = Emitter::new(None);
        let err = emitter
            .emit_abc_regs(Opcode::Add, 0, RegConst::reg(300), RegConst::reg(1))
            .unwrap_err();
        assert_eq!(err.kind, crate::error::CompileErrorKind::Internal);
    }

    #[test]
    fn materialize_register_bound_plain_ivalue_is_a_no_op() {
        let mut emitter = Emitter::new(None);
        let mut regalloc = RegisterAllocator::new();
        regalloc.reserve_low(1).unwrap();
        regalloc.freeze_non_temp_region();
        let mut constpool = ConstantPool::new();
        let rc = emitter
            .toregconst(
                Ivalue::Plain(Ispec::RegConst(RegConst::reg(0))),
                MaterializeFlags::default(),
                &mut regalloc,
                &mut constpool,
            )
            .unwrap();
        assert_eq!(rc, RegConst::reg(0));
        assert_eq!(emitter.pc(), 0, "no instruction needed to reuse a register in place");
    }

    #[test]
    fn materialize_small_integer_literal_uses_ldint_pair() {
        let mut emitter = Emitter::new(None);
        let mut regalloc = RegisterAllocator::new();
        regalloc.freeze_non_temp_region();
        let mut constpool = ConstantPool::new();
        let rc = emitter
            .toregconst(
                Ivalue::Plain(Ispec::Value(Literal::Number(42.0))),
                MaterializeFlags::default(),
                &mut regalloc,
                &mut constpool,
            )
            .unwrap();
        assert!(!rc.is_const);
        assert_eq!(emitter.pc(), 2, "LDINT + LDINTX");
    }

    #[test]
    fn arith_ivalue_materializes_into_a_fresh_temp() {
        let mut emitter = Emitter::new(None);
        let mut regalloc = RegisterAllocator::new();
        regalloc.reserve_low(2).unwrap();
        regalloc.freeze_non_temp_region();
        let mut constpool = ConstantPool::new();
        let rc = emitter
            .toregconst(
                Ivalue::Arith(
                    ArithOp::Add,
                    Ispec::RegConst(RegConst::reg(0)),
                    Ispec::RegConst(RegConst::reg(1)),
                ),
                MaterializeFlags::default(),
                &mut regalloc,
                &mut constpool,
            )
            .unwrap();
        assert!(regalloc.is_temp(rc.index));
    }
}
