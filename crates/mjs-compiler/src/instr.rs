//! Bytecode instruction format: fixed 32-bit words decomposed as
//! `OP(6) A(8) B(9) C(9)`, `OP(6) A(8) BC(18)`, or `OP(6) ABC(26)`.
//!
//! Bit-packing style (free functions shifting a value into place and
//! or-ing the pieces together, newtypes for operand kinds) follows the
//! `fuel-asm` crate's `pack.rs` idiom for a fixed-width VM instruction
//! set: plain shift-and-mask free functions rather than a bitfield
//! macro.

use crate::error::{CompileError, Result};

/// Registers/constants addressed by the B or C slot fit in 8 bits.
pub const SLOT_MAX: u32 = 0xFF;
/// The widest index an `A/BC` or shuffled operand may carry (18-bit BC
/// field).
pub const BC_MAX: u32 = (1 << 18) - 1;
/// Bias added to a jump's true offset before packing into the unsigned
/// 26-bit `ABC` field, so that negative offsets (backward jumps) pack as
/// small positive values instead of wrapping.
pub const JUMP_BIAS: i32 = 1 << 25;

/// `RETURN` slot-A bits: a return value follows in slot B.
pub const RETURN_HAVE_RETVAL: u32 = 0x01;
/// `RETURN` slot-A bits: no active `catch`, so this return can skip the
/// interpreter's longjmp-style unwinder.
pub const RETURN_FAST: u32 = 0x02;

/// `CALL`/`CALLI` slot-A bits: the callee is the identifier `eval`.
pub const CALL_EVALCALL: u32 = 0x01;
/// `CALL`/`CALLI` slot-A bits: back-patched onto a call when the
/// following `RETURN` was elided in favor of a tail call.
pub const CALL_TAILCALL: u32 = 0x02;

/// `DECLVAR` slot-A bits, mirroring the property attributes the binding
/// is created with.
pub const DECLVAR_WRITABLE: u32 = 0x01;
pub const DECLVAR_ENUMERABLE: u32 = 0x02;
pub const DECLVAR_CONFIGURABLE: u32 = 0x04;
/// `DECLVAR` slot-A bit: the value operand is a function to bind
/// immediately rather than `undefined`.
pub const DECLVAR_FUNC_DECL: u32 = 0x08;
/// `DECLVAR` slot-A bit: bind to `undefined` rather than using the value
/// operand (a plain hoisted `var`, not yet assigned).
pub const DECLVAR_UNDEF_VALUE: u32 = 0x10;

/// `TRYCATCH` slot-A bits.
pub const TRYCATCH_HAVE_CATCH: u32 = 0x01;
pub const TRYCATCH_HAVE_FINALLY: u32 = 0x02;
pub const TRYCATCH_CATCH_BINDING: u32 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    // data movement
    LdReg,
    StReg,
    LdConst,
    LdInt,
    LdIntX,
    LdUndef,
    LdNull,
    LdTrue,
    LdFalse,
    LdThis,
    // arithmetic / logical / bitwise / comparison
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Basl,
    Basr,
    Blsr,
    Band,
    Bor,
    Bxor,
    Bnot,
    Lnot,
    Eq,
    Neq,
    Seq,
    Sneq,
    Lt,
    Gt,
    Le,
    Ge,
    Instof,
    In,
    // property ops
    GetProp,
    PutProp,
    DelProp,
    GetVar,
    PutVar,
    DelVar,
    DeclVar,
    // control flow
    Jump,
    If,
    Label,
    EndLabel,
    Break,
    Continue,
    Return,
    Call,
    CallI,
    New,
    NewI,
    TryCatch,
    // object / array builders
    NewObj,
    NewArr,
    MPutObj,
    MPutObjI,
    MPutArr,
    MPutArrI,
    // call setup
    CsReg,
    CsRegI,
    CsVar,
    CsVarI,
    CsProp,
    CsPropI,
    // iteration
    InitEnum,
    NextEnum,
    // misc
    Regexp,
    Closure,
    SetALen,
    InvLhs,
    Typeof,
    TypeofId,
    Inc,
    Dec,
    Unm,
    Unp,
    ToNum,
    InitGet,
    InitSet,
    InitGetI,
    InitSetI,
    Throw,
    EndTry,
    EndCatch,
    EndFin,
}

impl Opcode {
    /// The opcode+1 indirect variant used by the shuffle protocol for
    /// register-range/identity operands.
    pub fn indirect(self) -> Option<Opcode> {
        use Opcode::*;
        Some(match self {
            Call => CallI,
            New => NewI,
            MPutObj => MPutObjI,
            MPutArr => MPutArrI,
            CsReg => CsRegI,
            CsVar => CsVarI,
            CsProp => CsPropI,
            InitGet => InitGetI,
            InitSet => InitSetI,
            _ => return None,
        })
    }
}

/// A register or constant-pool operand. `index` is logical (pre-shuffle);
/// callers go through `Emitter` to materialize it into a slot, which may
/// transparently spill to a shuffle register if `index` doesn't fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegConst {
    pub index: u32,
    pub is_const: bool,
}

impl RegConst {
    pub fn reg(index: u32) -> Self {
        RegConst {
            index,
            is_const: false,
        }
    }
    pub fn constant(index: u32) -> Self {
        RegConst {
            index,
            is_const: true,
        }
    }
}

/// One emitted instruction plus the source line it was emitted for
/// (contributes to the packed PC-to-line table).
#[derive(Debug, Clone, Copy)]
pub struct CompilerInstruction {
    pub word: u32,
    pub line: u32,
}

pub fn encode_abc_regs(op: Opcode, a: u32, b: RegConst, c: RegConst) -> Result<u32> {
    if a > SLOT_MAX {
        return Err(CompileError::internal("slot A overflow in encode_abc_regs"));
    }
    if b.index > SLOT_MAX || c.index > SLOT_MAX {
        return Err(CompileError::internal("slot B/C overflow in encode_abc_regs"));
    }
    let b_field = (b.is_const as u32) << 8 | b.index;
    let c_field = (c.is_const as u32) << 8 | c.index;
    Ok(((op as u32) << 26) | (a << 18) | (b_field << 9) | c_field)
}

pub fn encode_a_bc(op: Opcode, a: u32, bc: u32) -> Result<u32> {
    if a > SLOT_MAX {
        return Err(CompileError::internal("slot A overflow in encode_a_bc"));
    }
    if bc > BC_MAX {
        return Err(CompileError::internal("BC overflow in encode_a_bc"));
    }
    Ok(((op as u32) << 26) | (a << 18) | bc)
}

pub fn encode_abc_jump(op: Opcode, signed_offset: i64) -> Result<u32> {
    let biased = signed_offset + JUMP_BIAS as i64;
    if biased < 0 || biased > (1 << 26) - 1 {
        return Err(CompileError::range(
            "jump offset out of bytecode bounds",
            0,
        ));
    }
    Ok(((op as u32) << 26) | (biased as u32 & 0x03FF_FFFF))
}

pub fn decode_opcode(word: u32) -> u32 {
    word >> 26
}

pub fn decode_a(word: u32) -> u32 {
    (word >> 18) & SLOT_MAX
}

pub fn decode_b(word: u32) -> RegConst {
    let field = (word >> 9) & 0x1FF;
    RegConst {
        index: field & SLOT_MAX,
        is_const: field & 0x100 != 0,
    }
}

pub fn decode_c(word: u32) -> RegConst {
    let field = word & 0x1FF;
    RegConst {
        index: field & SLOT_MAX,
        is_const: field & 0x100 != 0,
    }
}

pub fn decode_bc(word: u32) -> u32 {
    word & BC_MAX
}

pub fn decode_jump_offset(word: u32) -> i64 {
    let biased = (word & 0x03FF_FFFF) as i64;
    biased - JUMP_BIAS as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abc_regs_round_trip() {
        let word = encode_abc_regs(
            Opcode::Add,
            5,
            RegConst::reg(10),
            RegConst::constant(20),
        )
        .unwrap();
        assert_eq!(decode_opcode(word), Opcode::Add as u32);
        assert_eq!(decode_a(word), 5);
        assert_eq!(decode_b(word), RegConst::reg(10));
        assert_eq!(decode_c(word), RegConst::constant(20));
    }

    #[test]
    fn a_bc_round_trip() {
        let word = encode_a_bc(Opcode::Closure, 3, 70_000).unwrap();
        assert_eq!(decode_a(word), 3);
        assert_eq!(decode_bc(word), 70_000);
    }

    #[test]
    fn jump_offset_round_trips_negative() {
        let word = encode_abc_jump(Opcode::Jump, -42).unwrap();
        assert_eq!(decode_jump_offset(word), -42);
    }

    #[test]
    fn slot_overflow_is_rejected() {
        assert!(encode_abc_regs(Opcode::Add, 300, RegConst::reg(0), RegConst::reg(0)).is_err());
    }

    #[test]
    fn indirect_opcode_mapping() {
        assert_eq!(Opcode::Call.indirect(), Some(Opcode::CallI));
        assert_eq!(Opcode::Add.indirect(), None);
    }
}
