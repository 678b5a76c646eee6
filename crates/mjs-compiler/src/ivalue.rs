//! Intermediate Value layer: expression parsing produces these instead
//! of emitting directly, so a chain of arithmetic on literals can fold
//! away before a single instruction is written.

use crate::instr::RegConst;
use mjs_core::value::Literal;

/// Tagged union: a literal known at compile time, or a register/constant
/// slot already materialized by an earlier step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ispec {
    Value(Literal),
    RegConst(RegConst),
}

impl Ispec {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Ispec::Value(Literal::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<mjs_core::interner::Atom> {
        match self {
            Ispec::Value(Literal::String(a)) => Some(*a),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Deferred expression result. `nud`/`led` handlers return these;
/// only `toregconst` (emitter.rs) forces materialization into an actual
/// instruction operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ivalue {
    Plain(Ispec),
    Arith(ArithOp, Ispec, Ispec),
    Prop(Ispec, Ispec),
    Var(Ispec),
    None,
}

/// Flags governing `toregconst` materialization. Plain booleans rather
/// than a `bitflags` type, matching `CompilerConfig`'s own handful of
/// flags elsewhere in this crate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeFlags {
    /// Result may be a constant-pool index rather than a register.
    pub allow_const: bool,
    /// Result must not alias a named-binding register (forces a fresh
    /// temp even if the ivalue is already register-bound).
    pub require_temp: bool,
    /// Result must fit the 8-bit B/C slot directly (no shuffle).
    pub require_short: bool,
}

/// Fold `lhs op rhs` when both operands are compile-time-known values.
/// Mirrors the ES5 `+`/`-`/`*`/`/` semantics for numbers (with NaN
/// propagation) and the `+` string-concatenation special case.
pub fn fold_arith(
    op: ArithOp,
    lhs: Ispec,
    rhs: Ispec,
    interner: &mjs_core::interner::StringInterner,
    out_interner: &mut mjs_core::interner::StringInterner,
) -> Option<Ispec> {
    if op == ArithOp::Add
        && let (Some(a), Some(b)) = (lhs.as_string(), rhs.as_string())
    {
        let mut concatenated = String::from(interner.resolve(a));
        concatenated.push_str(interner.resolve(b));
        let atom = out_interner.intern(&concatenated);
        return Some(Ispec::Value(Literal::String(atom)));
    }
    let (a, b) = (lhs.as_number()?, rhs.as_number()?);
    let result = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
    };
    Some(Ispec::Value(Literal::Number(result)))
}

/// Fold unary minus on a known numeric literal.
pub fn fold_unary_minus(operand: Ispec) -> Option<Ispec> {
    operand
        .as_number()
        .map(|n| Ispec::Value(Literal::Number(-n)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mjs_core::interner::StringInterner;

    #[test]
    fn folds_numeric_addition() {
        let interner = StringInterner::new();
        let mut out = StringInterner::new();
        let result = fold_arith(
            ArithOp::Add,
            Ispec::Value(Literal::Number(1.0)),
            Ispec::Value(Literal::Number(2.0)),
            &interner,
            &mut out,
        )
        .unwrap();
        assert_eq!(result, Ispec::Value(Literal::Number(3.0)));
    }

    #[test]
    fn folds_string_concatenation() {
        let mut interner = StringInterner::new();
        let a = interner.intern("foo");
        let b = interner.intern("bar");
        let mut out = StringInterner::new();
        let result = fold_arith(
            ArithOp::Add,
            Ispec::Value(Literal::String(a)),
            Ispec::Value(Literal::String(b)),
            &interner,
            &mut out,
        )
        .unwrap();
        assert_eq!(result.as_string().map(|a| out.resolve(a).to_string()), Some("foobar".to_string()));
    }

    #[test]
    fn does_not_fold_when_operand_is_register_bound() {
        let interner = StringInterner::new();
        let mut out = StringInterner::new();
        let result = fold_arith(
            ArithOp::Add,
            Ispec::RegConst(RegConst::reg(3)),
            Ispec::Value(Literal::Number(2.0)),
            &interner,
            &mut out,
        );
        assert!(result.is_none());
    }

    #[test]
    fn unary_minus_negates_known_number() {
        let folded = fold_unary_minus(Ispec::Value(Literal::Number(5.0))).unwrap();
        assert_eq!(folded, Ispec::Value(Literal::Number(-5.0)));
    }

    #[test]
    fn materialize_flags_default_to_all_false() {
        let flags = MaterializeFlags::default();
        assert!(!flags.allow_const);
        assert!(!flags.require_temp);
        assert!(!flags.require_short);
    }
}
