//! Pratt/TDOP expression parser.
//!
//! Shares the `Parser` struct with `stmt.rs`: one flat type avoids
//! threading half a dozen mutually-borrowing sub-structs through every
//! call, at the cost of a wide `impl`.

use crate::bodycompiler::Parser;
use crate::error::{CompileError, Result};
use crate::instr::{self, Opcode, RegConst};
use crate::ivalue::{fold_arith, fold_unary_minus, ArithOp, Ispec, Ivalue, MaterializeFlags};
use mjs_core::interner::Atom;
use mjs_core::value::Literal;
use mjs_lexer::{Keyword, Punct, TokenKind};

pub(crate) const BP_INVALID: u8 = 0;
pub(crate) const BP_EOF: u8 = 2;
pub(crate) const BP_CLOSING: u8 = 4;
pub(crate) const BP_COMMA: u8 = 6;
pub(crate) const BP_ASSIGNMENT: u8 = 8;
pub(crate) const BP_CONDITIONAL: u8 = 10;
pub(crate) const BP_LOR: u8 = 12;
pub(crate) const BP_LAND: u8 = 14;
pub(crate) const BP_BOR: u8 = 16;
pub(crate) const BP_BXOR: u8 = 18;
pub(crate) const BP_BAND: u8 = 20;
pub(crate) const BP_EQUALITY: u8 = 22;
pub(crate) const BP_RELATIONAL: u8 = 24;
pub(crate) const BP_SHIFT: u8 = 26;
pub(crate) const BP_ADDITIVE: u8 = 28;
pub(crate) const BP_MULTIPLICATIVE: u8 = 30;
pub(crate) const BP_POSTFIX: u8 = 32;
pub(crate) const BP_CALL: u8 = 34;
pub(crate) const BP_MEMBER: u8 = 36;

/// A compound assignment's operator: the four that fold (`ArithOp`, shared
/// with ordinary binary expressions) and the rest, which always
/// materialize through a plain opcode emission.
#[derive(Debug, Clone, Copy)]
pub(crate) enum CompoundOp {
    Arith(ArithOp),
    Binary(Opcode),
}

fn assignment_punct(p: Punct) -> Option<Option<CompoundOp>> {
    // Outer Option: "is this an assignment operator"; inner Option: the
    // compound op, `None` for plain `=`.
    Some(match p {
        Punct::Assign => None,
        Punct::PlusEq => Some(CompoundOp::Arith(ArithOp::Add)),
        Punct::MinusEq => Some(CompoundOp::Arith(ArithOp::Sub)),
        Punct::StarEq => Some(CompoundOp::Arith(ArithOp::Mul)),
        Punct::SlashEq => Some(CompoundOp::Arith(ArithOp::Div)),
        Punct::PercentEq => Some(CompoundOp::Binary(Opcode::Mod)),
        Punct::ShlEq => Some(CompoundOp::Binary(Opcode::Basl)),
        Punct::ShrEq => Some(CompoundOp::Binary(Opcode::Basr)),
        Punct::UshrEq => Some(CompoundOp::Binary(Opcode::Blsr)),
        Punct::AmpEq => Some(CompoundOp::Binary(Opcode::Band)),
        Punct::PipeEq => Some(CompoundOp::Binary(Opcode::Bor)),
        Punct::CaretEq => Some(CompoundOp::Binary(Opcode::Bxor)),
        _ => return None,
    })
}

impl<'src> Parser<'src> {
    fn lbp(&self, allow_in: bool) -> u8 {
        match &self.current.kind {
            TokenKind::Eof => BP_EOF,
            TokenKind::Punct(p) => match p {
                Punct::RParen | Punct::RBracket | Punct::RBrace | Punct::Semi => BP_CLOSING,
                Punct::Comma => BP_COMMA,
                Punct::Assign
                | Punct::PlusEq
                | Punct::MinusEq
                | Punct::StarEq
                | Punct::PercentEq
                | Punct::ShlEq
                | Punct::ShrEq
                | Punct::UshrEq
                | Punct::AmpEq
                | Punct::PipeEq
                | Punct::CaretEq
                | Punct::SlashEq => BP_ASSIGNMENT,
                Punct::Question => BP_CONDITIONAL,
                Punct::PipePipe => BP_LOR,
                Punct::AmpAmp => BP_LAND,
                Punct::Pipe => BP_BOR,
                Punct::Caret => BP_BXOR,
                Punct::Amp => BP_BAND,
                Punct::EqEq | Punct::NotEq | Punct::EqEqEq | Punct::NotEqEq => BP_EQUALITY,
                Punct::Lt | Punct::Gt | Punct::Le | Punct::Ge => BP_RELATIONAL,
                Punct::Shl | Punct::Shr | Punct::Ushr => BP_SHIFT,
                Punct::Plus | Punct::Minus => BP_ADDITIVE,
                Punct::Star | Punct::Slash | Punct::Percent => BP_MULTIPLICATIVE,
                Punct::PlusPlus | Punct::MinusMinus => {
                    if self.current.flags.lineterm {
                        BP_INVALID
                    } else {
                        BP_POSTFIX
                    }
                }
                Punct::LParen => BP_CALL,
                Punct::Dot | Punct::LBracket => BP_MEMBER,
                _ => BP_INVALID,
            },
            TokenKind::Keyword(Keyword::In) if allow_in => BP_RELATIONAL,
            TokenKind::Keyword(Keyword::Instanceof) => BP_RELATIONAL,
            _ => BP_INVALID,
        }
    }

    pub(crate) fn expr(&mut self, rbp: u8, allow_in: bool) -> Result<Ivalue> {
        self.recursion_increase()?;
        self.funcs.current_mut().nud_count += 1;
        let mut left = self.nud()?;
        while rbp < self.lbp(allow_in) {
            self.funcs.current_mut().led_count += 1;
            left = self.led(left, allow_in)?;
        }
        self.recursion_decrease();
        Ok(left)
    }

    fn nud(&mut self) -> Result<Ivalue> {
        let line = self.current.line;
        let tok = self.current.clone();
        match tok.kind {
            TokenKind::Keyword(Keyword::This) => {
                self.bump()?;
                let dest = self.alloc_and_emit_a(Opcode::LdThis, 0)?;
                Ok(Ivalue::Plain(Ispec::RegConst(dest)))
            }
            TokenKind::Ident(atom) => {
                self.bump()?;
                Ok(self.resolve_identifier(atom))
            }
            TokenKind::NullLiteral => {
                self.bump()?;
                Ok(Ivalue::Plain(Ispec::Value(Literal::Null)))
            }
            TokenKind::BooleanLiteral(b) => {
                self.bump()?;
                Ok(Ivalue::Plain(Ispec::Value(Literal::Boolean(b))))
            }
            TokenKind::NumberLiteral(n) => {
                self.bump()?;
                Ok(Ivalue::Plain(Ispec::Value(Literal::Number(n))))
            }
            TokenKind::StringLiteral(atom) => {
                self.bump()?;
                Ok(Ivalue::Plain(Ispec::Value(Literal::String(atom))))
            }
            TokenKind::RegexLiteral { pattern, flags } => {
                self.bump()?;
                self.note_node();
                if self.funcs.current().in_scanning {
                    return Ok(Ivalue::None);
                }
                let fs = self.funcs.current_mut();
                let pat_idx = fs.constpool.intern(Literal::String(pattern))?;
                let flags_idx = fs.constpool.intern(Literal::String(flags))?;
                let dest = fs.regalloc.alloc_temp()?;
                fs.emitter.emit_abc_regs(
                    Opcode::Regexp,
                    dest,
                    RegConst::constant(pat_idx),
                    RegConst::constant(flags_idx),
                )?;
                Ok(Ivalue::Plain(Ispec::RegConst(RegConst::reg(dest))))
            }
            TokenKind::Punct(Punct::LParen) => {
                self.bump()?;
                let inner = self.expr(BP_ASSIGNMENT - 1, true)?;
                self.expect_punct(Punct::RParen)?;
                Ok(inner)
            }
            TokenKind::Punct(Punct::LBracket) => self.parse_array_literal(),
            TokenKind::Punct(Punct::LBrace) => self.parse_object_literal(),
            TokenKind::Keyword(Keyword::Function) => self.parse_function_expression(),
            TokenKind::Keyword(Keyword::New) => self.parse_new_expression(),
            TokenKind::Keyword(Keyword::Delete) => self.parse_delete(),
            TokenKind::Keyword(Keyword::Void) => {
                self.bump()?;
                self.expr(BP_POSTFIX, true)?;
                Ok(Ivalue::Plain(Ispec::Value(Literal::Undefined)))
            }
            TokenKind::Keyword(Keyword::Typeof) => {
                self.bump()?;
                let operand = self.expr(BP_POSTFIX, true)?;
                self.emit_unary(Opcode::Typeof, operand)
            }
            TokenKind::Punct(Punct::Plus) => {
                self.bump()?;
                let operand = self.expr(BP_POSTFIX, true)?;
                self.emit_unary(Opcode::ToNum, operand)
            }
            TokenKind::Punct(Punct::Minus) => {
                self.bump()?;
                let operand = self.expr(BP_POSTFIX, true)?;
                if let Ivalue::Plain(ispec) = operand
                    && let Some(folded) = fold_unary_minus(ispec)
                {
                    return Ok(Ivalue::Plain(folded));
                }
                self.emit_unary(Opcode::Unm, operand)
            }
            TokenKind::Punct(Punct::Tilde) => {
                self.bump()?;
                let operand = self.expr(BP_POSTFIX, true)?;
                self.emit_unary(Opcode::Bnot, operand)
            }
            TokenKind::Punct(Punct::Bang) => {
                self.bump()?;
                let operand = self.expr(BP_POSTFIX, true)?;
                self.emit_unary(Opcode::Lnot, operand)
            }
            TokenKind::Punct(Punct::PlusPlus) => self.parse_prefix_incdec(Opcode::Inc, line),
            TokenKind::Punct(Punct::MinusMinus) => self.parse_prefix_incdec(Opcode::Dec, line),
            _ => Err(CompileError::syntax(
                format!("unexpected token in expression: {:?}", tok.kind),
                line,
            )),
        }
    }

    fn led(&mut self, left: Ivalue, allow_in: bool) -> Result<Ivalue> {
        let line = self.current.line;
        match self.current.kind.clone() {
            TokenKind::Punct(Punct::Dot) => {
                self.bump()?;
                let name = self.expect_ident()?;
                Ok(Ivalue::Prop(
                    self.ivalue_to_ispec(left)?,
                    Ispec::Value(Literal::String(name)),
                ))
            }
            TokenKind::Punct(Punct::LBracket) => {
                self.bump()?;
                let key = self.expr(BP_ASSIGNMENT - 1, true)?;
                self.expect_punct(Punct::RBracket)?;
                Ok(Ivalue::Prop(self.ivalue_to_ispec(left)?, self.ivalue_to_ispec(key)?))
            }
            TokenKind::Punct(Punct::LParen) => self.parse_call(left),
            TokenKind::Punct(Punct::PlusPlus) => self.parse_postfix_incdec(left, Opcode::Inc),
            TokenKind::Punct(Punct::MinusMinus) => self.parse_postfix_incdec(left, Opcode::Dec),
            TokenKind::Punct(Punct::PipePipe) => self.parse_logical(left, true),
            TokenKind::Punct(Punct::AmpAmp) => self.parse_logical(left, false),
            TokenKind::Punct(Punct::Question) => self.parse_conditional(left),
            TokenKind::Punct(Punct::Comma) => {
                self.bump()?;
                self.materialize_discard(left)?;
                self.expr(BP_COMMA, allow_in)
            }
            TokenKind::Keyword(Keyword::Instanceof) => {
                self.bump()?;
                let rhs = self.expr(BP_RELATIONAL, allow_in)?;
                self.emit_binary(Opcode::Instof, left, rhs)
            }
            TokenKind::Keyword(Keyword::In) if allow_in => {
                self.bump()?;
                let rhs = self.expr(BP_RELATIONAL, allow_in)?;
                self.emit_binary(Opcode::In, left, rhs)
            }
            TokenKind::Punct(p) => {
                if let Some(arith) = assignment_punct(p) {
                    return self.parse_assignment(left, arith, allow_in);
                }
                self.parse_binary(left, p, allow_in, line)
            }
            other => Err(CompileError::internal(format!("led dispatched on unhandled token {other:?}"))),
        }
    }

    fn parse_binary(&mut self, left: Ivalue, p: Punct, allow_in: bool, line: u32) -> Result<Ivalue> {
        let (bp, opcode, arith) = match p {
            Punct::Plus => (BP_ADDITIVE, Opcode::Add, Some(ArithOp::Add)),
            Punct::Minus => (BP_ADDITIVE, Opcode::Sub, Some(ArithOp::Sub)),
            Punct::Star => (BP_MULTIPLICATIVE, Opcode::Mul, Some(ArithOp::Mul)),
            Punct::Slash => (BP_MULTIPLICATIVE, Opcode::Div, Some(ArithOp::Div)),
            Punct::Percent => (BP_MULTIPLICATIVE, Opcode::Mod, None),
            Punct::Shl => (BP_SHIFT, Opcode::Basl, None),
            Punct::Shr => (BP_SHIFT, Opcode::Basr, None),
            Punct::Ushr => (BP_SHIFT, Opcode::Blsr, None),
            Punct::Amp => (BP_BAND, Opcode::Band, None),
            Punct::Pipe => (BP_BOR, Opcode::Bor, None),
            Punct::Caret => (BP_BXOR, Opcode::Bxor, None),
            Punct::EqEq => (BP_EQUALITY, Opcode::Eq, None),
            Punct::NotEq => (BP_EQUALITY, Opcode::Neq, None),
            Punct::EqEqEq => (BP_EQUALITY, Opcode::Seq, None),
            Punct::NotEqEq => (BP_EQUALITY, Opcode::Sneq, None),
            Punct::Lt => (BP_RELATIONAL, Opcode::Lt, None),
            Punct::Gt => (BP_RELATIONAL, Opcode::Gt, None),
            Punct::Le => (BP_RELATIONAL, Opcode::Le, None),
            Punct::Ge => (BP_RELATIONAL, Opcode::Ge, None),
            _ => return Err(CompileError::syntax(format!("unexpected operator {p:?}"), line)),
        };
        self.bump()?;
        let rhs = self.expr(bp, allow_in)?;
        if let (Some(op), Ivalue::Plain(l), Ivalue::Plain(r)) = (arith, &left, &rhs) {
            let interner = &self.interner;
            let mut scratch = mjs_core::interner::StringInterner::new();
            if let Some(folded) = fold_arith(op, *l, *r, interner, &mut scratch) {
                let folded = self.rehome_folded_string(folded, &scratch);
                return Ok(Ivalue::Plain(folded));
            }
        }
        self.emit_binary(opcode, left, rhs)
    }

    /// String-concatenation folding interns into a scratch interner (no
    /// `&mut self` borrow conflict with `left`/`rhs`); re-intern the
    /// result into the real interner before returning.
    fn rehome_folded_string(&mut self, folded: Ispec, scratch: &mjs_core::interner::StringInterner) -> Ispec {
        match folded {
            Ispec::Value(Literal::String(atom)) => {
                let text = scratch.resolve(atom).to_string();
                Ispec::Value(Literal::String(self.interner.intern(&text)))
            }
            other => other,
        }
    }

    fn emit_binary(&mut self, opcode: Opcode, left: Ivalue, rhs: Ivalue) -> Result<Ivalue> {
        let short_const = MaterializeFlags {
            allow_const: true,
            require_temp: false,
            require_short: true,
        };
        if self.funcs.current().in_scanning {
            return Ok(Ivalue::None);
        }
        let fs = self.funcs.current_mut();
        let lhs_rc = fs.emitter.toregconst(left, short_const, &mut fs.regalloc, &mut fs.constpool)?;
        let rhs_rc = fs.emitter.toregconst(rhs, short_const, &mut fs.regalloc, &mut fs.constpool)?;
        let dest = fs.regalloc.alloc_temp()?;
        fs.emitter.emit_abc_regs(opcode, dest, lhs_rc, rhs_rc)?;
        Ok(Ivalue::Plain(Ispec::RegConst(RegConst::reg(dest))))
    }

    fn emit_unary(&mut self, opcode: Opcode, operand: Ivalue) -> Result<Ivalue> {
        if self.funcs.current().in_scanning {
            return Ok(Ivalue::None);
        }
        let flags = MaterializeFlags {
            allow_const: true,
            require_temp: false,
            require_short: true,
        };
        let fs = self.funcs.current_mut();
        let rc = fs.emitter.toregconst(operand, flags, &mut fs.regalloc, &mut fs.constpool)?;
        let dest = fs.regalloc.alloc_temp()?;
        fs.emitter.emit_abc_regs(opcode, dest, rc, RegConst::reg(0))?;
        Ok(Ivalue::Plain(Ispec::RegConst(RegConst::reg(dest))))
    }

    fn alloc_and_emit_a(&mut self, opcode: Opcode, _unused: u32) -> Result<RegConst> {
        if self.funcs.current().in_scanning {
            return Ok(RegConst::reg(0));
        }
        let fs = self.funcs.current_mut();
        let dest = fs.regalloc.alloc_temp()?;
        fs.emitter.emit_a_bc(opcode, dest, 0)?;
        Ok(RegConst::reg(dest))
    }

    pub(crate) fn resolve_identifier(&mut self, name: Atom) -> Ivalue {
        if self.current_is_eval_name(name) {
            self.funcs.current_mut().may_direct_eval = true;
        }
        match self.funcs.current().var_map.get(&name) {
            Some(crate::funcstate::RegSlot::Register(reg)) => {
                Ivalue::Plain(Ispec::RegConst(RegConst::reg(*reg)))
            }
            _ => Ivalue::Var(Ispec::Value(Literal::String(name))),
        }
    }

    pub(crate) fn current_is_eval_name(&self, name: Atom) -> bool {
        self.interner.resolve(name) == "eval"
    }

    pub(crate) fn ivalue_to_ispec(&mut self, ivalue: Ivalue) -> Result<Ispec> {
        if self.funcs.current().in_scanning {
            return Ok(Ispec::Value(Literal::Undefined));
        }
        let flags = MaterializeFlags {
            allow_const: true,
            require_temp: false,
            require_short: true,
        };
        let fs = self.funcs.current_mut();
        let rc = fs.emitter.toregconst(ivalue, flags, &mut fs.regalloc, &mut fs.constpool)?;
        Ok(Ispec::RegConst(rc))
    }

    pub(crate) fn materialize_discard(&mut self, ivalue: Ivalue) -> Result<()> {
        if self.funcs.current().in_scanning {
            return Ok(());
        }
        let fs = self.funcs.current_mut();
        fs.emitter
            .toregconst(ivalue, MaterializeFlags::default(), &mut fs.regalloc, &mut fs.constpool)?;
        Ok(())
    }

    pub(crate) fn expect_ident(&mut self) -> Result<Atom> {
        let atom = self
            .current
            .as_ident()
            .ok_or_else(|| CompileError::syntax("expected identifier", self.current.line))?;
        self.bump()?;
        Ok(atom)
    }

    fn parse_array_literal(&mut self) -> Result<Ivalue> {
        self.bump()?; // `[`
        let mut elements = Vec::new();
        while !self.at_punct(Punct::RBracket) {
            if self.at_punct(Punct::Comma) {
                self.bump()?;
                continue;
            }
            let el = self.expr(BP_ASSIGNMENT - 1, true)?;
            elements.push(el);
            if self.at_punct(Punct::Comma) {
                self.bump()?;
            } else {
                break;
            }
        }
        self.expect_punct(Punct::RBracket)?;
        if self.funcs.current().in_scanning {
            return Ok(Ivalue::None);
        }
        let fs = self.funcs.current_mut();
        let dest = fs.regalloc.alloc_temp()?;
        fs.emitter.emit_a_bc(Opcode::NewArr, dest, elements.len() as u32)?;
        drop(fs);
        for (i, el) in elements.into_iter().enumerate() {
            let rc = self.ivalue_to_ispec(el)?;
            let fs = self.funcs.current_mut();
            fs.emitter
                .emit_abc_regs(Opcode::MPutArr, dest, rc_to_regconst(rc), RegConst::reg(i as u32))?;
        }
        Ok(Ivalue::Plain(Ispec::RegConst(RegConst::reg(dest))))
    }

    fn parse_object_literal(&mut self) -> Result<Ivalue> {
        self.bump()?; // `{`
        let mut props = Vec::new();
        while !self.at_punct(Punct::RBrace) {
            let key = self.parse_property_name()?;
            self.expect_punct(Punct::Colon)?;
            let value = self.expr(BP_ASSIGNMENT - 1, true)?;
            props.push((key, value));
            if self.at_punct(Punct::Comma) {
                self.bump()?;
            } else {
                break;
            }
        }
        self.expect_punct(Punct::RBrace)?;
        if self.funcs.current().in_scanning {
            return Ok(Ivalue::None);
        }
        let fs = self.funcs.current_mut();
        let dest = fs.regalloc.alloc_temp()?;
        fs.emitter.emit_a_bc(Opcode::NewObj, dest, props.len() as u32)?;
        drop(fs);
        for (key, value) in props {
            let key_const = {
                let fs = self.funcs.current_mut();
                fs.constpool.intern(Literal::String(key))?
            };
            let rc = self.ivalue_to_ispec(value)?;
            let fs = self.funcs.current_mut();
            fs.emitter
                .emit_abc_regs(Opcode::MPutObj, dest, RegConst::constant(key_const), rc_to_regconst(rc))?;
        }
        Ok(Ivalue::Plain(Ispec::RegConst(RegConst::reg(dest))))
    }

    fn parse_property_name(&mut self) -> Result<Atom> {
        match self.current.kind.clone() {
            TokenKind::Ident(a) => {
                self.bump()?;
                Ok(a)
            }
            TokenKind::StringLiteral(a) => {
                self.bump()?;
                Ok(a)
            }
            TokenKind::NumberLiteral(n) => {
                self.bump()?;
                Ok(self.interner.intern(&n.to_string()))
            }
            TokenKind::Keyword(kw) => {
                let text = format!("{kw:?}").to_lowercase();
                self.bump()?;
                Ok(self.interner.intern(&text))
            }
            other => Err(CompileError::syntax(
                format!("invalid property name {other:?}"),
                self.current.line,
            )),
        }
    }

    fn parse_new_expression(&mut self) -> Result<Ivalue> {
        self.bump()?; // `new`
        let callee = self.expr(BP_CALL, true)?;
        let mut args = Vec::new();
        if self.at_punct(Punct::LParen) {
            self.bump()?;
            while !self.at_punct(Punct::RParen) {
                args.push(self.expr(BP_ASSIGNMENT - 1, true)?);
                if self.at_punct(Punct::Comma) {
                    self.bump()?;
                } else {
                    break;
                }
            }
            self.expect_punct(Punct::RParen)?;
        }
        if self.funcs.current().in_scanning {
            return Ok(Ivalue::None);
        }
        let callee_rc = self.ivalue_to_ispec(callee)?;
        let fs = self.funcs.current_mut();
        let base = fs.regalloc.alloc_temps(2)?;
        fs.emitter
            .emit_abc_regs(Opcode::CsReg, base, rc_to_regconst(callee_rc), RegConst::reg(0))?;
        drop(fs);
        let nargs = args.len() as u32;
        for arg in args {
            let rc = self.ivalue_to_ispec(arg)?;
            let fs = self.funcs.current_mut();
            let dest = fs.regalloc.alloc_temp()?;
            fs.emitter.emit_abc_regs(Opcode::LdReg, dest, rc_to_regconst(rc), RegConst::reg(0))?;
        }
        let fs = self.funcs.current_mut();
        let dest = fs.regalloc.alloc_temp()?;
        fs.emitter.emit_indirectable(Opcode::New, base, (nargs << 9) | dest)?;
        Ok(Ivalue::Plain(Ispec::RegConst(RegConst::reg(dest))))
    }

    fn parse_call(&mut self, callee: Ivalue) -> Result<Ivalue> {
        self.bump()?; // `(`
        let is_eval_call = matches!(&callee, Ivalue::Var(Ispec::Value(Literal::String(a))) if self.interner.resolve(*a) == "eval");
        let mut args = Vec::new();
        while !self.at_punct(Punct::RParen) {
            args.push(self.expr(BP_ASSIGNMENT - 1, true)?);
            if self.at_punct(Punct::Comma) {
                self.bump()?;
            } else {
                break;
            }
        }
        self.expect_punct(Punct::RParen)?;
        if self.funcs.current().in_scanning {
            if is_eval_call {
                self.funcs.current_mut().may_direct_eval = true;
            }
            return Ok(Ivalue::None);
        }
        let setup_op = match &callee {
            Ivalue::Prop(..) => Opcode::CsProp,
            Ivalue::Var(..) => Opcode::CsVar,
            _ => Opcode::CsReg,
        };
        let callee_ispec = self.ivalue_to_two_operands(callee)?;
        let fs = self.funcs.current_mut();
        let base = fs.regalloc.alloc_temps(2)?;
        fs.emitter
            .emit_abc_regs(setup_op, base, rc_to_regconst(callee_ispec.0), rc_to_regconst(callee_ispec.1))?;
        drop(fs);
        let nargs = args.len() as u32;
        for arg in args {
            let rc = self.ivalue_to_ispec(arg)?;
            let fs = self.funcs.current_mut();
            let dest = fs.regalloc.alloc_temp()?;
            fs.emitter.emit_abc_regs(Opcode::LdReg, dest, rc_to_regconst(rc), RegConst::reg(0))?;
        }
        let fs = self.funcs.current_mut();
        if is_eval_call {
            fs.may_direct_eval = true;
        }
        let mut call_flags = 0u32;
        if is_eval_call {
            call_flags |= instr::CALL_EVALCALL;
        }
        // The call's result overwrites its own setup/argument frame base
        // rather than landing in a separately-allocated register.
        fs.emitter
            .emit_abc_regs(Opcode::Call, call_flags, RegConst::reg(base), RegConst::reg(nargs))?;
        Ok(Ivalue::Plain(Ispec::RegConst(RegConst::reg(base))))
    }

    /// `CSVAR`/`CSPROP`/`CSREG` each take a two-operand shape (name or
    /// object+key, or a plain register); this normalizes any ivalue into
    /// that pair, using `reg(0)` as the unused second slot for the plain
    /// register case.
    fn ivalue_to_two_operands(&mut self, ivalue: Ivalue) -> Result<(Ispec, Ispec)> {
        match ivalue {
            Ivalue::Prop(obj, key) => Ok((obj, key)),
            Ivalue::Var(name) => Ok((name, Ispec::Value(Literal::Undefined))),
            other => {
                let rc = self.ivalue_to_ispec(other)?;
                Ok((rc, Ispec::Value(Literal::Undefined)))
            }
        }
    }

    fn parse_delete(&mut self) -> Result<Ivalue> {
        self.bump()?; // `delete`
        let line = self.current.line;
        if let TokenKind::Ident(_) = self.current.kind
            && self.funcs.current().strict_mode
        {
            return Err(CompileError::syntax("delete of an unqualified identifier is forbidden in strict mode", line));
        }
        let operand = self.expr(BP_POSTFIX, true)?;
        if self.funcs.current().in_scanning {
            return Ok(Ivalue::None);
        }
        match operand {
            Ivalue::Prop(obj, key) => {
                let short_const = MaterializeFlags {
                    allow_const: true,
                    require_temp: false,
                    require_short: true,
                };
                let fs = self.funcs.current_mut();
                let obj_rc = fs
                    .emitter
                    .toregconst(Ivalue::Plain(obj), short_const, &mut fs.regalloc, &mut fs.constpool)?;
                let key_rc = fs
                    .emitter
                    .toregconst(Ivalue::Plain(key), short_const, &mut fs.regalloc, &mut fs.constpool)?;
                let dest = fs.regalloc.alloc_temp()?;
                fs.emitter.emit_abc_regs(Opcode::DelProp, dest, obj_rc, key_rc)?;
                Ok(Ivalue::Plain(Ispec::RegConst(RegConst::reg(dest))))
            }
            Ivalue::Var(name_ispec) => {
                let short_const = MaterializeFlags {
                    allow_const: true,
                    require_temp: false,
                    require_short: true,
                };
                let fs = self.funcs.current_mut();
                let name_rc =
                    fs.emitter
                        .toregconst(Ivalue::Plain(name_ispec), short_const, &mut fs.regalloc, &mut fs.constpool)?;
                let dest = fs.regalloc.alloc_temp()?;
                fs.emitter.emit_abc_regs(Opcode::DelVar, dest, name_rc, RegConst::reg(0))?;
                Ok(Ivalue::Plain(Ispec::RegConst(RegConst::reg(dest))))
            }
            _ => Ok(Ivalue::Plain(Ispec::Value(Literal::Boolean(true)))),
        }
    }

    fn parse_prefix_incdec(&mut self, opcode: Opcode, line: u32) -> Result<Ivalue> {
        self.bump()?;
        let target = self.expr(BP_POSTFIX, true)?;
        self.emit_incdec(target, opcode, line, true)
    }

    fn parse_postfix_incdec(&mut self, target: Ivalue, opcode: Opcode) -> Result<Ivalue> {
        let line = self.current.line;
        self.bump()?;
        self.emit_incdec(target, opcode, line, false)
    }

    fn emit_incdec(&mut self, target: Ivalue, opcode: Opcode, line: u32, is_prefix: bool) -> Result<Ivalue> {
        if self.funcs.current().in_scanning {
            return Ok(Ivalue::None);
        }
        match target {
            Ivalue::Plain(Ispec::RegConst(rc)) if !rc.is_const => {
                let fs = self.funcs.current_mut();
                let old = fs.regalloc.alloc_temp()?;
                fs.emitter.emit_abc_regs(Opcode::ToNum, old, rc, RegConst::reg(0))?;
                fs.emitter.emit_abc_regs(opcode, rc.index, RegConst::reg(old), RegConst::reg(0))?;
                let result_reg = if is_prefix { rc.index } else { old };
                Ok(Ivalue::Plain(Ispec::RegConst(RegConst::reg(result_reg))))
            }
            Ivalue::Var(name_ispec) => {
                let short_const = MaterializeFlags {
                    allow_const: true,
                    require_temp: false,
                    require_short: true,
                };
                let fs = self.funcs.current_mut();
                let name_rc = fs.emitter.toregconst(
                    Ivalue::Plain(name_ispec),
                    short_const,
                    &mut fs.regalloc,
                    &mut fs.constpool,
                )?;
                let old = fs.regalloc.alloc_temp()?;
                fs.emitter.emit_abc_regs(Opcode::GetVar, old, name_rc, RegConst::reg(0))?;
                fs.emitter.emit_abc_regs(Opcode::ToNum, old, RegConst::reg(old), RegConst::reg(0))?;
                let updated = fs.regalloc.alloc_temp()?;
                fs.emitter.emit_abc_regs(opcode, updated, RegConst::reg(old), RegConst::reg(0))?;
                fs.emitter.emit_abc_regs(Opcode::PutVar, 0, name_rc, RegConst::reg(updated))?;
                let result_reg = if is_prefix { updated } else { old };
                Ok(Ivalue::Plain(Ispec::RegConst(RegConst::reg(result_reg))))
            }
            Ivalue::Prop(obj, key) => {
                let short_const = MaterializeFlags {
                    allow_const: true,
                    require_temp: false,
                    require_short: true,
                };
                let fs = self.funcs.current_mut();
                let obj_rc = fs.emitter.toregconst(Ivalue::Plain(obj), short_const, &mut fs.regalloc, &mut fs.constpool)?;
                let key_rc = fs.emitter.toregconst(Ivalue::Plain(key), short_const, &mut fs.regalloc, &mut fs.constpool)?;
                let old = fs.regalloc.alloc_temp()?;
                fs.emitter.emit_abc_regs(Opcode::GetProp, old, obj_rc, key_rc)?;
                fs.emitter.emit_abc_regs(Opcode::ToNum, old, RegConst::reg(old), RegConst::reg(0))?;
                let updated = fs.regalloc.alloc_temp()?;
                fs.emitter.emit_abc_regs(opcode, updated, RegConst::reg(old), RegConst::reg(0))?;
                fs.emitter.emit_abc_regs(Opcode::PutProp, 0, obj_rc, RegConst::reg(updated))?;
                let result_reg = if is_prefix { updated } else { old };
                Ok(Ivalue::Plain(Ispec::RegConst(RegConst::reg(result_reg))))
            }
            _ => {
                let fs = self.funcs.current_mut();
                fs.emitter.emit_abc_regs(Opcode::InvLhs, 0, RegConst::reg(0), RegConst::reg(0))?;
                Err(CompileError::syntax("invalid increment/decrement target", line))
            }
        }
    }

    fn parse_logical(&mut self, left: Ivalue, is_or: bool) -> Result<Ivalue> {
        self.bump()?;
        let bp = if is_or { BP_LOR } else { BP_LAND };
        if self.funcs.current().in_scanning {
            self.expr(bp, true)?;
            return Ok(Ivalue::None);
        }
        let short_const = MaterializeFlags {
            allow_const: false,
            require_temp: true,
            require_short: true,
        };
        let lhs_rc = {
            let fs = self.funcs.current_mut();
            fs.emitter.toregconst(left, short_const, &mut fs.regalloc, &mut fs.constpool)?
        };
        let jump_idx = {
            let fs = self.funcs.current_mut();
            let jump_op = if is_or { Opcode::If } else { Opcode::If };
            // `IF truthflag, regconst`: skips the next instruction (the
            // jump to short-circuit) when the truthiness test fails.
            fs.emitter.emit_abc_regs(jump_op, is_or as u32, lhs_rc, RegConst::reg(0))?;
            fs.emitter.emit_jump_placeholder(Opcode::Jump)?
        };
        let rhs = self.expr(bp, true)?;
        {
            let fs = self.funcs.current_mut();
            fs.emitter.toregconst(rhs, short_const, &mut fs.regalloc, &mut fs.constpool)?;
        }
        let fs = self.funcs.current_mut();
        let end_pc = fs.emitter.pc();
        fs.emitter.patch_jump_to(jump_idx, end_pc)?;
        Ok(Ivalue::Plain(Ispec::RegConst(lhs_rc)))
    }

    fn parse_conditional(&mut self, cond: Ivalue) -> Result<Ivalue> {
        self.bump()?; // `?`
        if self.funcs.current().in_scanning {
            self.expr(BP_ASSIGNMENT - 1, true)?;
            self.expect_punct(Punct::Colon)?;
            self.expr(BP_ASSIGNMENT - 1, true)?;
            return Ok(Ivalue::None);
        }
        let short_const = MaterializeFlags {
            allow_const: true,
            require_temp: false,
            require_short: true,
        };
        let cond_rc = {
            let fs = self.funcs.current_mut();
            fs.emitter.toregconst(cond, short_const, &mut fs.regalloc, &mut fs.constpool)?
        };
        let skip_then_idx = {
            let fs = self.funcs.current_mut();
            // Jump straight to the else branch when the condition is falsy
            // (flag 0, matching `&&`'s short-circuit-on-falsy convention).
            fs.emitter.emit_abc_regs(Opcode::If, 0, cond_rc, RegConst::reg(0))?;
            fs.emitter.emit_jump_placeholder(Opcode::Jump)?
        };
        let dest = {
            let fs = self.funcs.current_mut();
            fs.regalloc.alloc_temp()?
        };
        let then_val = self.expr(BP_ASSIGNMENT - 1, true)?;
        {
            let require_temp_dest = MaterializeFlags {
                allow_const: true,
                require_temp: false,
                require_short: true,
            };
            let fs = self.funcs.current_mut();
            let rc = fs.emitter.toregconst(then_val, require_temp_dest, &mut fs.regalloc, &mut fs.constpool)?;
            fs.emitter.emit_abc_regs(Opcode::LdReg, dest, rc, RegConst::reg(0))?;
        }
        self.expect_punct(Punct::Colon)?;
        let skip_else_idx = {
            let fs = self.funcs.current_mut();
            fs.emitter.emit_jump_placeholder(Opcode::Jump)?
        };
        {
            let fs = self.funcs.current_mut();
            let then_pc = fs.emitter.pc();
            fs.emitter.patch_jump_to(skip_then_idx, then_pc)?;
        }
        let else_val = self.expr(BP_ASSIGNMENT - 1, true)?;
        {
            let flags = MaterializeFlags {
                allow_const: true,
                require_temp: false,
                require_short: true,
            };
            let fs = self.funcs.current_mut();
            let rc = fs.emitter.toregconst(else_val, flags, &mut fs.regalloc, &mut fs.constpool)?;
            fs.emitter.emit_abc_regs(Opcode::LdReg, dest, rc, RegConst::reg(0))?;
        }
        let fs = self.funcs.current_mut();
        let end_pc = fs.emitter.pc();
        fs.emitter.patch_jump_to(skip_else_idx, end_pc)?;
        Ok(Ivalue::Plain(Ispec::RegConst(RegConst::reg(dest))))
    }

    fn parse_assignment(&mut self, left: Ivalue, compound: Option<CompoundOp>, allow_in: bool) -> Result<Ivalue> {
        let line = self.current.line;
        self.bump()?;
        let rhs = self.expr(BP_ASSIGNMENT - 1, allow_in)?;
        if self.funcs.current().in_scanning {
            return Ok(Ivalue::None);
        }
        self.check_assignment_target_allowed(&left, line)?;
        let value = self.combine_compound(left.clone(), rhs, compound)?;
        self.store_to_target(left, value, line)
    }

    fn check_assignment_target_allowed(&self, left: &Ivalue, line: u32) -> Result<()> {
        if let Ivalue::Var(Ispec::Value(Literal::String(name))) = left {
            let name_str = self.interner.resolve(*name);
            if (name_str == "eval" || name_str == "arguments") && self.funcs.current().strict_mode {
                return Err(CompileError::syntax(
                    "assignment to eval/arguments is forbidden in strict mode",
                    line,
                ));
            }
        }
        Ok(())
    }

    /// Store `value` into `target`, emitting the appropriate
    /// `LDREG`/`PUTVAR`/`PUTPROP`. Shared between ordinary assignment,
    /// `for-in` per-iteration key binding, and `var` initializers.
    pub(crate) fn store_to_target(&mut self, target: Ivalue, value: Ivalue, line: u32) -> Result<Ivalue> {
        let short_const = MaterializeFlags {
            allow_const: true,
            require_temp: false,
            require_short: true,
        };
        match target {
            Ivalue::Plain(Ispec::RegConst(rc)) if !rc.is_const => {
                let fs = self.funcs.current_mut();
                let value_rc = fs.emitter.toregconst(value, short_const, &mut fs.regalloc, &mut fs.constpool)?;
                fs.emitter.emit_abc_regs(Opcode::LdReg, rc.index, value_rc, RegConst::reg(0))?;
                Ok(Ivalue::Plain(Ispec::RegConst(rc)))
            }
            Ivalue::Var(name_ispec) => {
                let fs = self.funcs.current_mut();
                let name_rc =
                    fs.emitter
                        .toregconst(Ivalue::Plain(name_ispec), short_const, &mut fs.regalloc, &mut fs.constpool)?;
                let value_rc = fs.emitter.toregconst(value, short_const, &mut fs.regalloc, &mut fs.constpool)?;
                fs.emitter.emit_abc_regs(Opcode::PutVar, 0, name_rc, value_rc)?;
                Ok(Ivalue::Plain(Ispec::RegConst(value_rc)))
            }
            Ivalue::Prop(obj, key) => {
                let fs = self.funcs.current_mut();
                let obj_rc = fs.emitter.toregconst(Ivalue::Plain(obj), short_const, &mut fs.regalloc, &mut fs.constpool)?;
                let key_rc = fs.emitter.toregconst(Ivalue::Plain(key), short_const, &mut fs.regalloc, &mut fs.constpool)?;
                let value_rc = fs.emitter.toregconst(value, short_const, &mut fs.regalloc, &mut fs.constpool)?;
                fs.emitter.emit_abc_regs(Opcode::PutProp, 0, obj_rc, key_rc)?;
                fs.emitter.emit_abc_regs(Opcode::LdReg, 0, value_rc, RegConst::reg(0))?;
                Ok(Ivalue::Plain(Ispec::RegConst(value_rc)))
            }
            _ => {
                let fs = self.funcs.current_mut();
                fs.emitter.emit_abc_regs(Opcode::InvLhs, 0, RegConst::reg(0), RegConst::reg(0))?;
                Err(CompileError::syntax("invalid assignment target", line))
            }
        }
    }

    /// `function` as an expression (the two-pass skip protocol): on pass
    /// 1 this fully compiles the nested function now (the only place its
    /// body is ever actually parsed); on pass 2 it seeks past the
    /// already-compiled body and emits `CLOSURE` against the template
    /// pass 1 recorded.
    fn parse_function_expression(&mut self) -> Result<Ivalue> {
        self.bump()?; // `function`
        let name = if self.current.as_ident().is_some() {
            Some(self.expect_ident()?)
        } else {
            None
        };
        if self.funcs.current().in_scanning {
            // Pass 1: compile the nested function now, this being its only
            // chance. The enclosing function's own pass is still scanning,
            // so nothing here actually emits.
            self.compile_nested_function(name)?;
            self.note_node();
            return Ok(Ivalue::None);
        }
        let (skip_point, _skip_line) = {
            let fs = self.funcs.current_mut();
            let fnum = fs.fnum_next;
            fs.fnum_next += 1;
            fs.child_end_points[fnum as usize]
        };
        self.lexer.set_point(skip_point);
        self.current = self.lexer.parse_next_token(&mut self.interner, self.funcs.current().strict_mode, false)?;
        let fs = self.funcs.current_mut();
        let fnum = fs.fnum_next - 1;
        let dest = fs.regalloc.alloc_temp()?;
        fs.emitter.emit_a_bc(Opcode::Closure, dest, fnum)?;
        Ok(Ivalue::Plain(Ispec::RegConst(RegConst::reg(dest))))
    }

    pub(crate) fn combine_compound(&mut self, current: Ivalue, rhs: Ivalue, compound: Option<CompoundOp>) -> Result<Ivalue> {
        match compound {
            None => Ok(rhs),
            Some(CompoundOp::Arith(op)) => {
                let current_ispec = self.ivalue_to_ispec(current)?;
                let rhs_ispec = self.ivalue_to_ispec(rhs)?;
                Ok(Ivalue::Arith(op, current_ispec, rhs_ispec))
            }
            Some(CompoundOp::Binary(opcode)) => self.emit_binary(opcode, current, rhs),
        }
    }
}

fn rc_to_regconst(ispec: Ispec) -> RegConst {
    match ispec {
        Ispec::RegConst(rc) => rc,
        Ispec::Value(_) => RegConst::reg(0),
    }
}
