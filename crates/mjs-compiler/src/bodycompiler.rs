//! The `Parser` struct ("Parser state") and the handful of plumbing
//! methods every other module's `impl Parser` block leans on: advancing
//! the token stream, expecting a punctuator, and the recursion-depth
//! guard around `expr`/statement recursion.
//!
//! `pratt.rs` and `stmt.rs` each contribute their own `impl<'src>
//! Parser<'src>` block; this file owns construction and the bits neither
//! of those modules should have to duplicate.

use crate::config::CompilerConfig;
use crate::error::{CompileError, Result};
use crate::funcstate::{BindingMode, DeclKind, FuncState, FuncStateStack, RegSlot};
use crate::instr::{self, Opcode, RegConst};
use crate::peephole;
use crate::template::FunctionTemplate;
use mjs_core::interner::{Atom, StringInterner};
use mjs_core::value::Literal;
use mjs_lexer::{Lexer, Punct, Token, TokenKind};

/// Recursion depth ceiling for nested `expr`/statement calls. Chosen
/// well below any realistic native stack limit so a `RangeError` is
/// raised before the process actually overflows its stack.
const MAX_RECURSION_DEPTH: u32 = 1200;

pub struct Parser<'src> {
    pub(crate) lexer: Lexer<'src>,
    pub(crate) interner: StringInterner,
    pub(crate) funcs: FuncStateStack,
    pub(crate) current: Token,
    pub(crate) config: CompilerConfig,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str, config: CompilerConfig) -> Result<Self> {
        let mut lexer = Lexer::new(source);
        let mut interner = StringInterner::new();
        let current = lexer.parse_next_token(&mut interner, config.strict, true)?;
        Ok(Parser {
            lexer,
            interner,
            funcs: FuncStateStack::new(),
            current,
            config,
        })
    }

    /// Advance to the next token. `allow_regexp` is derived from the
    /// token being left behind: a `/` can only start a regexp literal
    /// where the previous token couldn't itself end an expression.
    pub(crate) fn bump(&mut self) -> Result<()> {
        let allow_regexp = !self.current.no_regexp_follows();
        let strict = self.config.strict || (!self.funcs.is_empty() && self.funcs.current().strict_mode);
        self.current = self
            .lexer
            .parse_next_token(&mut self.interner, strict, allow_regexp)?;
        Ok(())
    }

    pub(crate) fn at_punct(&self, p: Punct) -> bool {
        matches!(self.current.kind, TokenKind::Punct(found) if found == p)
    }

    pub(crate) fn expect_punct(&mut self, p: Punct) -> Result<()> {
        if !self.at_punct(p) {
            return Err(CompileError::syntax(
                format!("expected {p:?}, found {:?}", self.current.kind),
                self.current.line,
            ));
        }
        self.bump()
    }

    pub(crate) fn recursion_increase(&mut self) -> Result<()> {
        let fs = self.funcs.current_mut();
        fs.recursion_depth += 1;
        if fs.recursion_depth > MAX_RECURSION_DEPTH {
            return Err(CompileError::range(
                "expression or statement nesting too deep",
                self.current.line,
            ));
        }
        Ok(())
    }

    pub(crate) fn recursion_decrease(&mut self) {
        self.funcs.current_mut().recursion_depth -= 1;
    }

    pub(crate) fn note_node(&mut self) {
        self.funcs.current_mut().note_node();
    }

    /// Parse a parenthesized, comma-separated formal parameter list.
    /// Assumes `self.current` is `(`.
    pub(crate) fn parse_formal_params(&mut self) -> Result<Vec<Atom>> {
        self.expect_punct(Punct::LParen)?;
        let mut formals = Vec::new();
        while !self.at_punct(Punct::RParen) {
            formals.push(self.expect_ident()?);
            if self.at_punct(Punct::Comma) {
                self.bump()?;
            } else {
                break;
            }
        }
        self.expect_punct(Punct::RParen)?;
        Ok(formals)
    }

    /// Prologue shared by every function body (nested or top-level):
    /// reserve shuffle registers if pass 1's node count warrants them,
    /// bind formals to the lowest registers, then emit the hoisted
    /// `var`/function declarations collected during pass 1, before
    /// freezing the non-temp region for the body proper.
    ///
    /// Program and eval code always declares through `DECLVAR` into the
    /// surrounding variable object rather than a register, regardless of
    /// whether anything in the body actually forces the slow path —
    /// there's no register frame for a global/eval binding to live in.
    /// Plain function code keeps the register-or-slow-path choice.
    pub(crate) fn emit_function_prologue(&mut self, formals: &[Atom]) -> Result<()> {
        let needs_shuffle = self
            .funcs
            .current()
            .decide_shuffle_registers(self.config.force_shuffle_registers);
        if needs_shuffle {
            self.funcs.current_mut().reserve_shuffle_registers()?;
        }
        let nargs = formals.len() as u32;
        {
            let fs = self.funcs.current_mut();
            fs.regalloc.reserve_low(nargs)?;
            let base = fs.regalloc.temp_first - nargs;
            for (i, name) in formals.iter().enumerate() {
                fs.var_map.insert(*name, RegSlot::Register(base + i as u32));
            }
        }
        let binding_mode = self.funcs.current().binding_mode;
        let always_declvar = matches!(binding_mode, BindingMode::Eval | BindingMode::Global);
        let slow_path_vars = always_declvar || {
            let fs = self.funcs.current();
            fs.id_access_slow || fs.may_direct_eval || fs.with_depth > 0
        };
        let decls = self.funcs.current().declarations.clone();
        for decl in decls {
            let fs = self.funcs.current_mut();
            match decl.kind {
                DeclKind::Function(child_index) => {
                    let dest = fs.regalloc.alloc_temp()?;
                    fs.emitter.emit_a_bc(Opcode::Closure, dest, child_index)?;
                    if slow_path_vars {
                        let mut flags = instr::DECLVAR_WRITABLE | instr::DECLVAR_ENUMERABLE | instr::DECLVAR_FUNC_DECL;
                        if binding_mode == BindingMode::Eval {
                            flags |= instr::DECLVAR_CONFIGURABLE;
                        }
                        let name_idx = fs.constpool.intern(Literal::String(decl.name))?;
                        fs.emitter.emit_abc_regs(
                            Opcode::DeclVar,
                            flags,
                            RegConst::constant(name_idx),
                            RegConst::reg(dest),
                        )?;
                        fs.var_map.insert(decl.name, RegSlot::SlowPath);
                    } else {
                        fs.var_map.insert(decl.name, RegSlot::Register(dest));
                    }
                }
                DeclKind::Var => {
                    if fs.var_map.contains_key(&decl.name) {
                        continue;
                    }
                    if slow_path_vars {
                        let flags = instr::DECLVAR_WRITABLE
                            | instr::DECLVAR_ENUMERABLE
                            | instr::DECLVAR_CONFIGURABLE
                            | instr::DECLVAR_UNDEF_VALUE;
                        let name_idx = fs.constpool.intern(Literal::String(decl.name))?;
                        fs.emitter.emit_abc_regs(
                            Opcode::DeclVar,
                            flags,
                            RegConst::constant(name_idx),
                            RegConst::reg(0),
                        )?;
                        fs.var_map.insert(decl.name, RegSlot::SlowPath);
                    } else {
                        let dest = fs.regalloc.alloc_temp()?;
                        fs.var_map.insert(decl.name, RegSlot::Register(dest));
                    }
                }
            }
        }
        self.funcs.current_mut().regalloc.freeze_non_temp_region();
        Ok(())
    }

    /// Run the two-pass compile of a nested function body and finalize it
    /// into a `FunctionTemplate`, recording it (and the lexer point past
    /// its closing brace) on the now-current (outer) `FuncState`.
    /// Assumes `self.current` is the `(` opening the formal parameter
    /// list; leaves `self.current` positioned just past the nested
    /// function's closing `}`.
    pub(crate) fn compile_nested_function(&mut self, name: Option<Atom>) -> Result<u32> {
        self.funcs.push(FuncState::with_const_window(name, self.config.const_window));
        let formals = self.parse_formal_params()?;
        self.funcs.current_mut().formals = formals.clone();
        self.expect_punct(Punct::LBrace)?;
        let body_start = self.lexer.get_point();
        let body_start_token = self.current.clone();

        self.parse_statements_until_rbrace()?;
        let skip_point = self.lexer.get_point();
        let skip_line = self.current.line;
        self.bump()?; // past `}`

        self.funcs.current_mut().reset_for_pass2();
        self.lexer.set_point(body_start);
        self.current = body_start_token;

        self.emit_function_prologue(&formals)?;
        self.parse_statements_until_rbrace()?;
        self.bump()?; // past `}`

        let fast = self.funcs.current().catch_depth == 0;
        let ret_a = if fast { instr::RETURN_FAST } else { 0 };
        self.funcs
            .current_mut()
            .emitter
            .emit_abc_regs(Opcode::Return, ret_a, RegConst::reg(0), RegConst::reg(0))?;

        let fs = self.funcs.pop().expect("pushed above");
        let name_for_template = fs.name;
        let var_map = if fs.id_access_slow || fs.may_direct_eval || fs.with_depth > 0 {
            Some(
                fs.var_map
                    .iter()
                    .map(|(name, slot)| {
                        let entry = match slot {
                            RegSlot::Register(r) => crate::template::VarMapEntry::Register(*r),
                            RegSlot::SlowPath => crate::template::VarMapEntry::SlowPath,
                        };
                        (*name, entry)
                    })
                    .collect(),
            )
        } else {
            None
        };
        let instructions = fs.emitter.into_instructions();
        let mut instructions = instructions;
        peephole::run(&mut instructions, self.config.peephole_max_passes);
        let template = FunctionTemplate::finalize(
            instructions,
            fs.constpool.as_slice().to_vec(),
            fs.child_templates,
            fs.regalloc.temp_max,
            formals.len() as u32,
            name_for_template,
            None,
            var_map,
            formals,
        );

        let outer = self.funcs.current_mut();
        outer.child_templates.push(template);
        outer.child_end_points.push((skip_point, skip_line));
        Ok((outer.child_templates.len() - 1) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructs_and_reads_first_token() {
        let parser = Parser::new("1 + 2", CompilerConfig::new()).unwrap();
        assert!(matches!(parser.current.kind, TokenKind::NumberLiteral(n) if n == 1.0));
    }

    #[test]
    fn bump_advances_and_flips_regexp_ambiguity() {
        let mut parser = Parser::new("x / 2", CompilerConfig::new()).unwrap();
        parser.funcs.push(crate::funcstate::FuncState::new(None));
        parser.bump().unwrap();
        assert!(matches!(parser.current.kind, TokenKind::Punct(Punct::Slash)));
    }

    #[test]
    fn expect_punct_rejects_mismatch() {
        let mut parser = Parser::new("1 + 2", CompilerConfig::new()).unwrap();
        parser.funcs.push(crate::funcstate::FuncState::new(None));
        assert!(parser.expect_punct(Punct::RParen).is_err());
    }
}
