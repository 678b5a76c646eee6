//! Top-level driver.
//!
//! The three public entry points are the only way to produce a
//! `FunctionTemplate`: a compile is always a single two-pass run over the
//! whole source, wrapped so that any error gets a line number attached
//! before it reaches the caller, the same contract as the inner-function
//! compile in `bodycompiler.rs`.

use crate::bodycompiler::Parser;
use crate::config::CompilerConfig;
use crate::error::Result;
use crate::funcstate::{BindingMode, FuncState};
use crate::instr::{self, Opcode, RegConst};
use crate::peephole;
use crate::template::{FunctionTemplate, VarMapEntry};
use mjs_core::interner::Atom;

/// Compile a top-level program: a sequence of statements executed in the
/// global scope.
pub fn compile_program(source: &str, config: CompilerConfig) -> Result<FunctionTemplate> {
    compile_top_level(source, &[], config)
}

/// Compile the body of a direct or indirect `eval` call. Differs from
/// `compile_program` only in the `eval` compile flag, which the
/// statement parser consults for `var`-hoisting-into-caller-scope
/// decisions it can't make on its own.
pub fn compile_eval(source: &str, mut config: CompilerConfig) -> Result<FunctionTemplate> {
    config.eval = true;
    compile_top_level(source, &[], config)
}

/// Compile the body of a `Function` constructor call: `formal_params` are
/// the constructor's comma-joined parameter names, already split by the
/// caller; `source` is the function body text alone (no braces).
pub fn compile_function_body(source: &str, formal_params: &[&str], mut config: CompilerConfig) -> Result<FunctionTemplate> {
    config.funcexpr = true;
    compile_top_level(source, formal_params, config)
}

fn compile_top_level(source: &str, formal_params: &[&str], config: CompilerConfig) -> Result<FunctionTemplate> {
    let mut parser = Parser::new(source, config)?;
    let result = run_top_level(&mut parser, formal_params);
    result.map_err(|e| e.with_line_if_missing(parser.current.line))
}

fn run_top_level(parser: &mut Parser, formal_params: &[&str]) -> Result<FunctionTemplate> {
    parser.funcs.push(FuncState::with_const_window(None, parser.config.const_window));
    let binding_mode = if parser.config.eval {
        BindingMode::Eval
    } else if parser.config.funcexpr {
        BindingMode::Function
    } else {
        BindingMode::Global
    };
    parser.funcs.current_mut().set_binding_mode(binding_mode);
    let formals: Vec<Atom> = formal_params.iter().map(|name| parser.interner.intern(name)).collect();
    parser.funcs.current_mut().formals = formals.clone();
    if parser.config.strict {
        parser.funcs.current_mut().strict_mode = true;
    }

    let body_start = parser.lexer.get_point();
    let body_start_token = parser.current.clone();

    parser.parse_statements_until_eof()?;

    parser.funcs.current_mut().reset_for_pass2();
    parser.lexer.set_point(body_start);
    parser.current = body_start_token;

    parser.emit_function_prologue(&formals)?;
    parser.parse_statements_until_eof()?;

    let fast = parser.funcs.current().catch_depth == 0;
    let ret_a = if fast { instr::RETURN_FAST } else { 0 };
    parser
        .funcs
        .current_mut()
        .emitter
        .emit_abc_regs(Opcode::Return, ret_a, RegConst::reg(0), RegConst::reg(0))?;

    let fs = parser.funcs.pop().expect("pushed above");
    let always_declvar = matches!(fs.binding_mode, BindingMode::Eval | BindingMode::Global);
    let var_map = if always_declvar || fs.id_access_slow || fs.may_direct_eval || fs.with_depth > 0 {
        Some(
            fs.var_map
                .iter()
                .map(|(name, slot)| {
                    let entry = match slot {
                        crate::funcstate::RegSlot::Register(r) => VarMapEntry::Register(*r),
                        crate::funcstate::RegSlot::SlowPath => VarMapEntry::SlowPath,
                    };
                    (*name, entry)
                })
                .collect(),
        )
    } else {
        None
    };
    let mut instructions = fs.emitter.into_instructions();
    peephole::run(&mut instructions, parser.config.peephole_max_passes);
    Ok(FunctionTemplate::finalize(
        instructions,
        fs.constpool.as_slice().to_vec(),
        fs.child_templates,
        fs.regalloc.temp_max,
        formals.len() as u32,
        None,
        None,
        var_map,
        formals,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_an_empty_program() {
        let template = compile_program("", CompilerConfig::new()).unwrap();
        assert_eq!(template.nargs, 0);
    }

    #[test]
    fn compiles_a_simple_var_declaration() {
        let template = compile_program("var x = 1;", CompilerConfig::new()).unwrap();
        assert!(!template.bytecode.is_empty());
    }

    #[test]
    fn compiles_a_function_body_with_formal_params() {
        let template = compile_function_body("return a + b;", &["a", "b"], CompilerConfig::new()).unwrap();
        assert_eq!(template.nargs, 2);
    }

    #[test]
    fn syntax_error_carries_a_line_number() {
        let err = compile_program("var;", CompilerConfig::new()).unwrap_err();
        assert!(err.line.is_some());
    }
}
