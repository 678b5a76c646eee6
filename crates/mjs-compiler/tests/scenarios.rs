//! End-to-end scenarios exercising the public driver API against real
//! source snippets, rather than individual parser methods.

use mjsc::{decode_a, decode_b, decode_c, decode_opcode, CompileErrorKind, CompilerConfig, Opcode};

fn compile(src: &str) -> mjsc::FunctionTemplate {
    mjsc::compile_program(src, CompilerConfig::new()).expect("expected successful compile")
}

fn find(template: &mjsc::FunctionTemplate, op: Opcode) -> Vec<u32> {
    template
        .bytecode
        .iter()
        .copied()
        .filter(|&word| decode_opcode(word) == op as u32)
        .collect()
}

#[test]
fn empty_program_compiles_to_an_empty_template() {
    let template = compile("");
    assert_eq!(template.nargs, 0);
    assert!(template.child_templates.is_empty());
}

#[test]
fn do_while_accepts_asi_on_its_trailing_semicolon() {
    // No newline and no `;` after the `while (...)` — still valid, the
    // do-while's own consume is unconditional either way.
    let template = compile("var i = 0; do { i = i + 1 } while (i < 3)");
    assert!(!template.bytecode.is_empty());
}

#[test]
fn do_while_accepts_an_explicit_trailing_semicolon_too() {
    let template = compile("var i = 0; do { i = i + 1; } while (i < 3);");
    assert!(!template.bytecode.is_empty());
}

#[test]
fn for_in_accepts_a_property_access_target() {
    let template = compile("var obj = {}; var src = {}; for (obj.key in src) { }");
    assert!(!template.bytecode.is_empty());
}

#[test]
fn for_in_accepts_a_var_declared_target() {
    let template = compile("var src = {}; for (var k in src) { }");
    assert!(!template.bytecode.is_empty());
}

#[test]
fn classic_for_loop_compiles_with_all_three_clauses() {
    let template = compile("var sum = 0; for (var i = 0; i < 10; i = i + 1) { sum = sum + i; }");
    assert!(!template.bytecode.is_empty());
}

#[test]
fn switch_with_multiple_clauses_and_a_default_compiles() {
    let src = r#"
        var x = 1;
        var out = 0;
        switch (x) {
            case 1:
                out = 1;
                break;
            case 2:
                out = 2;
                break;
            default:
                out = -1;
        }
    "#;
    assert!(!compile(src).bytecode.is_empty());
}

#[test]
fn switch_rejects_more_than_one_default_clause() {
    let src = "switch (1) { default: break; default: break; }";
    let err = mjsc::compile_program(src, CompilerConfig::new()).unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::Syntax);
}

#[test]
fn try_catch_finally_all_compile_together() {
    let src = r#"
        try {
            throw 1;
        } catch (e) {
            e = e;
        } finally {
            var done = true;
        }
    "#;
    assert!(!compile(src).bytecode.is_empty());
}

#[test]
fn try_without_catch_or_finally_is_a_syntax_error() {
    let err = mjsc::compile_program("try { }", CompilerConfig::new()).unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::Syntax);
}

#[test]
fn labelled_loop_continue_compiles() {
    let src = r#"
        outer: for (var i = 0; i < 3; i = i + 1) {
            for (var j = 0; j < 3; j = j + 1) {
                if (j === 1) continue outer;
            }
        }
    "#;
    assert!(!compile(src).bytecode.is_empty());
}

#[test]
fn labelled_break_out_of_a_bare_block_compiles() {
    let src = r#"
        block: {
            if (true) break block;
        }
    "#;
    assert!(!compile(src).bytecode.is_empty());
}

#[test]
fn use_strict_directive_is_recognized_and_does_not_appear_as_a_statement() {
    let template = compile("'use strict'; var x = 1;");
    assert!(!template.bytecode.is_empty());
}

#[test]
fn global_var_declaration_emits_declvar_with_property_attribute_flags() {
    let template = compile("'use strict'; var x = 1;");
    let declvars = find(&template, Opcode::DeclVar);
    assert_eq!(declvars.len(), 1, "expected exactly one DECLVAR, got {declvars:?}");
    let flags = decode_a(declvars[0]);
    let expected = mjsc::DECLVAR_WRITABLE | mjsc::DECLVAR_ENUMERABLE | mjsc::DECLVAR_CONFIGURABLE | mjsc::DECLVAR_UNDEF_VALUE;
    assert_eq!(flags, expected, "flags were {flags:#x}, expected {expected:#x}");

    // The body ends on a plain (non-tail-call) RETURN since there's no
    // explicit return and nothing to elide into a tail call.
    let last = *template.bytecode.last().unwrap();
    assert_eq!(decode_opcode(last), Opcode::Return as u32);
    assert_eq!(decode_a(last), mjsc::RETURN_FAST);
}

#[test]
fn explicit_return_of_an_expression_sets_have_retval_and_fast() {
    let template = mjsc::compile_function_body("return a + b;", &["a", "b"], CompilerConfig::new())
        .expect("expected successful compile");
    let adds = find(&template, Opcode::Add);
    assert_eq!(adds.len(), 1);
    let returns = find(&template, Opcode::Return);
    // One explicit `RETURN` for the `return` statement, one implicit
    // trailing `RETURN` appended after the body.
    assert_eq!(returns.len(), 2);
    let explicit_flags = decode_a(returns[0]);
    assert_eq!(explicit_flags, mjsc::RETURN_HAVE_RETVAL | mjsc::RETURN_FAST);
    assert_eq!(decode_a(returns[1]), mjsc::RETURN_FAST);
}

#[test]
fn direct_eval_call_sets_the_evalcall_flag_and_marks_the_enclosing_function() {
    let template = compile(r#"eval("1");"#);
    let calls = find(&template, Opcode::Call);
    assert_eq!(calls.len(), 1);
    let flags = decode_a(calls[0]);
    assert_eq!(flags & mjsc::CALL_EVALCALL, mjsc::CALL_EVALCALL);
    // B is the call's base register, C its argument count; `eval("1")`
    // passes exactly one argument.
    let base = decode_b(calls[0]);
    assert!(!base.is_const, "call base operand should be a register");
    let nargs = decode_c(calls[0]);
    assert!(!nargs.is_const, "nargs operand should be a plain count, not a constant-pool index");
    assert_eq!(nargs.index, 1);
}

#[test]
fn try_catch_finally_encodes_trycatch_flags_and_catch_binding() {
    let src = r#"
        try {
            throw 1;
        } catch (e) {
            e = e;
        } finally {
            var done = true;
        }
    "#;
    let template = compile(src);
    let trycatches = find(&template, Opcode::TryCatch);
    assert_eq!(trycatches.len(), 1);
    let flags = decode_a(trycatches[0]);
    let expected = mjsc::TRYCATCH_HAVE_CATCH | mjsc::TRYCATCH_HAVE_FINALLY | mjsc::TRYCATCH_CATCH_BINDING;
    assert_eq!(flags, expected, "flags were {flags:#x}, expected {expected:#x}");
    let name_operand = decode_b(trycatches[0]);
    assert!(name_operand.is_const, "catch name operand should be a constant-pool index");
    let reg_operand = decode_c(trycatches[0]);
    assert!(!reg_operand.is_const, "catch value operand should be a register");

    assert_eq!(find(&template, Opcode::EndTry).len(), 1);
    assert_eq!(find(&template, Opcode::EndCatch).len(), 1);
    assert_eq!(find(&template, Opcode::EndFin).len(), 1);

    // The caught value is stored into the catch binding via PUTVAR
    // using the same name constant TRYCATCH recorded.
    let putvars = find(&template, Opcode::PutVar);
    assert!(
        putvars.iter().any(|&w| decode_b(w) == name_operand && decode_c(w) == reg_operand),
        "expected a PUTVAR storing the caught value into the catch binding"
    );
}

#[test]
fn with_statement_is_rejected_in_strict_mode() {
    let err = mjsc::compile_program("'use strict'; with ({}) { }", CompilerConfig::new()).unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::Syntax);
}

#[test]
fn with_statement_compiles_outside_strict_mode() {
    let template = compile("with ({}) { var x = 1; }");
    assert!(!template.bytecode.is_empty());
}

#[test]
fn nested_function_declaration_produces_a_child_template() {
    let template = compile("function add(a, b) { return a + b; } var r = add(1, 2);");
    assert_eq!(template.child_templates.len(), 1);
    assert_eq!(template.child_templates[0].nargs, 2);
}

#[test]
fn function_body_entry_point_binds_formal_parameters() {
    let template = mjsc::compile_function_body("return a + b;", &["a", "b"], CompilerConfig::new())
        .expect("expected successful compile");
    assert_eq!(template.nargs, 2);
    assert_eq!(template.formal_names.len(), 2);
}

#[test]
fn eval_entry_point_compiles_the_same_grammar_as_a_program() {
    let template = mjsc::compile_eval("var x = 1; x = x + 1;", CompilerConfig::new())
        .expect("expected successful compile");
    assert!(!template.bytecode.is_empty());
}

#[test]
fn a_shrunk_constant_window_falls_out_of_dedup_sooner() {
    let mut config = CompilerConfig::new();
    config.const_window = 2;
    let mut src = String::from("var same = 1;\n");
    for i in 0..10 {
        src.push_str(&format!("var filler{i} = {};\n", i + 1000));
    }
    src.push_str("var same2 = 1;\n");
    let template = mjsc::compile_program(&src, config).expect("expected successful compile");
    // With the window this small, the dedup can't reach back to the
    // first `1` literal, so it gets interned twice.
    let ones = template.constants.iter().filter(|c| matches!(c, mjsc::Literal::Number(n) if *n == 1.0)).count();
    assert!(ones >= 2, "expected the shrunk window to re-intern 1.0, got {ones} copies");
}

#[test]
fn syntax_error_carries_a_line_number_from_the_driver() {
    let err = mjsc::compile_program("var;", CompilerConfig::new()).unwrap_err();
    assert!(err.line.is_some());
}
