//! ECMAScript-to-bytecode compiler library.
//!
//! A two-pass, single-scan compiler: no AST is ever materialized.
//! Expression parsing uses Pratt binding powers (`pratt.rs`); statement
//! parsing is recursive descent (`stmt.rs`); both share the `Parser`
//! struct (`bodycompiler.rs`) and the intermediate-value abstraction
//! (`ivalue.rs`) that defers register/constant materialization until an
//! instruction actually needs one. Runtime execution, the heap, and the
//! GC are out of scope — this crate's only output is a
//! [`FunctionTemplate`], an inert bytecode blob plus metadata.

mod bodycompiler;
mod config;
mod constpool;
mod driver;
mod emitter;
mod error;
mod funcstate;
mod instr;
mod ivalue;
mod labels;
mod peephole;
mod pratt;
mod regalloc;
mod stmt;
mod template;

pub use config::{CompileMode, CompilerConfig};
pub use driver::{compile_eval, compile_function_body, compile_program};
pub use error::{CompileError, CompileErrorKind, Result};
pub use instr::{
    decode_a, decode_b, decode_bc, decode_c, decode_opcode, CompilerInstruction, Opcode, RegConst,
    CALL_EVALCALL, CALL_TAILCALL, DECLVAR_CONFIGURABLE, DECLVAR_ENUMERABLE, DECLVAR_FUNC_DECL,
    DECLVAR_UNDEF_VALUE, DECLVAR_WRITABLE, RETURN_FAST, RETURN_HAVE_RETVAL, TRYCATCH_CATCH_BINDING,
    TRYCATCH_HAVE_CATCH, TRYCATCH_HAVE_FINALLY,
};
pub use template::{FunctionTemplate, LineEntry, VarMapEntry};

pub use mjs_core::interner::Atom;
pub use mjs_core::value::Literal;
