//! Per-function compiler state.
//!
//! One `FuncState` exists for the duration of compiling one function; it
//! is reset between pass 1 and pass 2 (code buffer, constants, labels
//! cleared — declarations, formals, and inner templates preserved).

use crate::constpool::{ConstantPool, GETCONST_MAX_CONSTS_CHECK};
use crate::emitter::Emitter;
use crate::error::Result;
use crate::labels::LabelTable;
use crate::regalloc::RegisterAllocator;
use crate::template::FunctionTemplate;
use mjs_core::interner::Atom;
use mjs_lexer::LexerPoint;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    /// Function declaration; the index is into this function's child
    /// template list once pass 2 finalizes it.
    Function(u32),
}

#[derive(Debug, Clone, Copy)]
pub struct DeclEntry {
    pub name: Atom,
    pub kind: DeclKind,
}

/// Where a binding lives: a fixed register, or the slow path (looked up
/// by name at run time through `GETVAR`/`PUTVAR`/`DELVAR`) — e.g. because
/// it's captured by a nested closure or the function uses `with`/direct
/// `eval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegSlot {
    Register(u32),
    SlowPath,
}

/// Approximate number of parse-tree nodes visited in pass 1 above which
/// shuffle registers become worth reserving up front (see
/// `decide_shuffle_registers`). Chosen so that a function producing
/// anywhere near 256 temps/constants — the point registers or constant
/// indices stop fitting an 8-bit slot — gets shuffle registers without
/// having to literally count registers before they exist.
const SHUFFLE_HEURISTIC_NODE_THRESHOLD: u32 = 250;

/// Which of the three compile entry points this `FuncState` belongs to —
/// drives whether declarations get a register or go through `DECLVAR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingMode {
    /// A nested function body: declarations bind to registers (or the
    /// slow path if captured/`with`/direct `eval`), never `DECLVAR`.
    Function,
    /// A direct/indirect `eval` body: declarations always go through
    /// `DECLVAR` into the surrounding variable environment.
    Eval,
    /// A top-level program body: declarations always go through
    /// `DECLVAR` into the global object.
    Global,
}

pub struct FuncState {
    pub name: Option<Atom>,
    pub binding_mode: BindingMode,
    pub declarations: Vec<DeclEntry>,
    pub formals: Vec<Atom>,
    pub var_map: HashMap<Atom, RegSlot>,
    pub labels: LabelTable,
    pub regalloc: RegisterAllocator,
    pub constpool: ConstantPool,
    pub emitter: Emitter,

    pub stmt_next: u32,
    pub label_next: u32,
    pub fnum_next: u32,
    pub catch_depth: u32,
    pub with_depth: u32,
    pub paren_level: u32,
    pub nud_count: u64,
    pub led_count: u64,
    pub recursion_depth: u32,

    pub in_directive_prologue: bool,
    pub in_scanning: bool,
    /// Set once a `"use strict"` directive is recognized in this
    /// function's (or an enclosing function's) directive prologue.
    pub strict_mode: bool,

    pub id_access_arguments: bool,
    pub id_access_slow: bool,
    pub may_direct_eval: bool,
    pub is_arguments_shadowed: bool,

    /// `Some` once reserved; `None` if this function needs no shuffle
    /// registers at all.
    pub shuffle_regs: Option<[u32; 3]>,
    /// Pass-1 node-visit counter feeding `decide_shuffle_registers`.
    pub node_count_estimate: u32,

    pub child_templates: Vec<FunctionTemplate>,
    /// Lexer point (and line) of the byte right after each child's closing
    /// brace, recorded on pass 1 so pass 2 can seek past the already-
    /// compiled body instead of re-parsing it. Indexed in parallel
    /// with `child_templates`.
    pub child_end_points: Vec<(LexerPoint, u32)>,
    /// Constant-pool dedup window carried across the pass-1/pass-2 reset
    /// (`CompilerConfig::const_window`).
    const_window: usize,
}

impl FuncState {
    /// Defaults to `BindingMode::Function`; callers compiling a program or
    /// eval body should follow up with `set_binding_mode`.
    pub fn new(name: Option<Atom>) -> Self {
        FuncState::with_const_window(name, GETCONST_MAX_CONSTS_CHECK)
    }

    /// Like `new`, but with a caller-chosen constant-pool dedup window
    /// instead of the default 256.
    pub fn with_const_window(name: Option<Atom>, const_window: usize) -> Self {
        FuncState {
            name,
            binding_mode: BindingMode::Function,
            declarations: Vec::new(),
            formals: Vec::new(),
            var_map: HashMap::new(),
            labels: LabelTable::new(),
            regalloc: RegisterAllocator::new(),
            constpool: ConstantPool::with_window(const_window),
            emitter: Emitter::new(None),
            stmt_next: 0,
            label_next: 0,
            fnum_next: 0,
            catch_depth: 0,
            with_depth: 0,
            paren_level: 0,
            nud_count: 0,
            led_count: 0,
            recursion_depth: 0,
            in_directive_prologue: true,
            in_scanning: true,
            strict_mode: false,
            id_access_arguments: false,
            id_access_slow: false,
            may_direct_eval: false,
            is_arguments_shadowed: false,
            shuffle_regs: None,
            node_count_estimate: 0,
            child_templates: Vec::new(),
            child_end_points: Vec::new(),
            const_window,
        }
    }

    /// Override the binding mode after construction, e.g. a top-level
    /// driver picking `Eval`/`Global` once it knows which entry point it's
    /// compiling for.
    pub fn set_binding_mode(&mut self, mode: BindingMode) {
        self.binding_mode = mode;
    }

    /// Reset the parts of state that don't survive from pass 1 into pass
    /// 2. Declarations, formals, child templates, and the escape-analysis
    /// flags collected during pass 1 are kept.
    pub fn reset_for_pass2(&mut self) {
        self.labels = LabelTable::new();
        self.constpool = ConstantPool::with_window(self.const_window);
        self.regalloc = RegisterAllocator::new();
        self.emitter = Emitter::new(None);
        self.in_scanning = false;
        self.in_directive_prologue = true;
        self.catch_depth = 0;
        self.with_depth = 0;
        self.paren_level = 0;
        self.fnum_next = 0;
    }

    pub fn note_node(&mut self) {
        self.node_count_estimate += 1;
    }

    /// Decide, before the prologue reserves any registers, whether this
    /// function's emitted code will need shuffle registers — three
    /// reserved shuffle registers, allocated per function only when the
    /// high-water mark indicates shuffling may occur.
    ///
    /// True register pressure is only known after codegen, but shuffle
    /// registers must be contiguous low registers reserved *before*
    /// codegen starts. This uses the pass-1 node-visit count as a proxy
    /// — a function with few enough nodes provably cannot produce enough
    /// distinct registers/constants to overflow an 8-bit slot — with
    /// `CompilerConfig::force_shuffle_registers` available to make the
    /// decision deterministic for boundary tests (255 vs. 256 temps).
    pub fn decide_shuffle_registers(&self, force: Option<bool>) -> bool {
        force.unwrap_or(self.node_count_estimate >= SHUFFLE_HEURISTIC_NODE_THRESHOLD)
    }

    /// Reserve the three shuffle registers as the lowest free registers,
    /// before any formal/temp allocation freezes the non-temp region.
    pub fn reserve_shuffle_registers(&mut self) -> Result<()> {
        let base = self.regalloc.temp_next;
        self.regalloc.reserve_low(3)?;
        self.shuffle_regs = Some([base, base + 1, base + 2]);
        self.emitter.set_shuffle_regs(self.shuffle_regs);
        Ok(())
    }
}

/// Stack of `FuncState`s, one per function currently being compiled
/// (innermost last), mirroring nested-function compilation.
#[derive(Default)]
pub struct FuncStateStack {
    stack: Vec<FuncState>,
}

impl FuncStateStack {
    pub fn new() -> Self {
        FuncStateStack::default()
    }

    pub fn push(&mut self, state: FuncState) {
        self.stack.push(state);
    }

    pub fn pop(&mut self) -> Option<FuncState> {
        self.stack.pop()
    }

    pub fn current(&self) -> &FuncState {
        self.stack.last().expect("no active function state")
    }

    pub fn current_mut(&mut self) -> &mut FuncState {
        self.stack.last_mut().expect("no active function state")
    }

    pub fn depth(&self) -> u32 {
        self.stack.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_reserves_above_threshold() {
        let mut fs = FuncState::new(None);
        fs.node_count_estimate = SHUFFLE_HEURISTIC_NODE_THRESHOLD;
        assert!(fs.decide_shuffle_registers(None));
    }

    #[test]
    fn heuristic_skips_below_threshold() {
        let fs = FuncState::new(None);
        assert!(!fs.decide_shuffle_registers(None));
    }

    #[test]
    fn force_override_wins_regardless_of_node_count() {
        let fs = FuncState::new(None);
        assert!(fs.decide_shuffle_registers(Some(true)));
        let mut fs2 = FuncState::new(None);
        fs2.node_count_estimate = 10_000;
        assert!(!fs2.decide_shuffle_registers(Some(false)));
    }

    #[test]
    fn reserve_shuffle_registers_claims_three_low_registers() {
        let mut fs = FuncState::new(None);
        fs.reserve_shuffle_registers().unwrap();
        assert_eq!(fs.shuffle_regs, Some([0, 1, 2]));
        assert_eq!(fs.regalloc.temp_first, 3);
    }

    #[test]
    fn reset_for_pass2_preserves_declarations_and_flags() {
        let mut interner = mjs_core::interner::StringInterner::new();
        let name = interner.intern("x");
        let mut fs = FuncState::new(None);
        fs.declarations.push(DeclEntry {
            name,
            kind: DeclKind::Var,
        });
        fs.may_direct_eval = true;
        fs.reset_for_pass2();
        assert_eq!(fs.declarations.len(), 1);
        assert!(fs.may_direct_eval);
        assert!(fs.labels.is_empty());
    }
}
