//! Function Template: the immutable artifact compilation produces.
//! Built only on pass 2; the only compilation artifact that survives
//! past the compiler.

use crate::instr::CompilerInstruction;
use mjs_core::interner::Atom;
use mjs_core::value::Literal;
use serde::Serialize;

/// One (pc, line) breakpoint in the packed PC-to-line table: the line
/// number holds from this PC (inclusive) until the next entry's PC.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LineEntry {
    pub pc: u32,
    pub line: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionTemplate {
    pub bytecode: Vec<u32>,
    pub constants: Vec<Literal>,
    pub child_templates: Vec<FunctionTemplate>,
    /// Register frame size (`temp_max`).
    pub nregs: u32,
    pub nargs: u32,
    pub name: Option<Atom>,
    pub filename: Option<String>,
    /// Only present when slow-path variable access is possible for this
    /// function (direct `eval`, `with`, an unresolvable identifier, or
    /// program/eval code where every binding goes through `DECLVAR`) —
    /// the variable map is otherwise dead weight.
    pub var_map: Option<Vec<(Atom, VarMapEntry)>>,
    pub formal_names: Vec<Atom>,
    pub line_table: Vec<LineEntry>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub enum VarMapEntry {
    Register(u32),
    SlowPath,
}

impl FunctionTemplate {
    /// Build from the finalized bytecode instruction stream, compacting
    /// consecutive line-table entries that repeat the previous line.
    pub fn finalize(
        instructions: Vec<CompilerInstruction>,
        constants: Vec<Literal>,
        child_templates: Vec<FunctionTemplate>,
        nregs: u32,
        nargs: u32,
        name: Option<Atom>,
        filename: Option<String>,
        var_map: Option<Vec<(Atom, VarMapEntry)>>,
        formal_names: Vec<Atom>,
    ) -> Self {
        let mut line_table = Vec::new();
        let mut last_line: Option<u32> = None;
        let mut bytecode = Vec::with_capacity(instructions.len());
        for (pc, instr) in instructions.into_iter().enumerate() {
            bytecode.push(instr.word);
            if last_line != Some(instr.line) {
                line_table.push(LineEntry {
                    pc: pc as u32,
                    line: instr.line,
                });
                last_line = Some(instr.line);
            }
        }
        FunctionTemplate {
            bytecode,
            constants,
            child_templates,
            nregs,
            nargs,
            name,
            filename,
            var_map,
            formal_names,
            line_table,
        }
    }

    /// Line number active at the given PC, per the packed line table.
    pub fn line_at(&self, pc: u32) -> Option<u32> {
        self.line_table
            .iter()
            .rev()
            .find(|entry| entry.pc <= pc)
            .map(|entry| entry.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_table_compacts_repeated_lines() {
        let instrs = vec![
            CompilerInstruction { word: 0, line: 1 },
            CompilerInstruction { word: 0, line: 1 },
            CompilerInstruction { word: 0, line: 2 },
        ];
        let template = FunctionTemplate::finalize(instrs, vec![], vec![], 1, 0, None, None, None, vec![]);
        assert_eq!(template.line_table.len(), 2);
        assert_eq!(template.line_at(0), Some(1));
        assert_eq!(template.line_at(1), Some(1));
        assert_eq!(template.line_at(2), Some(2));
    }

    #[test]
    fn var_map_is_absent_by_default() {
        let template = FunctionTemplate::finalize(vec![], vec![], vec![], 0, 0, None, None, None, vec![]);
        assert!(template.var_map.is_none());
    }
}
