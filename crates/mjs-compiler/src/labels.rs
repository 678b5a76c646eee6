//! Label table.
//!
//! A label site is three consecutive bytecode words: `LABEL id`, a
//! break-jump patch slot, and a continue-jump patch slot. Every label
//! declared must be popped before its declaring statement's parser
//! returns; `break`/`continue` walk the stack newest-to-oldest to
//! resolve a named target, or use the innermost break/continue-accepting
//! site when unlabelled.

use crate::error::{CompileError, Result};
use mjs_core::interner::Atom;

#[derive(Debug, Clone)]
pub struct LabelRecord {
    /// `None` for the empty-string name (unlabelled iteration/switch,
    /// duplicates allowed); `Some` names must be unique across the active
    /// stack.
    pub name: Option<Atom>,
    pub label_id: u32,
    /// Word-index of the emitted `LABEL` opcode.
    pub pc_label: usize,
    pub catch_depth_at_declaration: u32,
    pub allow_break: bool,
    pub allow_continue: bool,
    /// Word-indices of `JUMP`s (or `BREAK`s) still needing their target
    /// patched once this label's end is reached.
    pub break_patches: Vec<usize>,
    /// Word-indices needing patch to this label's continue target (the
    /// loop-update/condition re-check point).
    pub continue_patches: Vec<usize>,
}

#[derive(Debug, Default)]
pub struct LabelTable {
    stack: Vec<LabelRecord>,
    next_id: u32,
}

impl LabelTable {
    pub fn new() -> Self {
        LabelTable::default()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn push(
        &mut self,
        name: Option<Atom>,
        pc_label: usize,
        catch_depth: u32,
        allow_break: bool,
        allow_continue: bool,
    ) -> Result<u32> {
        if let Some(atom) = name
            && self.stack.iter().any(|r| r.name == Some(atom))
        {
            return Err(CompileError::syntax("duplicate label", 0));
        }
        let label_id = self.next_id;
        self.next_id += 1;
        self.stack.push(LabelRecord {
            name,
            label_id,
            pc_label,
            catch_depth_at_declaration: catch_depth,
            allow_break,
            allow_continue,
            break_patches: Vec::new(),
            continue_patches: Vec::new(),
        });
        Ok(label_id)
    }

    pub fn pop(&mut self) -> Option<LabelRecord> {
        self.stack.pop()
    }

    pub fn top(&self) -> Option<&LabelRecord> {
        self.stack.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut LabelRecord> {
        self.stack.last_mut()
    }

    /// Innermost site that accepts an unlabelled `break`.
    pub fn find_innermost_break(&self) -> Option<usize> {
        self.stack.iter().rposition(|r| r.allow_break)
    }

    /// Innermost site that accepts an unlabelled `continue` (only
    /// iteration statements, not bare blocks/switch).
    pub fn find_innermost_continue(&self) -> Option<usize> {
        self.stack.iter().rposition(|r| r.allow_continue)
    }

    /// Walk newest-to-oldest for a named `break`/`continue` target.
    pub fn find_by_name(&self, name: Atom) -> Option<usize> {
        self.stack.iter().rposition(|r| r.name == Some(name))
    }

    pub fn get(&self, index: usize) -> &LabelRecord {
        &self.stack[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut LabelRecord {
        &mut self.stack[index]
    }

    /// A `break`/`continue` can fast-path directly (a `JUMP`) only when
    /// the target is the closest matching site *and* no intervening
    /// `try`/`with` changed catch depth since the site was declared.
    pub fn is_fast_path(&self, index: usize, current_catch_depth: u32) -> bool {
        self.stack[index].catch_depth_at_declaration == current_catch_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mjs_core::interner::StringInterner;

    #[test]
    fn duplicate_named_label_is_rejected() {
        let mut interner = StringInterner::new();
        let name = interner.intern("outer");
        let mut table = LabelTable::new();
        table.push(Some(name), 0, 0, true, true).unwrap();
        let err = table.push(Some(name), 3, 0, true, true).unwrap_err();
        assert_eq!(err.kind, crate::error::CompileErrorKind::Syntax);
    }

    #[test]
    fn empty_name_may_duplicate() {
        let mut table = LabelTable::new();
        table.push(None, 0, 0, true, true).unwrap();
        table.push(None, 3, 0, true, true).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn continue_only_matches_iteration_sites() {
        let mut table = LabelTable::new();
        table.push(None, 0, 0, true, false).unwrap(); // e.g. a switch
        table.push(None, 3, 0, true, true).unwrap(); // e.g. a for loop
        assert_eq!(table.find_innermost_continue(), Some(1));
        assert_eq!(table.find_innermost_break(), Some(1));
    }

    #[test]
    fn stack_shrinks_back_to_entry_length_after_pop() {
        let mut table = LabelTable::new();
        let before = table.len();
        table.push(None, 0, 0, true, true).unwrap();
        table.pop();
        assert_eq!(table.len(), before);
    }
}
