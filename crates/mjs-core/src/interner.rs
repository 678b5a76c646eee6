//! Interned-string registry.
//!
//! Identifiers and string literals are interned once per compilation so
//! that later comparisons (is this identifier `eval`? is this the same
//! property name as that one?) are a handle comparison rather than a byte
//! comparison. Handles compare by identity.

use std::collections::HashMap;

/// A handle to an interned string. Two atoms are equal iff they were
/// interned from equal byte sequences in the same `StringInterner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct Atom(u32);

impl Atom {
    /// Raw index into the owning interner's table. Only meaningful paired
    /// with the interner that produced it.
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Owns the backing storage for every interned string produced during one
/// compilation.
#[derive(Debug, Default)]
pub struct StringInterner {
    strings: Vec<Box<str>>,
    lookup: HashMap<Box<str>, Atom>,
}

impl StringInterner {
    pub fn new() -> Self {
        StringInterner::default()
    }

    /// Intern `text`, returning the same `Atom` for equal strings.
    pub fn intern(&mut self, text: &str) -> Atom {
        if let Some(&atom) = self.lookup.get(text) {
            return atom;
        }
        let atom = Atom(self.strings.len() as u32);
        let boxed: Box<str> = text.into();
        self.strings.push(boxed.clone());
        self.lookup.insert(boxed, atom);
        atom
    }

    pub fn resolve(&self, atom: Atom) -> &str {
        &self.strings[atom.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_same_text_returns_same_atom() {
        let mut interner = StringInterner::new();
        let a = interner.intern("hello");
        let b = interner.intern("hello");
        assert_eq!(a, b);
    }

    #[test]
    fn interning_distinct_text_returns_distinct_atoms() {
        let mut interner = StringInterner::new();
        let a = interner.intern("hello");
        let b = interner.intern("world");
        assert_ne!(a, b);
    }

    #[test]
    fn resolve_round_trips() {
        let mut interner = StringInterner::new();
        let a = interner.intern("eval");
        assert_eq!(interner.resolve(a), "eval");
    }
}
