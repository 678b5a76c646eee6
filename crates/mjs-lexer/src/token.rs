//! Token data model.

use crate::keywords::Keyword;
use mjs_core::interner::Atom;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Semi,
    Comma,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    NotEq,
    EqEqEq,
    NotEqEq,
    Plus,
    Minus,
    Star,
    Percent,
    PlusPlus,
    MinusMinus,
    Shl,
    Shr,
    Ushr,
    Amp,
    Pipe,
    Caret,
    Bang,
    Tilde,
    AmpAmp,
    PipePipe,
    Question,
    Colon,
    Assign,
    PlusEq,
    MinusEq,
    StarEq,
    PercentEq,
    ShlEq,
    ShrEq,
    UshrEq,
    AmpEq,
    PipeEq,
    CaretEq,
    Slash,
    SlashEq,
}

/// Tagged union over the closed set of token kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Eof,
    Ident(Atom),
    Keyword(Keyword),
    NullLiteral,
    BooleanLiteral(bool),
    NumberLiteral(f64),
    StringLiteral(Atom),
    RegexLiteral { pattern: Atom, flags: Atom },
    Punct(Punct),
}

/// Per-token flags carried alongside the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenFlags {
    /// True if automatic semicolon insertion may treat this token's
    /// statement terminator position as satisfied without an explicit `;`.
    pub allow_auto_semi: bool,
    /// True if at least one LineTerminator occurred between the previous
    /// token and this one. Drives ASI and the postfix ++/-- restriction.
    pub lineterm: bool,
    /// True if this token was scanned in a context where reserved-word
    /// recognition is suppressed (same lexeme, different tag) — used after
    /// `.` in member access, where `if`, `for`, etc. are valid property
    /// names in some embedder dialects, even though ES5 itself does not
    /// require it for `.name`.
    pub t_nores: bool,
    /// Count of escape sequences inside a string/identifier token; a
    /// nonzero count disqualifies a string literal from directive
    /// recognition and an identifier from being treated as the literal
    /// keyword it resembles.
    pub num_escapes: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub flags: TokenFlags,
}

impl Token {
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    pub fn as_punct(&self) -> Option<Punct> {
        match self.kind {
            TokenKind::Punct(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_keyword(&self) -> Option<Keyword> {
        match self.kind {
            TokenKind::Keyword(k) => Some(k),
            _ => None,
        }
    }

    pub fn as_ident(&self) -> Option<Atom> {
        match self.kind {
            TokenKind::Ident(a) => Some(a),
            _ => None,
        }
    }

    /// "No regexp follows": identifiers, literals, `this`, `)`, `]`, `}`
    /// all end an expression, so a `/` after one of these must be division.
    pub fn no_regexp_follows(&self) -> bool {
        match &self.kind {
            TokenKind::Ident(_)
            | TokenKind::NullLiteral
            | TokenKind::BooleanLiteral(_)
            | TokenKind::NumberLiteral(_)
            | TokenKind::StringLiteral(_)
            | TokenKind::RegexLiteral { .. } => true,
            TokenKind::Keyword(Keyword::This) => true,
            TokenKind::Punct(p) => matches!(
                p,
                Punct::RParen | Punct::RBracket | Punct::RBrace | Punct::PlusPlus | Punct::MinusMinus
            ),
            _ => false,
        }
    }
}
