//! A stateful, rewindable, one-token-lookahead ECMAScript tokenizer.
//!
//! The compiler never scans source bytes directly, it only calls
//! `set_point`/`get_point`/`parse_next_token`. Rewind support (`set_point`)
//! exists specifically so the function body compiler can re-scan a
//! function's parameter list and body on pass 2 without re-parsing inner
//! functions, and so pass 2 can seek straight to a nested function's
//! closing brace instead of walking its tokens again.

use crate::keywords::Keyword;
use crate::token::{Punct, Token, TokenFlags, TokenKind};
use mjs_core::interner::StringInterner;

/// Byte offset + line number, sufficient to rewind the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexerPoint {
    pub offset: usize,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub line: u32,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (line {})", self.message, self.line)
    }
}
impl std::error::Error for LexError {}

pub struct Lexer<'src> {
    bytes: &'src [u8],
    pos: usize,
    line: u32,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Lexer {
            bytes: source.as_bytes(),
            pos: 0,
            line: 0,
        }
    }

    pub fn get_point(&self) -> LexerPoint {
        LexerPoint {
            offset: self.pos,
            line: self.line,
        }
    }

    pub fn set_point(&mut self, point: LexerPoint) {
        self.pos = point.offset;
        self.line = point.line;
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.bytes[self.pos..].starts_with(s.as_bytes())
    }

    /// Skip whitespace and comments; returns true if at least one
    /// LineTerminator was crossed (drives automatic semicolon insertion).
    fn skip_trivia(&mut self) -> bool {
        let mut saw_lineterm = false;
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(0x0b) | Some(0x0c) => {
                    self.pos += 1;
                }
                Some(b'\n') | Some(b'\r') => {
                    saw_lineterm = true;
                    self.bump();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    self.pos += 2;
                    loop {
                        match self.peek() {
                            None => break,
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.pos += 2;
                                break;
                            }
                            Some(b'\n') => {
                                saw_lineterm = true;
                                self.bump();
                            }
                            _ => {
                                self.pos += 1;
                            }
                        }
                    }
                }
                _ => break,
            }
        }
        saw_lineterm
    }

    fn err(&self, message: impl Into<String>) -> LexError {
        LexError {
            message: message.into(),
            line: self.line,
        }
    }

    /// Scan the next token. `allow_regexp` is the "can a regexp literal
    /// start here" bit the compiler derives from the previous token;
    /// `is_strict` affects nothing at the lexical level in this
    /// implementation (reserved-word strictness is a parser concern) but
    /// is threaded through for interface fidelity with the rest of the
    /// token-production contract.
    pub fn parse_next_token(
        &mut self,
        interner: &mut StringInterner,
        _is_strict: bool,
        allow_regexp: bool,
    ) -> Result<Token, LexError> {
        let lineterm = self.skip_trivia();
        let line = self.line;

        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                line,
                flags: TokenFlags {
                    allow_auto_semi: true,
                    lineterm,
                    ..Default::default()
                },
            });
        };

        if c == b'"' || c == b'\'' {
            return self.scan_string(interner, c, line, lineterm);
        }

        if c.is_ascii_digit() || (c == b'.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
            return self.scan_number(line, lineterm);
        }

        if is_ident_start(c) {
            return self.scan_ident_or_keyword(interner, line, lineterm);
        }

        if c == b'/' {
            if allow_regexp {
                return self.scan_regexp(interner, line, lineterm);
            }
            return self.scan_punct(line, lineterm);
        }

        self.scan_punct(line, lineterm)
    }

    fn scan_ident_or_keyword(
        &mut self,
        interner: &mut StringInterner,
        line: u32,
        lineterm: bool,
    ) -> Result<Token, LexError> {
        let start = self.pos;
        let mut num_escapes = 0u32;
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c == b'\\' && self.peek_at(1) == Some(b'u') {
                num_escapes += 1;
                self.pos += 2;
                let code = self.scan_unicode_escape_digits()?;
                let ch = char::from_u32(code).ok_or_else(|| self.err("invalid unicode escape"))?;
                text.push(ch);
                continue;
            }
            if is_ident_part(c) {
                // ASCII fast path; full UTF-8 identifier parts pass through
                // as raw bytes since `is_ident_part` only gates continuation.
                let len = utf8_len(c);
                let slice = &self.bytes[self.pos..self.pos + len];
                text.push_str(std::str::from_utf8(slice).unwrap_or("\u{fffd}"));
                self.pos += len;
            } else {
                break;
            }
        }
        let _ = start;

        let flags = TokenFlags {
            num_escapes,
            lineterm,
            t_nores: num_escapes > 0,
            ..Default::default()
        };

        if num_escapes == 0 {
            if text == "null" {
                return Ok(Token {
                    kind: TokenKind::NullLiteral,
                    line,
                    flags,
                });
            }
            if text == "true" {
                return Ok(Token {
                    kind: TokenKind::BooleanLiteral(true),
                    line,
                    flags,
                });
            }
            if text == "false" {
                return Ok(Token {
                    kind: TokenKind::BooleanLiteral(false),
                    line,
                    flags,
                });
            }
            if let Some(kw) = Keyword::from_str(&text) {
                return Ok(Token {
                    kind: TokenKind::Keyword(kw),
                    line,
                    flags,
                });
            }
        }

        let atom = interner.intern(&text);
        Ok(Token {
            kind: TokenKind::Ident(atom),
            line,
            flags,
        })
    }

    fn scan_unicode_escape_digits(&mut self) -> Result<u32, LexError> {
        let mut code = 0u32;
        for _ in 0..4 {
            let c = self.bump().ok_or_else(|| self.err("unterminated unicode escape"))?;
            let digit = (c as char)
                .to_digit(16)
                .ok_or_else(|| self.err("invalid hex digit in unicode escape"))?;
            code = code * 16 + digit;
        }
        Ok(code)
    }

    fn scan_number(&mut self, line: u32, lineterm: bool) -> Result<Token, LexError> {
        let start = self.pos;
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x') | Some(b'X')) {
            self.pos += 2;
            let hex_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            if self.pos == hex_start {
                return Err(self.err("missing hex digits after 0x"));
            }
            let text = std::str::from_utf8(&self.bytes[hex_start..self.pos]).unwrap();
            let value = u64::from_str_radix(text, 16).map_err(|_| self.err("invalid hex literal"))?;
            return Ok(Token {
                kind: TokenKind::NumberLiteral(value as f64),
                line,
                flags: TokenFlags {
                    lineterm,
                    ..Default::default()
                },
            });
        }

        // legacy octal: a leading 0 followed only by octal digits and no `.`/`e`
        if self.peek() == Some(b'0')
            && self
                .peek_at(1)
                .is_some_and(|c| c.is_ascii_digit() && c < b'8')
        {
            let oct_start = self.pos + 1;
            let mut p = oct_start;
            while self.bytes.get(p).is_some_and(|c| c.is_ascii_digit()) {
                p += 1;
            }
            let all_octal = self.bytes[oct_start..p].iter().all(|c| *c < b'8');
            if all_octal {
                let text = std::str::from_utf8(&self.bytes[oct_start..p]).unwrap();
                let value = u64::from_str_radix(text, 8).map_err(|_| self.err("invalid octal literal"))?;
                self.pos = p;
                return Ok(Token {
                    kind: TokenKind::NumberLiteral(value as f64),
                    line,
                    flags: TokenFlags {
                        lineterm,
                        ..Default::default()
                    },
                });
            }
        }

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
        let value: f64 = text.parse().map_err(|_| self.err("invalid numeric literal"))?;
        Ok(Token {
            kind: TokenKind::NumberLiteral(value),
            line,
            flags: TokenFlags {
                lineterm,
                ..Default::default()
            },
        })
    }

    fn scan_string(
        &mut self,
        interner: &mut StringInterner,
        quote: u8,
        line: u32,
        lineterm: bool,
    ) -> Result<Token, LexError> {
        self.pos += 1;
        let mut text = String::new();
        let mut num_escapes = 0u32;
        loop {
            let c = self.peek().ok_or_else(|| self.err("unterminated string literal"))?;
            if c == quote {
                self.pos += 1;
                break;
            }
            if c == b'\n' {
                return Err(self.err("unterminated string literal"));
            }
            if c == b'\\' {
                num_escapes += 1;
                self.pos += 1;
                let esc = self.peek().ok_or_else(|| self.err("unterminated escape"))?;
                match esc {
                    b'n' => {
                        text.push('\n');
                        self.pos += 1;
                    }
                    b't' => {
                        text.push('\t');
                        self.pos += 1;
                    }
                    b'r' => {
                        text.push('\r');
                        self.pos += 1;
                    }
                    b'b' => {
                        text.push('\u{8}');
                        self.pos += 1;
                    }
                    b'f' => {
                        text.push('\u{c}');
                        self.pos += 1;
                    }
                    b'v' => {
                        text.push('\u{b}');
                        self.pos += 1;
                    }
                    b'0' => {
                        text.push('\0');
                        self.pos += 1;
                    }
                    b'\n' => {
                        self.bump(); // line continuation, produces no character
                    }
                    b'x' => {
                        self.pos += 1;
                        let mut code = 0u32;
                        for _ in 0..2 {
                            let h = self.bump().ok_or_else(|| self.err("truncated \\x escape"))?;
                            let d = (h as char)
                                .to_digit(16)
                                .ok_or_else(|| self.err("invalid hex digit in \\x escape"))?;
                            code = code * 16 + d;
                        }
                        text.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                    }
                    b'u' => {
                        self.pos += 1;
                        let code = self.scan_unicode_escape_digits()?;
                        text.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                    }
                    other => {
                        text.push(other as char);
                        self.pos += 1;
                    }
                }
                continue;
            }
            let len = utf8_len(c);
            let slice = &self.bytes[self.pos..self.pos + len];
            text.push_str(std::str::from_utf8(slice).unwrap_or("\u{fffd}"));
            self.pos += len;
        }

        let atom = interner.intern(&text);
        Ok(Token {
            kind: TokenKind::StringLiteral(atom),
            line,
            flags: TokenFlags {
                lineterm,
                num_escapes,
                ..Default::default()
            },
        })
    }

    fn scan_regexp(
        &mut self,
        interner: &mut StringInterner,
        line: u32,
        lineterm: bool,
    ) -> Result<Token, LexError> {
        let start = self.pos;
        self.pos += 1; // opening '/'
        let mut in_class = false;
        loop {
            let c = self.peek().ok_or_else(|| self.err("unterminated regexp literal"))?;
            if c == b'\n' {
                return Err(self.err("unterminated regexp literal"));
            }
            if c == b'\\' {
                self.pos += 2;
                continue;
            }
            if c == b'[' {
                in_class = true;
            } else if c == b']' {
                in_class = false;
            } else if c == b'/' && !in_class {
                self.pos += 1;
                break;
            }
            self.pos += 1;
        }
        let pattern_text =
            std::str::from_utf8(&self.bytes[start + 1..self.pos - 1]).unwrap_or("");
        let pattern = interner.intern(pattern_text);

        let flags_start = self.pos;
        while self.peek().is_some_and(is_ident_part) {
            self.pos += 1;
        }
        let flags_text = std::str::from_utf8(&self.bytes[flags_start..self.pos]).unwrap_or("");
        let flags_atom = interner.intern(flags_text);

        Ok(Token {
            kind: TokenKind::RegexLiteral {
                pattern,
                flags: flags_atom,
            },
            line,
            flags: TokenFlags {
                lineterm,
                ..Default::default()
            },
        })
    }

    fn scan_punct(&mut self, line: u32, lineterm: bool) -> Result<Token, LexError> {
        // longest-match first
        const TABLE: &[(&str, Punct)] = &[
            (">>>=", Punct::UshrEq),
            ("===", Punct::EqEqEq),
            ("!==", Punct::NotEqEq),
            (">>>", Punct::Ushr),
            ("<<=", Punct::ShlEq),
            (">>=", Punct::ShrEq),
            ("==", Punct::EqEq),
            ("!=", Punct::NotEq),
            ("<=", Punct::Le),
            (">=", Punct::Ge),
            ("++", Punct::PlusPlus),
            ("--", Punct::MinusMinus),
            ("<<", Punct::Shl),
            (">>", Punct::Shr),
            ("&&", Punct::AmpAmp),
            ("||", Punct::PipePipe),
            ("+=", Punct::PlusEq),
            ("-=", Punct::MinusEq),
            ("*=", Punct::StarEq),
            ("%=", Punct::PercentEq),
            ("&=", Punct::AmpEq),
            ("|=", Punct::PipeEq),
            ("^=", Punct::CaretEq),
            ("/=", Punct::SlashEq),
            ("{", Punct::LBrace),
            ("}", Punct::RBrace),
            ("(", Punct::LParen),
            (")", Punct::RParen),
            ("[", Punct::LBracket),
            ("]", Punct::RBracket),
            (".", Punct::Dot),
            (";", Punct::Semi),
            (",", Punct::Comma),
            ("<", Punct::Lt),
            (">", Punct::Gt),
            ("+", Punct::Plus),
            ("-", Punct::Minus),
            ("*", Punct::Star),
            ("%", Punct::Percent),
            ("&", Punct::Amp),
            ("|", Punct::Pipe),
            ("^", Punct::Caret),
            ("!", Punct::Bang),
            ("~", Punct::Tilde),
            ("?", Punct::Question),
            (":", Punct::Colon),
            ("=", Punct::Assign),
            ("/", Punct::Slash),
        ];

        for (lexeme, punct) in TABLE {
            if self.starts_with(lexeme) {
                self.pos += lexeme.len();
                let allow_auto_semi = matches!(punct, Punct::RBrace);
                return Ok(Token {
                    kind: TokenKind::Punct(*punct),
                    line,
                    flags: TokenFlags {
                        lineterm,
                        allow_auto_semi,
                        ..Default::default()
                    },
                });
            }
        }

        Err(self.err(format!(
            "unexpected character '{}'",
            self.peek().map(|c| c as char).unwrap_or('?')
        )))
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'$' || c >= 0x80
}

fn is_ident_part(c: u8) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

fn utf8_len(lead: u8) -> usize {
    if lead < 0x80 {
        1
    } else if lead >> 5 == 0b110 {
        2
    } else if lead >> 4 == 0b1110 {
        3
    } else if lead >> 3 == 0b11110 {
        4
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mjs_core::interner::StringInterner;

    fn tokens(src: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(src);
        let mut interner = StringInterner::new();
        let mut out = Vec::new();
        loop {
            let tok = lexer.parse_next_token(&mut interner, false, true).unwrap();
            let done = tok.is_eof();
            out.push(tok);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn scans_keywords_and_identifiers() {
        let toks = tokens("var x = 1;");
        assert_eq!(toks[0].kind, TokenKind::Keyword(Keyword::Var));
        assert!(matches!(toks[1].kind, TokenKind::Ident(_)));
        assert_eq!(toks[2].kind, TokenKind::Punct(Punct::Assign));
        assert_eq!(toks[3].kind, TokenKind::NumberLiteral(1.0));
        assert_eq!(toks[4].kind, TokenKind::Punct(Punct::Semi));
    }

    #[test]
    fn scans_hex_and_octal_numbers() {
        let toks = tokens("0xFF 017");
        assert_eq!(toks[0].kind, TokenKind::NumberLiteral(255.0));
        assert_eq!(toks[1].kind, TokenKind::NumberLiteral(15.0));
    }

    #[test]
    fn tracks_line_terminator_flag() {
        let toks = tokens("a\nb");
        assert!(!toks[0].flags.lineterm);
        assert!(toks[1].flags.lineterm);
    }

    #[test]
    fn scans_string_escapes_and_counts_them() {
        let toks = tokens(r#"'a\nb'"#);
        assert_eq!(toks[0].flags.num_escapes, 1);
    }

    #[test]
    fn longest_match_wins_for_compound_punctuators() {
        let toks = tokens(">>>=");
        assert_eq!(toks[0].kind, TokenKind::Punct(Punct::UshrEq));
    }

    #[test]
    fn regexp_literal_scans_to_closing_slash_outside_class() {
        let toks = tokens("/a[/]b/gi");
        match &toks[0].kind {
            TokenKind::RegexLiteral { .. } => {}
            other => panic!("expected regexp literal, got {other:?}"),
        }
    }

    #[test]
    fn rewind_returns_to_earlier_point() {
        let mut lexer = Lexer::new("a b c");
        let mut interner = StringInterner::new();
        let point = lexer.get_point();
        let _ = lexer.parse_next_token(&mut interner, false, false).unwrap();
        lexer.set_point(point);
        let again = lexer.parse_next_token(&mut interner, false, false).unwrap();
        assert!(matches!(again.kind, TokenKind::Ident(_)));
    }
}
