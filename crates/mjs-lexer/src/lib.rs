//! mjs-lexer: the companion tokenizer consumed by the compiler through a
//! narrow interface (`set_point`/`get_point`/`parse_next_token`). Lexical
//! analysis itself is outside the compiler's scope — this crate is the
//! concrete collaborator the compiler is written against.

pub mod keywords;
pub mod lexer;
pub mod token;

pub use keywords::Keyword;
pub use lexer::{LexError, Lexer, LexerPoint};
pub use token::{Punct, Token, TokenFlags, TokenKind};
