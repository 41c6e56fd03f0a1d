//! Syntax layer for hgql.
//!
//! This crate parses GraphQL executable documents (operations and fragments):
//! - `token`: Token kinds and token structures
//! - `lexer`: Tokenization
//! - `ast`: Owned abstract syntax tree types
//! - `parser`: Recursive descent parser

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::*;
pub use lexer::Lexer;
pub use parser::{parse, parse_document, ParseResult, SyntaxError};
pub use token::{Token, TokenKind};
