//! Token kinds and structures for GraphQL executable documents.

use hgql_core::Span;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The kind of a token.
///
/// Keywords such as `query` or `fragment` are plain names in GraphQL; the
/// parser decides from context whether a name acts as a keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum TokenKind {
    // Special tokens
    Eof,
    Error,

    // Lexical values
    Name,
    IntValue,
    FloatValue,
    StringValue,
    BlockStringValue,

    // Punctuators
    Bang,
    Dollar,
    Amp,
    LParen,
    RParen,
    Spread,
    Colon,
    Eq,
    At,
    LBracket,
    RBracket,
    LBrace,
    Pipe,
    RBrace,
}

impl TokenKind {
    /// Returns true for tokens that can start a value literal.
    #[must_use]
    pub const fn starts_value(self) -> bool {
        matches!(
            self,
            Self::Dollar
                | Self::IntValue
                | Self::FloatValue
                | Self::StringValue
                | Self::BlockStringValue
                | Self::Name
                | Self::LBracket
                | Self::LBrace
        )
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Eof => "end of input",
            Self::Error => "invalid token",
            Self::Name => "name",
            Self::IntValue => "integer",
            Self::FloatValue => "float",
            Self::StringValue | Self::BlockStringValue => "string",
            Self::Bang => "'!'",
            Self::Dollar => "'$'",
            Self::Amp => "'&'",
            Self::LParen => "'('",
            Self::RParen => "')'",
            Self::Spread => "'...'",
            Self::Colon => "':'",
            Self::Eq => "'='",
            Self::At => "'@'",
            Self::LBracket => "'['",
            Self::RBracket => "']'",
            Self::LBrace => "'{'",
            Self::Pipe => "'|'",
            Self::RBrace => "'}'",
        };
        f.write_str(s)
    }
}

/// A token with its location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    /// Creates a new token.
    #[must_use]
    pub const fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}
