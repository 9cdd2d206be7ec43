use plx_core::span::Span;
use serde::{Deserialize, Serialize};

/// Token types for authored logic source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    // Literals
    IntLit(i64),
    FloatLit(f64),
    StringLit(String),
    True,
    False,

    Ident(String),

    // Keywords
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Match,
    Case,
    Return,
    Pass,
    And,
    Or,
    Not,

    // Operators and punctuation
    Assign,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Colon,
    Comma,
    Dot,

    // Layout
    Newline,
    Indent,
    Dedent,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::IntLit(v) => format!("integer {}", v),
            TokenKind::FloatLit(v) => format!("float {}", v),
            TokenKind::StringLit(_) => "string literal".to_string(),
            TokenKind::Ident(name) => format!("'{}'", name),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Indent => "indent".to_string(),
            TokenKind::Dedent => "dedent".to_string(),
            TokenKind::Eof => "end of source".to_string(),
            other => format!("{:?}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

pub fn keyword(ident: &str) -> Option<TokenKind> {
    Some(match ident {
        "if" => TokenKind::If,
        "elif" => TokenKind::Elif,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "match" => TokenKind::Match,
        "case" => TokenKind::Case,
        "return" => TokenKind::Return,
        "pass" => TokenKind::Pass,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "True" => TokenKind::True,
        "False" => TokenKind::False,
        _ => return None,
    })
}
