use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::source::Span;

/// The closed set of token kinds. Literal tokens keep their lexeme in the
/// token's span, escape sequences included; numeric and textual values are
/// resolved on demand by whoever consumes the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    Eof,
    Ident,
    Int,
    Float,
    Str,
    Char,

    Newline,
    IndentUp,
    IndentDown,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    AmpAmp,
    PipePipe,
    EqEq,
    BangEq,
    Lt,
    Gt,
    Le,
    Ge,
    Shl,
    Shr,
    Eq,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Arrow,
    Colon,
    Semicolon,

    /// Sentinel produced after a lexical diagnostic so that higher layers
    /// can keep going without a token they can misread.
    Error,
}

impl TokenKind {
    /// Newlines and semicolons both end a statement.
    pub fn is_separator(self) -> bool {
        matches!(self, TokenKind::Newline | TokenKind::Semicolon)
    }

    pub fn is_layout(self) -> bool {
        matches!(
            self,
            TokenKind::Newline | TokenKind::IndentUp | TokenKind::IndentDown
        )
    }

    /// Human-readable name for diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Eof => "end of file",
            TokenKind::Ident => "identifier",
            TokenKind::Int => "integer literal",
            TokenKind::Float => "floating literal",
            TokenKind::Str => "string literal",
            TokenKind::Char => "character literal",
            TokenKind::Newline => "newline",
            TokenKind::IndentUp => "indent",
            TokenKind::IndentDown => "dedent",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::Slash => "`/`",
            TokenKind::Percent => "`%`",
            TokenKind::Amp => "`&`",
            TokenKind::Pipe => "`|`",
            TokenKind::Caret => "`^`",
            TokenKind::Tilde => "`~`",
            TokenKind::Bang => "`!`",
            TokenKind::AmpAmp => "`&&`",
            TokenKind::PipePipe => "`||`",
            TokenKind::EqEq => "`==`",
            TokenKind::BangEq => "`!=`",
            TokenKind::Lt => "`<`",
            TokenKind::Gt => "`>`",
            TokenKind::Le => "`<=`",
            TokenKind::Ge => "`>=`",
            TokenKind::Shl => "`<<`",
            TokenKind::Shr => "`>>`",
            TokenKind::Eq => "`=`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::Comma => "`,`",
            TokenKind::Dot => "`.`",
            TokenKind::Arrow => "`->`",
            TokenKind::Colon => "`:`",
            TokenKind::Semicolon => "`;`",
            TokenKind::Error => "invalid token",
        }
    }
}

/// A token: its kind plus the span of the exact lexeme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn eof(offset: usize) -> Self {
        Self::new(TokenKind::Eof, Span::new(offset, 0))
    }
}

/// Reserved words. Lexically these are ordinary identifiers; recognising
/// them is the parser's job, via [`Keyword::from_lexeme`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Mut,
    Const,
    If,
    Then,
    Else,
    While,
    Fn,
    Let,
    Type,
    As,
    Return,
    Break,
    Continue,
    Extern,
    Typeof,
    Sizeof,
    Alignof,
    Lenof,
    True,
    False,
    Any,
    Void,
}

static KEYWORDS: Lazy<HashMap<&'static str, Keyword>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("mut", Keyword::Mut);
    m.insert("const", Keyword::Const);
    m.insert("if", Keyword::If);
    m.insert("then", Keyword::Then);
    m.insert("else", Keyword::Else);
    m.insert("while", Keyword::While);
    m.insert("fn", Keyword::Fn);
    m.insert("let", Keyword::Let);
    m.insert("type", Keyword::Type);
    m.insert("as", Keyword::As);
    m.insert("return", Keyword::Return);
    m.insert("break", Keyword::Break);
    m.insert("continue", Keyword::Continue);
    m.insert("extern", Keyword::Extern);
    m.insert("typeof", Keyword::Typeof);
    m.insert("sizeof", Keyword::Sizeof);
    m.insert("alignof", Keyword::Alignof);
    m.insert("lenof", Keyword::Lenof);
    m.insert("true", Keyword::True);
    m.insert("false", Keyword::False);
    m.insert("any", Keyword::Any);
    m.insert("void", Keyword::Void);
    m
});

impl Keyword {
    pub fn from_lexeme(lexeme: &str) -> Option<Keyword> {
        KEYWORDS.get(lexeme).copied()
    }
}
