//! Source positions and snippets.
//!
//! The compiler never copies source text. Every token and diagnostic carries
//! a [`Span`], a byte range into the single source buffer handed to
//! [`compile`](crate::compile). Line and column information is recovered by a
//! linear scan from the start of the buffer; compile sessions are small
//! enough that this never shows up in a profile.

use serde::{Deserialize, Serialize};

/// A byte range into the source buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub len: usize,
}

impl Span {
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// Smallest span covering both `self` and `other`.
    pub fn merge(&self, other: &Span) -> Span {
        let start = self.start.min(other.start);
        Span {
            start,
            len: self.end().max(other.end()) - start,
        }
    }

    /// The lexeme this span points at.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end()]
    }
}

/// 1-based line and column of a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCol {
    pub line: u32,
    pub col: u32,
}

/// Resolve `offset` to its line/column and the text of the line it sits on.
pub fn locate(source: &str, offset: usize) -> (LineCol, &str) {
    let offset = offset.min(source.len());
    let mut line = 1u32;
    let mut line_start = 0usize;

    for (i, b) in source.bytes().enumerate().take(offset) {
        if b == b'\n' {
            line += 1;
            line_start = i + 1;
        }
    }

    let line_end = source[line_start..]
        .find('\n')
        .map(|i| line_start + i)
        .unwrap_or(source.len());
    let text = source[line_start..line_end].trim_end_matches('\r');

    (
        LineCol {
            line,
            col: (offset - line_start) as u32 + 1,
        },
        text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_first_line() {
        let (pos, text) = locate("let x = 7\nlet y = 8", 4);
        assert_eq!(pos, LineCol { line: 1, col: 5 });
        assert_eq!(text, "let x = 7");
    }

    #[test]
    fn test_locate_second_line() {
        let (pos, text) = locate("let x = 7\nlet y = 8", 14);
        assert_eq!(pos, LineCol { line: 2, col: 5 });
        assert_eq!(text, "let y = 8");
    }

    #[test]
    fn test_locate_strips_carriage_return() {
        let (pos, text) = locate("a\r\nbc", 3);
        assert_eq!(pos.line, 2);
        assert_eq!(text, "bc");
    }

    #[test]
    fn test_merge() {
        let a = Span::new(2, 3);
        let b = Span::new(8, 1);
        assert_eq!(a.merge(&b), Span::new(2, 7));
        assert_eq!(b.merge(&a), Span::new(2, 7));
    }
}
