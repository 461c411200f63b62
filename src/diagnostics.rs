//! Diagnostic codes, rendering and the host-facing sink.
//!
//! Every failure in the compiler is *located* (carries a [`Span`]) and is
//! reported exactly once, at the point of first detection. Downstream code
//! observes a poisoned result and propagates it without re-reporting, so a
//! single mistake in the source produces a single message. The error counter
//! gates code emission but never parsing; the driver keeps going to surface
//! as many independent errors as possible in one compile.
//!
//! Rendered diagnostics follow the fixed text layout
//!
//! ```text
//! error[E3004]: cannot assign through a const binding
//!   --> script.cs:5:1
//!    |
//! 5  |x = 4
//!    |^ not mutable
//! ```

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::source::{locate, Span};

/// Marker that a diagnostic has already been reported for the value being
/// computed. Callers propagate it with `?` and must not report again; this
/// is what keeps one mistake from producing a cascade of messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poisoned;

/// Result of any operation that reports its own failures.
pub type PResult<T> = Result<T, Poisoned>;

/// Severity of a diagnostic. Warnings do not gate code emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }

    fn letter(self) -> char {
        match self {
            Severity::Error => 'E',
            Severity::Warning => 'W',
        }
    }
}

/// Stable diagnostic codes, grouped by taxonomy: 1xxx lexical, 2xxx
/// syntactic, 3xxx type, 4xxx semantic, 5xxx resource limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Code {
    UnterminatedString,
    UnterminatedChar,
    UnknownCharacter,
    BadEscape,
    MalformedNumber,
    MixedIndentation,
    BadCharLiteral,

    UnexpectedToken,
    ExpectedIdentifier,
    ExpectedSeparator,
    MissingDelimiter,
    BadIndent,

    UnknownType,
    InvalidOperands,
    IllegalConversion,
    AssignToConst,
    AnyRequiresIndirection,
    NotAssignable,
    UnknownMember,

    Redeclaration,
    UndefinedReference,
    WrongArgCount,
    NonConstantArraySize,
    TemplateArity,
    UnresolvedExternal,
    OutsideLoop,
    IncompleteType,

    TypePoolExhausted,
    UserTypesExhausted,
    ScopeExhausted,
    CodeBufferOverflow,
    RecursionLimit,
}

impl Code {
    pub fn number(self) -> u16 {
        match self {
            Code::UnterminatedString => 1001,
            Code::UnterminatedChar => 1002,
            Code::UnknownCharacter => 1003,
            Code::BadEscape => 1004,
            Code::MalformedNumber => 1005,
            Code::MixedIndentation => 1006,
            Code::BadCharLiteral => 1007,

            Code::UnexpectedToken => 2001,
            Code::ExpectedIdentifier => 2002,
            Code::ExpectedSeparator => 2003,
            Code::MissingDelimiter => 2004,
            Code::BadIndent => 2005,

            Code::UnknownType => 3001,
            Code::InvalidOperands => 3002,
            Code::IllegalConversion => 3003,
            Code::AssignToConst => 3004,
            Code::AnyRequiresIndirection => 3005,
            Code::NotAssignable => 3006,
            Code::UnknownMember => 3007,

            Code::Redeclaration => 4001,
            Code::UndefinedReference => 4002,
            Code::WrongArgCount => 4003,
            Code::NonConstantArraySize => 4004,
            Code::TemplateArity => 4005,
            Code::UnresolvedExternal => 4006,
            Code::OutsideLoop => 4007,
            Code::IncompleteType => 4008,

            Code::TypePoolExhausted => 5001,
            Code::UserTypesExhausted => 5002,
            Code::ScopeExhausted => 5003,
            Code::CodeBufferOverflow => 5004,
            Code::RecursionLimit => 5005,
        }
    }
}

/// A single reported diagnostic, including its pre-rendered text form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Code,
    pub message: String,
    pub line: u32,
    pub col: u32,
    pub span: Span,
    pub rendered: String,
}

/// Receives every diagnostic as it is produced, in source order. The sink
/// may be absent, in which case diagnostics are only counted.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: &Diagnostic);
}

impl<F: FnMut(&Diagnostic)> DiagnosticSink for F {
    fn report(&mut self, diagnostic: &Diagnostic) {
        self(diagnostic)
    }
}

/// Diagnostic state for one compile: the counters and the optional sink.
pub struct Diagnostics<'a> {
    file: &'a str,
    source: &'a str,
    sink: Option<&'a mut dyn DiagnosticSink>,
    errors: u32,
    warnings: u32,
}

impl<'a> Diagnostics<'a> {
    pub fn new(file: &'a str, source: &'a str, sink: Option<&'a mut dyn DiagnosticSink>) -> Self {
        Self {
            file,
            source,
            sink,
            errors: 0,
            warnings: 0,
        }
    }

    pub fn errors(&self) -> u32 {
        self.errors
    }

    pub fn warnings(&self) -> u32 {
        self.warnings
    }

    /// Report an error at `span`. The note, if any, is printed next to the
    /// marker under the offending source line.
    pub fn error(&mut self, code: Code, span: Span, message: impl Into<String>) {
        self.emit(Severity::Error, code, span, message.into(), None);
    }

    pub fn error_with_note(
        &mut self,
        code: Code,
        span: Span,
        message: impl Into<String>,
        note: &str,
    ) {
        self.emit(Severity::Error, code, span, message.into(), Some(note));
    }

    pub fn warning(&mut self, code: Code, span: Span, message: impl Into<String>) {
        self.emit(Severity::Warning, code, span, message.into(), None);
    }

    fn emit(
        &mut self,
        severity: Severity,
        code: Code,
        span: Span,
        message: String,
        note: Option<&str>,
    ) {
        match severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
        }

        let Some(sink) = self.sink.as_deref_mut() else {
            return;
        };

        let (pos, line_text) = locate(self.source, span.start);
        let rendered = render(
            severity, code, &message, self.file, pos.line, pos.col, line_text, span.len, note,
        );

        sink.report(&Diagnostic {
            severity,
            code,
            message,
            line: pos.line,
            col: pos.col,
            span,
            rendered,
        });
    }
}

#[allow(clippy::too_many_arguments)]
fn render(
    severity: Severity,
    code: Code,
    message: &str,
    file: &str,
    line: u32,
    col: u32,
    line_text: &str,
    span_len: usize,
    note: Option<&str>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}[{}{:04}]: {}",
        severity.label(),
        severity.letter(),
        code.number(),
        message
    );
    let _ = writeln!(out, "  --> {file}:{line}:{col}");
    let _ = writeln!(out, "   |");
    let _ = writeln!(out, "{line:<3}|{line_text}");

    let pad = " ".repeat(col.saturating_sub(1) as usize);
    let squiggle = "~".repeat(span_len.saturating_sub(1).min(line_text.len()));
    let _ = write!(out, "   |{pad}^{squiggle}");
    if let Some(note) = note {
        let _ = write!(out, " {note}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_without_sink() {
        let mut diags = Diagnostics::new("t.cs", "let x = 7", None);
        diags.error(Code::UnexpectedToken, Span::new(0, 3), "boom");
        diags.error(Code::UnexpectedToken, Span::new(4, 1), "boom");
        diags.warning(Code::UnexpectedToken, Span::new(0, 1), "meh");
        assert_eq!(diags.errors(), 2);
        assert_eq!(diags.warnings(), 1);
    }

    #[test]
    fn test_rendered_layout() {
        let source = "let x = 7\nx = 4";
        let mut seen = Vec::new();
        let mut sink = |d: &Diagnostic| seen.push(d.clone());
        {
            let mut diags = Diagnostics::new("script.cs", source, Some(&mut sink));
            diags.error_with_note(
                Code::AssignToConst,
                Span::new(10, 1),
                "cannot assign through a const binding",
                "not mutable",
            );
        }

        assert_eq!(seen.len(), 1);
        let d = &seen[0];
        assert_eq!(d.line, 2);
        assert_eq!(d.col, 1);
        assert_eq!(
            d.rendered,
            "error[E3004]: cannot assign through a const binding\n\
             \x20 --> script.cs:2:1\n\
             \x20  |\n\
             2  |x = 4\n\
             \x20  |^ not mutable"
        );
    }
}
