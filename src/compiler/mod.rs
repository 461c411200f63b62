//! The compiler state and top-level driver.
//!
//! Everything a compilation touches hangs off one [`Compiler`] value passed
//! around by mutable reference: the source view and its one-token lookahead,
//! the diagnostic counters, the user-type registry with its flat type pool,
//! the scope stack with the virtual stack pointer, and the host's code
//! buffer. A `Compiler` is built, run once and discarded; hosts wanting
//! parallel compilation make one per thread.
//!
//! The driver recognises top-level declarations (`type`, `fn`, `extern fn`,
//! `let`) and hands them to the type parser and expression checker. Errors
//! never stop the loop: each declaration recovers to the next line so one
//! compile surfaces as many independent mistakes as possible.

mod decl;
mod stmt;

use std::fmt::Display;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::diagnostics::{Code, DiagnosticSink, Diagnostics, PResult, Poisoned};
use crate::lexer::{Keyword, Lexer, Token, TokenKind};
use crate::scope::ScopeStack;
use crate::source::Span;
use crate::types::user::Registry;
use crate::types::Ty;

/// Nesting limit shared by the type parser and the expression checker, so
/// pathological inputs become a reported error instead of a blown stack.
pub const RECURSION_LIMIT: u32 = 32;

/// Resolves the names of `extern fn` declarations to host addresses. A
/// return of `None` fails the declaration.
pub type SymbolResolver<'a> = dyn FnMut(&str) -> Option<usize> + 'a;

/// Sequential writer over the host-supplied code buffer.
pub struct CodeSink<'a> {
    buf: &'a mut [u8],
    len: usize,
}

/// The code buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeOverflow;

impl Display for CodeOverflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "code buffer is full")
    }
}

impl std::error::Error for CodeOverflow {}

impl<'a> CodeSink<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append `bytes`, returning the offset they start at.
    pub fn write(&mut self, bytes: &[u8]) -> Result<u32, CodeOverflow> {
        if self.len + bytes.len() > self.buf.len() {
            return Err(CodeOverflow);
        }
        let offset = self.len as u32;
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(offset)
    }
}

/// What a top-level symbol is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    Function,
    ExternFunction,
    Type,
    Global,
}

/// One entry of the symbol table handed back to the host: functions with
/// their code offsets, externs with their dispatch ids, types with their
/// registry indices, globals with their data offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub location: u32,
}

/// Everything the host gets back from a compile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOutput {
    pub errors: u32,
    pub warnings: u32,
    pub code_len: usize,
    pub symbols: Vec<Symbol>,
}

/// Host-side knobs for one compile.
#[derive(Default)]
pub struct CompileOptions<'a> {
    /// Name used in diagnostics; typically the file the source came from.
    pub file_name: &'a str,
    pub sink: Option<&'a mut dyn DiagnosticSink>,
    pub resolver: Option<&'a mut SymbolResolver<'a>>,
}

impl<'a> CompileOptions<'a> {
    pub fn new(file_name: &'a str) -> Self {
        Self {
            file_name,
            sink: None,
            resolver: None,
        }
    }
}

pub struct Compiler<'a> {
    pub(crate) src: &'a str,
    pub(crate) lexer: Lexer<'a>,
    pub(crate) diags: Diagnostics<'a>,
    pub(crate) registry: Registry<'a>,
    pub(crate) scopes: ScopeStack<'a>,
    pub(crate) code: CodeSink<'a>,
    /// Data-segment cursor for globals.
    pub(crate) data_len: usize,
    /// Shared recursion depth of nested type and expression parses.
    pub(crate) depth: u32,
    pub(crate) loop_depth: u32,
    /// Return type of the function body being checked.
    pub(crate) ret_ty: Option<Ty>,
    /// Generic parameter names while a generic typedef body is parsed.
    pub(crate) tmpl_params: Vec<&'a str>,
    /// A `>>` token closed two template argument lists at once; one `>` is
    /// still owed to the outer list.
    pub(crate) owed_gt: bool,
    pub(crate) resolver: Option<&'a mut SymbolResolver<'a>>,
    pub(crate) next_extern: u16,
    pub(crate) symbols: Vec<Symbol>,
}

/// Compile `source` into `code`. Diagnostics go to the sink in source order;
/// the returned output carries the error counter, the bytes written and the
/// symbol table. A nonzero error count means the code buffer contents must
/// not be executed.
pub fn compile<'a>(
    source: &'a str,
    code: &'a mut [u8],
    options: CompileOptions<'a>,
) -> CompileOutput {
    let mut compiler = Compiler {
        src: source,
        lexer: Lexer::new(source),
        diags: Diagnostics::new(options.file_name, source, options.sink),
        registry: Registry::new(),
        scopes: ScopeStack::new(),
        code: CodeSink::new(code),
        data_len: 0,
        depth: 0,
        loop_depth: 0,
        ret_ty: None,
        tmpl_params: Vec::new(),
        owed_gt: false,
        resolver: options.resolver,
        next_extern: 0,
        symbols: Vec::new(),
    };
    compiler.run();

    debug!(
        "compile finished: {} errors, {} bytes of code, {} symbols",
        compiler.diags.errors(),
        compiler.code.len(),
        compiler.symbols.len()
    );
    trace!(
        "pool high-water marks: {}/{} type cells, {}/{} user types",
        compiler.registry.pool_len(),
        crate::types::user::TYPE_POOL_CAP,
        compiler.registry.len(),
        crate::types::user::USER_TYPE_CAP
    );

    CompileOutput {
        errors: compiler.diags.errors(),
        warnings: compiler.diags.warnings(),
        code_len: compiler.code.len(),
        symbols: compiler.symbols,
    }
}

impl<'a> Compiler<'a> {
    fn run(&mut self) {
        self.bump();

        loop {
            match self.tok().kind {
                TokenKind::Eof => return,
                k if k.is_separator() => {
                    self.bump();
                }
                TokenKind::IndentDown => {
                    self.bump();
                }
                TokenKind::IndentUp => {
                    let span = self.tok().span;
                    self.diags
                        .error(Code::BadIndent, span, "unexpected indentation at top level");
                    self.skip_block();
                }
                _ => {
                    let result = match self.kw() {
                        Some(Keyword::Type) => self.parse_type_decl(),
                        Some(Keyword::Fn) => self.parse_fn_decl(false),
                        Some(Keyword::Extern) => self.parse_extern_decl(),
                        Some(Keyword::Let) => self.parse_global_decl(),
                        _ => {
                            let tok = self.tok();
                            self.diags.error(
                                Code::UnexpectedToken,
                                tok.span,
                                format!("expected a declaration, found {}", tok.kind.describe()),
                            );
                            Err(Poisoned)
                        }
                    };
                    if result.is_err() {
                        self.sync_line();
                    }
                }
            }
        }
    }

    // --- token plumbing -------------------------------------------------

    pub(crate) fn tok(&self) -> Token {
        self.lexer.current()
    }

    pub(crate) fn lexeme(&self, span: Span) -> &'a str {
        span.text(self.src)
    }

    pub(crate) fn bump(&mut self) -> Token {
        self.lexer.bump(&mut self.diags)
    }

    /// Advance past layout tokens; used inside bracketed constructs where
    /// line structure does not matter.
    pub(crate) fn bump_significant(&mut self) -> Token {
        self.lexer.bump_significant(&mut self.diags)
    }

    /// The keyword the current identifier spells, if any.
    pub(crate) fn kw(&self) -> Option<Keyword> {
        if self.tok().kind != TokenKind::Ident {
            return None;
        }
        Keyword::from_lexeme(self.lexeme(self.tok().span))
    }

    pub(crate) fn at_kw(&self, kw: Keyword) -> bool {
        self.kw() == Some(kw)
    }

    /// Consume the keyword if it is the current token.
    pub(crate) fn eat_kw(&mut self, kw: Keyword) -> bool {
        if self.at_kw(kw) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.tok().kind == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Require `kind` as the current token, reporting and poisoning if the
    /// source has something else.
    pub(crate) fn expect(&mut self, kind: TokenKind, context: &str) -> PResult<Token> {
        let tok = self.tok();
        if tok.kind == kind {
            self.bump();
            return Ok(tok);
        }
        self.diags.error(
            Code::UnexpectedToken,
            tok.span,
            format!(
                "expected {} {context}, found {}",
                kind.describe(),
                tok.kind.describe()
            ),
        );
        Err(Poisoned)
    }

    pub(crate) fn expect_ident(&mut self, what: &str) -> PResult<Token> {
        let tok = self.tok();
        if tok.kind == TokenKind::Ident && self.kw().is_none() {
            self.bump();
            return Ok(tok);
        }
        self.diags.error(
            Code::ExpectedIdentifier,
            tok.span,
            format!("expected an identifier for {what}"),
        );
        Err(Poisoned)
    }

    /// Require the current token to end the statement (newline, `;`, dedent
    /// or end of file).
    pub(crate) fn expect_line_end(&mut self) -> PResult<()> {
        match self.tok().kind {
            k if k.is_separator() => {
                self.bump();
                Ok(())
            }
            TokenKind::IndentDown | TokenKind::Eof => Ok(()),
            _ => {
                let tok = self.tok();
                self.diags.error(
                    Code::ExpectedSeparator,
                    tok.span,
                    format!("expected end of line, found {}", tok.kind.describe()),
                );
                Err(Poisoned)
            }
        }
    }

    // --- error recovery -------------------------------------------------

    /// Skip to the end of the current logical line, stepping over any block
    /// it opened.
    pub(crate) fn sync_line(&mut self) {
        let mut depth = 0i32;
        loop {
            match self.tok().kind {
                TokenKind::Eof => return,
                TokenKind::IndentUp => depth += 1,
                TokenKind::IndentDown => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                k if k.is_separator() && depth == 0 => return,
                _ => {}
            }
            self.bump();
        }
    }

    /// Skip a whole indented block, assuming the current token is its
    /// `IndentUp`.
    pub(crate) fn skip_block(&mut self) {
        let mut depth = 0i32;
        loop {
            match self.tok().kind {
                TokenKind::Eof => return,
                TokenKind::IndentUp => depth += 1,
                TokenKind::IndentDown => {
                    depth -= 1;
                    if depth <= 0 {
                        self.bump();
                        return;
                    }
                }
                _ => {}
            }
            self.bump();
        }
    }

    // --- recursion guard ------------------------------------------------

    pub(crate) fn enter_nesting(&mut self, span: Span) -> PResult<()> {
        if self.depth >= RECURSION_LIMIT {
            self.diags.error(
                Code::RecursionLimit,
                span,
                format!("nesting deeper than the limit of {RECURSION_LIMIT}"),
            );
            return Err(Poisoned);
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave_nesting(&mut self) {
        debug_assert!(self.depth > 0);
        self.depth -= 1;
    }
}

/// Build a compiler over `source` with the lookahead primed, hand it to the
/// closure, and tear everything down afterwards. Unit-test plumbing for the
/// modules that extend [`Compiler`].
#[cfg(test)]
pub(crate) fn with_compiler<R>(source: &str, f: impl FnOnce(&mut Compiler) -> R) -> R {
    let mut code = vec![0u8; 4096];
    let mut compiler = Compiler {
        src: source,
        lexer: Lexer::new(source),
        diags: Diagnostics::new("test.cs", source, None),
        registry: Registry::new(),
        scopes: ScopeStack::new(),
        code: CodeSink::new(&mut code),
        data_len: 0,
        depth: 0,
        loop_depth: 0,
        ret_ty: None,
        tmpl_params: Vec::new(),
        owed_gt: false,
        resolver: None,
        next_extern: 0,
        symbols: Vec::new(),
    };
    compiler.bump();
    f(&mut compiler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::user::UserDef;

    #[test]
    fn test_struct_layout() {
        with_compiler("type Point x i32 y i32", |c| {
            c.parse_type_decl().unwrap();
            let id = c.registry.lookup("Point").unwrap();
            let UserDef::Struct(s) = &c.registry.get(id).def else {
                panic!("expected a struct");
            };
            assert_eq!(s.size, 8);
            assert_eq!(s.align, 4);
            assert_eq!(
                s.members.iter().map(|m| m.offset).collect::<Vec<_>>(),
                vec![0, 4]
            );
        });
    }

    #[test]
    fn test_struct_layout_with_padding() {
        with_compiler("type Mixed a u8 b f64 c u16", |c| {
            c.parse_type_decl().unwrap();
            let id = c.registry.lookup("Mixed").unwrap();
            let UserDef::Struct(s) = &c.registry.get(id).def else {
                panic!("expected a struct");
            };
            assert_eq!(
                s.members.iter().map(|m| m.offset).collect::<Vec<_>>(),
                vec![0, 8, 16]
            );
            assert_eq!(s.align, 8);
            assert_eq!(s.size, 24);
        });
    }

    #[test]
    fn test_block_struct_matches_inline_struct() {
        with_compiler("type Point\n\tx i32\n\ty i32", |c| {
            c.parse_type_decl().unwrap();
            let id = c.registry.lookup("Point").unwrap();
            let UserDef::Struct(s) = &c.registry.get(id).def else {
                panic!("expected a struct");
            };
            assert_eq!((s.size, s.align), (8, 4));
        });
    }

    #[test]
    fn test_enum_layout() {
        with_compiler("type Shape\n\tCircle\n\t\tr f64\n\tSquare", |c| {
            c.parse_type_decl().unwrap();
            assert_eq!(c.diags.errors(), 0);
            let id = c.registry.lookup("Shape").unwrap();
            let UserDef::Enum(e) = &c.registry.get(id).def else {
                panic!("expected an enum");
            };
            // i32 id padded to the f64 payload's alignment.
            assert_eq!(e.data_offset, 8);
            assert_eq!(e.align, 8);
            assert_eq!(e.size, 16);
            assert_eq!(e.variants.len(), 2);
        });
    }

    #[test]
    fn test_enum_custom_id_type() {
        with_compiler("type Small = u8\n\tOne\n\tTwo", |c| {
            c.parse_type_decl().unwrap();
            assert_eq!(c.diags.errors(), 0);
            let id = c.registry.lookup("Small").unwrap();
            let UserDef::Enum(e) = &c.registry.get(id).def else {
                panic!("expected an enum");
            };
            // Empty variants: payload alignment 1, so the id is not padded.
            assert_eq!(e.data_offset, 1);
            assert_eq!(e.size, 1);
        });
    }

    #[test]
    fn test_enum_rejects_float_id() {
        with_compiler("type Bad = f32\n\tOne", |c| {
            assert!(c.parse_type_decl().is_err());
            assert_eq!(c.diags.errors(), 1);
        });
    }

    #[test]
    fn test_forward_declaration_then_definition() {
        with_compiler("type Node\ntype Node\n\tnext &Node\n\tvalue i32", |c| {
            c.parse_type_decl().unwrap();
            c.parse_type_decl().unwrap();
            assert_eq!(c.diags.errors(), 0);
            let id = c.registry.lookup("Node").unwrap();
            assert!(matches!(c.registry.get(id).def, UserDef::Struct(_)));
        });
    }

    #[test]
    fn test_code_sink_overflow() {
        let mut buf = [0u8; 4];
        let mut sink = CodeSink::new(&mut buf);
        assert_eq!(sink.write(b"abc"), Ok(0));
        assert_eq!(sink.write(b"de"), Err(CodeOverflow));
        assert_eq!(sink.write(b"d"), Ok(3));
        assert_eq!(sink.len(), 4);
    }
}
