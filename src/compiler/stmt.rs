//! Statements inside function bodies.
//!
//! A body is one indented block; nested blocks follow `if ... then`,
//! `else` and `while` headers. Every statement checks its own types and
//! recovers to the end of its line on failure, so a broken statement never
//! takes the rest of the function down with it.

use crate::compiler::Compiler;
use crate::diagnostics::{Code, PResult, Poisoned};
use crate::lexer::{Keyword, TokenKind};
use crate::scope::{Loc, Place};
use crate::types::parse::TypeCtx;
use crate::types::{pod, LevelKind, Pod};

impl<'a> Compiler<'a> {
    /// Parse one indented block of statements, assuming the current token
    /// is its `IndentUp`. Handles its own scope frame and error recovery.
    pub(crate) fn parse_block(&mut self) {
        if self.tok().kind != TokenKind::IndentUp {
            let tok = self.tok();
            self.diags.error(
                Code::BadIndent,
                tok.span,
                "expected an indented block here",
            );
            return;
        }
        self.bump();
        self.scopes.enter();

        loop {
            match self.tok().kind {
                TokenKind::IndentDown => {
                    self.bump();
                    break;
                }
                TokenKind::Eof => break,
                k if k.is_separator() => {
                    self.bump();
                }
                TokenKind::IndentUp => {
                    let span = self.tok().span;
                    self.diags
                        .error(Code::BadIndent, span, "unexpected indentation");
                    self.skip_block();
                }
                _ => {
                    if self.parse_stmt().is_err() {
                        self.sync_line();
                    }
                }
            }
        }

        self.scopes.exit();
    }

    fn parse_stmt(&mut self) -> PResult<()> {
        match self.kw() {
            Some(Keyword::Let) => self.parse_let_stmt(),
            Some(Keyword::If) => self.parse_if_stmt(),
            Some(Keyword::While) => self.parse_while_stmt(),
            Some(Keyword::Return) => self.parse_return_stmt(),
            Some(Keyword::Break) | Some(Keyword::Continue) => self.parse_jump_stmt(),
            _ => {
                self.eval()?;
                self.expect_line_end()
            }
        }
    }

    fn parse_let_stmt(&mut self) -> PResult<()> {
        self.bump();
        let name_tok = self.expect_ident("the variable name")?;
        let name = self.lexeme(name_tok.span);

        let annotated = if self.eat(TokenKind::Colon) {
            Some(self.parse_type(TypeCtx::Decl)?)
        } else {
            None
        };
        let init = if self.eat(TokenKind::Eq) {
            Some(self.eval()?)
        } else {
            None
        };

        let ty = self.binding_type(name_tok.span, annotated, init)?;
        let size = self.registry.size_of(&ty);
        let align = self.registry.align_of(&ty);
        let offset = self.scopes.alloc_stack(size, align);

        if let Err(err) = self
            .scopes
            .declare(name, ty, Loc::direct(Place::Stack(offset)))
        {
            self.report_bind_error(err, name, name_tok.span);
            return Err(Poisoned);
        }
        self.expect_line_end()
    }

    /// The condition of `if` and `while` must convert to bool.
    fn parse_condition(&mut self) -> PResult<()> {
        let cond = self.eval()?;
        if !self.registry.can_convert(&cond.ty, &pod(Pod::Bool)) {
            self.type_mismatch(cond.span, &cond.ty, &pod(Pod::Bool));
            return Err(Poisoned);
        }
        Ok(())
    }

    fn parse_if_stmt(&mut self) -> PResult<()> {
        self.bump();
        self.parse_condition()?;
        if !self.eat_kw(Keyword::Then) {
            let tok = self.tok();
            self.diags.error(
                Code::UnexpectedToken,
                tok.span,
                format!("expected `then`, found {}", tok.kind.describe()),
            );
            return Err(Poisoned);
        }
        if self.tok().kind.is_separator() {
            self.bump();
        }
        self.parse_block();

        if self.eat_kw(Keyword::Else) {
            if self.tok().kind.is_separator() {
                self.bump();
            }
            self.parse_block();
        }
        Ok(())
    }

    fn parse_while_stmt(&mut self) -> PResult<()> {
        self.bump();
        self.parse_condition()?;
        if self.tok().kind.is_separator() {
            self.bump();
        }
        self.loop_depth += 1;
        self.parse_block();
        self.loop_depth -= 1;
        Ok(())
    }

    fn parse_return_stmt(&mut self) -> PResult<()> {
        let kw_span = self.tok().span;
        self.bump();
        let ret_ty = self.ret_ty.clone().unwrap_or_else(|| {
            vec![crate::types::Level::new(LevelKind::Void)]
        });

        let returns_void = ret_ty[0].kind == LevelKind::Void;
        if self.tok().kind.is_separator()
            || matches!(self.tok().kind, TokenKind::IndentDown | TokenKind::Eof)
        {
            if !returns_void {
                let want = crate::types::display(&ret_ty, &self.registry);
                self.diags.error(
                    Code::IllegalConversion,
                    kw_span,
                    format!("this function returns `{want}`, so `return` needs a value"),
                );
                return Err(Poisoned);
            }
            return self.expect_line_end();
        }

        let value = self.eval()?;
        if returns_void {
            self.diags.error(
                Code::IllegalConversion,
                value.span,
                "this function does not return a value",
            );
            return Err(Poisoned);
        }
        if !self.registry.can_convert(&value.ty, &ret_ty) {
            self.type_mismatch(value.span, &value.ty, &ret_ty);
            return Err(Poisoned);
        }
        self.expect_line_end()
    }

    fn parse_jump_stmt(&mut self) -> PResult<()> {
        let tok = self.tok();
        let what = self.lexeme(tok.span);
        self.bump();
        if self.loop_depth == 0 {
            self.diags.error(
                Code::OutsideLoop,
                tok.span,
                format!("`{what}` outside of a loop"),
            );
            return Err(Poisoned);
        }
        self.expect_line_end()
    }
}
