//! Parsing type expressions out of the token stream.
//!
//! The grammar, in the order attempted: one optional qualifier, any number
//! of indirection prefixes (`&`, `*`, `&[]`, `*[]`, `[N]`) each with its own
//! optional qualifier, then a terminal: a POD name, an anonymous
//! pointer-to-function signature, the `any` wildcard (only behind an
//! indirection), or an identifier naming a user type. Typedefs are expanded
//! in place as they are met, substituting template arguments into any
//! placeholder levels the stored body carries.

use crate::compiler::Compiler;
use crate::diagnostics::{Code, PResult, Poisoned};
use crate::lexer::{parse_int_lexeme, Keyword, TokenKind};
use crate::types::user::{FnSigDef, TypedefDef, UserDef};
use crate::types::{Level, LevelKind, Pod, Ty};

/// Which default-mutability convention applies to the outermost level: a
/// type written at the language top level is const unless marked `mut`; a
/// type in a variable declaration is mut unless marked `const`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TypeCtx {
    TopLevel,
    Decl,
}

impl<'a> Compiler<'a> {
    pub(crate) fn parse_type(&mut self, ctx: TypeCtx) -> PResult<Ty> {
        self.parse_type_full(ctx, false)
    }

    pub(crate) fn parse_type_full(&mut self, ctx: TypeCtx, accept_void: bool) -> PResult<Ty> {
        let span = self.tok().span;
        self.enter_nesting(span)?;
        let result = self.parse_type_inner(ctx, accept_void);
        self.leave_nesting();
        result
    }

    fn parse_type_inner(&mut self, ctx: TypeCtx, accept_void: bool) -> PResult<Ty> {
        let mut out = Ty::new();

        // The outermost qualifier follows the context's default; every
        // deeper level defaults to const.
        let mut pending_mut = match ctx {
            TypeCtx::TopLevel => {
                if self.eat_kw(Keyword::Const) {
                    false
                } else {
                    self.eat_kw(Keyword::Mut)
                }
            }
            TypeCtx::Decl => {
                if self.eat_kw(Keyword::Const) {
                    false
                } else {
                    self.eat_kw(Keyword::Mut);
                    true
                }
            }
        };

        loop {
            match self.tok().kind {
                TokenKind::Amp => {
                    self.bump();
                    if self.eat(TokenKind::LBracket) {
                        self.expect(TokenKind::RBracket, "to close the slice prefix")?;
                        out.push(Level::with_mut(LevelKind::Slice, pending_mut));
                    } else {
                        out.push(Level::with_mut(LevelKind::Ref, pending_mut));
                    }
                }
                TokenKind::Star => {
                    self.bump();
                    if self.eat(TokenKind::LBracket) {
                        self.expect(TokenKind::RBracket, "to close the array-pointer prefix")?;
                        out.push(Level::with_mut(LevelKind::ArrPtr, pending_mut));
                    } else {
                        out.push(Level::with_mut(LevelKind::Ptr, pending_mut));
                    }
                }
                TokenKind::LBracket => {
                    self.bump();
                    let len = self.parse_array_len()?;
                    self.expect(TokenKind::RBracket, "to close the array length")?;
                    out.push(Level::with_mut(LevelKind::Arr(len), pending_mut));
                }
                _ => break,
            }

            pending_mut = if self.eat_kw(Keyword::Mut) {
                true
            } else {
                self.eat_kw(Keyword::Const);
                false
            };
        }

        self.parse_type_terminal(&mut out, pending_mut, accept_void)?;
        Ok(out)
    }

    /// A compile-time array length. Only an integer literal qualifies.
    fn parse_array_len(&mut self) -> PResult<u32> {
        let tok = self.tok();
        if tok.kind != TokenKind::Int {
            self.diags.error(
                Code::NonConstantArraySize,
                tok.span,
                "array length must be an integer constant",
            );
            return Err(Poisoned);
        }
        let Some((value, _)) = parse_int_lexeme(self.lexeme(tok.span)) else {
            self.diags.error(
                Code::MalformedNumber,
                tok.span,
                "array length does not fit in an integer",
            );
            return Err(Poisoned);
        };
        if value > u32::MAX as u64 {
            self.diags.error(
                Code::NonConstantArraySize,
                tok.span,
                "array length is out of range",
            );
            return Err(Poisoned);
        }
        self.bump();
        Ok(value as u32)
    }

    fn parse_type_terminal(
        &mut self,
        out: &mut Ty,
        pending_mut: bool,
        accept_void: bool,
    ) -> PResult<()> {
        let tok = self.tok();

        if tok.kind == TokenKind::LParen {
            return self.parse_pfn_type(out, pending_mut);
        }

        if tok.kind != TokenKind::Ident {
            self.diags.error(
                Code::UnexpectedToken,
                tok.span,
                format!("expected a type, found {}", tok.kind.describe()),
            );
            return Err(Poisoned);
        }
        let name = self.lexeme(tok.span);

        // `any` and `void` read like type names but have placement rules of
        // their own.
        if name == "any" {
            let under = out.last().map(|l| l.kind);
            if !matches!(
                under,
                Some(LevelKind::Ref) | Some(LevelKind::Ptr) | Some(LevelKind::Slice)
            ) {
                self.diags.error(
                    Code::AnyRequiresIndirection,
                    tok.span,
                    "`any` is only valid behind `&`, `*` or `&[]`",
                );
                return Err(Poisoned);
            }
            out.push(Level::with_mut(LevelKind::Any, pending_mut));
            self.bump();
            return Ok(());
        }
        if name == "void" {
            if !accept_void {
                self.diags.error(
                    Code::UnknownType,
                    tok.span,
                    "`void` is only valid as a return type",
                );
                return Err(Poisoned);
            }
            out.push(Level::with_mut(LevelKind::Void, pending_mut));
            self.bump();
            return Ok(());
        }

        if let Some(pod) = Pod::from_name(name) {
            out.push(Level::with_mut(LevelKind::Pod(pod), pending_mut));
            self.bump();
            return Ok(());
        }

        // Template parameters of the generic typedef currently being
        // defined shadow user types.
        if let Some(index) = self.tmpl_params.iter().position(|p| *p == name) {
            out.push(Level::with_mut(LevelKind::Template(index as u8), pending_mut));
            self.bump();
            return Ok(());
        }

        let Some(id) = self.registry.lookup(name) else {
            self.diags.error(
                Code::UnknownType,
                tok.span,
                format!("unknown type name `{name}`"),
            );
            return Err(Poisoned);
        };

        match &self.registry.get(id).def {
            UserDef::Struct(_) => {
                out.push(Level::with_mut(LevelKind::Struct(id), pending_mut));
                self.bump();
                Ok(())
            }
            UserDef::Enum(_) => {
                out.push(Level::with_mut(LevelKind::Enum(id), pending_mut));
                self.bump();
                Ok(())
            }
            UserDef::FnSig(_) | UserDef::Fn(_) => {
                out.push(Level::with_mut(LevelKind::Pfn(id), pending_mut));
                self.bump();
                Ok(())
            }
            UserDef::Forward => {
                // A declared-but-undefined type has no size yet, so it can
                // only be used behind an indirection.
                if !out.last().map(|l| l.kind.is_indirection()).unwrap_or(false) {
                    self.diags.error(
                        Code::IncompleteType,
                        tok.span,
                        format!("`{name}` is declared but not yet defined"),
                    );
                    return Err(Poisoned);
                }
                out.push(Level::with_mut(LevelKind::Struct(id), pending_mut));
                self.bump();
                Ok(())
            }
            UserDef::Typedef(td) => {
                let td = td.clone();
                self.bump();
                self.expand_typedef(out, pending_mut, &td, tok.span)
            }
        }
    }

    /// An anonymous `(params) -> ret` signature in type position. The
    /// signature is registered unnamed so the level can reference it by
    /// index like any other pfn.
    fn parse_pfn_type(&mut self, out: &mut Ty, pending_mut: bool) -> PResult<()> {
        let open = self.tok();
        self.bump_significant();

        let mut params = Vec::new();
        while self.tok().kind != TokenKind::RParen {
            if self.tok().kind == TokenKind::Eof {
                self.diags.error(
                    Code::MissingDelimiter,
                    open.span,
                    "unclosed function-pointer parameter list",
                );
                return Err(Poisoned);
            }
            let ty = self.parse_type(TypeCtx::TopLevel)?;
            let interned = self.intern_type(&ty, open.span)?;
            params.push(("", interned));
            if self.tok().kind == TokenKind::Comma {
                self.bump_significant();
            }
        }
        self.bump();

        let ret = if self.eat(TokenKind::Arrow) {
            let ty = self.parse_type_full(TypeCtx::TopLevel, true)?;
            self.intern_type(&ty, open.span)?
        } else {
            let void = vec![Level::new(LevelKind::Void)];
            self.intern_type(&void, open.span)?
        };

        let id = match self.registry.declare("", UserDef::FnSig(FnSigDef { params, ret })) {
            Ok(id) => id,
            Err(err) => {
                self.diags
                    .error(Code::UserTypesExhausted, open.span, err.to_string());
                return Err(Poisoned);
            }
        };
        out.push(Level::with_mut(LevelKind::Pfn(id), pending_mut));
        Ok(())
    }

    /// Copy a typedef body into `out`, substituting template arguments for
    /// placeholder levels. The use site's pending qualifier lands on the
    /// first copied level, exactly as if the aliased type had been written
    /// out by hand.
    fn expand_typedef(
        &mut self,
        out: &mut Ty,
        pending_mut: bool,
        td: &TypedefDef<'a>,
        at: crate::source::Span,
    ) -> PResult<()> {
        let mut args: Vec<Ty> = Vec::new();
        if !td.params.is_empty() {
            self.expect(TokenKind::Lt, "to open the template argument list")?;
            loop {
                args.push(self.parse_type(TypeCtx::TopLevel)?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect_template_close()?;
            if args.len() != td.params.len() {
                self.diags.error(
                    Code::TemplateArity,
                    at,
                    format!(
                        "expected {} template argument(s), found {}",
                        td.params.len(),
                        args.len()
                    ),
                );
                return Err(Poisoned);
            }
        }

        let body = self.registry.ty_vec(td.ty);
        let mut copied = Ty::with_capacity(body.len());
        for level in body {
            if let LevelKind::Template(index) = level.kind {
                let actual = &args[index as usize];
                let base = copied.len();
                copied.extend_from_slice(actual);
                copied[base].mutable |= level.mutable;
            } else {
                copied.push(level);
            }
        }
        if let Some(first) = copied.first_mut() {
            first.mutable = pending_mut;
        }
        out.extend(copied);
        Ok(())
    }

    /// Consume the `>` closing a template argument list. A `>>` closes two
    /// nested lists at once; the second half is owed to the enclosing one.
    fn expect_template_close(&mut self) -> PResult<()> {
        if self.owed_gt {
            self.owed_gt = false;
            return Ok(());
        }
        match self.tok().kind {
            TokenKind::Gt => {
                self.bump();
                Ok(())
            }
            TokenKind::Shr => {
                self.owed_gt = true;
                self.bump();
                Ok(())
            }
            _ => {
                let tok = self.tok();
                self.diags.error(
                    Code::MissingDelimiter,
                    tok.span,
                    format!(
                        "expected `>` to close the template argument list, found {}",
                        tok.kind.describe()
                    ),
                );
                Err(Poisoned)
            }
        }
    }

    /// Intern a parsed type into the registry pool, reporting exhaustion.
    pub(crate) fn intern_type(
        &mut self,
        ty: &[Level],
        at: crate::source::Span,
    ) -> PResult<crate::types::TypeRef> {
        match self.registry.intern(ty, false) {
            Ok(r) => Ok(r),
            Err(err) => {
                self.diags.error(Code::TypePoolExhausted, at, err.to_string());
                Err(Poisoned)
            }
        }
    }

    /// Same, but for typedef bodies which may legitimately contain
    /// placeholder levels.
    pub(crate) fn intern_typedef_body(
        &mut self,
        ty: &[Level],
        at: crate::source::Span,
    ) -> PResult<crate::types::TypeRef> {
        match self.registry.intern(ty, true) {
            Ok(r) => Ok(r),
            Err(err) => {
                self.diags.error(Code::TypePoolExhausted, at, err.to_string());
                Err(Poisoned)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::with_compiler;
    use crate::types::encoded_len;

    fn parse(source: &str, ctx: TypeCtx) -> Ty {
        with_compiler(source, |c| c.parse_type(ctx).unwrap())
    }

    #[test]
    fn test_decl_context_defaults_to_mut() {
        assert_eq!(
            parse("i32", TypeCtx::Decl),
            vec![Level::mutable(LevelKind::Pod(Pod::I32))]
        );
        assert_eq!(
            parse("const i32", TypeCtx::Decl),
            vec![Level::new(LevelKind::Pod(Pod::I32))]
        );
    }

    #[test]
    fn test_top_level_context_defaults_to_const() {
        assert_eq!(
            parse("i32", TypeCtx::TopLevel),
            vec![Level::new(LevelKind::Pod(Pod::I32))]
        );
        assert_eq!(
            parse("mut i32", TypeCtx::TopLevel),
            vec![Level::mutable(LevelKind::Pod(Pod::I32))]
        );
    }

    #[test]
    fn test_indirections() {
        assert_eq!(
            parse("&[]mut u8", TypeCtx::TopLevel),
            vec![
                Level::new(LevelKind::Slice),
                Level::mutable(LevelKind::Pod(Pod::U8)),
            ]
        );
        assert_eq!(
            parse("*[]f32", TypeCtx::TopLevel),
            vec![
                Level::new(LevelKind::ArrPtr),
                Level::new(LevelKind::Pod(Pod::F32)),
            ]
        );
        assert_eq!(
            parse("[4]i64", TypeCtx::TopLevel),
            vec![
                Level::new(LevelKind::Arr(4)),
                Level::new(LevelKind::Pod(Pod::I64)),
            ]
        );
    }

    #[test]
    fn test_encoded_len_predicts_pool_layout() {
        let ty = parse("[8]*i16", TypeCtx::TopLevel);
        assert_eq!(encoded_len(&ty), ty.len());
        assert_eq!(ty.len(), 3);
    }

    #[test]
    fn test_slice_prefix_rejects_a_length() {
        with_compiler("&[8]i32", |c| {
            assert!(c.parse_type(TypeCtx::TopLevel).is_err());
            assert_eq!(c.diags.errors(), 1);
        });
    }

    #[test]
    fn test_any_requires_indirection() {
        with_compiler("any", |c| {
            assert!(c.parse_type(TypeCtx::TopLevel).is_err());
            assert_eq!(c.diags.errors(), 1);
        });
        assert_eq!(
            parse("&any", TypeCtx::TopLevel),
            vec![Level::new(LevelKind::Ref), Level::new(LevelKind::Any)]
        );
    }

    #[test]
    fn test_array_length_must_be_constant() {
        with_compiler("[n]i32", |c| {
            assert!(c.parse_type(TypeCtx::TopLevel).is_err());
            assert_eq!(c.diags.errors(), 1);
        });
    }

    #[test]
    fn test_typedef_expands_in_place() {
        // The stored type must be the two-cell encoding, structurally equal
        // to what `*i32` parses to directly in the same context.
        with_compiler("type Ptr = *i32\nPtr", |c| {
            c.parse_type_decl().unwrap();
            let expanded = c.parse_type(TypeCtx::Decl).unwrap();
            assert_eq!(
                expanded,
                vec![
                    Level::mutable(LevelKind::Ptr),
                    Level::new(LevelKind::Pod(Pod::I32)),
                ]
            );
        });
        assert_eq!(
            parse("*i32", TypeCtx::Decl),
            vec![
                Level::mutable(LevelKind::Ptr),
                Level::new(LevelKind::Pod(Pod::I32)),
            ]
        );
    }

    #[test]
    fn test_generic_typedef_substitution() {
        with_compiler("type Pair<T> = &[]T\nPair<f64>", |c| {
            c.parse_type_decl().unwrap();
            let expanded = c.parse_type(TypeCtx::TopLevel).unwrap();
            assert_eq!(
                expanded,
                vec![
                    Level::new(LevelKind::Slice),
                    Level::new(LevelKind::Pod(Pod::F64)),
                ]
            );
        });
    }

    #[test]
    fn test_nested_template_arguments_share_the_shr_token() {
        with_compiler("type Box<T> = *T\nBox<Box<i32>>", |c| {
            c.parse_type_decl().unwrap();
            let expanded = c.parse_type(TypeCtx::TopLevel).unwrap();
            assert_eq!(
                expanded,
                vec![
                    Level::new(LevelKind::Ptr),
                    Level::new(LevelKind::Ptr),
                    Level::new(LevelKind::Pod(Pod::I32)),
                ]
            );
        });
    }

    #[test]
    fn test_template_arity_mismatch() {
        with_compiler("type Pair<T, U> = &T\nPair<i32>", |c| {
            c.parse_type_decl().unwrap();
            assert!(c.parse_type(TypeCtx::TopLevel).is_err());
            assert!(c.diags.errors() > 0);
        });
    }

    #[test]
    fn test_unknown_type_name() {
        with_compiler("Missing", |c| {
            assert!(c.parse_type(TypeCtx::TopLevel).is_err());
            assert_eq!(c.diags.errors(), 1);
        });
    }

    #[test]
    fn test_pfn_type() {
        with_compiler("(i32, f64) -> bool", |c| {
            let ty = c.parse_type(TypeCtx::TopLevel).unwrap();
            assert_eq!(ty.len(), 1);
            let LevelKind::Pfn(id) = ty[0].kind else {
                panic!("expected a pfn level");
            };
            let sig = c.registry.signature_of(id).unwrap();
            assert_eq!(sig.params.len(), 2);
            assert_eq!(
                c.registry.ty(sig.ret),
                &[Level::new(LevelKind::Pod(Pod::Bool))]
            );
        });
    }
}
