//! Top-level declarations: typedefs, structs, enums, functions and globals.
//!
//! `type` introduces everything nominal. The shape of what follows the name
//! picks the form: `=` aliases (or, with an indented block, an enum with an
//! explicit id type), an inline or indented member list builds a struct, an
//! indented list of bare names builds an enum, and a bare newline leaves a
//! forward declaration for a later definition to complete.

use log::debug;

use crate::compiler::{Compiler, Symbol, SymbolKind};
use crate::diagnostics::{Code, PResult, Poisoned};
use crate::lexer::{Keyword, Token, TokenKind};
use crate::scope::{BindError, Loc, Place};
use crate::source::Span;
use crate::types::parse::TypeCtx;
use crate::types::user::{
    DeclareError, EnumDef, FnDef, FnSigDef, Member, StructDef, TypedefDef, UserDef, UserId,
};
use crate::types::{align_up, Level, LevelKind, Pod, Ty};

impl<'a> Compiler<'a> {
    pub(crate) fn parse_type_decl(&mut self) -> PResult<()> {
        self.bump();
        let name_tok = self.expect_ident("the type name")?;
        let name = self.lexeme(name_tok.span);

        match self.tok().kind {
            // `type Name<T, U> = ...`: generic typedef.
            TokenKind::Lt => {
                let params = self.parse_template_params()?;
                self.expect(TokenKind::Eq, "before the aliased type")?;
                self.tmpl_params = params.clone();
                let body = self.parse_type(TypeCtx::TopLevel);
                self.tmpl_params.clear();
                let body = body?;
                let ty = self.intern_typedef_body(&body, name_tok.span)?;
                let id =
                    self.declare_user(name, UserDef::Typedef(TypedefDef { params, ty }), name_tok.span)?;
                self.push_type_symbol(name, id);
                self.expect_line_end()
            }

            // `type Name = ...`: plain typedef, or an enum when an indented
            // variant block follows an integer id type.
            TokenKind::Eq => {
                self.bump();
                let rhs = self.parse_type(TypeCtx::TopLevel)?;
                let mut line_ended = false;
                if self.tok().kind.is_separator() {
                    self.bump();
                    line_ended = true;
                    if self.tok().kind == TokenKind::IndentUp {
                        return self.parse_enum_with_id(name, name_tok, rhs);
                    }
                }
                let ty = self.intern_typedef_body(&rhs, name_tok.span)?;
                let id = self.declare_user(
                    name,
                    UserDef::Typedef(TypedefDef {
                        params: Vec::new(),
                        ty,
                    }),
                    name_tok.span,
                )?;
                self.push_type_symbol(name, id);
                if !line_ended {
                    self.expect_line_end()?;
                }
                Ok(())
            }

            // `type Name x i32 y i32`: inline struct members.
            TokenKind::Ident => {
                let first = self.expect_ident("the first member name")?;
                let def = self.parse_struct_members(first, true)?;
                let id = self.declare_user(name, UserDef::Struct(def), name_tok.span)?;
                self.push_type_symbol(name, id);
                self.expect_line_end()
            }

            // A bare name: forward declaration, or a struct/enum block.
            k if k.is_separator() => {
                self.bump();
                if self.tok().kind != TokenKind::IndentUp {
                    let id = self.declare_user(name, UserDef::Forward, name_tok.span)?;
                    self.push_type_symbol(name, id);
                    return Ok(());
                }
                self.bump();
                let first = self.expect_ident("a member or variant name")?;
                if self.tok().kind.is_separator()
                    || matches!(self.tok().kind, TokenKind::IndentDown | TokenKind::Eof)
                {
                    self.parse_enum_body(name, name_tok, first, vec![Level::new(LevelKind::Pod(Pod::I32))])
                } else {
                    let def = self.parse_struct_members(first, false)?;
                    let id = self.declare_user(name, UserDef::Struct(def), name_tok.span)?;
                    self.push_type_symbol(name, id);
                    Ok(())
                }
            }

            _ => {
                let tok = self.tok();
                self.diags.error(
                    Code::UnexpectedToken,
                    tok.span,
                    format!("expected a type definition, found {}", tok.kind.describe()),
                );
                Err(Poisoned)
            }
        }
    }

    fn parse_template_params(&mut self) -> PResult<Vec<&'a str>> {
        self.bump();
        let mut params = Vec::new();
        loop {
            let tok = self.expect_ident("a template parameter name")?;
            params.push(self.lexeme(tok.span));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Gt, "to close the template parameter list")?;
        Ok(params)
    }

    /// Member lines of a struct. In inline form members follow each other on
    /// the declaration line; in block form each line holds one `name type`
    /// pair and the block's dedent ends the list.
    fn parse_struct_members(&mut self, first: Token, inline: bool) -> PResult<StructDef<'a>> {
        let mut def = StructDef::default();
        let mut name_tok = first;

        loop {
            let member_name = self.lexeme(name_tok.span);
            let ty = self.parse_type(TypeCtx::TopLevel)?;
            if def.members.iter().any(|m: &Member| m.name == member_name) {
                self.diags.error(
                    Code::Redeclaration,
                    name_tok.span,
                    format!("duplicate member `{member_name}`"),
                );
                return Err(Poisoned);
            }

            let size = self.registry.size_of(&ty);
            let align = self.registry.align_of(&ty);
            let offset = align_up(def.size, align.max(1));
            let interned = self.intern_type(&ty, name_tok.span)?;
            def.members.push(Member {
                name: member_name,
                ty: interned,
                offset,
            });
            def.size = offset + size;
            def.align = def.align.max(align);

            if inline {
                match self.tok().kind {
                    TokenKind::Ident => name_tok = self.expect_ident("a member name")?,
                    _ => break,
                }
            } else {
                if self.tok().kind.is_separator() {
                    self.bump();
                }
                match self.tok().kind {
                    TokenKind::IndentDown => {
                        self.bump();
                        break;
                    }
                    TokenKind::Eof => break,
                    TokenKind::Ident => name_tok = self.expect_ident("a member name")?,
                    _ => {
                        let tok = self.tok();
                        self.diags.error(
                            Code::ExpectedSeparator,
                            tok.span,
                            format!(
                                "expected the next member or the end of the struct, found {}",
                                tok.kind.describe()
                            ),
                        );
                        return Err(Poisoned);
                    }
                }
            }
        }

        def.align = def.align.max(1);
        def.size = align_up(def.size, def.align);
        Ok(def)
    }

    /// `type Name = u8` followed by an indented block: an enum whose id type
    /// is the aliased integer POD.
    fn parse_enum_with_id(&mut self, name: &'a str, name_tok: Token, id_ty: Ty) -> PResult<()> {
        let valid =
            id_ty.len() == 1 && matches!(id_ty[0].kind, LevelKind::Pod(p) if p.is_integer());
        if !valid {
            self.diags.error(
                Code::InvalidOperands,
                name_tok.span,
                "an enum id type must be an integer POD",
            );
            return Err(Poisoned);
        }
        self.bump();
        let first = self.expect_ident("a variant name")?;
        self.parse_enum_body(name, name_tok, first, id_ty)
    }

    /// Variant lines of an enum. Each variant with a deeper block gets a
    /// hidden payload struct pointing back at its owner.
    fn parse_enum_body(
        &mut self,
        name: &'a str,
        name_tok: Token,
        first_variant: Token,
        id_ty: Ty,
    ) -> PResult<()> {
        let id_size = self.registry.size_of(&id_ty);
        let id_align = self.registry.align_of(&id_ty);
        let id_ref = self.intern_type(&id_ty, name_tok.span)?;

        // Reserve the enum's index first so variant payloads can point back
        // at it; the full definition replaces the reservation below.
        let enum_id = self.declare_user(name, UserDef::Forward, name_tok.span)?;

        let mut variants: Vec<UserId> = Vec::new();
        let mut payload_size = 0usize;
        let mut payload_align = 1usize;
        let mut variant_tok = first_variant;

        loop {
            let variant_name = self.lexeme(variant_tok.span);
            let mut payload = StructDef {
                enum_owner: Some(enum_id),
                ..Default::default()
            };

            if self.tok().kind.is_separator() {
                self.bump();
                if self.tok().kind == TokenKind::IndentUp {
                    self.bump();
                    let first = self.expect_ident("a variant member name")?;
                    payload = self.parse_struct_members(first, false)?;
                    payload.enum_owner = Some(enum_id);
                }
            }

            payload_size = payload_size.max(payload.size);
            payload_align = payload_align.max(payload.align.max(1));
            let vid = self.declare_user(variant_name, UserDef::Struct(payload), variant_tok.span)?;
            variants.push(vid);

            match self.tok().kind {
                TokenKind::IndentDown => {
                    self.bump();
                    break;
                }
                TokenKind::Eof => break,
                TokenKind::Ident => variant_tok = self.expect_ident("a variant name")?,
                _ => {
                    let tok = self.tok();
                    self.diags.error(
                        Code::ExpectedSeparator,
                        tok.span,
                        format!(
                            "expected the next variant or the end of the enum, found {}",
                            tok.kind.describe()
                        ),
                    );
                    return Err(Poisoned);
                }
            }
        }

        let data_offset = align_up(id_size, payload_align);
        let align = payload_align.max(id_align);
        let size = align_up(data_offset + payload_size, align);
        debug!(
            "enum `{name}`: {} variant(s), size {size}, align {align}, payload at {data_offset}",
            variants.len()
        );

        let id = self.declare_user(
            name,
            UserDef::Enum(EnumDef {
                id_ty: id_ref,
                variants,
                size,
                align,
                data_offset,
            }),
            name_tok.span,
        )?;
        self.push_type_symbol(name, id);
        Ok(())
    }

    // --- functions ------------------------------------------------------

    pub(crate) fn parse_extern_decl(&mut self) -> PResult<()> {
        self.bump();
        if !self.at_kw(Keyword::Fn) {
            let tok = self.tok();
            self.diags.error(
                Code::UnexpectedToken,
                tok.span,
                "expected `fn` after `extern`",
            );
            return Err(Poisoned);
        }
        self.parse_fn_decl(true)
    }

    pub(crate) fn parse_fn_decl(&mut self, external: bool) -> PResult<()> {
        self.bump();
        let name_tok = self.expect_ident("the function name")?;
        let name = self.lexeme(name_tok.span);

        let open = self.expect(TokenKind::LParen, "to open the parameter list")?;
        self.skip_layout();

        let mut params: Vec<(&'a str, Ty)> = Vec::new();
        while self.tok().kind != TokenKind::RParen {
            if self.tok().kind == TokenKind::Eof {
                self.diags.error(
                    Code::MissingDelimiter,
                    open.span,
                    "unclosed parameter list",
                );
                return Err(Poisoned);
            }
            let pname_tok = self.expect_ident("a parameter name")?;
            let pname = self.lexeme(pname_tok.span);
            self.expect(TokenKind::Colon, "after the parameter name")?;
            let ty = self.parse_type(TypeCtx::TopLevel)?;
            if params.iter().any(|(n, _)| *n == pname) {
                self.diags.error(
                    Code::Redeclaration,
                    pname_tok.span,
                    format!("duplicate parameter `{pname}`"),
                );
                return Err(Poisoned);
            }
            params.push((pname, ty));
            if self.eat(TokenKind::Comma) {
                self.skip_layout();
            }
            self.skip_layout();
        }
        self.bump();

        let ret = if self.eat(TokenKind::Arrow) {
            self.parse_type_full(TypeCtx::TopLevel, true)?
        } else {
            vec![Level::new(LevelKind::Void)]
        };

        let mut sig_params = Vec::with_capacity(params.len());
        for (pname, ty) in &params {
            let r = self.intern_type(ty, name_tok.span)?;
            sig_params.push((*pname, r));
        }
        let ret_ref = self.intern_type(&ret, name_tok.span)?;
        let sig = FnSigDef {
            params: sig_params,
            ret: ret_ref,
        };

        if external {
            let ext_id = self.next_extern;
            self.next_extern += 1;
            if let Some(resolver) = self.resolver.as_mut() {
                if resolver(name).is_none() {
                    self.diags.error(
                        Code::UnresolvedExternal,
                        name_tok.span,
                        format!("the host does not provide `{name}`"),
                    );
                }
            }
            self.declare_user(
                name,
                UserDef::Fn(FnDef {
                    sig,
                    external: Some(ext_id),
                    loc: None,
                }),
                name_tok.span,
            )?;
            self.symbols.push(Symbol {
                name: name.to_string(),
                kind: SymbolKind::ExternFunction,
                location: ext_id as u32,
            });
            return self.expect_line_end();
        }

        if !self.tok().kind.is_separator() {
            // A bodyless signature at end of input is still a signature.
            if matches!(self.tok().kind, TokenKind::Eof | TokenKind::IndentDown) {
                let id = self.declare_user(name, UserDef::FnSig(sig), name_tok.span)?;
                self.push_type_symbol(name, id);
                return Ok(());
            }
            return self.expect_line_end();
        }
        self.bump();

        if self.tok().kind != TokenKind::IndentUp {
            // No body: the name becomes a function-pointer signature.
            let id = self.declare_user(name, UserDef::FnSig(sig), name_tok.span)?;
            self.push_type_symbol(name, id);
            return Ok(());
        }

        let loc = self.code.len() as u32;
        self.declare_user(
            name,
            UserDef::Fn(FnDef {
                sig,
                external: None,
                loc: Some(loc),
            }),
            name_tok.span,
        )?;
        self.symbols.push(Symbol {
            name: name.to_string(),
            kind: SymbolKind::Function,
            location: loc,
        });
        debug!("compiling function `{name}` at code offset {loc}");

        self.ret_ty = Some(ret);
        self.scopes.enter();
        for (pname, ty) in params {
            let size = self.registry.size_of(&ty);
            let align = self.registry.align_of(&ty);
            let offset = self.scopes.alloc_stack(size, align);
            if let Err(err) = self
                .scopes
                .declare(pname, ty, Loc::direct(Place::Stack(offset)))
            {
                self.report_bind_error(err, pname, name_tok.span);
            }
        }
        self.parse_block();
        self.scopes.exit();
        self.ret_ty = None;
        Ok(())
    }

    // --- globals --------------------------------------------------------

    pub(crate) fn parse_global_decl(&mut self) -> PResult<()> {
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
        let offset = align_up(self.data_len, align.max(1));
        self.data_len = offset + size;

        if let Err(err) = self
            .scopes
            .declare(name, ty, Loc::direct(Place::Data(offset as u32)))
        {
            self.report_bind_error(err, name, name_tok.span);
            return Err(Poisoned);
        }
        self.symbols.push(Symbol {
            name: name.to_string(),
            kind: SymbolKind::Global,
            location: offset as u32,
        });
        self.expect_line_end()
    }

    /// Resolve a `let` binding's type from its annotation and initializer,
    /// checking the initializer against the annotation when both exist.
    pub(crate) fn binding_type(
        &mut self,
        at: Span,
        annotated: Option<Ty>,
        init: Option<crate::eval::Value>,
    ) -> PResult<Ty> {
        let ty = match (annotated, init) {
            (Some(ty), Some(value)) => {
                if !self.registry.can_convert(&value.ty, &ty) {
                    self.type_mismatch(value.span, &value.ty, &ty);
                    return Err(Poisoned);
                }
                ty
            }
            (Some(ty), None) => ty,
            (None, Some(value)) => {
                // Inferred bindings take the declaration default: mutable.
                let mut ty = value.ty;
                ty[0].mutable = true;
                ty
            }
            (None, None) => {
                self.diags.error(
                    Code::UnexpectedToken,
                    at,
                    "a binding needs a type annotation or an initializer",
                );
                return Err(Poisoned);
            }
        };
        if ty[0].kind == LevelKind::Void {
            self.diags
                .error(Code::InvalidOperands, at, "cannot bind a void value");
            return Err(Poisoned);
        }
        Ok(ty)
    }

    // --- shared helpers -------------------------------------------------

    pub(crate) fn skip_layout(&mut self) {
        while self.tok().kind.is_layout() {
            self.bump();
        }
    }

    pub(crate) fn declare_user(
        &mut self,
        name: &'a str,
        def: UserDef<'a>,
        span: Span,
    ) -> PResult<UserId> {
        match self.registry.declare(name, def) {
            Ok(id) => Ok(id),
            Err(DeclareError::Exhausted) => {
                self.diags.error(
                    Code::UserTypesExhausted,
                    span,
                    DeclareError::Exhausted.to_string(),
                );
                Err(Poisoned)
            }
            Err(err) => {
                self.diags
                    .error(Code::Redeclaration, span, format!("`{name}`: {err}"));
                Err(Poisoned)
            }
        }
    }

    pub(crate) fn report_bind_error(&mut self, err: BindError, name: &str, span: Span) {
        match err {
            BindError::Shadowed => self.diags.error(
                Code::Redeclaration,
                span,
                format!("`{name}` is already bound in this scope"),
            ),
            BindError::Exhausted => {
                self.diags
                    .error(Code::ScopeExhausted, span, err.to_string())
            }
        }
    }

    pub(crate) fn type_mismatch(&mut self, span: Span, from: &[Level], to: &[Level]) {
        let from = crate::types::display(from, &self.registry);
        let to = crate::types::display(to, &self.registry);
        self.diags.error(
            Code::IllegalConversion,
            span,
            format!("`{from}` cannot convert to `{to}`"),
        );
    }

    fn push_type_symbol(&mut self, name: &'a str, id: UserId) {
        // A definition completing a forward declaration keeps the symbol
        // entry it already made.
        if self
            .symbols
            .iter()
            .any(|s| s.kind == SymbolKind::Type && s.name == name)
        {
            return;
        }
        self.symbols.push(Symbol {
            name: name.to_string(),
            kind: SymbolKind::Type,
            location: id as u32,
        });
    }
}
