//! The expression type-checker.
//!
//! A recursive-descent walk over the precedence ladder, computing the type
//! and value category of every expression without building a tree. The
//! single piece of state is the compiler's one-token lookahead plus the
//! minimum precedence of the current binary loop.
//!
//! Ladder, loosest to tightest: `if/then/else`, `=`, `||`, `&&`, `==`/`!=`,
//! orderings, `|`, `^`, `&`, shifts, `+`/`-`, `*`/`/`/`%`, `as` casts,
//! unary prefixes, the measurement builtins, postfix (member access, calls,
//! indexing), grouping and atoms.
//!
//! Failures poison the result: one located diagnostic at the point of
//! detection, then every caller passes the poison up with `?`, so a broken
//! sub-expression reports exactly once.

use crate::compiler::Compiler;
use crate::diagnostics::{Code, PResult, Poisoned};
use crate::lexer::{decode_escapes, parse_int_lexeme, Keyword, Token, TokenKind};
use crate::scope::{Loc, Place};
use crate::source::Span;
use crate::types::parse::TypeCtx;
use crate::types::user::{UserDef, UserId};
use crate::types::{
    arithmetic_conversion, is_arithmetic, pod, promote, strip_level, Level, LevelKind, Pod, Ty,
};

/// Whether an expression's address is known. The scope id of an L-value is
/// the block depth of the binding it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    RValue,
    LValue { scope: u32 },
}

/// A type-checked expression result.
#[derive(Debug, Clone)]
pub struct Value {
    pub ty: Ty,
    pub loc: Loc,
    pub cat: Category,
    pub span: Span,
}

impl Value {
    pub(crate) fn rvalue(ty: Ty, span: Span) -> Self {
        Self {
            ty,
            loc: Loc::reg(),
            cat: Category::RValue,
            span,
        }
    }

    pub fn is_lvalue(&self) -> bool {
        matches!(self.cat, Category::LValue { .. })
    }

    fn inherited_scope(&self) -> u32 {
        match self.cat {
            Category::LValue { scope } => scope,
            Category::RValue => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BitOr,
    BitXor,
    BitAnd,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinOp {
    fn from_token(kind: TokenKind) -> Option<BinOp> {
        Some(match kind {
            TokenKind::PipePipe => BinOp::Or,
            TokenKind::AmpAmp => BinOp::And,
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::BangEq => BinOp::Ne,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Le => BinOp::Le,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Ge => BinOp::Ge,
            TokenKind::Pipe => BinOp::BitOr,
            TokenKind::Caret => BinOp::BitXor,
            TokenKind::Amp => BinOp::BitAnd,
            TokenKind::Shl => BinOp::Shl,
            TokenKind::Shr => BinOp::Shr,
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::Percent => BinOp::Rem,
            _ => return None,
        })
    }

    fn prec(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Eq | BinOp::Ne => 3,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 4,
            BinOp::BitOr => 5,
            BinOp::BitXor => 6,
            BinOp::BitAnd => 7,
            BinOp::Shl | BinOp::Shr => 8,
            BinOp::Add | BinOp::Sub => 9,
            BinOp::Mul | BinOp::Div | BinOp::Rem => 10,
        }
    }
}

impl<'a> Compiler<'a> {
    /// Type-check one full expression.
    pub(crate) fn eval(&mut self) -> PResult<Value> {
        let span = self.tok().span;
        self.enter_nesting(span)?;
        let result = if self.at_kw(Keyword::If) {
            self.eval_if()
        } else {
            self.eval_assign()
        };
        self.leave_nesting();
        result
    }

    /// `if C then A else B`: both branches must unify arithmetically or be
    /// structurally equal.
    fn eval_if(&mut self) -> PResult<Value> {
        let start = self.tok().span;
        self.bump();
        let cond = self.eval()?;
        if !self.registry.can_convert(&cond.ty, &pod(Pod::Bool)) {
            self.type_mismatch(cond.span, &cond.ty, &pod(Pod::Bool));
            return Err(Poisoned);
        }
        if !self.eat_kw(Keyword::Then) {
            let tok = self.tok();
            self.diags.error(
                Code::UnexpectedToken,
                tok.span,
                format!("expected `then`, found {}", tok.kind.describe()),
            );
            return Err(Poisoned);
        }
        let on_true = self.eval()?;
        if !self.eat_kw(Keyword::Else) {
            let tok = self.tok();
            self.diags.error(
                Code::UnexpectedToken,
                tok.span,
                format!("expected `else`, found {}", tok.kind.describe()),
            );
            return Err(Poisoned);
        }
        let on_false = self.eval()?;
        let span = start.merge(&on_false.span);

        if let Some(level) = arithmetic_conversion(&on_true.ty, &on_false.ty) {
            return Ok(Value::rvalue(vec![level], span));
        }
        if self.registry.equals(&on_true.ty, &on_false.ty, true) {
            return Ok(Value::rvalue(on_true.ty, span));
        }
        self.invalid_operand(span, "the branches of a conditional must have the same type");
        Err(Poisoned)
    }

    /// `=` binds loosest and to the right; the target must be a mutable
    /// L-value and the result is an R-value of the target's type.
    fn eval_assign(&mut self) -> PResult<Value> {
        let lhs = self.eval_binary(0)?;
        if self.tok().kind != TokenKind::Eq {
            return Ok(lhs);
        }
        self.bump();
        let rhs = if self.at_kw(Keyword::If) {
            self.eval_if()?
        } else {
            self.eval_assign()?
        };

        if !lhs.is_lvalue() {
            self.diags.error(
                Code::NotAssignable,
                lhs.span,
                "the left side of `=` is not assignable",
            );
            return Err(Poisoned);
        }
        if !lhs.ty[0].mutable {
            self.diags.error_with_note(
                Code::AssignToConst,
                lhs.span,
                "cannot assign through a const binding",
                "not mutable",
            );
            return Err(Poisoned);
        }
        if !self.registry.can_convert(&rhs.ty, &lhs.ty) {
            self.type_mismatch(rhs.span, &rhs.ty, &lhs.ty);
            return Err(Poisoned);
        }
        let span = lhs.span.merge(&rhs.span);
        Ok(Value::rvalue(lhs.ty, span))
    }

    fn eval_binary(&mut self, min_prec: u8) -> PResult<Value> {
        let mut lhs = self.eval_operand()?;
        loop {
            let Some(op) = BinOp::from_token(self.tok().kind) else {
                break;
            };
            if op.prec() < min_prec {
                break;
            }
            self.bump();
            let rhs = self.eval_binary(op.prec() + 1)?;
            lhs = self.apply_binary(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn apply_binary(&mut self, op: BinOp, lhs: Value, rhs: Value) -> PResult<Value> {
        use BinOp::*;

        let span = lhs.span.merge(&rhs.span);
        let ty: Ty = match op {
            Or | And => {
                let ok = self.registry.can_convert(&lhs.ty, &pod(Pod::Bool))
                    && self.registry.can_convert(&rhs.ty, &pod(Pod::Bool));
                if !ok {
                    self.invalid_operand(
                        span,
                        "both sides of a logical operator must convert to bool",
                    );
                    return Err(Poisoned);
                }
                pod(Pod::Bool)
            }
            Eq | Ne => {
                if arithmetic_conversion(&lhs.ty, &rhs.ty).is_none() {
                    let comparable = self.registry.equals(&lhs.ty, &rhs.ty, true)
                        && matches!(
                            lhs.ty[0].kind,
                            LevelKind::Ref | LevelKind::Ptr | LevelKind::Pfn(_)
                        );
                    if !comparable {
                        self.invalid_operand(span, "these types cannot be compared");
                        return Err(Poisoned);
                    }
                }
                pod(Pod::Bool)
            }
            Lt | Le | Gt | Ge => {
                if arithmetic_conversion(&lhs.ty, &rhs.ty).is_none() {
                    self.invalid_operand(span, "ordering comparisons need arithmetic operands");
                    return Err(Poisoned);
                }
                pod(Pod::Bool)
            }
            BitOr | BitXor | BitAnd | Shl | Shr => {
                let Some(level) = arithmetic_conversion(&lhs.ty, &rhs.ty) else {
                    self.invalid_operand(span, "bitwise operators need integer operands");
                    return Err(Poisoned);
                };
                let integer = matches!(level.kind, LevelKind::Pod(p) if p.is_integer());
                if !integer {
                    self.invalid_operand(span, "bitwise operators need integer operands");
                    return Err(Poisoned);
                }
                vec![level]
            }
            Add | Sub | Mul | Div | Rem => {
                let Some(level) = arithmetic_conversion(&lhs.ty, &rhs.ty) else {
                    self.invalid_operand(span, "arithmetic needs arithmetic operands");
                    return Err(Poisoned);
                };
                vec![level]
            }
        };
        Ok(Value::rvalue(ty, span))
    }

    /// A prefix chain plus any trailing `as` casts.
    fn eval_operand(&mut self) -> PResult<Value> {
        let mut value = self.eval_prefix()?;
        while self.at_kw(Keyword::As) {
            self.bump();
            let ty = self.parse_type(TypeCtx::TopLevel)?;
            let ok = (is_arithmetic(&value.ty) && is_arithmetic(&ty))
                || self.registry.can_convert(&value.ty, &ty);
            if !ok {
                self.type_mismatch(value.span, &value.ty, &ty);
                return Err(Poisoned);
            }
            value = Value::rvalue(ty, value.span);
        }
        Ok(value)
    }

    fn eval_prefix(&mut self) -> PResult<Value> {
        let tok = self.tok();
        match tok.kind {
            TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Bang
            | TokenKind::Tilde
            | TokenKind::Amp
            | TokenKind::Star => {}
            _ => return self.eval_builtin(),
        }
        self.enter_nesting(tok.span)?;
        let result = self.eval_prefix_inner(tok);
        self.leave_nesting();
        result
    }

    fn eval_prefix_inner(&mut self, op_tok: Token) -> PResult<Value> {
        self.bump();

        // A sign glued onto an integer literal takes part in choosing the
        // literal's type, so `-1` stays i32 and `-3000000000` finds i64.
        if op_tok.kind == TokenKind::Minus && self.tok().kind == TokenKind::Int {
            return self.eval_int_literal(true, op_tok.span);
        }

        let value = self.eval_prefix()?;
        let span = op_tok.span.merge(&value.span);
        match op_tok.kind {
            TokenKind::Plus | TokenKind::Minus => {
                let Some(p) = promote(&value.ty) else {
                    self.invalid_operand(span, "unary arithmetic needs an arithmetic operand");
                    return Err(Poisoned);
                };
                Ok(Value::rvalue(pod(p), span))
            }
            TokenKind::Tilde => {
                let Some(p) = promote(&value.ty).filter(|p| p.is_integer()) else {
                    self.invalid_operand(span, "`~` needs an integer operand");
                    return Err(Poisoned);
                };
                Ok(Value::rvalue(pod(p), span))
            }
            TokenKind::Bang => {
                if !self.registry.can_convert(&value.ty, &pod(Pod::Bool)) {
                    self.invalid_operand(span, "`!` needs an operand convertible to bool");
                    return Err(Poisoned);
                }
                Ok(Value::rvalue(pod(Pod::Bool), span))
            }
            TokenKind::Amp => {
                if !value.is_lvalue() {
                    self.invalid_operand(span, "cannot take the address of a temporary");
                    return Err(Poisoned);
                }
                let mut ty = Ty::with_capacity(value.ty.len() + 1);
                ty.push(Level::with_mut(LevelKind::Ref, value.ty[0].mutable));
                ty.extend_from_slice(&value.ty);
                Ok(Value::rvalue(ty, span))
            }
            TokenKind::Star => {
                if value.ty[0].kind != LevelKind::Ptr {
                    self.invalid_operand(span, "can only dereference a pointer");
                    return Err(Poisoned);
                }
                Ok(Value {
                    ty: strip_level(&value.ty).to_vec(),
                    loc: value.loc.through(),
                    cat: Category::LValue {
                        scope: value.inherited_scope(),
                    },
                    span,
                })
            }
            _ => unreachable!("filtered in eval_prefix"),
        }
    }

    /// `lenof`, `sizeof`, `alignof`, `typeof`. The measurement builtins take
    /// either a type or a value; `typeof` passes its operand through.
    fn eval_builtin(&mut self) -> PResult<Value> {
        let builtin = match self.kw() {
            Some(k @ (Keyword::Lenof | Keyword::Sizeof | Keyword::Alignof | Keyword::Typeof)) => k,
            _ => return self.eval_postfix(),
        };
        let kw_tok = self.tok();
        self.bump();
        self.expect(TokenKind::LParen, "after the builtin name")?;

        let result = match builtin {
            Keyword::Lenof => {
                let value = self.eval()?;
                if !matches!(value.ty[0].kind, LevelKind::Arr(_) | LevelKind::Slice) {
                    self.invalid_operand(value.span, "`lenof` needs an array or slice");
                    return Err(Poisoned);
                }
                Value::rvalue(pod(Pod::USize), kw_tok.span)
            }
            Keyword::Sizeof | Keyword::Alignof => {
                if self.starts_type() {
                    self.parse_type(TypeCtx::TopLevel)?;
                } else {
                    self.eval()?;
                }
                Value::rvalue(pod(Pod::USize), kw_tok.span)
            }
            Keyword::Typeof => self.eval()?,
            _ => unreachable!("filtered above"),
        };
        self.expect(TokenKind::RParen, "to close the builtin argument")?;
        Ok(result)
    }

    /// Does the current token open a type expression rather than a value?
    /// `&` and `*` stay expressions; a type behind indirection can always be
    /// named through a typedef.
    fn starts_type(&self) -> bool {
        match self.tok().kind {
            TokenKind::LBracket => true,
            TokenKind::Ident => {
                let lexeme = self.lexeme(self.tok().span);
                if matches!(
                    Keyword::from_lexeme(lexeme),
                    Some(Keyword::Const | Keyword::Mut)
                ) {
                    return true;
                }
                if Pod::from_name(lexeme).is_some() || self.tmpl_params.contains(&lexeme) {
                    return true;
                }
                self.registry
                    .lookup(lexeme)
                    .map(|id| {
                        matches!(
                            self.registry.get(id).def,
                            UserDef::Struct(_)
                                | UserDef::Enum(_)
                                | UserDef::Typedef(_)
                                | UserDef::Forward
                                | UserDef::FnSig(_)
                        )
                    })
                    .unwrap_or(false)
            }
            _ => false,
        }
    }

    fn eval_postfix(&mut self) -> PResult<Value> {
        let mut value = self.eval_atom()?;
        loop {
            match self.tok().kind {
                TokenKind::Dot => value = self.eval_member(value, false)?,
                TokenKind::Arrow => value = self.eval_member(value, true)?,
                TokenKind::LBracket => value = self.eval_index(value)?,
                TokenKind::LParen => value = self.eval_call(value)?,
                _ => return Ok(value),
            }
        }
    }

    /// `.` auto-dereferences one reference; `->` demands a pointer. The
    /// member's effective mutability follows the aggregate it was read from.
    fn eval_member(&mut self, base: Value, arrow: bool) -> PResult<Value> {
        self.bump();
        let name_tok = self.expect_ident("the member name")?;
        let name = self.lexeme(name_tok.span);
        let span = base.span.merge(&name_tok.span);

        let (ty, loc, cat) = if arrow {
            if base.ty[0].kind != LevelKind::Ptr {
                self.invalid_operand(span, "`->` needs a pointer to a struct");
                return Err(Poisoned);
            }
            (
                strip_level(&base.ty).to_vec(),
                base.loc.through(),
                Category::LValue {
                    scope: base.inherited_scope(),
                },
            )
        } else if base.ty[0].kind == LevelKind::Ref {
            (
                strip_level(&base.ty).to_vec(),
                base.loc.through(),
                Category::LValue {
                    scope: base.inherited_scope(),
                },
            )
        } else {
            (base.ty.clone(), base.loc, base.cat)
        };

        let LevelKind::Struct(id) = ty[0].kind else {
            self.invalid_operand(
                span,
                if arrow {
                    "`->` needs a pointer to a struct"
                } else {
                    "`.` needs a struct value"
                },
            );
            return Err(Poisoned);
        };
        let Some(member) = self.registry.member_of(id, name) else {
            let owner = self.registry.name_of(id);
            self.diags.error(
                Code::UnknownMember,
                name_tok.span,
                format!("no member `{name}` on `{owner}`"),
            );
            return Err(Poisoned);
        };

        let mut member_ty = self.registry.ty_vec(member.ty);
        member_ty[0].mutable = ty[0].mutable;
        Ok(Value {
            ty: member_ty,
            loc,
            cat,
            span,
        })
    }

    fn eval_index(&mut self, base: Value) -> PResult<Value> {
        self.bump();
        let index = self.eval()?;
        let close = self.expect(TokenKind::RBracket, "to close the index")?;
        let span = base.span.merge(&close.span);

        let integer = matches!(promote(&index.ty), Some(p) if p.is_integer());
        if !integer {
            self.invalid_operand(index.span, "an index must be an integer");
            return Err(Poisoned);
        }

        match base.ty[0].kind {
            LevelKind::Arr(_) => {
                let mut ty = strip_level(&base.ty).to_vec();
                ty[0].mutable = base.ty[0].mutable;
                Ok(Value {
                    ty,
                    loc: base.loc,
                    cat: base.cat,
                    span,
                })
            }
            LevelKind::Slice | LevelKind::ArrPtr => Ok(Value {
                ty: strip_level(&base.ty).to_vec(),
                loc: base.loc.through(),
                cat: Category::LValue {
                    scope: base.inherited_scope(),
                },
                span,
            }),
            _ => {
                self.invalid_operand(span, "can only index arrays, slices and array pointers");
                Err(Poisoned)
            }
        }
    }

    /// A call through a function or function pointer: each argument must
    /// convert to its parameter, and the count must match exactly.
    fn eval_call(&mut self, callee: Value) -> PResult<Value> {
        let open = self.tok();
        let LevelKind::Pfn(id) = callee.ty[0].kind else {
            self.invalid_operand(callee.span, "this value is not callable");
            return Err(Poisoned);
        };
        let Some(sig) = self.registry.signature_of(id).cloned() else {
            self.invalid_operand(callee.span, "this value is not callable");
            return Err(Poisoned);
        };

        self.bump_significant();
        let mut argc = 0usize;
        loop {
            self.skip_layout();
            if self.tok().kind == TokenKind::RParen {
                break;
            }
            if self.tok().kind == TokenKind::Eof {
                self.diags.error(
                    Code::MissingDelimiter,
                    open.span,
                    "unclosed argument list",
                );
                return Err(Poisoned);
            }
            let arg = self.eval()?;
            if let Some((_, param)) = sig.params.get(argc) {
                let param_ty = self.registry.ty_vec(*param);
                if !self.registry.can_convert(&arg.ty, &param_ty) {
                    self.type_mismatch(arg.span, &arg.ty, &param_ty);
                    return Err(Poisoned);
                }
            }
            argc += 1;
            if self.tok().kind == TokenKind::Comma {
                self.bump_significant();
            }
        }
        let close = self.tok();
        self.bump();

        if argc != sig.params.len() {
            self.diags.error(
                Code::WrongArgCount,
                callee.span.merge(&close.span),
                format!("expected {} argument(s), found {argc}", sig.params.len()),
            );
            return Err(Poisoned);
        }
        let ret = self.registry.ty_vec(sig.ret);
        Ok(Value::rvalue(ret, callee.span.merge(&close.span)))
    }

    fn eval_atom(&mut self) -> PResult<Value> {
        let tok = self.tok();
        match tok.kind {
            TokenKind::Int => self.eval_int_literal(false, tok.span),
            TokenKind::Float => {
                let f32_suffix = self.lexeme(tok.span).ends_with('f');
                self.bump();
                Ok(Value::rvalue(
                    pod(if f32_suffix { Pod::F32 } else { Pod::F64 }),
                    tok.span,
                ))
            }
            TokenKind::Str => self.eval_str_literal(tok),
            TokenKind::Char => self.eval_char_literal(tok),
            TokenKind::LParen => {
                self.bump_significant();
                let value = self.eval()?;
                self.expect(TokenKind::RParen, "to close the grouping")?;
                Ok(value)
            }
            TokenKind::Ident => self.eval_ident(tok),
            // The lexer already reported this token; just pass the poison.
            TokenKind::Error => {
                self.bump();
                Err(Poisoned)
            }
            _ => {
                self.diags.error(
                    Code::UnexpectedToken,
                    tok.span,
                    format!("expected an expression, found {}", tok.kind.describe()),
                );
                Err(Poisoned)
            }
        }
    }

    fn eval_ident(&mut self, tok: Token) -> PResult<Value> {
        let name = self.lexeme(tok.span);

        match Keyword::from_lexeme(name) {
            Some(Keyword::True | Keyword::False) => {
                self.bump();
                return Ok(Value::rvalue(pod(Pod::Bool), tok.span));
            }
            Some(Keyword::If) => return self.eval_if(),
            Some(_) => {
                self.diags.error(
                    Code::UnexpectedToken,
                    tok.span,
                    format!("the keyword `{name}` is not valid in an expression"),
                );
                return Err(Poisoned);
            }
            None => {}
        }

        if let Some(binding) = self.scopes.lookup(name) {
            let value = Value {
                ty: binding.ty.clone(),
                loc: binding.loc,
                cat: Category::LValue {
                    scope: binding.scope,
                },
                span: tok.span,
            };
            self.bump();
            return Ok(value);
        }

        if let Some(id) = self.registry.lookup(name) {
            match &self.registry.get(id).def {
                UserDef::Fn(f) => {
                    let place = match f.external {
                        Some(ext) => Place::Data(ext as u32),
                        None => Place::PcRel(f.loc.unwrap_or(0)),
                    };
                    self.bump();
                    return Ok(Value {
                        ty: vec![Level::new(LevelKind::Pfn(id))],
                        loc: Loc::direct(place),
                        cat: Category::RValue,
                        span: tok.span,
                    });
                }
                // A bodyless declaration is callable; its code offset is
                // filled in when the definition arrives.
                UserDef::FnSig(_) => {
                    self.bump();
                    return Ok(Value {
                        ty: vec![Level::new(LevelKind::Pfn(id))],
                        loc: Loc::direct(Place::PcRel(0)),
                        cat: Category::RValue,
                        span: tok.span,
                    });
                }
                UserDef::Struct(_) => {
                    self.bump();
                    if self.tok().kind == TokenKind::LBrace {
                        return self.eval_struct_literal(id, tok);
                    }
                    self.diags.error(
                        Code::UndefinedReference,
                        tok.span,
                        format!("`{name}` is a type, not a value"),
                    );
                    return Err(Poisoned);
                }
                _ => {
                    self.diags.error(
                        Code::UndefinedReference,
                        tok.span,
                        format!("`{name}` is a type, not a value"),
                    );
                    return Err(Poisoned);
                }
            }
        }

        self.diags.error(
            Code::UndefinedReference,
            tok.span,
            format!("use of undeclared identifier `{name}`"),
        );
        Err(Poisoned)
    }

    /// `Name{ field: expr, ... }`. Fields may come in any order; each is
    /// checked against its member type and duplicates are rejected.
    fn eval_struct_literal(&mut self, id: UserId, name_tok: Token) -> PResult<Value> {
        let open = self.tok();
        self.bump_significant();
        let mut seen: Vec<&str> = Vec::new();

        loop {
            self.skip_layout();
            if self.tok().kind == TokenKind::RBrace {
                break;
            }
            if self.tok().kind == TokenKind::Eof {
                self.diags.error(
                    Code::MissingDelimiter,
                    open.span,
                    "unclosed struct literal",
                );
                return Err(Poisoned);
            }
            let field_tok = self.expect_ident("a field name")?;
            let field = self.lexeme(field_tok.span);
            self.expect(TokenKind::Colon, "after the field name")?;
            let value = self.eval()?;

            let Some(member) = self.registry.member_of(id, field) else {
                let owner = self.registry.name_of(id);
                self.diags.error(
                    Code::UnknownMember,
                    field_tok.span,
                    format!("no member `{field}` on `{owner}`"),
                );
                return Err(Poisoned);
            };
            let member_ty = self.registry.ty_vec(member.ty);
            if seen.contains(&field) {
                self.diags.error(
                    Code::Redeclaration,
                    field_tok.span,
                    format!("field `{field}` is set twice"),
                );
                return Err(Poisoned);
            }
            seen.push(field);
            if !self.registry.can_convert(&value.ty, &member_ty) {
                self.type_mismatch(value.span, &value.ty, &member_ty);
                return Err(Poisoned);
            }
            if self.tok().kind == TokenKind::Comma {
                self.bump_significant();
            }
        }
        let close = self.tok();
        self.bump();

        Ok(Value::rvalue(
            vec![Level::new(LevelKind::Struct(id))],
            name_tok.span.merge(&close.span),
        ))
    }

    /// Pick the smallest fitting type for an integer literal: decimal tries
    /// i32, u32, i64 then u64; hex prefers unsigned; a leading minus tries
    /// the signed ranks only.
    pub(crate) fn eval_int_literal(&mut self, negative: bool, start: Span) -> PResult<Value> {
        let tok = self.tok();
        let span = start.merge(&tok.span);
        let Some((value, hex)) = parse_int_lexeme(self.lexeme(tok.span)) else {
            self.diags.error(
                Code::MalformedNumber,
                span,
                "integer literal is out of range",
            );
            return Err(Poisoned);
        };
        self.bump();

        let chosen = if negative {
            if value > i64::MAX as u64 + 1 {
                self.diags.error(
                    Code::MalformedNumber,
                    span,
                    "integer literal is out of range",
                );
                return Err(Poisoned);
            }
            let v = -(value as i128);
            if v >= i32::MIN as i128 {
                Pod::I32
            } else {
                Pod::I64
            }
        } else if hex {
            if value <= u32::MAX as u64 {
                Pod::U32
            } else {
                Pod::U64
            }
        } else if value <= i32::MAX as u64 {
            Pod::I32
        } else if value <= u32::MAX as u64 {
            Pod::U32
        } else if value <= i64::MAX as u64 {
            Pod::I64
        } else {
            Pod::U64
        };
        Ok(Value::rvalue(pod(chosen), span))
    }

    /// A string literal is a char array over its decoded bytes; the bytes
    /// land in the constant area of the code buffer.
    fn eval_str_literal(&mut self, tok: Token) -> PResult<Value> {
        let decoded = match decode_escapes(self.lexeme(tok.span)) {
            Ok(s) => s,
            Err(err) => {
                self.diags.error(
                    Code::BadEscape,
                    Span::new(tok.span.start + err.offset, 2),
                    "unknown escape sequence",
                );
                self.bump();
                return Err(Poisoned);
            }
        };
        self.bump();

        let offset = match self.code.write(decoded.as_bytes()) {
            Ok(offset) => offset,
            Err(err) => {
                self.diags
                    .error(Code::CodeBufferOverflow, tok.span, err.to_string());
                0
            }
        };
        let ty = vec![
            Level::new(LevelKind::Arr(decoded.len() as u32)),
            Level::new(LevelKind::Pod(Pod::Char)),
        ];
        Ok(Value {
            ty,
            loc: Loc::direct(Place::Data(offset)),
            cat: Category::RValue,
            span: tok.span,
        })
    }

    /// One-byte characters are `char`; any other scalar types as `u32`.
    fn eval_char_literal(&mut self, tok: Token) -> PResult<Value> {
        let decoded = match decode_escapes(self.lexeme(tok.span)) {
            Ok(s) => s,
            Err(err) => {
                self.diags.error(
                    Code::BadEscape,
                    Span::new(tok.span.start + err.offset, 2),
                    "unknown escape sequence",
                );
                self.bump();
                return Err(Poisoned);
            }
        };
        self.bump();

        let mut chars = decoded.chars();
        let (Some(ch), None) = (chars.next(), chars.next()) else {
            self.diags.error(
                Code::BadCharLiteral,
                tok.span,
                "character literal must contain exactly one character",
            );
            return Err(Poisoned);
        };
        let chosen = if ch.is_ascii() { Pod::Char } else { Pod::U32 };
        Ok(Value::rvalue(pod(chosen), tok.span))
    }

    pub(crate) fn invalid_operand(&mut self, span: Span, message: &str) {
        self.diags.error(Code::InvalidOperands, span, message);
    }
}
