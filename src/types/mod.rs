//! The flat type encoding and its measurement machinery.
//!
//! A type is a finite run of [`Level`]s ending in a terminal: a POD, `void`,
//! `any`, or a user type referenced *by index* into the registry. The run is
//! flat and `Copy`-cheap, so types can be concatenated into one pool,
//! compared by a structural walk, and copied around without any pointer
//! fix-up. Each level carries a mutability bit; the default is supplied by
//! the context the type was written in.
//!
//! Anything that needs user-type information (sizes, alignments, equality of
//! function-pointer shapes) lives on [`Registry`] so the walk can chase
//! indices.

pub mod parse;
pub mod user;

use serde::{Deserialize, Serialize};

pub use user::{Registry, TypeRef, UserId};

/// Plain-old-data terminals, declared in conversion-rank order. The
/// discriminant doubles as the promotion rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Pod {
    Bool,
    Char,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    ISize,
    U64,
    USize,
    F32,
    F64,
}

impl Pod {
    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn size(self) -> usize {
        match self {
            Pod::Bool | Pod::Char | Pod::I8 | Pod::U8 => 1,
            Pod::I16 | Pod::U16 => 2,
            Pod::I32 | Pod::U32 | Pod::F32 => 4,
            Pod::I64 | Pod::U64 | Pod::ISize | Pod::USize | Pod::F64 => 8,
        }
    }

    pub fn align(self) -> usize {
        self.size()
    }

    pub fn is_float(self) -> bool {
        matches!(self, Pod::F32 | Pod::F64)
    }

    pub fn is_integer(self) -> bool {
        !self.is_float() && !matches!(self, Pod::Bool | Pod::Char)
    }

    pub fn name(self) -> &'static str {
        match self {
            Pod::Bool => "bool",
            Pod::Char => "char",
            Pod::I8 => "i8",
            Pod::U8 => "u8",
            Pod::I16 => "i16",
            Pod::U16 => "u16",
            Pod::I32 => "i32",
            Pod::U32 => "u32",
            Pod::I64 => "i64",
            Pod::ISize => "isize",
            Pod::U64 => "u64",
            Pod::USize => "usize",
            Pod::F32 => "f32",
            Pod::F64 => "f64",
        }
    }

    pub fn from_name(name: &str) -> Option<Pod> {
        Some(match name {
            "bool" => Pod::Bool,
            "char" => Pod::Char,
            "i8" => Pod::I8,
            "u8" => Pod::U8,
            "i16" => Pod::I16,
            "u16" => Pod::U16,
            "i32" => Pod::I32,
            "u32" => Pod::U32,
            "i64" => Pod::I64,
            "isize" => Pod::ISize,
            "u64" => Pod::U64,
            "usize" => Pod::USize,
            "f32" => Pod::F32,
            "f64" => Pod::F64,
            _ => return None,
        })
    }
}

/// One cell of the flat encoding. Indirections continue to the next level;
/// everything else terminates the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelKind {
    Ref,
    Ptr,
    /// Pointer to an owned array.
    ArrPtr,
    /// Reference plus length.
    Slice,
    /// In-place array of a compile-time length.
    Arr(u32),
    /// Wildcard pointee, legal only behind `&`, `*` or `&[]`.
    Any,
    Void,
    Pod(Pod),
    Struct(UserId),
    Enum(UserId),
    Pfn(UserId),
    /// Placeholder inside an unsubstituted generic typedef body. Must never
    /// appear in any other stored type.
    Template(u8),
}

impl LevelKind {
    pub fn is_indirection(self) -> bool {
        matches!(
            self,
            LevelKind::Ref | LevelKind::Ptr | LevelKind::ArrPtr | LevelKind::Slice
        )
    }
}

/// A level plus its mutability bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub kind: LevelKind,
    pub mutable: bool,
}

impl Level {
    pub fn new(kind: LevelKind) -> Self {
        Self {
            kind,
            mutable: false,
        }
    }

    pub fn mutable(kind: LevelKind) -> Self {
        Self {
            kind,
            mutable: true,
        }
    }

    pub fn with_mut(kind: LevelKind, mutable: bool) -> Self {
        Self { kind, mutable }
    }
}

/// An owned type encoding. Transient types (expression results, local
/// bindings) live as values of this; registered types are interned into the
/// registry pool and referenced by [`TypeRef`].
pub type Ty = Vec<Level>;

/// Shorthand for a one-level POD type.
pub fn pod(p: Pod) -> Ty {
    vec![Level::new(LevelKind::Pod(p))]
}

/// Number of cells the encoding starting at `levels[0]` occupies; where the
/// next type begins when encodings are laid out back to back.
pub fn encoded_len(levels: &[Level]) -> usize {
    let mut i = 0;
    loop {
        match levels[i].kind {
            k if k.is_indirection() => i += 1,
            LevelKind::Arr(_) => i += 1,
            _ => return i + 1,
        }
    }
}

/// Drop the outermost level, yielding the pointee/element type.
pub fn strip_level(levels: &[Level]) -> &[Level] {
    debug_assert!(levels[0].kind.is_indirection() || matches!(levels[0].kind, LevelKind::Arr(_)));
    &levels[1..]
}

pub fn is_arithmetic(levels: &[Level]) -> bool {
    matches!(levels[0].kind, LevelKind::Pod(_))
}

/// Arithmetic promotion: anything narrower than 32 bits widens to `i32`;
/// 32-bit and wider operands keep their type.
pub fn promote(levels: &[Level]) -> Option<Pod> {
    match levels[0].kind {
        LevelKind::Pod(p) if p.size() < 4 => Some(Pod::I32),
        LevelKind::Pod(p) => Some(p),
        _ => None,
    }
}

/// The usual arithmetic conversion: both operands promote, the higher rank
/// wins, and the result is const only when both operands are const.
pub fn arithmetic_conversion(a: &[Level], b: &[Level]) -> Option<Level> {
    let pa = promote(a)?;
    let pb = promote(b)?;
    let winner = if pa.rank() >= pb.rank() { pa } else { pb };
    Some(Level::with_mut(
        LevelKind::Pod(winner),
        a[0].mutable || b[0].mutable,
    ))
}

pub fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align > 0);
    value.div_ceil(align) * align
}

/// Render a type the way it is written in source, for diagnostics.
pub fn display(levels: &[Level], registry: &Registry) -> String {
    let mut out = String::new();
    let mut i = 0;
    loop {
        let level = &levels[i];
        if level.mutable {
            out.push_str("mut ");
        }
        match level.kind {
            LevelKind::Ref => out.push('&'),
            LevelKind::Ptr => out.push('*'),
            LevelKind::ArrPtr => out.push_str("*[]"),
            LevelKind::Slice => out.push_str("&[]"),
            LevelKind::Arr(n) => out.push_str(&format!("[{n}]")),
            LevelKind::Any => {
                out.push_str("any");
                return out;
            }
            LevelKind::Void => {
                out.push_str("void");
                return out;
            }
            LevelKind::Pod(p) => {
                out.push_str(p.name());
                return out;
            }
            LevelKind::Struct(id) | LevelKind::Enum(id) | LevelKind::Pfn(id) => {
                out.push_str(registry.name_of(id));
                return out;
            }
            LevelKind::Template(t) => {
                out.push_str(&format!("${t}"));
                return out;
            }
        }
        i += 1;
    }
}

impl Registry<'_> {
    /// Byte size of a value of this type.
    pub fn size_of(&self, levels: &[Level]) -> usize {
        match levels[0].kind {
            LevelKind::Pod(p) => p.size(),
            LevelKind::Void => 0,
            LevelKind::Ref | LevelKind::Ptr => match levels[1].kind {
                // References to `any` carry their pointee's type id.
                LevelKind::Any => 16,
                _ => 8,
            },
            LevelKind::ArrPtr => 16,
            LevelKind::Slice => match levels[1].kind {
                LevelKind::Any => 24,
                _ => 16,
            },
            LevelKind::Pfn(_) => 8,
            LevelKind::Arr(n) => n as usize * self.size_of(strip_level(levels)),
            LevelKind::Struct(id) => self.struct_layout(id).0,
            LevelKind::Enum(id) => self.enum_layout(id).0,
            LevelKind::Any | LevelKind::Template(_) => {
                debug_assert!(false, "sizing a bare wildcard or template level");
                0
            }
        }
    }

    /// Alignment of a value of this type, at least 1.
    pub fn align_of(&self, levels: &[Level]) -> usize {
        match levels[0].kind {
            LevelKind::Pod(p) => p.align(),
            LevelKind::Void => 1,
            LevelKind::Ref
            | LevelKind::Ptr
            | LevelKind::ArrPtr
            | LevelKind::Slice
            | LevelKind::Pfn(_) => 8,
            LevelKind::Arr(_) => self.align_of(strip_level(levels)),
            LevelKind::Struct(id) => self.struct_layout(id).1,
            LevelKind::Enum(id) => self.enum_layout(id).1,
            LevelKind::Any | LevelKind::Template(_) => 1,
        }
    }

    /// Structural equality. Function-pointer terminals with different ids
    /// still compare equal when their signatures have the same shape. With
    /// `ignore_quals` the mutability bits are not compared.
    pub fn equals(&self, a: &[Level], b: &[Level], ignore_quals: bool) -> bool {
        let mut i = 0;
        loop {
            let (la, lb) = (a[i], b[i]);
            if !ignore_quals && la.mutable != lb.mutable {
                return false;
            }
            match (la.kind, lb.kind) {
                (LevelKind::Pfn(x), LevelKind::Pfn(y)) => {
                    return x == y || self.signatures_match(x, y);
                }
                (ka, kb) if ka != kb => return false,
                (ka, _) if ka.is_indirection() => i += 1,
                (LevelKind::Arr(_), _) => i += 1,
                _ => return true,
            }
        }
    }

    fn signatures_match(&self, a: UserId, b: UserId) -> bool {
        let (Some(sa), Some(sb)) = (self.signature_of(a), self.signature_of(b)) else {
            return false;
        };
        if sa.params.len() != sb.params.len() {
            return false;
        }
        if !self.equals(self.ty(sa.ret), self.ty(sb.ret), false) {
            return false;
        }
        sa.params
            .iter()
            .zip(sb.params.iter())
            .all(|((_, pa), (_, pb))| self.equals(self.ty(*pa), self.ty(*pb), false))
    }

    /// True when `from` and `to` are structurally equal and no level below
    /// the outermost gains mutability going from `from` to `to`.
    pub fn cast_mutability(&self, from: &[Level], to: &[Level]) -> bool {
        if !self.equals(from, to, true) {
            return false;
        }
        let len = encoded_len(from);
        (1..len).all(|i| !to[i].mutable || from[i].mutable)
    }

    /// The implicit-conversion predicate used by the expression checker.
    pub fn can_convert(&self, from: &[Level], to: &[Level]) -> bool {
        if self.equals(from, to, false) {
            return true;
        }
        match (from[0].kind, to[0].kind) {
            // Arithmetic conversions are always available, bool included.
            (LevelKind::Pod(_), LevelKind::Pod(_)) => true,
            // A reference converts to bool by testing for null.
            (LevelKind::Ref, LevelKind::Pod(Pod::Bool)) => true,
            // An array widens into a longer array of the same element type.
            (LevelKind::Arr(n), LevelKind::Arr(m)) => {
                m >= n && self.equals(strip_level(from), strip_level(to), false)
            }
            (LevelKind::Ref, LevelKind::Ref)
            | (LevelKind::Ptr, LevelKind::Ptr)
            | (LevelKind::ArrPtr, LevelKind::ArrPtr)
            | (LevelKind::Slice, LevelKind::Slice)
            | (LevelKind::Struct(_), LevelKind::Struct(_))
            | (LevelKind::Enum(_), LevelKind::Enum(_))
            | (LevelKind::Pfn(_), LevelKind::Pfn(_)) => self.cast_mutability(from, to),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::user::UserDef;
    use super::*;

    fn reg() -> Registry<'static> {
        Registry::new()
    }

    #[test]
    fn test_encoded_len() {
        let t = vec![
            Level::new(LevelKind::Ref),
            Level::new(LevelKind::Arr(4)),
            Level::new(LevelKind::Pod(Pod::I32)),
        ];
        assert_eq!(encoded_len(&t), 3);
        assert_eq!(encoded_len(&pod(Pod::F64)), 1);
    }

    #[test]
    fn test_promotion() {
        assert_eq!(promote(&pod(Pod::I8)), Some(Pod::I32));
        assert_eq!(promote(&pod(Pod::Bool)), Some(Pod::I32));
        assert_eq!(promote(&pod(Pod::U32)), Some(Pod::U32));
        assert_eq!(promote(&pod(Pod::F32)), Some(Pod::F32));
        assert_eq!(promote(&pod(Pod::USize)), Some(Pod::USize));
        assert_eq!(promote(&[Level::new(LevelKind::Ref)]), None);
    }

    #[test]
    fn test_arithmetic_conversion_picks_higher_rank() {
        let r = arithmetic_conversion(&pod(Pod::I32), &pod(Pod::F64)).unwrap();
        assert_eq!(r.kind, LevelKind::Pod(Pod::F64));
        let r = arithmetic_conversion(&pod(Pod::I8), &pod(Pod::U8)).unwrap();
        assert_eq!(r.kind, LevelKind::Pod(Pod::I32));
    }

    #[test]
    fn test_arithmetic_conversion_transitive() {
        // can_convert between arithmetic types never fails, so transitivity
        // reduces to all three conversions existing.
        let reg = reg();
        let (a, b, c) = (pod(Pod::I8), pod(Pod::U32), pod(Pod::F64));
        assert!(reg.can_convert(&a, &b));
        assert!(reg.can_convert(&b, &c));
        assert!(reg.can_convert(&a, &c));
    }

    #[test]
    fn test_equals_reflexive_and_qualifier_aware() {
        let reg = reg();
        let t = vec![
            Level::mutable(LevelKind::Ref),
            Level::new(LevelKind::Pod(Pod::I32)),
        ];
        let u = vec![
            Level::mutable(LevelKind::Ref),
            Level::mutable(LevelKind::Pod(Pod::I32)),
        ];
        assert!(reg.equals(&t, &t, false));
        assert!(!reg.equals(&t, &u, false));
        assert!(reg.equals(&t, &u, true));
    }

    #[test]
    fn test_equals_array_length() {
        let reg = reg();
        let a4 = vec![
            Level::new(LevelKind::Arr(4)),
            Level::new(LevelKind::Pod(Pod::U8)),
        ];
        let a8 = vec![
            Level::new(LevelKind::Arr(8)),
            Level::new(LevelKind::Pod(Pod::U8)),
        ];
        assert!(!reg.equals(&a4, &a8, false));
        // Widening into the longer array is a conversion, not equality.
        assert!(reg.can_convert(&a4, &a8));
        assert!(!reg.can_convert(&a8, &a4));
    }

    #[test]
    fn test_mutability_cannot_increase_behind_a_ref() {
        let reg = reg();
        let const_ref = vec![
            Level::new(LevelKind::Ref),
            Level::new(LevelKind::Pod(Pod::I32)),
        ];
        let mut_ref = vec![
            Level::new(LevelKind::Ref),
            Level::mutable(LevelKind::Pod(Pod::I32)),
        ];
        assert!(reg.can_convert(&mut_ref, &const_ref));
        assert!(!reg.can_convert(&const_ref, &mut_ref));
    }

    #[test]
    fn test_ref_to_bool() {
        let reg = reg();
        let r = vec![
            Level::new(LevelKind::Ref),
            Level::new(LevelKind::Pod(Pod::F32)),
        ];
        assert!(reg.can_convert(&r, &pod(Pod::Bool)));
        assert!(!reg.can_convert(&r, &pod(Pod::I32)));
    }

    #[test]
    fn test_pfn_equality_by_shape() {
        let mut reg = Registry::new();
        let i32_ref = reg.intern(&pod(Pod::I32), false).unwrap();
        let sig_a = reg
            .declare(
                "FnA",
                UserDef::FnSig(user::FnSigDef {
                    params: vec![("x", i32_ref)],
                    ret: i32_ref,
                }),
            )
            .unwrap();
        let sig_b = reg
            .declare(
                "FnB",
                UserDef::FnSig(user::FnSigDef {
                    params: vec![("y", i32_ref)],
                    ret: i32_ref,
                }),
            )
            .unwrap();
        let ta = vec![Level::new(LevelKind::Pfn(sig_a))];
        let tb = vec![Level::new(LevelKind::Pfn(sig_b))];
        assert!(reg.equals(&ta, &tb, false));
    }

    #[test]
    fn test_sizes() {
        let reg = reg();
        let arr = vec![
            Level::new(LevelKind::Arr(3)),
            Level::new(LevelKind::Pod(Pod::U16)),
        ];
        assert_eq!(reg.size_of(&arr), 6);
        assert_eq!(reg.align_of(&arr), 2);
        let slice = vec![
            Level::new(LevelKind::Slice),
            Level::new(LevelKind::Pod(Pod::U8)),
        ];
        assert_eq!(reg.size_of(&slice), 16);
        let any_ref = vec![Level::new(LevelKind::Ref), Level::new(LevelKind::Any)];
        assert_eq!(reg.size_of(&any_ref), 16);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 4), 0);
        assert_eq!(align_up(1, 4), 4);
        assert_eq!(align_up(4, 4), 4);
        assert_eq!(align_up(9, 8), 16);
    }
}
