//! The user-type registry.
//!
//! One append-only table holds every named thing the source can declare:
//! structs, tagged enums, typedefs, function-pointer signatures and function
//! declarations. Entries reference each other and their component types by
//! small indices, never by pointer, so the table and the flat type pool can
//! grow without invalidating anything already handed out.
//!
//! Entries are immutable once inserted, with a single exception: a forward
//! declaration (or a bodyless signature, for functions) is replaced in place
//! by its full definition under the same index.

use std::fmt::Display;

use log::debug;

use crate::types::{Level, LevelKind, Ty};

/// Index of a user-type entry.
pub type UserId = u16;

/// A registered type encoding: a sub-range of the registry's flat pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeRef {
    pos: u32,
    len: u32,
}

/// Capacity of the flat type-level pool.
pub const TYPE_POOL_CAP: usize = 4096;
/// Capacity of the user-type table.
pub const USER_TYPE_CAP: usize = 512;

/// One struct member: name, type and byte offset inside the struct.
#[derive(Debug, Clone)]
pub struct Member<'src> {
    pub name: &'src str,
    pub ty: TypeRef,
    pub offset: usize,
}

#[derive(Debug, Clone, Default)]
pub struct StructDef<'src> {
    pub members: Vec<Member<'src>>,
    pub size: usize,
    pub align: usize,
    /// Set when this struct is the payload of an enum variant; such entries
    /// are hidden from name lookup.
    pub enum_owner: Option<UserId>,
}

#[derive(Debug, Clone)]
pub struct EnumDef {
    pub id_ty: TypeRef,
    pub variants: Vec<UserId>,
    pub size: usize,
    pub align: usize,
    /// Where variant payloads begin: the id, padded to the payload alignment.
    pub data_offset: usize,
}

#[derive(Debug, Clone)]
pub struct TypedefDef<'src> {
    /// Generic parameter names; empty for a plain alias.
    pub params: Vec<&'src str>,
    pub ty: TypeRef,
}

#[derive(Debug, Clone)]
pub struct FnSigDef<'src> {
    pub params: Vec<(&'src str, TypeRef)>,
    pub ret: TypeRef,
}

#[derive(Debug, Clone)]
pub struct FnDef<'src> {
    pub sig: FnSigDef<'src>,
    /// External dispatch id, when the function lives in the host.
    pub external: Option<u16>,
    /// Offset into the code buffer, once the body has been reached.
    pub loc: Option<u32>,
}

#[derive(Debug, Clone)]
pub enum UserDef<'src> {
    /// A name declared ahead of its definition.
    Forward,
    Struct(StructDef<'src>),
    Enum(EnumDef),
    Typedef(TypedefDef<'src>),
    FnSig(FnSigDef<'src>),
    Fn(FnDef<'src>),
}

impl UserDef<'_> {
    pub fn describe(&self) -> &'static str {
        match self {
            UserDef::Forward => "forward declaration",
            UserDef::Struct(_) => "struct",
            UserDef::Enum(_) => "enum",
            UserDef::Typedef(_) => "typedef",
            UserDef::FnSig(_) => "function signature",
            UserDef::Fn(_) => "function",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserType<'src> {
    pub name: &'src str,
    pub def: UserDef<'src>,
}

/// The type pool ran out of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolExhausted;

impl Display for PoolExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "type pool limit of {TYPE_POOL_CAP} levels reached")
    }
}

impl std::error::Error for PoolExhausted {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclareError {
    /// The name is taken and the existing entry is not replaceable.
    Duplicate,
    /// A function redeclaration whose signature differs from the forward
    /// declaration.
    SignatureMismatch,
    /// The user-type table is full.
    Exhausted,
}

impl Display for DeclareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeclareError::Duplicate => write!(f, "name is already defined"),
            DeclareError::SignatureMismatch => {
                write!(f, "signature does not match the earlier declaration")
            }
            DeclareError::Exhausted => {
                write!(f, "user type limit of {USER_TYPE_CAP} entries reached")
            }
        }
    }
}

impl std::error::Error for DeclareError {}

pub struct Registry<'src> {
    entries: Vec<UserType<'src>>,
    pool: Vec<Level>,
}

impl<'src> Registry<'src> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            pool: Vec::new(),
        }
    }

    /// Append a type encoding to the flat pool. Placeholder levels are only
    /// legal inside typedef bodies; everything else asserts their absence.
    pub fn intern(&mut self, levels: &[Level], allow_placeholders: bool) -> Result<TypeRef, PoolExhausted> {
        debug_assert!(
            allow_placeholders
                || !levels
                    .iter()
                    .any(|l| matches!(l.kind, LevelKind::Template(_))),
            "placeholder level escaped into a stored type"
        );
        if self.pool.len() + levels.len() > TYPE_POOL_CAP {
            return Err(PoolExhausted);
        }
        let pos = self.pool.len() as u32;
        self.pool.extend_from_slice(levels);
        Ok(TypeRef {
            pos,
            len: levels.len() as u32,
        })
    }

    /// The levels a [`TypeRef`] points at.
    pub fn ty(&self, r: TypeRef) -> &[Level] {
        &self.pool[r.pos as usize..(r.pos + r.len) as usize]
    }

    pub fn ty_vec(&self, r: TypeRef) -> Ty {
        self.ty(r).to_vec()
    }

    /// Find a visible entry by name. Variant payload structs and anonymous
    /// signatures do not take part in lookup.
    pub fn lookup(&self, name: &str) -> Option<UserId> {
        self.entries.iter().position(|e| {
            e.name == name
                && !name.is_empty()
                && !matches!(
                    &e.def,
                    UserDef::Struct(StructDef {
                        enum_owner: Some(_),
                        ..
                    })
                )
        }).map(|i| i as UserId)
    }

    pub fn get(&self, id: UserId) -> &UserType<'src> {
        &self.entries[id as usize]
    }

    pub fn name_of(&self, id: UserId) -> &'src str {
        self.entries[id as usize].name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Cells of the flat type pool in use.
    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (UserId, &UserType<'src>)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i as UserId, e))
    }

    /// Register `def` under `name`. A previous forward declaration is
    /// replaced in place; a bodyless function signature is completed by a
    /// matching function definition the same way.
    pub fn declare(&mut self, name: &'src str, def: UserDef<'src>) -> Result<UserId, DeclareError> {
        if let Some(id) = self.lookup(name) {
            let replaceable = match (&self.entries[id as usize].def, &def) {
                (UserDef::Forward, _) => true,
                (UserDef::FnSig(old), UserDef::Fn(new)) => {
                    if self.fn_sigs_equal(old, &new.sig) {
                        true
                    } else {
                        return Err(DeclareError::SignatureMismatch);
                    }
                }
                _ => false,
            };
            if !replaceable {
                return Err(DeclareError::Duplicate);
            }
            debug!("completing forward declaration of {name}");
            self.entries[id as usize].def = def;
            return Ok(id);
        }

        if self.entries.len() >= USER_TYPE_CAP {
            return Err(DeclareError::Exhausted);
        }
        let id = self.entries.len() as UserId;
        debug!("registering {} `{name}` as #{id}", def.describe());
        self.entries.push(UserType { name, def });
        Ok(id)
    }

    fn fn_sigs_equal(&self, a: &FnSigDef, b: &FnSigDef) -> bool {
        a.params.len() == b.params.len()
            && self.equals(self.ty(a.ret), self.ty(b.ret), false)
            && a.params
                .iter()
                .zip(b.params.iter())
                .all(|((_, ta), (_, tb))| self.equals(self.ty(*ta), self.ty(*tb), false))
    }

    /// Record where a function's code begins.
    pub fn set_fn_loc(&mut self, id: UserId, loc: u32) {
        if let UserDef::Fn(f) = &mut self.entries[id as usize].def {
            f.loc = Some(loc);
        }
    }

    /// The callable signature behind a `pfn` level, whether it names a
    /// standalone signature or a declared function.
    pub fn signature_of(&self, id: UserId) -> Option<&FnSigDef<'src>> {
        match &self.entries[id as usize].def {
            UserDef::FnSig(sig) => Some(sig),
            UserDef::Fn(f) => Some(&f.sig),
            _ => None,
        }
    }

    /// Member of a struct (or enum-variant payload) by name.
    pub fn member_of(&self, id: UserId, name: &str) -> Option<&Member<'src>> {
        match &self.entries[id as usize].def {
            UserDef::Struct(s) => s.members.iter().find(|m| m.name == name),
            _ => None,
        }
    }

    pub(crate) fn struct_layout(&self, id: UserId) -> (usize, usize) {
        match &self.entries[id as usize].def {
            UserDef::Struct(s) => (s.size, s.align.max(1)),
            // A forward declaration has no layout yet; the type parser
            // refuses to use one by value.
            _ => (0, 1),
        }
    }

    pub(crate) fn enum_layout(&self, id: UserId) -> (usize, usize) {
        match &self.entries[id as usize].def {
            UserDef::Enum(e) => (e.size, e.align.max(1)),
            _ => (0, 1),
        }
    }
}

impl Default for Registry<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{pod, Pod};

    #[test]
    fn test_intern_and_read_back() {
        let mut reg = Registry::new();
        let a = reg.intern(&pod(Pod::I32), false).unwrap();
        let b = reg.intern(&pod(Pod::F64), false).unwrap();
        assert_eq!(reg.ty(a), &pod(Pod::I32)[..]);
        assert_eq!(reg.ty(b), &pod(Pod::F64)[..]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut reg = Registry::new();
        reg.declare("Point", UserDef::Struct(StructDef::default()))
            .unwrap();
        assert_eq!(
            reg.declare("Point", UserDef::Struct(StructDef::default())),
            Err(DeclareError::Duplicate)
        );
    }

    #[test]
    fn test_forward_declaration_replaced_in_place() {
        let mut reg = Registry::new();
        let fwd = reg.declare("Node", UserDef::Forward).unwrap();
        let full = reg
            .declare(
                "Node",
                UserDef::Struct(StructDef {
                    size: 8,
                    align: 8,
                    ..Default::default()
                }),
            )
            .unwrap();
        assert_eq!(fwd, full);
        assert!(matches!(reg.get(full).def, UserDef::Struct(_)));
    }

    #[test]
    fn test_variant_payloads_hidden_from_lookup() {
        let mut reg = Registry::new();
        let owner = reg.declare("Shape", UserDef::Forward).unwrap();
        reg.declare(
            "Circle",
            UserDef::Struct(StructDef {
                enum_owner: Some(owner),
                ..Default::default()
            }),
        )
        .unwrap();
        assert_eq!(reg.lookup("Shape"), Some(owner));
        assert_eq!(reg.lookup("Circle"), None);
    }

    #[test]
    fn test_fn_signature_completed_by_definition() {
        let mut reg = Registry::new();
        let unit = reg.intern(&pod(Pod::I32), false).unwrap();
        let id = reg
            .declare(
                "twice",
                UserDef::FnSig(FnSigDef {
                    params: vec![("x", unit)],
                    ret: unit,
                }),
            )
            .unwrap();
        let id2 = reg
            .declare(
                "twice",
                UserDef::Fn(FnDef {
                    sig: FnSigDef {
                        params: vec![("x", unit)],
                        ret: unit,
                    },
                    external: None,
                    loc: Some(0),
                }),
            )
            .unwrap();
        assert_eq!(id, id2);
    }

    #[test]
    fn test_fn_signature_mismatch_rejected() {
        let mut reg = Registry::new();
        let i = reg.intern(&pod(Pod::I32), false).unwrap();
        let f = reg.intern(&pod(Pod::F64), false).unwrap();
        reg.declare(
            "twice",
            UserDef::FnSig(FnSigDef {
                params: vec![("x", i)],
                ret: i,
            }),
        )
        .unwrap();
        assert_eq!(
            reg.declare(
                "twice",
                UserDef::Fn(FnDef {
                    sig: FnSigDef {
                        params: vec![("x", f)],
                        ret: i,
                    },
                    external: None,
                    loc: None,
                }),
            ),
            Err(DeclareError::SignatureMismatch)
        );
    }
}
