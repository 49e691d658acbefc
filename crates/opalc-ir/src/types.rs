//! The IR type system: interned, identity-compared types.
//!
//! Every type has a unique [`TypeId`] providing O(1) identity comparison.
//! The [`TypeInterner`] pre-registers the four scalar kinds on construction
//! and structurally dedups compound types, so two requests for "pointer to
//! i32" always yield the same `TypeId`.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a type in the interner.
///
/// The inner value is an index into the [`TypeInterner`]'s type vector.
/// Because compound types are dedupped at interning time, `TypeId` equality
/// is type identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

/// Pre-registered TypeId constants for the built-in scalar types.
impl TypeId {
    pub const VOID: TypeId = TypeId(0);
    pub const I1: TypeId = TypeId(1);
    pub const I32: TypeId = TypeId(2);
    pub const F32: TypeId = TypeId(3);
}

/// A single type. Compound variants refer to other types by [`TypeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    Void,
    /// 1-bit integer, the result of comparisons.
    I1,
    /// 32-bit signed integer.
    I32,
    /// IEEE-754 single precision float.
    F32,
    /// Pointer to another type.
    Ptr(TypeId),
    /// Fixed-size array: `[elem; len]`.
    Array { elem: TypeId, len: u32 },
    /// Function signature.
    Func { ret: TypeId, params: Vec<TypeId> },
}

/// Interner owning all types of a module.
///
/// On construction the four built-ins are registered:
/// - `TypeId(0)` = void
/// - `TypeId(1)` = i1
/// - `TypeId(2)` = i32
/// - `TypeId(3)` = f32
#[derive(Debug, Clone)]
pub struct TypeInterner {
    /// Types indexed by `TypeId.0`.
    types: Vec<Ty>,
    /// Structural dedup so interning yields identity semantics.
    dedup: HashMap<Ty, TypeId>,
}

impl TypeInterner {
    /// Creates an interner with the built-in scalar types registered.
    pub fn new() -> Self {
        let mut interner = TypeInterner {
            types: Vec::new(),
            dedup: HashMap::new(),
        };
        for ty in [Ty::Void, Ty::I1, Ty::I32, Ty::F32] {
            interner.intern(ty);
        }
        interner
    }

    /// Interns a type, returning the existing id when an identical type was
    /// interned before.
    pub fn intern(&mut self, ty: Ty) -> TypeId {
        if let Some(&id) = self.dedup.get(&ty) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty.clone());
        self.dedup.insert(ty, id);
        id
    }

    /// Interns `*ty`.
    pub fn ptr_to(&mut self, ty: TypeId) -> TypeId {
        self.intern(Ty::Ptr(ty))
    }

    /// Interns `[elem; len]`.
    pub fn array_of(&mut self, elem: TypeId, len: u32) -> TypeId {
        self.intern(Ty::Array { elem, len })
    }

    /// Interns a function type.
    pub fn func_of(&mut self, ret: TypeId, params: Vec<TypeId>) -> TypeId {
        self.intern(Ty::Func { ret, params })
    }

    /// Looks up a type by id. Ids handed out by this interner always resolve.
    pub fn get(&self, id: TypeId) -> &Ty {
        &self.types[id.0 as usize]
    }

    pub fn is_int(&self, id: TypeId) -> bool {
        id == TypeId::I32
    }

    pub fn is_float(&self, id: TypeId) -> bool {
        id == TypeId::F32
    }

    pub fn is_void(&self, id: TypeId) -> bool {
        id == TypeId::VOID
    }

    pub fn is_ptr(&self, id: TypeId) -> bool {
        matches!(self.get(id), Ty::Ptr(_))
    }

    pub fn is_array(&self, id: TypeId) -> bool {
        matches!(self.get(id), Ty::Array { .. })
    }

    /// The pointee of a pointer type, or `None` for non-pointers.
    pub fn pointee(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id) {
            Ty::Ptr(t) => Some(*t),
            _ => None,
        }
    }

    /// The element type of an array type, or `None` for non-arrays.
    pub fn array_elem(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id) {
            Ty::Array { elem, .. } => Some(*elem),
            _ => None,
        }
    }

    /// Renders a type for diagnostics and the textual printer.
    pub fn name(&self, id: TypeId) -> String {
        match self.get(id) {
            Ty::Void => "void".into(),
            Ty::I1 => "i1".into(),
            Ty::I32 => "i32".into(),
            Ty::F32 => "f32".into(),
            Ty::Ptr(t) => format!("{}*", self.name(*t)),
            Ty::Array { elem, len } => format!("[{} x {}]", len, self.name(*elem)),
            Ty::Func { ret, params } => {
                let params: Vec<String> = params.iter().map(|p| self.name(*p)).collect();
                format!("{} ({})", self.name(*ret), params.join(", "))
            }
        }
    }
}

impl Default for TypeInterner {
    fn default() -> Self {
        Self::new()
    }
}
