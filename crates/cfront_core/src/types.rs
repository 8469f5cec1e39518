//! The type representation (§3, §4.4) and its arena.
//!
//! Types form a graph that can be cyclic (`struct S { struct S *next; }`) and
//! can be referenced before they are fully defined (a forward tag
//! declaration). Neither fits a borrowed, tree-shaped AST, so `Type` lives in
//! a flat `Vec` addressed by the `Copy` index [`TypeId`] rather than behind a
//! `bumpalo` reference: a tag can be registered with a placeholder `Type` and
//! patched in place once its body is parsed, and a pointer-to-self is just an
//! index that happens to equal its own container's id.

use std::collections::HashMap;

use cfront_base::Symbol;
use rustc_hash::FxHashMap;

use crate::ast::{ExprId, StmtId};
use crate::location::Span;

/// Index into a [`TypeArena`]. Cheap to copy, store in maps, and embed in
/// other arena-indexed nodes (`Expression::Cast`, `Declaration::ty`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

/// The built-in primitive kinds (§3's data model). `Char` is distinct from
/// both signed and unsigned variants, matching C's three distinct character
/// types; `Error` stands in for a type that failed to resolve, so parsing
/// can continue instead of aborting the translation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Void,
    Char,
    SignedShort,
    SignedInt,
    SignedLong,
    SignedLongLong,
    UnsignedShort,
    UnsignedInt,
    UnsignedLong,
    UnsignedLongLong,
    Float,
    Double,
    LongDouble,
    Error,
}

/// A declared enumeration. `values` maps each enumerator to its constant
/// value; `defined` is false for a tag seen only as `enum Tag` with no body
/// yet (§4.4.2's install-then-define pattern).
#[derive(Debug, Clone, Default)]
pub struct EnumType {
    pub span: Span,
    pub values: FxHashMap<Symbol, i64>,
    pub defined: bool,
}

/// A struct or union member, in declaration order.
#[derive(Debug, Clone)]
pub struct Member {
    pub name: Symbol,
    pub ty: TypeQualified,
    pub span: Span,
}

/// The shared shape of `struct`/`union` (§3, §4.4.2): an ordered member list
/// plus a name-to-index lookup for `.`/`->` resolution. `defined` is false
/// between a forward reference (`struct Tag *p;`) and the tag's body.
#[derive(Debug, Clone, Default)]
pub struct CompositeType {
    pub span: Span,
    pub members: Vec<Member>,
    pub member_lookup: FxHashMap<Symbol, usize>,
    pub defined: bool,
}

impl CompositeType {
    pub fn push_member(&mut self, member: Member) {
        self.member_lookup.insert(member.name, self.members.len());
        self.members.push(member);
    }

    pub fn member(&self, name: Symbol) -> Option<&Member> {
        self.member_lookup.get(&name).map(|&i| &self.members[i])
    }
}

/// One entry in the type arena.
#[derive(Debug, Clone)]
pub enum Type {
    Builtin(Builtin),
    Pointer(TypeQualified),
    Array {
        element: TypeQualified,
        length: Option<ExprId>,
    },
    Function {
        return_type: TypeQualified,
        parameters: Vec<TypeQualified>,
        has_varargs: bool,
        /// `Some` once a `{ ... }` body has been parsed for this signature;
        /// a bare prototype (`int f(int);`) leaves this `None`.
        body: Option<StmtId>,
    },
    Enum(EnumType),
    Struct(CompositeType),
    Union(CompositeType),
}

/// A type plus the `const`/`volatile` qualifiers attached to *this* use of
/// it (§4.4.1). Represented as a `TypeId` and two flags rather than a
/// pointer-tagged pointer, since the underlying `Type` already lives behind
/// an arena index rather than a raw reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeQualified {
    pub id: TypeId,
    pub is_const: bool,
    pub is_volatile: bool,
}

impl TypeQualified {
    pub fn unqualified(id: TypeId) -> Self {
        TypeQualified {
            id,
            is_const: false,
            is_volatile: false,
        }
    }
}

/// Owns every [`Type`] allocated during a compilation, plus the canonical
/// built-in singletons installed once at construction so base-type parsing
/// can hand out the same `TypeId` for every plain `int`.
#[derive(Debug)]
pub struct TypeArena {
    types: Vec<Type>,
    builtins: HashMap<Builtin, TypeId>,
}

impl TypeArena {
    pub fn new() -> Self {
        let mut arena = TypeArena {
            types: Vec::new(),
            builtins: HashMap::new(),
        };
        for &b in &[
            Builtin::Void,
            Builtin::Char,
            Builtin::SignedShort,
            Builtin::SignedInt,
            Builtin::SignedLong,
            Builtin::SignedLongLong,
            Builtin::UnsignedShort,
            Builtin::UnsignedInt,
            Builtin::UnsignedLong,
            Builtin::UnsignedLongLong,
            Builtin::Float,
            Builtin::Double,
            Builtin::LongDouble,
            Builtin::Error,
        ] {
            let id = arena.push(Type::Builtin(b));
            arena.builtins.insert(b, id);
        }
        arena
    }

    pub fn push(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.types[id.0 as usize]
    }

    pub fn builtin(&self, b: Builtin) -> TypeId {
        self.builtins[&b]
    }

    /// `true` if `id` names a struct, union, or enum tag, used when a bare
    /// identifier is used as a base type without its `struct`/`union`/`enum`
    /// keyword (§4.4.1's tag-required diagnostic).
    pub fn is_tagged(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Struct(_) | Type::Union(_) | Type::Enum(_))
    }

    pub fn tag_keyword(&self, id: TypeId) -> Option<&'static str> {
        match self.get(id) {
            Type::Struct(_) => Some("struct"),
            Type::Union(_) => Some("union"),
            Type::Enum(_) => Some("enum"),
            _ => None,
        }
    }
}

impl Default for TypeArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_distinct_and_stable() {
        let arena = TypeArena::new();
        let int_id = arena.builtin(Builtin::SignedInt);
        let char_id = arena.builtin(Builtin::Char);
        assert_ne!(int_id, char_id);
        assert_eq!(arena.builtin(Builtin::SignedInt), int_id);
    }

    #[test]
    fn pushed_struct_can_self_reference_via_pointer() {
        let mut arena = TypeArena::new();
        let placeholder = arena.push(Type::Struct(CompositeType::default()));
        let ptr = arena.push(Type::Pointer(TypeQualified::unqualified(placeholder)));
        if let Type::Struct(s) = arena.get_mut(placeholder) {
            s.push_member(Member {
                name: Symbol::EMPTY,
                ty: TypeQualified::unqualified(ptr),
                span: dummy_span(),
            });
        }
        match arena.get(placeholder) {
            Type::Struct(s) => assert_eq!(s.members[0].ty.id, ptr),
            _ => panic!("expected struct"),
        }
    }

    #[test]
    fn is_tagged_distinguishes_builtins_from_aggregates() {
        let mut arena = TypeArena::new();
        let int_id = arena.builtin(Builtin::SignedInt);
        let struct_id = arena.push(Type::Struct(CompositeType::default()));
        assert!(!arena.is_tagged(int_id));
        assert!(arena.is_tagged(struct_id));
        assert_eq!(arena.tag_keyword(struct_id), Some("struct"));
    }

    fn dummy_span() -> Span {
        use crate::file::FileId;
        use crate::location::Location;
        let loc = Location {
            file_id: FileId(0),
            byte_index: 0,
            line: 0,
            column: 0,
        };
        Span::new(loc, loc)
    }
}
