//! Types.
//!
//! [`TypeKind`] is the structural representation. Every variant except
//! [`TypeKind::Archetype`] is hash-consed by
//! [`SemaContext::intern_type`](crate::SemaContext::intern_type): building
//! the same structure twice yields the same [`TypeId`].

use bitflags::bitflags;

use crate::{DeclId, GenericSignature, Name, TypeId};

/// Compiler-builtin types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    Integer { width: u16 },
    Float { width: u16 },
    Word,
    RawPointer,
    NativeObject,
    UnknownObject,
}

bitflags! {
    /// Attributes of a function type.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct FunctionFlags: u8 {
        const THROWS = 1 << 0;
        const NORETURN = 1 << 1;
        const AUTOCLOSURE = 1 << 2;
        /// No context is captured.
        const THIN = 1 << 3;
    }
}

/// Representation of a metatype value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MetatypeRepr {
    Thin = 0,
    Thick = 1,
}

impl MetatypeRepr {
    /// Decode a stored discriminant.
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => MetatypeRepr::Thin,
            1 => MetatypeRepr::Thick,
            _ => return None,
        })
    }
}

/// Ownership qualifier of a stored reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Ownership {
    Weak = 0,
    Unowned = 1,
    Unmanaged = 2,
}

impl Ownership {
    /// Decode a stored discriminant.
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Ownership::Weak,
            1 => Ownership::Unowned,
            2 => Ownership::Unmanaged,
            _ => return None,
        })
    }
}

/// Calling convention of a lowered (IR) function type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IrConvention {
    Thin = 0,
    Thick = 1,
    Method = 2,
    WitnessMethod = 3,
}

impl IrConvention {
    /// Decode a stored discriminant.
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => IrConvention::Thin,
            1 => IrConvention::Thick,
            2 => IrConvention::Method,
            3 => IrConvention::WitnessMethod,
            _ => return None,
        })
    }
}

/// How a lowered function parameter is passed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ParamConvention {
    Owned = 0,
    Guaranteed = 1,
    Inout = 2,
    Indirect = 3,
}

impl ParamConvention {
    /// Decode a stored discriminant.
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => ParamConvention::Owned,
            1 => ParamConvention::Guaranteed,
            2 => ParamConvention::Inout,
            3 => ParamConvention::Indirect,
            _ => return None,
        })
    }
}

/// One element of a tuple type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TupleElement {
    /// Label, or [`Name::EMPTY`].
    pub name: Name,
    pub ty: TypeId,
}

/// One parameter of a lowered function type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IrParam {
    pub ty: TypeId,
    pub convention: ParamConvention,
}

/// Payload of an archetype: a generic parameter viewed from inside its
/// generic context.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ArchetypeData {
    pub name: Name,
    /// Position among the primary archetypes; `None` for nested ones.
    pub index: Option<u32>,
    /// Archetype this one is nested in (for associated types).
    pub parent: Option<TypeId>,
    /// Associated type declaration of a nested archetype.
    pub assoc: Option<DeclId>,
    pub superclass: Option<TypeId>,
    /// Protocols the archetype is known to conform to.
    pub conforms_to: Vec<DeclId>,
    /// Nested archetypes, by associated type name.
    pub nested: Vec<(Name, TypeId)>,
}

/// Structural type representation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Builtin(BuiltinType),
    /// An unapplied nominal type.
    Nominal {
        decl: DeclId,
        parent: Option<TypeId>,
    },
    /// A generic nominal type applied to arguments.
    BoundGeneric {
        decl: DeclId,
        parent: Option<TypeId>,
        args: Vec<TypeId>,
    },
    Tuple(Vec<TupleElement>),
    Function {
        input: TypeId,
        result: TypeId,
        flags: FunctionFlags,
    },
    GenericFunction {
        signature: GenericSignature,
        input: TypeId,
        result: TypeId,
        flags: FunctionFlags,
    },
    Metatype {
        instance: TypeId,
        repr: MetatypeRepr,
    },
    /// Not hash-consed: every allocation is a distinct archetype.
    Archetype(ArchetypeData),
    GenericParam {
        decl: DeclId,
        depth: u32,
        index: u32,
    },
    DependentMember {
        base: TypeId,
        assoc: DeclId,
    },
    /// An existential over zero or more protocols.
    ProtocolComposition(Vec<TypeId>),
    ReferenceStorage {
        ownership: Ownership,
        referent: TypeId,
    },
    IrFunction {
        convention: IrConvention,
        params: Vec<IrParam>,
        result: TypeId,
    },
    ArraySlice(TypeId),
    Optional(TypeId),
    /// `original` with a generic placeholder replaced by `replacement`.
    Substituted {
        original: TypeId,
        replacement: TypeId,
    },
}

impl TypeKind {
    /// The nominal declaration behind a nominal or bound generic type.
    pub fn nominal_decl(&self) -> Option<DeclId> {
        match *self {
            TypeKind::Nominal { decl, .. } | TypeKind::BoundGeneric { decl, .. } => Some(decl),
            _ => None,
        }
    }

    /// Returns `true` for archetypes.
    pub fn is_archetype(&self) -> bool {
        matches!(self, TypeKind::Archetype(_))
    }
}
