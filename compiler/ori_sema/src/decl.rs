//! Declarations.
//!
//! A [`Decl`] carries the fields every declaration has (name, context,
//! module, flags) plus a closed [`DeclKind`] payload. [`DeclKindTag`] is the
//! one-byte discriminant used wherever a declaration's kind has to be
//! stored without its payload (name-index disambiguators, file records).

use bitflags::bitflags;

use crate::{ConformanceId, DeclId, GenericParamList, ModuleId, Name, TypeId};

// ── Context ─────────────────────────────────────────────────────────

/// Where a declaration lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeclContext {
    /// Top level of a module.
    Module(ModuleId),
    /// Nested inside another declaration (type body, extension, function).
    Decl(DeclId),
}

bitflags! {
    /// Attribute bits shared by all declaration kinds.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct DeclFlags: u8 {
        /// Synthesized by the compiler rather than written by the user.
        const IMPLICIT = 1 << 0;
        /// Type-level member (`static`).
        const STATIC = 1 << 1;
        /// Cannot be overridden.
        const FINAL = 1 << 2;
        /// Dispatched dynamically through the class-member table.
        const DYNAMIC = 1 << 3;
        /// Method may mutate `self`.
        const MUTATING = 1 << 4;
        /// Function or closure parameter.
        const PARAM = 1 << 5;
    }
}

// ── Operators ───────────────────────────────────────────────────────

/// Operator position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum OperatorFixity {
    Infix = 1,
    Prefix = 2,
    Postfix = 3,
}

impl OperatorFixity {
    /// Decode a stored fixity byte.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(OperatorFixity::Infix),
            2 => Some(OperatorFixity::Prefix),
            3 => Some(OperatorFixity::Postfix),
            _ => None,
        }
    }
}

/// Infix operator associativity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Associativity {
    None = 0,
    Left = 1,
    Right = 2,
}

impl Associativity {
    /// Decode a stored associativity byte.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Associativity::None),
            1 => Some(Associativity::Left),
            2 => Some(Associativity::Right),
            _ => None,
        }
    }
}

// ── Known protocols ─────────────────────────────────────────────────

/// Protocols the compiler treats specially. Module files keep a list of
/// adopters for each so the compiler can find them without a full scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum KnownProtocol {
    Eq = 1,
    Comparable = 2,
    Hashable = 3,
    Clone = 4,
    Printable = 5,
    Debug = 6,
    Default = 7,
    Iterable = 8,
    Iterator = 9,
}

impl KnownProtocol {
    /// Every known protocol, in discriminant order.
    pub const ALL: [KnownProtocol; 9] = [
        KnownProtocol::Eq,
        KnownProtocol::Comparable,
        KnownProtocol::Hashable,
        KnownProtocol::Clone,
        KnownProtocol::Printable,
        KnownProtocol::Debug,
        KnownProtocol::Default,
        KnownProtocol::Iterable,
        KnownProtocol::Iterator,
    ];

    /// Decode a stored discriminant.
    pub fn from_raw(raw: u8) -> Option<Self> {
        Self::ALL.get(usize::from(raw).checked_sub(1)?).copied()
    }
}

// ── Payloads ────────────────────────────────────────────────────────

/// Fields shared by structs, classes and enums.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NominalData {
    pub generics: Option<GenericParamList>,
    /// Types named in the inheritance clause.
    pub inherited: Vec<TypeId>,
    pub members: Vec<DeclId>,
    /// Normal conformances declared on the type itself.
    pub conformances: Vec<ConformanceId>,
}

/// Payload of a protocol declaration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProtocolData {
    /// Directly inherited protocols.
    pub inherited: Vec<DeclId>,
    pub members: Vec<DeclId>,
    /// Only classes may conform.
    pub class_bound: bool,
    pub known: Option<KnownProtocol>,
}

/// Payload of a function or method.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FuncData {
    pub interface_type: Option<TypeId>,
    pub generics: Option<GenericParamList>,
    pub params: Vec<DeclId>,
    /// Set for operator implementations.
    pub operator: Option<OperatorFixity>,
    /// Method this one overrides.
    pub overridden: Option<DeclId>,
}

/// Payload of an extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionData {
    /// The extended nominal type.
    pub extended: TypeId,
    pub generics: Option<GenericParamList>,
    pub inherited: Vec<TypeId>,
    pub members: Vec<DeclId>,
    pub conformances: Vec<ConformanceId>,
}

/// Kind-specific declaration payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeclKind {
    TypeAlias {
        underlying: Option<TypeId>,
        generics: Option<GenericParamList>,
    },
    Struct(NominalData),
    Class {
        nominal: NominalData,
        superclass: Option<TypeId>,
    },
    Enum {
        nominal: NominalData,
        raw_type: Option<TypeId>,
    },
    EnumCase {
        argument_type: Option<TypeId>,
        raw_value: Option<i64>,
    },
    Protocol(ProtocolData),
    Func(FuncData),
    Constructor {
        func: FuncData,
        failable: bool,
    },
    Destructor {
        interface_type: Option<TypeId>,
    },
    Var {
        ty: Option<TypeId>,
        is_let: bool,
    },
    Subscript {
        index_type: Option<TypeId>,
        element_type: Option<TypeId>,
    },
    PatternBinding {
        vars: Vec<DeclId>,
    },
    Operator {
        fixity: OperatorFixity,
        associativity: Associativity,
        precedence: u8,
    },
    Extension(ExtensionData),
    GenericTypeParam {
        depth: u32,
        index: u32,
        inherited: Vec<TypeId>,
        superclass: Option<TypeId>,
    },
    AssociatedType {
        default: Option<TypeId>,
        inherited: Vec<TypeId>,
    },
}

/// One-byte declaration discriminant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum DeclKindTag {
    TypeAlias = 1,
    Struct = 2,
    Class = 3,
    Enum = 4,
    EnumCase = 5,
    Protocol = 6,
    Func = 7,
    Constructor = 8,
    Destructor = 9,
    Var = 10,
    Subscript = 11,
    PatternBinding = 12,
    InfixOperator = 13,
    PrefixOperator = 14,
    PostfixOperator = 15,
    Extension = 16,
    GenericTypeParam = 17,
    AssociatedType = 18,
}

impl DeclKindTag {
    /// Decode a stored discriminant.
    pub fn from_raw(raw: u8) -> Option<Self> {
        use DeclKindTag as T;
        Some(match raw {
            1 => T::TypeAlias,
            2 => T::Struct,
            3 => T::Class,
            4 => T::Enum,
            5 => T::EnumCase,
            6 => T::Protocol,
            7 => T::Func,
            8 => T::Constructor,
            9 => T::Destructor,
            10 => T::Var,
            11 => T::Subscript,
            12 => T::PatternBinding,
            13 => T::InfixOperator,
            14 => T::PrefixOperator,
            15 => T::PostfixOperator,
            16 => T::Extension,
            17 => T::GenericTypeParam,
            18 => T::AssociatedType,
            _ => return None,
        })
    }

    /// Returns `true` for structs, classes, enums and protocols.
    pub fn is_nominal_type(self) -> bool {
        matches!(
            self,
            DeclKindTag::Struct | DeclKindTag::Class | DeclKindTag::Enum | DeclKindTag::Protocol
        )
    }

    /// Returns `true` for declarations that name a type.
    pub fn is_type(self) -> bool {
        self.is_nominal_type()
            || matches!(
                self,
                DeclKindTag::TypeAlias | DeclKindTag::GenericTypeParam | DeclKindTag::AssociatedType
            )
    }
}

// ── Decl ────────────────────────────────────────────────────────────

/// A declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decl {
    pub name: Name,
    pub context: DeclContext,
    /// Module that owns the declaration.
    pub module: ModuleId,
    pub flags: DeclFlags,
    pub kind: DeclKind,
}

impl Decl {
    /// A declaration with no flags set.
    pub fn new(name: Name, context: DeclContext, module: ModuleId, kind: DeclKind) -> Self {
        Decl {
            name,
            context,
            module,
            flags: DeclFlags::empty(),
            kind,
        }
    }

    /// The same declaration with `flags` set.
    #[must_use]
    pub fn with_flags(mut self, flags: DeclFlags) -> Self {
        self.flags = flags;
        self
    }

    /// The kind discriminant.
    pub fn tag(&self) -> DeclKindTag {
        match &self.kind {
            DeclKind::TypeAlias { .. } => DeclKindTag::TypeAlias,
            DeclKind::Struct(_) => DeclKindTag::Struct,
            DeclKind::Class { .. } => DeclKindTag::Class,
            DeclKind::Enum { .. } => DeclKindTag::Enum,
            DeclKind::EnumCase { .. } => DeclKindTag::EnumCase,
            DeclKind::Protocol(_) => DeclKindTag::Protocol,
            DeclKind::Func(_) => DeclKindTag::Func,
            DeclKind::Constructor { .. } => DeclKindTag::Constructor,
            DeclKind::Destructor { .. } => DeclKindTag::Destructor,
            DeclKind::Var { .. } => DeclKindTag::Var,
            DeclKind::Subscript { .. } => DeclKindTag::Subscript,
            DeclKind::PatternBinding { .. } => DeclKindTag::PatternBinding,
            DeclKind::Operator { fixity, .. } => match fixity {
                OperatorFixity::Infix => DeclKindTag::InfixOperator,
                OperatorFixity::Prefix => DeclKindTag::PrefixOperator,
                OperatorFixity::Postfix => DeclKindTag::PostfixOperator,
            },
            DeclKind::Extension(_) => DeclKindTag::Extension,
            DeclKind::GenericTypeParam { .. } => DeclKindTag::GenericTypeParam,
            DeclKind::AssociatedType { .. } => DeclKindTag::AssociatedType,
        }
    }

    /// The nominal payload of a struct, class or enum.
    pub fn nominal(&self) -> Option<&NominalData> {
        match &self.kind {
            DeclKind::Struct(n)
            | DeclKind::Class { nominal: n, .. }
            | DeclKind::Enum { nominal: n, .. } => Some(n),
            _ => None,
        }
    }

    /// Mutable nominal payload of a struct, class or enum.
    pub fn nominal_mut(&mut self) -> Option<&mut NominalData> {
        match &mut self.kind {
            DeclKind::Struct(n)
            | DeclKind::Class { nominal: n, .. }
            | DeclKind::Enum { nominal: n, .. } => Some(n),
            _ => None,
        }
    }

    /// Member declarations of a nominal type, protocol or extension.
    pub fn members(&self) -> &[DeclId] {
        match &self.kind {
            DeclKind::Protocol(p) => &p.members,
            DeclKind::Extension(e) => &e.members,
            _ => self.nominal().map_or(&[], |n| n.members.as_slice()),
        }
    }

    /// Mutable member list, if this kind has members.
    pub fn members_mut(&mut self) -> Option<&mut Vec<DeclId>> {
        match &mut self.kind {
            DeclKind::Protocol(p) => Some(&mut p.members),
            DeclKind::Extension(e) => Some(&mut e.members),
            DeclKind::Struct(n)
            | DeclKind::Class { nominal: n, .. }
            | DeclKind::Enum { nominal: n, .. } => Some(&mut n.members),
            _ => None,
        }
    }

    /// Normal conformances declared by this nominal type or extension.
    pub fn conformances(&self) -> &[ConformanceId] {
        match &self.kind {
            DeclKind::Extension(e) => &e.conformances,
            _ => self.nominal().map_or(&[], |n| n.conformances.as_slice()),
        }
    }

    /// Mutable conformance list, if this kind can declare conformances.
    pub fn conformances_mut(&mut self) -> Option<&mut Vec<ConformanceId>> {
        match &mut self.kind {
            DeclKind::Extension(e) => Some(&mut e.conformances),
            DeclKind::Struct(n)
            | DeclKind::Class { nominal: n, .. }
            | DeclKind::Enum { nominal: n, .. } => Some(&mut n.conformances),
            _ => None,
        }
    }

    /// The declaration's own generic parameter list.
    pub fn generics(&self) -> Option<&GenericParamList> {
        match &self.kind {
            DeclKind::TypeAlias { generics, .. } => generics.as_ref(),
            DeclKind::Func(f) | DeclKind::Constructor { func: f, .. } => f.generics.as_ref(),
            DeclKind::Extension(e) => e.generics.as_ref(),
            _ => self.nominal().and_then(|n| n.generics.as_ref()),
        }
    }

    /// Mutable slot for the declaration's generic parameter list.
    pub fn generics_mut(&mut self) -> Option<&mut Option<GenericParamList>> {
        match &mut self.kind {
            DeclKind::TypeAlias { generics, .. } => Some(generics),
            DeclKind::Func(f) | DeclKind::Constructor { func: f, .. } => Some(&mut f.generics),
            DeclKind::Extension(e) => Some(&mut e.generics),
            DeclKind::Struct(n)
            | DeclKind::Class { nominal: n, .. }
            | DeclKind::Enum { nominal: n, .. } => Some(&mut n.generics),
            _ => None,
        }
    }

    /// Operator fixity of an operator declaration or operator function.
    pub fn operator_fixity(&self) -> Option<OperatorFixity> {
        match &self.kind {
            DeclKind::Operator { fixity, .. } => Some(*fixity),
            DeclKind::Func(f) => f.operator,
            _ => None,
        }
    }

    /// Type a value reference to this declaration has, used to
    /// disambiguate overloads.
    pub fn value_type(&self) -> Option<TypeId> {
        match &self.kind {
            DeclKind::Func(f) | DeclKind::Constructor { func: f, .. } => f.interface_type,
            DeclKind::Var { ty, .. } => *ty,
            DeclKind::Subscript { element_type, .. } => *element_type,
            DeclKind::EnumCase { argument_type, .. } => *argument_type,
            DeclKind::Destructor { interface_type } => *interface_type,
            _ => None,
        }
    }
}
