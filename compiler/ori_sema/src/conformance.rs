//! Protocol conformances and substitutions.
//!
//! A *normal* conformance is declared once, by a nominal type or one of its
//! extensions, and owns its witness tables. *Specialized* and *inherited*
//! conformances are derived: they wrap another conformance and are
//! hash-consed like types.

use crate::{ConformanceId, DeclId, ModuleId, TypeId};

/// A conformance as it appears in substitution lists and IR operands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConformanceRef {
    /// Conformance of an abstract type, known only by its protocol.
    Abstract { protocol: DeclId },
    Concrete(ConformanceId),
}

/// A generic placeholder bound to a concrete type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Substitution {
    /// The archetype or generic parameter being replaced.
    pub placeholder: TypeId,
    pub replacement: TypeId,
    /// One entry per protocol requirement on the placeholder.
    pub conformances: Vec<ConformanceRef>,
}

/// A protocol requirement and the declaration that satisfies it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ValueWitness {
    pub requirement: DeclId,
    /// `None` if the requirement is satisfied by a default implementation.
    pub witness: Option<DeclId>,
    /// Substitutions applied to the witness's generic signature.
    pub substitutions: Vec<Substitution>,
}

/// An associated type and the type bound to it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeWitness {
    pub assoc: DeclId,
    pub substitution: Substitution,
}

/// How far a normal conformance has been filled in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ConformanceState {
    /// Identity only: protocol, nominal and declaring context.
    #[default]
    Shell,
    Complete,
}

/// A conformance declared in source.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NormalConformance {
    pub protocol: DeclId,
    /// Nominal type the conformance is for.
    pub nominal: DeclId,
    /// The nominal itself or the extension that declares the conformance.
    pub context: DeclId,
    /// Module that declares the conformance.
    pub module: ModuleId,
    pub conforming_type: Option<TypeId>,
    pub value_witnesses: Vec<ValueWitness>,
    pub type_witnesses: Vec<TypeWitness>,
    /// Conformances to inherited protocols, keyed by protocol.
    pub inherited: Vec<(DeclId, ConformanceId)>,
    /// Requirements satisfied by default implementations.
    pub defaulted: Vec<DeclId>,
    pub state: ConformanceState,
}

impl NormalConformance {
    /// An identity-only conformance, to be populated later.
    pub fn shell(protocol: DeclId, nominal: DeclId, context: DeclId, module: ModuleId) -> Self {
        NormalConformance {
            protocol,
            nominal,
            context,
            module,
            conforming_type: None,
            value_witnesses: Vec::new(),
            type_witnesses: Vec::new(),
            inherited: Vec::new(),
            defaulted: Vec::new(),
            state: ConformanceState::Shell,
        }
    }

    /// Witness for `requirement`, if recorded.
    pub fn witness_for(&self, requirement: DeclId) -> Option<&ValueWitness> {
        self.value_witnesses
            .iter()
            .find(|w| w.requirement == requirement)
    }

    /// Conformance to an inherited protocol.
    pub fn inherited_conformance(&self, protocol: DeclId) -> Option<ConformanceId> {
        self.inherited
            .iter()
            .find(|(p, _)| *p == protocol)
            .map(|&(_, c)| c)
    }
}

/// Any kind of concrete conformance.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Conformance {
    Normal(NormalConformance),
    /// A generic conformance applied to specific arguments.
    Specialized {
        ty: TypeId,
        generic: ConformanceId,
        substitutions: Vec<Substitution>,
    },
    /// A superclass's conformance seen through a subclass.
    Inherited {
        ty: TypeId,
        inherited_from: ConformanceId,
    },
}

impl Conformance {
    /// The normal payload, if this is a normal conformance.
    pub fn as_normal(&self) -> Option<&NormalConformance> {
        match self {
            Conformance::Normal(n) => Some(n),
            _ => None,
        }
    }

    /// The conformance this one wraps, for derived conformances.
    pub fn underlying(&self) -> Option<ConformanceId> {
        match *self {
            Conformance::Normal(_) => None,
            Conformance::Specialized { generic, .. } => Some(generic),
            Conformance::Inherited { inherited_from, .. } => Some(inherited_from),
        }
    }
}
