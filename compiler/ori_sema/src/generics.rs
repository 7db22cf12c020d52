//! Generic parameter lists and requirements.

use crate::{DeclId, TypeId};

/// A constraint on generic parameters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Requirement {
    /// `subject` conforms to (or inherits from) `constraint`.
    Conformance { subject: TypeId, constraint: TypeId },
    /// `first == second`.
    SameType { first: TypeId, second: TypeId },
    /// Marks a type whose witness table is passed even without a
    /// conformance requirement of its own.
    WitnessMarker { ty: TypeId },
}

impl Requirement {
    /// Types mentioned by the requirement, in storage order.
    pub fn types(&self) -> impl Iterator<Item = TypeId> {
        let (a, b) = match *self {
            Requirement::Conformance {
                subject,
                constraint,
            } => (subject, Some(constraint)),
            Requirement::SameType { first, second } => (first, Some(second)),
            Requirement::WitnessMarker { ty } => (ty, None),
        };
        std::iter::once(a).chain(b)
    }
}

/// Generic parameters declared by one declaration, with their requirements.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenericParamList {
    /// Generic type parameter declarations, in order.
    pub params: Vec<DeclId>,
    pub requirements: Vec<Requirement>,
}

impl GenericParamList {
    pub fn new(params: Vec<DeclId>, requirements: Vec<Requirement>) -> Self {
        GenericParamList {
            params,
            requirements,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty() && self.requirements.is_empty()
    }
}

/// Generic signature of a polymorphic function type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct GenericSignature {
    /// Generic parameter types, in order.
    pub params: Vec<TypeId>,
    pub requirements: Vec<Requirement>,
}
