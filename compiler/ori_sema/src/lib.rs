//! In-memory semantic graph for Ori module files.
//!
//! This crate holds what the front end hands to the module-file writer and
//! what the module-file reader reconstructs: modules, declarations, types,
//! protocol conformances, substitutions and generic parameter lists.
//!
//! # Architecture
//!
//! Everything lives in arenas owned by [`SemaContext`] and is referred to by
//! dense 32-bit ids:
//!
//! - **[`ModuleId`]**: a module and its import/link metadata
//! - **[`DeclId`]**: a [`Decl`] with a closed [`DeclKind`] payload
//! - **[`TypeId`]**: a hash-consed [`TypeKind`] (archetypes excepted)
//! - **[`ConformanceId`]**: a [`Conformance`]; derived kinds are hash-consed
//!
//! Graphs may be cyclic. Construction is two-phase (allocate the identity,
//! then populate it), which is what lets a lazy reader install an entity
//! before it resolves the entities that point back at it.

mod conformance;
mod context;
mod decl;
mod generics;
mod ids;
mod module;
mod name;
mod types;

pub use conformance::{
    Conformance, ConformanceRef, ConformanceState, NormalConformance, Substitution, TypeWitness,
    ValueWitness,
};
pub use context::SemaContext;
pub use decl::{
    Associativity, Decl, DeclContext, DeclFlags, DeclKind, DeclKindTag, ExtensionData, FuncData,
    KnownProtocol, NominalData, OperatorFixity, ProtocolData,
};
pub use generics::{GenericParamList, GenericSignature, Requirement};
pub use ids::{ConformanceId, DeclId, ModuleId, TypeId};
pub use module::{ImportedModule, LinkLibrary, LinkLibraryKind, ModuleData};
pub use name::{Name, StringInterner};
pub use types::{
    ArchetypeData, BuiltinType, FunctionFlags, IrConvention, IrParam, MetatypeRepr, Ownership,
    ParamConvention, TupleElement, TypeKind,
};
