//! Typed IR for Ori module files.
//!
//! The IR is a basic-block representation of function bodies, close to
//! what the optimizer and code generator consume. Module files may carry
//! it so clients can inline or specialize across module boundaries.
//!
//! # Architecture
//!
//! - **[`TirModule`]**: functions, globals, vtables and witness tables,
//!   each with a lookup table (by linkage name, class or conformance)
//! - **[`TirFunction`]**: linkage name, linkage, lowered type, and an
//!   optional [`FunctionBody`] (`None` for declarations)
//! - **[`TirBlock`]**: block arguments and [`Instruction`]s; the last
//!   instruction is the terminator
//! - **[`InstKind`]**: closed instruction enum, flattened to [`Opcode`]
//!
//! Values are named by [`ValueId`] (SSA). A value may be a block argument,
//! an instruction result, or a placeholder for a definition not seen yet.

mod function;
mod ids;
mod inst;
mod module;

pub use function::{
    FunctionAttrs, FunctionBody, Linkage, TirBlock, TirFunction, ValueData, ValueDef,
};
pub use ids::{BlockId, FuncId, GlobalId, ValueId, VTableId, WitnessTableId};
pub use inst::{CallData, ConversionOp, InstKind, Instruction, Opcode, Operands, RefCountOp};
pub use module::{TirGlobal, TirModule, VTable, VTableEntry, WitnessEntry, WitnessTable};
