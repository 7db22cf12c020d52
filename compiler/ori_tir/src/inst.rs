//! Instructions.
//!
//! [`InstKind`] is a closed enum with one variant per instruction family.
//! Families that share a layout (conversions, reference counting) carry a
//! sub-enum; [`InstKind::opcode`] flattens everything to a one-byte
//! [`Opcode`], which is what module files store.
//!
//! Terminators are ordinary instructions that must come last in a block.

use ori_sema::{ConformanceRef, DeclId, Name, Substitution, TypeId};
use smallvec::SmallVec;

use crate::{BlockId, FuncId, GlobalId, ValueId};

/// Operand list; most aggregates and calls have only a few operands.
pub type Operands = SmallVec<[ValueId; 4]>;

// ── Sub-enums ───────────────────────────────────────────────────────

/// Value conversions that take one operand and produce one typed result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConversionOp {
    Upcast,
    UncheckedRefCast,
    UncheckedAddrCast,
    AddressToPointer,
    PointerToAddress,
    RefToRawPointer,
    RawPointerToRef,
    ConvertFunction,
    ThinToThickFunction,
}

/// Reference-count operations with no result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefCountOp {
    StrongRetain,
    StrongRelease,
    RetainValue,
    ReleaseValue,
    UnownedRetain,
    UnownedRelease,
    DestroyValue,
}

// ── Opcodes ─────────────────────────────────────────────────────────

macro_rules! opcodes {
    ($($name:ident = $value:literal,)*) => {
        /// One-byte instruction discriminant.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum Opcode {
            $($name = $value,)*
        }

        impl Opcode {
            /// Every opcode, in discriminant order.
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            /// Decode a stored opcode byte.
            pub fn from_raw(raw: u8) -> Option<Self> {
                match raw {
                    $($value => Some(Opcode::$name),)*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    // Allocation
    AllocStack = 1,
    AllocRef = 2,
    AllocBox = 3,
    DeallocStack = 4,
    DeallocRef = 5,
    DeallocBox = 6,
    // Literals
    IntegerLiteral = 7,
    FloatLiteral = 8,
    StringLiteral = 9,
    // References to module entities
    FunctionRef = 10,
    GlobalAddr = 11,
    // Memory
    Load = 12,
    Store = 13,
    CopyAddr = 14,
    DestroyAddr = 15,
    IndexAddr = 16,
    ProjectBox = 17,
    // Reference counting
    StrongRetain = 18,
    StrongRelease = 19,
    RetainValue = 20,
    ReleaseValue = 21,
    UnownedRetain = 22,
    UnownedRelease = 23,
    DestroyValue = 24,
    CopyValue = 25,
    // Aggregates
    Struct = 26,
    StructExtract = 27,
    StructElementAddr = 28,
    Tuple = 29,
    TupleExtract = 30,
    TupleElementAddr = 31,
    // Enums
    Enum = 32,
    UncheckedEnumData = 33,
    InitEnumDataAddr = 34,
    InjectEnumAddr = 35,
    // Conversions
    Upcast = 36,
    UncheckedRefCast = 37,
    UncheckedAddrCast = 38,
    AddressToPointer = 39,
    PointerToAddress = 40,
    RefToRawPointer = 41,
    RawPointerToRef = 42,
    ConvertFunction = 43,
    ThinToThickFunction = 44,
    // Existentials
    InitExistential = 45,
    InitExistentialRef = 46,
    OpenExistential = 47,
    OpenExistentialRef = 48,
    DeinitExistential = 49,
    // Dynamic dispatch
    ClassMethod = 50,
    SuperMethod = 51,
    DynamicMethod = 52,
    WitnessMethod = 53,
    // Calls
    Apply = 54,
    PartialApply = 55,
    Builtin = 56,
    // Metatypes and debugging
    Metatype = 57,
    ValueMetatype = 58,
    DebugValue = 59,
    FixLifetime = 60,
    // Terminators
    Return = 61,
    Throw = 62,
    Unreachable = 63,
    Branch = 64,
    CondBranch = 65,
    SwitchInt = 66,
    SwitchEnum = 67,
}

impl Opcode {
    /// The conversion this opcode performs, if it is a conversion.
    pub fn conversion(self) -> Option<ConversionOp> {
        Some(match self {
            Opcode::Upcast => ConversionOp::Upcast,
            Opcode::UncheckedRefCast => ConversionOp::UncheckedRefCast,
            Opcode::UncheckedAddrCast => ConversionOp::UncheckedAddrCast,
            Opcode::AddressToPointer => ConversionOp::AddressToPointer,
            Opcode::PointerToAddress => ConversionOp::PointerToAddress,
            Opcode::RefToRawPointer => ConversionOp::RefToRawPointer,
            Opcode::RawPointerToRef => ConversionOp::RawPointerToRef,
            Opcode::ConvertFunction => ConversionOp::ConvertFunction,
            Opcode::ThinToThickFunction => ConversionOp::ThinToThickFunction,
            _ => return None,
        })
    }

    /// The reference-count operation this opcode performs, if any.
    pub fn ref_count(self) -> Option<RefCountOp> {
        Some(match self {
            Opcode::StrongRetain => RefCountOp::StrongRetain,
            Opcode::StrongRelease => RefCountOp::StrongRelease,
            Opcode::RetainValue => RefCountOp::RetainValue,
            Opcode::ReleaseValue => RefCountOp::ReleaseValue,
            Opcode::UnownedRetain => RefCountOp::UnownedRetain,
            Opcode::UnownedRelease => RefCountOp::UnownedRelease,
            Opcode::DestroyValue => RefCountOp::DestroyValue,
            _ => return None,
        })
    }

    /// Returns `true` for block terminators.
    pub fn is_terminator(self) -> bool {
        self >= Opcode::Return
    }
}

impl ConversionOp {
    pub fn opcode(self) -> Opcode {
        match self {
            ConversionOp::Upcast => Opcode::Upcast,
            ConversionOp::UncheckedRefCast => Opcode::UncheckedRefCast,
            ConversionOp::UncheckedAddrCast => Opcode::UncheckedAddrCast,
            ConversionOp::AddressToPointer => Opcode::AddressToPointer,
            ConversionOp::PointerToAddress => Opcode::PointerToAddress,
            ConversionOp::RefToRawPointer => Opcode::RefToRawPointer,
            ConversionOp::RawPointerToRef => Opcode::RawPointerToRef,
            ConversionOp::ConvertFunction => Opcode::ConvertFunction,
            ConversionOp::ThinToThickFunction => Opcode::ThinToThickFunction,
        }
    }
}

impl RefCountOp {
    pub fn opcode(self) -> Opcode {
        match self {
            RefCountOp::StrongRetain => Opcode::StrongRetain,
            RefCountOp::StrongRelease => Opcode::StrongRelease,
            RefCountOp::RetainValue => Opcode::RetainValue,
            RefCountOp::ReleaseValue => Opcode::ReleaseValue,
            RefCountOp::UnownedRetain => Opcode::UnownedRetain,
            RefCountOp::UnownedRelease => Opcode::UnownedRelease,
            RefCountOp::DestroyValue => Opcode::DestroyValue,
        }
    }
}

// ── Instructions ────────────────────────────────────────────────────

/// Payload of a call-like instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallData {
    pub callee: ValueId,
    /// Type of the callee value.
    pub callee_ty: TypeId,
    pub result_ty: TypeId,
    pub substitutions: Vec<Substitution>,
    pub args: Operands,
}

/// Instruction payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstKind {
    AllocStack { ty: TypeId },
    AllocRef { ty: TypeId },
    /// Produces the box and the address of its contents.
    AllocBox { ty: TypeId },
    DeallocStack { operand: ValueId },
    DeallocRef { operand: ValueId },
    DeallocBox { operand: ValueId },

    IntegerLiteral { ty: TypeId, value: i64 },
    FloatLiteral { ty: TypeId, bits: u64 },
    StringLiteral { ty: TypeId, value: Name },

    FunctionRef { ty: TypeId, func: FuncId },
    GlobalAddr { ty: TypeId, global: GlobalId },

    Load { ty: TypeId, addr: ValueId },
    Store { src: ValueId, dest: ValueId },
    CopyAddr { src: ValueId, dest: ValueId, take: bool },
    DestroyAddr { addr: ValueId },
    IndexAddr { ty: TypeId, base: ValueId, index: ValueId },
    ProjectBox { ty: TypeId, operand: ValueId },

    RefCount { op: RefCountOp, operand: ValueId },
    CopyValue { ty: TypeId, operand: ValueId },

    Struct { ty: TypeId, elements: Operands },
    StructExtract { ty: TypeId, operand: ValueId, field: u32 },
    StructElementAddr { ty: TypeId, operand: ValueId, field: u32 },
    Tuple { ty: TypeId, elements: Operands },
    TupleExtract { ty: TypeId, operand: ValueId, index: u32 },
    TupleElementAddr { ty: TypeId, operand: ValueId, index: u32 },

    Enum { ty: TypeId, case: DeclId, payload: Option<ValueId> },
    UncheckedEnumData { ty: TypeId, operand: ValueId, case: DeclId },
    InitEnumDataAddr { ty: TypeId, operand: ValueId, case: DeclId },
    InjectEnumAddr { operand: ValueId, case: DeclId },

    Conversion { op: ConversionOp, ty: TypeId, operand: ValueId },

    InitExistential { ty: TypeId, operand: ValueId, conformances: Vec<ConformanceRef> },
    InitExistentialRef { ty: TypeId, operand: ValueId, conformances: Vec<ConformanceRef> },
    OpenExistential { ty: TypeId, operand: ValueId },
    OpenExistentialRef { ty: TypeId, operand: ValueId },
    DeinitExistential { operand: ValueId },

    ClassMethod { ty: TypeId, operand: ValueId, member: DeclId },
    SuperMethod { ty: TypeId, operand: ValueId, member: DeclId },
    DynamicMethod { ty: TypeId, operand: ValueId, member: DeclId },
    WitnessMethod { ty: TypeId, lookup_type: TypeId, member: DeclId, conformance: ConformanceRef },

    Apply(CallData),
    PartialApply(CallData),
    Builtin { name: Name, result_ty: TypeId, substitutions: Vec<Substitution>, args: Operands },

    Metatype { ty: TypeId },
    ValueMetatype { ty: TypeId, operand: ValueId },
    DebugValue { operand: ValueId },
    FixLifetime { operand: ValueId },

    Return { operand: ValueId },
    Throw { operand: ValueId },
    Unreachable,
    Branch { dest: BlockId, args: Operands },
    CondBranch {
        cond: ValueId,
        true_dest: BlockId,
        true_args: Operands,
        false_dest: BlockId,
        false_args: Operands,
    },
    SwitchInt { operand: ValueId, cases: Vec<(i64, BlockId)>, default: Option<BlockId> },
    SwitchEnum { operand: ValueId, cases: Vec<(DeclId, BlockId)>, default: Option<BlockId> },
}

impl InstKind {
    /// The one-byte discriminant.
    pub fn opcode(&self) -> Opcode {
        match self {
            InstKind::AllocStack { .. } => Opcode::AllocStack,
            InstKind::AllocRef { .. } => Opcode::AllocRef,
            InstKind::AllocBox { .. } => Opcode::AllocBox,
            InstKind::DeallocStack { .. } => Opcode::DeallocStack,
            InstKind::DeallocRef { .. } => Opcode::DeallocRef,
            InstKind::DeallocBox { .. } => Opcode::DeallocBox,
            InstKind::IntegerLiteral { .. } => Opcode::IntegerLiteral,
            InstKind::FloatLiteral { .. } => Opcode::FloatLiteral,
            InstKind::StringLiteral { .. } => Opcode::StringLiteral,
            InstKind::FunctionRef { .. } => Opcode::FunctionRef,
            InstKind::GlobalAddr { .. } => Opcode::GlobalAddr,
            InstKind::Load { .. } => Opcode::Load,
            InstKind::Store { .. } => Opcode::Store,
            InstKind::CopyAddr { .. } => Opcode::CopyAddr,
            InstKind::DestroyAddr { .. } => Opcode::DestroyAddr,
            InstKind::IndexAddr { .. } => Opcode::IndexAddr,
            InstKind::ProjectBox { .. } => Opcode::ProjectBox,
            InstKind::RefCount { op, .. } => op.opcode(),
            InstKind::CopyValue { .. } => Opcode::CopyValue,
            InstKind::Struct { .. } => Opcode::Struct,
            InstKind::StructExtract { .. } => Opcode::StructExtract,
            InstKind::StructElementAddr { .. } => Opcode::StructElementAddr,
            InstKind::Tuple { .. } => Opcode::Tuple,
            InstKind::TupleExtract { .. } => Opcode::TupleExtract,
            InstKind::TupleElementAddr { .. } => Opcode::TupleElementAddr,
            InstKind::Enum { .. } => Opcode::Enum,
            InstKind::UncheckedEnumData { .. } => Opcode::UncheckedEnumData,
            InstKind::InitEnumDataAddr { .. } => Opcode::InitEnumDataAddr,
            InstKind::InjectEnumAddr { .. } => Opcode::InjectEnumAddr,
            InstKind::Conversion { op, .. } => op.opcode(),
            InstKind::InitExistential { .. } => Opcode::InitExistential,
            InstKind::InitExistentialRef { .. } => Opcode::InitExistentialRef,
            InstKind::OpenExistential { .. } => Opcode::OpenExistential,
            InstKind::OpenExistentialRef { .. } => Opcode::OpenExistentialRef,
            InstKind::DeinitExistential { .. } => Opcode::DeinitExistential,
            InstKind::ClassMethod { .. } => Opcode::ClassMethod,
            InstKind::SuperMethod { .. } => Opcode::SuperMethod,
            InstKind::DynamicMethod { .. } => Opcode::DynamicMethod,
            InstKind::WitnessMethod { .. } => Opcode::WitnessMethod,
            InstKind::Apply(_) => Opcode::Apply,
            InstKind::PartialApply(_) => Opcode::PartialApply,
            InstKind::Builtin { .. } => Opcode::Builtin,
            InstKind::Metatype { .. } => Opcode::Metatype,
            InstKind::ValueMetatype { .. } => Opcode::ValueMetatype,
            InstKind::DebugValue { .. } => Opcode::DebugValue,
            InstKind::FixLifetime { .. } => Opcode::FixLifetime,
            InstKind::Return { .. } => Opcode::Return,
            InstKind::Throw { .. } => Opcode::Throw,
            InstKind::Unreachable => Opcode::Unreachable,
            InstKind::Branch { .. } => Opcode::Branch,
            InstKind::CondBranch { .. } => Opcode::CondBranch,
            InstKind::SwitchInt { .. } => Opcode::SwitchInt,
            InstKind::SwitchEnum { .. } => Opcode::SwitchEnum,
        }
    }

    /// Types of the values this instruction defines, in result order.
    pub fn result_types(&self) -> SmallVec<[TypeId; 2]> {
        let mut out = SmallVec::new();
        match self {
            InstKind::AllocBox { ty } => {
                out.push(*ty);
                out.push(*ty);
            }
            InstKind::AllocStack { ty }
            | InstKind::AllocRef { ty }
            | InstKind::IntegerLiteral { ty, .. }
            | InstKind::FloatLiteral { ty, .. }
            | InstKind::StringLiteral { ty, .. }
            | InstKind::FunctionRef { ty, .. }
            | InstKind::GlobalAddr { ty, .. }
            | InstKind::Load { ty, .. }
            | InstKind::IndexAddr { ty, .. }
            | InstKind::ProjectBox { ty, .. }
            | InstKind::CopyValue { ty, .. }
            | InstKind::Struct { ty, .. }
            | InstKind::StructExtract { ty, .. }
            | InstKind::StructElementAddr { ty, .. }
            | InstKind::Tuple { ty, .. }
            | InstKind::TupleExtract { ty, .. }
            | InstKind::TupleElementAddr { ty, .. }
            | InstKind::Enum { ty, .. }
            | InstKind::UncheckedEnumData { ty, .. }
            | InstKind::InitEnumDataAddr { ty, .. }
            | InstKind::Conversion { ty, .. }
            | InstKind::InitExistential { ty, .. }
            | InstKind::InitExistentialRef { ty, .. }
            | InstKind::OpenExistential { ty, .. }
            | InstKind::OpenExistentialRef { ty, .. }
            | InstKind::ClassMethod { ty, .. }
            | InstKind::SuperMethod { ty, .. }
            | InstKind::DynamicMethod { ty, .. }
            | InstKind::WitnessMethod { ty, .. }
            | InstKind::Metatype { ty }
            | InstKind::ValueMetatype { ty, .. } => out.push(*ty),
            InstKind::Apply(call) | InstKind::PartialApply(call) => out.push(call.result_ty),
            InstKind::Builtin { result_ty, .. } => out.push(*result_ty),
            InstKind::DeallocStack { .. }
            | InstKind::DeallocRef { .. }
            | InstKind::DeallocBox { .. }
            | InstKind::Store { .. }
            | InstKind::CopyAddr { .. }
            | InstKind::DestroyAddr { .. }
            | InstKind::RefCount { .. }
            | InstKind::InjectEnumAddr { .. }
            | InstKind::DeinitExistential { .. }
            | InstKind::DebugValue { .. }
            | InstKind::FixLifetime { .. }
            | InstKind::Return { .. }
            | InstKind::Throw { .. }
            | InstKind::Unreachable
            | InstKind::Branch { .. }
            | InstKind::CondBranch { .. }
            | InstKind::SwitchInt { .. }
            | InstKind::SwitchEnum { .. } => {}
        }
        out
    }

    /// Number of values this instruction defines.
    pub fn result_count(&self) -> usize {
        self.result_types().len()
    }

    /// Returns `true` for block terminators.
    pub fn is_terminator(&self) -> bool {
        self.opcode().is_terminator()
    }

    /// Visit every value operand mutably, in storage order.
    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut ValueId)) {
        match self {
            InstKind::AllocStack { .. }
            | InstKind::AllocRef { .. }
            | InstKind::AllocBox { .. }
            | InstKind::IntegerLiteral { .. }
            | InstKind::FloatLiteral { .. }
            | InstKind::StringLiteral { .. }
            | InstKind::FunctionRef { .. }
            | InstKind::GlobalAddr { .. }
            | InstKind::WitnessMethod { .. }
            | InstKind::Metatype { .. }
            | InstKind::Unreachable => {}
            InstKind::DeallocStack { operand }
            | InstKind::DeallocRef { operand }
            | InstKind::DeallocBox { operand }
            | InstKind::ProjectBox { operand, .. }
            | InstKind::RefCount { operand, .. }
            | InstKind::CopyValue { operand, .. }
            | InstKind::StructExtract { operand, .. }
            | InstKind::StructElementAddr { operand, .. }
            | InstKind::TupleExtract { operand, .. }
            | InstKind::TupleElementAddr { operand, .. }
            | InstKind::UncheckedEnumData { operand, .. }
            | InstKind::InitEnumDataAddr { operand, .. }
            | InstKind::InjectEnumAddr { operand, .. }
            | InstKind::Conversion { operand, .. }
            | InstKind::InitExistential { operand, .. }
            | InstKind::InitExistentialRef { operand, .. }
            | InstKind::OpenExistential { operand, .. }
            | InstKind::OpenExistentialRef { operand, .. }
            | InstKind::DeinitExistential { operand }
            | InstKind::ClassMethod { operand, .. }
            | InstKind::SuperMethod { operand, .. }
            | InstKind::DynamicMethod { operand, .. }
            | InstKind::ValueMetatype { operand, .. }
            | InstKind::DebugValue { operand }
            | InstKind::FixLifetime { operand }
            | InstKind::Return { operand }
            | InstKind::Throw { operand }
            | InstKind::SwitchInt { operand, .. }
            | InstKind::SwitchEnum { operand, .. } => f(operand),
            InstKind::Load { addr, .. } | InstKind::DestroyAddr { addr } => f(addr),
            InstKind::Store { src, dest } | InstKind::CopyAddr { src, dest, .. } => {
                f(src);
                f(dest);
            }
            InstKind::IndexAddr { base, index, .. } => {
                f(base);
                f(index);
            }
            InstKind::Struct { elements, .. } | InstKind::Tuple { elements, .. } => {
                elements.iter_mut().for_each(f);
            }
            InstKind::Enum { payload, .. } => {
                if let Some(payload) = payload {
                    f(payload);
                }
            }
            InstKind::Apply(call) | InstKind::PartialApply(call) => {
                f(&mut call.callee);
                call.args.iter_mut().for_each(f);
            }
            InstKind::Builtin { args, .. } | InstKind::Branch { args, .. } => {
                args.iter_mut().for_each(f);
            }
            InstKind::CondBranch {
                cond,
                true_args,
                false_args,
                ..
            } => {
                f(cond);
                true_args.iter_mut().for_each(&mut f);
                false_args.iter_mut().for_each(f);
            }
        }
    }

    /// Value operands, in storage order.
    pub fn operands(&self) -> Vec<ValueId> {
        let mut out = Vec::new();
        // Visiting needs `&mut`; work on a copy of the operands only.
        let mut copy = self.clone();
        copy.for_each_operand_mut(|v| out.push(*v));
        out
    }

    /// Replace every use of `old` with `new`.
    pub fn substitute_value(&mut self, old: ValueId, new: ValueId) {
        self.for_each_operand_mut(|v| {
            if *v == old {
                *v = new;
            }
        });
    }

    /// Blocks this terminator can transfer control to.
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        let mut out = SmallVec::new();
        match self {
            InstKind::Branch { dest, .. } => out.push(*dest),
            InstKind::CondBranch {
                true_dest,
                false_dest,
                ..
            } => {
                out.push(*true_dest);
                out.push(*false_dest);
            }
            InstKind::SwitchInt { cases, default, .. } => {
                out.extend(cases.iter().map(|&(_, b)| b));
                out.extend(*default);
            }
            InstKind::SwitchEnum { cases, default, .. } => {
                out.extend(cases.iter().map(|&(_, b)| b));
                out.extend(*default);
            }
            _ => {}
        }
        out
    }

    /// Visit every successor block mutably.
    pub fn for_each_successor_mut(&mut self, mut f: impl FnMut(&mut BlockId)) {
        match self {
            InstKind::Branch { dest, .. } => f(dest),
            InstKind::CondBranch {
                true_dest,
                false_dest,
                ..
            } => {
                f(true_dest);
                f(false_dest);
            }
            InstKind::SwitchInt { cases, default, .. } => {
                cases.iter_mut().for_each(|(_, b)| f(b));
                if let Some(b) = default {
                    f(b);
                }
            }
            InstKind::SwitchEnum { cases, default, .. } => {
                cases.iter_mut().for_each(|(_, b)| f(b));
                if let Some(b) = default {
                    f(b);
                }
            }
            _ => {}
        }
    }
}

/// An instruction together with the values it defines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub kind: InstKind,
    pub results: SmallVec<[ValueId; 1]>,
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        self.kind.opcode()
    }
}
