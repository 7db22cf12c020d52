//! Functions, blocks and values.
//!
//! A [`FunctionBody`] owns two arenas: blocks and values. Every block
//! argument and every instruction result gets a [`ValueId`]; a value whose
//! definition has not been seen yet can be stood in for by a placeholder
//! and later replaced everywhere with [`FunctionBody::replace_all_uses`].

use bitflags::bitflags;
use ori_sema::{DeclId, Name, TypeId};
use smallvec::SmallVec;

use crate::{BlockId, InstKind, Instruction, ValueId};

/// Symbol linkage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Linkage {
    Public = 0,
    Hidden = 1,
    Shared = 2,
    Private = 3,
    PublicExternal = 4,
    HiddenExternal = 5,
}

impl Linkage {
    /// Decode a stored linkage byte.
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Linkage::Public,
            1 => Linkage::Hidden,
            2 => Linkage::Shared,
            3 => Linkage::Private,
            4 => Linkage::PublicExternal,
            5 => Linkage::HiddenExternal,
            _ => return None,
        })
    }

    /// Returns `true` if the symbol is defined in another module.
    pub fn is_external(self) -> bool {
        matches!(self, Linkage::PublicExternal | Linkage::HiddenExternal)
    }
}

bitflags! {
    /// Function attributes.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct FunctionAttrs: u8 {
        /// Body may be inlined into clients.
        const TRANSPARENT = 1 << 0;
        /// Compiler-generated forwarding function.
        const THUNK = 1 << 1;
        /// Initializer of a global.
        const GLOBAL_INIT = 1 << 2;
    }
}

// ── Values ──────────────────────────────────────────────────────────

/// Where a value comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueDef {
    BlockArg { block: BlockId, index: u32 },
    Result { block: BlockId, inst: u32, index: u32 },
    /// Stands in for a value whose definition has not been seen yet.
    Placeholder,
    /// Defined in a block that was removed from the body.
    Discarded,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueData {
    pub ty: Option<TypeId>,
    pub def: ValueDef,
}

// ── Blocks ──────────────────────────────────────────────────────────

/// A basic block: arguments plus instructions, the last of which is the
/// terminator once the block is complete.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TirBlock {
    pub args: Vec<ValueId>,
    pub insts: Vec<Instruction>,
}

impl TirBlock {
    /// The terminator, if the block has one.
    pub fn terminator(&self) -> Option<&Instruction> {
        self.insts.last().filter(|i| i.kind.is_terminator())
    }
}

/// The body of a function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FunctionBody {
    pub blocks: Vec<TirBlock>,
    pub values: Vec<ValueData>,
}

impl FunctionBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an empty block.
    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId::from_len(self.blocks.len());
        self.blocks.push(TirBlock::default());
        id
    }

    pub fn block(&self, id: BlockId) -> &TirBlock {
        &self.blocks[id.index()]
    }

    pub fn value(&self, id: ValueId) -> &ValueData {
        &self.values[id.index()]
    }

    fn new_value(&mut self, ty: Option<TypeId>, def: ValueDef) -> ValueId {
        let id = ValueId::from_len(self.values.len());
        self.values.push(ValueData { ty, def });
        id
    }

    /// Append an argument to `block`.
    pub fn add_block_arg(&mut self, block: BlockId, ty: TypeId) -> ValueId {
        let index = self.blocks[block.index()].args.len() as u32;
        let id = self.new_value(Some(ty), ValueDef::BlockArg { block, index });
        self.blocks[block.index()].args.push(id);
        id
    }

    /// Append an instruction to `block`, allocating its results.
    pub fn push_inst(&mut self, block: BlockId, kind: InstKind) -> SmallVec<[ValueId; 1]> {
        let inst = self.blocks[block.index()].insts.len() as u32;
        let results: SmallVec<[ValueId; 1]> = kind
            .result_types()
            .into_iter()
            .enumerate()
            .map(|(index, ty)| {
                self.new_value(
                    Some(ty),
                    ValueDef::Result {
                        block,
                        inst,
                        index: index as u32,
                    },
                )
            })
            .collect();
        self.blocks[block.index()].insts.push(Instruction {
            kind,
            results: results.clone(),
        });
        results
    }

    /// Allocate a placeholder value.
    pub fn add_placeholder(&mut self, ty: Option<TypeId>) -> ValueId {
        self.new_value(ty, ValueDef::Placeholder)
    }

    /// Replace every operand use of `old` with `new`.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) {
        for block in &mut self.blocks {
            for inst in &mut block.insts {
                inst.kind.substitute_value(old, new);
            }
        }
    }

    /// Returns `true` if any instruction uses `value`.
    pub fn has_uses(&self, value: ValueId) -> bool {
        self.blocks
            .iter()
            .flat_map(|b| &b.insts)
            .any(|i| i.kind.operands().contains(&value))
    }

    /// Remove the given blocks, renumbering the rest and every successor
    /// reference. Values defined in removed blocks become
    /// [`ValueDef::Discarded`].
    pub fn remove_blocks(&mut self, removed: &[BlockId]) {
        if removed.is_empty() {
            return;
        }
        let mut remap: Vec<Option<BlockId>> = Vec::with_capacity(self.blocks.len());
        let mut next = 0usize;
        for i in 0..self.blocks.len() {
            if removed.contains(&BlockId::from_len(i)) {
                remap.push(None);
            } else {
                remap.push(Some(BlockId::from_len(next)));
                next += 1;
            }
        }

        let old_blocks = std::mem::take(&mut self.blocks);
        for (i, block) in old_blocks.into_iter().enumerate() {
            if remap[i].is_some() {
                self.blocks.push(block);
            }
        }
        for block in &mut self.blocks {
            for inst in &mut block.insts {
                inst.kind.for_each_successor_mut(|b| {
                    if let Some(Some(new)) = remap.get(b.index()) {
                        *b = *new;
                    }
                });
            }
        }
        let moved = |block: BlockId| remap.get(block.index()).copied().flatten();
        for value in &mut self.values {
            value.def = match value.def {
                ValueDef::BlockArg { block, index } => moved(block)
                    .map_or(ValueDef::Discarded, |block| ValueDef::BlockArg { block, index }),
                ValueDef::Result { block, inst, index } => moved(block)
                    .map_or(ValueDef::Discarded, |block| ValueDef::Result { block, inst, index }),
                def @ (ValueDef::Placeholder | ValueDef::Discarded) => def,
            };
        }
    }

    /// Number of instructions across all blocks.
    pub fn inst_count(&self) -> usize {
        self.blocks.iter().map(|b| b.insts.len()).sum()
    }
}

// ── Functions ───────────────────────────────────────────────────────

/// An IR function. `body` is `None` for declarations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TirFunction {
    /// Linkage (symbol) name.
    pub name: Name,
    pub linkage: Linkage,
    /// Lowered function type.
    pub ty: TypeId,
    pub attrs: FunctionAttrs,
    /// Source declaration, if the function implements one.
    pub decl: Option<DeclId>,
    pub body: Option<FunctionBody>,
}

impl TirFunction {
    /// A body-less function.
    pub fn declaration(name: Name, linkage: Linkage, ty: TypeId) -> Self {
        TirFunction {
            name,
            linkage,
            ty,
            attrs: FunctionAttrs::empty(),
            decl: None,
            body: None,
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.body.is_none()
    }
}

#[cfg(test)]
mod tests;
