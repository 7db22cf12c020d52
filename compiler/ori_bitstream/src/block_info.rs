//! Block-info: names and shared abbreviations for each block kind.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::Abbrev;

/// Everything the block-info block says about one block id.
#[derive(Clone, Debug, Default)]
pub struct BlockInfoEntry {
    /// Abbreviations installed whenever a block with this id is entered.
    pub abbrevs: Vec<Arc<Abbrev>>,
    /// Human-readable block name, if one was recorded.
    pub name: Option<String>,
    /// Human-readable record names keyed by record code.
    pub record_names: FxHashMap<u32, String>,
}

/// Self-description gathered from a stream's block-info block(s).
#[derive(Clone, Debug, Default)]
pub struct BlockInfo {
    blocks: FxHashMap<u32, BlockInfoEntry>,
}

impl BlockInfo {
    /// Entry for `block_id`, if the stream described it.
    pub fn entry(&self, block_id: u32) -> Option<&BlockInfoEntry> {
        self.blocks.get(&block_id)
    }

    pub(crate) fn entry_mut(&mut self, block_id: u32) -> &mut BlockInfoEntry {
        self.blocks.entry(block_id).or_default()
    }

    /// Name recorded for `block_id`.
    pub fn block_name(&self, block_id: u32) -> Option<&str> {
        self.entry(block_id).and_then(|e| e.name.as_deref())
    }

    /// Name recorded for record `code` inside `block_id`.
    pub fn record_name(&self, block_id: u32, code: u32) -> Option<&str> {
        self.entry(block_id)
            .and_then(|e| e.record_names.get(&code))
            .map(String::as_str)
    }

    /// Abbreviations to install on entry into `block_id`.
    pub fn abbrevs(&self, block_id: u32) -> &[Arc<Abbrev>] {
        self.entry(block_id).map_or(&[], |e| e.abbrevs.as_slice())
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Decode a name stored one character per operand.
pub(crate) fn name_from_fields(fields: &[u64]) -> String {
    fields
        .iter()
        .map(|&c| char::from(u8::try_from(c).unwrap_or(b'?')))
        .collect()
}
