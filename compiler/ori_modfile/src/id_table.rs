//! Writer-side id assignment.
//!
//! An [`IdTable`] hands out 1-based ids in first-reference order and keeps
//! every entity it has seen on a FIFO worklist. The writer drains the
//! worklists until no new entity is referenced, which flattens a cyclic
//! graph breadth-first.

use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::SerializeError;

pub(crate) struct IdTable<K> {
    ids: FxHashMap<K, u32>,
    order: Vec<K>,
    /// Next entry of `order` to hand out from the worklist.
    next: usize,
    name: &'static str,
}

impl<K: Copy + Eq + Hash> IdTable<K> {
    pub(crate) fn new(name: &'static str) -> Self {
        IdTable {
            ids: FxHashMap::default(),
            order: Vec::new(),
            next: 0,
            name,
        }
    }

    /// The id of `key`, assigning the next one (and queueing `key`) if it
    /// has none yet.
    pub(crate) fn add_ref(&mut self, key: K) -> u32 {
        if let Some(&id) = self.ids.get(&key) {
            return id;
        }
        self.order.push(key);
        let id = self.order.len() as u32;
        self.ids.insert(key, id);
        id
    }

    /// Next queued entity, in id order.
    pub(crate) fn pop_next(&mut self) -> Option<K> {
        let key = self.order.get(self.next).copied()?;
        self.next += 1;
        Some(key)
    }

    pub(crate) fn is_drained(&self) -> bool {
        self.next == self.order.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    /// Entities in id order (index `i` has id `i + 1`).
    pub(crate) fn entries(&self) -> &[K] {
        &self.order
    }

    /// Fail if the table outgrew 32-bit ids.
    pub(crate) fn check_capacity(&self) -> Result<(), SerializeError> {
        if self.order.len() >= u32::MAX as usize {
            return Err(SerializeError::IdOverflow { table: self.name });
        }
        Ok(())
    }
}
