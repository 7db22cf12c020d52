//! Chained on-disk hash tables.
//!
//! A table is a byte blob that can be probed without decoding anything but
//! the one bucket a key hashes to. Layout, all integers little-endian:
//!
//! ```text
//! byte 0                     reserved (so offset 0 means "empty bucket")
//! bucket:                    u16 item count, then per item:
//!                              u32 hash, u16 key length, u16 data length,
//!                              key bytes, data bytes
//! table (at table offset):   u32 bucket count (power of two),
//!                            u32 entry count,
//!                            u32 bucket offset * bucket count
//! ```
//!
//! Keys are hashed with Bernstein's djb hash.

use rustc_hash::FxHashMap;

use crate::TableError;

/// Bernstein hash (`h * 33 + c`, seed 5381).
pub fn djb_hash(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(5381u32, |h, &b| h.wrapping_mul(33).wrapping_add(u32::from(b)))
}

// ── Builder ─────────────────────────────────────────────────────────

/// Accumulates key/data pairs; [`finish`](Self::finish) lays out the blob.
#[derive(Default)]
pub struct OnDiskTableBuilder {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    positions: FxHashMap<Vec<u8>, usize>,
}

impl OnDiskTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `data` under `key`. Adding to an existing key appends to its
    /// data.
    pub fn insert(&mut self, key: &[u8], data: &[u8]) {
        if let Some(&pos) = self.positions.get(key) {
            self.entries[pos].1.extend_from_slice(data);
        } else {
            self.positions.insert(key.to_vec(), self.entries.len());
            self.entries.push((key.to_vec(), data.to_vec()));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lay out the table. Returns the blob and the table offset.
    pub fn finish(self) -> Result<(Vec<u8>, u32), TableError> {
        let num_entries =
            u32::try_from(self.entries.len()).map_err(|_| TableError::TooManyEntries)?;
        // Load factor of at most 3/4.
        let num_buckets = (self.entries.len() * 4 / 3 + 1).next_power_of_two();
        let mask = num_buckets as u32 - 1;

        let mut buckets: Vec<Vec<(u32, &[u8], &[u8])>> = vec![Vec::new(); num_buckets];
        for (key, data) in &self.entries {
            let hash = djb_hash(key);
            buckets[(hash & mask) as usize].push((hash, key, data));
        }

        let mut blob = vec![0u8];
        let mut offsets = Vec::with_capacity(num_buckets);
        for bucket in &buckets {
            if bucket.is_empty() {
                offsets.push(0u32);
                continue;
            }
            offsets.push(u32::try_from(blob.len()).map_err(|_| TableError::TooManyEntries)?);
            let count = u16::try_from(bucket.len()).map_err(|_| TableError::TooManyEntries)?;
            blob.extend_from_slice(&count.to_le_bytes());
            for &(hash, key, data) in bucket {
                let key_len =
                    u16::try_from(key.len()).map_err(|_| TableError::KeyTooLong(key.len()))?;
                let data_len =
                    u16::try_from(data.len()).map_err(|_| TableError::DataTooLong(data.len()))?;
                blob.extend_from_slice(&hash.to_le_bytes());
                blob.extend_from_slice(&key_len.to_le_bytes());
                blob.extend_from_slice(&data_len.to_le_bytes());
                blob.extend_from_slice(key);
                blob.extend_from_slice(data);
            }
        }

        let table_offset = u32::try_from(blob.len()).map_err(|_| TableError::TooManyEntries)?;
        blob.extend_from_slice(&(num_buckets as u32).to_le_bytes());
        blob.extend_from_slice(&num_entries.to_le_bytes());
        for offset in offsets {
            blob.extend_from_slice(&offset.to_le_bytes());
        }
        Ok((blob, table_offset))
    }
}

// ── Reader ──────────────────────────────────────────────────────────

/// A table opened over its blob.
#[derive(Clone, Debug)]
pub struct OnDiskTable {
    blob: Vec<u8>,
    table_offset: u32,
    num_buckets: u32,
    num_entries: u32,
}

fn read_u16(blob: &[u8], at: usize) -> Option<u16> {
    let bytes = blob.get(at..at.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(blob: &[u8], at: usize) -> Option<u32> {
    let bytes = blob.get(at..at.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

impl OnDiskTable {
    /// Open a table, validating its header.
    pub fn open(blob: Vec<u8>, table_offset: u32) -> Result<Self, TableError> {
        let at = table_offset as usize;
        let header = TableError::Header(table_offset);
        let num_buckets = read_u32(&blob, at).ok_or(header.clone())?;
        let num_entries = read_u32(&blob, at + 4).ok_or(header.clone())?;
        if !num_buckets.is_power_of_two() {
            return Err(header);
        }
        let end = (num_buckets as usize)
            .checked_mul(4)
            .and_then(|n| n.checked_add(at + 8))
            .ok_or(header.clone())?;
        if end > blob.len() {
            return Err(header);
        }
        Ok(OnDiskTable {
            blob,
            table_offset,
            num_buckets,
            num_entries,
        })
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.num_entries as usize
    }

    pub fn is_empty(&self) -> bool {
        self.num_entries == 0
    }

    fn bucket_offset(&self, bucket: u32) -> u32 {
        let at = self.table_offset as usize + 8 + bucket as usize * 4;
        // In range: checked by `open`.
        read_u32(&self.blob, at).unwrap_or(0)
    }

    /// Data stored under `key`, if any.
    pub fn lookup(&self, key: &[u8]) -> Result<Option<&[u8]>, TableError> {
        let hash = djb_hash(key);
        let offset = self.bucket_offset(hash & (self.num_buckets - 1));
        if offset == 0 {
            return Ok(None);
        }
        for item in self.bucket_items(offset)? {
            let (item_hash, item_key, data) = item;
            if item_hash == hash && item_key == key {
                return Ok(Some(data));
            }
        }
        Ok(None)
    }

    /// Every key/data pair, bucket by bucket.
    pub fn entries(&self) -> Result<Vec<(&[u8], &[u8])>, TableError> {
        let mut out = Vec::with_capacity(self.len());
        for bucket in 0..self.num_buckets {
            let offset = self.bucket_offset(bucket);
            if offset != 0 {
                out.extend(self.bucket_items(offset)?.into_iter().map(|(_, k, d)| (k, d)));
            }
        }
        Ok(out)
    }

    fn bucket_items(&self, offset: u32) -> Result<Vec<(u32, &[u8], &[u8])>, TableError> {
        let truncated = TableError::Bucket(offset);
        let blob = self.blob.as_slice();
        let mut at = offset as usize;
        let count = read_u16(blob, at).ok_or(truncated.clone())?;
        at += 2;
        let mut items = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let hash = read_u32(blob, at).ok_or(truncated.clone())?;
            let key_len = usize::from(read_u16(blob, at + 4).ok_or(truncated.clone())?);
            let data_len = usize::from(read_u16(blob, at + 6).ok_or(truncated.clone())?);
            at += 8;
            let key = blob.get(at..at + key_len).ok_or(truncated.clone())?;
            at += key_len;
            let data = blob.get(at..at + data_len).ok_or(truncated.clone())?;
            at += data_len;
            items.push((hash, key, data));
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests;
