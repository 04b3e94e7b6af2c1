//! In-process key-value store with Redis-compatible HyperLogLog and bitmap semantics.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::trace;

use crate::application::repos::{KeyValueStore, StoreError};
use crate::cache::lock::{rw_read, rw_write};

use super::hyperloglog::HyperLogLog;

const SOURCE: &str = "infra::kv::memory";

#[derive(Debug, Clone)]
enum StoredValue {
    Sketch(HyperLogLog),
    Bitmap(Vec<u8>),
}

#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, StoredValue>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        rw_read(&self.entries, SOURCE, "contains_key").contains_key(key)
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
    }
}

fn sketch_at<'a>(
    entries: &'a HashMap<String, StoredValue>,
    key: &str,
) -> Result<Option<&'a HyperLogLog>, StoreError> {
    match entries.get(key) {
        None => Ok(None),
        Some(StoredValue::Sketch(hll)) => Ok(Some(hll)),
        Some(StoredValue::Bitmap(_)) => Err(wrong_type(key)),
    }
}

fn bitmap_at<'a>(
    entries: &'a HashMap<String, StoredValue>,
    key: &str,
) -> Result<Option<&'a [u8]>, StoreError> {
    match entries.get(key) {
        None => Ok(None),
        Some(StoredValue::Bitmap(bytes)) => Ok(Some(bytes)),
        Some(StoredValue::Sketch(_)) => Err(wrong_type(key)),
    }
}

/// Bit 0 is the most significant bit of byte 0.
fn bit_position(offset: u32) -> (usize, u8) {
    ((offset / 8) as usize, 0x80 >> (offset % 8))
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn approx_add(&self, key: &str, element: &str) -> Result<bool, StoreError> {
        let mut entries = rw_write(&self.entries, SOURCE, "approx_add");
        let value = entries
            .entry(key.to_string())
            .or_insert_with(|| StoredValue::Sketch(HyperLogLog::new()));
        match value {
            StoredValue::Sketch(hll) => Ok(hll.insert(element)),
            StoredValue::Bitmap(_) => Err(wrong_type(key)),
        }
    }

    async fn approx_union_cardinality(
        &self,
        dest: &str,
        sources: &[String],
    ) -> Result<u64, StoreError> {
        let mut entries = rw_write(&self.entries, SOURCE, "approx_union_cardinality");

        // An existing destination takes part in the merge.
        let mut merged = sketch_at(&entries, dest)?.cloned().unwrap_or_default();
        for source in sources {
            if let Some(hll) = sketch_at(&entries, source)? {
                merged.merge(hll);
            }
        }

        let estimate = merged.count();
        trace!(dest, sources = sources.len(), estimate, "Merged sketches");
        entries.insert(dest.to_string(), StoredValue::Sketch(merged));
        Ok(estimate)
    }

    async fn set_bit(&self, key: &str, offset: u32, value: bool) -> Result<bool, StoreError> {
        let mut entries = rw_write(&self.entries, SOURCE, "set_bit");
        let stored = entries
            .entry(key.to_string())
            .or_insert_with(|| StoredValue::Bitmap(Vec::new()));
        let StoredValue::Bitmap(bytes) = stored else {
            return Err(wrong_type(key));
        };

        let (byte, mask) = bit_position(offset);
        if bytes.len() <= byte {
            bytes.resize(byte + 1, 0);
        }
        let previous = bytes[byte] & mask != 0;
        if value {
            bytes[byte] |= mask;
        } else {
            bytes[byte] &= !mask;
        }
        Ok(previous)
    }

    async fn bit_or(&self, dest: &str, sources: &[String]) -> Result<u64, StoreError> {
        let mut entries = rw_write(&self.entries, SOURCE, "bit_or");

        let mut merged: Vec<u8> = Vec::new();
        for source in sources {
            let Some(bytes) = bitmap_at(&entries, source)? else {
                continue;
            };
            if merged.len() < bytes.len() {
                merged.resize(bytes.len(), 0);
            }
            for (acc, byte) in merged.iter_mut().zip(bytes) {
                *acc |= byte;
            }
        }

        let len = merged.len() as u64;
        if merged.is_empty() {
            entries.remove(dest);
        } else {
            entries.insert(dest.to_string(), StoredValue::Bitmap(merged));
        }
        Ok(len)
    }

    async fn bit_count(&self, key: &str) -> Result<u64, StoreError> {
        let entries = rw_read(&self.entries, SOURCE, "bit_count");
        let count = bitmap_at(&entries, key)?
            .map(|bytes| bytes.iter().map(|b| u64::from(b.count_ones())).sum())
            .unwrap_or(0);
        Ok(count)
    }
}
