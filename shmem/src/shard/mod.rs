//! A shard is a fixed-capacity FIFO ring of entries plus per-key bookkeeping.
//!
//! Everything here lives inside the shared segment, so the types are `#[repr(C)]`, contain no
//! pointers, and are valid when zeroed. Writers mutate a shard through `&mut Shard` while holding
//! the access gate exclusively. Readers only get `&Shard`; the one field they move, the round-robin
//! cursor, is atomic.

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::trace;

use crate::core::keys::{stored_bytes, Key, Value};
use crate::core::{KEY_SIZE, SLOTS_PER_SHARD, VALUE_SIZE};
use crate::errors::{KvError, Result};

const UNSET: u32 = u32::MAX;

#[repr(C)]
pub struct Entry {
    pub key: [u8; KEY_SIZE],
    pub value: [u8; VALUE_SIZE],
}

#[repr(C)]
pub struct KeyInfo {
    pub key: [u8; KEY_SIZE],
    // Live entries carrying this key.
    pub count: u32,
    // Slot most recently handed out by a read, or UNSET.
    last_viewed: AtomicU32,
}

impl KeyInfo {
    #[inline]
    pub fn last_viewed(&self) -> Option<usize> {
        match self.last_viewed.load(Ordering::Relaxed) {
            UNSET => None,
            slot => Some(slot as usize),
        }
    }

    #[inline]
    fn set_last_viewed(&self, slot: Option<usize>) {
        let raw = slot.map_or(UNSET, |s| s as u32);
        self.last_viewed.store(raw, Ordering::Relaxed);
    }

    fn clear(&mut self) {
        self.key = [0; KEY_SIZE];
        self.count = 0;
        self.set_last_viewed(None);
    }
}

#[repr(C)]
pub struct Shard {
    entries: [Entry; SLOTS_PER_SHARD],
    size: u32,
    head: u32,
    tail: u32,
    keys: [KeyInfo; SLOTS_PER_SHARD],
}

impl Shard {
    /// Brings a shard to its empty state in place. Shards are far too large to build on the stack.
    pub fn reset(&mut self) {
        self.size = 0;
        self.head = 0;
        self.tail = 0;
        for entry in self.entries.iter_mut() {
            entry.key = [0; KEY_SIZE];
            entry.value = [0; VALUE_SIZE];
        }
        for info in self.keys.iter_mut() {
            info.clear();
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn head(&self) -> usize {
        self.head as usize
    }

    #[inline]
    pub fn tail(&self) -> usize {
        self.tail as usize
    }

    pub fn key_info(&self, key: &Key) -> Option<&KeyInfo> {
        self.key_info_index(key.padded()).map(|i| &self.keys[i])
    }

    fn key_info_index(&self, key: &[u8; KEY_SIZE]) -> Option<usize> {
        self.keys.iter().position(|info| info.count > 0 && &info.key == key)
    }

    /// Appends an entry at the tail, evicting the oldest entry when the ring is full.
    pub fn insert(&mut self, key: &Key, value: &Value) -> Result<()> {
        let full = self.len() == SLOTS_PER_SHARD;
        // Resolve the victim's bookkeeping before touching anything.
        let victim = if full {
            let head = self.head();
            let index = self.key_info_index(&self.entries[head].key).ok_or_else(|| {
                KvError::Logic(format!("no key info for the entry at slot {}", head))
            })?;
            Some(index)
        } else {
            None
        };

        if let Some(index) = victim {
            self.evict_head(index);
        } else {
            self.size += 1;
        }

        if self.size != 1 {
            self.tail = (self.tail + 1) % SLOTS_PER_SHARD as u32;
        }

        let entry = &mut self.entries[self.tail as usize];
        entry.key = *key.padded();
        entry.value = *value.padded();

        match self.key_info_index(key.padded()) {
            Some(index) => self.keys[index].count += 1,
            None => {
                let info = self.keys.iter_mut().find(|info| info.count == 0).ok_or_else(|| {
                    KvError::Logic("no free key info slot".to_string())
                })?;
                info.key = *key.padded();
                info.count = 1;
                info.set_last_viewed(None);
            }
        }
        Ok(())
    }

    fn evict_head(&mut self, info_index: usize) {
        let head = self.head();
        let info = &mut self.keys[info_index];
        info.count -= 1;
        trace!(slot = head, remaining = info.count, "evicting oldest entry");
        if info.count == 0 {
            info.clear();
        } else if info.last_viewed() == Some(head) {
            // The slot is about to be overwritten.
            info.set_last_viewed(None);
        }
        self.head = (self.head + 1) % SLOTS_PER_SHARD as u32;
    }

    /// Returns the next value of `key` in round-robin order and moves the key's cursor to it.
    ///
    /// A key with a single live entry and a set cursor is answered from the cursor directly.
    /// Otherwise the ring is scanned forward from the slot after the cursor (or from the oldest
    /// entry when the cursor is unset) to the next slot holding `key`.
    pub fn next_value(&self, key: &Key) -> Result<Option<Vec<u8>>> {
        let info = match self.key_info(key) {
            Some(info) => info,
            None => return Ok(None),
        };
        let last = info.last_viewed();
        if let (Some(slot), 1) = (last, info.count) {
            return Ok(Some(stored_bytes(&self.entries[slot].value)));
        }

        let size = self.len();
        let mut slot = match last {
            Some(l) => (l + 1) % size,
            None => self.head() % size,
        };
        for _ in 0..size {
            if &self.entries[slot].key == key.padded() {
                info.set_last_viewed(Some(slot));
                return Ok(Some(stored_bytes(&self.entries[slot].value)));
            }
            slot = (slot + 1) % size;
        }
        Err(KvError::Logic(format!("{:?} is counted but has no entry", key)))
    }

    /// Runs the cursor `count` times, `count` being taken once up front.
    pub fn all_values(&self, key: &Key) -> Result<Option<Vec<Vec<u8>>>> {
        let count = match self.key_info(key) {
            Some(info) => info.count as usize,
            None => return Ok(None),
        };
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            match self.next_value(key)? {
                Some(v) => values.push(v),
                None => return Ok(None),
            }
        }
        Ok(Some(values))
    }
}

#[cfg(test)]
pub(crate) fn empty_shard() -> Box<Shard> {
    use std::alloc::{alloc_zeroed, Layout};

    // Every field of Shard is an integer, an integer array or an atomic integer.
    let layout = Layout::new::<Shard>();
    let mut shard = unsafe {
        let ptr = alloc_zeroed(layout) as *mut Shard;
        assert!(!ptr.is_null());
        Box::from_raw(ptr)
    };
    shard.reset();
    shard
}
