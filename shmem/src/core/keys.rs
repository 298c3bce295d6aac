use std::fmt;

use crate::errors::{KvError, Result};

use super::{KEY_SIZE, NUM_SHARDS, VALUE_SIZE};

/// Cuts `input` to what fits in a NUL-terminated field of `width` bytes.
///
/// Bytes from the first NUL onward are dropped, and at most `width - 1` bytes are kept. Writers and
/// readers both go through this, so an over-long key hashes and compares the same on either path.
#[inline]
pub fn truncate(input: &[u8], width: usize) -> &[u8] {
    let end = input.iter().position(|&b| b == 0).unwrap_or(input.len());
    &input[..end.min(width - 1)]
}

#[inline]
fn pad<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out[..bytes.len()].copy_from_slice(bytes);
    out
}

#[inline]
fn terminated(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

/// A key truncated and NUL-padded to the store's fixed key width.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Key {
    bytes: [u8; KEY_SIZE],
}

impl Key {
    pub fn new<K: AsRef<[u8]>>(raw: K) -> Result<Key> {
        let bytes = truncate(raw.as_ref(), KEY_SIZE);
        if bytes.is_empty() {
            return Err(KvError::InvalidKey);
        }
        Ok(Key { bytes: pad(bytes) })
    }

    #[inline]
    pub fn padded(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        terminated(&self.bytes)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({:?})", String::from_utf8_lossy(self.as_bytes()))
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Value {
    bytes: [u8; VALUE_SIZE],
}

impl Value {
    pub fn new<V: AsRef<[u8]>>(raw: V) -> Value {
        Value { bytes: pad(truncate(raw.as_ref(), VALUE_SIZE)) }
    }

    #[inline]
    pub fn padded(&self) -> &[u8; VALUE_SIZE] {
        &self.bytes
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({:?})", String::from_utf8_lossy(terminated(&self.bytes)))
    }
}

/// Reads a stored NUL-terminated field back into an owned buffer.
#[inline]
pub fn stored_bytes(field: &[u8]) -> Vec<u8> {
    terminated(field).to_vec()
}

/// djb2 over the key bytes. Must stay identical in every process sharing a store.
#[inline]
pub fn hash(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(5381u64, |h, &b| h.wrapping_mul(33).wrapping_add(u64::from(b)))
}

#[inline]
pub fn shard_index(key: &Key) -> usize {
    (hash(key.as_bytes()) % NUM_SHARDS as u64) as usize
}
