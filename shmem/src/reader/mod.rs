use serde_derive::{Deserialize, Serialize};
use tracing::trace;

use super::core::keys::{shard_index, Key};
use super::core::*;
use super::errors::Result;

#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct ReaderConfig {
    pub shmem: StoreConfig,
}

pub struct KvReader {
    cfg: StoreConfig,
}

impl KvReader {
    pub fn new(cfg: &ReaderConfig) -> KvReader {
        KvReader { cfg: cfg.shmem.clone() }
    }

    /// Returns the next of `key`'s values in round-robin order, or `None` if the key has none.
    ///
    /// Moves the key's read cursor, so successive calls walk through every live value.
    pub fn read<K: AsRef<[u8]>>(&self, key: K) -> Result<Option<Vec<u8>>> {
        let key = Key::new(key)?;
        let index = shard_index(&key);
        let segment = Segment::open(&self.cfg)?;
        trace!(?key, shard = index, "read");
        segment.read_shard(index, |shard| shard.next_value(&key))?
    }

    /// Returns every live value of `key`, starting after its read cursor.
    ///
    /// All values are collected inside one reader section, so no write can interleave.
    pub fn read_all<K: AsRef<[u8]>>(&self, key: K) -> Result<Option<Vec<Vec<u8>>>> {
        let key = Key::new(key)?;
        let index = shard_index(&key);
        let segment = Segment::open(&self.cfg)?;
        trace!(?key, shard = index, "read_all");
        segment.read_shard(index, |shard| shard.all_values(&key))?
    }
}
