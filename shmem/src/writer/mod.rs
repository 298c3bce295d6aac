use serde_derive::{Deserialize, Serialize};
use tracing::trace;

use super::core::keys::{shard_index, Key, Value};
use super::core::*;
use super::errors::Result;

#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct WriterConfig {
    pub shmem: StoreConfig,
}

pub struct KvWriter {
    cfg: StoreConfig,
}

impl KvWriter {
    pub fn new(cfg: &WriterConfig) -> KvWriter {
        KvWriter { cfg: cfg.shmem.clone() }
    }

    /// Appends `value` under `key`. Over-long input is truncated; an empty key is rejected.
    pub fn write<K, V>(&self, key: K, value: V) -> Result<()>
        where K: AsRef<[u8]>,
              V: AsRef<[u8]>,
    {
        let key = Key::new(key)?;
        let value = Value::new(value);
        let index = shard_index(&key);
        let segment = Segment::open(&self.cfg)?;
        trace!(?key, shard = index, "write");
        segment.write_shard(index, |shard| shard.insert(&key, &value))?
    }
}
