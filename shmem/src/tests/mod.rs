use tempfile::{tempdir, TempDir};

use crate::core::keys::{shard_index, Key};
use crate::core::{create, destroy, StoreConfig};
use crate::reader::{KvReader, ReaderConfig};
use crate::writer::{KvWriter, WriterConfig};


/// A freshly created store in a private directory, destroyed on drop.
pub(crate) struct TestStore {
    pub cfg: StoreConfig,
    _dir: TempDir,
}

impl TestStore {
    pub fn new() -> TestStore {
        let dir = tempdir().expect("tempdir");
        let cfg = StoreConfig {
            data_dir: dir.path().to_string_lossy().into_owned(),
            store_name: "test-store".to_string(),
        };
        create(&cfg).expect("create store");
        TestStore { cfg, _dir: dir }
    }

    pub fn writer(&self) -> KvWriter {
        KvWriter::new(&WriterConfig { shmem: self.cfg.clone() })
    }

    pub fn reader(&self) -> KvReader {
        KvReader::new(&ReaderConfig { shmem: self.cfg.clone() })
    }
}

impl Drop for TestStore {
    fn drop(&mut self) {
        let _ = destroy(&self.cfg);
    }
}

/// The first `n` keys of the form `prefix-i` that hash to `shard`.
pub(crate) fn keys_in_shard(prefix: &str, shard: usize, n: usize) -> Vec<String> {
    (0..)
        .map(|i| format!("{}-{}", prefix, i))
        .filter(|k| shard_index(&Key::new(k).unwrap()) == shard)
        .take(n)
        .collect()
}

pub(crate) fn text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).expect("utf-8 value")
}
