pub mod core;
mod errors;
pub mod gate;
pub mod reader;
pub mod shard;
pub mod writer;

#[cfg(test)]
mod tests;

pub use crate::core::{create, destroy, StoreConfig, KEY_SIZE, NUM_SHARDS, SLOTS_PER_SHARD, VALUE_SIZE};
pub use errors::{KvError, Result};
pub use reader::{KvReader, ReaderConfig};
pub use writer::{KvWriter, WriterConfig};
