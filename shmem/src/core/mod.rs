use std::env;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use ::shared_memory::{Shmem, ShmemConf, ShmemError};
use once_cell::sync::Lazy;
use raw_sync::events::{Event, EventInit, EventState};
use serde_derive::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{KvError, Result};
use crate::gate::{EventGate, RwGate};
use crate::shard::Shard;

pub mod keys;

pub const NUM_SHARDS: usize = 128;
pub const SLOTS_PER_SHARD: usize = 256;
pub const KEY_SIZE: usize = 32;
pub const VALUE_SIZE: usize = 256;

pub static DEFAULT_STORE_NAME: &str = "kv-store";

// "KVS1"
const MAGIC: u32 = 0x4b56_5331;
const ALIGN: usize = 64;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: String,
    pub store_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            data_dir: env::temp_dir().to_string_lossy().into_owned(),
            store_name: DEFAULT_STORE_NAME.to_string(),
        }
    }
}

impl StoreConfig {
    /// The link file through which every process finds the segment.
    pub fn link_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.store_name)
    }
}

#[repr(C)]
struct Header {
    magic: AtomicU32,
    reader_count: AtomicU32,
}

/// Byte offsets of the segment's parts: header, access gate, readers gate, then the shards.
struct Layout {
    access: usize,
    readers: usize,
    shards: usize,
    total: usize,
}

#[inline]
fn align_up(n: usize) -> usize {
    (n + ALIGN - 1) / ALIGN * ALIGN
}

static LAYOUT: Lazy<Layout> = Lazy::new(|| {
    let gate = align_up(Event::size_of(None));
    let access = align_up(mem::size_of::<Header>());
    let readers = access + gate;
    let shards = readers + gate;
    Layout {
        access,
        readers,
        shards,
        total: shards + NUM_SHARDS * mem::size_of::<Shard>(),
    }
});

#[inline]
unsafe fn shard_ptr(base: *mut u8, index: usize) -> *mut Shard {
    assert!(index < NUM_SHARDS);
    (base.add(LAYOUT.shards) as *mut Shard).add(index)
}

#[cfg(test)]
pub(crate) fn segment_size() -> usize {
    LAYOUT.total
}

/// Creates the store if its segment does not exist yet. An existing store is left untouched.
pub fn create(cfg: &StoreConfig) -> Result<()> {
    let link = cfg.link_path();
    let mut shmem = match ShmemConf::new().size(LAYOUT.total).flink(&link).create() {
        Ok(v) => v,
        Err(ShmemError::LinkExists) => {
            debug!(link = %link.display(), "store already exists");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    // Until initialization succeeds this process owns the segment, and dropping it removes it.
    unsafe { initialize(&shmem)? };
    shmem.set_owner(false);
    debug!(link = %link.display(), size = LAYOUT.total, "created store");
    Ok(())
}

unsafe fn initialize(shmem: &Shmem) -> Result<()> {
    let base = shmem.as_ptr();
    let header = &*(base as *const Header);
    header.reader_count.store(0, Ordering::Relaxed);
    for index in 0..NUM_SHARDS {
        (*shard_ptr(base, index)).reset();
    }
    for &offset in &[LAYOUT.access, LAYOUT.readers] {
        let (event, _) = Event::new(base.add(offset), true).map_err(KvError::gate)?;
        event.set(EventState::Signaled).map_err(KvError::gate)?;
    }
    header.magic.store(MAGIC, Ordering::Release);
    Ok(())
}

/// Removes the store's segment and link file. Removing a missing store succeeds.
pub fn destroy(cfg: &StoreConfig) -> Result<()> {
    let link = cfg.link_path();
    let mut shmem = match ShmemConf::new().flink(&link).open() {
        Ok(v) => v,
        Err(ShmemError::LinkDoesNotExist) => return Ok(()),
        // A missing link file surfaces as a failed open.
        Err(ShmemError::LinkOpenFailed(ref e)) if e.kind() == io::ErrorKind::NotFound => {
            debug!(link = %link.display(), "no store to destroy");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    shmem.set_owner(true);
    debug!(link = %link.display(), "destroying store");
    Ok(())
}

/// One mapping of the store together with its gates.
///
/// Opened at the start of every store call and dropped at its end; nothing outlives the call.
pub struct Segment {
    // Declared before `shmem` so the gate handles go away before the mapping does.
    access: EventGate,
    readers: EventGate,
    shmem: Shmem,
}

impl Segment {
    pub fn open(cfg: &StoreConfig) -> Result<Segment> {
        let shmem = ShmemConf::new().flink(cfg.link_path()).open()?;
        if shmem.len() < LAYOUT.total {
            return Err(KvError::LayoutMismatch { found: shmem.len(), expected: LAYOUT.total });
        }
        let base = shmem.as_ptr();
        let header = unsafe { &*(base as *const Header) };
        if header.magic.load(Ordering::Acquire) != MAGIC {
            return Err(KvError::NotInitialized);
        }
        let (access, _) = unsafe { Event::from_existing(base.add(LAYOUT.access)) }.map_err(KvError::gate)?;
        let (readers, _) = unsafe { Event::from_existing(base.add(LAYOUT.readers)) }.map_err(KvError::gate)?;
        Ok(Segment {
            access: EventGate::new(access),
            readers: EventGate::new(readers),
            shmem,
        })
    }

    #[inline]
    fn header(&self) -> &Header {
        unsafe { &*(self.shmem.as_ptr() as *const Header) }
    }

    pub fn gate(&self) -> RwGate<'_, EventGate> {
        RwGate::new(&self.access, &self.readers, &self.header().reader_count)
    }

    /// Runs `f` on one shard with the store exclusively held.
    pub fn write_shard<R, F>(&self, index: usize, f: F) -> Result<R>
        where F: FnOnce(&mut Shard) -> R,
    {
        let gate = self.gate();
        let _guard = gate.write()?;
        let shard = unsafe { &mut *shard_ptr(self.shmem.as_ptr(), index) };
        Ok(f(shard))
    }

    /// Runs `f` on one shard inside the shared reader section.
    pub fn read_shard<R, F>(&self, index: usize, f: F) -> Result<R>
        where F: FnOnce(&Shard) -> R,
    {
        let gate = self.gate();
        let _guard = gate.read()?;
        let shard = unsafe { &*shard_ptr(self.shmem.as_ptr(), index) };
        Ok(f(shard))
    }

    #[cfg(test)]
    pub(crate) fn reader_count(&self) -> u32 {
        self.header().reader_count.load(Ordering::Relaxed)
    }
}
