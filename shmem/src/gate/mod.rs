//! Readers–writer exclusion built from two binary gates.
//!
//! `access` is held by the single writer, or collectively by all readers: the first reader in
//! takes it and the last reader out gives it back. `readers` guards the shared reader count.
//! Readers are preferred; a steady stream of overlapping readers can hold a writer off forever.
//! Waits have no timeout, so a process dying inside a section wedges the store.

use std::sync::atomic::{AtomicU32, Ordering};

use raw_sync::events::{EventImpl, EventState};
use raw_sync::Timeout;
use tracing::{error, trace};

use crate::errors::{KvError, Result};

pub trait Gate {
    /// Blocks until the gate is available and takes it.
    fn wait(&self) -> Result<()>;
    /// Makes the gate available again. Any process may signal, not only the one that waited.
    fn signal(&self) -> Result<()>;
}

/// A gate backed by an auto-reset event in shared memory.
pub struct EventGate {
    event: Box<dyn EventImpl>,
}

impl EventGate {
    pub fn new(event: Box<dyn EventImpl>) -> EventGate {
        EventGate { event }
    }
}

impl Gate for EventGate {
    fn wait(&self) -> Result<()> {
        self.event.wait(Timeout::Infinite).map_err(KvError::gate)
    }

    fn signal(&self) -> Result<()> {
        self.event.set(EventState::Signaled).map_err(KvError::gate)
    }
}

pub struct RwGate<'a, G: Gate> {
    access: &'a G,
    readers: &'a G,
    reader_count: &'a AtomicU32,
}

#[must_use]
pub struct WriteGuard<'g, G: Gate> {
    access: &'g G,
}

#[must_use]
pub struct ReadGuard<'g, 'a, G: Gate> {
    gate: &'g RwGate<'a, G>,
}

impl<'a, G: Gate> RwGate<'a, G> {
    pub fn new(access: &'a G, readers: &'a G, reader_count: &'a AtomicU32) -> RwGate<'a, G> {
        RwGate { access, readers, reader_count }
    }

    pub fn write(&self) -> Result<WriteGuard<'_, G>> {
        self.access.wait()?;
        trace!("writer entered");
        Ok(WriteGuard { access: self.access })
    }

    pub fn read(&self) -> Result<ReadGuard<'_, 'a, G>> {
        self.readers.wait()?;
        let active = self.reader_count.fetch_add(1, Ordering::Relaxed) + 1;
        if active == 1 {
            if let Err(e) = self.access.wait() {
                self.reader_count.fetch_sub(1, Ordering::Relaxed);
                self.readers.signal()?;
                return Err(e);
            }
            trace!("first reader locked out writers");
        }
        self.readers.signal()?;
        Ok(ReadGuard { gate: self })
    }

    fn leave_read(&self) -> Result<()> {
        self.readers.wait()?;
        let active = self.reader_count.fetch_sub(1, Ordering::Relaxed) - 1;
        let released = if active == 0 {
            trace!("last reader released writers");
            self.access.signal()
        } else {
            Ok(())
        };
        self.readers.signal()?;
        released
    }
}

impl<'g, G: Gate> Drop for WriteGuard<'g, G> {
    fn drop(&mut self) {
        if let Err(e) = self.access.signal() {
            error!("failed to release the access gate: {}", e);
        }
    }
}

impl<'g, 'a, G: Gate> Drop for ReadGuard<'g, 'a, G> {
    fn drop(&mut self) {
        if let Err(e) = self.gate.leave_read() {
            error!("failed to leave the reader section: {}", e);
        }
    }
}

/// In-process gate with the same semantics as `EventGate`.
#[cfg(test)]
pub(crate) struct LocalGate {
    available: std::sync::Mutex<bool>,
    cond: std::sync::Condvar,
}

#[cfg(test)]
impl LocalGate {
    pub(crate) fn new() -> LocalGate {
        LocalGate { available: std::sync::Mutex::new(true), cond: std::sync::Condvar::new() }
    }
}

#[cfg(test)]
impl Gate for LocalGate {
    fn wait(&self) -> Result<()> {
        let mut available = self.available.lock().map_err(|_| KvError::Gate("poisoned".into()))?;
        while !*available {
            available = self.cond.wait(available).map_err(|_| KvError::Gate("poisoned".into()))?;
        }
        *available = false;
        Ok(())
    }

    fn signal(&self) -> Result<()> {
        let mut available = self.available.lock().map_err(|_| KvError::Gate("poisoned".into()))?;
        *available = true;
        self.cond.notify_one();
        Ok(())
    }
}
