use std::{fmt, io};

use shared_memory::ShmemError;

pub type Result<T> = std::result::Result<T, KvError>;

#[derive(Debug)]
pub enum KvError {
    SharedMemory(ShmemError),
    // raw_sync reports failures as Box<dyn Error>, which is neither Send nor Sync.
    Gate(String),
    Io(io::Error),
    // The segment exists but its creator has not finished initializing it.
    NotInitialized,
    // The segment was created by a build with different capacities.
    LayoutMismatch { found: usize, expected: usize },
    InvalidKey,
    // A shard invariant does not hold.
    Logic(String),
}

impl KvError {
    /// True for failures to reach the segment or its gates, as opposed to bad input.
    pub fn is_resource_unavailable(&self) -> bool {
        match self {
            KvError::SharedMemory(_)
            | KvError::Gate(_)
            | KvError::Io(_)
            | KvError::NotInitialized
            | KvError::LayoutMismatch { .. } => true,
            KvError::InvalidKey | KvError::Logic(_) => false,
        }
    }

    pub(crate) fn gate(e: Box<dyn std::error::Error>) -> KvError {
        KvError::Gate(e.to_string())
    }
}

impl fmt::Display for KvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KvError::SharedMemory(e) => write!(f, "Shared memory error: {}", e),
            KvError::Gate(s) => write!(f, "Gate error: {}", s),
            KvError::Io(e) => write!(f, "IO error: {}", e),
            KvError::NotInitialized => write!(f, "Store is not initialized"),
            KvError::LayoutMismatch { found, expected } => {
                write!(f, "Segment holds {} bytes but this build needs {}", found, expected)
            }
            KvError::InvalidKey => write!(f, "Key must not be empty"),
            KvError::Logic(s) => write!(f, "Logic error: {}", s),
        }
    }
}

impl std::error::Error for KvError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KvError::SharedMemory(e) => Some(e),
            KvError::Io(e) => Some(e),
            KvError::Gate(_)
            | KvError::NotInitialized
            | KvError::LayoutMismatch { .. }
            | KvError::InvalidKey
            | KvError::Logic(_) => None,
        }
    }
}

impl From<ShmemError> for KvError {
    fn from(err: ShmemError) -> Self {
        KvError::SharedMemory(err)
    }
}

impl From<io::Error> for KvError {
    fn from(err: io::Error) -> Self {
        KvError::Io(err)
    }
}
