//! Errors reported by the nibble map engines.

use thiserror::Error;

/// Failure of an `allocate` or `delete` call.
///
/// `OutOfRange` is a range error: the caller passed an address the map does
/// not cover. Every other variant is an illegal-state error: the map and the
/// caller disagree about which blocks are registered. Both are detected
/// before anything is written, so a failed call leaves the map untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("address {addr:#x} is outside the code region [{start:#x}, {end:#x})")]
    OutOfRange { addr: u64, start: u64, end: u64 },

    #[error("block start {addr:#x} is not 4-byte aligned")]
    Misaligned { addr: u64 },

    #[error("block start {addr:#x} would overwrite map unit {unit:#010x}")]
    Overwrite { addr: u64, unit: u32 },

    #[error("block starting at {addr:#x} overlaps populated map unit {unit:#010x}")]
    PointerOverlap { addr: u64, unit: u32 },

    #[error("no block is registered at {addr:#x}")]
    NotRegistered { addr: u64 },

    #[error("code header {addr:#x} lies in map unit {unit:#010x}, which holds no nibbles")]
    NotNibbles { addr: u64, unit: u32 },

    #[error("unknown nibble map encoding {0:?}")]
    UnknownEncoding(String),
}

impl MapError {
    pub fn is_range_error(&self) -> bool {
        matches!(self, MapError::OutOfRange { .. })
    }

    pub fn is_illegal_state(&self) -> bool {
        matches!(
            self,
            MapError::Misaligned { .. }
                | MapError::Overwrite { .. }
                | MapError::PointerOverlap { .. }
                | MapError::NotRegistered { .. }
                | MapError::NotNibbles { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MapError>;
