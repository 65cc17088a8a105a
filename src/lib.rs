//! # nibble-map
//!
//! A compact reverse-lookup index from code addresses to the start of the
//! code block containing them, as used by JIT runtimes to answer "which
//! method does this instruction pointer belong to?".
//!
//! The indexed code region is cut into 32-byte buckets, and each bucket gets
//! a 4-bit nibble recording where (if anywhere) a block starts inside it.
//! Eight nibbles pack into one 32-bit map unit, so the map costs one byte per
//! 64 bytes of code. A lookup decodes the nibble of the address's bucket and
//! searches backwards for the nearest block start.
//!
//! Two layouts are provided behind the [`NibbleMap`] trait:
//!
//! - [`ClassicNibbleMap`]: nibbles only, lookups walk back unit by unit.
//! - [`CompressedNibbleMap`]: units fully covered by a block hold a direct
//!   pointer to its start, so lookups touch at most two units.
//!
//! [`AnyNibbleMap`] picks one at construction time from a [`MapConfig`].
//!
//! ## Example
//!
//! ```rust
//! use nibble_map::{CompressedNibbleMap, NibbleMap};
//!
//! let mut map = CompressedNibbleMap::new(0x1000, 1024);
//! map.allocate(0x1004, 513).unwrap();
//!
//! assert_eq!(map.find(0x1004), Some(0x1004));
//! assert_eq!(map.find(0x1004 + 512), Some(0x1004));
//! assert_eq!(map.find(0x1000), None);
//!
//! map.delete(0x1004).unwrap();
//! assert_eq!(map.find(0x1100), None);
//! ```
//!
//! ## Concurrency
//!
//! The maps contain no locks. [`NibbleMap::find`] takes `&self` and
//! [`NibbleMap::allocate`] / [`NibbleMap::delete`] take `&mut self`, so the
//! owner of a code region serializes mutations itself, typically with one
//! `RwLock` per region. A runtime that reads the backing store directly from
//! another thread while a mutation is in flight may observe a stale unit;
//! lookups tolerate that by returning either the old or the new answer.

#![forbid(unsafe_code)]

pub mod bits;
pub mod classic;
pub mod codec;
pub mod compressed;
pub mod config;
pub mod error;
pub mod store;
pub mod unit;

#[cfg(test)]
mod proptests;

use std::fmt;
use std::ops::Range;

pub use classic::ClassicNibbleMap;
pub use codec::{AddressCodec, CodeRegion, DEFAULT_MAP_BASE};
pub use compressed::CompressedNibbleMap;
pub use config::{Encoding, MapConfig};
pub use error::{MapError, Result};
pub use store::{BackingStore, MemoryRegion};
pub use unit::UnitState;

/// Operations shared by every map layout.
///
/// Blocks must start on a 4-byte boundary and no two block starts may share
/// a 32-byte bucket.
pub trait NibbleMap {
    /// An empty map over `[region_start, region_start + region_size)`.
    ///
    /// # Panics
    ///
    /// Panics if the region wraps the address space, or if the layout
    /// cannot index `region_size` bytes: the compressed layout (the default
    /// for [`AnyNibbleMap`]) is limited to
    /// [`compressed::MAX_REGION_SIZE`].
    fn create(region_start: u64, region_size: u64) -> Self
    where
        Self: Sized;

    /// Register a block of `code_size` bytes starting at `code_start`.
    fn allocate(&mut self, code_start: u64, code_size: u32) -> Result<()>;

    /// Start of the nearest registered block at or before `current_pc`.
    ///
    /// The map does not track block sizes: the caller guarantees that the
    /// returned block actually extends to `current_pc`. Addresses outside
    /// the region yield `None`.
    fn find(&self, current_pc: u64) -> Option<u64>;

    /// Unregister the block whose start is `code_header`.
    fn delete(&mut self, code_header: u64) -> Result<()>;

    fn encoding(&self) -> Encoding;

    fn region(&self) -> Range<u64>;

    /// [`NibbleMap::find`] with the runtime convention that 0 means "no
    /// method".
    fn find_method_code(&self, current_pc: u64) -> u64 {
        self.find(current_pc).unwrap_or(0)
    }
}

/// A nibble map whose layout is chosen when it is built.
#[derive(Debug)]
pub enum AnyNibbleMap {
    Classic(ClassicNibbleMap),
    Compressed(CompressedNibbleMap),
}

impl AnyNibbleMap {
    pub fn from_config(config: &MapConfig) -> Self {
        match config.encoding {
            Encoding::Classic => AnyNibbleMap::Classic(ClassicNibbleMap::from_config(config)),
            Encoding::Compressed => {
                AnyNibbleMap::Compressed(CompressedNibbleMap::from_config(config))
            }
        }
    }

    pub fn with_encoding(encoding: Encoding, region_start: u64, region_size: u64) -> Self {
        Self::from_config(&MapConfig::new(region_start, region_size).with_encoding(encoding))
    }

    pub fn store(&self) -> &MemoryRegion {
        match self {
            AnyNibbleMap::Classic(m) => m.store(),
            AnyNibbleMap::Compressed(m) => m.store(),
        }
    }
}

impl NibbleMap for AnyNibbleMap {
    fn create(region_start: u64, region_size: u64) -> Self {
        Self::with_encoding(Encoding::default(), region_start, region_size)
    }

    fn allocate(&mut self, code_start: u64, code_size: u32) -> Result<()> {
        match self {
            AnyNibbleMap::Classic(m) => m.allocate(code_start, code_size),
            AnyNibbleMap::Compressed(m) => m.allocate(code_start, code_size),
        }
    }

    #[inline]
    fn find(&self, current_pc: u64) -> Option<u64> {
        match self {
            AnyNibbleMap::Classic(m) => m.find(current_pc),
            AnyNibbleMap::Compressed(m) => m.find(current_pc),
        }
    }

    fn delete(&mut self, code_header: u64) -> Result<()> {
        match self {
            AnyNibbleMap::Classic(m) => m.delete(code_header),
            AnyNibbleMap::Compressed(m) => m.delete(code_header),
        }
    }

    fn encoding(&self) -> Encoding {
        match self {
            AnyNibbleMap::Classic(_) => Encoding::Classic,
            AnyNibbleMap::Compressed(_) => Encoding::Compressed,
        }
    }

    fn region(&self) -> Range<u64> {
        match self {
            AnyNibbleMap::Classic(m) => m.region(),
            AnyNibbleMap::Compressed(m) => m.region(),
        }
    }
}

impl fmt::Display for AnyNibbleMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.store(), f)
    }
}
