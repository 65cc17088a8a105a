//! Address codec: code addresses to map coordinates and back.
//!
//! The code region is cut into 32-byte buckets. Eight consecutive buckets
//! share one 32-bit map unit, so a unit covers 256 bytes of code. A code
//! address relative to the region start (its "delta") reads as
//!
//! ```text
//!   delta = unit * 256 + nibble * 32 + offset * 4 + (low two bits)
//! ```
//!
//! where `nibble` is the bucket's position inside its unit and `offset` is
//! the 4-byte slot inside the bucket.

use std::ops::Range;

use crate::error::{MapError, Result};

// =============================================================================
// Configuration
// =============================================================================

pub const LOG2_CODE_ALIGN: u32 = 2;
pub const LOG2_NIBBLES_PER_UNIT: u32 = 3;
pub const LOG2_BYTES_PER_BUCKET: u32 = LOG2_CODE_ALIGN + LOG2_NIBBLES_PER_UNIT;

/// Alignment of every code block start.
pub const CODE_ALIGN: u64 = 1 << LOG2_CODE_ALIGN;
pub const NIBBLES_PER_UNIT: u64 = 1 << LOG2_NIBBLES_PER_UNIT;
pub const BYTES_PER_BUCKET: u64 = 1 << LOG2_BYTES_PER_BUCKET;
/// Code bytes described by one map unit.
pub const BYTES_PER_UNIT_SPAN: u64 = BYTES_PER_BUCKET * NIBBLES_PER_UNIT;
/// Size of one map unit in the backing store.
pub const UNIT_SIZE: u64 = 4;

/// Where the map's backing store is mapped unless configured otherwise.
pub const DEFAULT_MAP_BASE: u64 = 0x0000_1000;

/// Bytes of backing store needed to index `region_size` bytes of code,
/// rounded up to a whole unit.
pub fn map_size_bytes(region_size: u64) -> usize {
    // One byte holds two nibbles, i.e. two buckets.
    let bytes = region_size.div_ceil(2 * BYTES_PER_BUCKET);
    (bytes.div_ceil(UNIT_SIZE) * UNIT_SIZE) as usize
}

/// Position of an address in the map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Coords {
    pub unit: u64,
    /// Bucket position inside the unit, `0..8`.
    pub nibble: u32,
    /// 4-byte slot inside the bucket, `0..8`.
    pub offset: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressCodec {
    region_start: u64,
}

impl AddressCodec {
    pub fn new(region_start: u64) -> Self {
        Self { region_start }
    }

    pub fn region_start(self) -> u64 {
        self.region_start
    }

    /// Address relative to the region start.
    #[inline]
    pub fn delta(self, addr: u64) -> u64 {
        debug_assert!(addr >= self.region_start);
        addr - self.region_start
    }

    #[inline]
    pub fn bucket(self, addr: u64) -> u64 {
        self.delta(addr) >> LOG2_BYTES_PER_BUCKET
    }

    #[inline]
    pub fn unit_index(self, addr: u64) -> u64 {
        self.bucket(addr) >> LOG2_NIBBLES_PER_UNIT
    }

    #[inline]
    pub fn nibble_pos(self, addr: u64) -> u32 {
        (self.bucket(addr) & (NIBBLES_PER_UNIT - 1)) as u32
    }

    #[inline]
    pub fn intra_bucket_offset(self, addr: u64) -> u32 {
        ((self.delta(addr) & (BYTES_PER_BUCKET - 1)) >> LOG2_CODE_ALIGN) as u32
    }

    #[inline]
    pub fn decompose(self, addr: u64) -> Coords {
        Coords {
            unit: self.unit_index(addr),
            nibble: self.nibble_pos(addr),
            offset: self.intra_bucket_offset(addr),
        }
    }

    /// Absolute address of slot `offset` in bucket `nibble` of unit `unit`.
    /// `offset` is the decoded slot, not the raw nibble.
    #[inline]
    pub fn from_coords(self, unit: u64, nibble: u32, offset: u32) -> u64 {
        self.region_start
            + unit * BYTES_PER_UNIT_SPAN
            + u64::from(nibble) * BYTES_PER_BUCKET
            + u64::from(offset) * CODE_ALIGN
    }

    /// Rebuild `addr` from its coordinates. Equals `addr` rounded down to
    /// the code alignment.
    pub fn round_trip(self, addr: u64) -> u64 {
        let c = self.decompose(addr);
        self.from_coords(c.unit, c.nibble, c.offset)
    }
}

/// The code address range a map indexes: `[start, start + size)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodeRegion {
    start: u64,
    size: u64,
}

impl CodeRegion {
    pub fn new(start: u64, size: u64) -> Self {
        assert!(
            start.checked_add(size).is_some(),
            "code region {start:#x}+{size:#x} overflows the address space"
        );
        Self { start, size }
    }

    pub fn start(self) -> u64 {
        self.start
    }

    pub fn size(self) -> u64 {
        self.size
    }

    pub fn end(self) -> u64 {
        self.start + self.size
    }

    pub fn range(self) -> Range<u64> {
        self.start..self.end()
    }

    #[inline]
    pub fn contains(self, addr: u64) -> bool {
        addr >= self.start && addr < self.end()
    }

    fn out_of_range(self, addr: u64) -> MapError {
        MapError::OutOfRange {
            addr,
            start: self.start,
            end: self.end(),
        }
    }

    /// Validate a block about to be registered: it must start inside the
    /// region, be code aligned, and end no later than the region end.
    pub fn check_block(self, code_start: u64, code_size: u32) -> Result<()> {
        if !self.contains(code_start) {
            return Err(self.out_of_range(code_start));
        }
        let end = code_start.checked_add(u64::from(code_size));
        if end.map_or(true, |end| end > self.end()) {
            return Err(self.out_of_range(end.unwrap_or(u64::MAX)));
        }
        if (code_start - self.start) % CODE_ALIGN != 0 {
            return Err(MapError::Misaligned { addr: code_start });
        }
        Ok(())
    }

    /// Validate a code header about to be unregistered. The upper bound is
    /// inclusive.
    pub fn check_header(self, code_header: u64) -> Result<()> {
        if code_header < self.start || code_header > self.end() {
            return Err(self.out_of_range(code_header));
        }
        Ok(())
    }
}
