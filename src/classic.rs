//! Classic nibble map.
//!
//! Units are [`MsbFirst`](crate::unit::MsbFirst): nibble 0 is the most
//! significant nibble, so reading a unit left to right walks its buckets in
//! address order. Units only ever hold nibbles.
//!
//! For example, with code starting at byte 304 (0x130):
//!
//! ```text
//!   bucket = 304 / 32 = 9        -> unit 1, nibble 1
//!   slot   = (304 % 32) / 4 = 4  -> raw nibble 5
//!   unit 1 = 0x0500_0000
//! ```
//!
//! A lookup of 306 lands in the same bucket, finds raw nibble 5 at or
//! before its own slot and returns 304. A lookup of 302 lands in bucket 9
//! too, but slot 3 precedes the recorded start, so the search moves to the
//! earlier nibbles of unit 1 and then walks back unit by unit until it meets
//! a non-zero unit or runs out of map.

use std::fmt;
use std::ops::Range;

use tracing::{trace, warn};

use crate::codec::{map_size_bytes, AddressCodec, CodeRegion, DEFAULT_MAP_BASE, UNIT_SIZE};
use crate::config::{Encoding, MapConfig};
use crate::error::{MapError, Result};
use crate::store::{BackingStore, MemoryRegion};
use crate::unit::ClassicUnit;
use crate::NibbleMap;

pub struct ClassicNibbleMap<S = MemoryRegion> {
    store: S,
    region: CodeRegion,
    codec: AddressCodec,
}

impl ClassicNibbleMap {
    pub fn new(region_start: u64, region_size: u64) -> Self {
        Self::with_map_base(region_start, region_size, DEFAULT_MAP_BASE)
    }

    pub fn with_map_base(region_start: u64, region_size: u64, map_base: u64) -> Self {
        let store = MemoryRegion::with_base(map_base, map_size_bytes(region_size));
        Self::with_store(region_start, region_size, store)
    }

    pub fn from_config(config: &MapConfig) -> Self {
        Self::with_map_base(config.region_start, config.region_size, config.map_base)
    }
}

impl<S: BackingStore> ClassicNibbleMap<S> {
    pub fn with_store(region_start: u64, region_size: u64, store: S) -> Self {
        assert!(
            store.len() >= map_size_bytes(region_size),
            "backing store of {} bytes is too small for a {region_size:#x} byte region",
            store.len()
        );
        Self {
            store,
            region: CodeRegion::new(region_start, region_size),
            codec: AddressCodec::new(region_start),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn unit_count(&self) -> u64 {
        self.store.len() as u64 / UNIT_SIZE
    }

    pub fn read_unit(&self, index: u64) -> u32 {
        self.unit(index).raw()
    }

    #[inline]
    fn unit_addr(&self, index: u64) -> u64 {
        self.store.base_address() + index * UNIT_SIZE
    }

    #[inline]
    fn unit(&self, index: u64) -> ClassicUnit {
        ClassicUnit::new(self.store.read_word(self.unit_addr(index)))
    }

    #[inline]
    fn set_unit(&mut self, index: u64, unit: ClassicUnit) {
        let addr = self.unit_addr(index);
        self.store.write_word(addr, unit.raw());
    }

    #[inline]
    fn resolve(&self, index: u64, unit: ClassicUnit, pos: u32) -> Option<u64> {
        unit.nibble(pos)
            .offset()
            .map(|offset| self.codec.from_coords(index, pos, offset))
    }
}

impl<S: BackingStore> NibbleMap for ClassicNibbleMap<S> {
    fn create(region_start: u64, region_size: u64) -> Self {
        let store = S::zeroed(DEFAULT_MAP_BASE, map_size_bytes(region_size));
        Self::with_store(region_start, region_size, store)
    }

    fn allocate(&mut self, code_start: u64, code_size: u32) -> Result<()> {
        self.region.check_block(code_start, code_size)?;

        let c = self.codec.decompose(code_start);
        let old = self.unit(c.unit);
        if !old.nibble(c.nibble).is_empty() {
            warn!(start = code_start, unit = ?old, "allocate over a populated nibble");
            return Err(MapError::Overwrite {
                addr: code_start,
                unit: old.raw(),
            });
        }

        trace!(
            start = code_start,
            size = code_size,
            unit = c.unit,
            nibble = c.nibble,
            "allocate"
        );
        self.set_unit(c.unit, old.with_nibble(c.nibble, c.offset));
        Ok(())
    }

    fn find(&self, current_pc: u64) -> Option<u64> {
        if !self.region.contains(current_pc) {
            return None;
        }
        let c = self.codec.decompose(current_pc);
        let unit = self.unit(c.unit);

        // A start in the pc's own bucket only counts if it is not after pc.
        if unit
            .nibble(c.nibble)
            .offset()
            .is_some_and(|offset| offset <= c.offset)
        {
            return self.resolve(c.unit, unit, c.nibble);
        }
        if let Some(addr) = unit
            .preceding_nibble(c.nibble)
            .and_then(|pos| self.resolve(c.unit, unit, pos))
        {
            return Some(addr);
        }

        let mut index = c.unit;
        while index > 0 {
            index -= 1;
            let unit = self.unit(index);
            if let Some(pos) = unit.last_nibble() {
                return self.resolve(index, unit, pos);
            }
        }
        trace!(pc = current_pc, "no block before pc");
        None
    }

    fn delete(&mut self, code_header: u64) -> Result<()> {
        self.region.check_header(code_header)?;

        let c = self.codec.decompose(code_header);
        if !self.store.contains_word(self.unit_addr(c.unit)) {
            return Err(MapError::NotRegistered { addr: code_header });
        }

        let unit = self.unit(c.unit);
        if unit.nibble(c.nibble).offset() != Some(c.offset) {
            warn!(header = code_header, unit = ?unit, "delete of an unregistered block");
            return Err(MapError::NotRegistered { addr: code_header });
        }

        trace!(header = code_header, unit = c.unit, nibble = c.nibble, "delete");
        self.set_unit(c.unit, unit.without_nibble(c.nibble));
        Ok(())
    }

    fn encoding(&self) -> Encoding {
        Encoding::Classic
    }

    fn region(&self) -> Range<u64> {
        self.region.range()
    }
}

impl<S: fmt::Display> fmt::Display for ClassicNibbleMap<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.store.fmt(f)
    }
}

impl<S: BackingStore> fmt::Debug for ClassicNibbleMap<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassicNibbleMap")
            .field("region", &self.region.range())
            .field("units", &self.unit_count())
            .finish()
    }
}
