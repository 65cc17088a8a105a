//! Pointer-compressed nibble map.
//!
//! Units are [`LsbFirst`](crate::unit::LsbFirst): nibble 0 is the least
//! significant nibble. When a block covers every byte described by a unit,
//! that unit stops holding nibbles and instead holds a relative pointer to
//! the block start. A lookup therefore inspects at most two units: the one
//! covering the address, and the one before it.
//!
//! Pointer units are told apart from nibble units by nibble 0: raw values
//! 1..=8 are slots, 9..=12 are pointer tags (see
//! [`CompressedUnit::from_pointer`]).

use std::fmt;
use std::ops::Range;

use tracing::{debug, trace, warn};

use crate::codec::{
    map_size_bytes, AddressCodec, CodeRegion, BYTES_PER_UNIT_SPAN, DEFAULT_MAP_BASE, UNIT_SIZE,
};
use crate::config::{Encoding, MapConfig};
use crate::error::{MapError, Result};
use crate::store::{BackingStore, MemoryRegion};
use crate::unit::{CompressedUnit, UnitState};
use crate::NibbleMap;

/// Largest region a compressed map can index: pointers are 32-bit.
pub const MAX_REGION_SIZE: u64 = 1 << 32;

pub struct CompressedNibbleMap<S = MemoryRegion> {
    store: S,
    region: CodeRegion,
    codec: AddressCodec,
}

impl CompressedNibbleMap {
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

impl<S: BackingStore> CompressedNibbleMap<S> {
    /// Index `region_size` bytes at `region_start` using a caller-provided
    /// store. The store must be zeroed and at least
    /// [`map_size_bytes`]`(region_size)` long.
    ///
    /// # Panics
    ///
    /// Panics if `region_size` exceeds [`MAX_REGION_SIZE`] or the store is
    /// too small.
    pub fn with_store(region_start: u64, region_size: u64, store: S) -> Self {
        assert!(
            region_size <= MAX_REGION_SIZE,
            "compressed nibble map cannot index {region_size:#x} bytes"
        );
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

    pub fn unit_state(&self, index: u64) -> UnitState {
        self.unit(index).state()
    }

    #[inline]
    fn unit_addr(&self, index: u64) -> u64 {
        self.store.base_address() + index * UNIT_SIZE
    }

    #[inline]
    fn unit(&self, index: u64) -> CompressedUnit {
        CompressedUnit::new(self.store.read_word(self.unit_addr(index)))
    }

    #[inline]
    fn set_unit(&mut self, index: u64, unit: CompressedUnit) {
        let addr = self.unit_addr(index);
        self.store.write_word(addr, unit.raw());
    }

    /// Block start recorded at nibble `pos` of `unit`, if any.
    #[inline]
    fn resolve(&self, index: u64, unit: CompressedUnit, pos: u32) -> Option<u64> {
        unit.nibble(pos)
            .offset()
            .map(|offset| self.codec.from_coords(index, pos, offset))
    }

    #[inline]
    fn resolve_pointer(&self, unit: CompressedUnit) -> u64 {
        self.region.start() + u64::from(unit.pointer())
    }

    /// Units fully covered by `[delta, end)` other than the one holding the
    /// start nibble.
    fn covered_units(start_unit: u64, end: u64) -> Range<u64> {
        (start_unit + 1)..(end / BYTES_PER_UNIT_SPAN).max(start_unit + 1)
    }
}

impl<S: BackingStore> NibbleMap for CompressedNibbleMap<S> {
    fn create(region_start: u64, region_size: u64) -> Self {
        let store = S::zeroed(DEFAULT_MAP_BASE, map_size_bytes(region_size));
        Self::with_store(region_start, region_size, store)
    }

    fn allocate(&mut self, code_start: u64, code_size: u32) -> Result<()> {
        self.region.check_block(code_start, code_size)?;

        let delta = self.codec.delta(code_start);
        let c = self.codec.decompose(code_start);
        let old = self.unit(c.unit);

        if old.state() == UnitState::Pointer || !old.nibble(c.nibble).is_empty() {
            warn!(start = code_start, unit = ?old, "allocate over a populated map unit");
            return Err(MapError::Overwrite {
                addr: code_start,
                unit: old.raw(),
            });
        }

        let covered = Self::covered_units(c.unit, delta + u64::from(code_size));
        for index in covered.clone() {
            let unit = self.unit(index);
            if !unit.is_zero() {
                warn!(
                    start = code_start,
                    index,
                    unit = ?unit,
                    "block overlaps a populated map unit"
                );
                return Err(MapError::PointerOverlap {
                    addr: code_start,
                    unit: unit.raw(),
                });
            }
        }

        trace!(
            start = code_start,
            size = code_size,
            unit = c.unit,
            nibble = c.nibble,
            "allocate"
        );
        self.set_unit(c.unit, old.with_nibble(c.nibble, c.offset));

        if !covered.is_empty() {
            debug!(
                start = code_start,
                units = covered.end - covered.start,
                "writing pointer units"
            );
            // delta < MAX_REGION_SIZE
            let pointer = CompressedUnit::from_pointer(delta as u32);
            for index in covered {
                self.set_unit(index, pointer);
            }
        }
        Ok(())
    }

    fn find(&self, current_pc: u64) -> Option<u64> {
        if !self.region.contains(current_pc) {
            return None;
        }
        let c = self.codec.decompose(current_pc);
        let unit = self.unit(c.unit);

        match unit.state() {
            UnitState::Pointer => return Some(self.resolve_pointer(unit)),
            UnitState::Nibbles => {
                let here = unit.nibble(c.nibble);
                if here.offset().is_some_and(|offset| offset <= c.offset) {
                    return self.resolve(c.unit, unit, c.nibble);
                }
                if let Some(addr) = unit
                    .preceding_nibble(c.nibble)
                    .and_then(|pos| self.resolve(c.unit, unit, pos))
                {
                    return Some(addr);
                }
            }
            UnitState::Empty => {}
        }

        if c.unit == 0 {
            trace!(pc = current_pc, "no block before pc");
            return None;
        }

        // A block starting more than one unit back would have turned the
        // previous unit into a pointer.
        let index = c.unit - 1;
        let prev = self.unit(index);
        match prev.state() {
            UnitState::Pointer => Some(self.resolve_pointer(prev)),
            UnitState::Nibbles => prev
                .last_nibble()
                .and_then(|pos| self.resolve(index, prev, pos)),
            UnitState::Empty => {
                trace!(pc = current_pc, "no block before pc");
                None
            }
        }
    }

    fn delete(&mut self, code_header: u64) -> Result<()> {
        self.region.check_header(code_header)?;

        let delta = self.codec.delta(code_header);
        let c = self.codec.decompose(code_header);
        if !self.store.contains_word(self.unit_addr(c.unit)) {
            return Err(MapError::NotRegistered { addr: code_header });
        }

        let unit = self.unit(c.unit);
        if unit.state() == UnitState::Pointer {
            warn!(header = code_header, unit = ?unit, "delete through a pointer unit");
            return Err(MapError::NotNibbles {
                addr: code_header,
                unit: unit.raw(),
            });
        }
        if unit.nibble(c.nibble).offset() != Some(c.offset) {
            warn!(header = code_header, unit = ?unit, "delete of an unregistered block");
            return Err(MapError::NotRegistered { addr: code_header });
        }

        trace!(header = code_header, unit = c.unit, nibble = c.nibble, "delete");
        self.set_unit(c.unit, unit.without_nibble(c.nibble));

        let mut cleared = 0u64;
        let mut index = c.unit + 1;
        while self.store.contains_word(self.unit_addr(index)) {
            let unit = self.unit(index);
            if unit.state() != UnitState::Pointer || u64::from(unit.pointer()) != delta {
                break;
            }
            self.set_unit(index, CompressedUnit::EMPTY);
            cleared += 1;
            index += 1;
        }
        if cleared > 0 {
            debug!(header = code_header, units = cleared, "cleared pointer units");
        }
        Ok(())
    }

    fn encoding(&self) -> Encoding {
        Encoding::Compressed
    }

    fn region(&self) -> Range<u64> {
        self.region.range()
    }
}

impl<S: fmt::Display> fmt::Display for CompressedNibbleMap<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.store.fmt(f)
    }
}

impl<S: BackingStore> fmt::Debug for CompressedNibbleMap<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressedNibbleMap")
            .field("region", &self.region.range())
            .field("units", &self.unit_count())
            .finish()
    }
}
