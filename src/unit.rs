//! Map units and nibbles.
//!
//! A map unit is the 32-bit word stored for every eight buckets. It holds
//! eight 4-bit nibbles, one per bucket. A nibble is `offset + 1` where
//! `offset` is the 4-byte slot of the block start inside the bucket, and 0
//! means no block starts in that bucket.
//!
//! The two encodings disagree on where nibble 0 lives:
//! - [`MsbFirst`]: nibble 0 is the most significant nibble (classic map).
//! - [`LsbFirst`]: nibble 0 is the least significant nibble (compressed map).
//!
//! The compressed map additionally lets a unit hold a relative pointer
//! instead of nibbles, see [`MapUnit::from_pointer`].

use std::fmt;
use std::marker::PhantomData;

use crate::bits;

/// Placement of nibbles inside a unit.
pub trait NibbleOrder: Copy + Default + fmt::Debug + 'static {
    /// Right shift that brings nibble `pos` into the low four bits.
    fn shift(pos: u32) -> u32;

    /// Position of the nearest non-empty nibble strictly before `pos`.
    fn preceding_nibble(raw: u32, pos: u32) -> Option<u32>;

    /// Position of the last non-empty nibble of the unit.
    fn last_nibble(raw: u32) -> Option<u32>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MsbFirst;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LsbFirst;

impl NibbleOrder for MsbFirst {
    #[inline]
    fn shift(pos: u32) -> u32 {
        debug_assert!(pos < 8);
        28 - 4 * pos
    }

    #[inline]
    fn preceding_nibble(raw: u32, pos: u32) -> Option<u32> {
        // Positions before `pos` are the `pos` most significant nibbles;
        // the closest one is the lowest set among them.
        bits::lowest_set_nibble(raw & bits::high_nibbles_mask(pos)).map(|i| 7 - i)
    }

    #[inline]
    fn last_nibble(raw: u32) -> Option<u32> {
        bits::lowest_set_nibble(raw).map(|i| 7 - i)
    }
}

impl NibbleOrder for LsbFirst {
    #[inline]
    fn shift(pos: u32) -> u32 {
        debug_assert!(pos < 8);
        4 * pos
    }

    #[inline]
    fn preceding_nibble(raw: u32, pos: u32) -> Option<u32> {
        bits::highest_set_nibble(raw & bits::low_nibbles_mask(pos))
    }

    #[inline]
    fn last_nibble(raw: u32) -> Option<u32> {
        bits::highest_set_nibble(raw)
    }
}

/// One 4-bit bucket entry. Raw value 0 is empty, otherwise `offset + 1`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nibble(u8);

impl Nibble {
    pub const EMPTY: Nibble = Nibble(0);
    pub const MASK: u32 = 0xF;

    #[inline]
    pub fn from_raw(raw: u32) -> Self {
        debug_assert!(raw <= Self::MASK, "nibble value out of bounds: {raw}");
        Self(raw as u8)
    }

    #[inline]
    pub fn from_offset(offset: u32) -> Self {
        debug_assert!(offset < Self::MASK, "nibble offset out of bounds: {offset}");
        Self((offset + 1) as u8)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        u32::from(self.0)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Decoded 4-byte slot, `None` when empty.
    #[inline]
    pub fn offset(self) -> Option<u32> {
        self.raw().checked_sub(1)
    }
}

impl fmt::Debug for Nibble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nibble({:#x})", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitState {
    Empty,
    Nibbles,
    Pointer,
}

/// A 32-bit map unit whose nibbles are placed according to `O`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MapUnit<O> {
    raw: u32,
    order: PhantomData<O>,
}

pub type ClassicUnit = MapUnit<MsbFirst>;
pub type CompressedUnit = MapUnit<LsbFirst>;

impl<O: NibbleOrder> MapUnit<O> {
    pub const EMPTY: Self = Self::new(0);

    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self {
            raw,
            order: PhantomData,
        }
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.raw
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.raw == 0
    }

    #[inline]
    pub fn nibble(self, pos: u32) -> Nibble {
        Nibble::from_raw((self.raw >> O::shift(pos)) & Nibble::MASK)
    }

    /// Store slot `offset` at position `pos`, replacing whatever was there.
    #[inline]
    pub fn with_nibble(self, pos: u32, offset: u32) -> Self {
        let nibble = Nibble::from_offset(offset);
        let shift = O::shift(pos);
        Self::new((self.raw & !(Nibble::MASK << shift)) | (nibble.raw() << shift))
    }

    #[inline]
    pub fn without_nibble(self, pos: u32) -> Self {
        Self::new(self.raw & !(Nibble::MASK << O::shift(pos)))
    }

    #[inline]
    pub fn preceding_nibble(self, pos: u32) -> Option<u32> {
        O::preceding_nibble(self.raw, pos)
    }

    #[inline]
    pub fn last_nibble(self) -> Option<u32> {
        O::last_nibble(self.raw)
    }

    /// Linear scan equivalent of [`MapUnit::preceding_nibble`].
    pub fn preceding_nibble_linear(self, pos: u32) -> Option<u32> {
        (0..pos).rev().find(|&p| !self.nibble(p).is_empty())
    }
}

impl CompressedUnit {
    /// Smallest raw value of nibble 0 that marks a pointer unit.
    ///
    /// Raw nibbles 1..=8 are real slots (8 is the slot at byte 28), so the
    /// pointer tag uses 9..=12.
    pub const POINTER_TAG_BASE: u32 = 9;

    /// Encode a relative pointer to a block start. The low four bits carry
    /// the pointer tag, derived from bits 2 and 3 of the offset.
    #[inline]
    pub fn from_pointer(relative: u32) -> Self {
        debug_assert!(relative % 4 == 0, "unaligned pointer {relative:#x}");
        let top28 = relative & !Nibble::MASK;
        let tag = ((relative & Nibble::MASK) >> 2) + Self::POINTER_TAG_BASE;
        Self::new(top28 | tag)
    }

    #[inline]
    pub fn pointer(self) -> u32 {
        debug_assert_eq!(self.state(), UnitState::Pointer);
        let tag = self.nibble(0).raw();
        (self.raw & !Nibble::MASK) | ((tag - Self::POINTER_TAG_BASE) << 2)
    }

    #[inline]
    pub fn state(self) -> UnitState {
        if self.raw == 0 {
            UnitState::Empty
        } else if self.nibble(0).raw() >= Self::POINTER_TAG_BASE {
            UnitState::Pointer
        } else {
            UnitState::Nibbles
        }
    }
}

impl ClassicUnit {
    /// Classic units never hold pointers.
    #[inline]
    pub fn state(self) -> UnitState {
        if self.raw == 0 {
            UnitState::Empty
        } else {
            UnitState::Nibbles
        }
    }
}

impl<O> fmt::Debug for MapUnit<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.raw)
    }
}
