//! Word-addressable backing store for the map.

use std::fmt;

/// Byte-addressable memory the map keeps its units in.
///
/// Addresses are absolute. Both accessors require a 4-byte aligned address
/// whose whole word lies inside the store, and panic otherwise: a misaligned
/// or out-of-bounds access means the engine computed a bad unit index.
pub trait BackingStore {
    /// A store of `size` zero bytes mapped at `base`.
    fn zeroed(base: u64, size: usize) -> Self
    where
        Self: Sized;

    /// Lowest address covered by the store.
    fn base_address(&self) -> u64;

    /// Size of the store in bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_word(&self, addr: u64) -> u32;

    fn write_word(&mut self, addr: u64, value: u32);

    /// Whether the word at `addr` lies entirely inside the store.
    fn contains_word(&self, addr: u64) -> bool {
        addr.checked_sub(self.base_address())
            .and_then(|off| off.checked_add(4))
            .is_some_and(|end| end <= self.len() as u64)
    }
}

/// Heap-backed store: a zeroed byte buffer mapped at a fixed base address.
///
/// Words are stored little endian.
#[derive(Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    data: Vec<u8>,
    base: u64,
}

impl MemoryRegion {
    /// Zeroed region of `size` bytes mapped at address 0.
    pub fn new(size: usize) -> Self {
        Self::with_base(0, size)
    }

    pub fn with_base(base: u64, size: usize) -> Self {
        Self {
            data: vec![0; size],
            base,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    fn offset_of(&self, addr: u64) -> usize {
        assert!(addr % 4 == 0, "unaligned word access at {addr:#x}");
        assert!(
            addr >= self.base,
            "address {addr:#x} is below the base address {:#x}",
            self.base
        );
        let off = (addr - self.base) as usize;
        assert!(
            off + 4 <= self.data.len(),
            "word at {addr:#x} goes out of bounds (store is {} bytes)",
            self.data.len()
        );
        off
    }
}

impl BackingStore for MemoryRegion {
    fn zeroed(base: u64, size: usize) -> Self {
        Self::with_base(base, size)
    }

    fn base_address(&self) -> u64 {
        self.base
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn read_word(&self, addr: u64) -> u32 {
        let at = self.offset_of(addr);
        u32::from_le_bytes([
            self.data[at],
            self.data[at + 1],
            self.data[at + 2],
            self.data[at + 3],
        ])
    }

    #[inline]
    fn write_word(&mut self, addr: u64, value: u32) {
        let at = self.offset_of(addr);
        self.data[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.data.iter().enumerate() {
            if i > 0 {
                f.write_str("-")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRegion")
            .field("base", &format_args!("{:#x}", self.base))
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write() {
        let mut m = MemoryRegion::new(100);
        assert_eq!(m.read_word(0), 0);

        m.write_word(0, 100);
        assert_eq!(m.read_word(0), 100);

        m.write_word(96, 0xDEAD_BEEF);
        assert_eq!(m.read_word(96), 0xDEAD_BEEF);
        assert_eq!(&m.as_bytes()[96..100], &[0xEF, 0xBE, 0xAD, 0xDE]);
    }

    #[test]
    fn test_base_address() {
        let mut m = MemoryRegion::with_base(0x1000, 8);
        m.write_word(0x1004, 7);
        assert_eq!(m.read_word(0x1004), 7);
        assert_eq!(m.read_word(0x1000), 0);
        assert!(m.contains_word(0x1004));
        assert!(!m.contains_word(0x1008));
        assert!(!m.contains_word(0xFFC));
    }

    #[test]
    fn test_display() {
        let mut m = MemoryRegion::new(4);
        m.write_word(0, 0x0102_A0FF);
        assert_eq!(m.to_string(), "FF-A0-02-01");
        assert_eq!(MemoryRegion::new(0).to_string(), "");
    }

    #[test]
    #[should_panic(expected = "unaligned")]
    fn test_unaligned_panics() {
        MemoryRegion::new(8).read_word(2);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_out_of_bounds_panics() {
        MemoryRegion::new(8).write_word(8, 1);
    }

    #[test]
    #[should_panic(expected = "below the base")]
    fn test_below_base_panics() {
        MemoryRegion::with_base(0x1000, 8).read_word(0);
    }
}
