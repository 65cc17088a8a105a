//! Nibble search primitives.
//!
//! Nibbles are numbered from the least significant end of the word: nibble
//! `i` occupies bits `4*i .. 4*i + 4`. The fast versions use the hardware
//! bit counts; the `_fallback` versions are the plain linear scans they
//! replace, and must agree with them for every input.

/// Index of the most significant non-zero nibble of `word`.
#[inline]
pub fn highest_set_nibble(word: u32) -> Option<u32> {
    if word == 0 {
        return None;
    }
    Some((31 - word.leading_zeros()) / 4)
}

/// Index of the least significant non-zero nibble of `word`.
#[inline]
pub fn lowest_set_nibble(word: u32) -> Option<u32> {
    if word == 0 {
        return None;
    }
    Some(word.trailing_zeros() / 4)
}

#[inline]
pub fn highest_set_nibble_fallback(word: u32) -> Option<u32> {
    (0..8).rev().find(|&i| (word >> (4 * i)) & 0xF != 0)
}

#[inline]
pub fn lowest_set_nibble_fallback(word: u32) -> Option<u32> {
    (0..8).find(|&i| (word >> (4 * i)) & 0xF != 0)
}

/// Mask keeping nibbles `0..n` (the `n` least significant nibbles).
#[inline]
pub fn low_nibbles_mask(n: u32) -> u32 {
    debug_assert!(n <= 8);
    if n == 0 {
        0
    } else {
        u32::MAX >> (32 - 4 * n)
    }
}

/// Mask keeping nibbles `8-n..8` (the `n` most significant nibbles).
#[inline]
pub fn high_nibbles_mask(n: u32) -> u32 {
    debug_assert!(n <= 8);
    if n == 0 {
        0
    } else {
        u32::MAX << (32 - 4 * n)
    }
}
