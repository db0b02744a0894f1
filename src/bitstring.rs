//! Bit-granular owned buffer underlying cells and raw bit-string values
//!
//! A [`BitString`] is the unit of exchange between the cell layer and the
//! codec: cell payloads, decoded `bits n` fields and dictionary labels are
//! all bit strings. Bits are stored MSB-first, so the textual rendering
//! reads in the same order the bits travel on the wire.
//!
//! The `Display` implementation follows the hexadecimal-with-completion-tag
//! convention: a string whose length is a multiple of four prints as plain
//! hex digits, anything else is padded with a single `1` bit and trailing
//! zeroes and printed with a `_` suffix (`"FA3_"`).

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};

use bitvec::prelude::{BitSlice, BitVec, Msb0};
use num_bigint::BigUint;

/// Growable MSB-first bit buffer.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BitString {
    bits: BitVec<u8, Msb0>,
}

impl BitString {
    /// Creates an empty bit string.
    pub fn new() -> Self {
        Self {
            bits: BitVec::new(),
        }
    }

    /// Creates a bit string of `len` copies of `bit`.
    pub fn repeat(bit: bool, len: usize) -> Self {
        Self {
            bits: BitVec::repeat(bit, len),
        }
    }

    /// Interprets every bit of `bytes` as content.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bits: BitVec::from_slice(bytes),
        }
    }

    /// Interprets the first `len` bits of `bytes` as content.
    ///
    /// # Panics
    ///
    /// Panics when `len` exceeds `bytes.len() * 8`.
    pub fn from_bytes_prefix(bytes: &[u8], len: usize) -> Self {
        let view: &BitSlice<u8, Msb0> = BitSlice::from_slice(bytes);
        Self {
            bits: view[..len].to_bitvec(),
        }
    }

    /// Encodes `text` as its UTF-8 bytes.
    pub fn from_text(text: &str) -> Self {
        Self::from_bytes(text.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Returns the bit at `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Option<bool> {
        self.bits.get(index).map(|bit| *bit)
    }

    pub fn push(&mut self, bit: bool) {
        self.bits.push(bit);
    }

    /// Appends every bit of `other`.
    pub fn extend(&mut self, other: &BitString) {
        self.bits.extend_from_bitslice(&other.bits);
    }

    pub fn extend_from_bitslice(&mut self, slice: &BitSlice<u8, Msb0>) {
        self.bits.extend_from_bitslice(slice);
    }

    /// Appends the low `len` bits of `value`, most significant first.
    pub fn append_uint(&mut self, value: u64, len: usize) {
        debug_assert!(len <= 64);
        for shift in (0..len).rev() {
            self.bits.push((value >> shift) & 1 == 1);
        }
    }

    /// Appends the low `len` bits of `value`, most significant first.
    pub fn append_uint_big(&mut self, value: &BigUint, len: usize) {
        for shift in (0..len).rev() {
            self.bits.push(value.bit(shift as u64));
        }
    }

    /// Copies the bits in `range` out into a fresh string.
    pub fn slice(&self, start: usize, end: usize) -> BitString {
        Self {
            bits: self.bits[start..end].to_bitvec(),
        }
    }

    pub fn as_bitslice(&self) -> &BitSlice<u8, Msb0> {
        &self.bits
    }

    /// The content as whole bytes, or `None` when the length is not a
    /// multiple of eight.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        if self.bits.len() % 8 != 0 {
            return None;
        }
        Some(self.gather_bytes())
    }

    /// The content padded to whole bytes with the completion tag: a `1`
    /// bit followed by zeroes, unless the string is already byte-aligned.
    ///
    /// This is the on-disk form used by the bag-of-cells serialisation.
    pub fn to_padded_bytes(&self) -> Vec<u8> {
        if self.bits.len() % 8 == 0 {
            return self.gather_bytes();
        }
        let mut padded = self.clone();
        padded.push(true);
        while padded.len() % 8 != 0 {
            padded.push(false);
        }
        padded.gather_bytes()
    }

    /// Decodes the content as UTF-8 text.
    ///
    /// Returns `None` unless the length is byte-aligned and the bytes form
    /// valid UTF-8 (the deterministic round-trip criterion for treating a
    /// bit string as text).
    pub fn to_text(&self) -> Option<String> {
        String::from_utf8(self.to_bytes()?).ok()
    }

    fn gather_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity((self.bits.len() + 7) / 8);
        for chunk in self.bits.chunks(8) {
            let mut byte = 0u8;
            for (pos, bit) in chunk.iter().by_vals().enumerate() {
                if bit {
                    byte |= 0x80 >> pos;
                }
            }
            out.push(byte);
        }
        out
    }
}

fn write_nibbles(view: &BitSlice<u8, Msb0>, f: &mut Formatter<'_>) -> FmtResult {
    for nibble in view.chunks(4) {
        let mut digit = 0u8;
        for (pos, bit) in nibble.iter().by_vals().enumerate() {
            if bit {
                digit |= 0x8 >> pos;
            }
        }
        write!(f, "{:X}", digit)?;
    }
    Ok(())
}

impl Display for BitString {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if self.bits.len() % 4 == 0 {
            write_nibbles(&self.bits, f)
        } else {
            let mut padded = self.bits.clone();
            padded.push(true);
            while padded.len() % 4 != 0 {
                padded.push(false);
            }
            write_nibbles(&padded, f)?;
            write!(f, "_")
        }
    }
}

impl Debug for BitString {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "b{{{}}}", self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn uint_append_is_msb_first() {
        let mut bs = BitString::new();
        bs.append_uint(0b101, 3);
        assert_eq!(bs.get(0), Some(true));
        assert_eq!(bs.get(1), Some(false));
        assert_eq!(bs.get(2), Some(true));
        assert_eq!(bs.get(3), None);
    }

    #[test]
    fn hex_display_aligned_and_tagged() {
        let mut aligned = BitString::new();
        aligned.append_uint(0xFA3, 12);
        assert_eq!(aligned.to_string(), "FA3");

        let mut ragged = BitString::new();
        ragged.append_uint(0b10, 2);
        // 10 + completion tag 1 + pad 0 => nibble 1010
        assert_eq!(ragged.to_string(), "A_");
    }

    #[test]
    fn text_round_trip() {
        let bs = BitString::from_text("ABC");
        assert_eq!(bs.len(), 24);
        assert_eq!(bs.to_text().as_deref(), Some("ABC"));

        let mut not_text = BitString::from_bytes(&[0xFF, 0xFE]);
        assert_eq!(not_text.to_text(), None);
        not_text.push(true);
        assert_eq!(not_text.to_bytes(), None);
    }

    #[test]
    fn padded_bytes_carry_completion_tag() {
        let mut bs = BitString::new();
        bs.append_uint(0b101, 3);
        assert_eq!(bs.to_padded_bytes(), vec![0b1011_0000]);
        assert_eq!(BitString::from_bytes(&[0x41]).to_padded_bytes(), vec![0x41]);
    }

    #[test]
    fn big_uint_append() {
        let mut bs = BitString::new();
        bs.append_uint_big(&BigUint::from(0x1FFu32), 9);
        // 111111111 + tag 1 + 00 => FFC
        assert_eq!(bs.to_string(), "FFC_");
        assert_eq!(bs.len(), 9);
    }
}
