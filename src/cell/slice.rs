//! Read cursor over a single cell
//!
//! A [`Slice`] tracks two positions inside one cell: how many data bits
//! and how many references have been consumed. All parsing is
//! non-backtracking at the primitive level, but the cursor supports
//! signed [`skip`](Slice::skip) and an explicit
//! [`checkpoint`](Slice::checkpoint)/[`rollback`](Slice::rollback) pair so
//! that the constructor-matching machinery above can restore a slice to a
//! previously observed state exactly.

use std::sync::Arc;

use num_bigint::{BigInt, BigUint};

use crate::address::MsgAddress;
use crate::bitstring::BitString;
use crate::cell::{bit_len_of, dict, Cell};
use crate::error::CellError;

/// A read cursor over one [`Cell`].
#[derive(Clone, Debug)]
pub struct Slice {
    cell: Arc<Cell>,
    bits: usize,
    refs: usize,
}

/// A saved `(bits consumed, refs consumed)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    bits: usize,
    refs: usize,
}

impl Slice {
    pub(crate) fn new(cell: Arc<Cell>) -> Self {
        Self {
            cell,
            bits: 0,
            refs: 0,
        }
    }

    /// Data bits not yet consumed.
    pub fn remaining_bits(&self) -> usize {
        self.cell.bit_len() - self.bits
    }

    /// References not yet consumed.
    pub fn remaining_refs(&self) -> usize {
        self.cell.refs().len() - self.refs
    }

    /// Snapshots the current cursor positions.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            bits: self.bits,
            refs: self.refs,
        }
    }

    /// Restores cursor positions saved by [`checkpoint`](Slice::checkpoint).
    pub fn rollback(&mut self, saved: Checkpoint) {
        self.bits = saved.bits;
        self.refs = saved.refs;
    }

    /// Moves the bit cursor by `delta`, which may be negative.
    pub fn skip(&mut self, delta: isize) -> Result<(), CellError> {
        let target = self.bits as isize + delta;
        if target < 0 || target as usize > self.cell.bit_len() {
            return Err(CellError::SkipOutOfRange {
                position: self.bits,
                delta,
            });
        }
        self.bits = target as usize;
        Ok(())
    }

    /// Moves the reference cursor by `delta`, which may be negative.
    pub fn skip_refs(&mut self, delta: isize) -> Result<(), CellError> {
        let target = self.refs as isize + delta;
        if target < 0 || target as usize > self.cell.refs().len() {
            return Err(CellError::SkipOutOfRange {
                position: self.refs,
                delta,
            });
        }
        self.refs = target as usize;
        Ok(())
    }

    fn ensure_bits(&self, n: usize) -> Result<(), CellError> {
        if self.remaining_bits() < n {
            Err(CellError::BitUnderflow {
                remaining: self.remaining_bits(),
                requested: n,
            })
        } else {
            Ok(())
        }
    }

    fn read_uint_at(&self, start: usize, n: usize) -> u64 {
        let data = self.cell.data();
        let mut acc = 0u64;
        for i in 0..n {
            acc <<= 1;
            if data.get(start + i) == Some(true) {
                acc |= 1;
            }
        }
        acc
    }

    /// Reads `n` bits as an unsigned integer without advancing.
    pub fn preload_uint(&self, n: usize) -> Result<u64, CellError> {
        if n > 64 {
            return Err(CellError::IntWidth { bits: n });
        }
        self.ensure_bits(n)?;
        Ok(self.read_uint_at(self.bits, n))
    }

    /// Consumes `n` bits as an unsigned integer (`n <= 64`).
    pub fn load_uint(&mut self, n: usize) -> Result<u64, CellError> {
        let value = self.preload_uint(n)?;
        self.bits += n;
        Ok(value)
    }

    /// Consumes `n` bits as a two's-complement signed integer (`n <= 64`).
    pub fn load_int(&mut self, n: usize) -> Result<i64, CellError> {
        let raw = self.load_uint(n)?;
        Ok(to_signed(raw, n))
    }

    /// Consumes `n` bits as an unsigned big integer.
    pub fn load_uint_big(&mut self, n: usize) -> Result<BigUint, CellError> {
        self.ensure_bits(n)?;
        let data = self.cell.data();
        let mut acc = BigUint::default();
        for i in 0..n {
            acc <<= 1u8;
            if data.get(self.bits + i) == Some(true) {
                acc |= BigUint::from(1u8);
            }
        }
        self.bits += n;
        Ok(acc)
    }

    /// Consumes `n` bits as a two's-complement signed big integer.
    pub fn load_int_big(&mut self, n: usize) -> Result<BigInt, CellError> {
        if n == 0 {
            return Ok(BigInt::default());
        }
        let raw = self.load_uint_big(n)?;
        if raw.bit(n as u64 - 1) {
            Ok(BigInt::from(raw) - (BigInt::from(1u8) << n))
        } else {
            Ok(BigInt::from(raw))
        }
    }

    /// Consumes a single bit.
    pub fn load_bit(&mut self) -> Result<bool, CellError> {
        self.ensure_bits(1)?;
        let bit = self.cell.data().get(self.bits) == Some(true);
        self.bits += 1;
        Ok(bit)
    }

    /// Consumes `n` raw bits.
    pub fn load_bits(&mut self, n: usize) -> Result<BitString, CellError> {
        self.ensure_bits(n)?;
        let out = self.cell.data().slice(self.bits, self.bits + n);
        self.bits += n;
        Ok(out)
    }

    /// Consumes a variable-length currency amount (`VarUInteger 16`).
    pub fn load_coins(&mut self) -> Result<BigUint, CellError> {
        self.load_var_uint_big(16)
    }

    /// Consumes a `VarUInteger max_bytes`: a byte count in
    /// `bit_len(max_bytes - 1)` bits, then that many value bytes.
    pub fn load_var_uint_big(&mut self, max_bytes: usize) -> Result<BigUint, CellError> {
        let len = self.load_var_len(max_bytes)?;
        self.load_uint_big(len * 8)
    }

    /// Consumes a `VarInteger max_bytes` (two's-complement value bytes).
    pub fn load_var_int_big(&mut self, max_bytes: usize) -> Result<BigInt, CellError> {
        let len = self.load_var_len(max_bytes)?;
        self.load_int_big(len * 8)
    }

    fn load_var_len(&mut self, max_bytes: usize) -> Result<usize, CellError> {
        let len_bits = bit_len_of(max_bytes.saturating_sub(1) as u64);
        let len = self.load_uint(len_bits)? as usize;
        if len >= max_bytes {
            return Err(CellError::VarWidth {
                limit: max_bytes,
                actual: len,
            });
        }
        Ok(len)
    }

    /// Consumes the next reference.
    pub fn load_ref(&mut self) -> Result<Arc<Cell>, CellError> {
        match self.cell.refs().get(self.refs) {
            Some(cell) => {
                self.refs += 1;
                Ok(Arc::clone(cell))
            }
            None => Err(CellError::RefUnderflow {
                remaining: 0,
                requested: 1,
            }),
        }
    }

    /// Consumes one bit and, when it is set, the next reference.
    pub fn load_maybe_ref(&mut self) -> Result<Option<Arc<Cell>>, CellError> {
        if self.load_bit()? {
            Ok(Some(self.load_ref()?))
        } else {
            Ok(None)
        }
    }

    /// Consumes an address per the `MsgAddress` grammar.
    pub fn load_address(&mut self) -> Result<MsgAddress, CellError> {
        MsgAddress::load(self)
    }

    /// Consumes a `HashmapE key_bits` dictionary, handing each leaf slice
    /// to `parse` and collecting entries in key traversal order.
    pub fn load_dict<T, E, F>(
        &mut self,
        key_bits: usize,
        parse: F,
    ) -> Result<Vec<(BigInt, T)>, E>
    where
        E: From<CellError>,
        F: FnMut(&mut Slice) -> Result<T, E>,
    {
        dict::load_dict(self, key_bits, parse)
    }
}

/// Re-interprets the low `bits` of `value` as two's-complement.
pub(crate) fn to_signed(value: u64, bits: usize) -> i64 {
    if bits == 0 || bits == 64 {
        value as i64
    } else if (value >> (bits - 1)) & 1 == 1 {
        (value | (u64::MAX << bits)) as i64
    } else {
        value as i64
    }
}
