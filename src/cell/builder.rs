//! Write cursor producing a cell
//!
//! A [`Builder`] accumulates bits and references and enforces the
//! per-cell caps at every store, so [`finish`](Builder::finish) is
//! infallible.

use std::sync::Arc;

use num_bigint::{BigInt, BigUint, Sign};

use crate::address::MsgAddress;
use crate::bitstring::BitString;
use crate::cell::slice::Slice;
use crate::cell::{bit_len_of, dict, Cell, MAX_BITS, MAX_REFS};
use crate::error::CellError;

/// A write cursor for one [`Cell`].
#[derive(Default, Debug)]
pub struct Builder {
    data: BitString,
    refs: Vec<Arc<Cell>>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bit_len(&self) -> usize {
        self.data.len()
    }

    pub fn refs_len(&self) -> usize {
        self.refs.len()
    }

    fn ensure_bits(&self, n: usize) -> Result<(), CellError> {
        if self.data.len() + n > MAX_BITS {
            Err(CellError::BitOverflow {
                used: self.data.len(),
                requested: n,
            })
        } else {
            Ok(())
        }
    }

    pub fn store_bit(&mut self, bit: bool) -> Result<(), CellError> {
        self.ensure_bits(1)?;
        self.data.push(bit);
        Ok(())
    }

    pub fn store_bits(&mut self, bits: &BitString) -> Result<(), CellError> {
        self.ensure_bits(bits.len())?;
        self.data.extend(bits);
        Ok(())
    }

    /// Stores the low `n` bits of `value`, most significant first.
    pub fn store_uint(&mut self, value: u64, n: usize) -> Result<(), CellError> {
        if n > 64 {
            return Err(CellError::IntWidth { bits: n });
        }
        self.ensure_bits(n)?;
        self.data.append_uint(value, n);
        Ok(())
    }

    pub fn store_uint_big(&mut self, value: &BigUint, n: usize) -> Result<(), CellError> {
        self.ensure_bits(n)?;
        self.data.append_uint_big(value, n);
        Ok(())
    }

    /// Stores `value` as an `n`-bit two's-complement integer.
    pub fn store_int(&mut self, value: i64, n: usize) -> Result<(), CellError> {
        if n > 64 {
            return Err(CellError::IntWidth { bits: n });
        }
        let masked = if n == 64 {
            value as u64
        } else if n == 0 {
            0
        } else {
            (value as u64) & ((1u64 << n) - 1)
        };
        self.store_uint(masked, n)
    }

    /// Stores `value` as an `n`-bit two's-complement big integer.
    pub fn store_int_big(&mut self, value: &BigInt, n: usize) -> Result<(), CellError> {
        if n == 0 {
            return Ok(());
        }
        let modulus = BigInt::from(1u8) << n;
        let wrapped = ((value % &modulus) + &modulus) % &modulus;
        let (sign, magnitude) = wrapped.into_parts();
        debug_assert_ne!(sign, Sign::Minus);
        self.store_uint_big(&magnitude, n)
    }

    /// Stores a variable-length currency amount (`VarUInteger 16`).
    pub fn store_coins(&mut self, value: &BigUint) -> Result<(), CellError> {
        self.store_var_uint_big(value, 16)
    }

    pub fn store_var_uint_big(
        &mut self,
        value: &BigUint,
        max_bytes: usize,
    ) -> Result<(), CellError> {
        let bytes = ((value.bits() + 7) / 8) as usize;
        self.store_var_len(bytes, max_bytes)?;
        self.store_uint_big(value, bytes * 8)
    }

    pub fn store_var_int_big(
        &mut self,
        value: &BigInt,
        max_bytes: usize,
    ) -> Result<(), CellError> {
        let bytes = if value.sign() == Sign::NoSign {
            0
        } else {
            ((value.bits() + 1 + 7) / 8) as usize
        };
        self.store_var_len(bytes, max_bytes)?;
        self.store_int_big(value, bytes * 8)
    }

    fn store_var_len(&mut self, bytes: usize, max_bytes: usize) -> Result<(), CellError> {
        if bytes >= max_bytes {
            return Err(CellError::VarWidth {
                limit: max_bytes,
                actual: bytes,
            });
        }
        let len_bits = bit_len_of(max_bytes.saturating_sub(1) as u64);
        self.store_uint(bytes as u64, len_bits)
    }

    pub fn store_ref(&mut self, cell: Arc<Cell>) -> Result<(), CellError> {
        if self.refs.len() >= MAX_REFS {
            return Err(CellError::RefOverflow {
                used: self.refs.len(),
            });
        }
        self.refs.push(cell);
        Ok(())
    }

    /// Stores one bit flagging the presence of `cell`, then the reference.
    pub fn store_maybe_ref(&mut self, cell: Option<Arc<Cell>>) -> Result<(), CellError> {
        match cell {
            Some(cell) => {
                self.store_bit(true)?;
                self.store_ref(cell)
            }
            None => self.store_bit(false),
        }
    }

    pub fn store_address(&mut self, address: &MsgAddress) -> Result<(), CellError> {
        address.store(self)
    }

    /// Copies the unconsumed bits and references of `slice`.
    pub fn store_slice(&mut self, slice: &Slice) -> Result<(), CellError> {
        let mut probe = slice.clone();
        let bits = probe.load_bits(probe.remaining_bits())?;
        self.store_bits(&bits)?;
        while probe.remaining_refs() > 0 {
            self.store_ref(probe.load_ref()?)?;
        }
        Ok(())
    }

    /// Stores a `HashmapE key_bits` dictionary built from pre-encoded
    /// leaf payload cells.
    pub fn store_dict(
        &mut self,
        key_bits: usize,
        entries: &[(BigInt, Arc<Cell>)],
    ) -> Result<(), CellError> {
        dict::store_dict(self, key_bits, entries)
    }

    /// Seals the builder into a cell.
    pub fn finish(self) -> Cell {
        Cell::from_parts(self.data, self.refs, false)
    }
}
