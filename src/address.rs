//! `MsgAddress` loading, storing and text forms
//!
//! Supports `addr_none$00`, `addr_extern$01` and `addr_std$10` without
//! anycast rewriting. Standard addresses print and parse as
//! `workchain:hash`, with the hash in lowercase hex.

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::bitstring::BitString;
use crate::cell::builder::Builder;
use crate::cell::slice::Slice;
use crate::error::CellError;

/// A message address as carried in cell data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MsgAddress {
    /// `addr_none$00`.
    None,
    /// `addr_extern$01`, an external address of explicit bit length.
    Extern { address: BitString },
    /// `addr_std$10` without anycast.
    Std { workchain: i8, address: BitString },
}

impl MsgAddress {
    /// Loads an address at the cursor of `slice`.
    pub fn load(slice: &mut Slice) -> Result<Self, CellError> {
        match slice.load_uint(2)? {
            0b00 => Ok(MsgAddress::None),
            0b01 => {
                let len = slice.load_uint(9)? as usize;
                Ok(MsgAddress::Extern {
                    address: slice.load_bits(len)?,
                })
            }
            0b10 => {
                if slice.load_bit()? {
                    return Err(CellError::Address {
                        reason: "anycast addresses are not supported",
                    });
                }
                let workchain = slice.load_int(8)? as i8;
                let address = slice.load_bits(256)?;
                Ok(MsgAddress::Std { workchain, address })
            }
            _ => Err(CellError::Address {
                reason: "addr_var is not supported",
            }),
        }
    }

    /// Stores the address at the cursor of `builder`.
    pub fn store(&self, builder: &mut Builder) -> Result<(), CellError> {
        match self {
            MsgAddress::None => builder.store_uint(0b00, 2),
            MsgAddress::Extern { address } => {
                builder.store_uint(0b01, 2)?;
                builder.store_uint(address.len() as u64, 9)?;
                builder.store_bits(address)
            }
            MsgAddress::Std { workchain, address } => {
                if address.len() != 256 {
                    return Err(CellError::Address {
                        reason: "standard address hash must be 256 bits",
                    });
                }
                builder.store_uint(0b10, 2)?;
                builder.store_bit(false)?;
                builder.store_int(*workchain as i64, 8)?;
                builder.store_bits(address)
            }
        }
    }

    /// Parses the `workchain:hash` text form; the empty string is
    /// `addr_none`.
    pub fn parse_text(text: &str) -> Result<Self, CellError> {
        if text.is_empty() {
            return Ok(MsgAddress::None);
        }
        let Some((wc, hash)) = text.split_once(':') else {
            return Err(CellError::Address {
                reason: "expected `workchain:hash`",
            });
        };
        let workchain: i8 = wc.parse().map_err(|_| CellError::Address {
            reason: "workchain is not an 8-bit integer",
        })?;
        if hash.len() != 64 {
            return Err(CellError::Address {
                reason: "hash must be 64 hex digits",
            });
        }
        let mut bytes = Vec::with_capacity(32);
        for pair in 0..32 {
            let digits = &hash[pair * 2..pair * 2 + 2];
            bytes.push(u8::from_str_radix(digits, 16).map_err(|_| CellError::Address {
                reason: "hash contains a non-hex digit",
            })?);
        }
        Ok(MsgAddress::Std {
            workchain,
            address: BitString::from_bytes(&bytes),
        })
    }
}

impl Display for MsgAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MsgAddress::None => Ok(()),
            MsgAddress::Extern { address } => write!(f, "ext:{}", address),
            MsgAddress::Std { workchain, address } => {
                write!(f, "{}:", workchain)?;
                for byte in address.to_padded_bytes() {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}
