//! VM-stack tuple codec
//!
//! Serialises and parses the `VmStackValue` subset the codec exchanges
//! through `Tuple`-typed fields: nulls, integers (`vm_stk_tinyint` for
//! values fitting 64 bits, the 15-bit-tagged `vm_stk_int` with an int257
//! body otherwise), cells, and nested tuples with the `VmTuple` head/tail
//! list encoding.

use std::sync::Arc;

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::cell::builder::Builder;
use crate::cell::slice::Slice;
use crate::cell::Cell;
use crate::error::CellError;

/// One entry of a VM stack tuple.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StackEntry {
    Null,
    Int(BigInt),
    Cell(Arc<Cell>),
    Tuple(Vec<StackEntry>),
}

/// Parses the tuple serialized in `cell`.
pub fn parse_tuple(cell: &Arc<Cell>) -> Result<Vec<StackEntry>, CellError> {
    let mut s = cell.begin_parse()?;
    match parse_entry(&mut s)? {
        StackEntry::Tuple(items) => Ok(items),
        _ => Err(CellError::Tuple {
            reason: "root value is not a tuple",
        }),
    }
}

/// Serialises `items` into a fresh cell.
pub fn serialize_tuple(items: &[StackEntry]) -> Result<Arc<Cell>, CellError> {
    let mut b = Builder::new();
    write_tuple(&mut b, items)?;
    Ok(Arc::new(b.finish()))
}

fn parse_entry(s: &mut Slice) -> Result<StackEntry, CellError> {
    match s.load_uint(8)? {
        0x00 => Ok(StackEntry::Null),
        0x01 => Ok(StackEntry::Int(BigInt::from(s.load_int(64)?))),
        0x02 => {
            if s.load_uint(7)? != 0 {
                return Err(CellError::Tuple {
                    reason: "unknown integer tag refinement",
                });
            }
            Ok(StackEntry::Int(s.load_int_big(257)?))
        }
        0x03 => Ok(StackEntry::Cell(s.load_ref()?)),
        0x07 => {
            let len = s.load_uint(16)? as usize;
            Ok(StackEntry::Tuple(parse_vm_tuple(s, len)?))
        }
        _ => Err(CellError::Tuple {
            reason: "unknown stack value tag",
        }),
    }
}

fn parse_vm_tuple(s: &mut Slice, len: usize) -> Result<Vec<StackEntry>, CellError> {
    if len == 0 {
        return Ok(Vec::new());
    }
    let mut items = parse_tupref(s, len - 1)?;
    let tail = s.load_ref()?;
    let mut ts = tail.begin_parse()?;
    items.push(parse_entry(&mut ts)?);
    Ok(items)
}

fn parse_tupref(s: &mut Slice, n: usize) -> Result<Vec<StackEntry>, CellError> {
    match n {
        0 => Ok(Vec::new()),
        1 => {
            let cell = s.load_ref()?;
            let mut cs = cell.begin_parse()?;
            Ok(vec![parse_entry(&mut cs)?])
        }
        _ => {
            let cell = s.load_ref()?;
            let mut cs = cell.begin_parse()?;
            parse_vm_tuple(&mut cs, n)
        }
    }
}

fn write_entry(b: &mut Builder, entry: &StackEntry) -> Result<(), CellError> {
    match entry {
        StackEntry::Null => b.store_uint(0x00, 8),
        StackEntry::Int(value) => match value.to_i64() {
            Some(small) => {
                b.store_uint(0x01, 8)?;
                b.store_int(small, 64)
            }
            None => {
                b.store_uint(0x02, 8)?;
                b.store_uint(0, 7)?;
                b.store_int_big(value, 257)
            }
        },
        StackEntry::Cell(cell) => {
            b.store_uint(0x03, 8)?;
            b.store_ref(Arc::clone(cell))
        }
        StackEntry::Tuple(items) => write_tuple(b, items),
    }
}

fn write_tuple(b: &mut Builder, items: &[StackEntry]) -> Result<(), CellError> {
    b.store_uint(0x07, 8)?;
    b.store_uint(items.len() as u64, 16)?;
    write_vm_tuple(b, items)
}

fn write_vm_tuple(b: &mut Builder, items: &[StackEntry]) -> Result<(), CellError> {
    let Some((tail, head)) = items.split_last() else {
        return Ok(());
    };
    write_tupref(b, head)?;
    let mut tb = Builder::new();
    write_entry(&mut tb, tail)?;
    b.store_ref(Arc::new(tb.finish()))
}

fn write_tupref(b: &mut Builder, items: &[StackEntry]) -> Result<(), CellError> {
    match items.len() {
        0 => Ok(()),
        1 => {
            let mut eb = Builder::new();
            write_entry(&mut eb, &items[0])?;
            b.store_ref(Arc::new(eb.finish()))
        }
        _ => {
            let mut ib = Builder::new();
            write_vm_tuple(&mut ib, items)?;
            b.store_ref(Arc::new(ib.finish()))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn round_trip(items: Vec<StackEntry>) {
        let cell = serialize_tuple(&items).unwrap();
        assert_eq!(parse_tuple(&cell).unwrap(), items);
    }

    #[test]
    fn empty_tuple() {
        round_trip(vec![]);
    }

    #[test]
    fn scalars_round_trip() {
        round_trip(vec![
            StackEntry::Null,
            StackEntry::Int(BigInt::from(-42)),
            StackEntry::Cell(Cell::empty()),
        ]);
    }

    #[test]
    fn wide_integers_take_the_int257_form() {
        let wide = BigInt::from(u64::MAX) * BigInt::from(1000u32);
        round_trip(vec![StackEntry::Int(wide)]);
    }

    #[test]
    fn nested_tuples_round_trip() {
        round_trip(vec![
            StackEntry::Int(BigInt::from(1)),
            StackEntry::Tuple(vec![
                StackEntry::Null,
                StackEntry::Tuple(vec![StackEntry::Int(BigInt::from(7))]),
            ]),
            StackEntry::Int(BigInt::from(2)),
        ]);
    }

    #[test]
    fn longer_tuples_chain_through_refs() {
        let items: Vec<StackEntry> = (0..9).map(|i| StackEntry::Int(BigInt::from(i))).collect();
        round_trip(items);
    }
}
