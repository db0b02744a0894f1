//! Hashmap dictionary codec
//!
//! Implements the `HashmapE n X` production: an empty bit or a root
//! reference, with inner nodes carrying a shared key prefix as a label
//! (`hml_short$0` with unary length, `hml_long$10`, `hml_same$11`) and
//! forking on the next key bit through two references. Keys are signed
//! two's-complement integers of the declared width; leaf payloads are
//! opaque to this module and handled by caller-supplied closures so the
//! schema layer can recurse into its own value types.

use std::sync::Arc;

use num_bigint::{BigInt, BigUint, Sign};

use crate::bitstring::BitString;
use crate::cell::builder::Builder;
use crate::cell::slice::Slice;
use crate::cell::{bit_len_of, Cell};
use crate::error::CellError;

/// Loads a `HashmapE key_bits` whose root sits at the cursor of `slice`.
///
/// Entries come back in key traversal order (unsigned bit order), each
/// leaf slice handed to `parse` positioned just past the label.
pub fn load_dict<T, E, F>(
    slice: &mut Slice,
    key_bits: usize,
    mut parse: F,
) -> Result<Vec<(BigInt, T)>, E>
where
    E: From<CellError>,
    F: FnMut(&mut Slice) -> Result<T, E>,
{
    let mut out = Vec::new();
    if !slice.load_bit().map_err(E::from)? {
        return Ok(out);
    }
    let root = slice.load_ref().map_err(E::from)?;
    parse_node(&root, BitString::new(), key_bits, &mut out, &mut parse)?;
    Ok(out)
}

fn parse_node<T, E, F>(
    cell: &Arc<Cell>,
    prefix: BitString,
    remaining: usize,
    out: &mut Vec<(BigInt, T)>,
    parse: &mut F,
) -> Result<(), E>
where
    E: From<CellError>,
    F: FnMut(&mut Slice) -> Result<T, E>,
{
    let mut s = cell.begin_parse().map_err(E::from)?;
    let label = read_label(&mut s, remaining).map_err(E::from)?;
    let m = remaining - label.len();
    let mut key = prefix;
    key.extend(&label);
    if m == 0 {
        let value = parse(&mut s)?;
        out.push((key_to_int(&key), value));
        return Ok(());
    }
    let left = s.load_ref().map_err(E::from)?;
    let right = s.load_ref().map_err(E::from)?;
    let mut left_key = key.clone();
    left_key.push(false);
    parse_node(&left, left_key, m - 1, out, parse)?;
    key.push(true);
    parse_node(&right, key, m - 1, out, parse)
}

fn read_label(s: &mut Slice, max: usize) -> Result<BitString, CellError> {
    if !s.load_bit()? {
        // hml_short: unary length, then the label bits
        let mut len = 0;
        while s.load_bit()? {
            len += 1;
            if len > max {
                return Err(CellError::Dict {
                    reason: "short label longer than the key",
                });
            }
        }
        s.load_bits(len)
    } else if !s.load_bit()? {
        // hml_long
        let len = s.load_uint(bit_len_of(max as u64))? as usize;
        if len > max {
            return Err(CellError::Dict {
                reason: "long label longer than the key",
            });
        }
        s.load_bits(len)
    } else {
        // hml_same
        let bit = s.load_bit()?;
        let len = s.load_uint(bit_len_of(max as u64))? as usize;
        if len > max {
            return Err(CellError::Dict {
                reason: "same-bit label longer than the key",
            });
        }
        Ok(BitString::repeat(bit, len))
    }
}

/// Interprets a full-width key as a signed two's-complement integer.
fn key_to_int(key: &BitString) -> BigInt {
    let mut acc = BigUint::default();
    for i in 0..key.len() {
        acc <<= 1u8;
        if key.get(i) == Some(true) {
            acc |= BigUint::from(1u8);
        }
    }
    if key.get(0) == Some(true) {
        BigInt::from(acc) - (BigInt::from(1u8) << key.len())
    } else {
        BigInt::from(acc)
    }
}

fn int_to_key(value: &BigInt, key_bits: usize) -> (BigUint, BitString) {
    let modulus = BigInt::from(1u8) << key_bits;
    let wrapped = ((value % &modulus) + &modulus) % &modulus;
    let (sign, magnitude) = wrapped.into_parts();
    debug_assert_ne!(sign, Sign::Minus);
    let mut bits = BitString::new();
    bits.append_uint_big(&magnitude, key_bits);
    (magnitude, bits)
}

/// Stores a `HashmapE key_bits` at the cursor of `builder`.
///
/// `entries` pairs keys with pre-encoded leaf payload cells whose bits
/// and references are spliced into the leaf nodes.
pub fn store_dict(
    builder: &mut Builder,
    key_bits: usize,
    entries: &[(BigInt, Arc<Cell>)],
) -> Result<(), CellError> {
    if entries.is_empty() {
        return builder.store_bit(false);
    }
    let mut items: Vec<(BigUint, BitString, Arc<Cell>)> = entries
        .iter()
        .map(|(key, payload)| {
            let (order, bits) = int_to_key(key, key_bits);
            (order, bits, Arc::clone(payload))
        })
        .collect();
    items.sort_by(|a, b| a.0.cmp(&b.0));
    for pair in items.windows(2) {
        if pair[0].0 == pair[1].0 {
            return Err(CellError::Dict {
                reason: "duplicate key",
            });
        }
    }
    builder.store_bit(true)?;
    let items: Vec<(BitString, Arc<Cell>)> = items
        .into_iter()
        .map(|(_, bits, payload)| (bits, payload))
        .collect();
    builder.store_ref(build_node(&items, 0, key_bits)?)
}

fn build_node(
    items: &[(BitString, Arc<Cell>)],
    offset: usize,
    remaining: usize,
) -> Result<Arc<Cell>, CellError> {
    let first = &items[0].0;
    let mut label_len = 0;
    while label_len < remaining
        && items
            .iter()
            .all(|(key, _)| key.get(offset + label_len) == first.get(offset + label_len))
    {
        label_len += 1;
    }
    let label = first.slice(offset, offset + label_len);
    let m = remaining - label_len;

    let mut b = Builder::new();
    write_label(&mut b, &label, remaining)?;
    if m == 0 {
        b.store_slice(&items[0].1.begin_parse()?)?;
    } else {
        let split = items.partition_point(|(key, _)| key.get(offset + label_len) == Some(false));
        b.store_ref(build_node(&items[..split], offset + label_len + 1, m - 1)?)?;
        b.store_ref(build_node(&items[split..], offset + label_len + 1, m - 1)?)?;
    }
    Ok(Arc::new(b.finish()))
}

fn write_label(b: &mut Builder, label: &BitString, max: usize) -> Result<(), CellError> {
    let len = label.len();
    let len_bits = bit_len_of(max as u64);
    let short_cost = 2 + 2 * len;
    let long_cost = 2 + len_bits + len;
    let same = len > 0 && (1..len).all(|i| label.get(i) == label.get(0));
    let same_cost = if same { 3 + len_bits } else { usize::MAX };

    if short_cost <= long_cost && short_cost <= same_cost {
        b.store_bit(false)?;
        for _ in 0..len {
            b.store_bit(true)?;
        }
        b.store_bit(false)?;
        b.store_bits(label)
    } else if long_cost <= same_cost {
        b.store_uint(0b10, 2)?;
        b.store_uint(len as u64, len_bits)?;
        b.store_bits(label)
    } else {
        b.store_uint(0b11, 2)?;
        b.store_bit(label.get(0) == Some(true))?;
        b.store_uint(len as u64, len_bits)
    }
}
