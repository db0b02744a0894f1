//! Bag-of-cells serialization
//!
//! The interchange form for cell trees: a flat list of cells in
//! topological order (every reference points at a higher index), wrapped
//! in a small header carrying the magic `b5ee9c72`, the index width and
//! the root list. Reading tolerates the optional index table and CRC
//! trailer by skipping them; writing always emits the minimal no-index,
//! no-CRC, single-root form.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::bitstring::BitString;
use crate::cell::{bit_len_of, Cell, MAX_BITS, MAX_REFS};
use crate::error::{BocError, CellError};

const MAGIC: u32 = 0xb5ee_9c72;

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], BocError> {
        if self.pos + n > self.buf.len() {
            return Err(BocError::Truncated);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn take_byte(&mut self) -> Result<u8, BocError> {
        Ok(self.take(1)?[0])
    }

    /// Reads an `n`-byte big-endian unsigned integer (`n <= 8`).
    fn take_uint(&mut self, n: usize) -> Result<u64, BocError> {
        let bytes = self.take(n)?;
        Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }
}

struct RawCell {
    data: BitString,
    refs: Vec<usize>,
    exotic: bool,
}

/// Decodes a base64-wrapped bag of cells into its single root.
pub fn from_base64(text: &str) -> Result<Arc<Cell>, BocError> {
    let bytes = STANDARD.decode(text.trim())?;
    parse(&bytes)
}

/// Decodes a bag of cells into its single root.
pub fn parse(bytes: &[u8]) -> Result<Arc<Cell>, BocError> {
    let mut r = ByteReader::new(bytes);

    let magic = r.take_uint(4)? as u32;
    if magic != MAGIC {
        return Err(BocError::BadMagic(magic));
    }
    let flags = r.take_byte()?;
    let has_idx = flags & 0x80 != 0;
    let has_crc = flags & 0x40 != 0;
    let ref_size = (flags & 0x07) as usize;
    if ref_size == 0 || ref_size > 8 {
        return Err(BocError::Malformed("reference size out of range"));
    }
    let off_bytes = r.take_byte()? as usize;
    if off_bytes > 8 {
        return Err(BocError::Malformed("offset size out of range"));
    }

    let cell_count = r.take_uint(ref_size)? as usize;
    let root_count = r.take_uint(ref_size)? as usize;
    let absent = r.take_uint(ref_size)? as usize;
    let _total_size = r.take_uint(off_bytes)?;
    if root_count != 1 {
        return Err(BocError::BadRootCount(root_count));
    }
    if absent != 0 {
        return Err(BocError::Malformed("absent cells are not supported"));
    }
    let root_index = r.take_uint(ref_size)? as usize;
    if root_index >= cell_count {
        return Err(BocError::BadRefIndex {
            cell: root_index,
            index: root_index,
        });
    }
    if has_idx {
        r.take(cell_count * off_bytes)?;
    }

    let mut raw = Vec::with_capacity(cell_count);
    for i in 0..cell_count {
        let d1 = r.take_byte()?;
        let refs_n = (d1 & 0x07) as usize;
        let exotic = d1 & 0x08 != 0;
        let with_hashes = d1 & 0x10 != 0;
        let level = (d1 >> 5) as usize;
        if refs_n > MAX_REFS {
            return Err(BocError::Cell(CellError::RefOverflow { used: refs_n }));
        }
        if with_hashes {
            // stored hashes and depths, (level + 1) of each
            r.take((level + 1) * (32 + 2))?;
        }
        let d2 = r.take_byte()? as usize;
        let byte_len = (d2 + 1) / 2;
        let body = r.take(byte_len)?;
        let bits = if d2 % 2 == 0 {
            byte_len * 8
        } else {
            let last = body[byte_len - 1];
            if last == 0 {
                return Err(BocError::Malformed("missing completion tag"));
            }
            byte_len * 8 - last.trailing_zeros() as usize - 1
        };
        if bits > MAX_BITS {
            return Err(BocError::Cell(CellError::BitOverflow {
                used: 0,
                requested: bits,
            }));
        }
        let mut refs = Vec::with_capacity(refs_n);
        for _ in 0..refs_n {
            let index = r.take_uint(ref_size)? as usize;
            if index <= i || index >= cell_count {
                return Err(BocError::BadRefIndex { cell: i, index });
            }
            refs.push(index);
        }
        raw.push(RawCell {
            data: BitString::from_bytes_prefix(body, bits),
            refs,
            exotic,
        });
    }
    if has_crc {
        r.take(4)?;
    }

    let mut built: Vec<Option<Arc<Cell>>> = vec![None; cell_count];
    for i in (0..cell_count).rev() {
        let RawCell { data, refs, exotic } = std::mem::replace(
            &mut raw[i],
            RawCell {
                data: BitString::new(),
                refs: vec![],
                exotic: false,
            },
        );
        let mut children = Vec::with_capacity(refs.len());
        for index in refs {
            match &built[index] {
                Some(cell) => children.push(Arc::clone(cell)),
                None => return Err(BocError::BadRefIndex { cell: i, index }),
            }
        }
        built[i] = Some(Arc::new(Cell::from_parts(data, children, exotic)));
    }
    match built.into_iter().nth(root_index).flatten() {
        Some(root) => Ok(root),
        None => Err(BocError::BadRefIndex {
            cell: root_index,
            index: root_index,
        }),
    }
}

/// Serialises the tree rooted at `root` (no index table, no CRC).
pub fn to_boc(root: &Arc<Cell>) -> Vec<u8> {
    let order = topological_order(root);
    let index: HashMap<*const Cell, usize> = order
        .iter()
        .enumerate()
        .map(|(i, cell)| (Arc::as_ptr(cell), i))
        .collect();

    let ref_size = std::cmp::max(1, (bit_len_of(order.len() as u64) + 7) / 8);
    let mut body = Vec::new();
    for cell in &order {
        let bits = cell.bit_len();
        let d1 = cell.refs().len() as u8 | if cell.is_exotic() { 0x08 } else { 0 };
        let d2 = (bits / 8 + (bits + 7) / 8) as u8;
        body.push(d1);
        body.push(d2);
        body.extend_from_slice(&cell.data().to_padded_bytes());
        for child in cell.refs() {
            push_uint(&mut body, index[&Arc::as_ptr(child)] as u64, ref_size);
        }
    }

    let off_bytes = std::cmp::max(1, (bit_len_of(body.len() as u64) + 7) / 8);
    let mut out = Vec::with_capacity(body.len() + 16);
    out.extend_from_slice(&MAGIC.to_be_bytes());
    out.push(ref_size as u8);
    out.push(off_bytes as u8);
    push_uint(&mut out, order.len() as u64, ref_size);
    push_uint(&mut out, 1, ref_size);
    push_uint(&mut out, 0, ref_size);
    push_uint(&mut out, body.len() as u64, off_bytes);
    push_uint(&mut out, 0, ref_size);
    out.extend_from_slice(&body);
    out
}

/// Serialises the tree rooted at `root` as base64 text.
pub fn to_base64(root: &Arc<Cell>) -> String {
    STANDARD.encode(to_boc(root))
}

fn push_uint(out: &mut Vec<u8>, value: u64, n: usize) {
    for shift in (0..n).rev() {
        out.push((value >> (shift * 8)) as u8);
    }
}

/// Reverse post-order over the cell DAG: every cell precedes all of its
/// descendants, shared subtrees appear once.
fn topological_order(root: &Arc<Cell>) -> Vec<Arc<Cell>> {
    let mut post = Vec::new();
    let mut seen: HashMap<*const Cell, ()> = HashMap::new();
    let mut stack: Vec<(Arc<Cell>, usize)> = vec![(Arc::clone(root), 0)];
    seen.insert(Arc::as_ptr(root), ());
    while let Some((cell, child)) = stack.pop() {
        if child < cell.refs().len() {
            let next = Arc::clone(&cell.refs()[child]);
            stack.push((cell, child + 1));
            if seen.insert(Arc::as_ptr(&next), ()).is_none() {
                stack.push((next, 0));
            }
        } else {
            post.push(cell);
        }
    }
    post.reverse();
    post
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cell::builder::Builder;

    fn sample_tree() -> Arc<Cell> {
        let mut leaf = Builder::new();
        leaf.store_uint(0xCAFE, 16).unwrap();
        let leaf = Arc::new(leaf.finish());

        let mut mid = Builder::new();
        mid.store_uint(0b101, 3).unwrap();
        mid.store_ref(Arc::clone(&leaf)).unwrap();
        let mid = Arc::new(mid.finish());

        let mut root = Builder::new();
        root.store_uint(0xAB, 8).unwrap();
        root.store_ref(mid).unwrap();
        root.store_ref(leaf).unwrap();
        Arc::new(root.finish())
    }

    #[test]
    fn round_trip_preserves_structure() {
        let root = sample_tree();
        let restored = parse(&to_boc(&root)).unwrap();
        assert_eq!(*restored, *root);
    }

    #[test]
    fn base64_round_trip() {
        let root = sample_tree();
        let restored = from_base64(&to_base64(&root)).unwrap();
        assert_eq!(*restored, *root);
    }

    #[test]
    fn shared_subtrees_are_stored_once() {
        let root = sample_tree();
        let order = topological_order(&root);
        // root, mid, leaf — the leaf is referenced twice but listed once
        assert_eq!(order.len(), 3);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = to_boc(&sample_tree());
        bytes[0] ^= 0xFF;
        assert!(matches!(parse(&bytes), Err(BocError::BadMagic(_))));
    }

    #[test]
    fn truncation_is_rejected() {
        let bytes = to_boc(&sample_tree());
        assert!(matches!(
            parse(&bytes[..bytes.len() - 3]),
            Err(BocError::Truncated)
        ));
    }

    #[test]
    fn non_aligned_payload_survives() {
        let mut b = Builder::new();
        b.store_uint(0b10110, 5).unwrap();
        let root = Arc::new(b.finish());
        let restored = parse(&to_boc(&root)).unwrap();
        assert_eq!(restored.bit_len(), 5);
        assert_eq!(*restored, *root);
    }
}
