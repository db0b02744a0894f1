//! The cell model and its read/write cursors
//!
//! A [`Cell`] is the unit of storage of the TVM persistence layer: up to
//! 1023 data bits plus up to four references to further cells. Everything
//! the codec touches is a tree of cells. Cells are immutable once built
//! and shared through `Arc`, so a decoded value can hold on to a subtree
//! without copying it.
//!
//! Reading goes through [`Slice`](slice::Slice), writing through
//! [`Builder`](builder::Builder). The serialized interchange form (the
//! "bag of cells") lives in [`boc`]; the dictionary and tuple codecs that
//! the schema layer drives live in [`dict`] and [`tuple`].

pub mod boc;
pub mod builder;
pub mod dict;
pub mod slice;
pub mod tuple;

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::bitstring::BitString;
use crate::error::{BocError, CellError};

use self::slice::Slice;

/// Maximum number of data bits a single cell can hold.
pub const MAX_BITS: usize = 1023;

/// Maximum number of outgoing references a single cell can hold.
pub const MAX_REFS: usize = 4;

/// An immutable container of bits and references.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Cell {
    data: BitString,
    refs: Vec<Arc<Cell>>,
    exotic: bool,
}

impl Cell {
    pub(crate) fn from_parts(data: BitString, refs: Vec<Arc<Cell>>, exotic: bool) -> Self {
        debug_assert!(data.len() <= MAX_BITS && refs.len() <= MAX_REFS);
        Self { data, refs, exotic }
    }

    /// The empty ordinary cell.
    pub fn empty() -> Arc<Cell> {
        Arc::new(Cell::default())
    }

    pub fn data(&self) -> &BitString {
        &self.data
    }

    pub fn bit_len(&self) -> usize {
        self.data.len()
    }

    pub fn refs(&self) -> &[Arc<Cell>] {
        &self.refs
    }

    /// Whether the cell carries an exotic (special) type byte.
    pub fn is_exotic(&self) -> bool {
        self.exotic
    }

    /// Opens a read cursor at the start of an ordinary cell.
    pub fn begin_parse(self: &Arc<Cell>) -> Result<Slice, CellError> {
        if self.exotic {
            return Err(CellError::ExoticCell);
        }
        Ok(Slice::new(Arc::clone(self)))
    }

    /// Opens a read cursor regardless of the cell type.
    ///
    /// Used when inspecting sub-field groups, where the schema may
    /// deliberately point into special cells.
    pub fn begin_parse_exotic(self: &Arc<Cell>) -> Slice {
        Slice::new(Arc::clone(self))
    }

    /// Decodes a base64-wrapped bag-of-cells into its single root.
    pub fn from_base64(text: &str) -> Result<Arc<Cell>, BocError> {
        boc::from_base64(text)
    }

    /// Serialises the tree rooted here as a bag of cells.
    pub fn to_boc(self: &Arc<Cell>) -> Vec<u8> {
        boc::to_boc(self)
    }

    /// Serialises the tree rooted here as base64 text.
    pub fn to_base64(self: &Arc<Cell>) -> String {
        boc::to_base64(self)
    }

    fn fmt_tree(&self, f: &mut Formatter<'_>, indent: usize) -> FmtResult {
        for _ in 0..indent {
            write!(f, " ")?;
        }
        writeln!(f, "x{{{}}}", self.data)?;
        for child in &self.refs {
            child.fmt_tree(f, indent + 1)?;
        }
        Ok(())
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        self.fmt_tree(f, 0)
    }
}

impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Cell(x{{{}}}, {} refs)", self.data, self.refs.len())
    }
}

/// Number of bits needed to represent `n` (zero needs zero bits).
pub(crate) fn bit_len_of(n: u64) -> usize {
    (u64::BITS - n.leading_zeros()) as usize
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cell::builder::Builder;

    #[test]
    fn exotic_cells_need_the_exotic_entry_point() {
        let cell = Arc::new(Cell::from_parts(BitString::new(), vec![], true));
        assert_eq!(cell.begin_parse().unwrap_err(), CellError::ExoticCell);
        assert_eq!(cell.begin_parse_exotic().remaining_bits(), 0);
    }

    #[test]
    fn display_nests_references() {
        let mut inner = Builder::new();
        inner.store_uint(0x0F, 8).unwrap();
        let mut outer = Builder::new();
        outer.store_uint(0xAB, 8).unwrap();
        outer.store_ref(Arc::new(inner.finish())).unwrap();
        let text = Arc::new(outer.finish()).to_string();
        assert_eq!(text, "x{AB}\n x{0F}\n");
    }

    #[test]
    fn bit_len_of_bounds() {
        assert_eq!(bit_len_of(0), 0);
        assert_eq!(bit_len_of(1), 1);
        assert_eq!(bit_len_of(15), 4);
        assert_eq!(bit_len_of(16), 5);
    }
}
