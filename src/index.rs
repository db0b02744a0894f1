//! Tag index: bit prefix to constructor
//!
//! Built once over a compiled [`Schema`], the index maps a normalised
//! `(bit length, value)` pair to the owning type and constructor
//! position. Constructors without tag bits are not indexed — they can
//! only be reached through the fallback per-type attempt order.

use std::collections::HashMap;

use crate::schema::Schema;

/// Lookup table over every tagged constructor of a schema.
#[derive(Clone, Debug, Default)]
pub struct TagIndex {
    entries: HashMap<(u8, u64), (String, usize)>,
    max_tag_bits: u8,
}

impl TagIndex {
    /// Indexes every constructor with a non-empty tag.
    pub fn build(schema: &Schema) -> TagIndex {
        let mut entries = HashMap::new();
        let mut max_tag_bits = 0;
        for ty in schema.types() {
            for (position, ctor) in ty.constructors.iter().enumerate() {
                if ctor.tag.is_empty() {
                    continue;
                }
                max_tag_bits = max_tag_bits.max(ctor.tag.bit_len);
                entries
                    .entry((ctor.tag.bit_len, ctor.tag.value))
                    .or_insert_with(|| (ty.name.clone(), position));
            }
        }
        TagIndex {
            entries,
            max_tag_bits,
        }
    }

    /// Looks up an exact `(bit length, value)` pair.
    pub fn get(&self, bit_len: u8, value: u64) -> Option<&(String, usize)> {
        self.entries.get(&(bit_len, value))
    }

    /// The longest tag length present anywhere in the schema.
    pub fn max_tag_bits(&self) -> u8 {
        self.max_tag_bits
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_tags_are_not_indexed() {
        let schema = Schema::from_source("a$0 = U; b$1 = U; c x:#8 = V;").unwrap();
        let index = TagIndex::build(&schema);
        assert_eq!(index.len(), 2);
        assert_eq!(index.max_tag_bits(), 1);
        assert_eq!(index.get(1, 1), Some(&("U".to_owned(), 1)));
        assert_eq!(index.get(1, 0), Some(&("U".to_owned(), 0)));
        assert_eq!(index.get(8, 0), None);
    }

    #[test]
    fn max_tracks_the_widest_tag() {
        let schema = Schema::from_source("a$0 = U; wide#beef = W;").unwrap();
        let index = TagIndex::build(&schema);
        assert_eq!(index.max_tag_bits(), 16);
        assert_eq!(index.get(16, 0xbeef), Some(&("W".to_owned(), 0)));
    }
}
