//! The dynamic value produced and consumed by the codec
//!
//! Decoded TL-B data is an untyped tree: records keyed by field name,
//! integer leaves, bit strings or text, cell references, sequences and
//! dictionaries. [`Value`] is the closed union of those shapes. Records
//! carry their discriminator as an ordinary `"kind"` entry, so a value
//! round-trips through the encoder without side channels.
//!
//! Numeric leaves follow the width rule: a `Number` of at most 32 bits
//! decodes as [`Value::Int`], anything wider as [`Value::Big`]; variable
//! integers surface as decimal strings to avoid ambiguity between the
//! two.

use std::sync::Arc;

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::bitstring::BitString;
use crate::cell::tuple::StackEntry;
use crate::cell::Cell;

/// An ordered record of named values.
pub type Record = IndexMap<String, Value>;

/// A decoded (or to-be-encoded) TL-B value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Absent optional content.
    Null,
    Bool(bool),
    /// A number that fits the native range (widths up to 32 bits).
    Int(i64),
    /// A number wider than 32 bits, or a currency amount.
    Big(BigInt),
    /// Text — including variable integers in decimal form.
    Text(String),
    /// A raw bit string.
    Bits(BitString),
    /// A reference to a whole cell.
    Cell(Arc<Cell>),
    /// An ordered sequence (`Multiple` fields).
    List(Vec<Value>),
    /// A dictionary with decimal-string keys.
    Map(IndexMap<String, Value>),
    /// A record with an optional `"kind"` discriminator.
    Record(Record),
    /// A VM-stack tuple.
    Tuple(Vec<StackEntry>),
}

impl Value {
    /// Builds a record value carrying the given `kind`.
    pub fn record_of(kind: &str) -> Record {
        let mut record = Record::new();
        record.insert("kind".to_owned(), Value::Text(kind.to_owned()));
        record
    }

    /// The `kind` discriminator, when this is a record that has one.
    pub fn kind(&self) -> Option<&str> {
        match self {
            Value::Record(record) => match record.get("kind") {
                Some(Value::Text(kind)) => Some(kind),
                _ => None,
            },
            _ => None,
        }
    }

    /// A record entry by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(record) => record.get(name),
            _ => None,
        }
    }

    /// Interprets the value as an integer, when it has one: native and
    /// big numbers directly, booleans as 0/1, text by decimal parse.
    pub fn integerize(&self) -> Option<i128> {
        match self {
            Value::Int(value) => Some(*value as i128),
            Value::Big(value) => value.to_i128(),
            Value::Bool(flag) => Some(*flag as i128),
            Value::Text(text) => text.parse().ok(),
            _ => None,
        }
    }

    /// Whether the value counts as true in conditional positions.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(flag) => *flag,
            other => other.integerize().map(|v| v != 0).unwrap_or(true),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn kind_lives_in_the_record() {
        let record = Value::Record(Value::record_of("Msg_int"));
        assert_eq!(record.kind(), Some("Msg_int"));
        assert_eq!(Value::Int(1).kind(), None);
    }

    #[test]
    fn integerize_covers_the_bindable_shapes() {
        assert_eq!(Value::Int(7).integerize(), Some(7));
        assert_eq!(Value::Bool(true).integerize(), Some(1));
        assert_eq!(Value::Text("42".into()).integerize(), Some(42));
        assert_eq!(Value::Text("-3".into()).integerize(), Some(-3));
        assert_eq!(Value::Big(BigInt::from(1u8) << 80).integerize().is_some(), true);
        assert_eq!(Value::Null.integerize(), None);
        assert_eq!(Value::Text("abc".into()).integerize(), None);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(!Value::Int(0).truthy());
        assert!(Value::Int(-1).truthy());
        assert!(Value::Text("1".into()).truthy());
    }
}
