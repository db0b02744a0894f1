//! Runtime-interpretable TL-B codec
//!
//! # Overview
//!
//! TL-B (Type Language — Binary) is the schema language describing the
//! cell-based binary messages of the TON virtual machine. This crate
//! compiles TL-B source text into an immutable [`Runtime`] and then
//! interprets that schema directly over cell trees: decoding selects a
//! constructor by its bit-prefix tag (or by trying candidates with exact
//! cursor rollback between attempts), binds dependent variables as
//! fields decode, checks constraint guards, and produces a dynamic
//! [`Value`] tree; encoding walks the same schema in the other
//! direction, driven by the value's `kind` discriminator.
//!
//! No code is generated: one compiled schema serves any number of
//! decode and encode calls, and may be shared across threads freely.
//!
//! # Layers
//!
//! The crate is self-contained. [`cell`] provides the bit-addressed
//! container model (cells, slices, builders, the bag-of-cells
//! interchange form, dictionary and tuple codecs); [`schema`] the
//! parser and the immutable model; [`expr`] the arithmetic evaluator
//! that couples dependent fields; the codec proper sits behind
//! [`compile`] and [`Runtime`].
//!
//! # Example
//!
//! ```
//! use tlb_runtime::{compile, Value};
//!
//! let rt = compile("pair n:#8 m:#8 { n + m = 10 } = Pair;").unwrap();
//! let mut record = Value::record_of("Pair");
//! record.insert("n".to_owned(), Value::Int(4));
//! record.insert("m".to_owned(), Value::Int(6));
//! let cell = rt.encode(&Value::Record(record)).unwrap();
//! let decoded = rt.decode(&cell).unwrap();
//! assert_eq!(decoded.field("n"), Some(&Value::Int(4)));
//! ```

pub mod address;
pub mod bitstring;
pub mod cell;
pub mod error;
pub mod expr;
pub mod index;
pub mod schema;
pub mod value;

mod decode;
mod encode;
mod runtime;

pub use crate::address::MsgAddress;
pub use crate::bitstring::BitString;
pub use crate::cell::builder::Builder;
pub use crate::cell::slice::Slice;
pub use crate::cell::tuple::StackEntry;
pub use crate::cell::Cell;
pub use crate::error::{BocError, CellError, DataError, SchemaError};
pub use crate::expr::{BinOp, EvalError, Expr};
pub use crate::index::TagIndex;
pub use crate::runtime::{
    compile, compile_with, DecodeOptions, Input, Runtime, RuntimeOptions,
};
pub use crate::schema::Schema;
pub use crate::value::{Record, Value};
