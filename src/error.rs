//! Error types reported by the schema compiler and the codec
//!
//! This module contains the two user-visible error kinds of the crate,
//! [`SchemaError`] and [`DataError`], together with the lower-level
//! [`CellError`] and [`BocError`] classes that the bit-primitive layer
//! produces and the codec converts at its boundary.
//!
//! # Layout
//!
//! `SchemaError` is terminal: it is produced only by
//! [`compile`](crate::runtime::compile) and is never caught inside the
//! decode or encode trees. `DataError` is the working error of the codec;
//! most of its variants are *recoverable* in the sense that a constructor
//! attempt boundary catches them, rolls the slice back and tries the next
//! candidate. The exceptions are [`DataError::Eval`] and
//! [`DataError::DepthExceeded`], which indicate that the schema itself is
//! semantically broken and therefore propagate through every attempt
//! boundary unchanged.

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::expr::EvalError;

/// Failure to turn TL-B source text into a usable [`Schema`](crate::schema::Schema).
///
/// Produced only by `compile`; never caught internally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The source text could not be tokenised or parsed.
    Parse {
        line: usize,
        column: usize,
        message: String,
    },
    /// The source parsed but did not declare a single type.
    NoTypes,
    /// A declaration used a construct the model cannot represent.
    Unsupported { constructor: String, message: String },
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SchemaError::Parse {
                line,
                column,
                message,
            } => {
                write!(f, "schema parse error at {}:{}: {}", line, column, message)
            }
            SchemaError::NoTypes => {
                write!(f, "schema source does not declare any type")
            }
            SchemaError::Unsupported {
                constructor,
                message,
            } => {
                write!(f, "unsupported declaration `{}`: {}", constructor, message)
            }
        }
    }
}

impl Error for SchemaError {}

/// Errors raised by Slice and Builder operations on a single cell.
///
/// These never reach the public API directly; the codec wraps them into
/// the appropriate [`DataError`] variant at the point of use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellError {
    /// A read wanted more data bits than the slice has left.
    BitUnderflow { remaining: usize, requested: usize },
    /// A read wanted more references than the slice has left.
    RefUnderflow { remaining: usize, requested: usize },
    /// A write would push the cell past its 1023-bit data capacity.
    BitOverflow { used: usize, requested: usize },
    /// A write would attach a fifth reference.
    RefOverflow { used: usize },
    /// A signed `skip` would move the cursor outside the cell frame.
    SkipOutOfRange { position: usize, delta: isize },
    /// An exotic cell was opened without the exotic-aware entry point.
    ExoticCell,
    /// An integer load or store was requested at an unrepresentable width.
    IntWidth { bits: usize },
    /// A variable-length integer does not fit its declared byte budget.
    VarWidth { limit: usize, actual: usize },
    /// An address could not be loaded or was of an unsupported shape.
    Address { reason: &'static str },
    /// A dictionary node violated the hashmap label grammar.
    Dict { reason: &'static str },
    /// A tuple cell violated the VM-stack value grammar.
    Tuple { reason: &'static str },
}

impl Display for CellError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            CellError::BitUnderflow {
                remaining,
                requested,
            } => write!(
                f,
                "cannot load {} bits ({} remaining in slice)",
                requested, remaining
            ),
            CellError::RefUnderflow {
                remaining,
                requested,
            } => write!(
                f,
                "cannot load {} refs ({} remaining in slice)",
                requested, remaining
            ),
            CellError::BitOverflow { used, requested } => write!(
                f,
                "cannot store {} bits ({} already used of 1023)",
                requested, used
            ),
            CellError::RefOverflow { used } => {
                write!(f, "cannot store a reference ({} already used of 4)", used)
            }
            CellError::SkipOutOfRange { position, delta } => {
                write!(f, "cannot skip {} bits from position {}", delta, position)
            }
            CellError::ExoticCell => {
                write!(f, "cannot parse an exotic cell as an ordinary cell")
            }
            CellError::IntWidth { bits } => {
                write!(f, "integer width {} is out of range", bits)
            }
            CellError::VarWidth { limit, actual } => write!(
                f,
                "variable-length integer needs {} bytes (limit {})",
                actual, limit
            ),
            CellError::Address { reason } => write!(f, "bad address: {}", reason),
            CellError::Dict { reason } => write!(f, "bad dictionary: {}", reason),
            CellError::Tuple { reason } => write!(f, "bad tuple: {}", reason),
        }
    }
}

impl Error for CellError {}

/// Errors raised while reading or writing a serialized bag-of-cells.
#[derive(Debug)]
pub enum BocError {
    /// The base64 wrapper could not be decoded.
    Base64(base64::DecodeError),
    /// The buffer does not start with the `b5ee9c72` magic.
    BadMagic(u32),
    /// The buffer ended before the structure it promised.
    Truncated,
    /// The header carries a root count other than one.
    BadRootCount(usize),
    /// A cell referenced an index outside the permitted range.
    BadRefIndex { cell: usize, index: usize },
    /// A structural rule of the serialization was violated.
    Malformed(&'static str),
    /// A cell body violated the per-cell limits.
    Cell(CellError),
}

impl Display for BocError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            BocError::Base64(err) => write!(f, "bad base64: {}", err),
            BocError::BadMagic(magic) => {
                write!(f, "bad bag-of-cells magic 0x{:08x}", magic)
            }
            BocError::Truncated => write!(f, "bag-of-cells buffer is truncated"),
            BocError::BadRootCount(n) => {
                write!(f, "expected exactly one root cell, found {}", n)
            }
            BocError::BadRefIndex { cell, index } => {
                write!(f, "cell {} references invalid index {}", cell, index)
            }
            BocError::Malformed(what) => write!(f, "malformed bag-of-cells: {}", what),
            BocError::Cell(err) => write!(f, "invalid cell in bag-of-cells: {}", err),
        }
    }
}

impl Error for BocError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BocError::Base64(err) => Some(err),
            BocError::Cell(err) => Some(err),
            _ => None,
        }
    }
}

impl From<base64::DecodeError> for BocError {
    fn from(err: base64::DecodeError) -> Self {
        BocError::Base64(err)
    }
}

impl From<CellError> for BocError {
    fn from(err: CellError) -> Self {
        BocError::Cell(err)
    }
}

/// A specific datum does not conform to the compiled schema.
///
/// Raised by [`Runtime::decode`](crate::Runtime::decode) and
/// [`Runtime::encode`](crate::Runtime::encode) and their by-type variants.
#[derive(Debug)]
pub enum DataError {
    /// The textual input was not a decodable bag-of-cells.
    BadInput(BocError),
    /// The slice holds fewer bits than the constructor tag needs.
    TagShort { needed: u8, remaining: usize },
    /// The leading bits do not equal the constructor tag.
    TagMismatch { bits: u8, expected: u64, actual: u64 },
    /// A constraint expression evaluated to zero.
    ConstraintFailed { constructor: String },
    /// A field ran out of data bits or references.
    DataShort(CellError),
    /// A referenced type name is not declared in the schema.
    UnknownType(String),
    /// The named constructor does not exist on the resolved type.
    UnknownConstructor { type_name: String, name: String },
    /// The value offered for encoding carries no usable `kind`.
    NotTyped,
    /// The field type cannot be driven against the offered value.
    UnsupportedFieldType { context: &'static str },
    /// The address payload could not be interpreted.
    AddressLoadFailed { reason: &'static str },
    /// No type in the schema accepted the input; carries the number of
    /// candidate types tried and the failure of the final attempt.
    NoMatch {
        attempts: usize,
        cause: Option<Box<DataError>>,
    },
    /// Schema nesting exceeded the recursion cap.
    DepthExceeded,
    /// A width, count or guard expression could not be evaluated.
    Eval(EvalError),
}

impl DataError {
    /// Whether a constructor attempt boundary may catch this error, roll
    /// the slice back and try the next candidate.
    ///
    /// Evaluation failures and recursion overflows indicate a broken
    /// schema rather than a mismatched datum and always propagate.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DataError::Eval(_) | DataError::DepthExceeded)
    }
}

impl Display for DataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DataError::BadInput(err) => write!(f, "undecodable input: {}", err),
            DataError::TagShort { needed, remaining } => write!(
                f,
                "slice too short for {}-bit constructor tag ({} bits left)",
                needed, remaining
            ),
            DataError::TagMismatch {
                bits,
                expected,
                actual,
            } => write!(
                f,
                "constructor tag mismatch: expected {:#b} ({} bits), found {:#b}",
                expected, bits, actual
            ),
            DataError::ConstraintFailed { constructor } => {
                write!(f, "constraint failed in constructor `{}`", constructor)
            }
            DataError::DataShort(err) => write!(f, "data exhausted: {}", err),
            DataError::UnknownType(name) => write!(f, "unknown type `{}`", name),
            DataError::UnknownConstructor { type_name, name } => {
                write!(f, "type `{}` has no constructor `{}`", type_name, name)
            }
            DataError::NotTyped => {
                write!(f, "value carries no `kind` discriminator")
            }
            DataError::UnsupportedFieldType { context } => {
                write!(f, "unsupported field type: {}", context)
            }
            DataError::AddressLoadFailed { reason } => {
                write!(f, "address load failed: {}", reason)
            }
            DataError::NoMatch { attempts, cause } => {
                write!(
                    f,
                    "no type matched the input ({} candidate types tried)",
                    attempts
                )?;
                if let Some(cause) = cause {
                    write!(f, "; last failure: {}", cause)?;
                }
                Ok(())
            }
            DataError::DepthExceeded => {
                write!(f, "schema recursion exceeded the depth cap")
            }
            DataError::Eval(err) => write!(f, "expression evaluation failed: {}", err),
        }
    }
}

impl Error for DataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DataError::BadInput(err) => Some(err),
            DataError::DataShort(err) => Some(err),
            DataError::Eval(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CellError> for DataError {
    fn from(err: CellError) -> Self {
        match err {
            CellError::Address { reason } => DataError::AddressLoadFailed { reason },
            other => DataError::DataShort(other),
        }
    }
}

impl From<BocError> for DataError {
    fn from(err: BocError) -> Self {
        DataError::BadInput(err)
    }
}

impl From<EvalError> for DataError {
    fn from(err: EvalError) -> Self {
        DataError::Eval(err)
    }
}

/// Alias used pervasively inside the decoder and encoder.
pub type DataResult<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn recoverability_split() {
        assert!(DataError::NotTyped.is_recoverable());
        assert!(DataError::TagMismatch {
            bits: 1,
            expected: 0,
            actual: 1
        }
        .is_recoverable());
        assert!(!DataError::DepthExceeded.is_recoverable());
        assert!(!DataError::Eval(EvalError::DivisionByZero).is_recoverable());
    }

    #[test]
    fn cell_error_conversion_targets() {
        let addr: DataError = CellError::Address { reason: "anycast" }.into();
        assert!(matches!(addr, DataError::AddressLoadFailed { .. }));
        let short: DataError = CellError::BitUnderflow {
            remaining: 0,
            requested: 8,
        }
        .into();
        assert!(matches!(short, DataError::DataShort(_)));
    }
}
