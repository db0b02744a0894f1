//! Public facade: compile once, decode and encode many times
//!
//! [`compile`] turns TL-B source into a [`Runtime`] holding the immutable
//! schema model and its tag index. A `Runtime` is `Send + Sync` and may
//! be shared across threads freely; every decode or encode call carries
//! its own cursor and environment state.

use std::sync::Arc;

use tracing::debug;

use crate::cell::slice::Slice;
use crate::cell::Cell;
use crate::decode::Decoder;
use crate::encode::Encoder;
use crate::error::{DataError, SchemaError};
use crate::index::TagIndex;
use crate::schema::Schema;
use crate::value::Value;

/// Codec-wide configuration.
#[derive(Clone, Copy, Debug)]
pub struct RuntimeOptions {
    /// When set, `bits n` fields with byte-aligned width decoding to
    /// valid UTF-8 surface as text rather than raw bit strings.
    pub auto_text: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { auto_text: true }
    }
}

/// Per-call decoding options.
#[derive(Clone, Copy, Debug, Default)]
pub struct DecodeOptions {
    /// Select the root constructor through the tag index instead of
    /// guessing types.
    pub by_tag: bool,
}

/// Input accepted by [`Runtime::decode`]: base64 text or a cell.
pub enum Input<'a> {
    Base64(&'a str),
    Cell(Arc<Cell>),
}

impl<'a> From<&'a str> for Input<'a> {
    fn from(text: &'a str) -> Self {
        Input::Base64(text)
    }
}

impl From<Arc<Cell>> for Input<'_> {
    fn from(cell: Arc<Cell>) -> Self {
        Input::Cell(cell)
    }
}

impl From<&Arc<Cell>> for Input<'_> {
    fn from(cell: &Arc<Cell>) -> Self {
        Input::Cell(Arc::clone(cell))
    }
}

/// Compiles TL-B source with default options.
pub fn compile(source: &str) -> Result<Runtime, SchemaError> {
    compile_with(source, RuntimeOptions::default())
}

/// Compiles TL-B source with explicit options.
pub fn compile_with(source: &str, options: RuntimeOptions) -> Result<Runtime, SchemaError> {
    let schema = Schema::from_source(source)?;
    let index = TagIndex::build(&schema);
    debug!(
        types = schema.types().count(),
        tagged = index.len(),
        max_tag_bits = index.max_tag_bits(),
        "compiled schema"
    );
    Ok(Runtime {
        schema,
        index,
        options,
    })
}

/// A compiled schema ready to drive decoding and encoding.
#[derive(Clone, Debug)]
pub struct Runtime {
    schema: Schema,
    index: TagIndex,
    options: RuntimeOptions,
}

impl Runtime {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Decodes base64 text or a cell, guessing the root type.
    pub fn decode<'a>(&self, input: impl Into<Input<'a>>) -> Result<Value, DataError> {
        self.decode_with(input, DecodeOptions::default())
    }

    /// Decodes with explicit options.
    pub fn decode_with<'a>(
        &self,
        input: impl Into<Input<'a>>,
        options: DecodeOptions,
    ) -> Result<Value, DataError> {
        let cell = match input.into() {
            Input::Base64(text) => Cell::from_base64(text)?,
            Input::Cell(cell) => cell,
        };
        self.decoder().decode_root(&cell, options.by_tag)
    }

    /// Decodes a value of the named type from an open slice.
    pub fn decode_by_type(&self, type_name: &str, slice: &mut Slice) -> Result<Value, DataError> {
        let ty = self
            .schema
            .get(type_name)
            .ok_or_else(|| DataError::UnknownType(type_name.to_owned()))?;
        self.decoder().decode_type(ty, slice, &[], 0)
    }

    /// Encodes a value whose `kind` names the constructor.
    pub fn encode(&self, value: &Value) -> Result<Arc<Cell>, DataError> {
        self.encoder().encode(value)
    }

    /// Encodes a value against an explicit `kind`.
    pub fn encode_by_type(&self, kind: &str, value: &Value) -> Result<Arc<Cell>, DataError> {
        self.encoder().encode_kind(kind, value)
    }

    fn decoder(&self) -> Decoder<'_> {
        Decoder {
            schema: &self.schema,
            index: &self.index,
            options: &self.options,
        }
    }

    fn encoder(&self) -> Encoder<'_> {
        Encoder {
            schema: &self.schema,
            options: &self.options,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bitstring::BitString;
    use crate::cell::builder::Builder;
    use crate::value::{Record, Value};
    use indexmap::IndexMap;

    fn cell_of(build: impl FnOnce(&mut Builder)) -> Arc<Cell> {
        let mut b = Builder::new();
        build(&mut b);
        Arc::new(b.finish())
    }

    #[test]
    fn runtime_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Runtime>();
    }

    #[test]
    fn tag_selection_picks_the_matching_constructor() {
        let rt = compile("a$0 = U; b$1 = U;").unwrap();
        let one = rt.decode(&cell_of(|b| b.store_bit(true).unwrap())).unwrap();
        assert_eq!(one.kind(), Some("U_b"));
        let zero = rt
            .decode(&cell_of(|b| b.store_bit(false).unwrap()))
            .unwrap();
        assert_eq!(zero.kind(), Some("U_a"));
    }

    #[test]
    fn dependent_width() {
        let rt = compile("x$_ n:#5 v:(## n) = X;").unwrap();
        let value = rt
            .decode(&cell_of(|b| {
                b.store_uint(0b00011, 5).unwrap();
                b.store_uint(0b101, 3).unwrap();
            }))
            .unwrap();
        assert_eq!(value.kind(), Some("X"));
        assert_eq!(value.field("n"), Some(&Value::Int(3)));
        assert_eq!(value.field("v"), Some(&Value::Int(5)));
    }

    #[test]
    fn constraint_accepts_and_rejects() {
        let rt = compile("pair n:#8 m:#8 { n + m = 10 } = Pair;").unwrap();
        let ok = rt
            .decode(&cell_of(|b| {
                b.store_uint(3, 8).unwrap();
                b.store_uint(7, 8).unwrap();
            }))
            .unwrap();
        assert_eq!(ok.kind(), Some("Pair"));
        assert_eq!(ok.field("n"), Some(&Value::Int(3)));
        assert_eq!(ok.field("m"), Some(&Value::Int(7)));

        let err = rt
            .decode(&cell_of(|b| {
                b.store_uint(3, 8).unwrap();
                b.store_uint(8, 8).unwrap();
            }))
            .unwrap_err();
        match err {
            DataError::NoMatch { cause, .. } => {
                assert!(matches!(
                    cause.as_deref(),
                    Some(DataError::ConstraintFailed { .. })
                ));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn conditional_body_encodes_bit_and_ref() {
        let rt = compile("msg has:Bool body:has?(^Cell) = Msg;").unwrap();

        let mut absent = Value::record_of("Msg");
        absent.insert("has".to_owned(), Value::Bool(false));
        let cell = rt.encode(&Value::Record(absent)).unwrap();
        assert_eq!(cell.bit_len(), 1);
        assert_eq!(cell.refs().len(), 0);
        let mut s = cell.begin_parse().unwrap();
        assert!(!s.load_bit().unwrap());

        let body = cell_of(|b| b.store_uint(0xDEAD, 16).unwrap());
        let mut present = Value::record_of("Msg");
        present.insert("has".to_owned(), Value::Bool(true));
        present.insert("body".to_owned(), Value::Cell(Arc::clone(&body)));
        let cell = rt.encode(&Value::Record(present)).unwrap();
        assert_eq!(cell.bit_len(), 1);
        assert_eq!(cell.refs().len(), 1);
        assert_eq!(*cell.refs()[0], *body);
    }

    #[test]
    fn conditional_round_trips() {
        let rt = compile("msg has:Bool body:has?(^Cell) = Msg;").unwrap();
        let body = cell_of(|b| b.store_uint(7, 8).unwrap());
        let mut value = Value::record_of("Msg");
        value.insert("has".to_owned(), Value::Bool(true));
        value.insert("body".to_owned(), Value::Cell(body));
        let value = Value::Record(value);
        let decoded = rt.decode(&rt.encode(&value).unwrap()).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn text_auto_detection_is_optional() {
        let source = "lbl text:(bits 24) = L;";
        let data = cell_of(|b| {
            b.store_uint(0x41, 8).unwrap();
            b.store_uint(0x42, 8).unwrap();
            b.store_uint(0x43, 8).unwrap();
        });

        let auto = compile(source).unwrap();
        let value = auto.decode(&data).unwrap();
        assert_eq!(value.field("text"), Some(&Value::Text("ABC".into())));

        let raw = compile_with(
            source,
            RuntimeOptions {
                auto_text: false,
            },
        )
        .unwrap();
        let value = raw.decode(&data).unwrap();
        assert_eq!(
            value.field("text"),
            Some(&Value::Bits(BitString::from_bytes(&[0x41, 0x42, 0x43])))
        );
    }

    #[test]
    fn hashmap_round_trip_preserves_keys_and_cells() {
        let rt = compile("cfg m:(HashmapE 8 ^Cell) = Cfg;").unwrap();
        let c1 = cell_of(|b| b.store_uint(0x11, 8).unwrap());
        let c2 = cell_of(|b| b.store_uint(0x22, 8).unwrap());

        let mut map = IndexMap::new();
        map.insert("1".to_owned(), Value::Cell(Arc::clone(&c1)));
        map.insert("2".to_owned(), Value::Cell(Arc::clone(&c2)));
        map.insert("_meta".to_owned(), Value::Text("ignored".into()));
        let mut record = Value::record_of("Cfg");
        record.insert("m".to_owned(), Value::Map(map));

        let decoded = rt.decode(&rt.encode(&Value::Record(record)).unwrap()).unwrap();
        let Some(Value::Map(loaded)) = decoded.field("m") else {
            panic!("expected a map, got {:?}", decoded);
        };
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get("1"), Some(&Value::Cell(c1)));
        assert_eq!(loaded.get("2"), Some(&Value::Cell(c2)));
    }

    #[test]
    fn decode_is_deterministic() {
        let rt = compile("pair n:#8 m:#8 = Pair;").unwrap();
        let data = cell_of(|b| {
            b.store_uint(1, 8).unwrap();
            b.store_uint(2, 8).unwrap();
        });
        assert_eq!(rt.decode(&data).unwrap(), rt.decode(&data).unwrap());
    }

    #[test]
    fn by_tag_prefers_the_longest_prefix() {
        // 0b11 is a valid two-bit tag; 0b1 a valid one-bit tag
        let rt = compile("wide$11 rest:#6 = W; narrow$1 rest:#7 = N;").unwrap();
        let data = cell_of(|b| b.store_uint(0b1100_0000, 8).unwrap());
        let value = rt
            .decode_with(&data, DecodeOptions { by_tag: true })
            .unwrap();
        assert_eq!(value.kind(), Some("W"));
    }

    #[test]
    fn base64_input_is_accepted() {
        let rt = compile("pair n:#8 m:#8 = Pair;").unwrap();
        let data = cell_of(|b| {
            b.store_uint(5, 8).unwrap();
            b.store_uint(6, 8).unwrap();
        });
        let text = data.to_base64();
        let value = rt.decode(text.as_str()).unwrap();
        assert_eq!(value.field("n"), Some(&Value::Int(5)));

        let err = rt.decode("not-base64!").unwrap_err();
        assert!(matches!(err, DataError::BadInput(_)));
    }

    #[test]
    fn encode_requires_a_kind() {
        let rt = compile("pair n:#8 m:#8 = Pair;").unwrap();
        let err = rt.encode(&Value::Record(Record::new())).unwrap_err();
        assert!(matches!(err, DataError::NotTyped));
        let err = rt.encode(&Value::Int(3)).unwrap_err();
        assert!(matches!(err, DataError::NotTyped));
    }

    #[test]
    fn encode_rejects_violated_constraints() {
        let rt = compile("pair n:#8 m:#8 { n + m = 10 } = Pair;").unwrap();
        let mut bad = Value::record_of("Pair");
        bad.insert("n".to_owned(), Value::Int(3));
        bad.insert("m".to_owned(), Value::Int(8));
        let err = rt.encode(&Value::Record(bad)).unwrap_err();
        assert!(matches!(err, DataError::ConstraintFailed { .. }));

        let mut good = Value::record_of("Pair");
        good.insert("n".to_owned(), Value::Int(3));
        good.insert("m".to_owned(), Value::Int(7));
        let cell = rt.encode(&Value::Record(good)).unwrap();
        assert_eq!(cell.bit_len(), 16);
    }

    #[test]
    fn decode_by_type_targets_an_explicit_type() {
        let rt = compile("a$0 = U; pair n:#8 m:#8 = Pair;").unwrap();
        let data = cell_of(|b| {
            b.store_uint(9, 8).unwrap();
            b.store_uint(1, 8).unwrap();
        });
        let mut slice = data.begin_parse().unwrap();
        let value = rt.decode_by_type("Pair", &mut slice).unwrap();
        assert_eq!(value.field("n"), Some(&Value::Int(9)));
        assert!(matches!(
            rt.decode_by_type("Ghost", &mut slice).unwrap_err(),
            DataError::UnknownType(_)
        ));
    }

    #[test]
    fn encode_by_type_overrides_the_kind() {
        let rt = compile("a$0 = U; b$1 = U;").unwrap();
        let cell = rt
            .encode_by_type("U_b", &Value::Record(Value::record_of("U_b")))
            .unwrap();
        let mut s = cell.begin_parse().unwrap();
        assert!(s.load_bit().unwrap());
    }

    #[test]
    fn round_trip_across_field_shapes() {
        let rt = compile(
            "thing f:Bool n:#8 w:uint48 c:Coins v:(VarUInteger 16) t:(bits 16) = Thing;",
        )
        .unwrap();
        let mut record = Value::record_of("Thing");
        record.insert("f".to_owned(), Value::Bool(true));
        record.insert("n".to_owned(), Value::Int(200));
        record.insert(
            "w".to_owned(),
            Value::Big(num_bigint::BigInt::from(1u64 << 40)),
        );
        record.insert(
            "c".to_owned(),
            Value::Big(num_bigint::BigInt::from(1_000_000_000u64)),
        );
        record.insert("v".to_owned(), Value::Text("123456789".into()));
        record.insert("t".to_owned(), Value::Text("hi".into()));
        let value = Value::Record(record);
        let decoded = rt.decode(&rt.encode(&value).unwrap()).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn anonymous_groups_merge_into_the_parent() {
        let rt = compile("outer head:#8 _:^[ x:#8 y:#8 ] = Outer;").unwrap();
        let data = cell_of(|b| {
            b.store_uint(1, 8).unwrap();
            let mut inner = Builder::new();
            inner.store_uint(2, 8).unwrap();
            inner.store_uint(3, 8).unwrap();
            b.store_ref(Arc::new(inner.finish())).unwrap();
        });
        let value = rt.decode(&data).unwrap();
        assert_eq!(value.field("x"), Some(&Value::Int(2)));
        assert_eq!(value.field("y"), Some(&Value::Int(3)));
        // and back: the parent record feeds the anonymous group
        let encoded = rt.encode(&value).unwrap();
        assert_eq!(*encoded, *data);
    }

    #[test]
    fn named_references_recurse() {
        let rt = compile("inner v:#8 = Inner; outer a:Inner b:Inner = Outer;").unwrap();
        let data = cell_of(|b| {
            b.store_uint(5, 8).unwrap();
            b.store_uint(6, 8).unwrap();
        });
        let value = rt.decode(&data).unwrap();
        let a = value.field("a").unwrap();
        assert_eq!(a.kind(), Some("Inner"));
        assert_eq!(a.field("v"), Some(&Value::Int(5)));
        let decoded = rt.decode(&rt.encode(&value).unwrap()).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn polymorphic_parameters_substitute_by_position() {
        let rt = compile(
            "box {X:Type} inner:X = Box X; leaf v:#8 = Leaf; top b:(Box Leaf) = Top;",
        )
        .unwrap();
        let data = cell_of(|b| b.store_uint(42, 8).unwrap());
        let value = rt.decode(&data).unwrap();
        assert_eq!(value.kind(), Some("Top"));
        let b = value.field("b").unwrap();
        assert_eq!(b.kind(), Some("Box"));
        let inner = b.field("inner").unwrap();
        assert_eq!(inner.field("v"), Some(&Value::Int(42)));
        let decoded = rt.decode(&rt.encode(&value).unwrap()).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn maybe_fields_round_trip() {
        let rt = compile("opt v:(Maybe uint8) = Opt;").unwrap();
        let mut present = Value::record_of("Opt");
        present.insert("v".to_owned(), Value::Int(9));
        let value = Value::Record(present);
        assert_eq!(rt.decode(&rt.encode(&value).unwrap()).unwrap(), value);

        let mut absent = Value::record_of("Opt");
        absent.insert("v".to_owned(), Value::Null);
        let value = Value::Record(absent);
        assert_eq!(rt.decode(&rt.encode(&value).unwrap()).unwrap(), value);
    }

    #[test]
    fn repeated_fields_round_trip() {
        let rt = compile("arr v:(3 * uint8) = Arr;").unwrap();
        let mut record = Value::record_of("Arr");
        record.insert(
            "v".to_owned(),
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        );
        let value = Value::Record(record);
        assert_eq!(rt.decode(&rt.encode(&value).unwrap()).unwrap(), value);
    }

    #[test]
    fn address_fields_round_trip() {
        let rt = compile("who addr:MsgAddress = Who;").unwrap();
        let text = format!("0:{}", "7f".repeat(32));
        let mut record = Value::record_of("Who");
        record.insert("addr".to_owned(), Value::Text(text.clone()));
        let value = Value::Record(record);
        let decoded = rt.decode(&rt.encode(&value).unwrap()).unwrap();
        assert_eq!(decoded.field("addr"), Some(&Value::Text(text)));
    }
}
