//! Kind-directed encoding of values into cell trees
//!
//! The encoder resolves `value.kind` to a type and constructor, then
//! mirrors the decoder field by field. Missing record entries encode as
//! absent content where the schema allows it (zero numbers, empty
//! addresses, unset maybe bits); shape mismatches the schema cannot
//! absorb are reported, never guessed around.

use std::sync::Arc;

use num_bigint::BigInt;
use tracing::trace;

use crate::address::MsgAddress;
use crate::bitstring::BitString;
use crate::cell::builder::Builder;
use crate::cell::{tuple, Cell};
use crate::decode::{
    bind_parameters, eval_args, eval_count, eval_size, eval_width, substitute, MAX_DEPTH,
};
use crate::error::{DataError, DataResult};
use crate::expr::Env;
use crate::runtime::RuntimeOptions;
use crate::schema::{Constructor, Field, FieldKind, FieldType, Schema, Type};
use crate::value::Value;

pub(crate) struct Encoder<'a> {
    pub schema: &'a Schema,
    #[allow(dead_code)]
    pub options: &'a RuntimeOptions,
}

impl<'a> Encoder<'a> {
    /// Encodes a value whose `kind` names the target constructor.
    pub fn encode(&self, value: &Value) -> DataResult<Arc<Cell>> {
        let kind = value.kind().ok_or(DataError::NotTyped)?;
        self.encode_kind(kind, value)
    }

    /// Encodes a value against an explicitly supplied `kind`.
    pub fn encode_kind(&self, kind: &str, value: &Value) -> DataResult<Arc<Cell>> {
        let (ty, ctor) = self.resolve_kind(kind)?;
        trace!(ty = %ty.name, ctor = %ctor.name, "encode");
        let mut builder = Builder::new();
        self.encode_constructor(ctor, value, &mut builder, &[], 0)?;
        Ok(Arc::new(builder.finish()))
    }

    /// Resolves `kind` by full type-name equality first, then by each
    /// `_`-delimited prefix in order; the first matching type wins.
    fn resolve_kind(&self, kind: &str) -> DataResult<(&Type, &Constructor)> {
        if let Some(ty) = self.schema.get(kind) {
            return Ok((ty, &ty.constructors[0]));
        }
        for (position, _) in kind.match_indices('_') {
            let (type_name, ctor_name) = (&kind[..position], &kind[position + 1..]);
            let Some(ty) = self.schema.get(type_name) else {
                continue;
            };
            if ctor_name.is_empty() {
                return Ok((ty, &ty.constructors[0]));
            }
            return match ty.constructors.iter().find(|c| c.name == ctor_name) {
                Some(ctor) => Ok((ty, ctor)),
                None => Err(DataError::UnknownConstructor {
                    type_name: type_name.to_owned(),
                    name: ctor_name.to_owned(),
                }),
            };
        }
        Err(DataError::UnknownType(kind.to_owned()))
    }

    fn encode_constructor(
        &self,
        ctor: &Constructor,
        value: &Value,
        builder: &mut Builder,
        args: &[FieldType],
        depth: usize,
    ) -> DataResult<()> {
        if depth > MAX_DEPTH {
            return Err(DataError::DepthExceeded);
        }
        if !ctor.tag.is_empty() {
            builder.store_uint(ctor.tag.value, ctor.tag.bit_len as usize)?;
        }

        let mut env = Env::new();
        bind_parameters(&mut env, ctor, args);
        for param in &ctor.parameters {
            if let Some(bound) = value.field(&param.name).and_then(Value::integerize) {
                env.insert(param.name.clone(), bound);
            }
        }

        for field in &ctor.fields {
            self.encode_field(ctor, field, value, builder, &mut env, args, depth)?;
        }

        for constraint in &ctor.constraints {
            if constraint.eval(&env)? != 1 {
                return Err(DataError::ConstraintFailed {
                    constructor: ctor.name.clone(),
                });
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn encode_field(
        &self,
        ctor: &Constructor,
        field: &Field,
        value: &Value,
        builder: &mut Builder,
        env: &mut Env,
        args: &[FieldType],
        depth: usize,
    ) -> DataResult<()> {
        match &field.kind {
            FieldKind::Group(subfields) => {
                let source = match &field.name {
                    Some(name) => value.field(name).unwrap_or(&Value::Null),
                    None => value,
                };
                let mut nested = Builder::new();
                let mut inner_env = env.clone();
                for f in subfields {
                    self.encode_field(ctor, f, source, &mut nested, &mut inner_env, args, depth)?;
                }
                builder.store_ref(Arc::new(nested.finish()))?;
            }
            FieldKind::Value(ft) => {
                let ft = substitute(ctor, ft, args);
                let field_value = match &field.name {
                    Some(name) => value.field(name),
                    None => Some(value),
                };
                if let Some(name) = &field.name {
                    if binds_field(&ft) {
                        env.insert(name.clone(), int_or_zero(field_value));
                    }
                }
                self.encode_field_type(&ft, field_value, builder, env, depth)?;
            }
        }
        Ok(())
    }

    fn encode_field_type(
        &self,
        ft: &FieldType,
        value: Option<&Value>,
        builder: &mut Builder,
        env: &Env,
        depth: usize,
    ) -> DataResult<()> {
        if depth > MAX_DEPTH {
            return Err(DataError::DepthExceeded);
        }
        match ft {
            FieldType::Number { width, signed } => {
                let bits = eval_width(width, env)?;
                if bits <= 32 {
                    let native = int_or_zero(value);
                    if *signed {
                        builder.store_int(native as i64, bits)?;
                    } else {
                        builder.store_uint(native as u64, bits)?;
                    }
                } else {
                    builder.store_int_big(&big_or_zero(value), bits)?;
                }
            }
            FieldType::Bool { fixed: Some(_) } => {}
            FieldType::Bool { fixed: None } => {
                builder.store_bit(value.map(Value::truthy).unwrap_or(false))?;
            }
            FieldType::Bits { len } => {
                let n = eval_size(len, env, "bit length")?;
                let bits = match value {
                    Some(Value::Bits(bits)) => bits.clone(),
                    Some(Value::Text(text)) => BitString::from_text(text),
                    _ => {
                        return Err(DataError::UnsupportedFieldType {
                            context: "bits field expects a bit string or text",
                        })
                    }
                };
                if bits.len() != n {
                    return Err(DataError::UnsupportedFieldType {
                        context: "bit string length does not match the declared width",
                    });
                }
                builder.store_bits(&bits)?;
            }
            FieldType::Named { name, args } => {
                if let Some(ty) = self.schema.get(name) {
                    let args = eval_args(args, env)?;
                    self.encode_named(ty, value, builder, &args, depth)?;
                } else if is_placeholder(name) {
                    self.encode_placeholder(value, builder, depth)?;
                } else {
                    return Err(DataError::UnknownType(name.clone()));
                }
            }
            FieldType::NatExpr(_) => {
                return Err(DataError::UnsupportedFieldType {
                    context: "integer expression in field position",
                })
            }
            FieldType::Coins => {
                let amount = big_or_zero(value);
                let magnitude = amount.to_biguint().ok_or(DataError::UnsupportedFieldType {
                    context: "currency amounts cannot be negative",
                })?;
                builder.store_coins(&magnitude)?;
            }
            FieldType::Address => {
                let address = match value {
                    None | Some(Value::Null) => MsgAddress::None,
                    Some(Value::Text(text)) => MsgAddress::parse_text(text)?,
                    // explicit external shapes are represented but not
                    // serialised
                    Some(Value::Record(_)) => MsgAddress::None,
                    _ => {
                        return Err(DataError::AddressLoadFailed {
                            reason: "unsupported address value",
                        })
                    }
                };
                builder.store_address(&address)?;
            }
            FieldType::Cell => match value {
                None | Some(Value::Null) => builder.store_maybe_ref(None)?,
                Some(Value::Cell(cell)) => builder.store_maybe_ref(Some(Arc::clone(cell)))?,
                _ => {
                    return Err(DataError::UnsupportedFieldType {
                        context: "cell field expects a cell",
                    })
                }
            },
            FieldType::CellRef(inner) => {
                if matches!(**inner, FieldType::Cell) {
                    match value {
                        Some(Value::Cell(cell)) => builder.store_ref(Arc::clone(cell))?,
                        _ => {
                            return Err(DataError::UnsupportedFieldType {
                                context: "cell reference expects a cell",
                            })
                        }
                    }
                } else {
                    let mut nested = Builder::new();
                    self.encode_field_type(inner, value, &mut nested, env, depth + 1)?;
                    builder.store_ref(Arc::new(nested.finish()))?;
                }
            }
            FieldType::Maybe(inner) => match value {
                None | Some(Value::Null) => builder.store_bit(false)?,
                Some(present) => {
                    builder.store_bit(true)?;
                    self.encode_field_type(inner, Some(present), builder, env, depth + 1)?;
                }
            },
            FieldType::Hashmap { key_len, value: value_type } => {
                let n = eval_size(key_len, env, "key length")?;
                let mut entries: Vec<(BigInt, Arc<Cell>)> = Vec::new();
                match value {
                    Some(Value::Map(map)) => {
                        for (key, entry) in map {
                            // textual keys starting with `_` are metadata
                            if key.starts_with('_') {
                                continue;
                            }
                            let parsed: BigInt =
                                key.parse().map_err(|_| DataError::UnsupportedFieldType {
                                    context: "dictionary key is not an integer",
                                })?;
                            let mut leaf = Builder::new();
                            self.encode_field_type(
                                value_type,
                                Some(entry),
                                &mut leaf,
                                env,
                                depth + 1,
                            )?;
                            entries.push((parsed, Arc::new(leaf.finish())));
                        }
                    }
                    None | Some(Value::Null) => {}
                    _ => {
                        return Err(DataError::UnsupportedFieldType {
                            context: "hashmap field expects a map",
                        })
                    }
                }
                builder.store_dict(n, &entries)?;
            }
            FieldType::VarInteger { max_bytes, signed } => {
                let n = eval_size(max_bytes, env, "byte budget")?;
                let amount = big_or_zero(value);
                if *signed {
                    builder.store_var_int_big(&amount, n)?;
                } else {
                    let magnitude =
                        amount.to_biguint().ok_or(DataError::UnsupportedFieldType {
                            context: "unsigned variable integer cannot be negative",
                        })?;
                    builder.store_var_uint_big(&magnitude, n)?;
                }
            }
            FieldType::Multiple { times, item } => {
                let count = eval_count(times, env)?;
                let empty: &[Value] = &[];
                let list = match value {
                    Some(Value::List(list)) => list.as_slice(),
                    _ => empty,
                };
                for position in 0..count {
                    self.encode_field_type(item, list.get(position), builder, env, depth + 1)?;
                }
            }
            FieldType::Cond { cond, item } => {
                if cond.eval(env)? != 0 {
                    self.encode_field_type(item, value, builder, env, depth + 1)?;
                }
            }
            FieldType::Tuple => match value {
                Some(Value::Tuple(items)) => {
                    builder.store_ref(tuple::serialize_tuple(items)?)?;
                }
                _ => {
                    return Err(DataError::UnsupportedFieldType {
                        context: "tuple field expects a tuple",
                    })
                }
            },
        }
        Ok(())
    }

    /// Encodes a value into a resolved schema type, choosing the
    /// constructor by the value's `kind` when the type has several.
    fn encode_named(
        &self,
        ty: &Type,
        value: Option<&Value>,
        builder: &mut Builder,
        args: &[FieldType],
        depth: usize,
    ) -> DataResult<()> {
        let ctor = if ty.constructors.len() == 1 {
            &ty.constructors[0]
        } else {
            let kind = value.and_then(Value::kind).ok_or(DataError::NotTyped)?;
            ty.constructors
                .iter()
                .find(|c| kind == format!("{}_{}", ty.name, c.name))
                .ok_or_else(|| DataError::UnknownConstructor {
                    type_name: ty.name.clone(),
                    name: kind.to_owned(),
                })?
        };
        match value {
            Some(record @ Value::Record(_)) => {
                self.encode_constructor(ctor, record, builder, args, depth + 1)
            }
            _ => Err(DataError::NotTyped),
        }
    }

    /// Generic placeholder dispatch: route by the value's own `kind`;
    /// when nothing matches, the field is silently skipped.
    fn encode_placeholder(
        &self,
        value: Option<&Value>,
        builder: &mut Builder,
        depth: usize,
    ) -> DataResult<()> {
        let Some(kind) = value.and_then(Value::kind) else {
            return Ok(());
        };
        let Ok((_, ctor)) = self.resolve_kind(kind) else {
            return Ok(());
        };
        let record = value.expect("kind implies a value");
        self.encode_constructor(ctor, record, builder, &[], depth + 1)
    }
}

/// Fields of these types bind their name in the environment before
/// recursion (a narrower set than on the decode side, which also binds
/// through `Named` references once their integer value is known).
fn binds_field(ft: &FieldType) -> bool {
    matches!(
        ft,
        FieldType::Number { .. } | FieldType::VarInteger { .. } | FieldType::Bool { .. }
    )
}

fn int_or_zero(value: Option<&Value>) -> i128 {
    value.and_then(Value::integerize).unwrap_or(0)
}

fn big_or_zero(value: Option<&Value>) -> BigInt {
    match value {
        Some(Value::Big(big)) => big.clone(),
        Some(Value::Int(int)) => BigInt::from(*int),
        Some(Value::Bool(flag)) => BigInt::from(*flag as u8),
        Some(Value::Text(text)) => text.parse().unwrap_or_default(),
        _ => BigInt::default(),
    }
}

/// Names that stand for "any type here": a single uppercase letter,
/// `Any`, `Arg`, or capitalised alphabetic names ending in `Typ`/`Type`.
fn is_placeholder(name: &str) -> bool {
    if name == "Any" || name == "Arg" {
        return true;
    }
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_uppercase() {
        return false;
    }
    if name.len() == 1 {
        return true;
    }
    name.chars().all(|c| c.is_ascii_alphabetic())
        && (name.ends_with("Type") || name.ends_with("Typ"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn placeholder_names() {
        assert!(is_placeholder("X"));
        assert!(is_placeholder("Any"));
        assert!(is_placeholder("Arg"));
        assert!(is_placeholder("TheType"));
        assert!(is_placeholder("SomeTyp"));
        assert!(!is_placeholder("x"));
        assert!(!is_placeholder("Cell2Type3"));
        assert!(!is_placeholder("Payload"));
    }

    #[test]
    fn integer_coercions_default_to_zero() {
        assert_eq!(int_or_zero(None), 0);
        assert_eq!(int_or_zero(Some(&Value::Null)), 0);
        assert_eq!(int_or_zero(Some(&Value::Int(5))), 5);
        assert_eq!(big_or_zero(Some(&Value::Text("12".into()))), BigInt::from(12));
        assert_eq!(big_or_zero(Some(&Value::Null)), BigInt::default());
    }

}
