//! Tag-directed decoding of cell trees into values
//!
//! The decoder walks constructor candidates over a [`Slice`], restoring
//! the cursor exactly between attempts. A failed attempt is an ordinary
//! result value, never unwinding used as control flow: the attempt
//! boundary inspects the error, rolls the slice back to its checkpoint
//! and either tries the next candidate or propagates.

use indexmap::IndexMap;
use num_bigint::BigInt;
use tracing::trace;

use crate::address::MsgAddress;
use crate::cell::slice::{to_signed, Slice};
use crate::cell::{bit_len_of, tuple, Cell};
use crate::error::{DataError, DataResult};
use crate::expr::{Env, Expr};
use crate::index::TagIndex;
use crate::runtime::RuntimeOptions;
use crate::schema::{Constructor, Field, FieldKind, FieldType, Schema, Type, Width};
use crate::value::{Record, Value};
use std::sync::Arc;

/// Cap on schema nesting, guarding against cyclic definitions.
pub(crate) const MAX_DEPTH: usize = 256;

/// Upper bound for `Multiple` repetition counts.
const MAX_REPEAT: i128 = 65_535;

pub(crate) struct Decoder<'a> {
    pub schema: &'a Schema,
    pub index: &'a TagIndex,
    pub options: &'a RuntimeOptions,
}

impl<'a> Decoder<'a> {
    /// Decodes the root cell, guessing the type unless `by_tag` is set.
    pub fn decode_root(&self, cell: &Arc<Cell>, by_tag: bool) -> DataResult<Value> {
        if by_tag {
            return self.decode_root_by_tag(cell);
        }
        let mut attempts = 0;
        let mut last_failure = None;
        if let Some(ty) = self.schema.last_type().and_then(|name| self.schema.get(name)) {
            attempts += 1;
            match self.attempt_type(ty, cell) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_recoverable() => last_failure = Some(err),
                Err(err) => return Err(err),
            }
        }
        // all types with tagged constructors, then the untagged rest,
        // lexicographic within each group
        let mut candidates: Vec<&Type> = self.schema.types().collect();
        candidates.sort_by(|a, b| {
            b.has_tagged_constructor()
                .cmp(&a.has_tagged_constructor())
                .then_with(|| a.name.cmp(&b.name))
        });
        for ty in candidates {
            if Some(ty.name.as_str()) == self.schema.last_type() {
                continue;
            }
            attempts += 1;
            match self.attempt_type(ty, cell) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_recoverable() => last_failure = Some(err),
                Err(err) => return Err(err),
            }
        }
        Err(DataError::NoMatch {
            attempts,
            cause: last_failure.map(Box::new),
        })
    }

    fn attempt_type(&self, ty: &Type, cell: &Arc<Cell>) -> DataResult<Value> {
        trace!(ty = %ty.name, "root attempt");
        let mut slice = cell.begin_parse()?;
        self.decode_type(ty, &mut slice, &[], 0)
    }

    fn decode_root_by_tag(&self, cell: &Arc<Cell>) -> DataResult<Value> {
        let mut slice = cell.begin_parse()?;
        let cap = (self.index.max_tag_bits() as usize).min(slice.remaining_bits());
        for len in (1..=cap).rev() {
            let prefix = slice.preload_uint(len)?;
            if let Some((type_name, position)) = self.index.get(len as u8, prefix) {
                let ty = self
                    .schema
                    .get(type_name)
                    .ok_or_else(|| DataError::UnknownType(type_name.clone()))?;
                let ctor = &ty.constructors[*position];
                return self.decode_constructor(ty, ctor, &mut slice, &[], 0);
            }
        }
        Err(DataError::NoMatch {
            attempts: 0,
            cause: None,
        })
    }

    /// Tries each constructor in declaration order; the first success
    /// wins and failures leave the slice untouched.
    pub fn decode_type(
        &self,
        ty: &Type,
        slice: &mut Slice,
        args: &[FieldType],
        depth: usize,
    ) -> DataResult<Value> {
        if depth > MAX_DEPTH {
            return Err(DataError::DepthExceeded);
        }
        let mut last_err = None;
        for ctor in &ty.constructors {
            match self.decode_constructor(ty, ctor, slice, args, depth) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_recoverable() => {
                    trace!(ty = %ty.name, ctor = %ctor.name, %err, "constructor rejected");
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or(DataError::NoMatch {
            attempts: 0,
            cause: None,
        }))
    }

    fn decode_constructor(
        &self,
        ty: &Type,
        ctor: &Constructor,
        slice: &mut Slice,
        args: &[FieldType],
        depth: usize,
    ) -> DataResult<Value> {
        let saved = slice.checkpoint();
        match self.try_constructor(ty, ctor, slice, args, depth) {
            Ok(value) => Ok(value),
            Err(err) => {
                slice.rollback(saved);
                Err(err)
            }
        }
    }

    fn try_constructor(
        &self,
        ty: &Type,
        ctor: &Constructor,
        slice: &mut Slice,
        args: &[FieldType],
        depth: usize,
    ) -> DataResult<Value> {
        if !ctor.tag.is_empty() {
            let needed = ctor.tag.bit_len as usize;
            if slice.remaining_bits() < needed {
                return Err(DataError::TagShort {
                    needed: ctor.tag.bit_len,
                    remaining: slice.remaining_bits(),
                });
            }
            let actual = slice.preload_uint(needed)?;
            if actual != ctor.tag.value {
                return Err(DataError::TagMismatch {
                    bits: ctor.tag.bit_len,
                    expected: ctor.tag.value,
                    actual,
                });
            }
            slice.skip(needed as isize)?;
        }

        let mut env = Env::new();
        bind_parameters(&mut env, ctor, args);

        let kind = if ty.constructors.len() > 1 {
            format!("{}_{}", ty.name, ctor.name)
        } else {
            ty.name.clone()
        };
        let mut record = Value::record_of(&kind);
        for field in &ctor.fields {
            self.decode_field(ctor, field, slice, &mut env, &mut record, args, depth)?;
        }

        for constraint in &ctor.constraints {
            if constraint.eval(&env)? != 1 {
                return Err(DataError::ConstraintFailed {
                    constructor: ctor.name.clone(),
                });
            }
        }
        Ok(Value::Record(record))
    }

    #[allow(clippy::too_many_arguments)]
    fn decode_field(
        &self,
        ctor: &Constructor,
        field: &Field,
        slice: &mut Slice,
        env: &mut Env,
        record: &mut Record,
        args: &[FieldType],
        depth: usize,
    ) -> DataResult<()> {
        match &field.kind {
            FieldKind::Group(subfields) => {
                let cell = slice.load_ref()?;
                let mut inner_slice = cell.begin_parse_exotic();
                // sub-field bindings stay local to the group
                let mut inner_env = env.clone();
                let mut sub = Record::new();
                for f in subfields {
                    self.decode_field(
                        ctor,
                        f,
                        &mut inner_slice,
                        &mut inner_env,
                        &mut sub,
                        args,
                        depth,
                    )?;
                }
                match &field.name {
                    Some(name) => {
                        record.insert(name.clone(), Value::Record(sub));
                    }
                    None => record.extend(sub),
                }
            }
            FieldKind::Value(ft) => {
                let ft = substitute(ctor, ft, args);
                let Some(value) = self.decode_field_type(&ft, slice, env, depth)? else {
                    return Ok(());
                };
                match &field.name {
                    Some(name) => {
                        if binds_variable(&ft) {
                            if let Some(int) = value.integerize() {
                                env.insert(name.clone(), int);
                            }
                        }
                        record.insert(name.clone(), value);
                    }
                    None => {
                        if let Value::Record(sub) = value {
                            for (key, entry) in sub {
                                if key != "kind" {
                                    record.insert(key, entry);
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Decodes one field type; `None` means the field contributes
    /// nothing (a falsy conditional).
    fn decode_field_type(
        &self,
        ft: &FieldType,
        slice: &mut Slice,
        env: &Env,
        depth: usize,
    ) -> DataResult<Option<Value>> {
        if depth > MAX_DEPTH {
            return Err(DataError::DepthExceeded);
        }
        let value = match ft {
            FieldType::Number { width, signed } => {
                let bits = eval_width(width, env)?;
                if bits <= 32 {
                    let raw = slice.load_uint(bits)?;
                    let native = if *signed {
                        to_signed(raw, bits)
                    } else {
                        raw as i64
                    };
                    Some(Value::Int(native))
                } else if *signed {
                    Some(Value::Big(slice.load_int_big(bits)?))
                } else {
                    Some(Value::Big(BigInt::from(slice.load_uint_big(bits)?)))
                }
            }
            FieldType::Bool { fixed: Some(flag) } => Some(Value::Bool(*flag)),
            FieldType::Bool { fixed: None } => Some(Value::Bool(slice.load_bit()?)),
            FieldType::Bits { len } => {
                let n = eval_size(len, env, "bit length")?;
                let bits = slice.load_bits(n)?;
                if self.options.auto_text && n % 8 == 0 {
                    match bits.to_text() {
                        Some(text) => Some(Value::Text(text)),
                        None => Some(Value::Bits(bits)),
                    }
                } else {
                    Some(Value::Bits(bits))
                }
            }
            FieldType::Named { name, args } => {
                let ty = self
                    .schema
                    .get(name)
                    .ok_or_else(|| DataError::UnknownType(name.clone()))?;
                let args = eval_args(args, env)?;
                Some(self.decode_type(ty, slice, &args, depth + 1)?)
            }
            FieldType::NatExpr(_) => {
                return Err(DataError::UnsupportedFieldType {
                    context: "integer expression in field position",
                })
            }
            FieldType::Coins => Some(Value::Big(BigInt::from(slice.load_coins()?))),
            FieldType::Address => Some(address_value(slice.load_address()?)),
            FieldType::Cell => match slice.load_maybe_ref()? {
                Some(cell) => Some(Value::Cell(cell)),
                None => Some(Value::Null),
            },
            FieldType::CellRef(inner) => {
                let cell = slice.load_ref()?;
                if matches!(**inner, FieldType::Cell) {
                    // ^Cell keeps the reference itself as the value
                    Some(Value::Cell(cell))
                } else {
                    let mut inner_slice = cell.begin_parse()?;
                    self.decode_field_type(inner, &mut inner_slice, env, depth + 1)?
                }
            }
            FieldType::Maybe(inner) => {
                if slice.load_bit()? {
                    self.decode_field_type(inner, slice, env, depth + 1)?
                        .or(Some(Value::Null))
                } else {
                    Some(Value::Null)
                }
            }
            FieldType::Hashmap { key_len, value } => {
                let n = eval_size(key_len, env, "key length")?;
                let entries = slice.load_dict::<Value, DataError, _>(n, |leaf| {
                    Ok(self
                        .decode_field_type(value, leaf, env, depth + 1)?
                        .unwrap_or(Value::Null))
                })?;
                let mut map = IndexMap::new();
                for (key, entry) in entries {
                    map.insert(key.to_string(), entry);
                }
                Some(Value::Map(map))
            }
            FieldType::VarInteger { max_bytes, signed } => {
                let n = eval_size(max_bytes, env, "byte budget")?;
                let text = if *signed {
                    slice.load_var_int_big(n)?.to_string()
                } else {
                    slice.load_var_uint_big(n)?.to_string()
                };
                Some(Value::Text(text))
            }
            FieldType::Multiple { times, item } => {
                let count = eval_count(times, env)?;
                let mut list = Vec::with_capacity(count);
                for _ in 0..count {
                    if let Some(entry) = self.decode_field_type(item, slice, env, depth + 1)? {
                        list.push(entry);
                    }
                }
                Some(Value::List(list))
            }
            FieldType::Cond { cond, item } => {
                if cond.eval(env)? != 0 {
                    self.decode_field_type(item, slice, env, depth + 1)?
                } else {
                    None
                }
            }
            FieldType::Tuple => {
                let cell = slice.load_ref()?;
                Some(Value::Tuple(tuple::parse_tuple(&cell)?))
            }
        };
        Ok(value)
    }
}

/// Seeds the environment from pinned parameter values and the constant
/// arguments the caller pre-evaluated.
pub(crate) fn bind_parameters(env: &mut Env, ctor: &Constructor, args: &[FieldType]) {
    for (position, param) in ctor.parameters.iter().enumerate() {
        if let Some(value) = param.value {
            env.insert(param.name.clone(), value);
        }
        if let Some(FieldType::NatExpr(Expr::Const(value))) = args.get(position) {
            env.insert(param.name.clone(), *value);
        }
    }
}

/// Replaces a bare `Named` reference to a parameter with the argument
/// bound at that parameter's position.
pub(crate) fn substitute(ctor: &Constructor, ft: &FieldType, args: &[FieldType]) -> FieldType {
    if let FieldType::Named { name, args: nested } = ft {
        if nested.is_empty() {
            if let Some(position) = ctor.parameter_index(name) {
                if let Some(replacement) = args.get(position) {
                    return replacement.clone();
                }
            }
        }
    }
    ft.clone()
}

/// Whether a successfully decoded field of this type binds its name as
/// an integer variable.
pub(crate) fn binds_variable(ft: &FieldType) -> bool {
    matches!(
        ft,
        FieldType::Named { .. }
            | FieldType::Number { .. }
            | FieldType::VarInteger { .. }
            | FieldType::Bool { .. }
    )
}

/// Evaluates the three width forms down to a bit count.
pub(crate) fn eval_width(width: &Width, env: &Env) -> DataResult<usize> {
    let bits = match width {
        Width::Exact(e) => e.eval(env)?,
        Width::AtMost(e) => bit_len_of(clamp_nat(e.eval(env)?)?) as i128,
        Width::Below(e) => bit_len_of(clamp_nat(e.eval(env)?.saturating_sub(1))?) as i128,
    };
    if (0..=1023).contains(&bits) {
        Ok(bits as usize)
    } else {
        Err(DataError::UnsupportedFieldType {
            context: "number width out of range",
        })
    }
}

fn clamp_nat(value: i128) -> DataResult<u64> {
    u64::try_from(value.max(0)).map_err(|_| DataError::UnsupportedFieldType {
        context: "width bound out of range",
    })
}

pub(crate) fn eval_size(expr: &Expr, env: &Env, context: &'static str) -> DataResult<usize> {
    let value = expr.eval(env)?;
    if (0..=1023).contains(&value) {
        Ok(value as usize)
    } else {
        Err(DataError::UnsupportedFieldType { context })
    }
}

pub(crate) fn eval_count(expr: &Expr, env: &Env) -> DataResult<usize> {
    let value = expr.eval(env)?;
    if (0..=MAX_REPEAT).contains(&value) {
        Ok(value as usize)
    } else {
        Err(DataError::UnsupportedFieldType {
            context: "repetition count out of range",
        })
    }
}

/// Pre-evaluates integer arguments so the callee can bind them without
/// access to the caller's environment.
pub(crate) fn eval_args(args: &[FieldType], env: &Env) -> DataResult<Vec<FieldType>> {
    args.iter()
        .map(|arg| match arg {
            FieldType::NatExpr(e) => Ok(FieldType::NatExpr(Expr::Const(e.eval(env)?))),
            other => Ok(other.clone()),
        })
        .collect()
}

fn address_value(address: MsgAddress) -> Value {
    match address {
        MsgAddress::None => Value::Null,
        MsgAddress::Std { .. } => Value::Text(address.to_string()),
        MsgAddress::Extern { address } => {
            let mut record = Value::record_of("MsgAddressExt");
            record.insert("address".to_owned(), Value::Bits(address));
            Value::Record(record)
        }
    }
}
