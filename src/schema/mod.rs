//! The immutable schema model
//!
//! [`Schema`] is the compiled form of a TL-B source text: an ordered map
//! of types, each a list of constructors with tags, parameters, fields
//! and constraint guards. It is built once by [`Schema::from_source`] and
//! never mutated afterwards, which is what lets a compiled
//! [`Runtime`](crate::Runtime) be shared across threads without
//! synchronisation.
//!
//! Lowering resolves the built-in type names (`uintN`, `Bool`, `Coins`,
//! `HashmapE`, ...) into dedicated [`FieldType`] variants; everything
//! else stays a [`FieldType::Named`] reference resolved by name at
//! decode time, so recursive and mutually recursive types need no
//! special handling.

pub mod ast;
pub mod lexer;
pub mod parser;

use indexmap::IndexMap;

use crate::error::SchemaError;
use crate::expr::Expr;

use self::ast::{Declaration, Item, SchemaAst, TypeExprAst};

/// A compiled schema: types by name plus the root-guess hint.
#[derive(Clone, Debug)]
pub struct Schema {
    types: IndexMap<String, Type>,
    last_type: Option<String>,
}

/// A named sum type.
#[derive(Clone, Debug)]
pub struct Type {
    pub name: String,
    pub constructors: Vec<Constructor>,
}

/// One alternative of a type.
#[derive(Clone, Debug)]
pub struct Constructor {
    /// Constructor name; empty for `_` declarations.
    pub name: String,
    pub tag: Tag,
    /// Parameters in result-argument order.
    pub parameters: Vec<Parameter>,
    pub fields: Vec<Field>,
    pub constraints: Vec<Expr>,
}

/// A constructor tag: the bit prefix consumed before the fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tag {
    /// Zero means "no tag bits".
    pub bit_len: u8,
    pub value: u64,
}

impl Tag {
    pub const EMPTY: Tag = Tag {
        bit_len: 0,
        value: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.bit_len == 0
    }
}

/// A constructor-level variable participating in polymorphism.
#[derive(Clone, Debug)]
pub struct Parameter {
    pub name: String,
    /// `{X:Type}` parameters take type arguments; `{n:#}` take integers.
    pub is_type: bool,
    /// Set when the result argument pins a constant.
    pub value: Option<i128>,
}

/// A positionally ordered component of a constructor.
#[derive(Clone, Debug)]
pub struct Field {
    /// `None` for anonymous fields, whose value merges into the parent.
    pub name: Option<String>,
    pub kind: FieldKind,
}

#[derive(Clone, Debug)]
pub enum FieldKind {
    /// An inline value of the given type.
    Value(FieldType),
    /// Sub-fields living in a referenced child cell.
    Group(Vec<Field>),
}

/// How many bits a `Number` occupies.
#[derive(Clone, Debug)]
pub enum Width {
    /// `(## n)` — exactly `n` bits.
    Exact(Expr),
    /// `(#<= n)` — `bitlen(n)` bits.
    AtMost(Expr),
    /// `(#< n)` — `bitlen(n - 1)` bits.
    Below(Expr),
}

/// The resolved type of a field.
#[derive(Clone, Debug)]
pub enum FieldType {
    Number { width: Width, signed: bool },
    /// `fixed` is set for the unit types `True`/`False`, which occupy no
    /// bits at all.
    Bool { fixed: Option<bool> },
    Bits { len: Expr },
    /// A reference to a schema type, possibly applied to arguments.
    Named { name: String, args: Vec<FieldType> },
    /// An arithmetic expression in argument position; never decoded
    /// directly, only used to bind integer parameters.
    NatExpr(Expr),
    Coins,
    Address,
    /// The top cell type: an optional reference.
    Cell,
    /// `^T` — the value lives in a referenced cell.
    CellRef(Box<FieldType>),
    /// One presence bit, then the payload.
    Maybe(Box<FieldType>),
    Hashmap { key_len: Expr, value: Box<FieldType> },
    VarInteger { max_bytes: Expr, signed: bool },
    Multiple { times: Expr, item: Box<FieldType> },
    Cond { cond: Expr, item: Box<FieldType> },
    Tuple,
}

impl Schema {
    /// Parses and lowers TL-B source text.
    pub fn from_source(source: &str) -> Result<Schema, SchemaError> {
        Self::from_ast(parser::parse(source)?)
    }

    /// Lowers a parse tree into the immutable model.
    pub fn from_ast(ast: SchemaAst) -> Result<Schema, SchemaError> {
        let mut types: IndexMap<String, Type> = IndexMap::new();
        let mut last_type = None;
        for decl in ast.declarations {
            let type_name = decl.result_name.clone();
            let constructor = lower_declaration(decl)?;
            types
                .entry(type_name.clone())
                .or_insert_with(|| Type {
                    name: type_name.clone(),
                    constructors: Vec::new(),
                })
                .constructors
                .push(constructor);
            last_type = Some(type_name);
        }
        if types.is_empty() {
            return Err(SchemaError::NoTypes);
        }
        Ok(Schema { types, last_type })
    }

    pub fn get(&self, name: &str) -> Option<&Type> {
        self.types.get(name)
    }

    pub fn types(&self) -> impl Iterator<Item = &Type> {
        self.types.values()
    }

    /// The left-hand name of the last declaration, used as the root guess
    /// when decoding without an explicit type.
    pub fn last_type(&self) -> Option<&str> {
        self.last_type.as_deref()
    }
}

impl Type {
    /// Whether any constructor carries tag bits.
    pub fn has_tagged_constructor(&self) -> bool {
        self.constructors.iter().any(|c| !c.tag.is_empty())
    }
}

impl Constructor {
    /// Position of the named parameter, if declared.
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.name == name)
    }
}

fn lower_declaration(decl: Declaration) -> Result<Constructor, SchemaError> {
    let ctor_name = if decl.name == "_" {
        String::new()
    } else {
        decl.name.clone()
    };
    let tag = match decl.tag {
        Some(tag) => Tag {
            bit_len: tag.bits,
            value: tag.value,
        },
        None => Tag::EMPTY,
    };

    // implicit pool, consulted when ordering parameters by result args
    let mut implicits: IndexMap<String, bool> = IndexMap::new();
    for item in &decl.items {
        if let Item::Implicit { name, is_type } = item {
            implicits.insert(name.clone(), *is_type);
        }
    }

    let mut parameters = Vec::new();
    for (position, arg) in decl.result_args.iter().enumerate() {
        match arg {
            TypeExprAst::Apply { name, args } if args.is_empty() => {
                let is_type = implicits.get(name).copied().unwrap_or(true);
                parameters.push(Parameter {
                    name: name.clone(),
                    is_type,
                    value: None,
                });
            }
            TypeExprAst::NatExpr(Expr::Const(value)) => {
                parameters.push(Parameter {
                    name: format!("_{}", position),
                    is_type: false,
                    value: Some(*value),
                });
            }
            other => {
                return Err(SchemaError::Unsupported {
                    constructor: decl.name.clone(),
                    message: format!("result argument {:?} is not supported", other),
                });
            }
        }
    }

    let mut fields = Vec::new();
    let mut constraints = Vec::new();
    lower_items(&decl.name, decl.items, &mut fields, &mut constraints)?;

    Ok(Constructor {
        name: ctor_name,
        tag,
        parameters,
        fields,
        constraints,
    })
}

fn lower_items(
    ctor: &str,
    items: Vec<Item>,
    fields: &mut Vec<Field>,
    constraints: &mut Vec<Expr>,
) -> Result<(), SchemaError> {
    for item in items {
        match item {
            Item::Implicit { .. } => {}
            Item::Guard(expr) => constraints.push(expr),
            Item::Field(field) => fields.push(Field {
                name: field.name,
                kind: FieldKind::Value(lower_type(ctor, field.ty)?),
            }),
            Item::Group { name, items } => {
                let mut inner = Vec::new();
                lower_items(ctor, items, &mut inner, constraints)?;
                fields.push(Field {
                    name,
                    kind: FieldKind::Group(inner),
                });
            }
        }
    }
    Ok(())
}

fn lower_type(ctor: &str, ty: TypeExprAst) -> Result<FieldType, SchemaError> {
    Ok(match ty {
        TypeExprAst::Nat => FieldType::Number {
            width: Width::Exact(Expr::Const(32)),
            signed: false,
        },
        TypeExprAst::Width(e) => FieldType::Number {
            width: Width::Exact(e),
            signed: false,
        },
        TypeExprAst::AtMost(e) => FieldType::Number {
            width: Width::AtMost(e),
            signed: false,
        },
        TypeExprAst::Below(e) => FieldType::Number {
            width: Width::Below(e),
            signed: false,
        },
        TypeExprAst::NatExpr(e) => FieldType::NatExpr(e),
        TypeExprAst::Ref(inner) => FieldType::CellRef(Box::new(lower_type(ctor, *inner)?)),
        TypeExprAst::Cond { cond, item } => FieldType::Cond {
            cond,
            item: Box::new(lower_type(ctor, *item)?),
        },
        TypeExprAst::Repeat { times, item } => FieldType::Multiple {
            times,
            item: Box::new(lower_type(ctor, *item)?),
        },
        TypeExprAst::Apply { name, args } => lower_apply(ctor, name, args)?,
    })
}

fn lower_apply(
    ctor: &str,
    name: String,
    args: Vec<TypeExprAst>,
) -> Result<FieldType, SchemaError> {
    let unsupported = |message: String| SchemaError::Unsupported {
        constructor: ctor.to_owned(),
        message,
    };

    match (name.as_str(), args.len()) {
        ("Bool", 0) => return Ok(FieldType::Bool { fixed: None }),
        ("True", 0) => return Ok(FieldType::Bool { fixed: Some(true) }),
        ("False", 0) => return Ok(FieldType::Bool { fixed: Some(false) }),
        ("Coins" | "Grams", 0) => return Ok(FieldType::Coins),
        ("MsgAddress" | "MsgAddressInt" | "MsgAddressExt", 0) => {
            return Ok(FieldType::Address)
        }
        ("Cell" | "Any", 0) => return Ok(FieldType::Cell),
        ("Tuple", 0) => return Ok(FieldType::Tuple),
        ("Maybe", 1) => {
            let inner = lower_type(ctor, args.into_iter().next().expect("one argument"))?;
            return Ok(FieldType::Maybe(Box::new(inner)));
        }
        ("VarUInteger" | "VarInteger", 1) => {
            let signed = name == "VarInteger";
            let arg = args.into_iter().next().expect("one argument");
            return Ok(FieldType::VarInteger {
                max_bytes: arg_expr(ctor, arg)?,
                signed,
            });
        }
        ("Hashmap" | "HashmapE", 2) => {
            let mut it = args.into_iter();
            let key = it.next().expect("two arguments");
            let value = it.next().expect("two arguments");
            return Ok(FieldType::Hashmap {
                key_len: arg_expr(ctor, key)?,
                value: Box::new(lower_type(ctor, value)?),
            });
        }
        ("uint" | "int", 1) => {
            let signed = name == "int";
            let arg = args.into_iter().next().expect("one argument");
            return Ok(FieldType::Number {
                width: Width::Exact(arg_expr(ctor, arg)?),
                signed,
            });
        }
        ("bits", 1) => {
            let arg = args.into_iter().next().expect("one argument");
            return Ok(FieldType::Bits {
                len: arg_expr(ctor, arg)?,
            });
        }
        _ => {}
    }

    if args.is_empty() {
        if let Some(width) = fixed_width(&name, "uint", 256) {
            return Ok(FieldType::Number {
                width: Width::Exact(Expr::Const(width)),
                signed: false,
            });
        }
        if let Some(width) = fixed_width(&name, "int", 257) {
            return Ok(FieldType::Number {
                width: Width::Exact(Expr::Const(width)),
                signed: true,
            });
        }
        if let Some(len) = fixed_width(&name, "bits", 1023) {
            return Ok(FieldType::Bits {
                len: Expr::Const(len),
            });
        }
    }

    let mut lowered = Vec::with_capacity(args.len());
    for arg in args {
        lowered.push(match arg {
            TypeExprAst::NatExpr(e) => FieldType::NatExpr(e),
            other => lower_type(ctor, other)?,
        });
    }
    if name == "_" {
        return Err(unsupported("`_` is not a type".to_owned()));
    }
    Ok(FieldType::Named {
        name,
        args: lowered,
    })
}

/// `uint8`-style names: the prefix plus a decimal width within bounds.
fn fixed_width(name: &str, prefix: &str, max: i128) -> Option<i128> {
    let digits = name.strip_prefix(prefix)?;
    if digits.is_empty() || digits.starts_with('0') && digits != "0" {
        return None;
    }
    let width: i128 = digits.parse().ok()?;
    (width >= 1 && width <= max).then_some(width)
}

fn arg_expr(ctor: &str, arg: TypeExprAst) -> Result<Expr, SchemaError> {
    match arg {
        TypeExprAst::NatExpr(e) => Ok(e),
        TypeExprAst::Width(e) => Ok(e),
        TypeExprAst::Apply { name, args } if args.is_empty() => Ok(Expr::Var(name)),
        other => Err(SchemaError::Unsupported {
            constructor: ctor.to_owned(),
            message: format!("expected an integer argument, found {:?}", other),
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builtins_are_lowered() {
        let schema = Schema::from_source(
            "thing a:uint16 b:int8 c:Bool d:Coins e:(Maybe ^Cell) f:(VarUInteger 16) = Thing;",
        )
        .unwrap();
        let ty = schema.get("Thing").unwrap();
        let fields = &ty.constructors[0].fields;
        assert!(matches!(
            fields[0].kind,
            FieldKind::Value(FieldType::Number { signed: false, .. })
        ));
        assert!(matches!(
            fields[1].kind,
            FieldKind::Value(FieldType::Number { signed: true, .. })
        ));
        assert!(matches!(
            fields[2].kind,
            FieldKind::Value(FieldType::Bool { fixed: None })
        ));
        assert!(matches!(fields[3].kind, FieldKind::Value(FieldType::Coins)));
        assert!(matches!(
            fields[4].kind,
            FieldKind::Value(FieldType::Maybe(_))
        ));
        assert!(matches!(
            fields[5].kind,
            FieldKind::Value(FieldType::VarInteger { signed: false, .. })
        ));
    }

    #[test]
    fn constructors_accumulate_per_type() {
        let schema = Schema::from_source("a$0 = U; b$1 = U; only x:#8 = V;").unwrap();
        assert_eq!(schema.get("U").unwrap().constructors.len(), 2);
        assert_eq!(schema.get("V").unwrap().constructors.len(), 1);
        assert_eq!(schema.last_type(), Some("V"));
        assert!(schema.get("U").unwrap().has_tagged_constructor());
        assert!(!schema.get("V").unwrap().has_tagged_constructor());
    }

    #[test]
    fn parameters_follow_result_argument_order() {
        let schema =
            Schema::from_source("pair {m:#} {n:#} v:(## n) w:(## m) = Pair n m;").unwrap();
        let ctor = &schema.get("Pair").unwrap().constructors[0];
        assert_eq!(ctor.parameters.len(), 2);
        assert_eq!(ctor.parameters[0].name, "n");
        assert_eq!(ctor.parameters[1].name, "m");
        assert_eq!(ctor.parameter_index("m"), Some(1));
    }

    #[test]
    fn constant_result_arguments_pin_values() {
        let schema = Schema::from_source("five v:#8 = Sized 5;").unwrap();
        let ctor = &schema.get("Sized").unwrap().constructors[0];
        assert_eq!(ctor.parameters[0].value, Some(5));
    }

    #[test]
    fn guards_become_constraints() {
        let schema = Schema::from_source("pair n:#8 m:#8 { n + m = 10 } = Pair;").unwrap();
        let ctor = &schema.get("Pair").unwrap().constructors[0];
        assert_eq!(ctor.constraints.len(), 1);
        assert_eq!(ctor.fields.len(), 2);
    }

    #[test]
    fn empty_schema_is_rejected() {
        assert!(matches!(
            Schema::from_source("  "),
            Err(SchemaError::NoTypes)
        ));
    }
}
