//! Recursive-descent parser from TL-B tokens to the parse tree
//!
//! The grammar subset is declaration-oriented: a constructor head with an
//! optional tag, a run of implicits, guards, fields and cell groups, then
//! `= ResultType args ;`. Expressions use a single comparison level above
//! additive and multiplicative levels, matching what guard and width
//! positions need.
//!
//! Inside parentheses the star resolves to repetition (`(2 * uint8)`)
//! when it directly follows the opening atom; products inside arithmetic
//! positions are reached through `parse_expr`, which treats the star as
//! multiplication as usual.

use std::ops::Range;

use crate::error::SchemaError;
use crate::expr::{BinOp, Expr};
use crate::schema::ast::{Declaration, FieldAst, Item, SchemaAst, TagAst, TypeExprAst};
use crate::schema::lexer::{self, Tok};

/// Parses TL-B source text into its parse tree.
pub fn parse(source: &str) -> Result<SchemaAst, SchemaError> {
    let mut tokens = Vec::new();
    for (tok, span) in lexer::tokenize(source) {
        match tok {
            Ok(tok) => tokens.push((tok, span)),
            Err(()) => {
                return Err(error_at(source, span.start, "unrecognised character"));
            }
        }
    }
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    parser.parse_schema()
}

fn error_at(source: &str, offset: usize, message: impl Into<String>) -> SchemaError {
    let mut line = 1;
    let mut column = 1;
    for ch in source[..offset.min(source.len())].chars() {
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    SchemaError::Parse {
        line,
        column,
        message: message.into(),
    }
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<(Tok, Range<usize>)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|(tok, _)| tok)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + ahead).map(|(tok, _)| tok)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).map(|(tok, _)| tok.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, span)| span.start)
            .unwrap_or(self.source.len())
    }

    fn fail<T>(&self, message: impl Into<String>) -> Result<T, SchemaError> {
        Err(error_at(self.source, self.offset(), message))
    }

    fn expect(&mut self, wanted: Tok, what: &str) -> Result<(), SchemaError> {
        match self.next() {
            Some(tok) if tok == wanted => Ok(()),
            Some(tok) => {
                self.pos -= 1;
                self.fail(format!("expected {}, found {:?}", what, tok))
            }
            None => self.fail(format!("expected {}, found end of input", what)),
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, SchemaError> {
        match self.next() {
            Some(Tok::Ident(name)) => Ok(name),
            Some(tok) => {
                self.pos -= 1;
                self.fail(format!("expected {}, found {:?}", what, tok))
            }
            None => self.fail(format!("expected {}, found end of input", what)),
        }
    }

    fn parse_schema(&mut self) -> Result<SchemaAst, SchemaError> {
        let mut declarations = Vec::new();
        while self.peek().is_some() {
            declarations.push(self.parse_declaration()?);
        }
        Ok(SchemaAst { declarations })
    }

    fn parse_declaration(&mut self) -> Result<Declaration, SchemaError> {
        let name = self.expect_ident("a constructor name")?;
        let tag = self.parse_tag()?;

        let mut items = Vec::new();
        while self.peek() != Some(&Tok::Equals) {
            if self.peek().is_none() {
                return self.fail("declaration is missing `=`");
            }
            items.push(self.parse_item()?);
        }
        self.expect(Tok::Equals, "`=`")?;

        let result_name = self.expect_ident("a result type name")?;
        let mut result_args = Vec::new();
        while self.peek() != Some(&Tok::Semi) {
            if self.peek().is_none() {
                return self.fail("declaration is missing `;`");
            }
            result_args.push(self.parse_type_atom()?);
        }
        self.expect(Tok::Semi, "`;`")?;

        Ok(Declaration {
            name,
            tag,
            items,
            result_name,
            result_args,
        })
    }

    fn parse_tag(&mut self) -> Result<Option<TagAst>, SchemaError> {
        match self.peek() {
            Some(Tok::DollarBin(digits)) => {
                let digits = digits.clone();
                self.next();
                if digits.len() > 64 {
                    return self.fail("binary tag longer than 64 bits");
                }
                let value = u64::from_str_radix(&digits, 2)
                    .map_err(|_| error_at(self.source, self.offset(), "bad binary tag"))?;
                Ok(Some(TagAst {
                    bits: digits.len() as u8,
                    value,
                }))
            }
            Some(Tok::HashNum(digits)) => {
                let digits = digits.clone();
                self.next();
                if digits.len() > 16 {
                    return self.fail("hexadecimal tag longer than 64 bits");
                }
                let value = u64::from_str_radix(&digits, 16)
                    .map_err(|_| error_at(self.source, self.offset(), "bad hexadecimal tag"))?;
                Ok(Some(TagAst {
                    bits: (digits.len() * 4) as u8,
                    value,
                }))
            }
            Some(Tok::DollarUnderscore) | Some(Tok::HashUnderscore) => {
                self.next();
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn parse_item(&mut self) -> Result<Item, SchemaError> {
        if self.peek() == Some(&Tok::LBrace) {
            self.next();
            let item = if matches!(self.peek(), Some(Tok::Ident(_)))
                && self.peek_at(1) == Some(&Tok::Colon)
            {
                let name = self.expect_ident("a parameter name")?;
                self.next(); // colon
                let is_type = match self.next() {
                    Some(Tok::Hash) => false,
                    Some(Tok::Ident(kind)) if kind == "Type" => true,
                    _ => {
                        self.pos -= 1;
                        return self.fail("expected `#` or `Type` in an implicit");
                    }
                };
                Item::Implicit { name, is_type }
            } else {
                Item::Guard(self.parse_expr()?)
            };
            self.expect(Tok::RBrace, "`}`")?;
            return Ok(item);
        }
        self.parse_field()
    }

    fn parse_field(&mut self) -> Result<Item, SchemaError> {
        // `name:...` — a named field or group
        if matches!(self.peek(), Some(Tok::Ident(_))) && self.peek_at(1) == Some(&Tok::Colon) {
            let raw = self.expect_ident("a field name")?;
            let name = if raw == "_" { None } else { Some(raw) };
            self.next(); // colon
            if self.peek() == Some(&Tok::Caret) && self.peek_at(1) == Some(&Tok::LBracket) {
                return Ok(Item::Group {
                    name,
                    items: self.parse_group_body()?,
                });
            }
            return Ok(Item::Field(FieldAst {
                name,
                ty: self.parse_type_expr()?,
            }));
        }
        // anonymous group
        if self.peek() == Some(&Tok::Caret) && self.peek_at(1) == Some(&Tok::LBracket) {
            return Ok(Item::Group {
                name: None,
                items: self.parse_group_body()?,
            });
        }
        // anonymous field
        Ok(Item::Field(FieldAst {
            name: None,
            ty: self.parse_type_expr()?,
        }))
    }

    fn parse_group_body(&mut self) -> Result<Vec<Item>, SchemaError> {
        self.expect(Tok::Caret, "`^`")?;
        self.expect(Tok::LBracket, "`[`")?;
        let mut items = Vec::new();
        while self.peek() != Some(&Tok::RBracket) {
            if self.peek().is_none() {
                return self.fail("cell group is missing `]`");
            }
            items.push(self.parse_item()?);
        }
        self.expect(Tok::RBracket, "`]`")?;
        Ok(items)
    }

    /// A type in unparenthesised field position.
    fn parse_type_expr(&mut self) -> Result<TypeExprAst, SchemaError> {
        match self.peek().cloned() {
            Some(Tok::Caret) => {
                self.next();
                Ok(TypeExprAst::Ref(Box::new(self.parse_type_expr()?)))
            }
            Some(Tok::Hash) => {
                self.next();
                Ok(TypeExprAst::Nat)
            }
            Some(Tok::HashNum(digits)) => {
                self.next();
                match digits.parse::<i128>() {
                    Ok(width) => Ok(TypeExprAst::Width(Expr::Const(width))),
                    Err(_) => self.fail("width shorthand must be decimal"),
                }
            }
            Some(Tok::HashHash) => {
                self.next();
                Ok(TypeExprAst::Width(self.parse_expr_atom_arg()?))
            }
            Some(Tok::HashLeq) => {
                self.next();
                Ok(TypeExprAst::AtMost(self.parse_expr_atom_arg()?))
            }
            Some(Tok::HashLess) => {
                self.next();
                Ok(TypeExprAst::Below(self.parse_expr_atom_arg()?))
            }
            Some(Tok::LParen) => {
                self.next();
                let inner = self.parse_compound()?;
                self.expect(Tok::RParen, "`)`")?;
                Ok(inner)
            }
            Some(Tok::Ident(_)) => {
                if self.cond_ahead() {
                    return self.parse_cond();
                }
                let name = self.expect_ident("a type name")?;
                Ok(TypeExprAst::Apply { name, args: vec![] })
            }
            Some(Tok::Num(value)) => {
                self.next();
                Ok(TypeExprAst::NatExpr(Expr::Const(value)))
            }
            _ => self.fail("expected a type expression"),
        }
    }

    /// Whether the cursor sits on `var?` or `var.bit?`.
    fn cond_ahead(&self) -> bool {
        if self.peek_at(1) == Some(&Tok::Question) {
            return true;
        }
        self.peek_at(1) == Some(&Tok::Dot)
            && matches!(self.peek_at(2), Some(Tok::Num(_)))
            && self.peek_at(3) == Some(&Tok::Question)
    }

    fn parse_cond(&mut self) -> Result<TypeExprAst, SchemaError> {
        let var = self.expect_ident("a condition variable")?;
        let cond = if self.peek() == Some(&Tok::Dot) {
            self.next();
            match self.next() {
                Some(Tok::Num(index)) if (0..128).contains(&index) => Expr::Bit {
                    var,
                    index: index as u32,
                },
                _ => {
                    self.pos -= 1;
                    return self.fail("expected a bit index after `.`");
                }
            }
        } else {
            Expr::Var(var)
        };
        self.expect(Tok::Question, "`?`")?;
        Ok(TypeExprAst::Cond {
            cond,
            item: Box::new(self.parse_type_expr()?),
        })
    }

    /// The body of a parenthesised type expression.
    fn parse_compound(&mut self) -> Result<TypeExprAst, SchemaError> {
        match self.peek().cloned() {
            Some(Tok::HashHash) => {
                self.next();
                Ok(TypeExprAst::Width(self.parse_expr()?))
            }
            Some(Tok::HashLeq) => {
                self.next();
                Ok(TypeExprAst::AtMost(self.parse_expr()?))
            }
            Some(Tok::HashLess) => {
                self.next();
                Ok(TypeExprAst::Below(self.parse_expr()?))
            }
            Some(Tok::Caret) => {
                self.next();
                Ok(TypeExprAst::Ref(Box::new(self.parse_compound()?)))
            }
            Some(Tok::Num(times)) if self.peek_at(1) == Some(&Tok::Star) => {
                self.next();
                self.next();
                Ok(TypeExprAst::Repeat {
                    times: Expr::Const(times),
                    item: Box::new(self.parse_compound()?),
                })
            }
            Some(Tok::Ident(times)) if self.peek_at(1) == Some(&Tok::Star) => {
                self.next();
                self.next();
                Ok(TypeExprAst::Repeat {
                    times: Expr::Var(times),
                    item: Box::new(self.parse_compound()?),
                })
            }
            Some(Tok::Ident(_)) if self.cond_ahead() => self.parse_cond(),
            Some(Tok::Ident(name)) => {
                match self.peek_at(1) {
                    // arithmetic continuation means this is an expression
                    Some(
                        Tok::Plus
                        | Tok::Minus
                        | Tok::Slash
                        | Tok::Equals
                        | Tok::NotEquals
                        | Tok::Less
                        | Tok::LessEq
                        | Tok::Greater
                        | Tok::GreaterEq
                        | Tok::Dot,
                    ) => Ok(TypeExprAst::NatExpr(self.parse_expr()?)),
                    _ => {
                        self.next();
                        let mut args = Vec::new();
                        while self.peek() != Some(&Tok::RParen) {
                            if self.peek().is_none() {
                                return self.fail("type application is missing `)`");
                            }
                            args.push(self.parse_type_atom()?);
                        }
                        Ok(TypeExprAst::Apply { name, args })
                    }
                }
            }
            Some(Tok::Num(_)) => Ok(TypeExprAst::NatExpr(self.parse_expr()?)),
            Some(Tok::Hash) => {
                self.next();
                Ok(TypeExprAst::Nat)
            }
            Some(Tok::HashNum(digits)) => {
                self.next();
                match digits.parse::<i128>() {
                    Ok(width) => Ok(TypeExprAst::Width(Expr::Const(width))),
                    Err(_) => self.fail("width shorthand must be decimal"),
                }
            }
            Some(Tok::LParen) => {
                self.next();
                let inner = self.parse_compound()?;
                self.expect(Tok::RParen, "`)`")?;
                Ok(inner)
            }
            _ => self.fail("expected a type expression"),
        }
    }

    /// A type in argument position: one token or a parenthesised group.
    fn parse_type_atom(&mut self) -> Result<TypeExprAst, SchemaError> {
        match self.peek().cloned() {
            Some(Tok::Caret) => {
                self.next();
                Ok(TypeExprAst::Ref(Box::new(self.parse_type_atom()?)))
            }
            Some(Tok::Hash) => {
                self.next();
                Ok(TypeExprAst::Nat)
            }
            Some(Tok::HashNum(digits)) => {
                self.next();
                match digits.parse::<i128>() {
                    Ok(width) => Ok(TypeExprAst::Width(Expr::Const(width))),
                    Err(_) => self.fail("width shorthand must be decimal"),
                }
            }
            Some(Tok::Num(value)) => {
                self.next();
                Ok(TypeExprAst::NatExpr(Expr::Const(value)))
            }
            Some(Tok::Ident(name)) => {
                self.next();
                Ok(TypeExprAst::Apply { name, args: vec![] })
            }
            Some(Tok::LParen) => {
                self.next();
                let inner = self.parse_compound()?;
                self.expect(Tok::RParen, "`)`")?;
                Ok(inner)
            }
            _ => self.fail("expected a type argument"),
        }
    }

    /// `## n`-style width arguments: a literal, a variable or parentheses.
    fn parse_expr_atom_arg(&mut self) -> Result<Expr, SchemaError> {
        match self.peek().cloned() {
            Some(Tok::Num(value)) => {
                self.next();
                Ok(Expr::Const(value))
            }
            Some(Tok::Ident(name)) => {
                self.next();
                Ok(Expr::Var(name))
            }
            Some(Tok::LParen) => {
                self.next();
                let e = self.parse_expr()?;
                self.expect(Tok::RParen, "`)`")?;
                Ok(e)
            }
            _ => self.fail("expected a width"),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, SchemaError> {
        let lhs = self.parse_add()?;
        let op = match self.peek() {
            Some(Tok::Equals) => BinOp::Eq,
            Some(Tok::NotEquals) => BinOp::Ne,
            Some(Tok::Less) => BinOp::Lt,
            Some(Tok::LessEq) => BinOp::Le,
            Some(Tok::Greater) => BinOp::Gt,
            Some(Tok::GreaterEq) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.next();
        let rhs = self.parse_add()?;
        Ok(Expr::binary(op, lhs, rhs))
    }

    fn parse_add(&mut self) -> Result<Expr, SchemaError> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinOp::Add,
                Some(Tok::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.next();
            let rhs = self.parse_mul()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn parse_mul(&mut self) -> Result<Expr, SchemaError> {
        let mut lhs = self.parse_expr_atom()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinOp::Mul,
                Some(Tok::Slash) => BinOp::Div,
                _ => return Ok(lhs),
            };
            self.next();
            let rhs = self.parse_expr_atom()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn parse_expr_atom(&mut self) -> Result<Expr, SchemaError> {
        match self.next() {
            Some(Tok::Num(value)) => Ok(Expr::Const(value)),
            Some(Tok::Ident(name)) => {
                if self.peek() == Some(&Tok::Dot) {
                    self.next();
                    match self.next() {
                        Some(Tok::Num(index)) if (0..128).contains(&index) => Ok(Expr::Bit {
                            var: name,
                            index: index as u32,
                        }),
                        _ => {
                            self.pos -= 1;
                            self.fail("expected a bit index after `.`")
                        }
                    }
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some(Tok::LParen) => {
                let e = self.parse_expr()?;
                self.expect(Tok::RParen, "`)`")?;
                Ok(e)
            }
            Some(tok) => {
                self.pos -= 1;
                self.fail(format!("expected an expression, found {:?}", tok))
            }
            None => self.fail("expected an expression, found end of input"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse_one(source: &str) -> Declaration {
        let ast = parse(source).unwrap();
        assert_eq!(ast.declarations.len(), 1);
        ast.declarations.into_iter().next().unwrap()
    }

    #[test]
    fn tags_parse_in_both_radixes() {
        let d = parse_one("a$101 = A;");
        assert_eq!(d.tag, Some(TagAst { bits: 3, value: 5 }));
        let d = parse_one("b#0f = B;");
        assert_eq!(d.tag, Some(TagAst { bits: 8, value: 15 }));
        let d = parse_one("c$_ = C;");
        assert_eq!(d.tag, None);
        let d = parse_one("d = D;");
        assert_eq!(d.tag, None);
    }

    #[test]
    fn width_shorthand_and_dependent_width() {
        let d = parse_one("x$_ n:#5 v:(## n) = X;");
        assert_eq!(d.items.len(), 2);
        match &d.items[0] {
            Item::Field(f) => {
                assert_eq!(f.name.as_deref(), Some("n"));
                assert_eq!(f.ty, TypeExprAst::Width(Expr::Const(5)));
            }
            other => panic!("unexpected item {:?}", other),
        }
        match &d.items[1] {
            Item::Field(f) => {
                assert_eq!(f.ty, TypeExprAst::Width(Expr::Var("n".into())));
            }
            other => panic!("unexpected item {:?}", other),
        }
    }

    #[test]
    fn guards_and_implicits_are_distinguished() {
        let d = parse_one("pair {n:#} {n + 1 = 3} m:#8 = Pair n;");
        assert!(matches!(
            d.items[0],
            Item::Implicit {
                ref name,
                is_type: false
            } if name == "n"
        ));
        assert!(matches!(d.items[1], Item::Guard(_)));
        assert_eq!(d.result_args.len(), 1);
    }

    #[test]
    fn conditional_fields() {
        let d = parse_one("msg has:Bool body:has?(^Cell) = Msg;");
        match &d.items[1] {
            Item::Field(f) => match &f.ty {
                TypeExprAst::Cond { cond, item } => {
                    assert_eq!(*cond, Expr::Var("has".into()));
                    assert!(matches!(**item, TypeExprAst::Ref(_)));
                }
                other => panic!("unexpected type {:?}", other),
            },
            other => panic!("unexpected item {:?}", other),
        }
    }

    #[test]
    fn bit_selected_condition() {
        let d = parse_one("opt flags:#8 extra:flags.2?(## 16) = Opt;");
        match &d.items[1] {
            Item::Field(f) => match &f.ty {
                TypeExprAst::Cond { cond, .. } => {
                    assert_eq!(
                        *cond,
                        Expr::Bit {
                            var: "flags".into(),
                            index: 2
                        }
                    );
                }
                other => panic!("unexpected type {:?}", other),
            },
            other => panic!("unexpected item {:?}", other),
        }
    }

    #[test]
    fn cell_groups_nest_fields() {
        let d = parse_one("wrap head:#8 tail:^[ a:#8 b:#8 ] = Wrap;");
        match &d.items[1] {
            Item::Group { name, items } => {
                assert_eq!(name.as_deref(), Some("tail"));
                assert_eq!(items.len(), 2);
            }
            other => panic!("unexpected item {:?}", other),
        }
    }

    #[test]
    fn application_with_arguments() {
        let d = parse_one("cfg m:(HashmapE 8 ^Cell) = Cfg;");
        match &d.items[0] {
            Item::Field(f) => match &f.ty {
                TypeExprAst::Apply { name, args } => {
                    assert_eq!(name, "HashmapE");
                    assert_eq!(args.len(), 2);
                    assert_eq!(args[0], TypeExprAst::NatExpr(Expr::Const(8)));
                    assert!(matches!(args[1], TypeExprAst::Ref(_)));
                }
                other => panic!("unexpected type {:?}", other),
            },
            other => panic!("unexpected item {:?}", other),
        }
    }

    #[test]
    fn repetition_inside_parentheses() {
        let d = parse_one("arr v:(3 * uint8) = Arr;");
        match &d.items[0] {
            Item::Field(f) => match &f.ty {
                TypeExprAst::Repeat { times, item } => {
                    assert_eq!(*times, Expr::Const(3));
                    assert!(
                        matches!(&**item, TypeExprAst::Apply { name, .. } if name == "uint8")
                    );
                }
                other => panic!("unexpected type {:?}", other),
            },
            other => panic!("unexpected item {:?}", other),
        }
    }

    #[test]
    fn errors_carry_positions() {
        let err = parse("a$2 = A;").unwrap_err();
        match err {
            SchemaError::Parse { line, .. } => assert_eq!(line, 1),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
