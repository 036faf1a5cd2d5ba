//! Predicate-expression evaluator for `Arbor::select`.
//!
//! A tiny hand-rolled grammar, grounded in `arbor.py::select_halos`'s
//! criteria strings and the design note's explicit operator set: field
//! access `tree[scope, name]`, unit conversion `.to("unit")`, comparisons
//! `(==, !=, <, <=, >, >=)`, and boolean combinators `(&, |, ~)`. Compiled
//! once into an `Expr` tree, then evaluated per root against that root's own
//! scope array — never shelled out to a host-language `eval`.

use crate::node::{Scope, TreeNode};
use arbor_error::{Error, Result};
use arbor_units::{Unit, UnitArray, UnitRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
enum Expr {
    Field { scope: Scope, name: String },
    Number(f64),
    Convert { inner: Box<Expr>, unit: String },
    Compare { left: Box<Expr>, op: CompareOp, right: Box<Expr> },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

/// A value produced while evaluating a compiled predicate.
enum Value {
    Array(UnitArray),
    Scalar(f64),
    Mask(Vec<bool>),
}

impl Value {
    fn into_array(self) -> Result<Vec<f64>> {
        match self {
            Value::Array(array) => Ok(array.values),
            Value::Scalar(v) => Ok(vec![v]),
            Value::Mask(_) => Err(Error::syntax_error("expected a numeric value, found a boolean mask")),
        }
    }

    fn into_mask(self) -> Result<Vec<bool>> {
        match self {
            Value::Mask(mask) => Ok(mask),
            _ => Err(Error::syntax_error("expected a boolean mask, found a numeric value")),
        }
    }
}

/// A compiled predicate, ready to evaluate against any root.
pub struct Predicate {
    expr: Expr,
}

impl Predicate {
    /// Parse `source` into a compiled predicate. Done once per `select` call.
    pub fn compile(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens: &tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(Error::syntax_error(format!("unexpected trailing input in '{source}'")));
        }
        Ok(Predicate { expr })
    }

    /// Evaluate this predicate against `root`'s own field arrays, returning
    /// one boolean per element of whichever scope array the predicate's
    /// field accesses named.
    pub fn evaluate(&self, root: TreeNode<'_>, unit_registry: &UnitRegistry) -> Result<Vec<bool>> {
        eval(&self.expr, root, unit_registry)?.into_mask()
    }
}

fn eval(expr: &Expr, root: TreeNode<'_>, registry: &UnitRegistry) -> Result<Value> {
    match expr {
        Expr::Field { scope, name } => Ok(Value::Array(root.field_along(*scope, name)?)),
        Expr::Number(n) => Ok(Value::Scalar(*n)),
        Expr::Convert { inner, unit } => {
            let value = eval(inner, root, registry)?;
            let array = match value {
                Value::Array(array) => array,
                Value::Scalar(v) => UnitArray::new(vec![v], Unit::dimensionless()),
                Value::Mask(_) => return Err(Error::syntax_error("cannot convert units of a boolean mask")),
            };
            Ok(Value::Array(array.convert_to(unit, registry)?))
        }
        Expr::Compare { left, op, right } => {
            let left = eval(left, root, registry)?.into_array()?;
            let right = eval(right, root, registry)?.into_array()?;
            compare(&left, *op, &right).map(Value::Mask)
        }
        Expr::And(left, right) => {
            let left = eval(left, root, registry)?.into_mask()?;
            let right = eval(right, root, registry)?.into_mask()?;
            combine(&left, &right, |a, b| a && b).map(Value::Mask)
        }
        Expr::Or(left, right) => {
            let left = eval(left, root, registry)?.into_mask()?;
            let right = eval(right, root, registry)?.into_mask()?;
            combine(&left, &right, |a, b| a || b).map(Value::Mask)
        }
        Expr::Not(inner) => {
            let mask = eval(inner, root, registry)?.into_mask()?;
            Ok(Value::Mask(mask.into_iter().map(|b| !b).collect()))
        }
    }
}

fn broadcast<'a>(left: &'a [f64], right: &'a [f64]) -> Result<(usize, Box<dyn Fn(usize) -> f64 + 'a>, Box<dyn Fn(usize) -> f64 + 'a>)> {
    match (left.len(), right.len()) {
        (l, r) if l == r => Ok((l, Box::new(move |i| left[i]), Box::new(move |i| right[i]))),
        (1, r) => Ok((r, Box::new(move |_| left[0]), Box::new(move |i| right[i]))),
        (l, 1) => Ok((l, Box::new(move |i| left[i]), Box::new(move |_| right[0]))),
        (l, r) => Err(Error::syntax_error(format!("cannot compare arrays of length {l} and {r}"))),
    }
}

fn compare(left: &[f64], op: CompareOp, right: &[f64]) -> Result<Vec<bool>> {
    let (len, lhs, rhs) = broadcast(left, right)?;
    let test: fn(f64, f64) -> bool = match op {
        CompareOp::Eq => |a, b| a == b,
        CompareOp::Ne => |a, b| a != b,
        CompareOp::Lt => |a, b| a < b,
        CompareOp::Le => |a, b| a <= b,
        CompareOp::Gt => |a, b| a > b,
        CompareOp::Ge => |a, b| a >= b,
    };
    Ok((0..len).map(|i| test(lhs(i), rhs(i))).collect())
}

fn combine(left: &[bool], right: &[bool], f: impl Fn(bool, bool) -> bool) -> Result<Vec<bool>> {
    if left.len() != right.len() {
        return Err(Error::syntax_error(format!(
            "cannot combine boolean masks of length {} and {}",
            left.len(),
            right.len()
        )));
    }
    Ok(left.iter().zip(right).map(|(&a, &b)| f(a, b)).collect())
}

// --- tokenizer -------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Dot,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '&' => {
                tokens.push(Token::And);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Or);
                i += 1;
            }
            '~' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j] != quote {
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(Error::syntax_error(format!("unterminated string in '{source}'")));
                }
                tokens.push(Token::Str(chars[start..j].iter().collect()));
                i = j + 1;
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_digit() || chars[i] == '.' || chars[i] == 'e' || chars[i] == 'E' || chars[i] == '+' || chars[i] == '-')
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let num = text.parse::<f64>().map_err(|_| Error::syntax_error(format!("bad number '{text}'")))?;
                tokens.push(Token::Num(num));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(Error::syntax_error(format!("unexpected character '{other}' in '{source}'"))),
        }
    }
    Ok(tokens)
}

// --- recursive-descent parser ----------------------------------------------

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.peek() == Some(token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(Error::syntax_error(format!("expected {token:?}, found {:?}", self.peek())))
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr> {
        let left = self.parse_postfix()?;
        let op = match self.peek() {
            Some(Token::Eq) => Some(CompareOp::Eq),
            Some(Token::Ne) => Some(CompareOp::Ne),
            Some(Token::Lt) => Some(CompareOp::Lt),
            Some(Token::Le) => Some(CompareOp::Le),
            Some(Token::Gt) => Some(CompareOp::Gt),
            Some(Token::Ge) => Some(CompareOp::Ge),
            _ => None,
        };
        match op {
            Some(op) => {
                self.pos += 1;
                let right = self.parse_postfix()?;
                Ok(Expr::Compare { left: Box::new(left), op, right: Box::new(right) })
            }
            None => Ok(left),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            match self.advance().cloned() {
                Some(Token::Ident(name)) if name == "to" => {}
                other => return Err(Error::syntax_error(format!("expected '.to(...)', found {other:?}"))),
            }
            self.expect(&Token::LParen)?;
            let unit = match self.advance().cloned() {
                Some(Token::Str(s)) => s,
                other => return Err(Error::syntax_error(format!("expected a unit string, found {other:?}"))),
            };
            self.expect(&Token::RParen)?;
            expr = Expr::Convert { inner: Box::new(expr), unit };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance().cloned() {
            Some(Token::Num(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) if name == "tree" => {
                self.expect(&Token::LBracket)?;
                let scope = match self.advance().cloned() {
                    Some(Token::Str(s)) => Scope::parse(&s)?,
                    other => return Err(Error::syntax_error(format!("expected a scope string, found {other:?}"))),
                };
                self.expect(&Token::Comma)?;
                let name = match self.advance().cloned() {
                    Some(Token::Str(s)) => s,
                    other => return Err(Error::syntax_error(format!("expected a field name string, found {other:?}"))),
                };
                self.expect(&Token::RBracket)?;
                Ok(Expr::Field { scope, name })
            }
            other => Err(Error::syntax_error(format!("unexpected token {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_a_simple_predicate() {
        let tokens = tokenize(r#"tree["tree", "mass"] > 1e10"#).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("tree".to_string()),
                Token::LBracket,
                Token::Str("tree".to_string()),
                Token::Comma,
                Token::Str("mass".to_string()),
                Token::RBracket,
                Token::Gt,
                Token::Num(1e10),
            ]
        );
    }

    #[test]
    fn compiles_field_comparison() {
        let predicate = Predicate::compile(r#"tree["tree", "Orig_halo_ID"] == 0"#).unwrap();
        match predicate.expr {
            Expr::Compare { op: CompareOp::Eq, .. } => {}
            _ => panic!("expected a comparison"),
        }
    }

    #[test]
    fn compiles_conjunction_with_conversion_and_parens() {
        let predicate =
            Predicate::compile(r#"(tree["forest", "mass"].to("Msun") > 1e13) & (tree["tree", "redshift"] < 0.5)"#)
                .unwrap();
        match predicate.expr {
            Expr::And(_, _) => {}
            _ => panic!("expected a conjunction"),
        }
    }

    #[test]
    fn rejects_unknown_scope_string() {
        assert!(Predicate::compile(r#"tree["flock", "mass"] > 1"#).is_err());
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(Predicate::compile(r#"tree["tree", "mass"] > 1 extra"#).is_err());
    }

    #[test]
    fn compare_broadcasts_scalar_against_array() {
        let mask = compare(&[1.0, 2.0, 3.0], CompareOp::Gt, &[2.0]).unwrap();
        assert_eq!(mask, vec![false, false, true]);
    }

    #[test]
    fn compare_rejects_mismatched_array_lengths() {
        assert!(compare(&[1.0, 2.0], CompareOp::Eq, &[1.0, 2.0, 3.0]).is_err());
    }
}
