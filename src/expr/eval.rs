//! IV-005: Tree-walking interpreter for the expression language.
//!
//! Pure: no I/O, no mutation of the environment, guaranteed
//! termination (the AST is finite and there is no recursion in the
//! language). Any float-typed intermediate or result is fatal.

use crate::core::value::Value;
use crate::errors::InvariantError;
use crate::expr::parser::{parse, BinaryOp, Expr, UnaryOp};
use indexmap::IndexMap;
use num_bigint::BigInt;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::str::FromStr;

/// Variable environment: identifier -> bound value.
pub type VariableEnv = IndexMap<String, Value>;

fn err(msg: String) -> InvariantError {
    InvariantError::Resolution(msg)
}

/// Parse and evaluate an expression against an environment.
pub fn eval(source: &str, env: &VariableEnv) -> Result<Value, InvariantError> {
    let ast = parse(source)?;
    eval_expr(&ast, env)
}

fn eval_expr(expr: &Expr, env: &VariableEnv) -> Result<Value, InvariantError> {
    match expr {
        Expr::Null => Ok(Value::Null),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Int(i) => Ok(Value::Int(i.clone())),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::FloatLit(text) => Err(err(format!(
            "fractional literal '{}' produces a float; use decimal(\"{}\")",
            text, text
        ))),
        Expr::Ident(name) => {
            let value = lookup(name, env)?;
            Ok(collapse_domain_value(value))
        }
        Expr::Field(base, field) => {
            let base_value = eval_base(base, env)?;
            access_field(&base_value, field)
        }
        Expr::Index(base, index) => {
            let base_value = eval_base(base, env)?;
            let index_value = eval_expr(index, env)?;
            access_index(&base_value, &index_value)
        }
        Expr::Unary(op, inner) => {
            let value = eval_expr(inner, env)?;
            match op {
                UnaryOp::Neg => match value {
                    Value::Int(i) => Ok(Value::Int(-i)),
                    Value::Decimal(d) => Ok(Value::Decimal(-d)),
                    other => Err(err(format!("cannot negate {}", other.type_name()))),
                },
                UnaryOp::Not => match value {
                    Value::Bool(b) => Ok(Value::Bool(!b)),
                    other => Err(err(format!("'!' requires Bool, got {}", other.type_name()))),
                },
            }
        }
        Expr::Binary(op, left, right) => eval_binary(*op, left, right, env),
        Expr::Ternary(cond, then_branch, else_branch) => {
            let cond_value = eval_expr(cond, env)?;
            match cond_value {
                Value::Bool(true) => eval_expr(then_branch, env),
                Value::Bool(false) => eval_expr(else_branch, env),
                other => Err(err(format!(
                    "ternary condition must be Bool, got {}",
                    other.type_name()
                ))),
            }
        }
        Expr::Call(name, args) => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval_expr(arg, env)?);
            }
            call_builtin(name, &values)
        }
    }
}

/// Evaluate the base of a field access or index. A bare identifier is
/// looked up raw (no domain-value collapse) so the artifact's own
/// attribute set stays reachable.
fn eval_base(expr: &Expr, env: &VariableEnv) -> Result<Value, InvariantError> {
    match expr {
        Expr::Ident(name) => lookup(name, env),
        other => eval_expr(other, env),
    }
}

fn lookup(name: &str, env: &VariableEnv) -> Result<Value, InvariantError> {
    env.get(name)
        .cloned()
        .ok_or_else(|| err(format!("undefined variable '{}'", name)))
}

/// A bare identifier naming a domain artifact with a distinguished
/// `value` attribute resolves to that attribute. This collapses the
/// common case where an artifact wraps a scalar.
fn collapse_domain_value(value: Value) -> Value {
    if let Value::Domain(d) = &value {
        let attrs = d.attributes();
        if let Some(inner) = attrs.get("value") {
            return inner.clone();
        }
    }
    value
}

fn access_field(base: &Value, field: &str) -> Result<Value, InvariantError> {
    match base {
        Value::Map(map) => map
            .get(field)
            .cloned()
            .ok_or_else(|| err(format!("map has no entry '{}'", field))),
        Value::Domain(d) => d
            .attributes()
            .get(field)
            .cloned()
            .ok_or_else(|| err(format!("{} has no attribute '{}'", d.type_name(), field))),
        other => Err(err(format!(
            "field access '.{}' requires Map or Domain, got {}",
            field,
            other.type_name()
        ))),
    }
}

fn access_index(base: &Value, index: &Value) -> Result<Value, InvariantError> {
    match (base, index) {
        (Value::List(items), Value::Int(i)) => {
            let idx = usize::try_from(i.clone())
                .map_err(|_| err(format!("list index {} out of range", i)))?;
            items
                .get(idx)
                .cloned()
                .ok_or_else(|| err(format!("list index {} out of range (len {})", i, items.len())))
        }
        (Value::Map(map), Value::Str(key)) => map
            .get(key)
            .cloned()
            .ok_or_else(|| err(format!("map has no entry '{}'", key))),
        (base, index) => Err(err(format!(
            "cannot index {} with {}",
            base.type_name(),
            index.type_name()
        ))),
    }
}

enum Num {
    Int(BigInt),
    Dec(Decimal),
}

fn as_num(value: &Value, context: &str) -> Result<Num, InvariantError> {
    match value {
        Value::Int(i) => Ok(Num::Int(i.clone())),
        Value::Decimal(d) => Ok(Num::Dec(*d)),
        other => Err(err(format!(
            "{} requires numeric operands, got {}",
            context,
            other.type_name()
        ))),
    }
}

fn int_to_decimal(i: &BigInt) -> Result<Decimal, InvariantError> {
    Decimal::from_str(&i.to_string())
        .map_err(|_| err(format!("integer {} exceeds decimal range", i)))
}

fn eval_binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    env: &VariableEnv,
) -> Result<Value, InvariantError> {
    // Short-circuit boolean combinators first.
    if op == BinaryOp::And || op == BinaryOp::Or {
        let lhs = eval_expr(left, env)?;
        let lhs_bool = lhs
            .as_bool()
            .ok_or_else(|| err(format!("boolean operator requires Bool, got {}", lhs.type_name())))?;
        if op == BinaryOp::And && !lhs_bool {
            return Ok(Value::Bool(false));
        }
        if op == BinaryOp::Or && lhs_bool {
            return Ok(Value::Bool(true));
        }
        let rhs = eval_expr(right, env)?;
        let rhs_bool = rhs
            .as_bool()
            .ok_or_else(|| err(format!("boolean operator requires Bool, got {}", rhs.type_name())))?;
        return Ok(Value::Bool(rhs_bool));
    }

    let lhs = eval_expr(left, env)?;
    let rhs = eval_expr(right, env)?;

    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare_values(&lhs, &rhs)?;
            let result = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add => {
            if let (Value::Str(a), Value::Str(b)) = (&lhs, &rhs) {
                return Ok(Value::Str(format!("{}{}", a, b)));
            }
            arith(op, &lhs, &rhs)
        }
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => arith(op, &lhs, &rhs),
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

/// Equality: structural, except that Int and Decimal compare by numeric
/// value so `2 == decimal("2")` holds.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(_), Value::Decimal(_)) | (Value::Decimal(_), Value::Int(_)) => {
            matches!(compare_values(a, b), Ok(Ordering::Equal))
        }
        _ => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Result<Ordering, InvariantError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::Decimal(x), Value::Decimal(y)) => Ok(x.cmp(y)),
        (Value::Int(x), Value::Decimal(y)) => Ok(int_to_decimal(x)?.cmp(y)),
        (Value::Decimal(x), Value::Int(y)) => Ok(x.cmp(&int_to_decimal(y)?)),
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Ok(x.cmp(y)),
        (a, b) => Err(err(format!(
            "cannot compare {} with {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn arith(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, InvariantError> {
    let symbol = match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        _ => unreachable!(),
    };
    let context = format!("'{}'", symbol);
    let a = as_num(lhs, &context)?;
    let b = as_num(rhs, &context)?;

    match (a, b) {
        (Num::Int(x), Num::Int(y)) => int_arith(op, &x, &y),
        (a, b) => {
            let x = match a {
                Num::Int(i) => int_to_decimal(&i)?,
                Num::Dec(d) => d,
            };
            let y = match b {
                Num::Int(i) => int_to_decimal(&i)?,
                Num::Dec(d) => d,
            };
            decimal_arith(op, x, y, symbol)
        }
    }
}

fn int_arith(op: BinaryOp, x: &BigInt, y: &BigInt) -> Result<Value, InvariantError> {
    let zero = BigInt::from(0);
    match op {
        BinaryOp::Add => Ok(Value::Int(x + y)),
        BinaryOp::Sub => Ok(Value::Int(x - y)),
        BinaryOp::Mul => Ok(Value::Int(x * y)),
        BinaryOp::Div => {
            if *y == zero {
                return Err(err(format!("division by zero in '{} / {}'", x, y)));
            }
            if x % y != zero {
                return Err(err(format!(
                    "'{} / {}' does not divide evenly and would produce a float; \
                     use decimal(...) for fractional arithmetic",
                    x, y
                )));
            }
            Ok(Value::Int(x / y))
        }
        BinaryOp::Rem => {
            if *y == zero {
                return Err(err(format!("remainder by zero in '{} % {}'", x, y)));
            }
            Ok(Value::Int(x % y))
        }
        _ => unreachable!(),
    }
}

fn decimal_arith(
    op: BinaryOp,
    x: Decimal,
    y: Decimal,
    symbol: &str,
) -> Result<Value, InvariantError> {
    let result = match op {
        BinaryOp::Add => x.checked_add(y),
        BinaryOp::Sub => x.checked_sub(y),
        BinaryOp::Mul => x.checked_mul(y),
        BinaryOp::Div => x.checked_div(y),
        BinaryOp::Rem => x.checked_rem(y),
        _ => unreachable!(),
    };
    result.map(Value::Decimal).ok_or_else(|| {
        err(format!(
            "decimal '{} {} {}' overflowed or divided by zero",
            x, symbol, y
        ))
    })
}

fn call_builtin(name: &str, args: &[Value]) -> Result<Value, InvariantError> {
    match name {
        "decimal" => {
            expect_arity(name, args, 1)?;
            builtin_decimal(&args[0])
        }
        "min" | "max" => {
            expect_arity(name, args, 2)?;
            let ordering = compare_values(&args[0], &args[1])?;
            let take_first = if name == "min" {
                ordering != Ordering::Greater
            } else {
                ordering != Ordering::Less
            };
            Ok(if take_first {
                args[0].clone()
            } else {
                args[1].clone()
            })
        }
        "size" => {
            expect_arity(name, args, 1)?;
            let n = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::List(l) => l.len(),
                Value::Map(m) => m.len(),
                other => {
                    return Err(err(format!(
                        "size() requires Str, List, or Map, got {}",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Int(BigInt::from(n)))
        }
        "contains" | "startsWith" | "endsWith" => {
            expect_arity(name, args, 2)?;
            let (s, needle) = two_strings(name, args)?;
            let result = match name {
                "contains" => s.contains(needle),
                "startsWith" => s.starts_with(needle),
                _ => s.ends_with(needle),
            };
            Ok(Value::Bool(result))
        }
        "matches" => {
            expect_arity(name, args, 2)?;
            let (s, pattern) = two_strings(name, args)?;
            let re = regex::Regex::new(pattern)
                .map_err(|e| err(format!("matches(): invalid pattern '{}': {}", pattern, e)))?;
            Ok(Value::Bool(re.is_match(s)))
        }
        "in" => {
            expect_arity(name, args, 2)?;
            match (&args[0], &args[1]) {
                (needle, Value::List(items)) => {
                    Ok(Value::Bool(items.iter().any(|v| values_equal(v, needle))))
                }
                (Value::Str(key), Value::Map(map)) => Ok(Value::Bool(map.contains_key(key))),
                (a, b) => Err(err(format!(
                    "in() requires (value, List) or (Str, Map), got ({}, {})",
                    a.type_name(),
                    b.type_name()
                ))),
            }
        }
        other => Err(err(format!("unknown function '{}'", other))),
    }
}

fn expect_arity(name: &str, args: &[Value], expected: usize) -> Result<(), InvariantError> {
    if args.len() != expected {
        return Err(err(format!(
            "{}() takes {} argument{}, got {}",
            name,
            expected,
            if expected == 1 { "" } else { "s" },
            args.len()
        )));
    }
    Ok(())
}

fn two_strings<'a>(name: &str, args: &'a [Value]) -> Result<(&'a str, &'a str), InvariantError> {
    match (&args[0], &args[1]) {
        (Value::Str(a), Value::Str(b)) => Ok((a, b)),
        (a, b) => Err(err(format!(
            "{}() requires (Str, Str), got ({}, {})",
            name,
            a.type_name(),
            b.type_name()
        ))),
    }
}

/// Build a decimal from an Int, Str, or Decimal. Fractional values must
/// enter the language through this function.
fn builtin_decimal(value: &Value) -> Result<Value, InvariantError> {
    match value {
        Value::Int(i) => int_to_decimal(i).map(Value::Decimal),
        Value::Decimal(d) => Ok(Value::Decimal(*d)),
        Value::Str(s) => Decimal::from_str(s.trim())
            .map(Value::Decimal)
            .map_err(|_| err(format!("decimal(): invalid decimal literal '{}'", s))),
        other => Err(err(format!(
            "decimal() requires Int, Str, or Decimal, got {}",
            other.type_name()
        ))),
    }
}
