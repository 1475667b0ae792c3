use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::ConditionError;
use super::parser::{BinaryOp, CompareOp, Expr, Variable};

/// Runtime value of a condition expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Map(BTreeMap<String, String>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Map(_) => "mapping",
        }
    }

    /// Python truthiness
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            other => other.as_int().map(|i| i as f64),
        }
    }
}

/// Values the four condition variables are bound to
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    pub timespent: f64,
    pub response_code: Option<u16>,
    pub response_body: String,
    pub response_headers: BTreeMap<String, String>,
}

impl Bindings {
    fn lookup(&self, variable: Variable) -> Value {
        match variable {
            Variable::Timespent => Value::Float(self.timespent),
            Variable::ResponseCode => {
                self.response_code.map_or(Value::None, |code| Value::Int(i64::from(code)))
            }
            Variable::ResponseBody => Value::Str(self.response_body.clone()),
            Variable::ResponseHeaders => Value::Map(self.response_headers.clone()),
        }
    }
}

pub(super) fn eval(expr: &Expr, bindings: &Bindings) -> Result<Value, ConditionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Var(variable) => Ok(bindings.lookup(*variable)),
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, bindings)?.is_truthy())),
        Expr::And(lhs, rhs) => {
            let lhs = eval(lhs, bindings)?;
            if lhs.is_truthy() { eval(rhs, bindings) } else { Ok(lhs) }
        }
        Expr::Or(lhs, rhs) => {
            let lhs = eval(lhs, bindings)?;
            if lhs.is_truthy() { Ok(lhs) } else { eval(rhs, bindings) }
        }
        Expr::Neg(inner) => negate(eval(inner, bindings)?),
        Expr::Pos(inner) => match eval(inner, bindings)? {
            Value::Bool(b) => Ok(Value::Int(i64::from(b))),
            value @ (Value::Int(_) | Value::Float(_)) => Ok(value),
            other => Err(type_error("unary +", &other, None)),
        },
        Expr::Compare { first, rest } => {
            let mut lhs = eval(first, bindings)?;
            for (op, operand) in rest {
                let rhs = eval(operand, bindings)?;
                if !compare(*op, &lhs, &rhs)? {
                    return Ok(Value::Bool(false));
                }
                lhs = rhs;
            }
            Ok(Value::Bool(true))
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = eval(lhs, bindings)?;
            let rhs = eval(rhs, bindings)?;
            arithmetic(*op, lhs, rhs)
        }
        Expr::Index { target, key } => {
            let target = eval(target, bindings)?;
            let key = eval(key, bindings)?;
            match (&target, &key) {
                (Value::Map(map), Value::Str(name)) => map
                    .get(name)
                    .map(|value| Value::Str(value.clone()))
                    .ok_or_else(|| ConditionError::KeyError(name.clone())),
                _ => Err(type_error("subscript", &target, Some(&key))),
            }
        }
    }
}

fn type_error(op: &str, lhs: &Value, rhs: Option<&Value>) -> ConditionError {
    match rhs {
        Some(rhs) => ConditionError::TypeError(format!(
            "unsupported operand types for {op}: {} and {}",
            lhs.type_name(),
            rhs.type_name()
        )),
        None => ConditionError::TypeError(format!(
            "unsupported operand type for {op}: {}",
            lhs.type_name()
        )),
    }
}

fn negate(value: Value) -> Result<Value, ConditionError> {
    match value {
        Value::Float(f) => Ok(Value::Float(-f)),
        other => match other.as_int() {
            Some(i) => i.checked_neg().map(Value::Int).ok_or(ConditionError::Overflow),
            None => Err(type_error("unary -", &other, None)),
        },
    }
}

fn equals(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::None, Value::None) => true,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Map(a), Value::Map(b)) => a == b,
        _ => match (lhs.as_int(), rhs.as_int()) {
            (Some(a), Some(b)) => a == b,
            _ => match (lhs.as_float(), rhs.as_float()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        },
    }
}

/// `is`: same kind of value and equal, so `1 is True` stays false
fn identical(lhs: &Value, rhs: &Value) -> bool {
    std::mem::discriminant(lhs) == std::mem::discriminant(rhs) && equals(lhs, rhs)
}

fn ordering(lhs: &Value, rhs: &Value) -> Result<Option<Ordering>, ConditionError> {
    if let (Value::Str(a), Value::Str(b)) = (lhs, rhs) {
        return Ok(Some(a.cmp(b)));
    }
    if let (Some(a), Some(b)) = (lhs.as_int(), rhs.as_int()) {
        return Ok(Some(a.cmp(&b)));
    }
    match (lhs.as_float(), rhs.as_float()) {
        // NaN compares as unordered, every ordering test on it is false
        (Some(a), Some(b)) => Ok(a.partial_cmp(&b)),
        _ => Err(type_error("ordering comparison", lhs, Some(rhs))),
    }
}

fn contains(needle: &Value, haystack: &Value) -> Result<bool, ConditionError> {
    match (needle, haystack) {
        (Value::Str(needle), Value::Str(haystack)) => Ok(haystack.contains(needle.as_str())),
        (Value::Str(key), Value::Map(map)) => Ok(map.contains_key(key)),
        _ => Err(type_error("in", needle, Some(haystack))),
    }
}

fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> Result<bool, ConditionError> {
    let ordered = |test: fn(Ordering) -> bool| -> Result<bool, ConditionError> {
        Ok(ordering(lhs, rhs)?.is_some_and(test))
    };

    match op {
        CompareOp::Eq => Ok(equals(lhs, rhs)),
        CompareOp::NotEq => Ok(!equals(lhs, rhs)),
        CompareOp::Lt => ordered(Ordering::is_lt),
        CompareOp::LtEq => ordered(Ordering::is_le),
        CompareOp::Gt => ordered(Ordering::is_gt),
        CompareOp::GtEq => ordered(Ordering::is_ge),
        CompareOp::In => contains(lhs, rhs),
        CompareOp::NotIn => contains(lhs, rhs).map(|found| !found),
        CompareOp::Is => Ok(identical(lhs, rhs)),
        CompareOp::IsNot => Ok(!identical(lhs, rhs)),
    }
}

fn arithmetic(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, ConditionError> {
    if let (BinaryOp::Add, Value::Str(a), Value::Str(b)) = (op, &lhs, &rhs) {
        return Ok(Value::Str(format!("{a}{b}")));
    }

    let symbol = match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
    };

    if let (Some(a), Some(b)) = (lhs.as_int(), rhs.as_int()) {
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div => {
                if b == 0 {
                    return Err(ConditionError::DivisionByZero);
                }
                return Ok(Value::Float(a as f64 / b as f64));
            }
            BinaryOp::Rem => {
                if b == 0 {
                    return Err(ConditionError::DivisionByZero);
                }
                // Result takes the sign of the divisor
                a.checked_rem(b).map(|r| if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
            }
        };
        return result.map(Value::Int).ok_or(ConditionError::Overflow);
    }

    let (Some(a), Some(b)) = (lhs.as_float(), rhs.as_float()) else {
        return Err(type_error(symbol, &lhs, Some(&rhs)));
    };

    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Rem if b == 0.0 => return Err(ConditionError::DivisionByZero),
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a - b * (a / b).floor(),
    };
    Ok(Value::Float(result))
}
