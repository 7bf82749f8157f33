use std::{
    fmt::{Debug, Display},
    ops::Range,
};

use stork_syntax::op::BinOp;

use crate::{error::ErrorMsg, error::Exception, host::Sandbox};

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    Null,
}

/// Canonical text form, used for concatenation and substitution
impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&match self {
            Self::Int(n) => n.to_string(),
            Self::Float(n) => float_to_string(*n),
            Self::Str(s) => s.to_owned(),
            Self::Array(values) => format!(
                "[{}]",
                values
                    .iter()
                    .map(Value::repr)
                    .collect::<Vec<String>>()
                    .join(", ")
            ),
            Self::Null => "None".to_string(),
        })
    }
}

fn float_to_string(n: f64) -> String {
    if n.is_nan() {
        "nan".to_string()
    } else if n.is_infinite() {
        let inf = if n > 0.0 { "inf" } else { "-inf" };
        inf.to_string()
    } else if n != 0.0 && !(1e-4..1e16).contains(&n.abs()) {
        // Exponent form with a sign and at least two exponent digits, e.g. `1e+16`
        let text = format!("{n:e}");
        let (mantissa, exponent) = text.split_once('e').unwrap_or((&text, "0"));
        let (sign, digits) = match exponent.strip_prefix('-') {
            Some(digits) => ('-', digits),
            None => ('+', exponent),
        };
        format!("{mantissa}e{sign}{digits:0>2}")
    } else if n.fract() == 0.0 {
        format!("{n:.1}")
    } else {
        n.to_string()
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Array(_) => "array",
            Self::Null => "none",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Int(n) => *n != 0,
            Self::Float(n) => *n != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Array(values) => !values.is_empty(),
            Self::Null => false,
        }
    }

    /// Like the canonical form, except strings become quoted
    /// literals that the host sandbox reads back verbatim.
    pub fn repr(&self) -> String {
        let Self::Str(s) = self else {
            return self.to_string();
        };
        let mut out = String::with_capacity(s.len() + 2);
        out.push('\'');
        for c in s.chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '\'' => out.push_str("\\'"),
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                '\r' => out.push_str("\\r"),
                _ => out.push(c),
            }
        }
        out.push('\'');
        out
    }

    /// Equality where ints and floats compare by numeric value
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Int(m), Self::Float(n)) | (Self::Float(n), Self::Int(m)) => *m as f64 == *n,
            (Self::Array(m), Self::Array(n)) => {
                m.len() == n.len() && m.iter().zip(n).all(|(a, b)| a.loose_eq(b))
            }
            _ => self == other,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Applies a binary operator with the host's native semantics:
    /// `/` is true division, `//` and `%` floor towards negative
    /// infinity, and sequences repeat under `*`.
    pub fn binary(&self, op: BinOp, rhs: &Value) -> Result<Value, ErrorMsg> {
        match (self, rhs) {
            (Self::Int(l), Self::Int(r)) => int_op(op, *l, *r),
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                match (self.as_f64(), rhs.as_f64()) {
                    (Some(l), Some(r)) => float_op(op, l, r),
                    _ => Err(ErrorMsg::UnsupportedOperands),
                }
            }
            (_, _) if op == BinOp::EqualEqual => Ok(bool_value(self.loose_eq(rhs))),
            (_, _) if op == BinOp::BangEqual => Ok(bool_value(!self.loose_eq(rhs))),
            (Self::Str(l), Self::Str(r)) => match op {
                BinOp::Plus => Ok(Self::Str(l.clone() + r)),
                BinOp::Less => Ok(bool_value(l < r)),
                BinOp::LessEqual => Ok(bool_value(l <= r)),
                BinOp::Greater => Ok(bool_value(l > r)),
                BinOp::GreaterEqual => Ok(bool_value(l >= r)),
                _ => Err(ErrorMsg::UnsupportedOperands),
            },
            (Self::Array(l), Self::Array(r)) if op == BinOp::Plus => {
                Ok(Self::Array(l.iter().chain(r).cloned().collect()))
            }
            (Self::Str(s), Self::Int(n)) | (Self::Int(n), Self::Str(s)) if op == BinOp::Star => {
                Ok(Self::Str(s.repeat(repeat_count(*n))))
            }
            (Self::Array(a), Self::Int(n)) | (Self::Int(n), Self::Array(a))
                if op == BinOp::Star =>
            {
                Ok(Self::Array(
                    std::iter::repeat(a.iter().cloned())
                        .take(repeat_count(*n))
                        .flatten()
                        .collect(),
                ))
            }
            _ => Err(ErrorMsg::UnsupportedOperands),
        }
    }
}

fn bool_value(b: bool) -> Value {
    Value::Int(i64::from(b))
}

fn repeat_count(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

fn int_op(op: BinOp, l: i64, r: i64) -> Result<Value, ErrorMsg> {
    if r == 0 && matches!(op, BinOp::Slash | BinOp::FloorSlash | BinOp::Modulo) {
        return Err(ErrorMsg::DivisionByZero);
    }
    let n = match op {
        BinOp::Plus => l.checked_add(r),
        BinOp::Minus => l.checked_sub(r),
        BinOp::Star => l.checked_mul(r),
        BinOp::Slash => return Ok(Value::Float(l as f64 / r as f64)),
        BinOp::FloorSlash => l.checked_div(r).map(|q| {
            if l % r != 0 && (l < 0) != (r < 0) {
                q - 1
            } else {
                q
            }
        }),
        BinOp::Modulo => l.checked_rem(r).map(|m| {
            if m != 0 && (m < 0) != (r < 0) {
                m + r
            } else {
                m
            }
        }),
        BinOp::EqualEqual => return Ok(bool_value(l == r)),
        BinOp::BangEqual => return Ok(bool_value(l != r)),
        BinOp::Greater => return Ok(bool_value(l > r)),
        BinOp::GreaterEqual => return Ok(bool_value(l >= r)),
        BinOp::Less => return Ok(bool_value(l < r)),
        BinOp::LessEqual => return Ok(bool_value(l <= r)),
    };
    n.map(Value::Int).ok_or(ErrorMsg::IntegerOverflow)
}

fn float_op(op: BinOp, l: f64, r: f64) -> Result<Value, ErrorMsg> {
    if r == 0.0 && matches!(op, BinOp::Slash | BinOp::FloorSlash | BinOp::Modulo) {
        return Err(ErrorMsg::DivisionByZero);
    }
    Ok(match op {
        BinOp::Plus => Value::Float(l + r),
        BinOp::Minus => Value::Float(l - r),
        BinOp::Star => Value::Float(l * r),
        BinOp::Slash => Value::Float(l / r),
        BinOp::FloorSlash => Value::Float((l / r).floor()),
        BinOp::Modulo => {
            let m = l % r;
            Value::Float(if m != 0.0 && (m < 0.0) != (r < 0.0) {
                m + r
            } else {
                m
            })
        }
        BinOp::EqualEqual => bool_value(l == r),
        BinOp::BangEqual => bool_value(l != r),
        BinOp::Greater => bool_value(l > r),
        BinOp::GreaterEqual => bool_value(l >= r),
        BinOp::Less => bool_value(l < r),
        BinOp::LessEqual => bool_value(l <= r),
    })
}

/// A user-defined function. The body is never stored as
/// anything but the token positions it occupies.
#[derive(Clone, Debug, PartialEq)]
pub struct Func {
    pub name: String,
    pub params: Vec<String>,
    pub body: Range<usize>,
}

impl Display for Func {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format!("fn {}({})", self.name, self.params.join(" ")))
    }
}

/// A function the host sandbox can call by name.
/// `arity` is `None` for variadic functions.
#[derive(Clone)]
pub struct NativeFunc {
    pub name: String,
    pub arity: Option<usize>,
    pub body: fn(&mut Sandbox, Vec<Value>) -> Result<Value, Exception>,
}

impl PartialEq for NativeFunc {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.arity == other.arity
    }
}

impl Debug for NativeFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFunc")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

impl Display for NativeFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format!("native fn {}", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::Str(v.to_string())
    }

    #[test]
    fn canonical_text() {
        assert_eq!(Value::Int(-3).to_string(), "-3");
        assert_eq!(Value::Float(3.0).to_string(), "3.0");
        assert_eq!(Value::Float(0.5).to_string(), "0.5");
        assert_eq!(s("hi").to_string(), "hi");
        assert_eq!(
            Value::Array(vec![Value::Int(1), s("a"), Value::Array(vec![])]).to_string(),
            "[1, 'a', []]"
        );
        assert_eq!(Value::Null.to_string(), "None");
    }

    #[test]
    fn float_exponents() {
        assert_eq!(Value::Float(1e15).to_string(), "1000000000000000.0");
        assert_eq!(Value::Float(1e16).to_string(), "1e+16");
        assert_eq!(Value::Float(-1.5e300).to_string(), "-1.5e+300");
        assert_eq!(Value::Float(0.0001).to_string(), "0.0001");
        assert_eq!(Value::Float(0.000025).to_string(), "2.5e-05");
        assert_eq!(Value::Float(0.0).to_string(), "0.0");
    }

    #[test]
    fn repr_escapes_quotes() {
        assert_eq!(s("it's").repr(), r"'it\'s'");
        assert_eq!(s(r"a\b").repr(), r"'a\\b'");
        assert_eq!(Value::Int(5).repr(), "5");
    }

    #[test]
    fn truthiness() {
        for falsy in [Value::Int(0), Value::Float(0.0), s(""), Value::Array(vec![]), Value::Null] {
            assert!(!falsy.is_truthy(), "{falsy:?} should be falsy");
        }
        for truthy in [Value::Int(-1), Value::Float(0.1), s("0"), Value::Array(vec![Value::Int(0)])] {
            assert!(truthy.is_truthy(), "{truthy:?} should be truthy");
        }
    }

    #[test]
    fn integer_arithmetic() {
        assert_eq!(Value::Int(1).binary(BinOp::Plus, &Value::Int(2)), Ok(Value::Int(3)));
        assert_eq!(Value::Int(7).binary(BinOp::Slash, &Value::Int(2)), Ok(Value::Float(3.5)));
        assert_eq!(Value::Int(-7).binary(BinOp::FloorSlash, &Value::Int(2)), Ok(Value::Int(-4)));
        assert_eq!(Value::Int(-7).binary(BinOp::Modulo, &Value::Int(3)), Ok(Value::Int(2)));
        assert_eq!(Value::Int(7).binary(BinOp::Modulo, &Value::Int(-3)), Ok(Value::Int(-2)));
        assert!(matches!(
            Value::Int(1).binary(BinOp::Modulo, &Value::Int(0)),
            Err(ErrorMsg::DivisionByZero)
        ));
        assert!(matches!(
            Value::Int(i64::MAX).binary(BinOp::Plus, &Value::Int(1)),
            Err(ErrorMsg::IntegerOverflow)
        ));
    }

    #[test]
    fn mixed_arithmetic() {
        assert_eq!(Value::Int(1).binary(BinOp::Plus, &Value::Float(0.5)), Ok(Value::Float(1.5)));
        assert_eq!(
            Value::Float(-7.5).binary(BinOp::Modulo, &Value::Int(2)),
            Ok(Value::Float(0.5))
        );
        assert_eq!(Value::Int(1).binary(BinOp::EqualEqual, &Value::Float(1.0)), Ok(Value::Int(1)));
    }

    #[test]
    fn sequences() {
        assert_eq!(s("a").binary(BinOp::Plus, &s("b")), Ok(s("ab")));
        assert_eq!(s("ab").binary(BinOp::Star, &Value::Int(2)), Ok(s("abab")));
        assert_eq!(Value::Int(-1).binary(BinOp::Star, &s("ab")), Ok(s("")));
        assert_eq!(
            Value::Array(vec![Value::Int(1)]).binary(BinOp::Star, &Value::Int(2)),
            Ok(Value::Array(vec![Value::Int(1), Value::Int(1)]))
        );
        assert_eq!(s("a").binary(BinOp::Less, &s("b")), Ok(Value::Int(1)));
        assert!(matches!(
            s("a").binary(BinOp::Minus, &s("b")),
            Err(ErrorMsg::UnsupportedOperands)
        ));
        assert!(matches!(
            s("a").binary(BinOp::Plus, &Value::Int(1)),
            Err(ErrorMsg::UnsupportedOperands)
        ));
    }
}
