use std::fmt;

use crate::{Callable, Error};

/// A dynamically typed value. Promises store these, callables consume and
/// produce them.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Function(Callable),
    Failure(Error),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Function(_) => "function",
            Value::Failure(_) => "failure",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Value::Failure(_))
    }

    /// Reads this value as the failure reported by a call or a host callback.
    ///
    /// Nil and the host's `"null"` mean no failure. Anything other than a
    /// [`Value::Failure`] keeps only its displayable form.
    pub fn into_failure(self) -> Option<Error> {
        match self {
            Value::Nil => None,
            Value::Str(s) if s == "null" => None,
            Value::Failure(err) => Some(err),
            other => Some(Error::Message(other.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Function(_) => f.write_str("function"),
            Value::Failure(err) => write!(f, "{err}"),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u8 => Int,
    u16 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    String => Str,
    &str => Str,
    Callable => Function,
    Error => Failure,
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Nil
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Nil, Into::into)
    }
}

/// Typed parameters of a wrapped function.
pub trait FromValue: Sized {
    const EXPECTED: &'static str;

    /// Hands the value back when it has the wrong shape.
    fn from_value(value: Value) -> Result<Self, Value>;
}

impl FromValue for Value {
    const EXPECTED: &'static str = "any";

    fn from_value(value: Value) -> Result<Self, Value> {
        Ok(value)
    }
}

macro_rules! impl_from_value {
    ($($ty:ty, $name:literal, $pat:pat => $out:expr;)*) => {
        $(
            impl FromValue for $ty {
                const EXPECTED: &'static str = $name;

                fn from_value(value: Value) -> Result<Self, Value> {
                    match value {
                        $pat => Ok($out),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

impl_from_value! {
    bool, "bool", Value::Bool(b) => b;
    i64, "int", Value::Int(i) => i;
    f64, "float", Value::Float(x) => x;
    String, "string", Value::Str(s) => s;
    Vec<Value>, "list", Value::List(items) => items;
    Callable, "function", Value::Function(f) => f;
    Error, "failure", Value::Failure(err) => err;
}

impl FromValue for i32 {
    const EXPECTED: &'static str = "int";

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Int(i) => i32::try_from(i).map_err(|_| Value::Int(i)),
            other => Err(other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Nil => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Builds an argument list.
///
/// ```
/// use promise_bridge::{values, Value};
/// assert_eq!(values![1, "a"], vec![Value::Int(1), Value::from("a")]);
/// ```
#[macro_export]
macro_rules! values {
    ($($value:expr),* $(,)?) => {
        vec![$($crate::Value::from($value)),*]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_and_null_are_not_failures() {
        assert_eq!(Value::Nil.into_failure(), None);
        assert_eq!(Value::from("null").into_failure(), None);
    }

    #[test]
    fn other_values_keep_their_display_as_failure() {
        assert_eq!(
            Value::from("boom").into_failure(),
            Some(Error::msg("boom"))
        );
        assert_eq!(
            Value::Failure(Error::NotAFunction).into_failure(),
            Some(Error::NotAFunction)
        );
    }

    #[test]
    fn lists_display_their_items() {
        assert_eq!(Value::from(vec![1, 2]).to_string(), "[1, 2]");
        assert_eq!(Value::List(values![1, "two", Value::Nil]).to_string(), "[1, two, null]");
    }

    #[test]
    fn typed_parameters_reject_other_shapes() {
        assert_eq!(i64::from_value(Value::Int(3)), Ok(3));
        assert_eq!(i64::from_value(Value::from("3")), Err(Value::from("3")));
        assert_eq!(Option::<String>::from_value(Value::Nil), Ok(None));
        assert_eq!(i32::from_value(Value::Int(i64::MAX)), Err(Value::Int(i64::MAX)));
    }
}
