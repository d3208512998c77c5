//! # Argument Values
//!
//! Purpose: Give command arguments a closed set of wire-encodable shapes so
//! encoding is a total match over variants.
//!
//! ## Design Principles
//! 1. **Closed Union**: Every argument is one `Value` variant; there is no
//!    "anything" escape hatch that could fail late.
//! 2. **Flat Lists**: A `List` expands to one wire block per element and is
//!    never wrapped in a block of its own.
//! 3. **Cheap Construction**: `From` impls let call sites pass plain Rust
//!    values, e.g. `Request::new("setx").arg(key).arg(ttl)`.

use std::fmt;

use bytes::Bytes;

/// One command argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// UTF-8 or binary string, sent verbatim.
    Bytes(Vec<u8>),
    /// Signed integer, rendered in base 10.
    Int(i64),
    /// Floating point, rendered with six fixed decimals.
    Float(f64),
    /// Rendered as `1` or `0`.
    Bool(bool),
    /// Rendered as an empty block.
    Null,
    /// Homogeneous list of scalars, flattened inline at encode time.
    List(Vec<Value>),
}

/// Discriminant of a [`Value`], used in encoding errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bytes,
    Int,
    Float,
    Bool,
    Null,
    List,
}

impl ValueKind {
    /// Stable lowercase name for diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            ValueKind::Bytes => "bytes",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Bool => "bool",
            ValueKind::Null => "null",
            ValueKind::List => "list",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    /// Builds a list value from any iterator of convertible items.
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Returns the variant tag.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Bool(_) => ValueKind::Bool,
            Value::Null => ValueKind::Null,
            Value::List(_) => ValueKind::List,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Bytes(value.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Bytes(value.into_bytes())
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::Bytes(value.as_bytes().to_vec())
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Value {
    fn from(value: &[u8; N]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Value::Bytes(value.to_vec())
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Int(i64::from(value))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(f64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

/// An ordered argument list for one round trip.
///
/// Built per call and consumed by `Connection::send`; never retained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    values: Vec<Value>,
}

impl Request {
    /// Starts a request with the command name as its first argument.
    pub fn new(command: impl Into<Value>) -> Self {
        Request {
            values: vec![command.into()],
        }
    }

    /// Appends one argument (builder style).
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.values.push(value.into());
        self
    }

    /// Appends one argument in place.
    pub fn push(&mut self, value: impl Into<Value>) {
        self.values.push(value.into());
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Command name, when the first argument is a string.
    pub fn command(&self) -> Option<&[u8]> {
        match self.values.first() {
            Some(Value::Bytes(name)) => Some(name.as_slice()),
            _ => None,
        }
    }
}

impl From<Vec<Value>> for Request {
    fn from(values: Vec<Value>) -> Self {
        Request { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_keeps_argument_order() {
        let request = Request::new("setx").arg("key").arg(b"value").arg(30i64);
        assert_eq!(request.command(), Some(&b"setx"[..]));
        assert_eq!(
            request.values(),
            &[
                Value::Bytes(b"setx".to_vec()),
                Value::Bytes(b"key".to_vec()),
                Value::Bytes(b"value".to_vec()),
                Value::Int(30),
            ]
        );
    }

    #[test]
    fn option_maps_none_to_null() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some(7u16)), Value::Int(7));
    }

    #[test]
    fn list_collects_converted_items() {
        let list = Value::list(["a", "b"]);
        assert_eq!(list.kind(), ValueKind::List);
        assert_eq!(
            list,
            Value::List(vec![Value::from("a"), Value::from("b")])
        );
    }
}
