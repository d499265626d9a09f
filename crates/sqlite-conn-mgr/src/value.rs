//! Scalar values exchanged with SQLite, and conversions to and from Rust types

use std::fmt;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::{Error, Result};

/// A single SQLite value, as bound to a statement or read from a result column.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
   Null,
   Integer(i64),
   Real(f64),
   Text(String),
   Blob(Vec<u8>),
}

impl Value {
   pub fn is_null(&self) -> bool {
      matches!(self, Value::Null)
   }

   /// Convert this value into `T`.
   pub fn get<T: ValueConvertible>(self) -> Result<T> {
      T::from_value(self)
   }

   /// Name of the SQLite storage class of this value.
   pub fn type_name(&self) -> &'static str {
      match self {
         Value::Null => "NULL",
         Value::Integer(_) => "INTEGER",
         Value::Real(_) => "REAL",
         Value::Text(_) => "TEXT",
         Value::Blob(_) => "BLOB",
      }
   }
}

impl fmt::Display for Value {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         Value::Null => f.write_str("NULL"),
         Value::Integer(integer) => write!(f, "{integer}"),
         Value::Real(real) => write!(f, "{real}"),
         Value::Text(text) => write!(f, "'{text}'"),
         Value::Blob(blob) => write!(f, "<blob: {} bytes>", blob.len()),
      }
   }
}

/// A type that can be converted to and from a [`Value`].
///
/// `Option<T>` is convertible whenever `T` is: `None` maps to `NULL`, and
/// `NULL` maps back to `None`.
pub trait ValueConvertible: Sized {
   fn to_value(&self) -> Value;
   fn from_value(value: Value) -> Result<Self>;
}

fn unexpected<T>(value: Value, expected: &'static str) -> Result<T> {
   Err(Error::UnexpectedValueType { value, expected })
}

impl ValueConvertible for Value {
   fn to_value(&self) -> Value {
      self.clone()
   }

   fn from_value(value: Value) -> Result<Self> {
      Ok(value)
   }
}

impl<T: ValueConvertible> ValueConvertible for Option<T> {
   fn to_value(&self) -> Value {
      match self {
         Some(inner) => inner.to_value(),
         None => Value::Null,
      }
   }

   fn from_value(value: Value) -> Result<Self> {
      match value {
         Value::Null => Ok(None),
         other => T::from_value(other).map(Some),
      }
   }
}

impl ValueConvertible for i64 {
   fn to_value(&self) -> Value {
      Value::Integer(*self)
   }

   fn from_value(value: Value) -> Result<Self> {
      match value {
         Value::Integer(integer) => Ok(integer),
         other => unexpected(other, "i64"),
      }
   }
}

impl ValueConvertible for i32 {
   fn to_value(&self) -> Value {
      Value::Integer(i64::from(*self))
   }

   fn from_value(value: Value) -> Result<Self> {
      match value {
         Value::Integer(integer) => match i32::try_from(integer) {
            Ok(narrowed) => Ok(narrowed),
            Err(_) => unexpected(Value::Integer(integer), "i32"),
         },
         other => unexpected(other, "i32"),
      }
   }
}

impl ValueConvertible for u32 {
   fn to_value(&self) -> Value {
      Value::Integer(i64::from(*self))
   }

   fn from_value(value: Value) -> Result<Self> {
      match value {
         Value::Integer(integer) => match u32::try_from(integer) {
            Ok(narrowed) => Ok(narrowed),
            Err(_) => unexpected(Value::Integer(integer), "u32"),
         },
         other => unexpected(other, "u32"),
      }
   }
}

impl ValueConvertible for f64 {
   fn to_value(&self) -> Value {
      Value::Real(*self)
   }

   fn from_value(value: Value) -> Result<Self> {
      match value {
         Value::Real(real) => Ok(real),
         other => unexpected(other, "f64"),
      }
   }
}

/// Booleans are stored as the integers 0 and 1.
impl ValueConvertible for bool {
   fn to_value(&self) -> Value {
      Value::Integer(i64::from(*self))
   }

   fn from_value(value: Value) -> Result<Self> {
      match value {
         Value::Integer(0) => Ok(false),
         Value::Integer(1) => Ok(true),
         other => unexpected(other, "bool"),
      }
   }
}

impl ValueConvertible for String {
   fn to_value(&self) -> Value {
      Value::Text(self.clone())
   }

   fn from_value(value: Value) -> Result<Self> {
      match value {
         Value::Text(text) => Ok(text),
         other => unexpected(other, "String"),
      }
   }
}

impl ValueConvertible for Vec<u8> {
   fn to_value(&self) -> Value {
      Value::Blob(self.clone())
   }

   fn from_value(value: Value) -> Result<Self> {
      match value {
         Value::Blob(blob) => Ok(blob),
         other => unexpected(other, "Vec<u8>"),
      }
   }
}

/// Timestamps are stored as RFC 3339 text.
///
/// RFC 3339 only covers the years 0 through 9999; a timestamp outside that
/// range converts to `NULL`.
impl ValueConvertible for OffsetDateTime {
   fn to_value(&self) -> Value {
      match self.format(&Rfc3339) {
         Ok(text) => Value::Text(text),
         // Only years outside 0..=9999 cannot be represented in RFC 3339
         Err(_) => Value::Null,
      }
   }

   fn from_value(value: Value) -> Result<Self> {
      match value {
         Value::Text(text) => match OffsetDateTime::parse(&text, &Rfc3339) {
            Ok(timestamp) => Ok(timestamp),
            Err(_) => unexpected(Value::Text(text), "OffsetDateTime"),
         },
         other => unexpected(other, "OffsetDateTime"),
      }
   }
}

impl<T: ValueConvertible> From<Option<T>> for Value {
   fn from(value: Option<T>) -> Self {
      value.to_value()
   }
}

macro_rules! value_from {
   ($($source:ty => $variant:ident),* $(,)?) => {
      $(
         impl From<$source> for Value {
            fn from(value: $source) -> Self {
               Value::$variant(value.into())
            }
         }
      )*
   };
}

value_from! {
   i64 => Integer,
   i32 => Integer,
   u32 => Integer,
   f64 => Real,
   String => Text,
   &str => Text,
   Vec<u8> => Blob,
   &[u8] => Blob,
}

impl From<bool> for Value {
   fn from(value: bool) -> Self {
      value.to_value()
   }
}

impl From<OffsetDateTime> for Value {
   fn from(value: OffsetDateTime) -> Self {
      value.to_value()
   }
}
