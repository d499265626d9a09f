//! Named-column result rows

use std::sync::Arc;

use crate::value::{Value, ValueConvertible};
use crate::{Error, Result};

/// One result row.
///
/// Rows produced by the same statement share a single list of column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
   columns: Arc<[String]>,
   values: Vec<Value>,
}

impl Row {
   pub(crate) fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
      debug_assert_eq!(columns.len(), values.len());
      Self { columns, values }
   }

   /// Column names, in result order.
   pub fn columns(&self) -> &[String] {
      &self.columns
   }

   /// Values, in result order.
   pub fn values(&self) -> &[Value] {
      &self.values
   }

   pub fn into_values(self) -> Vec<Value> {
      self.values
   }

   pub fn len(&self) -> usize {
      self.values.len()
   }

   pub fn is_empty(&self) -> bool {
      self.values.is_empty()
   }

   /// The raw value of the first column called `column`.
   pub fn value(&self, column: &str) -> Result<&Value> {
      self
         .columns
         .iter()
         .position(|name| name == column)
         .map(|index| &self.values[index])
         .ok_or_else(|| Error::ColumnNotFound {
            column: column.to_string(),
         })
   }

   /// Read the column called `column` as `T`.
   pub fn get<T: ValueConvertible>(&self, column: &str) -> Result<T> {
      T::from_value(self.value(column)?.clone())
   }

   /// Read the column at `index` (0-based) as `T`.
   pub fn get_index<T: ValueConvertible>(&self, index: usize) -> Result<T> {
      let value = self.values.get(index).ok_or_else(|| Error::ColumnNotFound {
         column: index.to_string(),
      })?;
      T::from_value(value.clone())
   }

   /// Iterate over `(column, value)` pairs in result order.
   pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
      self
         .columns
         .iter()
         .map(String::as_str)
         .zip(self.values.iter())
   }
}
