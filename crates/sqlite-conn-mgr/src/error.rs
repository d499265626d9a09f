//! Error types for sqlite-conn-mgr

use std::path::PathBuf;

use thiserror::Error;

use crate::value::Value;

/// Errors that may occur when working with sqlite-conn-mgr
///
/// Errors are `Clone` so that a failed pool initialization can be handed,
/// unchanged, to every caller that waits on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
   /// The database at `location` could not be opened.
   #[error("failed to open database at {}: {description}", .location.display())]
   Open {
      location: PathBuf,
      description: String,
   },

   /// Preparing or stepping `query` failed.
   #[error("failed to execute `{query}`: {description}")]
   Execute { query: String, description: String },

   /// Binding argument `index` (1-based) of `query` failed.
   #[error("failed to bind argument {index} ({value}) of `{query}`: {description}")]
   ArgumentBind {
      query: String,
      index: usize,
      value: Value,
      description: String,
   },

   /// A result column of `query` could not be read.
   #[error("failed to read column '{column}' of `{query}`")]
   ResultValue { query: String, column: String },

   /// A value could not be converted to the requested Rust type.
   #[error("unexpected {} value {value}, expected {expected}", .value.type_name())]
   UnexpectedValueType { value: Value, expected: &'static str },

   /// A row does not have a column with this name.
   #[error("column '{column}' not found in row")]
   ColumnNotFound { column: String },

   /// The migration list cannot be applied.
   #[error("invalid migration: {0}")]
   InvalidMigration(String),

   /// The execution lane's worker thread is no longer running.
   #[error("execution lane has shut down")]
   LaneClosed,

   /// A job panicked while running on an execution lane.
   #[error("job panicked on execution lane")]
   JobPanicked,

   /// Generic error for failures raised by application code.
   #[error("{0}")]
   Other(String),
}

impl Error {
   /// Extract a structured error code from the error type.
   pub fn error_code(&self) -> &'static str {
      match self {
         Error::Open { .. } => "OPEN_FAILED",
         Error::Execute { .. } => "EXECUTE_FAILED",
         Error::ArgumentBind { .. } => "ARGUMENT_BIND_FAILED",
         Error::ResultValue { .. } => "RESULT_VALUE_FAILED",
         Error::UnexpectedValueType { .. } => "UNEXPECTED_VALUE_TYPE",
         Error::ColumnNotFound { .. } => "COLUMN_NOT_FOUND",
         Error::InvalidMigration(_) => "INVALID_MIGRATION",
         Error::LaneClosed => "LANE_CLOSED",
         Error::JobPanicked => "JOB_PANICKED",
         Error::Other(_) => "ERROR",
      }
   }
}

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_open_error_carries_location() {
      let err = Error::Open {
         location: PathBuf::from("/missing/dir/app.db"),
         description: "SQLite error 14: unable to open database file".into(),
      };
      assert_eq!(err.error_code(), "OPEN_FAILED");
      assert!(err.to_string().contains("/missing/dir/app.db"));
      assert!(err.to_string().contains("SQLite error 14"));
   }

   #[test]
   fn test_bind_error_carries_index_and_value() {
      let err = Error::ArgumentBind {
         query: "INSERT INTO t VALUES (?)".into(),
         index: 2,
         value: Value::Text("bob".into()),
         description: "SQLite error 25: column index out of range".into(),
      };
      assert_eq!(err.error_code(), "ARGUMENT_BIND_FAILED");
      let message = err.to_string();
      assert!(message.contains("argument 2"));
      assert!(message.contains("'bob'"));
      assert!(message.contains("INSERT INTO t"));
   }

   #[test]
   fn test_unexpected_value_type() {
      let err = Error::UnexpectedValueType {
         value: Value::Real(1.5),
         expected: "i64",
      };
      assert_eq!(err.error_code(), "UNEXPECTED_VALUE_TYPE");
      assert_eq!(err.to_string(), "unexpected REAL value 1.5, expected i64");
   }

   #[test]
   fn test_errors_compare_equal_when_cloned() {
      let err = Error::Execute {
         query: "SELEC 1".into(),
         description: "SQLite error 1: near \"SELEC\": syntax error".into(),
      };
      assert_eq!(err.clone(), err);
      assert_eq!(err.error_code(), "EXECUTE_FAILED");
   }

   #[test]
   fn test_error_code_other() {
      let err = Error::Other("something went wrong".into());
      assert_eq!(err.error_code(), "ERROR");
      assert_eq!(err.to_string(), "something went wrong");
   }
}
