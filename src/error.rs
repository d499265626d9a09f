use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Result type alias for JSON statement operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`DatabaseWrapper`](crate::DatabaseWrapper).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
   /// Error from the connection manager.
   #[error(transparent)]
   ConnectionManager(#[from] sqlite_conn_mgr::Error),

   /// Multiple rows returned from a `fetch_one` query.
   #[error("fetch_one() query returned {0} rows, expected 0 or 1")]
   MultipleRowsReturned(usize),
}

impl Error {
   /// Extract a structured error code from the error type.
   ///
   /// Connection manager errors keep their own code so callers can tell an
   /// open failure from a failed statement.
   pub fn error_code(&self) -> &'static str {
      match self {
         Error::ConnectionManager(err) => err.error_code(),
         Error::MultipleRowsReturned(_) => "MULTIPLE_ROWS_RETURNED",
      }
   }
}

/// Serialized as `{ "code": ..., "message": ... }`.
impl Serialize for Error {
   fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
   where
      S: Serializer,
   {
      let mut state = serializer.serialize_struct("Error", 2)?;
      state.serialize_field("code", self.error_code())?;
      state.serialize_field("message", &self.to_string())?;
      state.end()
   }
}
