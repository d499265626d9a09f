//! Native SQLite handles and prepared statements
//!
//! A [`NativeHandle`] is opened with `SQLITE_OPEN_NOMUTEX`, so SQLite does no
//! locking of its own. It must only ever be used from one thread at a time,
//! which the execution lane that owns it guarantees.

use std::ffi::{CStr, CString, c_char, c_int, c_uchar};
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::slice;
use std::sync::Arc;
use std::time::Duration;

use libsqlite3_sys as ffi;
use tracing::{debug, trace, warn};

use crate::row::Row;
use crate::value::Value;
use crate::{Error, Result};

/// An open SQLite connection.
///
/// Closed when dropped. Closures passed to [`Connection::run`](crate::Connection::run),
/// [`DatabasePool::read`](crate::DatabasePool::read) and friends receive a
/// `&mut NativeHandle` that is exclusively theirs for the duration of the call.
pub struct NativeHandle {
   db: NonNull<ffi::sqlite3>,
   location: PathBuf,
}

impl NativeHandle {
   /// Open or create the database at `location` for reading and writing.
   pub(crate) fn open(location: &Path) -> Result<Self> {
      let open_error = |description: String| Error::Open {
         location: location.to_path_buf(),
         description,
      };

      let path = location
         .to_str()
         .ok_or_else(|| open_error("path is not valid UTF-8".into()))?;
      let path = CString::new(path).map_err(|_| open_error("path contains a NUL byte".into()))?;

      let flags = ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE | ffi::SQLITE_OPEN_NOMUTEX;
      let mut db: *mut ffi::sqlite3 = ptr::null_mut();

      // SAFETY: `path` is NUL terminated and outlives the call, `db` is a valid
      // out pointer, and a null VFS name selects the default VFS.
      let rc = unsafe { ffi::sqlite3_open_v2(path.as_ptr(), &mut db, flags, ptr::null()) };

      let Some(db) = NonNull::new(db) else {
         // SQLite could not even allocate a handle, so there is nothing to close
         return Err(open_error(describe_code(rc)));
      };

      if rc != ffi::SQLITE_OK {
         let description = describe(db);
         // SAFETY: `db` was returned by sqlite3_open_v2 and has no statements.
         unsafe {
            ffi::sqlite3_close(db.as_ptr());
         }
         return Err(open_error(description));
      }

      debug!(location = %location.display(), "Opened SQLite handle");
      Ok(Self {
         db,
         location: location.to_path_buf(),
      })
   }

   pub fn location(&self) -> &Path {
      &self.location
   }

   /// Execute a single statement, binding `arguments` to positions 1, 2, ...
   ///
   /// Returns every row the statement produces. `query` must hold a single
   /// statement; anything but whitespace or comments after it is rejected
   /// before the statement runs. Use [`execute_batch`](Self::execute_batch) for
   /// scripts.
   pub fn execute(&mut self, query: &str, arguments: &[Value]) -> Result<Vec<Row>> {
      trace!(query, arguments = arguments.len(), "Executing statement");

      let (statement, consumed) = self.prepare(query)?;
      let Some(mut statement) = statement else {
         // Blank or comment-only query
         return Ok(Vec::new());
      };

      let rest = query.get(consumed..).unwrap_or_default();
      if !rest.trim().is_empty() && !matches!(self.prepare(rest), Ok((None, _))) {
         return Err(Error::Execute {
            query: query.to_string(),
            description: "query contains more than one statement; use execute_batch".into(),
         });
      }

      for (offset, argument) in arguments.iter().enumerate() {
         statement.bind(offset + 1, argument)?;
      }

      statement.rows()
   }

   /// Execute a statement and return its first row, if any.
   pub fn query_row(&mut self, query: &str, arguments: &[Value]) -> Result<Option<Row>> {
      Ok(self.execute(query, arguments)?.into_iter().next())
   }

   /// Execute every statement in `script`, in order, discarding any rows.
   pub fn execute_batch(&mut self, script: &str) -> Result<()> {
      let mut remaining = script;

      while !remaining.trim().is_empty() {
         let (statement, consumed) = self.prepare(remaining)?;
         if let Some(mut statement) = statement {
            statement.rows()?;
         }

         match remaining.get(consumed..) {
            Some(rest) if consumed > 0 => remaining = rest,
            _ => break,
         }
      }

      Ok(())
   }

   /// The schema version stored in the database header (`PRAGMA user_version`).
   pub fn user_version(&mut self) -> Result<i64> {
      match self.query_row("PRAGMA user_version", &[])? {
         Some(row) => row.get_index(0),
         None => Ok(0),
      }
   }

   pub(crate) fn set_user_version(&mut self, version: i64) -> Result<()> {
      // PRAGMA arguments cannot be bound
      self.execute(&format!("PRAGMA user_version = {version}"), &[])?;
      Ok(())
   }

   /// Rows modified by the most recent INSERT, UPDATE or DELETE.
   pub fn changes(&self) -> u64 {
      // SAFETY: `self.db` is an open handle.
      let changes = unsafe { ffi::sqlite3_changes(self.db.as_ptr()) };
      u64::try_from(changes).unwrap_or_default()
   }

   /// Rows modified by every INSERT, UPDATE or DELETE since the handle was
   /// opened, including changes made by triggers.
   pub fn total_changes(&self) -> u64 {
      // SAFETY: `self.db` is an open handle.
      let changes = unsafe { ffi::sqlite3_total_changes(self.db.as_ptr()) };
      u64::try_from(changes).unwrap_or_default()
   }

   /// ROWID of the most recent successful INSERT.
   pub fn last_insert_rowid(&self) -> i64 {
      // SAFETY: `self.db` is an open handle.
      unsafe { ffi::sqlite3_last_insert_rowid(self.db.as_ptr()) }
   }

   /// Whether a transaction is currently open on this handle.
   pub fn in_transaction(&self) -> bool {
      // SAFETY: `self.db` is an open handle.
      unsafe { ffi::sqlite3_get_autocommit(self.db.as_ptr()) == 0 }
   }

   pub(crate) fn set_busy_timeout(&mut self, timeout: Duration) -> Result<()> {
      let millis = c_int::try_from(timeout.as_millis()).unwrap_or(c_int::MAX);
      // SAFETY: `self.db` is an open handle.
      let rc = unsafe { ffi::sqlite3_busy_timeout(self.db.as_ptr(), millis) };
      if rc != ffi::SQLITE_OK {
         return Err(Error::Execute {
            query: "sqlite3_busy_timeout".into(),
            description: describe(self.db),
         });
      }
      Ok(())
   }

   /// Compile the first statement in `sql`.
   ///
   /// Returns the statement (`None` if `sql` holds only whitespace or comments)
   /// and the number of bytes of `sql` it consumed.
   fn prepare<'a>(&'a self, sql: &'a str) -> Result<(Option<Statement<'a>>, usize)> {
      let execute_error = |description: String| Error::Execute {
         query: sql.to_string(),
         description,
      };

      let length =
         c_int::try_from(sql.len()).map_err(|_| execute_error("query is too long".into()))?;
      let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
      let mut tail: *const c_char = ptr::null();

      // SAFETY: `sql` is valid for `length` bytes, and both out pointers are valid.
      let rc = unsafe {
         ffi::sqlite3_prepare_v2(
            self.db.as_ptr(),
            sql.as_ptr().cast(),
            length,
            &mut stmt,
            &mut tail,
         )
      };

      if rc != ffi::SQLITE_OK {
         return Err(execute_error(describe(self.db)));
      }

      let consumed = if tail.is_null() {
         sql.len()
      } else {
         // SAFETY: SQLite sets `tail` to a position inside `sql`.
         let offset = unsafe { tail.offset_from(sql.as_ptr().cast::<c_char>()) };
         usize::try_from(offset).unwrap_or(sql.len())
      };

      let statement = NonNull::new(stmt).map(|stmt| {
         let query = sql.get(..consumed).unwrap_or(sql).trim();
         Statement {
            handle: self,
            stmt,
            query,
         }
      });

      Ok((statement, consumed))
   }
}

impl Drop for NativeHandle {
   fn drop(&mut self) {
      // SAFETY: every `Statement` borrows its handle and finalizes itself on
      // drop, so all statements are finalized by now and sqlite3_close cannot
      // fail with SQLITE_BUSY.
      let rc = unsafe { ffi::sqlite3_close(self.db.as_ptr()) };
      if rc == ffi::SQLITE_OK {
         debug!(location = %self.location.display(), "Closed SQLite handle");
      } else {
         warn!(location = %self.location.display(), rc, "Failed to close SQLite handle");
      }
   }
}

/// A prepared statement. Finalized when dropped, on every exit path.
struct Statement<'a> {
   handle: &'a NativeHandle,
   stmt: NonNull<ffi::sqlite3_stmt>,
   query: &'a str,
}

impl Statement<'_> {
   fn execute_error(&self) -> Error {
      Error::Execute {
         query: self.query.to_string(),
         description: describe(self.handle.db),
      }
   }

   /// Bind `value` at the 1-based parameter `index`.
   fn bind(&mut self, index: usize, value: &Value) -> Result<()> {
      let stmt = self.stmt.as_ptr();
      let position = c_int::try_from(index).unwrap_or(c_int::MAX);

      // SAFETY: `stmt` is a live statement. Text and blob contents are copied by
      // SQLite (SQLITE_TRANSIENT) before the call returns.
      let rc = unsafe {
         match value {
            Value::Null => ffi::sqlite3_bind_null(stmt, position),
            Value::Integer(integer) => ffi::sqlite3_bind_int64(stmt, position, *integer),
            Value::Real(real) => ffi::sqlite3_bind_double(stmt, position, *real),
            Value::Text(text) => ffi::sqlite3_bind_text64(
               stmt,
               position,
               text.as_ptr().cast(),
               text.len() as u64,
               ffi::SQLITE_TRANSIENT(),
               ffi::SQLITE_UTF8 as c_uchar,
            ),
            Value::Blob(blob) if blob.is_empty() => ffi::sqlite3_bind_zeroblob(stmt, position, 0),
            Value::Blob(blob) => ffi::sqlite3_bind_blob64(
               stmt,
               position,
               blob.as_ptr().cast(),
               blob.len() as u64,
               ffi::SQLITE_TRANSIENT(),
            ),
         }
      };

      if rc != ffi::SQLITE_OK {
         return Err(Error::ArgumentBind {
            query: self.query.to_string(),
            index,
            value: value.clone(),
            description: describe(self.handle.db),
         });
      }
      Ok(())
   }

   /// Step the statement to completion, collecting every row.
   fn rows(&mut self) -> Result<Vec<Row>> {
      let columns = self.column_names();
      let mut rows = Vec::new();

      loop {
         // SAFETY: `self.stmt` is a live statement.
         match unsafe { ffi::sqlite3_step(self.stmt.as_ptr()) } {
            ffi::SQLITE_ROW => {
               let values = columns
                  .iter()
                  .enumerate()
                  .map(|(index, column)| self.column_value(index, column))
                  .collect::<Result<Vec<_>>>()?;
               rows.push(Row::new(Arc::clone(&columns), values));
            }
            ffi::SQLITE_DONE => return Ok(rows),
            _ => return Err(self.execute_error()),
         }
      }
   }

   fn column_names(&self) -> Arc<[String]> {
      let stmt = self.stmt.as_ptr();
      // SAFETY: `stmt` is a live statement.
      let count = unsafe { ffi::sqlite3_column_count(stmt) };

      (0..count)
         .map(|index| {
            // SAFETY: `index` is below the column count. The returned string is
            // owned by SQLite and copied before the next call.
            let name = unsafe { ffi::sqlite3_column_name(stmt, index) };
            if name.is_null() {
               String::new()
            } else {
               // SAFETY: non-null names are NUL terminated.
               unsafe { CStr::from_ptr(name) }
                  .to_string_lossy()
                  .into_owned()
            }
         })
         .collect()
   }

   fn column_value(&self, index: usize, column: &str) -> Result<Value> {
      let stmt = self.stmt.as_ptr();
      let index = index as c_int;
      let result_error = || Error::ResultValue {
         query: self.query.to_string(),
         column: column.to_string(),
      };

      // SAFETY: the statement has just returned SQLITE_ROW and `index` is below
      // the column count. Text and blob pointers stay valid until the next
      // step, and are copied before then.
      unsafe {
         match ffi::sqlite3_column_type(stmt, index) {
            ffi::SQLITE_NULL => Ok(Value::Null),
            ffi::SQLITE_INTEGER => Ok(Value::Integer(ffi::sqlite3_column_int64(stmt, index))),
            ffi::SQLITE_FLOAT => Ok(Value::Real(ffi::sqlite3_column_double(stmt, index))),
            ffi::SQLITE_TEXT => {
               let text = ffi::sqlite3_column_text(stmt, index);
               if text.is_null() {
                  return Err(result_error());
               }
               let length = usize::try_from(ffi::sqlite3_column_bytes(stmt, index)).unwrap_or(0);
               let bytes = slice::from_raw_parts(text, length);
               // SQLite does not validate stored text, so it may not be UTF-8
               String::from_utf8(bytes.to_vec())
                  .map(Value::Text)
                  .map_err(|_| result_error())
            }
            ffi::SQLITE_BLOB => {
               let blob = ffi::sqlite3_column_blob(stmt, index);
               let length = usize::try_from(ffi::sqlite3_column_bytes(stmt, index)).unwrap_or(0);
               if length == 0 {
                  Ok(Value::Blob(Vec::new()))
               } else if blob.is_null() {
                  Err(result_error())
               } else {
                  Ok(Value::Blob(slice::from_raw_parts(blob.cast::<u8>(), length).to_vec()))
               }
            }
            _ => Err(self.execute_error()),
         }
      }
   }
}

impl Drop for Statement<'_> {
   fn drop(&mut self) {
      // SAFETY: `self.stmt` came from sqlite3_prepare_v2 and is finalized once.
      unsafe {
         ffi::sqlite3_finalize(self.stmt.as_ptr());
      }
   }
}

/// Describe the most recent error on `db`.
fn describe(db: NonNull<ffi::sqlite3>) -> String {
   // SAFETY: `db` is a handle returned by sqlite3_open_v2, and the message is
   // copied before any other call on it.
   unsafe {
      let code = ffi::sqlite3_errcode(db.as_ptr());
      let message = ffi::sqlite3_errmsg(db.as_ptr());
      format!("SQLite error {code}: {}", message_text(message))
   }
}

/// Describe a result code when there is no handle to ask.
fn describe_code(code: c_int) -> String {
   // SAFETY: sqlite3_errstr returns a static string for any code.
   let message = unsafe { ffi::sqlite3_errstr(code) };
   format!("SQLite error {code}: {}", unsafe { message_text(message) })
}

unsafe fn message_text(message: *const c_char) -> String {
   if message.is_null() {
      "-".to_string()
   } else {
      // SAFETY: SQLite error messages are NUL terminated.
      unsafe { CStr::from_ptr(message) }
         .to_string_lossy()
         .into_owned()
   }
}
