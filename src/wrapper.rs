use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlite_conn_mgr::{DatabasePool, Migration, NativeHandle, PoolConfig, Value};
use tracing::debug;

use crate::decode;
use crate::{Error, Result};

/// Result returned from write operations (e.g. INSERT, UPDATE, DELETE).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteQueryResult {
   /// The number of rows affected by the write operation.
   pub rows_affected: u64,
   /// The last inserted row ID (SQLite ROWID).
   ///
   /// This is the most recent insert on the write connection, so statements
   /// that insert nothing report the ROWID of an earlier insert.
   pub last_insert_id: i64,
}

/// Wrapper around [`DatabasePool`] that takes and returns JSON values
pub struct DatabaseWrapper {
   inner: DatabasePool,
}

impl DatabaseWrapper {
   /// Open the database at `path`, apply `migrations`, and wait until it is
   /// ready for use.
   pub async fn connect_with_path(
      path: &Path,
      custom_config: Option<PoolConfig>,
      migrations: Vec<Migration>,
   ) -> Result<Self> {
      let pool = DatabasePool::new(path, custom_config.unwrap_or_default(), migrations);
      pool.ready().await?;

      debug!(path = %path.display(), "Database connected");
      Ok(Self { inner: pool })
   }

   /// The underlying pool, for typed access alongside the JSON interface.
   pub fn pool(&self) -> &DatabasePool {
      &self.inner
   }

   /// Execute a write query (INSERT/UPDATE/DELETE)
   pub async fn execute(&self, query: String, values: Vec<JsonValue>) -> Result<WriteQueryResult> {
      let arguments = to_arguments(values);

      let result = self
         .inner
         .write(move |db| execute_write(db, &query, &arguments))
         .await?;
      Ok(result)
   }

   /// Execute multiple write statements atomically within a transaction.
   ///
   /// All statements run in one write transaction: either every statement
   /// takes effect or, on the first error, none do. Returns the result of each
   /// statement execution.
   pub async fn execute_transaction(
      &self,
      statements: Vec<(String, Vec<JsonValue>)>,
   ) -> Result<Vec<WriteQueryResult>> {
      let statements: Vec<(String, Vec<Value>)> = statements
         .into_iter()
         .map(|(query, values)| (query, to_arguments(values)))
         .collect();

      let results = self
         .inner
         .write(move |db| {
            statements
               .iter()
               .map(|(query, arguments)| execute_write(db, query, arguments))
               .collect()
         })
         .await?;
      Ok(results)
   }

   /// Execute a SELECT query, possibly returning multiple rows
   pub async fn fetch_all(
      &self,
      query: String,
      values: Vec<JsonValue>,
   ) -> Result<Vec<IndexMap<String, JsonValue>>> {
      let arguments = to_arguments(values);

      let rows = self
         .inner
         .read(move |db| db.execute(&query, &arguments))
         .await?;
      Ok(rows.into_iter().map(decode::row_to_json).collect())
   }

   /// Execute a SELECT query expecting zero or one result
   pub async fn fetch_one(
      &self,
      query: String,
      values: Vec<JsonValue>,
   ) -> Result<Option<IndexMap<String, JsonValue>>> {
      let arguments = to_arguments(values);

      let mut rows = self
         .inner
         .read(move |db| db.execute(&query, &arguments))
         .await?;

      match rows.len() {
         0 => Ok(None),
         1 => Ok(rows.pop().map(decode::row_to_json)),
         count => Err(Error::MultipleRowsReturned(count)),
      }
   }
}

fn to_arguments(values: Vec<JsonValue>) -> Vec<Value> {
   values.into_iter().map(decode::to_value).collect()
}

/// Run one write statement and report what it changed.
fn execute_write(
   db: &mut NativeHandle,
   query: &str,
   arguments: &[Value],
) -> sqlite_conn_mgr::Result<WriteQueryResult> {
   let before = db.total_changes();
   db.execute(query, arguments)?;

   // sqlite3_changes() is left untouched by statements that modify no rows
   // (DDL, SELECT), so only trust it when the total moved
   let rows_affected = if db.total_changes() == before {
      0
   } else {
      db.changes()
   };

   Ok(WriteQueryResult {
      rows_affected,
      last_insert_id: db.last_insert_rowid(),
   })
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde_json::json;
   use tempfile::TempDir;

   async fn create_test_db() -> (DatabaseWrapper, TempDir) {
      let temp_dir = TempDir::new().expect("Failed to create temp directory");
      let db_path = temp_dir.path().join("test.db");
      let wrapper = DatabaseWrapper::connect_with_path(&db_path, None, Vec::new())
         .await
         .expect("Failed to connect to test database");

      (wrapper, temp_dir)
   }

   #[tokio::test]
   async fn test_execute_and_write_result() {
      let (db, _temp) = create_test_db().await;

      // DDL returns 0 rows affected
      let result = db
         .execute(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)".into(),
            vec![],
         )
         .await
         .unwrap();

      assert_eq!(result.rows_affected, 0);

      // INSERT returns rows_affected and last_insert_id
      let result = db
         .execute("INSERT INTO t (name) VALUES (?)".into(), vec![json!("Alice")])
         .await
         .unwrap();

      assert_eq!((result.rows_affected, result.last_insert_id), (1, 1));

      let result = db
         .execute("INSERT INTO t (name) VALUES (?)".into(), vec![json!("Bob")])
         .await
         .unwrap();

      assert_eq!((result.rows_affected, result.last_insert_id), (1, 2));

      // UPDATE affects multiple rows
      let result = db
         .execute("UPDATE t SET name = 'X' WHERE id > 0".into(), vec![])
         .await
         .unwrap();

      assert_eq!(result.rows_affected, 2);

      // A later DDL statement does not repeat the previous count
      let result = db
         .execute("CREATE INDEX t_name ON t (name)".into(), vec![])
         .await
         .unwrap();

      assert_eq!(result.rows_affected, 0);
   }

   #[tokio::test]
   async fn test_fetch_all() {
      let (db, _temp) = create_test_db().await;
      db.execute(
         "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, active INT)".into(),
         vec![],
      )
      .await
      .unwrap();

      // Empty table returns empty vec
      assert!(
         db.fetch_all("SELECT * FROM t".into(), vec![])
            .await
            .unwrap()
            .is_empty()
      );

      db.execute(
         "INSERT INTO t (name, active) VALUES (?, ?), (?, ?), (?, ?)".into(),
         vec![
            json!("Alice"),
            json!(true),
            json!("Bob"),
            json!(false),
            json!("Charlie"),
            json!(1),
         ],
      )
      .await
      .unwrap();

      let rows = db
         .fetch_all("SELECT * FROM t ORDER BY id".into(), vec![])
         .await
         .unwrap();

      assert_eq!(rows.len(), 3);
      assert_eq!(rows[0].get("name"), Some(&json!("Alice")));

      // Booleans were bound as 0/1
      let rows = db
         .fetch_all("SELECT name FROM t WHERE active = ?".into(), vec![json!(1)])
         .await
         .unwrap();

      assert_eq!(rows.len(), 2);
   }

   #[tokio::test]
   async fn test_fetch_one() {
      let (db, _temp) = create_test_db().await;
      db.execute(
         "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)".into(),
         vec![],
      )
      .await
      .unwrap();

      // No results returns None
      assert!(
         db.fetch_one("SELECT * FROM t WHERE id = ?".into(), vec![json!(999)])
            .await
            .unwrap()
            .is_none()
      );

      db.execute(
         "INSERT INTO t (name) VALUES (?), (?)".into(),
         vec![json!("Alice"), json!("Bob")],
      )
      .await
      .unwrap();

      // Single result returns Some
      let row = db
         .fetch_one("SELECT * FROM t WHERE id = ?".into(), vec![json!(1)])
         .await
         .unwrap()
         .unwrap();

      assert_eq!(row.get("name"), Some(&json!("Alice")));

      // Multiple results returns error
      let err = db
         .fetch_one("SELECT * FROM t".into(), vec![])
         .await
         .unwrap_err();

      assert_eq!(err, Error::MultipleRowsReturned(2));
   }

   #[tokio::test]
   async fn test_transactions() {
      let (db, _temp) = create_test_db().await;
      db.execute(
         "CREATE TABLE t (id INTEGER PRIMARY KEY, val INTEGER NOT NULL)".into(),
         vec![],
      )
      .await
      .unwrap();

      db.execute(
         "INSERT INTO t (id, val) VALUES (1, 100), (2, 50)".into(),
         vec![],
      )
      .await
      .unwrap();

      // Successful transaction commits
      let results = db
         .execute_transaction(vec![
            ("UPDATE t SET val = val - 30 WHERE id = 1".into(), vec![]),
            ("UPDATE t SET val = val + ? WHERE id = 2".into(), vec![json!(30)]),
         ])
         .await
         .unwrap();

      assert_eq!(results.len(), 2);
      assert!(results.iter().all(|result| result.rows_affected == 1));

      let rows = db
         .fetch_all("SELECT val FROM t ORDER BY id".into(), vec![])
         .await
         .unwrap();

      assert_eq!(rows[0].get("val"), Some(&json!(70)));
      assert_eq!(rows[1].get("val"), Some(&json!(80)));

      // Failed transaction rolls back (NULL violates NOT NULL)
      let err = db
         .execute_transaction(vec![
            ("UPDATE t SET val = 999 WHERE id = 1".into(), vec![]),
            ("INSERT INTO t (id, val) VALUES (3, NULL)".into(), vec![]),
         ])
         .await
         .unwrap_err();

      assert_eq!(err.error_code(), "EXECUTE_FAILED");

      // Verify rollback: id=1 should still be 70
      let row = db
         .fetch_one("SELECT val FROM t WHERE id = 1".into(), vec![])
         .await
         .unwrap()
         .unwrap();

      assert_eq!(row.get("val"), Some(&json!(70)));
   }

   #[tokio::test]
   async fn test_type_binding_and_decoding() {
      let (db, _temp) = create_test_db().await;
      db.execute(
         "CREATE TABLE t (id INTEGER PRIMARY KEY, txt TEXT, num REAL, big INTEGER, flag BOOLEAN, data BLOB)".into(),
         vec![],
      )
      .await
      .unwrap();

      let large_int: i64 = 9_007_199_254_740_993; // 2^53 + 1

      db.execute("INSERT INTO t (txt) VALUES (?)".into(), vec![JsonValue::Null])
         .await
         .unwrap();

      db.execute(
         "INSERT INTO t (txt, num) VALUES (?, ?)".into(),
         vec![json!("hello"), json!(1.23456)],
      )
      .await
      .unwrap();

      db.execute("INSERT INTO t (big) VALUES (?)".into(), vec![json!(large_int)])
         .await
         .unwrap();

      db.execute("INSERT INTO t (flag) VALUES (?)".into(), vec![json!(true)])
         .await
         .unwrap();

      // BLOB ("Hello" in hex)
      db.execute("INSERT INTO t (data) VALUES (X'48656C6C6F')".into(), vec![])
         .await
         .unwrap();

      db.execute(
         "INSERT INTO t (txt) VALUES (?)".into(),
         vec![json!({ "tags": ["a", "b"] })],
      )
      .await
      .unwrap();

      let rows = db
         .fetch_all("SELECT * FROM t ORDER BY id".into(), vec![])
         .await
         .unwrap();

      // NULL decoding
      assert_eq!(rows[0].get("txt"), Some(&JsonValue::Null));

      // Float decoding (with tolerance)
      let num = rows[1].get("num").unwrap().as_f64().unwrap();
      assert!((num - 1.23456).abs() < 0.0001);

      // Large integer precision
      assert_eq!(rows[2].get("big"), Some(&json!(large_int)));

      // Boolean stored as integer
      assert_eq!(rows[3].get("flag"), Some(&json!(1)));

      // BLOB as base64
      assert_eq!(rows[4].get("data").unwrap().as_str(), Some("SGVsbG8="));

      // Objects are stored as JSON text
      assert_eq!(rows[5].get("txt"), Some(&json!(r#"{"tags":["a","b"]}"#)));
   }

   #[tokio::test]
   async fn test_column_order_preserved() {
      let (db, _temp) = create_test_db().await;
      db.execute("CREATE TABLE t (z TEXT, a TEXT, m TEXT)".into(), vec![])
         .await
         .unwrap();
      db.execute(
         "INSERT INTO t VALUES (?, ?, ?)".into(),
         vec![json!("z"), json!("a"), json!("m")],
      )
      .await
      .unwrap();

      let rows = db
         .fetch_all("SELECT z, a, m FROM t".into(), vec![])
         .await
         .unwrap();

      let keys: Vec<&String> = rows[0].keys().collect();
      assert_eq!(keys, vec!["z", "a", "m"]);
   }

   #[tokio::test]
   async fn test_connect_applies_migrations() {
      let temp_dir = TempDir::new().unwrap();
      let db = DatabaseWrapper::connect_with_path(
         &temp_dir.path().join("test.db"),
         Some(PoolConfig {
            max_readers: 2,
            ..Default::default()
         }),
         vec![Migration::sql(
            1,
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
         )],
      )
      .await
      .unwrap();

      let result = db
         .execute("INSERT INTO users (name) VALUES (?)".into(), vec![json!("Ada")])
         .await
         .unwrap();
      assert_eq!(result.last_insert_id, 1);

      let version = db.pool().read(|db| db.user_version()).await.unwrap();
      assert_eq!(version, 1);
   }

   #[tokio::test]
   async fn test_connect_reports_open_failure() {
      let temp_dir = TempDir::new().unwrap();
      let path = temp_dir.path().join("missing").join("test.db");

      let err = match DatabaseWrapper::connect_with_path(&path, None, Vec::new()).await {
         Ok(_) => panic!("connect should fail for a missing directory"),
         Err(err) => err,
      };

      assert_eq!(err.error_code(), "OPEN_FAILED");
   }
}
