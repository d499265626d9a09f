//! # sqlite-lane-pool
//!
//! A JSON statement interface over [`sqlite_conn_mgr::DatabasePool`]:
//! arguments arrive as JSON values, and rows come back as JSON objects whose
//! keys follow the column order of the query.
//!
//! Writes run on the pool's single write connection, reads on its pooled read
//! connections, and both wait for migrations to be applied first.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use sqlite_lane_pool::{DatabaseWrapper, Migration};
//!
//! # async fn run() -> sqlite_lane_pool::Result<()> {
//! let db = DatabaseWrapper::connect_with_path(
//!    std::path::Path::new("app.db"),
//!    None,
//!    vec![Migration::sql(1, "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")],
//! )
//! .await?;
//!
//! db.execute("INSERT INTO users (name) VALUES (?)".into(), vec![json!("Alice")])
//!    .await?;
//!
//! let user = db
//!    .fetch_one("SELECT * FROM users WHERE id = ?".into(), vec![json!(1)])
//!    .await?;
//! assert_eq!(user.unwrap().get("name"), Some(&json!("Alice")));
//! # Ok(())
//! # }
//! ```

mod decode;
mod error;
mod wrapper;

pub use error::{Error, Result};
pub use wrapper::{DatabaseWrapper, WriteQueryResult};

// Re-export the connection manager so callers need only one dependency
pub use sqlite_conn_mgr::{
   self, DatabasePool, JournalMode, Migration, NativeHandle, PoolConfig, PoolState, Row,
   Synchronous, TransactionBehavior, Value, ValueConvertible,
};
