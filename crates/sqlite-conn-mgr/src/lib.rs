//! # sqlite-conn-mgr
//!
//! SQLite connection management for async applications: every connection runs
//! on its own thread, reads share a bounded pool, writes go through a single
//! connection, and schema migrations are applied exactly once at startup.
//!
//! ## Core Types
//!
//! - **[`DatabasePool`]**: One write connection plus a pool of read connections,
//!   with migrations applied before the first read or write
//! - **[`Connection`]**: A native handle bound to an [`ExecutionLane`]
//! - **[`NativeHandle`]**: The open SQLite handle handed to read, write and
//!   migration closures
//! - **[`Migration`]**: A versioned schema change
//! - **[`Value`]** / **[`ValueConvertible`]**: Scalar values and conversions to
//!   Rust types
//! - **[`PoolConfig`]**: Pool size and per-connection pragmas
//! - **[`Error`]**: Error type for database operations
//!
//! ## Architecture
//!
//! - **Execution lanes**: SQLite calls block on disk I/O, so each connection
//!   owns a dedicated thread and runs its jobs there one at a time, in order
//! - **Single writer**: All writes share one connection, so they never
//!   interleave and need no extra lock
//! - **Pooled readers**: Read connections are opened lazily up to
//!   `max_readers`; callers beyond that wait their turn in FIFO order
//! - **Versioned migrations**: Pending migrations run in one transaction and
//!   the new version is stored in `PRAGMA user_version`
//!
//! # Example
//!
//! ```no_run
//! use sqlite_conn_mgr::{DatabasePool, Migration, PoolConfig, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sqlite_conn_mgr::Error> {
//!    let pool = DatabasePool::new(
//!       "app.db",
//!       PoolConfig::default(),
//!       vec![Migration::sql(1, "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")],
//!    );
//!
//!    pool.write(|db| {
//!       db.execute("INSERT INTO users (name) VALUES (?)", &[Value::from("Alice")])?;
//!       Ok(())
//!    })
//!    .await?;
//!
//!    let names: Vec<String> = pool
//!       .read(|db| {
//!          db.execute("SELECT name FROM users", &[])?
//!             .iter()
//!             .map(|row| row.get("name"))
//!             .collect()
//!       })
//!       .await?;
//!
//!    assert_eq!(names, vec!["Alice".to_string()]);
//!    Ok(())
//! }
//! ```

mod config;
mod connection;
mod database;
mod error;
mod handle;
mod lane;
mod migration;
mod row;
mod transaction;
mod value;

// Re-export public types
pub use config::{JournalMode, PoolConfig, Synchronous};
pub use connection::Connection;
pub use database::{DatabasePool, PoolState};
pub use error::{Error, Result};
pub use handle::NativeHandle;
pub use lane::ExecutionLane;
pub use migration::{Migration, MigrationAction};
pub use row::Row;
pub use transaction::TransactionBehavior;
pub use value::{Value, ValueConvertible};
