//! Configuration for SQLite database pools

use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Configuration for [`DatabasePool`](crate::DatabasePool) and the connections it opens
///
/// # Examples
///
/// ```
/// use sqlite_conn_mgr::PoolConfig;
/// use std::time::Duration;
///
/// // Use defaults
/// let config = PoolConfig::default();
///
/// // Override just one field
/// let config = PoolConfig {
///     max_readers: 3,
///     ..Default::default()
/// };
///
/// // Customize several fields
/// let config = PoolConfig {
///     max_readers: 2,
///     busy_timeout: Duration::from_secs(1),
///     foreign_keys: false,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
   /// Maximum number of read connections
   ///
   /// Read connections are opened lazily, up to this many. Callers beyond this
   /// limit wait in line for a connection to be returned.
   ///
   /// Default: 6
   pub max_readers: usize,

   /// Journal mode applied to every connection
   ///
   /// Default: WAL
   pub journal_mode: JournalMode,

   /// Synchronous (durability) mode applied to every connection
   ///
   /// Default: NORMAL
   pub synchronous: Synchronous,

   /// Whether foreign key constraints are enforced
   ///
   /// Default: true
   pub foreign_keys: bool,

   /// How long a statement waits on a lock held by another connection before
   /// failing with SQLITE_BUSY
   ///
   /// Deserialized from `busy_timeout_ms`.
   ///
   /// Default: 5 seconds
   #[serde(rename = "busy_timeout_ms", deserialize_with = "duration_from_millis")]
   pub busy_timeout: Duration,
}

impl Default for PoolConfig {
   fn default() -> Self {
      Self {
         max_readers: 6,
         journal_mode: JournalMode::Wal,
         synchronous: Synchronous::Normal,
         foreign_keys: true,
         busy_timeout: Duration::from_secs(5),
      }
   }
}

/// SQLite `journal_mode` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
   Delete,
   Truncate,
   Persist,
   Memory,
   Wal,
   Off,
}

impl JournalMode {
   pub fn as_str(&self) -> &'static str {
      match self {
         JournalMode::Delete => "DELETE",
         JournalMode::Truncate => "TRUNCATE",
         JournalMode::Persist => "PERSIST",
         JournalMode::Memory => "MEMORY",
         JournalMode::Wal => "WAL",
         JournalMode::Off => "OFF",
      }
   }
}

/// SQLite `synchronous` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Synchronous {
   Off,
   Normal,
   Full,
   Extra,
}

impl Synchronous {
   pub fn as_str(&self) -> &'static str {
      match self {
         Synchronous::Off => "OFF",
         Synchronous::Normal => "NORMAL",
         Synchronous::Full => "FULL",
         Synchronous::Extra => "EXTRA",
      }
   }
}

fn duration_from_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
   D: Deserializer<'de>,
{
   u64::deserialize(deserializer).map(Duration::from_millis)
}
