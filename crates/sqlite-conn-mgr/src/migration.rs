//! Versioned schema migrations
//!
//! The applied version is kept in the database header (`PRAGMA user_version`).
//! On startup every migration newer than that version runs, in ascending
//! order, inside one transaction that also records the new version. Either all
//! of them take effect or none do.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::handle::NativeHandle;
use crate::transaction::TransactionBehavior;
use crate::{Error, Result};

/// The body of a migration.
pub type MigrationAction = Arc<dyn Fn(&mut NativeHandle) -> Result<()> + Send + Sync>;

/// A migration that can be applied to a database.
///
/// Versions must be greater than zero and unique. Once a version has shipped,
/// its action must never change; add a new version instead.
#[derive(Clone)]
pub struct Migration {
   version: i64,
   action: MigrationAction,
}

impl Migration {
   pub fn new<F>(version: i64, action: F) -> Self
   where
      F: Fn(&mut NativeHandle) -> Result<()> + Send + Sync + 'static,
   {
      Self {
         version,
         action: Arc::new(action),
      }
   }

   /// A migration that executes a SQL script.
   pub fn sql(version: i64, script: impl Into<String>) -> Self {
      let script = script.into();
      Self::new(version, move |handle| handle.execute_batch(&script))
   }

   pub fn version(&self) -> i64 {
      self.version
   }
}

impl fmt::Debug for Migration {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Migration")
         .field("version", &self.version)
         .finish_non_exhaustive()
   }
}

/// Sort `migrations` by version, rejecting versions SQLite cannot record and
/// duplicates.
pub(crate) fn validate(mut migrations: Vec<Migration>) -> Result<Vec<Migration>> {
   migrations.sort_by_key(Migration::version);

   // user_version is a signed 32-bit integer
   if let Some(migration) = migrations
      .iter()
      .find(|m| m.version <= 0 || m.version > i64::from(i32::MAX))
   {
      return Err(Error::InvalidMigration(format!(
         "version {} is outside 1..={}",
         migration.version,
         i32::MAX
      )));
   }

   if let Some(pair) = migrations
      .windows(2)
      .find(|pair| pair[0].version == pair[1].version)
   {
      return Err(Error::InvalidMigration(format!(
         "version {} appears more than once",
         pair[0].version
      )));
   }

   Ok(migrations)
}

/// Apply every migration newer than the database's recorded version.
///
/// `migrations` must already be validated. Returns the version the database is
/// at afterwards.
pub(crate) fn apply(handle: &mut NativeHandle, migrations: &[Migration]) -> Result<i64> {
   let current = handle.user_version()?;
   let pending: Vec<&Migration> = migrations
      .iter()
      .filter(|migration| migration.version > current)
      .collect();

   let Some(target) = pending.last().map(|migration| migration.version) else {
      debug!(version = current, "Schema is up to date");
      return Ok(current);
   };

   handle.transaction_with(TransactionBehavior::Immediate, |handle| {
      for migration in &pending {
         debug!(version = migration.version, "Applying migration");
         (migration.action)(&mut *handle)?;
      }
      handle.set_user_version(target)
   })?;

   debug!(from = current, to = target, applied = pending.len(), "Migrations applied");
   Ok(target)
}
