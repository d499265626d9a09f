//! A SQLite connection bound to its own execution lane

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::Result;
use crate::config::PoolConfig;
use crate::handle::NativeHandle;
use crate::lane::ExecutionLane;
use crate::row::Row;
use crate::transaction::TransactionBehavior;
use crate::value::Value;

/// A single SQLite connection.
///
/// The native handle lives on a dedicated execution lane; every method here
/// submits a job to that lane, so operations on one `Connection` run one at a
/// time in the order they were issued, and never block the async runtime.
///
/// The handle is closed once the `Connection` is dropped and any queued jobs
/// have finished.
#[derive(Debug)]
pub struct Connection {
   location: PathBuf,
   lane: ExecutionLane<NativeHandle>,
}

impl Connection {
   /// Open (or create) the database at `location` with default settings.
   pub async fn open(location: impl AsRef<Path>) -> Result<Self> {
      Self::open_with(location, &PoolConfig::default()).await
   }

   /// Open (or create) the database at `location`, applying the pragmas from
   /// `config` before returning.
   pub async fn open_with(location: impl AsRef<Path>, config: &PoolConfig) -> Result<Self> {
      let location = location.as_ref().to_path_buf();

      let lane = ExecutionLane::spawn({
         let location = location.clone();
         let config = config.clone();
         move || {
            let mut handle = NativeHandle::open(&location)?;
            configure(&mut handle, &config)?;
            Ok(handle)
         }
      })
      .await?;

      debug!(location = %location.display(), lane = lane.label(), "Connection ready");
      Ok(Self { location, lane })
   }

   pub fn location(&self) -> &Path {
      &self.location
   }

   /// Run `action` on this connection's lane with exclusive use of the handle.
   pub async fn run<F, R>(&self, action: F) -> Result<R>
   where
      F: FnOnce(&mut NativeHandle) -> Result<R> + Send + 'static,
      R: Send + 'static,
   {
      self.lane.submit(action).await?
   }

   /// Execute a single statement and return the rows it produced.
   pub async fn execute(&self, query: impl Into<String>, arguments: Vec<Value>) -> Result<Vec<Row>> {
      let query = query.into();
      self
         .run(move |handle| handle.execute(&query, &arguments))
         .await
   }

   /// Execute every statement in `script`.
   pub async fn execute_batch(&self, script: impl Into<String>) -> Result<()> {
      let script = script.into();
      self.run(move |handle| handle.execute_batch(&script)).await
   }

   /// Run `action` inside a deferred transaction.
   pub async fn transaction<F, R>(&self, action: F) -> Result<R>
   where
      F: FnOnce(&mut NativeHandle) -> Result<R> + Send + 'static,
      R: Send + 'static,
   {
      self
         .transaction_with(TransactionBehavior::Deferred, action)
         .await
   }

   /// Run `action` inside a transaction, committing on success and rolling
   /// back on failure.
   ///
   /// The whole transaction is a single lane job, so nothing else can run on
   /// this connection between BEGIN and COMMIT.
   pub async fn transaction_with<F, R>(&self, behavior: TransactionBehavior, action: F) -> Result<R>
   where
      F: FnOnce(&mut NativeHandle) -> Result<R> + Send + 'static,
      R: Send + 'static,
   {
      self
         .run(move |handle| handle.transaction_with(behavior, action))
         .await
   }

   /// The schema version stored in the database (`PRAGMA user_version`).
   pub async fn user_version(&self) -> Result<i64> {
      self.run(|handle| handle.user_version()).await
   }
}

/// Apply per-connection settings. Runs once, on the lane, before the
/// connection is handed out.
fn configure(handle: &mut NativeHandle, config: &PoolConfig) -> Result<()> {
   handle.set_busy_timeout(config.busy_timeout)?;
   handle.execute(
      &format!("PRAGMA journal_mode = {}", config.journal_mode.as_str()),
      &[],
   )?;
   handle.execute(
      &format!("PRAGMA synchronous = {}", config.synchronous.as_str()),
      &[],
   )?;
   handle.execute(
      &format!(
         "PRAGMA foreign_keys = {}",
         if config.foreign_keys { "ON" } else { "OFF" }
      ),
      &[],
   )?;
   Ok(())
}
