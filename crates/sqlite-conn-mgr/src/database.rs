//! SQLite database with one write connection and a pool of read connections

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_resource_pool::ResourcePool;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{debug, error, warn};

use crate::config::PoolConfig;
use crate::connection::Connection;
use crate::handle::NativeHandle;
use crate::migration::{self, Migration};
use crate::transaction::TransactionBehavior;
use crate::{Error, Result};

type WriterInit = Shared<BoxFuture<'static, Result<Arc<Connection>>>>;

/// Where a [`DatabasePool`] is in its startup.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolState {
   /// The write connection is being opened or migrations are running.
   Initializing,
   /// Migrations are applied; reads and writes proceed.
   Ready,
   /// Startup failed. Every read and write returns this error.
   Failed(Error),
}

/// SQLite database with a single write connection and a pool of read connections.
///
/// ## Architecture
///
/// - **`writer`**: One connection, opened once. All writes go through it, and
///   since a connection runs one job at a time, writes never interleave.
/// - **`readers`**: Up to `max_readers` connections, opened on demand and
///   handed out in the order callers asked for them. They are set to
///   `query_only`, so a statement that writes fails on them.
///
/// ## Startup
///
/// Creating the pool starts one background task that opens the write
/// connection and applies pending [`Migration`]s. Reads and writes wait for it
/// to finish, so no caller ever sees a schema older than the migrations. If it
/// fails, the pool is unusable: every current and future call returns the same
/// error, and startup is not retried.
///
/// Cloning a `DatabasePool` produces another handle to the same pool.
#[derive(Clone)]
pub struct DatabasePool {
   location: PathBuf,
   writer: WriterInit,
   readers: ResourcePool<Connection, Error>,
}

impl DatabasePool {
   /// Create a pool for the database at `location` and start applying
   /// `migrations`.
   ///
   /// Must be called from within a Tokio runtime.
   pub fn new(location: impl AsRef<Path>, config: PoolConfig, migrations: Vec<Migration>) -> Self {
      let location = location.as_ref().to_path_buf();

      let writer = initialize_writer(location.clone(), config.clone(), migrations)
         .boxed()
         .shared();
      // Drive startup to completion even if nobody is waiting on it yet
      tokio::spawn(writer.clone());

      let max_readers = if config.max_readers == 0 {
         warn!("max_readers is 0, using 1 read connection");
         1
      } else {
         config.max_readers
      };

      let readers = {
         let location = location.clone();
         ResourcePool::new(max_readers, move || {
            let location = location.clone();
            let config = config.clone();
            async move {
               let reader = Connection::open_with(&location, &config).await?;
               reader
                  .run(|handle| handle.execute("PRAGMA query_only = ON", &[]).map(|_| ()))
                  .await?;
               Ok::<_, Error>(reader)
            }
         })
      };

      Self {
         location,
         writer,
         readers,
      }
   }

   pub fn location(&self) -> &Path {
      &self.location
   }

   /// Wait until startup has finished, returning its error if it failed.
   pub async fn ready(&self) -> Result<()> {
      self.writer.clone().await.map(|_| ())
   }

   /// Current startup state, without waiting.
   pub fn state(&self) -> PoolState {
      match self.writer.peek() {
         None => PoolState::Initializing,
         Some(Ok(_)) => PoolState::Ready,
         Some(Err(err)) => PoolState::Failed(err.clone()),
      }
   }

   /// Run `action` in an immediate transaction on the write connection.
   ///
   /// Concurrent writes run one after another, in the order they reach the
   /// write connection.
   pub async fn write<F, R>(&self, action: F) -> Result<R>
   where
      F: FnOnce(&mut NativeHandle) -> Result<R> + Send + 'static,
      R: Send + 'static,
   {
      let writer = self.writer.clone().await?;
      writer
         .transaction_with(TransactionBehavior::Immediate, action)
         .await
   }

   /// Run `action` in a transaction on a read connection.
   ///
   /// Waits for startup first, then for a free read connection. The
   /// connection goes back to the pool whether `action` succeeds or fails.
   pub async fn read<F, R>(&self, action: F) -> Result<R>
   where
      F: FnOnce(&mut NativeHandle) -> Result<R> + Send + 'static,
      R: Send + 'static,
   {
      self.ready().await?;

      let reader = self.readers.acquire().await?;
      let result = reader
         .transaction_with(TransactionBehavior::Deferred, action)
         .await;
      drop(reader);

      result
   }

   /// Number of read connections opened so far.
   pub fn open_readers(&self) -> usize {
      self.readers.built()
   }
}

impl std::fmt::Debug for DatabasePool {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("DatabasePool")
         .field("location", &self.location)
         .field("state", &self.state())
         .field("readers", &self.readers)
         .finish()
   }
}

/// Open the write connection and bring the schema up to date.
async fn initialize_writer(
   location: PathBuf,
   config: PoolConfig,
   migrations: Vec<Migration>,
) -> Result<Arc<Connection>> {
   let result = async {
      let migrations = migration::validate(migrations)?;
      let writer = Connection::open_with(&location, &config).await?;
      let version = writer
         .run(move |handle| migration::apply(handle, &migrations))
         .await?;
      debug!(location = %location.display(), version, "Database pool ready");
      Ok::<_, Error>(Arc::new(writer))
   }
   .await;

   if let Err(err) = &result {
      error!(location = %location.display(), error = %err, "Database pool initialization failed");
   }
   result
}
