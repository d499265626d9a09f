//! Transactions on a native handle

use tracing::{trace, warn};

use crate::Result;
use crate::handle::NativeHandle;

/// How a transaction acquires its locks.
///
/// See <https://www.sqlite.org/lang_transaction.html>.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionBehavior {
   /// Locks are taken when the database is first read or written.
   #[default]
   Deferred,
   /// The write lock is taken immediately.
   Immediate,
   /// Like `Immediate`; additionally blocks readers outside WAL mode.
   Exclusive,
}

impl TransactionBehavior {
   fn begin_statement(self) -> &'static str {
      match self {
         TransactionBehavior::Deferred => "BEGIN DEFERRED",
         TransactionBehavior::Immediate => "BEGIN IMMEDIATE",
         TransactionBehavior::Exclusive => "BEGIN EXCLUSIVE",
      }
   }
}

impl NativeHandle {
   /// Run `action` inside a deferred transaction.
   ///
   /// See [`transaction_with`](Self::transaction_with).
   pub fn transaction<R, F>(&mut self, action: F) -> Result<R>
   where
      F: FnOnce(&mut NativeHandle) -> Result<R>,
   {
      self.transaction_with(TransactionBehavior::Deferred, action)
   }

   /// Run `action` inside a transaction.
   ///
   /// Commits if `action` succeeds. If `action` or the commit fails, the
   /// transaction is rolled back and the original error is returned. Nested
   /// transactions are not supported: calling this from inside `action` fails.
   pub fn transaction_with<R, F>(&mut self, behavior: TransactionBehavior, action: F) -> Result<R>
   where
      F: FnOnce(&mut NativeHandle) -> Result<R>,
   {
      self.execute(behavior.begin_statement(), &[])?;
      trace!(?behavior, "Transaction started");

      let guard = TransactionGuard {
         handle: self,
         finished: false,
      };
      guard.complete(action)
   }
}

/// Rolls back an open transaction unless it was committed, including when
/// `action` panics.
struct TransactionGuard<'a> {
   handle: &'a mut NativeHandle,
   finished: bool,
}

impl TransactionGuard<'_> {
   fn complete<R, F>(mut self, action: F) -> Result<R>
   where
      F: FnOnce(&mut NativeHandle) -> Result<R>,
   {
      let value = action(&mut *self.handle)?;
      self.handle.execute("COMMIT", &[])?;
      self.finished = true;
      trace!("Transaction committed");
      Ok(value)
   }
}

impl Drop for TransactionGuard<'_> {
   fn drop(&mut self) {
      // A failed COMMIT may already have rolled back on its own
      if self.finished || !self.handle.in_transaction() {
         return;
      }

      match self.handle.execute("ROLLBACK", &[]) {
         Ok(_) => trace!("Transaction rolled back"),
         Err(error) => warn!(%error, "Rollback failed; keeping the original error"),
      }
   }
}
