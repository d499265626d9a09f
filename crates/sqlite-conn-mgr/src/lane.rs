//! Dedicated worker threads that serialize all work on one piece of state
//!
//! SQLite calls block on disk I/O, and a `NOMUTEX` handle must not be touched
//! from two threads at once. Each [`ExecutionLane`] owns its state on its own
//! OS thread and runs submitted jobs against it one at a time, in submission
//! order, so blocking work never occupies the async runtime's workers.

use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};
use uuid::Uuid;

use crate::{Error, Result};

type Job<H> = Box<dyn FnOnce(&mut H) + Send>;

/// A single worker thread with a FIFO job queue, owning state of type `H`.
///
/// The worker stops once every handle to the lane is dropped; jobs already
/// queued still run first. `H` is dropped on the worker thread.
pub struct ExecutionLane<H> {
   label: String,
   jobs: mpsc::UnboundedSender<Job<H>>,
}

impl<H: 'static> ExecutionLane<H> {
   /// Start a lane whose state is built by `init` on the lane's own thread.
   ///
   /// Resolves once `init` has finished, with its error if it failed.
   pub async fn spawn<F>(init: F) -> Result<Self>
   where
      F: FnOnce() -> Result<H> + Send + 'static,
   {
      let label = format!("sqlite-lane-{}", Uuid::new_v4());
      let (jobs, mut queue) = mpsc::unbounded_channel::<Job<H>>();
      let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();

      let worker_label = label.clone();
      thread::Builder::new()
         .name(label.clone())
         .spawn(move || {
            let mut state = match init() {
               Ok(state) => state,
               Err(err) => {
                  let _ = ready_tx.send(Err(err));
                  return;
               }
            };
            let _ = ready_tx.send(Ok(()));
            debug!(lane = %worker_label, "Execution lane started");

            while let Some(job) = queue.blocking_recv() {
               job(&mut state);
            }

            drop(state);
            debug!(lane = %worker_label, "Execution lane stopped");
         })
         .map_err(|e| Error::Other(format!("failed to spawn execution lane: {e}")))?;

      // A dropped sender means `init` panicked
      ready_rx.await.map_err(|_| Error::LaneClosed)??;

      Ok(Self { label, jobs })
   }

   /// Queue `job` to run against the lane's state.
   ///
   /// The job is queued immediately, before the returned future is polled, and
   /// runs to completion even if that future is dropped. A panicking job is
   /// reported as [`Error::JobPanicked`] and does not stop the lane.
   pub fn submit<F, R>(&self, job: F) -> impl Future<Output = Result<R>> + Send + 'static
   where
      F: FnOnce(&mut H) -> R + Send + 'static,
      R: Send + 'static,
   {
      let (tx, rx) = oneshot::channel();
      let label = self.label.clone();

      let queued = self
         .jobs
         .send(Box::new(move |state: &mut H| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(state)));
            if outcome.is_err() {
               error!(lane = %label, "Job panicked on execution lane");
            }
            let _ = tx.send(outcome.map_err(|_| Error::JobPanicked));
         }))
         .is_ok();

      async move {
         if !queued {
            return Err(Error::LaneClosed);
         }
         rx.await.map_err(|_| Error::LaneClosed)?
      }
   }

   /// Name of the lane's worker thread.
   pub fn label(&self) -> &str {
      &self.label
   }
}

impl<H> fmt::Debug for ExecutionLane<H> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("ExecutionLane")
         .field("label", &self.label)
         .finish_non_exhaustive()
   }
}
