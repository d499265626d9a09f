//! Suspending element pool with FIFO waiters

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::trace;

type Builder<T, E> = Box<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// What a queued caller receives when it is woken.
enum Grant<T> {
   /// An element returned by another caller.
   Element(T),
   /// A build slot freed by a failed build; the woken caller builds its own element.
   Build,
}

struct State<T> {
   built: usize,
   free: Vec<T>,
   waiters: VecDeque<oneshot::Sender<Grant<T>>>,
}

impl<T> State<T> {
   /// Hands `grant` to the longest-waiting caller that is still listening.
   ///
   /// Returns the grant back if nobody could take it.
   fn hand_off(&mut self, mut grant: Grant<T>) -> Option<Grant<T>> {
      while let Some(waiter) = self.waiters.pop_front() {
         match waiter.send(grant) {
            Ok(()) => return None,
            // That caller stopped waiting; try the next one
            Err(returned) => grant = returned,
         }
      }
      Some(grant)
   }
}

enum Checkout<T> {
   Ready(T),
   Build,
   Wait(oneshot::Receiver<Grant<T>>),
}

struct Inner<T, E> {
   max_elements: usize,
   builder: Builder<T, E>,
   state: Mutex<State<T>>,
}

impl<T, E> Inner<T, E> {
   /// Decides, under one lock, whether the caller gets a free element, a build
   /// slot, or a place in the wait queue.
   fn checkout(&self) -> Checkout<T> {
      let mut state = self.state.lock();

      if let Some(element) = state.free.pop() {
         return Checkout::Ready(element);
      }

      if state.built < self.max_elements {
         state.built += 1;
         return Checkout::Build;
      }

      let (tx, rx) = oneshot::channel();
      state.waiters.push_back(tx);
      trace!(waiting = state.waiters.len(), "Pool exhausted, caller queued");
      Checkout::Wait(rx)
   }

   fn release(&self, element: T) {
      let mut state = self.state.lock();
      if let Some(Grant::Element(element)) = state.hand_off(Grant::Element(element)) {
         state.free.push(element);
      }
   }

   /// Gives back a build slot whose build failed or was abandoned.
   fn release_slot(&self) {
      let mut state = self.state.lock();
      if state.hand_off(Grant::Build).is_some() {
         state.built -= 1;
      }
   }
}

/// A bounded, lazily-growing pool of elements.
///
/// [`get`](Self::get) returns a free element if there is one, otherwise builds a
/// new one while fewer than `max_elements` exist, otherwise suspends until
/// another caller [`release`](Self::release)s an element. Suspended callers are
/// resumed strictly in the order they arrived.
///
/// Cloning a `ResourcePool` produces another handle to the same pool.
pub struct ResourcePool<T, E> {
   inner: Arc<Inner<T, E>>,
}

impl<T, E> Clone for ResourcePool<T, E> {
   fn clone(&self) -> Self {
      Self {
         inner: Arc::clone(&self.inner),
      }
   }
}

impl<T, E> ResourcePool<T, E>
where
   T: Send + 'static,
   E: Send + 'static,
{
   /// Create a pool that builds at most `max_elements` elements using `builder`.
   ///
   /// Nothing is built until the first call to [`get`](Self::get).
   ///
   /// # Panics
   ///
   /// Panics if `max_elements` is zero.
   pub fn new<F, Fut>(max_elements: usize, builder: F) -> Self
   where
      F: Fn() -> Fut + Send + Sync + 'static,
      Fut: Future<Output = Result<T, E>> + Send + 'static,
   {
      assert!(max_elements > 0, "max_elements must be greater than zero");

      Self {
         inner: Arc::new(Inner {
            max_elements,
            builder: Box::new(move || -> BoxFuture<'static, Result<T, E>> {
               Box::pin(builder())
            }),
            state: Mutex::new(State {
               built: 0,
               free: Vec::new(),
               waiters: VecDeque::new(),
            }),
         }),
      }
   }

   /// Retrieve an element, suspending if none is available.
   ///
   /// A build error is returned to this caller only; the slot it occupied is
   /// released so a later call (or a queued caller) can build again.
   pub async fn get(&self) -> Result<T, E> {
      loop {
         let rx = match self.inner.checkout() {
            Checkout::Ready(element) => return Ok(element),
            Checkout::Build => return self.build().await,
            Checkout::Wait(rx) => rx,
         };

         let waiter = Waiter {
            inner: &self.inner,
            rx: Some(rx),
         };

         match waiter.wait().await {
            Some(Grant::Element(element)) => return Ok(element),
            Some(Grant::Build) => return self.build().await,
            None => continue,
         }
      }
   }

   /// Retrieve an element wrapped in a guard that returns it on drop.
   pub async fn acquire(&self) -> Result<Pooled<T, E>, E> {
      let element = self.get().await?;
      Ok(Pooled {
         element: Some(element),
         pool: self.clone(),
      })
   }

   /// Return an element to the pool.
   ///
   /// If a caller is waiting, the element goes directly to the one that has
   /// waited longest.
   pub fn release(&self, element: T) {
      self.inner.release(element);
   }

   async fn build(&self) -> Result<T, E> {
      let mut slot = BuildSlot {
         inner: &self.inner,
         armed: true,
      };

      let result = (self.inner.builder)().await;
      if result.is_ok() {
         slot.armed = false;
      } else {
         trace!("Element build failed, releasing its slot");
      }
      result
   }
}

impl<T, E> ResourcePool<T, E> {
   /// Upper bound on the number of elements this pool will build.
   pub fn max_elements(&self) -> usize {
      self.inner.max_elements
   }

   /// Number of elements currently built (free plus checked out).
   pub fn built(&self) -> usize {
      self.inner.state.lock().built
   }

   /// Number of elements sitting in the free list.
   pub fn idle(&self) -> usize {
      self.inner.state.lock().free.len()
   }

   /// Number of callers currently suspended in [`get`](Self::get).
   pub fn waiting(&self) -> usize {
      self
         .inner
         .state
         .lock()
         .waiters
         .iter()
         .filter(|waiter| !waiter.is_closed())
         .count()
   }
}

impl<T, E> fmt::Debug for ResourcePool<T, E> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let state = self.inner.state.lock();
      f.debug_struct("ResourcePool")
         .field("max_elements", &self.inner.max_elements)
         .field("built", &state.built)
         .field("idle", &state.free.len())
         .field("waiters", &state.waiters.len())
         .finish()
   }
}

/// A reserved build slot. Released again unless the build succeeds.
struct BuildSlot<'a, T, E> {
   inner: &'a Inner<T, E>,
   armed: bool,
}

impl<T, E> Drop for BuildSlot<'_, T, E> {
   fn drop(&mut self) {
      if self.armed {
         self.inner.release_slot();
      }
   }
}

/// A queued caller.
///
/// If the caller is cancelled after a grant was sent but before it was
/// received, the grant is passed back to the pool so it is not lost.
struct Waiter<'a, T, E> {
   inner: &'a Inner<T, E>,
   rx: Option<oneshot::Receiver<Grant<T>>>,
}

impl<T, E> Waiter<'_, T, E> {
   async fn wait(mut self) -> Option<Grant<T>> {
      let rx = self.rx.as_mut()?;
      let grant = rx.await.ok();
      self.rx = None;
      grant
   }
}

impl<T, E> Drop for Waiter<'_, T, E> {
   fn drop(&mut self) {
      let Some(mut rx) = self.rx.take() else {
         return;
      };

      rx.close();
      match rx.try_recv() {
         Ok(Grant::Element(element)) => self.inner.release(element),
         Ok(Grant::Build) => self.inner.release_slot(),
         Err(_) => {}
      }
   }
}

/// RAII guard for an element checked out of a [`ResourcePool`].
///
/// The element is returned to the pool when the guard is dropped.
#[must_use = "if unused, the element is immediately returned to the pool"]
pub struct Pooled<T, E> {
   element: Option<T>,
   pool: ResourcePool<T, E>,
}

impl<T, E> Pooled<T, E> {
   /// Take the element out of the guard without returning it to the pool.
   ///
   /// The element keeps counting towards `max_elements`; hand it back with
   /// [`ResourcePool::release`] when done.
   pub fn detach(mut self) -> T {
      self.element.take().expect("element already taken")
   }
}

impl<T, E> Deref for Pooled<T, E> {
   type Target = T;

   fn deref(&self) -> &T {
      self.element.as_ref().expect("element already taken")
   }
}

impl<T, E> DerefMut for Pooled<T, E> {
   fn deref_mut(&mut self) -> &mut T {
      self.element.as_mut().expect("element already taken")
   }
}

impl<T, E> Drop for Pooled<T, E> {
   fn drop(&mut self) {
      if let Some(element) = self.element.take() {
         self.pool.inner.release(element);
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn counting_pool(max: usize) -> ResourcePool<usize, String> {
      let next = Arc::new(std::sync::atomic::AtomicUsize::new(0));
      ResourcePool::new(max, move || {
         let next = Arc::clone(&next);
         async move { Ok(next.fetch_add(1, std::sync::atomic::Ordering::SeqCst)) }
      })
   }

   #[tokio::test]
   async fn test_free_element_is_reused() {
      let pool = counting_pool(2);

      let first = pool.get().await.unwrap();
      pool.release(first);
      let again = pool.get().await.unwrap();

      assert_eq!(first, again);
      assert_eq!(pool.built(), 1);
   }

   #[tokio::test]
   async fn test_guard_returns_element_on_drop() {
      let pool = counting_pool(1);

      {
         let guard = pool.acquire().await.unwrap();
         assert_eq!(*guard, 0);
         assert_eq!(pool.idle(), 0);
      }

      assert_eq!(pool.idle(), 1);
      assert_eq!(pool.built(), 1);
   }

   #[tokio::test]
   async fn test_detach_keeps_element_checked_out() {
      let pool = counting_pool(1);

      let element = pool.acquire().await.unwrap().detach();
      assert_eq!(pool.idle(), 0);

      pool.release(element);
      assert_eq!(pool.idle(), 1);
   }

   #[test]
   #[should_panic(expected = "max_elements must be greater than zero")]
   fn test_zero_capacity_rejected() {
      let _ = counting_pool(0);
   }
}
