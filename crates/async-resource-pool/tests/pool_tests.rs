use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_resource_pool::ResourcePool;
use tokio::sync::{Mutex, Notify};

async fn wait_for_waiters<T: Send + 'static, E: Send + 'static>(
   pool: &ResourcePool<T, E>,
   count: usize,
) {
   while pool.waiting() < count {
      tokio::task::yield_now().await;
   }
}

// ============================================================================
// Capacity
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_never_builds_more_than_max_elements() {
   let builds = Arc::new(AtomicUsize::new(0));
   let pool = {
      let builds = Arc::clone(&builds);
      ResourcePool::<usize, ()>::new(3, move || {
         let builds = Arc::clone(&builds);
         async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(builds.fetch_add(1, Ordering::SeqCst))
         }
      })
   };

   let tasks: Vec<_> = (0..50)
      .map(|_| {
         let pool = pool.clone();
         tokio::spawn(async move {
            let element = pool.get().await.unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;
            pool.release(element);
         })
      })
      .collect();

   for task in futures::future::join_all(tasks).await {
      task.unwrap();
   }

   assert!(builds.load(Ordering::SeqCst) <= 3);
   assert_eq!(pool.built(), builds.load(Ordering::SeqCst));
   assert_eq!(pool.idle(), pool.built());
}

#[tokio::test]
async fn test_failed_build_releases_its_slot() {
   let attempts = Arc::new(AtomicUsize::new(0));
   let pool = {
      let attempts = Arc::clone(&attempts);
      ResourcePool::<&'static str, String>::new(1, move || {
         let attempt = attempts.fetch_add(1, Ordering::SeqCst);
         async move {
            if attempt < 2 {
               Err(format!("build {attempt} failed"))
            } else {
               Ok("element")
            }
         }
      })
   };

   assert_eq!(pool.get().await, Err("build 0 failed".to_string()));
   assert_eq!(pool.built(), 0);
   assert_eq!(pool.get().await, Err("build 1 failed".to_string()));
   assert_eq!(pool.built(), 0);

   assert_eq!(pool.get().await, Ok("element"));
   assert_eq!(pool.built(), 1);
}

#[tokio::test]
async fn test_failed_build_lets_queued_caller_build() {
   let attempts = Arc::new(AtomicUsize::new(0));
   let gate = Arc::new(Notify::new());
   let pool = {
      let attempts = Arc::clone(&attempts);
      let gate = Arc::clone(&gate);
      ResourcePool::<usize, String>::new(1, move || {
         let attempt = attempts.fetch_add(1, Ordering::SeqCst);
         let gate = Arc::clone(&gate);
         async move {
            if attempt == 0 {
               gate.notified().await;
               Err("first build failed".to_string())
            } else {
               Ok(attempt)
            }
         }
      })
   };

   let first = tokio::spawn({
      let pool = pool.clone();
      async move { pool.get().await }
   });
   while pool.built() < 1 {
      tokio::task::yield_now().await;
   }

   let second = tokio::spawn({
      let pool = pool.clone();
      async move { pool.get().await }
   });
   wait_for_waiters(&pool, 1).await;

   gate.notify_one();

   assert_eq!(first.await.unwrap(), Err("first build failed".to_string()));
   assert_eq!(second.await.unwrap(), Ok(1));
   assert_eq!(pool.built(), 1);
}

// ============================================================================
// Fairness
// ============================================================================

#[tokio::test]
async fn test_waiters_are_served_in_arrival_order() {
   let pool = ResourcePool::<u32, ()>::new(1, || async { Ok(7) });
   let held = pool.get().await.unwrap();

   let order = Arc::new(Mutex::new(Vec::new()));
   let mut tasks = Vec::new();
   for id in 0..5 {
      let pool_for_task = pool.clone();
      let order = Arc::clone(&order);
      tasks.push(tokio::spawn(async move {
         let element = pool_for_task.get().await.unwrap();
         order.lock().await.push(id);
         pool_for_task.release(element);
      }));
      wait_for_waiters(&pool, id + 1).await;
   }

   pool.release(held);
   for task in tasks {
      task.await.unwrap();
   }

   assert_eq!(*order.lock().await, vec![0, 1, 2, 3, 4]);
   assert_eq!(pool.built(), 1);
   assert_eq!(pool.idle(), 1);
}

#[tokio::test]
async fn test_released_element_goes_to_waiter_not_free_list() {
   let pool = ResourcePool::<u32, ()>::new(1, || async { Ok(42) });
   let guard = pool.acquire().await.unwrap();

   let waiter = tokio::spawn({
      let pool = pool.clone();
      async move { pool.acquire().await.unwrap().detach() }
   });
   wait_for_waiters(&pool, 1).await;

   drop(guard);
   assert_eq!(pool.idle(), 0);

   let element = waiter.await.unwrap();
   assert_eq!(element, 42);
   assert_eq!(pool.idle(), 0);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancelled_waiter_is_skipped() {
   let pool = ResourcePool::<u32, ()>::new(1, || async { Ok(1) });
   let held = pool.get().await.unwrap();

   let abandoned = tokio::spawn({
      let pool = pool.clone();
      async move { pool.get().await }
   });
   wait_for_waiters(&pool, 1).await;
   abandoned.abort();
   assert!(abandoned.await.unwrap_err().is_cancelled());
   assert_eq!(pool.waiting(), 0);

   let patient = tokio::spawn({
      let pool = pool.clone();
      async move { pool.get().await }
   });
   wait_for_waiters(&pool, 1).await;

   pool.release(held);
   assert_eq!(patient.await.unwrap(), Ok(1));
   assert_eq!(pool.built(), 1);
}

#[tokio::test]
async fn test_cancelled_get_with_nobody_waiting_keeps_element() {
   let pool = ResourcePool::<u32, ()>::new(1, || async { Ok(3) });
   let held = pool.get().await.unwrap();

   let abandoned = tokio::spawn({
      let pool = pool.clone();
      async move { pool.get().await }
   });
   wait_for_waiters(&pool, 1).await;
   abandoned.abort();
   let _ = abandoned.await;

   pool.release(held);
   assert_eq!(pool.idle(), 1);
   assert_eq!(pool.get().await, Ok(3));
}
