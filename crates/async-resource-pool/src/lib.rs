//! # async-resource-pool
//!
//! A bounded pool of lazily-built elements for async code.
//!
//! ## Core Types
//!
//! - **[`ResourcePool`]**: Hands out elements, building new ones on demand until
//!   `max_elements` exist, then suspends callers until an element is returned
//! - **[`Pooled`]**: RAII guard that returns its element to the pool on drop
//!
//! ## Fairness
//!
//! Callers that have to wait are queued in arrival order. A returned element is
//! handed straight to the longest-waiting caller instead of going back into the
//! free list, so a steady stream of new callers can never starve an old one.

mod pool;

pub use pool::{Pooled, ResourcePool};
