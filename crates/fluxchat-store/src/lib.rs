//! # Fluxchat Store
//!
//! Generic, concurrency-safe state container with an async middleware
//! pipeline:
//! - Store: one immutable state value, pure reducer, serialized dispatch
//! - Middleware: named async stages that transform or absorb actions
//! - Subscription: drop-guard tokens for state-change callbacks
//!
//! This crate does NOT care about:
//! - What the state represents
//! - Where actions come from
//! - How subscribers render the state they receive

mod middleware;
mod store;

pub use middleware::{Middleware, MiddlewareError, MiddlewarePipeline};
pub use store::{Reducer, Store, StoreError, Subscription};
