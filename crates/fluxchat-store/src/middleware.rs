//! Middleware abstraction and sequential pipeline composition.
//!
//! A middleware stage is the only place where a dispatch may perform
//! asynchronous side effects. Stages are composed strictly in order:
//! stage i's output action is stage i+1's input.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::store::StoreError;

/// Error raised by a middleware stage. The pipeline attaches the stage
/// name before surfacing it to the dispatcher.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct MiddlewareError(String);

impl MiddlewareError {
    /// Create a new middleware error with a human-readable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A named async stage in a store's dispatch pipeline.
///
/// A stage that does not recognize the action's shape must return it
/// unchanged. A stage that recognizes it may perform async work and return
/// a new action to continue the chain, or return `Ok(None)` to absorb the
/// dispatch silently. Returning `Err` fails the whole dispatch.
#[async_trait]
pub trait Middleware<A>: Send + Sync {
    /// Stage name, used in error reporting and logs.
    fn name(&self) -> &str;

    /// Observe, transform, or absorb an action.
    async fn handle(&self, action: A) -> Result<Option<A>, MiddlewareError>;
}

/// Ordered chain of middleware stages.
///
/// Stage order is a published contract of the store that owns the pipeline:
/// a stage whose output another stage depends on must be registered first.
pub struct MiddlewarePipeline<A> {
    stages: Vec<Arc<dyn Middleware<A>>>,
}

impl<A> MiddlewarePipeline<A> {
    /// Create an empty (identity) pipeline.
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Create a pipeline from an ordered list of stages.
    pub fn with_stages(stages: Vec<Arc<dyn Middleware<A>>>) -> Self {
        Self { stages }
    }

    /// Append a stage at the end of the chain.
    pub fn push(&mut self, stage: Arc<dyn Middleware<A>>) {
        self.stages.push(stage);
    }

    /// Number of registered stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline is the identity.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run an action through every stage in order.
    ///
    /// Returns `Ok(None)` as soon as any stage absorbs the action.
    pub async fn run(&self, action: A) -> Result<Option<A>, StoreError> {
        let mut current = action;
        for stage in &self.stages {
            match stage.handle(current).await {
                Ok(Some(next)) => current = next,
                Ok(None) => {
                    tracing::debug!(stage = stage.name(), "action absorbed by middleware");
                    return Ok(None);
                }
                Err(err) => {
                    return Err(StoreError::Middleware {
                        stage: stage.name().to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }
        Ok(Some(current))
    }
}

impl<A> Default for MiddlewarePipeline<A> {
    fn default() -> Self {
        Self::new()
    }
}
