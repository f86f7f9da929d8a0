//! Store - serialized state container.
//!
//! A Store pairs a pure reducer with an ordered middleware pipeline. All
//! mutation flows through `dispatch`; reducer applications are totally
//! ordered behind a commit gate and every committed state is published to
//! subscribers exactly once, in commit order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::middleware::MiddlewarePipeline;

/// Pure state transition function. Must be total: any condition that could
/// invalidate it has to be deflected in middleware before it runs.
pub type Reducer<S, A> = Box<dyn Fn(&S, A) -> S + Send + Sync>;

type Callback<S> = Arc<dyn Fn(&S) + Send + Sync>;
type SubscriberMap<S> = Arc<StdMutex<HashMap<u64, Callback<S>>>>;

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("middleware stage '{stage}' failed: {message}")]
    Middleware { stage: String, message: String },

    #[error("action sequence failed: {0}")]
    Sequence(String),
}

/// Drop guard for a state-change subscription.
///
/// The store keeps only a non-owning handle to the callback: dropping this
/// token unsubscribes it.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Serialized state container with an async middleware pipeline.
pub struct Store<S, A> {
    state: RwLock<S>,
    reducer: Reducer<S, A>,
    pipeline: MiddlewarePipeline<A>,
    subscribers: SubscriberMap<S>,
    next_subscriber_id: AtomicU64,
    /// Orders reduce + commit + notify across concurrent dispatches.
    commit_gate: Mutex<()>,
}

impl<S, A> Store<S, A>
where
    S: Clone + PartialEq + Default + Send + Sync + 'static,
    A: Send + 'static,
{
    /// Create a store with an identity (empty) pipeline, starting from
    /// the state type's default value.
    pub fn new(reducer: impl Fn(&S, A) -> S + Send + Sync + 'static) -> Self {
        Self::with_middleware(reducer, MiddlewarePipeline::new())
    }

    /// Create a store with an ordered middleware pipeline.
    pub fn with_middleware(
        reducer: impl Fn(&S, A) -> S + Send + Sync + 'static,
        pipeline: MiddlewarePipeline<A>,
    ) -> Self {
        Self {
            state: RwLock::new(S::default()),
            reducer: Box::new(reducer),
            pipeline,
            subscribers: Arc::new(StdMutex::new(HashMap::new())),
            next_subscriber_id: AtomicU64::new(0),
            commit_gate: Mutex::new(()),
        }
    }

    /// Replace the initial state. Intended for construction time, before
    /// the store is shared.
    pub fn with_state(self, state: S) -> Self {
        Self {
            state: RwLock::new(state),
            ..self
        }
    }

    /// Snapshot of the current state. Reads never observe a
    /// partially-applied action.
    pub async fn state(&self) -> S {
        self.state.read().await.clone()
    }

    /// Feed an action through the middleware pipeline and, unless a stage
    /// absorbed it, through the reducer.
    ///
    /// A commit that leaves the state unchanged notifies nobody. Middleware
    /// failures surface to the caller; the reducer itself cannot fail.
    pub async fn dispatch(&self, action: A) -> Result<(), StoreError> {
        // Side effects happen here, before any lock is taken: a suspended
        // stage delays only its own dispatch.
        let Some(action) = self.pipeline.run(action).await? else {
            return Ok(());
        };

        let _gate = self.commit_gate.lock().await;
        let new_state = {
            let current = self.state.read().await;
            let new_state = (self.reducer)(&*current, action);
            if new_state == *current {
                tracing::trace!("dispatch left state unchanged, skipping commit");
                return Ok(());
            }
            new_state
        };
        *self.state.write().await = new_state.clone();
        self.notify(&new_state);
        Ok(())
    }

    /// Dispatch every element of an action sequence, in order.
    pub async fn dispatch_all<St>(&self, actions: St) -> Result<(), StoreError>
    where
        St: Stream<Item = A> + Send,
    {
        tokio::pin!(actions);
        while let Some(action) = actions.next().await {
            self.dispatch(action).await?;
        }
        Ok(())
    }

    /// Dispatch every element of a fallible action sequence, in order.
    ///
    /// Stops at the first sequence error, which surfaces to the caller
    /// rather than being swallowed.
    pub async fn try_dispatch_all<St, E>(&self, actions: St) -> Result<(), StoreError>
    where
        St: Stream<Item = Result<A, E>> + Send,
        E: std::fmt::Display,
    {
        tokio::pin!(actions);
        while let Some(item) = actions.next().await {
            let action = item.map_err(|e| StoreError::Sequence(e.to_string()))?;
            self.dispatch(action).await?;
        }
        Ok(())
    }

    /// Register a callback invoked after every committed mutation.
    ///
    /// The returned token must be kept alive for the subscription to remain
    /// active; dropping it unsubscribes.
    pub fn subscribe(&self, callback: impl Fn(&S) + Send + Sync + 'static) -> Subscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(callback));

        let subscribers = Arc::downgrade(&self.subscribers);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(subscribers) = subscribers.upgrade() {
                    subscribers
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&id);
                }
            })),
        }
    }

    fn notify(&self, state: &S) {
        // Clone the callback list out so a callback that subscribes or
        // unsubscribes does not deadlock on the map.
        let callbacks: Vec<Callback<S>> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for callback in callbacks {
            callback(state);
        }
    }
}
