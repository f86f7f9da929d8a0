//! Router node and tree.
//!
//! A Router owns one routing store, named child nodes, and named leaf
//! views. It reacts to committed changes of its own store and its parent's
//! store by re-running `route`, which performs at most one of:
//! - pending navigation (always wins)
//! - upstream signal bubbling toward the root
//! - downstream response delivery back toward the signal's origin
//!
//! Every branch re-reads the freshest state on entry, so redundant triggers
//! are harmless. Mis-wiring (unknown route, self-route, signal-name
//! mismatch) is fatal.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock as StdRwLock, Weak};

use async_trait::async_trait;
use tokio::sync::Mutex;

use fluxchat_store::Subscription;

use crate::state::{RouterAction, RouterStore};

/// Opaque presentation handle attached to a leaf view name.
pub type ViewHandle = Arc<dyn Any + Send + Sync>;

/// Presentation layer seam.
///
/// Purely reactive: it receives install instructions and produces no
/// feedback other than user-initiated dispatches. Implementations are
/// responsible for marshalling onto their single UI-affinity execution
/// context.
#[async_trait]
pub trait Presenter: Send + Sync {
    /// Install `view` as the active presentation for `path`.
    async fn install(&self, path: &str, view: ViewHandle);
}

/// Start behavior for a node, invoked when navigation activates it.
#[async_trait]
pub trait RouteActivator: Send + Sync {
    async fn start(&self);
}

/// Activator for nodes whose children drive all presentation.
pub struct NoopActivator;

#[async_trait]
impl RouteActivator for NoopActivator {
    async fn start(&self) {}
}

/// Resolver for a signal raised at this node (or bubbled into it).
#[async_trait]
pub trait UpstreamResolver: Send + Sync {
    /// Satisfy the request, either by dispatching `Respond` on the node's
    /// own store or by navigating to a view that will eventually supply
    /// the response.
    async fn resolve(&self, signal: &str);
}

/// Resolver invoked when a response is delivered back into this node.
#[async_trait]
pub trait DownstreamResolver: Send + Sync {
    async fn deliver(&self, signal: &str, response: &str);
}

struct SignalHandlers {
    upstream: Option<Arc<dyn UpstreamResolver>>,
    downstream: Option<Arc<dyn DownstreamResolver>>,
}

/// A node in the routing tree.
///
/// Children are owned by the parent's map; the parent link is non-owning.
/// Nodes are created once at startup and live for the process lifetime.
pub struct Router {
    name: String,
    path: String,
    store: Arc<RouterStore>,
    parent: Weak<Router>,
    children: StdRwLock<HashMap<String, Arc<Router>>>,
    views: StdRwLock<HashMap<String, ViewHandle>>,
    handlers: StdRwLock<HashMap<String, SignalHandlers>>,
    presenter: Arc<dyn Presenter>,
    activator: StdRwLock<Arc<dyn RouteActivator>>,
    /// Serializes route executions for this node; each execution re-reads
    /// state after acquiring it.
    route_gate: Mutex<()>,
    subscriptions: StdMutex<Vec<Subscription>>,
}

impl Router {
    /// Create the root node of a tree.
    pub fn root(
        path: impl Into<String>,
        store: Arc<RouterStore>,
        presenter: Arc<dyn Presenter>,
        activator: Arc<dyn RouteActivator>,
    ) -> Arc<Self> {
        let path = path.into();
        let name = last_segment(&path).to_string();
        let router = Arc::new(Self {
            name,
            path,
            store,
            parent: Weak::new(),
            children: StdRwLock::new(HashMap::new()),
            views: StdRwLock::new(HashMap::new()),
            handlers: StdRwLock::new(HashMap::new()),
            presenter,
            activator: StdRwLock::new(activator),
            route_gate: Mutex::new(()),
            subscriptions: StdMutex::new(Vec::new()),
        });
        router.wire();
        router
    }

    /// Create a child node and attach it under its parent.
    ///
    /// The node is registered under the last segment of `path`, which the
    /// navigation algorithm matches against pending targets. The child
    /// inherits the parent's presenter.
    pub fn child(
        parent: &Arc<Router>,
        path: impl Into<String>,
        store: Arc<RouterStore>,
        activator: Arc<dyn RouteActivator>,
    ) -> Arc<Self> {
        let path = path.into();
        let name = last_segment(&path).to_string();
        if name.is_empty() {
            panic!("Router::child: path '{path}' has no module segment");
        }
        let router = Arc::new(Self {
            name: name.clone(),
            path,
            store,
            parent: Arc::downgrade(parent),
            children: StdRwLock::new(HashMap::new()),
            views: StdRwLock::new(HashMap::new()),
            handlers: StdRwLock::new(HashMap::new()),
            presenter: parent.presenter.clone(),
            activator: StdRwLock::new(activator),
            route_gate: Mutex::new(()),
            subscriptions: StdMutex::new(Vec::new()),
        });
        parent
            .children
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, router.clone());
        router.wire();
        router
    }

    /// Node name (last segment of its mount path).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mount path the node was constructed with.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The node's routing store.
    pub fn store(&self) -> &Arc<RouterStore> {
        &self.store
    }

    /// Register a leaf view under a module name.
    pub fn add_view(&self, name: impl Into<String>, view: ViewHandle) {
        self.views
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), view);
    }

    /// Register the resolvers for a signal name. Intended to be called once,
    /// at construction time.
    pub fn add_signal_handler(
        &self,
        signal: impl Into<String>,
        upstream: Option<Arc<dyn UpstreamResolver>>,
        downstream: Option<Arc<dyn DownstreamResolver>>,
    ) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(signal.into(), SignalHandlers { upstream, downstream });
    }

    /// Replace the start behavior. Intended for construction time, when the
    /// activator needs a handle back to the node it starts.
    pub fn set_activator(&self, activator: Arc<dyn RouteActivator>) {
        *self
            .activator
            .write()
            .unwrap_or_else(PoisonError::into_inner) = activator;
    }

    /// Invoke the node's start behavior.
    pub async fn start(&self) {
        let activator = self
            .activator
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        activator.start().await;
    }

    /// Re-run the navigation/signal algorithm against the freshest state.
    ///
    /// Runs automatically after every commit of this node's store or its
    /// parent's store; calling it redundantly is safe.
    pub async fn route(self: &Arc<Self>) {
        let _gate = self.route_gate.lock().await;
        let state = self.store.state().await;

        // Pending navigation wins over signal handling.
        if !state.next.is_empty() {
            self.navigate(&state.next, &state.path).await;
            return;
        }

        let Some(signal) = state.signal else {
            return;
        };
        if state.response.is_some() {
            // Already answered; waits for the domain to retire it.
            return;
        }

        let parent = self.parent.upgrade();
        let parent_state = match &parent {
            Some(parent) => Some(parent.store.state().await),
            None => None,
        };

        let parent_signal_pending = parent_state
            .as_ref()
            .is_some_and(|state| state.signal.is_some());

        if !parent_signal_pending {
            // Upstream request: resolve locally or bubble one hop up.
            let upstream = self
                .handlers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&signal)
                .and_then(|handlers| handlers.upstream.clone());
            if let Some(resolver) = upstream {
                tracing::debug!(router = %self.name, signal, "resolving signal locally");
                resolver.resolve(&signal).await;
                return;
            }
            match parent {
                Some(parent) => {
                    tracing::debug!(router = %self.name, signal, "forwarding signal upstream");
                    dispatch_routing(&parent.store, RouterAction::Signal(signal)).await;
                }
                None => {
                    // Wiring gap: nothing above can answer. Left observable
                    // in the root store so a supervisor can respond.
                    tracing::warn!(router = %self.name, signal, "signal reached the root with no resolver");
                }
            }
            return;
        }

        // Downstream delivery: the parent holds the answered request.
        let Some(parent) = parent else {
            return;
        };
        let Some(parent_state) = parent_state else {
            return;
        };
        let (Some(parent_signal), Some(response)) = (parent_state.signal, parent_state.response)
        else {
            return;
        };
        if signal != parent_signal {
            panic!(
                "Router::route: signal mismatch during delivery: '{signal}' vs parent '{parent_signal}'"
            );
        }
        tracing::debug!(router = %self.name, signal, "delivering response downstream");
        dispatch_routing(&parent.store, RouterAction::ClearSignal).await;
        dispatch_routing(&self.store, RouterAction::ClearSignal).await;
        dispatch_routing(&self.store, RouterAction::Respond(response.clone())).await;
        let downstream = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&signal)
            .and_then(|handlers| handlers.downstream.clone());
        if let Some(resolver) = downstream {
            resolver.deliver(&signal, &response).await;
        }
    }

    async fn navigate(&self, next: &str, current_path: &str) {
        if next == current_path {
            panic!("Router::route: route to self '{next}'");
        }
        let module = last_segment(next);
        if module.is_empty() {
            panic!("Router::route: missing module in '{next}'");
        }

        let child = self
            .children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(module)
            .cloned();
        if let Some(child) = child {
            tracing::info!(router = %self.name, target = next, "routing to child node");
            dispatch_routing(&self.store, RouterAction::SetNext(String::new())).await;
            dispatch_routing(&child.store, RouterAction::SetPath(next.to_string())).await;
            child.start().await;
            return;
        }

        let view = self
            .views
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(module)
            .cloned();
        let Some(view) = view else {
            panic!("Router::route: unknown route '{next}'");
        };
        tracing::info!(router = %self.name, target = next, "routing to leaf view");
        if module == current_path {
            // SetPath on the active module is a reducer no-op and would
            // leave `next` set, so consume it here before re-installing.
            dispatch_routing(&self.store, RouterAction::SetNext(String::new())).await;
        } else {
            // SetPath consumes `next` in the same transition.
            dispatch_routing(&self.store, RouterAction::SetPath(module.to_string())).await;
        }
        self.presenter.install(module, view).await;
    }

    fn wire(self: &Arc<Self>) {
        let mut subscriptions = Vec::new();
        let weak = Arc::downgrade(self);
        subscriptions.push(self.store.subscribe(move |_| spawn_route(weak.clone())));
        if let Some(parent) = self.parent.upgrade() {
            let weak = Arc::downgrade(self);
            subscriptions.push(parent.store.subscribe(move |_| spawn_route(weak.clone())));
        }
        *self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = subscriptions;
    }
}

fn spawn_route(router: Weak<Router>) {
    tokio::spawn(async move {
        if let Some(router) = router.upgrade() {
            router.route().await;
        }
    });
}

/// Routing stores carry no middleware, so dispatch cannot fail; log instead
/// of propagating to keep the reactive path infallible.
async fn dispatch_routing(store: &RouterStore, action: RouterAction) {
    if let Err(err) = store.dispatch(action).await {
        tracing::error!(%err, "routing dispatch failed");
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::new_router_store;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct RecordingPresenter {
        installs: StdMutex<Vec<(String, String)>>,
    }

    impl RecordingPresenter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                installs: StdMutex::new(Vec::new()),
            })
        }

        fn installed(&self) -> Vec<(String, String)> {
            self.installs.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl Presenter for RecordingPresenter {
        async fn install(&self, path: &str, view: ViewHandle) {
            let label = view
                .downcast_ref::<String>()
                .cloned()
                .unwrap_or_else(|| "<opaque>".to_string());
            self.installs
                .lock()
                .expect("lock")
                .push((path.to_string(), label));
        }
    }

    struct CountingActivator {
        starts: AtomicUsize,
    }

    impl CountingActivator {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                starts: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RouteActivator for CountingActivator {
        async fn start(&self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct RecordingDownstream {
        deliveries: StdMutex<Vec<(String, String)>>,
    }

    impl RecordingDownstream {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                deliveries: StdMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl DownstreamResolver for RecordingDownstream {
        async fn deliver(&self, signal: &str, response: &str) {
            self.deliveries
                .lock()
                .expect("lock")
                .push((signal.to_string(), response.to_string()));
        }
    }

    struct RespondingUpstream {
        store: Arc<RouterStore>,
        response: String,
    }

    #[async_trait]
    impl UpstreamResolver for RespondingUpstream {
        async fn resolve(&self, _signal: &str) {
            dispatch_routing(&self.store, RouterAction::Respond(self.response.clone())).await;
        }
    }

    async fn wait_until<F, Fut>(mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if condition().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached before timeout");
    }

    fn two_node_tree() -> (Arc<Router>, Arc<Router>, Arc<RecordingPresenter>) {
        let presenter = RecordingPresenter::new();
        let root = Router::root(
            "/",
            Arc::new(new_router_store()),
            presenter.clone(),
            Arc::new(NoopActivator),
        );
        let child = Router::child(
            &root,
            "/chat",
            Arc::new(new_router_store()),
            Arc::new(NoopActivator),
        );
        (root, child, presenter)
    }

    #[tokio::test]
    async fn test_navigation_to_child_activates_it() {
        let presenter = RecordingPresenter::new();
        let root = Router::root(
            "/",
            Arc::new(new_router_store()),
            presenter,
            Arc::new(NoopActivator),
        );
        let activator = CountingActivator::new();
        let chat = Router::child(
            &root,
            "/chat",
            Arc::new(new_router_store()),
            activator.clone(),
        );

        dispatch_routing(root.store(), RouterAction::SetNext("/chat".to_string())).await;

        wait_until(|| {
            let chat = chat.clone();
            async move { chat.store().state().await.path == "/chat" }
        })
        .await;
        wait_until(|| {
            let root = root.clone();
            async move { root.store().state().await.next.is_empty() }
        })
        .await;
        assert_eq!(activator.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_navigation_to_leaf_installs_view() {
        let presenter = RecordingPresenter::new();
        let root = Router::root(
            "/",
            Arc::new(new_router_store()),
            presenter.clone(),
            Arc::new(NoopActivator),
        );
        root.add_view("settings", Arc::new("settings-view".to_string()));

        dispatch_routing(root.store(), RouterAction::SetNext("/settings".to_string())).await;

        wait_until(|| {
            let root = root.clone();
            async move { root.store().state().await.path == "settings" }
        })
        .await;
        assert_eq!(
            presenter.installed(),
            vec![("settings".to_string(), "settings-view".to_string())]
        );
    }

    #[tokio::test]
    async fn test_renavigating_to_active_leaf_consumes_next() {
        let presenter = RecordingPresenter::new();
        let root = Router::root(
            "/",
            Arc::new(new_router_store()),
            presenter.clone(),
            Arc::new(NoopActivator),
        );
        root.add_view("settings", Arc::new("settings-view".to_string()));

        dispatch_routing(root.store(), RouterAction::SetNext("/settings".to_string())).await;
        wait_until(|| {
            let root = root.clone();
            async move { root.store().state().await.path == "settings" }
        })
        .await;

        dispatch_routing(root.store(), RouterAction::SetNext("/settings".to_string())).await;
        wait_until(|| {
            let presenter = presenter.clone();
            async move { presenter.installed().len() == 2 }
        })
        .await;

        let state = root.store().state().await;
        assert_eq!(state.path, "settings");
        assert!(state.next.is_empty());
        assert_eq!(
            presenter.installed(),
            vec![
                ("settings".to_string(), "settings-view".to_string()),
                ("settings".to_string(), "settings-view".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_signal_bubbles_to_root_and_response_returns() {
        let (root, child, _presenter) = two_node_tree();
        let downstream = RecordingDownstream::new();
        child.add_signal_handler("credential", None, Some(downstream.clone()));

        dispatch_routing(child.store(), RouterAction::Signal("credential".to_string())).await;

        wait_until(|| {
            let root = root.clone();
            async move { root.store().state().await.signal.as_deref() == Some("credential") }
        })
        .await;

        dispatch_routing(root.store(), RouterAction::Respond("Y".to_string())).await;

        wait_until(|| {
            let child = child.clone();
            async move {
                let state = child.store().state().await;
                state.signal.is_none() && state.response.as_deref() == Some("Y")
            }
        })
        .await;
        wait_until(|| {
            let root = root.clone();
            async move {
                let state = root.store().state().await;
                state.signal.is_none() && state.response.is_none()
            }
        })
        .await;

        // Unrelated churn must not re-deliver.
        dispatch_routing(root.store(), RouterAction::Respond("Z".to_string())).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            downstream.deliveries.lock().expect("lock").clone(),
            vec![("credential".to_string(), "Y".to_string())]
        );
    }

    #[tokio::test]
    async fn test_local_upstream_resolver_answers_without_bubbling() {
        let (root, child, _presenter) = two_node_tree();
        let upstream = Arc::new(RespondingUpstream {
            store: child.store().clone(),
            response: "local".to_string(),
        });
        child.add_signal_handler("credential", Some(upstream), None);

        dispatch_routing(child.store(), RouterAction::Signal("credential".to_string())).await;

        wait_until(|| {
            let child = child.clone();
            async move { child.store().state().await.response.as_deref() == Some("local") }
        })
        .await;
        assert_eq!(root.store().state().await.signal, None);
    }

    #[tokio::test]
    async fn test_response_without_signal_is_inert() {
        let (root, child, _presenter) = two_node_tree();

        dispatch_routing(root.store(), RouterAction::Respond("orphan".to_string())).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let state = child.store().state().await;
        assert_eq!(state.signal, None);
        assert_eq!(state.response, None);

        // A later signal picks the stale answer up through the normal path.
        dispatch_routing(root.store(), RouterAction::Signal("credential".to_string())).await;
        dispatch_routing(child.store(), RouterAction::Signal("credential".to_string())).await;
        wait_until(|| {
            let child = child.clone();
            async move { child.store().state().await.response.as_deref() == Some("orphan") }
        })
        .await;
    }

    #[tokio::test]
    #[should_panic(expected = "unknown route")]
    async fn test_unknown_module_is_fatal() {
        let (root, _child, _presenter) = two_node_tree();
        dispatch_routing(root.store(), RouterAction::SetNext("/nowhere".to_string())).await;
        root.route().await;
    }

    #[tokio::test]
    #[should_panic(expected = "route to self")]
    async fn test_self_route_is_fatal() {
        let presenter = RecordingPresenter::new();
        let root = Router::root(
            "/",
            Arc::new(new_router_store()),
            presenter,
            Arc::new(NoopActivator),
        );
        root.add_view("settings", Arc::new("settings-view".to_string()));
        dispatch_routing(root.store(), RouterAction::SetNext("/settings".to_string())).await;
        wait_until(|| {
            let root = root.clone();
            async move { root.store().state().await.path == "settings" }
        })
        .await;

        dispatch_routing(root.store(), RouterAction::SetNext("settings".to_string())).await;
        root.route().await;
    }

    #[tokio::test]
    async fn test_unresolved_signal_rests_at_root() {
        let (root, child, _presenter) = two_node_tree();
        dispatch_routing(child.store(), RouterAction::Signal("orphaned".to_string())).await;

        wait_until(|| {
            let root = root.clone();
            async move { root.store().state().await.signal.as_deref() == Some("orphaned") }
        })
        .await;
        // No panic: the unresolved signal stays observable at the root.
        assert_eq!(child.store().state().await.response, None);
    }
}
