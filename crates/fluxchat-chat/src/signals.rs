//! Credential signal wiring for the router tree.
//!
//! The root node resolves `get_api_key` upstream: answer from the
//! credential store when possible, otherwise navigate to the key-entry
//! view that will eventually supply the response. The chat node consumes
//! the delivered payload downstream: persist the key and restart its
//! presentation.

use std::sync::{Arc, Weak};

use async_trait::async_trait;

use fluxchat_router::{
    DownstreamResolver, Router, RouterAction, RouterStore, SignalPayload, UpstreamResolver,
};

use crate::credentials::CredentialStore;
use crate::API_KEY_KIND;

/// Root-side resolver for the credential request.
pub struct ApiKeyUpstream {
    store: Arc<RouterStore>,
    credentials: Arc<dyn CredentialStore>,
    key_name: String,
    key_view_path: String,
}

impl ApiKeyUpstream {
    /// `store` is the resolving node's own routing store; `key_view_path`
    /// is the route of the view that collects a key from the user.
    pub fn new(
        store: Arc<RouterStore>,
        credentials: Arc<dyn CredentialStore>,
        key_name: impl Into<String>,
        key_view_path: impl Into<String>,
    ) -> Self {
        Self {
            store,
            credentials,
            key_name: key_name.into(),
            key_view_path: key_view_path.into(),
        }
    }
}

#[async_trait]
impl UpstreamResolver for ApiKeyUpstream {
    async fn resolve(&self, signal: &str) {
        if let Some(key) = self.credentials.get(&self.key_name) {
            tracing::debug!(signal, "answering credential request from store");
            let payload = SignalPayload::new(API_KEY_KIND, key);
            dispatch_or_log(&self.store, RouterAction::Respond(payload.to_string())).await;
            return;
        }
        let module = last_segment(&self.key_view_path);
        if self.store.state().await.path != module {
            tracing::debug!(signal, view = %self.key_view_path, "routing to key-entry view");
            dispatch_or_log(
                &self.store,
                RouterAction::SetNext(self.key_view_path.clone()),
            )
            .await;
        }
    }
}

/// Chat-side consumer of the delivered credential.
pub struct ApiKeyDownstream {
    credentials: Arc<dyn CredentialStore>,
    key_name: String,
    router: Weak<Router>,
}

impl ApiKeyDownstream {
    /// `router` is the node to restart once the key is persisted; the link
    /// is non-owning.
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        key_name: impl Into<String>,
        router: Weak<Router>,
    ) -> Self {
        Self {
            credentials,
            key_name: key_name.into(),
            router,
        }
    }
}

#[async_trait]
impl DownstreamResolver for ApiKeyDownstream {
    async fn deliver(&self, signal: &str, response: &str) {
        // A payload that does not decode is a wiring defect, not a
        // transient condition.
        let payload = match response.parse::<SignalPayload>() {
            Ok(payload) => payload,
            Err(err) => panic!("ApiKeyDownstream::deliver: {err}"),
        };
        if payload.kind != API_KEY_KIND {
            panic!(
                "ApiKeyDownstream::deliver: unexpected payload kind '{}' for signal '{signal}'",
                payload.kind
            );
        }
        self.credentials.set(&self.key_name, &payload.value);
        if let Some(router) = self.router.upgrade() {
            router.start().await;
        }
    }
}

async fn dispatch_or_log(store: &RouterStore, action: RouterAction) {
    if let Err(err) = store.dispatch(action).await {
        tracing::error!(%err, "router dispatch failed");
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use fluxchat_router::new_router_store;

    #[tokio::test]
    async fn test_upstream_answers_from_credential_store() {
        let store = Arc::new(new_router_store());
        let credentials = Arc::new(MemoryCredentialStore::new());
        credentials.set("api_key", "sk-present");
        let resolver = ApiKeyUpstream::new(
            store.clone(),
            credentials,
            "api_key",
            "/get_api_key",
        );

        resolver.resolve("get_api_key").await;

        assert_eq!(
            store.state().await.response.as_deref(),
            Some("api_key:sk-present")
        );
    }

    #[tokio::test]
    async fn test_upstream_navigates_on_miss() {
        let store = Arc::new(new_router_store());
        let resolver = ApiKeyUpstream::new(
            store.clone(),
            Arc::new(MemoryCredentialStore::new()),
            "api_key",
            "/get_api_key",
        );

        resolver.resolve("get_api_key").await;

        assert_eq!(store.state().await.next, "/get_api_key");
        assert_eq!(store.state().await.response, None);
    }

    #[tokio::test]
    async fn test_downstream_persists_the_key() {
        let credentials = Arc::new(MemoryCredentialStore::new());
        let resolver = ApiKeyDownstream::new(credentials.clone(), "api_key", Weak::new());

        resolver.deliver("get_api_key", "api_key:sk-42").await;

        assert_eq!(credentials.get("api_key").as_deref(), Some("sk-42"));
    }

    #[tokio::test]
    #[should_panic(expected = "malformed signal payload")]
    async fn test_downstream_rejects_malformed_payload() {
        let resolver = ApiKeyDownstream::new(
            Arc::new(MemoryCredentialStore::new()),
            "api_key",
            Weak::new(),
        );
        resolver.deliver("get_api_key", "not-a-payload").await;
    }

    #[tokio::test]
    #[should_panic(expected = "unexpected payload kind")]
    async fn test_downstream_rejects_wrong_kind() {
        let resolver = ApiKeyDownstream::new(
            Arc::new(MemoryCredentialStore::new()),
            "api_key",
            Weak::new(),
        );
        resolver.deliver("get_api_key", "session_token:abc").await;
    }
}
