//! # Fluxchat Chat
//!
//! Chat domain store built on the fluxchat engine:
//! - ChatState / ChatAction and their reducer
//! - Named middleware stages: stream_response, acquire_api_key,
//!   probe_test_key (in that order; the order is a published contract)
//! - Collaborator seams: ChatProvider (streamed completions) and
//!   CredentialStore (named secrets)
//! - Router-tree wiring for the `get_api_key` credential signal
//!
//! This crate does NOT care about:
//! - How responses are rendered
//! - How the provider talks HTTP/SSE
//! - Where credentials are persisted

mod credentials;
mod middleware;
mod provider;
mod signals;
mod state;

pub use credentials::{CredentialStore, MemoryCredentialStore};
pub use middleware::{AcquireApiKeyStage, ProbeTestKeyStage, StreamResponseStage};
pub use provider::{ChatProvider, FragmentStream, ProviderError};
pub use signals::{ApiKeyDownstream, ApiKeyUpstream};
pub use state::{ChatAction, ChatState};

use std::sync::Arc;

use fluxchat_router::RouterStore;
use fluxchat_store::{MiddlewarePipeline, Store, StoreError};

/// Signal raised when the chat surface needs a provider credential.
pub const GET_API_KEY: &str = "get_api_key";

/// Payload kind carried by `get_api_key` responses.
pub const API_KEY_KIND: &str = "api_key";

/// Store type for one chat surface.
pub type ChatStore = Store<ChatState, ChatAction>;

/// Build a chat store with the full middleware pipeline.
///
/// `router` is the routing store of the node presenting this surface;
/// `key_name` is the credential entry holding the provider key.
pub fn new_chat_store(
    credentials: Arc<dyn CredentialStore>,
    key_name: impl Into<String>,
    router: Arc<RouterStore>,
) -> ChatStore {
    let pipeline = MiddlewarePipeline::with_stages(vec![
        Arc::new(StreamResponseStage),
        Arc::new(AcquireApiKeyStage::new(credentials, key_name, router)),
        Arc::new(ProbeTestKeyStage),
    ]);
    Store::with_middleware(state::reduce, pipeline)
}

/// Ask the provider for a response to `prompt` and park the fragment
/// stream in state. Provider failures become domain errors, never faults.
pub async fn request_response(
    store: &ChatStore,
    provider: &dyn ChatProvider,
    prompt: &str,
) -> Result<(), StoreError> {
    store
        .dispatch(ChatAction::SetPrompt(prompt.to_string()))
        .await?;
    match provider.fetch_response_stream(prompt).await {
        Ok(stream) => store.dispatch(ChatAction::SetStream(Some(stream))).await,
        Err(err) => store.dispatch(ChatAction::ThrowError(err.to_string())).await,
    }
}

/// Drain the in-flight stream one fragment per dispatch, until the stream
/// field clears. Each increment commits separately, so consumption stays
/// observable and cancellable between fragments.
pub async fn pump_stream(store: &ChatStore) -> Result<(), StoreError> {
    loop {
        let state = store.state().await;
        if !state.error.is_empty() {
            return Ok(());
        }
        let Some(stream) = state.stream else {
            return Ok(());
        };
        store
            .dispatch(ChatAction::StreamResponse {
                stream,
                accumulated: state.response,
            })
            .await?;
    }
}
