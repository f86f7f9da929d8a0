//! Chat middleware stages.
//!
//! Published order, a contract of the chat store:
//! 1. `stream_response`: advances an in-flight response stream
//! 2. `acquire_api_key`: resolves or signals for the provider credential
//! 3. `probe_test_key`: validates a candidate key against the provider

use std::sync::Arc;

use async_trait::async_trait;

use fluxchat_router::{RouterAction, RouterStore};
use fluxchat_store::{Middleware, MiddlewareError};

use crate::credentials::CredentialStore;
use crate::state::ChatAction;
use crate::GET_API_KEY;

/// Advance a streamed response by exactly one fragment.
///
/// Each dispatch pulls one fragment and re-emits either an accumulated
/// update or the end-of-stream action. Callers drive consumption by
/// re-dispatching until the stream field clears, so every increment is
/// independently observable and cancellable.
pub struct StreamResponseStage;

#[async_trait]
impl Middleware<ChatAction> for StreamResponseStage {
    fn name(&self) -> &str {
        "stream_response"
    }

    async fn handle(&self, action: ChatAction) -> Result<Option<ChatAction>, MiddlewareError> {
        match action {
            ChatAction::StreamResponse {
                stream,
                accumulated,
            } => match stream.next_fragment().await {
                Some(Ok(fragment)) => Ok(Some(ChatAction::UpdateResponse(format!(
                    "{accumulated}{fragment}"
                )))),
                Some(Err(err)) => {
                    // Runtime tier: convert to a domain error, do not fail
                    // the dispatch.
                    tracing::warn!(%err, "response stream failed");
                    Ok(Some(ChatAction::ThrowError(err.to_string())))
                }
                None => Ok(Some(ChatAction::EndResponse)),
            },
            other => Ok(Some(other)),
        }
    }
}

/// Resolve the provider credential, signaling the router tree on a miss.
pub struct AcquireApiKeyStage {
    credentials: Arc<dyn CredentialStore>,
    key_name: String,
    router: Arc<RouterStore>,
}

impl AcquireApiKeyStage {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        key_name: impl Into<String>,
        router: Arc<RouterStore>,
    ) -> Self {
        Self {
            credentials,
            key_name: key_name.into(),
            router,
        }
    }
}

#[async_trait]
impl Middleware<ChatAction> for AcquireApiKeyStage {
    fn name(&self) -> &str {
        "acquire_api_key"
    }

    async fn handle(&self, action: ChatAction) -> Result<Option<ChatAction>, MiddlewareError> {
        match action {
            ChatAction::AcquireApiKey => {
                if let Some(key) = self.credentials.get(&self.key_name) {
                    return Ok(Some(ChatAction::SetApiKey(key)));
                }
                // No raise while an answer is already in flight.
                if self.router.state().await.response.is_none() {
                    self.router
                        .dispatch(RouterAction::Signal(GET_API_KEY.to_string()))
                        .await
                        .map_err(|err| MiddlewareError::new(err.to_string()))?;
                }
                Ok(Some(ChatAction::AcquireApiKey))
            }
            other => Ok(Some(other)),
        }
    }
}

/// Probe a candidate key: the first fragment proves it works.
pub struct ProbeTestKeyStage;

#[async_trait]
impl Middleware<ChatAction> for ProbeTestKeyStage {
    fn name(&self) -> &str {
        "probe_test_key"
    }

    async fn handle(&self, action: ChatAction) -> Result<Option<ChatAction>, MiddlewareError> {
        match action {
            ChatAction::ProbeTestKey { stream, key } => match stream.next_fragment().await {
                Some(Ok(_)) => Ok(Some(ChatAction::SetApiKey(key))),
                _ => Ok(Some(ChatAction::SetTestKey(String::new()))),
            },
            other => Ok(Some(other)),
        }
    }
}
