//! Streaming completion provider seam.
//!
//! The transport (HTTP/SSE) lives behind `ChatProvider`; the core only sees
//! a finite, single-pass sequence of text fragments.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::sync::Mutex;

/// Provider error types
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("decode error: {0}")]
    Decode(String),
}

/// Cloneable handle to a single-pass sequence of text fragments.
///
/// Every clone shares the same underlying stream, so one fragment pulled
/// through any handle is consumed for all of them. Equality is handle
/// identity, which lets states carrying a stream stay comparable.
#[derive(Clone)]
pub struct FragmentStream {
    inner: Arc<Mutex<BoxStream<'static, Result<String, ProviderError>>>>,
}

impl FragmentStream {
    /// Wrap a fragment stream into a shared handle.
    pub fn new(
        stream: impl Stream<Item = Result<String, ProviderError>> + Send + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(stream.boxed())),
        }
    }

    /// Build a handle over a fixed fragment list. Test and bootstrap
    /// convenience.
    pub fn from_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        I::IntoIter: Send + 'static,
        S: Into<String>,
    {
        Self::new(futures::stream::iter(
            fragments.into_iter().map(|fragment| Ok(fragment.into())),
        ))
    }

    /// Pull exactly one fragment. `None` means the stream is exhausted.
    pub async fn next_fragment(&self) -> Option<Result<String, ProviderError>> {
        self.inner.lock().await.next().await
    }
}

impl PartialEq for FragmentStream {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for FragmentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FragmentStream(..)")
    }
}

/// Hosted completion API seam.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Open a fragment stream for a prompt. The stream is finite and not
    /// restartable; transport and API-level failures surface as errors the
    /// caller converts into domain error actions.
    async fn fetch_response_stream(&self, prompt: &str) -> Result<FragmentStream, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_one_pass() {
        tokio_test::block_on(async {
            let stream = FragmentStream::from_fragments(["a", "b"]);
            let other = stream.clone();

            let first = stream.next_fragment().await.expect("some").expect("ok");
            let second = other.next_fragment().await.expect("some").expect("ok");

            assert_eq!(first, "a");
            assert_eq!(second, "b");
            assert!(stream.next_fragment().await.is_none());
        });
    }

    #[test]
    fn test_equality_is_handle_identity() {
        let stream = FragmentStream::from_fragments(["a"]);
        assert_eq!(stream, stream.clone());
        assert_ne!(stream, FragmentStream::from_fragments(["a"]));
    }
}
