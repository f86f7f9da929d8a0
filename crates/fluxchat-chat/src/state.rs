//! Chat state machine: source of truth for one conversation surface.

use crate::provider::FragmentStream;

/// Chat domain state.
///
/// Runtime errors live in `error`/`error_shown` and are dismissed by a
/// dedicated clear action; they never travel through the routing signal
/// channel.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ChatState {
    /// Prompt being streamed, cleared when the response ends.
    pub prompt: String,
    /// In-flight fragment stream; absent once drained.
    pub stream: Option<FragmentStream>,
    /// Accumulated response text.
    pub response: String,
    /// Whether the response is being shared.
    pub sharing: bool,
    /// Human-readable runtime error, empty when none.
    pub error: String,
    /// Whether the error is currently presented.
    pub error_shown: bool,
    /// Active provider credential.
    pub api_key: Option<String>,
    /// Candidate key being probed before adoption.
    pub test_key: String,
}

/// Chat domain operations.
#[derive(Debug, Clone)]
pub enum ChatAction {
    SetPrompt(String),
    SetStream(Option<FragmentStream>),
    /// Advance the stream by exactly one fragment (handled in middleware).
    StreamResponse {
        stream: FragmentStream,
        accumulated: String,
    },
    UpdateResponse(String),
    EndResponse,
    SetSharing(bool),
    ThrowError(String),
    PresentError,
    ClearError,
    /// Obtain a credential: from the store if present, else by signaling
    /// the router tree (handled in middleware).
    AcquireApiKey,
    SetApiKey(String),
    SetTestKey(String),
    /// Probe a candidate key against the provider (handled in middleware).
    ProbeTestKey {
        stream: FragmentStream,
        key: String,
    },
}

pub(crate) fn reduce(state: &ChatState, action: ChatAction) -> ChatState {
    let mut new_state = state.clone();
    match action {
        ChatAction::SetPrompt(prompt) => {
            new_state.prompt = prompt;
            new_state.response.clear();
        }
        ChatAction::SetStream(stream) => {
            new_state.stream = stream;
            new_state.error.clear();
        }
        ChatAction::StreamResponse { .. } => {
            // Consumed by the stream_response middleware stage.
        }
        ChatAction::UpdateResponse(response) => {
            new_state.response = response;
        }
        ChatAction::EndResponse => {
            new_state.prompt.clear();
            new_state.stream = None;
        }
        ChatAction::SetSharing(sharing) => {
            new_state.sharing = sharing;
        }
        ChatAction::ThrowError(error) => {
            new_state.error = error;
        }
        ChatAction::PresentError => {
            if state.error_shown {
                return new_state;
            }
            new_state.error_shown = true;
        }
        ChatAction::ClearError => {
            if !state.error_shown {
                return new_state;
            }
            new_state.error_shown = false;
            new_state.error.clear();
        }
        ChatAction::AcquireApiKey => {
            // Consumed by the acquire_api_key middleware stage.
        }
        ChatAction::SetApiKey(key) => {
            new_state.api_key = Some(key);
            new_state.stream = None;
            new_state.error.clear();
        }
        ChatAction::SetTestKey(key) => {
            new_state.test_key = key;
            new_state.stream = None;
        }
        ChatAction::ProbeTestKey { .. } => {
            // Consumed by the probe_test_key middleware stage.
        }
    }
    new_state
}
