//! Per-node routing state machine.
//!
//! Every router node owns one `Store<RouterState, RouterAction>`. The
//! reducer below is the only place these fields change, and no-op arms
//! return the state untouched so subscribers are not notified.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use thiserror::Error;

use fluxchat_store::Store;

/// Routing state of a single node.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct RouterState {
    /// Currently active route segment.
    pub path: String,
    /// Pending navigation target; empty means none.
    pub next: String,
    /// Pending upstream request name.
    pub signal: Option<String>,
    /// Payload satisfying the most recent signal.
    pub response: Option<String>,
    /// Unix milliseconds of the last commit, non-decreasing. Used for
    /// staleness checks, not correctness.
    pub updated_at: i64,
}

/// Operations on a node's routing state.
#[derive(Debug, Clone)]
pub enum RouterAction {
    /// Activate a route segment, consuming any pending navigation.
    SetPath(String),
    /// Stage a navigation target, discarding any in-flight signal.
    SetNext(String),
    /// Raise an upstream request. Re-raising the same name is a no-op.
    Signal(String),
    /// Supply the payload for the outstanding signal.
    Respond(String),
    /// Retire the outstanding signal and its response together.
    ClearSignal,
}

/// Store type used by every router node.
pub type RouterStore = Store<RouterState, RouterAction>;

/// Build a routing store with an identity pipeline.
pub fn new_router_store() -> RouterStore {
    Store::new(reduce)
}

fn reduce(state: &RouterState, action: RouterAction) -> RouterState {
    let mut new_state = state.clone();
    match action {
        RouterAction::SetPath(path) => {
            if path == state.path {
                return new_state;
            }
            new_state.signal = None;
            new_state.next.clear();
            new_state.path = path;
        }
        RouterAction::SetNext(next) => {
            new_state.next = next;
            new_state.signal = None;
        }
        RouterAction::Signal(signal) => {
            if state.signal.as_deref() == Some(signal.as_str()) {
                return new_state;
            }
            new_state.signal = Some(signal);
        }
        RouterAction::Respond(response) => {
            new_state.response = Some(response);
        }
        RouterAction::ClearSignal => {
            if state.signal.is_none() && state.response.is_none() {
                return new_state;
            }
            new_state.signal = None;
            new_state.response = None;
        }
    }
    new_state.updated_at = stamp(state.updated_at);
    new_state
}

fn stamp(previous: i64) -> i64 {
    Utc::now().timestamp_millis().max(previous)
}

/// Typed form of the `kind:value` signal-response convention.
///
/// Producers encode through `Display`, consumers decode through `FromStr`;
/// no call site splits the string by hand. The value part may itself
/// contain colons.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignalPayload {
    pub kind: String,
    pub value: String,
}

impl SignalPayload {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for SignalPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// Error for a response payload that does not match `kind:value`.
#[derive(Debug, Error)]
#[error("malformed signal payload '{0}': expected 'kind:value'")]
pub struct MalformedPayload(pub String);

impl FromStr for SignalPayload {
    type Err = MalformedPayload;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((kind, value)) if !kind.is_empty() => Ok(Self::new(kind, value)),
            _ => Err(MalformedPayload(s.to_string())),
        }
    }
}
