//! # Fluxchat Router
//!
//! Tree of routing nodes layered on the fluxchat store engine:
//! - RouterState / RouterAction: the per-node routing state machine
//! - Router: a node owning child nodes and leaf views, implementing
//!   path navigation and the upstream-signal / downstream-response protocol
//! - SignalPayload: the typed `kind:value` boundary convention for
//!   signal responses
//!
//! Configuration errors (unknown route, self-route, signal-identity
//! mismatch, malformed payloads) indicate mis-wiring at build time and are
//! fatal. Runtime errors belong in domain state, never in this protocol.

mod node;
mod state;

pub use node::{
    DownstreamResolver, NoopActivator, Presenter, RouteActivator, Router, UpstreamResolver,
    ViewHandle,
};
pub use state::{new_router_store, MalformedPayload, RouterAction, RouterState, RouterStore, SignalPayload};
