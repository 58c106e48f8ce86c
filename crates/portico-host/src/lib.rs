//! Portico Host
//!
//! Host-side half of the plugin trust boundary:
//!
//! - [`PluginFrameHost`] resolves a ticket-bearing URL, mounts the plugin in a
//!   sandboxed frame and tracks its lifecycle.
//! - [`SessionBridge`] hands the frame its session on load and answers its
//!   action requests through an [`ActionProxy`].
//! - [`TicketSource`] abstracts where tickets come from: an in-process
//!   [`TicketIssuer`](portico_tickets::TicketIssuer) or the HTTP endpoint.

pub mod bridge;
pub mod error;
pub mod frame;
pub mod loader;
pub mod registry;
pub mod sandbox;
pub mod ticket_source;

pub use bridge::{ActionProxy, DenyAllActions, FnActionProxy, SessionBridge, SessionProvider};
pub use error::{FrameError, Result};
pub use frame::{
    FrameContainer, FrameLoader, FrameRequest, FrameState, LoadedFrame, PluginFrameHost,
    PluginHandle,
};
pub use loader::{PluginFactory, StaticFrameLoader};
pub use registry::PluginRegistry;
pub use sandbox::{SandboxCapability, SandboxPolicy};
pub use ticket_source::{HttpTicketSource, TicketSource};
