//! Core types for Portico.
//!
//! This crate defines the foundations shared by the ticket service, the
//! frame host and the plugin SDK: origins and allow-lists, the wire
//! protocol spoken across the frame boundary, the in-process messaging
//! substrate, clocks, the error taxonomy and configuration loading.

pub mod clock;
pub mod config;
pub mod error;
pub mod messaging;
pub mod origin;
pub mod protocol;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{ConfigError, PluginEntry, PorticoConfig};
pub use error::ErrorKind;
pub use messaging::{
    BrowsingContext, ContextId, ListenerId, MessageEvent, MessageListener, MessagingError,
    WindowProxy,
};
pub use origin::{AllowedOriginSet, Origin, OriginError, TargetOrigin};
pub use protocol::{
    ActionRequest, ActionResponse, BridgeMessage, MessageKind, SessionPayload, SessionUser,
};

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::clock::{Clock, SharedClock, SystemClock};
    pub use crate::config::PorticoConfig;
    pub use crate::error::ErrorKind;
    pub use crate::messaging::{BrowsingContext, MessageEvent, WindowProxy};
    pub use crate::origin::{AllowedOriginSet, Origin, TargetOrigin};
    pub use crate::protocol::{
        ActionRequest, ActionResponse, BridgeMessage, MessageKind, SessionPayload,
    };
}
