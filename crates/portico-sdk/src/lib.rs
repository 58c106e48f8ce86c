//! Portico Plugin SDK
//!
//! The plugin-side half of the host bridge. A plugin running inside a
//! sandboxed frame creates one [`PluginSdkClient`], calls
//! [`initialize`](PluginSdkClient::initialize) with the origins it trusts
//! to be its host, and then asks the host to perform privileged actions.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use portico_sdk::prelude::*;
//!
//! let sdk = PluginSdkClient::new(frame_context, parent_window);
//! let session = sdk
//!     .initialize(AllowedOriginSet::parse(["https://app.example.com"])?)
//!     .await?;
//!
//! let result = sdk.request_action("navigate", json!({"path": "/x"})).await?;
//! ```

pub mod client;
pub mod error;
pub mod pending;

pub use client::{PluginSdkClient, SdkConfig, SdkState};
pub use error::{Result, SdkError};
pub use pending::{PendingRequests, PendingStats};

/// Prelude module with common imports
pub mod prelude {
    pub use crate::client::{PluginSdkClient, SdkConfig, SdkState};
    pub use crate::error::{Result, SdkError};
    pub use portico_core::{AllowedOriginSet, Origin, SessionPayload, SessionUser};
    pub use serde_json::{json, Value};
}
