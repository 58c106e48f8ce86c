//! Portico API
//!
//! HTTP surface of the plugin trust boundary:
//!
//! - `POST /api/plugins/tickets`: issue a ticket for the bearer's user
//! - `GET /plugins/:plugin_id/*path`: plugin assets behind the ticket gate

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use router::create_router;
pub use server::run;
pub use state::{ApiState, PluginGate};
