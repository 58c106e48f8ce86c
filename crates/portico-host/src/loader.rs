//! In-process frame loader.
//!
//! Stands in for the browser when host and plugins run in one process:
//! the frame's context is created at the URL's origin, the optional ticket
//! gate checks the `ticket` query parameter, and the plugin program
//! registered for that origin is started inside the new frame.

use crate::error::{FrameError, Result};
use crate::frame::{FrameLoader, FrameRequest, LoadedFrame, PluginHandle};
use crate::sandbox::SandboxCapability;
use async_trait::async_trait;
use portico_core::config::defaults;
use portico_core::{BrowsingContext, Origin, WindowProxy};
use portico_tickets::TicketValidator;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A plugin program: runs inside a freshly created frame.
#[async_trait]
pub trait PluginFactory: Send + Sync {
    /// `frame` is the plugin's own context and `parent` its view of the host.
    async fn start(
        &self,
        frame: Arc<BrowsingContext>,
        parent: WindowProxy,
    ) -> anyhow::Result<Option<Box<dyn PluginHandle>>>;
}

#[derive(Default)]
pub struct StaticFrameLoader {
    plugins: HashMap<Origin, Arc<dyn PluginFactory>>,
    gate: Option<TicketValidator>,
}

impl StaticFrameLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `factory` in frames loaded from `origin`.
    pub fn with_plugin(mut self, origin: Origin, factory: Arc<dyn PluginFactory>) -> Self {
        self.plugins.insert(origin, factory);
        self
    }

    /// Require a valid ticket on every load.
    pub fn with_ticket_gate(mut self, validator: TicketValidator) -> Self {
        self.gate = Some(validator);
        self
    }
}

#[async_trait]
impl FrameLoader for StaticFrameLoader {
    async fn load(&self, request: FrameRequest) -> Result<LoadedFrame> {
        if let Some(gate) = &self.gate {
            let ticket = request
                .url
                .query_pairs()
                .find(|(key, _)| key == defaults::TICKET_QUERY_PARAM)
                .map(|(_, value)| value.into_owned());
            gate.validate(ticket.as_deref())
                .map_err(|e| FrameError::LoadFailed(format!("Access denied: {}", e)))?;
        }

        let frame = BrowsingContext::new(request.origin.clone());

        if !request.sandbox.allows(SandboxCapability::Scripts) {
            debug!(category = "frame", "Scripts disabled by sandbox, plugin not started");
            return Ok(LoadedFrame::new(frame));
        }

        let Some(factory) = self.plugins.get(&request.origin) else {
            warn!(category = "frame", origin = %request.origin, "No plugin program for origin");
            return Ok(LoadedFrame::new(frame));
        };

        let parent = frame.proxy_to(&request.parent);
        let handle = factory
            .start(frame.clone(), parent)
            .await
            .map_err(|e| FrameError::LoadFailed(e.to_string()))?;

        Ok(LoadedFrame {
            content: frame,
            handle,
        })
    }
}
