//! Plugin frame lifecycle.

use crate::bridge::{ActionProxy, DenyAllActions, SessionBridge, SessionProvider};
use crate::error::{FrameError, Result};
use crate::registry::PluginRegistry;
use crate::sandbox::SandboxPolicy;
use crate::ticket_source::TicketSource;
use async_trait::async_trait;
use portico_core::config::defaults;
use portico_core::{BrowsingContext, ContextId, Origin, SessionPayload};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use url::Url;

/// Lifecycle of the single frame a [`PluginFrameHost`] manages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Loading,
    Ready,
    Error(String),
}

impl FrameState {
    pub fn is_ready(&self) -> bool {
        matches!(self, FrameState::Ready)
    }
}

/// What the host asks a [`FrameLoader`] to create.
#[derive(Debug, Clone)]
pub struct FrameRequest {
    pub url: Url,
    pub origin: Origin,
    pub sandbox: SandboxPolicy,
    /// The embedding page; the new frame's `parent`.
    pub parent: Arc<BrowsingContext>,
}

/// Where a plugin handle is mounted.
#[derive(Debug, Clone)]
pub struct FrameContainer {
    pub frame: ContextId,
    pub url: Url,
    pub sandbox: SandboxPolicy,
}

/// Lifecycle hooks a loaded plugin exposes to its host.
#[async_trait]
pub trait PluginHandle: Send + Sync {
    async fn init(&self, container: &FrameContainer, props: Value) -> anyhow::Result<()>;

    async fn destroy(&self) -> anyhow::Result<()>;
}

/// Result of a successful load.
pub struct LoadedFrame {
    pub content: Arc<BrowsingContext>,
    pub handle: Option<Box<dyn PluginHandle>>,
}

impl LoadedFrame {
    pub fn new(content: Arc<BrowsingContext>) -> Self {
        Self {
            content,
            handle: None,
        }
    }

    pub fn with_handle(mut self, handle: Box<dyn PluginHandle>) -> Self {
        self.handle = Some(handle);
        self
    }
}

/// Creates the frame's browsing context for a URL.
#[async_trait]
pub trait FrameLoader: Send + Sync {
    async fn load(&self, request: FrameRequest) -> Result<LoadedFrame>;
}

struct MountedFrame {
    content: Arc<BrowsingContext>,
    bridge: SessionBridge,
    handle: Option<Box<dyn PluginHandle>>,
    url: Url,
}

/// Host-side controller for one plugin frame.
pub struct PluginFrameHost {
    window: Arc<BrowsingContext>,
    registry: Arc<PluginRegistry>,
    tickets: Arc<dyn TicketSource>,
    loader: Arc<dyn FrameLoader>,
    session: Arc<dyn SessionProvider>,
    proxy: Arc<dyn ActionProxy>,
    sandbox: SandboxPolicy,
    props: Value,
    state: watch::Sender<FrameState>,
    mounted: Mutex<Option<MountedFrame>>,
    /// Held for the whole of one `load_plugin` call.
    loading: Mutex<()>,
}

impl PluginFrameHost {
    pub fn new(
        window: Arc<BrowsingContext>,
        registry: Arc<PluginRegistry>,
        tickets: Arc<dyn TicketSource>,
        loader: Arc<dyn FrameLoader>,
    ) -> Self {
        let (state, _) = watch::channel(FrameState::Idle);
        Self {
            window,
            registry,
            tickets,
            loader,
            session: Arc::new(SessionPayload::anonymous()),
            proxy: Arc::new(DenyAllActions),
            sandbox: SandboxPolicy::plugin_frame(),
            props: Value::Null,
            state,
            mounted: Mutex::new(None),
            loading: Mutex::new(()),
        }
    }

    pub fn with_session(mut self, session: Arc<dyn SessionProvider>) -> Self {
        self.session = session;
        self
    }

    pub fn with_action_proxy(mut self, proxy: Arc<dyn ActionProxy>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Props passed to the plugin handle's `init`.
    pub fn with_props(mut self, props: Value) -> Self {
        self.props = props;
        self
    }

    pub fn state(&self) -> FrameState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FrameState> {
        self.state.subscribe()
    }

    pub fn window(&self) -> &Arc<BrowsingContext> {
        &self.window
    }

    /// The mounted frame's context, if any.
    pub async fn frame(&self) -> Option<Arc<BrowsingContext>> {
        self.mounted.lock().await.as_ref().map(|m| m.content.clone())
    }

    pub async fn mounted_url(&self) -> Option<Url> {
        self.mounted.lock().await.as_ref().map(|m| m.url.clone())
    }

    /// `base_url?ticket=…` for `plugin_id`.
    ///
    /// The registry is consulted before a ticket is requested, so an unknown
    /// plugin never consumes one.
    pub async fn resolve_secure_url(&self, plugin_id: &str, bearer: Option<&str>) -> Result<Url> {
        let mut url = self.registry.resolve(plugin_id)?.clone();
        let ticket = self.tickets.request_ticket(plugin_id, bearer).await?;
        url.query_pairs_mut()
            .append_pair(defaults::TICKET_QUERY_PARAM, &ticket);
        Ok(url)
    }

    /// Resolve and mount `plugin_id`. Failures end up in [`FrameState::Error`].
    ///
    /// A call made while another load is in flight, or after the frame is
    /// ready, is ignored and returns the current state.
    pub async fn load_plugin(&self, plugin_id: &str, bearer: Option<&str>) -> FrameState {
        let Ok(_loading) = self.loading.try_lock() else {
            warn!(category = "frame", plugin_id = plugin_id, "Another load is in progress, ignoring load");
            return self.state();
        };
        if self.state().is_ready() {
            warn!(category = "frame", plugin_id = plugin_id, "Frame already mounted, ignoring load");
            return self.state();
        }
        self.state.send_replace(FrameState::Loading);

        match self.resolve_secure_url(plugin_id, bearer).await {
            Ok(url) => {
                if let Err(e) = self.mount(url).await {
                    debug!(category = "frame", plugin_id = plugin_id, error = %e, "Mount failed");
                }
            }
            Err(e) => {
                warn!(category = "frame", plugin_id = plugin_id, error = %e, "Could not resolve plugin URL");
                self.fail_loading(e.to_string());
            }
        }
        self.state()
    }

    /// Create the sandboxed frame at `url`, bridge it and hand it its session.
    pub async fn mount(&self, url: Url) -> Result<()> {
        let mut mounted = self.mounted.lock().await;
        if mounted.is_some() || self.state().is_ready() {
            warn!(category = "frame", url = %redact(&url), "Frame already mounted, refusing second mount");
            return Err(FrameError::AlreadyMounted);
        }
        self.state.send_replace(FrameState::Loading);

        match self.mount_inner(url).await {
            Ok(frame) => {
                let ready = self.state.send_if_modified(|state| {
                    if *state == FrameState::Loading {
                        *state = FrameState::Ready;
                        true
                    } else {
                        false
                    }
                });
                if !ready {
                    // A load failure was reported while we were loading.
                    let reason = match self.state() {
                        FrameState::Error(reason) => reason,
                        other => format!("{:?}", other),
                    };
                    teardown(frame).await;
                    return Err(FrameError::LoadFailed(reason));
                }
                info!(category = "frame", url = %redact(&frame.url), "Plugin frame ready");
                *mounted = Some(frame);
                Ok(())
            }
            Err(e) => {
                warn!(category = "frame", error = %e, "Plugin frame failed to load");
                self.state.send_replace(FrameState::Error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn mount_inner(&self, url: Url) -> Result<MountedFrame> {
        let origin = Origin::from_url(&url)?;
        debug!(
            category = "frame",
            url = %redact(&url),
            sandbox = %self.sandbox,
            "Mounting plugin frame"
        );

        let loaded = self
            .loader
            .load(FrameRequest {
                url: url.clone(),
                origin: origin.clone(),
                sandbox: self.sandbox.clone(),
                parent: self.window.clone(),
            })
            .await?;

        let bridge = SessionBridge::attach(
            self.window.clone(),
            &loaded.content,
            origin,
            self.session.clone(),
            self.proxy.clone(),
        );
        let frame = MountedFrame {
            content: loaded.content,
            bridge,
            handle: loaded.handle,
            url,
        };

        if let Err(e) = frame.bridge.on_frame_load().await {
            teardown(frame).await;
            return Err(e);
        }

        if let Some(handle) = &frame.handle {
            let container = FrameContainer {
                frame: frame.content.id(),
                url: frame.url.clone(),
                sandbox: self.sandbox.clone(),
            };
            if let Err(e) = handle.init(&container, self.props.clone()).await {
                let err = FrameError::LoadFailed(format!("Plugin init failed: {}", e));
                teardown(frame).await;
                return Err(err);
            }
        }
        Ok(frame)
    }

    /// The embedding page reports that the frame failed to load.
    ///
    /// Ignored once the frame is ready.
    pub fn report_load_failure(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.fail_loading(reason.clone()) {
            warn!(category = "frame", reason = %reason, "Plugin frame reported load failure");
        } else {
            debug!(category = "frame", reason = %reason, "Ignoring load failure outside loading state");
        }
    }

    /// `Loading -> Error(reason)`; any other state is left alone.
    fn fail_loading(&self, reason: String) -> bool {
        self.state.send_if_modified(|state| {
            if *state == FrameState::Loading {
                *state = FrameState::Error(reason);
                true
            } else {
                false
            }
        })
    }

    /// Tear down the mounted frame and return to `Idle`.
    ///
    /// Returns `false` if nothing was mounted.
    pub async fn unmount(&self) -> bool {
        let frame = self.mounted.lock().await.take();
        let had_frame = frame.is_some();
        if let Some(frame) = frame {
            teardown(frame).await;
            info!(category = "frame", "Plugin frame unmounted");
        }
        self.state.send_replace(FrameState::Idle);
        had_frame
    }
}

impl std::fmt::Debug for PluginFrameHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginFrameHost")
            .field("window", &self.window.id())
            .field("state", &self.state())
            .field("sandbox", &self.sandbox.to_attribute())
            .finish()
    }
}

async fn teardown(frame: MountedFrame) {
    frame.bridge.detach();
    if let Some(handle) = frame.handle {
        if let Err(e) = handle.destroy().await {
            warn!(category = "frame", error = %e, "Plugin destroy hook failed");
        }
    }
}

/// The URL without its query, for logs. The query carries the ticket.
fn redact(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_strips_ticket() {
        let url = Url::parse("https://crm.example.net/app?ticket=abc.def.ghi").unwrap();
        assert_eq!(redact(&url), "https://crm.example.net/app");
    }

    #[test]
    fn test_frame_state() {
        assert!(FrameState::Ready.is_ready());
        assert!(!FrameState::Error("x".into()).is_ready());
    }
}
