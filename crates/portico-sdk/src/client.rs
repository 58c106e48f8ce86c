//! Plugin-side bridge client.

use crate::error::{Result, SdkError};
use crate::pending::PendingRequests;
use parking_lot::{Mutex, RwLock};
use portico_core::config::SdkSettings;
use portico_core::{
    ActionRequest, ActionResponse, AllowedOriginSet, BridgeMessage, BrowsingContext, ListenerId,
    MessageEvent, MessageKind, Origin, SessionPayload, TargetOrigin, WindowProxy,
};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

/// Deadlines for the handshake and for each action call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdkConfig {
    pub handshake_timeout: Duration,
    pub action_timeout: Duration,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self::from(&SdkSettings::default())
    }
}

impl From<&SdkSettings> for SdkConfig {
    fn from(settings: &SdkSettings) -> Self {
        Self {
            handshake_timeout: settings.handshake_timeout(),
            action_timeout: settings.action_timeout(),
        }
    }
}

/// Observable client state.
#[derive(Debug, Clone, PartialEq)]
pub enum SdkState {
    Uninitialized,
    AwaitingSession,
    Ready,
    Failed(SdkError),
}

#[derive(Debug, Clone)]
enum Handshake {
    Pending,
    Ready(SessionPayload),
    Failed(SdkError),
}

struct Inner {
    context: Arc<BrowsingContext>,
    parent: WindowProxy,
    config: SdkConfig,
    started: AtomicBool,
    handshake: watch::Sender<Handshake>,
    session: RwLock<Option<SessionPayload>>,
    host_origin: OnceLock<Origin>,
    pending: PendingRequests,
    session_listener: Mutex<Option<ListenerId>>,
    response_listener: Mutex<Option<ListenerId>>,
}

/// The plugin's handle on its host.
///
/// `context` is the plugin's own browsing context (where the host's
/// messages arrive) and `parent` is the plugin's view of the host window.
/// Cloning is cheap and clones share one handshake and one request registry.
#[derive(Clone)]
pub struct PluginSdkClient {
    inner: Arc<Inner>,
}

impl PluginSdkClient {
    pub fn new(context: Arc<BrowsingContext>, parent: WindowProxy) -> Self {
        Self::with_config(context, parent, SdkConfig::default())
    }

    pub fn with_config(context: Arc<BrowsingContext>, parent: WindowProxy, config: SdkConfig) -> Self {
        let (handshake, _) = watch::channel(Handshake::Pending);
        Self {
            inner: Arc::new(Inner {
                context,
                parent,
                config,
                started: AtomicBool::new(false),
                handshake,
                session: RwLock::new(None),
                host_origin: OnceLock::new(),
                pending: PendingRequests::new(),
                session_listener: Mutex::new(None),
                response_listener: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SdkConfig {
        &self.inner.config
    }

    /// Start the handshake and return a future for the host's session.
    ///
    /// The listener is installed when this is called, not when the future is
    /// first polled. The first call listens for `SESSION_INIT` from any origin
    /// in `allowed_origins`; later calls join that handshake and their own
    /// `allowed_origins` are ignored.
    pub fn initialize(
        &self,
        allowed_origins: AllowedOriginSet,
    ) -> impl Future<Output = Result<SessionPayload>> + Send + 'static {
        let mut handshake = self.inner.handshake.subscribe();
        if self.inner.started.swap(true, Ordering::SeqCst) {
            debug!(category = "sdk", "initialize called again, joining handshake");
        } else {
            self.start_handshake(allowed_origins);
        }
        async move { wait_for_handshake(&mut handshake).await }
    }

    fn start_handshake(&self, allowed_origins: AllowedOriginSet) {
        if allowed_origins.is_empty() {
            warn!(category = "sdk", "No allowed host origins; handshake can only time out");
        }

        let weak = Arc::downgrade(&self.inner);
        let listener = self.inner.context.add_message_listener(Arc::new(move |event: &MessageEvent| {
            if let Some(inner) = weak.upgrade() {
                Inner::on_session_message(&inner, event, &allowed_origins);
            }
        }));
        *self.inner.session_listener.lock() = Some(listener);

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let timeout = self.inner.config.handshake_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                if inner.fail_handshake(SdkError::HandshakeTimeout) {
                    warn!(
                        category = "sdk",
                        timeout_ms = timeout.as_millis() as u64,
                        "No session received from host"
                    );
                }
            }
        });

        debug!(category = "sdk", context = %self.inner.context.id(), "Awaiting session from host");
    }

    /// The last session received, or a null-user session before the handshake resolves.
    pub fn get_session(&self) -> SessionPayload {
        match self.inner.session.read().as_ref() {
            Some(session) => session.clone(),
            None => {
                warn!(category = "sdk", "get_session called before a session was received");
                SessionPayload::anonymous()
            }
        }
    }

    /// Ask the host to perform `action`.
    ///
    /// Resolves with the host's result, or fails with the host's error
    /// message as [`SdkError::Action`].
    pub async fn request_action(&self, action: &str, data: Value) -> Result<Value> {
        if !self.inner.started.load(Ordering::SeqCst) {
            error!(category = "sdk", action = action, "request_action called before initialize");
            return Err(SdkError::NotInitialized);
        }

        let mut handshake = self.inner.handshake.subscribe();
        wait_for_handshake(&mut handshake).await?;
        let host_origin = self
            .inner
            .host_origin
            .get()
            .cloned()
            .ok_or(SdkError::NotInitialized)?;

        let pending = &self.inner.pending;
        let (correlation_id, response) = pending.register(action);
        // Removes the entry if this future is dropped before it settles.
        let entry = scopeguard::guard(correlation_id.clone(), move |id| {
            pending.cancel(&id);
        });

        let message = BridgeMessage::ActionRequest(ActionRequest {
            action: action.to_string(),
            data,
            correlation_id: correlation_id.clone(),
        })
        .to_value()
        .map_err(|e| SdkError::Serialization(e.to_string()))?;

        self.inner
            .parent
            .post_message(message, &TargetOrigin::Exact(host_origin))?;
        trace!(category = "sdk", correlation_id = %correlation_id, action = action, "Posted action request");

        let outcome = match tokio::time::timeout(self.inner.config.action_timeout, response).await {
            Ok(Ok(outcome)) => outcome.map_err(SdkError::Action),
            Ok(Err(_)) => Err(SdkError::ChannelClosed),
            Err(_) => {
                pending.expire(&correlation_id);
                Err(SdkError::ActionTimeout {
                    action: action.to_string(),
                })
            }
        };
        drop(entry);
        outcome
    }

    pub fn state(&self) -> SdkState {
        if !self.inner.started.load(Ordering::SeqCst) {
            return SdkState::Uninitialized;
        }
        match &*self.inner.handshake.borrow() {
            Handshake::Pending => SdkState::AwaitingSession,
            Handshake::Ready(_) => SdkState::Ready,
            Handshake::Failed(e) => SdkState::Failed(e.clone()),
        }
    }

    /// Origin of the host that delivered the session.
    pub fn host_origin(&self) -> Option<&Origin> {
        self.inner.host_origin.get()
    }

    /// Number of action calls still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.inner.pending
    }
}

impl std::fmt::Debug for PluginSdkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginSdkClient")
            .field("context", &self.inner.context.id())
            .field("state", &self.state())
            .field("host_origin", &self.inner.host_origin.get())
            .field("pending", &self.inner.pending.len())
            .finish()
    }
}

impl Inner {
    fn on_session_message(inner: &Arc<Self>, event: &MessageEvent, allowed: &AllowedOriginSet) {
        if !allowed.contains(&event.origin) {
            trace!(category = "sdk", origin = %event.origin, "Ignoring message from non-allowed origin");
            return;
        }
        if MessageKind::of(&event.data) != Some(MessageKind::SessionInit) {
            return;
        }
        if let Some(source) = event.source {
            if source != inner.parent.target_id() {
                debug!(category = "sdk", source = %source, "Ignoring session from a window other than the parent");
                return;
            }
        }
        if !matches!(*inner.handshake.borrow(), Handshake::Pending) {
            return;
        }

        let payload = event.data.get("payload").cloned().unwrap_or(Value::Null);
        let session = match serde_json::from_value::<SessionPayload>(payload) {
            Ok(session) if session.user.is_some() => session,
            Ok(_) => {
                inner.fail_handshake(SdkError::MalformedPayload("session has no user".into()));
                return;
            }
            Err(e) => {
                inner.fail_handshake(SdkError::MalformedPayload(e.to_string()));
                return;
            }
        };

        let _ = inner.host_origin.set(event.origin.clone());
        *inner.session.write() = Some(session.clone());
        inner.detach_session_listener();
        Inner::attach_response_listener(inner);

        info!(
            category = "sdk",
            host_origin = %event.origin,
            uid = session.uid().unwrap_or_default(),
            "Session received"
        );
        inner.handshake.send_replace(Handshake::Ready(session));
    }

    fn attach_response_listener(inner: &Arc<Self>) {
        let weak = Arc::downgrade(inner);
        let id = inner.context.add_message_listener(Arc::new(move |event: &MessageEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.on_response_message(event);
            }
        }));
        *inner.response_listener.lock() = Some(id);
    }

    fn on_response_message(&self, event: &MessageEvent) {
        if self.host_origin.get() != Some(&event.origin) {
            trace!(category = "sdk", origin = %event.origin, "Ignoring response from non-host origin");
            return;
        }
        if MessageKind::of(&event.data) != Some(MessageKind::ActionResponse) {
            return;
        }

        let payload = event.data.get("payload").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<ActionResponse>(payload) {
            Ok(response) => {
                let correlation_id = response.correlation_id.clone();
                self.pending.complete(&correlation_id, response.into_outcome());
            }
            Err(e) => debug!(category = "sdk", error = %e, "Dropping malformed action response"),
        }
    }

    /// Settle a still-pending handshake as failed. Returns `true` if this call settled it.
    fn fail_handshake(&self, err: SdkError) -> bool {
        let settled = self.handshake.send_if_modified(|state| {
            if matches!(state, Handshake::Pending) {
                *state = Handshake::Failed(err.clone());
                true
            } else {
                false
            }
        });
        if settled {
            self.detach_session_listener();
            if let SdkError::MalformedPayload(reason) = &err {
                warn!(category = "sdk", reason = %reason, "Rejected session from host");
            }
        }
        settled
    }

    fn detach_session_listener(&self) {
        if let Some(id) = self.session_listener.lock().take() {
            self.context.remove_message_listener(id);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.detach_session_listener();
        if let Some(id) = self.response_listener.lock().take() {
            self.context.remove_message_listener(id);
        }
    }
}

async fn wait_for_handshake(handshake: &mut watch::Receiver<Handshake>) -> Result<SessionPayload> {
    loop {
        let current = handshake.borrow_and_update().clone();
        match current {
            Handshake::Ready(session) => return Ok(session),
            Handshake::Failed(err) => return Err(err),
            Handshake::Pending => {}
        }
        if handshake.changed().await.is_err() {
            return Err(SdkError::ChannelClosed);
        }
    }
}
