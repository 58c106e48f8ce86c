//! Host half of the session/action channel for one mounted frame.

use crate::error::{FrameError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use portico_core::{
    ActionRequest, ActionResponse, BridgeMessage, BrowsingContext, ContextId, ListenerId,
    MessageEvent, MessageKind, Origin, SessionPayload, TargetOrigin, WindowProxy,
};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Executes privileged operations on a plugin's behalf.
///
/// An error reaches the plugin only as its top-level message.
#[async_trait]
pub trait ActionProxy: Send + Sync {
    async fn call(&self, action: &str, data: Value) -> anyhow::Result<Value>;
}

/// [`ActionProxy`] backed by an async closure.
pub struct FnActionProxy<F>(F);

impl<F> FnActionProxy<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> ActionProxy for FnActionProxy<F>
where
    F: Fn(String, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn call(&self, action: &str, data: Value) -> anyhow::Result<Value> {
        (self.0)(action.to_string(), data).await
    }
}

/// Rejects every action. Used when the host registers no proxy.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAllActions;

#[async_trait]
impl ActionProxy for DenyAllActions {
    async fn call(&self, action: &str, _data: Value) -> anyhow::Result<Value> {
        anyhow::bail!("Unsupported action: {}", action)
    }
}

/// Supplies the session handed to a frame when it loads.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn session(&self) -> SessionPayload;
}

#[async_trait]
impl SessionProvider for SessionPayload {
    async fn session(&self) -> SessionPayload {
        self.clone()
    }
}

struct BridgeInner {
    host: Arc<BrowsingContext>,
    frame: WindowProxy,
    frame_id: ContextId,
    frame_origin: Origin,
    session: Arc<dyn SessionProvider>,
    proxy: Arc<dyn ActionProxy>,
    listener: Mutex<Option<ListenerId>>,
    detached: AtomicBool,
    accepted: AtomicU64,
}

/// Owns exactly one mounted frame's privileged channel.
///
/// The frame's origin is fixed when the bridge is attached; every outbound
/// post targets it and every inbound message must come from it.
#[derive(Clone)]
pub struct SessionBridge {
    inner: Arc<BridgeInner>,
}

impl SessionBridge {
    /// Start listening on `host` for requests from `frame`.
    pub fn attach(
        host: Arc<BrowsingContext>,
        frame: &Arc<BrowsingContext>,
        frame_origin: Origin,
        session: Arc<dyn SessionProvider>,
        proxy: Arc<dyn ActionProxy>,
    ) -> Self {
        let inner = Arc::new(BridgeInner {
            frame: host.proxy_to(frame),
            frame_id: frame.id(),
            host,
            frame_origin,
            session,
            proxy,
            listener: Mutex::new(None),
            detached: AtomicBool::new(false),
            accepted: AtomicU64::new(0),
        });

        let weak = Arc::downgrade(&inner);
        let id = inner
            .host
            .add_message_listener(Arc::new(move |event: &MessageEvent| {
                if let Some(inner) = weak.upgrade() {
                    SessionBridge { inner }.handle_message(event);
                }
            }));
        *inner.listener.lock() = Some(id);

        debug!(
            category = "bridge",
            frame = %inner.frame_id,
            frame_origin = %inner.frame_origin,
            "Session bridge attached"
        );
        Self { inner }
    }

    pub fn frame_origin(&self) -> &Origin {
        &self.inner.frame_origin
    }

    pub fn is_attached(&self) -> bool {
        !self.inner.detached.load(Ordering::SeqCst)
    }

    /// Number of action requests accepted so far.
    pub fn accepted_requests(&self) -> u64 {
        self.inner.accepted.load(Ordering::Relaxed)
    }

    /// Post `SESSION_INIT` to the frame.
    pub async fn on_frame_load(&self) -> Result<()> {
        if !self.is_attached() {
            return Ok(());
        }
        let session = self.inner.session.session().await;
        let uid = session.uid().map(str::to_string);
        let message = BridgeMessage::SessionInit(session)
            .to_value()
            .map_err(|e| FrameError::LoadFailed(format!("Failed to encode session: {}", e)))?;

        self.post(message)?;
        info!(
            category = "bridge",
            frame = %self.inner.frame_id,
            frame_origin = %self.inner.frame_origin,
            uid = uid.as_deref().unwrap_or("-"),
            "Session posted to frame"
        );
        Ok(())
    }

    /// Filter one inbound message and, if it is a request from our frame,
    /// run it through the action proxy.
    pub fn handle_message(&self, event: &MessageEvent) {
        if !self.is_attached() {
            return;
        }
        if event.origin != self.inner.frame_origin {
            trace!(category = "bridge", origin = %event.origin, "Dropping message from foreign origin");
            return;
        }
        if event.source != Some(self.inner.frame_id) {
            trace!(category = "bridge", "Dropping message not sent by the mounted frame");
            return;
        }
        if MessageKind::of(&event.data) != Some(MessageKind::ActionRequest) {
            return;
        }
        let request = match event
            .data
            .get("payload")
            .cloned()
            .map(serde_json::from_value::<ActionRequest>)
        {
            Some(Ok(request)) => request,
            Some(Err(e)) => {
                debug!(category = "bridge", error = %e, "Dropping malformed action request");
                return;
            }
            None => {
                debug!(category = "bridge", "Dropping action request without payload");
                return;
            }
        };

        self.inner.accepted.fetch_add(1, Ordering::Relaxed);
        debug!(
            category = "bridge",
            action = %request.action,
            correlation_id = %request.correlation_id,
            "Action request accepted"
        );

        let bridge = self.clone();
        tokio::spawn(async move {
            let ActionRequest {
                action,
                data,
                correlation_id,
            } = request;

            let response = match bridge.inner.proxy.call(&action, data).await {
                Ok(result) => ActionResponse::success(correlation_id, result),
                Err(e) => {
                    debug!(category = "bridge", action = %action, error = %e, "Action failed");
                    ActionResponse::failure(correlation_id, e.to_string())
                }
            };
            bridge.respond(response);
        });
    }

    fn respond(&self, response: ActionResponse) {
        if !self.is_attached() {
            debug!(
                category = "bridge",
                correlation_id = %response.correlation_id,
                "Bridge detached, discarding response"
            );
            return;
        }
        let message = match BridgeMessage::ActionResponse(response).to_value() {
            Ok(message) => message,
            Err(e) => {
                warn!(category = "bridge", error = %e, "Failed to encode action response");
                return;
            }
        };
        if let Err(e) = self.post(message) {
            debug!(category = "bridge", error = %e, "Could not deliver action response");
        }
    }

    fn post(&self, message: Value) -> Result<()> {
        self.inner
            .frame
            .post_message(message, &TargetOrigin::Exact(self.inner.frame_origin.clone()))?;
        Ok(())
    }

    /// Stop listening. Responses still in flight are discarded.
    pub fn detach(&self) {
        if self.inner.detached.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(id) = self.inner.listener.lock().take() {
            self.inner.host.remove_message_listener(id);
        }
        debug!(category = "bridge", frame = %self.inner.frame_id, "Session bridge detached");
    }
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        if let Some(id) = self.listener.lock().take() {
            self.host.remove_message_listener(id);
        }
    }
}

impl std::fmt::Debug for SessionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBridge")
            .field("frame", &self.inner.frame_id)
            .field("frame_origin", &self.inner.frame_origin)
            .field("attached", &self.is_attached())
            .finish()
    }
}
