//! In-process cross-document messaging.
//!
//! A [`BrowsingContext`] stands for one realm (the host page or a plugin
//! frame). Other realms reach it through a [`WindowProxy`] and deliver
//! messages with [`WindowProxy::post_message`], which follows the browser's
//! rules:
//!
//! - the receiver sees the *sender's* origin in [`MessageEvent::origin`];
//! - a post whose target origin does not match the receiver is dropped
//!   silently;
//! - data is moved into the event, so nothing mutable is shared;
//! - events posted to one context are dispatched in post order, one at a
//!   time, on that context's own task.
//!
//! Listeners are plain synchronous callbacks. Anything that needs to await
//! spawns its own task.

use crate::origin::{Origin, TargetOrigin};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Errors from the messaging layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessagingError {
    /// The target context has been dropped (frame removed).
    #[error("Target browsing context is gone")]
    Detached,
}

/// Identity of a browsing context, comparable like `event.source === frame.contentWindow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Handle returned by [`BrowsingContext::add_message_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A delivered message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    /// Origin of the realm that posted the message.
    pub origin: Origin,
    /// Context that posted the message, if it was posted through a proxy.
    pub source: Option<ContextId>,
    pub data: Value,
}

pub type MessageListener = Arc<dyn Fn(&MessageEvent) + Send + Sync>;

enum Envelope {
    Event(MessageEvent),
    Flush(oneshot::Sender<()>),
}

/// One realm with an origin, an inbound queue and a set of `message` listeners.
pub struct BrowsingContext {
    id: ContextId,
    origin: Origin,
    listeners: Mutex<Vec<(ListenerId, MessageListener)>>,
    next_listener: AtomicU64,
    queue: mpsc::UnboundedSender<Envelope>,
}

impl BrowsingContext {
    /// Create a context and start its dispatch task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(origin: Origin) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        let context = Arc::new(Self {
            id: ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)),
            origin,
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            queue: tx,
        });

        let weak = Arc::downgrade(&context);
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                match envelope {
                    Envelope::Event(event) => match weak.upgrade() {
                        Some(context) => context.dispatch(&event),
                        None => break,
                    },
                    Envelope::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });

        context
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Register a `message` listener.
    pub fn add_message_listener(&self, listener: MessageListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn remove_message_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// A proxy through which this context posts messages to `target`.
    pub fn proxy_to(&self, target: &Arc<BrowsingContext>) -> WindowProxy {
        WindowProxy {
            target: Arc::downgrade(target),
            target_id: target.id,
            sender_id: Some(self.id),
            sender_origin: self.origin.clone(),
        }
    }

    /// Queue an already formed event, bypassing target-origin checks.
    ///
    /// This is how traffic from outside any modelled realm (extensions,
    /// injected scripts, tests) reaches a context.
    pub fn enqueue(&self, event: MessageEvent) {
        let _ = self.queue.send(Envelope::Event(event));
    }

    /// Wait until every event queued before this call has been dispatched.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.queue.send(Envelope::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    fn dispatch(&self, event: &MessageEvent) {
        let listeners: Vec<MessageListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        trace!(
            context = %self.id,
            origin = %event.origin,
            listeners = listeners.len(),
            "Dispatching message"
        );

        for listener in listeners {
            listener(event);
        }
    }
}

impl fmt::Debug for BrowsingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowsingContext")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// A sender's view of another context, the equivalent of `frame.contentWindow`
/// or `window.parent`.
#[derive(Clone)]
pub struct WindowProxy {
    target: Weak<BrowsingContext>,
    target_id: ContextId,
    sender_id: Option<ContextId>,
    sender_origin: Origin,
}

impl WindowProxy {
    /// Post `data` to the target context.
    ///
    /// If the target's origin does not match `target_origin` the message is
    /// dropped and `Ok(())` is still returned: the sender learns nothing
    /// about what is loaded in the target.
    pub fn post_message(
        &self,
        data: Value,
        target_origin: &TargetOrigin,
    ) -> Result<(), MessagingError> {
        let target = self.target.upgrade().ok_or(MessagingError::Detached)?;

        if !target_origin.admits(target.origin()) {
            trace!(
                target = %self.target_id,
                expected = %target_origin,
                "Dropping message: target origin mismatch"
            );
            return Ok(());
        }

        target.enqueue(MessageEvent {
            origin: self.sender_origin.clone(),
            source: self.sender_id,
            data,
        });
        Ok(())
    }

    /// Id of the context this proxy points at.
    pub fn target_id(&self) -> ContextId {
        self.target_id
    }

    /// Origin currently loaded in the target, if it still exists.
    pub fn target_origin(&self) -> Option<Origin> {
        self.target.upgrade().map(|t| t.origin().clone())
    }

    pub fn is_detached(&self) -> bool {
        self.target.strong_count() == 0
    }
}

impl fmt::Debug for WindowProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowProxy")
            .field("target", &self.target_id)
            .field("sender_origin", &self.sender_origin)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn origin(s: &str) -> Origin {
        Origin::parse(s).unwrap()
    }

    fn recorder(ctx: &BrowsingContext) -> (ListenerId, Arc<Mutex<Vec<MessageEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = ctx.add_message_listener(Arc::new(move |event: &MessageEvent| {
            sink.lock().push(event.clone());
        }));
        (id, seen)
    }

    #[tokio::test]
    async fn test_post_carries_sender_origin_and_source() {
        let host = BrowsingContext::new(origin("https://host.example"));
        let plugin = BrowsingContext::new(origin("https://plugin.example"));
        let (_, seen) = recorder(&host);

        plugin
            .proxy_to(&host)
            .post_message(json!({"n": 1}), &TargetOrigin::Exact(origin("https://host.example")))
            .unwrap();
        host.flush().await;

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].origin, origin("https://plugin.example"));
        assert_eq!(seen[0].source, Some(plugin.id()));
        assert_eq!(seen[0].data, json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_target_origin_mismatch_is_silently_dropped() {
        let host = BrowsingContext::new(origin("https://host.example"));
        let plugin = BrowsingContext::new(origin("https://plugin.example"));
        let (_, seen) = recorder(&plugin);

        let result = host
            .proxy_to(&plugin)
            .post_message(json!("secret"), &TargetOrigin::Exact(origin("https://other.example")));
        assert!(result.is_ok());

        host.proxy_to(&plugin)
            .post_message(json!("hello"), &TargetOrigin::Any)
            .unwrap();
        plugin.flush().await;

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].data, json!("hello"));
    }

    #[tokio::test]
    async fn test_events_dispatch_in_post_order() {
        let host = BrowsingContext::new(origin("https://host.example"));
        let plugin = BrowsingContext::new(origin("https://plugin.example"));
        let (_, seen) = recorder(&host);

        let proxy = plugin.proxy_to(&host);
        for i in 0..50 {
            proxy.post_message(json!(i), &TargetOrigin::Any).unwrap();
        }
        host.flush().await;

        let order: Vec<i64> = seen.lock().iter().map(|e| e.data.as_i64().unwrap()).collect();
        assert_eq!(order, (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_remove_listener() {
        let host = BrowsingContext::new(origin("https://host.example"));
        let (id, seen) = recorder(&host);
        assert_eq!(host.listener_count(), 1);

        assert!(host.remove_message_listener(id));
        assert!(!host.remove_message_listener(id));
        assert_eq!(host.listener_count(), 0);

        host.enqueue(MessageEvent {
            origin: origin("https://x.example"),
            source: None,
            data: json!(1),
        });
        host.flush().await;
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_post_to_dropped_context_fails() {
        let host = BrowsingContext::new(origin("https://host.example"));
        let plugin = BrowsingContext::new(origin("https://plugin.example"));
        let proxy = host.proxy_to(&plugin);
        assert_eq!(proxy.target_origin(), Some(origin("https://plugin.example")));

        drop(plugin);
        assert!(proxy.is_detached());
        assert_eq!(
            proxy.post_message(json!(null), &TargetOrigin::Any),
            Err(MessagingError::Detached)
        );
    }
}
