//! Wire protocol spoken across the frame boundary.
//!
//! Every message is a JSON object `{type, payload}`:
//!
//! ```text
//! host   -> plugin  {"type":"SESSION_INIT",    "payload":{user, claims, idToken, theme}}
//! plugin -> host    {"type":"ACTION_REQUEST",  "payload":{action, data, correlationId}}
//! host   -> plugin  {"type":"ACTION_RESPONSE", "payload":{correlationId, result?, error?}}
//! ```
//!
//! Receivers check the `type` marker with [`MessageKind::of`] before trying
//! to decode the payload, so unrelated traffic on the channel is ignored
//! without being parsed.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const SESSION_INIT: &str = "SESSION_INIT";
pub const ACTION_REQUEST: &str = "ACTION_REQUEST";
pub const ACTION_RESPONSE: &str = "ACTION_RESPONSE";

/// The `type` marker of a bridge message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    SessionInit,
    ActionRequest,
    ActionResponse,
}

impl MessageKind {
    /// Read the marker of a raw message without decoding the payload.
    pub fn of(message: &Value) -> Option<Self> {
        match message.get("type")?.as_str()? {
            SESSION_INIT => Some(MessageKind::SessionInit),
            ACTION_REQUEST => Some(MessageKind::ActionRequest),
            ACTION_RESPONSE => Some(MessageKind::ActionResponse),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::SessionInit => SESSION_INIT,
            MessageKind::ActionRequest => ACTION_REQUEST,
            MessageKind::ActionResponse => ACTION_RESPONSE,
        }
    }
}

/// Authenticated user as seen by the plugin.
///
/// Kept as the object the host sent. `uid` is conventional but optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionUser {
    fields: Map<String, Value>,
}

impl SessionUser {
    pub fn new(uid: impl Into<String>) -> Self {
        Self::default().with_field("uid", uid.into())
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn uid(&self) -> Option<&str> {
        self.fields.get("uid").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Identity, claims, credential and theme delivered to a plugin at handshake.
///
/// Absent `idToken`/`theme` stay absent when the payload is re-encoded, and
/// unknown top-level fields are carried along. `claims: null` reads as an
/// empty map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    #[serde(default)]
    pub user: Option<SessionUser>,
    #[serde(default, deserialize_with = "null_as_empty_map")]
    pub claims: Map<String, Value>,
    /// Bearer credential; never log this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub theme: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn null_as_empty_map<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl SessionPayload {
    /// The null-user session handed out before the handshake completes.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn uid(&self) -> Option<&str> {
        self.user.as_ref().and_then(SessionUser::uid)
    }
}

/// A privileged operation requested by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub data: Value,
    pub correlation_id: String,
}

/// The host's answer to one [`ActionRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResponse {
    pub fn success(correlation_id: impl Into<String>, result: Value) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(correlation_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            result: None,
            error: Some(error.into()),
        }
    }

    /// An `error` field wins over `result`; a response carrying neither resolves to null.
    pub fn into_outcome(self) -> Result<Value, String> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// A fully decoded bridge message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BridgeMessage {
    #[serde(rename = "SESSION_INIT")]
    SessionInit(SessionPayload),
    #[serde(rename = "ACTION_REQUEST")]
    ActionRequest(ActionRequest),
    #[serde(rename = "ACTION_RESPONSE")]
    ActionResponse(ActionResponse),
}

impl BridgeMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            BridgeMessage::SessionInit(_) => MessageKind::SessionInit,
            BridgeMessage::ActionRequest(_) => MessageKind::ActionRequest,
            BridgeMessage::ActionResponse(_) => MessageKind::ActionResponse,
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_init_wire_shape() {
        let payload = SessionPayload {
            user: Some(SessionUser::new("u1")),
            claims: json!({"role": "admin"}).as_object().cloned().unwrap(),
            id_token: Some("abc".to_string()),
            theme: json!({"mode": "dark"}),
            extra: Map::new(),
        };
        let value = BridgeMessage::SessionInit(payload).to_value().unwrap();
        assert_eq!(
            value,
            json!({
                "type": "SESSION_INIT",
                "payload": {
                    "user": {"uid": "u1"},
                    "claims": {"role": "admin"},
                    "idToken": "abc",
                    "theme": {"mode": "dark"}
                }
            })
        );
    }

    #[test]
    fn test_session_user_keeps_extra_fields() {
        let value = json!({"uid": "u7", "email": "u7@example.com", "displayName": "Seven"});
        let user: SessionUser = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(user.uid(), Some("u7"));
        assert_eq!(user.get("email"), Some(&json!("u7@example.com")));
        assert_eq!(serde_json::to_value(&user).unwrap(), value);
    }

    #[test]
    fn test_session_payload_lenient_shapes() {
        let payload: SessionPayload =
            serde_json::from_value(json!({"user": {"uid": "u1"}, "claims": null})).unwrap();
        assert!(payload.claims.is_empty());
        assert_eq!(payload.uid(), Some("u1"));

        let payload: SessionPayload =
            serde_json::from_value(json!({"user": {"email": "a@b.c"}, "claims": {}})).unwrap();
        assert!(payload.is_authenticated());
        assert_eq!(payload.uid(), None);
        assert_eq!(payload.user.unwrap().get("email"), Some(&json!("a@b.c")));

        let raw: Result<SessionPayload, _> = serde_json::from_value(json!({"user": "bob"}));
        assert!(raw.is_err());
    }

    #[test]
    fn test_session_payload_reencodes_as_sent() {
        let sent = json!({"user": {"uid": "u1"}, "claims": {"role": "admin"}});
        let payload: SessionPayload = serde_json::from_value(sent.clone()).unwrap();
        assert_eq!(serde_json::to_value(&payload).unwrap(), sent);

        let sent = json!({"user": {"uid": "u1"}, "claims": {}, "locale": "de-DE"});
        let payload: SessionPayload = serde_json::from_value(sent.clone()).unwrap();
        assert_eq!(payload.extra.get("locale"), Some(&json!("de-DE")));
        assert_eq!(serde_json::to_value(&payload).unwrap(), sent);
    }

    #[test]
    fn test_anonymous_session_shape() {
        assert_eq!(
            serde_json::to_value(SessionPayload::anonymous()).unwrap(),
            json!({"user": null, "claims": {}})
        );
    }

    #[test]
    fn test_action_request_decoding() {
        let raw = json!({
            "type": "ACTION_REQUEST",
            "payload": {"action": "navigate", "data": {"path": "/x"}, "correlationId": "c-1"}
        });
        assert_eq!(MessageKind::of(&raw), Some(MessageKind::ActionRequest));
        match BridgeMessage::from_value(raw).unwrap() {
            BridgeMessage::ActionRequest(req) => {
                assert_eq!(req.action, "navigate");
                assert_eq!(req.data, json!({"path": "/x"}));
                assert_eq!(req.correlation_id, "c-1");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_action_request_missing_data_defaults_to_null() {
        let raw = json!({"type": "ACTION_REQUEST", "payload": {"action": "ping", "correlationId": "c"}});
        let BridgeMessage::ActionRequest(req) = BridgeMessage::from_value(raw).unwrap() else {
            panic!("expected an action request");
        };
        assert!(req.data.is_null());
    }

    #[test]
    fn test_action_response_omits_absent_fields() {
        let ok = BridgeMessage::ActionResponse(ActionResponse::success("c-1", json!({"ok": true})));
        assert_eq!(
            ok.to_value().unwrap(),
            json!({"type": "ACTION_RESPONSE", "payload": {"correlationId": "c-1", "result": {"ok": true}}})
        );

        let err = ActionResponse::failure("c-2", "denied");
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"correlationId": "c-2", "error": "denied"})
        );
        assert_eq!(err.into_outcome(), Err("denied".to_string()));
    }

    #[test]
    fn test_message_kind_ignores_unrelated_traffic() {
        assert_eq!(MessageKind::of(&json!({"type": "webpackOk"})), None);
        assert_eq!(MessageKind::of(&json!("SESSION_INIT")), None);
        assert_eq!(MessageKind::of(&json!({"type": 3})), None);
        assert_eq!(
            MessageKind::of(&json!({"type": "SESSION_INIT"})),
            Some(MessageKind::SessionInit)
        );
    }
}
