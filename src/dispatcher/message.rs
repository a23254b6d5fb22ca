//! Request and response envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, VaultError, VaultResult};
use crate::protocol::MessageType;

/// Who sent a message. Extension pages have no tab; content scripts
/// forward page requests with the page's tab id and origin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sender {
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub tab_id: Option<i64>,
}

impl Sender {
    pub fn extension() -> Self { Self::default() }

    pub fn page(origin: impl Into<String>, tab_id: i64) -> Self {
        Self { origin: Some(origin.into()), tab_id: Some(tab_id) }
    }

    pub fn is_page(&self) -> bool { self.tab_id.is_some() }

    /// Origin and tab of a page sender.
    pub fn page_scope(&self) -> VaultResult<(&str, i64)> {
        match (self.origin.as_deref(), self.tab_id) {
            (Some(origin), Some(tab)) if !origin.is_empty() => Ok((origin, tab)),
            _ => Err(VaultError::validation("request has no page origin")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub message: MessageType,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub sender: Sender,
}

impl Request {
    pub fn new(message: MessageType, data: Value) -> Self {
        Self { message, data, sender: Sender::extension() }
    }

    pub fn from_page(message: MessageType, data: Value, origin: &str, tab_id: i64) -> Self {
        Self { message, data, sender: Sender::page(origin, tab_id) }
    }

    /// Parse a raw `{message, data, sender}` envelope. Unknown message names
    /// are validation errors, not deserialization failures.
    pub fn from_value(value: Value) -> VaultResult<Self> {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| VaultError::validation("envelope has no message"))?;
        let message = MessageType::parse(message)?;
        let data = value.get("data").cloned().unwrap_or(Value::Null);
        let sender = match value.get("sender") {
            Some(s) if !s.is_null() => serde_json::from_value(s.clone())
                .map_err(|e| VaultError::validation(format!("sender: {e}")))?,
            _ => Sender::extension(),
        };
        Ok(Self { message, data, sender })
    }
}

/// Exactly one per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Response {
    Ok { data: Value },
    Err { kind: ErrorKind, message: String },
}

impl Response {
    pub fn is_ok(&self) -> bool { matches!(self, Response::Ok { .. }) }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Response::Ok { data } => Some(data),
            Response::Err { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Response::Ok { .. } => None,
            Response::Err { kind, .. } => Some(*kind),
        }
    }
}

impl From<VaultResult<Value>> for Response {
    fn from(result: VaultResult<Value>) -> Self {
        match result {
            Ok(data) => Response::Ok { data },
            Err(err) => Response::Err { kind: err.kind(), message: err.public_message() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_parsing() {
        let req = Request::from_value(json!({
            "message": "clientRequestBalance",
            "sender": {"origin": "https://a", "tabId": 4}
        }))
        .unwrap();
        assert_eq!(req.message, MessageType::ClientRequestBalance);
        assert_eq!(req.sender.page_scope().unwrap(), ("https://a", 4));
        assert!(req.data.is_null());

        let err = Request::from_value(json!({"message": "mintNft"})).unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
        assert!(Request::from_value(json!({"data": {}})).is_err());
    }

    #[test]
    fn test_response_shape() {
        let ok: Response = Ok(json!({"a": 1})).into();
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!({"status": "ok", "data": {"a": 1}}));

        let err: Response = Err(VaultError::Network("dns failure on 10.1.1.1".into())).into();
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"status": "err", "kind": "network", "message": "Network request failed"})
        );
    }
}
