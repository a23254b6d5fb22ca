//! Extension UI collaborator - popups, tab messages, notifications.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::VaultResult;

/// Popup width while onboarding is still pending.
pub const ONBOARDING_POPUP_WIDTH: u32 = 800;
pub const POPUP_WIDTH: u32 = 357;
pub const POPUP_HEIGHT: u32 = 640;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupRequest {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl PopupRequest {
    /// `index.html?originTabId=..&origin=..&<data..>#<messageType>`, every
    /// parameter value JSON-encoded.
    pub fn for_client_request(
        message_type: &str,
        origin_tab_id: i64,
        origin: &str,
        data: &Value,
        onboarding_pending: bool,
    ) -> Self {
        let mut params = vec![
            ("originTabId".to_string(), origin_tab_id.to_string()),
            ("origin".to_string(), Value::String(origin.to_string()).to_string()),
        ];
        if let Value::Object(map) = data {
            params.extend(map.iter().map(|(k, v)| (k.clone(), v.to_string())));
        }
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        Self {
            url: format!("index.html?{query}#{message_type}"),
            width: if onboarding_pending { ONBOARDING_POPUP_WIDTH } else { POPUP_WIDTH },
            height: POPUP_HEIGHT,
        }
    }
}

/// Message delivered to one tab's content script, scoped by origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub origin: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub message: String,
}

#[async_trait]
pub trait ExtensionUi: Send + Sync {
    /// Open an approval popup. `Ok(false)` when the window could not be created.
    async fn open_popup(&self, request: PopupRequest) -> VaultResult<bool>;
    async fn send_to_tab(&self, tab_id: i64, message: TabMessage) -> VaultResult<()>;
    async fn notify(&self, notification: Notification) -> VaultResult<()>;
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for &b in value.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
