//! The agent-runtime wire protocol (spec §3, §6): three frame variants
//! tagged by `type`. Byte-for-byte compatibility matters on the literal
//! `type` values and the `connect`/`chat.send` method names and params, so
//! these types are kept close to the wire rather than reshaped for
//! ergonomics.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    #[serde(rename = "req")]
    Request {
        id: String,
        method: String,
        params: Value,
    },
    #[serde(rename = "res")]
    Response {
        id: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<FrameError>,
    },
    #[serde(rename = "event")]
    Event { event: String, payload: Value },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectChallengePayload {
    pub nonce: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectParams {
    #[serde(rename = "minProtocol")]
    pub min_protocol: u32,
    #[serde(rename = "maxProtocol")]
    pub max_protocol: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    pub client: ConnectClient,
    pub caps: Vec<String>,
    pub role: String,
    pub scopes: Vec<String>,
    pub auth: ConnectAuth,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectClient {
    pub id: String,
    pub mode: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectAuth {
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatSendParams {
    #[serde(rename = "sessionKey")]
    pub session_key: String,
    pub message: String,
    #[serde(rename = "idempotencyKey")]
    pub idempotency_key: String,
    #[serde(rename = "timeoutMs", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatEventPayload {
    #[serde(rename = "runId", default)]
    pub run_id: Option<String>,
    #[serde(rename = "sessionKey", default)]
    pub session_key: Option<String>,
    pub state: ChatState,
    #[serde(default)]
    pub message: Option<ChatMessage>,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatState {
    Delta,
    Final,
    Error,
    Aborted,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub content: Vec<ContentItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl ChatMessage {
    /// Concatenate all `type:"text"` content items, in order.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter(|item| item.item_type == "text")
            .filter_map(|item| item.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_frame_serializes_with_literal_type_tag() {
        let frame = Frame::Request {
            id: "1".to_string(),
            method: "connect".to_string(),
            params: serde_json::json!({}),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "req");
    }

    #[test]
    fn response_frame_round_trips() {
        let raw = r#"{"type":"res","id":"1","ok":true,"result":{"protocol":3}}"#;
        let frame: Frame = serde_json::from_str(raw).unwrap();
        match frame {
            Frame::Response { id, ok, result, .. } => {
                assert_eq!(id, "1");
                assert!(ok);
                assert_eq!(result.unwrap()["protocol"], 3);
            }
            _ => panic!("expected response frame"),
        }
    }

    #[test]
    fn chat_event_parses_final_state() {
        let raw = r#"{"type":"event","event":"chat","payload":{"runId":"r1","sessionKey":"s1","state":"final","message":{"content":[{"type":"text","text":"hi"}]}}}"#;
        let frame: Frame = serde_json::from_str(raw).unwrap();
        match frame {
            Frame::Event { event, payload } => {
                assert_eq!(event, "chat");
                let parsed: ChatEventPayload = serde_json::from_value(payload).unwrap();
                assert_eq!(parsed.state, ChatState::Final);
                assert_eq!(parsed.message.unwrap().text_content(), "hi");
            }
            _ => panic!("expected event frame"),
        }
    }
}
