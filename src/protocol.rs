//! Wire types for the backend API
//!
//! Shapes match the JSON the web backend actually exchanges, including the
//! streamed conversation events and the paginated history payloads.

use crate::idset::HasId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// One page of the conversations listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationHistoryPage {
    pub items: Vec<HistoryItem>,
    pub total: usize,
    pub limit: u32,
    pub offset: u32,
    #[serde(default)]
    pub has_missing_conversations: bool,
}

/// A single history entry. Identity is `id`; title and timestamps do not
/// participate in deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub create_time: String,
    #[serde(default)]
    pub update_time: String,
}

impl HasId for HistoryItem {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
    /// Roles this client does not know about are carried but not acted on.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub content_type: String,
    #[serde(default)]
    pub parts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub author: Author,
    pub content: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_turn: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

/// One decoded event from the streamed conversation body.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationEvent {
    pub message: Message,
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub error: Option<Value>,
}

/// Body for `POST /backend-api/conversation`.
#[derive(Debug, Clone, Serialize)]
pub struct NewMessageRequest {
    pub action: String,
    pub messages: Vec<Message>,
    pub parent_message_id: String,
    pub model: String,
    pub timezone_offset_min: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl NewMessageRequest {
    /// Build a request opening a new conversation with a single user message.
    pub fn new_conversation(text: &str, model: &str, timezone_offset_min: i32) -> Self {
        Self {
            action: "next".to_string(),
            messages: vec![Message {
                id: Uuid::new_v4().to_string(),
                author: Author {
                    role: Role::User,
                    metadata: None,
                },
                content: Content {
                    content_type: "text".to_string(),
                    parts: vec![text.to_string()],
                },
                create_time: None,
                update_time: None,
                end_turn: None,
                weight: None,
                metadata: None,
                recipient: None,
            }],
            parent_message_id: Uuid::new_v4().to_string(),
            model: model.to_string(),
            timezone_offset_min,
            conversation_id: None,
        }
    }

    /// Same as [`Self::new_conversation`] but continuing an existing one.
    pub fn in_conversation(
        text: &str,
        model: &str,
        timezone_offset_min: i32,
        conversation_id: &str,
    ) -> Self {
        let mut request = Self::new_conversation(text, model, timezone_offset_min);
        request.conversation_id = Some(conversation_id.to_string());
        request
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TitleRequest {
    pub message_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TitleResponse {
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub slug: String,
    #[serde(default)]
    pub max_tokens: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub qualitative_properties: QualitativeProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QualitativeProperties {
    #[serde(default)]
    pub reasoning: Vec<i32>,
    #[serde(default)]
    pub speed: Vec<i32>,
    #[serde(default)]
    pub conciseness: Vec<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserAccountInfo {
    pub account_plan: AccountPlan,
    #[serde(default)]
    pub user_country: String,
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountPlan {
    #[serde(default)]
    pub is_paid_subscription_active: bool,
    #[serde(default)]
    pub subscription_plan: String,
    #[serde(default)]
    pub account_user_role: String,
    #[serde(default)]
    pub was_paid_customer: bool,
    #[serde(default)]
    pub has_customer_object: bool,
    #[serde(default)]
    pub subscription_expires_at_timestamp: i64,
}

/// Full conversation tree as returned by `GET /backend-api/conversation/<id>`.
#[derive(Debug, Clone, Deserialize)]
pub struct Conversation {
    pub title: String,
    pub create_time: f64,
    pub update_time: f64,
    pub mapping: HashMap<String, MappingNode>,
    #[serde(default)]
    pub moderation_results: Vec<Value>,
    pub current_node: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MappingNode {
    pub id: String,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_page_decodes_backend_shape() {
        let json = r#"{
            "items": [{"id": "c1", "title": "First", "create_time": "2023-02-01T10:00:00.000Z", "update_time": "2023-02-01T10:05:00.000Z"}],
            "total": 42, "limit": 100, "offset": 0, "has_missing_conversations": false
        }"#;
        let page: ConversationHistoryPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.total, 42);
        assert_eq!(page.items[0].id, "c1");
        assert_eq!(page.items[0].id(), "c1");
    }

    #[test]
    fn new_conversation_request_serializes_protocol_fields() {
        let request = NewMessageRequest::new_conversation("hello", "text-davinci-002-render", -120);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["action"], "next");
        assert_eq!(value["messages"][0]["author"]["role"], "user");
        assert_eq!(value["messages"][0]["content"]["content_type"], "text");
        assert_eq!(value["messages"][0]["content"]["parts"][0], "hello");
        assert_eq!(value["timezone_offset_min"], -120);
        // New conversations omit conversation_id entirely.
        assert!(value.get("conversation_id").is_none());
        // Optional message fields are omitted, not null.
        assert!(value["messages"][0].get("end_turn").is_none());
    }

    #[test]
    fn in_conversation_request_carries_conversation_id() {
        let request = NewMessageRequest::in_conversation("more", "gpt-4", 0, "conv-9");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["conversation_id"], "conv-9");
    }

    #[test]
    fn unknown_role_does_not_fail_event_decode() {
        let json = r#"{
            "conversation_id": "c",
            "message": {
                "id": "m",
                "author": {"role": "moderator"},
                "content": {"content_type": "text", "parts": []}
            }
        }"#;
        let event: ConversationEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.message.author.role, Role::Unknown);
    }
}
