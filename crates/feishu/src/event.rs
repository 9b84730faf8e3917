//! Inbound `im.message.receive_v1` event payloads (schema 2.0).

use {larkbot_common::types::ChatType, serde::Deserialize};

use crate::error::Result;

pub const MESSAGE_RECEIVE_EVENT: &str = "im.message.receive_v1";

#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub header: EventHeader,
    pub event: MessageReceiveEvent,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventHeader {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageReceiveEvent {
    #[serde(default)]
    pub sender: Sender,
    pub message: Message,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub sender_id: UserId,
    #[serde(default)]
    pub sender_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserId {
    #[serde(default)]
    pub open_id: Option<String>,
    #[serde(default)]
    pub union_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl UserId {
    /// Non-empty identifiers, open_id first.
    pub fn ids(&self) -> Vec<&str> {
        [&self.open_id, &self.union_id, &self.user_id]
            .into_iter()
            .filter_map(|id| id.as_deref())
            .filter(|id| !id.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub chat_id: String,
    /// `p2p` or `group`.
    pub chat_type: String,
    pub message_type: String,
    /// JSON-encoded body; for text messages `{"text": "..."}`.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub mentions: Vec<Mention>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Mention {
    /// Placeholder in the text, e.g. `@_user_1`.
    pub key: String,
    #[serde(default)]
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize)]
struct TextContent {
    #[serde(default)]
    text: String,
}

impl EventEnvelope {
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn message(&self) -> &Message {
        &self.event.message
    }

    /// ID used for redelivery detection: the header event id, or the message
    /// id when the header carries none.
    pub fn dedup_key(&self) -> Option<&str> {
        self.header
            .event_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .or_else(|| Some(self.event.message.message_id.as_str()).filter(|id| !id.is_empty()))
    }

    pub fn chat_type(&self) -> ChatType {
        match self.event.message.chat_type.as_str() {
            "p2p" => ChatType::Dm,
            _ => ChatType::Group,
        }
    }

    pub fn sender_ids(&self) -> Vec<&str> {
        self.event.sender.sender_id.ids()
    }

    pub fn mention_count(&self) -> usize {
        self.event.message.mentions.len()
    }

    /// Plain text of a `text` message with mention placeholders removed.
    /// `None` for other message types or undecodable content.
    pub fn text(&self) -> Option<String> {
        let message = &self.event.message;
        if message.message_type != "text" {
            return None;
        }
        let content: TextContent = serde_json::from_str(&message.content).ok()?;
        let mut text = content.text;
        for mention in &message.mentions {
            text = text.replace(&mention.key, "");
        }
        Some(text.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}
