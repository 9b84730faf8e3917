//! The narrow set of Open API operations the channel needs.

use std::path::Path;

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use crate::error::Result;

/// Message `msg_type` values used by this channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Text,
    Image,
    Media,
    Audio,
    File,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Media => "media",
            Self::Audio => "audio",
            Self::File => "file",
        }
    }
}

/// Upload encodings accepted by `POST /im/v1/files`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Mp4,
    Opus,
    Stream,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Opus => "opus",
            Self::Stream => "stream",
        }
    }
}

/// A message body ready to send: `content` is the JSON-encoded string the
/// Open API expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub msg_type: MessageType,
    pub content: String,
}

impl OutgoingMessage {
    pub fn text(text: &str) -> Self {
        Self {
            msg_type: MessageType::Text,
            content: serde_json::json!({ "text": text }).to_string(),
        }
    }

    pub fn image(image_key: &str) -> Self {
        Self {
            msg_type: MessageType::Image,
            content: serde_json::json!({ "image_key": image_key }).to_string(),
        }
    }

    /// Video, audio and generic file messages all reference a `file_key`.
    pub fn file(msg_type: MessageType, file_key: &str) -> Self {
        Self {
            msg_type,
            content: serde_json::json!({ "file_key": file_key }).to_string(),
        }
    }
}

/// Bot identity returned by `GET /bot/v3/info`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotInfo {
    #[serde(default, alias = "bot_name", skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_id: Option<String>,
}

/// Platform client used by the delivery pipeline and the probe.
#[async_trait]
pub trait FeishuApi: Send + Sync {
    /// Post a new top-level message to a chat. Returns the message id.
    async fn send_message(&self, chat_id: &str, message: &OutgoingMessage) -> Result<String>;

    /// Reply in the thread of `message_id`. Returns the new message id.
    async fn reply_message(&self, message_id: &str, message: &OutgoingMessage) -> Result<String>;

    /// Replace the text content of an existing message.
    async fn update_message(&self, message_id: &str, text: &str) -> Result<()>;

    async fn delete_message(&self, message_id: &str) -> Result<()>;

    /// Upload an image for use in a message. Returns the `image_key`.
    async fn upload_image(&self, path: &Path) -> Result<String>;

    /// Upload a file for use in a message. Returns the `file_key`.
    async fn upload_file(&self, path: &Path, file_name: &str, file_type: FileType)
    -> Result<String>;

    /// Validate credentials and fetch the bot identity.
    async fn probe(&self) -> Result<BotInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_content_is_json_encoded() {
        let msg = OutgoingMessage::text("hi \"there\"");
        assert_eq!(msg.msg_type.as_str(), "text");
        assert_eq!(msg.content, r#"{"text":"hi \"there\""}"#);

        let msg = OutgoingMessage::file(MessageType::Media, "file_v2_1");
        assert_eq!(msg.msg_type.as_str(), "media");
        assert_eq!(msg.content, r#"{"file_key":"file_v2_1"}"#);
    }
}
