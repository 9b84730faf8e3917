use {anyhow::Result, async_trait::async_trait, larkbot_common::types::ChatType};

// ── Channel events (pub/sub) ────────────────────────────────────────────────

/// Events emitted by channel plugins for real-time UI updates.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelEvent {
    InboundMessage {
        channel_type: String,
        account_id: String,
        peer_id: String,
        chat_type: ChatType,
        sender_name: Option<String>,
        access_granted: bool,
    },
    /// An inbound event was dropped because it was already processed.
    DuplicateDropped {
        channel_type: String,
        account_id: String,
        event_id: String,
    },
}

/// Sink for channel events. The host application provides the concrete
/// implementation.
#[async_trait]
pub trait ChannelEventSink: Send + Sync {
    /// Broadcast a channel event for real-time UI updates.
    async fn emit(&self, event: ChannelEvent);

    /// Hand an approved inbound message to response generation. The reply is
    /// delivered later through the channel's [`ChannelOutbound`].
    async fn dispatch_to_chat(
        &self,
        text: &str,
        reply_to: ChannelReplyTarget,
        meta: ChannelMessageMeta,
    );
}

/// Metadata about a channel message, used for routing and display.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChannelMessageMeta {
    pub channel_type: String,
    pub chat_type: ChatType,
    pub sender_id: String,
    pub sender_name: Option<String>,
    /// Default model configured for this channel account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Provider that serves `model`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_provider: Option<String>,
}

/// Where to send the response back.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChannelReplyTarget {
    pub channel_type: String,
    pub account_id: String,
    /// Chat/peer ID to send the reply to.
    pub chat_id: String,
    /// Platform message ID of the inbound message, used for threaded replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// Core channel plugin trait. Each messaging platform implements this.
#[async_trait]
pub trait ChannelPlugin: Send + Sync {
    /// Channel identifier (e.g. "feishu").
    fn id(&self) -> &str;

    /// Human-readable channel name.
    fn name(&self) -> &str;

    /// Start an account connection.
    async fn start_account(&mut self, account_id: &str, config: serde_json::Value) -> Result<()>;

    /// Stop an account connection.
    async fn stop_account(&mut self, account_id: &str) -> Result<()>;

    /// Get outbound adapter for sending messages.
    fn outbound(&self) -> Option<&dyn ChannelOutbound>;

    /// Get status adapter for health checks.
    fn status(&self) -> Option<&dyn ChannelStatus>;
}

/// Send messages to a channel.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    /// Send a text message, threaded under `reply_to` when given. Returns the
    /// platform message ID.
    async fn send_text(
        &self,
        account_id: &str,
        to: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<String>;

    /// Send a media message for `media_url`, with an optional caption.
    async fn send_media(
        &self,
        account_id: &str,
        to: &str,
        media_url: &str,
        caption: Option<&str>,
        reply_to: Option<&str>,
    ) -> Result<Option<String>>;

    /// Replace the text of a previously sent message.
    async fn update_text(&self, account_id: &str, message_id: &str, text: &str) -> Result<()>;

    /// Remove a previously sent message. Failures are not reported.
    async fn delete_message(&self, account_id: &str, message_id: &str);
}

/// Probe channel account health.
#[async_trait]
pub trait ChannelStatus: Send + Sync {
    async fn probe(&self, account_id: &str) -> Result<ChannelHealthSnapshot>;
}

/// Channel health snapshot.
#[derive(Debug, Clone)]
pub struct ChannelHealthSnapshot {
    pub connected: bool,
    pub account_id: String,
    pub details: Option<String>,
}
