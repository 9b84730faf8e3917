//! Outbound delivery: text, media with link fallback, edits and deletes.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use {
    async_trait::async_trait,
    larkbot_channels::ChannelOutbound,
    larkbot_media::{TransientFetcher, TransientResource, classify, extension},
    serde::Serialize,
    tracing::{debug, info, warn},
};

use crate::{
    api::{FeishuApi, OutgoingMessage},
    error::{Error, Result},
    state::AccountStateMap,
    upload::{RemoteUploader, media_message},
};

/// Result of one delivery call. `ok` implies no `error`; a failure always
/// carries one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn delivered(message_id: Option<String>) -> Self {
        Self {
            ok: true,
            message_id,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            message_id: None,
            error: Some(error.into()),
        }
    }

    /// Convert into a `Result`, for callers that propagate with `?`.
    pub fn into_result(self) -> std::result::Result<Option<String>, String> {
        if self.ok {
            Ok(self.message_id)
        } else {
            Err(self.error.unwrap_or_else(|| "delivery failed".into()))
        }
    }
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Sends replies for one account.
#[derive(Clone)]
pub struct DeliveryPipeline {
    account_id: String,
    api: Arc<dyn FeishuApi>,
    uploader: RemoteUploader,
    fetcher: TransientFetcher,
}

impl DeliveryPipeline {
    pub fn new(
        account_id: impl Into<String>,
        api: Arc<dyn FeishuApi>,
        fetcher: TransientFetcher,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            uploader: RemoteUploader::new(Arc::clone(&api)),
            api,
            fetcher,
        }
    }

    pub fn api(&self) -> &Arc<dyn FeishuApi> {
        &self.api
    }

    /// Send a text message, threaded under `reply_to` when given.
    pub async fn send_text(
        &self,
        target: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> DeliveryOutcome {
        match self.try_send_text(target, text, reply_to).await {
            Ok(message_id) => {
                info!(account_id = %self.account_id, chat_id = target, "feishu text sent");
                DeliveryOutcome::delivered(Some(message_id))
            },
            Err(e) => {
                warn!(account_id = %self.account_id, chat_id = target, error = %e, "feishu text send failed");
                DeliveryOutcome::failed(e.to_string())
            },
        }
    }

    async fn try_send_text(&self, target: &str, text: &str, reply_to: Option<&str>) -> Result<String> {
        let target = target.trim();
        if target.is_empty() {
            return Err(Error::invalid_input("no chat id provided"));
        }
        let message = OutgoingMessage::text(text);
        match non_blank(reply_to) {
            Some(parent) => self.api.reply_message(parent, &message).await,
            None => self.api.send_message(target, &message).await,
        }
    }

    /// Send media referenced by `locator`, classified from the locator alone.
    pub async fn send_media(
        &self,
        target: &str,
        locator: &str,
        caption: Option<&str>,
        reply_to: Option<&str>,
    ) -> DeliveryOutcome {
        self.send_media_with_mime(target, locator, caption, reply_to, None)
            .await
    }

    /// Send media, using `declared_mime` when the locator has no recognised
    /// suffix. Any failure after validation falls back to a single text
    /// message carrying the caption and the locator.
    pub async fn send_media_with_mime(
        &self,
        target: &str,
        locator: &str,
        caption: Option<&str>,
        reply_to: Option<&str>,
        declared_mime: Option<&str>,
    ) -> DeliveryOutcome {
        let target = target.trim();
        let locator = locator.trim();
        if target.is_empty() {
            return DeliveryOutcome::failed("no chat id provided");
        }
        if locator.is_empty() {
            return DeliveryOutcome::failed("no media locator provided");
        }

        let (result, resource) = match self.fetcher.acquire(locator).await {
            Ok(resource) => {
                let result = self
                    .deliver_media(&resource, target, locator, caption, reply_to, declared_mime)
                    .await;
                (result, Some(resource))
            },
            Err(e) => (Err(Error::from(e)), None),
        };

        let outcome = match result {
            Ok(message_id) => {
                info!(account_id = %self.account_id, chat_id = target, "feishu media sent");
                DeliveryOutcome::delivered(Some(message_id))
            },
            Err(e) => self.send_link_fallback(target, locator, caption, e).await,
        };

        if let Some(resource) = resource {
            resource.release().await;
        }
        outcome
    }

    async fn deliver_media(
        &self,
        resource: &TransientResource,
        target: &str,
        locator: &str,
        caption: Option<&str>,
        reply_to: Option<&str>,
        declared_mime: Option<&str>,
    ) -> Result<String> {
        let kind = classify(locator, declared_mime);
        let display_name = format!("file_{}.{}", unix_millis(), extension(locator));
        let handle = self.uploader.upload(resource, kind, &display_name).await?;

        let message = media_message(kind, &handle);
        let message_id = match non_blank(reply_to) {
            Some(parent) => self.api.reply_message(parent, &message).await?,
            None => self.api.send_message(target, &message).await?,
        };

        if let Some(caption) = non_blank(caption) {
            self.api
                .send_message(target, &OutgoingMessage::text(caption))
                .await?;
        }
        Ok(message_id)
    }

    async fn send_link_fallback(
        &self,
        target: &str,
        locator: &str,
        caption: Option<&str>,
        original: Error,
    ) -> DeliveryOutcome {
        warn!(
            account_id = %self.account_id,
            chat_id = target,
            error = %original,
            "feishu media delivery failed, sending link instead"
        );
        let text = match non_blank(caption) {
            Some(caption) => format!("{caption}\n{locator}"),
            None => locator.to_string(),
        };
        match self
            .api
            .send_message(target, &OutgoingMessage::text(&text))
            .await
        {
            Ok(message_id) => DeliveryOutcome::delivered(Some(message_id)),
            Err(fallback) => {
                warn!(
                    account_id = %self.account_id,
                    chat_id = target,
                    error = %fallback,
                    "feishu link fallback failed"
                );
                DeliveryOutcome::failed(original.to_string())
            },
        }
    }

    /// Replace the text of an existing message.
    pub async fn update(&self, message_id: &str, text: &str) -> DeliveryOutcome {
        let message_id = message_id.trim();
        if message_id.is_empty() {
            return DeliveryOutcome::failed("no message id provided");
        }
        match self.api.update_message(message_id, text).await {
            Ok(()) => DeliveryOutcome::delivered(Some(message_id.to_string())),
            Err(e) => {
                warn!(account_id = %self.account_id, message_id, error = %e, "feishu message update failed");
                DeliveryOutcome::failed(e.to_string())
            },
        }
    }

    /// Delete a message. Failures are logged and dropped.
    pub async fn delete(&self, message_id: &str) {
        let message_id = message_id.trim();
        if message_id.is_empty() {
            return;
        }
        if let Err(e) = self.api.delete_message(message_id).await {
            debug!(account_id = %self.account_id, message_id, error = %e, "feishu message delete failed");
        }
    }
}

/// [`ChannelOutbound`] over the running accounts' pipelines.
pub struct FeishuOutbound {
    pub(crate) accounts: AccountStateMap,
}

impl FeishuOutbound {
    fn pipeline(&self, account_id: &str) -> std::result::Result<DeliveryPipeline, larkbot_channels::Error> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts
            .get(account_id)
            .map(|state| state.pipeline.clone())
            .ok_or_else(|| larkbot_channels::Error::unknown_account(account_id))
    }
}

fn outcome_to_anyhow(outcome: DeliveryOutcome) -> anyhow::Result<Option<String>> {
    outcome.into_result().map_err(anyhow::Error::msg)
}

#[async_trait]
impl ChannelOutbound for FeishuOutbound {
    async fn send_text(
        &self,
        account_id: &str,
        to: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> anyhow::Result<String> {
        let pipeline = self.pipeline(account_id)?;
        let outcome = pipeline.send_text(to, text, reply_to).await;
        Ok(outcome_to_anyhow(outcome)?.unwrap_or_default())
    }

    async fn send_media(
        &self,
        account_id: &str,
        to: &str,
        media_url: &str,
        caption: Option<&str>,
        reply_to: Option<&str>,
    ) -> anyhow::Result<Option<String>> {
        let pipeline = self.pipeline(account_id)?;
        outcome_to_anyhow(pipeline.send_media(to, media_url, caption, reply_to).await)
    }

    async fn update_text(&self, account_id: &str, message_id: &str, text: &str) -> anyhow::Result<()> {
        let pipeline = self.pipeline(account_id)?;
        outcome_to_anyhow(pipeline.update(message_id, text).await)?;
        Ok(())
    }

    async fn delete_message(&self, account_id: &str, message_id: &str) {
        match self.pipeline(account_id) {
            Ok(pipeline) => pipeline.delete(message_id).await,
            Err(e) => debug!(account_id, message_id, error = %e, "feishu delete skipped"),
        }
    }
}
