use std::time::{Duration, Instant};

use serde::Serialize;

use crate::{
    api::{BotInfo, FeishuApi},
    client::FeishuHttpClient,
    config::FeishuAccountConfig,
};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a credential check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot: Option<BotInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl ProbeResult {
    fn failed(error: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            ok: false,
            bot: None,
            error: Some(error.into()),
            elapsed_ms,
        }
    }
}

/// Check an account's app credentials by fetching the bot identity.
pub async fn probe_credentials(config: &FeishuAccountConfig, timeout: Duration) -> ProbeResult {
    if !config.is_configured() {
        return ProbeResult::failed("missing app_id or app_secret", 0);
    }
    let http = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(http) => http,
        Err(e) => return ProbeResult::failed(e.to_string(), 0),
    };
    let client = FeishuHttpClient::with_http(http, config.clone());
    probe_api(&client, timeout).await
}

/// Run [`FeishuApi::probe`] under `timeout`.
pub async fn probe_api(api: &dyn FeishuApi, timeout: Duration) -> ProbeResult {
    let started = Instant::now();
    let result = tokio::time::timeout(timeout, api.probe()).await;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let timed_out = || format!("request timed out after {}ms", timeout.as_millis());

    match result {
        Ok(Ok(bot)) => ProbeResult {
            ok: true,
            bot: Some(bot).filter(|b| *b != BotInfo::default()),
            error: None,
            elapsed_ms,
        },
        Ok(Err(e)) if e.is_timeout() => ProbeResult::failed(timed_out(), elapsed_ms),
        Ok(Err(e)) => ProbeResult::failed(e.to_string(), elapsed_ms),
        Err(_) => ProbeResult::failed(timed_out(), elapsed_ms),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::path::Path;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        api::{FileType, OutgoingMessage},
        error::Result,
        test_support::{FakeApi, MockOpenApi},
    };

    struct StalledApi;

    #[async_trait]
    impl FeishuApi for StalledApi {
        async fn send_message(&self, _: &str, _: &OutgoingMessage) -> Result<String> {
            unreachable!()
        }

        async fn reply_message(&self, _: &str, _: &OutgoingMessage) -> Result<String> {
            unreachable!()
        }

        async fn update_message(&self, _: &str, _: &str) -> Result<()> {
            unreachable!()
        }

        async fn delete_message(&self, _: &str) -> Result<()> {
            unreachable!()
        }

        async fn upload_image(&self, _: &Path) -> Result<String> {
            unreachable!()
        }

        async fn upload_file(&self, _: &Path, _: &str, _: FileType) -> Result<String> {
            unreachable!()
        }

        async fn probe(&self) -> Result<BotInfo> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn missing_credentials_fail_immediately() {
        let result = probe_credentials(&FeishuAccountConfig::default(), DEFAULT_PROBE_TIMEOUT).await;
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("missing app_id or app_secret"));
        assert_eq!(result.elapsed_ms, 0);
    }

    #[tokio::test]
    async fn probe_against_mock_api() {
        let mock = MockOpenApi::start().await;
        let result = probe_credentials(&mock.config(), DEFAULT_PROBE_TIMEOUT).await;
        assert!(result.ok, "{result:?}");
        assert_eq!(
            result.bot.unwrap().app_name.as_deref(),
            Some("Mock Bot")
        );
        assert_eq!(mock.token_requests(), 1);
    }

    #[tokio::test]
    async fn credentials_pass_when_bot_identity_is_absent() {
        let mock = MockOpenApi::start().await;
        mock.set_bot_info_includes_bot(false);
        let result = probe_credentials(&mock.config(), DEFAULT_PROBE_TIMEOUT).await;
        assert!(result.ok, "{result:?}");
        assert!(result.bot.is_none());
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn probe_reports_bot_from_fake() {
        let result = probe_api(&FakeApi::default(), DEFAULT_PROBE_TIMEOUT).await;
        assert!(result.ok);
        assert_eq!(result.bot.unwrap().open_id.as_deref(), Some("ou_fake"));
    }

    #[tokio::test]
    async fn stalled_probe_times_out() {
        let result = probe_api(&StalledApi, Duration::from_millis(20)).await;
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("request timed out after 20ms"));
    }
}
