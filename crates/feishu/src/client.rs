use std::path::Path;

use {
    async_trait::async_trait,
    reqwest::{
        Method, RequestBuilder,
        multipart::{Form, Part},
    },
    secrecy::ExposeSecret,
    serde_json::Value,
    tracing::debug,
};

use crate::{
    api::{BotInfo, FeishuApi, FileType, OutgoingMessage},
    auth::{CachedTenantToken, tenant_access_token},
    config::FeishuAccountConfig,
    error::{Error, Result},
};

/// [`FeishuApi`] over the Open API using a tenant access token.
pub struct FeishuHttpClient {
    http: reqwest::Client,
    config: FeishuAccountConfig,
    token_cache: tokio::sync::Mutex<Option<CachedTenantToken>>,
}

/// A decoded Open API response together with the body as received.
struct ApiResponse {
    body: Value,
    raw: String,
}

impl ApiResponse {
    /// Look `key` up under `data` first, then at the top level.
    fn str_field(&self, key: &str) -> Option<&str> {
        self.body
            .get("data")
            .and_then(|d| d.get(key))
            .or_else(|| self.body.get(key))
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
    }

    fn require(&self, operation: &'static str, key: &str) -> Result<String> {
        self.str_field(key)
            .map(str::to_string)
            .ok_or_else(|| Error::MissingField {
                operation,
                raw: self.raw.clone(),
            })
    }
}

impl FeishuHttpClient {
    pub fn new(config: FeishuAccountConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_http(http, config))
    }

    pub fn with_http(http: reqwest::Client, config: FeishuAccountConfig) -> Self {
        Self {
            http,
            config,
            token_cache: tokio::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &FeishuAccountConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/open-apis{path}", self.config.api_base())
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = tenant_access_token(&self.http, &self.config, &self.token_cache).await?;
        Ok(self
            .http
            .request(method, self.url(path))
            .bearer_auth(token.expose_secret()))
    }

    async fn call(&self, operation: &'static str, request: RequestBuilder) -> Result<ApiResponse> {
        let resp = request.send().await?;
        let status = resp.status();
        let raw = resp.text().await?;
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body: raw,
            });
        }

        let body: Value = serde_json::from_str(&raw).map_err(|_| Error::MissingField {
            operation,
            raw: raw.clone(),
        })?;
        let code = body.get("code").and_then(Value::as_i64).unwrap_or(0);
        if code != 0 {
            let msg = body
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(Error::Api { code, msg });
        }
        debug!(operation, "Feishu API call succeeded");
        Ok(ApiResponse { body, raw })
    }

    async fn file_part(path: &Path, file_name: String) -> Result<Part> {
        let bytes = tokio::fs::read(path).await?;
        Ok(Part::bytes(bytes).file_name(file_name))
    }
}

fn message_path(message_id: &str) -> String {
    format!("/im/v1/messages/{}", urlencoding::encode(message_id))
}

#[async_trait]
impl FeishuApi for FeishuHttpClient {
    async fn send_message(&self, chat_id: &str, message: &OutgoingMessage) -> Result<String> {
        let body = serde_json::json!({
            "receive_id": chat_id,
            "msg_type": message.msg_type.as_str(),
            "content": message.content,
        });
        let request = self
            .request(Method::POST, "/im/v1/messages")
            .await?
            .query(&[("receive_id_type", "chat_id")])
            .json(&body);
        self.call("Send message", request)
            .await?
            .require("Send message", "message_id")
    }

    async fn reply_message(&self, message_id: &str, message: &OutgoingMessage) -> Result<String> {
        let body = serde_json::json!({
            "msg_type": message.msg_type.as_str(),
            "content": message.content,
        });
        let path = format!("{}/reply", message_path(message_id));
        let request = self.request(Method::POST, &path).await?.json(&body);
        self.call("Reply message", request)
            .await?
            .require("Reply message", "message_id")
    }

    async fn update_message(&self, message_id: &str, text: &str) -> Result<()> {
        let message = OutgoingMessage::text(text);
        let body = serde_json::json!({
            "msg_type": message.msg_type.as_str(),
            "content": message.content,
        });
        let request = self
            .request(Method::PUT, &message_path(message_id))
            .await?
            .json(&body);
        self.call("Update message", request).await?;
        Ok(())
    }

    async fn delete_message(&self, message_id: &str) -> Result<()> {
        let request = self
            .request(Method::DELETE, &message_path(message_id))
            .await?;
        self.call("Delete message", request).await?;
        Ok(())
    }

    async fn upload_image(&self, path: &Path) -> Result<String> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".into());
        let form = Form::new()
            .text("image_type", "message")
            .part("image", Self::file_part(path, file_name).await?);
        let request = self
            .request(Method::POST, "/im/v1/images")
            .await?
            .multipart(form);
        self.call("Upload image", request)
            .await?
            .require("Upload image", "image_key")
    }

    async fn upload_file(
        &self,
        path: &Path,
        file_name: &str,
        file_type: FileType,
    ) -> Result<String> {
        let form = Form::new()
            .text("file_type", file_type.as_str())
            .text("file_name", file_name.to_string())
            .part("file", Self::file_part(path, file_name.to_string()).await?);
        let request = self
            .request(Method::POST, "/im/v1/files")
            .await?
            .multipart(form);
        self.call("Upload file", request)
            .await?
            .require("Upload file", "file_key")
    }

    async fn probe(&self) -> Result<BotInfo> {
        let request = self.request(Method::GET, "/bot/v3/info").await?;
        let resp = self.call("Bot info", request).await?;
        // A successful call without a bot object still validates the credentials.
        let Some(bot) = resp
            .body
            .get("bot")
            .or_else(|| resp.body.get("data").and_then(|d| d.get("bot")))
            .cloned()
        else {
            return Ok(BotInfo::default());
        };
        Ok(serde_json::from_value(bot)?)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{api::MessageType, test_support::MockOpenApi};

    #[tokio::test]
    async fn send_and_reply_return_message_ids() {
        let mock = MockOpenApi::start().await;
        let client = FeishuHttpClient::new(mock.config()).unwrap();

        let id = client
            .send_message("oc_chat", &OutgoingMessage::text("hello"))
            .await
            .unwrap();
        assert_eq!(id, "om_1");
        let id = client
            .reply_message("om_parent", &OutgoingMessage::text("threaded"))
            .await
            .unwrap();
        assert_eq!(id, "om_2");

        let requests = mock.requests();
        assert_eq!(requests[0].route, "POST /open-apis/im/v1/messages");
        assert_eq!(requests[0].query.as_deref(), Some("receive_id_type=chat_id"));
        assert_eq!(requests[0].body["receive_id"], "oc_chat");
        assert_eq!(requests[0].body["content"], r#"{"text":"hello"}"#);
        assert_eq!(
            requests[1].route,
            "POST /open-apis/im/v1/messages/om_parent/reply"
        );
        assert!(requests.iter().all(|r| r.authorization == "Bearer t-mock"));
        assert_eq!(mock.token_requests(), 1);
    }

    #[tokio::test]
    async fn update_and_delete_hit_message_routes() {
        let mock = MockOpenApi::start().await;
        let client = FeishuHttpClient::new(mock.config()).unwrap();

        client.update_message("om_9", "final").await.unwrap();
        client.delete_message("om_9").await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests[0].route, "PUT /open-apis/im/v1/messages/om_9");
        assert_eq!(requests[0].body["msg_type"], "text");
        assert_eq!(requests[1].route, "DELETE /open-apis/im/v1/messages/om_9");
    }

    #[tokio::test]
    async fn uploads_return_content_handles() {
        let mock = MockOpenApi::start().await;
        let client = FeishuHttpClient::new(mock.config()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"bytes").unwrap();

        let image_key = client.upload_image(&path).await.unwrap();
        assert_eq!(image_key, "img_mock");
        let file_key = client
            .upload_file(&path, "file_1.mp4", FileType::Mp4)
            .await
            .unwrap();
        assert_eq!(file_key, "file_mock");

        let requests = mock.requests();
        assert!(requests[0].multipart);
        assert_eq!(requests[1].route, "POST /open-apis/im/v1/files");
    }

    #[tokio::test]
    async fn upload_without_handle_reports_raw_response() {
        let mock = MockOpenApi::start().await;
        mock.set_uploads_return_handles(false);
        let client = FeishuHttpClient::new(mock.config()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, b"png").unwrap();

        let err = client.upload_image(&path).await.unwrap_err();
        assert!(err.is_protocol());
        let text = err.to_string();
        assert!(text.starts_with("Upload image failed: "), "{text}");
        assert!(text.contains("\"code\":0"), "{text}");
    }

    #[tokio::test]
    async fn business_errors_surface_code_and_message() {
        let mock = MockOpenApi::start().await;
        mock.set_messages_fail(true);
        let client = FeishuHttpClient::new(mock.config()).unwrap();

        let err = client
            .send_message("oc_chat", &OutgoingMessage::file(MessageType::File, "k"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api { code: 230002, .. }), "{err}");
    }

    #[tokio::test]
    async fn probe_reads_bot_identity() {
        let mock = MockOpenApi::start().await;
        let client = FeishuHttpClient::new(mock.config()).unwrap();
        let bot = client.probe().await.unwrap();
        assert_eq!(bot.app_name.as_deref(), Some("Mock Bot"));
        assert_eq!(bot.open_id.as_deref(), Some("ou_bot"));
    }

    #[tokio::test]
    async fn bot_info_without_bot_object_is_accepted() {
        let mock = MockOpenApi::start().await;
        mock.set_bot_info_includes_bot(false);
        let client = FeishuHttpClient::new(mock.config()).unwrap();
        assert_eq!(client.probe().await.unwrap(), BotInfo::default());
    }
}
