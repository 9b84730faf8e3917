//! Shared fakes for the crate's tests.

use std::{
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use {
    async_trait::async_trait,
    axum::{
        Json, Router,
        body::Bytes,
        extract::State,
        http::{HeaderMap, Method, StatusCode, Uri, header},
        response::{IntoResponse, Response},
    },
    secrecy::Secret,
    serde_json::{Value, json},
    tokio::net::TcpListener,
};

use crate::{
    api::{BotInfo, FeishuApi, FileType, MessageType, OutgoingMessage},
    config::FeishuAccountConfig,
    error::{Error, Result},
};

/// One non-token request seen by [`MockOpenApi`].
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub route: String,
    pub query: Option<String>,
    pub authorization: String,
    pub body: Value,
    pub multipart: bool,
}

#[derive(Default)]
struct MockState {
    requests: Mutex<Vec<RecordedRequest>>,
    token_requests: AtomicUsize,
    message_seq: AtomicUsize,
    uploads_without_handles: AtomicBool,
    messages_fail: AtomicBool,
    bot_info_without_bot: AtomicBool,
}

/// Local stand-in for the Feishu Open API plus a small file host under
/// `/files/`.
pub(crate) struct MockOpenApi {
    base: String,
    state: Arc<MockState>,
}

impl MockOpenApi {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .fallback(handle)
            .with_state(Arc::clone(&state));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|e| panic!("bind mock listener: {e}"));
        let addr = listener
            .local_addr()
            .unwrap_or_else(|e| panic!("mock listener address: {e}"));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            base: format!("http://{addr}"),
            state,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn file_url(&self, name: &str) -> String {
        format!("{}/files/{name}", self.base)
    }

    pub fn config(&self) -> FeishuAccountConfig {
        FeishuAccountConfig {
            app_id: "cli_mock".into(),
            app_secret: Secret::new("mock-secret".into()),
            base_url: Some(self.base.clone()),
            request_timeout_secs: 5,
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn token_requests(&self) -> usize {
        self.state.token_requests.load(Ordering::SeqCst)
    }

    pub fn set_uploads_return_handles(&self, enabled: bool) {
        self.state
            .uploads_without_handles
            .store(!enabled, Ordering::SeqCst);
    }

    pub fn set_messages_fail(&self, fail: bool) {
        self.state.messages_fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_bot_info_includes_bot(&self, enabled: bool) {
        self.state
            .bot_info_without_bot
            .store(!enabled, Ordering::SeqCst);
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();

    if let Some(name) = path.strip_prefix("/files/") {
        return match name {
            "a.png" => ([(header::CONTENT_TYPE, "image/png")], b"\x89PNG".to_vec()).into_response(),
            "report.pdf" => b"%PDF".to_vec().into_response(),
            "nowhere" => StatusCode::FOUND.into_response(),
            _ => StatusCode::NOT_FOUND.into_response(),
        };
    }

    if path == "/open-apis/auth/v3/tenant_access_token/internal" {
        state.token_requests.fetch_add(1, Ordering::SeqCst);
        return Json(json!({
            "code": 0,
            "msg": "ok",
            "tenant_access_token": "t-mock",
            "expire": 7200
        }))
        .into_response();
    }

    let multipart = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/"));
    let recorded = RecordedRequest {
        route: format!("{method} {path}"),
        query: uri.query().map(str::to_string),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
        multipart,
    };
    state
        .requests
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push(recorded);

    let without_handles = state.uploads_without_handles.load(Ordering::SeqCst);
    let reply = match (method.as_str(), path.as_str()) {
        (_, p) if p.starts_with("/open-apis/im/v1/messages")
            && state.messages_fail.load(Ordering::SeqCst) =>
        {
            json!({ "code": 230002, "msg": "bot is not in the chat" })
        },
        ("POST", p) if p.starts_with("/open-apis/im/v1/messages") => {
            let n = state.message_seq.fetch_add(1, Ordering::SeqCst) + 1;
            json!({ "code": 0, "msg": "success", "data": { "message_id": format!("om_{n}") } })
        },
        ("PUT" | "DELETE", p) if p.starts_with("/open-apis/im/v1/messages/") => {
            json!({ "code": 0, "msg": "success", "data": {} })
        },
        ("POST", "/open-apis/im/v1/images") if without_handles => {
            json!({ "code": 0, "msg": "success", "data": {} })
        },
        ("POST", "/open-apis/im/v1/images") => {
            json!({ "code": 0, "msg": "success", "data": { "image_key": "img_mock" } })
        },
        ("POST", "/open-apis/im/v1/files") if without_handles => {
            json!({ "code": 0, "msg": "success", "data": {} })
        },
        ("POST", "/open-apis/im/v1/files") => {
            json!({ "code": 0, "msg": "success", "data": { "file_key": "file_mock" } })
        },
        ("GET", "/open-apis/bot/v3/info")
            if state.bot_info_without_bot.load(Ordering::SeqCst) =>
        {
            json!({ "code": 0, "msg": "ok" })
        },
        ("GET", "/open-apis/bot/v3/info") => json!({
            "code": 0,
            "msg": "ok",
            "bot": { "app_name": "Mock Bot", "open_id": "ou_bot" }
        }),
        _ => return StatusCode::NOT_FOUND.into_response(),
    };
    Json(reply).into_response()
}

/// A message accepted by [`FakeApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Sent {
    TopLevel {
        chat_id: String,
        message: OutgoingMessage,
    },
    Reply {
        parent_id: String,
        message: OutgoingMessage,
    },
}

impl Sent {
    pub fn message(&self) -> &OutgoingMessage {
        match self {
            Self::TopLevel { message, .. } | Self::Reply { message, .. } => message,
        }
    }
}

/// In-memory [`FeishuApi`] with switchable failures.
#[derive(Default)]
pub(crate) struct FakeApi {
    pub sent: Mutex<Vec<Sent>>,
    pub updated: Mutex<Vec<(String, String)>>,
    pub deleted: Mutex<Vec<String>>,
    pub uploads: Mutex<Vec<(String, Option<FileType>)>>,
    pub fail_uploads: AtomicBool,
    pub fail_sends: AtomicBool,
    /// Fail sends and replies whose message is not plain text.
    pub fail_media_sends: AtomicBool,
    /// Fail only the n-th send or reply (1-based, 0 disables).
    pub fail_send_attempt: AtomicUsize,
    pub fail_deletes: AtomicBool,
    send_attempts: AtomicUsize,
    seq: AtomicUsize,
}

impl FakeApi {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn next_id(&self) -> String {
        format!("om_{}", self.seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn send_failure(&self) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::Http {
                status: 500,
                body: "send unavailable".into(),
            });
        }
        Ok(())
    }

    fn message_failure(&self, message: &OutgoingMessage) -> Result<()> {
        self.send_failure()?;
        let attempt = self.send_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let media_blocked =
            self.fail_media_sends.load(Ordering::SeqCst) && message.msg_type != MessageType::Text;
        if media_blocked || self.fail_send_attempt.load(Ordering::SeqCst) == attempt {
            return Err(Error::Api {
                code: 230001,
                msg: format!("send attempt {attempt} rejected"),
            });
        }
        Ok(())
    }

    fn record_upload(&self, path: &Path, file_type: Option<FileType>) -> Result<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(Error::MissingField {
                operation: "Upload file",
                raw: r#"{"code":0,"data":{}}"#.into(),
            });
        }
        // Uploads must see the bytes on disk.
        std::fs::metadata(path)?;
        self.uploads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((path.display().to_string(), file_type));
        Ok(())
    }
}

#[async_trait]
impl FeishuApi for FakeApi {
    async fn send_message(&self, chat_id: &str, message: &OutgoingMessage) -> Result<String> {
        self.message_failure(message)?;
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Sent::TopLevel {
                chat_id: chat_id.into(),
                message: message.clone(),
            });
        Ok(self.next_id())
    }

    async fn reply_message(&self, message_id: &str, message: &OutgoingMessage) -> Result<String> {
        self.message_failure(message)?;
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Sent::Reply {
                parent_id: message_id.into(),
                message: message.clone(),
            });
        Ok(self.next_id())
    }

    async fn update_message(&self, message_id: &str, text: &str) -> Result<()> {
        self.send_failure()?;
        self.updated
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((message_id.into(), text.into()));
        Ok(())
    }

    async fn delete_message(&self, message_id: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Error::Api {
                code: 230011,
                msg: "message already recalled".into(),
            });
        }
        self.deleted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message_id.into());
        Ok(())
    }

    async fn upload_image(&self, path: &Path) -> Result<String> {
        self.record_upload(path, None)?;
        Ok("img_fake".into())
    }

    async fn upload_file(
        &self,
        path: &Path,
        _file_name: &str,
        file_type: FileType,
    ) -> Result<String> {
        self.record_upload(path, Some(file_type))?;
        Ok("file_fake".into())
    }

    async fn probe(&self) -> Result<BotInfo> {
        Ok(BotInfo {
            app_name: Some("Fake Bot".into()),
            open_id: Some("ou_fake".into()),
        })
    }
}
