use std::sync::Arc;

use {
    larkbot_media::{MediaKind, TransientResource},
    tracing::debug,
};

use crate::{
    api::{FeishuApi, FileType, MessageType, OutgoingMessage},
    error::Result,
};

/// Platform-assigned key for uploaded content (`image_key` or `file_key`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHandle(String);

impl ContentHandle {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The file encoding used when uploading a non-image kind.
pub fn file_type_for(kind: MediaKind) -> FileType {
    match kind {
        MediaKind::Video => FileType::Mp4,
        MediaKind::Audio => FileType::Opus,
        MediaKind::Image | MediaKind::File => FileType::Stream,
    }
}

/// Build the message that shows uploaded content of `kind`.
pub fn media_message(kind: MediaKind, handle: &ContentHandle) -> OutgoingMessage {
    match kind {
        MediaKind::Image => OutgoingMessage::image(handle.as_str()),
        MediaKind::Video => OutgoingMessage::file(MessageType::Media, handle.as_str()),
        MediaKind::Audio => OutgoingMessage::file(MessageType::Audio, handle.as_str()),
        MediaKind::File => OutgoingMessage::file(MessageType::File, handle.as_str()),
    }
}

/// Pushes local media into the Feishu object store.
#[derive(Clone)]
pub struct RemoteUploader {
    api: Arc<dyn FeishuApi>,
}

impl RemoteUploader {
    pub fn new(api: Arc<dyn FeishuApi>) -> Self {
        Self { api }
    }

    /// Upload `resource` using the encoding for `kind`. Images go through the
    /// image endpoint; everything else is a file upload named `display_name`.
    pub async fn upload(
        &self,
        resource: &TransientResource,
        kind: MediaKind,
        display_name: &str,
    ) -> Result<ContentHandle> {
        let key = match kind {
            MediaKind::Image => self.api.upload_image(resource.path()).await?,
            _ => {
                self.api
                    .upload_file(resource.path(), display_name, file_type_for(kind))
                    .await?
            },
        };
        debug!(kind = %kind, display_name, "uploaded media");
        Ok(ContentHandle::new(key))
    }
}
