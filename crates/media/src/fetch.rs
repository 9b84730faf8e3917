//! Transient local copies of outbound media.
//!
//! Platform upload APIs want bytes on disk, while replies reference media by
//! URL. [`TransientFetcher::acquire`] materializes a locator into a uniquely
//! named file under a scratch directory; the returned [`TransientResource`]
//! must be released once the delivery attempt is over.

use std::{
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use {
    futures::StreamExt,
    reqwest::{StatusCode, Url, header::LOCATION, redirect::Policy},
    tokio::io::AsyncWriteExt,
    tracing::{debug, warn},
};

use crate::{
    error::{Context, Error, Result},
    mime,
};

/// Redirect hops followed per acquisition. A redirect target that redirects
/// again is a failure.
pub const MAX_REDIRECT_HOPS: usize = 1;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A locally available copy of a media locator.
///
/// Owned resources were created by the fetcher and are deleted by
/// [`release`](Self::release), or on drop if release never ran. Borrowed
/// resources point at pre-existing local files and are never deleted.
#[derive(Debug)]
pub struct TransientResource {
    path: PathBuf,
    owned: bool,
    released: bool,
}

impl TransientResource {
    fn owned(path: PathBuf) -> Self {
        Self {
            path,
            owned: true,
            released: false,
        }
    }

    fn borrowed(path: PathBuf) -> Self {
        Self {
            path,
            owned: false,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// Delete the local file if the fetcher created it. Deletion errors are
    /// ignored; a file that is already gone is fine.
    pub async fn release(mut self) {
        self.released = true;
        if !self.owned {
            return;
        }
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            debug!(path = %self.path.display(), error = %e, "transient media cleanup failed");
        }
    }
}

impl Drop for TransientResource {
    fn drop(&mut self) {
        if self.owned && !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Downloads media locators into a scratch directory.
#[derive(Debug, Clone)]
pub struct TransientFetcher {
    http: reqwest::Client,
    dir: PathBuf,
    file_prefix: String,
    max_bytes: Option<u64>,
}

impl TransientFetcher {
    /// Fetcher writing to the OS temp directory with the default timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        // Redirects are followed by hand so the hop limit stays explicit.
        let http = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| Error::external("building media HTTP client", e))?;
        Ok(Self {
            http,
            dir: std::env::temp_dir(),
            file_prefix: "media".into(),
            max_bytes: None,
        })
    }

    /// Write transient files into `dir` instead of the OS temp directory.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    /// Reject downloads larger than `max_bytes`.
    pub fn with_max_bytes(mut self, max_bytes: Option<u64>) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Make `locator` available as a local file.
    ///
    /// Absolute paths and `file://` locators are returned as borrowed
    /// resources without any I/O. Everything else is downloaded.
    pub async fn acquire(&self, locator: &str) -> Result<TransientResource> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(Error::invalid_input("no media locator provided"));
        }
        if let Some(path) = local_path(locator) {
            return Ok(TransientResource::borrowed(path));
        }

        let mut url = Url::parse(locator)
            .map_err(|e| Error::external(format!("invalid media locator '{locator}'"), e))?;
        let mut hops = 0usize;

        loop {
            let response = self
                .http
                .get(url.clone())
                .send()
                .await
                .map_err(|e| Error::external("media download failed", e))?;
            let status = response.status();

            if matches!(status, StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND) {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .filter(|v| !v.trim().is_empty())
                    .ok_or(Error::MissingLocation)?;
                if hops >= MAX_REDIRECT_HOPS {
                    return Err(Error::TooManyRedirects {
                        limit: MAX_REDIRECT_HOPS,
                    });
                }
                let next = url
                    .join(location.trim())
                    .map_err(|e| Error::external(format!("invalid redirect target '{location}'"), e))?;
                debug!(from = %url, to = %next, "following media redirect");
                url = next;
                hops += 1;
                continue;
            }

            if !status.is_success() {
                return Err(Error::Status {
                    status: status.as_u16(),
                });
            }

            if let (Some(limit), Some(len)) = (self.max_bytes, response.content_length())
                && len > limit
            {
                return Err(Error::TooLarge { limit });
            }

            let resource = TransientResource::owned(self.transient_path(url.as_str()));
            return match self.write_body(response, resource.path()).await {
                Ok(bytes) => {
                    debug!(path = %resource.path().display(), bytes, "media downloaded");
                    Ok(resource)
                },
                Err(e) => {
                    warn!(url = %url, error = %e, "media download aborted");
                    resource.release().await;
                    Err(e)
                },
            };
        }
    }

    async fn write_body(&self, response: reqwest::Response, path: &Path) -> Result<u64> {
        let mut file = tokio::fs::File::create(path)
            .await
            .with_context(|| format!("creating {}", path.display()))?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::external("media download interrupted", e))?;
            written += chunk.len() as u64;
            if let Some(limit) = self.max_bytes
                && written > limit
            {
                return Err(Error::TooLarge { limit });
            }
            file.write_all(&chunk)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
        }
        file.flush()
            .await
            .with_context(|| format!("flushing {}", path.display()))?;
        Ok(written)
    }

    fn transient_path(&self, locator: &str) -> PathBuf {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let unique = uuid::Uuid::new_v4().simple();
        let ext = mime::extension(locator);
        self.dir
            .join(format!("{}_{millis}_{unique}.{ext}", self.file_prefix))
    }
}

/// Local filesystem path for `locator`, if it already refers to one.
fn local_path(locator: &str) -> Option<PathBuf> {
    if let Some(rest) = locator.strip_prefix("file://") {
        return Some(PathBuf::from(rest));
    }
    locator.starts_with('/').then(|| PathBuf::from(locator))
}
