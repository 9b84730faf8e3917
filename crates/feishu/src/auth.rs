use std::time::{Duration, Instant};

use {
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    tracing::debug,
};

use crate::{
    config::FeishuAccountConfig,
    error::{Error, Result},
};

#[derive(Clone)]
pub struct CachedTenantToken {
    pub token: Secret<String>,
    pub expires_at: Instant,
}

impl CachedTenantToken {
    fn is_valid(&self) -> bool {
        let refresh_skew = Duration::from_secs(60);
        self.expires_at > Instant::now() + refresh_skew
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    tenant_access_token: Option<String>,
    expire: Option<u64>,
}

/// Return a cached tenant access token, fetching a new one when the cached
/// token is missing or about to expire.
pub async fn tenant_access_token(
    client: &reqwest::Client,
    config: &FeishuAccountConfig,
    cache: &tokio::sync::Mutex<Option<CachedTenantToken>>,
) -> Result<Secret<String>> {
    {
        let guard = cache.lock().await;
        if let Some(token) = guard.as_ref()
            && token.is_valid()
        {
            return Ok(token.token.clone());
        }
    }

    if !config.is_configured() {
        return Err(Error::invalid_input("Feishu app_id/app_secret not configured"));
    }

    let url = format!(
        "{}/open-apis/auth/v3/tenant_access_token/internal",
        config.api_base()
    );
    let body = serde_json::json!({
        "app_id": config.app_id,
        "app_secret": config.app_secret.expose_secret(),
    });

    let resp = client.post(url).json(&body).send().await?;
    let status = resp.status();
    let raw = resp.text().await?;
    if !status.is_success() {
        return Err(Error::Http {
            status: status.as_u16(),
            body: raw,
        });
    }

    let parsed: TokenResponse =
        serde_json::from_str(&raw).map_err(|_| Error::MissingField {
            operation: "Tenant token request",
            raw: raw.clone(),
        })?;
    if parsed.code != 0 {
        return Err(Error::Api {
            code: parsed.code,
            msg: parsed.msg,
        });
    }
    let Some(token) = parsed.tenant_access_token.filter(|t| !t.is_empty()) else {
        return Err(Error::MissingField {
            operation: "Tenant token request",
            raw,
        });
    };

    let ttl = parsed.expire.unwrap_or(7200).max(120);
    debug!(app_id = %config.app_id, ttl, "fetched Feishu tenant access token");
    let cached = CachedTenantToken {
        token: Secret::new(token),
        expires_at: Instant::now() + Duration::from_secs(ttl),
    };
    let token = cached.token.clone();

    let mut guard = cache.lock().await;
    *guard = Some(cached);
    Ok(token)
}
