use std::collections::HashMap;

use {
    larkbot_channels::gating::{DmPolicy, GroupPolicy, MentionMode},
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use crate::error::{Error, Result};

/// Account ID used when the channel section has no `accounts` map.
pub const DEFAULT_ACCOUNT_ID: &str = "default";

/// Which Open API deployment the app is registered on.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeishuDomain {
    /// Mainland China (`open.feishu.cn`).
    #[default]
    Feishu,
    /// International Lark (`open.larksuite.com`).
    Lark,
}

impl FeishuDomain {
    pub fn base_url(self) -> &'static str {
        match self {
            Self::Feishu => "https://open.feishu.cn",
            Self::Lark => "https://open.larksuite.com",
        }
    }
}

/// Configuration for a single Feishu bot account.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeishuAccountConfig {
    /// Optional display name for this account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// When false the account is never started.
    pub enabled: bool,

    /// App ID (`cli_xxx`).
    pub app_id: String,

    /// App secret.
    #[serde(serialize_with = "serialize_secret")]
    pub app_secret: Secret<String>,

    pub domain: FeishuDomain,

    /// Overrides the domain's Open API origin (proxies, tests).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// DM access policy.
    pub dm_policy: DmPolicy,

    /// Sender allowlist for DMs (open_id or union_id).
    pub allowlist: Vec<String>,

    /// Group access policy.
    pub group_policy: GroupPolicy,

    /// Group chat ID allowlist.
    pub group_allowlist: Vec<String>,

    /// How the bot decides to answer in groups.
    pub mention_mode: MentionMode,

    /// Aliases used to detect direct address in group chats.
    pub bot_names: Vec<String>,

    /// Largest outbound media download, in megabytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_max_mb: Option<u64>,

    /// Delay before a "thinking" placeholder is posted, in milliseconds.
    /// 0 disables the placeholder.
    pub thinking_threshold_ms: u64,

    /// Per-request timeout for Open API and media downloads.
    pub request_timeout_secs: u64,

    /// Default model ID for this channel account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Provider name associated with `model`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_provider: Option<String>,
}

impl std::fmt::Debug for FeishuAccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeishuAccountConfig")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("app_id", &self.app_id)
            .field("app_secret", &"[REDACTED]")
            .field("domain", &self.domain)
            .field("dm_policy", &self.dm_policy)
            .field("group_policy", &self.group_policy)
            .field("mention_mode", &self.mention_mode)
            .field("bot_names", &self.bot_names)
            .finish_non_exhaustive()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for FeishuAccountConfig {
    fn default() -> Self {
        Self {
            name: None,
            enabled: true,
            app_id: String::new(),
            app_secret: Secret::new(String::new()),
            domain: FeishuDomain::default(),
            base_url: None,
            dm_policy: DmPolicy::default(),
            allowlist: Vec::new(),
            group_policy: GroupPolicy::default(),
            group_allowlist: Vec::new(),
            mention_mode: MentionMode::default(),
            bot_names: Vec::new(),
            media_max_mb: None,
            thinking_threshold_ms: 0,
            request_timeout_secs: 30,
            model: None,
            model_provider: None,
        }
    }
}

impl FeishuAccountConfig {
    /// Open API origin without a trailing slash.
    pub fn api_base(&self) -> String {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(self.domain.base_url())
            .trim_end_matches('/')
            .to_string()
    }

    /// Both credentials are present.
    pub fn is_configured(&self) -> bool {
        !self.app_id.trim().is_empty() && !self.app_secret.expose_secret().trim().is_empty()
    }

    pub fn media_max_bytes(&self) -> Option<u64> {
        self.media_max_mb.map(|mb| mb.saturating_mul(1024 * 1024))
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn thinking_threshold(&self) -> Option<std::time::Duration> {
        (self.thinking_threshold_ms > 0)
            .then(|| std::time::Duration::from_millis(self.thinking_threshold_ms))
    }
}

/// Where an account's credentials came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSource {
    Config,
    None,
}

/// Account config with inherited top-level settings applied.
#[derive(Debug, Clone)]
pub struct ResolvedFeishuAccount {
    pub account_id: String,
    pub token_source: TokenSource,
    pub config: FeishuAccountConfig,
}

impl ResolvedFeishuAccount {
    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn configured(&self) -> bool {
        self.token_source == TokenSource::Config
    }
}

/// The `channels.feishu` section: account fields at the top level act as
/// defaults for every entry in `accounts`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeishuConfig {
    #[serde(default)]
    pub accounts: HashMap<String, serde_json::Map<String, serde_json::Value>>,

    #[serde(default)]
    pub default_account: Option<String>,

    #[serde(flatten)]
    pub base: serde_json::Map<String, serde_json::Value>,
}

impl FeishuConfig {
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Configured account IDs, sorted. A section without `accounts` has a
    /// single implicit account.
    pub fn account_ids(&self) -> Vec<String> {
        if self.accounts.is_empty() {
            return vec![DEFAULT_ACCOUNT_ID.to_string()];
        }
        let mut ids: Vec<String> = self.accounts.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn default_account_id(&self) -> String {
        if let Some(id) = self
            .default_account
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            return id.to_string();
        }
        self.account_ids()
            .into_iter()
            .next()
            .unwrap_or_else(|| DEFAULT_ACCOUNT_ID.to_string())
    }

    /// Merge the top-level defaults with the account entry for `account_id`
    /// (or the default account) and parse the result.
    pub fn resolve_account(&self, account_id: Option<&str>) -> Result<ResolvedFeishuAccount> {
        let account_id = account_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.default_account_id());

        let mut merged = self.base.clone();
        match self.accounts.get(&account_id) {
            Some(overrides) => {
                merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
            },
            None if !self.accounts.is_empty() => {
                return Err(Error::invalid_input(format!(
                    "unknown Feishu account: {account_id}"
                )));
            },
            None => {},
        }

        let config: FeishuAccountConfig =
            serde_json::from_value(serde_json::Value::Object(merged))?;
        let token_source = if config.is_configured() {
            TokenSource::Config
        } else {
            TokenSource::None
        };
        Ok(ResolvedFeishuAccount {
            account_id,
            token_source,
            config,
        })
    }
}
