use {larkbot_channels::gating::DmPolicy, serde::Serialize};

use crate::config::{FeishuAccountConfig, ResolvedFeishuAccount};

/// Configuration state of one account, as reported to status views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSnapshot {
    pub account_id: String,
    pub enabled: bool,
    pub configured: bool,
    pub dm_policy: DmPolicy,
}

impl AccountSnapshot {
    pub fn from_config(account_id: &str, config: &FeishuAccountConfig) -> Self {
        Self {
            account_id: account_id.to_string(),
            enabled: config.enabled,
            configured: config.is_configured(),
            dm_policy: config.dm_policy.clone(),
        }
    }
}

impl From<&ResolvedFeishuAccount> for AccountSnapshot {
    fn from(account: &ResolvedFeishuAccount) -> Self {
        Self::from_config(&account.account_id, &account.config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Config,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusIssue {
    pub channel: &'static str,
    pub account_id: String,
    pub kind: IssueKind,
    pub message: String,
    pub fix: String,
}

pub fn collect_status_issues(accounts: &[AccountSnapshot]) -> Vec<StatusIssue> {
    let mut issues = Vec::new();
    for account in accounts.iter().filter(|a| a.enabled) {
        if !account.configured {
            issues.push(StatusIssue {
                channel: "feishu",
                account_id: account.account_id.clone(),
                kind: IssueKind::Config,
                message: "Feishu account is enabled but not configured (missing app_id or app_secret)."
                    .into(),
                fix: "Set channels.feishu.app_id and channels.feishu.app_secret.".into(),
            });
        } else if account.dm_policy == DmPolicy::Open {
            issues.push(StatusIssue {
                channel: "feishu",
                account_id: account.account_id.clone(),
                kind: IssueKind::Config,
                message: "Feishu dm_policy is \"open\", so any user can message the bot.".into(),
                fix: "Set channels.feishu.dm_policy to \"allowlist\" to restrict access.".into(),
            });
        }
    }
    issues
}
