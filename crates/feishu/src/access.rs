use {
    larkbot_channels::{
        GroupAddressFilter,
        gating::{self, DmPolicy, GroupPolicy, MentionMode},
    },
    larkbot_common::types::ChatType,
};

use crate::config::FeishuAccountConfig;

/// What the access check needs to know about one inbound message.
#[derive(Debug, Clone, Copy)]
pub struct InboundContext<'a> {
    pub chat_type: ChatType,
    /// Sender identifiers (open_id, union_id, user_id) in preference order.
    pub sender_ids: &'a [&'a str],
    pub chat_id: &'a str,
    pub text: &'a str,
    pub mention_count: usize,
}

/// Determine if an inbound message should be answered.
///
/// Returns `Ok(())` if the message is allowed, or `Err(reason)` if it should
/// be silently dropped.
pub fn check_access(
    config: &FeishuAccountConfig,
    filter: &GroupAddressFilter,
    inbound: &InboundContext<'_>,
) -> Result<(), AccessDenied> {
    match inbound.chat_type {
        ChatType::Dm => check_dm_access(config, inbound.sender_ids),
        ChatType::Group => check_group_access(config, filter, inbound),
    }
}

fn check_dm_access(config: &FeishuAccountConfig, sender_ids: &[&str]) -> Result<(), AccessDenied> {
    match config.dm_policy {
        DmPolicy::Disabled => Err(AccessDenied::DmsDisabled),
        DmPolicy::Open => Ok(()),
        DmPolicy::Allowlist => {
            // An explicit allowlist policy with no entries denies everyone.
            if config.allowlist.is_empty() {
                return Err(AccessDenied::NotOnAllowlist);
            }
            if sender_ids
                .iter()
                .any(|id| gating::is_allowed(id, &config.allowlist))
            {
                Ok(())
            } else {
                Err(AccessDenied::NotOnAllowlist)
            }
        },
    }
}

fn check_group_access(
    config: &FeishuAccountConfig,
    filter: &GroupAddressFilter,
    inbound: &InboundContext<'_>,
) -> Result<(), AccessDenied> {
    match config.group_policy {
        GroupPolicy::Disabled => return Err(AccessDenied::GroupsDisabled),
        GroupPolicy::Allowlist => {
            if config.group_allowlist.is_empty()
                || !gating::is_allowed(inbound.chat_id, &config.group_allowlist)
            {
                return Err(AccessDenied::GroupNotOnAllowlist);
            }
        },
        GroupPolicy::Open => {},
    }

    match config.mention_mode {
        MentionMode::Always => Ok(()),
        MentionMode::None => Err(AccessDenied::MentionModeNone),
        MentionMode::Mention if inbound.mention_count > 0 => Ok(()),
        MentionMode::Mention => Err(AccessDenied::NotMentioned),
        MentionMode::Smart => {
            if filter.should_respond(inbound.text, inbound.mention_count) {
                Ok(())
            } else {
                Err(AccessDenied::NotAddressed)
            }
        },
    }
}

/// Reason an inbound message was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDenied {
    DmsDisabled,
    NotOnAllowlist,
    GroupsDisabled,
    GroupNotOnAllowlist,
    MentionModeNone,
    NotMentioned,
    NotAddressed,
}

impl std::fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DmsDisabled => write!(f, "DMs are disabled"),
            Self::NotOnAllowlist => write!(f, "user not on allowlist"),
            Self::GroupsDisabled => write!(f, "groups are disabled"),
            Self::GroupNotOnAllowlist => write!(f, "group not on allowlist"),
            Self::MentionModeNone => write!(f, "bot does not respond in groups"),
            Self::NotMentioned => write!(f, "bot was not mentioned"),
            Self::NotAddressed => write!(f, "group message not addressed to the bot"),
        }
    }
}
