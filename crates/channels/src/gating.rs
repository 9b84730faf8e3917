use serde::{Deserialize, Serialize};

/// Check whether a sender or chat ID passes an allowlist.
///
/// An empty allowlist admits everyone. Entries are compared
/// case-insensitively, blank entries are ignored, and `*` matches any run of
/// characters (`ou_*`, `*@corp.example`).
pub fn is_allowed(peer_id: &str, allowlist: &[String]) -> bool {
    if allowlist.is_empty() {
        return true;
    }
    let peer = peer_id.to_lowercase();
    allowlist
        .iter()
        .map(|entry| entry.trim().to_lowercase())
        .filter(|entry| !entry.is_empty())
        .any(|entry| {
            if entry.contains('*') {
                glob_match(&entry, &peer)
            } else {
                entry == peer
            }
        })
}

/// Wildcard match where `*` stands for any (possibly empty) substring.
fn glob_match(pattern: &str, text: &str) -> bool {
    let mut segments = pattern.split('*');
    let head = segments.next().unwrap_or_default();
    let Some(mut rest) = text.strip_prefix(head) else {
        return false;
    };
    let segments: Vec<&str> = segments.collect();
    let Some((tail, middle)) = segments.split_last() else {
        return rest.is_empty();
    };
    for segment in middle.iter().filter(|s| !s.is_empty()) {
        match rest.find(segment) {
            Some(idx) => rest = &rest[idx + segment.len()..],
            None => return false,
        }
    }
    rest.len() >= tail.len() && rest.ends_with(tail)
}

/// Mention activation mode for group chats.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MentionMode {
    /// Bot responds to @mentions and to messages the group filter judges as
    /// addressed to it (questions, requests, name prefixes).
    #[default]
    Smart,
    /// Bot must be @mentioned to respond.
    Mention,
    /// Bot responds to all messages.
    Always,
    /// Bot does not respond in groups.
    None,
}

/// DM access policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DmPolicy {
    /// Anyone can DM the bot.
    Open,
    /// Only users on the allowlist. `pairing` is accepted as an alias.
    #[default]
    #[serde(alias = "pairing")]
    Allowlist,
    /// DMs disabled.
    Disabled,
}

/// Group access policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GroupPolicy {
    /// Bot responds in all groups.
    #[default]
    Open,
    /// Only in groups on the allowlist.
    Allowlist,
    /// Groups disabled.
    Disabled,
}
