//! Group-chat reply admission.
//!
//! In group chats the bot only answers when a message looks like a question,
//! a request, or a direct address. This is a fast heuristic: missed questions
//! and unwanted replies are both possible and are tuned through the alias list
//! and the token sets below.

use std::sync::LazyLock;

use {regex::Regex, tracing::warn};

/// Aliases used for direct-address detection when none are configured.
pub const DEFAULT_BOT_NAMES: &[&str] = &["bot", "assistant", "助手", "智能体"];

/// Request verbs in the bot's primary language, matched as substrings.
const REQUEST_TOKENS: &[&str] = &[
    "帮", "麻烦", "请", "能否", "可以", "解释", "看看", "排查", "分析", "总结", "写", "改", "修",
    "查", "对比", "翻译",
];

// ASCII word boundaries, so an English word next to CJK text still matches.
static QUESTION_WORDS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(?-u:\b)(why|how|what|when|where|who|help)(?-u:\b)").ok()
});

/// Compiled group filter for one set of bot-name aliases.
#[derive(Debug, Clone)]
pub struct GroupAddressFilter {
    address: Option<Regex>,
}

impl Default for GroupAddressFilter {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl GroupAddressFilter {
    /// Build a filter for `bot_names`, falling back to [`DEFAULT_BOT_NAMES`]
    /// when the list is empty.
    pub fn new(bot_names: &[String]) -> Self {
        let names: Vec<&str> = if bot_names.iter().any(|n| !n.trim().is_empty()) {
            bot_names
                .iter()
                .map(|n| n.trim())
                .filter(|n| !n.is_empty())
                .collect()
        } else {
            DEFAULT_BOT_NAMES.to_vec()
        };
        let alternation = names
            .iter()
            .map(|name| regex::escape(name))
            .collect::<Vec<_>>()
            .join("|");
        let address = match Regex::new(&format!(r"(?i)^({alternation})[\s,:，：]")) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(error = %e, "invalid bot name pattern, direct address detection disabled");
                None
            },
        };
        Self { address }
    }

    /// Decide whether the bot should answer a group message.
    ///
    /// `text` is the message body with mention placeholders already removed.
    pub fn should_respond(&self, text: &str, mention_count: usize) -> bool {
        if mention_count > 0 {
            return true;
        }
        if text.ends_with('?') || text.ends_with('？') {
            return true;
        }
        if QUESTION_WORDS.as_ref().is_some_and(|re| re.is_match(text)) {
            return true;
        }
        if REQUEST_TOKENS.iter().any(|token| text.contains(token)) {
            return true;
        }
        self.address.as_ref().is_some_and(|re| re.is_match(text))
    }
}

/// One-shot form of [`GroupAddressFilter::should_respond`].
pub fn should_respond_in_group(
    text: &str,
    mention_count: usize,
    bot_names: Option<&[String]>,
) -> bool {
    GroupAddressFilter::new(bot_names.unwrap_or_default()).should_respond(text, mention_count)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("", 1, true)]
    #[case("ok thanks", 2, true)]
    #[case("How do I deploy this?", 0, true)]
    #[case("is it down？", 0, true)]
    #[case("no idea WHY it broke", 0, true)]
    #[case("need help", 0, true)]
    #[case("部署how to", 0, true)]
    #[case("这个what意思", 0, true)]
    #[case("somehow it works", 0, false)]
    #[case("whatever", 0, false)]
    #[case("帮我看一下日志", 0, true)]
    #[case("请总结一下", 0, true)]
    #[case("ok thanks", 0, false)]
    #[case("好的收到", 0, false)]
    #[case("", 0, false)]
    fn default_filter(#[case] text: &str, #[case] mentions: usize, #[case] expected: bool) {
        assert_eq!(should_respond_in_group(text, mentions, None), expected);
    }

    #[test]
    fn configured_alias_with_separator() {
        let names = vec!["bot".to_string()];
        assert!(should_respond_in_group("bot, please check", 0, Some(&names)));
        assert!(should_respond_in_group("BOT: status", 0, Some(&names)));
        assert!(should_respond_in_group("bot status", 0, Some(&names)));
        assert!(!should_respond_in_group("bots are fun", 0, Some(&names)));
        assert!(!should_respond_in_group("the bot, again", 0, Some(&names)));
    }

    #[test]
    fn full_width_separators() {
        let names = vec!["小飞".to_string()];
        assert!(should_respond_in_group("小飞，早上好", 0, Some(&names)));
        assert!(should_respond_in_group("小飞：早上好", 0, Some(&names)));
        assert!(!should_respond_in_group("小飞早上好", 0, Some(&names)));
    }

    #[test]
    fn default_aliases_apply_when_list_empty() {
        let empty: Vec<String> = Vec::new();
        assert!(should_respond_in_group("assistant, ping", 0, Some(&empty)));
        assert!(should_respond_in_group("助手 在吗", 0, None));
    }

    #[test]
    fn configured_aliases_replace_defaults() {
        let names = vec!["jarvis".to_string()];
        assert!(should_respond_in_group("jarvis, ping", 0, Some(&names)));
        assert!(!should_respond_in_group("assistant, ping", 0, Some(&names)));
    }

    #[test]
    fn alias_metacharacters_are_escaped() {
        let names = vec!["b.t".to_string(), "(x|y)".to_string()];
        let filter = GroupAddressFilter::new(&names);
        assert!(filter.should_respond("b.t, ping", 0));
        assert!(!filter.should_respond("bot, ping", 0));
        assert!(filter.should_respond("(x|y) ping", 0));
        assert!(!filter.should_respond("x ping", 0));
    }
}
