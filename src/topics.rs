use std::collections::{HashMap, HashSet};

use serde_json::Value;

/// Per-chat allow-list: which forum topics the bot handles in that chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTopicPolicy {
    /// Every topic in this chat is permitted.
    pub allow_all: bool,
    /// Explicitly permitted topic ids, consulted only when `allow_all` is false.
    pub topics: HashSet<i64>,
}

/// Immutable mapping from chat id to its topic policy, parsed once at startup
/// from the `SUPPORTED_TOPICS` environment variable.
///
/// Parsing is deliberately fail-open-to-empty: malformed JSON yields an empty
/// map, and malformed entries/values are dropped without aborting the parse.
/// Dropped counts are kept so the caller can surface them at startup.
#[derive(Debug, Default)]
pub struct TopicPolicyMap {
    policies: HashMap<i64, ChatTopicPolicy>,
    dropped_entries: usize,
    dropped_values: usize,
}

impl TopicPolicyMap {
    /// Parse a JSON object mapping string-encoded chat ids to arrays of topic
    /// values, e.g. `{"-100123456789": ["ALL"]}` or `{"-100999": [1, 2, "all"]}`.
    ///
    /// Each value is either the case-insensitive token "ALL" or something
    /// coercible to an integer topic id. A chat whose value list ends up empty
    /// permits everything.
    pub fn parse(raw: &str) -> Self {
        let mut map = Self::default();

        if raw.trim().is_empty() {
            return map;
        }
        let parsed: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(_) => return map,
        };
        let Value::Object(entries) = parsed else {
            return map;
        };

        for (chat_id_str, topic_values) in entries {
            let Ok(chat_id) = chat_id_str.trim().parse::<i64>() else {
                map.dropped_entries += 1;
                continue;
            };

            let values: &[Value] = match &topic_values {
                Value::Array(values) => values,
                Value::Null => &[],
                _ => {
                    map.dropped_entries += 1;
                    continue;
                }
            };

            let mut allow_all = false;
            let mut topics = HashSet::new();
            for value in values {
                match value {
                    Value::String(s) if s.trim().eq_ignore_ascii_case("ALL") => {
                        allow_all = true;
                    }
                    Value::String(s) => match s.trim().parse::<i64>() {
                        Ok(topic_id) => {
                            topics.insert(topic_id);
                        }
                        Err(_) => map.dropped_values += 1,
                    },
                    // Fractional ids truncate toward zero, like an int() coercion.
                    Value::Number(n) => match n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)) {
                        Some(topic_id) => {
                            topics.insert(topic_id);
                        }
                        None => map.dropped_values += 1,
                    },
                    _ => map.dropped_values += 1,
                }
            }

            // A chat with no explicit topics defaults to permitting everything.
            let allow_all = allow_all || topics.is_empty();
            map.policies.insert(chat_id, ChatTopicPolicy { allow_all, topics });
        }

        map
    }

    /// Decide whether the bot should handle an update for this chat/topic.
    ///
    /// Top-level messages (no topic id) are always in scope. Unknown chats are
    /// denied. A chat whose policy is `allow_all` accepts any topic; otherwise
    /// the topic must be explicitly listed.
    pub fn is_supported_thread(&self, chat_id: i64, topic_id: Option<i64>) -> bool {
        let Some(topic_id) = topic_id else {
            return true;
        };
        let Some(policy) = self.policies.get(&chat_id) else {
            return false;
        };
        policy.allow_all || policy.topics.contains(&topic_id)
    }

    pub fn get(&self, chat_id: i64) -> Option<&ChatTopicPolicy> {
        self.policies.get(&chat_id)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Entries skipped during parsing (bad chat-id key or non-array value).
    pub fn dropped_entries(&self) -> usize {
        self.dropped_entries
    }

    /// Values skipped inside otherwise well-formed entries.
    pub fn dropped_values(&self) -> usize {
        self.dropped_values
    }
}
