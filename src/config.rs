use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::topics::TopicPolicyMap;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// A required environment variable is missing or empty.
    MissingVar(&'static str),
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingVar(name) => {
                write!(f, "required environment variable {name} is not set")
            }
            Self::Validation(msg) => write!(f, "config validation error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Closed set of participant roles. Unknown role strings are rejected at
/// parse time instead of surfacing later as arbitrary strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    Participant,
    Lead,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Participant => "participant",
            Self::Lead => "lead",
            Self::Admin => "admin",
        }
    }

    /// Human-readable label used in chat replies.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Participant => "Participant",
            Self::Lead => "Lead",
            Self::Admin => "Administrator",
        }
    }
}

impl FromStr for UserRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "participant" => Ok(Self::Participant),
            "lead" => Ok(Self::Lead),
            "admin" => Ok(Self::Admin),
            other => Err(ConfigError::Validation(format!("unknown role '{other}'"))),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Config {
    pub bot_token: String,
    /// Join tokens per role. A role with no token configured cannot be joined.
    pub user_token: Option<String>,
    pub lead_token: Option<String>,
    pub admin_token: Option<String>,
    /// Per-chat topic allow-lists, parsed once from SUPPORTED_TOPICS.
    pub supported_topics: TopicPolicyMap,
    /// Directory for state files (logs, session data).
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup. Tests inject their
    /// own lookup instead of mutating the process environment.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = get("BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(ConfigError::MissingVar("BOT_TOKEN"));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "BOT_TOKEN appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }

        let supported_topics =
            TopicPolicyMap::parse(&get("SUPPORTED_TOPICS").unwrap_or_default());

        let data_dir = get("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));

        Ok(Self {
            bot_token,
            user_token: non_empty(get("USER_TOKEN")),
            lead_token: non_empty(get("LEAD_TOKEN")),
            admin_token: non_empty(get("ADMIN_TOKEN")),
            supported_topics,
            data_dir,
        })
    }

    /// Resolve a join token to its role. Admin and lead tokens are checked
    /// before the participant token.
    pub fn resolve_role(&self, token: &str) -> Option<UserRole> {
        if token.is_empty() {
            return None;
        }
        if self.admin_token.as_deref() == Some(token) {
            return Some(UserRole::Admin);
        }
        if self.lead_token.as_deref() == Some(token) {
            return Some(UserRole::Lead);
        }
        if self.user_token.as_deref() == Some(token) {
            return Some(UserRole::Participant);
        }
        None
    }

    pub fn is_supported_thread(&self, chat_id: i64, topic_id: Option<i64>) -> bool {
        self.supported_topics.is_supported_thread(chat_id, topic_id)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
