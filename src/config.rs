use std::{path::PathBuf, str::FromStr};

use tracing::warn;

use crate::model::ChannelId;

/// Hard per-message limit of the chat transport.
pub const TRANSPORT_MESSAGE_LIMIT: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{key} has an invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// What to do when the admin lookup itself fails.
///
/// `FailOpen` lets the command run anyway, which is how the bot has always
/// behaved; `FailClosed` refuses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdminCheckPolicy {
    #[default]
    FailOpen,
    FailClosed,
}

impl FromStr for AdminCheckPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-open" | "open" => Ok(Self::FailOpen),
            "fail-closed" | "closed" => Ok(Self::FailClosed),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub token: String,
    pub repo: String,
    pub path: String,
    pub branch: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub allowed_chat_id: Option<i64>,
    pub allowed_thread_id: Option<i64>,
    pub database_url: String,
    pub max_chunk_size: usize,
    pub viewer_base_url: String,
    pub public_directory_url: String,
    pub export_path: Option<PathBuf>,
    pub http_bind: String,
    pub poll_timeout_secs: u64,
    pub admin_check: AdminCheckPolicy,
    pub github: Option<GithubConfig>,
}

impl Config {
    /// Reads the environment (and `.env`, once loaded by `dotenv`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bot_token = var("BOT_TOKEN").ok_or(ConfigError::Missing("BOT_TOKEN"))?;

        let max_chunk_size = parse_or(&var, "MAX_CHUNK_SIZE", 4000usize)?;
        if max_chunk_size == 0 || max_chunk_size >= TRANSPORT_MESSAGE_LIMIT {
            return Err(ConfigError::Invalid {
                key: "MAX_CHUNK_SIZE",
                value: max_chunk_size.to_string(),
            });
        }

        let admin_check = match var("ADMIN_CHECK_POLICY") {
            Some(value) => value.parse().map_err(|()| ConfigError::Invalid {
                key: "ADMIN_CHECK_POLICY",
                value,
            })?,
            None => AdminCheckPolicy::default(),
        };

        let push_enabled = var("GITHUB_PUSH_ENABLED")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let github = match (push_enabled, var("GITHUB_TOKEN")) {
            (true, Some(token)) => Some(GithubConfig {
                token,
                repo: var("GITHUB_REPO").unwrap_or_else(|| "Crackloss/nostrweb".to_owned()),
                path: var("GITHUB_JSON_PATH").unwrap_or_else(|| "data/directorio.json".to_owned()),
                branch: var("GITHUB_BRANCH").unwrap_or_else(|| "main".to_owned()),
            }),
            (true, None) => {
                warn!("GITHUB_PUSH_ENABLED is set without GITHUB_TOKEN, publishing disabled");
                None
            }
            (false, _) => None,
        };

        Ok(Config {
            bot_token,
            allowed_chat_id: nonzero(parse_or(&var, "ALLOWED_CHAT_ID", 0i64)?),
            allowed_thread_id: nonzero(parse_or(&var, "ALLOWED_THREAD_ID", 0i64)?),
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://data/nostr_directory.db?mode=rwc".to_owned()),
            max_chunk_size,
            viewer_base_url: var("VIEWER_BASE_URL")
                .unwrap_or_else(|| "https://njump.me/".to_owned()),
            public_directory_url: var("PUBLIC_DIRECTORY_URL")
                .unwrap_or_else(|| "https://nostrfacil.com/directorio".to_owned()),
            export_path: match var("EXPORT_PATH") {
                Some(path) if path == "-" => None,
                Some(path) => Some(PathBuf::from(path)),
                None => Some(PathBuf::from("data/directorio.json")),
            },
            http_bind: var("HTTP_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_owned()),
            poll_timeout_secs: parse_or(&var, "POLL_TIMEOUT_SECS", 30u64)?,
            admin_check,
            github,
        })
    }

    pub fn is_allowed_chat(&self, chat_id: i64) -> bool {
        self.allowed_chat_id.is_none_or(|allowed| allowed == chat_id)
    }

    pub fn is_allowed_thread(&self, thread_id: Option<i64>) -> bool {
        self.allowed_thread_id.is_none_or(|allowed| thread_id == Some(allowed))
    }

    /// The channel holding the directory; the configured group when there is one.
    pub fn directory_channel(&self, fallback_chat_id: i64) -> ChannelId {
        ChannelId(self.allowed_chat_id.unwrap_or(fallback_chat_id))
    }
}

fn parse_or<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

fn nonzero(id: i64) -> Option<i64> {
    (id != 0).then_some(id)
}
