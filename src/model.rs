use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::token::Token;

pub const ANONYMOUS: &str = "Anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub i64);

/// Opaque handle to a message posted in a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageRef(pub i64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    pub token: Token,
    pub owner_id: i64,
    pub display_handle: Option<String>,
    pub display_fallback_name: Option<String>,
    pub custom_name: Option<String>,
    pub registered_at: OffsetDateTime,
    pub public_consent: bool,

    // unique: token
    // unique: owner_id
}

impl ProfileRecord {
    /// Name shown in the group: custom name, then `@handle`, then the
    /// fallback name, then a placeholder.
    pub fn display_name(&self) -> String {
        if let Some(custom) = non_empty(&self.custom_name) {
            return custom.to_owned();
        }
        if let Some(handle) = non_empty(&self.display_handle) {
            return format!("@{handle}");
        }
        non_empty(&self.display_fallback_name)
            .unwrap_or(ANONYMOUS)
            .to_owned()
    }

    /// Same precedence as [`display_name`](Self::display_name) but without the `@`.
    pub fn plain_display_name(&self) -> &str {
        non_empty(&self.custom_name)
            .or_else(|| non_empty(&self.display_handle))
            .or_else(|| non_empty(&self.display_fallback_name))
            .unwrap_or(ANONYMOUS)
    }

    /// Name the record shows once its custom name is cleared.
    pub fn source_display_name(&self) -> &str {
        non_empty(&self.display_handle)
            .or_else(|| non_empty(&self.display_fallback_name))
            .unwrap_or(ANONYMOUS)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Input for creating a profile on first token detection.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub token: Token,
    pub owner_id: i64,
    pub display_handle: Option<String>,
    pub display_fallback_name: Option<String>,
    pub registered_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedEntry {
    pub id: i64,
    pub channel: ChannelId,
    pub message: MessageRef,
    pub profile_count: i64,
    pub is_current: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewPinnedEntry {
    pub channel: ChannelId,
    pub message: MessageRef,
    pub profile_count: i64,
}

/// RFC 3339 with whole seconds, which keeps stored timestamps sortable as text.
pub fn timestamp(at: OffsetDateTime) -> String {
    at.replace_nanosecond(0)
        .unwrap_or(at)
        .format(&Rfc3339)
        .unwrap_or_default()
}

pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(raw, &Rfc3339).ok()
}
