//! Public JSON document of the profiles that agreed to be listed.

mod github;

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};

pub use github::GithubSink;

use crate::{
    MissingField,
    db::{Store, StoreError},
    model::{ProfileRecord, timestamp},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryDocument {
    pub updated_at: String,
    pub total_count: usize,
    pub profiles: Vec<PublicProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub token: String,
    pub display_name: String,
    pub viewer_url: String,
    pub added_at: String,
}

/// Keeps only consenting profiles, in the order given.
pub fn build_document(
    profiles: &[ProfileRecord],
    viewer_base_url: &str,
    updated_at: OffsetDateTime,
) -> DirectoryDocument {
    let profiles: Vec<PublicProfile> = profiles
        .iter()
        .filter(|p| p.public_consent)
        .map(|p| PublicProfile {
            token: p.token.to_string(),
            display_name: p.plain_display_name().to_owned(),
            viewer_url: p.token.viewer_url(viewer_base_url),
            added_at: timestamp(p.registered_at),
        })
        .collect();

    DirectoryDocument {
        updated_at: timestamp(updated_at),
        total_count: profiles.len(),
        profiles,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("could not serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("could not write export file: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote store answered {0}")]
    Status(u16),
    #[error(transparent)]
    Malformed(#[from] MissingField),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Written,
    /// The base revision no longer matches the remote one.
    Conflict,
}

/// Remote content store with optimistic-concurrency writes.
#[async_trait]
pub trait PublishSink: Send + Sync {
    /// Revision token of the document at `path`, `None` when there is none yet.
    async fn revision(&self, path: &str) -> Result<Option<String>, PublishError>;

    async fn put_content(
        &self,
        path: &str,
        bytes: &[u8],
        base_revision: Option<&str>,
    ) -> Result<PutOutcome, PublishError>;
}

/// Where the document is pushed.
#[derive(Clone)]
pub struct Remote {
    pub sink: Arc<dyn PublishSink>,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
    LocalOnly,
    Remote,
    Conflict,
}

pub struct Exporter {
    store: Store,
    viewer_base_url: String,
    export_path: Option<PathBuf>,
    remote: Option<Remote>,
}

impl Exporter {
    pub fn new(
        store: Store,
        viewer_base_url: impl Into<String>,
        export_path: Option<PathBuf>,
        remote: Option<Remote>,
    ) -> Self {
        Self {
            store,
            viewer_base_url: viewer_base_url.into(),
            export_path,
            remote,
        }
    }

    pub async fn document(
        &self,
        updated_at: OffsetDateTime,
    ) -> Result<DirectoryDocument, PublishError> {
        let profiles = self.store.list_consented().await?;
        Ok(build_document(&profiles, &self.viewer_base_url, updated_at))
    }

    /// Writes the document locally and, when a sink is configured, pushes it
    /// against the sink's current revision.
    pub async fn publish(&self) -> Result<Published, PublishError> {
        let document = self.document(OffsetDateTime::now_utc()).await?;
        let json = serde_json::to_string_pretty(&document)?;

        if let Some(path) = &self.export_path {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, &json).await?;
            info!(path = %path.display(), profiles = document.total_count, "directory exported");
        }

        let Some(Remote { sink, path }) = &self.remote else {
            return Ok(Published::LocalOnly);
        };
        let revision = sink.revision(path).await?;
        match sink.put_content(path, json.as_bytes(), revision.as_deref()).await? {
            PutOutcome::Written => {
                info!(path = %path, profiles = document.total_count, "directory published");
                Ok(Published::Remote)
            }
            PutOutcome::Conflict => {
                warn!(path = %path, "remote directory changed underneath us, skipping this cycle");
                Ok(Published::Conflict)
            }
        }
    }
}
