use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{error, warn};

use crate::{
    db::{Store, StoreError},
    export::{Exporter, PublishError, Published},
    model::ChannelId,
    reconcile::{ChannelOps, PinLedger, PinReconciler, ReconcileError, Reconciled},
    render::{RenderError, Renderer},
};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// Renders the stored profiles into the pinned directory and the public export.
///
/// Callers must not run two refreshes for the same channel at once.
pub struct Directory {
    store: Store,
    channel_ops: Arc<dyn ChannelOps>,
    renderer: Renderer,
    exporter: Exporter,
}

impl Directory {
    pub fn new(
        store: Store,
        channel_ops: Arc<dyn ChannelOps>,
        renderer: Renderer,
        exporter: Exporter,
    ) -> Self {
        Self {
            store,
            channel_ops,
            renderer,
            exporter,
        }
    }

    pub async fn refresh(&self, channel: ChannelId) -> Result<Reconciled, SyncError> {
        self.refresh_at(channel, OffsetDateTime::now_utc()).await
    }

    pub async fn refresh_at(
        &self,
        channel: ChannelId,
        now: OffsetDateTime,
    ) -> Result<Reconciled, SyncError> {
        let profiles = self.store.list_all().await?;
        let chunks = self.renderer.render(&profiles, now)?;
        let current = self.store.current(channel).await?;

        let reconciled = PinReconciler::new(self.channel_ops.as_ref(), &self.store)
            .reconcile(channel, &chunks, current.as_ref(), profiles.len() as i64)
            .await?;
        Ok(reconciled)
    }

    pub async fn publish(&self) -> Result<Published, PublishError> {
        self.exporter.publish().await
    }

    /// Refresh then publish; failures leave the directory stale and are only logged.
    pub async fn sync(&self, channel: ChannelId) {
        self.refresh_logged(channel).await;
        self.publish_logged().await;
    }

    pub async fn refresh_logged(&self, channel: ChannelId) {
        match self.refresh(channel).await {
            Ok(Reconciled::PinFailed { message, .. }) => {
                warn!(chat_id = channel.0, message_id = message.0, "directory sent but not pinned");
            }
            Ok(_) => {}
            Err(err) => error!(chat_id = channel.0, "directory refresh failed: {err}"),
        }
    }

    pub async fn publish_logged(&self) {
        if let Err(err) = self.publish().await {
            error!("directory export failed: {err}");
        }
    }
}
