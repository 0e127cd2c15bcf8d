//! Keeps the pinned directory message(s) of a channel in step with the
//! rendered chunks.
//!
//! | chunks | current entry | action                                                   |
//! |--------|---------------|----------------------------------------------------------|
//! | 1      | yes           | edit in place; unchanged is a no-op; failure falls back  |
//! | 1      | no            | send, pin, record                                        |
//! | >1     | yes           | best-effort edit of chunk 0, send the rest, pin the last |
//! | >1     | no            | send all, pin the last                                   |
//!
//! The ledger is only written once the pin succeeded, so a failed pin leaves
//! the previous entry current and the next call retries.

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::{
    db::StoreError,
    model::{ChannelId, MessageRef, NewPinnedEntry, PinnedEntry},
};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{method} rejected ({code:?}): {description}")]
    Rejected {
        method: String,
        code: Option<i64>,
        description: String,
    },
    #[error("{0} returned no result")]
    EmptyResult(String),
}

/// Result of editing a message. "Nothing changed" is not a failure.
#[derive(Debug)]
pub enum EditOutcome {
    Edited,
    Unchanged,
    Failed(TransportError),
}

#[async_trait]
pub trait ChannelOps: Send + Sync {
    async fn send_message(
        &self,
        channel: ChannelId,
        text: &str,
    ) -> Result<MessageRef, TransportError>;
    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageRef,
        text: &str,
    ) -> EditOutcome;
    async fn pin_message(
        &self,
        channel: ChannelId,
        message: MessageRef,
    ) -> Result<(), TransportError>;
}

/// History of the messages that represented the directory in each channel.
#[async_trait]
pub trait PinLedger: Send + Sync {
    async fn current(&self, channel: ChannelId) -> Result<Option<PinnedEntry>, StoreError>;

    /// Records `entry` as current and marks every earlier entry of the
    /// channel as superseded.
    async fn append_and_supersede(&self, entry: NewPinnedEntry) -> Result<PinnedEntry, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    EditedInPlace(MessageRef),
    Unchanged(MessageRef),
    Pinned { message: MessageRef, sent: usize },
    /// Messages went out but the pin did not; the ledger was left alone.
    PinFailed { message: MessageRef, sent: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("nothing to publish")]
    NoChunks,
    #[error("sending chunk {index} of {total} failed: {source}")]
    Send {
        index: usize,
        total: usize,
        #[source]
        source: TransportError,
    },
    #[error(transparent)]
    Ledger(#[from] StoreError),
}

pub struct PinReconciler<'a> {
    channel_ops: &'a dyn ChannelOps,
    ledger: &'a dyn PinLedger,
}

impl<'a> PinReconciler<'a> {
    pub fn new(channel_ops: &'a dyn ChannelOps, ledger: &'a dyn PinLedger) -> Self {
        Self { channel_ops, ledger }
    }

    pub async fn reconcile(
        &self,
        channel: ChannelId,
        chunks: &[String],
        current: Option<&PinnedEntry>,
        profile_count: i64,
    ) -> Result<Reconciled, ReconcileError> {
        let Some((first, rest)) = chunks.split_first() else {
            return Err(ReconcileError::NoChunks);
        };

        match (rest.is_empty(), current) {
            (true, Some(current)) => {
                match self.channel_ops.edit_message(channel, current.message, first).await {
                    EditOutcome::Edited => {
                        info!(
                            chat_id = channel.0,
                            message_id = current.message.0,
                            "pinned directory edited"
                        );
                        return Ok(Reconciled::EditedInPlace(current.message));
                    }
                    EditOutcome::Unchanged => {
                        debug!(
                            chat_id = channel.0,
                            message_id = current.message.0,
                            "pinned directory unchanged"
                        );
                        return Ok(Reconciled::Unchanged(current.message));
                    }
                    EditOutcome::Failed(err) => {
                        warn!(
                            chat_id = channel.0,
                            message_id = current.message.0,
                            "could not edit pinned directory, sending a new one: {err}"
                        );
                    }
                }
                self.send_and_pin(channel, chunks, profile_count).await
            }
            (true, None) => self.send_and_pin(channel, chunks, profile_count).await,
            (false, Some(current)) => {
                // chunk 0 is superseded by the new pin either way
                if let EditOutcome::Failed(err) =
                    self.channel_ops.edit_message(channel, current.message, first).await
                {
                    debug!(
                        chat_id = channel.0,
                        message_id = current.message.0,
                        "head chunk not edited: {err}"
                    );
                }
                self.send_and_pin(channel, rest, profile_count).await
            }
            (false, None) => self.send_and_pin(channel, chunks, profile_count).await,
        }
    }

    /// Sends `chunks` strictly in order, pins the last one and records it.
    async fn send_and_pin(
        &self,
        channel: ChannelId,
        chunks: &[String],
        profile_count: i64,
    ) -> Result<Reconciled, ReconcileError> {
        let total = chunks.len();
        let mut last = None;
        for (index, text) in chunks.iter().enumerate() {
            let message = self
                .channel_ops
                .send_message(channel, text)
                .await
                .map_err(|source| ReconcileError::Send { index, total, source })?;
            last = Some(message);
        }
        let Some(message) = last else {
            return Err(ReconcileError::NoChunks);
        };

        if let Err(err) = self.channel_ops.pin_message(channel, message).await {
            error!(chat_id = channel.0, message_id = message.0, "could not pin directory: {err}");
            return Ok(Reconciled::PinFailed { message, sent: total });
        }

        self.ledger
            .append_and_supersede(NewPinnedEntry {
                channel,
                message,
                profile_count,
            })
            .await?;
        info!(
            chat_id = channel.0,
            message_id = message.0,
            profiles = profile_count,
            chunks = total,
            "new directory message pinned"
        );

        Ok(Reconciled::Pinned { message, sent: total })
    }
}
