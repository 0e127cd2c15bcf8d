use async_trait::async_trait;

use crate::{
    model::{ChannelId, MessageRef},
    reconcile::{ChannelOps, EditOutcome, TransportError},
};

use super::{Bot, types::SendMessage};

/// Directory messages go to the configured forum thread when there is one.
#[derive(Clone)]
pub struct TelegramChannel {
    bot: Bot,
    thread_id: Option<i64>,
}

impl TelegramChannel {
    pub fn new(bot: Bot, thread_id: Option<i64>) -> Self {
        Self { bot, thread_id }
    }
}

#[async_trait]
impl ChannelOps for TelegramChannel {
    async fn send_message(
        &self,
        channel: ChannelId,
        text: &str,
    ) -> Result<MessageRef, TransportError> {
        let sent = self
            .bot
            .send_message(&SendMessage::html(channel.0, text).in_thread(self.thread_id))
            .await?;
        Ok(MessageRef(sent.message_id))
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageRef,
        text: &str,
    ) -> EditOutcome {
        self.bot.edit_message_text(channel.0, message.0, text).await
    }

    async fn pin_message(
        &self,
        channel: ChannelId,
        message: MessageRef,
    ) -> Result<(), TransportError> {
        self.bot.pin_chat_message(channel.0, message.0).await
    }
}
