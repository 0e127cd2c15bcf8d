use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use tracing::debug;

use crate::reconcile::{EditOutcome, TransportError};

use super::types::{
    ApiResponse, ChatMember, EditMessageText, LinkPreviewOptions, Message, SendMessage, Update,
};

const API_BASE: &str = "https://api.telegram.org";

/// Minimal Bot API client.
#[derive(Clone)]
pub struct Bot {
    http: reqwest::Client,
    base_url: String,
}

impl Bot {
    /// `poll_timeout_secs` is the long-poll window; the HTTP timeout is set above it.
    pub fn new(token: &str, poll_timeout_secs: u64) -> Result<Self, TransportError> {
        Self::with_base_url(API_BASE, token, poll_timeout_secs)
    }

    pub fn with_base_url(
        api_base: &str,
        token: &str,
        poll_timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        let http = reqwest::ClientBuilder::new()
            .timeout(Duration::from_secs(poll_timeout_secs + 15))
            .build()?;
        Ok(Self {
            http,
            base_url: format!("{}/bot{token}", api_base.trim_end_matches('/')),
        })
    }

    async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, TransportError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response: ApiResponse<R> = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .json(params)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(TransportError::Rejected {
                method: method.to_owned(),
                code: response.error_code,
                description: response.description.unwrap_or_default(),
            });
        }
        response
            .result
            .ok_or_else(|| TransportError::EmptyResult(method.to_owned()))
    }

    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TransportError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    pub async fn send_message(&self, message: &SendMessage<'_>) -> Result<Message, TransportError> {
        self.call("sendMessage", message).await
    }

    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> EditOutcome {
        let params = EditMessageText {
            chat_id,
            message_id,
            text,
            parse_mode: "HTML",
            link_preview_options: LinkPreviewOptions::DISABLED,
        };
        match self.call::<_, serde_json::Value>("editMessageText", &params).await {
            Ok(_) => EditOutcome::Edited,
            Err(err) if is_not_modified(&err) => EditOutcome::Unchanged,
            Err(err) => EditOutcome::Failed(err),
        }
    }

    pub async fn pin_chat_message(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<(), TransportError> {
        let _: bool = self
            .call(
                "pinChatMessage",
                &json!({
                    "chat_id": chat_id,
                    "message_id": message_id,
                    "disable_notification": true,
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn get_chat_member(
        &self,
        chat_id: i64,
        user_id: i64,
    ) -> Result<ChatMember, TransportError> {
        self.call(
            "getChatMember",
            &json!({ "chat_id": chat_id, "user_id": user_id }),
        )
        .await
    }

    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), TransportError> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                &json!({
                    "callback_query_id": callback_query_id,
                    "text": text,
                    "show_alert": show_alert,
                }),
            )
            .await?;
        debug!(callback_query_id, "callback answered");
        Ok(())
    }
}

/// The Bot API refuses edits that would not change the message.
fn is_not_modified(err: &TransportError) -> bool {
    match err {
        TransportError::Rejected { description, .. } => {
            description.to_lowercase().contains("message is not modified")
        }
        _ => false,
    }
}
