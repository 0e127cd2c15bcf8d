use time::OffsetDateTime;
use tracing::info;

use crate::{
    AppResult, include_res,
    db::{Store, StoreError},
    model::NewProfile,
    res::fill,
    telegram::{InlineKeyboardButton, InlineKeyboardMarkup, Message, SendMessage},
    token::find_token,
};

use super::Handler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Added,
    AlreadyListed,
    /// The owner's record now points at the new token.
    Rebound,
    /// Another owner claimed the token first.
    TokenTaken,
}

/// First claimant of a token wins; an owner posting a new token moves
/// their record to it.
pub async fn register(store: &Store, profile: NewProfile) -> Result<Registration, StoreError> {
    if let Some(existing) = store.find_by_owner(profile.owner_id).await? {
        if existing.token == profile.token {
            return Ok(Registration::AlreadyListed);
        }
        return match store.rebind_token_by_owner(profile.owner_id, &profile.token).await {
            Ok(_) => Ok(Registration::Rebound),
            Err(StoreError::TokenTaken(_)) => Ok(Registration::TokenTaken),
            Err(err) => Err(err),
        };
    }

    if store.insert_if_absent(&profile).await? {
        Ok(Registration::Added)
    } else {
        Ok(Registration::TokenTaken)
    }
}

pub(super) async fn on_text(handler: &Handler, message: &Message, text: &str) -> AppResult<()> {
    if !handler.config.is_allowed_chat(message.chat.id)
        || !handler.config.is_allowed_thread(message.message_thread_id)
    {
        return Ok(());
    }
    let Some(token) = find_token(text) else {
        return Ok(());
    };
    let Some(user) = &message.from else {
        return Ok(());
    };

    let profile = NewProfile {
        token: token.clone(),
        owner_id: user.id,
        display_handle: user.username.clone(),
        display_fallback_name: Some(user.full_name()),
        registered_at: OffsetDateTime::now_utc(),
    };

    match register(&handler.store, profile).await? {
        Registration::AlreadyListed => {
            handler
                .reply(message, "✅ You're already in the directory with that npub.")
                .await?;
        }
        Registration::TokenTaken => {
            handler
                .reply(message, "⚠️ That npub is already registered by another user.")
                .await?;
        }
        Registration::Rebound => {
            handler
                .reply(message, "🔄 Your npub has been updated in the directory.")
                .await?;
            handler.sync_directory(message).await;
        }
        Registration::Added => {
            let keyboard = InlineKeyboardMarkup {
                inline_keyboard: vec![vec![
                    InlineKeyboardButton::callback(
                        "✅ Yes, show me on the website",
                        format!("consent_yes_{}", user.id),
                    ),
                    InlineKeyboardButton::callback(
                        "❌ Telegram only",
                        format!("consent_no_{}", user.id),
                    ),
                ]],
            };
            let text = fill(
                include_res!(str, "/messages/profile_added.html"),
                &[
                    ("short", &token.short(20)),
                    ("viewer_url", &token.viewer_url(&handler.config.viewer_base_url)),
                    ("public_url", &handler.config.public_directory_url),
                ],
            );
            handler
                .bot
                .send_message(
                    &SendMessage::html(message.chat.id, &text)
                        .in_thread(message.message_thread_id)
                        .reply_to(message.message_id)
                        .with_keyboard(&keyboard),
                )
                .await?;

            handler.sync_directory(message).await;
            info!(
                owner_id = user.id,
                token = %token.short(20),
                "new profile registered"
            );
        }
    }

    Ok(())
}
