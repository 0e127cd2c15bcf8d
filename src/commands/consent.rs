use tracing::warn;

use crate::{
    AppResult, include_res,
    reconcile::EditOutcome,
    res::fill,
    telegram::{CallbackQuery, Message},
};

use super::Handler;

/// `consent_{yes|no}_{owner_id}`
pub(crate) fn parse_consent(data: &str) -> Option<(bool, i64)> {
    let rest = data.strip_prefix("consent_")?;
    let (action, owner_id) = rest.split_once('_')?;
    let consent = match action {
        "yes" => true,
        "no" => false,
        _ => return None,
    };
    Some((consent, owner_id.parse().ok()?))
}

pub(super) async fn on_callback(handler: &Handler, query: &CallbackQuery) -> AppResult<()> {
    let Some((consent, owner_id)) = query.data.as_deref().and_then(parse_consent) else {
        return Ok(());
    };

    if query.from.id != owner_id {
        handler
            .bot
            .answer_callback_query(
                &query.id,
                Some("⚠️ Only the profile owner can answer."),
                true,
            )
            .await?;
        return Ok(());
    }

    handler.store.set_consent_by_owner(owner_id, consent).await?;

    if let Some(prompt) = &query.message {
        let text = if consent {
            fill(
                include_res!(str, "/messages/consent_public.html"),
                &[("public_url", &handler.config.public_directory_url)],
            )
        } else {
            fill(include_res!(str, "/messages/consent_group_only.html"), &[])
        };
        if let EditOutcome::Failed(err) = handler
            .bot
            .edit_message_text(prompt.chat.id, prompt.message_id, &text)
            .await
        {
            warn!(message_id = prompt.message_id, "could not update consent prompt: {err}");
        }
    }

    handler.directory.publish_logged().await;
    handler.bot.answer_callback_query(&query.id, None, false).await?;
    Ok(())
}

pub(super) async fn set_web(handler: &Handler, message: &Message, consent: bool) -> AppResult<()> {
    let Some(user) = &message.from else {
        return Ok(());
    };

    if !handler.store.set_consent_by_owner(user.id, consent).await? {
        return handler
            .reply(message, &fill(include_res!(str, "/messages/not_registered.html"), &[]))
            .await;
    }

    let text = if consent {
        fill(
            include_res!(str, "/messages/web_yes.html"),
            &[("public_url", &handler.config.public_directory_url)],
        )
    } else {
        "✅ You no longer appear on the public website. You're still in the group directory."
            .to_owned()
    };
    handler.reply(message, &text).await?;
    handler.directory.publish_logged().await;
    Ok(())
}
