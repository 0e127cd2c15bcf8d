use tracing::info;

use crate::{AppResult, include_res, render::escape_html, res::fill, telegram::Message};

use super::{Handler, RenameArgs, RenameTarget};

const ADMINS_ONLY: &str = "⚠️ Only administrators can use this command.";

async fn ensure_admin(handler: &Handler, message: &Message) -> AppResult<bool> {
    let Some(user) = &message.from else {
        return Ok(false);
    };
    if handler.is_admin(handler.admin_chat(message), user.id).await {
        return Ok(true);
    }
    handler.reply(message, ADMINS_ONLY).await?;
    Ok(false)
}

pub(super) async fn rename(
    handler: &Handler,
    message: &Message,
    args: Option<RenameArgs>,
) -> AppResult<()> {
    if !ensure_admin(handler, message).await? {
        return Ok(());
    }
    let Some(RenameArgs { target, new_name }) = args else {
        return handler
            .reply(message, &fill(include_res!(str, "/messages/rename_usage.html"), &[]))
            .await;
    };

    let (profile, search) = match &target {
        RenameTarget::Handle(handle) => (
            handler.store.find_by_handle(handle).await?,
            format!("@{handle}"),
        ),
        RenameTarget::TokenPrefix(prefix) => (
            handler.store.find_by_token_prefix(prefix).await?,
            prefix.clone(),
        ),
    };
    let Some(profile) = profile else {
        return handler
            .reply(
                message,
                &format!("❌ No profile found matching: <code>{}</code>", escape_html(&search)),
            )
            .await;
    };

    handler
        .store
        .set_custom_name_by_token(&profile.token, new_name.as_deref())
        .await?;
    let text = match &new_name {
        Some(name) => format!(
            "✅ Name updated:\n<b>{}</b>\nnpub: <code>{}</code>",
            escape_html(name),
            profile.token.short(20)
        ),
        None => format!(
            "✅ Custom name removed.\nNow showing: <b>{}</b>",
            escape_html(profile.source_display_name())
        ),
    };
    handler.reply(message, &text).await?;
    info!(token = %profile.token.short(20), reset = new_name.is_none(), "profile renamed");

    handler.sync_directory(message).await;
    Ok(())
}

pub(super) async fn refresh(handler: &Handler, message: &Message) -> AppResult<()> {
    if !ensure_admin(handler, message).await? {
        return Ok(());
    }
    handler.sync_directory(message).await;
    handler
        .reply(message, "✅ Directory refreshed, pinned and published.")
        .await
}
