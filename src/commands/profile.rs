use time::macros::format_description;

use crate::{AppResult, include_res, render::escape_html, res::fill, telegram::Message};

use super::Handler;

pub(super) async fn start(handler: &Handler, message: &Message) -> AppResult<()> {
    let text = fill(
        include_res!(str, "/messages/start.html"),
        &[("public_url", &handler.config.public_directory_url)],
    );
    handler.reply(message, &text).await
}

pub(super) async fn my_profile(handler: &Handler, message: &Message) -> AppResult<()> {
    let Some(user) = &message.from else {
        return Ok(());
    };
    let Some(profile) = handler.store.find_by_owner(user.id).await? else {
        return handler
            .reply(message, &fill(include_res!(str, "/messages/not_registered.html"), &[]))
            .await;
    };

    let custom_note = match &profile.custom_name {
        Some(name) if !name.is_empty() => {
            format!("\n✏️ Custom name: <b>{}</b>", escape_html(name))
        }
        _ => String::new(),
    };
    let registered = profile
        .registered_at
        .format(format_description!("[year]-[month]-[day]"))?;

    let text = fill(
        include_res!(str, "/messages/my_profile.html"),
        &[
            ("display", &escape_html(&profile.display_name())),
            ("custom_note", &custom_note),
            ("token", profile.token.as_str()),
            ("viewer_url", &profile.token.viewer_url(&handler.config.viewer_base_url)),
            ("registered", &registered),
            ("web_status", if profile.public_consent { "✅ Yes" } else { "❌ No" }),
        ],
    );
    handler.reply(message, &text).await
}

pub(super) async fn delete_me(handler: &Handler, message: &Message) -> AppResult<()> {
    let Some(user) = &message.from else {
        return Ok(());
    };
    if !handler.store.delete_by_owner(user.id).await? {
        return handler.reply(message, "You didn't have a registered profile.").await;
    }

    handler
        .reply(message, "✅ Your profile has been removed from the directory.")
        .await?;
    handler.sync_directory(message).await;
    Ok(())
}

pub(super) async fn stats(handler: &Handler, message: &Message) -> AppResult<()> {
    let total = handler.store.count_all().await?;
    let public = handler.store.count_consented().await?;
    let text = fill(
        include_res!(str, "/messages/stats.html"),
        &[
            ("total", &total.to_string()),
            ("public", &public.to_string()),
            ("group_only", &(total - public).to_string()),
        ],
    );
    handler.reply(message, &text).await
}
