mod admin;
mod consent;
mod harvest;
mod profile;

use std::{sync::Arc, time::Duration};

use tracing::{error, info, warn};

use crate::{
    AppResult,
    config::{AdminCheckPolicy, Config},
    db::Store,
    directory::Directory,
    model::ChannelId,
    reconcile::TransportError,
    telegram::{Bot, ChatMember, Message, SendMessage, Update},
};

pub use harvest::{Registration, register};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameTarget {
    Handle(String),
    TokenPrefix(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameArgs {
    pub target: RenameTarget,
    /// `None` clears the custom name.
    pub new_name: Option<String>,
}

impl RenameArgs {
    fn parse(rest: &str) -> Option<Self> {
        let mut args = rest.split_whitespace();
        let target = args.next()?;
        let new_name = args.collect::<Vec<_>>().join(" ");
        if new_name.is_empty() {
            return None;
        }

        let target = match target.strip_prefix('@') {
            Some(handle) => RenameTarget::Handle(handle.to_lowercase()),
            None => RenameTarget::TokenPrefix(target.to_ascii_lowercase()),
        };
        Some(Self {
            target,
            new_name: (new_name != "--reset").then_some(new_name),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    MyProfile,
    DeleteMe,
    WebYes,
    WebNo,
    Stats,
    /// `None` when the arguments are missing.
    Rename(Option<RenameArgs>),
    Refresh,
}

impl Command {
    /// Parses `/name[@bot] args`; unknown commands give `None`.
    pub fn parse(text: &str) -> Option<Command> {
        let text = text.strip_prefix('/')?;
        let (head, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
        let name = head.split_once('@').map_or(head, |(name, _)| name);

        Some(match name.to_ascii_lowercase().as_str() {
            "start" | "help" => Command::Start,
            "miperfil" => Command::MyProfile,
            "borrarme" => Command::DeleteMe,
            "websi" => Command::WebYes,
            "webno" => Command::WebNo,
            "stats" => Command::Stats,
            "renombrar" => Command::Rename(RenameArgs::parse(rest)),
            "directorio" => Command::Refresh,
            _ => return None,
        })
    }
}

/// Outcome of an admin lookup under the configured policy.
pub(crate) fn admin_allowed(
    policy: AdminCheckPolicy,
    lookup: Result<ChatMember, TransportError>,
) -> bool {
    match lookup {
        Ok(member) => member.is_admin(),
        Err(err) => {
            let allowed = policy == AdminCheckPolicy::FailOpen;
            warn!(?policy, allowed, "admin check failed: {err}");
            allowed
        }
    }
}

/// Processes updates one at a time, which also serializes directory refreshes.
pub struct Handler {
    bot: Bot,
    store: Store,
    directory: Directory,
    config: Arc<Config>,
}

impl Handler {
    pub fn new(bot: Bot, store: Store, directory: Directory, config: Arc<Config>) -> Self {
        Self {
            bot,
            store,
            directory,
            config,
        }
    }

    pub async fn run(&self) {
        info!("listening for updates");
        let mut offset = None;
        loop {
            match self.bot.get_updates(offset, self.config.poll_timeout_secs).await {
                Ok(updates) => {
                    for update in updates {
                        let update_id = update.update_id;
                        offset = Some(update_id + 1);
                        if let Err(err) = self.handle(update).await {
                            error!(update_id, "update failed: {err}");
                        }
                    }
                }
                Err(err) => {
                    warn!("polling failed: {err}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    pub async fn handle(&self, update: Update) -> AppResult<()> {
        if let Some(query) = update.callback_query {
            return consent::on_callback(self, &query).await;
        }
        let Some(message) = update.message else {
            return Ok(());
        };
        let Some(text) = message.text.as_deref() else {
            return Ok(());
        };

        if text.starts_with('/') {
            return match Command::parse(text) {
                Some(command) => self.run_command(command, &message).await,
                None => Ok(()),
            };
        }
        harvest::on_text(self, &message, text).await
    }

    async fn run_command(&self, command: Command, message: &Message) -> AppResult<()> {
        match command {
            Command::Start => profile::start(self, message).await,
            Command::MyProfile => profile::my_profile(self, message).await,
            Command::DeleteMe => profile::delete_me(self, message).await,
            Command::WebYes => consent::set_web(self, message, true).await,
            Command::WebNo => consent::set_web(self, message, false).await,
            Command::Stats => profile::stats(self, message).await,
            Command::Rename(args) => admin::rename(self, message, args).await,
            Command::Refresh => admin::refresh(self, message).await,
        }
    }

    async fn reply(&self, message: &Message, text: &str) -> AppResult<()> {
        self.bot
            .send_message(
                &SendMessage::html(message.chat.id, text)
                    .in_thread(message.message_thread_id)
                    .reply_to(message.message_id),
            )
            .await?;
        Ok(())
    }

    async fn is_admin(&self, chat_id: i64, user_id: i64) -> bool {
        admin_allowed(
            self.config.admin_check,
            self.bot.get_chat_member(chat_id, user_id).await,
        )
    }

    /// Admin rights are checked where the directory lives, not where the
    /// command was sent.
    fn admin_chat(&self, message: &Message) -> i64 {
        self.config.allowed_chat_id.unwrap_or(message.chat.id)
    }

    /// The configured group, or the current chat when unrestricted and not private.
    fn directory_channel(&self, message: &Message) -> Option<ChannelId> {
        match self.config.allowed_chat_id {
            Some(chat_id) => Some(ChannelId(chat_id)),
            None if message.chat.is_private() => None,
            None => Some(self.config.directory_channel(message.chat.id)),
        }
    }

    async fn sync_directory(&self, message: &Message) {
        match self.directory_channel(message) {
            Some(channel) => self.directory.sync(channel).await,
            None => self.directory.publish_logged().await,
        }
    }
}
