mod api;
mod channel;
mod types;

pub use api::Bot;
pub use channel::TelegramChannel;
pub use types::{
    CallbackQuery, Chat, ChatMember, InlineKeyboardButton, InlineKeyboardMarkup, Message,
    SendMessage, Update, User,
};
