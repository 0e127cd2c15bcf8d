#![allow(dead_code)]

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use nostr_directory_bot::{
    db::StoreError,
    export::{PublishError, PublishSink, PutOutcome},
    model::{ChannelId, MessageRef, NewPinnedEntry, NewProfile, PinnedEntry},
    reconcile::{ChannelOps, EditOutcome, PinLedger, TransportError},
    token::Token,
};
use time::{OffsetDateTime, macros::datetime};

pub const AT: OffsetDateTime = datetime!(2025-06-01 12:00 UTC);
pub const CHANNEL: ChannelId = ChannelId(-1001);

pub fn token(n: usize) -> Token {
    Token::parse(&format!("npub1{n:0>58}")).unwrap()
}

pub fn new_profile(n: usize) -> NewProfile {
    NewProfile {
        token: token(n),
        owner_id: n as i64,
        display_handle: Some(format!("user{n}")),
        display_fallback_name: Some(format!("User {n}")),
        registered_at: AT + time::Duration::seconds(n as i64),
    }
}

fn rejected(method: &str) -> TransportError {
    TransportError::Rejected {
        method: method.to_owned(),
        code: Some(400),
        description: format!("Bad Request: {method} failed"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Send(MessageRef),
    Edit(MessageRef),
    Pin(MessageRef),
}

#[derive(Default)]
struct ChannelState {
    next_id: i64,
    messages: HashMap<i64, String>,
    ops: Vec<Op>,
    pinned: Option<MessageRef>,
}

/// In-memory channel that answers edits the way the Bot API does.
#[derive(Default)]
pub struct FakeChannel {
    state: Mutex<ChannelState>,
    pub fail_edits: Mutex<bool>,
    pub fail_pins: Mutex<bool>,
    /// Sends with this zero-based index (counted over the channel's life) fail.
    pub fail_send_at: Mutex<Option<usize>>,
}

impl FakeChannel {
    pub fn ops(&self) -> Vec<Op> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.lock().unwrap().ops.clear();
    }

    pub fn text(&self, message: MessageRef) -> Option<String> {
        self.state.lock().unwrap().messages.get(&message.0).cloned()
    }

    pub fn pinned(&self) -> Option<MessageRef> {
        self.state.lock().unwrap().pinned
    }

    pub fn sends(&self) -> usize {
        self.ops().iter().filter(|op| matches!(op, Op::Send(_))).count()
    }

    pub fn pins(&self) -> usize {
        self.ops().iter().filter(|op| matches!(op, Op::Pin(_))).count()
    }

    pub fn message_count(&self) -> usize {
        self.state.lock().unwrap().messages.len()
    }
}

#[async_trait]
impl ChannelOps for FakeChannel {
    async fn send_message(
        &self,
        _channel: ChannelId,
        text: &str,
    ) -> Result<MessageRef, TransportError> {
        let mut state = self.state.lock().unwrap();
        let index = state.messages.len();
        if *self.fail_send_at.lock().unwrap() == Some(index) {
            return Err(rejected("sendMessage"));
        }
        state.next_id += 1;
        let message = MessageRef(state.next_id);
        state.messages.insert(message.0, text.to_owned());
        state.ops.push(Op::Send(message));
        Ok(message)
    }

    async fn edit_message(
        &self,
        _channel: ChannelId,
        message: MessageRef,
        text: &str,
    ) -> EditOutcome {
        if *self.fail_edits.lock().unwrap() {
            return EditOutcome::Failed(rejected("editMessageText"));
        }
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let Some(current) = state.messages.get_mut(&message.0) else {
            return EditOutcome::Failed(rejected("editMessageText"));
        };
        if current.as_str() == text {
            return EditOutcome::Unchanged;
        }
        *current = text.to_owned();
        state.ops.push(Op::Edit(message));
        EditOutcome::Edited
    }

    async fn pin_message(
        &self,
        _channel: ChannelId,
        message: MessageRef,
    ) -> Result<(), TransportError> {
        if *self.fail_pins.lock().unwrap() {
            return Err(rejected("pinChatMessage"));
        }
        let mut state = self.state.lock().unwrap();
        state.pinned = Some(message);
        state.ops.push(Op::Pin(message));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeLedger {
    entries: Mutex<Vec<PinnedEntry>>,
}

impl FakeLedger {
    pub fn entries(&self) -> Vec<PinnedEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl PinLedger for FakeLedger {
    async fn current(&self, channel: ChannelId) -> Result<Option<PinnedEntry>, StoreError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|e| e.channel == channel && e.is_current)
            .cloned())
    }

    async fn append_and_supersede(&self, entry: NewPinnedEntry) -> Result<PinnedEntry, StoreError> {
        let mut entries = self.entries.lock().unwrap();
        for existing in entries.iter_mut().filter(|e| e.channel == entry.channel) {
            existing.is_current = false;
        }
        let pinned = PinnedEntry {
            id: entries.len() as i64 + 1,
            channel: entry.channel,
            message: entry.message,
            profile_count: entry.profile_count,
            is_current: true,
            created_at: AT,
        };
        entries.push(pinned.clone());
        Ok(pinned)
    }
}

/// Remote store keyed by path, with a numeric revision per document.
#[derive(Default)]
pub struct FakeSink {
    pub documents: Mutex<HashMap<String, (String, Vec<u8>)>>,
    /// Revision reported to readers, to simulate a concurrent writer.
    pub stale_revision: Mutex<Option<String>>,
    pub puts: Mutex<usize>,
}

#[async_trait]
impl PublishSink for FakeSink {
    async fn revision(&self, path: &str) -> Result<Option<String>, PublishError> {
        if let Some(stale) = self.stale_revision.lock().unwrap().clone() {
            return Ok(Some(stale));
        }
        Ok(self.documents.lock().unwrap().get(path).map(|(rev, _)| rev.clone()))
    }

    async fn put_content(
        &self,
        path: &str,
        bytes: &[u8],
        base_revision: Option<&str>,
    ) -> Result<PutOutcome, PublishError> {
        *self.puts.lock().unwrap() += 1;
        let mut documents = self.documents.lock().unwrap();
        let current = documents.get(path).map(|(rev, _)| rev.as_str());
        if current != base_revision {
            return Ok(PutOutcome::Conflict);
        }
        let next = current.map_or(1, |rev| rev.parse::<u64>().unwrap() + 1);
        documents.insert(path.to_owned(), (next.to_string(), bytes.to_vec()));
        Ok(PutOutcome::Written)
    }
}
