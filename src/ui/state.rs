use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::common::{Chatroom, ChatroomId};

const MAX_TOASTS: usize = 100;

/// Tracks closed→open transitions so bulk actions run once per opening,
/// not on every refresh.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OpenLatch {
    open: bool,
}

impl OpenLatch {
    /// Returns true only when this call moved the latch from closed to open.
    pub fn open(&mut self) -> bool {
        let transitioned = !self.open;
        self.open = true;
        transitioned
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Chatroom list, unread badges and send-control state.
#[derive(Debug, Default)]
pub struct ChatViewState {
    pub chatrooms: Vec<Chatroom>,
    unread: BTreeMap<ChatroomId, u32>,
    active: Option<ChatroomId>,
    pub conversation: OpenLatch,
    connected: bool,
    pub toasts: Vec<Toast>,
}

impl ChatViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the server's chatroom list. Server unread counts win, except
    /// for the displayed conversation, which the user is reading.
    pub fn set_chatrooms(&mut self, chatrooms: Vec<Chatroom>) {
        self.unread = chatrooms
            .iter()
            .map(|room| (room.chatroom_id, room.unread_count))
            .collect();
        if let Some(active) = self.active {
            self.unread.insert(active, 0);
        }
        self.chatrooms = chatrooms;
        self.sync_room_counts();
    }

    /// Add or refresh one room, e.g. after get-or-create.
    pub fn upsert_chatroom(&mut self, chatroom: Chatroom) {
        let unread = if self.active == Some(chatroom.chatroom_id) {
            0
        } else {
            chatroom.unread_count
        };
        self.unread.insert(chatroom.chatroom_id, unread);
        match self
            .chatrooms
            .iter_mut()
            .find(|room| room.chatroom_id == chatroom.chatroom_id)
        {
            Some(existing) => *existing = chatroom,
            None => self.chatrooms.insert(0, chatroom),
        }
        self.sync_room_counts();
    }

    /// Returns true when this is a closed→open transition.
    pub fn open_conversation(&mut self, chatroom_id: ChatroomId) -> bool {
        if self.active != Some(chatroom_id) {
            self.conversation.close();
        }
        self.active = Some(chatroom_id);
        self.unread.insert(chatroom_id, 0);
        self.sync_room_counts();
        self.conversation.open()
    }

    pub fn close_conversation(&mut self) {
        self.active = None;
        self.conversation.close();
    }

    pub fn active_chatroom(&self) -> Option<ChatroomId> {
        self.active
    }

    /// A live message arrived for a conversation that is not displayed.
    pub fn bump_unread(&mut self, chatroom_id: ChatroomId) -> u32 {
        let count = self.unread.entry(chatroom_id).or_insert(0);
        *count += 1;
        let count = *count;
        self.sync_room_counts();
        count
    }

    pub fn unread(&self, chatroom_id: ChatroomId) -> u32 {
        self.unread.get(&chatroom_id).copied().unwrap_or(0)
    }

    pub fn total_unread(&self) -> u32 {
        self.unread.values().sum()
    }

    pub fn set_connected(&mut self, connected: bool) -> bool {
        let changed = self.connected != connected;
        self.connected = connected;
        changed
    }

    /// The send control is disabled while the live channel is down.
    pub fn can_send(&self) -> bool {
        self.connected && self.active.is_some()
    }

    pub fn push_toast(&mut self, message: impl Into<String>) {
        self.toasts.push(Toast {
            at: Utc::now(),
            message: message.into(),
        });

        if self.toasts.len() > MAX_TOASTS {
            self.toasts.remove(0);
        }
    }

    fn sync_room_counts(&mut self) {
        for room in &mut self.chatrooms {
            room.unread_count = self.unread.get(&room.chatroom_id).copied().unwrap_or(0);
        }
    }
}
