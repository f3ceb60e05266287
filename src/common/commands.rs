use super::types::{Chatroom, ChatroomId};

/// Commands sent by the UI to the chat client loop.
#[derive(Debug, Clone)]
pub enum ChatCommand {
    /// Switch the active conversation and load its newest page.
    Open(ChatroomId),
    /// Leave the active conversation (the closed state of the open latch).
    Close,
    /// Backfill the next older page if one exists and none is in flight.
    LoadOlder,
    /// Publish a text message to the active conversation.
    Send(String),
    /// Re-read the chatroom list and reconcile unread counts.
    RefreshChatrooms,
    /// Get or create the conversation with a seller, then open it.
    Contact {
        seller_id: i64,
        order_id: Option<i64>,
    },
    /// Seed the chatroom list without a network round trip.
    SetChatrooms(Vec<Chatroom>),
}
