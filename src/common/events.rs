use super::types::{Chatroom, ChatroomId, Message, PageCursor};

/// Events emitted by the chat client loop for the UI.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// The initial page of the active conversation replaced the transcript.
    TranscriptLoaded {
        chatroom_id: ChatroomId,
        messages: Vec<Message>,
        cursor: PageCursor,
    },
    /// An older page was prepended; the view should restore its scroll anchor.
    OlderPrepended {
        chatroom_id: ChatroomId,
        added: usize,
        cursor: PageCursor,
    },
    /// A live message reached the active transcript.
    MessageAppended(Message),
    /// A live message arrived for a conversation that is not displayed.
    UnreadChanged { chatroom_id: ChatroomId, unread: u32 },
    ChatroomsUpdated(Vec<Chatroom>),
    ConnectionChanged(bool),
    /// Transient, user-facing failure notice.
    Toast(String),
    /// Authorization failed; stored session data has been cleared.
    SessionExpired,
}
