//! Transcript of the active conversation.
//!
//! All mutation goes through [`Transcript::apply`], fed from one inbound
//! queue of [`TranscriptEvent`]s: page results tagged with the fetch that
//! produced them, fetch failures and live deliveries.

mod assembler;

pub use assembler::Transcript;

use crate::common::{ChatroomId, HistoryPage, Message};

/// Identifies one fetch so its response can be matched to the conversation
/// that was active when it was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchTag {
    pub chatroom_id: ChatroomId,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Initial,
    Older,
}

/// A page fetch the caller must perform and report back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub tag: FetchTag,
    pub kind: FetchKind,
    pub page: u32,
}

#[derive(Debug, Clone)]
pub enum TranscriptEvent {
    InitialLoaded { tag: FetchTag, page: HistoryPage },
    OlderLoaded { tag: FetchTag, page: HistoryPage },
    FetchFailed { tag: FetchTag, kind: FetchKind },
    LiveReceived(Message),
}

/// What applying one event did to the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Initial page installed with this many messages.
    Replaced(usize),
    /// Older page prepended; count excludes dropped duplicates.
    Prepended(usize),
    Appended,
    Duplicate,
    /// Live message for another conversation; count it as unread there.
    RoutedToUnread(ChatroomId),
    /// Response for a conversation or generation that is no longer current.
    Stale,
    /// Fetch failed; loading flag cleared, nothing else touched.
    Failed(FetchKind),
}
