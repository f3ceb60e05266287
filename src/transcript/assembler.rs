use std::cmp::Ordering;
use std::collections::HashSet;

use crate::common::{ChatroomId, HistoryPage, Message, MessageId, PageCursor};

use super::{FetchKind, FetchRequest, FetchTag, Outcome, TranscriptEvent};

/// Ordered, deduplicated messages of one conversation plus its pagination
/// cursor and loading flags.
#[derive(Debug, Default)]
pub struct Transcript {
    active: Option<ChatroomId>,
    generation: u64,
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
    cursor: PageCursor,
    loading_initial: bool,
    /// Page number of the backfill in flight.
    loading_older: Option<u32>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for `chatroom_id` and request its newest page. Any response
    /// still in flight for an earlier open becomes stale.
    pub fn open(&mut self, chatroom_id: ChatroomId) -> FetchRequest {
        self.reset();
        self.active = Some(chatroom_id);
        self.loading_initial = true;
        FetchRequest {
            tag: self.current_tag(chatroom_id),
            kind: FetchKind::Initial,
            page: 0,
        }
    }

    pub fn close(&mut self) {
        self.reset();
    }

    /// Next older page, unless one is in flight, the initial page has not
    /// landed, or the cursor is on the oldest page.
    pub fn request_older(&mut self) -> Option<FetchRequest> {
        let chatroom_id = self.active?;
        if self.loading_initial || self.loading_older.is_some() || !self.cursor.has_older() {
            return None;
        }

        let page = self.cursor.current_page + 1;
        self.loading_older = Some(page);
        Some(FetchRequest {
            tag: self.current_tag(chatroom_id),
            kind: FetchKind::Older,
            page,
        })
    }

    pub fn apply(&mut self, event: TranscriptEvent) -> Outcome {
        match event {
            TranscriptEvent::InitialLoaded { tag, page } => self.apply_initial(tag, page),
            TranscriptEvent::OlderLoaded { tag, page } => self.apply_older(tag, page),
            TranscriptEvent::FetchFailed { tag, kind } => self.apply_failure(tag, kind),
            TranscriptEvent::LiveReceived(message) => self.append_live(message),
        }
    }

    fn apply_initial(&mut self, tag: FetchTag, page: HistoryPage) -> Outcome {
        if !self.is_current(tag) || !self.loading_initial {
            log::debug!("Discarding stale initial page for chatroom {}", tag.chatroom_id);
            return Outcome::Stale;
        }

        let (history, cursor) = page.into_chronological();
        // live messages that landed while the page was in flight stay
        let live = std::mem::take(&mut self.messages);
        self.ids.clear();
        for message in history.into_iter().chain(live) {
            if self.ids.insert(message.id.clone()) {
                self.insert_sorted(message);
            }
        }

        self.cursor = PageCursor {
            current_page: 0,
            total_pages: cursor.total_pages,
        };
        self.loading_initial = false;
        Outcome::Replaced(self.messages.len())
    }

    fn apply_older(&mut self, tag: FetchTag, page: HistoryPage) -> Outcome {
        let Some(requested) = self.loading_older.filter(|_| self.is_current(tag)) else {
            log::debug!("Discarding stale older page for chatroom {}", tag.chatroom_id);
            return Outcome::Stale;
        };

        let (history, cursor) = page.into_chronological();
        let fresh: Vec<Message> = history
            .into_iter()
            .filter(|message| !self.ids.contains(&message.id))
            .collect();
        let added = fresh.len();

        let fits_before_head = match (fresh.last(), self.messages.first()) {
            (Some(last), Some(head)) => last.order_cmp(head) != Ordering::Greater,
            _ => true,
        };

        if fits_before_head {
            self.ids.extend(fresh.iter().map(|message| message.id.clone()));
            let mut merged = fresh;
            merged.append(&mut self.messages);
            self.messages = merged;
        } else {
            log::debug!(
                "Older page for chatroom {} overlaps the transcript; merging in order",
                tag.chatroom_id
            );
            for message in fresh {
                self.ids.insert(message.id.clone());
                self.insert_sorted(message);
            }
        }

        self.cursor = PageCursor {
            current_page: requested,
            total_pages: cursor.total_pages.max(requested + 1),
        };
        self.loading_older = None;
        Outcome::Prepended(added)
    }

    fn apply_failure(&mut self, tag: FetchTag, kind: FetchKind) -> Outcome {
        if !self.is_current(tag) {
            return Outcome::Stale;
        }
        match kind {
            FetchKind::Initial => self.loading_initial = false,
            FetchKind::Older => self.loading_older = None,
        }
        Outcome::Failed(kind)
    }

    fn append_live(&mut self, message: Message) -> Outcome {
        if self.active != Some(message.chatroom_id) {
            return Outcome::RoutedToUnread(message.chatroom_id);
        }
        if !self.ids.insert(message.id.clone()) {
            return Outcome::Duplicate;
        }
        self.insert_sorted(message);
        Outcome::Appended
    }

    /// Tail append in the common case, positional insert when the message
    /// sorts before the current tail.
    fn insert_sorted(&mut self, message: Message) {
        let in_order = self
            .messages
            .last()
            .is_none_or(|tail| tail.order_cmp(&message) != Ordering::Greater);
        if in_order {
            self.messages.push(message);
            return;
        }

        let index = self
            .messages
            .partition_point(|existing| existing.order_cmp(&message) != Ordering::Greater);
        self.messages.insert(index, message);
    }

    fn reset(&mut self) {
        self.generation += 1;
        self.active = None;
        self.messages.clear();
        self.ids.clear();
        self.cursor = PageCursor::default();
        self.loading_initial = false;
        self.loading_older = None;
    }

    fn current_tag(&self, chatroom_id: ChatroomId) -> FetchTag {
        FetchTag {
            chatroom_id,
            generation: self.generation,
        }
    }

    fn is_current(&self, tag: FetchTag) -> bool {
        self.active == Some(tag.chatroom_id) && self.generation == tag.generation
    }

    pub fn active_chatroom(&self) -> Option<ChatroomId> {
        self.active
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn ids(&self) -> impl Iterator<Item = &MessageId> {
        self.messages.iter().map(|message| &message.id)
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    pub fn cursor(&self) -> PageCursor {
        self.cursor
    }

    pub fn has_older(&self) -> bool {
        self.cursor.has_older()
    }

    pub fn is_loading_initial(&self) -> bool {
        self.loading_initial
    }

    pub fn is_loading_older(&self) -> bool {
        self.loading_older.is_some()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::MessageType;
    use chrono::{TimeZone, Utc};

    fn message(chatroom_id: ChatroomId, id: i64, secs: i64) -> Message {
        Message {
            id: id.into(),
            chatroom_id,
            sender_id: 1,
            sender_name: None,
            content: format!("message {id}"),
            message_type: MessageType::Text,
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    /// Newest-first page of ids `from..=to` (timestamp == id).
    fn page(chatroom_id: ChatroomId, from: i64, to: i64, current: u32, total: u32) -> HistoryPage {
        HistoryPage {
            messages: (from..=to).rev().map(|id| message(chatroom_id, id, id)).collect(),
            pagination: PageCursor { current_page: current, total_pages: total },
        }
    }

    fn assert_ordered(transcript: &Transcript) {
        for pair in transcript.messages().windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }

    fn ids(transcript: &Transcript) -> Vec<MessageId> {
        transcript.ids().cloned().collect()
    }

    #[test]
    fn test_initial_page_is_chronological() {
        let mut transcript = Transcript::new();
        let request = transcript.open(1);
        assert_eq!(request.page, 0);
        assert_eq!(request.kind, FetchKind::Initial);
        assert!(transcript.is_loading_initial());

        let outcome = transcript.apply(TranscriptEvent::InitialLoaded {
            tag: request.tag,
            page: page(1, 21, 30, 0, 3),
        });

        assert_eq!(outcome, Outcome::Replaced(10));
        assert!(!transcript.is_loading_initial());
        assert_eq!(transcript.messages().first().unwrap().id, MessageId::from(21));
        assert_eq!(transcript.messages().last().unwrap().id, MessageId::from(30));
        assert!(transcript.has_older());
    }

    #[test]
    fn test_live_duplicates_are_dropped() {
        let mut transcript = Transcript::new();
        let request = transcript.open(1);
        transcript.apply(TranscriptEvent::InitialLoaded {
            tag: request.tag,
            page: page(1, 1, 3, 0, 1),
        });

        let mut outcomes = Vec::new();
        for id in [4, 4, 3, 5, 4, 5] {
            outcomes.push(transcript.apply(TranscriptEvent::LiveReceived(message(1, id, id))));
        }

        assert_eq!(outcomes.iter().filter(|o| **o == Outcome::Appended).count(), 2);
        assert_eq!(ids(&transcript), (1..=5).map(MessageId::from).collect::<Vec<_>>());
    }

    #[test]
    fn test_live_for_other_chatroom_is_routed_to_unread() {
        let mut transcript = Transcript::new();
        transcript.open(1);

        let outcome = transcript.apply(TranscriptEvent::LiveReceived(message(2, 9, 9)));
        assert_eq!(outcome, Outcome::RoutedToUnread(2));
        assert!(transcript.is_empty());
    }

    #[test]
    fn test_backfill_prepends_until_exhausted() {
        let mut transcript = Transcript::new();
        let request = transcript.open(1);
        transcript.apply(TranscriptEvent::InitialLoaded {
            tag: request.tag,
            page: page(1, 21, 30, 0, 3),
        });

        let mut requests = 0;
        while let Some(request) = transcript.request_older() {
            requests += 1;
            let newest = 30 - 10 * request.page as i64;
            transcript.apply(TranscriptEvent::OlderLoaded {
                tag: request.tag,
                page: page(1, newest - 9, newest, request.page, 3),
            });
            assert_ordered(&transcript);
        }

        assert_eq!(requests, 2);
        assert_eq!(transcript.cursor(), PageCursor { current_page: 2, total_pages: 3 });
        assert_eq!(transcript.len(), 30);
        assert!(transcript.request_older().is_none());
        assert!(transcript.request_older().is_none());
    }

    #[test]
    fn test_concurrent_older_requests_collapse() {
        let mut transcript = Transcript::new();
        let request = transcript.open(1);
        transcript.apply(TranscriptEvent::InitialLoaded {
            tag: request.tag,
            page: page(1, 11, 20, 0, 2),
        });

        let first = transcript.request_older();
        assert!(first.is_some());
        assert!(transcript.is_loading_older());
        assert!(transcript.request_older().is_none());
    }

    #[test]
    fn test_no_backfill_while_initial_in_flight() {
        let mut transcript = Transcript::new();
        transcript.open(1);
        assert!(transcript.request_older().is_none());
    }

    #[test]
    fn test_stale_initial_response_is_discarded() {
        let mut transcript = Transcript::new();
        let request_a = transcript.open(1);
        let request_b = transcript.open(2);

        let outcome_b = transcript.apply(TranscriptEvent::InitialLoaded {
            tag: request_b.tag,
            page: page(2, 100, 102, 0, 1),
        });
        assert_eq!(outcome_b, Outcome::Replaced(3));

        let outcome_a = transcript.apply(TranscriptEvent::InitialLoaded {
            tag: request_a.tag,
            page: page(1, 1, 5, 0, 1),
        });
        assert_eq!(outcome_a, Outcome::Stale);
        assert_eq!(transcript.active_chatroom(), Some(2));
        assert!(transcript.messages().iter().all(|m| m.chatroom_id == 2));
        assert_eq!(transcript.len(), 3);
    }

    #[test]
    fn test_reopening_same_chatroom_discards_earlier_response() {
        let mut transcript = Transcript::new();
        let first = transcript.open(1);
        let second = transcript.open(1);
        assert_ne!(first.tag, second.tag);

        assert_eq!(
            transcript.apply(TranscriptEvent::InitialLoaded {
                tag: first.tag,
                page: page(1, 1, 2, 0, 1),
            }),
            Outcome::Stale
        );
        assert!(transcript.is_loading_initial());
    }

    #[test]
    fn test_failed_backfill_keeps_state() {
        let mut transcript = Transcript::new();
        let request = transcript.open(1);
        transcript.apply(TranscriptEvent::InitialLoaded {
            tag: request.tag,
            page: page(1, 11, 20, 0, 2),
        });
        let before = ids(&transcript);

        let older = transcript.request_older().unwrap();
        let outcome = transcript.apply(TranscriptEvent::FetchFailed {
            tag: older.tag,
            kind: FetchKind::Older,
        });

        assert_eq!(outcome, Outcome::Failed(FetchKind::Older));
        assert!(!transcript.is_loading_older());
        assert_eq!(ids(&transcript), before);
        assert_eq!(transcript.cursor(), PageCursor { current_page: 0, total_pages: 2 });
        // retry is allowed again
        assert_eq!(transcript.request_older().map(|r| r.page), Some(1));
    }

    #[test]
    fn test_stale_failure_does_not_clear_new_loading_flag() {
        let mut transcript = Transcript::new();
        let old = transcript.open(1);
        transcript.open(2);

        let outcome = transcript.apply(TranscriptEvent::FetchFailed {
            tag: old.tag,
            kind: FetchKind::Initial,
        });
        assert_eq!(outcome, Outcome::Stale);
        assert!(transcript.is_loading_initial());
    }

    #[test]
    fn test_live_during_initial_load_is_kept() {
        let mut transcript = Transcript::new();
        let request = transcript.open(1);
        transcript.apply(TranscriptEvent::LiveReceived(message(1, 11, 11)));
        transcript.apply(TranscriptEvent::LiveReceived(message(1, 10, 10)));

        // page already contains 10, which arrived live too
        transcript.apply(TranscriptEvent::InitialLoaded {
            tag: request.tag,
            page: page(1, 6, 10, 0, 1),
        });

        assert_eq!(ids(&transcript), (6..=11).map(MessageId::from).collect::<Vec<_>>());
    }

    #[test]
    fn test_out_of_order_live_message_is_inserted_in_place() {
        let mut transcript = Transcript::new();
        let request = transcript.open(1);
        transcript.apply(TranscriptEvent::InitialLoaded {
            tag: request.tag,
            page: page(1, 1, 5, 0, 1),
        });

        transcript.apply(TranscriptEvent::LiveReceived(message(1, 50, 3)));
        assert_ordered(&transcript);
        assert_eq!(transcript.messages()[3].id, MessageId::from(50));
    }

    #[test]
    fn test_overlapping_backfill_is_merged_in_order() {
        let mut transcript = Transcript::new();
        let request = transcript.open(1);
        transcript.apply(TranscriptEvent::InitialLoaded {
            tag: request.tag,
            page: page(1, 11, 20, 0, 2),
        });

        // a live message older than the loaded head arrived mid-backfill
        let older = transcript.request_older().unwrap();
        transcript.apply(TranscriptEvent::LiveReceived(message(1, 5, 5)));
        let outcome = transcript.apply(TranscriptEvent::OlderLoaded {
            tag: older.tag,
            page: page(1, 1, 10, 1, 2),
        });

        assert_eq!(outcome, Outcome::Prepended(9));
        assert_eq!(ids(&transcript), (1..=20).map(MessageId::from).collect::<Vec<_>>());
    }

    #[test]
    fn test_equal_timestamps_order_by_id() {
        let mut transcript = Transcript::new();
        let request = transcript.open(1);
        let mut initial = page(1, 1, 1, 0, 1);
        initial.messages = vec![message(1, 3, 100), message(1, 1, 100), message(1, 2, 100)];
        transcript.apply(TranscriptEvent::InitialLoaded { tag: request.tag, page: initial });

        assert_eq!(ids(&transcript), (1..=3).map(MessageId::from).collect::<Vec<_>>());
    }

    #[test]
    fn test_close_makes_in_flight_responses_stale() {
        let mut transcript = Transcript::new();
        let request = transcript.open(1);
        transcript.close();

        let outcome = transcript.apply(TranscriptEvent::InitialLoaded {
            tag: request.tag,
            page: page(1, 1, 2, 0, 1),
        });
        assert_eq!(outcome, Outcome::Stale);
        assert_eq!(transcript.active_chatroom(), None);
    }
}
