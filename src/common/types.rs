use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ChatroomId = i64;
pub type UserId = i64;

/// Opaque message/notification identifier. The backend emits numbers, the
/// loopback transport emits uuids; both compare deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Num(i64),
    Text(String),
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self::Num(id)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_string())
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self::Text(id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    Other(String),
}

impl From<String> for MessageType {
    fn from(kind: String) -> Self {
        match kind.to_ascii_uppercase().as_str() {
            "TEXT" => Self::Text,
            "IMAGE" => Self::Image,
            "FILE" => Self::File,
            _ => Self::Other(kind),
        }
    }
}

impl From<MessageType> for String {
    fn from(kind: MessageType) -> Self {
        match kind {
            MessageType::Text => "TEXT".to_string(),
            MessageType::Image => "IMAGE".to_string(),
            MessageType::File => "FILE".to_string(),
            MessageType::Other(kind) => kind,
        }
    }
}

/// One chat message as delivered by REST history or the live channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub chatroom_id: ChatroomId,
    pub sender_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Transcript ordering: chronological, ties broken by id.
    pub fn order_cmp(&self, other: &Message) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Conversation summary from `GET /chatrooms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chatroom {
    pub chatroom_id: ChatroomId,
    #[serde(default)]
    pub other_user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_message_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCursor {
    pub current_page: u32,
    pub total_pages: u32,
}

impl PageCursor {
    pub fn has_older(&self) -> bool {
        self.current_page + 1 < self.total_pages
    }
}

/// One page of `GET /chatrooms/{id}/messages/paginated`, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    #[serde(default)]
    pub messages: Vec<Message>,
    pub pagination: PageCursor,
}

impl HistoryPage {
    /// Reverse the newest-first page and order it within itself.
    pub fn into_chronological(self) -> (Vec<Message>, PageCursor) {
        let mut messages = self.messages;
        messages.reverse();
        messages.sort_by(Message::order_cmp);
        (messages, self.pagination)
    }
}

/// Payload published to `/app/chat.sendMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub chatroom_id: ChatroomId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub content: String,
    pub message_type: MessageType,
}

/// Backend timestamps arrive either as RFC 3339 or as zone-less local date
/// times, which are taken as UTC.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, de::Error};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp `{raw}`")))
    }

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid timestamp `{raw}`"))),
            None => Ok(None),
        }
    }
}
