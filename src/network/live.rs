use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::common::{ChatroomId, Message, OutgoingMessage};
use crate::error::Result;

/// Broker destination accepting outgoing chat messages.
pub const SEND_DESTINATION: &str = "/app/chat.sendMessage";

pub type SubscriptionId = u64;

/// Topic carrying every message of one chatroom.
pub fn chatroom_topic(chatroom_id: ChatroomId) -> String {
    format!("/topic/chatroom/{chatroom_id}")
}

/// Decoded messages of one topic, at most once per network delivery and
/// without ordering guarantees.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub topic: String,
    pub messages: mpsc::Receiver<Message>,
}

/// Publish/subscribe transport. Framing, connection and reconnect policy
/// belong to the implementation.
#[async_trait]
pub trait LiveChannel: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<Subscription>;

    async fn unsubscribe(&self, id: SubscriptionId);

    /// Fire-and-forget; the sent message comes back through the topic.
    async fn publish(&self, destination: &str, payload: &OutgoingMessage) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Connected/disconnected transitions.
    fn connection_status(&self) -> watch::Receiver<bool>;
}
