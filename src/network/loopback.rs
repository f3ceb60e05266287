use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, mpsc, watch};
use uuid::Uuid;

use super::live::{LiveChannel, SEND_DESTINATION, Subscription, SubscriptionId, chatroom_topic};
use crate::common::{Message, MessageId, OutgoingMessage};
use crate::error::{ChatError, Result};

const SUBSCRIPTION_BUFFER: usize = 100;

type Subscribers = HashMap<String, Vec<(SubscriptionId, mpsc::Sender<Message>)>>;

/// In-process broker: published messages are stamped with a fresh id and
/// echoed to the chatroom topic, the way the real broker answers a send.
pub struct LoopbackBroker {
    subscribers: Mutex<Subscribers>,
    next_id: AtomicU64,
    connected: watch::Sender<bool>,
}

impl LoopbackBroker {
    pub fn new() -> Self {
        let (connected, _) = watch::channel(true);
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            connected,
        }
    }

    pub fn set_connected(&self, connected: bool) {
        let previous = self.connected.send_replace(connected);
        if previous != connected {
            log::info!("Loopback broker {}", if connected { "connected" } else { "disconnected" });
        }
    }

    /// Push `message` to every subscriber of `topic`; returns how many got it.
    pub async fn deliver(&self, topic: &str, message: Message) -> usize {
        let targets: Vec<mpsc::Sender<Message>> = {
            let subscribers = self.subscribers.lock().await;
            subscribers
                .get(topic)
                .map(|subs| subs.iter().map(|(_, tx)| tx.clone()).collect())
                .unwrap_or_default()
        };

        let mut delivered = 0;
        for tx in targets {
            match tx.send(message.clone()).await {
                Ok(()) => delivered += 1,
                Err(err) => log::debug!("Dropping delivery to closed subscriber on {topic}: {err}"),
            }
        }
        delivered
    }

    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers
            .lock()
            .await
            .get(topic)
            .map_or(0, |subs| subs.len())
    }
}

impl Default for LoopbackBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LiveChannel for LoopbackBroker {
    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.subscribers
            .lock()
            .await
            .entry(topic.to_string())
            .or_default()
            .push((id, tx));
        log::debug!("Subscribed {id} to {topic}");

        Ok(Subscription {
            id,
            topic: topic.to_string(),
            messages: rx,
        })
    }

    async fn unsubscribe(&self, id: SubscriptionId) {
        let mut subscribers = self.subscribers.lock().await;
        for subs in subscribers.values_mut() {
            subs.retain(|(sub_id, _)| *sub_id != id);
        }
        subscribers.retain(|_, subs| !subs.is_empty());
        log::debug!("Unsubscribed {id}");
    }

    async fn publish(&self, destination: &str, payload: &OutgoingMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(ChatError::Disconnected);
        }
        if destination != SEND_DESTINATION {
            return Err(ChatError::transport(format!("unknown destination `{destination}`")));
        }

        let message = Message {
            id: MessageId::Text(Uuid::new_v4().to_string()),
            chatroom_id: payload.chatroom_id,
            sender_id: payload.sender_id,
            sender_name: Some(payload.sender_name.clone()),
            content: payload.content.clone(),
            message_type: payload.message_type.clone(),
            created_at: Utc::now(),
        };
        self.deliver(&chatroom_topic(payload.chatroom_id), message).await;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    fn connection_status(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }
}
