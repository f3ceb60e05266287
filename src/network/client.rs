use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::api::ChatApi;
use super::live::{LiveChannel, SEND_DESTINATION, SubscriptionId, chatroom_topic};
use crate::common::{
    ChatCommand, ChatEvent, Chatroom, ChatroomId, HistoryPage, MessageType, OutgoingMessage,
    UserId,
};
use crate::error::{ChatError, Result};
use crate::storage::{KeyValueStore, ReadStateStore, SESSION_TOKEN_KEY};
use crate::transcript::{FetchKind, FetchRequest, Outcome, Transcript, TranscriptEvent};
use crate::ui::ChatViewState;

const INBOUND_BUFFER: usize = 100;

/// Who is talking and how much history one page holds.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub user_id: UserId,
    pub sender_name: String,
    pub page_size: u32,
    pub read_state_key: String,
}

/// Results and deliveries fed back into the client loop.
#[derive(Debug)]
enum Inbound {
    Page {
        request: FetchRequest,
        result: Result<HistoryPage>,
    },
    Chatrooms(Result<Vec<Chatroom>>),
    Contacted(Result<Chatroom>),
    Transcript(TranscriptEvent),
}

struct ActiveSubscription {
    id: SubscriptionId,
    forwarder: JoinHandle<()>,
}

/// Owns the transcript of the active conversation and is its only mutator:
/// UI commands, fetch results and live deliveries are all handled on this
/// loop, one at a time.
pub struct ChatClient<A, L, S> {
    api: Arc<A>,
    live: Arc<L>,
    store: S,
    read_state: ReadStateStore<S>,
    settings: ClientSettings,
    transcript: Transcript,
    view: ChatViewState,
    subscription: Option<ActiveSubscription>,
    /// Set by a closed→open transition, consumed when the initial page lands.
    mark_read_pending: bool,
    event_sender: mpsc::Sender<ChatEvent>,
    command_receiver: mpsc::Receiver<ChatCommand>,
    inbound_tx: mpsc::Sender<Inbound>,
    inbound_rx: mpsc::Receiver<Inbound>,
    connection: watch::Receiver<bool>,
}

impl<A, L, S> ChatClient<A, L, S>
where
    A: ChatApi + 'static,
    L: LiveChannel + 'static,
    S: KeyValueStore + Clone + 'static,
{
    pub fn new(
        api: Arc<A>,
        live: Arc<L>,
        store: S,
        settings: ClientSettings,
        event_sender: mpsc::Sender<ChatEvent>,
        command_receiver: mpsc::Receiver<ChatCommand>,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        let read_state = ReadStateStore::with_key(store.clone(), settings.read_state_key.clone());
        let connection = live.connection_status();
        let mut view = ChatViewState::new();
        view.set_connected(live.is_connected());

        Self {
            api,
            live,
            store,
            read_state,
            settings,
            transcript: Transcript::new(),
            view,
            subscription: None,
            mark_read_pending: false,
            event_sender,
            command_receiver,
            inbound_tx,
            inbound_rx,
            connection,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        log::info!("Chat client loop started for user {}", self.settings.user_id);
        self.emit(ChatEvent::ConnectionChanged(self.live.is_connected()))
            .await;

        let mut watching_connection = true;
        loop {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => break,
                    }
                }
                Some(inbound) = self.inbound_rx.recv() => {
                    self.handle_inbound(inbound).await;
                }
                changed = self.connection.changed(), if watching_connection => {
                    match changed {
                        Ok(()) => {
                            let connected = *self.connection.borrow_and_update();
                            self.handle_connection(connected).await;
                        }
                        Err(_) => {
                            log::warn!("Live channel dropped its connection status sender");
                            watching_connection = false;
                        }
                    }
                }
            }
        }

        self.unsubscribe_active().await;
        log::info!("Chat client loop stopped");
        Ok(())
    }

    pub async fn handle_command(&mut self, command: ChatCommand) {
        match command {
            ChatCommand::Open(chatroom_id) => self.open_chatroom(chatroom_id).await,
            ChatCommand::Close => {
                self.unsubscribe_active().await;
                self.transcript.close();
                self.view.close_conversation();
            }
            ChatCommand::LoadOlder => match self.transcript.request_older() {
                Some(request) => self.spawn_fetch(request),
                None => log::debug!("No older page to load"),
            },
            ChatCommand::Send(content) => self.send_message(content).await,
            ChatCommand::RefreshChatrooms => {
                let api = Arc::clone(&self.api);
                self.spawn_inbound(async move { Inbound::Chatrooms(api.list_chatrooms().await) });
            }
            ChatCommand::Contact { seller_id, order_id } => {
                let api = Arc::clone(&self.api);
                self.spawn_inbound(async move {
                    Inbound::Contacted(api.get_or_create_chatroom(seller_id, order_id).await)
                });
            }
            ChatCommand::SetChatrooms(chatrooms) => {
                self.view.set_chatrooms(chatrooms);
                self.emit(ChatEvent::ChatroomsUpdated(self.view.chatrooms.clone()))
                    .await;
            }
        }
    }

    /// Wait for one fetch result or live delivery and apply it. Only call
    /// while something is in flight; otherwise this waits indefinitely.
    pub async fn process_next(&mut self) {
        if let Some(inbound) = self.inbound_rx.recv().await {
            self.handle_inbound(inbound).await;
        }
    }

    async fn handle_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Page { request, result } => self.handle_page(request, result).await,
            Inbound::Chatrooms(Ok(chatrooms)) => {
                log::info!("Loaded {} chatrooms", chatrooms.len());
                self.view.set_chatrooms(chatrooms);
                self.emit(ChatEvent::ChatroomsUpdated(self.view.chatrooms.clone()))
                    .await;
            }
            Inbound::Chatrooms(Err(err)) => {
                self.report_error(err, "Could not load conversations").await;
            }
            Inbound::Contacted(Ok(chatroom)) => {
                let chatroom_id = chatroom.chatroom_id;
                self.view.upsert_chatroom(chatroom);
                self.emit(ChatEvent::ChatroomsUpdated(self.view.chatrooms.clone()))
                    .await;
                self.open_chatroom(chatroom_id).await;
            }
            Inbound::Contacted(Err(err)) => {
                self.report_error(err, "Could not start the conversation").await;
            }
            Inbound::Transcript(event) => self.handle_transcript_event(event).await,
        }
    }

    async fn handle_page(&mut self, request: FetchRequest, result: Result<HistoryPage>) {
        let tag = request.tag;
        let page = match result {
            Ok(page) => page,
            Err(err) => {
                let outcome = self.transcript.apply(TranscriptEvent::FetchFailed {
                    tag,
                    kind: request.kind,
                });
                if outcome == Outcome::Stale {
                    log::debug!("Ignoring failure of stale fetch for chatroom {}", tag.chatroom_id);
                } else {
                    self.report_error(err, "Could not load messages").await;
                }
                return;
            }
        };

        let event = match request.kind {
            FetchKind::Initial => TranscriptEvent::InitialLoaded { tag, page },
            FetchKind::Older => TranscriptEvent::OlderLoaded { tag, page },
        };
        self.handle_transcript_event(event).await;
    }

    async fn handle_transcript_event(&mut self, event: TranscriptEvent) {
        let live_message = match &event {
            TranscriptEvent::LiveReceived(message) => Some(message.clone()),
            _ => None,
        };

        match self.transcript.apply(event) {
            Outcome::Replaced(count) => {
                let chatroom_id = self.transcript.active_chatroom().unwrap_or_default();
                log::info!("Loaded {count} messages for chatroom {chatroom_id}");
                if std::mem::take(&mut self.mark_read_pending) {
                    self.mark_transcript_read();
                }
                self.emit(ChatEvent::TranscriptLoaded {
                    chatroom_id,
                    messages: self.transcript.messages().to_vec(),
                    cursor: self.transcript.cursor(),
                })
                .await;
            }
            Outcome::Prepended(added) => {
                let chatroom_id = self.transcript.active_chatroom().unwrap_or_default();
                self.emit(ChatEvent::OlderPrepended {
                    chatroom_id,
                    added,
                    cursor: self.transcript.cursor(),
                })
                .await;
            }
            Outcome::Appended => {
                if let Some(message) = live_message {
                    self.emit(ChatEvent::MessageAppended(message)).await;
                }
            }
            Outcome::Duplicate => log::debug!("Dropped duplicate live message"),
            Outcome::RoutedToUnread(chatroom_id) => {
                let unread = self.view.bump_unread(chatroom_id);
                self.emit(ChatEvent::UnreadChanged { chatroom_id, unread })
                    .await;
            }
            Outcome::Stale => log::debug!("Discarded stale page"),
            Outcome::Failed(kind) => log::debug!("{kind:?} fetch failed"),
        }
    }

    async fn open_chatroom(&mut self, chatroom_id: ChatroomId) {
        self.unsubscribe_active().await;

        match self.live.subscribe(&chatroom_topic(chatroom_id)).await {
            Ok(subscription) => {
                let id = subscription.id;
                let mut messages = subscription.messages;
                let inbound = self.inbound_tx.clone();
                let forwarder = tokio::spawn(async move {
                    while let Some(message) = messages.recv().await {
                        let event = Inbound::Transcript(TranscriptEvent::LiveReceived(message));
                        if inbound.send(event).await.is_err() {
                            break;
                        }
                    }
                });
                self.subscription = Some(ActiveSubscription { id, forwarder });
            }
            Err(err) => {
                log::warn!("Failed to subscribe to chatroom {chatroom_id}: {err}");
            }
        }

        if self.view.open_conversation(chatroom_id) {
            self.mark_read_pending = true;
        }
        let request = self.transcript.open(chatroom_id);
        self.spawn_fetch(request);
    }

    async fn unsubscribe_active(&mut self) {
        if let Some(active) = self.subscription.take() {
            self.live.unsubscribe(active.id).await;
            active.forwarder.abort();
        }
    }

    async fn send_message(&mut self, content: String) {
        let content = content.trim();
        if content.is_empty() {
            return;
        }
        let Some(chatroom_id) = self.transcript.active_chatroom() else {
            self.toast("Open a conversation before sending").await;
            return;
        };
        if !self.live.is_connected() {
            self.toast("Not connected; message was not sent").await;
            return;
        }

        let payload = OutgoingMessage {
            chatroom_id,
            sender_id: self.settings.user_id,
            sender_name: self.settings.sender_name.clone(),
            content: content.to_string(),
            message_type: MessageType::Text,
        };
        // no optimistic append: the broker echoes the message back
        if let Err(err) = self.live.publish(SEND_DESTINATION, &payload).await {
            log::warn!("Publish to chatroom {chatroom_id} failed: {err}");
            self.toast(format!("Message was not sent: {err}")).await;
        }
    }

    async fn handle_connection(&mut self, connected: bool) {
        if self.view.set_connected(connected) {
            log::info!("Live channel {}", if connected { "connected" } else { "disconnected" });
            self.emit(ChatEvent::ConnectionChanged(connected)).await;
        }
    }

    fn mark_transcript_read(&self) {
        let ids: Vec<_> = self.transcript.ids().cloned().collect();
        match self.read_state.mark_read(ids) {
            Ok(added) => log::debug!("Marked {added} messages read"),
            Err(err) => log::warn!("Failed to persist read state: {err}"),
        }
    }

    fn spawn_fetch(&self, request: FetchRequest) {
        let api = Arc::clone(&self.api);
        let page_size = self.settings.page_size;
        self.spawn_inbound(async move {
            let result = api
                .fetch_page(request.tag.chatroom_id, request.page, page_size)
                .await;
            Inbound::Page { request, result }
        });
    }

    fn spawn_inbound<F>(&self, task: F)
    where
        F: std::future::Future<Output = Inbound> + Send + 'static,
    {
        let inbound = self.inbound_tx.clone();
        tokio::spawn(async move {
            let result = task.await;
            if inbound.send(result).await.is_err() {
                log::debug!("Chat client stopped before a result was delivered");
            }
        });
    }

    async fn report_error(&mut self, err: ChatError, context: &str) {
        if err.is_terminal() {
            log::warn!("{context}: {err}; clearing session");
            if let Err(store_err) = self.store.remove(SESSION_TOKEN_KEY) {
                log::error!("Failed to clear session token: {store_err}");
            }
            self.emit(ChatEvent::SessionExpired).await;
            return;
        }

        log::warn!("{context}: {err}");
        self.toast(format!("{context}: {err}")).await;
    }

    async fn toast(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.view.push_toast(message.clone());
        self.emit(ChatEvent::Toast(message)).await;
    }

    async fn emit(&self, event: ChatEvent) {
        if let Err(err) = self.event_sender.send(event).await {
            log::warn!("Failed to notify UI: {err}");
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn view(&self) -> &ChatViewState {
        &self.view
    }

    pub fn read_state(&self) -> &ReadStateStore<S> {
        &self.read_state
    }
}
