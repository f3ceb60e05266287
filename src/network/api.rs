use async_trait::async_trait;

use crate::common::{Chatroom, ChatroomId, HistoryPage, Message, UserId};
use crate::error::Result;

/// REST surface of the chat backend.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `GET /chatrooms`
    async fn list_chatrooms(&self) -> Result<Vec<Chatroom>>;

    /// `POST /chatrooms`: returns the existing room with `seller_id` or a new one.
    async fn get_or_create_chatroom(
        &self,
        seller_id: UserId,
        order_id: Option<i64>,
    ) -> Result<Chatroom>;

    /// `GET /chatrooms/{id}/messages`, the whole history at once.
    async fn fetch_history(&self, chatroom_id: ChatroomId) -> Result<Vec<Message>>;

    /// `GET /chatrooms/{id}/messages/paginated`: one page, newest first.
    async fn fetch_page(
        &self,
        chatroom_id: ChatroomId,
        page: u32,
        page_size: u32,
    ) -> Result<HistoryPage>;
}
