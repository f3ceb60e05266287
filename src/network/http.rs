use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::api::ChatApi;
use crate::common::{Chatroom, ChatroomId, HistoryPage, Message, UserId};
use crate::error::{ChatError, Result};

/// Keys a response envelope may carry next to `data`.
const ENVELOPE_KEYS: &[&str] = &["data", "message", "status", "success", "code"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateChatroomRequest {
    seller_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    order_id: Option<i64>,
}

/// reqwest-backed [`ChatApi`].
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self::with_client(Client::new(), base_url, token)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url, token }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ChatError::Unauthorized);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ChatError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let value: Value = response.json().await?;
    Ok(serde_json::from_value(unwrap_envelope(value))?)
}

/// Unwrap `{ "data": ..., "message": ... }` style envelopes; pass anything
/// else through untouched.
fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map)
            if map.contains_key("data")
                && map.keys().all(|key| ENVELOPE_KEYS.contains(&key.as_str())) =>
        {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[async_trait]
impl ChatApi for RestClient {
    async fn list_chatrooms(&self) -> Result<Vec<Chatroom>> {
        self.send(self.request(Method::GET, "/chatrooms")).await
    }

    async fn get_or_create_chatroom(
        &self,
        seller_id: UserId,
        order_id: Option<i64>,
    ) -> Result<Chatroom> {
        let body = CreateChatroomRequest { seller_id, order_id };
        self.send(self.request(Method::POST, "/chatrooms").json(&body))
            .await
    }

    async fn fetch_history(&self, chatroom_id: ChatroomId) -> Result<Vec<Message>> {
        let path = format!("/chatrooms/{chatroom_id}/messages");
        self.send(self.request(Method::GET, &path)).await
    }

    async fn fetch_page(
        &self,
        chatroom_id: ChatroomId,
        page: u32,
        page_size: u32,
    ) -> Result<HistoryPage> {
        if page_size == 0 {
            return Err(ChatError::invalid_page("page size must be positive"));
        }

        log::debug!("Fetching page {page} (size {page_size}) of chatroom {chatroom_id}");
        let path = format!("/chatrooms/{chatroom_id}/messages/paginated");
        let builder = self
            .request(Method::GET, &path)
            .query(&[("page", page), ("size", page_size)]);
        self.send(builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_is_unwrapped() {
        let wrapped = json!({ "success": true, "data": [1, 2] });
        assert_eq!(unwrap_envelope(wrapped), json!([1, 2]));
    }

    #[test]
    fn test_payload_with_data_field_is_kept() {
        let payload = json!({ "chatroomId": 1, "data": "x" });
        assert_eq!(unwrap_envelope(payload.clone()), payload);

        let list = json!([{ "chatroomId": 1 }]);
        assert_eq!(unwrap_envelope(list.clone()), list);
    }

    #[test]
    fn test_wrapped_history_page_decodes() {
        let wrapped = json!({
            "data": {
                "messages": [{
                    "id": 2,
                    "chatroomId": 4,
                    "senderId": 1,
                    "content": "hi",
                    "messageType": "TEXT",
                    "createdAt": "2024-05-01T08:30:00Z"
                }],
                "pagination": { "currentPage": 0, "totalPages": 1 }
            }
        });
        let page: HistoryPage = serde_json::from_value(unwrap_envelope(wrapped)).unwrap();
        assert_eq!(page.messages.len(), 1);
        assert!(!page.pagination.has_older());
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = RestClient::new("http://localhost:8080/api/", None);
        assert_eq!(client.base_url(), "http://localhost:8080/api");
    }

    #[tokio::test]
    async fn test_zero_page_size_is_rejected_without_request() {
        // unroutable base url: reaching the network would fail differently
        let client = RestClient::new("http://127.0.0.1:9", None);
        let err = client.fetch_page(1, 0, 0).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidPage(_)));
    }
}
