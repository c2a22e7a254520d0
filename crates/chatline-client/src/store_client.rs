//! [`DocumentStore`] backed by the server's `/api/chats` and `/api/login`
//! routes.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use chatline_core::wire::{ErrorBody, LoginRequest};
use chatline_core::{ChatSession, OwnerId, SessionId, User};

use crate::controller::request_error;
use crate::error::ChatError;
use crate::persistence::DocumentStore;

pub struct HttpDocumentStore {
    client: Client,
    api_url: String,
}

impl HttpDocumentStore {
    pub fn new(client: Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }

    fn chat_url(&self, id: &SessionId) -> String {
        format!("{}/chats/{}", self.api_url, id)
    }
}

fn network(e: reqwest::Error) -> ChatError {
    ChatError::Network(e.to_string())
}

/// Turn a non-success response into `ChatError::Store`.
async fn check(resp: Response) -> Result<Response, ChatError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or(body);
    Err(ChatError::Store(format!("HTTP {status}: {detail}")))
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ChatError> {
    let bytes = resp.bytes().await.map_err(network)?;
    serde_json::from_slice(&bytes).map_err(|e| ChatError::Decode(e.to_string()))
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    #[instrument(skip_all, fields(session_id = %chat.id))]
    async fn save_chat(&self, chat: &ChatSession) -> Result<(), ChatError> {
        let resp = self
            .client
            .post(format!("{}/chats", self.api_url))
            .json(chat)
            .send()
            .await
            .map_err(network)?;
        check(resp).await?;
        debug!(messages = chat.messages.len(), "chat saved");
        Ok(())
    }

    #[instrument(skip_all, fields(session_id = %id))]
    async fn get_chat(&self, id: &SessionId) -> Result<Option<ChatSession>, ChatError> {
        let resp = self
            .client
            .get(self.chat_url(id))
            .send()
            .await
            .map_err(network)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        // A `null` body also means "no such chat".
        decode(check(resp).await?).await
    }

    #[instrument(skip_all, fields(owner_id = %owner))]
    async fn list_chats(&self, owner: &OwnerId) -> Result<Vec<ChatSession>, ChatError> {
        let resp = self
            .client
            .get(format!("{}/chats", self.api_url))
            .query(&[("userId", owner.as_str())])
            .send()
            .await
            .map_err(network)?;
        decode(check(resp).await?).await
    }

    #[instrument(skip_all, fields(session_id = %id))]
    async fn delete_chat(&self, id: &SessionId) -> Result<(), ChatError> {
        let resp = self
            .client
            .delete(self.chat_url(id))
            .send()
            .await
            .map_err(network)?;
        check(resp).await.map(|_| ())
    }

    async fn login(&self, name: &str) -> Result<User, ChatError> {
        let resp = self
            .client
            .post(format!("{}/login", self.api_url))
            .json(&LoginRequest {
                name: name.to_string(),
            })
            .send()
            .await
            .map_err(network)?;
        if !resp.status().is_success() {
            return Err(request_error(resp, "Login failed").await);
        }
        decode(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatline_core::clock::now_millis;
    use chatline_core::Message;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn store() -> (HttpDocumentStore, MockServer) {
        let server = MockServer::start().await;
        let store = HttpDocumentStore::new(Client::new(), format!("{}/api", server.uri()));
        (store, server)
    }

    fn sample() -> ChatSession {
        ChatSession::create(
            SessionId::from_raw("chat_1"),
            OwnerId::from_raw("ada"),
            vec![Message::user("Hello"), Message::assistant("Hi")],
            now_millis(),
        )
    }

    #[tokio::test]
    async fn save_posts_full_document() {
        let (store, server) = store().await;
        let chat = sample();
        Mock::given(method("POST"))
            .and(path("/api/chats"))
            .and(body_json(&chat))
            .respond_with(ResponseTemplate::new(200).set_body_json(&chat))
            .expect(1)
            .mount(&server)
            .await;

        store.save_chat(&chat).await.unwrap();
    }

    #[tokio::test]
    async fn get_maps_404_and_null_to_none() {
        let (store, server) = store().await;
        Mock::given(method("GET"))
            .and(path("/api/chats/chat_missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "chat not found" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/chats/chat_null"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(null)))
            .mount(&server)
            .await;

        assert!(store.get_chat(&SessionId::from_raw("chat_missing")).await.unwrap().is_none());
        assert!(store.get_chat(&SessionId::from_raw("chat_null")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_returns_stored_chat() {
        let (store, server) = store().await;
        let chat = sample();
        Mock::given(method("GET"))
            .and(path("/api/chats/chat_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&chat))
            .mount(&server)
            .await;

        assert_eq!(store.get_chat(&chat.id).await.unwrap(), Some(chat));
    }

    #[tokio::test]
    async fn list_passes_owner_as_query() {
        let (store, server) = store().await;
        Mock::given(method("GET"))
            .and(path("/api/chats"))
            .and(query_param("userId", "ada"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![sample()]))
            .mount(&server)
            .await;

        let chats = store.list_chats(&OwnerId::from_raw("ada")).await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].title, "Hello");
    }

    #[tokio::test]
    async fn server_failure_is_store_error() {
        let (store, server) = store().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "disk full" })))
            .mount(&server)
            .await;

        let err = store.delete_chat(&SessionId::from_raw("chat_1")).await.unwrap_err();
        assert!(matches!(err, ChatError::Store(ref m) if m.contains("500") && m.contains("disk full")));
    }

    #[tokio::test]
    async fn malformed_list_is_decode_error() {
        let (store, server) = store().await;
        Mock::given(method("GET"))
            .and(path("/api/chats"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = store.list_chats(&OwnerId::from_raw("ada")).await.unwrap_err();
        assert!(matches!(err, ChatError::Decode(_)));
    }

    #[tokio::test]
    async fn login_returns_user_or_request_error() {
        let (store, server) = store().await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .and(body_json(json!({ "name": "Ada Lovelace" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "ada-lovelace",
                "name": "Ada Lovelace"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .and(body_json(json!({ "name": "" })))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "name is required" })))
            .mount(&server)
            .await;

        let user = store.login("Ada Lovelace").await.unwrap();
        assert_eq!(user.id.as_str(), "ada-lovelace");
        assert!(user.avatar.is_none());

        let err = store.login("").await.unwrap_err();
        assert!(matches!(err, ChatError::Request { status: 400, ref message } if message == "name is required"));
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        let store = HttpDocumentStore::new(Client::new(), "http://127.0.0.1:1/api");
        let err = store.list_chats(&OwnerId::from_raw("ada")).await.unwrap_err();
        assert!(matches!(err, ChatError::Network(_)));
    }
}
