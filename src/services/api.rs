//! REST collaborator interface.
//!
//! The mutation coordinator only sees the [`ChatApi`] trait; the server's
//! actual HTTP surface is wrapped by [`HttpChatApi`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::{
    ChatMessage, Conversation, ConversationKind, ConversationPatch, MessageKind, Reaction,
};
use crate::error::{ChatError, Result};

/// Payload for creating a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub kind: ConversationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub participant_ids: Vec<String>,
}

/// Payload for sending a message. `client_ref` carries the provisional
/// local id so the request context stays correlated with the optimistic
/// cache entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub conversation_id: String,
    pub content: String,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub client_ref: String,
}

/// Request/response operations consumed by the mutation coordinator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn create_conversation(&self, request: CreateConversationRequest)
        -> Result<Conversation>;
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;
    async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation>;
    async fn update_conversation(
        &self,
        conversation_id: &str,
        patch: ConversationPatch,
    ) -> Result<Conversation>;
    async fn list_messages(
        &self,
        conversation_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<ChatMessage>>;
    async fn send_message(&self, request: SendMessageRequest) -> Result<ChatMessage>;
    async fn update_message(&self, message_id: &str, content: &str) -> Result<ChatMessage>;
    async fn delete_message(&self, message_id: &str) -> Result<()>;
    async fn mark_message_read(&self, message_id: &str) -> Result<()>;
    async fn mark_conversation_read(&self, conversation_id: &str) -> Result<()>;
    async fn add_reaction(&self, message_id: &str, emoji: &str) -> Result<Reaction>;
    async fn remove_reaction(&self, message_id: &str, reaction_id: &str) -> Result<()>;
    async fn find_or_create_direct(&self, user_id: &str) -> Result<Conversation>;
    async fn get_unread_count(&self) -> Result<u32>;
}

// ── HTTP implementation ────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnreadCountResponse {
    count: u32,
}

/// `reqwest` implementation of [`ChatApi`].
pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpChatApi {
    pub fn new(base_url: &str, token: &str, timeout: std::time::Duration) -> Result<Self> {
        let parsed =
            url::Url::parse(base_url).map_err(|e| ChatError::Config(format!("API URL: {}", e)))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.token)
    }

    async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ChatError::Api(format!("HTTP {}: {}", status, body)))
        }
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn create_conversation(
        &self,
        request: CreateConversationRequest,
    ) -> Result<Conversation> {
        let response = self
            .request(reqwest::Method::POST, "conversations")
            .json(&request)
            .send()
            .await?;
        Ok(Self::expect_success(response).await?.json().await?)
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let response = self
            .request(reqwest::Method::GET, "conversations")
            .send()
            .await?;
        Ok(Self::expect_success(response).await?.json().await?)
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation> {
        let path = format!("conversations/{}", urlencoding::encode(conversation_id));
        let response = self.request(reqwest::Method::GET, &path).send().await?;
        Ok(Self::expect_success(response).await?.json().await?)
    }

    async fn update_conversation(
        &self,
        conversation_id: &str,
        patch: ConversationPatch,
    ) -> Result<Conversation> {
        let path = format!("conversations/{}", urlencoding::encode(conversation_id));
        let response = self
            .request(reqwest::Method::PATCH, &path)
            .json(&patch)
            .send()
            .await?;
        Ok(Self::expect_success(response).await?.json().await?)
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<ChatMessage>> {
        let path = format!(
            "conversations/{}/messages",
            urlencoding::encode(conversation_id)
        );
        let response = self
            .request(reqwest::Method::GET, &path)
            .query(&[("offset", offset), ("limit", limit)])
            .send()
            .await?;
        Ok(Self::expect_success(response).await?.json().await?)
    }

    async fn send_message(&self, request: SendMessageRequest) -> Result<ChatMessage> {
        let path = format!(
            "conversations/{}/messages",
            urlencoding::encode(&request.conversation_id)
        );
        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&request)
            .send()
            .await?;
        Ok(Self::expect_success(response).await?.json().await?)
    }

    async fn update_message(&self, message_id: &str, content: &str) -> Result<ChatMessage> {
        let path = format!("messages/{}", urlencoding::encode(message_id));
        let response = self
            .request(reqwest::Method::PATCH, &path)
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await?;
        Ok(Self::expect_success(response).await?.json().await?)
    }

    async fn delete_message(&self, message_id: &str) -> Result<()> {
        let path = format!("messages/{}", urlencoding::encode(message_id));
        let response = self.request(reqwest::Method::DELETE, &path).send().await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn mark_message_read(&self, message_id: &str) -> Result<()> {
        let path = format!("messages/{}/read", urlencoding::encode(message_id));
        let response = self.request(reqwest::Method::POST, &path).send().await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn mark_conversation_read(&self, conversation_id: &str) -> Result<()> {
        let path = format!("conversations/{}/read", urlencoding::encode(conversation_id));
        let response = self.request(reqwest::Method::POST, &path).send().await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn add_reaction(&self, message_id: &str, emoji: &str) -> Result<Reaction> {
        let path = format!("messages/{}/reactions", urlencoding::encode(message_id));
        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&serde_json::json!({ "emoji": emoji }))
            .send()
            .await?;
        Ok(Self::expect_success(response).await?.json().await?)
    }

    async fn remove_reaction(&self, message_id: &str, reaction_id: &str) -> Result<()> {
        let path = format!(
            "messages/{}/reactions/{}",
            urlencoding::encode(message_id),
            urlencoding::encode(reaction_id)
        );
        let response = self.request(reqwest::Method::DELETE, &path).send().await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn find_or_create_direct(&self, user_id: &str) -> Result<Conversation> {
        let response = self
            .request(reqwest::Method::POST, "conversations/direct")
            .json(&serde_json::json!({ "userId": user_id }))
            .send()
            .await?;
        Ok(Self::expect_success(response).await?.json().await?)
    }

    async fn get_unread_count(&self) -> Result<u32> {
        let response = self
            .request(reqwest::Method::GET, "messages/unread-count")
            .send()
            .await?;
        let body: UnreadCountResponse = Self::expect_success(response).await?.json().await?;
        Ok(body.count)
    }
}
