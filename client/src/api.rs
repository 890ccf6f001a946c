//! Request/response wrapper over the messaging surface.
//! Sending a message goes through here, not over the realtime channel.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use crate::error::ClientError;
use crate::types::{ConversationDetail, ConversationSummary, MessageRecord};

pub struct MessagingApi {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl MessagingApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.into(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post_no_content<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ClientError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
            });
        }
        Ok(response.json().await?)
    }

    /// GET /api/conversations
    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>, ClientError> {
        self.get_json("/api/conversations").await
    }

    /// GET /api/conversations/{id}?limit&offset
    pub async fn conversation(
        &self,
        conversation_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<ConversationDetail, ClientError> {
        self.get_json(&format!(
            "/api/conversations/{}?limit={}&offset={}",
            conversation_id, limit, offset
        ))
        .await
    }

    /// POST /api/conversations
    pub async fn create_conversation(
        &self,
        title: Option<&str>,
        participant_ids: &[String],
    ) -> Result<ConversationSummary, ClientError> {
        self.post_json(
            "/api/conversations",
            &json!({ "title": title, "participant_ids": participant_ids }),
        )
        .await
    }

    /// POST /api/conversations/direct
    pub async fn direct_conversation(
        &self,
        other_user_id: &str,
    ) -> Result<ConversationSummary, ClientError> {
        self.post_json(
            "/api/conversations/direct",
            &json!({ "other_user_id": other_user_id }),
        )
        .await
    }

    /// GET /api/sessions/{booking_id}/conversation
    pub async fn booking_conversation(
        &self,
        booking_id: &str,
    ) -> Result<ConversationDetail, ClientError> {
        self.get_json(&format!("/api/sessions/{}/conversation", booking_id))
            .await
    }

    /// POST /api/conversations/{id}/messages
    pub async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        content_type: Option<&str>,
    ) -> Result<MessageRecord, ClientError> {
        self.post_json(
            &format!("/api/conversations/{}/messages", conversation_id),
            &json!({ "content": content, "content_type": content_type }),
        )
        .await
    }

    /// POST /api/conversations/{id}/participants
    pub async fn add_participant(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<(), ClientError> {
        self.post_no_content(
            &format!("/api/conversations/{}/participants", conversation_id),
            &json!({ "user_id": user_id }),
        )
        .await
    }

    /// POST /api/conversations/{id}/leave
    pub async fn leave_conversation(&self, conversation_id: &str) -> Result<(), ClientError> {
        self.post_no_content(
            &format!("/api/conversations/{}/leave", conversation_id),
            &json!({}),
        )
        .await
    }
}
