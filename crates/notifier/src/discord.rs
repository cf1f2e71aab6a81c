//! Discord REST implementation of [`ChatPlatform`].
//!
//! Only the three calls the dispatcher needs: fetch a channel, create a message,
//! delete a message. Gateway connection and interaction handling live elsewhere.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use hourbell_common::error::PlatformError;
use hourbell_common::platform::ChatPlatform;
use hourbell_common::types::{Channel, ChannelId, MessageHandle};

/// Per-request timeout for Discord API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    /// Snowflake ids are serialized as strings.
    id: String,
}

/// Thin Discord REST client authenticated with a bot token.
pub struct DiscordRest {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl DiscordRest {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Result<Self, PlatformError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PlatformError::Unexpected(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.token)
    }

    /// Map a non-success HTTP status onto the platform error classes.
    pub fn classify_status(status: StatusCode, body: &str) -> PlatformError {
        let detail = format!("HTTP {}: {}", status.as_u16(), body);
        match status {
            StatusCode::NOT_FOUND => PlatformError::NotFound(detail),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformError::PermissionDenied(detail),
            StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => PlatformError::Transient(detail),
            s if s.is_server_error() => PlatformError::Transient(detail),
            _ => PlatformError::Unexpected(detail),
        }
    }

    async fn error_from_response(response: reqwest::Response) -> PlatformError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Self::classify_status(status, &body)
    }
}

fn transport_error(e: reqwest::Error) -> PlatformError {
    PlatformError::Transient(format!("request failed: {e}"))
}

#[async_trait]
impl ChatPlatform for DiscordRest {
    async fn resolve_channel(&self, id: ChannelId) -> Result<Option<Channel>, PlatformError> {
        if !id.is_set() {
            return Ok(None);
        }

        let response = self
            .client
            .get(self.url(&format!("/channels/{id}")))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_success() {
            return Ok(Some(Channel { id }));
        }

        match Self::error_from_response(response).await {
            PlatformError::NotFound(_) => Ok(None),
            other => Err(other),
        }
    }

    async fn send(&self, channel: &Channel, content: &str) -> Result<MessageHandle, PlatformError> {
        let body = serde_json::json!({
            "content": content,
            "allowed_mentions": { "parse": ["users"] },
        });

        let response = self
            .client
            .post(self.url(&format!("/channels/{}/messages", channel.id)))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let created: CreatedMessage = response
            .json()
            .await
            .map_err(|e| PlatformError::Unexpected(format!("invalid message response: {e}")))?;
        let message_id = created
            .id
            .parse()
            .map_err(|_| PlatformError::Unexpected(format!("invalid message id '{}'", created.id)))?;

        Ok(MessageHandle {
            channel_id: channel.id,
            message_id,
        })
    }

    async fn delete(&self, message: &MessageHandle) -> Result<(), PlatformError> {
        let response = self
            .client
            .delete(self.url(&format!(
                "/channels/{}/messages/{}",
                message.channel_id, message.message_id
            )))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_success() {
            return Ok(());
        }
        Err(Self::error_from_response(response).await)
    }
}
