//! Outbound capability of the chat platform.
//!
//! The core never talks to the platform directly; it goes through this trait so the
//! dispatcher and admin handlers can be exercised against in-memory fakes.

use async_trait::async_trait;

use crate::error::PlatformError;
use crate::types::{Channel, ChannelId, MessageHandle};

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Look up a channel. `Ok(None)` means the channel does not exist or is not visible.
    async fn resolve_channel(&self, id: ChannelId) -> Result<Option<Channel>, PlatformError>;

    /// Post `content` to `channel`.
    async fn send(&self, channel: &Channel, content: &str) -> Result<MessageHandle, PlatformError>;

    /// Delete a previously sent message.
    async fn delete(&self, message: &MessageHandle) -> Result<(), PlatformError>;
}
