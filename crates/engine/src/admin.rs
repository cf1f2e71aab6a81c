//! Administrative operations exposed to the command layer.
//!
//! Every operation is gated by an injected [`Authorizer`]; the engine has no notion
//! of roles or identities beyond what that predicate decides. Validation happens
//! before any `RuntimeConfig` field is touched.

use std::sync::Arc;

use chrono::{FixedOffset, Utc};

use hourbell_common::config::{MAX_RETENTION_SECONDS, RuntimeConfig};
use hourbell_common::error::{AppError, PlatformError};
use hourbell_common::platform::ChatPlatform;
use hourbell_common::types::{ChannelId, MessageJob, SubscriptionType};
use hourbell_notifier::JobSink;

use crate::renderer;
use crate::subscription::SubscriptionStore;

/// Capability predicate: may this caller run administrative commands?
pub trait Authorizer: Send + Sync {
    type Caller: ?Sized;

    fn is_authorized(&self, caller: &Self::Caller) -> bool;
}

pub struct AdminService<A: Authorizer> {
    authorizer: A,
    config: Arc<RuntimeConfig>,
    platform: Arc<dyn ChatPlatform>,
    store: Arc<SubscriptionStore>,
    sink: Arc<dyn JobSink>,
    timezone: FixedOffset,
}

impl<A: Authorizer> AdminService<A> {
    pub fn new(
        authorizer: A,
        config: Arc<RuntimeConfig>,
        platform: Arc<dyn ChatPlatform>,
        store: Arc<SubscriptionStore>,
        sink: Arc<dyn JobSink>,
        timezone: FixedOffset,
    ) -> Self {
        Self {
            authorizer,
            config,
            platform,
            store,
            sink,
            timezone,
        }
    }

    fn authorize(&self, caller: &A::Caller, operation: &str) -> Result<(), AppError> {
        if self.authorizer.is_authorized(caller) {
            return Ok(());
        }
        tracing::warn!(operation, "Unauthorized administrative request");
        Err(AppError::Unauthorized(format!("{operation} requires the admin role")))
    }

    /// Check that the platform can see `id`.
    async fn require_channel(&self, id: ChannelId) -> Result<(), AppError> {
        match self.platform.resolve_channel(id).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) | Err(PlatformError::NotFound(_)) => {
                Err(AppError::ChannelNotFound(format!("channel {id} not found")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Point the hourly alerts at another channel.
    pub async fn set_active_channel(&self, caller: &A::Caller, id: ChannelId) -> Result<(), AppError> {
        self.authorize(caller, "set_channel")?;
        self.require_channel(id).await?;

        let previous = self.config.active_channel();
        self.config.set_active_channel(id);
        tracing::info!(previous = %previous, channel_id = %id, "Alert channel changed");
        Ok(())
    }

    pub async fn set_debug_channel(&self, caller: &A::Caller, id: ChannelId) -> Result<(), AppError> {
        self.authorize(caller, "set_debug_channel")?;
        self.require_channel(id).await?;

        let previous = self.config.debug_channel();
        self.config.set_debug_channel(id);
        tracing::info!(previous = %previous, channel_id = %id, "Debug channel changed");
        Ok(())
    }

    /// Change how long alert messages stay up. Accepts `0..=21600`.
    pub fn set_retention_seconds(&self, caller: &A::Caller, seconds: i64) -> Result<(), AppError> {
        self.authorize(caller, "set_retention_seconds")?;

        let seconds = u64::try_from(seconds).map_err(|_| {
            AppError::ConfigurationInvalid(format!(
                "retention must be within 0..={MAX_RETENTION_SECONDS} seconds, got {seconds}"
            ))
        })?;
        self.config.set_retention_seconds(seconds)?;

        tracing::info!(retention_seconds = seconds, "Message retention changed");
        Ok(())
    }

    /// Queue a sample on-time alert for the current on-time recipients, to the debug
    /// channel when one is set and to the alert channel otherwise.
    ///
    /// Returns the acknowledgement to show the caller.
    pub fn test_alert(&self, caller: &A::Caller) -> Result<String, AppError> {
        self.authorize(caller, "test_alert")?;

        let now = Utc::now().with_timezone(&self.timezone);
        let recipients = self.store.recipients_for(SubscriptionType::OnTime);
        let content = renderer::render_on_time(&now, &recipients);

        let debug_channel = self.config.debug_channel();
        let target = if debug_channel.is_set() {
            debug_channel
        } else {
            self.config.active_channel()
        };

        let job = MessageJob::new(target, content)
            .with_delete_after(self.config.retention_seconds());
        self.sink
            .enqueue(job)
            .map_err(|e| AppError::Unexpected(format!("could not queue test alert: {e}")))?;

        tracing::info!(channel_id = %target, recipients = recipients.len(), "Test alert queued");
        Ok(format!(
            "✅ Test check queued for channel {target} ({} recipients).",
            recipients.len()
        ))
    }
}
