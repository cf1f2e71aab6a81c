use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;

use crate::error::AppError;
use crate::types::ChannelId;

/// Upper bound for the message retention delay (6 hours).
pub const MAX_RETENTION_SECONDS: u64 = 6 * 3600;

/// Process startup configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Bot token, only used by the platform adapter
    pub discord_bot_token: String,

    /// Base URL of the Discord REST API
    pub discord_api_base: String,

    /// Channel the hourly alerts are posted to
    pub active_channel_id: u64,

    /// Channel for diagnostics (0 = none)
    pub debug_channel_id: u64,

    /// Seconds after which a sent alert is deleted (0 = keep)
    pub message_retention_seconds: u64,

    /// Role a caller must hold to run administrative commands
    pub admin_role_name: String,

    /// Location of the subscription JSON document
    pub subscriptions_path: String,

    /// Number of dispatcher worker loops (default: 2)
    pub dispatch_workers: usize,

    /// Maximum simultaneous outbound sends (default: 2)
    pub dispatch_concurrency: usize,

    /// Home timezone as a whole-hour UTC offset (default: 9, KST)
    pub home_utc_offset_hours: i32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let parsed =
            |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let message_retention_seconds: u64 = parsed("MESSAGE_RETENTION_SECONDS", "600")
            .parse()
            .map_err(|_| anyhow::anyhow!("MESSAGE_RETENTION_SECONDS must be a valid u64"))?;
        validate_retention(message_retention_seconds)?;

        let home_utc_offset_hours: i32 = parsed("HOME_UTC_OFFSET_HOURS", "9")
            .parse()
            .map_err(|_| anyhow::anyhow!("HOME_UTC_OFFSET_HOURS must be a valid i32"))?;
        if !(-23..=23).contains(&home_utc_offset_hours) {
            anyhow::bail!("HOME_UTC_OFFSET_HOURS must be within -23..=23");
        }

        Ok(Self {
            discord_bot_token: lookup("DISCORD_BOT_TOKEN")
                .ok_or_else(|| anyhow::anyhow!("DISCORD_BOT_TOKEN environment variable is required"))?,
            discord_api_base: parsed("DISCORD_API_BASE", "https://discord.com/api/v10"),
            active_channel_id: lookup("ACTIVE_CHANNEL_ID")
                .ok_or_else(|| anyhow::anyhow!("ACTIVE_CHANNEL_ID environment variable is required"))?
                .parse()
                .map_err(|_| anyhow::anyhow!("ACTIVE_CHANNEL_ID must be a valid u64"))?,
            debug_channel_id: parsed("DEBUG_CHANNEL_ID", "0")
                .parse()
                .map_err(|_| anyhow::anyhow!("DEBUG_CHANNEL_ID must be a valid u64"))?,
            message_retention_seconds,
            admin_role_name: parsed("ADMIN_ROLE_NAME", "alert-admin"),
            subscriptions_path: parsed("SUBSCRIPTIONS_PATH", "config/subscribed_users.json"),
            dispatch_workers: parsed("DISPATCH_WORKERS", "2")
                .parse()
                .map_err(|_| anyhow::anyhow!("DISPATCH_WORKERS must be a valid usize"))?,
            dispatch_concurrency: parsed("DISPATCH_CONCURRENCY", "2")
                .parse()
                .map_err(|_| anyhow::anyhow!("DISPATCH_CONCURRENCY must be a valid usize"))?,
            home_utc_offset_hours,
        })
    }

    /// The fixed home timezone the scheduler reads the clock in.
    pub fn home_timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.home_utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }
}

/// Reject retention values outside `0..=MAX_RETENTION_SECONDS`.
pub fn validate_retention(seconds: u64) -> Result<(), AppError> {
    if seconds > MAX_RETENTION_SECONDS {
        return Err(AppError::ConfigurationInvalid(format!(
            "retention must be within 0..={MAX_RETENTION_SECONDS} seconds, got {seconds}"
        )));
    }
    Ok(())
}

/// Mutable process-wide settings shared by the scheduler, dispatcher and admin handlers.
///
/// Each field is read and written independently; there is no cross-field atomicity.
#[derive(Debug)]
pub struct RuntimeConfig {
    active_channel: AtomicU64,
    debug_channel: AtomicU64,
    retention_seconds: AtomicU64,
}

impl RuntimeConfig {
    pub fn new(active: ChannelId, debug: ChannelId, retention_seconds: u64) -> Result<Self, AppError> {
        validate_retention(retention_seconds)?;
        Ok(Self {
            active_channel: AtomicU64::new(active.0),
            debug_channel: AtomicU64::new(debug.0),
            retention_seconds: AtomicU64::new(retention_seconds),
        })
    }

    pub fn from_app_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(
            ChannelId(config.active_channel_id),
            ChannelId(config.debug_channel_id),
            config.message_retention_seconds,
        )
    }

    pub fn active_channel(&self) -> ChannelId {
        ChannelId(self.active_channel.load(Ordering::Relaxed))
    }

    pub fn debug_channel(&self) -> ChannelId {
        ChannelId(self.debug_channel.load(Ordering::Relaxed))
    }

    pub fn retention_seconds(&self) -> u64 {
        self.retention_seconds.load(Ordering::Relaxed)
    }

    pub fn set_active_channel(&self, id: ChannelId) {
        self.active_channel.store(id.0, Ordering::Relaxed);
    }

    pub fn set_debug_channel(&self, id: ChannelId) {
        self.debug_channel.store(id.0, Ordering::Relaxed);
    }

    /// Update the retention delay. Out-of-range values leave the current value untouched.
    pub fn set_retention_seconds(&self, seconds: u64) -> Result<(), AppError> {
        validate_retention(seconds)?;
        self.retention_seconds.store(seconds, Ordering::Relaxed);
        Ok(())
    }
}
