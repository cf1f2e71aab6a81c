//! Outbound delivery of alert messages.
//!
//! - `MessageDispatcher`: unbounded job queue drained by a worker pool, with a
//!   semaphore capping simultaneous sends
//! - `RetryPolicy`: exponential backoff (1s → 2s → 4s), permission denial is terminal
//! - Deferred deletion of sent messages once their retention period expires
//! - `DiscordRest`: the production `ChatPlatform` over the Discord REST API

pub mod discord;
pub mod dispatcher;
pub mod retry;

pub use discord::DiscordRest;
pub use dispatcher::{DeliveryOutcome, DispatchError, JobSink, MessageDispatcher};
pub use retry::RetryPolicy;
