//! Hourly alert engine: subscriptions, scheduling, rendering and admin operations.

pub mod admin;
pub mod persistence;
pub mod renderer;
pub mod scheduler;
pub mod subscription;
pub mod watchdog;

#[cfg(test)]
pub(crate) mod testing;

pub use admin::{AdminService, Authorizer};
pub use persistence::{JsonFileStorage, StorageError, SubscriptionStorage};
pub use scheduler::{TickReport, TickScheduler, TickState};
pub use subscription::{SubscriptionStore, ToggleOutcome, ToggleReceipt};
pub use watchdog::DriftWatchdog;
