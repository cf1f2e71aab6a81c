//! Subscription store: who wants which hourly alert.
//!
//! Toggles are serialized by a single async lock and publish a fresh immutable
//! snapshot before persisting it. Readers (`recipients_for`) only clone the current
//! snapshot pointer, so they never wait on a toggle's file write and may observe
//! either the pre- or post-toggle state.
//!
//! `All` is mutually exclusive with the individual kinds: subscribing to one side
//! always clears the user from the other.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::Mutex;

use hourbell_common::types::{SubscriptionSet, SubscriptionType, UserId};

use crate::persistence::SubscriptionStorage;

/// Which way a toggle flipped the user's membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Subscribed(SubscriptionType),
    Unsubscribed(SubscriptionType),
}

/// Result of a toggle: the in-memory change plus whether it reached storage.
///
/// When `persisted` is false the in-memory change is kept; the next successful
/// toggle writes the full state again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleReceipt {
    pub outcome: ToggleOutcome,
    pub persisted: bool,
}

impl ToggleReceipt {
    pub fn ok(&self) -> bool {
        self.persisted
    }
}

/// Flip `user_id`'s membership in `kind`, enforcing `All` exclusivity.
pub fn apply_toggle(set: &mut SubscriptionSet, user_id: UserId, kind: SubscriptionType) -> ToggleOutcome {
    if kind == SubscriptionType::All {
        for individual in SubscriptionType::INDIVIDUAL {
            set.members_mut(individual).remove(&user_id);
        }
    } else {
        set.members_mut(SubscriptionType::All).remove(&user_id);
    }

    let members = set.members_mut(kind);
    if members.remove(&user_id) {
        ToggleOutcome::Unsubscribed(kind)
    } else {
        members.insert(user_id);
        ToggleOutcome::Subscribed(kind)
    }
}

pub struct SubscriptionStore {
    storage: Arc<dyn SubscriptionStorage>,
    snapshot: RwLock<Arc<SubscriptionSet>>,
    write_lock: Mutex<()>,
}

impl SubscriptionStore {
    /// Build a store from whatever `storage` holds.
    ///
    /// A missing or unreadable document starts the store empty; the error is logged,
    /// not returned.
    pub fn load(storage: Arc<dyn SubscriptionStorage>) -> Self {
        let initial = match storage.load() {
            Ok(Some(set)) => {
                tracing::info!(
                    all = set.members(SubscriptionType::All).len(),
                    "Subscriptions loaded"
                );
                set
            }
            Ok(None) => {
                tracing::info!("No stored subscriptions, starting empty");
                SubscriptionSet::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Stored subscriptions unreadable, starting empty");
                SubscriptionSet::new()
            }
        };

        Self {
            storage,
            snapshot: RwLock::new(Arc::new(initial)),
            write_lock: Mutex::new(()),
        }
    }

    /// Toggle `user_id` in `kind` and persist the whole store.
    pub async fn toggle(&self, user_id: UserId, kind: SubscriptionType) -> ToggleReceipt {
        let _guard = self.write_lock.lock().await;

        let mut next = (*self.snapshot()).clone();
        let outcome = apply_toggle(&mut next, user_id, kind);
        let next = Arc::new(next);
        self.publish(Arc::clone(&next));

        let storage = Arc::clone(&self.storage);
        let persisted = match tokio::task::spawn_blocking(move || storage.save(&next)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(user_id = %user_id, kind = %kind, error = %e, "Failed to persist subscriptions");
                false
            }
            Err(e) => {
                tracing::error!(user_id = %user_id, kind = %kind, error = %e, "Subscription write task failed");
                false
            }
        };

        tracing::info!(user_id = %user_id, ?outcome, persisted, "Subscription toggled");
        ToggleReceipt { outcome, persisted }
    }

    /// Toggle and render the reply with a caller-supplied formatter.
    pub async fn toggle_with<F>(&self, user_id: UserId, kind: SubscriptionType, format: F) -> (bool, String)
    where
        F: FnOnce(&ToggleReceipt) -> String,
    {
        let receipt = self.toggle(user_id, kind).await;
        (receipt.ok(), format(&receipt))
    }

    /// Users to notify for `kind`: `All ∪ kind`.
    pub fn recipients_for(&self, kind: SubscriptionType) -> Vec<UserId> {
        self.snapshot().recipients_for(kind)
    }

    /// The current consistent state.
    pub fn snapshot(&self) -> Arc<SubscriptionSet> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, next: Arc<SubscriptionSet>) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = next;
    }
}
