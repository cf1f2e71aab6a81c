//! In-memory fakes shared by the engine's unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use hourbell_common::error::PlatformError;
use hourbell_common::platform::ChatPlatform;
use hourbell_common::types::{Channel, ChannelId, MessageHandle, MessageJob, SubscriptionSet};
use hourbell_notifier::{DispatchError, JobSink};

use crate::persistence::{StorageError, SubscriptionStorage};

#[derive(Default)]
pub struct MemoryStorage {
    initial: Option<SubscriptionSet>,
    corrupt: bool,
    fail: AtomicBool,
    saved: Mutex<Vec<SubscriptionSet>>,
}

impl MemoryStorage {
    pub fn with(initial: SubscriptionSet) -> Self {
        Self {
            initial: Some(initial),
            ..Default::default()
        }
    }

    pub fn corrupt() -> Self {
        Self {
            corrupt: true,
            ..Default::default()
        }
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn saved(&self) -> Vec<SubscriptionSet> {
        self.saved.lock().unwrap().clone()
    }
}

impl SubscriptionStorage for MemoryStorage {
    fn load(&self) -> Result<Option<SubscriptionSet>, StorageError> {
        if self.corrupt {
            let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
            return Err(StorageError::Malformed(err));
        }
        Ok(self.initial.clone())
    }

    fn save(&self, set: &SubscriptionSet) -> Result<(), StorageError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("disk full")));
        }
        self.saved.lock().unwrap().push(set.clone());
        Ok(())
    }
}

/// Job sink that records everything it is given.
#[derive(Default)]
pub struct RecordingSink {
    closed: AtomicBool,
    jobs: Mutex<Vec<MessageJob>>,
}

impl RecordingSink {
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn jobs(&self) -> Vec<MessageJob> {
        self.jobs.lock().unwrap().clone()
    }
}

impl JobSink for RecordingSink {
    fn enqueue(&self, job: MessageJob) -> Result<(), DispatchError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DispatchError::Closed);
        }
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

/// Platform that knows a fixed set of channels and never sends anything.
pub struct KnownChannels(pub Vec<ChannelId>);

#[async_trait]
impl ChatPlatform for KnownChannels {
    async fn resolve_channel(&self, id: ChannelId) -> Result<Option<Channel>, PlatformError> {
        Ok(self.0.contains(&id).then_some(Channel { id }))
    }

    async fn send(&self, _channel: &Channel, _content: &str) -> Result<MessageHandle, PlatformError> {
        Err(PlatformError::Unexpected("send not supported".into()))
    }

    async fn delete(&self, _message: &MessageHandle) -> Result<(), PlatformError> {
        Err(PlatformError::Unexpected("delete not supported".into()))
    }
}
