use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Alert categories a user can subscribe to.
///
/// `All` is mutually exclusive with the three individual kinds; the
/// subscription store enforces that on every toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionType {
    #[serde(rename = "minute_5_before")]
    FiveMinBefore,
    #[serde(rename = "minute_3_before")]
    ThreeMinBefore,
    OnTime,
    All,
}

impl SubscriptionType {
    /// The kinds that fire on their own schedule, in evaluation order.
    pub const INDIVIDUAL: [SubscriptionType; 3] = [
        SubscriptionType::FiveMinBefore,
        SubscriptionType::ThreeMinBefore,
        SubscriptionType::OnTime,
    ];

    pub const ALL_KINDS: [SubscriptionType; 4] = [
        SubscriptionType::FiveMinBefore,
        SubscriptionType::ThreeMinBefore,
        SubscriptionType::OnTime,
        SubscriptionType::All,
    ];

    /// Minute of the hour at which this kind fires. `All` has no schedule of its own.
    pub fn target_minute(self) -> Option<u32> {
        match self {
            SubscriptionType::FiveMinBefore => Some(55),
            SubscriptionType::ThreeMinBefore => Some(57),
            SubscriptionType::OnTime => Some(0),
            SubscriptionType::All => None,
        }
    }
}

impl std::fmt::Display for SubscriptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionType::FiveMinBefore => write!(f, "minute_5_before"),
            SubscriptionType::ThreeMinBefore => write!(f, "minute_3_before"),
            SubscriptionType::OnTime => write!(f, "on_time"),
            SubscriptionType::All => write!(f, "all"),
        }
    }
}

/// A chat platform user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chat platform channel identifier. `0` means "not configured".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl ChannelId {
    pub fn is_set(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A channel the platform resolved and can be posted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
}

/// Reference to a message that was sent, used for deferred deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub channel_id: ChannelId,
    pub message_id: u64,
}

/// Subscription state: kind → set of subscribed users.
///
/// Always holds an entry for each of the four kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSet {
    members: BTreeMap<SubscriptionType, BTreeSet<UserId>>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        let members = SubscriptionType::ALL_KINDS
            .iter()
            .map(|kind| (*kind, BTreeSet::new()))
            .collect();
        Self { members }
    }

    pub fn members(&self, kind: SubscriptionType) -> &BTreeSet<UserId> {
        static EMPTY: BTreeSet<UserId> = BTreeSet::new();
        self.members.get(&kind).unwrap_or(&EMPTY)
    }

    pub fn members_mut(&mut self, kind: SubscriptionType) -> &mut BTreeSet<UserId> {
        self.members.entry(kind).or_default()
    }

    pub fn contains(&self, kind: SubscriptionType, user_id: UserId) -> bool {
        self.members(kind).contains(&user_id)
    }

    /// Users who should be notified for `kind`: `All ∪ kind`, in ascending id order.
    pub fn recipients_for(&self, kind: SubscriptionType) -> Vec<UserId> {
        self.members(SubscriptionType::All)
            .union(self.members(kind))
            .copied()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.members.values().all(|set| set.is_empty())
    }
}

impl Default for SubscriptionSet {
    fn default() -> Self {
        Self::new()
    }
}

/// On-disk form of a [`SubscriptionSet`]: one array of user ids per kind.
///
/// Missing keys load as empty arrays; duplicate ids collapse into one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionDocument {
    #[serde(default)]
    pub minute_5_before: Vec<u64>,
    #[serde(default)]
    pub minute_3_before: Vec<u64>,
    #[serde(default)]
    pub on_time: Vec<u64>,
    #[serde(default)]
    pub all: Vec<u64>,
}

impl From<&SubscriptionSet> for SubscriptionDocument {
    fn from(set: &SubscriptionSet) -> Self {
        let ids = |kind: SubscriptionType| -> Vec<u64> {
            set.members(kind).iter().map(|user| user.0).collect()
        };
        Self {
            minute_5_before: ids(SubscriptionType::FiveMinBefore),
            minute_3_before: ids(SubscriptionType::ThreeMinBefore),
            on_time: ids(SubscriptionType::OnTime),
            all: ids(SubscriptionType::All),
        }
    }
}

impl From<SubscriptionDocument> for SubscriptionSet {
    fn from(doc: SubscriptionDocument) -> Self {
        let mut set = SubscriptionSet::new();
        for (kind, ids) in [
            (SubscriptionType::FiveMinBefore, doc.minute_5_before),
            (SubscriptionType::ThreeMinBefore, doc.minute_3_before),
            (SubscriptionType::OnTime, doc.on_time),
            (SubscriptionType::All, doc.all),
        ] {
            set.members_mut(kind).extend(ids.into_iter().map(UserId));
        }
        set
    }
}

/// A unit of outbound work: one send plus an optional deferred deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageJob {
    pub id: Uuid,
    pub channel_id: ChannelId,
    pub content: String,
    /// Seconds after a successful send at which the message is deleted.
    pub delete_after_secs: Option<u64>,
}

impl MessageJob {
    pub fn new(channel_id: ChannelId, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel_id,
            content: content.into(),
            delete_after_secs: None,
        }
    }

    pub fn with_delete_after(mut self, secs: u64) -> Self {
        self.delete_after_secs = Some(secs);
        self
    }

    /// Deletion delay, if one applies. A zero delay means "keep the message".
    pub fn deletion_delay(&self) -> Option<u64> {
        self.delete_after_secs.filter(|secs| *secs > 0)
    }
}
