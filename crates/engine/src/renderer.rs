//! Message rendering: pure functions from (kind, time, recipients) to text.
//!
//! Every alert ends with one line of space-separated mention tokens, in the order
//! the recipients were given.

use chrono::{DateTime, FixedOffset, Timelike};

use hourbell_common::error::AppError;
use hourbell_common::types::{SubscriptionType, UserId};

use crate::subscription::{ToggleOutcome, ToggleReceipt};

/// Platform mention token for a user.
pub fn mention(user_id: UserId) -> String {
    format!("<@{}>", user_id.0)
}

pub fn mention_line(recipients: &[UserId]) -> String {
    recipients
        .iter()
        .map(|user| mention(*user))
        .collect::<Vec<_>>()
        .join(" ")
}

/// The hour that starts at the next top of the hour, on a 24h clock.
pub fn next_hour(timestamp: &DateTime<FixedOffset>) -> u32 {
    (timestamp.hour() + 1) % 24
}

pub fn render_five_min_before(_timestamp: &DateTime<FixedOffset>, recipients: &[UserId]) -> String {
    format!(
        "⏰ Forgot the barrier again? You're going, no excuses. 🗡️\n\
         **Barrier alert: 5 minutes to go!**\n\
         {}\n",
        mention_line(recipients)
    )
}

pub fn render_three_min_before(timestamp: &DateTime<FixedOffset>, recipients: &[UserId]) -> String {
    format!(
        "⏰ Forgot the barrier again? You're going, no excuses. 🗡️\n\
         **Barrier alert: 3 minutes to go!**\n\
         > Opens at {}:00 sharp (boss spawns in about 2 minutes)\n\
         {}\n",
        next_hour(timestamp),
        mention_line(recipients)
    )
}

pub fn render_on_time(_timestamp: &DateTime<FixedOffset>, recipients: &[UserId]) -> String {
    format!(
        "🤪 It's on the hour. Why are you still here? 🗡️\n\
         {}\n",
        mention_line(recipients)
    )
}

/// Render the alert for a scheduled kind. `All` has no alert of its own.
pub fn render_alert(
    kind: SubscriptionType,
    timestamp: &DateTime<FixedOffset>,
    recipients: &[UserId],
) -> Option<String> {
    match kind {
        SubscriptionType::FiveMinBefore => Some(render_five_min_before(timestamp, recipients)),
        SubscriptionType::ThreeMinBefore => Some(render_three_min_before(timestamp, recipients)),
        SubscriptionType::OnTime => Some(render_on_time(timestamp, recipients)),
        SubscriptionType::All => None,
    }
}

pub fn kind_label(kind: SubscriptionType) -> &'static str {
    match kind {
        SubscriptionType::FiveMinBefore => "5 minutes before",
        SubscriptionType::ThreeMinBefore => "3 minutes before",
        SubscriptionType::OnTime => "on the hour",
        SubscriptionType::All => "all alerts",
    }
}

/// Default reply shown to a user after pressing a subscription button.
pub fn render_toggle_reply(receipt: &ToggleReceipt) -> String {
    if !receipt.persisted {
        return "❌ Couldn't save your subscription. Poke an admin about it.".to_string();
    }
    match receipt.outcome {
        ToggleOutcome::Subscribed(kind) => format!(
            "✅ Subscribed to {}. Happy now?",
            kind_label(kind)
        ),
        ToggleOutcome::Unsubscribed(kind) => format!(
            "🔕 Unsubscribed from {}. Fine, be that way.",
            kind_label(kind)
        ),
    }
}

/// Diagnostic text mirrored to the debug channel when a tick fails.
pub fn render_scheduler_error(kind: SubscriptionType, error: &AppError) -> String {
    format!("❌ Scheduler error ({kind}): {error}")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn kst(hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 3, 14, hour, minute, 0)
            .unwrap()
    }

    fn ids(raw: &[u64]) -> Vec<UserId> {
        raw.iter().copied().map(UserId).collect()
    }

    #[test]
    fn test_three_min_before_wraps_to_midnight() {
        let text = render_three_min_before(&kst(23, 57), &ids(&[1, 2, 3]));
        assert!(text.contains("Opens at 0:00 sharp"));
        assert!(text.contains("<@1> <@2> <@3>"));
        assert_eq!(text.matches("<@").count(), 3);
    }

    #[test]
    fn test_three_min_before_next_hour() {
        let text = render_three_min_before(&kst(14, 57), &ids(&[9]));
        assert!(text.contains("Opens at 15:00 sharp"));
    }

    #[test]
    fn test_mentions_keep_input_order() {
        let text = render_five_min_before(&kst(14, 55), &ids(&[30, 10, 20]));
        let line = text.lines().last().unwrap();
        assert_eq!(line, "<@30> <@10> <@20>");
    }

    #[test]
    fn test_mentions_on_own_line() {
        for kind in SubscriptionType::INDIVIDUAL {
            let text = render_alert(kind, &kst(10, 0), &ids(&[5, 6])).unwrap();
            assert!(text.lines().any(|line| line == "<@5> <@6>"), "kind {kind}");
            assert!(text.ends_with('\n'));
        }
    }

    #[test]
    fn test_no_recipients_renders_empty_mention_line() {
        let text = render_on_time(&kst(10, 0), &[]);
        assert!(!text.contains("<@"));
    }

    #[test]
    fn test_all_has_no_alert() {
        assert!(render_alert(SubscriptionType::All, &kst(10, 0), &ids(&[1])).is_none());
    }

    #[test]
    fn test_toggle_replies() {
        let subscribed = ToggleReceipt {
            outcome: ToggleOutcome::Subscribed(SubscriptionType::OnTime),
            persisted: true,
        };
        assert!(render_toggle_reply(&subscribed).contains("Subscribed to on the hour"));

        let unsubscribed = ToggleReceipt {
            outcome: ToggleOutcome::Unsubscribed(SubscriptionType::All),
            persisted: true,
        };
        assert!(render_toggle_reply(&unsubscribed).contains("Unsubscribed from all alerts"));

        let failed = ToggleReceipt {
            outcome: ToggleOutcome::Subscribed(SubscriptionType::All),
            persisted: false,
        };
        assert!(render_toggle_reply(&failed).starts_with("❌"));
    }
}
