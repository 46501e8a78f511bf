//! Status history: one entry per delivery-status step.
//!
//! The history is not a free-form log of every mutation. It is seeded with
//! the canonical timeline at creation (a completed PENDING entry plus
//! placeholders) and each later transition fills in the entry for the status
//! reached, appending one for side-branch statuses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sokoni_core::{UserId, ValueObject};

use crate::delivery::DeliveryStatus;

/// One step of an order's delivery history.
///
/// `timestamp == None` marks a canonical step that has not been reached yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: DeliveryStatus,
    pub timestamp: Option<DateTime<Utc>>,
    pub updated_by: Option<UserId>,
    pub notes: Option<String>,
}

impl ValueObject for StatusHistoryEntry {}

impl StatusHistoryEntry {
    pub fn is_completed(&self) -> bool {
        self.timestamp.is_some()
    }
}

/// Build the initial history for a freshly created order: PENDING completed
/// at `at`, the remaining canonical steps as null-timestamp placeholders.
pub fn seed_history(created_by: Option<UserId>, at: DateTime<Utc>) -> Vec<StatusHistoryEntry> {
    DeliveryStatus::CANONICAL_TIMELINE
        .into_iter()
        .map(|status| StatusHistoryEntry {
            status,
            timestamp: (status == DeliveryStatus::Pending).then_some(at),
            updated_by: if status == DeliveryStatus::Pending {
                created_by
            } else {
                None
            },
            notes: None,
        })
        .collect()
}

/// Record that `status` was reached at `at`.
///
/// Updates the matching entry in place when one exists (the canonical
/// placeholders), otherwise appends; side-branch statuses such as
/// IN_TRANSIT or CANCELLED only ever gain an entry once reached.
pub fn record_status(
    history: &mut Vec<StatusHistoryEntry>,
    status: DeliveryStatus,
    at: DateTime<Utc>,
    updated_by: Option<UserId>,
    notes: Option<String>,
) {
    if let Some(entry) = history.iter_mut().find(|e| e.status == status) {
        entry.timestamp = Some(at);
        entry.updated_by = updated_by;
        if notes.is_some() {
            entry.notes = notes;
        }
    } else {
        history.push(StatusHistoryEntry {
            status,
            timestamp: Some(at),
            updated_by,
            notes,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_history_has_completed_pending_and_three_placeholders() {
        let creator = UserId::new();
        let now = Utc::now();
        let history = seed_history(Some(creator), now);

        assert_eq!(history.len(), 4);
        assert_eq!(history[0].status, DeliveryStatus::Pending);
        assert_eq!(history[0].timestamp, Some(now));
        assert_eq!(history[0].updated_by, Some(creator));
        for entry in &history[1..] {
            assert!(entry.timestamp.is_none());
            assert!(entry.updated_by.is_none());
        }
        assert_eq!(history[1].status, DeliveryStatus::Processing);
        assert_eq!(history[2].status, DeliveryStatus::Shipped);
        assert_eq!(history[3].status, DeliveryStatus::Delivered);
    }

    #[test]
    fn guest_checkout_seeds_pending_without_actor() {
        let history = seed_history(None, Utc::now());
        assert!(history[0].is_completed());
        assert!(history[0].updated_by.is_none());
    }

    #[test]
    fn canonical_step_is_updated_in_place() {
        let mut history = seed_history(None, Utc::now());
        let admin = UserId::new();
        let later = Utc::now();

        record_status(
            &mut history,
            DeliveryStatus::Processing,
            later,
            Some(admin),
            Some("picked".to_string()),
        );

        assert_eq!(history.len(), 4);
        assert_eq!(history[1].timestamp, Some(later));
        assert_eq!(history[1].updated_by, Some(admin));
        assert_eq!(history[1].notes.as_deref(), Some("picked"));
    }

    #[test]
    fn side_branch_status_is_appended_once() {
        let mut history = seed_history(None, Utc::now());
        let admin = UserId::new();

        record_status(
            &mut history,
            DeliveryStatus::InTransit,
            Utc::now(),
            Some(admin),
            None,
        );
        assert_eq!(history.len(), 5);
        assert_eq!(history[4].status, DeliveryStatus::InTransit);

        // A retry after failed delivery hits the same entry again.
        let retry = Utc::now();
        record_status(
            &mut history,
            DeliveryStatus::InTransit,
            retry,
            Some(admin),
            None,
        );
        assert_eq!(history.len(), 5);
        assert_eq!(history[4].timestamp, Some(retry));
    }

    #[test]
    fn missing_notes_do_not_erase_earlier_notes() {
        let mut history = seed_history(None, Utc::now());
        record_status(
            &mut history,
            DeliveryStatus::Processing,
            Utc::now(),
            None,
            Some("first".to_string()),
        );
        record_status(&mut history, DeliveryStatus::Processing, Utc::now(), None, None);
        assert_eq!(history[1].notes.as_deref(), Some("first"));
    }
}
