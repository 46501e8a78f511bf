//! Customer-facing tracking timeline.
//!
//! A read-only projection of the order onto the fixed four-step sequence
//! PENDING → PROCESSING → SHIPPED → DELIVERED. Side-branch statuses are
//! deliberately omitted from the display even though they are valid states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::delivery::DeliveryStatus;
use crate::order::Order;

/// One step of the canonical tracking display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineStep {
    pub status: DeliveryStatus,
    pub timestamp: Option<DateTime<Utc>>,
    pub is_completed: bool,
    pub is_current: bool,
}

/// Project an order onto the canonical four-step timeline.
pub fn project_timeline(order: &Order) -> Vec<TimelineStep> {
    DeliveryStatus::CANONICAL_TIMELINE
        .into_iter()
        .map(|status| {
            let timestamp = order
                .status_history
                .iter()
                .find(|entry| entry.status == status)
                .and_then(|entry| entry.timestamp);
            TimelineStep {
                status,
                timestamp,
                is_completed: timestamp.is_some(),
                is_current: status == order.delivery_status,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{DeliveryUpdate, OrderDraft, OrderItem, ShippingDetails};
    use rust_decimal::Decimal;
    use sokoni_core::{Country, ProductId, UserId};
    use sokoni_inventory::StockLevel;

    fn fresh_order() -> Order {
        let level = StockLevel::new(
            ProductId::new(),
            "Widget",
            Decimal::new(100_00, 2),
            Decimal::from(18),
            10,
            Utc::now(),
        );
        OrderDraft::new(
            Country::new("RW").unwrap(),
            None,
            ShippingDetails {
                recipient_name: "Jean".to_string(),
                recipient_email: Some("jean@example.com".to_string()),
                recipient_phone: None,
                address_line: "KN 3 Rd".to_string(),
                city: "Kigali".to_string(),
                district: None,
                postal_code: None,
            },
            vec![OrderItem::from_stock(&level, 1)],
            Utc::now(),
        )
        .into_order("RW2501-0000001".to_string())
    }

    #[test]
    fn fresh_order_shows_pending_completed_and_current() {
        let timeline = project_timeline(&fresh_order());
        assert_eq!(timeline.len(), 4);
        assert!(timeline[0].is_completed && timeline[0].is_current);
        for step in &timeline[1..] {
            assert!(!step.is_completed && !step.is_current);
        }
    }

    #[test]
    fn side_branch_status_leaves_canonical_steps_and_clears_current() {
        let mut order = fresh_order();
        let admin = UserId::new();
        for status in [DeliveryStatus::Processing, DeliveryStatus::Shipped, DeliveryStatus::InTransit] {
            order
                .apply_delivery_update(
                    &DeliveryUpdate {
                        new_status: status,
                        actor: admin,
                        notes: None,
                        tracking: None,
                    },
                    Utc::now(),
                )
                .unwrap();
        }

        let timeline = project_timeline(&order);
        // IN_TRANSIT is not part of the display; no step is "current".
        assert_eq!(timeline.len(), 4);
        assert!(timeline.iter().all(|step| !step.is_current));
        assert!(timeline[0].is_completed);
        assert!(timeline[1].is_completed);
        assert!(timeline[2].is_completed);
        assert!(!timeline[3].is_completed);
    }

    #[test]
    fn completed_steps_carry_their_timestamps() {
        let mut order = fresh_order();
        let admin = UserId::new();
        let at = Utc::now();
        order
            .apply_delivery_update(
                &DeliveryUpdate {
                    new_status: DeliveryStatus::Processing,
                    actor: admin,
                    notes: None,
                    tracking: None,
                },
                at,
            )
            .unwrap();

        let timeline = project_timeline(&order);
        assert_eq!(timeline[1].timestamp, Some(at));
        assert!(timeline[1].is_current);
    }
}
