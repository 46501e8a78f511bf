//! Delivery-status state machine.
//!
//! States form a closed enumeration; permitted transitions live in one
//! static adjacency map. Both the mutation path and any validation layer go
//! through [`can_transition`]; the table is never duplicated.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use sokoni_core::EngineError;

/// Delivery status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    Processing,
    Shipped,
    InTransit,
    OutForDelivery,
    Delivered,
    Cancelled,
    FailedDelivery,
    Returned,
}

impl DeliveryStatus {
    /// Every status, for exhaustive table checks.
    pub const ALL: [DeliveryStatus; 9] = [
        DeliveryStatus::Pending,
        DeliveryStatus::Processing,
        DeliveryStatus::Shipped,
        DeliveryStatus::InTransit,
        DeliveryStatus::OutForDelivery,
        DeliveryStatus::Delivered,
        DeliveryStatus::Cancelled,
        DeliveryStatus::FailedDelivery,
        DeliveryStatus::Returned,
    ];

    /// The fixed customer-facing tracking sequence. Side branches
    /// (cancellation, failed delivery, the in-transit hops) are valid states
    /// but intentionally absent from this display sequence.
    pub const CANONICAL_TIMELINE: [DeliveryStatus; 4] = [
        DeliveryStatus::Pending,
        DeliveryStatus::Processing,
        DeliveryStatus::Shipped,
        DeliveryStatus::Delivered,
    ];

    pub fn is_terminal(self) -> bool {
        transitions_from(self).is_empty()
    }

    pub fn is_canonical(self) -> bool {
        Self::CANONICAL_TIMELINE.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "PENDING",
            DeliveryStatus::Processing => "PROCESSING",
            DeliveryStatus::Shipped => "SHIPPED",
            DeliveryStatus::InTransit => "IN_TRANSIT",
            DeliveryStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Cancelled => "CANCELLED",
            DeliveryStatus::FailedDelivery => "FAILED_DELIVERY",
            DeliveryStatus::Returned => "RETURNED",
        }
    }
}

/// Statuses reachable from `from`. Empty slice means `from` is terminal.
pub fn transitions_from(from: DeliveryStatus) -> &'static [DeliveryStatus] {
    use DeliveryStatus::*;
    match from {
        Pending => &[Processing, Cancelled],
        Processing => &[Shipped, Cancelled],
        Shipped => &[InTransit, FailedDelivery, Cancelled],
        InTransit => &[OutForDelivery, FailedDelivery],
        OutForDelivery => &[Delivered, FailedDelivery],
        Delivered => &[],
        FailedDelivery => &[OutForDelivery, Returned],
        Returned => &[],
        Cancelled => &[],
    }
}

/// Whether `from -> to` is a permitted transition.
pub fn can_transition(from: DeliveryStatus, to: DeliveryStatus) -> bool {
    transitions_from(from).contains(&to)
}

impl core::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeliveryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| EngineError::validation(format!("unknown delivery status: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use DeliveryStatus::*;

    #[test]
    fn transition_table_matches_the_contract() {
        let expected: &[(DeliveryStatus, &[DeliveryStatus])] = &[
            (Pending, &[Processing, Cancelled]),
            (Processing, &[Shipped, Cancelled]),
            (Shipped, &[InTransit, FailedDelivery, Cancelled]),
            (InTransit, &[OutForDelivery, FailedDelivery]),
            (OutForDelivery, &[Delivered, FailedDelivery]),
            (Delivered, &[]),
            (FailedDelivery, &[OutForDelivery, Returned]),
            (Returned, &[]),
            (Cancelled, &[]),
        ];

        for (from, targets) in expected {
            assert_eq!(
                transitions_from(*from),
                *targets,
                "transitions from {from} diverged"
            );
        }
    }

    #[test]
    fn shipped_cannot_jump_straight_to_delivered() {
        assert!(!can_transition(Shipped, Delivered));
    }

    #[test]
    fn failed_delivery_allows_retry_or_return() {
        assert!(can_transition(FailedDelivery, OutForDelivery));
        assert!(can_transition(FailedDelivery, Returned));
        assert!(!can_transition(FailedDelivery, Delivered));
    }

    #[test]
    fn terminal_states_are_exactly_the_three_dead_ends() {
        let terminal: Vec<_> = DeliveryStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal, vec![Delivered, Cancelled, Returned]);
    }

    #[test]
    fn status_names_round_trip_through_strings() {
        for status in DeliveryStatus::ALL {
            assert_eq!(status.as_str().parse::<DeliveryStatus>().unwrap(), status);
        }
        assert!("SHIPPING".parse::<DeliveryStatus>().is_err());
    }

    fn any_status() -> impl Strategy<Value = DeliveryStatus> {
        proptest::sample::select(DeliveryStatus::ALL.to_vec())
    }

    proptest! {
        /// No transition ever leaves a terminal state.
        #[test]
        fn terminal_states_admit_no_transition(from in any_status(), to in any_status()) {
            if from.is_terminal() {
                prop_assert!(!can_transition(from, to));
            }
        }

        /// A status never transitions to itself.
        #[test]
        fn transitions_are_never_reflexive(status in any_status()) {
            prop_assert!(!can_transition(status, status));
        }

        /// Every permitted target is itself a known state with a defined row,
        /// i.e. the adjacency map is closed over the enumeration.
        #[test]
        fn adjacency_map_is_closed(from in any_status()) {
            for target in transitions_from(from) {
                prop_assert!(DeliveryStatus::ALL.contains(target));
            }
        }
    }
}
