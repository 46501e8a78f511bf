//! `sokoni-orders` — the order lifecycle domain.
//!
//! Orders are created once by the checkout workflow and mutated only through
//! delivery-status transitions, payment recording, and note annotation. The
//! delivery-status state machine lives in [`delivery`], and the customer
//! facing tracking view in [`timeline`].

pub mod delivery;
pub mod history;
pub mod number;
pub mod order;
pub mod timeline;

pub use delivery::{can_transition, transitions_from, DeliveryStatus};
pub use history::{record_status, seed_history, StatusHistoryEntry};
pub use order::{
    DeliveryUpdate, Order, OrderDraft, OrderItem, PaymentDetails, PaymentStatus, ShippingDetails,
    TrackingUpdate,
};
pub use timeline::{project_timeline, TimelineStep};
