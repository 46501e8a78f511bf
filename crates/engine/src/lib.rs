//! `sokoni-engine` — the operation façade of the order & ledger engine.
//!
//! Services here are what an HTTP layer (out of scope, an external
//! collaborator) calls into: order lifecycle, payment recording, direct
//! ledger entries, and public tracking. Each mutating operation delegates
//! its atomic unit of work to the store and hands notifications to the
//! email worker only after the unit committed.

pub mod dispatch;
pub mod ledger;
pub mod orders;
pub mod payments;

pub use dispatch::{spawn_email_worker, EmailDispatcher, EmailTask};
pub use ledger::LedgerService;
pub use orders::{CreateOrderRequest, OrderLine, OrderService};
pub use payments::PaymentService;
