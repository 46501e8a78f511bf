//! The order entity and its guarded mutations.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sokoni_core::{Country, EngineError, EngineResult, Entity, OrderId, ProductId, UserId, ValueObject};
use sokoni_inventory::{StockLevel, StockRequest};

use crate::delivery::{self, DeliveryStatus};
use crate::history::{record_status, seed_history, StatusHistoryEntry};
use crate::number;

/// Payment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for PaymentStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            other => Err(EngineError::validation(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

/// One order line, snapshotted from the catalog at creation time.
///
/// Catalog changes after placement must never alter historical order
/// contents, so lines carry their own name, price and tax figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: i64,
    /// Unit price excluding tax, at creation time.
    pub unit_price: Decimal,
    /// Tax percentage applied, at creation time.
    pub tax_pct: Decimal,
    /// Total tax for the line.
    pub tax_amount: Decimal,
}

impl ValueObject for OrderItem {}

impl OrderItem {
    /// Snapshot a line from the catalog view.
    pub fn from_stock(level: &StockLevel, quantity: i64) -> Self {
        let line_total = level.unit_price * Decimal::from(quantity);
        let tax_amount = (line_total * level.tax_pct / Decimal::from(100)).round_dp(2);
        Self {
            product_id: level.product_id,
            name: level.name.clone(),
            quantity,
            unit_price: level.unit_price,
            tax_pct: level.tax_pct,
            tax_amount,
        }
    }

    /// Line total excluding tax.
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Subtotal, tax and grand total over a set of lines.
pub fn compute_totals(items: &[OrderItem]) -> (Decimal, Decimal, Decimal) {
    let subtotal: Decimal = items.iter().map(OrderItem::line_total).sum();
    let tax_amount: Decimal = items.iter().map(|i| i.tax_amount).sum();
    (subtotal, tax_amount, subtotal + tax_amount)
}

/// Recipient contact and shipping address, as supplied at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingDetails {
    pub recipient_name: String,
    pub recipient_email: Option<String>,
    pub recipient_phone: Option<String>,
    pub address_line: String,
    pub city: String,
    pub district: Option<String>,
    pub postal_code: Option<String>,
}

impl ShippingDetails {
    pub fn validate(&self) -> EngineResult<()> {
        if self.recipient_name.trim().is_empty() {
            return Err(EngineError::validation("recipient name is required"));
        }
        if self.address_line.trim().is_empty() {
            return Err(EngineError::validation("shipping address is required"));
        }
        if self.recipient_email.is_none() && self.recipient_phone.is_none() {
            return Err(EngineError::validation(
                "a recipient email or phone number is required",
            ));
        }
        Ok(())
    }
}

/// Payment fields recorded by an administrator when marking an order paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub method: String,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

/// Optional tracking fields supplied alongside a status change.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackingUpdate {
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub estimated_delivery_date: Option<NaiveDate>,
}

/// A requested delivery-status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryUpdate {
    pub new_status: DeliveryStatus,
    pub actor: UserId,
    pub notes: Option<String>,
    pub tracking: Option<TrackingUpdate>,
}

/// A validated, not-yet-persisted order.
///
/// The store turns a draft into an [`Order`] once it has allocated the order
/// number and reserved stock inside the same transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub country: Country,
    pub user_id: Option<UserId>,
    pub shipping: ShippingDetails,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
}

impl OrderDraft {
    pub fn new(
        country: Country,
        user_id: Option<UserId>,
        shipping: ShippingDetails,
        items: Vec<OrderItem>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            country,
            user_id,
            shipping,
            items,
            created_at,
        }
    }

    /// The sequence scope this order allocates from, e.g. `"RW2501-"`.
    pub fn number_scope(&self) -> String {
        number::order_scope(&self.country, self.created_at)
    }

    /// The stock reservation this draft requires.
    pub fn stock_requests(&self) -> Vec<StockRequest> {
        self.items
            .iter()
            .map(|item| StockRequest {
                product_id: item.product_id,
                quantity: item.quantity,
            })
            .collect()
    }

    /// Materialize the order under its allocated number.
    pub fn into_order(self, order_number: String) -> Order {
        let (subtotal, tax_amount, total_amount) = compute_totals(&self.items);
        let status_history = seed_history(self.user_id, self.created_at);
        Order {
            id: OrderId::new(),
            order_number,
            country: self.country,
            user_id: self.user_id,
            shipping: self.shipping,
            items: self.items,
            subtotal,
            tax_amount,
            total_amount,
            delivery_status: DeliveryStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: None,
            paid_at: None,
            payment_reference: None,
            payment_notes: None,
            tracking_number: None,
            carrier: None,
            estimated_delivery_date: None,
            actual_delivery_date: None,
            delivery_notes: None,
            status_history,
            email_message_id: None,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// An order as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub country: Country,
    pub user_id: Option<UserId>,
    pub shipping: ShippingDetails,
    pub items: Vec<OrderItem>,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub delivery_status: DeliveryStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_reference: Option<String>,
    pub payment_notes: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub estimated_delivery_date: Option<NaiveDate>,
    pub actual_delivery_date: Option<DateTime<Utc>>,
    pub delivery_notes: Option<String>,
    pub status_history: Vec<StatusHistoryEntry>,
    pub email_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Order {
    /// Apply a delivery-status change, enforcing the transition table.
    ///
    /// Returns the previous status on success. Stamps the actual delivery
    /// date when the order reaches DELIVERED and merges any tracking fields
    /// supplied with the update.
    pub fn apply_delivery_update(
        &mut self,
        update: &DeliveryUpdate,
        now: DateTime<Utc>,
    ) -> EngineResult<DeliveryStatus> {
        let previous = self.delivery_status;
        if !delivery::can_transition(previous, update.new_status) {
            return Err(EngineError::invalid_transition(previous, update.new_status));
        }

        self.delivery_status = update.new_status;
        if update.new_status == DeliveryStatus::Delivered {
            self.actual_delivery_date = Some(now);
        }
        if let Some(tracking) = &update.tracking {
            if tracking.tracking_number.is_some() {
                self.tracking_number = tracking.tracking_number.clone();
            }
            if tracking.carrier.is_some() {
                self.carrier = tracking.carrier.clone();
            }
            if tracking.estimated_delivery_date.is_some() {
                self.estimated_delivery_date = tracking.estimated_delivery_date;
            }
        }
        record_status(
            &mut self.status_history,
            update.new_status,
            now,
            Some(update.actor),
            update.notes.clone(),
        );
        self.updated_at = now;
        Ok(previous)
    }

    /// Mark the order paid. Rejects orders that are already paid: the
    /// explicit idempotency guard. The store runs this inside the same
    /// transaction as the ledger insert.
    pub fn mark_paid(&mut self, payment: &PaymentDetails, now: DateTime<Utc>) -> EngineResult<()> {
        if self.payment_status == PaymentStatus::Paid {
            return Err(EngineError::AlreadyPaid);
        }
        self.payment_status = PaymentStatus::Paid;
        self.paid_at = Some(now);
        self.payment_method = Some(payment.method.clone());
        self.payment_reference = payment.reference.clone();
        self.payment_notes = payment.notes.clone();
        self.updated_at = now;
        Ok(())
    }

    /// Append free-form delivery notes.
    pub fn append_delivery_notes(&mut self, notes: &str, now: DateTime<Utc>) {
        self.delivery_notes = Some(match self.delivery_notes.take() {
            Some(existing) => format!("{existing}\n{notes}"),
            None => notes.to_string(),
        });
        self.updated_at = now;
    }

    /// Case-insensitive email / exact phone identity check for public
    /// tracking.
    pub fn matches_identity(&self, email: Option<&str>, phone: Option<&str>) -> bool {
        let email_matches = match (email, self.shipping.recipient_email.as_deref()) {
            (Some(given), Some(stored)) => given.eq_ignore_ascii_case(stored),
            _ => false,
        };
        let phone_matches = match (phone, self.shipping.recipient_phone.as_deref()) {
            (Some(given), Some(stored)) => given == stored,
            _ => false,
        };
        email_matches || phone_matches
    }
}
