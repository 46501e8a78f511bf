//! Ledger transaction records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sokoni_core::{Country, EngineError, EngineResult, Entity, OrderId, TransactionId, UserId};
use sokoni_orders::number;
use sokoni_orders::{Order, OrderItem};

/// Kind of a ledger entry. The sign of `amount` is implicit in the kind;
/// amounts are stored positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Sale,
    Expense,
}

impl TransactionKind {
    /// Number prefix: `SAL` for sales, `EXP` for expenses.
    pub fn prefix(self) -> &'static str {
        match self {
            TransactionKind::Sale => "SAL",
            TransactionKind::Expense => "EXP",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Sale => "sale",
            TransactionKind::Expense => "expense",
        }
    }
}

impl core::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for TransactionKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sale" => Ok(TransactionKind::Sale),
            "expense" => Ok(TransactionKind::Expense),
            other => Err(EngineError::validation(format!(
                "unknown transaction kind: {other}"
            ))),
        }
    }
}

/// Allocation scope for a ledger entry, e.g. `"SAL-RW2501-"`.
pub fn transaction_scope(kind: TransactionKind, country: &Country, at: DateTime<Utc>) -> String {
    format!("{}-{}", kind.prefix(), number::order_scope(country, at))
}

/// Billing currency for a country. Unknown countries settle in USD.
pub fn currency_for(country: &Country) -> &'static str {
    match country.as_str() {
        "RW" => "RWF",
        "KE" => "KES",
        "UG" => "UGX",
        "TZ" => "TZS",
        "US" => "USD",
        _ => "USD",
    }
}

/// Sale-specific payload: the item snapshot and customer identification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleDetails {
    pub items: Vec<OrderItem>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub user_id: Option<UserId>,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
}

/// Expense-specific payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseDetails {
    pub expense_category: String,
    pub vendor: Option<String>,
    pub invoice_number: Option<String>,
    pub receipt_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransactionDetails {
    Sale(SaleDetails),
    Expense(ExpenseDetails),
}

/// A persisted ledger entry. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub transaction_number: String,
    pub kind: TransactionKind,
    /// Back-reference set only when the sale originated from an order payment.
    pub order_id: Option<OrderId>,
    pub country: Country,
    pub currency: String,
    pub amount: Decimal,
    pub subtotal: Option<Decimal>,
    pub vat_amount: Option<Decimal>,
    pub description: String,
    pub transaction_date: DateTime<Utc>,
    pub recorded_by: UserId,
    pub details: TransactionDetails,
    pub created_at: DateTime<Utc>,
}

impl Entity for TransactionRecord {
    type Id = TransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Input for a directly recorded sale (no originating order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleEntry {
    pub country: Country,
    pub currency: Option<String>,
    pub amount: Decimal,
    pub subtotal: Option<Decimal>,
    pub vat_amount: Option<Decimal>,
    pub description: String,
    pub transaction_date: DateTime<Utc>,
    pub items: Vec<OrderItem>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub user_id: Option<UserId>,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
}

/// Input for a recorded expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseEntry {
    pub country: Country,
    pub currency: Option<String>,
    pub amount: Decimal,
    pub description: String,
    pub transaction_date: DateTime<Utc>,
    pub expense_category: String,
    pub vendor: Option<String>,
    pub invoice_number: Option<String>,
    pub receipt_url: Option<String>,
}

/// A validated, not-yet-numbered ledger entry. The store allocates the
/// transaction number and inserts the record in one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDraft {
    pub kind: TransactionKind,
    pub order_id: Option<OrderId>,
    pub country: Country,
    pub currency: String,
    pub amount: Decimal,
    pub subtotal: Option<Decimal>,
    pub vat_amount: Option<Decimal>,
    pub description: String,
    pub transaction_date: DateTime<Utc>,
    pub recorded_by: UserId,
    pub details: TransactionDetails,
    pub created_at: DateTime<Utc>,
}

impl TransactionDraft {
    /// Direct sale entry recorded by an administrator.
    pub fn sale(entry: SaleEntry, recorded_by: UserId, now: DateTime<Utc>) -> EngineResult<Self> {
        if entry.amount <= Decimal::ZERO {
            return Err(EngineError::validation("amount must be positive"));
        }
        let currency = entry
            .currency
            .unwrap_or_else(|| currency_for(&entry.country).to_string());
        Ok(Self {
            kind: TransactionKind::Sale,
            order_id: None,
            country: entry.country,
            currency,
            amount: entry.amount,
            subtotal: entry.subtotal,
            vat_amount: entry.vat_amount,
            description: entry.description,
            transaction_date: entry.transaction_date,
            recorded_by,
            details: TransactionDetails::Sale(SaleDetails {
                items: entry.items,
                customer_name: entry.customer_name,
                customer_email: entry.customer_email,
                customer_phone: entry.customer_phone,
                user_id: entry.user_id,
                payment_method: entry.payment_method,
                payment_reference: entry.payment_reference,
            }),
            created_at: now,
        })
    }

    /// Expense entry recorded by an administrator.
    pub fn expense(
        entry: ExpenseEntry,
        recorded_by: UserId,
        now: DateTime<Utc>,
    ) -> EngineResult<Self> {
        if entry.amount <= Decimal::ZERO {
            return Err(EngineError::validation("amount must be positive"));
        }
        if entry.expense_category.trim().is_empty() {
            return Err(EngineError::validation("expense category is required"));
        }
        let currency = entry
            .currency
            .unwrap_or_else(|| currency_for(&entry.country).to_string());
        Ok(Self {
            kind: TransactionKind::Expense,
            order_id: None,
            country: entry.country,
            currency,
            amount: entry.amount,
            subtotal: None,
            vat_amount: None,
            description: entry.description,
            transaction_date: entry.transaction_date,
            recorded_by,
            details: TransactionDetails::Expense(ExpenseDetails {
                expense_category: entry.expense_category,
                vendor: entry.vendor,
                invoice_number: entry.invoice_number,
                receipt_url: entry.receipt_url,
            }),
            created_at: now,
        })
    }

    /// Sale entry derived from an order payment: snapshots the order's items,
    /// amounts and customer identification and keeps the back-reference.
    pub fn sale_from_order(order: &Order, recorded_by: UserId, now: DateTime<Utc>) -> Self {
        Self {
            kind: TransactionKind::Sale,
            order_id: Some(order.id),
            country: order.country.clone(),
            currency: currency_for(&order.country).to_string(),
            amount: order.total_amount,
            subtotal: Some(order.subtotal),
            vat_amount: Some(order.tax_amount),
            description: format!("Payment for order {}", order.order_number),
            transaction_date: now,
            recorded_by,
            details: TransactionDetails::Sale(SaleDetails {
                items: order.items.clone(),
                customer_name: Some(order.shipping.recipient_name.clone()),
                customer_email: order.shipping.recipient_email.clone(),
                customer_phone: order.shipping.recipient_phone.clone(),
                user_id: order.user_id,
                payment_method: order.payment_method.clone(),
                payment_reference: order.payment_reference.clone(),
            }),
            created_at: now,
        }
    }

    /// The sequence scope this entry allocates from, e.g. `"EXP-RW2501-"`.
    /// Scoped to the recording month, not the (possibly historical)
    /// transaction date.
    pub fn number_scope(&self) -> String {
        transaction_scope(self.kind, &self.country, self.created_at)
    }

    /// Materialize the record under its allocated number.
    pub fn into_record(self, transaction_number: String) -> TransactionRecord {
        TransactionRecord {
            id: TransactionId::new(),
            transaction_number,
            kind: self.kind,
            order_id: self.order_id,
            country: self.country,
            currency: self.currency,
            amount: self.amount,
            subtotal: self.subtotal,
            vat_amount: self.vat_amount,
            description: self.description,
            transaction_date: self.transaction_date,
            recorded_by: self.recorded_by,
            details: self.details,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sokoni_core::ProductId;
    use sokoni_inventory::StockLevel;
    use sokoni_orders::{OrderDraft, ShippingDetails};

    fn rwanda() -> Country {
        Country::new("RW").unwrap()
    }

    fn expense_entry(amount: Decimal) -> ExpenseEntry {
        ExpenseEntry {
            country: rwanda(),
            currency: None,
            amount,
            description: "Warehouse rent".to_string(),
            transaction_date: Utc::now(),
            expense_category: "rent".to_string(),
            vendor: Some("Kigali Heights Ltd".to_string()),
            invoice_number: Some("INV-2025-014".to_string()),
            receipt_url: None,
        }
    }

    #[test]
    fn scopes_carry_the_kind_prefix() {
        let at = Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap();
        assert_eq!(
            transaction_scope(TransactionKind::Sale, &rwanda(), at),
            "SAL-RW2501-"
        );
        assert_eq!(
            transaction_scope(TransactionKind::Expense, &rwanda(), at),
            "EXP-RW2501-"
        );
    }

    #[test]
    fn expense_draft_defaults_currency_from_country() {
        let draft =
            TransactionDraft::expense(expense_entry(Decimal::new(450_000, 0)), UserId::new(), Utc::now())
                .unwrap();
        assert_eq!(draft.currency, "RWF");
        assert_eq!(draft.kind, TransactionKind::Expense);
        assert!(draft.order_id.is_none());
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let err = TransactionDraft::expense(expense_entry(Decimal::ZERO), UserId::new(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn expense_requires_a_category() {
        let mut entry = expense_entry(Decimal::new(100, 0));
        entry.expense_category = "  ".to_string();
        let err = TransactionDraft::expense(entry, UserId::new(), Utc::now()).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn sale_from_order_snapshots_items_and_amounts() {
        let level = StockLevel::new(
            ProductId::new(),
            "Basket",
            Decimal::new(5_000, 0),
            Decimal::from(18),
            10,
            Utc::now(),
        );
        let mut order = OrderDraft::new(
            rwanda(),
            Some(UserId::new()),
            ShippingDetails {
                recipient_name: "Chantal M.".to_string(),
                recipient_email: Some("chantal@example.com".to_string()),
                recipient_phone: None,
                address_line: "KK 15 Rd".to_string(),
                city: "Kigali".to_string(),
                district: None,
                postal_code: None,
            },
            vec![sokoni_orders::OrderItem::from_stock(&level, 2)],
            Utc::now(),
        )
        .into_order("RW2501-0000007".to_string());
        order
            .mark_paid(
                &sokoni_orders::PaymentDetails {
                    method: "card".to_string(),
                    reference: Some("CH-99".to_string()),
                    notes: None,
                },
                Utc::now(),
            )
            .unwrap();

        let admin = UserId::new();
        let draft = TransactionDraft::sale_from_order(&order, admin, Utc::now());

        assert_eq!(draft.order_id, Some(order.id));
        assert_eq!(draft.amount, order.total_amount);
        assert_eq!(draft.subtotal, Some(order.subtotal));
        assert_eq!(draft.vat_amount, Some(order.tax_amount));
        assert_eq!(draft.currency, "RWF");
        assert_eq!(draft.recorded_by, admin);
        match &draft.details {
            TransactionDetails::Sale(sale) => {
                assert_eq!(sale.items, order.items);
                assert_eq!(sale.payment_method.as_deref(), Some("card"));
                assert_eq!(sale.payment_reference.as_deref(), Some("CH-99"));
            }
            other => panic!("expected sale details, got {other:?}"),
        }

        let record = draft.into_record("SAL-RW2501-0000001".to_string());
        assert_eq!(record.transaction_number, "SAL-RW2501-0000001");
        assert!(record.description.contains("RW2501-0000007"));
    }
}
