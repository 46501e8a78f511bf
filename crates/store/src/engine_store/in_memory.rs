//! In-memory engine store.
//!
//! Intended for tests/dev. A single mutex stands in for the database: every
//! unit of work runs under the lock, so units are serialized exactly like
//! transactions, and nothing is mutated until every check for the unit has
//! passed.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use sokoni_core::{EngineError, OrderId, ProductId, TransactionId, UserId};
use sokoni_inventory::{check_availability, StockLevel, StockRequest};
use sokoni_ledger::{summarize, FinancialSummary, TransactionDraft, TransactionRecord};
use sokoni_orders::{number, DeliveryUpdate, Order, OrderDraft, PaymentDetails};

use super::error::StoreError;
use super::query::{OrderFilter, Page, Pagination, SummaryFilter, TransactionFilter};
use super::r#trait::{DeliveryChange, EngineStore, PaymentRecorded};

#[derive(Debug, Default)]
struct State {
    products: HashMap<ProductId, StockLevel>,
    orders: HashMap<OrderId, Order>,
    transactions: HashMap<TransactionId, TransactionRecord>,
    counters: HashMap<String, i64>,
}

impl State {
    /// Next sequence value for a scope. First allocation of a scope yields 1.
    fn allocate(&mut self, scope: &str) -> i64 {
        let counter = self.counters.entry(scope.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }
}

/// In-memory [`EngineStore`] implementation.
#[derive(Debug, Default)]
pub struct InMemoryEngineStore {
    state: Mutex<State>,
}

impl InMemoryEngineStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self, operation: &str) -> Result<std::sync::MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::database(operation, "lock poisoned"))
    }
}

#[async_trait]
impl EngineStore for InMemoryEngineStore {
    async fn put_product(&self, product: StockLevel) -> Result<(), StoreError> {
        let mut state = self.lock("put_product")?;
        state.products.insert(product.product_id, product);
        Ok(())
    }

    async fn stock_levels(&self, ids: &[ProductId]) -> Result<Vec<StockLevel>, StoreError> {
        let state = self.lock("stock_levels")?;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn create_order(&self, draft: OrderDraft) -> Result<Order, StoreError> {
        let mut state = self.lock("create_order")?;

        // Authoritative re-validation under the lock. Duplicate lines for the
        // same product are merged so the check covers the total decrement.
        let mut merged: Vec<StockRequest> = Vec::new();
        for request in draft.stock_requests() {
            match merged
                .iter_mut()
                .find(|m| m.product_id == request.product_id)
            {
                Some(existing) => existing.quantity += request.quantity,
                None => merged.push(request),
            }
        }
        let requests = merged;
        let levels: Vec<StockLevel> = requests
            .iter()
            .filter_map(|r| state.products.get(&r.product_id).cloned())
            .collect();
        check_availability(&levels, &requests)?;

        // Nothing below can fail; the unit now mutates.
        let scope = draft.number_scope();
        let sequence = state.allocate(&scope);
        let order_number = number::format_number(&scope, sequence);
        for request in &requests {
            let product = state
                .products
                .get_mut(&request.product_id)
                .expect("validated above");
            product.stock -= request.quantity;
            product.in_stock = product.stock > 0;
        }
        let order = draft.into_order(order_number);
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let state = self.lock("order")?;
        Ok(state.orders.get(&id).cloned())
    }

    async fn order_by_number(&self, order_number: &str) -> Result<Option<Order>, StoreError> {
        let state = self.lock("order_by_number")?;
        Ok(state
            .orders
            .values()
            .find(|order| order.order_number == order_number)
            .cloned())
    }

    async fn orders(
        &self,
        filter: &OrderFilter,
        pagination: Pagination,
    ) -> Result<Page<Order>, StoreError> {
        let state = self.lock("orders")?;
        let mut matching: Vec<Order> = state
            .orders
            .values()
            .filter(|order| {
                filter
                    .delivery_status
                    .map(|status| order.delivery_status == status)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.order_number.cmp(&a.order_number))
        });

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();
        Ok(Page::new(items, total, pagination))
    }

    async fn apply_delivery_update(
        &self,
        id: OrderId,
        update: DeliveryUpdate,
    ) -> Result<DeliveryChange, StoreError> {
        let mut state = self.lock("apply_delivery_update")?;
        let order = state
            .orders
            .get_mut(&id)
            .ok_or(StoreError::Domain(EngineError::NotFound))?;
        let previous = order.apply_delivery_update(&update, Utc::now())?;
        Ok(DeliveryChange {
            previous,
            order: order.clone(),
        })
    }

    async fn append_delivery_notes(&self, id: OrderId, notes: &str) -> Result<Order, StoreError> {
        let mut state = self.lock("append_delivery_notes")?;
        let order = state
            .orders
            .get_mut(&id)
            .ok_or(StoreError::Domain(EngineError::NotFound))?;
        order.append_delivery_notes(notes, Utc::now());
        Ok(order.clone())
    }

    async fn record_payment(
        &self,
        id: OrderId,
        payment: PaymentDetails,
        recorded_by: UserId,
    ) -> Result<PaymentRecorded, StoreError> {
        let mut state = self.lock("record_payment")?;
        let now = Utc::now();

        let mut order = state
            .orders
            .get(&id)
            .cloned()
            .ok_or(StoreError::Domain(EngineError::NotFound))?;
        order.mark_paid(&payment, now)?;

        let draft = TransactionDraft::sale_from_order(&order, recorded_by, now);
        let scope = draft.number_scope();
        let sequence = state.allocate(&scope);
        let entry = draft.into_record(number::format_number(&scope, sequence));

        state.orders.insert(id, order.clone());
        state.transactions.insert(entry.id, entry.clone());
        Ok(PaymentRecorded { order, entry })
    }

    async fn set_email_message_id(
        &self,
        id: OrderId,
        message_id: &str,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock("set_email_message_id")?;
        let order = state
            .orders
            .get_mut(&id)
            .ok_or(StoreError::Domain(EngineError::NotFound))?;
        if order.email_message_id.is_some() {
            return Ok(false);
        }
        order.email_message_id = Some(message_id.to_string());
        Ok(true)
    }

    async fn insert_transaction(
        &self,
        draft: TransactionDraft,
    ) -> Result<TransactionRecord, StoreError> {
        let mut state = self.lock("insert_transaction")?;
        let scope = draft.number_scope();
        let sequence = state.allocate(&scope);
        let entry = draft.into_record(number::format_number(&scope, sequence));
        state.transactions.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        let state = self.lock("transaction")?;
        Ok(state.transactions.get(&id).cloned())
    }

    async fn transactions(
        &self,
        filter: &TransactionFilter,
        pagination: Pagination,
    ) -> Result<Page<TransactionRecord>, StoreError> {
        let state = self.lock("transactions")?;
        let mut matching: Vec<TransactionRecord> = state
            .transactions
            .values()
            .filter(|record| {
                filter.kind.map(|kind| record.kind == kind).unwrap_or(true)
                    && filter
                        .country
                        .as_ref()
                        .map(|country| &record.country == country)
                        .unwrap_or(true)
                    && filter
                        .date_from
                        .map(|from| record.transaction_date >= from)
                        .unwrap_or(true)
                    && filter
                        .date_to
                        .map(|to| record.transaction_date <= to)
                        .unwrap_or(true)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.transaction_date
                .cmp(&a.transaction_date)
                .then_with(|| b.transaction_number.cmp(&a.transaction_number))
        });

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();
        Ok(Page::new(items, total, pagination))
    }

    async fn delete_transaction(&self, id: TransactionId) -> Result<bool, StoreError> {
        let mut state = self.lock("delete_transaction")?;
        Ok(state.transactions.remove(&id).is_some())
    }

    async fn financial_summary(
        &self,
        filter: &SummaryFilter,
    ) -> Result<FinancialSummary, StoreError> {
        let state = self.lock("financial_summary")?;
        let filtered: Vec<&TransactionRecord> = state
            .transactions
            .values()
            .filter(|record| filter.matches(&record.country, record.transaction_date))
            .collect();
        Ok(summarize(filtered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use sokoni_core::Country;
    use sokoni_orders::{OrderItem, ShippingDetails};

    fn seeded_product(stock: i64) -> StockLevel {
        StockLevel::new(
            ProductId::new(),
            "Soap bar",
            Decimal::new(500, 0),
            Decimal::from(18),
            stock,
            Utc::now(),
        )
    }

    fn shipping() -> ShippingDetails {
        ShippingDetails {
            recipient_name: "Diane K.".to_string(),
            recipient_email: Some("diane@example.com".to_string()),
            recipient_phone: None,
            address_line: "KN 82 St".to_string(),
            city: "Kigali".to_string(),
            district: None,
            postal_code: None,
        }
    }

    fn draft_for(level: &StockLevel, quantity: i64) -> OrderDraft {
        OrderDraft::new(
            Country::new("RW").unwrap(),
            None,
            shipping(),
            vec![OrderItem::from_stock(level, quantity)],
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn sequences_are_independent_per_scope() {
        let store = InMemoryEngineStore::new();
        let rw = seeded_product(100);
        let ke = StockLevel::new(
            ProductId::new(),
            "Tea box",
            Decimal::new(900, 0),
            Decimal::from(16),
            100,
            Utc::now(),
        );
        store.put_product(rw.clone()).await.unwrap();
        store.put_product(ke.clone()).await.unwrap();

        let first = store.create_order(draft_for(&rw, 1)).await.unwrap();
        let second = store.create_order(draft_for(&rw, 1)).await.unwrap();
        let mut ke_draft = draft_for(&ke, 1);
        ke_draft.country = Country::new("KE").unwrap();
        let other_scope = store.create_order(ke_draft).await.unwrap();

        assert!(first.order_number.ends_with("0000001"));
        assert!(second.order_number.ends_with("0000002"));
        assert!(other_scope.order_number.starts_with("KE"));
        assert!(other_scope.order_number.ends_with("0000001"));
    }

    #[tokio::test]
    async fn failed_creation_leaves_counter_and_stock_untouched() {
        let store = InMemoryEngineStore::new();
        let product = seeded_product(1);
        store.put_product(product.clone()).await.unwrap();

        let err = store.create_order(draft_for(&product, 2)).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Domain(EngineError::InsufficientStock(_))
        ));

        // The next successful order still gets sequence 1.
        let order = store.create_order(draft_for(&product, 1)).await.unwrap();
        assert!(order.order_number.ends_with("0000001"));
        let levels = store.stock_levels(&[product.product_id]).await.unwrap();
        assert_eq!(levels[0].stock, 0);
        assert!(!levels[0].in_stock);
    }

    #[tokio::test]
    async fn message_id_is_written_at_most_once() {
        let store = InMemoryEngineStore::new();
        let product = seeded_product(5);
        store.put_product(product.clone()).await.unwrap();
        let order = store.create_order(draft_for(&product, 1)).await.unwrap();

        assert!(store.set_email_message_id(order.id, "m-1").await.unwrap());
        assert!(!store.set_email_message_id(order.id, "m-2").await.unwrap());
        let stored = store.order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.email_message_id.as_deref(), Some("m-1"));
    }

    #[tokio::test]
    async fn order_listing_paginates_newest_first() {
        let store = InMemoryEngineStore::new();
        let product = seeded_product(100);
        store.put_product(product.clone()).await.unwrap();
        for _ in 0..5 {
            store.create_order(draft_for(&product, 1)).await.unwrap();
        }

        let page = store
            .orders(
                &OrderFilter::default(),
                Pagination {
                    limit: 2,
                    offset: 0,
                },
            )
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 5);
        assert!(page.has_more);
        assert!(page.items[0].order_number > page.items[1].order_number);

        let last = store
            .orders(
                &OrderFilter::default(),
                Pagination {
                    limit: 2,
                    offset: 4,
                },
            )
            .await
            .unwrap();
        assert_eq!(last.items.len(), 1);
        assert!(!last.has_more);
    }
}
