//! Order lifecycle operations.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use sokoni_core::{Country, EngineError, EngineResult, OrderId, ProductId, UserId};
use sokoni_inventory::{check_availability, StockRequest};
use sokoni_orders::{
    project_timeline, DeliveryUpdate, Order, OrderDraft, OrderItem, ShippingDetails, TimelineStep,
};
use sokoni_store::{EngineStore, OrderFilter, Page, Pagination};

use crate::dispatch::{EmailDispatcher, EmailTask};

/// One requested line at checkout.
#[derive(Debug, Clone, Copy)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Checkout input.
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderLine>,
    pub shipping: ShippingDetails,
    pub country: Country,
    pub user_id: Option<UserId>,
}

impl CreateOrderRequest {
    fn validate(&self) -> EngineResult<()> {
        if self.items.is_empty() {
            return Err(EngineError::validation("order must contain at least one item"));
        }
        let mut seen = HashSet::new();
        for line in &self.items {
            if line.quantity <= 0 {
                return Err(EngineError::validation("quantity must be positive"));
            }
            if !seen.insert(line.product_id) {
                return Err(EngineError::validation(
                    "duplicate product line; merge quantities into one line",
                ));
            }
        }
        self.shipping.validate()
    }

    fn stock_requests(&self) -> Vec<StockRequest> {
        self.items
            .iter()
            .map(|line| StockRequest {
                product_id: line.product_id,
                quantity: line.quantity,
            })
            .collect()
    }
}

/// Order creation, retrieval, delivery transitions and public tracking.
pub struct OrderService<S> {
    store: Arc<S>,
    emails: Option<EmailDispatcher>,
}

impl<S: EngineStore> OrderService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            emails: None,
        }
    }

    pub fn with_emails(mut self, emails: EmailDispatcher) -> Self {
        self.emails = Some(emails);
        self
    }

    /// Create an order as one atomic unit: number allocation, stock
    /// reservation and the insert all commit together or not at all.
    /// The confirmation email is enqueued only after the commit.
    pub async fn create_order(&self, request: CreateOrderRequest) -> EngineResult<Order> {
        request.validate()?;

        let ids: Vec<ProductId> = request.items.iter().map(|line| line.product_id).collect();
        let levels = self.store.stock_levels(&ids).await?;
        // Pre-validation courtesy: reject hopeless requests before opening
        // the write transaction. The store re-validates inside it.
        let requests = request.stock_requests();
        check_availability(&levels, &requests)?;

        let items: Vec<OrderItem> = request
            .items
            .iter()
            .map(|line| {
                let level = levels
                    .iter()
                    .find(|level| level.product_id == line.product_id)
                    .expect("presence checked above");
                OrderItem::from_stock(level, line.quantity)
            })
            .collect();

        let draft = OrderDraft::new(
            request.country,
            request.user_id,
            request.shipping,
            items,
            Utc::now(),
        );
        let order = self.store.create_order(draft).await?;
        info!(order_number = %order.order_number, total = %order.total_amount, "order created");

        if let Some(emails) = &self.emails {
            emails.enqueue(EmailTask::OrderConfirmation {
                order: order.clone(),
            });
        }
        Ok(order)
    }

    pub async fn order(&self, id: OrderId) -> EngineResult<Order> {
        self.store.order(id).await?.ok_or(EngineError::NotFound)
    }

    pub async fn order_by_number(&self, order_number: &str) -> EngineResult<Order> {
        self.store
            .order_by_number(order_number)
            .await?
            .ok_or(EngineError::NotFound)
    }

    pub async fn list(
        &self,
        filter: OrderFilter,
        pagination: Pagination,
    ) -> EngineResult<Page<Order>> {
        Ok(self.store.orders(&filter, pagination).await?)
    }

    /// Change delivery status under the transition table. The status-update
    /// email carries both the old and new status.
    pub async fn change_delivery_status(
        &self,
        id: OrderId,
        update: DeliveryUpdate,
    ) -> EngineResult<Order> {
        let change = self.store.apply_delivery_update(id, update).await?;
        info!(
            order_number = %change.order.order_number,
            from = %change.previous,
            to = %change.order.delivery_status,
            "delivery status changed"
        );
        if let Some(emails) = &self.emails {
            emails.enqueue(EmailTask::StatusUpdate {
                order: change.order.clone(),
                previous: change.previous,
            });
        }
        Ok(change.order)
    }

    pub async fn add_delivery_notes(&self, id: OrderId, notes: &str) -> EngineResult<Order> {
        if notes.trim().is_empty() {
            return Err(EngineError::validation("notes must not be empty"));
        }
        Ok(self.store.append_delivery_notes(id, notes).await?)
    }

    /// Public, unauthenticated tracking with identity verification.
    ///
    /// Unknown order numbers and identity mismatches intentionally produce
    /// the same error, so the endpoint cannot be used to probe which numbers
    /// exist.
    pub async fn track_order(
        &self,
        order_number: &str,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> EngineResult<(Order, Vec<TimelineStep>)> {
        if email.is_none() && phone.is_none() {
            return Err(EngineError::validation(
                "an email or phone number is required",
            ));
        }
        let Some(order) = self.store.order_by_number(order_number).await? else {
            debug!(%order_number, "tracking lookup for unknown order number");
            return Err(EngineError::TrackingDenied);
        };
        if !order.matches_identity(email, phone) {
            debug!(%order_number, "tracking identity mismatch");
            return Err(EngineError::TrackingDenied);
        }
        let timeline = project_timeline(&order);
        Ok((order, timeline))
    }
}
