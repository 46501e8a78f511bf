//! Outgoing messages and their plain-text bodies.

use serde::{Deserialize, Serialize};

use sokoni_ledger::TransactionRecord;
use sokoni_orders::{DeliveryStatus, Order};

/// A rendered outgoing email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Confirmation sent after checkout. `None` when the order carries no
/// recipient email.
pub fn order_confirmation(order: &Order) -> Option<EmailMessage> {
    let to = order.shipping.recipient_email.clone()?;
    let mut lines = vec![
        format!("Hello {},", order.shipping.recipient_name),
        String::new(),
        format!(
            "Thank you for your order. Your reference number is {}.",
            order.order_number
        ),
        String::new(),
    ];
    for item in &order.items {
        lines.push(format!(
            "  {} x{}: {} (tax {})",
            item.name,
            item.quantity,
            item.line_total(),
            item.tax_amount
        ));
    }
    lines.push(String::new());
    lines.push(format!("Subtotal: {}", order.subtotal));
    lines.push(format!("Tax:      {}", order.tax_amount));
    lines.push(format!("Total:    {}", order.total_amount));
    lines.push(String::new());
    lines.push(format!(
        "We will deliver to {}, {}.",
        order.shipping.address_line, order.shipping.city
    ));

    Some(EmailMessage {
        to,
        subject: format!("Order {} confirmed", order.order_number),
        body: lines.join("\n"),
    })
}

/// Notification for a delivery-status change, carrying old and new status.
pub fn status_update(order: &Order, previous: DeliveryStatus) -> Option<EmailMessage> {
    let to = order.shipping.recipient_email.clone()?;
    let mut body = format!(
        "Hello {},\n\nYour order {} moved from {} to {}.",
        order.shipping.recipient_name, order.order_number, previous, order.delivery_status
    );
    if let Some(tracking) = &order.tracking_number {
        body.push_str(&format!("\nTracking number: {tracking}"));
        if let Some(carrier) = &order.carrier {
            body.push_str(&format!(" ({carrier})"));
        }
    }
    if let Some(eta) = order.estimated_delivery_date {
        body.push_str(&format!("\nEstimated delivery: {eta}"));
    }

    Some(EmailMessage {
        to,
        subject: format!(
            "Order {} is now {}",
            order.order_number, order.delivery_status
        ),
        body,
    })
}

/// Receipt sent after a payment is recorded against an order.
pub fn payment_receipt(order: &Order, entry: &TransactionRecord) -> Option<EmailMessage> {
    let to = order.shipping.recipient_email.clone()?;
    let method = order.payment_method.as_deref().unwrap_or("-");
    let body = format!(
        "Hello {},\n\nWe received your payment of {} {} for order {}.\n\
         Payment method: {}\nReceipt number: {}",
        order.shipping.recipient_name,
        entry.amount,
        entry.currency,
        order.order_number,
        method,
        entry.transaction_number,
    );

    Some(EmailMessage {
        to,
        subject: format!("Payment received for order {}", order.order_number),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use sokoni_core::{Country, ProductId, UserId};
    use sokoni_inventory::StockLevel;
    use sokoni_ledger::TransactionDraft;
    use sokoni_orders::{OrderDraft, OrderItem, PaymentDetails, ShippingDetails};

    fn order(with_email: bool) -> Order {
        let level = StockLevel::new(
            ProductId::new(),
            "Coffee 1kg",
            Decimal::new(12_000, 0),
            Decimal::from(18),
            50,
            Utc::now(),
        );
        OrderDraft::new(
            Country::new("RW").unwrap(),
            Some(UserId::new()),
            ShippingDetails {
                recipient_name: "Eric N.".to_string(),
                recipient_email: with_email.then(|| "eric@example.com".to_string()),
                recipient_phone: Some("+250788123456".to_string()),
                address_line: "KG 9 Ave".to_string(),
                city: "Kigali".to_string(),
                district: None,
                postal_code: None,
            },
            vec![OrderItem::from_stock(&level, 2)],
            Utc::now(),
        )
        .into_order("RW2501-0000003".to_string())
    }

    #[test]
    fn confirmation_includes_number_lines_and_totals() {
        let message = order_confirmation(&order(true)).unwrap();
        assert_eq!(message.to, "eric@example.com");
        assert!(message.subject.contains("RW2501-0000003"));
        assert!(message.body.contains("Coffee 1kg x2"));
        assert!(message.body.contains("Total:"));
    }

    #[test]
    fn no_recipient_email_means_no_message() {
        assert!(order_confirmation(&order(false)).is_none());
    }

    #[test]
    fn status_update_names_both_statuses() {
        let mut o = order(true);
        o.apply_delivery_update(
            &sokoni_orders::DeliveryUpdate {
                new_status: DeliveryStatus::Processing,
                actor: UserId::new(),
                notes: None,
                tracking: None,
            },
            Utc::now(),
        )
        .unwrap();

        let message = status_update(&o, DeliveryStatus::Pending).unwrap();
        assert!(message.body.contains("from PENDING to PROCESSING"));
    }

    #[test]
    fn receipt_references_the_ledger_entry() {
        let mut o = order(true);
        o.mark_paid(
            &PaymentDetails {
                method: "mobile_money".to_string(),
                reference: None,
                notes: None,
            },
            Utc::now(),
        )
        .unwrap();
        let entry = TransactionDraft::sale_from_order(&o, UserId::new(), Utc::now())
            .into_record("SAL-RW2501-0000009".to_string());

        let message = payment_receipt(&o, &entry).unwrap();
        assert!(message.body.contains("SAL-RW2501-0000009"));
        assert!(message.body.contains("mobile_money"));
    }
}
