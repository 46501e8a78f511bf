//! Financial summary: computed on read, never materialized.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::transaction::{TransactionKind, TransactionRecord};

/// Aggregate over a filtered set of ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub total_sales: Decimal,
    pub total_expenses: Decimal,
    pub net_profit: Decimal,
    pub sales_count: u64,
    pub expenses_count: u64,
}

impl FinancialSummary {
    pub fn from_parts(
        total_sales: Decimal,
        total_expenses: Decimal,
        sales_count: u64,
        expenses_count: u64,
    ) -> Self {
        Self {
            total_sales,
            total_expenses,
            net_profit: total_sales - total_expenses,
            sales_count,
            expenses_count,
        }
    }
}

/// Fold a set of records into a summary. Amounts are stored positive; the
/// sign comes from the kind.
pub fn summarize<'a, I>(records: I) -> FinancialSummary
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    let mut total_sales = Decimal::ZERO;
    let mut total_expenses = Decimal::ZERO;
    let mut sales_count = 0;
    let mut expenses_count = 0;

    for record in records {
        match record.kind {
            TransactionKind::Sale => {
                total_sales += record.amount;
                sales_count += 1;
            }
            TransactionKind::Expense => {
                total_expenses += record.amount;
                expenses_count += 1;
            }
        }
    }

    FinancialSummary::from_parts(total_sales, total_expenses, sales_count, expenses_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{ExpenseEntry, SaleEntry, TransactionDraft};
    use chrono::Utc;
    use proptest::prelude::*;
    use sokoni_core::{Country, UserId};

    fn sale(amount: i64) -> TransactionRecord {
        let entry = SaleEntry {
            country: Country::new("RW").unwrap(),
            currency: None,
            amount: Decimal::from(amount),
            subtotal: None,
            vat_amount: None,
            description: "walk-in sale".to_string(),
            transaction_date: Utc::now(),
            items: Vec::new(),
            customer_name: None,
            customer_email: None,
            customer_phone: None,
            user_id: None,
            payment_method: Some("cash".to_string()),
            payment_reference: None,
        };
        TransactionDraft::sale(entry, UserId::new(), Utc::now())
            .unwrap()
            .into_record("SAL-RW2501-0000001".to_string())
    }

    fn expense(amount: i64) -> TransactionRecord {
        let entry = ExpenseEntry {
            country: Country::new("RW").unwrap(),
            currency: None,
            amount: Decimal::from(amount),
            description: "fuel".to_string(),
            transaction_date: Utc::now(),
            expense_category: "logistics".to_string(),
            vendor: None,
            invoice_number: None,
            receipt_url: None,
        };
        TransactionDraft::expense(entry, UserId::new(), Utc::now())
            .unwrap()
            .into_record("EXP-RW2501-0000001".to_string())
    }

    #[test]
    fn empty_ledger_summarizes_to_zero() {
        let records: Vec<TransactionRecord> = Vec::new();
        let summary = summarize(&records);
        assert_eq!(summary, FinancialSummary::default());
    }

    #[test]
    fn net_profit_is_sales_minus_expenses() {
        let records = vec![sale(1_000), sale(250), expense(400)];
        let summary = summarize(&records);

        assert_eq!(summary.total_sales, Decimal::from(1_250));
        assert_eq!(summary.total_expenses, Decimal::from(400));
        assert_eq!(summary.net_profit, Decimal::from(850));
        assert_eq!(summary.sales_count, 2);
        assert_eq!(summary.expenses_count, 1);
    }

    proptest! {
        /// Counts partition the record set and totals never mix kinds.
        #[test]
        fn summary_partitions_by_kind(
            sales in prop::collection::vec(1i64..100_000, 0..8),
            expenses in prop::collection::vec(1i64..100_000, 0..8),
        ) {
            let records: Vec<_> = sales
                .iter()
                .map(|amount| sale(*amount))
                .chain(expenses.iter().map(|amount| expense(*amount)))
                .collect();
            let summary = summarize(&records);

            prop_assert_eq!(summary.sales_count as usize, sales.len());
            prop_assert_eq!(summary.expenses_count as usize, expenses.len());
            prop_assert_eq!(summary.total_sales, sales.iter().copied().map(Decimal::from).sum::<Decimal>());
            prop_assert_eq!(summary.total_expenses, expenses.iter().copied().map(Decimal::from).sum::<Decimal>());
            prop_assert_eq!(summary.net_profit, summary.total_sales - summary.total_expenses);
        }
    }
}
