//! Customer/supplier account and its running-balance journal.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Account kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Customer,
    Supplier,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Customer => "customer",
            AccountKind::Supplier => "supplier",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "supplier" => AccountKind::Supplier,
            _ => AccountKind::Customer,
        }
    }
}

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "suspended" => AccountStatus::Suspended,
            _ => AccountStatus::Active,
        }
    }
}

/// Journal direction. A debit increases what the account owes the business,
/// a credit decreases it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Debit => "debit",
            Direction::Credit => "credit",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "credit" => Direction::Credit,
            _ => Direction::Debit,
        }
    }

    /// Balance impact of a positive `amount` moved in this direction.
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            Direction::Debit => amount,
            Direction::Credit => -amount,
        }
    }
}

/// Running account. `current_balance` is positive when the holder owes the
/// business, and is only ever changed together with a journal append.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub account_id: Uuid,
    pub name: String,
    pub document_type: String,
    pub document_number: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub kind: String,
    pub credit_limit: Decimal,
    pub current_balance: Decimal,
    pub status: String,
    pub last_transaction_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        AccountStatus::from_string(&self.status) == AccountStatus::Active
    }

    pub fn parsed_kind(&self) -> AccountKind {
        AccountKind::from_string(&self.kind)
    }
}

/// Append-only journal row. `balance_after` is snapshotted at write time and
/// never recomputed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccountTransaction {
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub direction: String,
    pub amount: Decimal,
    pub description: String,
    pub payment_method: Option<String>,
    pub reference_number: Option<String>,
    pub invoice_id: Option<Uuid>,
    pub balance_after: Decimal,
    pub created_by: Uuid,
    pub created_utc: DateTime<Utc>,
}

impl AccountTransaction {
    pub fn parsed_direction(&self) -> Direction {
        Direction::from_string(&self.direction)
    }

    /// Signed balance impact of this row.
    pub fn signed_amount(&self) -> Decimal {
        self.parsed_direction().signed(self.amount)
    }
}

/// Replays a journal in order and returns the resulting balance. The result
/// must equal the account's `current_balance` at all times.
pub fn replay_balance(transactions: &[AccountTransaction]) -> Decimal {
    transactions
        .iter()
        .map(AccountTransaction::signed_amount)
        .sum()
}

/// Input for creating an account.
#[derive(Debug, Clone)]
pub struct CreateAccount {
    pub name: String,
    pub document_type: String,
    pub document_number: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub kind: AccountKind,
    pub credit_limit: Decimal,
}

/// Input for updating an account. Holder identity (document type/number) is
/// immutable.
#[derive(Debug, Clone, Default)]
pub struct UpdateAccount {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub credit_limit: Option<Decimal>,
    pub status: Option<AccountStatus>,
}

/// One posting against an account.
#[derive(Debug, Clone)]
pub struct Posting {
    pub account_id: Uuid,
    pub direction: Direction,
    pub amount: Decimal,
    pub description: String,
    pub payment_method: Option<String>,
    pub reference_number: Option<String>,
    pub invoice_id: Option<Uuid>,
    pub created_by: Uuid,
}

/// Inclusive date filter for statements. `None` bounds are open.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatementTotals {
    pub debits: Decimal,
    pub credits: Decimal,
}

/// Statement: ordered transactions in range plus running totals. Pure read.
#[derive(Debug, Clone, Serialize)]
pub struct AccountStatement {
    pub account_id: Uuid,
    pub account_name: String,
    pub current_balance: Decimal,
    pub transactions: Vec<AccountTransaction>,
    pub totals: StatementTotals,
}

impl AccountStatement {
    /// Computes debit/credit totals over a transaction slice.
    pub fn totals_of(transactions: &[AccountTransaction]) -> StatementTotals {
        let mut totals = StatementTotals {
            debits: Decimal::ZERO,
            credits: Decimal::ZERO,
        };
        for tx in transactions {
            match tx.parsed_direction() {
                Direction::Debit => totals.debits += tx.amount,
                Direction::Credit => totals.credits += tx.amount,
            }
        }
        totals
    }
}

/// Installment-plan frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanFrequency {
    Weekly,
    Monthly,
}

impl PlanFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanFrequency::Weekly => "weekly",
            PlanFrequency::Monthly => "monthly",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "weekly" => PlanFrequency::Weekly,
            _ => PlanFrequency::Monthly,
        }
    }
}

/// Payment plan attached to an account. Only the schedule is stored;
/// collection happens through ordinary postings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentPlan {
    pub plan_id: Uuid,
    pub account_id: Uuid,
    pub total_amount: Decimal,
    pub installments: i32,
    pub installment_amount: Decimal,
    pub frequency: String,
    pub start_date: NaiveDate,
    pub status: String,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a payment plan.
#[derive(Debug, Clone)]
pub struct CreatePaymentPlan {
    pub account_id: Uuid,
    pub total_amount: Decimal,
    pub installments: i32,
    pub frequency: PlanFrequency,
    pub start_date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn tx(direction: Direction, amount: &str, balance_after: &str) -> AccountTransaction {
        AccountTransaction {
            transaction_id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            direction: direction.as_str().to_string(),
            amount: dec(amount),
            description: "test".into(),
            payment_method: None,
            reference_number: None,
            invoice_id: None,
            balance_after: dec(balance_after),
            created_by: Uuid::new_v4(),
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn replay_reproduces_the_balance() {
        let journal = vec![
            tx(Direction::Debit, "18150.00", "18150.00"),
            tx(Direction::Credit, "5000.00", "13150.00"),
            tx(Direction::Debit, "100.50", "13250.50"),
        ];
        assert_eq!(replay_balance(&journal), dec("13250.50"));
        assert_eq!(
            journal.last().unwrap().balance_after,
            replay_balance(&journal)
        );
    }

    #[test]
    fn statement_totals_split_by_direction() {
        let journal = vec![
            tx(Direction::Debit, "100.00", "100.00"),
            tx(Direction::Debit, "50.00", "150.00"),
            tx(Direction::Credit, "30.00", "120.00"),
        ];
        let totals = AccountStatement::totals_of(&journal);
        assert_eq!(totals.debits, dec("150.00"));
        assert_eq!(totals.credits, dec("30.00"));
    }
}
