//! Account ledger: running balances with an append-only, immutable journal.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::postgres::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

use service_core::error::AppError;

use crate::models::account::{
    Account, AccountStatement, AccountTransaction, CreateAccount, CreatePaymentPlan, DateRange,
    PaymentPlan, Posting, UpdateAccount,
};
use crate::models::invoice::round2;
use crate::services::metrics::DB_QUERY_DURATION;

/// Account operations the workflow (and operators) consume.
#[async_trait]
pub trait AccountLedger: Send + Sync {
    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>, AppError>;

    async fn create_account(&self, input: &CreateAccount) -> Result<Account, AppError>;

    async fn update_account(
        &self,
        account_id: Uuid,
        input: &UpdateAccount,
    ) -> Result<Option<Account>, AppError>;

    /// Appends one journal row and moves the balance as a single unit.
    /// Debits (which increase what is owed) are checked against the credit
    /// limit; credits always pass.
    async fn post(&self, posting: &Posting) -> Result<AccountTransaction, AppError>;

    /// Ordered transactions in range plus debit/credit totals. Pure read.
    async fn statement(
        &self,
        account_id: Uuid,
        range: DateRange,
    ) -> Result<AccountStatement, AppError>;

    async fn create_payment_plan(
        &self,
        input: &CreatePaymentPlan,
    ) -> Result<PaymentPlan, AppError>;
}

/// Postgres-backed account ledger.
#[derive(Clone)]
pub struct PgAccountLedger {
    pool: PgPool,
}

impl PgAccountLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ACCOUNT_COLUMNS: &str = "account_id, name, document_type, document_number, email, phone, \
                               address, kind, credit_limit, current_balance, status, \
                               last_transaction_utc, created_utc";

const TRANSACTION_COLUMNS: &str = "transaction_id, account_id, direction, amount, description, \
                                   payment_method, reference_number, invoice_id, balance_after, \
                                   created_by, created_utc";

#[async_trait]
impl AccountLedger for PgAccountLedger {
    #[instrument(skip(self))]
    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_account"])
            .start_timer();

        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE account_id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get account: {}", e)))?;

        timer.observe_duration();
        Ok(account)
    }

    #[instrument(skip(self, input), fields(document_number = %input.document_number))]
    async fn create_account(&self, input: &CreateAccount) -> Result<Account, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_account"])
            .start_timer();

        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO accounts
                (account_id, name, document_type, document_number, email, phone, address,
                 kind, credit_limit, current_balance, status, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, 'active', $10)
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.document_type)
        .bind(&input.document_number)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(input.kind.as_str())
        .bind(input.credit_limit)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "An account already exists for document {} {}",
                    input.document_type,
                    input.document_number
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create account: {}", e)),
        })?;

        timer.observe_duration();
        info!(account_id = %account.account_id, "account created");
        Ok(account)
    }

    #[instrument(skip(self, input))]
    async fn update_account(
        &self,
        account_id: Uuid,
        input: &UpdateAccount,
    ) -> Result<Option<Account>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_account"])
            .start_timer();

        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            UPDATE accounts
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                phone = COALESCE($4, phone),
                address = COALESCE($5, address),
                credit_limit = COALESCE($6, credit_limit),
                status = COALESCE($7, status)
            WHERE account_id = $1
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(account_id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(input.credit_limit)
        .bind(input.status.map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update account: {}", e)))?;

        timer.observe_duration();
        Ok(account)
    }

    #[instrument(
        skip(self, posting),
        fields(
            account_id = %posting.account_id,
            direction = posting.direction.as_str(),
            amount = %posting.amount
        )
    )]
    async fn post(&self, posting: &Posting) -> Result<AccountTransaction, AppError> {
        if posting.amount <= Decimal::ZERO {
            return Err(AppError::Validation(
                "transaction amount must be positive".to_string(),
            ));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["post_transaction"])
            .start_timer();

        let signed = posting.direction.signed(posting.amount);
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // Conditional update: balance move and credit-limit check in one
        // atomic statement; only debits are limited.
        let updated: Option<(Decimal,)> = sqlx::query_as(
            r#"
            UPDATE accounts
            SET current_balance = current_balance + $2,
                last_transaction_utc = $3
            WHERE account_id = $1
              AND ($2 <= 0 OR current_balance + $2 <= credit_limit)
            RETURNING current_balance
            "#,
        )
        .bind(posting.account_id)
        .bind(signed)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to move balance: {}", e)))?;

        let (balance_after,) = match updated {
            Some(row) => row,
            None => {
                let account: Option<(Decimal, Decimal)> = sqlx::query_as(
                    "SELECT current_balance, credit_limit FROM accounts WHERE account_id = $1",
                )
                .bind(posting.account_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to get account: {}", e))
                })?;

                return Err(match account {
                    None => AppError::NotFound(anyhow::anyhow!(
                        "Account {} does not exist",
                        posting.account_id
                    )),
                    Some((balance, limit)) => AppError::CreditLimitExceeded {
                        account_id: posting.account_id,
                        balance,
                        attempted: posting.amount,
                        limit,
                    },
                });
            }
        };

        let transaction = sqlx::query_as::<_, AccountTransaction>(&format!(
            r#"
            INSERT INTO account_transactions
                (transaction_id, account_id, direction, amount, description, payment_method,
                 reference_number, invoice_id, balance_after, created_by, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(posting.account_id)
        .bind(posting.direction.as_str())
        .bind(posting.amount)
        .bind(&posting.description)
        .bind(&posting.payment_method)
        .bind(&posting.reference_number)
        .bind(posting.invoice_id)
        .bind(balance_after)
        .bind(posting.created_by)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to append transaction: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(
            transaction_id = %transaction.transaction_id,
            balance_after = %balance_after,
            "transaction posted"
        );

        Ok(transaction)
    }

    #[instrument(skip(self))]
    async fn statement(
        &self,
        account_id: Uuid,
        range: DateRange,
    ) -> Result<AccountStatement, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["statement"])
            .start_timer();

        let account = self
            .get_account(account_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Account {}", account_id)))?;

        let transactions = sqlx::query_as::<_, AccountTransaction>(&format!(
            r#"
            SELECT {}
            FROM account_transactions
            WHERE account_id = $1
              AND ($2::date IS NULL OR created_utc::date >= $2)
              AND ($3::date IS NULL OR created_utc::date <= $3)
            ORDER BY created_utc ASC
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(account_id)
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list entries: {}", e)))?;

        timer.observe_duration();

        let totals = AccountStatement::totals_of(&transactions);
        Ok(AccountStatement {
            account_id: account.account_id,
            account_name: account.name,
            current_balance: account.current_balance,
            transactions,
            totals,
        })
    }

    #[instrument(skip(self, input), fields(account_id = %input.account_id))]
    async fn create_payment_plan(
        &self,
        input: &CreatePaymentPlan,
    ) -> Result<PaymentPlan, AppError> {
        if input.installments < 1 {
            return Err(AppError::Validation(
                "a payment plan needs at least one installment".to_string(),
            ));
        }
        if input.total_amount <= Decimal::ZERO {
            return Err(AppError::Validation(
                "payment plan amount must be positive".to_string(),
            ));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_payment_plan"])
            .start_timer();

        let installment_amount = round2(input.total_amount / Decimal::from(input.installments));

        let plan = sqlx::query_as::<_, PaymentPlan>(
            r#"
            INSERT INTO payment_plans
                (plan_id, account_id, total_amount, installments, installment_amount,
                 frequency, start_date, status, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'active', $8)
            RETURNING plan_id, account_id, total_amount, installments, installment_amount,
                      frequency, start_date, status, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.account_id)
        .bind(input.total_amount)
        .bind(input.installments)
        .bind(installment_amount)
        .bind(input.frequency.as_str())
        .bind(input.start_date)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create payment plan: {}", e))
        })?;

        timer.observe_duration();
        info!(plan_id = %plan.plan_id, "payment plan created");
        Ok(plan)
    }
}
