//! Database service: pool bootstrap and the invoice store.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::postgres::{PgExecutor, PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use service_core::error::AppError;

use crate::models::invoice::{Invoice, InvoiceEvent, InvoiceLine, InvoiceStatus};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::workflow::InvoiceStore;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

const INVOICE_COLUMNS: &str = "invoice_id, document_type, point_of_sale, voucher_number, \
                               authorization_code, authorization_expires, buyer_account_id, \
                               buyer_name, buyer_doc_type, buyer_doc_number, buyer_address, \
                               subtotal, tax, total, status, error_message, created_utc, \
                               updated_utc";

const LINE_COLUMNS: &str = "line_id, invoice_id, variant_id, sku_snapshot, description, \
                            quantity, unit_price, subtotal, tax, total, created_utc";

const EVENT_COLUMNS: &str =
    "event_id, invoice_id, event_type, description, metadata, created_utc";

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "facturacion-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn insert_event<'e>(
        executor: impl PgExecutor<'e>,
        event: &InvoiceEvent,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO invoice_events
                (event_id, invoice_id, event_type, description, metadata, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.event_id)
        .bind(event.invoice_id)
        .bind(&event.event_type)
        .bind(&event.description)
        .bind(&event.metadata)
        .bind(event.created_utc)
        .execute(executor)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to append event: {}", e)))?;
        Ok(())
    }

    /// Loads the stored status for a precise `InvalidState` error after a
    /// guarded transition matched no row.
    async fn transition_conflict(
        &self,
        invoice_id: Uuid,
        expected: InvoiceStatus,
    ) -> AppError {
        let status: Result<Option<(String,)>, _> =
            sqlx::query_as("SELECT status FROM invoices WHERE invoice_id = $1")
                .bind(invoice_id)
                .fetch_optional(&self.pool)
                .await;

        match status {
            Ok(Some((current,))) => AppError::InvalidState {
                entity: "invoice",
                id: invoice_id,
                current,
                expected: expected.as_str().to_string(),
            },
            Ok(None) => AppError::NotFound(anyhow::anyhow!("Invoice {}", invoice_id)),
            Err(e) => AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)),
        }
    }
}

#[async_trait]
impl InvoiceStore for Database {
    #[instrument(skip(self, invoice, lines, event), fields(invoice_id = %invoice.invoice_id))]
    async fn create_pending(
        &self,
        invoice: &Invoice,
        lines: &[InvoiceLine],
        event: &InvoiceEvent,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_pending"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        sqlx::query(
            r#"
            INSERT INTO invoices
                (invoice_id, document_type, point_of_sale, voucher_number, authorization_code,
                 authorization_expires, buyer_account_id, buyer_name, buyer_doc_type,
                 buyer_doc_number, buyer_address, subtotal, tax, total, status, error_message,
                 created_utc, updated_utc)
            VALUES ($1, $2, $3, NULL, NULL, NULL, $4, $5, $6, $7, $8, $9, $10, $11, 'pending',
                    NULL, $12, $12)
            "#,
        )
        .bind(invoice.invoice_id)
        .bind(&invoice.document_type)
        .bind(invoice.point_of_sale)
        .bind(invoice.buyer_account_id)
        .bind(&invoice.buyer_name)
        .bind(&invoice.buyer_doc_type)
        .bind(&invoice.buyer_doc_number)
        .bind(&invoice.buyer_address)
        .bind(invoice.subtotal)
        .bind(invoice.tax)
        .bind(invoice.total)
        .bind(invoice.created_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert invoice: {}", e)))?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO invoice_lines
                    (line_id, invoice_id, variant_id, sku_snapshot, description, quantity,
                     unit_price, subtotal, tax, total, created_utc)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(line.line_id)
            .bind(line.invoice_id)
            .bind(line.variant_id)
            .bind(&line.sku_snapshot)
            .bind(&line.description)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.subtotal)
            .bind(line.tax)
            .bind(line.total)
            .bind(line.created_utc)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to insert line: {}", e))
            })?;
        }

        Self::insert_event(&mut *tx, event).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        info!(invoice_id = %invoice.invoice_id, "pending invoice persisted");
        Ok(())
    }

    #[instrument(skip(self, authorization_code, event))]
    async fn mark_completed(
        &self,
        invoice_id: Uuid,
        voucher_number: i64,
        authorization_code: &str,
        expires_on: NaiveDate,
        event: &InvoiceEvent,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_completed"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET voucher_number = $2,
                authorization_code = $3,
                authorization_expires = $4,
                status = 'completed',
                updated_utc = $5
            WHERE invoice_id = $1 AND status = 'pending'
            "#,
        )
        .bind(invoice_id)
        .bind(voucher_number)
        .bind(authorization_code)
        .bind(expires_on)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(self
                .transition_conflict(invoice_id, InvoiceStatus::Pending)
                .await);
        }

        Self::insert_event(&mut *tx, event).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, message, event))]
    async fn mark_error(
        &self,
        invoice_id: Uuid,
        message: &str,
        event: &InvoiceEvent,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_error"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = 'error', error_message = $2, updated_utc = $3
            WHERE invoice_id = $1 AND status = 'pending'
            "#,
        )
        .bind(invoice_id)
        .bind(message)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(self
                .transition_conflict(invoice_id, InvoiceStatus::Pending)
                .await);
        }

        Self::insert_event(&mut *tx, event).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, event))]
    async fn mark_voided(&self, invoice_id: Uuid, event: &InvoiceEvent) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_voided"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = 'voided', updated_utc = $2
            WHERE invoice_id = $1 AND status = 'completed'
            "#,
        )
        .bind(invoice_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(self
                .transition_conflict(invoice_id, InvoiceStatus::Completed)
                .await);
        }

        Self::insert_event(&mut *tx, event).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, event), fields(invoice_id = %event.invoice_id))]
    async fn append_event(&self, event: &InvoiceEvent) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["append_event"])
            .start_timer();

        Self::insert_event(&self.pool, event).await?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {} FROM invoices WHERE invoice_id = $1",
            INVOICE_COLUMNS
        ))
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();
        Ok(invoice)
    }

    #[instrument(skip(self))]
    async fn get_lines(&self, invoice_id: Uuid) -> Result<Vec<InvoiceLine>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_lines"])
            .start_timer();

        let lines = sqlx::query_as::<_, InvoiceLine>(&format!(
            "SELECT {} FROM invoice_lines WHERE invoice_id = $1 ORDER BY created_utc",
            LINE_COLUMNS
        ))
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get lines: {}", e)))?;

        timer.observe_duration();
        Ok(lines)
    }

    #[instrument(skip(self))]
    async fn get_events(&self, invoice_id: Uuid) -> Result<Vec<InvoiceEvent>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_events"])
            .start_timer();

        let events = sqlx::query_as::<_, InvoiceEvent>(&format!(
            "SELECT {} FROM invoice_events WHERE invoice_id = $1 ORDER BY created_utc",
            EVENT_COLUMNS
        ))
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get events: {}", e)))?;

        timer.observe_duration();
        Ok(events)
    }

    #[instrument(skip(self))]
    async fn list_invoices(&self, limit: i64) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let limit = limit.clamp(1, 500);
        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {} FROM invoices ORDER BY created_utc DESC LIMIT $1",
            INVOICE_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        timer.observe_duration();
        Ok(invoices)
    }
}
