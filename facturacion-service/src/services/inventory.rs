//! Inventory ledger: per-SKU stock plus an append-only movement journal.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

use service_core::error::AppError;

use crate::models::invoice::LineRequest;
use crate::models::stock::{MovementDirection, ProductVariant, StockLevel};
use crate::services::metrics::{DB_QUERY_DURATION, STOCK_MOVEMENTS_TOTAL};

/// Stock operations the workflow consumes. Exposed as a trait so the
/// workflow can be exercised without a database.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Validation-only pass over an order: every referenced SKU must exist
    /// and cover the requested quantity. No mutation.
    async fn check_availability(&self, lines: &[LineRequest]) -> Result<(), AppError>;

    async fn get_variant(&self, variant_id: Uuid) -> Result<Option<ProductVariant>, AppError>;

    /// Applies a signed quantity to the SKU's stock and journals exactly one
    /// movement, atomically. Issuance deducts (negative), void restores
    /// (positive). Fails with `InsufficientStock` when the result would go
    /// negative.
    async fn adjust(
        &self,
        variant_id: Uuid,
        quantity_delta: i64,
        description: &str,
        invoice_id: Option<Uuid>,
    ) -> Result<StockLevel, AppError>;
}

/// Requested quantities aggregated per variant, so an order holding the same
/// SKU on two lines is checked against the combined amount.
pub fn aggregate_quantities(lines: &[LineRequest]) -> HashMap<Uuid, i64> {
    let mut wanted: HashMap<Uuid, i64> = HashMap::new();
    for line in lines {
        *wanted.entry(line.variant_id).or_insert(0) += line.quantity;
    }
    wanted
}

/// Postgres-backed inventory ledger.
#[derive(Clone)]
pub struct PgInventoryLedger {
    pool: PgPool,
}

impl PgInventoryLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InventoryLedger for PgInventoryLedger {
    #[instrument(skip(self, lines), fields(line_count = lines.len()))]
    async fn check_availability(&self, lines: &[LineRequest]) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["check_availability"])
            .start_timer();

        let wanted = aggregate_quantities(lines);
        let ids: Vec<Uuid> = wanted.keys().copied().collect();

        let variants: Vec<ProductVariant> = sqlx::query_as::<_, ProductVariant>(
            r#"
            SELECT variant_id, product_id, sku, size, color, stock, unit_price, created_utc
            FROM product_variants
            WHERE variant_id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch variants: {}", e)))?;

        let by_id: HashMap<Uuid, &ProductVariant> =
            variants.iter().map(|v| (v.variant_id, v)).collect();

        for (variant_id, requested) in &wanted {
            match by_id.get(variant_id) {
                None => {
                    return Err(AppError::SkuNotFound {
                        sku: variant_id.to_string(),
                    });
                }
                Some(variant) if variant.stock < *requested => {
                    return Err(AppError::InsufficientStock {
                        sku: variant.sku.clone(),
                        available: variant.stock,
                        requested: *requested,
                    });
                }
                Some(_) => {}
            }
        }

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_variant(&self, variant_id: Uuid) -> Result<Option<ProductVariant>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_variant"])
            .start_timer();

        let variant = sqlx::query_as::<_, ProductVariant>(
            r#"
            SELECT variant_id, product_id, sku, size, color, stock, unit_price, created_utc
            FROM product_variants
            WHERE variant_id = $1
            "#,
        )
        .bind(variant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get variant: {}", e)))?;

        timer.observe_duration();
        Ok(variant)
    }

    #[instrument(skip(self, description))]
    async fn adjust(
        &self,
        variant_id: Uuid,
        quantity_delta: i64,
        description: &str,
        invoice_id: Option<Uuid>,
    ) -> Result<StockLevel, AppError> {
        if quantity_delta == 0 {
            return Err(AppError::Validation(
                "stock adjustment must be non-zero".to_string(),
            ));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["adjust_stock"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // Conditional update: the stock check and the write are one atomic
        // statement, so concurrent adjustments serialize per SKU.
        let updated: Option<(String, i64)> = sqlx::query_as(
            r#"
            UPDATE product_variants
            SET stock = stock + $2
            WHERE variant_id = $1 AND stock + $2 >= 0
            RETURNING sku, stock
            "#,
        )
        .bind(variant_id)
        .bind(quantity_delta)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to adjust stock: {}", e)))?;

        let (sku, new_stock) = match updated {
            Some(row) => row,
            None => {
                let existing: Option<(String, i64)> = sqlx::query_as(
                    "SELECT sku, stock FROM product_variants WHERE variant_id = $1",
                )
                .bind(variant_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to get variant: {}", e))
                })?;

                return Err(match existing {
                    None => AppError::SkuNotFound {
                        sku: variant_id.to_string(),
                    },
                    Some((sku, stock)) => AppError::InsufficientStock {
                        sku,
                        available: stock,
                        requested: quantity_delta.unsigned_abs() as i64,
                    },
                });
            }
        };

        let direction = MovementDirection::from_delta(quantity_delta);
        sqlx::query(
            r#"
            INSERT INTO stock_movements
                (movement_id, variant_id, direction, quantity, description, invoice_id, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(variant_id)
        .bind(direction.as_str())
        .bind(quantity_delta.unsigned_abs() as i64)
        .bind(description)
        .bind(invoice_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to journal movement: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        STOCK_MOVEMENTS_TOTAL
            .with_label_values(&[direction.as_str()])
            .inc();

        info!(
            sku = %sku,
            delta = quantity_delta,
            new_stock = new_stock,
            "stock adjusted"
        );

        Ok(StockLevel {
            variant_id,
            sku,
            quantity: new_stock,
        })
    }
}
