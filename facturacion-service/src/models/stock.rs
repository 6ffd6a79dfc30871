//! Product variant (SKU) and its stock-movement journal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Movement direction. `in` raises stock, `out` lowers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementDirection {
    In,
    Out,
}

impl MovementDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementDirection::In => "in",
            MovementDirection::Out => "out",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "out" => MovementDirection::Out,
            _ => MovementDirection::In,
        }
    }

    /// Direction implied by a signed stock delta.
    pub fn from_delta(delta: i64) -> Self {
        if delta < 0 {
            MovementDirection::Out
        } else {
            MovementDirection::In
        }
    }
}

/// Sellable variant of a product. `sku` is unique; `stock` never goes
/// negative.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductVariant {
    pub variant_id: Uuid,
    pub product_id: Uuid,
    pub sku: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub stock: i64,
    pub unit_price: Decimal,
    pub created_utc: DateTime<Utc>,
}

/// Append-only movement journal row; `quantity` is always positive, the
/// direction carries the sign.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StockMovement {
    pub movement_id: Uuid,
    pub variant_id: Uuid,
    pub direction: String,
    pub quantity: i64,
    pub description: String,
    pub invoice_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

impl StockMovement {
    /// Signed stock impact of this movement.
    pub fn signed_quantity(&self) -> i64 {
        match MovementDirection::from_string(&self.direction) {
            MovementDirection::In => self.quantity,
            MovementDirection::Out => -self.quantity,
        }
    }
}

/// Stock level after an adjustment.
#[derive(Debug, Clone, Serialize)]
pub struct StockLevel {
    pub variant_id: Uuid,
    pub sku: String,
    pub quantity: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_follows_delta_sign() {
        assert_eq!(MovementDirection::from_delta(-3), MovementDirection::Out);
        assert_eq!(MovementDirection::from_delta(3), MovementDirection::In);
        assert_eq!(MovementDirection::from_delta(0), MovementDirection::In);
    }

    #[test]
    fn signed_quantity_reflects_direction() {
        let movement = StockMovement {
            movement_id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            direction: "out".into(),
            quantity: 2,
            description: "venta".into(),
            invoice_id: None,
            created_utc: Utc::now(),
        };
        assert_eq!(movement.signed_quantity(), -2);
    }
}
