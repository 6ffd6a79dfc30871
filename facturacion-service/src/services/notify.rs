//! Stock-change notification seam.
//!
//! Downstream catalog mirrors (marketplaces) consume these notifications.
//! Delivery is fire-and-forget: implementations swallow their own failures
//! and the workflow never waits on, retries, or rolls back because of them.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// Payload published after a successful stock adjustment.
#[derive(Debug, Clone, Serialize)]
pub struct StockChanged {
    pub variant_id: Uuid,
    pub sku: String,
    pub new_quantity: i64,
}

#[async_trait]
pub trait StockChangedNotifier: Send + Sync {
    async fn stock_changed(&self, change: StockChanged);
}

/// Default notifier: emits a structured log line for external consumers.
pub struct LoggingNotifier;

#[async_trait]
impl StockChangedNotifier for LoggingNotifier {
    async fn stock_changed(&self, change: StockChanged) {
        info!(
            sku = %change.sku,
            variant_id = %change.variant_id,
            new_quantity = change.new_quantity,
            "stock changed"
        );
    }
}
