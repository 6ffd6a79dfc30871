//! Invoice issuance and void workflow.
//!
//! The only component that talks to the others; the ledgers, the voucher
//! allocator and the authority client never call each other or back into the
//! workflow.
//!
//! Issuance: validate → check availability → total → persist `pending` →
//! authorize → deduct stock + debit the buyer → `completed`. The authority
//! call is the expensive, non-idempotent step, so the cheap local side
//! effects run after it; a failure between authorization and the side
//! effects cannot be rolled back against the authority and is recorded as a
//! `partial_commit_inconsistency` event instead, with `repair` as the
//! operator path to finish the job.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use service_core::error::AppError;

use crate::models::account::{Account, Direction, Posting};
use crate::models::fiscal::{AuthorizationApproval, AuthorizationRequest, RelatedVoucher};
use crate::models::invoice::{
    line_amounts, BuyerDocType, DocumentType, Invoice, InvoiceEvent, InvoiceEventType,
    InvoiceLine, InvoiceStatus, IssueInvoiceRequest,
};
use crate::models::stock::ProductVariant;
use crate::services::accounts::AccountLedger;
use crate::services::afip::FiscalAuthority;
use crate::services::inventory::InventoryLedger;
use crate::services::metrics::{ERRORS_TOTAL, INVOICES_TOTAL, INVOICE_AMOUNT_TOTAL};
use crate::services::notify::{StockChanged, StockChangedNotifier};
use crate::services::voucher::VoucherSequence;

/// Invoice persistence the workflow needs. The status guards are enforced by
/// the store: a transition from any other state must fail.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Inserts the invoice in `pending` state with its lines and the
    /// `created` event, atomically.
    async fn create_pending(
        &self,
        invoice: &Invoice,
        lines: &[InvoiceLine],
        event: &InvoiceEvent,
    ) -> Result<(), AppError>;

    /// `pending` → `completed`, recording the authority's answer.
    async fn mark_completed(
        &self,
        invoice_id: Uuid,
        voucher_number: i64,
        authorization_code: &str,
        expires_on: NaiveDate,
        event: &InvoiceEvent,
    ) -> Result<(), AppError>;

    /// `pending` → `error`.
    async fn mark_error(
        &self,
        invoice_id: Uuid,
        message: &str,
        event: &InvoiceEvent,
    ) -> Result<(), AppError>;

    /// `completed` → `voided`.
    async fn mark_voided(&self, invoice_id: Uuid, event: &InvoiceEvent) -> Result<(), AppError>;

    async fn append_event(&self, event: &InvoiceEvent) -> Result<(), AppError>;

    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError>;

    async fn get_lines(&self, invoice_id: Uuid) -> Result<Vec<InvoiceLine>, AppError>;

    /// Events in chronological order.
    async fn get_events(&self, invoice_id: Uuid) -> Result<Vec<InvoiceEvent>, AppError>;

    /// Newest first.
    async fn list_invoices(&self, limit: i64) -> Result<Vec<Invoice>, AppError>;
}

/// Invoice with its lines and full audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDetail {
    pub invoice: Invoice,
    pub lines: Vec<InvoiceLine>,
    pub events: Vec<InvoiceEvent>,
}

/// One not-yet-applied stock adjustment, as recorded in a
/// `partial_commit_inconsistency` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockLeg {
    pub variant_id: Uuid,
    pub delta: i64,
}

/// A not-yet-applied account posting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerLeg {
    pub direction: Direction,
    pub amount: Decimal,
}

/// Metadata payload of `partial_commit_inconsistency` events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingLegs {
    #[serde(default)]
    pub stock: Vec<StockLeg>,
    #[serde(default)]
    pub ledger: Option<LedgerLeg>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl PendingLegs {
    pub fn is_clean(&self) -> bool {
        self.stock.is_empty() && self.ledger.is_none()
    }
}

pub struct InvoiceWorkflow {
    store: Arc<dyn InvoiceStore>,
    inventory: Arc<dyn InventoryLedger>,
    accounts: Arc<dyn AccountLedger>,
    authority: Arc<dyn FiscalAuthority>,
    vouchers: VoucherSequence,
    notifier: Arc<dyn StockChangedNotifier>,
    tax_rate: Decimal,
}

impl InvoiceWorkflow {
    pub fn new(
        store: Arc<dyn InvoiceStore>,
        inventory: Arc<dyn InventoryLedger>,
        accounts: Arc<dyn AccountLedger>,
        authority: Arc<dyn FiscalAuthority>,
        notifier: Arc<dyn StockChangedNotifier>,
        tax_rate: Decimal,
    ) -> Self {
        let vouchers = VoucherSequence::new(authority.clone());
        Self {
            store,
            inventory,
            accounts,
            authority,
            vouchers,
            notifier,
            tax_rate,
        }
    }

    /// Issues a fiscally authorized invoice.
    ///
    /// Validation and availability failures return `Err` before anything is
    /// written. Once the `pending` invoice exists, an authority failure
    /// marks it `error` and returns it (the id is what the caller needs for
    /// inspection and retry); the invoice is only `completed` when the
    /// authority answered with an authorization code.
    #[instrument(
        skip(self, request),
        fields(
            buyer_account_id = %request.buyer_account_id,
            document_type = request.document_type.as_str(),
            point_of_sale = request.point_of_sale
        )
    )]
    pub async fn issue(
        &self,
        request: IssueInvoiceRequest,
        actor: Uuid,
    ) -> Result<Invoice, AppError> {
        // Step 1: request shape, document category, buyer. Read-only.
        request.validate()?;
        if request.document_type.is_credit_note() {
            return Err(AppError::Validation(
                "credit notes are produced by voiding an invoice, not issued directly".to_string(),
            ));
        }
        let buyer = self
            .accounts
            .get_account(request.buyer_account_id)
            .await?
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "unknown buyer account {}",
                    request.buyer_account_id
                ))
            })?;
        if !buyer.is_active() {
            return Err(AppError::Validation(format!(
                "buyer account {} is not active",
                buyer.account_id
            )));
        }

        // Step 2: availability. Still read-only, so failures are free.
        self.inventory.check_availability(&request.lines).await?;

        // Step 3: totals. Aggregates are exact sums of the rounded lines.
        let invoice_id = Uuid::new_v4();
        let now = Utc::now();
        let mut lines = Vec::with_capacity(request.lines.len());
        let mut subtotal = Decimal::ZERO;
        let mut tax = Decimal::ZERO;
        let mut total = Decimal::ZERO;

        for line in &request.lines {
            let variant = self
                .inventory
                .get_variant(line.variant_id)
                .await?
                .ok_or_else(|| AppError::SkuNotFound {
                    sku: line.variant_id.to_string(),
                })?;
            if variant.unit_price <= Decimal::ZERO {
                return Err(AppError::Validation(format!(
                    "SKU {} has no sellable price",
                    variant.sku
                )));
            }

            let amounts = line_amounts(variant.unit_price, line.quantity, self.tax_rate);
            subtotal += amounts.subtotal;
            tax += amounts.tax;
            total += amounts.total;

            lines.push(InvoiceLine {
                line_id: Uuid::new_v4(),
                invoice_id,
                variant_id: variant.variant_id,
                sku_snapshot: variant.sku.clone(),
                description: variant_label(&variant),
                quantity: line.quantity,
                unit_price: variant.unit_price,
                subtotal: amounts.subtotal,
                tax: amounts.tax,
                total: amounts.total,
                created_utc: now,
            });
        }

        // Step 4: persist pending, with the buyer snapshot frozen here.
        let invoice = Invoice {
            invoice_id,
            document_type: request.document_type.as_str().to_string(),
            point_of_sale: request.point_of_sale as i32,
            voucher_number: None,
            authorization_code: None,
            authorization_expires: None,
            buyer_account_id: buyer.account_id,
            buyer_name: buyer.name.clone(),
            buyer_doc_type: buyer.document_type.clone(),
            buyer_doc_number: buyer.document_number.clone(),
            buyer_address: buyer.address.clone(),
            subtotal,
            tax,
            total,
            status: InvoiceStatus::Pending.as_str().to_string(),
            error_message: None,
            created_utc: now,
            updated_utc: now,
        };
        let created = InvoiceEvent::new(
            invoice_id,
            InvoiceEventType::Created,
            "invoice created",
            json!({ "actor": actor }),
        );
        self.store.create_pending(&invoice, &lines, &created).await?;
        INVOICES_TOTAL.with_label_values(&["pending"]).inc();

        // Step 5: authorization. On failure the invoice is parked in
        // `error` with no stock or ledger effect; it is never retried here.
        let approval = match self.authorize(&request, &invoice, &buyer).await {
            Ok(approval) => approval,
            Err(err) => {
                warn!(
                    invoice_id = %invoice_id,
                    error = %err,
                    "authorization failed, invoice parked in error state"
                );
                ERRORS_TOTAL.with_label_values(&[err.kind()]).inc();
                INVOICES_TOTAL.with_label_values(&["error"]).inc();
                let event = InvoiceEvent::new(
                    invoice_id,
                    InvoiceEventType::Error,
                    "authorization failed",
                    json!({ "kind": err.kind(), "error": err.to_string() }),
                );
                self.store
                    .mark_error(invoice_id, &err.to_string(), &event)
                    .await?;
                return self.load_invoice(invoice_id).await;
            }
        };

        // Step 6: commit. The voucher number persisted is the one the
        // authority returned, not the one we computed.
        let event = InvoiceEvent::new(
            invoice_id,
            InvoiceEventType::AuthorizationReceived,
            "authorization code received",
            approval.raw.clone(),
        );
        self.store
            .mark_completed(
                invoice_id,
                approval.voucher_number as i64,
                &approval.authorization_code,
                approval.expires_on,
                &event,
            )
            .await?;
        INVOICES_TOTAL.with_label_values(&["completed"]).inc();
        if let Some(amount) = total.to_f64() {
            INVOICE_AMOUNT_TOTAL
                .with_label_values(&[request.document_type.as_str()])
                .inc_by(amount);
        }

        let invoice = self.load_invoice(invoice_id).await?;
        let reference = format!(
            "{} {}",
            request.document_type.label(),
            invoice.display_number()
        );
        info!(invoice_id = %invoice_id, reference = %reference, total = %total, "invoice authorized");

        let legs = PendingLegs {
            stock: lines
                .iter()
                .map(|line| StockLeg {
                    variant_id: line.variant_id,
                    delta: -line.quantity,
                })
                .collect(),
            ledger: Some(LedgerLeg {
                direction: Direction::Debit,
                amount: total,
            }),
            errors: Vec::new(),
        };
        self.apply_side_effects(&invoice, legs, &reference, actor)
            .await?;

        self.load_invoice(invoice_id).await
    }

    /// Voids a `completed` invoice by obtaining a credit note for the same
    /// amounts, then reversing the ledger debit and restoring stock.
    #[instrument(skip(self))]
    pub async fn void(&self, invoice_id: Uuid, actor: Uuid) -> Result<Invoice, AppError> {
        let invoice = self
            .store
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice {}", invoice_id)))?;

        if invoice.parsed_status() != InvoiceStatus::Completed {
            return Err(AppError::InvalidState {
                entity: "invoice",
                id: invoice_id,
                current: invoice.status.clone(),
                expected: InvoiceStatus::Completed.as_str().to_string(),
            });
        }

        let document_type = invoice.parsed_document_type().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "invoice {} carries unknown document type {}",
                invoice_id,
                invoice.document_type
            ))
        })?;
        let credit_type = document_type.credit_note().ok_or_else(|| {
            AppError::Validation(format!(
                "document type {} cannot be voided with a credit note",
                document_type.as_str()
            ))
        })?;
        let original_voucher = invoice.voucher_number.ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "completed invoice {} has no voucher number",
                invoice_id
            ))
        })?;

        // Credit-note authorization. Failure leaves the invoice untouched:
        // the void simply did not happen.
        let point_of_sale = invoice.point_of_sale as u32;
        let voucher_number = self.vouchers.next_number(point_of_sale, credit_type).await?;
        let approval = self
            .authority
            .request_authorization(&AuthorizationRequest {
                point_of_sale,
                document_type: credit_type,
                voucher_number,
                buyer_doc_type: BuyerDocType::from_string(&invoice.buyer_doc_type),
                buyer_doc_number: invoice.buyer_doc_number.clone(),
                issue_date: Utc::now().date_naive(),
                net_amount: invoice.subtotal,
                tax_amount: invoice.tax,
                total_amount: invoice.total,
                related_voucher: Some(RelatedVoucher {
                    document_type,
                    point_of_sale,
                    voucher_number: original_voucher as u64,
                }),
            })
            .await?;

        let reference = format!(
            "Anulación {} {}",
            document_type.label(),
            invoice.display_number()
        );
        let event = InvoiceEvent::new(
            invoice_id,
            InvoiceEventType::Voided,
            format!(
                "voided with {} {:04}-{:08}",
                credit_type.label(),
                point_of_sale,
                approval.voucher_number
            ),
            approval.raw.clone(),
        );
        self.store.mark_voided(invoice_id, &event).await?;
        INVOICES_TOTAL.with_label_values(&["voided"]).inc();
        info!(invoice_id = %invoice_id, reference = %reference, "invoice voided");

        let lines = self.store.get_lines(invoice_id).await?;
        let legs = PendingLegs {
            stock: lines
                .iter()
                .map(|line| StockLeg {
                    variant_id: line.variant_id,
                    delta: line.quantity,
                })
                .collect(),
            ledger: Some(LedgerLeg {
                direction: Direction::Credit,
                amount: invoice.total,
            }),
            errors: Vec::new(),
        };
        self.apply_side_effects(&invoice, legs, &reference, actor)
            .await?;

        self.load_invoice(invoice_id).await
    }

    /// Operator repair path: re-attempts the side-effect legs recorded by
    /// the newest `partial_commit_inconsistency` event.
    #[instrument(skip(self))]
    pub async fn repair(&self, invoice_id: Uuid, actor: Uuid) -> Result<Invoice, AppError> {
        let invoice = self
            .store
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice {}", invoice_id)))?;

        let events = self.store.get_events(invoice_id).await?;
        let pending = events.iter().rev().find_map(|event| {
            match event.event_type.as_str() {
                // A later repair supersedes older inconsistencies.
                "repaired" => Some(None),
                "partial_commit_inconsistency" => Some(Some(event)),
                _ => None,
            }
        });

        let event = match pending {
            Some(Some(event)) => event,
            _ => {
                return Err(AppError::NotFound(anyhow::anyhow!(
                    "Invoice {} has no pending inconsistency",
                    invoice_id
                )))
            }
        };

        let legs: PendingLegs = serde_json::from_value(event.metadata.clone()).map_err(|e| {
            AppError::InternalError(anyhow::anyhow!(
                "unreadable inconsistency record on invoice {}: {}",
                invoice_id,
                e
            ))
        })?;

        let reference = format!("Reproceso {}", invoice.display_number());
        let clean = self
            .apply_side_effects(&invoice, legs, &reference, actor)
            .await?;
        if clean {
            let event = InvoiceEvent::new(
                invoice_id,
                InvoiceEventType::Repaired,
                "pending side effects applied",
                json!({ "actor": actor }),
            );
            self.store.append_event(&event).await?;
            info!(invoice_id = %invoice_id, "inconsistency repaired");
        }

        self.load_invoice(invoice_id).await
    }

    /// Invoice with lines and audit trail.
    pub async fn invoice_detail(&self, invoice_id: Uuid) -> Result<InvoiceDetail, AppError> {
        let invoice = self
            .store
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice {}", invoice_id)))?;
        let lines = self.store.get_lines(invoice_id).await?;
        let events = self.store.get_events(invoice_id).await?;
        Ok(InvoiceDetail {
            invoice,
            lines,
            events,
        })
    }

    /// Newest invoices first.
    pub async fn list_invoices(&self, limit: i64) -> Result<Vec<Invoice>, AppError> {
        self.store.list_invoices(limit).await
    }

    /// Last authorized voucher number, straight from the authority.
    pub async fn last_voucher_number(
        &self,
        point_of_sale: u32,
        document_type: DocumentType,
    ) -> Result<u64, AppError> {
        self.authority
            .last_voucher_number(point_of_sale, document_type)
            .await
    }

    async fn authorize(
        &self,
        request: &IssueInvoiceRequest,
        invoice: &Invoice,
        buyer: &Account,
    ) -> Result<AuthorizationApproval, AppError> {
        let voucher_number = self
            .vouchers
            .next_number(request.point_of_sale, request.document_type)
            .await?;

        self.authority
            .request_authorization(&AuthorizationRequest {
                point_of_sale: request.point_of_sale,
                document_type: request.document_type,
                voucher_number,
                buyer_doc_type: BuyerDocType::from_string(&buyer.document_type),
                buyer_doc_number: buyer.document_number.clone(),
                issue_date: Utc::now().date_naive(),
                net_amount: invoice.subtotal,
                tax_amount: invoice.tax,
                total_amount: invoice.total,
                related_voucher: None,
            })
            .await
    }

    /// Attempts every leg; failures are recorded on the invoice as one
    /// `partial_commit_inconsistency` event instead of aborting, because the
    /// authorization they follow cannot be undone. Returns whether every leg
    /// applied.
    async fn apply_side_effects(
        &self,
        invoice: &Invoice,
        legs: PendingLegs,
        reference: &str,
        actor: Uuid,
    ) -> Result<bool, AppError> {
        let mut remaining = PendingLegs::default();

        for leg in legs.stock {
            match self
                .inventory
                .adjust(leg.variant_id, leg.delta, reference, Some(invoice.invoice_id))
                .await
            {
                Ok(level) => {
                    self.notifier
                        .stock_changed(StockChanged {
                            variant_id: level.variant_id,
                            sku: level.sku,
                            new_quantity: level.quantity,
                        })
                        .await;
                }
                Err(err) => {
                    warn!(
                        invoice_id = %invoice.invoice_id,
                        variant_id = %leg.variant_id,
                        error = %err,
                        "stock adjustment failed after authorization"
                    );
                    remaining.errors.push(err.to_string());
                    remaining.stock.push(leg);
                }
            }
        }

        if let Some(leg) = legs.ledger {
            let posting = Posting {
                account_id: invoice.buyer_account_id,
                direction: leg.direction,
                amount: leg.amount,
                description: reference.to_string(),
                payment_method: None,
                reference_number: None,
                invoice_id: Some(invoice.invoice_id),
                created_by: actor,
            };
            if let Err(err) = self.accounts.post(&posting).await {
                warn!(
                    invoice_id = %invoice.invoice_id,
                    account_id = %invoice.buyer_account_id,
                    error = %err,
                    "account posting failed after authorization"
                );
                remaining.errors.push(err.to_string());
                remaining.ledger = Some(leg);
            }
        }

        if remaining.is_clean() {
            return Ok(true);
        }

        error!(
            invoice_id = %invoice.invoice_id,
            pending_stock = remaining.stock.len(),
            pending_ledger = remaining.ledger.is_some(),
            "recording partial-commit inconsistency"
        );
        ERRORS_TOTAL
            .with_label_values(&["partial_commit_inconsistency"])
            .inc();
        let metadata = serde_json::to_value(&remaining)
            .map_err(|e| AppError::InternalError(anyhow::Error::new(e)))?;
        let event = InvoiceEvent::new(
            invoice.invoice_id,
            InvoiceEventType::PartialCommitInconsistency,
            "side effects incomplete after authorization",
            metadata,
        );
        self.store.append_event(&event).await?;
        Ok(false)
    }

    async fn load_invoice(&self, invoice_id: Uuid) -> Result<Invoice, AppError> {
        self.store
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice {}", invoice_id)))
    }
}

/// Line description snapshot, e.g. "REM-01 (M, Negro)".
fn variant_label(variant: &ProductVariant) -> String {
    match (&variant.size, &variant.color) {
        (Some(size), Some(color)) => format!("{} ({}, {})", variant.sku, size, color),
        (Some(size), None) => format!("{} ({})", variant.sku, size),
        (None, Some(color)) => format!("{} ({})", variant.sku, color),
        (None, None) => variant.sku.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn variant_label_includes_size_and_color() {
        let variant = ProductVariant {
            variant_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            sku: "REM-01".into(),
            size: Some("M".into()),
            color: Some("Negro".into()),
            stock: 10,
            unit_price: Decimal::ONE,
            created_utc: Utc::now(),
        };
        assert_eq!(variant_label(&variant), "REM-01 (M, Negro)");

        let variant = ProductVariant {
            size: None,
            color: None,
            ..variant
        };
        assert_eq!(variant_label(&variant), "REM-01");
    }

    #[test]
    fn pending_legs_round_trip_through_metadata() {
        let legs = PendingLegs {
            stock: vec![StockLeg {
                variant_id: Uuid::new_v4(),
                delta: -2,
            }],
            ledger: Some(LedgerLeg {
                direction: Direction::Debit,
                amount: "18150.00".parse().unwrap(),
            }),
            errors: vec!["credit limit exceeded".into()],
        };

        let metadata = serde_json::to_value(&legs).unwrap();
        let decoded: PendingLegs = serde_json::from_value(metadata).unwrap();
        assert_eq!(decoded.stock.len(), 1);
        assert_eq!(decoded.stock[0].delta, -2);
        assert!(matches!(
            decoded.ledger,
            Some(LedgerLeg {
                direction: Direction::Debit,
                ..
            })
        ));
        assert!(!decoded.is_clean());
        assert!(PendingLegs::default().is_clean());
    }
}
