//! Invoice model and request inputs.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Highest point-of-sale number accepted by the authority.
pub const POINT_OF_SALE_MAX: u32 = 9998;

/// Legal document categories, with the voucher-type codes the authority
/// assigns to each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    FacturaA,
    FacturaB,
    FacturaC,
    NotaCreditoA,
    NotaCreditoB,
    NotaCreditoC,
}

impl DocumentType {
    /// Voucher-type code on the wire.
    pub fn code(&self) -> u32 {
        match self {
            DocumentType::FacturaA => 1,
            DocumentType::FacturaB => 6,
            DocumentType::FacturaC => 11,
            DocumentType::NotaCreditoA => 3,
            DocumentType::NotaCreditoB => 8,
            DocumentType::NotaCreditoC => 13,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::FacturaA => "factura_a",
            DocumentType::FacturaB => "factura_b",
            DocumentType::FacturaC => "factura_c",
            DocumentType::NotaCreditoA => "nota_credito_a",
            DocumentType::NotaCreditoB => "nota_credito_b",
            DocumentType::NotaCreditoC => "nota_credito_c",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "factura_a" => Some(DocumentType::FacturaA),
            "factura_b" => Some(DocumentType::FacturaB),
            "factura_c" => Some(DocumentType::FacturaC),
            "nota_credito_a" => Some(DocumentType::NotaCreditoA),
            "nota_credito_b" => Some(DocumentType::NotaCreditoB),
            "nota_credito_c" => Some(DocumentType::NotaCreditoC),
            _ => None,
        }
    }

    pub fn is_credit_note(&self) -> bool {
        matches!(
            self,
            DocumentType::NotaCreditoA | DocumentType::NotaCreditoB | DocumentType::NotaCreditoC
        )
    }

    /// The credit-note category that voids a document of this category.
    pub fn credit_note(&self) -> Option<DocumentType> {
        match self {
            DocumentType::FacturaA => Some(DocumentType::NotaCreditoA),
            DocumentType::FacturaB => Some(DocumentType::NotaCreditoB),
            DocumentType::FacturaC => Some(DocumentType::NotaCreditoC),
            _ => None,
        }
    }

    /// Human-facing label, e.g. "Factura A".
    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::FacturaA => "Factura A",
            DocumentType::FacturaB => "Factura B",
            DocumentType::FacturaC => "Factura C",
            DocumentType::NotaCreditoA => "Nota de Crédito A",
            DocumentType::NotaCreditoB => "Nota de Crédito B",
            DocumentType::NotaCreditoC => "Nota de Crédito C",
        }
    }
}

/// Identity-document kinds accepted for the buyer, with wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuyerDocType {
    Cuit,
    Cuil,
    Dni,
    ConsumidorFinal,
}

impl BuyerDocType {
    pub fn code(&self) -> u32 {
        match self {
            BuyerDocType::Cuit => 80,
            BuyerDocType::Cuil => 86,
            BuyerDocType::Dni => 96,
            BuyerDocType::ConsumidorFinal => 99,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuyerDocType::Cuit => "cuit",
            BuyerDocType::Cuil => "cuil",
            BuyerDocType::Dni => "dni",
            BuyerDocType::ConsumidorFinal => "consumidor_final",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "cuit" => BuyerDocType::Cuit,
            "cuil" => BuyerDocType::Cuil,
            "dni" => BuyerDocType::Dni,
            _ => BuyerDocType::ConsumidorFinal,
        }
    }
}

/// Invoice lifecycle. `pending` is transient; `error` and `voided` are
/// terminal; only `completed` can be voided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Completed,
    Error,
    Voided,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Completed => "completed",
            InvoiceStatus::Error => "error",
            InvoiceStatus::Voided => "voided",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "completed" => InvoiceStatus::Completed,
            "error" => InvoiceStatus::Error,
            "voided" => InvoiceStatus::Voided,
            _ => InvoiceStatus::Pending,
        }
    }
}

/// Audit-trail event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceEventType {
    Created,
    AuthorizationReceived,
    Error,
    Voided,
    PartialCommitInconsistency,
    Repaired,
}

impl InvoiceEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceEventType::Created => "created",
            InvoiceEventType::AuthorizationReceived => "authorization_received",
            InvoiceEventType::Error => "error",
            InvoiceEventType::Voided => "voided",
            InvoiceEventType::PartialCommitInconsistency => "partial_commit_inconsistency",
            InvoiceEventType::Repaired => "repaired",
        }
    }
}

/// Invoice document. Buyer fields are a snapshot taken at creation time and
/// never updated afterwards; voucher/authorization fields stay NULL until the
/// authority answers.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub document_type: String,
    pub point_of_sale: i32,
    pub voucher_number: Option<i64>,
    pub authorization_code: Option<String>,
    pub authorization_expires: Option<NaiveDate>,
    pub buyer_account_id: Uuid,
    pub buyer_name: String,
    pub buyer_doc_type: String,
    pub buyer_doc_number: String,
    pub buyer_address: Option<String>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub status: String,
    pub error_message: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Invoice {
    pub fn parsed_status(&self) -> InvoiceStatus {
        InvoiceStatus::from_string(&self.status)
    }

    pub fn parsed_document_type(&self) -> Option<DocumentType> {
        DocumentType::from_string(&self.document_type)
    }

    /// Formatted voucher identity, e.g. "0001-00000042".
    pub fn display_number(&self) -> String {
        match self.voucher_number {
            Some(number) => format!("{:04}-{:08}", self.point_of_sale, number),
            None => format!("{:04}-????????", self.point_of_sale),
        }
    }
}

/// Line on an invoice. SKU code and description are snapshots so the invoice
/// stays reproducible after catalog edits.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceLine {
    pub line_id: Uuid,
    pub invoice_id: Uuid,
    pub variant_id: Uuid,
    pub sku_snapshot: String,
    pub description: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub created_utc: DateTime<Utc>,
}

/// Append-only audit entry. The ordered event sequence is the authoritative
/// history of the invoice.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceEvent {
    pub event_id: Uuid,
    pub invoice_id: Uuid,
    pub event_type: String,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_utc: DateTime<Utc>,
}

impl InvoiceEvent {
    pub fn new(
        invoice_id: Uuid,
        event_type: InvoiceEventType,
        description: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            invoice_id,
            event_type: event_type.as_str().to_string(),
            description: description.into(),
            metadata,
            created_utc: Utc::now(),
        }
    }
}

/// Input for issuing an invoice. Unit prices are taken from the SKU, not the
/// request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct IssueInvoiceRequest {
    pub buyer_account_id: Uuid,
    pub document_type: DocumentType,
    #[validate(range(min = 1, max = 9998))]
    pub point_of_sale: u32,
    #[validate(length(min = 1, message = "at least one line is required"), nested)]
    pub lines: Vec<LineRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LineRequest {
    pub variant_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be positive"))]
    pub quantity: i64,
}

/// Computed amounts for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmounts {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Round to the currency's minor unit, half away from zero.
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Amounts for `quantity` units at `unit_price`, taxed at the flat `tax_rate`
/// (e.g. 0.21). Invoice aggregates are the exact sums of these, so line and
/// invoice totals can never drift apart.
pub fn line_amounts(unit_price: Decimal, quantity: i64, tax_rate: Decimal) -> LineAmounts {
    let subtotal = round2(unit_price * Decimal::from(quantity));
    let tax = round2(subtotal * tax_rate);
    LineAmounts {
        subtotal,
        tax,
        total: subtotal + tax,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn document_type_codes_match_the_authority() {
        assert_eq!(DocumentType::FacturaA.code(), 1);
        assert_eq!(DocumentType::FacturaB.code(), 6);
        assert_eq!(DocumentType::FacturaC.code(), 11);
        assert_eq!(DocumentType::NotaCreditoA.code(), 3);
        assert_eq!(DocumentType::NotaCreditoB.code(), 8);
        assert_eq!(DocumentType::NotaCreditoC.code(), 13);
    }

    #[test]
    fn credit_note_mapping_preserves_the_letter() {
        assert_eq!(
            DocumentType::FacturaA.credit_note(),
            Some(DocumentType::NotaCreditoA)
        );
        assert_eq!(
            DocumentType::FacturaC.credit_note(),
            Some(DocumentType::NotaCreditoC)
        );
        assert_eq!(DocumentType::NotaCreditoB.credit_note(), None);
    }

    #[test]
    fn line_amounts_round_half_up() {
        // 3 × 33.33 = 99.99; 21% of 99.99 = 20.9979 → 21.00
        let amounts = line_amounts(dec("33.33"), 3, dec("0.21"));
        assert_eq!(amounts.subtotal, dec("99.99"));
        assert_eq!(amounts.tax, dec("21.00"));
        assert_eq!(amounts.total, dec("120.99"));

        // Midpoint case: 21% of 0.50 = 0.105 → 0.11
        let amounts = line_amounts(dec("0.50"), 1, dec("0.21"));
        assert_eq!(amounts.tax, dec("0.11"));
    }

    #[test]
    fn line_amounts_reference_case() {
        // 2 × 7500.00 at 21%: net 15000.00, tax 3150.00, total 18150.00
        let amounts = line_amounts(dec("7500.00"), 2, dec("0.21"));
        assert_eq!(amounts.subtotal, dec("15000.00"));
        assert_eq!(amounts.tax, dec("3150.00"));
        assert_eq!(amounts.total, dec("18150.00"));
    }

    #[test]
    fn display_number_pads_point_of_sale_and_voucher() {
        let invoice = Invoice {
            invoice_id: Uuid::new_v4(),
            document_type: "factura_b".into(),
            point_of_sale: 3,
            voucher_number: Some(42),
            authorization_code: None,
            authorization_expires: None,
            buyer_account_id: Uuid::new_v4(),
            buyer_name: "Cliente".into(),
            buyer_doc_type: "dni".into(),
            buyer_doc_number: "30123456".into(),
            buyer_address: None,
            subtotal: Decimal::ZERO,
            tax: Decimal::ZERO,
            total: Decimal::ZERO,
            status: "completed".into(),
            error_message: None,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        };
        assert_eq!(invoice.display_number(), "0003-00000042");
    }

    #[test]
    fn issue_request_shape_is_validated() {
        let request = IssueInvoiceRequest {
            buyer_account_id: Uuid::new_v4(),
            document_type: DocumentType::FacturaB,
            point_of_sale: 1,
            lines: vec![],
        };
        assert!(request.validate().is_err());

        let request = IssueInvoiceRequest {
            point_of_sale: 99_999,
            lines: vec![LineRequest {
                variant_id: Uuid::new_v4(),
                quantity: 1,
            }],
            ..request
        };
        assert!(request.validate().is_err());

        let request = IssueInvoiceRequest {
            point_of_sale: 1,
            lines: vec![LineRequest {
                variant_id: Uuid::new_v4(),
                quantity: 0,
            }],
            ..request
        };
        assert!(request.validate().is_err());
    }
}
