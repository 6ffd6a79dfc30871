//! Common helpers for workflow tests.

use facturacion_service::models::{DocumentType, IssueInvoiceRequest, LineRequest};
use uuid::Uuid;
use workflow_tests::TestContext;

/// Fresh context: in-memory collaborators, 21% flat tax, empty state.
pub fn setup() -> TestContext {
    TestContext::new()
}

/// Factura B at point of sale 1 for the given (variant, quantity) lines.
pub fn issue_request(buyer: Uuid, lines: Vec<(Uuid, i64)>) -> IssueInvoiceRequest {
    IssueInvoiceRequest {
        buyer_account_id: buyer,
        document_type: DocumentType::FacturaB,
        point_of_sale: 1,
        lines: lines
            .into_iter()
            .map(|(variant_id, quantity)| LineRequest {
                variant_id,
                quantity,
            })
            .collect(),
    }
}
