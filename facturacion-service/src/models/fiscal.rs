//! Types exchanged with the fiscal authority.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::invoice::{BuyerDocType, DocumentType};

/// Cached authentication ticket for the authority's services. Created on
/// first use, reused until expiry, silently replaced afterwards.
#[derive(Debug, Clone)]
pub struct AccessTicket {
    pub token: String,
    pub sign: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessTicket {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Reference to a previously authorized voucher; required on credit notes.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RelatedVoucher {
    pub document_type: DocumentType,
    pub point_of_sale: u32,
    pub voucher_number: u64,
}

/// One authorization request. Amounts are final (already rounded to the
/// minor unit); the client is responsible for wire formatting.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub point_of_sale: u32,
    pub document_type: DocumentType,
    pub voucher_number: u64,
    pub buyer_doc_type: BuyerDocType,
    pub buyer_doc_number: String,
    pub issue_date: NaiveDate,
    pub net_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub related_voucher: Option<RelatedVoucher>,
}

/// Parsed successful authority response. `raw` preserves the response
/// verbatim for the invoice audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationApproval {
    pub authorization_code: String,
    pub expires_on: NaiveDate,
    pub voucher_number: u64,
    pub raw: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn ticket_validity_is_strict() {
        let now = Utc::now();
        let ticket = AccessTicket {
            token: "t".into(),
            sign: "s".into(),
            expires_at: now + Duration::hours(24),
        };
        assert!(ticket.is_valid_at(now));
        assert!(!ticket.is_valid_at(ticket.expires_at));
    }
}
