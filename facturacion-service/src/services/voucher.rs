//! Sequential voucher numbering.

use std::sync::Arc;

use service_core::error::AppError;

use crate::models::invoice::DocumentType;
use crate::services::afip::FiscalAuthority;

/// Derives the next voucher number for a (point of sale, document type)
/// sequence.
///
/// The authority is the single source of truth: another process may have
/// advanced the sequence, so the number is re-derived on every issuance and
/// no local counter is kept. The value only populates the request — the
/// number actually persisted is the one the authority returns, and when two
/// concurrent submissions compute the same next number the authority accepts
/// exactly one and rejects the other.
pub struct VoucherSequence {
    authority: Arc<dyn FiscalAuthority>,
}

impl VoucherSequence {
    pub fn new(authority: Arc<dyn FiscalAuthority>) -> Self {
        Self { authority }
    }

    pub async fn next_number(
        &self,
        point_of_sale: u32,
        document_type: DocumentType,
    ) -> Result<u64, AppError> {
        let last = self
            .authority
            .last_voucher_number(point_of_sale, document_type)
            .await?;
        Ok(last + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fiscal::{AuthorizationApproval, AuthorizationRequest};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FixedAuthority {
        last: AtomicU64,
    }

    #[async_trait]
    impl FiscalAuthority for FixedAuthority {
        async fn last_voucher_number(
            &self,
            _point_of_sale: u32,
            _document_type: DocumentType,
        ) -> Result<u64, AppError> {
            Ok(self.last.load(Ordering::SeqCst))
        }

        async fn request_authorization(
            &self,
            _request: &AuthorizationRequest,
        ) -> Result<AuthorizationApproval, AppError> {
            unreachable!("not used by the allocator")
        }
    }

    #[tokio::test]
    async fn next_is_last_plus_one() {
        let authority = Arc::new(FixedAuthority {
            last: AtomicU64::new(41),
        });
        let sequence = VoucherSequence::new(authority.clone());

        let next = sequence
            .next_number(1, DocumentType::FacturaB)
            .await
            .unwrap();
        assert_eq!(next, 42);

        // The sequence never trusts a prior answer.
        authority.last.store(99, Ordering::SeqCst);
        let next = sequence
            .next_number(1, DocumentType::FacturaB)
            .await
            .unwrap();
        assert_eq!(next, 100);
    }
}
