//! Void (credit-note) scenarios: the round trip must be a net zero on stock
//! and balance, and only `completed` invoices can be voided.

mod common;

use common::{issue_request, setup};
use facturacion_service::models::{DocumentType, InvoiceStatus};
use rust_decimal::Decimal;
use service_core::error::AppError;

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

#[tokio::test]
async fn void_round_trip_restores_stock_and_balance() {
    let ctx = setup();
    let buyer = ctx.accounts.add_customer("Cliente", "0.00", "100000.00");
    let variant = ctx.inventory.add_variant("REM-01", 10, "7500.00");

    let invoice = ctx
        .workflow
        .issue(issue_request(buyer, vec![(variant, 2)]), ctx.actor)
        .await
        .unwrap();
    assert_eq!(ctx.inventory.stock_of(variant), 8);
    assert_eq!(ctx.accounts.balance_of(buyer), dec("18150.00"));

    let voided = ctx.workflow.void(invoice.invoice_id, ctx.actor).await.unwrap();

    assert_eq!(voided.parsed_status(), InvoiceStatus::Voided);

    // Net zero effect on stock and balance.
    assert_eq!(
        ctx.inventory.stock_of(variant),
        ctx.inventory.initial_stock_of(variant)
    );
    assert_eq!(ctx.accounts.balance_of(buyer), dec("0.00"));

    // The movement journal replays to the current stock.
    let movements = ctx.inventory.movements_for(variant);
    assert_eq!(movements.len(), 2);
    let replayed: i64 = movements.iter().map(|m| m.signed_quantity()).sum();
    assert_eq!(
        ctx.inventory.initial_stock_of(variant) + replayed,
        ctx.inventory.stock_of(variant)
    );

    // Debit then credit for the same amount.
    let transactions = ctx.accounts.transactions_for(buyer);
    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[0].direction, "debit");
    assert_eq!(transactions[1].direction, "credit");
    assert_eq!(transactions[0].amount, transactions[1].amount);
    assert_eq!(transactions[1].balance_after, dec("0.00"));

    // Both audit trails on the invoice.
    assert_eq!(
        ctx.invoices.event_types_of(invoice.invoice_id),
        vec!["created", "authorization_received", "voided"]
    );

    // The credit note consumed its own voucher sequence.
    assert_eq!(ctx.authority.last_number(1, DocumentType::NotaCreditoB), 1);
    assert_eq!(ctx.authority.last_number(1, DocumentType::FacturaB), 1);
}

#[tokio::test]
async fn void_requires_completed_state() {
    let ctx = setup();
    let buyer = ctx.accounts.add_customer("Cliente", "0.00", "100000.00");
    let variant = ctx.inventory.add_variant("REM-01", 10, "7500.00");

    // An invoice parked in error cannot be voided.
    ctx.authority.go_offline();
    let errored = ctx
        .workflow
        .issue(issue_request(buyer, vec![(variant, 1)]), ctx.actor)
        .await
        .unwrap();
    assert_eq!(errored.parsed_status(), InvoiceStatus::Error);
    ctx.authority.come_online();

    let err = ctx
        .workflow
        .void(errored.invoice_id, ctx.actor)
        .await
        .unwrap_err();
    match err {
        AppError::InvalidState {
            current, expected, ..
        } => {
            assert_eq!(current, "error");
            assert_eq!(expected, "completed");
        }
        other => panic!("expected InvalidState, got {:?}", other),
    }

    // A voided invoice cannot be voided twice.
    let invoice = ctx
        .workflow
        .issue(issue_request(buyer, vec![(variant, 1)]), ctx.actor)
        .await
        .unwrap();
    ctx.workflow.void(invoice.invoice_id, ctx.actor).await.unwrap();
    let err = ctx
        .workflow
        .void(invoice.invoice_id, ctx.actor)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState { .. }));
}

#[tokio::test]
async fn authority_failure_leaves_the_invoice_completed() {
    let ctx = setup();
    let buyer = ctx.accounts.add_customer("Cliente", "0.00", "100000.00");
    let variant = ctx.inventory.add_variant("REM-01", 10, "7500.00");

    let invoice = ctx
        .workflow
        .issue(issue_request(buyer, vec![(variant, 2)]), ctx.actor)
        .await
        .unwrap();

    ctx.authority.go_offline();
    let err = ctx
        .workflow
        .void(invoice.invoice_id, ctx.actor)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AuthorityUnreachable(_)));

    // The void did not happen: state and side effects are untouched.
    let detail = ctx.workflow.invoice_detail(invoice.invoice_id).await.unwrap();
    assert_eq!(detail.invoice.parsed_status(), InvoiceStatus::Completed);
    assert_eq!(ctx.inventory.stock_of(variant), 8);
    assert_eq!(ctx.accounts.balance_of(buyer), dec("18150.00"));
    assert_eq!(
        ctx.invoices.event_types_of(invoice.invoice_id),
        vec!["created", "authorization_received"]
    );
}
