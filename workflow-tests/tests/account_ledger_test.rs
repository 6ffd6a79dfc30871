//! Account ledger invariants: credit-limit policy, journal replay, and the
//! flagged inconsistency when the limit is hit after fiscal authorization.

mod common;

use chrono::Utc;
use common::{issue_request, setup};
use facturacion_service::models::{
    replay_balance, CreatePaymentPlan, DateRange, Direction, InvoiceStatus, PlanFrequency,
    Posting,
};
use facturacion_service::services::AccountLedger;
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn posting(account_id: Uuid, direction: Direction, amount: &str) -> Posting {
    Posting {
        account_id,
        direction,
        amount: dec(amount),
        description: "manual entry".to_string(),
        payment_method: Some("efectivo".to_string()),
        reference_number: None,
        invoice_id: None,
        created_by: Uuid::new_v4(),
    }
}

#[tokio::test]
async fn debit_past_the_credit_limit_is_rejected() {
    let ctx = setup();
    let account = ctx
        .accounts
        .add_customer("Cliente", "48000.00", "50000.00");

    let err = ctx
        .accounts
        .post(&posting(account, Direction::Debit, "5000.00"))
        .await
        .unwrap_err();

    match err {
        AppError::CreditLimitExceeded {
            balance,
            attempted,
            limit,
            ..
        } => {
            assert_eq!(balance, dec("48000.00"));
            assert_eq!(attempted, dec("5000.00"));
            assert_eq!(limit, dec("50000.00"));
        }
        other => panic!("expected CreditLimitExceeded, got {:?}", other),
    }

    assert_eq!(ctx.accounts.balance_of(account), dec("48000.00"));
    assert!(ctx.accounts.transactions_for(account).is_empty());
}

#[tokio::test]
async fn credits_are_never_limit_checked() {
    let ctx = setup();
    let account = ctx
        .accounts
        .add_customer("Cliente", "48000.00", "50000.00");

    ctx.accounts
        .post(&posting(account, Direction::Credit, "5000.00"))
        .await
        .unwrap();

    assert_eq!(ctx.accounts.balance_of(account), dec("43000.00"));
}

#[tokio::test]
async fn journal_replay_reproduces_the_balance() {
    let ctx = setup();
    let account = ctx.accounts.add_customer("Cliente", "0.00", "100000.00");

    ctx.accounts
        .post(&posting(account, Direction::Debit, "100.00"))
        .await
        .unwrap();
    ctx.accounts
        .post(&posting(account, Direction::Credit, "30.00"))
        .await
        .unwrap();
    ctx.accounts
        .post(&posting(account, Direction::Debit, "50.50"))
        .await
        .unwrap();

    let transactions = ctx.accounts.transactions_for(account);
    assert_eq!(replay_balance(&transactions), ctx.accounts.balance_of(account));
    assert_eq!(
        transactions.last().unwrap().balance_after,
        ctx.accounts.balance_of(account)
    );
}

#[tokio::test]
async fn statement_reports_ordered_transactions_and_totals() {
    let ctx = setup();
    let account = ctx.accounts.add_customer("Cliente", "0.00", "100000.00");

    ctx.accounts
        .post(&posting(account, Direction::Debit, "200.00"))
        .await
        .unwrap();
    ctx.accounts
        .post(&posting(account, Direction::Credit, "80.00"))
        .await
        .unwrap();

    let today = Utc::now().date_naive();
    let statement = ctx
        .accounts
        .statement(
            account,
            DateRange {
                from: Some(today),
                to: Some(today),
            },
        )
        .await
        .unwrap();

    assert_eq!(statement.transactions.len(), 2);
    assert_eq!(statement.totals.debits, dec("200.00"));
    assert_eq!(statement.totals.credits, dec("80.00"));
    assert_eq!(statement.current_balance, dec("120.00"));

    // A range before any activity is empty.
    let earlier = ctx
        .accounts
        .statement(
            account,
            DateRange {
                from: None,
                to: today.pred_opt(),
            },
        )
        .await
        .unwrap();
    assert!(earlier.transactions.is_empty());
}

#[tokio::test]
async fn credit_limit_breach_after_authorization_is_flagged_not_rolled_back() {
    let ctx = setup();
    // 18150.00 of invoice would push the balance past the limit.
    let buyer = ctx
        .accounts
        .add_customer("Cliente al límite", "48000.00", "50000.00");
    let variant = ctx.inventory.add_variant("REM-01", 10, "7500.00");

    let invoice = ctx
        .workflow
        .issue(issue_request(buyer, vec![(variant, 2)]), ctx.actor)
        .await
        .unwrap();

    // The document is legally authorized and stays completed; the missed
    // debit is recorded, not silently retried and not rolled back.
    assert_eq!(invoice.parsed_status(), InvoiceStatus::Completed);
    assert!(invoice.authorization_code.is_some());
    assert_eq!(ctx.inventory.stock_of(variant), 8);
    assert_eq!(ctx.accounts.balance_of(buyer), dec("48000.00"));
    assert_eq!(
        ctx.invoices.event_types_of(invoice.invoice_id),
        vec![
            "created",
            "authorization_received",
            "partial_commit_inconsistency"
        ]
    );

    // Operator repair path: lift the limit, re-apply the pending leg.
    ctx.accounts.set_credit_limit(buyer, "100000.00");
    let repaired = ctx.workflow.repair(invoice.invoice_id, ctx.actor).await.unwrap();
    assert_eq!(repaired.parsed_status(), InvoiceStatus::Completed);
    assert_eq!(ctx.accounts.balance_of(buyer), dec("66150.00"));
    // Stock is not deducted twice.
    assert_eq!(ctx.inventory.stock_of(variant), 8);
    assert_eq!(
        ctx.invoices.event_types_of(invoice.invoice_id),
        vec![
            "created",
            "authorization_received",
            "partial_commit_inconsistency",
            "repaired"
        ]
    );

    // Nothing left to repair.
    let err = ctx
        .workflow
        .repair(invoice.invoice_id, ctx.actor)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn storage_failure_during_side_effects_is_repairable() {
    let ctx = setup();
    let buyer = ctx.accounts.add_customer("Cliente", "0.00", "100000.00");
    let variant = ctx.inventory.add_variant("REM-01", 10, "7500.00");

    ctx.inventory.fail_adjustments(true);
    let invoice = ctx
        .workflow
        .issue(issue_request(buyer, vec![(variant, 2)]), ctx.actor)
        .await
        .unwrap();

    // Authorized, but the stock leg is pending; the ledger leg went through.
    assert_eq!(invoice.parsed_status(), InvoiceStatus::Completed);
    assert_eq!(ctx.inventory.stock_of(variant), 10);
    assert_eq!(ctx.accounts.balance_of(buyer), dec("18150.00"));
    assert!(ctx
        .invoices
        .event_types_of(invoice.invoice_id)
        .contains(&"partial_commit_inconsistency".to_string()));

    ctx.inventory.fail_adjustments(false);
    ctx.workflow.repair(invoice.invoice_id, ctx.actor).await.unwrap();

    // Only the pending leg re-ran: stock deducted once, no second debit.
    assert_eq!(ctx.inventory.stock_of(variant), 8);
    assert_eq!(ctx.accounts.balance_of(buyer), dec("18150.00"));
    assert_eq!(ctx.accounts.transactions_for(buyer).len(), 1);
}

#[tokio::test]
async fn payment_plan_installments_round_half_up() {
    let ctx = setup();
    let account = ctx.accounts.add_customer("Cliente", "0.00", "100000.00");

    let plan = ctx
        .accounts
        .create_payment_plan(&CreatePaymentPlan {
            account_id: account,
            total_amount: dec("1000.00"),
            installments: 3,
            frequency: PlanFrequency::Monthly,
            start_date: Utc::now().date_naive(),
        })
        .await
        .unwrap();

    assert_eq!(plan.installment_amount, dec("333.33"));

    let err = ctx
        .accounts
        .create_payment_plan(&CreatePaymentPlan {
            account_id: account,
            total_amount: dec("1000.00"),
            installments: 0,
            frequency: PlanFrequency::Monthly,
            start_date: Utc::now().date_naive(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}
