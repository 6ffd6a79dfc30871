//! In-memory collaborators for workflow tests.
//!
//! Every interface the invoice workflow consumes has a hermetic
//! implementation here, so the whole issuance/void state machine runs
//! without a database or network. The authority fake enforces the same
//! sequencing rule as the real one: a submission must carry last + 1, and of
//! two racing submissions with the same number exactly one wins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use facturacion_service::models::{
    round2, Account, AccountStatement, AccountTransaction, AuthorizationApproval,
    AuthorizationRequest, CreateAccount, CreatePaymentPlan, DateRange, Direction, DocumentType,
    Invoice, InvoiceEvent, InvoiceLine, InvoiceStatus, LineRequest, MovementDirection,
    PaymentPlan, Posting, ProductVariant, StockLevel, StockMovement, UpdateAccount,
};
use facturacion_service::services::afip::format_fiscal_date;
use facturacion_service::services::inventory::aggregate_quantities;
use facturacion_service::services::{
    AccountLedger, FiscalAuthority, InventoryLedger, InvoiceStore, InvoiceWorkflow, StockChanged,
    StockChangedNotifier,
};
use service_core::error::AppError;

// -----------------------------------------------------------------------------
// Fiscal authority fake
// -----------------------------------------------------------------------------

struct AuthorityState {
    last_numbers: HashMap<(u32, u32), u64>,
    issued: u64,
}

/// Authority fake with the real sequencing semantics.
pub struct MockAuthority {
    state: Mutex<AuthorityState>,
    offline: AtomicBool,
    reject_reason: Mutex<Option<String>>,
}

impl Default for MockAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAuthority {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AuthorityState {
                last_numbers: HashMap::new(),
                issued: 0,
            }),
            offline: AtomicBool::new(false),
            reject_reason: Mutex::new(None),
        }
    }

    pub fn set_last_number(&self, point_of_sale: u32, document_type: DocumentType, number: u64) {
        self.state
            .lock()
            .unwrap()
            .last_numbers
            .insert((point_of_sale, document_type.code()), number);
    }

    pub fn last_number(&self, point_of_sale: u32, document_type: DocumentType) -> u64 {
        self.state
            .lock()
            .unwrap()
            .last_numbers
            .get(&(point_of_sale, document_type.code()))
            .copied()
            .unwrap_or(0)
    }

    /// Simulate a network partition: every call fails `AuthorityUnreachable`.
    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn come_online(&self) {
        self.offline.store(false, Ordering::SeqCst);
    }

    /// The next authorization request is declined with `reason`.
    pub fn reject_next(&self, reason: &str) {
        *self.reject_reason.lock().unwrap() = Some(reason.to_string());
    }
}

#[async_trait]
impl FiscalAuthority for MockAuthority {
    async fn last_voucher_number(
        &self,
        point_of_sale: u32,
        document_type: DocumentType,
    ) -> Result<u64, AppError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::AuthorityUnreachable(anyhow::anyhow!(
                "connect timeout"
            )));
        }
        Ok(self.last_number(point_of_sale, document_type))
    }

    async fn request_authorization(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<AuthorizationApproval, AppError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::AuthorityUnreachable(anyhow::anyhow!(
                "connect timeout"
            )));
        }
        if let Some(reason) = self.reject_reason.lock().unwrap().take() {
            return Err(AppError::AuthorityRejected { reason });
        }

        let mut state = self.state.lock().unwrap();
        let key = (request.point_of_sale, request.document_type.code());
        let last = state.last_numbers.get(&key).copied().unwrap_or(0);
        if request.voucher_number != last + 1 {
            return Err(AppError::AuthorityRejected {
                reason: format!(
                    "10016: voucher number {} does not follow last authorized {}",
                    request.voucher_number, last
                ),
            });
        }
        state.last_numbers.insert(key, request.voucher_number);
        state.issued += 1;

        let authorization_code = format!("{:014}", 70_000_000_000_000u64 + state.issued);
        let expires_on = request.issue_date + Duration::days(10);
        let raw = json!({
            "FECAESolicitarResult": {
                "FeDetResp": [{
                    "CAE": authorization_code,
                    "CAEFchVto": format_fiscal_date(expires_on),
                    "CbteDesde": request.voucher_number,
                    "Resultado": "A"
                }]
            }
        });

        Ok(AuthorizationApproval {
            authorization_code,
            expires_on,
            voucher_number: request.voucher_number,
            raw,
        })
    }
}

// -----------------------------------------------------------------------------
// Inventory fake
// -----------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryInventory {
    variants: Mutex<HashMap<Uuid, ProductVariant>>,
    initial: Mutex<HashMap<Uuid, i64>>,
    movements: Mutex<Vec<StockMovement>>,
    fail_adjust: AtomicBool,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variant(&self, sku: &str, stock: i64, unit_price: &str) -> Uuid {
        let variant = ProductVariant {
            variant_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            sku: sku.to_string(),
            size: None,
            color: None,
            stock,
            unit_price: unit_price.parse().expect("bad decimal literal"),
            created_utc: Utc::now(),
        };
        let id = variant.variant_id;
        self.initial.lock().unwrap().insert(id, stock);
        self.variants.lock().unwrap().insert(id, variant);
        id
    }

    pub fn stock_of(&self, variant_id: Uuid) -> i64 {
        self.variants.lock().unwrap()[&variant_id].stock
    }

    pub fn initial_stock_of(&self, variant_id: Uuid) -> i64 {
        self.initial.lock().unwrap()[&variant_id]
    }

    pub fn movements_for(&self, variant_id: Uuid) -> Vec<StockMovement> {
        self.movements
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.variant_id == variant_id)
            .cloned()
            .collect()
    }

    /// Every subsequent `adjust` fails as a storage error.
    pub fn fail_adjustments(&self, fail: bool) {
        self.fail_adjust.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl InventoryLedger for InMemoryInventory {
    async fn check_availability(&self, lines: &[LineRequest]) -> Result<(), AppError> {
        let wanted = aggregate_quantities(lines);
        let variants = self.variants.lock().unwrap();
        for (variant_id, requested) in wanted {
            match variants.get(&variant_id) {
                None => {
                    return Err(AppError::SkuNotFound {
                        sku: variant_id.to_string(),
                    })
                }
                Some(variant) if variant.stock < requested => {
                    return Err(AppError::InsufficientStock {
                        sku: variant.sku.clone(),
                        available: variant.stock,
                        requested,
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    async fn get_variant(&self, variant_id: Uuid) -> Result<Option<ProductVariant>, AppError> {
        Ok(self.variants.lock().unwrap().get(&variant_id).cloned())
    }

    async fn adjust(
        &self,
        variant_id: Uuid,
        quantity_delta: i64,
        description: &str,
        invoice_id: Option<Uuid>,
    ) -> Result<StockLevel, AppError> {
        if self.fail_adjust.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "injected storage failure"
            )));
        }
        if quantity_delta == 0 {
            return Err(AppError::Validation(
                "stock adjustment must be non-zero".to_string(),
            ));
        }

        // Single lock span: the check and the write are indivisible, like
        // the conditional update in the SQL adapter.
        let mut variants = self.variants.lock().unwrap();
        let variant = variants
            .get_mut(&variant_id)
            .ok_or_else(|| AppError::SkuNotFound {
                sku: variant_id.to_string(),
            })?;
        let new_stock = variant.stock + quantity_delta;
        if new_stock < 0 {
            return Err(AppError::InsufficientStock {
                sku: variant.sku.clone(),
                available: variant.stock,
                requested: quantity_delta.unsigned_abs() as i64,
            });
        }
        variant.stock = new_stock;
        let level = StockLevel {
            variant_id,
            sku: variant.sku.clone(),
            quantity: new_stock,
        };
        drop(variants);

        self.movements.lock().unwrap().push(StockMovement {
            movement_id: Uuid::new_v4(),
            variant_id,
            direction: MovementDirection::from_delta(quantity_delta)
                .as_str()
                .to_string(),
            quantity: quantity_delta.unsigned_abs() as i64,
            description: description.to_string(),
            invoice_id,
            created_utc: Utc::now(),
        });

        Ok(level)
    }
}

// -----------------------------------------------------------------------------
// Account ledger fake
// -----------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryAccounts {
    accounts: Mutex<HashMap<Uuid, Account>>,
    transactions: Mutex<Vec<AccountTransaction>>,
    plans: Mutex<Vec<PaymentPlan>>,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_customer(&self, name: &str, balance: &str, credit_limit: &str) -> Uuid {
        let account = Account {
            account_id: Uuid::new_v4(),
            name: name.to_string(),
            document_type: "dni".to_string(),
            document_number: format!("30{:06}", self.accounts.lock().unwrap().len()),
            email: None,
            phone: None,
            address: Some("Av. Corrientes 1234".to_string()),
            kind: "customer".to_string(),
            credit_limit: credit_limit.parse().expect("bad decimal literal"),
            current_balance: balance.parse().expect("bad decimal literal"),
            status: "active".to_string(),
            last_transaction_utc: None,
            created_utc: Utc::now(),
        };
        let id = account.account_id;
        self.accounts.lock().unwrap().insert(id, account);
        id
    }

    pub fn balance_of(&self, account_id: Uuid) -> Decimal {
        self.accounts.lock().unwrap()[&account_id].current_balance
    }

    pub fn set_credit_limit(&self, account_id: Uuid, limit: &str) {
        self.accounts
            .lock()
            .unwrap()
            .get_mut(&account_id)
            .expect("unknown account")
            .credit_limit = limit.parse().expect("bad decimal literal");
    }

    pub fn transactions_for(&self, account_id: Uuid) -> Vec<AccountTransaction> {
        self.transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AccountLedger for InMemoryAccounts {
    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>, AppError> {
        Ok(self.accounts.lock().unwrap().get(&account_id).cloned())
    }

    async fn create_account(&self, input: &CreateAccount) -> Result<Account, AppError> {
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.values().any(|a| {
            a.document_type == input.document_type && a.document_number == input.document_number
        }) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "An account already exists for document {} {}",
                input.document_type,
                input.document_number
            )));
        }
        let account = Account {
            account_id: Uuid::new_v4(),
            name: input.name.clone(),
            document_type: input.document_type.clone(),
            document_number: input.document_number.clone(),
            email: input.email.clone(),
            phone: input.phone.clone(),
            address: input.address.clone(),
            kind: input.kind.as_str().to_string(),
            credit_limit: input.credit_limit,
            current_balance: Decimal::ZERO,
            status: "active".to_string(),
            last_transaction_utc: None,
            created_utc: Utc::now(),
        };
        accounts.insert(account.account_id, account.clone());
        Ok(account)
    }

    async fn update_account(
        &self,
        account_id: Uuid,
        input: &UpdateAccount,
    ) -> Result<Option<Account>, AppError> {
        let mut accounts = self.accounts.lock().unwrap();
        let Some(account) = accounts.get_mut(&account_id) else {
            return Ok(None);
        };
        if let Some(name) = &input.name {
            account.name = name.clone();
        }
        if let Some(email) = &input.email {
            account.email = Some(email.clone());
        }
        if let Some(phone) = &input.phone {
            account.phone = Some(phone.clone());
        }
        if let Some(address) = &input.address {
            account.address = Some(address.clone());
        }
        if let Some(limit) = input.credit_limit {
            account.credit_limit = limit;
        }
        if let Some(status) = input.status {
            account.status = status.as_str().to_string();
        }
        Ok(Some(account.clone()))
    }

    async fn post(&self, posting: &Posting) -> Result<AccountTransaction, AppError> {
        if posting.amount <= Decimal::ZERO {
            return Err(AppError::Validation(
                "transaction amount must be positive".to_string(),
            ));
        }

        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(&posting.account_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Account {}", posting.account_id)))?;

        let new_balance = account.current_balance + posting.direction.signed(posting.amount);
        if posting.direction == Direction::Debit && new_balance > account.credit_limit {
            return Err(AppError::CreditLimitExceeded {
                account_id: account.account_id,
                balance: account.current_balance,
                attempted: posting.amount,
                limit: account.credit_limit,
            });
        }

        let now = Utc::now();
        account.current_balance = new_balance;
        account.last_transaction_utc = Some(now);
        let transaction = AccountTransaction {
            transaction_id: Uuid::new_v4(),
            account_id: posting.account_id,
            direction: posting.direction.as_str().to_string(),
            amount: posting.amount,
            description: posting.description.clone(),
            payment_method: posting.payment_method.clone(),
            reference_number: posting.reference_number.clone(),
            invoice_id: posting.invoice_id,
            balance_after: new_balance,
            created_by: posting.created_by,
            created_utc: now,
        };
        drop(accounts);

        self.transactions.lock().unwrap().push(transaction.clone());
        Ok(transaction)
    }

    async fn statement(
        &self,
        account_id: Uuid,
        range: DateRange,
    ) -> Result<AccountStatement, AppError> {
        let account = self
            .get_account(account_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Account {}", account_id)))?;

        let in_range = |date: NaiveDate| {
            range.from.map_or(true, |from| date >= from) && range.to.map_or(true, |to| date <= to)
        };
        let transactions: Vec<AccountTransaction> = self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.account_id == account_id && in_range(t.created_utc.date_naive()))
            .cloned()
            .collect();

        let totals = AccountStatement::totals_of(&transactions);
        Ok(AccountStatement {
            account_id: account.account_id,
            account_name: account.name,
            current_balance: account.current_balance,
            transactions,
            totals,
        })
    }

    async fn create_payment_plan(
        &self,
        input: &CreatePaymentPlan,
    ) -> Result<PaymentPlan, AppError> {
        if input.installments < 1 {
            return Err(AppError::Validation(
                "a payment plan needs at least one installment".to_string(),
            ));
        }
        if input.total_amount <= Decimal::ZERO {
            return Err(AppError::Validation(
                "payment plan amount must be positive".to_string(),
            ));
        }
        let plan = PaymentPlan {
            plan_id: Uuid::new_v4(),
            account_id: input.account_id,
            total_amount: input.total_amount,
            installments: input.installments,
            installment_amount: round2(input.total_amount / Decimal::from(input.installments)),
            frequency: input.frequency.as_str().to_string(),
            start_date: input.start_date,
            status: "active".to_string(),
            created_utc: Utc::now(),
        };
        self.plans.lock().unwrap().push(plan.clone());
        Ok(plan)
    }
}

// -----------------------------------------------------------------------------
// Invoice store fake
// -----------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryInvoices {
    invoices: Mutex<HashMap<Uuid, Invoice>>,
    lines: Mutex<HashMap<Uuid, Vec<InvoiceLine>>>,
    events: Mutex<Vec<InvoiceEvent>>,
}

impl InMemoryInvoices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invoice_count(&self) -> usize {
        self.invoices.lock().unwrap().len()
    }

    /// Event type tags for one invoice, in append order.
    pub fn event_types_of(&self, invoice_id: Uuid) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.invoice_id == invoice_id)
            .map(|e| e.event_type.clone())
            .collect()
    }

    fn transition(
        &self,
        invoice_id: Uuid,
        expected: InvoiceStatus,
        apply: impl FnOnce(&mut Invoice),
    ) -> Result<(), AppError> {
        let mut invoices = self.invoices.lock().unwrap();
        let invoice = invoices
            .get_mut(&invoice_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice {}", invoice_id)))?;
        if invoice.parsed_status() != expected {
            return Err(AppError::InvalidState {
                entity: "invoice",
                id: invoice_id,
                current: invoice.status.clone(),
                expected: expected.as_str().to_string(),
            });
        }
        apply(invoice);
        invoice.updated_utc = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl InvoiceStore for InMemoryInvoices {
    async fn create_pending(
        &self,
        invoice: &Invoice,
        lines: &[InvoiceLine],
        event: &InvoiceEvent,
    ) -> Result<(), AppError> {
        self.invoices
            .lock()
            .unwrap()
            .insert(invoice.invoice_id, invoice.clone());
        self.lines
            .lock()
            .unwrap()
            .insert(invoice.invoice_id, lines.to_vec());
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn mark_completed(
        &self,
        invoice_id: Uuid,
        voucher_number: i64,
        authorization_code: &str,
        expires_on: NaiveDate,
        event: &InvoiceEvent,
    ) -> Result<(), AppError> {
        self.transition(invoice_id, InvoiceStatus::Pending, |invoice| {
            invoice.voucher_number = Some(voucher_number);
            invoice.authorization_code = Some(authorization_code.to_string());
            invoice.authorization_expires = Some(expires_on);
            invoice.status = InvoiceStatus::Completed.as_str().to_string();
        })?;
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn mark_error(
        &self,
        invoice_id: Uuid,
        message: &str,
        event: &InvoiceEvent,
    ) -> Result<(), AppError> {
        self.transition(invoice_id, InvoiceStatus::Pending, |invoice| {
            invoice.status = InvoiceStatus::Error.as_str().to_string();
            invoice.error_message = Some(message.to_string());
        })?;
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn mark_voided(&self, invoice_id: Uuid, event: &InvoiceEvent) -> Result<(), AppError> {
        self.transition(invoice_id, InvoiceStatus::Completed, |invoice| {
            invoice.status = InvoiceStatus::Voided.as_str().to_string();
        })?;
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn append_event(&self, event: &InvoiceEvent) -> Result<(), AppError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        Ok(self.invoices.lock().unwrap().get(&invoice_id).cloned())
    }

    async fn get_lines(&self, invoice_id: Uuid) -> Result<Vec<InvoiceLine>, AppError> {
        Ok(self
            .lines
            .lock()
            .unwrap()
            .get(&invoice_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_events(&self, invoice_id: Uuid) -> Result<Vec<InvoiceEvent>, AppError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    async fn list_invoices(&self, limit: i64) -> Result<Vec<Invoice>, AppError> {
        let mut invoices: Vec<Invoice> = self.invoices.lock().unwrap().values().cloned().collect();
        invoices.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        invoices.truncate(limit.max(0) as usize);
        Ok(invoices)
    }
}

// -----------------------------------------------------------------------------
// Notifier fake
// -----------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    changes: Mutex<Vec<StockChanged>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<StockChanged> {
        self.changes.lock().unwrap().clone()
    }
}

#[async_trait]
impl StockChangedNotifier for RecordingNotifier {
    async fn stock_changed(&self, change: StockChanged) {
        self.changes.lock().unwrap().push(change);
    }
}

// -----------------------------------------------------------------------------
// Context
// -----------------------------------------------------------------------------

/// Fully wired workflow over in-memory collaborators, 21% flat tax.
pub struct TestContext {
    pub authority: Arc<MockAuthority>,
    pub inventory: Arc<InMemoryInventory>,
    pub accounts: Arc<InMemoryAccounts>,
    pub invoices: Arc<InMemoryInvoices>,
    pub notifier: Arc<RecordingNotifier>,
    pub workflow: Arc<InvoiceWorkflow>,
    pub actor: Uuid,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    pub fn new() -> Self {
        let authority = Arc::new(MockAuthority::new());
        let inventory = Arc::new(InMemoryInventory::new());
        let accounts = Arc::new(InMemoryAccounts::new());
        let invoices = Arc::new(InMemoryInvoices::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let workflow = Arc::new(InvoiceWorkflow::new(
            invoices.clone(),
            inventory.clone(),
            accounts.clone(),
            authority.clone(),
            notifier.clone(),
            Decimal::new(21, 2),
        ));

        Self {
            authority,
            inventory,
            accounts,
            invoices,
            notifier,
            workflow,
            actor: Uuid::new_v4(),
        }
    }
}
