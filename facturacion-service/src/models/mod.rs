//! Domain models for the fiscal invoicing core.

pub mod account;
pub mod fiscal;
pub mod invoice;
pub mod stock;

pub use account::{
    replay_balance, Account, AccountKind, AccountStatement, AccountStatus, AccountTransaction,
    CreateAccount, CreatePaymentPlan, DateRange, Direction, PaymentPlan, PlanFrequency, Posting,
    StatementTotals, UpdateAccount,
};
pub use fiscal::{AccessTicket, AuthorizationApproval, AuthorizationRequest, RelatedVoucher};
pub use invoice::{
    line_amounts, round2, BuyerDocType, DocumentType, Invoice, InvoiceEvent, InvoiceEventType,
    InvoiceLine, InvoiceStatus, IssueInvoiceRequest, LineAmounts, LineRequest, POINT_OF_SALE_MAX,
};
pub use stock::{MovementDirection, ProductVariant, StockLevel, StockMovement};
