//! Service components. The workflow orchestrates; everything else is a leaf.

pub mod accounts;
pub mod afip;
pub mod database;
pub mod inventory;
pub mod metrics;
pub mod notify;
pub mod voucher;
pub mod workflow;

pub use accounts::{AccountLedger, PgAccountLedger};
pub use afip::{AfipClient, FiscalAuthority, HmacTicketSigner, TicketSigner};
pub use database::Database;
pub use inventory::{InventoryLedger, PgInventoryLedger};
pub use notify::{LoggingNotifier, StockChanged, StockChangedNotifier};
pub use voucher::VoucherSequence;
pub use workflow::{InvoiceDetail, InvoiceStore, InvoiceWorkflow, LedgerLeg, PendingLegs, StockLeg};
