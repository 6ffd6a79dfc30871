//! Fiscal invoicing core.
//!
//! Issues fiscally authorized sales invoices: validates the order, obtains an
//! authorization code from the tax authority, deducts stock and posts the
//! invoice total to the buyer's running account. The inverse (void via credit
//! note) restores both. Transport surfaces and catalog CRUD live elsewhere;
//! this crate is the workflow and its ledgers.

pub mod models;
pub mod services;
