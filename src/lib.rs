//! Job-Work Billing Reconciliation Engine
//!
//! Keeps ordered, delivered, quality-graded and billed quantities mutually
//! consistent across three document types: intake orders (what a party sent
//! in for processing), deliveries (processed goods returned in OK/CR/MR
//! quality buckets) and invoices (possibly partial, possibly spanning
//! several delivery lines). The stock transaction ledger is the source of
//! truth for on-hand quantities and can be rebuilt from the documents at any
//! time via [`services::stock_ledger::StockLedgerService::recompute`].
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod migrator;
pub mod services;

use serde::{Deserialize, Serialize};

/// Company + financial-year scope every engine operation runs under.
///
/// Tenant isolation itself is enforced by the surrounding system; the engine
/// only guarantees that every query and invariant it maintains is filtered
/// to this tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantScope {
    pub company_id: i64,
    pub financial_year_id: i64,
}

impl TenantScope {
    pub fn new(company_id: i64, financial_year_id: i64) -> Self {
        Self {
            company_id,
            financial_year_id,
        }
    }
}
