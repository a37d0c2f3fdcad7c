//! Engine services, one per reconciliation component.
//!
//! Every mutating operation runs inside a single database transaction and
//! re-derives dependent counters and statuses before committing, so a failed
//! request leaves prior state intact.

pub mod billing;
pub mod deliveries;
pub mod intake_orders;
pub mod invoices;
pub mod numbering;
pub(crate) mod reconcile;
pub mod stock_ledger;
