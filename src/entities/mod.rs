//! sea-orm entities for the reconciliation engine.
//!
//! `item` and `party` are external masters the engine only reads; the
//! remaining tables are owned and mutated exclusively through the services.

pub mod delivery;
pub mod delivery_line;
pub mod intake_order;
pub mod intake_order_line;
pub mod invoice;
pub mod invoice_line;
pub mod invoice_line_ref;
pub mod item;
pub mod party;
pub mod payment_allocation;
pub mod stock_entry;
