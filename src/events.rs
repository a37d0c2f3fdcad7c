use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted by the engine after successful mutations.
///
/// Consumers (notification fan-out, audit trail, report cache invalidation)
/// subscribe through the channel handed to [`EventSender`]. Event delivery
/// is fire-and-forget: a send failure is logged by the caller, never
/// propagated as an operation failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    IntakeOrderCreated(i64),
    IntakeOrderUpdated(i64),
    IntakeOrderDeleted(i64),

    DeliveryCreated(i64),
    DeliveryUpdated(i64),
    DeliveryDeleted(i64),

    InvoiceCreated(i64),
    InvoiceUpdated(i64),
    InvoiceDeleted(i64),

    OpeningStockRecorded {
        item_id: i64,
        quantity: Decimal,
    },

    StockLedgerRecomputed {
        company_id: i64,
        financial_year_id: i64,
        entries_written: usize,
    },

    /// Generic event data for consumers that attach free-form payloads
    Generic {
        message: String,
        metadata: serde_json::Value,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}
