use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
    db::DbPool,
    entities::{
        delivery::{self, Entity as DeliveryEntity},
        delivery_line::{self, Entity as DeliveryLineEntity},
        intake_order::{self, Entity as IntakeOrderEntity},
        intake_order_line::{self, Entity as IntakeOrderLineEntity},
        invoice::{self, Entity as InvoiceEntity, InvoiceStatus},
        invoice_line::{self, Entity as InvoiceLineEntity},
        invoice_line_ref::{self, Entity as InvoiceLineRefEntity},
        item::{self, Entity as ItemEntity},
        stock_entry::{self, Entity as StockEntryEntity, LedgerDirection, ReferenceType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::reconcile,
    TenantScope,
};

/// Per-item balance row for the stock report.
#[derive(Debug, Serialize, Deserialize)]
pub struct StockBalance {
    pub item_id: i64,
    pub item_name: String,
    pub balance: Decimal,
}

/// What a ledger rebuild replayed.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RecomputeSummary {
    pub entries_written: usize,
    pub orders_replayed: usize,
    pub deliveries_replayed: usize,
    pub invoices_replayed: usize,
    /// Rows skipped because their source item could not be resolved.
    pub lines_skipped: usize,
}

/// Stock ledger reads plus the destructive rebuild.
#[derive(Clone)]
pub struct StockLedgerService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl StockLedgerService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Signed IN−OUT sum for an item, optionally up to a point in time.
    #[instrument(skip(self), fields(item_id = item_id))]
    pub async fn stock_balance(
        &self,
        scope: TenantScope,
        item_id: i64,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Decimal, ServiceError> {
        let db = &*self.db_pool;

        let mut query = StockEntryEntity::find()
            .filter(stock_entry::Column::CompanyId.eq(scope.company_id))
            .filter(stock_entry::Column::FinancialYearId.eq(scope.financial_year_id))
            .filter(stock_entry::Column::ItemId.eq(item_id));
        if let Some(as_of) = as_of {
            query = query.filter(stock_entry::Column::CreatedAt.lte(as_of));
        }

        let balance = query
            .all(db)
            .await?
            .iter()
            .map(|e| match e.direction {
                LedgerDirection::In => e.quantity,
                LedgerDirection::Out => -e.quantity,
            })
            .sum();

        Ok(balance)
    }

    /// Current balance for every active item in the scope.
    #[instrument(skip(self))]
    pub async fn stock_report(&self, scope: TenantScope) -> Result<Vec<StockBalance>, ServiceError> {
        let db = &*self.db_pool;

        let items = ItemEntity::find()
            .filter(item::Column::CompanyId.eq(scope.company_id))
            .filter(item::Column::IsActive.eq(true))
            .order_by_asc(item::Column::Id)
            .all(db)
            .await?;

        let mut balances: HashMap<i64, Decimal> = HashMap::new();
        for entry in StockEntryEntity::find()
            .filter(stock_entry::Column::CompanyId.eq(scope.company_id))
            .filter(stock_entry::Column::FinancialYearId.eq(scope.financial_year_id))
            .all(db)
            .await?
        {
            let delta = match entry.direction {
                LedgerDirection::In => entry.quantity,
                LedgerDirection::Out => -entry.quantity,
            };
            *balances.entry(entry.item_id).or_default() += delta;
        }

        Ok(items
            .into_iter()
            .map(|i| StockBalance {
                balance: balances.get(&i.id).copied().unwrap_or_default(),
                item_id: i.id,
                item_name: i.name,
            })
            .collect())
    }

    /// Records opening stock for an item as an IN/OPENING entry.
    #[instrument(skip(self), fields(item_id = item_id))]
    pub async fn record_opening_stock(
        &self,
        scope: TenantScope,
        item_id: i64,
        quantity: Decimal,
    ) -> Result<(), ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Opening stock quantity must be positive".into(),
            ));
        }

        let db = &*self.db_pool;
        stock_entry::ActiveModel {
            company_id: Set(scope.company_id),
            financial_year_id: Set(scope.financial_year_id),
            item_id: Set(item_id),
            quantity: Set(quantity),
            direction: Set(ReferenceType::Opening.direction()),
            reference_type: Set(ReferenceType::Opening),
            reference_id: Set(None),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await?;

        info!(item_id, %quantity, "Opening stock recorded");
        self.emit(Event::OpeningStockRecorded { item_id, quantity }).await;

        Ok(())
    }

    /// Destructive, idempotent ledger rebuild for one tenant scope.
    ///
    /// Drops every stock entry in the scope, then replays intake orders
    /// (IN), deliveries (OUT, item resolved through the intake line) and
    /// non-cancelled direct-sale invoice lines (OUT), each dated at its
    /// source document's creation time; finally re-derives every delivered
    /// counter and order status. Rows whose source item cannot be resolved
    /// are skipped and counted, not fatal: this operation exists to repair
    /// drift, not to validate documents.
    ///
    /// Callers must serialize recompute against other writers; the engine
    /// does not lock the scope itself.
    #[instrument(skip(self))]
    pub async fn recompute(&self, scope: TenantScope) -> Result<RecomputeSummary, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let mut summary = RecomputeSummary::default();

        // OPENING entries survive: they have no source document to replay
        // them from.
        StockEntryEntity::delete_many()
            .filter(stock_entry::Column::CompanyId.eq(scope.company_id))
            .filter(stock_entry::Column::FinancialYearId.eq(scope.financial_year_id))
            .filter(stock_entry::Column::ReferenceType.ne(ReferenceType::Opening))
            .exec(&txn)
            .await?;

        // Intake orders replay as IN entries.
        let orders = IntakeOrderEntity::find()
            .filter(intake_order::Column::CompanyId.eq(scope.company_id))
            .filter(intake_order::Column::FinancialYearId.eq(scope.financial_year_id))
            .order_by_asc(intake_order::Column::Id)
            .all(&txn)
            .await?;
        let order_ids: Vec<i64> = orders.iter().map(|o| o.id).collect();

        let mut order_lines: HashMap<i64, Vec<intake_order_line::Model>> = HashMap::new();
        for line in IntakeOrderLineEntity::find()
            .filter(intake_order_line::Column::IntakeOrderId.is_in(order_ids))
            .order_by_asc(intake_order_line::Column::Id)
            .all(&txn)
            .await?
        {
            order_lines.entry(line.intake_order_id).or_default().push(line);
        }

        let mut intake_line_index: HashMap<i64, intake_order_line::Model> = HashMap::new();
        for order in &orders {
            for line in order_lines.get(&order.id).map(Vec::as_slice).unwrap_or_default() {
                intake_line_index.insert(line.id, line.clone());
                if line.quantity_ordered > Decimal::ZERO {
                    insert_entry(
                        &txn,
                        scope,
                        line.item_id,
                        line.quantity_ordered,
                        ReferenceType::IntakeOrder,
                        Some(order.id),
                        order.created_at,
                    )
                    .await?;
                    summary.entries_written += 1;
                }
            }
            summary.orders_replayed += 1;
        }

        // Deliveries replay as OUT entries, items resolved via intake lines.
        let deliveries = DeliveryEntity::find()
            .filter(delivery::Column::CompanyId.eq(scope.company_id))
            .filter(delivery::Column::FinancialYearId.eq(scope.financial_year_id))
            .order_by_asc(delivery::Column::Id)
            .all(&txn)
            .await?;
        let delivery_ids: Vec<i64> = deliveries.iter().map(|d| d.id).collect();

        let mut lines_by_delivery: HashMap<i64, Vec<delivery_line::Model>> = HashMap::new();
        let mut delivered_totals: HashMap<i64, Decimal> = HashMap::new();
        for line in DeliveryLineEntity::find()
            .filter(delivery_line::Column::DeliveryId.is_in(delivery_ids))
            .order_by_asc(delivery_line::Column::Id)
            .all(&txn)
            .await?
        {
            *delivered_totals.entry(line.intake_order_line_id).or_default() += line.quantity;
            lines_by_delivery.entry(line.delivery_id).or_default().push(line);
        }

        for d in &deliveries {
            for line in lines_by_delivery.get(&d.id).map(Vec::as_slice).unwrap_or_default() {
                let Some(intake_line) = intake_line_index.get(&line.intake_order_line_id) else {
                    warn!(
                        delivery_line_id = line.id,
                        intake_order_line_id = line.intake_order_line_id,
                        "Skipping orphaned delivery line during recompute"
                    );
                    summary.lines_skipped += 1;
                    continue;
                };
                if line.quantity > Decimal::ZERO {
                    insert_entry(
                        &txn,
                        scope,
                        intake_line.item_id,
                        line.quantity,
                        ReferenceType::Delivery,
                        Some(d.id),
                        d.created_at,
                    )
                    .await?;
                    summary.entries_written += 1;
                }
            }
            summary.deliveries_replayed += 1;
        }

        // Non-cancelled invoices: only direct-sale lines move stock.
        let invoices = InvoiceEntity::find()
            .filter(invoice::Column::CompanyId.eq(scope.company_id))
            .filter(invoice::Column::FinancialYearId.eq(scope.financial_year_id))
            .filter(invoice::Column::Status.ne(InvoiceStatus::Cancelled))
            .order_by_asc(invoice::Column::Id)
            .all(&txn)
            .await?;
        let invoice_ids: Vec<i64> = invoices.iter().map(|i| i.id).collect();

        let mut lines_by_invoice: HashMap<i64, Vec<invoice_line::Model>> = HashMap::new();
        let mut all_invoice_line_ids = Vec::new();
        for line in InvoiceLineEntity::find()
            .filter(invoice_line::Column::InvoiceId.is_in(invoice_ids))
            .order_by_asc(invoice_line::Column::Id)
            .all(&txn)
            .await?
        {
            all_invoice_line_ids.push(line.id);
            lines_by_invoice.entry(line.invoice_id).or_default().push(line);
        }

        let linked_via_refs: std::collections::HashSet<i64> = InvoiceLineRefEntity::find()
            .filter(invoice_line_ref::Column::InvoiceLineId.is_in(all_invoice_line_ids))
            .all(&txn)
            .await?
            .iter()
            .map(|r| r.invoice_line_id)
            .collect();

        for inv in &invoices {
            for line in lines_by_invoice.get(&inv.id).map(Vec::as_slice).unwrap_or_default() {
                let is_direct =
                    line.delivery_line_id.is_none() && !linked_via_refs.contains(&line.id);
                if !is_direct || line.quantity <= Decimal::ZERO {
                    continue;
                }
                let Some(item_id) = line.item_id else {
                    warn!(
                        invoice_line_id = line.id,
                        "Skipping direct invoice line without item during recompute"
                    );
                    summary.lines_skipped += 1;
                    continue;
                };
                insert_entry(
                    &txn,
                    scope,
                    item_id,
                    line.quantity,
                    ReferenceType::Invoice,
                    Some(inv.id),
                    inv.created_at,
                )
                .await?;
                summary.entries_written += 1;
            }
            summary.invoices_replayed += 1;
        }

        // Re-derive every delivered counter from the surviving delivery
        // lines, then every order status from the refreshed counters.
        for order in &orders {
            for line in order_lines.get(&order.id).map(Vec::as_slice).unwrap_or_default() {
                let delivered = delivered_totals
                    .get(&line.id)
                    .copied()
                    .unwrap_or(Decimal::ZERO);
                if line.quantity_delivered != delivered {
                    let mut active: intake_order_line::ActiveModel = line.clone().into();
                    active.quantity_delivered = Set(delivered);
                    active.update(&txn).await?;
                }
            }
            reconcile::refresh_order_status(&txn, order.id).await?;
        }

        txn.commit().await?;

        info!(
            entries_written = summary.entries_written,
            orders = summary.orders_replayed,
            deliveries = summary.deliveries_replayed,
            invoices = summary.invoices_replayed,
            skipped = summary.lines_skipped,
            "Stock ledger recomputed"
        );
        self.emit(Event::StockLedgerRecomputed {
            company_id: scope.company_id,
            financial_year_id: scope.financial_year_id,
            entries_written: summary.entries_written,
        })
        .await;

        Ok(summary)
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send stock ledger event");
            }
        }
    }
}

async fn insert_entry<C: ConnectionTrait>(
    conn: &C,
    scope: TenantScope,
    item_id: i64,
    quantity: Decimal,
    reference_type: ReferenceType,
    reference_id: Option<i64>,
    created_at: DateTime<Utc>,
) -> Result<(), ServiceError> {
    stock_entry::ActiveModel {
        company_id: Set(scope.company_id),
        financial_year_id: Set(scope.financial_year_id),
        item_id: Set(item_id),
        quantity: Set(quantity),
        direction: Set(reference_type.direction()),
        reference_type: Set(reference_type),
        reference_id: Set(reference_id),
        created_at: Set(created_at),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    Ok(())
}
