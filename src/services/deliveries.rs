use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{
        delivery::{self, DeliveryStatus, Entity as DeliveryEntity},
        delivery_line::{self, Entity as DeliveryLineEntity},
        intake_order::IntakeOrderStatus,
        intake_order_line::{self, Entity as IntakeOrderLineEntity},
        invoice_line, invoice_line_ref,
        stock_entry::{self, ReferenceType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::numbering::{self, DELIVERY_PREFIX, MAX_NUMBERING_RETRIES},
    services::reconcile,
    TenantScope,
};

/// One requested delivery line, graded into quality buckets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryLineInput {
    pub intake_order_line_id: i64,
    pub ok_qty: Decimal,
    pub cr_qty: Decimal,
    pub mr_qty: Decimal,
    pub quantity: Decimal,
    pub rate: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateDeliveryRequest {
    pub party_id: i64,
    pub delivery_number: Option<String>,
    pub delivery_date: Option<NaiveDate>,
    #[validate(length(min = 1, message = "At least one line is required"))]
    pub lines: Vec<DeliveryLineInput>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeliveryLineResponse {
    pub id: i64,
    pub intake_order_line_id: i64,
    pub item_id: i64,
    pub ok_qty: Decimal,
    pub cr_qty: Decimal,
    pub mr_qty: Decimal,
    pub quantity: Decimal,
    pub rate: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeliveryResponse {
    pub id: i64,
    pub delivery_number: String,
    pub party_id: i64,
    pub delivery_date: NaiveDate,
    pub status: DeliveryStatus,
    pub lines: Vec<DeliveryLineResponse>,
}

/// Service for deliveries (processed goods returned to the party).
#[derive(Clone)]
pub struct DeliveryService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl DeliveryService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Records a delivery.
    ///
    /// Per line: the referenced intake order line must exist, the bucket sum
    /// must equal the declared quantity, the line's delivered counter is
    /// re-derived and the order status recomputed, and one OUT stock entry
    /// is appended (finished goods leave the processor's custody). No
    /// on-hand availability check is performed: returned job-work goods are
    /// not constrained by warehouse stock.
    #[instrument(skip(self, request), fields(party_id = request.party_id))]
    pub async fn create_delivery(
        &self,
        scope: TenantScope,
        request: CreateDeliveryRequest,
    ) -> Result<DeliveryResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        validate_lines(&request.lines)?;

        let db = &*self.db_pool;
        let now = Utc::now();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for delivery creation");
            ServiceError::DatabaseError(e)
        })?;

        let delivery_number = match &request.delivery_number {
            Some(number) => {
                if delivery_number_exists(&txn, scope, number).await? {
                    return Err(ServiceError::Conflict(format!(
                        "Delivery number '{}' already exists in this financial year",
                        number
                    )));
                }
                number.clone()
            }
            None => generate_delivery_number(&txn, scope).await?,
        };

        let delivery = delivery::ActiveModel {
            company_id: Set(scope.company_id),
            financial_year_id: Set(scope.financial_year_id),
            party_id: Set(request.party_id),
            delivery_number: Set(delivery_number),
            delivery_date: Set(request.delivery_date.unwrap_or_else(|| now.date_naive())),
            status: Set(DeliveryStatus::Sent),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let status = apply_lines(&txn, scope, &delivery, &request.lines).await?;

        let mut active: delivery::ActiveModel = delivery.clone().into();
        active.status = Set(status);
        let delivery = active.update(&txn).await?;

        txn.commit().await?;

        info!(
            delivery_id = delivery.id,
            delivery_number = %delivery.delivery_number,
            "Delivery created"
        );
        self.emit(Event::DeliveryCreated(delivery.id)).await;

        let lines = load_lines_with_items(&*self.db_pool, delivery.id).await?;
        Ok(to_response(delivery, lines))
    }

    /// Replaces a delivery's line set atomically.
    ///
    /// Full reverse-then-reapply: every existing line is reversed (counter
    /// re-derived, order status recomputed, stock entries removed), then the
    /// new set is applied through the creation path. No diffing, so the
    /// conservation invariant holds however many lines were added, removed
    /// or changed.
    #[instrument(skip(self, lines), fields(delivery_id = delivery_id))]
    pub async fn update_delivery(
        &self,
        scope: TenantScope,
        delivery_id: i64,
        lines: Vec<DeliveryLineInput>,
    ) -> Result<DeliveryResponse, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "At least one line is required".into(),
            ));
        }
        validate_lines(&lines)?;

        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let delivery = find_delivery(&txn, scope, delivery_id).await?;

        reverse_delivery(&txn, &delivery).await?;
        let status = apply_lines(&txn, scope, &delivery, &lines).await?;

        let mut active: delivery::ActiveModel = delivery.clone().into();
        active.status = Set(status);
        let delivery = active.update(&txn).await?;

        txn.commit().await?;

        info!(delivery_id, "Delivery updated");
        self.emit(Event::DeliveryUpdated(delivery_id)).await;

        let fresh = load_lines_with_items(&*self.db_pool, delivery.id).await?;
        Ok(to_response(delivery, fresh))
    }

    /// Deletes a delivery; refused once any invoice line references it.
    #[instrument(skip(self), fields(delivery_id = delivery_id))]
    pub async fn delete_delivery(
        &self,
        scope: TenantScope,
        delivery_id: i64,
    ) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let delivery = find_delivery(&txn, scope, delivery_id).await?;

        let line_ids: Vec<i64> = DeliveryLineEntity::find()
            .filter(delivery_line::Column::DeliveryId.eq(delivery_id))
            .all(&txn)
            .await?
            .iter()
            .map(|l| l.id)
            .collect();

        let billed_direct = invoice_line::Entity::find()
            .filter(invoice_line::Column::DeliveryLineId.is_in(line_ids.clone()))
            .count(&txn)
            .await?;
        let billed_via_refs = invoice_line_ref::Entity::find()
            .filter(invoice_line_ref::Column::DeliveryLineId.is_in(line_ids))
            .count(&txn)
            .await?;
        if billed_direct + billed_via_refs > 0 {
            return Err(ServiceError::Conflict(
                "Cannot delete: delivery has been billed".into(),
            ));
        }

        reverse_delivery(&txn, &delivery).await?;
        DeliveryEntity::delete_by_id(delivery_id).exec(&txn).await?;

        txn.commit().await?;

        info!(delivery_id, "Delivery deleted");
        self.emit(Event::DeliveryDeleted(delivery_id)).await;

        Ok(())
    }

    #[instrument(skip(self), fields(delivery_id = delivery_id))]
    pub async fn get_delivery(
        &self,
        scope: TenantScope,
        delivery_id: i64,
    ) -> Result<DeliveryResponse, ServiceError> {
        let db = &*self.db_pool;
        let delivery = find_delivery(db, scope, delivery_id).await?;
        let lines = load_lines_with_items(db, delivery_id).await?;
        Ok(DeliveryResponse {
            id: delivery.id,
            delivery_number: delivery.delivery_number,
            party_id: delivery.party_id,
            delivery_date: delivery.delivery_date,
            status: delivery.status,
            lines,
        })
    }

    /// Lists deliveries in the scope, newest first.
    #[instrument(skip(self))]
    pub async fn list_deliveries(
        &self,
        scope: TenantScope,
        party_id: Option<i64>,
    ) -> Result<Vec<DeliveryResponse>, ServiceError> {
        let db = &*self.db_pool;

        let mut query = DeliveryEntity::find()
            .filter(delivery::Column::CompanyId.eq(scope.company_id))
            .filter(delivery::Column::FinancialYearId.eq(scope.financial_year_id));
        if let Some(party_id) = party_id {
            query = query.filter(delivery::Column::PartyId.eq(party_id));
        }

        let deliveries = query
            .order_by_desc(delivery::Column::DeliveryDate)
            .order_by_desc(delivery::Column::Id)
            .all(db)
            .await?;

        let mut responses = Vec::with_capacity(deliveries.len());
        for delivery in deliveries {
            let lines = load_lines_with_items(db, delivery.id).await?;
            responses.push(DeliveryResponse {
                id: delivery.id,
                delivery_number: delivery.delivery_number,
                party_id: delivery.party_id,
                delivery_date: delivery.delivery_date,
                status: delivery.status,
                lines,
            });
        }
        Ok(responses)
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send delivery event");
            }
        }
    }
}

fn validate_lines(lines: &[DeliveryLineInput]) -> Result<(), ServiceError> {
    for line in lines {
        if line.ok_qty < Decimal::ZERO
            || line.cr_qty < Decimal::ZERO
            || line.mr_qty < Decimal::ZERO
            || line.quantity < Decimal::ZERO
        {
            return Err(ServiceError::ValidationError(format!(
                "Quantities must not be negative on intake line {}",
                line.intake_order_line_id
            )));
        }
        let bucket_sum = line.ok_qty + line.cr_qty + line.mr_qty;
        if bucket_sum != line.quantity {
            return Err(ServiceError::InvariantViolation(format!(
                "Bucket sum {} does not equal quantity {} on intake line {}",
                bucket_sum, line.quantity, line.intake_order_line_id
            )));
        }
    }
    Ok(())
}

/// Aggregate order status a delivery snapshots after a mutation.
fn aggregate_status(statuses: &[IntakeOrderStatus]) -> DeliveryStatus {
    if !statuses.is_empty() && statuses.iter().all(|s| *s == IntakeOrderStatus::Completed) {
        DeliveryStatus::Completed
    } else if !statuses.is_empty() && statuses.iter().all(|s| *s == IntakeOrderStatus::Open) {
        DeliveryStatus::Open
    } else if statuses.is_empty() {
        DeliveryStatus::Sent
    } else {
        DeliveryStatus::Partial
    }
}

/// Inserts the given line set for `delivery`: delivery lines, re-derived
/// counters, refreshed order statuses and one OUT stock entry per non-empty
/// line. Returns the status snapshot of the touched orders.
async fn apply_lines<C: ConnectionTrait>(
    conn: &C,
    scope: TenantScope,
    delivery: &delivery::Model,
    inputs: &[DeliveryLineInput],
) -> Result<DeliveryStatus, ServiceError> {
    let mut touched_orders = BTreeSet::new();

    for input in inputs {
        let intake_line = IntakeOrderLineEntity::find_by_id(input.intake_order_line_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::not_found(format!(
                    "Intake order line {} not found",
                    input.intake_order_line_id
                ))
            })?;

        delivery_line::ActiveModel {
            delivery_id: Set(delivery.id),
            intake_order_line_id: Set(intake_line.id),
            ok_qty: Set(input.ok_qty),
            cr_qty: Set(input.cr_qty),
            mr_qty: Set(input.mr_qty),
            quantity: Set(input.quantity),
            rate: Set(input.rate.unwrap_or(Decimal::ZERO)),
            ..Default::default()
        }
        .insert(conn)
        .await?;

        reconcile::resync_line_delivered(conn, intake_line.id).await?;
        touched_orders.insert(intake_line.intake_order_id);

        if input.quantity > Decimal::ZERO {
            stock_entry::ActiveModel {
                company_id: Set(scope.company_id),
                financial_year_id: Set(scope.financial_year_id),
                item_id: Set(intake_line.item_id),
                quantity: Set(input.quantity),
                direction: Set(ReferenceType::Delivery.direction()),
                reference_type: Set(ReferenceType::Delivery),
                reference_id: Set(Some(delivery.id)),
                created_at: Set(delivery.created_at),
                ..Default::default()
            }
            .insert(conn)
            .await?;
        }
    }

    let mut statuses = Vec::with_capacity(touched_orders.len());
    for order_id in touched_orders {
        statuses.push(reconcile::refresh_order_status(conn, order_id).await?);
    }

    Ok(aggregate_status(&statuses))
}

/// Reverses all of a delivery's effects: removes its lines, re-derives the
/// touched counters and order statuses, and deletes its stock entries.
async fn reverse_delivery<C: ConnectionTrait>(
    conn: &C,
    delivery: &delivery::Model,
) -> Result<(), ServiceError> {
    let existing = DeliveryLineEntity::find()
        .filter(delivery_line::Column::DeliveryId.eq(delivery.id))
        .all(conn)
        .await?;

    let intake_line_ids: BTreeSet<i64> =
        existing.iter().map(|l| l.intake_order_line_id).collect();

    DeliveryLineEntity::delete_many()
        .filter(delivery_line::Column::DeliveryId.eq(delivery.id))
        .exec(conn)
        .await?;

    let mut touched_orders = BTreeSet::new();
    for line_id in intake_line_ids {
        let refreshed = reconcile::resync_line_delivered(conn, line_id).await?;
        touched_orders.insert(refreshed.intake_order_id);
    }
    for order_id in touched_orders {
        reconcile::refresh_order_status(conn, order_id).await?;
    }

    stock_entry::Entity::delete_many()
        .filter(stock_entry::Column::ReferenceType.eq(ReferenceType::Delivery))
        .filter(stock_entry::Column::ReferenceId.eq(delivery.id))
        .exec(conn)
        .await?;

    Ok(())
}

async fn find_delivery<C: ConnectionTrait>(
    conn: &C,
    scope: TenantScope,
    delivery_id: i64,
) -> Result<delivery::Model, ServiceError> {
    DeliveryEntity::find_by_id(delivery_id)
        .filter(delivery::Column::CompanyId.eq(scope.company_id))
        .filter(delivery::Column::FinancialYearId.eq(scope.financial_year_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("Delivery {} not found", delivery_id)))
}

async fn delivery_number_exists<C: ConnectionTrait>(
    conn: &C,
    scope: TenantScope,
    number: &str,
) -> Result<bool, ServiceError> {
    let existing = DeliveryEntity::find()
        .filter(delivery::Column::CompanyId.eq(scope.company_id))
        .filter(delivery::Column::FinancialYearId.eq(scope.financial_year_id))
        .filter(delivery::Column::DeliveryNumber.eq(number))
        .count(conn)
        .await?;
    Ok(existing > 0)
}

async fn generate_delivery_number<C: ConnectionTrait>(
    conn: &C,
    scope: TenantScope,
) -> Result<String, ServiceError> {
    let last = DeliveryEntity::find()
        .filter(delivery::Column::CompanyId.eq(scope.company_id))
        .filter(delivery::Column::FinancialYearId.eq(scope.financial_year_id))
        .order_by_desc(delivery::Column::Id)
        .one(conn)
        .await?
        .map(|d| d.delivery_number);
    let mut suffix = numbering::next_suffix(last.as_deref());

    for _ in 0..MAX_NUMBERING_RETRIES {
        let candidate = numbering::format_number(DELIVERY_PREFIX, suffix);
        if !delivery_number_exists(conn, scope, &candidate).await? {
            return Ok(candidate);
        }
        warn!(%candidate, "Delivery number collision, trying next");
        suffix = suffix.saturating_add(1);
    }

    Err(ServiceError::Conflict(
        "Could not generate a unique delivery number".into(),
    ))
}

async fn load_lines_with_items<C: ConnectionTrait>(
    conn: &C,
    delivery_id: i64,
) -> Result<Vec<DeliveryLineResponse>, ServiceError> {
    let lines = DeliveryLineEntity::find()
        .filter(delivery_line::Column::DeliveryId.eq(delivery_id))
        .order_by_asc(delivery_line::Column::Id)
        .all(conn)
        .await?;

    let intake_line_ids: Vec<i64> = lines.iter().map(|l| l.intake_order_line_id).collect();
    let items_by_line: HashMap<i64, i64> = IntakeOrderLineEntity::find()
        .filter(intake_order_line::Column::Id.is_in(intake_line_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|l| (l.id, l.item_id))
        .collect();

    Ok(lines
        .into_iter()
        .map(|line| DeliveryLineResponse {
            id: line.id,
            intake_order_line_id: line.intake_order_line_id,
            item_id: items_by_line
                .get(&line.intake_order_line_id)
                .copied()
                .unwrap_or_default(),
            ok_qty: line.ok_qty,
            cr_qty: line.cr_qty,
            mr_qty: line.mr_qty,
            quantity: line.quantity,
            rate: line.rate,
        })
        .collect())
}

fn to_response(delivery: delivery::Model, lines: Vec<DeliveryLineResponse>) -> DeliveryResponse {
    DeliveryResponse {
        id: delivery.id,
        delivery_number: delivery.delivery_number,
        party_id: delivery.party_id,
        delivery_date: delivery.delivery_date,
        status: delivery.status,
        lines,
    }
}
