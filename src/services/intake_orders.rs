use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
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
        delivery_line,
        intake_order::{self, Entity as IntakeOrderEntity, IntakeOrderStatus},
        intake_order_line::{self, Entity as IntakeOrderLineEntity},
        item::{self, Entity as ItemEntity},
        stock_entry::{self, ReferenceType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::numbering::{self, INTAKE_ORDER_PREFIX, MAX_NUMBERING_RETRIES},
    services::reconcile,
    TenantScope,
};

/// One requested order line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeOrderLineInput {
    pub item_id: i64,
    pub quantity_ordered: Decimal,
    pub rate: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateIntakeOrderRequest {
    pub party_id: i64,
    /// Manual number; generated when absent.
    pub order_number: Option<String>,
    pub order_date: Option<NaiveDate>,
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "At least one line is required"))]
    pub lines: Vec<IntakeOrderLineInput>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateIntakeOrderRequest {
    pub party_id: Option<i64>,
    pub order_date: Option<NaiveDate>,
    pub notes: Option<String>,
    /// Full replacement of the line set. Refused while any existing line is
    /// referenced by a delivery.
    pub lines: Option<Vec<IntakeOrderLineInput>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IntakeOrderLineResponse {
    pub id: i64,
    pub item_id: i64,
    pub quantity_ordered: Decimal,
    pub quantity_delivered: Decimal,
    pub rate: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IntakeOrderResponse {
    pub id: i64,
    pub order_number: String,
    pub party_id: i64,
    pub order_date: NaiveDate,
    pub notes: Option<String>,
    pub status: IntakeOrderStatus,
    pub lines: Vec<IntakeOrderLineResponse>,
}

/// Per-line delivery progress of an order.
#[derive(Debug, Serialize, Deserialize)]
pub struct LineProgress {
    pub item_id: i64,
    pub item_name: String,
    pub quantity_ordered: Decimal,
    pub quantity_delivered: Decimal,
    pub quantity_remaining: Decimal,
    pub percentage: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeliveryProgressResponse {
    pub intake_order_id: i64,
    pub order_number: String,
    pub total_lines: usize,
    pub lines: Vec<LineProgress>,
    pub overall_percentage: f64,
}

/// Service for intake orders (what a party sent in for processing).
#[derive(Clone)]
pub struct IntakeOrderService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl IntakeOrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates an intake order with its lines.
    ///
    /// Lines start with `quantity_delivered = 0` and the order `open`; one
    /// IN stock entry is written per non-empty line.
    #[instrument(skip(self, request), fields(party_id = request.party_id))]
    pub async fn create_order(
        &self,
        scope: TenantScope,
        request: CreateIntakeOrderRequest,
    ) -> Result<IntakeOrderResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        validate_lines(&request.lines)?;

        let db = &*self.db_pool;
        let now = Utc::now();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let order_number = match &request.order_number {
            Some(number) => {
                if order_number_exists(&txn, scope, request.party_id, number).await? {
                    return Err(ServiceError::Conflict(format!(
                        "Order number '{}' already exists for this party in this financial year",
                        number
                    )));
                }
                number.clone()
            }
            None => generate_order_number(&txn, scope, request.party_id).await?,
        };

        let order = intake_order::ActiveModel {
            company_id: Set(scope.company_id),
            financial_year_id: Set(scope.financial_year_id),
            party_id: Set(request.party_id),
            order_number: Set(order_number),
            order_date: Set(request.order_date.unwrap_or_else(|| now.date_naive())),
            notes: Set(request.notes.clone()),
            status: Set(IntakeOrderStatus::Open),
            created_at: Set(now),
            updated_at: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let mut lines = Vec::with_capacity(request.lines.len());
        for input in &request.lines {
            let line = intake_order_line::ActiveModel {
                intake_order_id: Set(order.id),
                item_id: Set(input.item_id),
                quantity_ordered: Set(input.quantity_ordered),
                quantity_delivered: Set(Decimal::ZERO),
                rate: Set(input.rate),
                ..Default::default()
            }
            .insert(&txn)
            .await?;

            if input.quantity_ordered > Decimal::ZERO {
                stock_entry::ActiveModel {
                    company_id: Set(scope.company_id),
                    financial_year_id: Set(scope.financial_year_id),
                    item_id: Set(input.item_id),
                    quantity: Set(input.quantity_ordered),
                    direction: Set(ReferenceType::IntakeOrder.direction()),
                    reference_type: Set(ReferenceType::IntakeOrder),
                    reference_id: Set(Some(order.id)),
                    created_at: Set(order.created_at),
                    ..Default::default()
                }
                .insert(&txn)
                .await?;
            }

            lines.push(line);
        }

        txn.commit().await?;

        info!(order_id = order.id, order_number = %order.order_number, "Intake order created");
        self.emit(Event::IntakeOrderCreated(order.id)).await;

        Ok(to_response(order, lines))
    }

    /// Updates an order's header fields and, optionally, replaces its lines.
    #[instrument(skip(self, request), fields(order_id = order_id))]
    pub async fn update_order(
        &self,
        scope: TenantScope,
        order_id: i64,
        request: UpdateIntakeOrderRequest,
    ) -> Result<IntakeOrderResponse, ServiceError> {
        if let Some(lines) = &request.lines {
            if lines.is_empty() {
                return Err(ServiceError::ValidationError(
                    "At least one line is required".into(),
                ));
            }
            validate_lines(lines)?;
        }

        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let order = find_order(&txn, scope, order_id).await?;

        let mut active: intake_order::ActiveModel = order.clone().into();
        if let Some(party_id) = request.party_id {
            active.party_id = Set(party_id);
        }
        if let Some(order_date) = request.order_date {
            active.order_date = Set(order_date);
        }
        if let Some(notes) = request.notes.clone() {
            active.notes = Set(Some(notes));
        }
        active.updated_at = Set(Some(Utc::now()));
        let order = active.update(&txn).await?;

        let lines = match request.lines {
            Some(inputs) => {
                let existing = IntakeOrderLineEntity::find()
                    .filter(intake_order_line::Column::IntakeOrderId.eq(order_id))
                    .all(&txn)
                    .await?;
                let line_ids: Vec<i64> = existing.iter().map(|l| l.id).collect();

                let referenced = delivery_line::Entity::find()
                    .filter(delivery_line::Column::IntakeOrderLineId.is_in(line_ids))
                    .count(&txn)
                    .await?;
                if referenced > 0 {
                    return Err(ServiceError::Conflict(format!(
                        "Cannot replace lines: {} delivery line(s) reference this order",
                        referenced
                    )));
                }

                IntakeOrderLineEntity::delete_many()
                    .filter(intake_order_line::Column::IntakeOrderId.eq(order_id))
                    .exec(&txn)
                    .await?;
                stock_entry::Entity::delete_many()
                    .filter(stock_entry::Column::ReferenceType.eq(ReferenceType::IntakeOrder))
                    .filter(stock_entry::Column::ReferenceId.eq(order_id))
                    .exec(&txn)
                    .await?;

                let mut fresh = Vec::with_capacity(inputs.len());
                for input in &inputs {
                    let line = intake_order_line::ActiveModel {
                        intake_order_id: Set(order.id),
                        item_id: Set(input.item_id),
                        quantity_ordered: Set(input.quantity_ordered),
                        quantity_delivered: Set(Decimal::ZERO),
                        rate: Set(input.rate),
                        ..Default::default()
                    }
                    .insert(&txn)
                    .await?;

                    if input.quantity_ordered > Decimal::ZERO {
                        stock_entry::ActiveModel {
                            company_id: Set(scope.company_id),
                            financial_year_id: Set(scope.financial_year_id),
                            item_id: Set(input.item_id),
                            quantity: Set(input.quantity_ordered),
                            direction: Set(ReferenceType::IntakeOrder.direction()),
                            reference_type: Set(ReferenceType::IntakeOrder),
                            reference_id: Set(Some(order.id)),
                            created_at: Set(order.created_at),
                            ..Default::default()
                        }
                        .insert(&txn)
                        .await?;
                    }

                    fresh.push(line);
                }
                fresh
            }
            None => {
                IntakeOrderLineEntity::find()
                    .filter(intake_order_line::Column::IntakeOrderId.eq(order_id))
                    .order_by_asc(intake_order_line::Column::Id)
                    .all(&txn)
                    .await?
            }
        };

        let status = reconcile::refresh_order_status(&txn, order_id).await?;
        txn.commit().await?;

        info!(order_id, %status, "Intake order updated");
        self.emit(Event::IntakeOrderUpdated(order_id)).await;

        let mut order = order;
        order.status = status;
        Ok(to_response(order, lines))
    }

    /// Deletes an order; refused while any delivery references one of its
    /// lines.
    #[instrument(skip(self), fields(order_id = order_id))]
    pub async fn delete_order(&self, scope: TenantScope, order_id: i64) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let _order = find_order(&txn, scope, order_id).await?;

        let line_ids: Vec<i64> = IntakeOrderLineEntity::find()
            .filter(intake_order_line::Column::IntakeOrderId.eq(order_id))
            .all(&txn)
            .await?
            .iter()
            .map(|l| l.id)
            .collect();

        let linked_deliveries = delivery_line::Entity::find()
            .filter(delivery_line::Column::IntakeOrderLineId.is_in(line_ids))
            .count(&txn)
            .await?;
        if linked_deliveries > 0 {
            return Err(ServiceError::Conflict(format!(
                "Cannot delete: {} delivery line(s) are linked to this order",
                linked_deliveries
            )));
        }

        stock_entry::Entity::delete_many()
            .filter(stock_entry::Column::ReferenceType.eq(ReferenceType::IntakeOrder))
            .filter(stock_entry::Column::ReferenceId.eq(order_id))
            .exec(&txn)
            .await?;
        IntakeOrderLineEntity::delete_many()
            .filter(intake_order_line::Column::IntakeOrderId.eq(order_id))
            .exec(&txn)
            .await?;
        IntakeOrderEntity::delete_by_id(order_id).exec(&txn).await?;

        txn.commit().await?;

        info!(order_id, "Intake order deleted");
        self.emit(Event::IntakeOrderDeleted(order_id)).await;

        Ok(())
    }

    #[instrument(skip(self), fields(order_id = order_id))]
    pub async fn get_order(
        &self,
        scope: TenantScope,
        order_id: i64,
    ) -> Result<IntakeOrderResponse, ServiceError> {
        let db = &*self.db_pool;
        let order = find_order(db, scope, order_id).await?;
        let lines = IntakeOrderLineEntity::find()
            .filter(intake_order_line::Column::IntakeOrderId.eq(order_id))
            .order_by_asc(intake_order_line::Column::Id)
            .all(db)
            .await?;
        Ok(to_response(order, lines))
    }

    /// Lists orders in the scope, newest first, optionally filtered.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        scope: TenantScope,
        party_id: Option<i64>,
        status: Option<IntakeOrderStatus>,
    ) -> Result<Vec<IntakeOrderResponse>, ServiceError> {
        let db = &*self.db_pool;

        let mut query = IntakeOrderEntity::find()
            .filter(intake_order::Column::CompanyId.eq(scope.company_id))
            .filter(intake_order::Column::FinancialYearId.eq(scope.financial_year_id));
        if let Some(party_id) = party_id {
            query = query.filter(intake_order::Column::PartyId.eq(party_id));
        }
        if let Some(status) = status {
            query = query.filter(intake_order::Column::Status.eq(status));
        }

        let orders = query
            .order_by_desc(intake_order::Column::OrderDate)
            .order_by_desc(intake_order::Column::Id)
            .all(db)
            .await?;

        let order_ids: Vec<i64> = orders.iter().map(|o| o.id).collect();
        let mut lines_by_order: HashMap<i64, Vec<intake_order_line::Model>> = HashMap::new();
        for line in IntakeOrderLineEntity::find()
            .filter(intake_order_line::Column::IntakeOrderId.is_in(order_ids))
            .order_by_asc(intake_order_line::Column::Id)
            .all(db)
            .await?
        {
            lines_by_order.entry(line.intake_order_id).or_default().push(line);
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let lines = lines_by_order.remove(&order.id).unwrap_or_default();
                to_response(order, lines)
            })
            .collect())
    }

    /// Delivery progress of an order, per line and overall.
    #[instrument(skip(self), fields(order_id = order_id))]
    pub async fn delivery_progress(
        &self,
        scope: TenantScope,
        order_id: i64,
    ) -> Result<DeliveryProgressResponse, ServiceError> {
        let db = &*self.db_pool;
        let order = find_order(db, scope, order_id).await?;
        let lines = IntakeOrderLineEntity::find()
            .filter(intake_order_line::Column::IntakeOrderId.eq(order_id))
            .order_by_asc(intake_order_line::Column::Id)
            .all(db)
            .await?;

        let item_ids: Vec<i64> = lines.iter().map(|l| l.item_id).collect();
        let items: HashMap<i64, item::Model> = ItemEntity::find()
            .filter(item::Column::Id.is_in(item_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|i| (i.id, i))
            .collect();

        let mut total_ordered = Decimal::ZERO;
        let mut total_delivered = Decimal::ZERO;
        let mut progress = Vec::with_capacity(lines.len());

        for line in &lines {
            total_ordered += line.quantity_ordered;
            total_delivered += line.quantity_delivered;

            let percentage = if line.quantity_ordered > Decimal::ZERO {
                (line.quantity_delivered / line.quantity_ordered * Decimal::ONE_HUNDRED)
                    .to_f64()
                    .unwrap_or(0.0)
            } else {
                0.0
            };

            progress.push(LineProgress {
                item_id: line.item_id,
                item_name: items
                    .get(&line.item_id)
                    .map(|i| i.name.clone())
                    .unwrap_or_else(|| "Unknown".to_string()),
                quantity_ordered: line.quantity_ordered,
                quantity_delivered: line.quantity_delivered,
                quantity_remaining: line.quantity_ordered - line.quantity_delivered,
                percentage,
            });
        }

        let overall_percentage = if total_ordered > Decimal::ZERO {
            (total_delivered / total_ordered * Decimal::ONE_HUNDRED)
                .to_f64()
                .unwrap_or(0.0)
        } else {
            0.0
        };

        Ok(DeliveryProgressResponse {
            intake_order_id: order.id,
            order_number: order.order_number,
            total_lines: lines.len(),
            lines: progress,
            overall_percentage,
        })
    }

    /// Previews the number the next created order would receive.
    pub async fn next_order_number(&self, scope: TenantScope) -> Result<String, ServiceError> {
        let db = &*self.db_pool;
        let last = latest_order_number(db, scope).await?;
        Ok(numbering::format_number(
            INTAKE_ORDER_PREFIX,
            numbering::next_suffix(last.as_deref()),
        ))
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send intake order event");
            }
        }
    }
}

fn validate_lines(lines: &[IntakeOrderLineInput]) -> Result<(), ServiceError> {
    for line in lines {
        if line.quantity_ordered < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "quantity_ordered must not be negative for item {}",
                line.item_id
            )));
        }
    }
    Ok(())
}

async fn find_order<C: ConnectionTrait>(
    conn: &C,
    scope: TenantScope,
    order_id: i64,
) -> Result<intake_order::Model, ServiceError> {
    IntakeOrderEntity::find_by_id(order_id)
        .filter(intake_order::Column::CompanyId.eq(scope.company_id))
        .filter(intake_order::Column::FinancialYearId.eq(scope.financial_year_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("Intake order {} not found", order_id)))
}

async fn order_number_exists<C: ConnectionTrait>(
    conn: &C,
    scope: TenantScope,
    party_id: i64,
    number: &str,
) -> Result<bool, ServiceError> {
    let existing = IntakeOrderEntity::find()
        .filter(intake_order::Column::CompanyId.eq(scope.company_id))
        .filter(intake_order::Column::FinancialYearId.eq(scope.financial_year_id))
        .filter(intake_order::Column::PartyId.eq(party_id))
        .filter(intake_order::Column::OrderNumber.eq(number))
        .count(conn)
        .await?;
    Ok(existing > 0)
}

async fn latest_order_number<C: ConnectionTrait>(
    conn: &C,
    scope: TenantScope,
) -> Result<Option<String>, ServiceError> {
    Ok(IntakeOrderEntity::find()
        .filter(intake_order::Column::CompanyId.eq(scope.company_id))
        .filter(intake_order::Column::FinancialYearId.eq(scope.financial_year_id))
        .order_by_desc(intake_order::Column::Id)
        .one(conn)
        .await?
        .map(|o| o.order_number))
}

async fn generate_order_number<C: ConnectionTrait>(
    conn: &C,
    scope: TenantScope,
    party_id: i64,
) -> Result<String, ServiceError> {
    let last = latest_order_number(conn, scope).await?;
    let mut suffix = numbering::next_suffix(last.as_deref());

    for _ in 0..MAX_NUMBERING_RETRIES {
        let candidate = numbering::format_number(INTAKE_ORDER_PREFIX, suffix);
        if !order_number_exists(conn, scope, party_id, &candidate).await? {
            return Ok(candidate);
        }
        warn!(%candidate, "Order number collision, trying next");
        suffix = suffix.saturating_add(1);
    }

    Err(ServiceError::Conflict(
        "Could not generate a unique order number".into(),
    ))
}

fn to_response(order: intake_order::Model, lines: Vec<intake_order_line::Model>) -> IntakeOrderResponse {
    IntakeOrderResponse {
        id: order.id,
        order_number: order.order_number,
        party_id: order.party_id,
        order_date: order.order_date,
        notes: order.notes,
        status: order.status,
        lines: lines
            .into_iter()
            .map(|line| IntakeOrderLineResponse {
                id: line.id,
                item_id: line.item_id,
                quantity_ordered: line.quantity_ordered,
                quantity_delivered: line.quantity_delivered,
                rate: line.rate,
            })
            .collect(),
    }
}
