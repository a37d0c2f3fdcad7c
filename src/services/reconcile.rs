//! Shared counter and status reconciliation helpers.
//!
//! `quantity_delivered` and order statuses are always re-derived from the
//! delivery lines inside the caller's transaction, never incremented in
//! memory, so concurrent deliveries against the same line cannot lose
//! updates beyond what the store's isolation level already permits.

use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use tracing::debug;

use crate::entities::{
    delivery_line,
    intake_order::{self, Entity as IntakeOrder, IntakeOrderStatus},
    intake_order_line::{self, Entity as IntakeOrderLine},
};
use crate::errors::ServiceError;

/// Status an order with these totals should carry.
pub(crate) fn status_for(total_ordered: Decimal, total_delivered: Decimal) -> IntakeOrderStatus {
    if total_delivered <= Decimal::ZERO {
        IntakeOrderStatus::Open
    } else if total_delivered >= total_ordered {
        IntakeOrderStatus::Completed
    } else {
        IntakeOrderStatus::Partial
    }
}

/// Re-derives one intake line's `quantity_delivered` from its delivery lines
/// and persists it. Returns the refreshed model.
pub(crate) async fn resync_line_delivered<C: ConnectionTrait>(
    conn: &C,
    line_id: i64,
) -> Result<intake_order_line::Model, ServiceError> {
    let line = IntakeOrderLine::find_by_id(line_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("Intake order line {} not found", line_id)))?;

    let delivered: Decimal = delivery_line::Entity::find()
        .filter(delivery_line::Column::IntakeOrderLineId.eq(line_id))
        .all(conn)
        .await?
        .iter()
        .map(|dl| dl.quantity)
        .sum();

    debug!(line_id, %delivered, "Re-derived delivered quantity");

    let mut active: intake_order_line::ActiveModel = line.into();
    active.quantity_delivered = Set(delivered);
    active.update(conn).await.map_err(ServiceError::DatabaseError)
}

/// Recomputes and persists an order's status from its lines' current sums.
pub(crate) async fn refresh_order_status<C: ConnectionTrait>(
    conn: &C,
    order_id: i64,
) -> Result<IntakeOrderStatus, ServiceError> {
    let order = IntakeOrder::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("Intake order {} not found", order_id)))?;

    let lines = IntakeOrderLine::find()
        .filter(intake_order_line::Column::IntakeOrderId.eq(order_id))
        .all(conn)
        .await?;

    let total_ordered: Decimal = lines.iter().map(|l| l.quantity_ordered).sum();
    let total_delivered: Decimal = lines.iter().map(|l| l.quantity_delivered).sum();
    let status = status_for(total_ordered, total_delivered);

    if order.status != status {
        let mut active: intake_order::ActiveModel = order.into();
        active.status = Set(status);
        active.update(conn).await?;
    }

    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn zero_delivered_is_open() {
        assert_eq!(status_for(dec!(100), Decimal::ZERO), IntakeOrderStatus::Open);
    }

    #[test]
    fn under_delivery_is_partial() {
        assert_eq!(status_for(dec!(100), dec!(20)), IntakeOrderStatus::Partial);
    }

    #[test]
    fn full_and_over_delivery_are_completed() {
        assert_eq!(status_for(dec!(100), dec!(100)), IntakeOrderStatus::Completed);
        assert_eq!(status_for(dec!(100), dec!(120)), IntakeOrderStatus::Completed);
    }
}
