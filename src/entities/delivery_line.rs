use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One line of a delivery, split into quality buckets.
///
/// `quantity` must equal `ok_qty + cr_qty + mr_qty`. Several lines may
/// reference the same intake order line (split rows); billing treats rows
/// with the same (delivery, item, rate) as one pool.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "delivery_lines")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub delivery_id: i64,
    pub intake_order_line_id: i64,
    /// Accepted quantity
    pub ok_qty: Decimal,
    /// Credited-as-reject quantity
    pub cr_qty: Decimal,
    /// Rework-needed quantity
    pub mr_qty: Decimal,
    pub quantity: Decimal,
    pub rate: Decimal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::delivery::Entity",
        from = "Column::DeliveryId",
        to = "super::delivery::Column::Id"
    )]
    Delivery,
    #[sea_orm(
        belongs_to = "super::intake_order_line::Entity",
        from = "Column::IntakeOrderLineId",
        to = "super::intake_order_line::Column::Id"
    )]
    IntakeOrderLine,
}

impl Related<super::delivery::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Delivery.def()
    }
}

impl Related<super::intake_order_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::IntakeOrderLine.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
