use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One item line of an intake order.
///
/// `quantity_delivered` is engine-maintained: it is always the sum of
/// `quantity` over the delivery lines referencing this line, re-derived
/// inside the same transaction as any delivery mutation.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "intake_order_lines")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub intake_order_id: i64,
    pub item_id: i64,
    pub quantity_ordered: Decimal,
    pub quantity_delivered: Decimal,
    pub rate: Option<Decimal>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::intake_order::Entity",
        from = "Column::IntakeOrderId",
        to = "super::intake_order::Column::Id"
    )]
    IntakeOrder,
    #[sea_orm(
        belongs_to = "super::item::Entity",
        from = "Column::ItemId",
        to = "super::item::Column::Id"
    )]
    Item,
    #[sea_orm(has_many = "super::delivery_line::Entity")]
    DeliveryLines,
}

impl Related<super::intake_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::IntakeOrder.def()
    }
}

impl Related<super::item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Item.def()
    }
}

impl Related<super::delivery_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DeliveryLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
