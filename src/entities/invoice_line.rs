use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One invoice line.
///
/// `delivery_line_id` links the line to the delivery it bills; additional
/// delivery lines billed together live in `invoice_line_refs`. A line with
/// neither link is a direct sale and carries its own `item_id` so the stock
/// ledger entry can be written.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoice_lines")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub invoice_id: i64,
    pub delivery_line_id: Option<i64>,
    pub item_id: Option<i64>,
    pub ok_qty: Decimal,
    pub cr_qty: Decimal,
    pub mr_qty: Decimal,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::invoice::Entity",
        from = "Column::InvoiceId",
        to = "super::invoice::Column::Id"
    )]
    Invoice,
    #[sea_orm(has_many = "super::invoice_line_ref::Entity")]
    Refs,
}

impl Related<super::invoice::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Invoice.def()
    }
}

impl Related<super::invoice_line_ref::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Refs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
