use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Link row for invoice lines that bill several delivery lines at once.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoice_line_refs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub invoice_line_id: i64,
    pub delivery_line_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::invoice_line::Entity",
        from = "Column::InvoiceLineId",
        to = "super::invoice_line::Column::Id"
    )]
    InvoiceLine,
    #[sea_orm(
        belongs_to = "super::delivery_line::Entity",
        from = "Column::DeliveryLineId",
        to = "super::delivery_line::Column::Id"
    )]
    DeliveryLine,
}

impl Related<super::invoice_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InvoiceLine.def()
    }
}

impl Related<super::delivery_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DeliveryLine.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
