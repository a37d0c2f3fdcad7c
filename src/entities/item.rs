use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Item master. The engine reads `rate` as the last fallback when resolving
/// a billing rate for a delivery line.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub unit: Option<String>,
    pub rate: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::intake_order_line::Entity")]
    IntakeOrderLines,
    #[sea_orm(has_many = "super::stock_entry::Entity")]
    StockEntries,
}

impl Related<super::intake_order_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::IntakeOrderLines.def()
    }
}

impl Related<super::stock_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockEntries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
