use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Display status of a delivery.
///
/// Delivery mutations snapshot the aggregate status of the intake orders the
/// delivery draws from (`Open`/`Partial`/`Completed`); invoicing overwrites
/// the snapshot with `Delivered` once every line is billed and reverts it to
/// `Sent` when that stops being true. Both transitions happen inside the
/// transaction that changed the underlying counts, so the column never
/// drifts from the documents.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[strum(serialize_all = "lowercase")]
pub enum DeliveryStatus {
    #[sea_orm(string_value = "open")]
    Open,
    #[sea_orm(string_value = "partial")]
    Partial,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "delivered")]
    Delivered,
}

/// Delivery ("delivery challan"): processed goods returned to the party,
/// graded into quality buckets on each line.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "deliveries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub company_id: i64,
    pub financial_year_id: i64,
    pub party_id: i64,
    pub delivery_number: String,
    pub delivery_date: Date,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::party::Entity",
        from = "Column::PartyId",
        to = "super::party::Column::Id"
    )]
    Party,
    #[sea_orm(has_many = "super::delivery_line::Entity")]
    Lines,
}

impl Related<super::party::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Party.def()
    }
}

impl Related<super::delivery_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
