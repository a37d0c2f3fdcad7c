use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Fulfillment status of an intake order, derived from its lines:
/// `Open` while nothing has been delivered, `Completed` once total delivered
/// reaches total ordered, `Partial` in between. Recomputed after every
/// delivery mutation and by the ledger recompute.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[strum(serialize_all = "lowercase")]
pub enum IntakeOrderStatus {
    #[sea_orm(string_value = "open")]
    Open,
    #[sea_orm(string_value = "partial")]
    Partial,
    #[sea_orm(string_value = "completed")]
    Completed,
}

/// Intake order ("party challan"): what a party sent in for processing.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "intake_orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub company_id: i64,
    pub financial_year_id: i64,
    pub party_id: i64,
    /// Unique per (company, financial year, party)
    pub order_number: String,
    pub order_date: Date,
    pub notes: Option<String>,
    pub status: IntakeOrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::party::Entity",
        from = "Column::PartyId",
        to = "super::party::Column::Id"
    )]
    Party,
    #[sea_orm(has_many = "super::intake_order_line::Entity")]
    Lines,
}

impl Related<super::party::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Party.def()
    }
}

impl Related<super::intake_order_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
