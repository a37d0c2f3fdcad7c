use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Direction of a stock movement.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
pub enum LedgerDirection {
    #[sea_orm(string_value = "IN")]
    #[strum(serialize = "IN")]
    In,
    #[sea_orm(string_value = "OUT")]
    #[strum(serialize = "OUT")]
    Out,
}

/// Originating document type of a stock entry.
///
/// Each reference type carries its canonical direction: a DELIVERY is an OUT
/// movement because finished job-work goods leave the processor's custody
/// back to the party, not because of any generic inbound/outbound rule.
/// Resolve directions through [`ReferenceType::direction`] rather than
/// choosing IN/OUT at call sites.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum ReferenceType {
    #[sea_orm(string_value = "INTAKE_ORDER")]
    #[strum(serialize = "INTAKE_ORDER")]
    IntakeOrder,
    #[sea_orm(string_value = "DELIVERY")]
    #[strum(serialize = "DELIVERY")]
    Delivery,
    #[sea_orm(string_value = "INVOICE")]
    #[strum(serialize = "INVOICE")]
    Invoice,
    #[sea_orm(string_value = "INVOICE_REVERT")]
    #[strum(serialize = "INVOICE_REVERT")]
    InvoiceRevert,
    #[sea_orm(string_value = "OPENING")]
    #[strum(serialize = "OPENING")]
    Opening,
}

impl ReferenceType {
    /// Canonical movement direction for entries of this reference type.
    pub fn direction(&self) -> LedgerDirection {
        match self {
            ReferenceType::IntakeOrder => LedgerDirection::In,
            ReferenceType::Delivery => LedgerDirection::Out,
            ReferenceType::Invoice => LedgerDirection::Out,
            ReferenceType::InvoiceRevert => LedgerDirection::In,
            ReferenceType::Opening => LedgerDirection::In,
        }
    }
}

/// Append-only stock transaction ledger row.
///
/// Never updated; rows are only inserted, or bulk-deleted by a document
/// reversal or a full recompute. The signed IN−OUT sum per item is the
/// stock balance.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub company_id: i64,
    pub financial_year_id: i64,
    pub item_id: i64,
    pub quantity: Decimal,
    pub direction: LedgerDirection,
    pub reference_type: ReferenceType,
    /// Source document id; `None` only for OPENING entries.
    pub reference_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::item::Entity",
        from = "Column::ItemId",
        to = "super::item::Column::Id"
    )]
    Item,
}

impl Related<super::item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Item.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
