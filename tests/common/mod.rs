#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};

use jobwork_engine::{
    db::{establish_connection_with_config, run_migrations, DbConfig, DbPool},
    entities::{item, party},
    services::{
        billing::BillingService,
        deliveries::{DeliveryLineInput, DeliveryService},
        intake_orders::{CreateIntakeOrderRequest, IntakeOrderLineInput, IntakeOrderService},
        invoices::{InvoiceLineInput, InvoiceService},
        stock_ledger::StockLedgerService,
    },
    TenantScope,
};

pub const SCOPE: TenantScope = TenantScope {
    company_id: 1,
    financial_year_id: 1,
};

pub struct Engine {
    pub db: Arc<DbPool>,
    pub orders: IntakeOrderService,
    pub deliveries: DeliveryService,
    pub billing: BillingService,
    pub invoices: InvoiceService,
    pub ledger: StockLedgerService,
}

/// Private in-memory database per test: one pooled connection, migrated.
pub async fn setup() -> Engine {
    let config = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };
    let db = establish_connection_with_config(&config)
        .await
        .expect("Failed to create test database");
    run_migrations(&db).await.expect("Failed to run migrations");
    let db = Arc::new(db);

    Engine {
        orders: IntakeOrderService::new(db.clone(), None),
        deliveries: DeliveryService::new(db.clone(), None),
        billing: BillingService::new(db.clone()),
        invoices: InvoiceService::new(db.clone(), None),
        ledger: StockLedgerService::new(db.clone(), None),
        db,
    }
}

pub async fn create_test_item(db: &DbPool, name: &str, rate: Decimal) -> item::Model {
    item::ActiveModel {
        company_id: Set(SCOPE.company_id),
        name: Set(name.to_string()),
        unit: Set(Some("PCS".to_string())),
        rate: Set(rate),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create item")
}

pub async fn create_test_party(db: &DbPool, name: &str) -> party::Model {
    party::ActiveModel {
        company_id: Set(SCOPE.company_id),
        name: Set(name.to_string()),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create party")
}

/// Order request with one line per (item_id, quantity_ordered, rate).
pub fn order_request(
    party_id: i64,
    lines: Vec<(i64, Decimal, Option<Decimal>)>,
) -> CreateIntakeOrderRequest {
    CreateIntakeOrderRequest {
        party_id,
        order_number: None,
        order_date: None,
        notes: None,
        lines: lines
            .into_iter()
            .map(|(item_id, quantity_ordered, rate)| IntakeOrderLineInput {
                item_id,
                quantity_ordered,
                rate,
            })
            .collect(),
    }
}

/// Delivery line with `quantity` derived from the buckets.
pub fn graded_line(
    intake_order_line_id: i64,
    ok: Decimal,
    cr: Decimal,
    mr: Decimal,
) -> DeliveryLineInput {
    DeliveryLineInput {
        intake_order_line_id,
        ok_qty: ok,
        cr_qty: cr,
        mr_qty: mr,
        quantity: ok + cr + mr,
        rate: None,
    }
}

pub fn graded_line_at(
    intake_order_line_id: i64,
    ok: Decimal,
    cr: Decimal,
    mr: Decimal,
    rate: Decimal,
) -> DeliveryLineInput {
    DeliveryLineInput {
        rate: Some(rate),
        ..graded_line(intake_order_line_id, ok, cr, mr)
    }
}

/// Invoice line billing one delivery line with explicit buckets.
pub fn billed_line(
    delivery_line_id: i64,
    ok: Decimal,
    cr: Decimal,
    mr: Decimal,
    rate: Decimal,
) -> InvoiceLineInput {
    InvoiceLineInput {
        delivery_line_id: Some(delivery_line_id),
        challan_item_ids: vec![],
        item_id: None,
        ok_qty: ok,
        cr_qty: cr,
        mr_qty: mr,
        quantity: ok + cr + mr,
        rate,
    }
}
