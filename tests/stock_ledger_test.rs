mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};

use common::{
    billed_line, create_test_item, create_test_party, graded_line_at, order_request, setup, Engine,
    SCOPE,
};
use jobwork_engine::entities::intake_order::IntakeOrderStatus;
use jobwork_engine::entities::intake_order_line;
use jobwork_engine::entities::stock_entry::{self, ReferenceType};
use jobwork_engine::errors::ServiceError;
use jobwork_engine::services::deliveries::CreateDeliveryRequest;
use jobwork_engine::services::invoices::{CreateInvoiceRequest, InvoiceLineInput};

/// Opening stock 10, an order of 100, a delivery of 40 and a direct sale of
/// 5: live balance 10 + 100 − 40 − 5 = 65.
async fn seed_ledger(engine: &Engine) -> (i64, i64) {
    let item = create_test_item(&engine.db, "Flange", dec!(6)).await;
    let party = create_test_party(&engine.db, "Northgate Industries").await;

    engine
        .ledger
        .record_opening_stock(SCOPE, item.id, dec!(10))
        .await
        .unwrap();

    let order = engine
        .orders
        .create_order(SCOPE, order_request(party.id, vec![(item.id, dec!(100), None)]))
        .await
        .unwrap();

    engine
        .deliveries
        .create_delivery(
            SCOPE,
            CreateDeliveryRequest {
                party_id: party.id,
                delivery_number: None,
                delivery_date: None,
                lines: vec![graded_line_at(order.lines[0].id, dec!(25), dec!(10), dec!(5), dec!(6))],
            },
        )
        .await
        .unwrap();

    engine
        .invoices
        .create_invoice(
            SCOPE,
            CreateInvoiceRequest {
                party_id: party.id,
                invoice_number: None,
                invoice_date: None,
                notes: None,
                lines: vec![InvoiceLineInput {
                    delivery_line_id: None,
                    challan_item_ids: vec![],
                    item_id: Some(item.id),
                    ok_qty: dec!(0),
                    cr_qty: dec!(0),
                    mr_qty: dec!(0),
                    quantity: dec!(5),
                    rate: dec!(6),
                }],
            },
        )
        .await
        .unwrap();

    (item.id, order.id)
}

fn entry_key(e: &stock_entry::Model) -> (i64, Decimal, String, String, Option<i64>, chrono::DateTime<Utc>) {
    (
        e.item_id,
        e.quantity,
        e.direction.to_string(),
        e.reference_type.to_string(),
        e.reference_id,
        e.created_at,
    )
}

async fn ledger_snapshot(engine: &Engine) -> Vec<(i64, Decimal, String, String, Option<i64>, chrono::DateTime<Utc>)> {
    let mut entries: Vec<_> = stock_entry::Entity::find()
        .all(&*engine.db)
        .await
        .unwrap()
        .iter()
        .map(entry_key)
        .collect();
    entries.sort();
    entries
}

#[tokio::test]
async fn live_balance_matches_post_recompute_balance() {
    let engine = setup().await;
    let (item_id, _) = seed_ledger(&engine).await;

    let live = engine.ledger.stock_balance(SCOPE, item_id, None).await.unwrap();
    assert_eq!(live, dec!(65));

    engine.ledger.recompute(SCOPE).await.unwrap();

    let rebuilt = engine.ledger.stock_balance(SCOPE, item_id, None).await.unwrap();
    assert_eq!(rebuilt, live);
}

#[tokio::test]
async fn recompute_is_idempotent() {
    let engine = setup().await;
    let (_, order_id) = seed_ledger(&engine).await;

    engine.ledger.recompute(SCOPE).await.unwrap();
    let first_entries = ledger_snapshot(&engine).await;
    let first_order = engine.orders.get_order(SCOPE, order_id).await.unwrap();

    let summary = engine.ledger.recompute(SCOPE).await.unwrap();
    let second_entries = ledger_snapshot(&engine).await;
    let second_order = engine.orders.get_order(SCOPE, order_id).await.unwrap();

    assert_eq!(first_entries, second_entries);
    assert_eq!(
        first_order.lines[0].quantity_delivered,
        second_order.lines[0].quantity_delivered
    );
    assert_eq!(first_order.status, second_order.status);
    assert_eq!(summary.lines_skipped, 0);
}

#[tokio::test]
async fn recompute_repairs_drifted_counters_and_ledger_rows() {
    let engine = setup().await;
    let (item_id, order_id) = seed_ledger(&engine).await;

    let healthy_balance = engine.ledger.stock_balance(SCOPE, item_id, None).await.unwrap();
    let healthy_order = engine.orders.get_order(SCOPE, order_id).await.unwrap();

    // Corrupt the delivered counter and plant a stray ledger row.
    let line = intake_order_line::Entity::find_by_id(healthy_order.lines[0].id)
        .one(&*engine.db)
        .await
        .unwrap()
        .unwrap();
    let mut active: intake_order_line::ActiveModel = line.into();
    active.quantity_delivered = Set(dec!(999));
    active.update(&*engine.db).await.unwrap();

    stock_entry::ActiveModel {
        company_id: Set(SCOPE.company_id),
        financial_year_id: Set(SCOPE.financial_year_id),
        item_id: Set(item_id),
        quantity: Set(dec!(77)),
        direction: Set(ReferenceType::Delivery.direction()),
        reference_type: Set(ReferenceType::Delivery),
        reference_id: Set(Some(12345)),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&*engine.db)
    .await
    .unwrap();

    assert_ne!(
        engine.ledger.stock_balance(SCOPE, item_id, None).await.unwrap(),
        healthy_balance
    );

    engine.ledger.recompute(SCOPE).await.unwrap();

    assert_eq!(
        engine.ledger.stock_balance(SCOPE, item_id, None).await.unwrap(),
        healthy_balance
    );
    let repaired = engine.orders.get_order(SCOPE, order_id).await.unwrap();
    assert_eq!(
        repaired.lines[0].quantity_delivered,
        healthy_order.lines[0].quantity_delivered
    );
    assert_eq!(repaired.status, IntakeOrderStatus::Partial);
}

#[tokio::test]
async fn recompute_preserves_opening_entries() {
    let engine = setup().await;
    let (item_id, _) = seed_ledger(&engine).await;

    engine.ledger.recompute(SCOPE).await.unwrap();

    let openings: Vec<_> = stock_entry::Entity::find()
        .all(&*engine.db)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.reference_type == ReferenceType::Opening)
        .collect();
    assert_eq!(openings.len(), 1);
    assert_eq!(openings[0].quantity, dec!(10));
    assert_eq!(openings[0].item_id, item_id);
}

#[tokio::test]
async fn balance_respects_the_as_of_cutoff() {
    let engine = setup().await;
    let (item_id, _) = seed_ledger(&engine).await;

    let before_everything = Utc::now() - Duration::days(1);
    assert_eq!(
        engine
            .ledger
            .stock_balance(SCOPE, item_id, Some(before_everything))
            .await
            .unwrap(),
        dec!(0)
    );

    let after_everything = Utc::now() + Duration::days(1);
    assert_eq!(
        engine
            .ledger
            .stock_balance(SCOPE, item_id, Some(after_everything))
            .await
            .unwrap(),
        dec!(65)
    );
}

#[tokio::test]
async fn opening_stock_must_be_positive() {
    let engine = setup().await;
    let item = create_test_item(&engine.db, "Flange", dec!(6)).await;

    let err = engine
        .ledger
        .record_opening_stock(SCOPE, item.id, dec!(0))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn stock_report_covers_active_items() {
    let engine = setup().await;
    let (item_id, _) = seed_ledger(&engine).await;
    let idle = create_test_item(&engine.db, "Spacer", dec!(1)).await;

    let report = engine.ledger.stock_report(SCOPE).await.unwrap();
    assert_eq!(report.len(), 2);

    let flange = report.iter().find(|r| r.item_id == item_id).unwrap();
    assert_eq!(flange.balance, dec!(65));
    let spacer = report.iter().find(|r| r.item_id == idle.id).unwrap();
    assert_eq!(spacer.balance, dec!(0));
}

#[tokio::test]
async fn billed_quantities_survive_recompute() {
    let engine = setup().await;
    let item = create_test_item(&engine.db, "Flange", dec!(6)).await;
    let party = create_test_party(&engine.db, "Northgate Industries").await;

    let order = engine
        .orders
        .create_order(SCOPE, order_request(party.id, vec![(item.id, dec!(100), None)]))
        .await
        .unwrap();
    let dispatched = engine
        .deliveries
        .create_delivery(
            SCOPE,
            CreateDeliveryRequest {
                party_id: party.id,
                delivery_number: None,
                delivery_date: None,
                lines: vec![graded_line_at(order.lines[0].id, dec!(40), dec!(0), dec!(0), dec!(6))],
            },
        )
        .await
        .unwrap();
    engine
        .invoices
        .create_invoice(
            SCOPE,
            CreateInvoiceRequest {
                party_id: party.id,
                invoice_number: None,
                invoice_date: None,
                notes: None,
                lines: vec![billed_line(dispatched.lines[0].id, dec!(15), dec!(0), dec!(0), dec!(6))],
            },
        )
        .await
        .unwrap();

    engine.ledger.recompute(SCOPE).await.unwrap();

    // The rebuild regenerates the ledger and counters without disturbing
    // the billing reconciliation.
    let pending = engine.billing.pending_to_bill(SCOPE, party.id, None).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].pending.ok, dec!(25));
}
