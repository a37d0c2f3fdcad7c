mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};

use common::{
    billed_line, create_test_item, create_test_party, graded_line_at, order_request, setup, SCOPE,
};
use jobwork_engine::entities::delivery::DeliveryStatus;
use jobwork_engine::entities::invoice::InvoiceStatus;
use jobwork_engine::entities::payment_allocation;
use jobwork_engine::entities::stock_entry::{self, ReferenceType};
use jobwork_engine::errors::ServiceError;
use jobwork_engine::services::deliveries::CreateDeliveryRequest;
use jobwork_engine::services::invoices::{
    CreateInvoiceRequest, InvoiceLineInput, UpdateInvoiceRequest,
};

fn invoice(party_id: i64, lines: Vec<InvoiceLineInput>) -> CreateInvoiceRequest {
    CreateInvoiceRequest {
        party_id,
        invoice_number: None,
        invoice_date: None,
        notes: None,
        lines,
    }
}

fn direct_line(item_id: i64, quantity: rust_decimal::Decimal, rate: rust_decimal::Decimal) -> InvoiceLineInput {
    InvoiceLineInput {
        delivery_line_id: None,
        challan_item_ids: vec![],
        item_id: Some(item_id),
        ok_qty: dec!(0),
        cr_qty: dec!(0),
        mr_qty: dec!(0),
        quantity,
        rate,
    }
}

/// Creates an order of 100 and a delivery graded 30/10/10 at rate 4,
/// returning (party_id, order_id, delivery_id, delivery_line_id).
async fn seed_billable(engine: &common::Engine) -> (i64, i64, i64, i64) {
    let item = create_test_item(&engine.db, "Housing", dec!(4)).await;
    let party = create_test_party(&engine.db, "Vector Components").await;

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
                lines: vec![graded_line_at(order.lines[0].id, dec!(30), dec!(10), dec!(10), dec!(4))],
            },
        )
        .await
        .unwrap();

    (party.id, order.id, dispatched.id, dispatched.lines[0].id)
}

#[tokio::test]
async fn zero_bucket_lines_backfill_from_the_referenced_delivery() {
    let engine = setup().await;
    let (party_id, _, _, delivery_line_id) = seed_billable(&engine).await;

    // Legacy payload: only a total and a link, no grading.
    let created = engine
        .invoices
        .create_invoice(
            SCOPE,
            invoice(
                party_id,
                vec![InvoiceLineInput {
                    delivery_line_id: Some(delivery_line_id),
                    challan_item_ids: vec![],
                    item_id: None,
                    ok_qty: dec!(0),
                    cr_qty: dec!(0),
                    mr_qty: dec!(0),
                    quantity: dec!(0),
                    rate: dec!(4),
                }],
            ),
        )
        .await
        .unwrap();

    assert_eq!(created.invoice_number, "INV-001");
    let line = &created.lines[0];
    assert_eq!(line.ok_qty, dec!(30));
    assert_eq!(line.cr_qty, dec!(10));
    assert_eq!(line.mr_qty, dec!(10));
    assert_eq!(line.quantity, dec!(50));
    assert_eq!(line.amount, dec!(200));
    assert_eq!(created.subtotal, dec!(200));
}

#[tokio::test]
async fn fully_billed_delivery_flips_to_delivered_and_back() {
    let engine = setup().await;
    let (party_id, _, delivery_id, delivery_line_id) = seed_billable(&engine).await;

    let billed = engine
        .invoices
        .create_invoice(
            SCOPE,
            invoice(
                party_id,
                vec![billed_line(delivery_line_id, dec!(30), dec!(10), dec!(10), dec!(4))],
            ),
        )
        .await
        .unwrap();

    let status = engine
        .deliveries
        .get_delivery(SCOPE, delivery_id)
        .await
        .unwrap()
        .status;
    assert_eq!(status, DeliveryStatus::Delivered);

    engine.invoices.delete_invoice(SCOPE, billed.id).await.unwrap();

    let status = engine
        .deliveries
        .get_delivery(SCOPE, delivery_id)
        .await
        .unwrap()
        .status;
    assert_eq!(status, DeliveryStatus::Sent);
}

#[tokio::test]
async fn direct_sales_move_stock_and_deletion_reverses_them() {
    let engine = setup().await;
    let item = create_test_item(&engine.db, "Housing", dec!(4)).await;
    let party = create_test_party(&engine.db, "Vector Components").await;

    engine
        .ledger
        .record_opening_stock(SCOPE, item.id, dec!(20))
        .await
        .unwrap();

    let created = engine
        .invoices
        .create_invoice(SCOPE, invoice(party.id, vec![direct_line(item.id, dec!(5), dec!(4))]))
        .await
        .unwrap();

    assert_eq!(
        engine.ledger.stock_balance(SCOPE, item.id, None).await.unwrap(),
        dec!(15)
    );

    engine.invoices.delete_invoice(SCOPE, created.id).await.unwrap();
    assert_eq!(
        engine.ledger.stock_balance(SCOPE, item.id, None).await.unwrap(),
        dec!(20)
    );
}

#[tokio::test]
async fn direct_sales_require_an_item() {
    let engine = setup().await;
    let party = create_test_party(&engine.db, "Vector Components").await;

    let err = engine
        .invoices
        .create_invoice(
            SCOPE,
            invoice(
                party.id,
                vec![InvoiceLineInput {
                    delivery_line_id: None,
                    challan_item_ids: vec![],
                    item_id: None,
                    ok_qty: dec!(0),
                    cr_qty: dec!(0),
                    mr_qty: dec!(0),
                    quantity: dec!(5),
                    rate: dec!(4),
                }],
            ),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn payment_allocations_block_deletion() {
    let engine = setup().await;
    let (party_id, _, _, delivery_line_id) = seed_billable(&engine).await;

    let billed = engine
        .invoices
        .create_invoice(
            SCOPE,
            invoice(
                party_id,
                vec![billed_line(delivery_line_id, dec!(30), dec!(10), dec!(10), dec!(4))],
            ),
        )
        .await
        .unwrap();

    payment_allocation::ActiveModel {
        payment_id: Set(1),
        invoice_id: Set(billed.id),
        amount: Set(dec!(100)),
        ..Default::default()
    }
    .insert(&*engine.db)
    .await
    .unwrap();

    let err = engine.invoices.delete_invoice(SCOPE, billed.id).await.unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));

    // Still present and still billed.
    let reloaded = engine.invoices.get_invoice(SCOPE, billed.id).await.unwrap();
    assert_eq!(reloaded.status, InvoiceStatus::Final);
}

#[tokio::test]
async fn cancelling_keeps_the_audit_trail_and_reopens_billing() {
    let engine = setup().await;
    let item = create_test_item(&engine.db, "Housing", dec!(4)).await;
    let party = create_test_party(&engine.db, "Vector Components").await;

    engine
        .ledger
        .record_opening_stock(SCOPE, item.id, dec!(20))
        .await
        .unwrap();

    let created = engine
        .invoices
        .create_invoice(SCOPE, invoice(party.id, vec![direct_line(item.id, dec!(5), dec!(4))]))
        .await
        .unwrap();

    let cancelled = engine.invoices.cancel_invoice(SCOPE, created.id).await.unwrap();
    assert_eq!(cancelled.status, InvoiceStatus::Cancelled);

    // The OUT entry stays, neutralized by a compensating revert entry.
    assert_eq!(
        engine.ledger.stock_balance(SCOPE, item.id, None).await.unwrap(),
        dec!(20)
    );
    let reverts = stock_entry::Entity::find()
        .filter(stock_entry::Column::ReferenceType.eq(ReferenceType::InvoiceRevert))
        .filter(stock_entry::Column::ReferenceId.eq(created.id))
        .all(&*engine.db)
        .await
        .unwrap();
    assert_eq!(reverts.len(), 1);

    let err = engine.invoices.cancel_invoice(SCOPE, created.id).await.unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn cancelling_reverts_delivery_status_and_pending() {
    let engine = setup().await;
    let (party_id, _, delivery_id, delivery_line_id) = seed_billable(&engine).await;

    let billed = engine
        .invoices
        .create_invoice(
            SCOPE,
            invoice(
                party_id,
                vec![billed_line(delivery_line_id, dec!(30), dec!(10), dec!(10), dec!(4))],
            ),
        )
        .await
        .unwrap();
    assert!(engine
        .billing
        .pending_to_bill(SCOPE, party_id, None)
        .await
        .unwrap()
        .is_empty());

    engine.invoices.cancel_invoice(SCOPE, billed.id).await.unwrap();

    let status = engine
        .deliveries
        .get_delivery(SCOPE, delivery_id)
        .await
        .unwrap()
        .status;
    assert_eq!(status, DeliveryStatus::Sent);

    let pending = engine.billing.pending_to_bill(SCOPE, party_id, None).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].pending_total, dec!(50));
}

#[tokio::test]
async fn update_replaces_the_line_set() {
    let engine = setup().await;
    let (party_id, _, _, delivery_line_id) = seed_billable(&engine).await;

    let billed = engine
        .invoices
        .create_invoice(
            SCOPE,
            invoice(
                party_id,
                vec![billed_line(delivery_line_id, dec!(10), dec!(0), dec!(0), dec!(4))],
            ),
        )
        .await
        .unwrap();
    assert_eq!(billed.subtotal, dec!(40));

    let updated = engine
        .invoices
        .update_invoice(
            SCOPE,
            billed.id,
            UpdateInvoiceRequest {
                party_id: None,
                invoice_date: None,
                notes: None,
                lines: Some(vec![billed_line(delivery_line_id, dec!(25), dec!(5), dec!(0), dec!(4))]),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.subtotal, dec!(120));
    assert_eq!(updated.lines.len(), 1);

    let pending = engine.billing.pending_to_bill(SCOPE, party_id, None).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].pending.ok, dec!(5));
    assert_eq!(pending[0].pending.cr, dec!(5));
    assert_eq!(pending[0].pending.mr, dec!(10));
}
