mod common;

use rust_decimal_macros::dec;

use common::{
    billed_line, create_test_item, create_test_party, graded_line, graded_line_at, order_request,
    setup, SCOPE,
};
use jobwork_engine::services::deliveries::CreateDeliveryRequest;
use jobwork_engine::services::invoices::{CreateInvoiceRequest, InvoiceLineInput};

fn invoice(party_id: i64, lines: Vec<InvoiceLineInput>) -> CreateInvoiceRequest {
    CreateInvoiceRequest {
        party_id,
        invoice_number: None,
        invoice_date: None,
        notes: None,
        lines,
    }
}

#[tokio::test]
async fn cr_overbilling_is_absorbed_against_ok() {
    let engine = setup().await;
    let item = create_test_item(&engine.db, "Casting", dec!(3)).await;
    let party = create_test_party(&engine.db, "Meridian Alloys").await;

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
                lines: vec![graded_line_at(order.lines[0].id, dec!(50), dec!(30), dec!(0), dec!(3))],
            },
        )
        .await
        .unwrap();

    // Bill ok=50 cr=35: five more CR than was ever delivered. The excess is
    // deducted from OK and nothing remains pending in either bucket.
    engine
        .invoices
        .create_invoice(
            SCOPE,
            invoice(
                party.id,
                vec![billed_line(dispatched.lines[0].id, dec!(50), dec!(35), dec!(0), dec!(3))],
            ),
        )
        .await
        .unwrap();

    let pending = engine.billing.pending_to_bill(SCOPE, party.id, None).await.unwrap();
    assert!(pending.is_empty(), "expected no pending pools, got {:?}", pending);
}

#[tokio::test]
async fn split_rows_merge_into_one_pool() {
    let engine = setup().await;
    let item = create_test_item(&engine.db, "Casting", dec!(3)).await;
    let party = create_test_party(&engine.db, "Meridian Alloys").await;

    let order = engine
        .orders
        .create_order(SCOPE, order_request(party.id, vec![(item.id, dec!(100), None)]))
        .await
        .unwrap();
    let line_id = order.lines[0].id;

    // Two rows for the same delivery, item and rate form a single pool.
    engine
        .deliveries
        .create_delivery(
            SCOPE,
            CreateDeliveryRequest {
                party_id: party.id,
                delivery_number: None,
                delivery_date: None,
                lines: vec![
                    graded_line_at(line_id, dec!(10), dec!(2), dec!(0), dec!(3)),
                    graded_line_at(line_id, dec!(20), dec!(3), dec!(0), dec!(3)),
                ],
            },
        )
        .await
        .unwrap();

    let pending = engine.billing.pending_to_bill(SCOPE, party.id, None).await.unwrap();
    assert_eq!(pending.len(), 1);
    let pool = &pending[0];
    assert_eq!(pool.delivery_line_ids.len(), 2);
    assert_eq!(pool.pending.ok, dec!(30));
    assert_eq!(pool.pending.cr, dec!(5));
    assert_eq!(pool.pending_total, dec!(35));
    assert_eq!(pool.item_id, item.id);
}

#[tokio::test]
async fn partial_billing_reduces_pending_per_bucket() {
    let engine = setup().await;
    let item = create_test_item(&engine.db, "Casting", dec!(3)).await;
    let party = create_test_party(&engine.db, "Meridian Alloys").await;

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
                lines: vec![graded_line_at(order.lines[0].id, dec!(30), dec!(10), dec!(5), dec!(3))],
            },
        )
        .await
        .unwrap();

    engine
        .invoices
        .create_invoice(
            SCOPE,
            invoice(
                party.id,
                vec![billed_line(dispatched.lines[0].id, dec!(10), dec!(0), dec!(0), dec!(3))],
            ),
        )
        .await
        .unwrap();

    let pending = engine.billing.pending_to_bill(SCOPE, party.id, None).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].pending.ok, dec!(20));
    assert_eq!(pending[0].pending.cr, dec!(10));
    assert_eq!(pending[0].pending.mr, dec!(5));
}

#[tokio::test]
async fn excluding_the_edited_invoice_reoffers_its_quantities() {
    let engine = setup().await;
    let item = create_test_item(&engine.db, "Casting", dec!(3)).await;
    let party = create_test_party(&engine.db, "Meridian Alloys").await;

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
                lines: vec![graded_line_at(order.lines[0].id, dec!(40), dec!(0), dec!(0), dec!(3))],
            },
        )
        .await
        .unwrap();

    let billed = engine
        .invoices
        .create_invoice(
            SCOPE,
            invoice(
                party.id,
                vec![billed_line(dispatched.lines[0].id, dec!(40), dec!(0), dec!(0), dec!(3))],
            ),
        )
        .await
        .unwrap();

    assert!(engine
        .billing
        .pending_to_bill(SCOPE, party.id, None)
        .await
        .unwrap()
        .is_empty());

    // Editing that invoice: its own lines must not count as billed.
    let pending = engine
        .billing
        .pending_to_bill(SCOPE, party.id, Some(billed.id))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].pending.ok, dec!(40));
}

#[tokio::test]
async fn display_rate_falls_back_to_intake_then_item_master() {
    let engine = setup().await;
    let item = create_test_item(&engine.db, "Casting", dec!(7)).await;
    let party = create_test_party(&engine.db, "Meridian Alloys").await;

    // No rate on the delivery line nor the intake line: the item master
    // rate wins.
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
                lines: vec![graded_line(order.lines[0].id, dec!(10), dec!(0), dec!(0))],
            },
        )
        .await
        .unwrap();

    let pending = engine.billing.pending_to_bill(SCOPE, party.id, None).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].rate, dec!(7));

    // An intake line rate takes precedence over the item master.
    let order_b = engine
        .orders
        .create_order(SCOPE, order_request(party.id, vec![(item.id, dec!(100), Some(dec!(9)))]))
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
                lines: vec![graded_line(order_b.lines[0].id, dec!(10), dec!(0), dec!(0))],
            },
        )
        .await
        .unwrap();

    let pending = engine.billing.pending_to_bill(SCOPE, party.id, None).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().any(|p| p.rate == dec!(9)));
}

#[tokio::test]
async fn multi_reference_lines_bill_the_whole_pool() {
    let engine = setup().await;
    let item = create_test_item(&engine.db, "Casting", dec!(3)).await;
    let party = create_test_party(&engine.db, "Meridian Alloys").await;

    let order = engine
        .orders
        .create_order(SCOPE, order_request(party.id, vec![(item.id, dec!(100), None)]))
        .await
        .unwrap();
    let line_id = order.lines[0].id;

    let dispatched = engine
        .deliveries
        .create_delivery(
            SCOPE,
            CreateDeliveryRequest {
                party_id: party.id,
                delivery_number: None,
                delivery_date: None,
                lines: vec![
                    graded_line_at(line_id, dec!(10), dec!(0), dec!(0), dec!(3)),
                    graded_line_at(line_id, dec!(20), dec!(0), dec!(0), dec!(3)),
                ],
            },
        )
        .await
        .unwrap();

    // One invoice line billing both split rows via the multi-id set.
    engine
        .invoices
        .create_invoice(
            SCOPE,
            invoice(
                party.id,
                vec![InvoiceLineInput {
                    delivery_line_id: Some(dispatched.lines[0].id),
                    challan_item_ids: vec![dispatched.lines[1].id],
                    item_id: None,
                    ok_qty: dec!(30),
                    cr_qty: dec!(0),
                    mr_qty: dec!(0),
                    quantity: dec!(30),
                    rate: dec!(3),
                }],
            ),
        )
        .await
        .unwrap();

    let pending = engine.billing.pending_to_bill(SCOPE, party.id, None).await.unwrap();
    assert!(pending.is_empty());
}
