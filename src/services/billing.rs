use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    db::DbPool,
    entities::{
        delivery::{self, Entity as DeliveryEntity},
        delivery_line::{self, Entity as DeliveryLineEntity},
        intake_order_line::{self, Entity as IntakeOrderLineEntity},
        invoice::{self, Entity as InvoiceEntity, InvoiceStatus},
        invoice_line::{self, Entity as InvoiceLineEntity},
        invoice_line_ref::{self, Entity as InvoiceLineRefEntity},
        item::{self, Entity as ItemEntity},
    },
    errors::ServiceError,
    TenantScope,
};

/// Quantities per quality bucket: accepted / credited-as-reject / rework.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketQuantities {
    pub ok: Decimal,
    pub cr: Decimal,
    pub mr: Decimal,
}

impl BucketQuantities {
    pub fn new(ok: Decimal, cr: Decimal, mr: Decimal) -> Self {
        Self { ok, cr, mr }
    }

    pub fn total(&self) -> Decimal {
        self.ok + self.cr + self.mr
    }

    pub fn add(&mut self, other: &BucketQuantities) {
        self.ok += other.ok;
        self.cr += other.cr;
        self.mr += other.mr;
    }

    pub fn is_zero(&self) -> bool {
        self.ok.is_zero() && self.cr.is_zero() && self.mr.is_zero()
    }
}

/// Delivered-but-not-yet-billed quantities for one (delivery, item, rate)
/// pool. Split rows recorded for the same delivery/item/price are merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingPool {
    pub delivery_id: i64,
    pub delivery_number: String,
    pub item_id: i64,
    pub item_name: String,
    /// Display rate with the fallback chain applied.
    pub rate: Decimal,
    /// Delivery line ids billed together when this pool is invoiced.
    pub delivery_line_ids: Vec<i64>,
    pub pending: BucketQuantities,
    pub pending_total: Decimal,
}

/// Remaining quantities after subtracting billed from delivered, with the
/// cross-bucket rule applied: CR billed beyond what was ever delivered (a
/// delivery update can shrink the CR bucket after it was billed) is absorbed
/// against the OK pool, then every bucket is floored at zero so no negative
/// quantity ever reaches an invoice screen.
pub fn settle_remaining(origin: BucketQuantities, billed: BucketQuantities) -> BucketQuantities {
    let mut ok = origin.ok - billed.ok;
    let mut cr = origin.cr - billed.cr;
    let mr = origin.mr - billed.mr;

    if cr < Decimal::ZERO {
        ok += cr;
        cr = Decimal::ZERO;
    }

    BucketQuantities {
        ok: ok.max(Decimal::ZERO),
        cr: cr.max(Decimal::ZERO),
        mr: mr.max(Decimal::ZERO),
    }
}

#[derive(Default)]
struct PoolAccumulator {
    origin: BucketQuantities,
    billed: BucketQuantities,
    line_ids: Vec<i64>,
    intake_line_id: i64,
}

/// Read-side reconciliation: what remains to be billed for a party.
#[derive(Clone)]
pub struct BillingService {
    db_pool: Arc<DbPool>,
}

impl BillingService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Computes the pending-to-bill pools for a party.
    ///
    /// `exclude_invoice` omits one invoice's lines from the billed sums so
    /// an invoice-entry screen can re-offer quantities while that invoice is
    /// being edited.
    #[instrument(skip(self), fields(party_id = party_id))]
    pub async fn pending_to_bill(
        &self,
        scope: TenantScope,
        party_id: i64,
        exclude_invoice: Option<i64>,
    ) -> Result<Vec<PendingPool>, ServiceError> {
        let db = &*self.db_pool;

        let deliveries: HashMap<i64, delivery::Model> = DeliveryEntity::find()
            .filter(delivery::Column::CompanyId.eq(scope.company_id))
            .filter(delivery::Column::FinancialYearId.eq(scope.financial_year_id))
            .filter(delivery::Column::PartyId.eq(party_id))
            .all(db)
            .await?
            .into_iter()
            .map(|d| (d.id, d))
            .collect();

        let delivery_ids: Vec<i64> = deliveries.keys().copied().collect();
        let lines = DeliveryLineEntity::find()
            .filter(delivery_line::Column::DeliveryId.is_in(delivery_ids))
            .order_by_asc(delivery_line::Column::Id)
            .all(db)
            .await?;

        let intake_line_ids: Vec<i64> = lines.iter().map(|l| l.intake_order_line_id).collect();
        let intake_lines: HashMap<i64, intake_order_line::Model> = IntakeOrderLineEntity::find()
            .filter(intake_order_line::Column::Id.is_in(intake_line_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|l| (l.id, l))
            .collect();

        let item_ids: Vec<i64> = intake_lines.values().map(|l| l.item_id).collect();
        let items: HashMap<i64, item::Model> = ItemEntity::find()
            .filter(item::Column::Id.is_in(item_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|i| (i.id, i))
            .collect();

        // Pool split rows by (delivery, resolved item, rate). BTreeMap keeps
        // the output order stable.
        let mut pools: BTreeMap<(i64, i64, Decimal), PoolAccumulator> = BTreeMap::new();
        let mut line_to_pool: HashMap<i64, (i64, i64, Decimal)> = HashMap::new();

        for line in &lines {
            let Some(intake_line) = intake_lines.get(&line.intake_order_line_id) else {
                continue;
            };
            let key = (line.delivery_id, intake_line.item_id, line.rate);
            let pool = pools.entry(key).or_default();
            if pool.line_ids.is_empty() {
                pool.intake_line_id = intake_line.id;
            }
            pool.origin.add(&BucketQuantities::new(line.ok_qty, line.cr_qty, line.mr_qty));
            pool.line_ids.push(line.id);
            line_to_pool.insert(line.id, key);
        }

        // Billed sums from non-cancelled invoice lines, excluding the
        // invoice currently being edited when one is given.
        let mut invoice_query = InvoiceEntity::find()
            .filter(invoice::Column::CompanyId.eq(scope.company_id))
            .filter(invoice::Column::FinancialYearId.eq(scope.financial_year_id))
            .filter(invoice::Column::PartyId.eq(party_id))
            .filter(invoice::Column::Status.ne(InvoiceStatus::Cancelled));
        if let Some(excluded) = exclude_invoice {
            invoice_query = invoice_query.filter(invoice::Column::Id.ne(excluded));
        }
        let invoice_ids: Vec<i64> = invoice_query
            .all(db)
            .await?
            .iter()
            .map(|i| i.id)
            .collect();

        let billed_lines = InvoiceLineEntity::find()
            .filter(invoice_line::Column::InvoiceId.is_in(invoice_ids))
            .all(db)
            .await?;

        let billed_line_ids: Vec<i64> = billed_lines.iter().map(|l| l.id).collect();
        let mut refs_by_line: HashMap<i64, Vec<i64>> = HashMap::new();
        for r in InvoiceLineRefEntity::find()
            .filter(invoice_line_ref::Column::InvoiceLineId.is_in(billed_line_ids))
            .order_by_asc(invoice_line_ref::Column::Id)
            .all(db)
            .await?
        {
            refs_by_line.entry(r.invoice_line_id).or_default().push(r.delivery_line_id);
        }

        for billed in &billed_lines {
            let mut referenced: Vec<i64> = Vec::new();
            if let Some(id) = billed.delivery_line_id {
                referenced.push(id);
            }
            if let Some(ids) = refs_by_line.get(&billed.id) {
                referenced.extend(ids.iter().copied());
            }

            // The first resolvable reference decides the pool the billed
            // quantities count against.
            let Some(key) = referenced.iter().find_map(|id| line_to_pool.get(id)) else {
                continue;
            };
            if let Some(pool) = pools.get_mut(key) {
                pool.billed
                    .add(&BucketQuantities::new(billed.ok_qty, billed.cr_qty, billed.mr_qty));
            }
        }

        let mut result = Vec::new();
        for ((delivery_id, item_id, rate), pool) in pools {
            let pending = settle_remaining(pool.origin, pool.billed);
            if pending.total() <= Decimal::ZERO {
                continue;
            }

            let intake_rate = intake_lines.get(&pool.intake_line_id).and_then(|l| l.rate);
            let item = items.get(&item_id);
            let effective_rate = resolve_rate(rate, intake_rate, item.map(|i| i.rate));

            result.push(PendingPool {
                delivery_id,
                delivery_number: deliveries
                    .get(&delivery_id)
                    .map(|d| d.delivery_number.clone())
                    .unwrap_or_default(),
                item_id,
                item_name: item
                    .map(|i| i.name.clone())
                    .unwrap_or_else(|| "Unknown".to_string()),
                rate: effective_rate,
                delivery_line_ids: pool.line_ids,
                pending_total: pending.total(),
                pending,
            });
        }

        Ok(result)
    }
}

/// Rate fallback chain: the delivery line's own rate, else the intake order
/// line's, else the item master's, else zero.
fn resolve_rate(
    line_rate: Decimal,
    intake_rate: Option<Decimal>,
    item_rate: Option<Decimal>,
) -> Decimal {
    if line_rate > Decimal::ZERO {
        line_rate
    } else if let Some(rate) = intake_rate.filter(|r| *r > Decimal::ZERO) {
        rate
    } else {
        item_rate.unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn remaining_is_origin_minus_billed() {
        let pending = settle_remaining(
            BucketQuantities::new(dec!(50), dec!(30), dec!(10)),
            BucketQuantities::new(dec!(20), dec!(10), dec!(0)),
        );
        assert_eq!(pending, BucketQuantities::new(dec!(30), dec!(20), dec!(10)));
    }

    #[test]
    fn cr_overbilling_is_absorbed_by_ok() {
        // Delivered ok=50 cr=30, billed ok=50 cr=35: the 5 excess CR eats
        // into OK, leaving nothing pending in either bucket.
        let pending = settle_remaining(
            BucketQuantities::new(dec!(50), dec!(30), dec!(0)),
            BucketQuantities::new(dec!(50), dec!(35), dec!(0)),
        );
        assert_eq!(pending, BucketQuantities::new(dec!(0), dec!(0), dec!(0)));
    }

    #[test]
    fn cr_absorption_leaves_partial_ok() {
        let pending = settle_remaining(
            BucketQuantities::new(dec!(50), dec!(30), dec!(0)),
            BucketQuantities::new(dec!(10), dec!(35), dec!(0)),
        );
        // ok: 50-10=40 minus the 5 CR excess -> 35
        assert_eq!(pending, BucketQuantities::new(dec!(35), dec!(0), dec!(0)));
    }

    #[test]
    fn buckets_never_go_negative() {
        let pending = settle_remaining(
            BucketQuantities::new(dec!(5), dec!(0), dec!(2)),
            BucketQuantities::new(dec!(9), dec!(0), dec!(4)),
        );
        assert_eq!(pending, BucketQuantities::new(dec!(0), dec!(0), dec!(0)));
    }

    #[test]
    fn rate_fallback_chain() {
        assert_eq!(resolve_rate(dec!(12), Some(dec!(9)), Some(dec!(7))), dec!(12));
        assert_eq!(resolve_rate(dec!(0), Some(dec!(9)), Some(dec!(7))), dec!(9));
        assert_eq!(resolve_rate(dec!(0), None, Some(dec!(7))), dec!(7));
        assert_eq!(resolve_rate(dec!(0), Some(dec!(0)), None), dec!(0));
    }
}
