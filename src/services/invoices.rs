use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{
        delivery::{self, DeliveryStatus, Entity as DeliveryEntity},
        delivery_line::{self, Entity as DeliveryLineEntity},
        invoice::{self, Entity as InvoiceEntity, InvoiceStatus},
        invoice_line::{self, Entity as InvoiceLineEntity},
        invoice_line_ref::{self, Entity as InvoiceLineRefEntity},
        payment_allocation,
        stock_entry::{self, ReferenceType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::billing::BucketQuantities,
    services::numbering::{self, INVOICE_PREFIX, MAX_NUMBERING_RETRIES},
    TenantScope,
};

/// One requested invoice line.
///
/// `delivery_line_id` plus `challan_item_ids` carry the delivery lines being
/// billed; both empty means a direct sale, which then requires `item_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLineInput {
    pub delivery_line_id: Option<i64>,
    #[serde(default)]
    pub challan_item_ids: Vec<i64>,
    pub item_id: Option<i64>,
    #[serde(default)]
    pub ok_qty: Decimal,
    #[serde(default)]
    pub cr_qty: Decimal,
    #[serde(default)]
    pub mr_qty: Decimal,
    pub quantity: Decimal,
    pub rate: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    pub party_id: i64,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "At least one line is required"))]
    pub lines: Vec<InvoiceLineInput>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateInvoiceRequest {
    pub party_id: Option<i64>,
    pub invoice_date: Option<NaiveDate>,
    pub notes: Option<String>,
    /// Full replacement of the line set when present.
    pub lines: Option<Vec<InvoiceLineInput>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceLineResponse {
    pub id: i64,
    pub delivery_line_id: Option<i64>,
    pub challan_item_ids: Vec<i64>,
    pub item_id: Option<i64>,
    pub ok_qty: Decimal,
    pub cr_qty: Decimal,
    pub mr_qty: Decimal,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceResponse {
    pub id: i64,
    pub invoice_number: String,
    pub party_id: i64,
    pub invoice_date: NaiveDate,
    pub subtotal: Decimal,
    pub status: InvoiceStatus,
    pub notes: Option<String>,
    pub lines: Vec<InvoiceLineResponse>,
}

/// Service for invoices billed against deliveries or as direct sales.
#[derive(Clone)]
pub struct InvoiceService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl InvoiceService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates an invoice.
    ///
    /// Lines referencing delivery lines with all-zero buckets are backfilled
    /// from the referenced lines (legacy payloads supplied only a total).
    /// Direct-sale lines append an OUT stock entry; linked lines do not, the
    /// OUT was recorded when the delivery happened. Deliveries whose lines
    /// are now fully billed flip to `delivered`.
    #[instrument(skip(self, request), fields(party_id = request.party_id))]
    pub async fn create_invoice(
        &self,
        scope: TenantScope,
        request: CreateInvoiceRequest,
    ) -> Result<InvoiceResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;
        let now = Utc::now();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for invoice creation");
            ServiceError::DatabaseError(e)
        })?;

        let invoice_number = match &request.invoice_number {
            Some(number) => {
                if invoice_number_exists(&txn, scope, number).await? {
                    return Err(ServiceError::Conflict(format!(
                        "Invoice number '{}' already exists in this financial year",
                        number
                    )));
                }
                number.clone()
            }
            None => generate_invoice_number(&txn, scope).await?,
        };

        let invoice = invoice::ActiveModel {
            company_id: Set(scope.company_id),
            financial_year_id: Set(scope.financial_year_id),
            party_id: Set(request.party_id),
            invoice_number: Set(invoice_number),
            invoice_date: Set(request.invoice_date.unwrap_or_else(|| now.date_naive())),
            subtotal: Set(Decimal::ZERO),
            status: Set(InvoiceStatus::Final),
            notes: Set(request.notes.clone()),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let (subtotal, affected) = insert_lines(&txn, scope, &invoice, &request.lines).await?;

        let mut active: invoice::ActiveModel = invoice.clone().into();
        active.subtotal = Set(subtotal);
        let invoice = active.update(&txn).await?;

        for delivery_id in affected {
            refresh_delivery_billing_status(&txn, delivery_id).await?;
        }

        txn.commit().await?;

        info!(invoice_id = invoice.id, invoice_number = %invoice.invoice_number, "Invoice created");
        self.emit(Event::InvoiceCreated(invoice.id)).await;

        self.load_response(invoice.id).await
    }

    /// Updates an invoice; a supplied line set replaces the old one wholesale
    /// (stock entries and billing transitions are reversed and reapplied).
    #[instrument(skip(self, request), fields(invoice_id = invoice_id))]
    pub async fn update_invoice(
        &self,
        scope: TenantScope,
        invoice_id: i64,
        request: UpdateInvoiceRequest,
    ) -> Result<InvoiceResponse, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let invoice = find_invoice(&txn, scope, invoice_id).await?;
        if invoice.status == InvoiceStatus::Cancelled && request.lines.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Cannot replace lines of cancelled invoice {}",
                invoice.invoice_number
            )));
        }
        let previously_affected = affected_delivery_ids(&txn, invoice_id).await?;

        let mut active: invoice::ActiveModel = invoice.clone().into();
        if let Some(party_id) = request.party_id {
            active.party_id = Set(party_id);
        }
        if let Some(invoice_date) = request.invoice_date {
            active.invoice_date = Set(invoice_date);
        }
        if let Some(notes) = request.notes.clone() {
            active.notes = Set(Some(notes));
        }
        let invoice = if active.is_changed() {
            active.update(&txn).await?
        } else {
            invoice
        };

        let mut affected = previously_affected;
        if let Some(lines) = &request.lines {
            if lines.is_empty() {
                return Err(ServiceError::ValidationError(
                    "At least one line is required".into(),
                ));
            }

            remove_lines(&txn, invoice_id).await?;

            let (subtotal, newly_affected) = insert_lines(&txn, scope, &invoice, lines).await?;
            affected.extend(newly_affected);

            let mut active: invoice::ActiveModel = invoice.clone().into();
            active.subtotal = Set(subtotal);
            active.update(&txn).await?;
        }

        for delivery_id in affected {
            refresh_delivery_billing_status(&txn, delivery_id).await?;
        }

        txn.commit().await?;

        info!(invoice_id, "Invoice updated");
        self.emit(Event::InvoiceUpdated(invoice_id)).await;

        self.load_response(invoice_id).await
    }

    /// Cancels an invoice, keeping it for numbering continuity.
    ///
    /// Direct-sale OUT entries are neutralized with compensating
    /// INVOICE_REVERT entries instead of being deleted, so the ledger keeps
    /// the audit trail; deliveries it had flipped to `delivered` revert.
    #[instrument(skip(self), fields(invoice_id = invoice_id))]
    pub async fn cancel_invoice(
        &self,
        scope: TenantScope,
        invoice_id: i64,
    ) -> Result<InvoiceResponse, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let invoice = find_invoice(&txn, scope, invoice_id).await?;
        if invoice.status == InvoiceStatus::Cancelled {
            return Err(ServiceError::Conflict(format!(
                "Invoice {} is already cancelled",
                invoice.invoice_number
            )));
        }

        let affected = affected_delivery_ids(&txn, invoice_id).await?;

        let out_entries = stock_entry::Entity::find()
            .filter(stock_entry::Column::ReferenceType.eq(ReferenceType::Invoice))
            .filter(stock_entry::Column::ReferenceId.eq(invoice_id))
            .all(&txn)
            .await?;
        let now = Utc::now();
        for entry in out_entries {
            stock_entry::ActiveModel {
                company_id: Set(entry.company_id),
                financial_year_id: Set(entry.financial_year_id),
                item_id: Set(entry.item_id),
                quantity: Set(entry.quantity),
                direction: Set(ReferenceType::InvoiceRevert.direction()),
                reference_type: Set(ReferenceType::InvoiceRevert),
                reference_id: Set(Some(invoice_id)),
                created_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }

        let mut active: invoice::ActiveModel = invoice.into();
        active.status = Set(InvoiceStatus::Cancelled);
        active.update(&txn).await?;

        for delivery_id in affected {
            refresh_delivery_billing_status(&txn, delivery_id).await?;
        }

        txn.commit().await?;

        info!(invoice_id, "Invoice cancelled");
        self.emit(Event::InvoiceUpdated(invoice_id)).await;

        self.load_response(invoice_id).await
    }

    /// Deletes an invoice; refused while a payment allocation references it.
    #[instrument(skip(self), fields(invoice_id = invoice_id))]
    pub async fn delete_invoice(
        &self,
        scope: TenantScope,
        invoice_id: i64,
    ) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let _invoice = find_invoice(&txn, scope, invoice_id).await?;

        let allocations = payment_allocation::Entity::find()
            .filter(payment_allocation::Column::InvoiceId.eq(invoice_id))
            .count(&txn)
            .await?;
        if allocations > 0 {
            return Err(ServiceError::Conflict(format!(
                "Cannot delete: {} payment allocation(s) reference this invoice",
                allocations
            )));
        }

        let affected = affected_delivery_ids(&txn, invoice_id).await?;

        stock_entry::Entity::delete_many()
            .filter(
                stock_entry::Column::ReferenceType
                    .is_in([ReferenceType::Invoice, ReferenceType::InvoiceRevert]),
            )
            .filter(stock_entry::Column::ReferenceId.eq(invoice_id))
            .exec(&txn)
            .await?;

        remove_lines(&txn, invoice_id).await?;
        InvoiceEntity::delete_by_id(invoice_id).exec(&txn).await?;

        for delivery_id in affected {
            refresh_delivery_billing_status(&txn, delivery_id).await?;
        }

        txn.commit().await?;

        info!(invoice_id, "Invoice deleted");
        self.emit(Event::InvoiceDeleted(invoice_id)).await;

        Ok(())
    }

    #[instrument(skip(self), fields(invoice_id = invoice_id))]
    pub async fn get_invoice(
        &self,
        scope: TenantScope,
        invoice_id: i64,
    ) -> Result<InvoiceResponse, ServiceError> {
        let db = &*self.db_pool;
        find_invoice(db, scope, invoice_id).await?;
        self.load_response(invoice_id).await
    }

    /// Lists invoices in the scope, newest first.
    #[instrument(skip(self))]
    pub async fn list_invoices(
        &self,
        scope: TenantScope,
        party_id: Option<i64>,
    ) -> Result<Vec<InvoiceResponse>, ServiceError> {
        let db = &*self.db_pool;

        let mut query = InvoiceEntity::find()
            .filter(invoice::Column::CompanyId.eq(scope.company_id))
            .filter(invoice::Column::FinancialYearId.eq(scope.financial_year_id));
        if let Some(party_id) = party_id {
            query = query.filter(invoice::Column::PartyId.eq(party_id));
        }

        let invoices = query
            .order_by_desc(invoice::Column::InvoiceDate)
            .order_by_desc(invoice::Column::Id)
            .all(db)
            .await?;

        let mut responses = Vec::with_capacity(invoices.len());
        for inv in invoices {
            responses.push(self.load_response(inv.id).await?);
        }
        Ok(responses)
    }

    async fn load_response(&self, invoice_id: i64) -> Result<InvoiceResponse, ServiceError> {
        let db = &*self.db_pool;

        let invoice = InvoiceEntity::find_by_id(invoice_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Invoice {} not found", invoice_id)))?;

        let lines = InvoiceLineEntity::find()
            .filter(invoice_line::Column::InvoiceId.eq(invoice_id))
            .order_by_asc(invoice_line::Column::Id)
            .all(db)
            .await?;

        let line_ids: Vec<i64> = lines.iter().map(|l| l.id).collect();
        let mut refs_by_line: HashMap<i64, Vec<i64>> = HashMap::new();
        for r in InvoiceLineRefEntity::find()
            .filter(invoice_line_ref::Column::InvoiceLineId.is_in(line_ids))
            .order_by_asc(invoice_line_ref::Column::Id)
            .all(db)
            .await?
        {
            refs_by_line.entry(r.invoice_line_id).or_default().push(r.delivery_line_id);
        }

        Ok(InvoiceResponse {
            id: invoice.id,
            invoice_number: invoice.invoice_number,
            party_id: invoice.party_id,
            invoice_date: invoice.invoice_date,
            subtotal: invoice.subtotal,
            status: invoice.status,
            notes: invoice.notes,
            lines: lines
                .into_iter()
                .map(|line| InvoiceLineResponse {
                    challan_item_ids: refs_by_line.remove(&line.id).unwrap_or_default(),
                    id: line.id,
                    delivery_line_id: line.delivery_line_id,
                    item_id: line.item_id,
                    ok_qty: line.ok_qty,
                    cr_qty: line.cr_qty,
                    mr_qty: line.mr_qty,
                    quantity: line.quantity,
                    rate: line.rate,
                    amount: line.amount,
                })
                .collect(),
        })
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send invoice event");
            }
        }
    }
}

/// Distinct delivery-line references of one input, singular link first.
fn referenced_line_ids(input: &InvoiceLineInput) -> Vec<i64> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    if let Some(id) = input.delivery_line_id {
        if seen.insert(id) {
            ids.push(id);
        }
    }
    for id in &input.challan_item_ids {
        if seen.insert(*id) {
            ids.push(*id);
        }
    }
    ids
}

/// Inserts the line set for `invoice`. Returns the subtotal and the ids of
/// deliveries whose billing status may have changed.
async fn insert_lines<C: ConnectionTrait>(
    conn: &C,
    scope: TenantScope,
    invoice: &invoice::Model,
    inputs: &[InvoiceLineInput],
) -> Result<(Decimal, BTreeSet<i64>), ServiceError> {
    let mut subtotal = Decimal::ZERO;
    let mut affected = BTreeSet::new();

    for input in inputs {
        if input.quantity < Decimal::ZERO || input.rate < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Quantity and rate must not be negative".into(),
            ));
        }

        let ref_ids = referenced_line_ids(input);

        let mut buckets = BucketQuantities::new(input.ok_qty, input.cr_qty, input.mr_qty);
        let mut quantity = input.quantity;

        if ref_ids.is_empty() {
            // Direct sale: needs its own item for the ledger entry.
            if input.item_id.is_none() {
                return Err(ServiceError::ValidationError(
                    "item_id is required for invoice lines without a delivery link".into(),
                ));
            }
            if !buckets.is_zero() && buckets.total() != quantity {
                return Err(ServiceError::InvariantViolation(format!(
                    "Bucket sum {} does not equal quantity {}",
                    buckets.total(),
                    quantity
                )));
            }
        } else {
            let referenced = DeliveryLineEntity::find()
                .filter(delivery_line::Column::Id.is_in(ref_ids.clone()))
                .all(conn)
                .await?;
            if referenced.len() != ref_ids.len() {
                return Err(ServiceError::not_found(
                    "One or more referenced delivery lines do not exist".to_string(),
                ));
            }
            for dl in &referenced {
                affected.insert(dl.delivery_id);
            }

            if buckets.is_zero() {
                // Legacy payloads carry only a total; grade it the way the
                // referenced delivery lines were graded.
                for dl in &referenced {
                    buckets.add(&BucketQuantities::new(dl.ok_qty, dl.cr_qty, dl.mr_qty));
                }
                if quantity.is_zero() {
                    quantity = buckets.total();
                }
            } else if buckets.total() != quantity {
                return Err(ServiceError::InvariantViolation(format!(
                    "Bucket sum {} does not equal quantity {}",
                    buckets.total(),
                    quantity
                )));
            }
        }

        let amount = quantity * input.rate;
        subtotal += amount;

        let line = invoice_line::ActiveModel {
            invoice_id: Set(invoice.id),
            delivery_line_id: Set(input.delivery_line_id),
            item_id: Set(input.item_id),
            ok_qty: Set(buckets.ok),
            cr_qty: Set(buckets.cr),
            mr_qty: Set(buckets.mr),
            quantity: Set(quantity),
            rate: Set(input.rate),
            amount: Set(amount),
            ..Default::default()
        }
        .insert(conn)
        .await?;

        for ref_id in ref_ids.iter().filter(|id| Some(**id) != input.delivery_line_id) {
            invoice_line_ref::ActiveModel {
                invoice_line_id: Set(line.id),
                delivery_line_id: Set(*ref_id),
                ..Default::default()
            }
            .insert(conn)
            .await?;
        }

        if ref_ids.is_empty() && quantity > Decimal::ZERO {
            stock_entry::ActiveModel {
                company_id: Set(scope.company_id),
                financial_year_id: Set(scope.financial_year_id),
                item_id: Set(input.item_id.unwrap_or_default()),
                quantity: Set(quantity),
                direction: Set(ReferenceType::Invoice.direction()),
                reference_type: Set(ReferenceType::Invoice),
                reference_id: Set(Some(invoice.id)),
                created_at: Set(invoice.created_at),
                ..Default::default()
            }
            .insert(conn)
            .await?;
        }
    }

    Ok((subtotal, affected))
}

/// Removes an invoice's lines, refs and direct-sale stock entries.
async fn remove_lines<C: ConnectionTrait>(conn: &C, invoice_id: i64) -> Result<(), ServiceError> {
    let line_ids: Vec<i64> = InvoiceLineEntity::find()
        .filter(invoice_line::Column::InvoiceId.eq(invoice_id))
        .all(conn)
        .await?
        .iter()
        .map(|l| l.id)
        .collect();

    InvoiceLineRefEntity::delete_many()
        .filter(invoice_line_ref::Column::InvoiceLineId.is_in(line_ids))
        .exec(conn)
        .await?;
    InvoiceLineEntity::delete_many()
        .filter(invoice_line::Column::InvoiceId.eq(invoice_id))
        .exec(conn)
        .await?;
    stock_entry::Entity::delete_many()
        .filter(stock_entry::Column::ReferenceType.eq(ReferenceType::Invoice))
        .filter(stock_entry::Column::ReferenceId.eq(invoice_id))
        .exec(conn)
        .await?;

    Ok(())
}

/// Ids of deliveries referenced by an invoice's lines via either link form.
async fn affected_delivery_ids<C: ConnectionTrait>(
    conn: &C,
    invoice_id: i64,
) -> Result<BTreeSet<i64>, ServiceError> {
    let lines = InvoiceLineEntity::find()
        .filter(invoice_line::Column::InvoiceId.eq(invoice_id))
        .all(conn)
        .await?;

    let line_ids: Vec<i64> = lines.iter().map(|l| l.id).collect();
    let mut delivery_line_ids: BTreeSet<i64> =
        lines.iter().filter_map(|l| l.delivery_line_id).collect();
    for r in InvoiceLineRefEntity::find()
        .filter(invoice_line_ref::Column::InvoiceLineId.is_in(line_ids))
        .all(conn)
        .await?
    {
        delivery_line_ids.insert(r.delivery_line_id);
    }

    let mut delivery_ids = BTreeSet::new();
    if !delivery_line_ids.is_empty() {
        for dl in DeliveryLineEntity::find()
            .filter(delivery_line::Column::Id.is_in(delivery_line_ids))
            .all(conn)
            .await?
        {
            delivery_ids.insert(dl.delivery_id);
        }
    }
    Ok(delivery_ids)
}

/// Flips a delivery to `delivered` when every one of its lines is referenced
/// by a non-cancelled invoice line, back to `sent` otherwise.
async fn refresh_delivery_billing_status<C: ConnectionTrait>(
    conn: &C,
    delivery_id: i64,
) -> Result<(), ServiceError> {
    let Some(target) = DeliveryEntity::find_by_id(delivery_id).one(conn).await? else {
        return Ok(());
    };

    let line_ids: Vec<i64> = DeliveryLineEntity::find()
        .filter(delivery_line::Column::DeliveryId.eq(delivery_id))
        .all(conn)
        .await?
        .iter()
        .map(|l| l.id)
        .collect();
    if line_ids.is_empty() {
        return Ok(());
    }

    // Collect delivery-line ids covered by non-cancelled invoice lines.
    let direct = InvoiceLineEntity::find()
        .filter(invoice_line::Column::DeliveryLineId.is_in(line_ids.clone()))
        .all(conn)
        .await?;
    let refs = InvoiceLineRefEntity::find()
        .filter(invoice_line_ref::Column::DeliveryLineId.is_in(line_ids.clone()))
        .all(conn)
        .await?;

    let ref_line_ids: Vec<i64> = refs.iter().map(|r| r.invoice_line_id).collect();
    let ref_lines = InvoiceLineEntity::find()
        .filter(invoice_line::Column::Id.is_in(ref_line_ids))
        .all(conn)
        .await?;

    let invoice_ids: BTreeSet<i64> = direct
        .iter()
        .chain(ref_lines.iter())
        .map(|l| l.invoice_id)
        .collect();
    let live_invoices: HashSet<i64> = InvoiceEntity::find()
        .filter(invoice::Column::Id.is_in(invoice_ids))
        .filter(invoice::Column::Status.ne(InvoiceStatus::Cancelled))
        .all(conn)
        .await?
        .iter()
        .map(|i| i.id)
        .collect();

    let mut covered: HashSet<i64> = HashSet::new();
    for l in &direct {
        if live_invoices.contains(&l.invoice_id) {
            if let Some(id) = l.delivery_line_id {
                covered.insert(id);
            }
        }
    }
    let line_status_by_id: HashMap<i64, i64> =
        ref_lines.iter().map(|l| (l.id, l.invoice_id)).collect();
    for r in &refs {
        if let Some(invoice_id) = line_status_by_id.get(&r.invoice_line_id) {
            if live_invoices.contains(invoice_id) {
                covered.insert(r.delivery_line_id);
            }
        }
    }

    let fully_billed = line_ids.iter().all(|id| covered.contains(id));
    let status = if fully_billed {
        DeliveryStatus::Delivered
    } else {
        DeliveryStatus::Sent
    };

    if target.status != status {
        let mut active: delivery::ActiveModel = target.into();
        active.status = Set(status);
        active.update(conn).await?;
    }

    Ok(())
}

async fn find_invoice<C: ConnectionTrait>(
    conn: &C,
    scope: TenantScope,
    invoice_id: i64,
) -> Result<invoice::Model, ServiceError> {
    InvoiceEntity::find_by_id(invoice_id)
        .filter(invoice::Column::CompanyId.eq(scope.company_id))
        .filter(invoice::Column::FinancialYearId.eq(scope.financial_year_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("Invoice {} not found", invoice_id)))
}

async fn invoice_number_exists<C: ConnectionTrait>(
    conn: &C,
    scope: TenantScope,
    number: &str,
) -> Result<bool, ServiceError> {
    let existing = InvoiceEntity::find()
        .filter(invoice::Column::CompanyId.eq(scope.company_id))
        .filter(invoice::Column::FinancialYearId.eq(scope.financial_year_id))
        .filter(invoice::Column::InvoiceNumber.eq(number))
        .count(conn)
        .await?;
    Ok(existing > 0)
}

async fn generate_invoice_number<C: ConnectionTrait>(
    conn: &C,
    scope: TenantScope,
) -> Result<String, ServiceError> {
    let last = InvoiceEntity::find()
        .filter(invoice::Column::CompanyId.eq(scope.company_id))
        .filter(invoice::Column::FinancialYearId.eq(scope.financial_year_id))
        .order_by_desc(invoice::Column::Id)
        .one(conn)
        .await?
        .map(|i| i.invoice_number);
    let mut suffix = numbering::next_suffix(last.as_deref());

    for _ in 0..MAX_NUMBERING_RETRIES {
        let candidate = numbering::format_number(INVOICE_PREFIX, suffix);
        if !invoice_number_exists(conn, scope, &candidate).await? {
            return Ok(candidate);
        }
        warn!(%candidate, "Invoice number collision, trying next");
        suffix = suffix.saturating_add(1);
    }

    Err(ServiceError::Conflict(
        "Could not generate a unique invoice number".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(delivery_line_id: Option<i64>, challan_item_ids: Vec<i64>) -> InvoiceLineInput {
        InvoiceLineInput {
            delivery_line_id,
            challan_item_ids,
            item_id: None,
            ok_qty: Decimal::ZERO,
            cr_qty: Decimal::ZERO,
            mr_qty: Decimal::ZERO,
            quantity: dec!(10),
            rate: dec!(2),
        }
    }

    #[test]
    fn singular_link_comes_first_and_duplicates_collapse() {
        let ids = referenced_line_ids(&line(Some(7), vec![3, 7, 3, 9]));
        assert_eq!(ids, vec![7, 3, 9]);
    }

    #[test]
    fn no_links_means_direct_sale() {
        assert!(referenced_line_ids(&line(None, vec![])).is_empty());
    }
}
