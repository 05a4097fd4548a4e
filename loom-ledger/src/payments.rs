//! Installments against sales and purchases, and the credit views built on them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use loom_core::{
    format_timestamp, normalize_text, round_money, storage_precision, CustomerId, DateRange,
    Payment, PaymentId, PaymentMethod, Purchase, PurchaseId, PurchasePayment, Sale, SaleId,
    Settlement, SupplierId,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Transaction};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::recorder::{load_purchase, load_sale};
use crate::rows::{
    collect_rows, optional_int, optional_timestamp, row_to_payment, row_to_purchase,
    row_to_purchase_payment, row_to_sale, PAYMENT_COLUMNS, PURCHASE_COLUMNS,
    PURCHASE_PAYMENT_COLUMNS, SALE_COLUMNS,
};
use crate::{Ledger, LedgerError, LedgerResult};

/// Input for [`Ledger::record_payment`] and [`Ledger::record_purchase_payment`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewPayment {
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: Option<String>,
    /// Defaults to the time of recording.
    pub date: Option<DateTime<Utc>>,
}

impl NewPayment {
    pub fn new(amount: Decimal) -> Self {
        Self {
            amount,
            method: PaymentMethod::Cash,
            reference: None,
            notes: None,
            recorded_by: None,
            date: None,
        }
    }

    pub fn with_method(mut self, method: PaymentMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn recorded_by(mut self, who: impl Into<String>) -> Self {
        self.recorded_by = Some(who.into());
        self
    }

    pub fn dated(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }
}

/// A stored installment together with the settlement it produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Receipt<P> {
    pub payment: P,
    pub settlement: Settlement,
}

/// Sale that still has money owed on it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingSale {
    pub sale: Sale,
    pub customer_name: String,
}

/// Purchase the business still owes money on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingPurchase {
    pub purchase: Purchase,
    pub supplier_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerCredit {
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub contact: Option<String>,
    pub pending_count: u64,
    pub total_due: Decimal,
    pub total_sales: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierCredit {
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    pub contact: Option<String>,
    pub pending_count: u64,
    pub total_due: Decimal,
    pub total_purchases: Decimal,
}

/// Installment joined with the customer it came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentHistoryEntry {
    pub payment: Payment,
    pub customer_id: CustomerId,
    pub customer_name: String,
}

/// Installment joined with the supplier it went to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchasePaymentHistoryEntry {
    pub payment: PurchasePayment,
    pub supplier_id: SupplierId,
    pub supplier_name: String,
}

/// Money owed in both directions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutstandingTotals {
    pub receivable: Decimal,
    pub payable: Decimal,
}

fn checked_transition(settlement: Settlement, amount: Decimal, what: &str) -> LedgerResult<Settlement> {
    if !settlement.is_balanced() {
        return Err(LedgerError::InvalidState(format!(
            "{what} has amount_paid {} + amount_due {} != total {}",
            settlement.amount_paid, settlement.amount_due, settlement.total
        )));
    }
    Ok(settlement.apply_payment(amount)?)
}

/// Move the settlement columns of one row from `current` to `next`, but only
/// if nobody changed `amount_due` since it was read.
fn swap_settlement(
    tx: &Transaction<'_>,
    table: &str,
    id_column: &str,
    id: i64,
    current: &Settlement,
    next: &Settlement,
) -> LedgerResult<()> {
    let sql = format!(
        "UPDATE {table} SET amount_paid = ?1, amount_due = ?2, payment_status = ?3
         WHERE {id_column} = ?4 AND amount_due = ?5"
    );
    let changed = tx.execute(
        &sql,
        params![
            next.amount_paid.to_string(),
            next.amount_due.to_string(),
            next.status.as_str(),
            id,
            current.amount_due.to_string(),
        ],
    )?;
    if changed == 0 {
        warn!(table, id, "settlement changed underneath payment");
        return Err(LedgerError::InvalidState(format!(
            "{table} row {id} was modified concurrently; retry the payment"
        )));
    }
    Ok(())
}

fn insert_installment(
    tx: &Transaction<'_>,
    table: &str,
    parent_column: &str,
    parent_id: i64,
    date: DateTime<Utc>,
    payment: &NewPayment,
) -> LedgerResult<PaymentId> {
    let sql = format!(
        "INSERT INTO {table} (
            {parent_column}, payment_date, amount, payment_method, reference_number, notes, recorded_by
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
    );
    tx.execute(
        &sql,
        params![
            parent_id,
            format_timestamp(date),
            payment.amount.to_string(),
            payment.method.as_str(),
            normalize_text(payment.reference.clone()),
            normalize_text(payment.notes.clone()),
            normalize_text(payment.recorded_by.clone()),
        ],
    )?;
    Ok(PaymentId(tx.last_insert_rowid()))
}

fn range_params(range: &DateRange) -> [Value; 2] {
    [
        optional_timestamp(range.start()),
        optional_timestamp(range.end_exclusive()),
    ]
}

impl Ledger {
    /// Record an installment against a sale.
    pub fn record_payment(&self, sale_id: SaleId, payment: NewPayment) -> LedgerResult<Receipt<Payment>> {
        let date = storage_precision(payment.date.unwrap_or_else(Utc::now));
        let (id, settlement) = self.write(|tx| {
            let sale = load_sale(tx, sale_id)?;
            let current = sale.settlement();
            let next = checked_transition(current, payment.amount, "sale")?;
            swap_settlement(tx, "sales", "sale_id", sale_id.get(), &current, &next)?;
            let id = insert_installment(tx, "payments", "sale_id", sale_id.get(), date, &payment)?;
            Ok((id, next))
        })?;
        info!(
            sale_id = %sale_id,
            payment_id = %id,
            amount = %payment.amount,
            status = %settlement.status,
            amount_due = %settlement.amount_due,
            "sale payment recorded"
        );
        Ok(Receipt {
            payment: Payment {
                id,
                sale_id,
                date,
                amount: payment.amount,
                method: payment.method,
                reference: normalize_text(payment.reference),
                notes: normalize_text(payment.notes),
                recorded_by: normalize_text(payment.recorded_by),
            },
            settlement,
        })
    }

    /// Record an installment the business paid against a purchase.
    pub fn record_purchase_payment(
        &self,
        purchase_id: PurchaseId,
        payment: NewPayment,
    ) -> LedgerResult<Receipt<PurchasePayment>> {
        let date = storage_precision(payment.date.unwrap_or_else(Utc::now));
        let (id, settlement) = self.write(|tx| {
            let purchase = load_purchase(tx, purchase_id)?;
            let current = purchase.settlement();
            let next = checked_transition(current, payment.amount, "purchase")?;
            swap_settlement(tx, "purchases", "purchase_id", purchase_id.get(), &current, &next)?;
            let id = insert_installment(
                tx,
                "purchase_payments",
                "purchase_id",
                purchase_id.get(),
                date,
                &payment,
            )?;
            Ok((id, next))
        })?;
        info!(
            purchase_id = %purchase_id,
            payment_id = %id,
            amount = %payment.amount,
            status = %settlement.status,
            amount_due = %settlement.amount_due,
            "purchase payment recorded"
        );
        Ok(Receipt {
            payment: PurchasePayment {
                id,
                purchase_id,
                date,
                amount: payment.amount,
                method: payment.method,
                reference: normalize_text(payment.reference),
                notes: normalize_text(payment.notes),
                recorded_by: normalize_text(payment.recorded_by),
            },
            settlement,
        })
    }

    /// Sales with money still owed, newest first.
    pub fn pending_payments(&self, customer_id: Option<CustomerId>) -> LedgerResult<Vec<PendingSale>> {
        self.read(|conn| {
            let sql = format!(
                "SELECT {SALE_COLUMNS}, c.name
                 FROM sales s JOIN customers c ON c.customer_id = s.customer_id
                 WHERE s.payment_status IN ('pending', 'partial')
                   AND (?1 IS NULL OR s.customer_id = ?1)
                 ORDER BY s.date DESC, s.sale_id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query(params![optional_int(customer_id.map(CustomerId::get))])?;
            collect_rows(rows, |row| {
                Ok(PendingSale {
                    sale: row_to_sale(row)?,
                    customer_name: row.get(18)?,
                })
            })
        })
    }

    /// Purchases the business still owes on, newest first.
    pub fn pending_purchase_payments(
        &self,
        supplier_id: Option<SupplierId>,
    ) -> LedgerResult<Vec<PendingPurchase>> {
        self.read(|conn| {
            let sql = format!(
                "SELECT {PURCHASE_COLUMNS}, sp.name
                 FROM purchases p JOIN suppliers sp ON sp.supplier_id = p.supplier_id
                 WHERE p.payment_status IN ('pending', 'partial')
                   AND (?1 IS NULL OR p.supplier_id = ?1)
                 ORDER BY p.date DESC, p.purchase_id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query(params![optional_int(supplier_id.map(SupplierId::get))])?;
            collect_rows(rows, |row| {
                Ok(PendingPurchase {
                    purchase: row_to_purchase(row)?,
                    supplier_name: row.get(14)?,
                })
            })
        })
    }

    /// Outstanding credit per customer over sales dated inside `range`.
    pub fn customer_credit_summary(&self, range: DateRange) -> LedgerResult<Vec<CustomerCredit>> {
        let rows = self.read(|conn| {
            let sql = format!(
                "SELECT {SALE_COLUMNS}, c.name, c.contact
                 FROM sales s JOIN customers c ON c.customer_id = s.customer_id
                 WHERE s.payment_status IN ('pending', 'partial')
                   AND (?1 IS NULL OR s.date >= ?1)
                   AND (?2 IS NULL OR s.date < ?2)"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query(params_from_iter(range_params(&range)))?;
            collect_rows(rows, |row| {
                Ok((row_to_sale(row)?, row.get::<_, String>(18)?, row.get::<_, Option<String>>(19)?))
            })
        })?;

        let mut grouped: BTreeMap<CustomerId, CustomerCredit> = BTreeMap::new();
        for (sale, name, contact) in rows {
            let entry = grouped.entry(sale.customer_id).or_insert_with(|| CustomerCredit {
                customer_id: sale.customer_id,
                customer_name: name,
                contact,
                pending_count: 0,
                total_due: Decimal::ZERO,
                total_sales: Decimal::ZERO,
            });
            entry.pending_count += 1;
            entry.total_due += sale.amount_due;
            entry.total_sales += sale.total_price_with_tax;
        }
        let summary: Vec<CustomerCredit> = grouped
            .into_values()
            .map(|mut credit| {
                credit.total_due = round_money(credit.total_due);
                credit.total_sales = round_money(credit.total_sales);
                credit
            })
            .collect();
        debug!(customers = summary.len(), "customer credit summary computed");
        Ok(summary)
    }

    /// Outstanding credit per supplier over purchases dated inside `range`.
    pub fn supplier_credit_summary(&self, range: DateRange) -> LedgerResult<Vec<SupplierCredit>> {
        let rows = self.read(|conn| {
            let sql = format!(
                "SELECT {PURCHASE_COLUMNS}, sp.name, sp.contact
                 FROM purchases p JOIN suppliers sp ON sp.supplier_id = p.supplier_id
                 WHERE p.payment_status IN ('pending', 'partial')
                   AND (?1 IS NULL OR p.date >= ?1)
                   AND (?2 IS NULL OR p.date < ?2)"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query(params_from_iter(range_params(&range)))?;
            collect_rows(rows, |row| {
                Ok((
                    row_to_purchase(row)?,
                    row.get::<_, String>(14)?,
                    row.get::<_, Option<String>>(15)?,
                ))
            })
        })?;

        let mut grouped: BTreeMap<SupplierId, SupplierCredit> = BTreeMap::new();
        for (purchase, name, contact) in rows {
            let entry = grouped
                .entry(purchase.supplier_id)
                .or_insert_with(|| SupplierCredit {
                    supplier_id: purchase.supplier_id,
                    supplier_name: name,
                    contact,
                    pending_count: 0,
                    total_due: Decimal::ZERO,
                    total_purchases: Decimal::ZERO,
                });
            entry.pending_count += 1;
            entry.total_due += purchase.amount_due;
            entry.total_purchases += purchase.total_cost;
        }
        let summary: Vec<SupplierCredit> = grouped
            .into_values()
            .map(|mut credit| {
                credit.total_due = round_money(credit.total_due);
                credit.total_purchases = round_money(credit.total_purchases);
                credit
            })
            .collect();
        debug!(suppliers = summary.len(), "supplier credit summary computed");
        Ok(summary)
    }

    /// Installments received for one sale, newest first.
    pub fn payments_for_sale(&self, sale_id: SaleId) -> LedgerResult<Vec<Payment>> {
        self.read(|conn| {
            load_sale(conn, sale_id)?;
            let sql = format!(
                "SELECT {PAYMENT_COLUMNS} FROM payments pm WHERE pm.sale_id = ?1
                 ORDER BY pm.payment_date DESC, pm.payment_id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query(params![sale_id.get()])?;
            collect_rows(rows, row_to_payment)
        })
    }

    /// Installments paid for one purchase, newest first.
    pub fn payments_for_purchase(&self, purchase_id: PurchaseId) -> LedgerResult<Vec<PurchasePayment>> {
        self.read(|conn| {
            load_purchase(conn, purchase_id)?;
            let sql = format!(
                "SELECT {PURCHASE_PAYMENT_COLUMNS} FROM purchase_payments pp WHERE pp.purchase_id = ?1
                 ORDER BY pp.payment_date DESC, pp.payment_id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query(params![purchase_id.get()])?;
            collect_rows(rows, row_to_purchase_payment)
        })
    }

    /// Customer payments with a payment date inside `range`, newest first.
    pub fn payment_history(
        &self,
        customer_id: Option<CustomerId>,
        range: DateRange,
    ) -> LedgerResult<Vec<PaymentHistoryEntry>> {
        self.read(|conn| {
            let sql = format!(
                "SELECT {PAYMENT_COLUMNS}, c.customer_id, c.name
                 FROM payments pm
                 JOIN sales s ON s.sale_id = pm.sale_id
                 JOIN customers c ON c.customer_id = s.customer_id
                 WHERE (?1 IS NULL OR c.customer_id = ?1)
                   AND (?2 IS NULL OR pm.payment_date >= ?2)
                   AND (?3 IS NULL OR pm.payment_date < ?3)
                 ORDER BY pm.payment_date DESC, pm.payment_id DESC"
            );
            let [start, end] = range_params(&range);
            let params = [optional_int(customer_id.map(CustomerId::get)), start, end];
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query(params_from_iter(params.iter()))?;
            collect_rows(rows, |row| {
                Ok(PaymentHistoryEntry {
                    payment: row_to_payment(row)?,
                    customer_id: CustomerId(row.get(8)?),
                    customer_name: row.get(9)?,
                })
            })
        })
    }

    /// Supplier payments with a payment date inside `range`, newest first.
    pub fn purchase_payment_history(
        &self,
        supplier_id: Option<SupplierId>,
        range: DateRange,
    ) -> LedgerResult<Vec<PurchasePaymentHistoryEntry>> {
        self.read(|conn| {
            let sql = format!(
                "SELECT {PURCHASE_PAYMENT_COLUMNS}, sp.supplier_id, sp.name
                 FROM purchase_payments pp
                 JOIN purchases p ON p.purchase_id = pp.purchase_id
                 JOIN suppliers sp ON sp.supplier_id = p.supplier_id
                 WHERE (?1 IS NULL OR sp.supplier_id = ?1)
                   AND (?2 IS NULL OR pp.payment_date >= ?2)
                   AND (?3 IS NULL OR pp.payment_date < ?3)
                 ORDER BY pp.payment_date DESC, pp.payment_id DESC"
            );
            let [start, end] = range_params(&range);
            let params = [optional_int(supplier_id.map(SupplierId::get)), start, end];
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query(params_from_iter(params.iter()))?;
            collect_rows(rows, |row| {
                Ok(PurchasePaymentHistoryEntry {
                    payment: row_to_purchase_payment(row)?,
                    supplier_id: SupplierId(row.get(8)?),
                    supplier_name: row.get(9)?,
                })
            })
        })
    }

    /// Total receivable from customers and payable to suppliers.
    pub fn outstanding_totals(&self) -> LedgerResult<OutstandingTotals> {
        self.read(|conn| {
            Ok(OutstandingTotals {
                receivable: round_money(sum_due(conn, "sales")?),
                payable: round_money(sum_due(conn, "purchases")?),
            })
        })
    }
}

fn sum_due(conn: &Connection, table: &str) -> LedgerResult<Decimal> {
    let sql = format!("SELECT amount_due FROM {table} WHERE payment_status IN ('pending', 'partial')");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query([])?;
    let dues = collect_rows(rows, |row| crate::rows::decimal_at(row, 0))?;
    Ok(dues.into_iter().sum())
}
