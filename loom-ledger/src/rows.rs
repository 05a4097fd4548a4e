//! Column lists and row decoders shared by every query in the crate.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use loom_core::{
    BankStatement, Company, CompanyId, Customer, CustomerId, FabricIdentity, Payment, PaymentId,
    PurchaseId, Purchase, PurchasePayment, Sale, SaleId, StatementId, Supplier, SupplierId,
};
use rusqlite::types::Value;
use rusqlite::Row;
use rust_decimal::Decimal;

use crate::{LedgerError, LedgerResult};

pub(crate) const COMPANY_COLUMNS: &str = "company_id, company_name, address, phone, email, \
     tax_number, license_number, website, created_at";

pub(crate) const PURCHASE_COLUMNS: &str = "p.purchase_id, p.supplier_id, p.date, p.fabric_type, \
     p.fabric_code, p.composition, p.quantity_meters, p.price_per_meter, p.total_cost, \
     p.payment_method, p.payment_status, p.amount_paid, p.amount_due, p.payment_notes";

pub(crate) const SALE_COLUMNS: &str = "s.sale_id, s.company_id, s.customer_id, s.date, \
     s.fabric_type, s.fabric_code, s.composition, s.quantity_meters, s.price_per_meter, \
     s.apply_tax, s.tax_rate, s.tax, s.total_price_with_tax, s.payment_method, \
     s.payment_status, s.amount_paid, s.amount_due, s.payment_notes";

pub(crate) const PAYMENT_COLUMNS: &str = "pm.payment_id, pm.sale_id, pm.payment_date, pm.amount, \
     pm.payment_method, pm.reference_number, pm.notes, pm.recorded_by";

pub(crate) const PURCHASE_PAYMENT_COLUMNS: &str = "pp.payment_id, pp.purchase_id, \
     pp.payment_date, pp.amount, pp.payment_method, pp.reference_number, pp.notes, \
     pp.recorded_by";

pub(crate) const STATEMENT_COLUMNS: &str = "statement_id, transaction_date, transaction_type, \
     amount, description, bank_account, reference_number, related_sale_id, \
     related_purchase_id, payment_method, status, reconciliation_notes, recorded_by, created_at";

pub(crate) fn optional_text(value: Option<&str>) -> Value {
    value
        .map(|text| Value::Text(text.to_string()))
        .unwrap_or(Value::Null)
}

pub(crate) fn optional_int(value: Option<i64>) -> Value {
    value.map(Value::Integer).unwrap_or(Value::Null)
}

pub(crate) fn optional_timestamp(value: Option<DateTime<Utc>>) -> Value {
    value
        .map(|ts| Value::Text(loom_core::format_timestamp(ts)))
        .unwrap_or(Value::Null)
}

pub(crate) fn decimal_at(row: &Row<'_>, idx: usize) -> LedgerResult<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw)
        .map_err(|err| LedgerError::Serialization(format!("invalid decimal {raw}: {err}")))
}

pub(crate) fn timestamp_at(row: &Row<'_>, idx: usize) -> LedgerResult<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| LedgerError::Serialization(format!("invalid timestamp {raw}: {err}")))
}

pub(crate) fn parsed_at<T>(row: &Row<'_>, idx: usize) -> LedgerResult<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw).map_err(LedgerError::Serialization)
}

fn optional_parsed_at<T>(row: &Row<'_>, idx: usize) -> LedgerResult<Option<T>>
where
    T: FromStr<Err = String>,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|text| T::from_str(&text).map_err(LedgerError::Serialization))
        .transpose()
}

fn fabric_at(row: &Row<'_>, idx: usize) -> LedgerResult<FabricIdentity> {
    Ok(FabricIdentity {
        fabric_type: row.get(idx)?,
        fabric_code: row.get(idx + 1)?,
        composition: row.get(idx + 2)?,
    })
}

pub(crate) fn row_to_company(row: &Row<'_>) -> LedgerResult<Company> {
    Ok(Company {
        id: CompanyId(row.get(0)?),
        name: row.get(1)?,
        address: row.get(2)?,
        phone: row.get(3)?,
        email: row.get(4)?,
        tax_number: row.get(5)?,
        license_number: row.get(6)?,
        website: row.get(7)?,
        created_at: timestamp_at(row, 8)?,
    })
}

pub(crate) fn row_to_supplier(row: &Row<'_>) -> LedgerResult<Supplier> {
    Ok(Supplier {
        id: SupplierId(row.get(0)?),
        name: row.get(1)?,
        contact: row.get(2)?,
    })
}

pub(crate) fn row_to_customer(row: &Row<'_>) -> LedgerResult<Customer> {
    Ok(Customer {
        id: CustomerId(row.get(0)?),
        name: row.get(1)?,
        contact: row.get(2)?,
    })
}

pub(crate) fn row_to_purchase(row: &Row<'_>) -> LedgerResult<Purchase> {
    Ok(Purchase {
        id: PurchaseId(row.get(0)?),
        supplier_id: SupplierId(row.get(1)?),
        date: timestamp_at(row, 2)?,
        fabric: fabric_at(row, 3)?,
        quantity_meters: decimal_at(row, 6)?,
        price_per_meter: decimal_at(row, 7)?,
        total_cost: decimal_at(row, 8)?,
        payment_method: parsed_at(row, 9)?,
        payment_status: parsed_at(row, 10)?,
        amount_paid: decimal_at(row, 11)?,
        amount_due: decimal_at(row, 12)?,
        payment_notes: row.get(13)?,
    })
}

pub(crate) fn row_to_sale(row: &Row<'_>) -> LedgerResult<Sale> {
    Ok(Sale {
        id: SaleId(row.get(0)?),
        company_id: row.get::<_, Option<i64>>(1)?.map(CompanyId),
        customer_id: CustomerId(row.get(2)?),
        date: timestamp_at(row, 3)?,
        fabric: fabric_at(row, 4)?,
        quantity_meters: decimal_at(row, 7)?,
        price_per_meter: decimal_at(row, 8)?,
        apply_tax: row.get(9)?,
        tax_rate: decimal_at(row, 10)?,
        tax: decimal_at(row, 11)?,
        total_price_with_tax: decimal_at(row, 12)?,
        payment_method: parsed_at(row, 13)?,
        payment_status: parsed_at(row, 14)?,
        amount_paid: decimal_at(row, 15)?,
        amount_due: decimal_at(row, 16)?,
        payment_notes: row.get(17)?,
    })
}

pub(crate) fn row_to_payment(row: &Row<'_>) -> LedgerResult<Payment> {
    Ok(Payment {
        id: PaymentId(row.get(0)?),
        sale_id: SaleId(row.get(1)?),
        date: timestamp_at(row, 2)?,
        amount: decimal_at(row, 3)?,
        method: parsed_at(row, 4)?,
        reference: row.get(5)?,
        notes: row.get(6)?,
        recorded_by: row.get(7)?,
    })
}

pub(crate) fn row_to_purchase_payment(row: &Row<'_>) -> LedgerResult<PurchasePayment> {
    Ok(PurchasePayment {
        id: PaymentId(row.get(0)?),
        purchase_id: PurchaseId(row.get(1)?),
        date: timestamp_at(row, 2)?,
        amount: decimal_at(row, 3)?,
        method: parsed_at(row, 4)?,
        reference: row.get(5)?,
        notes: row.get(6)?,
        recorded_by: row.get(7)?,
    })
}

pub(crate) fn row_to_statement(row: &Row<'_>) -> LedgerResult<BankStatement> {
    Ok(BankStatement {
        id: StatementId(row.get(0)?),
        date: timestamp_at(row, 1)?,
        entry_type: parsed_at(row, 2)?,
        amount: decimal_at(row, 3)?,
        description: row.get(4)?,
        account: row.get(5)?,
        reference: row.get(6)?,
        related_sale_id: row.get::<_, Option<i64>>(7)?.map(SaleId),
        related_purchase_id: row.get::<_, Option<i64>>(8)?.map(PurchaseId),
        payment_method: optional_parsed_at(row, 9)?,
        status: parsed_at(row, 10)?,
        reconciliation_notes: row.get(11)?,
        recorded_by: row.get(12)?,
        created_at: timestamp_at(row, 13)?,
    })
}

/// Drain a prepared query through `decode`.
pub(crate) fn collect_rows<T>(
    mut rows: rusqlite::Rows<'_>,
    decode: impl Fn(&Row<'_>) -> LedgerResult<T>,
) -> LedgerResult<Vec<T>> {
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(decode(row)?);
    }
    Ok(out)
}
