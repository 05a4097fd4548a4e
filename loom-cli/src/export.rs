//! CSV exports of the ledger tables.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use loom_core::{format_timestamp, BankStatement};
use loom_ledger::{PurchaseLedger, SaleLedger, StockLine};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Serialize)]
struct PurchaseRow<'a> {
    purchase_id: i64,
    date: String,
    supplier: &'a str,
    fabric_type: &'a str,
    fabric_code: Option<&'a str>,
    composition: Option<&'a str>,
    quantity_meters: Decimal,
    price_per_meter: Decimal,
    total_cost: Decimal,
    payment_method: &'static str,
    payment_status: &'static str,
    amount_paid: Decimal,
    amount_due: Decimal,
}

#[derive(Serialize)]
struct SaleRow<'a> {
    sale_id: i64,
    date: String,
    customer: &'a str,
    fabric_type: &'a str,
    fabric_code: Option<&'a str>,
    composition: Option<&'a str>,
    quantity_meters: Decimal,
    price_per_meter: Decimal,
    subtotal: Decimal,
    tax_rate: Decimal,
    tax: Decimal,
    total_price_with_tax: Decimal,
    payment_method: &'static str,
    payment_status: &'static str,
    amount_paid: Decimal,
    amount_due: Decimal,
}

#[derive(Serialize)]
struct StockRow<'a> {
    fabric_type: &'a str,
    fabric_code: Option<&'a str>,
    composition: Option<&'a str>,
    total_purchased: Decimal,
    total_sold: Decimal,
    balance_in_meters: Decimal,
    avg_cost_per_meter: Decimal,
    stock_valuation: Decimal,
}

#[derive(Serialize)]
struct BankRow<'a> {
    statement_id: i64,
    date: String,
    entry_type: &'static str,
    amount: Decimal,
    description: &'a str,
    account: Option<&'a str>,
    reference: Option<&'a str>,
    status: &'static str,
    reconciliation_notes: Option<&'a str>,
}

fn csv_writer(path: &Path) -> Result<csv::Writer<fs::File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    csv::Writer::from_path(path).with_context(|| format!("failed to create {}", path.display()))
}

pub fn write_purchases(path: &Path, ledger: &PurchaseLedger) -> Result<usize> {
    let mut writer = csv_writer(path)?;
    for entry in &ledger.entries {
        let p = &entry.purchase;
        writer.serialize(PurchaseRow {
            purchase_id: p.id.get(),
            date: format_timestamp(p.date),
            supplier: &entry.supplier_name,
            fabric_type: &p.fabric.fabric_type,
            fabric_code: p.fabric.fabric_code.as_deref(),
            composition: p.fabric.composition.as_deref(),
            quantity_meters: p.quantity_meters,
            price_per_meter: p.price_per_meter,
            total_cost: p.total_cost,
            payment_method: p.payment_method.as_str(),
            payment_status: p.payment_status.as_str(),
            amount_paid: p.amount_paid,
            amount_due: p.amount_due,
        })?;
    }
    writer.flush()?;
    Ok(ledger.entries.len())
}

pub fn write_sales(path: &Path, ledger: &SaleLedger) -> Result<usize> {
    let mut writer = csv_writer(path)?;
    for entry in &ledger.entries {
        let s = &entry.sale;
        writer.serialize(SaleRow {
            sale_id: s.id.get(),
            date: format_timestamp(s.date),
            customer: &entry.customer_name,
            fabric_type: &s.fabric.fabric_type,
            fabric_code: s.fabric.fabric_code.as_deref(),
            composition: s.fabric.composition.as_deref(),
            quantity_meters: s.quantity_meters,
            price_per_meter: s.price_per_meter,
            subtotal: s.subtotal(),
            tax_rate: s.tax_rate,
            tax: s.tax,
            total_price_with_tax: s.total_price_with_tax,
            payment_method: s.payment_method.as_str(),
            payment_status: s.payment_status.as_str(),
            amount_paid: s.amount_paid,
            amount_due: s.amount_due,
        })?;
    }
    writer.flush()?;
    Ok(ledger.entries.len())
}

pub fn write_stock(path: &Path, lines: &[StockLine]) -> Result<usize> {
    let mut writer = csv_writer(path)?;
    for line in lines {
        writer.serialize(StockRow {
            fabric_type: &line.fabric.fabric_type,
            fabric_code: line.fabric.fabric_code.as_deref(),
            composition: line.fabric.composition.as_deref(),
            total_purchased: line.total_purchased,
            total_sold: line.total_sold,
            balance_in_meters: line.balance_in_meters,
            avg_cost_per_meter: line.avg_cost_per_meter,
            stock_valuation: line.stock_valuation,
        })?;
    }
    writer.flush()?;
    Ok(lines.len())
}

pub fn write_bank(path: &Path, statements: &[BankStatement]) -> Result<usize> {
    let mut writer = csv_writer(path)?;
    for line in statements {
        writer.serialize(BankRow {
            statement_id: line.id.get(),
            date: format_timestamp(line.date),
            entry_type: line.entry_type.as_str(),
            amount: line.amount,
            description: &line.description,
            account: line.account.as_deref(),
            reference: line.reference.as_deref(),
            status: line.status.as_str(),
            reconciliation_notes: line.reconciliation_notes.as_deref(),
        })?;
    }
    writer.flush()?;
    Ok(statements.len())
}
