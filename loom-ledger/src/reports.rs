//! Filtered purchase/sale ledgers and per-counterparty summaries.

use std::collections::BTreeMap;

use loom_core::{
    round_money, CompanyId, CustomerId, DateRange, Purchase, Sale, SupplierId,
};
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::rows::{
    collect_rows, optional_int, optional_text, optional_timestamp, row_to_purchase, row_to_sale,
    PURCHASE_COLUMNS, SALE_COLUMNS,
};
use crate::{Ledger, LedgerResult};

/// Filter describing which purchases to list.
#[derive(Clone, Debug, Default)]
pub struct PurchaseLedgerQuery {
    pub supplier_id: Option<SupplierId>,
    /// Case-insensitive substring of the fabric type.
    pub fabric_type: Option<String>,
    /// Case-insensitive substring of the fabric code.
    pub fabric_code: Option<String>,
    pub range: DateRange,
    /// Matched against type, code, composition and supplier name.
    pub search: Option<String>,
}

impl PurchaseLedgerQuery {
    pub fn with_supplier(mut self, supplier_id: SupplierId) -> Self {
        self.supplier_id = Some(supplier_id);
        self
    }

    pub fn with_fabric_type(mut self, fabric_type: impl Into<String>) -> Self {
        self.fabric_type = Some(fabric_type.into());
        self
    }

    pub fn with_fabric_code(mut self, fabric_code: impl Into<String>) -> Self {
        self.fabric_code = Some(fabric_code.into());
        self
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }
}

/// Filter describing which sales to list.
#[derive(Clone, Debug, Default)]
pub struct SaleLedgerQuery {
    pub customer_id: Option<CustomerId>,
    pub company_id: Option<CompanyId>,
    pub fabric_type: Option<String>,
    pub fabric_code: Option<String>,
    pub range: DateRange,
    /// Matched against type, code, composition and customer name.
    pub search: Option<String>,
    pub apply_tax: Option<bool>,
}

impl SaleLedgerQuery {
    pub fn with_customer(mut self, customer_id: CustomerId) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_company(mut self, company_id: CompanyId) -> Self {
        self.company_id = Some(company_id);
        self
    }

    pub fn with_fabric_type(mut self, fabric_type: impl Into<String>) -> Self {
        self.fabric_type = Some(fabric_type.into());
        self
    }

    pub fn with_fabric_code(mut self, fabric_code: impl Into<String>) -> Self {
        self.fabric_code = Some(fabric_code.into());
        self
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn taxed(mut self, apply_tax: bool) -> Self {
        self.apply_tax = Some(apply_tax);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchaseLedgerEntry {
    pub purchase: Purchase,
    pub supplier_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PurchaseLedger {
    pub entries: Vec<PurchaseLedgerEntry>,
    pub count: usize,
    pub total_quantity: Decimal,
    pub total_amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SaleLedgerEntry {
    pub sale: Sale,
    pub customer_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SaleLedger {
    pub entries: Vec<SaleLedgerEntry>,
    pub count: usize,
    pub total_quantity: Decimal,
    pub subtotal: Decimal,
    pub total_tax: Decimal,
    pub total_amount: Decimal,
}

/// Trading volume with one customer or supplier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartySummary {
    pub id: i64,
    pub name: String,
    pub contact: Option<String>,
    pub transaction_count: u64,
    pub total_quantity: Decimal,
    pub total_amount: Decimal,
}

fn text_filter(value: Option<&str>) -> Value {
    optional_text(value.map(str::trim).filter(|text| !text.is_empty()))
}

fn summarize<I>(rows: I) -> Vec<CounterpartySummary>
where
    I: IntoIterator<Item = (i64, String, Option<String>, Decimal, Decimal)>,
{
    let mut grouped: BTreeMap<i64, CounterpartySummary> = BTreeMap::new();
    for (id, name, contact, quantity, amount) in rows {
        let entry = grouped.entry(id).or_insert_with(|| CounterpartySummary {
            id,
            name,
            contact,
            transaction_count: 0,
            total_quantity: Decimal::ZERO,
            total_amount: Decimal::ZERO,
        });
        entry.transaction_count += 1;
        entry.total_quantity += quantity;
        entry.total_amount += amount;
    }
    grouped
        .into_values()
        .map(|mut line| {
            line.total_quantity = round_money(line.total_quantity);
            line.total_amount = round_money(line.total_amount);
            line
        })
        .collect()
}

impl Ledger {
    pub fn purchase_ledger(&self, query: &PurchaseLedgerQuery) -> LedgerResult<PurchaseLedger> {
        let entries = self.read(|conn| {
            let sql = format!(
                "SELECT {PURCHASE_COLUMNS}, sp.name
                 FROM purchases p JOIN suppliers sp ON sp.supplier_id = p.supplier_id
                 WHERE (?1 IS NULL OR p.supplier_id = ?1)
                   AND (?2 IS NULL OR instr(lower(p.fabric_type), lower(?2)) > 0)
                   AND (?3 IS NULL OR instr(lower(p.fabric_code), lower(?3)) > 0)
                   AND (?4 IS NULL OR p.date >= ?4)
                   AND (?5 IS NULL OR p.date < ?5)
                   AND (?6 IS NULL
                        OR instr(lower(p.fabric_type), lower(?6)) > 0
                        OR instr(lower(coalesce(p.fabric_code, '')), lower(?6)) > 0
                        OR instr(lower(coalesce(p.composition, '')), lower(?6)) > 0
                        OR instr(lower(sp.name), lower(?6)) > 0)
                 ORDER BY p.date DESC, p.purchase_id DESC"
            );
            let params = [
                optional_int(query.supplier_id.map(SupplierId::get)),
                text_filter(query.fabric_type.as_deref()),
                text_filter(query.fabric_code.as_deref()),
                optional_timestamp(query.range.start()),
                optional_timestamp(query.range.end_exclusive()),
                text_filter(query.search.as_deref()),
            ];
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query(params_from_iter(params.iter()))?;
            collect_rows(rows, |row| {
                Ok(PurchaseLedgerEntry {
                    purchase: row_to_purchase(row)?,
                    supplier_name: row.get(14)?,
                })
            })
        })?;

        let total_quantity: Decimal = entries.iter().map(|e| e.purchase.quantity_meters).sum();
        let total_amount: Decimal = entries.iter().map(|e| e.purchase.total_cost).sum();
        debug!(count = entries.len(), "purchase ledger loaded");
        Ok(PurchaseLedger {
            count: entries.len(),
            total_quantity: round_money(total_quantity),
            total_amount: round_money(total_amount),
            entries,
        })
    }

    pub fn sale_ledger(&self, query: &SaleLedgerQuery) -> LedgerResult<SaleLedger> {
        let entries = self.read(|conn| {
            let sql = format!(
                "SELECT {SALE_COLUMNS}, c.name
                 FROM sales s JOIN customers c ON c.customer_id = s.customer_id
                 WHERE (?1 IS NULL OR s.customer_id = ?1)
                   AND (?2 IS NULL OR s.company_id = ?2)
                   AND (?3 IS NULL OR instr(lower(s.fabric_type), lower(?3)) > 0)
                   AND (?4 IS NULL OR instr(lower(s.fabric_code), lower(?4)) > 0)
                   AND (?5 IS NULL OR s.date >= ?5)
                   AND (?6 IS NULL OR s.date < ?6)
                   AND (?7 IS NULL OR s.apply_tax = ?7)
                   AND (?8 IS NULL
                        OR instr(lower(s.fabric_type), lower(?8)) > 0
                        OR instr(lower(coalesce(s.fabric_code, '')), lower(?8)) > 0
                        OR instr(lower(coalesce(s.composition, '')), lower(?8)) > 0
                        OR instr(lower(c.name), lower(?8)) > 0)
                 ORDER BY s.date DESC, s.sale_id DESC"
            );
            let params = [
                optional_int(query.customer_id.map(CustomerId::get)),
                optional_int(query.company_id.map(CompanyId::get)),
                text_filter(query.fabric_type.as_deref()),
                text_filter(query.fabric_code.as_deref()),
                optional_timestamp(query.range.start()),
                optional_timestamp(query.range.end_exclusive()),
                optional_int(query.apply_tax.map(i64::from)),
                text_filter(query.search.as_deref()),
            ];
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query(params_from_iter(params.iter()))?;
            collect_rows(rows, |row| {
                Ok(SaleLedgerEntry {
                    sale: row_to_sale(row)?,
                    customer_name: row.get(18)?,
                })
            })
        })?;

        let mut ledger = SaleLedger {
            count: entries.len(),
            ..SaleLedger::default()
        };
        for entry in &entries {
            ledger.total_quantity += entry.sale.quantity_meters;
            ledger.subtotal += entry.sale.subtotal();
            ledger.total_tax += entry.sale.tax;
            ledger.total_amount += entry.sale.total_price_with_tax;
        }
        ledger.total_quantity = round_money(ledger.total_quantity);
        ledger.subtotal = round_money(ledger.subtotal);
        ledger.total_tax = round_money(ledger.total_tax);
        ledger.total_amount = round_money(ledger.total_amount);
        ledger.entries = entries;
        debug!(count = ledger.count, "sale ledger loaded");
        Ok(ledger)
    }

    /// Sales volume per customer with at least one sale inside `range`.
    pub fn customer_ledger_summary(&self, range: DateRange) -> LedgerResult<Vec<CounterpartySummary>> {
        let rows = self.read(|conn| {
            let sql = format!(
                "SELECT {SALE_COLUMNS}, c.name, c.contact
                 FROM sales s JOIN customers c ON c.customer_id = s.customer_id
                 WHERE (?1 IS NULL OR s.date >= ?1) AND (?2 IS NULL OR s.date < ?2)"
            );
            let params = [
                optional_timestamp(range.start()),
                optional_timestamp(range.end_exclusive()),
            ];
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query(params_from_iter(params.iter()))?;
            collect_rows(rows, |row| {
                let sale = row_to_sale(row)?;
                Ok((
                    sale.customer_id.get(),
                    row.get::<_, String>(18)?,
                    row.get::<_, Option<String>>(19)?,
                    sale.quantity_meters,
                    sale.total_price_with_tax,
                ))
            })
        })?;
        Ok(summarize(rows))
    }

    /// Purchase volume per supplier with at least one purchase inside `range`.
    pub fn supplier_ledger_summary(&self, range: DateRange) -> LedgerResult<Vec<CounterpartySummary>> {
        let rows = self.read(|conn| {
            let sql = format!(
                "SELECT {PURCHASE_COLUMNS}, sp.name, sp.contact
                 FROM purchases p JOIN suppliers sp ON sp.supplier_id = p.supplier_id
                 WHERE (?1 IS NULL OR p.date >= ?1) AND (?2 IS NULL OR p.date < ?2)"
            );
            let params = [
                optional_timestamp(range.start()),
                optional_timestamp(range.end_exclusive()),
            ];
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query(params_from_iter(params.iter()))?;
            collect_rows(rows, |row| {
                let purchase = row_to_purchase(row)?;
                Ok((
                    purchase.supplier_id.get(),
                    row.get::<_, String>(14)?,
                    row.get::<_, Option<String>>(15)?,
                    purchase.quantity_meters,
                    purchase.total_cost,
                ))
            })
        })?;
        Ok(summarize(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::{NewPurchase, NewSale};
    use chrono::{NaiveDate, TimeZone, Utc};
    use loom_core::FabricIdentity;
    use rust_decimal_macros::dec;
    use tempfile::{tempdir, TempDir};

    fn ledger() -> (TempDir, Ledger) {
        let dir = tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("fabric.db")).unwrap();
        (dir, ledger)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn seeded(ledger: &Ledger) -> (SupplierId, SupplierId, CustomerId) {
        let weavers = ledger.create_supplier("Weavers", None).unwrap().id;
        let silk_house = ledger.create_supplier("Silk House", Some("0211".into())).unwrap().id;
        let customer = ledger.create_customer("Atelier", None).unwrap().id;
        let cotton = FabricIdentity::new("Cotton", Some("C-01".into()), Some("100% cotton".into()));
        let silk = FabricIdentity::new("Silk", None, Some("Mulberry".into()));
        ledger
            .record_purchase(
                NewPurchase::new(weavers, cotton.clone(), dec!(10), dec!(20))
                    .dated(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()),
            )
            .unwrap();
        ledger
            .record_purchase(
                NewPurchase::new(silk_house, silk.clone(), dec!(4), dec!(55.5))
                    .dated(Utc.with_ymd_and_hms(2024, 5, 3, 23, 59, 0).unwrap()),
            )
            .unwrap();
        ledger
            .record_sale(
                NewSale::new(customer, cotton, dec!(4), dec!(30))
                    .dated(Utc.with_ymd_and_hms(2024, 5, 4, 9, 0, 0).unwrap()),
            )
            .unwrap();
        ledger
            .record_sale(
                NewSale::new(customer, silk, dec!(1), dec!(80))
                    .with_tax(false, Decimal::ZERO)
                    .dated(Utc.with_ymd_and_hms(2024, 5, 5, 9, 0, 0).unwrap()),
            )
            .unwrap();
        (weavers, silk_house, customer)
    }

    #[test]
    fn purchase_ledger_filters_and_totals() {
        let (_dir, ledger) = ledger();
        let (weavers, _, _) = seeded(&ledger);

        let all = ledger.purchase_ledger(&PurchaseLedgerQuery::default()).unwrap();
        assert_eq!(all.count, 2);
        assert_eq!(all.entries[0].purchase.fabric.fabric_type, "Silk");
        assert_eq!(all.total_quantity, dec!(14));
        assert_eq!(all.total_amount, dec!(422));

        let by_supplier = ledger
            .purchase_ledger(&PurchaseLedgerQuery::default().with_supplier(weavers))
            .unwrap();
        assert_eq!(by_supplier.count, 1);
        assert_eq!(by_supplier.entries[0].supplier_name, "Weavers");

        let by_name = ledger
            .purchase_ledger(&PurchaseLedgerQuery::default().with_search("silk h"))
            .unwrap();
        assert_eq!(by_name.count, 1);

        let by_code = ledger
            .purchase_ledger(&PurchaseLedgerQuery::default().with_fabric_code("c-0"))
            .unwrap();
        assert_eq!(by_code.count, 1);
    }

    #[test]
    fn date_window_includes_whole_end_day() {
        let (_dir, ledger) = ledger();
        seeded(&ledger);
        let window = DateRange::new(Some(day(2)), Some(day(3)));
        let rows = ledger
            .purchase_ledger(&PurchaseLedgerQuery::default().with_range(window))
            .unwrap();
        assert_eq!(rows.count, 1);
        assert_eq!(rows.entries[0].purchase.fabric.fabric_type, "Silk");
    }

    #[test]
    fn sale_ledger_reports_tax_totals() {
        let (_dir, ledger) = ledger();
        let (_, _, customer) = seeded(&ledger);
        let all = ledger
            .sale_ledger(&SaleLedgerQuery::default().with_customer(customer))
            .unwrap();
        assert_eq!(all.count, 2);
        assert_eq!(all.subtotal, dec!(200));
        assert_eq!(all.total_tax, dec!(21.6));
        assert_eq!(all.total_amount, dec!(221.6));

        let untaxed = ledger.sale_ledger(&SaleLedgerQuery::default().taxed(false)).unwrap();
        assert_eq!(untaxed.count, 1);
        assert_eq!(untaxed.entries[0].sale.fabric.fabric_type, "Silk");

        let by_composition = ledger
            .sale_ledger(&SaleLedgerQuery::default().with_search("MULBERRY"))
            .unwrap();
        assert_eq!(by_composition.count, 1);
    }

    #[test]
    fn counterparty_summaries_group_by_party() {
        let (_dir, ledger) = ledger();
        let (_, silk_house, _) = seeded(&ledger);
        let suppliers = ledger.supplier_ledger_summary(DateRange::all()).unwrap();
        assert_eq!(suppliers.len(), 2);
        let silk = suppliers.iter().find(|s| s.id == silk_house.get()).unwrap();
        assert_eq!(silk.total_amount, dec!(222));
        assert_eq!(silk.contact.as_deref(), Some("0211"));

        let customers = ledger
            .customer_ledger_summary(DateRange::new(Some(day(5)), None))
            .unwrap();
        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].transaction_count, 1);
        assert_eq!(customers[0].total_amount, dec!(80));
    }
}
