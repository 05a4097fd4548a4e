//! Write paths for purchases and sales.

use chrono::{DateTime, Utc};
use loom_core::{
    bounded_product, format_timestamp, normalize_text, round_money, storage_precision, CompanyId, CustomerId, FabricFilter,
    FabricIdentity, PaymentMethod, PaymentStatus, Purchase, PurchaseId, Sale, SaleId, Settlement,
    SupplierId,
};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::parties::{company_exists, customer_exists, supplier_exists};
use crate::rows::{collect_rows, row_to_purchase, row_to_sale, PURCHASE_COLUMNS, SALE_COLUMNS};
use crate::{Ledger, LedgerError, LedgerResult};

/// Tax rate applied to sales when the caller does not override it.
pub const DEFAULT_TAX_RATE: Decimal = Decimal::from_parts(18, 0, 0, false, 2);

/// Input for [`Ledger::record_purchase`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewPurchase {
    pub supplier_id: SupplierId,
    pub fabric: FabricIdentity,
    pub quantity_meters: Decimal,
    pub price_per_meter: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    /// Required (and only read) when `payment_status` is partial.
    pub amount_paid: Option<Decimal>,
    pub payment_notes: Option<String>,
    /// Defaults to the time of recording.
    pub date: Option<DateTime<Utc>>,
}

impl NewPurchase {
    /// A fully paid cash purchase.
    pub fn new(
        supplier_id: SupplierId,
        fabric: FabricIdentity,
        quantity_meters: Decimal,
        price_per_meter: Decimal,
    ) -> Self {
        Self {
            supplier_id,
            fabric,
            quantity_meters,
            price_per_meter,
            payment_method: PaymentMethod::Cash,
            payment_status: PaymentStatus::Paid,
            amount_paid: None,
            payment_notes: None,
            date: None,
        }
    }

    pub fn with_payment(mut self, status: PaymentStatus, amount_paid: Option<Decimal>) -> Self {
        self.payment_status = status;
        self.amount_paid = amount_paid;
        self
    }

    pub fn with_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = method;
        self
    }

    pub fn dated(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }
}

/// Input for [`Ledger::record_sale`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewSale {
    pub company_id: Option<CompanyId>,
    pub customer_id: CustomerId,
    pub fabric: FabricIdentity,
    pub quantity_meters: Decimal,
    pub price_per_meter: Decimal,
    pub apply_tax: bool,
    /// Fraction, `0.18` for 18%.
    pub tax_rate: Decimal,
    pub payment_method: PaymentMethod,
    /// Only a hint: the stored status is derived from `amount_paid`.
    pub payment_status: PaymentStatus,
    pub amount_paid: Option<Decimal>,
    pub payment_notes: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

impl NewSale {
    /// A fully paid cash sale taxed at [`DEFAULT_TAX_RATE`].
    pub fn new(
        customer_id: CustomerId,
        fabric: FabricIdentity,
        quantity_meters: Decimal,
        price_per_meter: Decimal,
    ) -> Self {
        Self {
            company_id: None,
            customer_id,
            fabric,
            quantity_meters,
            price_per_meter,
            apply_tax: true,
            tax_rate: DEFAULT_TAX_RATE,
            payment_method: PaymentMethod::Cash,
            payment_status: PaymentStatus::Paid,
            amount_paid: None,
            payment_notes: None,
            date: None,
        }
    }

    pub fn for_company(mut self, company_id: CompanyId) -> Self {
        self.company_id = Some(company_id);
        self
    }

    pub fn with_tax(mut self, apply_tax: bool, tax_rate: Decimal) -> Self {
        self.apply_tax = apply_tax;
        self.tax_rate = tax_rate;
        self
    }

    pub fn with_payment(mut self, status: PaymentStatus, amount_paid: Option<Decimal>) -> Self {
        self.payment_status = status;
        self.amount_paid = amount_paid;
        self
    }

    pub fn with_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = method;
        self
    }

    pub fn dated(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }
}

/// Tax and totals of a sale line.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SaleAmounts {
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl SaleAmounts {
    pub fn compute(
        quantity: Decimal,
        price: Decimal,
        apply_tax: bool,
        tax_rate: Decimal,
    ) -> LedgerResult<Self> {
        let subtotal =
            bounded_product(quantity, price).ok_or_else(|| amount_too_large("subtotal"))?;
        if !apply_tax {
            return Ok(Self {
                subtotal,
                tax_rate: Decimal::ZERO,
                tax: Decimal::ZERO,
                total: subtotal,
            });
        }
        let tax = bounded_product(subtotal, tax_rate)
            .map(round_money)
            .ok_or_else(|| amount_too_large("tax"))?;
        let total = subtotal
            .checked_add(tax)
            .map(round_money)
            .ok_or_else(|| amount_too_large("total"))?;
        Ok(Self {
            subtotal,
            tax_rate,
            tax,
            total,
        })
    }
}

fn validate_fabric(fabric: FabricIdentity) -> LedgerResult<FabricIdentity> {
    let fabric = FabricIdentity::new(fabric.fabric_type, fabric.fabric_code, fabric.composition);
    if fabric.fabric_type.is_empty() {
        return Err(LedgerError::validation("fabric_type is required"));
    }
    Ok(fabric)
}

fn amount_too_large(field: &str) -> LedgerError {
    LedgerError::validation(format!("{field} is too large to record"))
}

fn validate_positive(field: &str, value: Decimal) -> LedgerResult<()> {
    if value <= Decimal::ZERO {
        return Err(LedgerError::validation(format!(
            "{field} must be greater than 0 (got {value})"
        )));
    }
    Ok(())
}

/// Meters still in stock for everything `filter` matches.
pub(crate) fn available_quantity(conn: &Connection, filter: &FabricFilter<'_>) -> LedgerResult<Decimal> {
    let purchases = {
        let sql = format!("SELECT {PURCHASE_COLUMNS} FROM purchases p WHERE p.fabric_type = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query(params![filter.fabric_type])?;
        collect_rows(rows, row_to_purchase)?
    };
    let sales = {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales s WHERE s.fabric_type = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query(params![filter.fabric_type])?;
        collect_rows(rows, row_to_sale)?
    };
    // neither the (type, code) bucket nor the whole type may go negative
    let mut scopes = vec![filter.clone()];
    if filter.composition.is_some() {
        scopes.push(FabricFilter {
            composition: None,
            ..filter.clone()
        });
    }
    if filter.fabric_code.is_some() || filter.composition.is_some() {
        scopes.push(FabricFilter {
            fabric_code: None,
            composition: None,
            ..filter.clone()
        });
    }

    let mut available: Option<Decimal> = None;
    for scope in &scopes {
        let purchased = matching_quantity(
            purchases.iter().map(|row| (&row.fabric, row.quantity_meters)),
            scope,
        )?;
        let sold = matching_quantity(sales.iter().map(|row| (&row.fabric, row.quantity_meters)), scope)?;
        let remaining = purchased
            .checked_sub(sold)
            .ok_or_else(|| LedgerError::InvalidState("stock totals overflowed".into()))?;
        available = Some(available.map_or(remaining, |current| current.min(remaining)));
    }
    Ok(available.unwrap_or(Decimal::ZERO))
}

fn matching_quantity<'r>(
    rows: impl Iterator<Item = (&'r FabricIdentity, Decimal)>,
    filter: &FabricFilter<'_>,
) -> LedgerResult<Decimal> {
    rows.filter(|(fabric, _)| filter.matches(fabric))
        .try_fold(Decimal::ZERO, |total, (_, quantity)| total.checked_add(quantity))
        .ok_or_else(|| LedgerError::InvalidState("stock totals overflowed".into()))
}

impl Ledger {
    /// Record a purchase lot. The declared payment status is trusted.
    pub fn record_purchase(&self, purchase: NewPurchase) -> LedgerResult<Purchase> {
        let fabric = validate_fabric(purchase.fabric)?;
        validate_positive("quantity_meters", purchase.quantity_meters)?;
        validate_positive("price_per_meter", purchase.price_per_meter)?;
        let total_cost = bounded_product(purchase.quantity_meters, purchase.price_per_meter)
            .ok_or_else(|| amount_too_large("total_cost"))?;
        let settlement =
            Settlement::declared(total_cost, purchase.payment_status, purchase.amount_paid)?;
        let date = storage_precision(purchase.date.unwrap_or_else(Utc::now));
        let payment_notes = normalize_text(purchase.payment_notes);

        let id = self.write(|tx| {
            if !supplier_exists(tx, purchase.supplier_id)? {
                return Err(LedgerError::not_found("supplier", purchase.supplier_id));
            }
            tx.execute(
                "INSERT INTO purchases (
                    supplier_id, date, fabric_type, fabric_code, composition, quantity_meters,
                    price_per_meter, total_cost, payment_method, payment_status, amount_paid,
                    amount_due, payment_notes
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    purchase.supplier_id.get(),
                    format_timestamp(date),
                    fabric.fabric_type,
                    fabric.fabric_code,
                    fabric.composition,
                    purchase.quantity_meters.to_string(),
                    purchase.price_per_meter.to_string(),
                    total_cost.to_string(),
                    purchase.payment_method.as_str(),
                    settlement.status.as_str(),
                    settlement.amount_paid.to_string(),
                    settlement.amount_due.to_string(),
                    payment_notes,
                ],
            )?;
            Ok(PurchaseId(tx.last_insert_rowid()))
        })?;

        info!(
            purchase_id = %id,
            supplier_id = %purchase.supplier_id,
            fabric = %fabric,
            quantity = %purchase.quantity_meters,
            total_cost = %total_cost,
            status = %settlement.status,
            "purchase recorded"
        );
        Ok(Purchase {
            id,
            supplier_id: purchase.supplier_id,
            date,
            fabric,
            quantity_meters: purchase.quantity_meters,
            price_per_meter: purchase.price_per_meter,
            total_cost,
            payment_method: purchase.payment_method,
            payment_status: settlement.status,
            amount_paid: settlement.amount_paid,
            amount_due: settlement.amount_due,
            payment_notes,
        })
    }

    /// Record a sale after checking stock. The stored payment status is
    /// recomputed from the amount paid.
    pub fn record_sale(&self, sale: NewSale) -> LedgerResult<Sale> {
        let fabric = validate_fabric(sale.fabric)?;
        validate_positive("quantity_meters", sale.quantity_meters)?;
        validate_positive("price_per_meter", sale.price_per_meter)?;
        if sale.apply_tax && (sale.tax_rate < Decimal::ZERO || sale.tax_rate > Decimal::ONE) {
            return Err(LedgerError::validation(format!(
                "tax_rate must be a fraction between 0 and 1 (got {})",
                sale.tax_rate
            )));
        }
        let amounts = SaleAmounts::compute(
            sale.quantity_meters,
            sale.price_per_meter,
            sale.apply_tax,
            sale.tax_rate,
        )?;
        let settlement = Settlement::tendered(amounts.total, sale.payment_status, sale.amount_paid)?;
        let date = storage_precision(sale.date.unwrap_or_else(Utc::now));
        let payment_notes = normalize_text(sale.payment_notes);

        let id = self.write(|tx| {
            if !customer_exists(tx, sale.customer_id)? {
                return Err(LedgerError::not_found("customer", sale.customer_id));
            }
            if let Some(company_id) = sale.company_id {
                if !company_exists(tx, company_id)? {
                    return Err(LedgerError::not_found("company", company_id));
                }
            }
            let available = available_quantity(tx, &FabricFilter::from_identity(&fabric))?;
            if sale.quantity_meters > available {
                warn!(
                    fabric = %fabric,
                    requested = %sale.quantity_meters,
                    available = %available,
                    "sale rejected for insufficient stock"
                );
                return Err(LedgerError::InsufficientStock {
                    fabric: fabric.to_string(),
                    requested: sale.quantity_meters,
                    available,
                });
            }
            tx.execute(
                "INSERT INTO sales (
                    company_id, customer_id, date, fabric_type, fabric_code, composition,
                    quantity_meters, price_per_meter, apply_tax, tax_rate, tax,
                    total_price_with_tax, payment_method, payment_status, amount_paid,
                    amount_due, payment_notes
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    sale.company_id.map(CompanyId::get),
                    sale.customer_id.get(),
                    format_timestamp(date),
                    fabric.fabric_type,
                    fabric.fabric_code,
                    fabric.composition,
                    sale.quantity_meters.to_string(),
                    sale.price_per_meter.to_string(),
                    sale.apply_tax,
                    amounts.tax_rate.to_string(),
                    amounts.tax.to_string(),
                    amounts.total.to_string(),
                    sale.payment_method.as_str(),
                    settlement.status.as_str(),
                    settlement.amount_paid.to_string(),
                    settlement.amount_due.to_string(),
                    payment_notes,
                ],
            )?;
            Ok(SaleId(tx.last_insert_rowid()))
        })?;

        info!(
            sale_id = %id,
            customer_id = %sale.customer_id,
            fabric = %fabric,
            quantity = %sale.quantity_meters,
            total = %amounts.total,
            status = %settlement.status,
            "sale recorded"
        );
        Ok(Sale {
            id,
            company_id: sale.company_id,
            customer_id: sale.customer_id,
            date,
            fabric,
            quantity_meters: sale.quantity_meters,
            price_per_meter: sale.price_per_meter,
            apply_tax: sale.apply_tax,
            tax_rate: amounts.tax_rate,
            tax: amounts.tax,
            total_price_with_tax: amounts.total,
            payment_method: sale.payment_method,
            payment_status: settlement.status,
            amount_paid: settlement.amount_paid,
            amount_due: settlement.amount_due,
            payment_notes,
        })
    }

    /// Meters available for a prospective sale of `fabric`.
    pub fn available_stock(&self, fabric: &FabricIdentity) -> LedgerResult<Decimal> {
        self.read(|conn| available_quantity(conn, &FabricFilter::from_identity(fabric)))
    }

    pub fn purchase(&self, id: PurchaseId) -> LedgerResult<Purchase> {
        self.read(|conn| load_purchase(conn, id))
    }

    pub fn sale(&self, id: SaleId) -> LedgerResult<Sale> {
        self.read(|conn| load_sale(conn, id))
    }
}

pub(crate) fn load_purchase(conn: &Connection, id: PurchaseId) -> LedgerResult<Purchase> {
    let sql = format!("SELECT {PURCHASE_COLUMNS} FROM purchases p WHERE p.purchase_id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![id.get()])?;
    match rows.next()? {
        Some(row) => row_to_purchase(row),
        None => Err(LedgerError::not_found("purchase", id)),
    }
}

pub(crate) fn load_sale(conn: &Connection, id: SaleId) -> LedgerResult<Sale> {
    let sql = format!("SELECT {SALE_COLUMNS} FROM sales s WHERE s.sale_id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![id.get()])?;
    match rows.next()? {
        Some(row) => row_to_sale(row),
        None => Err(LedgerError::not_found("sale", id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::{tempdir, TempDir};

    fn ledger() -> (TempDir, Ledger) {
        let dir = tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("fabric.db")).unwrap();
        (dir, ledger)
    }

    fn cotton() -> FabricIdentity {
        FabricIdentity::new("Cotton", Some("C-1".into()), None)
    }

    #[test]
    fn default_tax_rate_is_eighteen_percent() {
        assert_eq!(DEFAULT_TAX_RATE, dec!(0.18));
    }

    #[test]
    fn sale_amounts_round_tax() {
        let taxed = SaleAmounts::compute(dec!(4), dec!(30), true, dec!(0.18)).unwrap();
        assert_eq!(taxed.subtotal, dec!(120));
        assert_eq!(taxed.tax, dec!(21.6));
        assert_eq!(taxed.total, dec!(141.6));
        let odd = SaleAmounts::compute(dec!(3.3), dec!(7.77), true, dec!(0.17)).unwrap();
        assert_eq!(odd.tax, dec!(4.36));
        assert_eq!(odd.total, dec!(30.00));
        let untaxed = SaleAmounts::compute(dec!(2), dec!(10), false, dec!(0.18)).unwrap();
        assert_eq!(untaxed.tax_rate, dec!(0));
        assert_eq!(untaxed.total, dec!(20));
    }

    #[test]
    fn purchase_requires_known_supplier_and_positive_amounts() {
        let (_dir, ledger) = ledger();
        let missing = ledger.record_purchase(NewPurchase::new(SupplierId(7), cotton(), dec!(1), dec!(1)));
        assert!(matches!(missing, Err(LedgerError::NotFound { entity: "supplier", .. })));

        let supplier = ledger.create_supplier("Mill", None).unwrap();
        for (qty, price) in [(dec!(0), dec!(1)), (dec!(1), dec!(-2))] {
            let result = ledger.record_purchase(NewPurchase::new(supplier.id, cotton(), qty, price));
            assert!(matches!(result, Err(LedgerError::Validation(_))));
        }
        let blank = FabricIdentity::new("  ", None, None);
        let result = ledger.record_purchase(NewPurchase::new(supplier.id, blank, dec!(1), dec!(1)));
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[test]
    fn purchase_roundtrips_through_storage() {
        let (_dir, ledger) = ledger();
        let supplier = ledger.create_supplier("Mill", None).unwrap();
        let recorded = ledger
            .record_purchase(
                NewPurchase::new(supplier.id, cotton(), dec!(12.5), dec!(8.4))
                    .with_payment(PaymentStatus::Pending, None)
                    .with_method(PaymentMethod::Credit),
            )
            .unwrap();
        let stored = ledger.purchase(recorded.id).unwrap();
        assert_eq!(stored.total_cost, dec!(105.0));
        assert_eq!(stored.amount_due, dec!(105.0));
        assert_eq!(stored.payment_method, PaymentMethod::Credit);
        assert_eq!(stored.date, recorded.date);
        assert_eq!(stored, recorded);
    }

    #[test]
    fn stock_check_honours_code_and_composition_only_when_given() {
        let (_dir, ledger) = ledger();
        let supplier = ledger.create_supplier("Mill", None).unwrap();
        let customer = ledger.create_customer("Shop", None).unwrap();
        ledger
            .record_purchase(NewPurchase::new(
                supplier.id,
                FabricIdentity::new("Silk", Some("S1".into()), Some("pure".into())),
                dec!(5),
                dec!(10),
            ))
            .unwrap();
        ledger
            .record_purchase(NewPurchase::new(
                supplier.id,
                FabricIdentity::new("Silk", Some("S2".into()), None),
                dec!(3),
                dec!(10),
            ))
            .unwrap();
        let any_silk = FabricIdentity::new("Silk", None, None);
        assert_eq!(ledger.available_stock(&any_silk).unwrap(), dec!(8));
        let s2 = FabricIdentity::new("Silk", Some("S2".into()), None);
        assert_eq!(ledger.available_stock(&s2).unwrap(), dec!(3));

        let err = ledger
            .record_sale(NewSale::new(customer.id, s2.clone(), dec!(4), dec!(20)))
            .unwrap_err();
        match err {
            LedgerError::InsufficientStock { available, requested, .. } => {
                assert_eq!(available, dec!(3));
                assert_eq!(requested, dec!(4));
            }
            other => panic!("unexpected error {other:?}"),
        }
        ledger
            .record_sale(NewSale::new(customer.id, any_silk.clone(), dec!(6), dec!(20)))
            .unwrap();
        assert_eq!(ledger.available_stock(&any_silk).unwrap(), dec!(2));
    }

    #[test]
    fn sale_requires_known_company_and_sane_tax() {
        let (_dir, ledger) = ledger();
        let supplier = ledger.create_supplier("Mill", None).unwrap();
        let customer = ledger.create_customer("Shop", None).unwrap();
        ledger
            .record_purchase(NewPurchase::new(supplier.id, cotton(), dec!(10), dec!(5)))
            .unwrap();
        let ghost_company = ledger.record_sale(
            NewSale::new(customer.id, cotton(), dec!(1), dec!(9)).for_company(CompanyId(3)),
        );
        assert!(matches!(ghost_company, Err(LedgerError::NotFound { entity: "company", .. })));
        let bad_tax = ledger.record_sale(
            NewSale::new(customer.id, cotton(), dec!(1), dec!(9)).with_tax(true, dec!(18)),
        );
        assert!(matches!(bad_tax, Err(LedgerError::Validation(_))));
    }

    #[test]
    fn sale_status_follows_amount_paid() {
        let (_dir, ledger) = ledger();
        let supplier = ledger.create_supplier("Mill", None).unwrap();
        let customer = ledger.create_customer("Shop", None).unwrap();
        ledger
            .record_purchase(NewPurchase::new(supplier.id, cotton(), dec!(10), dec!(5)))
            .unwrap();
        let sale = ledger
            .record_sale(
                NewSale::new(customer.id, cotton(), dec!(2), dec!(50))
                    .with_tax(false, dec!(0))
                    .with_payment(PaymentStatus::Paid, Some(dec!(30))),
            )
            .unwrap();
        assert_eq!(sale.payment_status, PaymentStatus::Partial);
        assert_eq!(sale.amount_due, dec!(70));
        assert_eq!(ledger.sale(sale.id).unwrap(), sale);
    }

    #[test]
    fn oversized_amounts_are_rejected_without_writing() {
        let (_dir, ledger) = ledger();
        let supplier = ledger.create_supplier("Mill", None).unwrap();
        let customer = ledger.create_customer("Shop", None).unwrap();

        let err = ledger
            .record_purchase(NewPurchase::new(supplier.id, cotton(), Decimal::MAX, dec!(2)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(ledger.purchase(PurchaseId(1)).is_err());

        ledger
            .record_purchase(NewPurchase::new(supplier.id, cotton(), dec!(10), dec!(1)))
            .unwrap();
        let err = ledger
            .record_sale(NewSale::new(customer.id, cotton(), dec!(1), Decimal::MAX))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(SaleAmounts::compute(Decimal::MAX, dec!(2), false, dec!(0)).is_err());
        assert_eq!(ledger.available_stock(&cotton()).unwrap(), dec!(10));
    }

    #[test]
    fn narrower_and_wider_sales_cannot_oversell_one_bucket() {
        let (_dir, ledger) = ledger();
        let supplier = ledger.create_supplier("Mill", None).unwrap();
        let customer = ledger.create_customer("Shop", None).unwrap();
        let pure = FabricIdentity::new("Silk", Some("S1".into()), Some("pure".into()));
        let s1 = FabricIdentity::new("Silk", Some("S1".into()), None);
        ledger
            .record_purchase(NewPurchase::new(supplier.id, pure.clone(), dec!(5), dec!(10)))
            .unwrap();
        ledger
            .record_sale(NewSale::new(customer.id, s1, dec!(5), dec!(20)))
            .unwrap();

        let err = ledger
            .record_sale(NewSale::new(customer.id, pure.clone(), dec!(5), dec!(20)))
            .unwrap_err();
        match err {
            LedgerError::InsufficientStock { available, .. } => assert_eq!(available, dec!(0)),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(ledger.available_stock(&pure).unwrap(), dec!(0));
        let summary = ledger.stock_summary(None).unwrap();
        assert!(summary.iter().all(|line| line.balance_in_meters >= Decimal::ZERO));
    }
}
