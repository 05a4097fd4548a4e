//! Stock balances and FIFO valuation.
//!
//! Everything here is a pure function of the purchase and sale rows it is
//! given; the [`Ledger`] methods at the bottom only load rows and delegate.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use loom_core::{round_money, FabricIdentity, FabricKey, Purchase, PurchaseId, Sale};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::rows::{collect_rows, row_to_purchase, row_to_sale, PURCHASE_COLUMNS, SALE_COLUMNS};
use crate::{Ledger, LedgerResult};

/// Portion of a purchase lot that has not been sold yet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LotRemaining {
    pub purchase_id: PurchaseId,
    pub date: DateTime<Utc>,
    pub remaining: Decimal,
    pub price_per_meter: Decimal,
    pub value: Decimal,
}

/// Outcome of allocating sold meters against lots, oldest first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FifoValuation {
    pub lots: Vec<LotRemaining>,
    pub remaining: Decimal,
    pub valuation: Decimal,
    /// Sold meters no lot could absorb. Non-zero only for oversold history.
    pub unallocated: Decimal,
}

impl FifoValuation {
    pub fn average_cost(&self) -> Decimal {
        if self.remaining > Decimal::ZERO {
            self.valuation / self.remaining
        } else {
            Decimal::ZERO
        }
    }
}

/// Walk `lots` in the order given, consuming `total_sold` meters from the front.
///
/// Callers pass lots sorted by purchase date ascending.
pub fn allocate_fifo<'a>(
    lots: impl IntoIterator<Item = &'a Purchase>,
    total_sold: Decimal,
) -> FifoValuation {
    let mut to_deduct = total_sold;
    let mut result = FifoValuation::default();
    for lot in lots {
        let remaining = if to_deduct >= lot.quantity_meters {
            to_deduct -= lot.quantity_meters;
            Decimal::ZERO
        } else {
            let left = lot.quantity_meters - to_deduct;
            to_deduct = Decimal::ZERO;
            left
        };
        if remaining > Decimal::ZERO {
            let value = remaining * lot.price_per_meter;
            result.remaining += remaining;
            result.valuation += value;
            result.lots.push(LotRemaining {
                purchase_id: lot.id,
                date: lot.date,
                remaining,
                price_per_meter: lot.price_per_meter,
                value,
            });
        }
    }
    result.unallocated = to_deduct;
    result
}

/// One row of the stock summary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StockLine {
    #[serde(flatten)]
    pub fabric: FabricIdentity,
    pub total_purchased: Decimal,
    pub total_sold: Decimal,
    pub balance_in_meters: Decimal,
    pub avg_cost_per_meter: Decimal,
    pub stock_valuation: Decimal,
    /// `false` when the running balance disagrees with the meters left in lots.
    pub consistent: bool,
}

struct Bucket<'a> {
    lots: Vec<&'a Purchase>,
    sold: Decimal,
}

fn bucket_rows<'a>(purchases: &'a [Purchase], sales: &[Sale]) -> HashMap<FabricKey, Bucket<'a>> {
    let mut buckets: HashMap<FabricKey, Bucket<'a>> = HashMap::new();
    for purchase in purchases {
        buckets
            .entry(purchase.fabric.key())
            .or_insert_with(|| Bucket {
                lots: Vec::new(),
                sold: Decimal::ZERO,
            })
            .lots
            .push(purchase);
    }
    for sale in sales {
        buckets
            .entry(sale.fabric.key())
            .or_insert_with(|| Bucket {
                lots: Vec::new(),
                sold: Decimal::ZERO,
            })
            .sold += sale.quantity_meters;
    }
    for bucket in buckets.values_mut() {
        bucket.lots.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
    }
    buckets
}

/// Per-identity stock summary.
///
/// Emits one line for every distinct (type, code, composition) seen in either
/// history. Sums and lots are grouped by [`FabricKey`], so identities that only
/// differ in composition report the same figures.
pub fn summarize_stock(
    purchases: &[Purchase],
    sales: &[Sale],
    search: Option<&str>,
) -> Vec<StockLine> {
    let identities: BTreeSet<&FabricIdentity> = purchases
        .iter()
        .map(|row| &row.fabric)
        .chain(sales.iter().map(|row| &row.fabric))
        .collect();
    let needle = search.map(str::trim).filter(|text| !text.is_empty());
    let buckets = bucket_rows(purchases, sales);

    let mut lines = Vec::new();
    for identity in identities {
        if let Some(needle) = needle {
            if !identity.matches_search(needle) {
                continue;
            }
        }
        let Some(bucket) = buckets.get(&identity.key()) else {
            continue;
        };
        let total_purchased: Decimal = bucket.lots.iter().map(|lot| lot.quantity_meters).sum();
        let fifo = allocate_fifo(bucket.lots.iter().copied(), bucket.sold);
        let balance = total_purchased - bucket.sold;
        let consistent = balance == fifo.remaining;
        if !consistent {
            warn!(
                fabric = %identity,
                balance = %balance,
                lot_remaining = %fifo.remaining,
                unallocated = %fifo.unallocated,
                "stock balance disagrees with FIFO lots"
            );
        }
        lines.push(StockLine {
            fabric: identity.clone(),
            total_purchased,
            total_sold: bucket.sold,
            balance_in_meters: balance,
            avg_cost_per_meter: round_money(fifo.average_cost()),
            stock_valuation: round_money(fifo.valuation),
            consistent,
        });
    }
    lines
}

/// Top-line profit: sales revenue (tax included) minus purchase cost.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfitLoss {
    pub total_purchased_cost: Decimal,
    pub total_sales_revenue: Decimal,
    pub profit: Decimal,
}

pub fn profit_loss(purchases: &[Purchase], sales: &[Sale]) -> ProfitLoss {
    let total_purchased_cost: Decimal = purchases.iter().map(|row| row.total_cost).sum();
    let total_sales_revenue: Decimal = sales.iter().map(|row| row.total_price_with_tax).sum();
    ProfitLoss {
        total_purchased_cost,
        total_sales_revenue,
        profit: total_sales_revenue - total_purchased_cost,
    }
}

/// Lot-level valuation of one stock bucket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FabricValuation {
    #[serde(flatten)]
    pub fabric: FabricIdentity,
    pub lots: Vec<LotRemaining>,
    pub total_valuation: Decimal,
}

/// Stock on hand valued lot by lot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValuationReport {
    pub fabrics: Vec<FabricValuation>,
    pub total_meters: Decimal,
    pub total_valuation: Decimal,
}

pub fn valuation_report(purchases: &[Purchase], sales: &[Sale]) -> ValuationReport {
    let buckets = bucket_rows(purchases, sales);
    let mut keyed: BTreeMap<FabricKey, &Bucket<'_>> = BTreeMap::new();
    for (key, bucket) in &buckets {
        keyed.insert(key.clone(), bucket);
    }
    let mut report = ValuationReport::default();
    for bucket in keyed.values() {
        let fifo = allocate_fifo(bucket.lots.iter().copied(), bucket.sold);
        if fifo.lots.is_empty() {
            continue;
        }
        let lots: Vec<LotRemaining> = fifo
            .lots
            .into_iter()
            .map(|lot| LotRemaining {
                value: round_money(lot.value),
                ..lot
            })
            .collect();
        let total: Decimal = lots.iter().map(|lot| lot.value).sum();
        // Lots are non-empty here, so the first lot names the bucket.
        let fabric = bucket
            .lots
            .first()
            .map(|lot| lot.fabric.clone())
            .unwrap_or_default();
        report.total_meters += fifo.remaining;
        report.total_valuation += total;
        report.fabrics.push(FabricValuation {
            fabric,
            lots,
            total_valuation: round_money(total),
        });
    }
    report.total_valuation = round_money(report.total_valuation);
    report
}

pub(crate) fn load_all_purchases(conn: &Connection) -> LedgerResult<Vec<Purchase>> {
    let sql = format!("SELECT {PURCHASE_COLUMNS} FROM purchases p ORDER BY p.date ASC, p.purchase_id ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query([])?;
    collect_rows(rows, row_to_purchase)
}

pub(crate) fn load_all_sales(conn: &Connection) -> LedgerResult<Vec<Sale>> {
    let sql = format!("SELECT {SALE_COLUMNS} FROM sales s ORDER BY s.date ASC, s.sale_id ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query([])?;
    collect_rows(rows, row_to_sale)
}

impl Ledger {
    /// Stock summary, optionally narrowed by a case-insensitive search.
    pub fn stock_summary(&self, search: Option<&str>) -> LedgerResult<Vec<StockLine>> {
        let (purchases, sales) = self.read(|conn| Ok((load_all_purchases(conn)?, load_all_sales(conn)?)))?;
        let lines = summarize_stock(&purchases, &sales, search);
        debug!(lines = lines.len(), search = ?search, "stock summary computed");
        Ok(lines)
    }

    /// Stock lines with a positive balance.
    pub fn available_fabrics(&self) -> LedgerResult<Vec<StockLine>> {
        Ok(self
            .stock_summary(None)?
            .into_iter()
            .filter(|line| line.balance_in_meters > Decimal::ZERO)
            .collect())
    }

    pub fn profit_loss(&self) -> LedgerResult<ProfitLoss> {
        self.read(|conn| Ok(profit_loss(&load_all_purchases(conn)?, &load_all_sales(conn)?)))
    }

    pub fn valuation_report(&self) -> LedgerResult<ValuationReport> {
        self.read(|conn| Ok(valuation_report(&load_all_purchases(conn)?, &load_all_sales(conn)?)))
    }
}
