//! Bank statement ledger: manual entries, balances and reconciliation.

use chrono::{DateTime, Utc};
use loom_core::{
    format_timestamp, normalize_text, AMOUNT_LIMIT, round_money, storage_precision, BankEntryType,
    BankStatement, DateRange, PaymentMethod, PurchaseId, SaleId, StatementId, StatementStatus,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::recorder::{load_purchase, load_sale};
use crate::rows::{
    collect_rows, optional_text, optional_timestamp, row_to_statement, STATEMENT_COLUMNS,
};
use crate::{Ledger, LedgerError, LedgerResult};

/// Input for [`Ledger::add_bank_statement`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewBankStatement {
    pub entry_type: BankEntryType,
    pub amount: Decimal,
    pub description: String,
    pub account: Option<String>,
    pub reference: Option<String>,
    pub related_sale_id: Option<SaleId>,
    pub related_purchase_id: Option<PurchaseId>,
    pub payment_method: Option<PaymentMethod>,
    pub status: StatementStatus,
    pub recorded_by: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

impl NewBankStatement {
    /// A cleared manual entry.
    pub fn new(entry_type: BankEntryType, amount: Decimal, description: impl Into<String>) -> Self {
        Self {
            entry_type,
            amount,
            description: description.into(),
            account: None,
            reference: None,
            related_sale_id: None,
            related_purchase_id: None,
            payment_method: None,
            status: StatementStatus::Cleared,
            recorded_by: None,
            date: None,
        }
    }

    pub fn on_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn for_sale(mut self, sale_id: SaleId) -> Self {
        self.related_sale_id = Some(sale_id);
        self
    }

    pub fn for_purchase(mut self, purchase_id: PurchaseId) -> Self {
        self.related_purchase_id = Some(purchase_id);
        self
    }

    pub fn with_status(mut self, status: StatementStatus) -> Self {
        self.status = status;
        self
    }

    pub fn dated(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }
}

/// Filter describing which statement lines to list.
#[derive(Clone, Debug, Default)]
pub struct BankStatementQuery {
    pub entry_type: Option<BankEntryType>,
    pub status: Option<StatementStatus>,
    pub range: DateRange,
    pub account: Option<String>,
}

impl BankStatementQuery {
    pub fn with_type(mut self, entry_type: BankEntryType) -> Self {
        self.entry_type = Some(entry_type);
        self
    }

    pub fn with_status(mut self, status: StatementStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BankSummary {
    pub opening_balance: Decimal,
    pub total_credit: Decimal,
    pub total_debit: Decimal,
    pub closing_balance: Decimal,
    pub statements: Vec<BankStatement>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTally {
    pub status: StatementStatus,
    pub count: u64,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationStatus {
    pub tallies: Vec<StatusTally>,
    pub pending: Vec<BankStatement>,
}

fn query_statements(conn: &Connection, query: &BankStatementQuery) -> LedgerResult<Vec<BankStatement>> {
    let sql = format!(
        "SELECT {STATEMENT_COLUMNS} FROM bank_statements
         WHERE (?1 IS NULL OR transaction_type = ?1)
           AND (?2 IS NULL OR status = ?2)
           AND (?3 IS NULL OR transaction_date >= ?3)
           AND (?4 IS NULL OR transaction_date < ?4)
           AND (?5 IS NULL OR bank_account = ?5)
         ORDER BY transaction_date DESC, statement_id DESC"
    );
    let params: [Value; 5] = [
        optional_text(query.entry_type.map(BankEntryType::as_str)),
        optional_text(query.status.map(StatementStatus::as_str)),
        optional_timestamp(query.range.start()),
        optional_timestamp(query.range.end_exclusive()),
        optional_text(query.account.as_deref()),
    ];
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query(params_from_iter(params.iter()))?;
    collect_rows(rows, row_to_statement)
}

fn load_statement(conn: &Connection, id: StatementId) -> LedgerResult<BankStatement> {
    let sql = format!("SELECT {STATEMENT_COLUMNS} FROM bank_statements WHERE statement_id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![id.get()])?;
    match rows.next()? {
        Some(row) => row_to_statement(row),
        None => Err(LedgerError::not_found("bank statement", id)),
    }
}

/// Net movement of the lines that reach the balance.
fn net_balance(lines: &[BankStatement]) -> Decimal {
    lines
        .iter()
        .filter(|line| line.status.counts_toward_balance())
        .map(BankStatement::signed_amount)
        .sum()
}

impl Ledger {
    pub fn add_bank_statement(&self, entry: NewBankStatement) -> LedgerResult<BankStatement> {
        if entry.amount <= Decimal::ZERO {
            return Err(LedgerError::validation(format!(
                "amount must be greater than 0 (got {})",
                entry.amount
            )));
        }
        if entry.amount > Decimal::from(AMOUNT_LIMIT) {
            return Err(LedgerError::validation(format!(
                "amount is too large to record (got {})",
                entry.amount
            )));
        }
        let description = entry.description.trim().to_string();
        if description.is_empty() {
            return Err(LedgerError::validation("description is required"));
        }
        let date = storage_precision(entry.date.unwrap_or_else(Utc::now));
        let created_at = storage_precision(Utc::now());
        let id = self.write(|tx| {
            if let Some(sale_id) = entry.related_sale_id {
                load_sale(tx, sale_id)?;
            }
            if let Some(purchase_id) = entry.related_purchase_id {
                load_purchase(tx, purchase_id)?;
            }
            tx.execute(
                "INSERT INTO bank_statements (
                    transaction_date, transaction_type, amount, description, bank_account,
                    reference_number, related_sale_id, related_purchase_id, payment_method, status,
                    recorded_by, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    format_timestamp(date),
                    entry.entry_type.as_str(),
                    entry.amount.to_string(),
                    description,
                    normalize_text(entry.account.clone()),
                    normalize_text(entry.reference.clone()),
                    entry.related_sale_id.map(SaleId::get),
                    entry.related_purchase_id.map(PurchaseId::get),
                    entry.payment_method.map(PaymentMethod::as_str),
                    entry.status.as_str(),
                    normalize_text(entry.recorded_by.clone()),
                    format_timestamp(created_at),
                ],
            )?;
            Ok(StatementId(tx.last_insert_rowid()))
        })?;
        info!(
            statement_id = %id,
            entry_type = %entry.entry_type,
            amount = %entry.amount,
            status = %entry.status,
            "bank statement recorded"
        );
        self.bank_statement(id)
    }

    /// Move a statement line to `status`, optionally replacing its notes.
    pub fn update_bank_statement(
        &self,
        id: StatementId,
        status: StatementStatus,
        notes: Option<String>,
    ) -> LedgerResult<BankStatement> {
        let notes = normalize_text(notes);
        self.write(|tx| {
            let changed = tx.execute(
                "UPDATE bank_statements
                 SET status = ?1, reconciliation_notes = coalesce(?2, reconciliation_notes)
                 WHERE statement_id = ?3",
                params![status.as_str(), notes, id.get()],
            )?;
            if changed == 0 {
                return Err(LedgerError::not_found("bank statement", id));
            }
            Ok(())
        })?;
        info!(statement_id = %id, status = %status, "bank statement updated");
        self.bank_statement(id)
    }

    pub fn bank_statement(&self, id: StatementId) -> LedgerResult<BankStatement> {
        self.read(|conn| load_statement(conn, id))
    }

    /// Statement lines matching `query`, newest first.
    pub fn bank_statements(&self, query: &BankStatementQuery) -> LedgerResult<Vec<BankStatement>> {
        self.read(|conn| query_statements(conn, query))
    }

    /// Distinct account names seen on statement lines.
    pub fn bank_accounts(&self) -> LedgerResult<Vec<String>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT bank_account FROM bank_statements
                 WHERE bank_account IS NOT NULL ORDER BY bank_account",
            )?;
            let rows = stmt.query([])?;
            collect_rows(rows, |row| Ok(row.get(0)?))
        })
    }

    /// Balances over `range`. Failed lines are excluded from every figure.
    pub fn bank_summary(&self, range: DateRange, account: Option<&str>) -> LedgerResult<BankSummary> {
        let (before, statements) = self.read(|conn| {
            let before = match range.from {
                Some(from) => {
                    let earlier = BankStatementQuery {
                        range: DateRange::new(None, from.pred_opt()),
                        account: account.map(str::to_string),
                        ..BankStatementQuery::default()
                    };
                    query_statements(conn, &earlier)?
                }
                None => Vec::new(),
            };
            let window = BankStatementQuery {
                range,
                account: account.map(str::to_string),
                ..BankStatementQuery::default()
            };
            Ok((before, query_statements(conn, &window)?))
        })?;

        let opening_balance = net_balance(&before);
        let (mut total_credit, mut total_debit) = (Decimal::ZERO, Decimal::ZERO);
        for line in statements.iter().filter(|line| line.status.counts_toward_balance()) {
            match line.entry_type {
                BankEntryType::Credit => total_credit += line.amount,
                BankEntryType::Debit => total_debit += line.amount,
            }
        }
        Ok(BankSummary {
            opening_balance: round_money(opening_balance),
            total_credit: round_money(total_credit),
            total_debit: round_money(total_debit),
            closing_balance: round_money(opening_balance + total_credit - total_debit),
            statements,
        })
    }

    /// Per-status counts and amounts over `range`, plus the lines still pending.
    pub fn reconciliation_status(&self, range: DateRange) -> LedgerResult<ReconciliationStatus> {
        let statements = self.bank_statements(&BankStatementQuery::default().with_range(range))?;
        let tallies = StatementStatus::ALL
            .iter()
            .map(|status| {
                let lines = statements.iter().filter(|line| line.status == *status);
                let (count, amount) = lines.fold((0u64, Decimal::ZERO), |(count, amount), line| {
                    (count + 1, amount + line.amount)
                });
                StatusTally {
                    status: *status,
                    count,
                    amount: round_money(amount),
                }
            })
            .collect();
        let pending = statements
            .into_iter()
            .filter(|line| line.status == StatementStatus::Pending)
            .collect();
        Ok(ReconciliationStatus { tallies, pending })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal_macros::dec;
    use tempfile::{tempdir, TempDir};

    fn ledger() -> (TempDir, Ledger) {
        let dir = tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("fabric.db")).unwrap();
        (dir, ledger)
    }

    fn on(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn summary_carries_opening_balance_and_skips_failed() {
        let (_dir, ledger) = ledger();
        ledger
            .add_bank_statement(
                NewBankStatement::new(BankEntryType::Credit, dec!(1000), "capital").dated(on(1)),
            )
            .unwrap();
        ledger
            .add_bank_statement(
                NewBankStatement::new(BankEntryType::Debit, dec!(250), "rent").dated(on(2)),
            )
            .unwrap();
        ledger
            .add_bank_statement(
                NewBankStatement::new(BankEntryType::Credit, dec!(400), "sale receipt").dated(on(10)),
            )
            .unwrap();
        ledger
            .add_bank_statement(
                NewBankStatement::new(BankEntryType::Debit, dec!(90), "bounced cheque")
                    .with_status(StatementStatus::Failed)
                    .dated(on(11)),
            )
            .unwrap();

        let june_10 = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let summary = ledger
            .bank_summary(DateRange::new(Some(june_10), None), None)
            .unwrap();
        assert_eq!(summary.opening_balance, dec!(750));
        assert_eq!(summary.total_credit, dec!(400));
        assert_eq!(summary.total_debit, dec!(0));
        assert_eq!(summary.closing_balance, dec!(1150));
        assert_eq!(summary.statements.len(), 2);
    }

    #[test]
    fn reconciliation_tracks_status_changes() {
        let (_dir, ledger) = ledger();
        let line = ledger
            .add_bank_statement(
                NewBankStatement::new(BankEntryType::Credit, dec!(120.5), "transfer in")
                    .on_account("HBL-01")
                    .with_status(StatementStatus::Pending),
            )
            .unwrap();
        let status = ledger.reconciliation_status(DateRange::all()).unwrap();
        assert_eq!(status.pending.len(), 1);
        assert_eq!(status.tallies[0].status, StatementStatus::Pending);
        assert_eq!(status.tallies[0].amount, dec!(120.5));

        let cleared = ledger
            .update_bank_statement(line.id, StatementStatus::Cleared, Some("matched".into()))
            .unwrap();
        assert_eq!(cleared.status, StatementStatus::Cleared);
        assert_eq!(cleared.reconciliation_notes.as_deref(), Some("matched"));
        let status = ledger.reconciliation_status(DateRange::all()).unwrap();
        assert!(status.pending.is_empty());
        assert_eq!(status.tallies[1].count, 1);
        assert_eq!(ledger.bank_accounts().unwrap(), vec!["HBL-01".to_string()]);
    }

    #[test]
    fn rejects_bad_entries() {
        let (_dir, ledger) = ledger();
        assert!(matches!(
            ledger.add_bank_statement(NewBankStatement::new(BankEntryType::Debit, dec!(0), "zero")),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            ledger.add_bank_statement(NewBankStatement::new(BankEntryType::Credit, Decimal::MAX, "huge")),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            ledger.add_bank_statement(
                NewBankStatement::new(BankEntryType::Credit, dec!(5), "orphan").for_sale(SaleId(7))
            ),
            Err(LedgerError::NotFound { entity: "sale", id: 7 })
        ));
        assert!(matches!(
            ledger.update_bank_statement(StatementId(3), StatementStatus::Failed, None),
            Err(LedgerError::NotFound { .. })
        ));
    }
}
