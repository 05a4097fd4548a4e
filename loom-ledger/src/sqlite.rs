use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::debug;

use crate::LedgerResult;

pub(crate) const LEDGER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS companies (
    company_id INTEGER PRIMARY KEY AUTOINCREMENT,
    company_name TEXT NOT NULL,
    address TEXT,
    phone TEXT,
    email TEXT,
    tax_number TEXT,
    license_number TEXT,
    website TEXT,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS suppliers (
    supplier_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    contact TEXT
);
CREATE TABLE IF NOT EXISTS customers (
    customer_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    contact TEXT
);
CREATE TABLE IF NOT EXISTS purchases (
    purchase_id INTEGER PRIMARY KEY AUTOINCREMENT,
    supplier_id INTEGER NOT NULL REFERENCES suppliers(supplier_id) ON DELETE RESTRICT,
    date TEXT NOT NULL,
    fabric_type TEXT NOT NULL,
    fabric_code TEXT,
    composition TEXT,
    quantity_meters TEXT NOT NULL,
    price_per_meter TEXT NOT NULL,
    total_cost TEXT NOT NULL,
    payment_method TEXT NOT NULL DEFAULT 'cash',
    payment_status TEXT NOT NULL DEFAULT 'paid'
        CHECK (payment_status IN ('paid', 'pending', 'partial')),
    amount_paid TEXT NOT NULL DEFAULT '0',
    amount_due TEXT NOT NULL DEFAULT '0',
    payment_notes TEXT
);
CREATE INDEX IF NOT EXISTS purchases_idx_fabric ON purchases(fabric_type, fabric_code);
CREATE INDEX IF NOT EXISTS purchases_idx_supplier ON purchases(supplier_id);
CREATE TABLE IF NOT EXISTS sales (
    sale_id INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id INTEGER REFERENCES companies(company_id) ON DELETE RESTRICT,
    customer_id INTEGER NOT NULL REFERENCES customers(customer_id) ON DELETE RESTRICT,
    date TEXT NOT NULL,
    fabric_type TEXT NOT NULL,
    fabric_code TEXT,
    composition TEXT,
    quantity_meters TEXT NOT NULL,
    price_per_meter TEXT NOT NULL,
    apply_tax INTEGER NOT NULL DEFAULT 1,
    tax_rate TEXT NOT NULL DEFAULT '0',
    tax TEXT NOT NULL,
    total_price_with_tax TEXT NOT NULL,
    payment_method TEXT NOT NULL DEFAULT 'cash',
    payment_status TEXT NOT NULL DEFAULT 'paid'
        CHECK (payment_status IN ('paid', 'pending', 'partial')),
    amount_paid TEXT NOT NULL DEFAULT '0',
    amount_due TEXT NOT NULL DEFAULT '0',
    payment_notes TEXT
);
CREATE INDEX IF NOT EXISTS sales_idx_fabric ON sales(fabric_type, fabric_code);
CREATE INDEX IF NOT EXISTS sales_idx_customer ON sales(customer_id);
CREATE TABLE IF NOT EXISTS payments (
    payment_id INTEGER PRIMARY KEY AUTOINCREMENT,
    sale_id INTEGER NOT NULL REFERENCES sales(sale_id) ON DELETE CASCADE,
    payment_date TEXT NOT NULL,
    amount TEXT NOT NULL,
    payment_method TEXT NOT NULL,
    reference_number TEXT,
    notes TEXT,
    recorded_by TEXT
);
CREATE INDEX IF NOT EXISTS payments_idx_sale ON payments(sale_id);
CREATE TABLE IF NOT EXISTS purchase_payments (
    payment_id INTEGER PRIMARY KEY AUTOINCREMENT,
    purchase_id INTEGER NOT NULL REFERENCES purchases(purchase_id) ON DELETE CASCADE,
    payment_date TEXT NOT NULL,
    amount TEXT NOT NULL,
    payment_method TEXT NOT NULL,
    reference_number TEXT,
    notes TEXT,
    recorded_by TEXT
);
CREATE INDEX IF NOT EXISTS purchase_payments_idx_purchase ON purchase_payments(purchase_id);
CREATE TABLE IF NOT EXISTS bank_statements (
    statement_id INTEGER PRIMARY KEY AUTOINCREMENT,
    transaction_date TEXT NOT NULL,
    transaction_type TEXT NOT NULL CHECK (transaction_type IN ('credit', 'debit')),
    amount TEXT NOT NULL,
    description TEXT NOT NULL,
    bank_account TEXT,
    reference_number TEXT,
    related_sale_id INTEGER REFERENCES sales(sale_id) ON DELETE SET NULL,
    related_purchase_id INTEGER REFERENCES purchases(purchase_id) ON DELETE SET NULL,
    payment_method TEXT,
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'cleared', 'failed')),
    reconciliation_notes TEXT,
    recorded_by TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS bank_statements_idx_date ON bank_statements(transaction_date);
"#;

/// Tables that must exist for a file to be accepted as a Loom database.
pub(crate) const CORE_TABLES: [&str; 5] = ["companies", "suppliers", "customers", "purchases", "sales"];

/// SQLite-backed ledger: the single entry point for recording and querying.
#[derive(Clone, Debug)]
pub struct Ledger {
    path: PathBuf,
    busy_timeout: Duration,
}

impl Ledger {
    /// Open (or create) the ledger stored at `path`.
    pub fn open(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        Self::with_busy_timeout(path, Duration::from_secs(5))
    }

    /// Open the ledger, waiting up to `busy_timeout` for competing writers.
    pub fn with_busy_timeout(path: impl Into<PathBuf>, busy_timeout: Duration) -> LedgerResult<Self> {
        let ledger = Self {
            path: path.into(),
            busy_timeout,
        };
        ledger.initialize_schema()?;
        debug!(path = %ledger.path.display(), "ledger ready");
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn initialize_schema(&self) -> LedgerResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(LEDGER_SCHEMA)?;
        Ok(())
    }

    pub(crate) fn connect(&self) -> LedgerResult<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;",
        )?;
        Ok(conn)
    }

    /// Run `op` against a read-only view of the ledger.
    pub(crate) fn read<T>(
        &self,
        op: impl FnOnce(&Connection) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let conn = self.connect()?;
        op(&conn)
    }

    /// Run `op` as one unit of work. The write lock is taken before the first
    /// read so the read-compute-write sequence cannot interleave with another
    /// writer; an error rolls everything back.
    pub(crate) fn write<T>(
        &self,
        op: impl FnOnce(&Transaction<'_>) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = op(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_schema_and_parent_dirs() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("fabric.db");
        let ledger = Ledger::open(&db_path).unwrap();
        assert!(db_path.exists());
        let tables: Vec<String> = ledger
            .read(|conn| {
                let mut stmt =
                    conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .unwrap();
        for table in CORE_TABLES {
            assert!(tables.iter().any(|name| name == table), "missing {table}");
        }
        // reopening an existing file is a no-op
        Ledger::open(&db_path).unwrap();
    }

    #[test]
    fn failed_unit_of_work_rolls_back() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("fabric.db")).unwrap();
        let result: LedgerResult<()> = ledger.write(|tx| {
            tx.execute("INSERT INTO suppliers (name) VALUES ('Ghost')", [])?;
            Err(crate::LedgerError::validation("abort"))
        });
        assert!(result.is_err());
        let count: i64 = ledger
            .read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM suppliers", [], |row| row.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }
}
