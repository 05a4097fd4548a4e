//! Whole-file export and import of the ledger database.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{Connection, OpenFlags, Row};
use tracing::{info, warn};

use crate::rows::{
    row_to_company, row_to_customer, row_to_payment, row_to_purchase, row_to_purchase_payment,
    row_to_sale, row_to_statement, row_to_supplier, COMPANY_COLUMNS, PAYMENT_COLUMNS,
    PURCHASE_COLUMNS, PURCHASE_PAYMENT_COLUMNS, SALE_COLUMNS, STATEMENT_COLUMNS,
};
use crate::sqlite::CORE_TABLES;
use crate::{Ledger, LedgerError, LedgerResult};

fn integrity_check(conn: &Connection) -> LedgerResult<()> {
    let verdict: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    if verdict != "ok" {
        return Err(LedgerError::InvalidState(format!(
            "database integrity check failed: {verdict}"
        )));
    }
    Ok(())
}

/// Decimal and timestamp columns; the ledger declares and stores both as TEXT.
const TEXT_COLUMNS: &[(&str, &[&str])] = &[
    ("companies", &["created_at"]),
    (
        "purchases",
        &["date", "quantity_meters", "price_per_meter", "total_cost", "amount_paid", "amount_due"],
    ),
    (
        "sales",
        &[
            "date",
            "quantity_meters",
            "price_per_meter",
            "tax_rate",
            "tax",
            "total_price_with_tax",
            "amount_paid",
            "amount_due",
        ],
    ),
    ("payments", &["payment_date", "amount"]),
    ("purchase_payments", &["payment_date", "amount"]),
    ("bank_statements", &["transaction_date", "amount", "created_at"]),
];

fn table_exists(conn: &Connection, table: &str) -> LedgerResult<bool> {
    let found: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(found > 0)
}

fn missing_tables(conn: &Connection) -> LedgerResult<Vec<&'static str>> {
    let mut missing = Vec::new();
    for table in CORE_TABLES {
        if !table_exists(conn, table)? {
            missing.push(table);
        }
    }
    Ok(missing)
}

fn declared_type(conn: &Connection, table: &str, column: &str) -> LedgerResult<Option<String>> {
    let mut stmt = conn.prepare("SELECT type FROM pragma_table_info(?1) WHERE name = ?2")?;
    let mut rows = stmt.query([table, column])?;
    let declared = match rows.next()? {
        Some(row) => Some(row.get::<_, String>(0)?),
        None => None,
    };
    Ok(declared)
}

/// Columns whose declared type would make SQLite coerce ledger text values.
fn foreign_columns(conn: &Connection) -> LedgerResult<Vec<String>> {
    let mut foreign = Vec::new();
    for (table, columns) in TEXT_COLUMNS {
        if !table_exists(conn, table)? {
            continue;
        }
        for column in *columns {
            match declared_type(conn, table, column)? {
                Some(declared) if declared.eq_ignore_ascii_case("TEXT") => {}
                Some(declared) => foreign.push(format!("{table}.{column} ({declared})")),
                None => foreign.push(format!("{table}.{column} (missing)")),
            }
        }
    }
    Ok(foreign)
}

fn decode_table<T>(
    conn: &Connection,
    table: &str,
    sql: &str,
    decode: impl Fn(&Row<'_>) -> LedgerResult<T>,
) -> LedgerResult<()> {
    if !table_exists(conn, table)? {
        return Ok(());
    }
    let checked = (|| -> LedgerResult<()> {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            decode(row)?;
        }
        Ok(())
    })();
    checked.map_err(|err| {
        LedgerError::validation(format!("table {table} is not in ledger format: {err}"))
    })
}

/// Every stored row has to read back through the ledger's own decoders.
fn decode_rows(conn: &Connection) -> LedgerResult<()> {
    decode_table(
        conn,
        "companies",
        &format!("SELECT {COMPANY_COLUMNS} FROM companies"),
        row_to_company,
    )?;
    decode_table(
        conn,
        "suppliers",
        "SELECT supplier_id, name, contact FROM suppliers",
        row_to_supplier,
    )?;
    decode_table(
        conn,
        "customers",
        "SELECT customer_id, name, contact FROM customers",
        row_to_customer,
    )?;
    decode_table(
        conn,
        "purchases",
        &format!("SELECT {PURCHASE_COLUMNS} FROM purchases p"),
        row_to_purchase,
    )?;
    decode_table(conn, "sales", &format!("SELECT {SALE_COLUMNS} FROM sales s"), row_to_sale)?;
    decode_table(
        conn,
        "payments",
        &format!("SELECT {PAYMENT_COLUMNS} FROM payments pm"),
        row_to_payment,
    )?;
    decode_table(
        conn,
        "purchase_payments",
        &format!("SELECT {PURCHASE_PAYMENT_COLUMNS} FROM purchase_payments pp"),
        row_to_purchase_payment,
    )?;
    decode_table(
        conn,
        "bank_statements",
        &format!("SELECT {STATEMENT_COLUMNS} FROM bank_statements"),
        row_to_statement,
    )
}

/// Reject files that are corrupt or were not written by this ledger.
fn verify_ledger_file(path: &Path) -> LedgerResult<()> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    integrity_check(&conn)?;
    let missing = missing_tables(&conn)?;
    if !missing.is_empty() {
        return Err(LedgerError::validation(format!(
            "not a ledger database, missing tables: {}",
            missing.join(", ")
        )));
    }
    let foreign = foreign_columns(&conn)?;
    if !foreign.is_empty() {
        return Err(LedgerError::validation(format!(
            "not a ledger database, columns not stored as text: {}",
            foreign.join(", ")
        )));
    }
    decode_rows(&conn)
}

fn backup_path(path: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ledger.db".to_string());
    path.with_file_name(format!("{name}.backup_{stamp}"))
}

fn remove_sidecars(path: &Path) -> LedgerResult<()> {
    for suffix in ["-wal", "-shm"] {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        let sidecar = PathBuf::from(sidecar);
        if sidecar.exists() {
            fs::remove_file(&sidecar)?;
        }
    }
    Ok(())
}

impl Ledger {
    /// Copy a consistent snapshot of the database to `destination`.
    pub fn export_database(&self, destination: impl AsRef<Path>) -> LedgerResult<u64> {
        let destination = destination.as_ref();
        {
            let conn = self.connect()?;
            integrity_check(&conn)?;
            // fold the WAL into the main file so a plain copy is complete
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        }
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let bytes = fs::copy(self.path(), destination)?;
        info!(destination = %destination.display(), bytes, "database exported");
        Ok(bytes)
    }

    /// Replace the database with the file at `source`.
    ///
    /// The current file is kept next to the database as a timestamped backup
    /// and put back if the imported copy fails verification. No other writer
    /// may hold the database open while this runs.
    pub fn import_database(&self, source: impl AsRef<Path>) -> LedgerResult<PathBuf> {
        let source = source.as_ref();
        if !source.is_file() {
            return Err(LedgerError::validation(format!(
                "import source {} does not exist",
                source.display()
            )));
        }
        verify_ledger_file(source)?;

        {
            let conn = self.connect()?;
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        }
        let backup = backup_path(self.path());
        fs::copy(self.path(), &backup)?;
        remove_sidecars(self.path())?;
        fs::copy(source, self.path())?;

        if let Err(err) = verify_ledger_file(self.path()) {
            warn!(error = %err, backup = %backup.display(), "imported database failed verification, restoring backup");
            remove_sidecars(self.path())?;
            fs::copy(&backup, self.path())?;
            return Err(err);
        }
        self.initialize_schema()?;
        info!(
            source = %source.display(),
            backup = %backup.display(),
            "database imported"
        );
        Ok(backup)
    }
}
