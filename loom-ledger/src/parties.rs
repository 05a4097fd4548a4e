use chrono::Utc;
use loom_core::{
    format_timestamp, normalize_text, Company, CompanyId, Customer, CustomerId, Supplier,
    SupplierId,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::rows::{collect_rows, row_to_company, row_to_customer, row_to_supplier, COMPANY_COLUMNS};
use crate::{Ledger, LedgerError, LedgerResult};

/// Registration details for a selling company.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewCompany {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub tax_number: Option<String>,
    pub license_number: Option<String>,
    pub website: Option<String>,
}

impl NewCompany {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

fn required_name(kind: &str, name: &str) -> LedgerResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::validation(format!("{kind} name is required")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn supplier_exists(conn: &Connection, id: SupplierId) -> LedgerResult<bool> {
    exists(conn, "SELECT 1 FROM suppliers WHERE supplier_id = ?1", id.get())
}

pub(crate) fn customer_exists(conn: &Connection, id: CustomerId) -> LedgerResult<bool> {
    exists(conn, "SELECT 1 FROM customers WHERE customer_id = ?1", id.get())
}

pub(crate) fn company_exists(conn: &Connection, id: CompanyId) -> LedgerResult<bool> {
    exists(conn, "SELECT 1 FROM companies WHERE company_id = ?1", id.get())
}

fn exists(conn: &Connection, sql: &str, id: i64) -> LedgerResult<bool> {
    Ok(conn
        .query_row(sql, params![id], |_| Ok(()))
        .optional()?
        .is_some())
}

fn count_references(conn: &Connection, sql: &str, id: i64) -> LedgerResult<i64> {
    Ok(conn.query_row(sql, params![id], |row| row.get(0))?)
}

impl Ledger {
    pub fn create_company(&self, company: NewCompany) -> LedgerResult<Company> {
        let name = required_name("company", &company.name)?;
        let created_at = Utc::now();
        let id = self.write(|tx| {
            tx.execute(
                "INSERT INTO companies (
                    company_name, address, phone, email, tax_number, license_number, website, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    name,
                    normalize_text(company.address.clone()),
                    normalize_text(company.phone.clone()),
                    normalize_text(company.email.clone()),
                    normalize_text(company.tax_number.clone()),
                    normalize_text(company.license_number.clone()),
                    normalize_text(company.website.clone()),
                    format_timestamp(created_at),
                ],
            )?;
            Ok(CompanyId(tx.last_insert_rowid()))
        })?;
        info!(company_id = %id, name = %name, "company registered");
        self.company(id)
    }

    pub fn company(&self, id: CompanyId) -> LedgerResult<Company> {
        self.read(|conn| {
            let sql = format!("SELECT {COMPANY_COLUMNS} FROM companies WHERE company_id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![id.get()])?;
            match rows.next()? {
                Some(row) => row_to_company(row),
                None => Err(LedgerError::not_found("company", id)),
            }
        })
    }

    pub fn companies(&self) -> LedgerResult<Vec<Company>> {
        self.read(|conn| {
            let sql = format!("SELECT {COMPANY_COLUMNS} FROM companies ORDER BY company_id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query([])?;
            collect_rows(rows, row_to_company)
        })
    }

    /// Delete a company that no sale references.
    pub fn delete_company(&self, id: CompanyId) -> LedgerResult<()> {
        self.write(|tx| {
            let sales = count_references(
                tx,
                "SELECT COUNT(*) FROM sales WHERE company_id = ?1",
                id.get(),
            )?;
            if sales > 0 {
                return Err(LedgerError::Integrity(format!(
                    "cannot delete company {id}: found {sales} related sale records"
                )));
            }
            if tx.execute("DELETE FROM companies WHERE company_id = ?1", params![id.get()])? == 0 {
                return Err(LedgerError::not_found("company", id));
            }
            Ok(())
        })?;
        info!(company_id = %id, "company deleted");
        Ok(())
    }

    pub fn create_supplier(&self, name: &str, contact: Option<String>) -> LedgerResult<Supplier> {
        let name = required_name("supplier", name)?;
        let contact = normalize_text(contact);
        let id = self.write(|tx| {
            tx.execute(
                "INSERT INTO suppliers (name, contact) VALUES (?1, ?2)",
                params![name, contact],
            )?;
            Ok(SupplierId(tx.last_insert_rowid()))
        })?;
        info!(supplier_id = %id, name = %name, "supplier registered");
        Ok(Supplier { id, name, contact })
    }

    pub fn supplier(&self, id: SupplierId) -> LedgerResult<Supplier> {
        self.read(|conn| {
            let mut stmt = conn
                .prepare("SELECT supplier_id, name, contact FROM suppliers WHERE supplier_id = ?1")?;
            let mut rows = stmt.query(params![id.get()])?;
            match rows.next()? {
                Some(row) => row_to_supplier(row),
                None => Err(LedgerError::not_found("supplier", id)),
            }
        })
    }

    pub fn suppliers(&self) -> LedgerResult<Vec<Supplier>> {
        self.read(|conn| {
            let mut stmt =
                conn.prepare("SELECT supplier_id, name, contact FROM suppliers ORDER BY supplier_id")?;
            let rows = stmt.query([])?;
            collect_rows(rows, row_to_supplier)
        })
    }

    /// Delete a supplier that no purchase references.
    pub fn delete_supplier(&self, id: SupplierId) -> LedgerResult<()> {
        self.write(|tx| {
            let purchases = count_references(
                tx,
                "SELECT COUNT(*) FROM purchases WHERE supplier_id = ?1",
                id.get(),
            )?;
            if purchases > 0 {
                return Err(LedgerError::Integrity(format!(
                    "cannot delete supplier {id}: found {purchases} related purchase records"
                )));
            }
            if tx.execute("DELETE FROM suppliers WHERE supplier_id = ?1", params![id.get()])? == 0 {
                return Err(LedgerError::not_found("supplier", id));
            }
            Ok(())
        })?;
        info!(supplier_id = %id, "supplier deleted");
        Ok(())
    }

    pub fn create_customer(&self, name: &str, contact: Option<String>) -> LedgerResult<Customer> {
        let name = required_name("customer", name)?;
        let contact = normalize_text(contact);
        let id = self.write(|tx| {
            tx.execute(
                "INSERT INTO customers (name, contact) VALUES (?1, ?2)",
                params![name, contact],
            )?;
            Ok(CustomerId(tx.last_insert_rowid()))
        })?;
        info!(customer_id = %id, name = %name, "customer registered");
        Ok(Customer { id, name, contact })
    }

    pub fn customer(&self, id: CustomerId) -> LedgerResult<Customer> {
        self.read(|conn| {
            let mut stmt = conn
                .prepare("SELECT customer_id, name, contact FROM customers WHERE customer_id = ?1")?;
            let mut rows = stmt.query(params![id.get()])?;
            match rows.next()? {
                Some(row) => row_to_customer(row),
                None => Err(LedgerError::not_found("customer", id)),
            }
        })
    }

    pub fn customers(&self) -> LedgerResult<Vec<Customer>> {
        self.read(|conn| {
            let mut stmt =
                conn.prepare("SELECT customer_id, name, contact FROM customers ORDER BY customer_id")?;
            let rows = stmt.query([])?;
            collect_rows(rows, row_to_customer)
        })
    }

    /// Delete a customer that no sale references.
    pub fn delete_customer(&self, id: CustomerId) -> LedgerResult<()> {
        self.write(|tx| {
            let sales = count_references(
                tx,
                "SELECT COUNT(*) FROM sales WHERE customer_id = ?1",
                id.get(),
            )?;
            if sales > 0 {
                return Err(LedgerError::Integrity(format!(
                    "cannot delete customer {id}: found {sales} related sale records"
                )));
            }
            if tx.execute("DELETE FROM customers WHERE customer_id = ?1", params![id.get()])? == 0 {
                return Err(LedgerError::not_found("customer", id));
            }
            Ok(())
        })?;
        info!(customer_id = %id, "customer deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn registers_and_lists_counterparties() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("fabric.db")).unwrap();
        let supplier = ledger
            .create_supplier("  Weavers Co ", Some(" ".into()))
            .unwrap();
        assert_eq!(supplier.name, "Weavers Co");
        assert_eq!(supplier.contact, None);
        ledger.create_customer("Tailor", Some("0300".into())).unwrap();
        let company = ledger.create_company(NewCompany::named("Loom Traders")).unwrap();
        assert_eq!(ledger.suppliers().unwrap(), vec![supplier.clone()]);
        assert_eq!(ledger.customers().unwrap().len(), 1);
        assert_eq!(ledger.company(company.id).unwrap().name, "Loom Traders");
        assert!(matches!(
            ledger.create_customer("   ", None),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn delete_missing_counterparty_is_not_found() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("fabric.db")).unwrap();
        assert!(matches!(
            ledger.delete_supplier(SupplierId(9)),
            Err(LedgerError::NotFound { entity: "supplier", id: 9 })
        ));
        let customer = ledger.create_customer("Once", None).unwrap();
        ledger.delete_customer(customer.id).unwrap();
        assert!(ledger.customers().unwrap().is_empty());
    }
}
