use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use anyhow::Result;
use assert_cmd::prelude::*;
use rust_decimal::Decimal;
use serde_json::Value;
use tempfile::tempdir;

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..")
}

fn loom(db: &Path) -> Command {
    let binary = assert_cmd::cargo::cargo_bin!("loom-cli");
    let mut cmd = Command::new(binary);
    cmd.current_dir(workspace_root());
    cmd.env_remove("RUST_LOG");
    cmd.args(["--env", "default", "--db", db.to_str().unwrap()]);
    cmd
}

fn json_output(db: &Path, args: &[&str]) -> Result<Value> {
    let output = loom(db).arg("--json").args(args).output()?;
    assert!(
        output.status.success(),
        "command {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(serde_json::from_slice(&output.stdout)?)
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(text) => Decimal::from_str(text).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

fn seed(db: &Path) -> Result<()> {
    let supplier = json_output(db, &["supplier", "add", "--name", "Textile Co"])?;
    assert_eq!(supplier["id"], 1);
    let customer = json_output(db, &["customer", "add", "--name", "ABC Fashion"])?;
    assert_eq!(customer["id"], 1);
    json_output(
        db,
        &[
            "purchase", "record", "--supplier", "1", "--fabric-type", "Cotton", "--fabric-code",
            "C-1", "--quantity", "100", "--price", "2",
        ],
    )?;
    Ok(())
}

#[test]
fn purchase_and_sale_flow_into_stock_summary() -> Result<()> {
    let temp = tempdir()?;
    let db = temp.path().join("fabric.db");
    seed(&db)?;

    let sale = json_output(
        &db,
        &[
            "sale", "record", "--customer", "1", "--fabric-type", "Cotton", "--fabric-code", "C-1",
            "--quantity", "20", "--price", "3", "--no-tax",
        ],
    )?;
    assert_eq!(decimal(&sale["total_price_with_tax"]), Decimal::from(60));
    assert_eq!(sale["payment_status"], "paid");

    let stock = json_output(&db, &["stock", "summary"])?;
    let lines = stock.as_array().unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["fabric_type"], "Cotton");
    assert_eq!(decimal(&lines[0]["balance_in_meters"]), Decimal::from(80));
    assert_eq!(decimal(&lines[0]["stock_valuation"]), Decimal::from(160));
    Ok(())
}

#[test]
fn overselling_exits_with_user_error() -> Result<()> {
    let temp = tempdir()?;
    let db = temp.path().join("fabric.db");
    seed(&db)?;

    let output = loom(&db)
        .args([
            "sale", "record", "--customer", "1", "--fabric-type", "Cotton", "--fabric-code", "C-1",
            "--quantity", "150", "--price", "3",
        ])
        .output()?;
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("insufficient stock"));

    let available = json_output(&db, &["stock", "available"])?;
    assert_eq!(decimal(&available[0]["balance_in_meters"]), Decimal::from(100));
    Ok(())
}

#[test]
fn pending_sale_is_settled_by_installments() -> Result<()> {
    let temp = tempdir()?;
    let db = temp.path().join("fabric.db");
    seed(&db)?;

    let sale = json_output(
        &db,
        &[
            "sale", "record", "--customer", "1", "--fabric-type", "Cotton", "--fabric-code", "C-1",
            "--quantity", "10", "--price", "5", "--no-tax", "--status", "pending",
        ],
    )?;
    assert_eq!(sale["payment_status"], "pending");
    let id = sale["id"].to_string();

    let receipt = json_output(&db, &["sale", "pay", &id, "--amount", "20"])?;
    assert_eq!(receipt["settlement"]["status"], "partial");
    let receipt = json_output(&db, &["sale", "pay", &id, "--amount", "30", "--method", "bank"])?;
    assert_eq!(receipt["settlement"]["status"], "paid");

    loom(&db)
        .args(["sale", "pay", &id, "--amount", "1"])
        .assert()
        .failure();

    let payments = json_output(&db, &["sale", "payments", &id])?;
    assert_eq!(payments.as_array().unwrap().len(), 2);
    Ok(())
}

#[test]
fn purchases_export_to_csv() -> Result<()> {
    let temp = tempdir()?;
    let db = temp.path().join("fabric.db");
    seed(&db)?;

    let csv_path = temp.path().join("out").join("purchases.csv");
    loom(&db)
        .args(["export", "purchases", "--output", csv_path.to_str().unwrap()])
        .assert()
        .success();

    let contents = fs::read_to_string(&csv_path)?;
    let mut lines = contents.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("purchase_id,date,supplier,fabric_type"));
    let row = lines.next().unwrap();
    assert!(row.contains("Textile Co"));
    assert!(row.contains("Cotton"));
    assert!(lines.next().is_none());
    Ok(())
}

#[test]
fn rejects_unknown_payment_method() -> Result<()> {
    let temp = tempdir()?;
    let db = temp.path().join("fabric.db");
    seed(&db)?;

    loom(&db)
        .args([
            "purchase", "record", "--supplier", "1", "--fabric-type", "Silk", "--quantity", "5",
            "--price", "9", "--method", "barter",
        ])
        .assert()
        .failure();
    Ok(())
}
