use std::thread;

use loom_core::{FabricIdentity, PaymentStatus, Settlement};
use loom_ledger::{Ledger, LedgerError, NewPayment, NewPurchase, NewSale};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::{tempdir, TempDir};

fn fresh_ledger() -> (TempDir, Ledger) {
    let dir = tempdir().unwrap();
    let ledger = Ledger::open(dir.path().join("data").join("fabric.db")).unwrap();
    (dir, ledger)
}

fn lawn() -> FabricIdentity {
    FabricIdentity::new("Lawn", Some("LW-7".into()), Some("cotton".into()))
}

fn assert_balanced(settlement: Settlement) {
    assert!(
        settlement.is_balanced(),
        "paid {} + due {} != total {}",
        settlement.amount_paid,
        settlement.amount_due,
        settlement.total
    );
}

#[test]
fn purchase_then_taxed_sale_values_remaining_stock() {
    let (_dir, ledger) = fresh_ledger();
    let supplier = ledger.create_supplier("Faisal Mills", None).unwrap();
    let customer = ledger.create_customer("Boutique", None).unwrap();

    let purchase = ledger
        .record_purchase(NewPurchase::new(supplier.id, lawn(), dec!(10), dec!(20)))
        .unwrap();
    assert_eq!(purchase.total_cost, dec!(200));
    assert_eq!(purchase.amount_paid, dec!(200));
    assert_eq!(purchase.amount_due, dec!(0));
    assert_eq!(purchase.payment_status, PaymentStatus::Paid);

    let sale = ledger
        .record_sale(NewSale::new(customer.id, lawn(), dec!(4), dec!(30)))
        .unwrap();
    assert_eq!(sale.subtotal(), dec!(120));
    assert_eq!(sale.tax, dec!(21.6));
    assert_eq!(sale.total_price_with_tax, dec!(141.6));

    let summary = ledger.stock_summary(None).unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].balance_in_meters, dec!(6));
    assert_eq!(summary[0].stock_valuation, dec!(120));
    assert_eq!(summary[0].avg_cost_per_meter, dec!(20));
    assert!(summary[0].consistent);

    let pl = ledger.profit_loss().unwrap();
    assert_eq!(pl.profit, dec!(-58.4));
    assert_eq!(ledger.available_fabrics().unwrap().len(), 1);
}

#[test]
fn oversell_is_rejected_without_writing() {
    let (_dir, ledger) = fresh_ledger();
    let supplier = ledger.create_supplier("Faisal Mills", None).unwrap();
    let customer = ledger.create_customer("Boutique", None).unwrap();
    ledger
        .record_purchase(NewPurchase::new(supplier.id, lawn(), dec!(10), dec!(20)))
        .unwrap();

    let err = ledger
        .record_sale(NewSale::new(customer.id, lawn(), dec!(11), dec!(30)))
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientStock { requested, available, .. }
            if requested == dec!(11) && available == dec!(10)
    ));

    ledger
        .record_sale(NewSale::new(customer.id, lawn(), dec!(4), dec!(30)))
        .unwrap();
    let err = ledger
        .record_sale(NewSale::new(customer.id, lawn(), dec!(11), dec!(30)))
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientStock { available, .. } if available == dec!(6)
    ));
    assert_eq!(ledger.stock_summary(None).unwrap()[0].total_sold, dec!(4));
}

#[test]
fn partial_purchase_is_paid_down_to_zero() {
    let (_dir, ledger) = fresh_ledger();
    let supplier = ledger.create_supplier("Faisal Mills", None).unwrap();
    let purchase = ledger
        .record_purchase(
            NewPurchase::new(supplier.id, lawn(), dec!(100), dec!(5))
                .with_payment(PaymentStatus::Partial, Some(dec!(200))),
        )
        .unwrap();
    assert_eq!(purchase.amount_due, dec!(300));
    assert_eq!(purchase.payment_status, PaymentStatus::Partial);

    let first = ledger
        .record_purchase_payment(purchase.id, NewPayment::new(dec!(100)))
        .unwrap();
    assert_eq!(first.settlement.amount_paid, dec!(300));
    assert_eq!(first.settlement.amount_due, dec!(200));
    assert_eq!(first.settlement.status, PaymentStatus::Partial);

    let second = ledger
        .record_purchase_payment(purchase.id, NewPayment::new(dec!(200)))
        .unwrap();
    assert_eq!(second.settlement.amount_due, dec!(0));
    assert_eq!(second.settlement.status, PaymentStatus::Paid);

    let err = ledger
        .record_purchase_payment(purchase.id, NewPayment::new(dec!(1)))
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert_balanced(ledger.purchase(purchase.id).unwrap().settlement());
    assert!(ledger.pending_purchase_payments(None).unwrap().is_empty());
}

#[test]
fn fifo_lots_value_the_newest_remaining_meters() {
    let (_dir, ledger) = fresh_ledger();
    let supplier = ledger.create_supplier("Faisal Mills", None).unwrap();
    let customer = ledger.create_customer("Boutique", None).unwrap();
    let day = |d| chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2024, 2, d, 8, 0, 0).unwrap();

    ledger
        .record_purchase(NewPurchase::new(supplier.id, lawn(), dec!(5), dec!(10)).dated(day(1)))
        .unwrap();
    ledger
        .record_purchase(NewPurchase::new(supplier.id, lawn(), dec!(5), dec!(20)).dated(day(2)))
        .unwrap();
    ledger
        .record_sale(
            NewSale::new(customer.id, lawn(), dec!(7), dec!(25))
                .with_tax(false, Decimal::ZERO)
                .dated(day(3)),
        )
        .unwrap();

    let line = &ledger.stock_summary(Some("lw-7")).unwrap()[0];
    assert_eq!(line.balance_in_meters, dec!(3));
    assert_eq!(line.stock_valuation, dec!(60));
    assert_eq!(line.avg_cost_per_meter, dec!(20));

    let report = ledger.valuation_report().unwrap();
    assert_eq!(report.fabrics.len(), 1);
    assert_eq!(report.fabrics[0].lots.len(), 1);
    assert_eq!(report.fabrics[0].lots[0].remaining, dec!(3));
    assert_eq!(report.total_valuation, dec!(60));

    assert_eq!(ledger.stock_summary(None).unwrap(), ledger.stock_summary(None).unwrap());
}

#[test]
fn sale_status_follows_amount_paid() {
    let (_dir, ledger) = fresh_ledger();
    let supplier = ledger.create_supplier("Faisal Mills", None).unwrap();
    let customer = ledger.create_customer("Boutique", None).unwrap();
    ledger
        .record_purchase(NewPurchase::new(supplier.id, lawn(), dec!(50), dec!(10)))
        .unwrap();

    let sale = ledger
        .record_sale(
            NewSale::new(customer.id, lawn(), dec!(10), dec!(10))
                .with_tax(false, Decimal::ZERO)
                .with_payment(PaymentStatus::Paid, Some(dec!(40))),
        )
        .unwrap();
    assert_eq!(sale.payment_status, PaymentStatus::Partial);
    assert_eq!(sale.amount_due, dec!(60));

    let receipt = ledger
        .record_payment(sale.id, NewPayment::new(dec!(60)))
        .unwrap();
    assert_eq!(receipt.settlement.status, PaymentStatus::Paid);
    assert_balanced(ledger.sale(sale.id).unwrap().settlement());
}

#[test]
fn concurrent_installments_are_not_lost() {
    let (_dir, ledger) = fresh_ledger();
    let supplier = ledger.create_supplier("Faisal Mills", None).unwrap();
    let purchase = ledger
        .record_purchase(
            NewPurchase::new(supplier.id, lawn(), dec!(100), dec!(10))
                .with_payment(PaymentStatus::Pending, None),
        )
        .unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let ledger = ledger.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    ledger
                        .record_purchase_payment(purchase.id, NewPayment::new(dec!(10)))
                        .unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let stored = ledger.purchase(purchase.id).unwrap();
    assert_eq!(stored.amount_paid, dec!(200));
    assert_eq!(stored.amount_due, dec!(800));
    assert_eq!(stored.payment_status, PaymentStatus::Partial);
    assert_eq!(ledger.payments_for_purchase(purchase.id).unwrap().len(), 20);
}

#[test]
fn referenced_counterparties_cannot_be_deleted() {
    let (_dir, ledger) = fresh_ledger();
    let supplier = ledger.create_supplier("Faisal Mills", None).unwrap();
    ledger
        .record_purchase(NewPurchase::new(supplier.id, lawn(), dec!(1), dec!(1)))
        .unwrap();
    assert!(matches!(
        ledger.delete_supplier(supplier.id),
        Err(LedgerError::Integrity(_))
    ));
}
