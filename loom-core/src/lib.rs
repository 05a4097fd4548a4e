//! Domain types shared by every Loom crate.

pub mod bank;
pub mod fabric;
pub mod ids;
pub mod model;
pub mod payment;
pub mod settlement;
pub mod time;

use rust_decimal::Decimal;

pub use bank::{BankEntryType, BankStatement, StatementStatus};
pub use fabric::{normalize_text, FabricFilter, FabricIdentity, FabricKey};
pub use ids::{CompanyId, CustomerId, PaymentId, PurchaseId, SaleId, StatementId, SupplierId};
pub use model::{Company, Customer, Payment, Purchase, PurchasePayment, Sale, Supplier};
pub use payment::{PaymentMethod, PaymentStatus};
pub use settlement::{derived_status, Settlement, SettlementError};
pub use time::{format_timestamp, storage_precision, DateRange};

/// Decimal places used when presenting money.
pub const MONEY_DP: u32 = 2;

/// Round a monetary amount for presentation (banker's rounding).
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp(MONEY_DP)
}

/// Largest quantity or money amount a single row may carry.
pub const AMOUNT_LIMIT: i64 = 1_000_000_000_000_000;

/// `a * b`, or `None` when an operand or the product exceeds [`AMOUNT_LIMIT`].
pub fn bounded_product(a: Decimal, b: Decimal) -> Option<Decimal> {
    let limit = Decimal::from(AMOUNT_LIMIT);
    if a.abs() > limit || b.abs() > limit {
        return None;
    }
    a.checked_mul(b).filter(|product| product.abs() <= limit)
}
