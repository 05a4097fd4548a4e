//! Paid/due bookkeeping shared by purchases, sales and payment recording.
//!
//! Every mutation of `amount_paid`, `amount_due` and `payment_status` goes
//! through [`Settlement`], so `amount_paid + amount_due == total` holds for
//! every value this module hands out.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::PaymentStatus;

/// Reasons a settlement transition is refused.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum SettlementError {
    #[error("for partial payment, amount_paid must be provided")]
    MissingPartialAmount,
    #[error("for partial payment, amount_paid must be greater than 0 and less than the total {total} (got {amount})")]
    PartialOutOfRange { amount: Decimal, total: Decimal },
    #[error("amount paid cannot be negative (got {0})")]
    NegativeTender(Decimal),
    #[error("payment amount must be greater than 0 (got {0})")]
    NonPositivePayment(Decimal),
    #[error("payment amount ({amount}) exceeds due amount ({due})")]
    Overpayment { amount: Decimal, due: Decimal },
}

/// Status implied by a paid/due pair.
pub fn derived_status(amount_paid: Decimal, amount_due: Decimal) -> PaymentStatus {
    if amount_due <= Decimal::ZERO {
        PaymentStatus::Paid
    } else if amount_paid > Decimal::ZERO {
        PaymentStatus::Partial
    } else {
        PaymentStatus::Pending
    }
}

/// Monetary settlement state of a single purchase or sale.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub total: Decimal,
    pub amount_paid: Decimal,
    pub amount_due: Decimal,
    pub status: PaymentStatus,
}

impl Settlement {
    /// Rebuild a settlement from persisted columns without validation.
    pub fn from_parts(
        total: Decimal,
        amount_paid: Decimal,
        amount_due: Decimal,
        status: PaymentStatus,
    ) -> Self {
        Self {
            total,
            amount_paid,
            amount_due,
            status,
        }
    }

    /// Purchase rules: the declared status is trusted and the amounts follow it.
    pub fn declared(
        total: Decimal,
        status: PaymentStatus,
        amount_paid: Option<Decimal>,
    ) -> Result<Self, SettlementError> {
        let (paid, due) = match status {
            PaymentStatus::Paid => (total, Decimal::ZERO),
            PaymentStatus::Pending => (Decimal::ZERO, total),
            PaymentStatus::Partial => {
                let amount = amount_paid.ok_or(SettlementError::MissingPartialAmount)?;
                if amount <= Decimal::ZERO || amount >= total {
                    return Err(SettlementError::PartialOutOfRange { amount, total });
                }
                (amount, total - amount)
            }
        };
        Ok(Self::from_parts(total, paid, due, status))
    }

    /// Sale rules: the caller's status is only a hint for the default tender,
    /// the stored status is recomputed from the amount actually paid.
    ///
    /// A tender at or above the total settles the sale in full; the excess is
    /// not recorded.
    pub fn tendered(
        total: Decimal,
        hint: PaymentStatus,
        amount_paid: Option<Decimal>,
    ) -> Result<Self, SettlementError> {
        let tendered = amount_paid.unwrap_or(match hint {
            PaymentStatus::Paid => total,
            PaymentStatus::Pending | PaymentStatus::Partial => Decimal::ZERO,
        });
        if tendered < Decimal::ZERO {
            return Err(SettlementError::NegativeTender(tendered));
        }
        let paid = tendered.min(total);
        let due = total - paid;
        Ok(Self::from_parts(total, paid, due, derived_status(paid, due)))
    }

    /// Apply an installment and return the next state.
    pub fn apply_payment(&self, amount: Decimal) -> Result<Self, SettlementError> {
        if amount <= Decimal::ZERO {
            return Err(SettlementError::NonPositivePayment(amount));
        }
        if amount > self.amount_due {
            return Err(SettlementError::Overpayment {
                amount,
                due: self.amount_due,
            });
        }
        let paid = self.amount_paid + amount;
        let mut due = self.amount_due - amount;
        let status = if due <= Decimal::ZERO {
            due = Decimal::ZERO;
            PaymentStatus::Paid
        } else {
            PaymentStatus::Partial
        };
        Ok(Self::from_parts(self.total, paid, due, status))
    }

    pub fn is_balanced(&self) -> bool {
        self.amount_paid + self.amount_due == self.total
    }
}
