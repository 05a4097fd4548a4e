use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{PaymentMethod, PurchaseId, SaleId, StatementId};

/// Direction of a bank movement.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankEntryType {
    /// Money in.
    Credit,
    /// Money out.
    Debit,
}

impl BankEntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            BankEntryType::Credit => "credit",
            BankEntryType::Debit => "debit",
        }
    }

    /// Signed effect of `amount` on the account balance.
    pub fn signed(self, amount: Decimal) -> Decimal {
        match self {
            BankEntryType::Credit => amount,
            BankEntryType::Debit => -amount,
        }
    }
}

impl fmt::Display for BankEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BankEntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "credit" => Ok(BankEntryType::Credit),
            "debit" => Ok(BankEntryType::Debit),
            other => Err(format!("invalid transaction type: {other}")),
        }
    }
}

/// Clearing state of a bank movement.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementStatus {
    #[default]
    Pending,
    Cleared,
    Failed,
}

impl StatementStatus {
    pub const ALL: [StatementStatus; 3] = [
        StatementStatus::Pending,
        StatementStatus::Cleared,
        StatementStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StatementStatus::Pending => "pending",
            StatementStatus::Cleared => "cleared",
            StatementStatus::Failed => "failed",
        }
    }

    /// Failed movements never reach the account balance.
    pub fn counts_toward_balance(self) -> bool {
        !matches!(self, StatementStatus::Failed)
    }
}

impl fmt::Display for StatementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(StatementStatus::Pending),
            "cleared" => Ok(StatementStatus::Cleared),
            "failed" => Ok(StatementStatus::Failed),
            other => Err(format!("invalid statement status: {other}")),
        }
    }
}

/// One line of the bank statement ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BankStatement {
    pub id: StatementId,
    pub date: DateTime<Utc>,
    pub entry_type: BankEntryType,
    pub amount: Decimal,
    pub description: String,
    pub account: Option<String>,
    pub reference: Option<String>,
    pub related_sale_id: Option<SaleId>,
    pub related_purchase_id: Option<PurchaseId>,
    pub payment_method: Option<PaymentMethod>,
    pub status: StatementStatus,
    pub reconciliation_notes: Option<String>,
    pub recorded_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BankStatement {
    pub fn signed_amount(&self) -> Decimal {
        self.entry_type.signed(self.amount)
    }
}
