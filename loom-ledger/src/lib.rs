//! Bookkeeping for a fabric trading business: purchases, sales, stock,
//! credit and bank statements kept in a single SQLite file.

mod backup;
mod bank;
mod error;
mod parties;
mod payments;
mod recorder;
mod reports;
mod rows;
mod sqlite;
mod valuation;

pub use bank::{BankStatementQuery, BankSummary, NewBankStatement, ReconciliationStatus, StatusTally};
pub use error::{LedgerError, LedgerResult};
pub use parties::NewCompany;
pub use payments::{
    CustomerCredit, NewPayment, OutstandingTotals, PaymentHistoryEntry, PendingPurchase,
    PendingSale, PurchasePaymentHistoryEntry, Receipt, SupplierCredit,
};
pub use recorder::{NewPurchase, NewSale, SaleAmounts, DEFAULT_TAX_RATE};
pub use reports::{
    CounterpartySummary, PurchaseLedger, PurchaseLedgerEntry, PurchaseLedgerQuery, SaleLedger,
    SaleLedgerEntry, SaleLedgerQuery,
};
pub use sqlite::Ledger;
pub use valuation::{
    allocate_fifo, profit_loss, summarize_stock, valuation_report, FabricValuation, FifoValuation,
    LotRemaining, ProfitLoss, StockLine, ValuationReport,
};
