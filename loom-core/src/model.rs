use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    CompanyId, CustomerId, FabricIdentity, PaymentId, PaymentMethod, PaymentStatus, PurchaseId,
    SaleId, Settlement, SupplierId,
};

/// Selling entity printed on invoices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub tax_number: Option<String>,
    pub license_number: Option<String>,
    pub website: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
    pub contact: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub contact: Option<String>,
}

/// A purchase lot bought from a supplier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: PurchaseId,
    pub supplier_id: SupplierId,
    pub date: DateTime<Utc>,
    pub fabric: FabricIdentity,
    pub quantity_meters: Decimal,
    pub price_per_meter: Decimal,
    pub total_cost: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub amount_paid: Decimal,
    pub amount_due: Decimal,
    pub payment_notes: Option<String>,
}

impl Purchase {
    pub fn settlement(&self) -> Settlement {
        Settlement::from_parts(
            self.total_cost,
            self.amount_paid,
            self.amount_due,
            self.payment_status,
        )
    }
}

/// A sale of fabric to a customer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: SaleId,
    pub company_id: Option<CompanyId>,
    pub customer_id: CustomerId,
    pub date: DateTime<Utc>,
    pub fabric: FabricIdentity,
    pub quantity_meters: Decimal,
    pub price_per_meter: Decimal,
    pub apply_tax: bool,
    /// Fraction, `0.18` for 18%. Stored as zero when no tax was applied.
    pub tax_rate: Decimal,
    pub tax: Decimal,
    pub total_price_with_tax: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub amount_paid: Decimal,
    pub amount_due: Decimal,
    pub payment_notes: Option<String>,
}

impl Sale {
    pub fn subtotal(&self) -> Decimal {
        self.quantity_meters * self.price_per_meter
    }

    pub fn settlement(&self) -> Settlement {
        Settlement::from_parts(
            self.total_price_with_tax,
            self.amount_paid,
            self.amount_due,
            self.payment_status,
        )
    }
}

/// Installment received against a sale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub sale_id: SaleId,
    pub date: DateTime<Utc>,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: Option<String>,
}

/// Installment paid out against a purchase.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchasePayment {
    pub id: PaymentId,
    pub purchase_id: PurchaseId,
    pub date: DateTime<Utc>,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: Option<String>,
}
