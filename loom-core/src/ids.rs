use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }
    };
}

row_id!(
    /// Primary key of a company issuing invoices.
    CompanyId
);
row_id!(
    /// Primary key of a supplier.
    SupplierId
);
row_id!(
    /// Primary key of a customer.
    CustomerId
);
row_id!(
    /// Primary key of a purchase lot.
    PurchaseId
);
row_id!(
    /// Primary key of a sale.
    SaleId
);
row_id!(
    /// Primary key of a payment row (sale or purchase side).
    PaymentId
);
row_id!(
    /// Primary key of a bank statement entry.
    StatementId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let id: SaleId = " 42 ".parse().unwrap();
        assert_eq!(id, SaleId(42));
        assert_eq!(id.to_string(), "42");
        assert!("abc".parse::<SupplierId>().is_err());
    }
}
