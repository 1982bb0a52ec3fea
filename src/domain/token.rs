//! Fungible token descriptors and valued balances.

use crate::domain::{Address, Decimal};
use serde::{Deserialize, Serialize};

/// Token metadata as resolved through the local token table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
}

impl Token {
    pub fn new(address: Address, symbol: &str, name: &str, decimals: u8) -> Self {
        Token {
            address,
            symbol: symbol.to_string(),
            name: name.to_string(),
            decimals,
        }
    }
}

/// An amount with its USD value.
///
/// `usd_value` is `None` when the asset could not be priced. Unknown is
/// deliberately distinct from zero and is serialized as `null`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub amount: Decimal,
    pub usd_value: Option<Decimal>,
}

impl Balance {
    pub fn new(amount: Decimal, usd_value: Option<Decimal>) -> Self {
        Balance { amount, usd_value }
    }

    pub fn priced(amount: Decimal, usd_value: Decimal) -> Self {
        Balance::new(amount, Some(usd_value))
    }

    /// Zero amount worth zero dollars.
    pub fn zero() -> Self {
        Balance::priced(Decimal::zero(), Decimal::zero())
    }

    /// Value `amount` at `price`; an unknown price gives an unknown USD value.
    pub fn at_price(amount: Decimal, price: Option<Decimal>) -> Self {
        Balance::new(amount, price.map(|p| p * amount))
    }
}

impl std::ops::Add for Balance {
    type Output = Balance;

    fn add(self, rhs: Balance) -> Balance {
        Balance {
            amount: self.amount + rhs.amount,
            usd_value: self.usd_value.zip(rhs.usd_value).map(|(a, b)| a + b),
        }
    }
}

impl std::ops::Sub for Balance {
    type Output = Balance;

    fn sub(self, rhs: Balance) -> Balance {
        Balance {
            amount: self.amount - rhs.amount,
            usd_value: self.usd_value.zip(rhs.usd_value).map(|(a, b)| a - b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_unknown_usd_is_contagious() {
        let known = Balance::priced(d("1"), d("2"));
        let unknown = Balance::new(d("3"), None);
        let sum = known + unknown;
        assert_eq!(sum.amount, d("4"));
        assert_eq!(sum.usd_value, None);
    }

    #[test]
    fn test_at_price() {
        assert_eq!(
            Balance::at_price(d("2"), Some(d("1.5"))),
            Balance::priced(d("2"), d("3"))
        );
        assert_eq!(Balance::at_price(d("2"), None).usd_value, None);
    }

    #[test]
    fn test_unknown_usd_serializes_as_null() {
        let json = serde_json::to_value(Balance::new(d("1"), None)).unwrap();
        assert_eq!(json, serde_json::json!({"amount": "1", "usd_value": null}));
    }
}
