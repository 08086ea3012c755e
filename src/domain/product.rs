use serde::{Deserialize, Serialize};

/// A catalogue product as joined onto an order line. Read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(deserialize_with = "super::order::id_from_any")]
    pub id: String,
    pub name: String,
    pub image_url: String,
    pub price: f64,
}

impl Product {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        image_url: impl Into<String>,
        price: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image_url: image_url.into(),
            price,
        }
    }
}

/// Formats a currency amount the way every view shows it: `$` and two decimals.
pub fn format_money(amount: f64) -> String {
    format!("${:.2}", amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_money_rounds_to_cents() {
        assert_eq!(format_money(7.5), "$7.50");
        assert_eq!(format_money(9.999), "$10.00");
        assert_eq!(format_money(0.0), "$0.00");
    }
}
