use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::product::Product;

/// Lifecycle state of an order.
///
/// The only edges are pending → processing → completed and pending → cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Targets reachable from this status in one step.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Processing, OrderStatus::Cancelled],
            OrderStatus::Processing => &[OrderStatus::Completed],
            OrderStatus::Completed | OrderStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| format!("unknown order status: {}", wanted))
    }
}

/// A status-transition button offered on an order card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    Process,
    Cancel,
    Complete,
}

impl StatusAction {
    pub fn label(&self) -> &'static str {
        match self {
            StatusAction::Process => "Process",
            StatusAction::Cancel => "Cancel",
            StatusAction::Complete => "Complete",
        }
    }

    /// Status the order moves to when the button is clicked.
    pub fn target(&self) -> OrderStatus {
        match self {
            StatusAction::Process => OrderStatus::Processing,
            StatusAction::Cancel => OrderStatus::Cancelled,
            StatusAction::Complete => OrderStatus::Completed,
        }
    }

    /// Buttons shown for an order in `status`. Empty whenever actions are hidden.
    pub fn available(status: OrderStatus, show_actions: bool) -> &'static [StatusAction] {
        if !show_actions {
            return &[];
        }
        match status {
            OrderStatus::Pending => &[StatusAction::Process, StatusAction::Cancel],
            OrderStatus::Processing => &[StatusAction::Complete],
            OrderStatus::Completed | OrderStatus::Cancelled => &[],
        }
    }
}

/// A quantity of one product within an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    pub quantity: u32,
    pub product: Product,
}

impl OrderItem {
    pub fn new(id: impl Into<String>, quantity: u32, product: Product) -> Self {
        Self {
            id: id.into(),
            quantity,
            product,
        }
    }

    pub fn line_total(&self) -> f64 {
        f64::from(self.quantity) * self.product.price
    }
}

/// A customer order with its joined line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    pub status: OrderStatus,
    pub total_amount: f64,
    pub delivery_address: String,
    pub created_at: DateTime<Utc>,
    pub phone_number: String,
    pub customer_name: String,
    #[serde(default)]
    pub order_items: Vec<OrderItem>,
}

/// Partial update issued when staff advance an order.
#[derive(Debug, Clone, Serialize)]
pub struct OrderPatch {
    pub status: OrderStatus,
}

/// Payload for inserting an order (seed data and the demo feed).
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_name: String,
    pub phone_number: String,
    pub delivery_address: String,
    pub created_at: DateTime<Utc>,
    pub order_items: Vec<OrderItem>,
}

impl NewOrder {
    pub fn total_amount(&self) -> f64 {
        self.order_items.iter().map(OrderItem::line_total).sum()
    }
}

/// Accepts identifiers stored either as text or as integer columns.
pub(crate) fn id_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum AnyId {
        Text(String),
        Number(i64),
    }

    Ok(match AnyId::deserialize(deserializer)? {
        AnyId::Text(s) => s,
        AnyId::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_follow_lifecycle() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Completed));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Completed));
        assert!(!OrderStatus::Processing.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Completed.allowed_transitions().is_empty());
        assert!(OrderStatus::Cancelled.allowed_transitions().is_empty());
    }

    #[test]
    fn test_available_actions_per_status() {
        assert_eq!(
            StatusAction::available(OrderStatus::Pending, true),
            &[StatusAction::Process, StatusAction::Cancel]
        );
        assert_eq!(
            StatusAction::available(OrderStatus::Processing, true),
            &[StatusAction::Complete]
        );
        assert!(StatusAction::available(OrderStatus::Completed, true).is_empty());
        assert!(StatusAction::available(OrderStatus::Cancelled, true).is_empty());
        for status in OrderStatus::ALL {
            assert!(StatusAction::available(status, false).is_empty());
        }
    }

    #[test]
    fn test_actions_only_offer_legal_transitions() {
        for status in OrderStatus::ALL {
            for action in StatusAction::available(status, true) {
                assert!(status.can_transition_to(action.target()));
            }
        }
    }

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!("Processing".parse::<OrderStatus>(), Ok(OrderStatus::Processing));
        assert_eq!(OrderStatus::Cancelled.to_string(), "cancelled");
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_order_decodes_joined_row() {
        let row = serde_json::json!({
            "id": 42,
            "status": "pending",
            "total_amount": 7.5,
            "delivery_address": "1 Market St",
            "created_at": "2024-03-01T09:30:00+00:00",
            "phone_number": "555-0101",
            "customer_name": "Dana",
            "order_items": [
                {
                    "id": "i1",
                    "quantity": 3,
                    "product": { "id": 7, "name": "Apples", "image_url": "a.png", "price": 2.5 }
                }
            ]
        });

        let order: Order = serde_json::from_value(row).unwrap();
        assert_eq!(order.id, "42");
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.order_items[0].product.id, "7");
        assert_eq!(order.order_items[0].line_total(), 7.5);
    }

    #[test]
    fn test_order_without_items_decodes_empty() {
        let row = serde_json::json!({
            "id": "a",
            "status": "completed",
            "total_amount": 0.0,
            "delivery_address": "",
            "created_at": "2024-03-01T09:30:00Z",
            "phone_number": "",
            "customer_name": ""
        });

        let order: Order = serde_json::from_value(row).unwrap();
        assert!(order.order_items.is_empty());
    }
}
