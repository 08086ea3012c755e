use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, instrument, warn};

use super::{error_details, HostedClient};
use crate::backend::{OrderQuery, OrderStore};
use crate::domain::{Order, OrderPatch, OrderStatus};
use crate::error::StoreError;

/// Columns of an order row plus the embedded line items and their products.
pub const ORDER_SELECT: &str = "id,status,total_amount,delivery_address,created_at,phone_number,customer_name,order_items(id,quantity,product:products!inner(id,price,name,image_url))";

/// Query-string parameters for a filtered, ordered order read.
pub fn fetch_params(query: &OrderQuery) -> Vec<(&'static str, String)> {
    let direction = if query.newest_first { "desc" } else { "asc" };
    vec![
        ("select", ORDER_SELECT.to_string()),
        ("status", format!("eq.{}", query.status)),
        ("order", format!("created_at.{}", direction)),
    ]
}

/// Order table access over the hosted REST interface.
#[derive(Clone)]
pub struct RestOrderStore {
    client: HostedClient,
}

impl RestOrderStore {
    pub fn new(client: HostedClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OrderStore for RestOrderStore {
    #[instrument(skip(self))]
    async fn fetch_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, StoreError> {
        debug!("Sending request");
        let response = self
            .client
            .request(Method::GET, "/rest/v1/orders")
            .query(&fetch_params(query))
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let (status, message) = error_details(response).await;
            warn!(status, message = %message, "Order fetch rejected");
            return Err(StoreError::Rejected { status, message });
        }

        let orders: Vec<Order> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        debug!(order_count = orders.len(), "Orders fetched");
        Ok(orders)
    }

    #[instrument(skip(self))]
    async fn update_status(&self, id: &str, status: OrderStatus) -> Result<(), StoreError> {
        debug!("Sending request");
        let response = self
            .client
            .request(Method::PATCH, "/rest/v1/orders")
            .query(&[("id", format!("eq.{}", id)), ("select", "id".to_string())])
            .header("Prefer", "return=representation")
            .json(&OrderPatch { status })
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let (status, message) = error_details(response).await;
            warn!(status, message = %message, "Order update rejected");
            return Err(StoreError::Rejected { status, message });
        }

        // An empty representation means no row matched (or row-level policy hid it).
        let rows: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_params_filter_and_order() {
        let params = fetch_params(&OrderQuery::for_filter(Some(OrderStatus::Processing)));
        assert_eq!(params[0], ("select", ORDER_SELECT.to_string()));
        assert_eq!(params[1], ("status", "eq.processing".to_string()));
        assert_eq!(params[2], ("order", "created_at.desc".to_string()));
    }

    #[test]
    fn test_default_filter_reads_pending() {
        let params = fetch_params(&OrderQuery::for_filter(None));
        assert_eq!(params[1].1, "eq.pending");
    }

    #[test]
    fn test_patch_body_only_carries_status() {
        let body = serde_json::to_value(OrderPatch { status: OrderStatus::Processing }).unwrap();
        assert_eq!(body, serde_json::json!({ "status": "processing" }));
    }
}
