use tokio::sync::{mpsc, watch};
use tracing::{debug, instrument};

use crate::domain::OrderStatus;
use crate::error::OrderListError;
use crate::messages::OrderListRequest;
use crate::views::{OrderListProps, OrderListSnapshot};

/// Handle to a mounted order list. Dropping every clone unmounts it.
#[derive(Clone)]
pub struct OrderListClient {
    sender: mpsc::Sender<OrderListRequest>,
    state: watch::Receiver<OrderListSnapshot>,
}

impl OrderListClient {
    pub fn new(sender: mpsc::Sender<OrderListRequest>, state: watch::Receiver<OrderListSnapshot>) -> Self {
        Self { sender, state }
    }

    /// Live view state, updated on every loading transition.
    pub fn watch(&self) -> watch::Receiver<OrderListSnapshot> {
        self.state.clone()
    }

    /// Tears the view down; its realtime subscription goes with it.
    #[instrument(skip(self))]
    pub async fn unmount(&self) -> Result<(), OrderListError> {
        debug!("Sending unmount request");
        self.sender
            .send(OrderListRequest::Unmount)
            .await
            .map_err(|_| OrderListError::ActorCommunicationError("Actor closed".to_string()))
    }
}

client_method!(OrderListClient => fn refresh() -> OrderListSnapshot as OrderListRequest::Refresh, Error = OrderListError);
client_method!(OrderListClient => fn update_status(id: String, status: OrderStatus) -> () as OrderListRequest::UpdateStatus, Error = OrderListError);
client_method!(OrderListClient => fn snapshot() -> OrderListSnapshot as OrderListRequest::Snapshot, Error = OrderListError);
client_method!(OrderListClient => fn set_props(props: OrderListProps) -> OrderListSnapshot as OrderListRequest::SetProps, Error = OrderListError);
