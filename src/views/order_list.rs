use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::app_system::AppContext;
use crate::backend::{OrderQuery, OrderStore};
use crate::clients::OrderListClient;
use crate::domain::{Order, OrderStatus};
use crate::error::OrderListError;
use crate::messages::{OrderListRequest, ServiceResponse};
use crate::realtime::{ChangeSubscription, EventFilter, RealtimeHub, ORDERS_TABLE};
use crate::toast::Toaster;

/// How a mounted order list is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderListProps {
    /// Status to show; `None` shows pending orders.
    pub status: Option<OrderStatus>,
    pub show_actions: bool,
}

impl Default for OrderListProps {
    fn default() -> Self {
        Self {
            status: None,
            show_actions: true,
        }
    }
}

impl OrderListProps {
    pub fn query(&self) -> OrderQuery {
        OrderQuery::for_filter(self.status)
    }
}

/// What the list currently shows.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderListSnapshot {
    pub props: OrderListProps,
    pub loading: bool,
    pub orders: Vec<Order>,
}

/// A mounted order list: owns the fetched orders and the realtime subscription.
///
/// Writes never touch `orders` directly; the list only changes when a fetch
/// returns. Every change event on the orders table triggers a refetch, whatever
/// status it concerns.
pub struct OrderListService {
    receiver: mpsc::Receiver<OrderListRequest>,
    store: Arc<dyn OrderStore>,
    realtime: RealtimeHub,
    toaster: Toaster,
    changes: ChangeSubscription,
    state: watch::Sender<OrderListSnapshot>,
    props: OrderListProps,
    orders: Vec<Order>,
}

impl OrderListService {
    pub fn new(ctx: &AppContext, props: OrderListProps, buffer_size: usize) -> (Self, OrderListClient) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let (state, state_rx) = watch::channel(OrderListSnapshot {
            props,
            loading: true,
            orders: Vec::new(),
        });
        let service = Self {
            receiver,
            store: ctx.orders.clone(),
            realtime: ctx.realtime.clone(),
            toaster: ctx.toaster.clone(),
            changes: ctx.realtime.subscribe(ORDERS_TABLE, EventFilter::All),
            state,
            props,
            orders: Vec::new(),
        };
        (service, OrderListClient::new(sender, state_rx))
    }

    /// Creates the service and runs it on its own task.
    pub fn mount(ctx: &AppContext, props: OrderListProps) -> (OrderListClient, tokio::task::JoinHandle<()>) {
        let (service, client) = Self::new(ctx, props, 16);
        let handle = tokio::spawn(service.run());
        (client, handle)
    }

    #[instrument(name = "order_list_service", skip(self), fields(status = %self.props.query().status))]
    pub async fn run(mut self) {
        info!("OrderListService starting");
        let _ = self.fetch().await;

        let mut hub_open = true;
        loop {
            tokio::select! {
                msg = self.receiver.recv() => match msg {
                    Some(OrderListRequest::Unmount) | None => {
                        info!("OrderListService unmounting");
                        break;
                    }
                    Some(msg) => self.handle(msg).await,
                },
                event = self.changes.recv(), if hub_open => match event {
                    Some(event) => {
                        debug!(kind = %event.kind, "Order change received, refetching");
                        let _ = self.fetch().await;
                    }
                    None => {
                        warn!("Realtime hub closed");
                        hub_open = false;
                    }
                },
            }
        }
        info!("OrderListService stopped");
    }

    async fn handle(&mut self, msg: OrderListRequest) {
        match msg {
            OrderListRequest::Refresh { respond_to } => {
                let result = self.fetch().await.map(|_| self.snapshot());
                let _ = respond_to.send(result);
            }
            OrderListRequest::UpdateStatus { id, status, respond_to } => {
                self.handle_update_status(id, status, respond_to).await;
            }
            OrderListRequest::Snapshot { respond_to } => {
                let _ = respond_to.send(Ok(self.snapshot()));
            }
            OrderListRequest::SetProps { props, respond_to } => {
                self.handle_set_props(props, respond_to).await;
            }
            OrderListRequest::Unmount => {}
        }
    }

    fn snapshot(&self) -> OrderListSnapshot {
        self.state.borrow().clone()
    }

    fn publish(&self, loading: bool) {
        self.state.send_replace(OrderListSnapshot {
            props: self.props,
            loading,
            orders: self.orders.clone(),
        });
    }

    /// Reads the configured status, newest first. On failure the previous
    /// list stays as it was.
    #[instrument(skip(self), fields(status = %self.props.query().status))]
    async fn fetch(&mut self) -> Result<(), OrderListError> {
        self.publish(true);
        let result = self.store.fetch_orders(&self.props.query()).await;
        let outcome = match result {
            Ok(orders) => {
                debug!(order_count = orders.len(), "Orders fetched");
                self.orders = orders;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Error fetching orders");
                self.toaster.error("Failed to fetch orders");
                Err(OrderListError::Fetch(e))
            }
        };
        self.publish(false);
        outcome
    }

    #[instrument(fields(order_id = %id, target = %status), skip(self, respond_to))]
    async fn handle_update_status(
        &mut self,
        id: String,
        status: OrderStatus,
        respond_to: ServiceResponse<(), OrderListError>,
    ) {
        debug!("Processing update_status request");

        // Only orders this list has loaded can be checked; others go to the store as-is.
        if let Some(order) = self.orders.iter().find(|order| order.id == id) {
            if !order.status.can_transition_to(status) {
                warn!(from = %order.status, "Refusing illegal status transition");
                let err = OrderListError::IllegalTransition {
                    id: id.clone(),
                    from: order.status,
                    to: status,
                };
                self.toaster.error(err.to_string());
                let _ = respond_to.send(Err(err));
                return;
            }
        }

        match self.store.update_status(&id, status).await {
            Ok(()) => {
                info!("Order status updated");
                self.toaster.success(format!("Order {} marked as {}", id, status));
                let _ = self.fetch().await;
                let _ = respond_to.send(Ok(()));
            }
            Err(e) => {
                error!(error = %e, "Error updating order");
                self.toaster.error("Failed to update order status");
                let _ = respond_to.send(Err(OrderListError::Update(e)));
            }
        }
    }

    /// New props re-establish the realtime subscription and refetch.
    #[instrument(skip(self, respond_to))]
    async fn handle_set_props(
        &mut self,
        props: OrderListProps,
        respond_to: ServiceResponse<OrderListSnapshot, OrderListError>,
    ) {
        if props.status != self.props.status {
            self.changes = self.realtime.subscribe(ORDERS_TABLE, EventFilter::All);
            self.orders.clear();
        }
        self.props = props;
        let result = self.fetch().await.map(|_| self.snapshot());
        let _ = respond_to.send(result);
    }
}
