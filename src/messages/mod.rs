use tokio::sync::oneshot;

use crate::domain::OrderStatus;
use crate::error::OrderListError;
use crate::views::{OrderListProps, OrderListSnapshot};

/// Generic type aliases for service communication
pub type ServiceResult<T, E> = std::result::Result<T, E>;
pub type ServiceResponse<T, E> = oneshot::Sender<ServiceResult<T, E>>;

/// Requests handled by a mounted order list. Each variant carries its
/// parameters and a oneshot channel for the response.
#[derive(Debug)]
pub enum OrderListRequest {
    Refresh {
        respond_to: ServiceResponse<OrderListSnapshot, OrderListError>,
    },
    UpdateStatus {
        id: String,
        status: OrderStatus,
        respond_to: ServiceResponse<(), OrderListError>,
    },
    Snapshot {
        respond_to: ServiceResponse<OrderListSnapshot, OrderListError>,
    },
    SetProps {
        props: OrderListProps,
        respond_to: ServiceResponse<OrderListSnapshot, OrderListError>,
    },
    Unmount,
}
