use thiserror::Error;

use crate::domain::OrderStatus;

/// Failures of the session backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AuthError {
    #[error("Email and password are required")]
    MissingCredentials,
    #[error("Invalid login credentials: {0}")]
    InvalidCredentials(String),
    #[error("Not signed in")]
    NotSignedIn,
    #[error("Auth service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Auth transport error: {0}")]
    Transport(String),
    #[error("Auth response could not be decoded: {0}")]
    Decode(String),
}

/// Failures of the order data store.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Order not found: {0}")]
    NotFound(String),
    #[error("Order store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Order store transport error: {0}")]
    Transport(String),
    #[error("Order store response could not be decoded: {0}")]
    Decode(String),
    #[error("Actor communication error: {0}")]
    ActorCommunicationError(String),
}

/// Failures surfaced by the order list view.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrderListError {
    #[error("Failed to fetch orders: {0}")]
    Fetch(StoreError),
    #[error("Failed to update order status: {0}")]
    Update(StoreError),
    #[error("Order {id} cannot move from {from} to {to}")]
    IllegalTransition {
        id: String,
        from: OrderStatus,
        to: OrderStatus,
    },
    #[error("Actor communication error: {0}")]
    ActorCommunicationError(String),
}

/// Failures of the hosted realtime bridge.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RealtimeError {
    #[error("Realtime connection failed: {0}")]
    Connect(String),
    #[error("Realtime protocol error: {0}")]
    Protocol(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
