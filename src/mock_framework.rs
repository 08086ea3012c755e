//! # Mock Framework
//!
//! Utilities for testing views against a scripted order store.
//!
//! Use [`create_mock_store`] to get a store and a receiver.
//! Then use helpers like [`expect_fetch`] or [`expect_update`] to assert behavior.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::{mpsc, oneshot};

use crate::app_system::{AppContext, StaffAccount};
use crate::backend::memory::MemoryAuth;
use crate::backend::{OrderQuery, OrderStore};
use crate::domain::{Credentials, Order, OrderItem, OrderStatus, Product, Session};
use crate::error::StoreError;
use crate::realtime::RealtimeHub;
use crate::router::{Navigator, Route};
use crate::session_store::SessionStore;
use crate::toast::Toaster;

pub const TEST_EMAIL: &str = "staff@grocer.test";
pub const TEST_PASSWORD: &str = "secret";

/// A call that reached the mock store, waiting for the test to answer it.
#[derive(Debug)]
pub enum StoreRequest {
    Fetch {
        query: OrderQuery,
        respond_to: oneshot::Sender<Result<Vec<Order>, StoreError>>,
    },
    Update {
        id: String,
        status: OrderStatus,
        respond_to: oneshot::Sender<Result<(), StoreError>>,
    },
}

/// Order store whose every call is forwarded to the test.
///
/// # Testing Strategy
/// Views talk to the store through the [`OrderStore`] trait. Instead of a real
/// backend, the mock sends each call to a channel the test controls, so the
/// test decides what each call returns (success, failure, or nothing yet) and
/// in which order calls are expected.
pub struct MockOrderStore {
    sender: mpsc::Sender<StoreRequest>,
}

/// Creates a mock store and a receiver for asserting requests.
pub fn create_mock_store(buffer_size: usize) -> (MockOrderStore, mpsc::Receiver<StoreRequest>) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    (MockOrderStore { sender }, receiver)
}

#[async_trait]
impl OrderStore for MockOrderStore {
    async fn fetch_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, StoreError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(StoreRequest::Fetch { query: *query, respond_to })
            .await
            .map_err(|e| StoreError::ActorCommunicationError(e.to_string()))?;
        response
            .await
            .map_err(|e| StoreError::ActorCommunicationError(e.to_string()))?
    }

    async fn update_status(&self, id: &str, status: OrderStatus) -> Result<(), StoreError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(StoreRequest::Update { id: id.to_string(), status, respond_to })
            .await
            .map_err(|e| StoreError::ActorCommunicationError(e.to_string()))?;
        response
            .await
            .map_err(|e| StoreError::ActorCommunicationError(e.to_string()))?
    }
}

/// Helper to verify that the next message is a Fetch request
pub async fn expect_fetch(
    receiver: &mut mpsc::Receiver<StoreRequest>,
) -> Option<(OrderQuery, oneshot::Sender<Result<Vec<Order>, StoreError>>)> {
    match receiver.recv().await {
        Some(StoreRequest::Fetch { query, respond_to }) => Some((query, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is an Update request
pub async fn expect_update(
    receiver: &mut mpsc::Receiver<StoreRequest>,
) -> Option<(String, OrderStatus, oneshot::Sender<Result<(), StoreError>>)> {
    match receiver.recv().await {
        Some(StoreRequest::Update { id, status, respond_to }) => Some((id, status, respond_to)),
        _ => None,
    }
}

/// Context with in-memory auth (one staff account) over the given store.
/// The navigator starts on the login route.
pub fn test_context(orders: Arc<dyn OrderStore>, realtime: RealtimeHub) -> AppContext {
    AppContext {
        session: SessionStore::new(),
        auth: Arc::new(MemoryAuth::new(vec![StaffAccount {
            email: TEST_EMAIL.to_string(),
            password: TEST_PASSWORD.to_string(),
        }])),
        orders,
        realtime,
        toaster: Toaster::new(),
        navigator: Navigator::new(Route::Login),
    }
}

/// Signs the test account in and stores the session.
pub async fn sign_in(ctx: &AppContext) -> Session {
    let session = ctx
        .auth
        .sign_in(&Credentials::new(TEST_EMAIL, TEST_PASSWORD))
        .await
        .expect("test account should sign in");
    ctx.session.set(Some(session.clone()));
    session
}

/// A one-line order with a fixed timestamp.
pub fn sample_order(id: &str, status: OrderStatus) -> Order {
    let product = Product::new("p1", "Gala Apples (1 lb)", "https://images.example.com/apples.jpg", 2.50);
    Order {
        id: id.to_string(),
        status,
        total_amount: 5.0,
        delivery_address: "18 Orchard Lane".to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
        phone_number: "555-0142".to_string(),
        customer_name: "Maria Lopez".to_string(),
        order_items: vec![OrderItem::new(format!("{}-0", id), 2, product)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_store() {
        let (store, mut receiver) = create_mock_store(10);

        // Test Fetch
        let fetch_task = tokio::spawn(async move {
            let orders = store.fetch_orders(&OrderQuery::for_filter(None)).await;
            (store, orders)
        });

        let (query, responder) = expect_fetch(&mut receiver).await.expect("Expected Fetch request");
        assert_eq!(query.status, OrderStatus::Pending);
        responder.send(Ok(vec![sample_order("42", OrderStatus::Pending)])).unwrap();

        let (store, result) = fetch_task.await.unwrap();
        assert_eq!(result.unwrap().len(), 1);

        // Test Update
        let update_task = tokio::spawn(async move { store.update_status("42", OrderStatus::Processing).await });

        let (id, status, responder) = expect_update(&mut receiver).await.expect("Expected Update request");
        assert_eq!(id, "42");
        assert_eq!(status, OrderStatus::Processing);
        responder.send(Err(StoreError::NotFound("42".to_string()))).unwrap();

        assert_eq!(update_task.await.unwrap(), Err(StoreError::NotFound("42".to_string())));
    }

    #[tokio::test]
    async fn test_dropped_responder_is_a_communication_error() {
        let (store, mut receiver) = create_mock_store(10);
        let task = tokio::spawn(async move { store.fetch_orders(&OrderQuery::for_filter(None)).await });

        let (_, responder) = expect_fetch(&mut receiver).await.unwrap();
        drop(responder);

        assert!(matches!(
            task.await.unwrap(),
            Err(StoreError::ActorCommunicationError(_))
        ));
    }
}
