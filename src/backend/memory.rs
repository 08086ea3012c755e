//! In-process backend: orders held by a [`ResourceActor`], staff accounts from config.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use super::{AuthApi, OrderQuery, OrderStore};
use crate::actor_framework::{Entity, FrameworkError, ResourceActor, ResourceClient};
use crate::app_system::StaffAccount;
use crate::domain::{
    Credentials, NewOrder, Order, OrderItem, OrderPatch, OrderStatus, Product, Session, User,
};
use crate::error::{AuthError, StoreError};
use crate::realtime::{RealtimeHub, ORDERS_TABLE};

impl Entity for Order {
    type Id = String;
    type CreatePayload = NewOrder;
    type Patch = OrderPatch;

    const TABLE: &'static str = ORDERS_TABLE;

    /// New orders always start out pending; the total is derived from the lines.
    fn from_create(id: String, payload: NewOrder) -> Result<Self, String> {
        if let Some(item) = payload.order_items.iter().find(|item| item.quantity == 0) {
            return Err(format!("Line item {} has zero quantity", item.id));
        }
        let total_amount = payload.total_amount();
        Ok(Self {
            id,
            status: OrderStatus::Pending,
            total_amount,
            delivery_address: payload.delivery_address,
            created_at: payload.created_at,
            phone_number: payload.phone_number,
            customer_name: payload.customer_name,
            order_items: payload.order_items,
        })
    }

    /// Last write wins; lifecycle legality is not enforced by the store.
    fn on_update(&mut self, patch: OrderPatch) -> Result<(), String> {
        self.status = patch.status;
        Ok(())
    }
}

impl From<FrameworkError> for StoreError {
    fn from(e: FrameworkError) -> Self {
        match e {
            FrameworkError::NotFound(id) => StoreError::NotFound(id),
            FrameworkError::Rejected(message) => StoreError::Rejected { status: 400, message },
            other => StoreError::ActorCommunicationError(other.to_string()),
        }
    }
}

/// Order store backed by an in-process resource actor.
#[derive(Clone)]
pub struct MemoryOrderStore {
    inner: ResourceClient<Order>,
}

impl MemoryOrderStore {
    pub fn new(inner: ResourceClient<Order>) -> Self {
        Self { inner }
    }

    /// Starts the backing actor; every mutation is announced on `hub`.
    pub fn spawn(hub: RealtimeHub) -> (Self, tokio::task::JoinHandle<()>) {
        let counter = Arc::new(AtomicU64::new(1));
        let next_id = move || counter.fetch_add(1, Ordering::SeqCst).to_string();
        let (actor, client) = ResourceActor::<Order>::new(64, next_id);
        let handle = tokio::spawn(actor.with_changes(hub).run());
        (Self::new(client), handle)
    }

    #[instrument(skip(self, order), fields(customer = %order.customer_name))]
    pub async fn insert_order(&self, order: NewOrder) -> Result<String, StoreError> {
        debug!("Sending request");
        let id = self.inner.create(order).await?;
        info!(order_id = %id, "Order inserted");
        Ok(id)
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    #[instrument(skip(self))]
    async fn fetch_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, StoreError> {
        debug!("Sending request");
        let mut orders: Vec<Order> = self
            .inner
            .list()
            .await?
            .into_iter()
            .filter(|order| order.status == query.status)
            .collect();
        // Ties on created_at fall back to id so repeated reads agree.
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        if query.newest_first {
            orders.reverse();
        }
        debug!(order_count = orders.len(), "Orders listed");
        Ok(orders)
    }

    #[instrument(skip(self))]
    async fn update_status(&self, id: &str, status: OrderStatus) -> Result<(), StoreError> {
        debug!("Sending request");
        self.inner.update(id.to_string(), OrderPatch { status }).await?;
        Ok(())
    }
}

/// Session backend over a fixed list of staff accounts.
pub struct MemoryAuth {
    accounts: Vec<StaffAccount>,
    sessions: Mutex<HashMap<String, User>>,
    next_token: AtomicU64,
}

impl MemoryAuth {
    pub fn new(accounts: Vec<StaffAccount>) -> Self {
        Self {
            accounts,
            sessions: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        }
    }

    /// Fresh token pair for `user`. Memory sessions do not expire.
    fn issue(&self, user: User) -> Session {
        let n = self.next_token.fetch_add(1, Ordering::SeqCst);
        let access_token = format!("mem-access-{}", n);
        self.sessions().insert(access_token.clone(), user.clone());
        Session {
            access_token,
            refresh_token: format!("mem-refresh-{}", n),
            expires_at: None,
            user,
        }
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, User>> {
        // A poisoned map still holds valid sessions.
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AuthApi for MemoryAuth {
    #[instrument(skip(self))]
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let account = self
            .accounts
            .iter()
            .position(|account| {
                account.email.eq_ignore_ascii_case(&credentials.email)
                    && account.password == credentials.password
            })
            .ok_or_else(|| {
                warn!("Unknown email or wrong password");
                AuthError::InvalidCredentials("Invalid login credentials".to_string())
            })?;

        let user = User {
            id: format!("staff_{}", account + 1),
            email: self.accounts[account].email.clone(),
        };
        info!(user_id = %user.id, "Signed in");
        Ok(self.issue(user))
    }

    async fn get_user(&self, session: &Session) -> Result<Option<User>, AuthError> {
        Ok(self.sessions().get(&session.access_token).cloned())
    }

    #[instrument(skip(self, session), fields(user_id = %session.user.id))]
    async fn refresh_session(&self, session: &Session) -> Result<Session, AuthError> {
        let user = self
            .sessions()
            .remove(&session.access_token)
            .ok_or(AuthError::NotSignedIn)?;
        let fresh = self.issue(user);
        info!("Session refreshed");
        Ok(fresh)
    }

    #[instrument(skip(self, session), fields(user_id = %session.user.id))]
    async fn sign_out(&self, session: &Session) -> Result<(), AuthError> {
        self.sessions().remove(&session.access_token);
        info!("Signed out");
        Ok(())
    }
}

// =============================================================================
// DEMO DATA
// =============================================================================

fn catalogue() -> Vec<Product> {
    vec![
        Product::new("p1", "Gala Apples (1 lb)", "https://images.example.com/apples.jpg", 2.50),
        Product::new("p2", "Whole Milk (1 gal)", "https://images.example.com/milk.jpg", 3.99),
        Product::new("p3", "Sourdough Loaf", "https://images.example.com/bread.jpg", 5.25),
        Product::new("p4", "Free-Range Eggs (dozen)", "https://images.example.com/eggs.jpg", 4.75),
        Product::new("p5", "Baby Spinach", "https://images.example.com/spinach.jpg", 3.49),
    ]
}

const CUSTOMERS: [(&str, &str, &str); 4] = [
    ("Maria Lopez", "555-0142", "18 Orchard Lane"),
    ("Sam Okafor", "555-0178", "402 River Rd, Apt 3"),
    ("Priya Raman", "555-0115", "77 Hillcrest Ave"),
    ("Tom Becker", "555-0190", "9 Station Square"),
];

/// Builds the `n`-th demo order, cycling through customers and products.
pub fn demo_order(n: usize) -> NewOrder {
    let products = catalogue();
    let (name, phone, address) = CUSTOMERS[n % CUSTOMERS.len()];
    let lines = 1 + n % 3;
    let order_items = (0..lines)
        .map(|line| {
            let product = products[(n + line) % products.len()].clone();
            OrderItem::new(format!("{}-{}", n, line), (1 + (n + line) % 4) as u32, product)
        })
        .collect();
    NewOrder {
        customer_name: name.to_string(),
        phone_number: phone.to_string(),
        delivery_address: address.to_string(),
        created_at: Utc::now() - chrono::Duration::minutes((10 * n) as i64),
        order_items,
    }
}

/// Inserts a handful of orders and moves some along the lifecycle.
#[instrument(skip(store))]
pub async fn seed_demo_orders(store: &MemoryOrderStore) -> Result<(), StoreError> {
    for n in 0..6 {
        let id = store.insert_order(demo_order(n)).await?;
        match n {
            2 | 3 => store.update_status(&id, OrderStatus::Processing).await?,
            4 => {
                store.update_status(&id, OrderStatus::Processing).await?;
                store.update_status(&id, OrderStatus::Completed).await?;
            }
            _ => {}
        }
    }
    info!("Demo orders seeded");
    Ok(())
}

/// Inserts a new demo order every `interval`, mimicking customers checking out.
pub fn spawn_demo_feed(store: MemoryOrderStore, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        let mut n = 100usize;
        loop {
            ticker.tick().await;
            let mut order = demo_order(n);
            order.created_at = Utc::now();
            if let Err(e) = store.insert_order(order).await {
                warn!(error = %e, "Demo feed stopped");
                break;
            }
            n += 1;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::{ChangeKind, EventFilter};

    fn staff() -> Vec<StaffAccount> {
        vec![StaffAccount {
            email: "staff@grocer.test".to_string(),
            password: "secret".to_string(),
        }]
    }

    #[tokio::test]
    async fn test_fetch_filters_by_status_newest_first() {
        let (store, _handle) = MemoryOrderStore::spawn(RealtimeHub::new());
        seed_demo_orders(&store).await.unwrap();

        for status in OrderStatus::ALL {
            let orders = store.fetch_orders(&OrderQuery::for_filter(Some(status))).await.unwrap();
            assert!(orders.iter().all(|order| order.status == status));
            assert!(orders.windows(2).all(|pair| pair[0].created_at >= pair[1].created_at));
        }

        let pending = store.fetch_orders(&OrderQuery::for_filter(None)).await.unwrap();
        assert_eq!(pending.len(), 3);
    }

    #[tokio::test]
    async fn test_repeated_fetch_is_identical() {
        let (store, _handle) = MemoryOrderStore::spawn(RealtimeHub::new());
        let mut first = demo_order(0);
        let mut second = demo_order(1);
        second.created_at = first.created_at;
        first.customer_name = "Same Instant".to_string();
        store.insert_order(first).await.unwrap();
        store.insert_order(second).await.unwrap();

        let query = OrderQuery::for_filter(None);
        let a = store.fetch_orders(&query).await.unwrap();
        let b = store.fetch_orders(&query).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_insert_computes_total_and_announces() {
        let hub = RealtimeHub::new();
        let mut inserts = hub.subscribe(ORDERS_TABLE, EventFilter::Only(ChangeKind::Insert));
        let (store, _handle) = MemoryOrderStore::spawn(hub);

        let order = NewOrder {
            customer_name: "Ann".to_string(),
            phone_number: "555".to_string(),
            delivery_address: "Elm".to_string(),
            created_at: Utc::now(),
            order_items: vec![OrderItem::new("i1", 3, Product::new("p", "Pears", "", 2.5))],
        };
        let id = store.insert_order(order).await.unwrap();

        let event = inserts.recv().await.unwrap();
        assert_eq!(event.record.as_ref().unwrap()["id"], id.as_str());
        assert_eq!(event.record.as_ref().unwrap()["total_amount"], 7.5);
        assert_eq!(event.record.as_ref().unwrap()["status"], "pending");
    }

    #[tokio::test]
    async fn test_update_unknown_order_is_not_found() {
        let (store, _handle) = MemoryOrderStore::spawn(RealtimeHub::new());
        let result = store.update_status("404", OrderStatus::Completed).await;
        assert_eq!(result, Err(StoreError::NotFound("404".to_string())));
    }

    #[tokio::test]
    async fn test_zero_quantity_is_rejected() {
        let (store, _handle) = MemoryOrderStore::spawn(RealtimeHub::new());
        let mut order = demo_order(0);
        order.order_items[0].quantity = 0;
        assert!(matches!(
            store.insert_order(order).await,
            Err(StoreError::Rejected { status: 400, .. })
        ));
    }

    #[tokio::test]
    async fn test_memory_auth_sign_in_and_out() {
        let auth = MemoryAuth::new(staff());

        let wrong = auth.sign_in(&Credentials::new("staff@grocer.test", "nope")).await;
        assert!(matches!(wrong, Err(AuthError::InvalidCredentials(_))));

        let session = auth.sign_in(&Credentials::new("STAFF@grocer.test", "secret")).await.unwrap();
        assert_eq!(session.user.email, "staff@grocer.test");
        assert!(auth.get_user(&session).await.unwrap().is_some());

        auth.sign_out(&session).await.unwrap();
        assert_eq!(auth.get_user(&session).await.unwrap(), None);
    }
}
