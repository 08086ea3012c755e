//! Seams to the external services: session backend and order data store.
//!
//! `memory` keeps everything in-process (standalone mode, demos and tests);
//! `hosted` talks to the hosted backend-as-a-service over HTTP and websockets.

pub mod hosted;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{Credentials, Order, OrderStatus, Session, User};
use crate::error::{AuthError, StoreError};
use crate::session_store::SessionStore;

/// How long before expiry a session is renewed.
pub const REFRESH_LEAD: Duration = Duration::from_secs(60);
/// Pause before retrying a refresh that failed for transient reasons.
const REFRESH_RETRY: Duration = Duration::from_secs(15);

/// Filtered, ordered read of orders with their joined items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderQuery {
    pub status: OrderStatus,
    pub newest_first: bool,
}

impl OrderQuery {
    /// Query for a view's status filter; no filter means pending orders.
    pub fn for_filter(status: Option<OrderStatus>) -> Self {
        Self {
            status: status.unwrap_or(OrderStatus::Pending),
            newest_first: true,
        }
    }
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError>;

    /// Resolves the user behind a session; `None` if the session is no longer valid.
    async fn get_user(&self, session: &Session) -> Result<Option<User>, AuthError>;

    /// Trades the session's refresh token for a new session.
    async fn refresh_session(&self, session: &Session) -> Result<Session, AuthError>;

    async fn sign_out(&self, session: &Session) -> Result<(), AuthError>;
}

/// Time left until `session` should be refreshed; `None` if it never expires
/// or cannot be refreshed.
pub fn refresh_due(session: &Session, lead: Duration) -> Option<Duration> {
    if session.refresh_token.is_empty() {
        return None;
    }
    let expires_at = session.expires_at?;
    let lead = chrono::Duration::from_std(lead).unwrap_or_else(|_| chrono::Duration::zero());
    Some((expires_at - lead - Utc::now()).to_std().unwrap_or(Duration::ZERO))
}

/// Keeps the stored session fresh: renews it `lead` before it expires and
/// writes the result back to `session`, so every subscriber (the layout,
/// the realtime bridge) sees the new token. A rejected refresh clears the
/// session, which sends the console back to the login route.
pub fn spawn_session_refresher(auth: Arc<dyn AuthApi>, session: SessionStore, lead: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut changes = session.subscribe();
        loop {
            let current = session.current();
            let due = current.as_ref().and_then(|current| refresh_due(current, lead));
            let (Some(current), Some(wait)) = (current, due) else {
                if changes.changed().await.is_none() {
                    break;
                }
                continue;
            };

            debug!(wait_secs = wait.as_secs(), "Session refresh scheduled");
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = changes.changed() => {
                    if changed.is_none() {
                        break;
                    }
                    continue;
                }
            }

            match auth.refresh_session(&current).await {
                Ok(fresh) => {
                    info!(user_id = %fresh.user.id, "Session renewed");
                    session.set(Some(fresh));
                }
                Err(e @ (AuthError::InvalidCredentials(_) | AuthError::NotSignedIn)) => {
                    warn!(error = %e, "Session can no longer be renewed");
                    session.set(None);
                }
                Err(e) => {
                    warn!(error = %e, "Session refresh failed; retrying");
                    tokio::time::sleep(REFRESH_RETRY).await;
                }
            }
        }
        debug!("Session refresher stopped");
    })
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn fetch_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, StoreError>;

    /// Partial update of a single order's status.
    async fn update_status(&self, id: &str, status: OrderStatus) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_system::StaffAccount;
    use crate::backend::memory::MemoryAuth;

    fn memory_auth() -> Arc<MemoryAuth> {
        Arc::new(MemoryAuth::new(vec![StaffAccount {
            email: "staff@grocer.test".to_string(),
            password: "secret".to_string(),
        }]))
    }

    async fn wait_for_session<F>(store: &SessionStore, done: F) -> Option<Session>
    where
        F: Fn(&Option<Session>) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let current = store.current();
                if done(&current) {
                    return current;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session reached the expected state")
    }

    #[test]
    fn test_refresh_due_needs_expiry_and_refresh_token() {
        let mut session = Session {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at: None,
            user: User {
                id: "u1".to_string(),
                email: String::new(),
            },
        };
        assert_eq!(refresh_due(&session, REFRESH_LEAD), None);

        session.expires_at = Some(Utc::now() + chrono::Duration::minutes(10));
        let due = refresh_due(&session, REFRESH_LEAD).unwrap();
        assert!(due <= Duration::from_secs(540) && due > Duration::from_secs(500));

        // Already inside the lead window: refresh right away.
        session.expires_at = Some(Utc::now() + chrono::Duration::seconds(5));
        assert_eq!(refresh_due(&session, REFRESH_LEAD), Some(Duration::ZERO));

        session.refresh_token.clear();
        assert_eq!(refresh_due(&session, REFRESH_LEAD), None);
    }

    #[tokio::test]
    async fn test_refresher_renews_expiring_session() {
        let auth = memory_auth();
        let store = SessionStore::new();
        let refresher = spawn_session_refresher(auth.clone(), store.clone(), REFRESH_LEAD);

        let mut session = auth.sign_in(&Credentials::new("staff@grocer.test", "secret")).await.unwrap();
        let old_token = session.access_token.clone();
        session.expires_at = Some(Utc::now() + chrono::Duration::seconds(30));
        store.set(Some(session.clone()));

        let renewed = wait_for_session(&store, |current| {
            current.as_ref().is_some_and(|current| current.access_token != old_token)
        })
        .await
        .unwrap();

        assert_eq!(renewed.user, session.user);
        assert_eq!(auth.get_user(&session).await.unwrap(), None);
        assert!(auth.get_user(&renewed).await.unwrap().is_some());
        refresher.abort();
    }

    #[tokio::test]
    async fn test_refresher_clears_session_it_cannot_renew() {
        let auth = memory_auth();
        let store = SessionStore::new();
        let refresher = spawn_session_refresher(auth.clone(), store.clone(), REFRESH_LEAD);

        let mut session = auth.sign_in(&Credentials::new("staff@grocer.test", "secret")).await.unwrap();
        auth.sign_out(&session).await.unwrap();
        session.expires_at = Some(Utc::now());
        store.set(Some(session));

        assert_eq!(wait_for_session(&store, Option::is_none).await, None);
        refresher.abort();
    }

    #[test]
    fn test_missing_filter_defaults_to_pending() {
        assert_eq!(OrderQuery::for_filter(None).status, OrderStatus::Pending);
        assert_eq!(
            OrderQuery::for_filter(Some(OrderStatus::Completed)).status,
            OrderStatus::Completed
        );
        assert!(OrderQuery::for_filter(None).newest_first);
    }
}
