//! Process-wide session state, passed around explicitly in the app context.

use tokio::sync::watch;
use tracing::{debug, info};

use crate::domain::Session;

/// Holds the current session and fans out session changes.
#[derive(Clone)]
pub struct SessionStore {
    sender: watch::Sender<Option<Session>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    pub fn current(&self) -> Option<Session> {
        self.sender.borrow().clone()
    }

    /// Replaces the session and notifies every subscriber.
    pub fn set(&self, session: Option<Session>) {
        match &session {
            Some(session) => info!(user_email = %session.user.email, "Session established"),
            None => info!("Session cleared"),
        }
        self.sender.send_replace(session);
    }

    pub fn subscribe(&self) -> SessionSubscription {
        debug!("Session subscription opened");
        SessionSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Session-change listener. Dropping it unsubscribes.
pub struct SessionSubscription {
    receiver: watch::Receiver<Option<Session>>,
}

impl SessionSubscription {
    /// Waits for the next session change and returns the new value.
    /// `None` from the outer option means the store is gone.
    pub async fn changed(&mut self) -> Option<Option<Session>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        debug!("Session subscription closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::User;

    fn session_for(email: &str) -> Session {
        Session {
            access_token: "token".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: None,
            user: User {
                id: "u1".to_string(),
                email: email.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_subscriber_sees_sign_in_and_sign_out() {
        let store = SessionStore::new();
        let mut subscription = store.subscribe();

        store.set(Some(session_for("staff@example.com")));
        let next = subscription.changed().await.unwrap();
        assert_eq!(next.unwrap().user.email, "staff@example.com");

        store.set(None);
        assert_eq!(subscription.changed().await, Some(None));
    }

    #[test]
    fn test_dropping_subscription_releases_listener() {
        let store = SessionStore::new();
        let subscription = store.subscribe();
        assert_eq!(store.subscriber_count(), 1);
        drop(subscription);
        assert_eq!(store.subscriber_count(), 0);
    }
}
