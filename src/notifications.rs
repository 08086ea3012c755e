//! Desktop notifications for newly placed orders.
//!
//! [`setup_notifications`] is called once the app has a session. It asks for
//! permission if nobody has decided yet and, when granted, shows a
//! notification for every order inserted from then on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::app_system::AppContext;
use crate::domain::format_money;
use crate::realtime::{ChangeKind, EventFilter, ORDERS_TABLE};

pub const NEW_ORDER_TITLE: &str = "New Order Received!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPermission {
    /// The user has not been asked yet.
    #[default]
    Default,
    Granted,
    Denied,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DesktopNotification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
}

pub type NotificationId = u64;

/// Runs when the user clicks a notification.
pub type ClickHandler = Box<dyn FnOnce(&dyn NotificationCenter, NotificationId) + Send>;

/// The host's notification capability.
#[async_trait]
pub trait NotificationCenter: Send + Sync {
    fn permission(&self) -> NotificationPermission;

    /// Prompts the user; returns the answer (which becomes the new permission).
    async fn request_permission(&self) -> NotificationPermission;

    fn show(&self, notification: DesktopNotification, on_click: ClickHandler) -> NotificationId;

    /// Brings the application window to the front.
    fn focus_window(&self);

    fn close(&self, id: NotificationId);
}

/// Builds the notification for an inserted order row.
pub fn new_order_notification(record: &Value, icon: &str) -> Option<DesktopNotification> {
    let id = match record.get("id")? {
        Value::String(id) => id.clone(),
        Value::Number(id) => id.to_string(),
        _ => return None,
    };
    let total = record.get("total_amount")?.as_f64()?;
    Some(DesktopNotification {
        title: NEW_ORDER_TITLE.to_string(),
        body: format!("Order #{} - {}", id, format_money(total)),
        icon: icon.to_string(),
        badge: icon.to_string(),
    })
}

/// Background task showing new-order notifications. Aborted on drop.
pub struct NotificationTask {
    handle: JoinHandle<()>,
}

impl NotificationTask {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for NotificationTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// One-shot setup. Every failure path degrades silently with a log line.
#[instrument(skip_all)]
pub async fn setup_notifications(
    ctx: &AppContext,
    center: Option<Arc<dyn NotificationCenter>>,
    icon: &str,
) -> Option<NotificationTask> {
    let Some(center) = center else {
        info!("This terminal does not support notifications");
        return None;
    };

    let Some(session) = ctx.session.current() else {
        info!("User is not logged in. Notifications disabled.");
        return None;
    };
    match ctx.auth.get_user(&session).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            info!("Session no longer valid. Notifications disabled.");
            return None;
        }
        Err(e) => {
            warn!(error = %e, "Could not verify user. Notifications disabled.");
            return None;
        }
    }

    let mut permission = center.permission();
    if permission == NotificationPermission::Default {
        permission = center.request_permission().await;
    }
    if permission != NotificationPermission::Granted {
        info!(?permission, "Notification permission not granted");
        return None;
    }

    let mut inserts = ctx
        .realtime
        .subscribe(ORDERS_TABLE, EventFilter::Only(ChangeKind::Insert));
    let icon = icon.to_string();
    let handle = tokio::spawn(async move {
        while let Some(event) = inserts.recv().await {
            let Some(notification) = event
                .record
                .as_ref()
                .and_then(|record| new_order_notification(record, &icon))
            else {
                warn!("Inserted order row lacks id or total; no notification");
                continue;
            };
            let id = center.show(
                notification,
                Box::new(|center: &dyn NotificationCenter, id: NotificationId| {
                    center.focus_window();
                    center.close(id);
                }),
            );
            debug!(notification_id = id, "New order notification shown");
        }
    });

    info!("New order notifications enabled");
    Some(NotificationTask { handle })
}

// =============================================================================
// CONSOLE IMPLEMENTATION
// =============================================================================

struct Shown {
    id: NotificationId,
    notification: DesktopNotification,
    on_click: Option<ClickHandler>,
}

/// Prints notifications as banners and keeps them until clicked.
pub struct ConsoleNotifier {
    permission: Mutex<NotificationPermission>,
    prompt_answer: NotificationPermission,
    shown: Mutex<Vec<Shown>>,
    next_id: AtomicU64,
    focus_requests: AtomicU64,
}

impl ConsoleNotifier {
    pub fn new(permission: NotificationPermission, prompt_answer: NotificationPermission) -> Self {
        Self {
            permission: Mutex::new(permission),
            prompt_answer,
            shown: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            focus_requests: AtomicU64::new(0),
        }
    }

    fn shown(&self) -> MutexGuard<'_, Vec<Shown>> {
        self.shown.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Notifications still on screen.
    pub fn visible(&self) -> Vec<(NotificationId, DesktopNotification)> {
        self.shown()
            .iter()
            .map(|shown| (shown.id, shown.notification.clone()))
            .collect()
    }

    /// Simulates a click; returns false for unknown ids.
    pub fn click(&self, id: NotificationId) -> bool {
        // Take the handler out first: it calls back into `close`.
        let handler = self
            .shown()
            .iter_mut()
            .find(|shown| shown.id == id)
            .and_then(|shown| shown.on_click.take());
        match handler {
            Some(handler) => {
                handler(self as &dyn NotificationCenter, id);
                true
            }
            None => false,
        }
    }

    pub fn focus_requests(&self) -> u64 {
        self.focus_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationCenter for ConsoleNotifier {
    fn permission(&self) -> NotificationPermission {
        *self.permission.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn request_permission(&self) -> NotificationPermission {
        info!(answer = ?self.prompt_answer, "Notification permission requested");
        *self.permission.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = self.prompt_answer;
        self.prompt_answer
    }

    fn show(&self, notification: DesktopNotification, on_click: ClickHandler) -> NotificationId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        println!("\x07🔔 {} {}  (click {})", notification.title, notification.body, id);
        self.shown().push(Shown {
            id,
            notification,
            on_click: Some(on_click),
        });
        id
    }

    fn focus_window(&self) {
        self.focus_requests.fetch_add(1, Ordering::SeqCst);
        debug!("Window focus requested");
    }

    fn close(&self, id: NotificationId) {
        self.shown().retain(|shown| shown.id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notification_body_has_id_and_total() {
        let note = new_order_notification(&json!({ "id": 42, "total_amount": 12.5 }), "/icon.svg").unwrap();
        assert_eq!(note.title, NEW_ORDER_TITLE);
        assert_eq!(note.body, "Order #42 - $12.50");
        assert_eq!(note.icon, "/icon.svg");
    }

    #[test]
    fn test_row_without_total_is_skipped() {
        assert!(new_order_notification(&json!({ "id": "7" }), "").is_none());
    }

    #[test]
    fn test_click_focuses_and_closes() {
        let notifier = ConsoleNotifier::new(NotificationPermission::Granted, NotificationPermission::Granted);
        let note = new_order_notification(&json!({ "id": "1", "total_amount": 3.0 }), "").unwrap();
        let id = notifier.show(
            note,
            Box::new(|center: &dyn NotificationCenter, id: NotificationId| {
                center.focus_window();
                center.close(id);
            }),
        );
        assert_eq!(notifier.visible().len(), 1);

        assert!(notifier.click(id));
        assert!(notifier.visible().is_empty());
        assert_eq!(notifier.focus_requests(), 1);
        assert!(!notifier.click(id));
    }

    #[tokio::test]
    async fn test_request_permission_takes_prompt_answer() {
        let notifier = ConsoleNotifier::new(NotificationPermission::Default, NotificationPermission::Denied);
        assert_eq!(notifier.request_permission().await, NotificationPermission::Denied);
        assert_eq!(notifier.permission(), NotificationPermission::Denied);
    }
}
