//! Route table and navigation state.

use std::fmt;

use tokio::sync::watch;
use tracing::info;

use crate::domain::OrderStatus;
use crate::views::OrderListProps;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    /// `/`: pending orders, actions enabled.
    NewOrders,
    Processing,
    Completed,
}

impl Route {
    pub const NAV: [Route; 3] = [Route::NewOrders, Route::Processing, Route::Completed];

    /// Unknown paths land on the main view.
    pub fn parse(path: &str) -> Self {
        let path = path.trim();
        let path = path.split(['?', '#']).next().unwrap_or_default();
        match path.trim_end_matches('/') {
            "/login" | "login" => Route::Login,
            "/processing" | "processing" => Route::Processing,
            "/completed" | "completed" => Route::Completed,
            _ => Route::NewOrders,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::NewOrders => "/",
            Route::Processing => "/processing",
            Route::Completed => "/completed",
        }
    }

    pub fn nav_label(&self) -> &'static str {
        match self {
            Route::Login => "Login",
            Route::NewOrders => "New Orders",
            Route::Processing => "Processing",
            Route::Completed => "Completed",
        }
    }

    /// Order list configuration for protected routes.
    pub fn list_props(&self) -> Option<OrderListProps> {
        match self {
            Route::Login => None,
            Route::NewOrders => Some(OrderListProps::default()),
            Route::Processing => Some(OrderListProps {
                status: Some(OrderStatus::Processing),
                show_actions: true,
            }),
            Route::Completed => Some(OrderListProps {
                status: Some(OrderStatus::Completed),
                show_actions: false,
            }),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Current route plus change notification.
#[derive(Clone)]
pub struct Navigator {
    sender: watch::Sender<Route>,
}

impl Navigator {
    pub fn new(start: Route) -> Self {
        let (sender, _) = watch::channel(start);
        Self { sender }
    }

    pub fn current(&self) -> Route {
        *self.sender.borrow()
    }

    pub fn navigate(&self, path: &str) -> Route {
        let route = Route::parse(path);
        info!(route = %route, "Navigate");
        self.sender.send_replace(route);
        route
    }

    /// Navigation that replaces the current history entry (redirects).
    pub fn replace(&self, path: &str) -> Route {
        let route = Route::parse(path);
        info!(route = %route, "Redirect");
        self.sender.send_replace(route);
        route
    }

    pub fn subscribe(&self) -> watch::Receiver<Route> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_table() {
        assert_eq!(Route::parse("/login"), Route::Login);
        assert_eq!(Route::parse("/"), Route::NewOrders);
        assert_eq!(Route::parse("/processing/"), Route::Processing);
        assert_eq!(Route::parse("/completed?page=2"), Route::Completed);
        assert_eq!(Route::parse("/nowhere"), Route::NewOrders);
    }

    #[test]
    fn test_list_props_per_route() {
        let pending = Route::NewOrders.list_props().unwrap();
        assert_eq!(pending.status, None);
        assert!(pending.show_actions);

        let processing = Route::Processing.list_props().unwrap();
        assert_eq!(processing.status, Some(OrderStatus::Processing));
        assert!(processing.show_actions);

        let completed = Route::Completed.list_props().unwrap();
        assert_eq!(completed.status, Some(OrderStatus::Completed));
        assert!(!completed.show_actions);

        assert!(Route::Login.list_props().is_none());
    }

    #[test]
    fn test_navigator_tracks_current_route() {
        let navigator = Navigator::new(Route::Login);
        let mut watcher = navigator.subscribe();
        navigator.navigate("/completed");
        assert_eq!(navigator.current(), Route::Completed);
        assert!(watcher.has_changed().unwrap());
        assert_eq!(*watcher.borrow_and_update(), Route::Completed);
    }
}
