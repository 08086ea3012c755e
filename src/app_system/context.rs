use std::sync::Arc;

use crate::backend::{AuthApi, OrderStore};
use crate::realtime::RealtimeHub;
use crate::router::Navigator;
use crate::session_store::SessionStore;
use crate::toast::Toaster;

/// Everything a view needs, passed explicitly instead of living in globals.
#[derive(Clone)]
pub struct AppContext {
    pub session: SessionStore,
    pub auth: Arc<dyn AuthApi>,
    pub orders: Arc<dyn OrderStore>,
    pub realtime: RealtimeHub,
    pub toaster: Toaster,
    pub navigator: Navigator,
}
