use chrono::Utc;
use tracing::{debug, info, warn};

use crate::app_system::AppContext;
use crate::domain::{Session, User};
use crate::router::Route;
use crate::session_store::SessionSubscription;

use super::render::render_header;

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutState {
    /// Session status not known yet.
    Loading,
    Unauthenticated,
    Authenticated(User),
}

/// Session gate around every protected view.
///
/// Holds a session subscription for as long as it is mounted; dropping the
/// layout unsubscribes.
pub struct ProtectedLayout {
    ctx: AppContext,
    subscription: SessionSubscription,
    state: LayoutState,
}

impl ProtectedLayout {
    pub fn mount(ctx: &AppContext) -> Self {
        Self {
            ctx: ctx.clone(),
            subscription: ctx.session.subscribe(),
            state: LayoutState::Loading,
        }
    }

    /// Reads the initial session and leaves the loading state.
    pub async fn resolve(&mut self) -> &LayoutState {
        let session = self.ctx.session.current();
        self.evaluate(session);
        &self.state
    }

    /// Waits for the next session change and re-evaluates.
    /// `None` once the session store is gone.
    pub async fn next_change(&mut self) -> Option<&LayoutState> {
        let session = self.subscription.changed().await?;
        self.evaluate(session);
        Some(&self.state)
    }

    fn evaluate(&mut self, session: Option<Session>) {
        let session = session.filter(|session| match session.expires_at {
            Some(expires_at) if expires_at <= Utc::now() => {
                info!("Stored session has expired");
                false
            }
            _ => true,
        });

        self.state = match session {
            Some(session) => LayoutState::Authenticated(session.user),
            None => {
                if self.state != LayoutState::Unauthenticated {
                    self.ctx.navigator.replace(Route::Login.path());
                }
                LayoutState::Unauthenticated
            }
        };
        debug!(state = ?self.state, "Layout state evaluated");
    }

    /// Signs out with the backend, clears the session, and goes to the login route.
    pub async fn sign_out(&self) {
        if let Some(session) = self.ctx.session.current() {
            if let Err(e) = self.ctx.auth.sign_out(&session).await {
                warn!(error = %e, "Backend sign-out failed; clearing local session anyway");
            }
        }
        self.ctx.session.set(None);
        self.ctx.navigator.navigate(Route::Login.path());
    }

    /// Header for the authenticated state; nothing otherwise.
    pub fn render_chrome(&self) -> Option<String> {
        match &self.state {
            LayoutState::Authenticated(user) => Some(render_header(user, self.ctx.navigator.current())),
            _ => None,
        }
    }
}
