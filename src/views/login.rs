use tracing::{error, info, instrument};

use crate::app_system::AppContext;
use crate::domain::{Credentials, User};
use crate::error::AuthError;

/// Credential form. Authentication itself is the session backend's job.
pub struct LoginView {
    ctx: AppContext,
}

impl LoginView {
    pub fn new(ctx: &AppContext) -> Self {
        Self { ctx: ctx.clone() }
    }

    /// Signs in and, on success, stores the session and runs `on_login`.
    #[instrument(skip(self, credentials, on_login), fields(email = %credentials.email))]
    pub async fn submit<F>(&self, credentials: Credentials, on_login: F) -> Result<User, AuthError>
    where
        F: FnOnce(),
    {
        if credentials.email.trim().is_empty() || credentials.password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let session = self.ctx.auth.sign_in(&credentials).await.map_err(|e| {
            error!(error = %e, "Sign-in failed");
            e
        })?;

        let user = session.user.clone();
        self.ctx.session.set(Some(session));
        info!(user_id = %user.id, "Login succeeded");
        on_login();
        Ok(user)
    }

    pub fn render(&self) -> String {
        "Sign in to manage orders\n  login <email> <password>\n".to_string()
    }
}
