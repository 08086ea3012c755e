use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::{error_details, HostedClient};
use crate::backend::AuthApi;
use crate::domain::{Credentials, Session, User};
use crate::error::AuthError;

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = match (self.expires_at, self.expires_in) {
            (Some(at), _) => DateTime::from_timestamp(at, 0),
            (None, Some(secs)) => Some(Utc::now() + Duration::seconds(secs)),
            (None, None) => None,
        };
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// Session service of the hosted backend.
#[derive(Clone)]
pub struct HostedAuth {
    client: HostedClient,
}

impl HostedAuth {
    pub fn new(client: HostedClient) -> Self {
        Self { client }
    }

    /// Exchanges a grant at the token endpoint. 400/401 mean the grant is no good.
    async fn token<B: Serialize + ?Sized>(&self, grant_type: &str, body: &B) -> Result<Session, AuthError> {
        let response = self
            .client
            .request_with_token(Method::POST, "/auth/v1/token", self.client.anon_key())
            .query(&[("grant_type", grant_type)])
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let (status, message) = error_details(response).await;
            warn!(status, message = %message, grant_type, "Token request rejected");
            return Err(match status {
                400 | 401 => AuthError::InvalidCredentials(message),
                _ => AuthError::Rejected { status, message },
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Decode(e.to_string()))?;
        Ok(token.into_session())
    }
}

#[async_trait]
impl AuthApi for HostedAuth {
    #[instrument(skip(self))]
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        debug!("Sending request");
        let grant = PasswordGrant {
            email: &credentials.email,
            password: &credentials.password,
        };
        let session = self.token("password", &grant).await?;
        info!(user_id = %session.user.id, "Signed in");
        Ok(session)
    }

    #[instrument(skip(self, session), fields(user_id = %session.user.id))]
    async fn refresh_session(&self, session: &Session) -> Result<Session, AuthError> {
        if session.refresh_token.is_empty() {
            return Err(AuthError::NotSignedIn);
        }
        debug!("Sending request");
        let grant = RefreshGrant {
            refresh_token: &session.refresh_token,
        };
        let fresh = self.token("refresh_token", &grant).await?;
        info!(expires_at = ?fresh.expires_at, "Session refreshed");
        Ok(fresh)
    }

    #[instrument(skip(self, session), fields(user_id = %session.user.id))]
    async fn get_user(&self, session: &Session) -> Result<Option<User>, AuthError> {
        debug!("Sending request");
        let response = self
            .client
            .request_with_token(Method::GET, "/auth/v1/user", &session.access_token)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status if status.is_success() => response
                .json::<User>()
                .await
                .map(Some)
                .map_err(|e| AuthError::Decode(e.to_string())),
            _ => {
                let (status, message) = error_details(response).await;
                Err(AuthError::Rejected { status, message })
            }
        }
    }

    #[instrument(skip(self, session), fields(user_id = %session.user.id))]
    async fn sign_out(&self, session: &Session) -> Result<(), AuthError> {
        debug!("Sending request");
        let response = self
            .client
            .request_with_token(Method::POST, "/auth/v1/logout", &session.access_token)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let (status, message) = error_details(response).await;
            return Err(AuthError::Rejected { status, message });
        }
        info!("Signed out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_prefers_absolute_expiry() {
        let body = serde_json::json!({
            "access_token": "a",
            "refresh_token": "r",
            "expires_in": 3600,
            "expires_at": 1_700_000_000,
            "user": { "id": "u1", "email": "staff@grocer.test" }
        });
        let session = serde_json::from_value::<TokenResponse>(body).unwrap().into_session();
        assert_eq!(session.expires_at.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(session.user.email, "staff@grocer.test");
    }

    #[test]
    fn test_refresh_grant_body() {
        let body = serde_json::to_value(RefreshGrant { refresh_token: "r-1" }).unwrap();
        assert_eq!(body, serde_json::json!({ "refresh_token": "r-1" }));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_is_not_signed_in() {
        let client = HostedClient::new(
            "http://127.0.0.1:9",
            "anon",
            std::time::Duration::from_secs(1),
            crate::session_store::SessionStore::new(),
        )
        .unwrap();
        let session = Session {
            access_token: "a".to_string(),
            refresh_token: String::new(),
            expires_at: None,
            user: User { id: "u1".to_string(), email: String::new() },
        };
        let result = HostedAuth::new(client).refresh_session(&session).await;
        assert_eq!(result, Err(AuthError::NotSignedIn));
    }

    #[test]
    fn test_token_response_relative_expiry() {
        let body = serde_json::json!({
            "access_token": "a",
            "expires_in": 60,
            "user": { "id": "u1" }
        });
        let session = serde_json::from_value::<TokenResponse>(body).unwrap().into_session();
        assert!(session.expires_at.unwrap() > Utc::now());
        assert!(session.refresh_token.is_empty());
    }
}
