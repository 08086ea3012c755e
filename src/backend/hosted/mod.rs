//! Client for the hosted backend-as-a-service.
//!
//! Auth, row reads/updates and change notifications live behind three
//! endpoints of the same project URL:
//! - `/auth/v1/*`       token-based session service
//! - `/rest/v1/*`       table access with column filters and embedded joins
//! - `/realtime/v1/*`   websocket change feed

pub mod auth;
pub mod realtime;
pub mod rest;

pub use auth::HostedAuth;
pub use realtime::RealtimeBridge;
pub use rest::RestOrderStore;

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;

use crate::session_store::SessionStore;

/// Shared HTTP plumbing for the hosted services.
#[derive(Clone)]
pub struct HostedClient {
    http: Client,
    base_url: String,
    anon_key: String,
    session: SessionStore,
}

impl HostedClient {
    pub fn new(
        base_url: &str,
        anon_key: &str,
        timeout: Duration,
        session: SessionStore,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            session,
        })
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    /// Request carrying the project key and the current user's token
    /// (or the project key when nobody is signed in).
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let token = self
            .session
            .current()
            .map(|session| session.access_token)
            .unwrap_or_else(|| self.anon_key.clone());
        self.request_with_token(method, path, &token)
    }

    pub fn request_with_token(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

/// Status code and the most useful message the service put in the body.
pub(crate) async fn error_details(response: Response) -> (u16, String) {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.message.or(body.msg).or(body.error_description).or(body.error))
        .unwrap_or(text);
    (status, message)
}
