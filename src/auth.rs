//! Turning the caller's bearer token into a user.
//!
//! The identity provider is the store's auth endpoint: we hand it the token
//! the front end got at login and it tells us who that is. We never look
//! inside the token ourselves.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use lambda_http::http::{header::AUTHORIZATION, HeaderMap};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

const IDENTITY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct AuthenticatedUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// `Ok(None)` means the provider didn't recognize the token.
    async fn user_from_token(&self, token: &str) -> Result<Option<AuthenticatedUser>>;
}

/// Extract the token from an `Authorization: Bearer ...` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();

    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[derive(Clone, Debug)]
pub struct HttpAuthProvider {
    http: reqwest::Client,
    user_url: String,
    anon_key: String,
}

impl HttpAuthProvider {
    pub fn new(store_url: &str, anon_key: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(IDENTITY_TIMEOUT)
            .build()
            .context("failed to build HTTP client for the identity provider")?;

        Ok(HttpAuthProvider {
            http,
            user_url: format!("{}/auth/v1/user", store_url.trim_end_matches('/')),
            anon_key: anon_key.to_owned(),
        })
    }
}

#[async_trait]
impl AuthProvider for HttpAuthProvider {
    async fn user_from_token(&self, token: &str) -> Result<Option<AuthenticatedUser>> {
        let resp = self
            .http
            .get(&self.user_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .context("identity provider request failed")?;

        match resp.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                return Ok(None)
            }
            other => bail!("identity provider responded with {}", other),
        }

        let user: AuthenticatedUser = resp
            .json()
            .await
            .context("failed to decode identity provider response")?;

        if user.id.is_empty() {
            return Ok(None);
        }

        Ok(Some(user))
    }
}
