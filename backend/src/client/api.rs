use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

use crate::services::{TrackVerdict, ValidityVerdict};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    UnexpectedStatus(StatusCode),
    #[error("invalid base url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("not signed in")]
    MissingCredentials,
}

/// Heartbeat answer as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatStatus {
    Active { created: bool },
    Revoked,
}

/// Calls a device makes against its own session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn heartbeat(&self) -> Result<HeartbeatStatus, ClientError>;
    async fn check_validity(&self) -> Result<ValidityVerdict, ClientError>;
}

pub struct HttpSessionApi {
    client: reqwest::Client,
    base_url: Url,
    access_token: RwLock<Option<String>>,
}

impl HttpSessionApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            client,
            base_url,
            access_token: RwLock::new(None),
        })
    }

    /// Replaces the bearer token after sign-in or refresh.
    pub async fn set_access_token(&self, token: impl Into<String>) {
        *self.access_token.write().await = Some(token.into());
    }

    pub async fn clear_access_token(&self) {
        *self.access_token.write().await = None;
    }

    async fn bearer(&self) -> Result<String, ClientError> {
        self.access_token
            .read()
            .await
            .clone()
            .ok_or(ClientError::MissingCredentials)
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn heartbeat(&self) -> Result<HeartbeatStatus, ClientError> {
        let response = self
            .client
            .post(self.base_url.join("api/auth/track-session")?)
            .bearer_auth(self.bearer().await?)
            .send()
            .await?;

        // A 403 means revoked even when the body is missing or unreadable.
        if response.status() == StatusCode::FORBIDDEN {
            return Ok(HeartbeatStatus::Revoked);
        }
        if !response.status().is_success() {
            return Err(ClientError::UnexpectedStatus(response.status()));
        }

        let verdict: TrackVerdict = response.json().await?;
        Ok(if verdict.revoked {
            HeartbeatStatus::Revoked
        } else {
            HeartbeatStatus::Active {
                created: verdict.created,
            }
        })
    }

    async fn check_validity(&self) -> Result<ValidityVerdict, ClientError> {
        let response = self
            .client
            .get(self.base_url.join("api/sessions/check")?)
            .bearer_auth(self.bearer().await?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::UnexpectedStatus(response.status()));
        }
        Ok(response.json().await?)
    }
}
