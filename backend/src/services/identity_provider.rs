//! Adapters for the external identity provider's session admin API.

use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::Instrument;
use url::Url;

/// Operations this service needs from the identity provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(false)` only when the provider positively reports the auth session
    /// as gone.
    async fn is_session_active(&self, auth_session_id: &str) -> anyhow::Result<bool>;

    /// Invalidate the refresh/session token of one auth session. Idempotent.
    async fn invalidate_session(&self, auth_session_id: &str) -> anyhow::Result<()>;
}

/// Talks to `{base}/sessions/{auth_session_id}` with a service key.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: Url,
    service_key: String,
}

impl HttpIdentityProvider {
    pub fn new(base_url: &str, service_key: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
            service_key: service_key.into(),
        })
    }

    fn session_url(&self, auth_session_id: &str) -> anyhow::Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("identity provider URL cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(["sessions", auth_session_id]);
        Ok(url)
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn is_session_active(&self, auth_session_id: &str) -> anyhow::Result<bool> {
        let response = self
            .client
            .get(self.session_url(auth_session_id)?)
            .bearer_auth(&self.service_key)
            .send()
            .instrument(tracing::debug_span!("idp_session_lookup", auth_session_id))
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND | reqwest::StatusCode::GONE => Ok(false),
            status => Err(anyhow::anyhow!(
                "identity provider session lookup failed with status {}",
                status
            )),
        }
    }

    async fn invalidate_session(&self, auth_session_id: &str) -> anyhow::Result<()> {
        let response = self
            .client
            .delete(self.session_url(auth_session_id)?)
            .bearer_auth(&self.service_key)
            .send()
            .instrument(tracing::debug_span!("idp_invalidate_session", auth_session_id))
            .await?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(anyhow::anyhow!(
            "identity provider invalidation failed with status {}",
            status
        ))
    }
}

/// Provider used when no admin API is configured: every auth session is
/// active until invalidated through this process.
#[derive(Default)]
pub struct InMemoryIdentityProvider {
    invalidated: RwLock<HashSet<String>>,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn is_session_active(&self, auth_session_id: &str) -> anyhow::Result<bool> {
        Ok(!self.invalidated.read().await.contains(auth_session_id))
    }

    async fn invalidate_session(&self, auth_session_id: &str) -> anyhow::Result<()> {
        self.invalidated
            .write()
            .await
            .insert(auth_session_id.to_string());
        Ok(())
    }
}
