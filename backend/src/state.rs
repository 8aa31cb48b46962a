use std::sync::Arc;

use crate::{
    config::Config,
    repositories::SessionStore,
    services::{GeoLocator, IdentityProvider, RevocationService, SessionRegistrar},
};

#[derive(Clone)]
pub struct AppState {
    pub registrar: Arc<SessionRegistrar>,
    pub revocation: Arc<RevocationService>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires both services over the same store and identity provider.
    pub fn new(
        config: Config,
        store: Arc<dyn SessionStore>,
        identity_provider: Arc<dyn IdentityProvider>,
        geo_locator: Arc<dyn GeoLocator>,
    ) -> Self {
        let registrar = SessionRegistrar::new(
            store.clone(),
            identity_provider.clone(),
            geo_locator,
            config.store_timeout,
            config.geolocation_timeout,
        );
        let revocation = RevocationService::new(store, identity_provider, config.store_timeout);
        Self {
            registrar: Arc::new(registrar),
            revocation: Arc::new(revocation),
            config: Arc::new(config),
        }
    }

    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt_secret
    }
}
