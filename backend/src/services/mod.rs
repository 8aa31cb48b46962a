pub mod geolocation;
pub mod identity_provider;
pub mod registrar;
pub mod revocation;

pub use geolocation::{DisabledGeoLocator, GeoLocator, HttpGeoLocator};
pub use identity_provider::{HttpIdentityProvider, IdentityProvider, InMemoryIdentityProvider};
pub use registrar::{
    InvalidReason, RequestMetadata, SessionRegistrar, SessionView, TrackVerdict, ValidityVerdict,
};
pub use revocation::{
    BulkRevocation, RevocationService, RevokeOutcome, SignOutOutcome, SignOutScope,
};
