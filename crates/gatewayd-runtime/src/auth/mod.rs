//! Auth Core (spec §4.6): OAuth2 grant processing, static bearer fallback,
//! token stores with TTL cleanup, and the discovery document.

mod discovery;
mod middleware;
mod oauth;
mod token;

pub use discovery::{build_discovery_document, DiscoveryDocument};
pub(crate) use middleware::extract_bearer;
pub use middleware::{require_bearer, Identity};
pub use oauth::{AnyPasswordVerifier, AuthCore, ClientRegistry, GrantRequest, PasswordVerifier, TokenResponse};
pub use token::{AccessToken, RefreshToken, TokenStore};
