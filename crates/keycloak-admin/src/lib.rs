//! # Keycloak Admin
//!
//! Rust client for the Keycloak admin REST API, scoped to what roster
//! synchronization needs: paginated retrieval of users, groups, and group
//! members, plus membership and user mutations.
//!
//! Authentication uses the OAuth2 client-credentials grant with a cached
//! access token. The client implements [`sync_common::IdentityProvider`], so
//! the sync engine never sees HTTP details.

pub mod backoff;
pub mod client;
pub mod models;
pub mod pagination;
pub mod token;

pub use backoff::{Backoff, BackoffPolicy};
pub use client::KeycloakAdminClient;
pub use models::{KeycloakGroup, KeycloakUser};
pub use pagination::Pager;
pub use token::{CachedToken, TokenResponse, EXPIRY_MARGIN};
