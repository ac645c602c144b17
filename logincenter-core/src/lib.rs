//! # Logincenter Core
//!
//! `logincenter-core` provides the foundational traits and types for the logincenter login
//! manager. It defines the boundary to the host platform and the network transport, the
//! profiles and results that flow through a login, and the keyed call deduplication used to
//! collapse concurrent login steps.

#![warn(missing_docs)]

use async_trait::async_trait;

/// Errors that can occur during login and authenticated requests.
pub mod error;
pub use crate::error::{AuthError, StepError, TransportError};

/// Profiles and platform payloads.
pub mod state;
pub use crate::state::{
    AccountProfile, ConsentFailure, ConsentOutcome, ConsentedProfile, IdentityCode, LocalProfile,
    PermissionSettings, SessionCredentials,
};

/// Login results, codes and modes.
pub mod result;
pub use crate::result::{LoginCode, LoginMode, LoginResult};

pub mod dedupe;
pub use crate::dedupe::CallDeduplicator;

/// Identity and consent APIs offered by the host platform.
#[async_trait]
pub trait HostPlatform: Send + Sync {
    /// Obtain a fresh single-use identity code.
    async fn external_identity_code(&self) -> Result<IdentityCode, AuthError>;

    /// Ask the user to release their profile.
    async fn consented_profile(&self) -> ConsentOutcome;

    /// Open the platform permission settings and report the resulting grant.
    async fn open_permission_settings(&self) -> Result<PermissionSettings, AuthError>;

    /// Show the explanatory prompt preceding the permission settings.
    async fn show_denial_prompt(&self, _text: &str) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Performs exactly one HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and return the raw response.
    async fn send(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> Result<http::Response<Vec<u8>>, TransportError>;
}

#[async_trait]
impl<T: HostPlatform + ?Sized> HostPlatform for std::sync::Arc<T> {
    async fn external_identity_code(&self) -> Result<IdentityCode, AuthError> {
        (**self).external_identity_code().await
    }

    async fn consented_profile(&self) -> ConsentOutcome {
        (**self).consented_profile().await
    }

    async fn open_permission_settings(&self) -> Result<PermissionSettings, AuthError> {
        (**self).open_permission_settings().await
    }

    async fn show_denial_prompt(&self, text: &str) -> Result<(), AuthError> {
        (**self).show_denial_prompt(text).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> Result<http::Response<Vec<u8>>, TransportError> {
        (**self).send(request).await
    }
}
