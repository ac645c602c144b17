//! # Logincenter
//!
//! Client-side login and session management for applications hosted on a platform that hands
//! out single-use identity codes.
//!
//! This crate re-exports the workspace crates behind features:
//!
//! - `session`: [`session`], the local session and its persistence.
//! - `flow`: [`flow`], the login pipeline, [`LoginCenter`] and the request gateway.
//! - `store-file`: a file-backed [`session::FileStore`].
//! - `reqwest`: a `reqwest`-based [`flow::ReqwestTransport`].
//!
//! ```no_run
//! # #[cfg(all(feature = "reqwest", feature = "store-file"))]
//! # async fn run(platform: std::sync::Arc<dyn logincenter::HostPlatform>) -> Result<(), logincenter::AuthError> {
//! use logincenter::{LoginCenter, LoginConfig, LoginMode, RequestOptions};
//! use std::sync::Arc;
//!
//! let center = LoginCenter::builder(LoginConfig::from_env()?)
//!     .store(Arc::new(logincenter::session::FileStore::new(".logincenter")))
//!     .platform(platform)
//!     .reqwest_transport()
//!     .build()
//!     .await?;
//!
//! let result = center.login(LoginMode::Common).await;
//! if result.is_ok() {
//!     let body = center
//!         .request_with_login(RequestOptions::get("https://api.example.com/order/list"))
//!         .await?;
//!     println!("{body}");
//! }
//! # Ok(())
//! # }
//! ```

pub use logincenter_core::{
    AccountProfile, AuthError, CallDeduplicator, ConsentFailure, ConsentOutcome,
    ConsentedProfile, HostPlatform, IdentityCode, LocalProfile, LoginCode, LoginMode,
    LoginResult, PermissionSettings, Transport, TransportError,
};

#[cfg(feature = "session")]
pub use logincenter_session as session;
#[cfg(feature = "session")]
pub use logincenter_session::{KeyValueStore, MemoryStore, SessionManager};

#[cfg(feature = "flow")]
pub use logincenter_flow as flow;
#[cfg(feature = "flow")]
pub use logincenter_flow::{
    ApiResponse, LoginCenter, LoginCenterBuilder, LoginConfig, RequestOptions,
};
