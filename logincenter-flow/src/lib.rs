//! # Logincenter Flow
//!
//! `logincenter-flow` runs the login pipeline and the authenticated request gateway on top of
//! the core traits and the session crate.
//!
//! ## Key Components
//!
//! - **[`LoginCenter`]**: The service applications talk to: login, logout and authenticated
//!   requests.
//! - **[`LoginCenterBuilder`]**: Wires the store, host platform, transport and hooks together.
//! - **[`LoginOrchestrator`]**: The step-by-step login pipeline.
//! - **[`RequestGateway`]**: Attaches credentials to requests and captures refreshed ones.

#![warn(missing_docs)]

use logincenter_core::{
    AccountProfile, AuthError, CallDeduplicator, HostPlatform, LocalProfile, LoginMode,
    LoginResult, Transport,
};
use logincenter_session::cookie::{ACCOUNT_ID_COOKIE, SESSION_SECRET_COOKIE, SOURCE_COOKIE};
use logincenter_session::{KeyValueStore, SessionManager};
use serde_json::Value;
use std::sync::Arc;

/// Static configuration.
pub mod config;
/// Request gateway and the authenticated request cycle.
pub mod gateway;
pub mod hooks;
pub mod orchestrator;
/// Request and response types of the gateway.
pub mod request;
/// `reqwest`-based transport.
#[cfg(feature = "reqwest")]
pub mod transport;

pub use config::{AuthFailRule, Endpoints, LoginConfig};
pub use gateway::{Authenticate, RequestGateway};
pub use hooks::{
    AddOnOutcome, AddOnStep, AuthFailurePredicate, BeforeRequest, ConsentHandler,
    ConsentObserver, DenyHandler, ErrMsgContains, Hooks, LoginFailedHook, RespCodeForPath,
    RetryHook, TransportRecovery,
};
pub use orchestrator::LoginOrchestrator;
pub use request::{ApiResponse, RequestOptions};
#[cfg(feature = "reqwest")]
pub use transport::ReqwestTransport;

/// Marker for a missing component in the typestate pattern.
#[derive(Clone, Default)]
pub struct Missing;

/// Marker for a configured component in the typestate pattern.
#[derive(Clone)]
pub struct Configured<T>(pub T);

/// The login manager of one application instance.
///
/// Cloning is cheap; clones share the session and the in-flight login steps.
#[derive(Clone)]
pub struct LoginCenter {
    config: Arc<LoginConfig>,
    session: Arc<SessionManager>,
    gateway: Arc<RequestGateway>,
    orchestrator: LoginOrchestrator,
}

impl LoginCenter {
    /// Create a new [`LoginCenterBuilder`] for `config`.
    pub fn builder(config: LoginConfig) -> LoginCenterBuilder<Missing, Missing, Missing> {
        LoginCenterBuilder::new(config)
    }

    /// Log in. See [`LoginMode`] for what each mode may do.
    pub async fn login(&self, mode: LoginMode) -> LoginResult {
        self.orchestrator.login(mode).await
    }

    /// Drop the local session. The tracking token survives.
    pub async fn logout(&self) -> LoginResult {
        self.session.clear().await;
        LoginResult::ok()
    }

    /// Log out, then log in again in [`LoginMode::Common`].
    pub async fn re_login(&self) -> LoginResult {
        self.logout().await;
        self.login(LoginMode::Common).await
    }

    /// Whether a session is held locally. The backend is not consulted.
    pub async fn check_login(&self) -> bool {
        self.session.is_logged_in().await
    }

    /// Send a request with the current credentials, without logging in first.
    pub async fn request(&self, options: RequestOptions) -> Result<ApiResponse, AuthError> {
        self.gateway.request(options).await
    }

    /// Log in if needed, send the request and return its body, retrying once after the
    /// backend rejects the session.
    pub async fn request_with_login(&self, options: RequestOptions) -> Result<Value, AuthError> {
        self.request_with_login_opts(options, true).await
    }

    /// Like [`request_with_login`](Self::request_with_login) with the retry made optional.
    pub async fn request_with_login_opts(
        &self,
        options: RequestOptions,
        retry_on_auth_fail: bool,
    ) -> Result<Value, AuthError> {
        self.gateway
            .request_with_login(&self.orchestrator, options, retry_on_auth_fail)
            .await
    }

    /// Provision the anonymous tracking token if none exists.
    pub async fn ensure_tracking_token(&self) {
        self.gateway.ensure_tracking_token().await
    }

    /// Snapshot of the platform profile.
    pub async fn user_info(&self) -> LocalProfile {
        self.session.local_profile().await
    }

    /// Snapshot of the account profile.
    pub async fn account_info(&self) -> AccountProfile {
        self.session.account_profile().await
    }

    /// The configuration.
    pub fn config(&self) -> &LoginConfig {
        &self.config
    }

    /// The session.
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// The request gateway.
    pub fn gateway(&self) -> &Arc<RequestGateway> {
        &self.gateway
    }

    /// The login pipeline.
    pub fn orchestrator(&self) -> &LoginOrchestrator {
        &self.orchestrator
    }
}

impl std::fmt::Debug for LoginCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCenter")
            .field("config", &self.config)
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

/// A builder for configuring and creating a [`LoginCenter`].
///
/// The store, the host platform and the transport are mandatory; [`build`](Self::build) only
/// exists once all three are configured.
pub struct LoginCenterBuilder<S, P, T> {
    config: LoginConfig,
    store: S,
    platform: P,
    transport: T,
    hooks: Hooks,
    predicates: Vec<Arc<dyn AuthFailurePredicate>>,
}

impl LoginCenterBuilder<Missing, Missing, Missing> {
    /// Start from `config` with nothing configured.
    pub fn new(config: LoginConfig) -> Self {
        Self {
            config,
            store: Missing,
            platform: Missing,
            transport: Missing,
            hooks: Hooks::default(),
            predicates: Vec::new(),
        }
    }
}

impl<S, P, T> LoginCenterBuilder<S, P, T> {
    /// Set the persistent store.
    pub fn store(
        self,
        store: Arc<dyn KeyValueStore>,
    ) -> LoginCenterBuilder<Configured<Arc<dyn KeyValueStore>>, P, T> {
        LoginCenterBuilder {
            config: self.config,
            store: Configured(store),
            platform: self.platform,
            transport: self.transport,
            hooks: self.hooks,
            predicates: self.predicates,
        }
    }

    /// Set the host platform.
    pub fn platform(
        self,
        platform: Arc<dyn HostPlatform>,
    ) -> LoginCenterBuilder<S, Configured<Arc<dyn HostPlatform>>, T> {
        LoginCenterBuilder {
            config: self.config,
            store: self.store,
            platform: Configured(platform),
            transport: self.transport,
            hooks: self.hooks,
            predicates: self.predicates,
        }
    }

    /// Set the transport.
    pub fn transport(
        self,
        transport: Arc<dyn Transport>,
    ) -> LoginCenterBuilder<S, P, Configured<Arc<dyn Transport>>> {
        LoginCenterBuilder {
            config: self.config,
            store: self.store,
            platform: self.platform,
            transport: Configured(transport),
            hooks: self.hooks,
            predicates: self.predicates,
        }
    }

    /// Send requests through a default [`ReqwestTransport`].
    #[cfg(feature = "reqwest")]
    pub fn reqwest_transport(self) -> LoginCenterBuilder<S, P, Configured<Arc<dyn Transport>>> {
        self.transport(Arc::new(ReqwestTransport::new()))
    }

    /// Add an auth-failure predicate. Predicates added here are evaluated in insertion order,
    /// before the configured rules and the built-in signatures.
    pub fn auth_failure_predicate(
        mut self,
        predicate: impl AuthFailurePredicate + 'static,
    ) -> Self {
        self.predicates.push(Arc::new(predicate));
        self
    }

    /// Replace the platform consent prompt.
    pub fn consent_handler(mut self, handler: impl ConsentHandler + 'static) -> Self {
        self.hooks.consent_handler = Some(Arc::new(handler));
        self
    }

    /// Replace the interaction run after the consent was denied.
    pub fn deny_handler(mut self, handler: impl DenyHandler + 'static) -> Self {
        self.hooks.deny_handler = Some(Arc::new(handler));
        self
    }

    /// Observe consent outcomes.
    pub fn consent_observer(mut self, observer: impl ConsentObserver + 'static) -> Self {
        self.hooks.consent_observer = Some(Arc::new(observer));
        self
    }

    /// Verify every fresh session with `step`.
    pub fn add_on(mut self, step: impl AddOnStep + 'static) -> Self {
        self.hooks.add_on = Some(Arc::new(step));
        self
    }

    /// Rewrite request options before they are sent.
    pub fn before_request(mut self, hook: impl BeforeRequest + 'static) -> Self {
        self.hooks.before_request = Some(Arc::new(hook));
        self
    }

    /// Recover from transport failures.
    pub fn transport_recovery(mut self, recovery: impl TransportRecovery + 'static) -> Self {
        self.hooks.transport_recovery = Some(Arc::new(recovery));
        self
    }

    /// Replace the built-in retry after an auth failure.
    pub fn retry_hook(mut self, hook: impl RetryHook + 'static) -> Self {
        self.hooks.retry = Some(Arc::new(hook));
        self
    }

    /// Be notified of failed logins.
    pub fn login_failed(mut self, hook: impl LoginFailedHook + 'static) -> Self {
        self.hooks.login_failed = Some(Arc::new(hook));
        self
    }
}

impl
    LoginCenterBuilder<
        Configured<Arc<dyn KeyValueStore>>,
        Configured<Arc<dyn HostPlatform>>,
        Configured<Arc<dyn Transport>>,
    >
{
    /// Validate the configuration, restore the stored session and build the service.
    pub async fn build(self) -> Result<LoginCenter, AuthError> {
        self.config.validate()?;
        let config = Arc::new(self.config);

        let session = Arc::new(SessionManager::load(self.store.0).await);
        session.set_cookie(SOURCE_COOKIE, config.t()).await;
        let account = session.account_profile().await;
        if account.is_logged_in() {
            if let Some(id) = &account.account_id {
                session.set_cookie(ACCOUNT_ID_COOKIE, id).await;
            }
            if let Some(secret) = &account.session_secret {
                session.set_cookie(SESSION_SECRET_COOKIE, secret).await;
            }
        }

        let mut predicates = self.predicates;
        predicates.extend(config.auth_fail_rules.iter().map(|rule| {
            Arc::new(RespCodeForPath {
                path_contains: rule.path_contains.clone(),
                resp_code: rule.resp_code,
            }) as Arc<dyn AuthFailurePredicate>
        }));
        predicates.extend(hooks::default_auth_failure_predicates());

        let gateway = Arc::new(RequestGateway::new(
            config.clone(),
            session.clone(),
            self.transport.0,
            CallDeduplicator::new(),
            self.hooks.clone(),
            predicates,
        ));
        let orchestrator = LoginOrchestrator::new(
            config.clone(),
            session.clone(),
            gateway.clone(),
            self.platform.0,
            self.hooks,
        );
        log::debug!("[login] login center ready for source {}", config.source);

        Ok(LoginCenter {
            config,
            session,
            gateway,
            orchestrator,
        })
    }
}
