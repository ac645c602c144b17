//! Extension points of the login pipeline and the request gateway.

use crate::request::{resp_code, ApiResponse, RequestOptions};
use async_trait::async_trait;
use logincenter_core::{
    AuthError, ConsentFailure, ConsentOutcome, LoginResult, PermissionSettings, TransportError,
};
use logincenter_session::SessionManager;
use serde_json::Value;
use std::sync::Arc;

/// Decides whether a response body means the backend no longer accepts the session.
pub trait AuthFailurePredicate: Send + Sync {
    /// Whether `body`, returned for `request`, signals an invalid session.
    fn is_auth_failure(&self, body: &Value, request: &RequestOptions) -> bool;
}

impl<F> AuthFailurePredicate for F
where
    F: Fn(&Value, &RequestOptions) -> bool + Send + Sync,
{
    fn is_auth_failure(&self, body: &Value, request: &RequestOptions) -> bool {
        self(body, request)
    }
}

/// Matches bodies whose `errMsg` contains a phrase.
#[derive(Debug, Clone)]
pub struct ErrMsgContains(pub String);

impl AuthFailurePredicate for ErrMsgContains {
    fn is_auth_failure(&self, body: &Value, _request: &RequestOptions) -> bool {
        body.get("errMsg")
            .and_then(Value::as_str)
            .is_some_and(|msg| msg.contains(&self.0))
    }
}

/// Matches a `respCode` on URLs containing a fragment.
#[derive(Debug, Clone)]
pub struct RespCodeForPath {
    /// Fragment the request URL must contain.
    pub path_contains: String,
    /// `respCode` signalling the failure.
    pub resp_code: i64,
}

impl AuthFailurePredicate for RespCodeForPath {
    fn is_auth_failure(&self, body: &Value, request: &RequestOptions) -> bool {
        request.url.contains(&self.path_contains) && resp_code(body) == Some(self.resp_code)
    }
}

/// Signatures recognised when nothing else matches.
pub fn default_auth_failure_predicates() -> Vec<Arc<dyn AuthFailurePredicate>> {
    vec![
        Arc::new(ErrMsgContains("请登录".into())),
        Arc::new(ErrMsgContains("please log in".into())),
    ]
}

/// Replaces the default platform consent prompt.
#[async_trait]
pub trait ConsentHandler: Send + Sync {
    /// Obtain the consent, or `None` to fall back to the platform prompt.
    async fn request_consent(&self) -> Option<ConsentOutcome>;
}

/// Replaces the default "explain, then open the settings" interaction after a denial.
#[async_trait]
pub trait DenyHandler: Send + Sync {
    /// Run the interaction, or return `None` to fall back to the default one.
    async fn on_denied(&self, deny_tip: &str) -> Option<PermissionSettings>;
}

/// Observes the outcome of the explicit consent step.
pub trait ConsentObserver: Send + Sync {
    /// Consent could not be obtained.
    fn consent_failed(&self, _kind: ConsentFailure, _detail: &str) {}
    /// Consent was granted.
    fn consent_granted(&self) {}
}

/// What an [`AddOnStep`] decided.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddOnOutcome {
    /// Whether the fresh session is accepted.
    pub succeeded: bool,
    /// Detailed reason on failure.
    pub err_msg: Option<String>,
    /// Message for the user on failure.
    pub toast_msg: Option<String>,
}

impl AddOnOutcome {
    /// Accept the session.
    pub fn accept() -> Self {
        Self {
            succeeded: true,
            ..Default::default()
        }
    }

    /// Reject the session.
    pub fn reject(err_msg: impl Into<String>, toast_msg: Option<String>) -> Self {
        Self {
            succeeded: false,
            err_msg: Some(err_msg.into()),
            toast_msg,
        }
    }
}

/// Extra verification run after a successful login.
///
/// A rejection rolls the session back and the login reports
/// [`LoginCode::AddOnRejected`](logincenter_core::LoginCode::AddOnRejected).
#[async_trait]
pub trait AddOnStep: Send + Sync {
    /// Inspect the freshly persisted session.
    async fn run(&self, session: &SessionManager) -> Result<AddOnOutcome, AuthError>;
}

/// Rewrites request options before they are sent.
pub trait BeforeRequest: Send + Sync {
    /// Return the options to send.
    fn before_request(&self, options: RequestOptions) -> RequestOptions;
}

impl<F> BeforeRequest for F
where
    F: Fn(RequestOptions) -> RequestOptions + Send + Sync,
{
    fn before_request(&self, options: RequestOptions) -> RequestOptions {
        self(options)
    }
}

/// Gets a chance to recover from a transport failure, e.g. by retrying on another route.
#[async_trait]
pub trait TransportRecovery: Send + Sync {
    /// Produce a response for `options` or give up.
    async fn recover(
        &self,
        error: TransportError,
        options: RequestOptions,
    ) -> Result<ApiResponse, AuthError>;
}

/// Replaces the built-in single retry after an auth failure.
#[async_trait]
pub trait RetryHook: Send + Sync {
    /// Retry `options`; the session has already been cleared.
    async fn retry(&self, options: RequestOptions) -> Result<Value, AuthError>;
}

/// Notified of every failed login, e.g. to show a toast.
pub trait LoginFailedHook: Send + Sync {
    /// Called with the failed result.
    fn login_failed(&self, result: &LoginResult);
}

impl<F> LoginFailedHook for F
where
    F: Fn(&LoginResult) + Send + Sync,
{
    fn login_failed(&self, result: &LoginResult) {
        self(result)
    }
}

/// The optional hooks of a [`LoginCenter`](crate::LoginCenter).
#[derive(Clone, Default)]
pub struct Hooks {
    /// Custom consent prompt.
    pub consent_handler: Option<Arc<dyn ConsentHandler>>,
    /// Custom denial recovery.
    pub deny_handler: Option<Arc<dyn DenyHandler>>,
    /// Consent outcome observer.
    pub consent_observer: Option<Arc<dyn ConsentObserver>>,
    /// Post-login verification.
    pub add_on: Option<Arc<dyn AddOnStep>>,
    /// Request rewriting.
    pub before_request: Option<Arc<dyn BeforeRequest>>,
    /// Transport failure recovery.
    pub transport_recovery: Option<Arc<dyn TransportRecovery>>,
    /// Auth-failure retry replacement.
    pub retry: Option<Arc<dyn RetryHook>>,
    /// Failed login notification.
    pub login_failed: Option<Arc<dyn LoginFailedHook>>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("consent_handler", &self.consent_handler.is_some())
            .field("deny_handler", &self.deny_handler.is_some())
            .field("consent_observer", &self.consent_observer.is_some())
            .field("add_on", &self.add_on.is_some())
            .field("before_request", &self.before_request.is_some())
            .field("transport_recovery", &self.transport_recovery.is_some())
            .field("retry", &self.retry.is_some())
            .field("login_failed", &self.login_failed.is_some())
            .finish()
    }
}
