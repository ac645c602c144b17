use crate::config::LoginConfig;
use crate::hooks::{AuthFailurePredicate, Hooks};
use crate::request::{resp_code, ApiResponse, RequestOptions};
use async_trait::async_trait;
use http::header::SET_COOKIE;
use logincenter_core::{AuthError, CallDeduplicator, LoginMode, LoginResult, Transport};
use logincenter_session::SessionManager;
use serde_json::Value;
use std::sync::Arc;

/// Deduplication key of tracking-token provisioning.
pub const TRACKING_TOKEN_KEY: &str = "ensure_tracking_token";

/// Something that can establish a session before a request is sent.
#[async_trait]
pub trait Authenticate: Send + Sync {
    /// Log in with `mode`.
    async fn login(&self, mode: LoginMode) -> LoginResult;
}

/// The outbound request pipeline.
///
/// Every request first makes sure a tracking token exists, then carries the current session
/// cookies; credentials set by the response are captured before the caller sees it.
pub struct RequestGateway {
    config: Arc<LoginConfig>,
    session: Arc<SessionManager>,
    transport: Arc<dyn Transport>,
    dedupe: CallDeduplicator,
    hooks: Hooks,
    predicates: Vec<Arc<dyn AuthFailurePredicate>>,
}

impl RequestGateway {
    /// Create a gateway. `predicates` are evaluated in order until one matches.
    pub fn new(
        config: Arc<LoginConfig>,
        session: Arc<SessionManager>,
        transport: Arc<dyn Transport>,
        dedupe: CallDeduplicator,
        hooks: Hooks,
        predicates: Vec<Arc<dyn AuthFailurePredicate>>,
    ) -> Self {
        Self {
            config,
            session,
            transport,
            dedupe,
            hooks,
            predicates,
        }
    }

    /// The configuration.
    pub fn config(&self) -> &Arc<LoginConfig> {
        &self.config
    }

    /// The session requests are authenticated with.
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// The deduplicator shared with the login steps.
    pub fn dedupe(&self) -> &CallDeduplicator {
        &self.dedupe
    }

    /// Provision an anonymous tracking token unless one exists.
    ///
    /// Concurrent callers share one provisioning call. Failures are logged and swallowed so
    /// that requests are never blocked by token issuance.
    pub async fn ensure_tracking_token(&self) {
        if self.session.tracking_token().await.is_some() {
            return;
        }
        let session = self.session.clone();
        let transport = self.transport.clone();
        let config = self.config.clone();
        self.dedupe
            .dedupe(TRACKING_TOKEN_KEY, move || async move {
                let provisioned =
                    provision_tracking_token(&config, &session, transport.as_ref()).await;
                if let Err(e) = provisioned {
                    log::warn!("[request] tracking token provisioning failed: {e}");
                }
            })
            .await
    }

    /// Send a request carrying the session credentials.
    pub async fn request(&self, options: RequestOptions) -> Result<ApiResponse, AuthError> {
        let options = match &self.hooks.before_request {
            Some(hook) => hook.before_request(options),
            None => options,
        };

        self.ensure_tracking_token().await;

        let cookies = self.session.cookie_header().await;
        let request = options.to_http_request(&cookies)?;
        log::debug!("[request] {} {}", options.method, options.url);

        match self.transport.send(request).await {
            Ok(response) => {
                let set_cookies: Vec<String> = response
                    .headers()
                    .get_all(SET_COOKIE)
                    .iter()
                    .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                    .collect();
                self.session
                    .absorb_set_cookies(set_cookies.iter().map(String::as_str))
                    .await;
                Ok(ApiResponse::from_http(response))
            }
            Err(err) => match &self.hooks.transport_recovery {
                Some(recovery) => {
                    log::warn!("[request] {} failed, trying recovery: {err}", options.url);
                    recovery.recover(err, options).await
                }
                None => Err(err.into()),
            },
        }
    }

    /// Whether `body` matches one of the auth-failure predicates.
    pub fn is_auth_failure(&self, body: &Value, options: &RequestOptions) -> bool {
        self.predicates
            .iter()
            .any(|predicate| predicate.is_auth_failure(body, options))
    }

    /// Log in through `login`, then send the request and return the response body.
    ///
    /// When the body signals an invalid session, the session is cleared and, if
    /// `retry_on_auth_fail` is set, the whole cycle runs once more (or the configured
    /// [`RetryHook`](crate::hooks::RetryHook) takes over). A second rejection is returned as
    /// [`AuthError::SessionRejected`].
    pub async fn request_with_login<L>(
        &self,
        login: &L,
        options: RequestOptions,
        retry_on_auth_fail: bool,
    ) -> Result<Value, AuthError>
    where
        L: Authenticate + ?Sized,
    {
        let mut retry = retry_on_auth_fail;
        loop {
            let result = login.login(options.login_mode).await;
            if !result.is_ok() {
                return Err(AuthError::LoginRequired {
                    url: options.url.clone(),
                    result,
                });
            }

            let response = self.request(options.clone()).await?;
            if !self.is_auth_failure(&response.body, &options) {
                return Ok(response.body);
            }

            log::warn!("[request] session rejected by {}", options.url);
            self.session.clear().await;

            if !retry {
                return Err(AuthError::SessionRejected {
                    url: options.url.clone(),
                    body: response.body,
                });
            }
            if let Some(hook) = &self.hooks.retry {
                return hook.retry(options).await;
            }
            retry = false;
        }
    }
}

impl std::fmt::Debug for RequestGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGateway")
            .field("source", &self.config.source)
            .field("hooks", &self.hooks)
            .field("predicates", &self.predicates.len())
            .finish_non_exhaustive()
    }
}

async fn provision_tracking_token(
    config: &LoginConfig,
    session: &SessionManager,
    transport: &dyn Transport,
) -> Result<(), AuthError> {
    if session.tracking_token().await.is_some() {
        return Ok(());
    }
    let request = RequestOptions::get(config.tracking_token_url()?.as_str()).to_http_request("")?;
    let response = ApiResponse::from_http(transport.send(request).await?);

    let token = match resp_code(&response.body) {
        Some(0) => response.body["respData"]["result"].as_str(),
        _ => None,
    };
    match token.filter(|t| !t.is_empty()) {
        Some(token) => {
            session.set_tracking_token_if_absent(token).await;
            Ok(())
        }
        None => Err(AuthError::InvalidRequest(format!(
            "unexpected tracking token response: {}",
            response.body
        ))),
    }
}
