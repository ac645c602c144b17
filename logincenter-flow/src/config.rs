use logincenter_core::AuthError;
use serde::{Deserialize, Serialize};
use url::Url;

/// Default text of the prompt shown before sending the user to the permission settings.
pub const DEFAULT_DENY_TIP: &str = "This app needs your permission to provide a better service.";

/// Backend endpoints. Relative values are resolved against [`LoginConfig::base_url`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Resolves an existing account from an identity code alone.
    pub silent_login: String,
    /// Creates or resolves an account from an identity code plus the consented profile.
    pub login: String,
    /// Issues anonymous tracking tokens.
    pub tracking_token: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            silent_login: "mpSilenceLogin".into(),
            login: "login".into(),
            tracking_token: "getTempToken".into(),
        }
    }
}

/// Declarative auth-failure signature: a response to a URL containing `path_contains`
/// whose `respCode` equals `resp_code` means the session is no longer valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthFailRule {
    /// Fragment the request URL must contain.
    pub path_contains: String,
    /// `respCode` signalling the failure.
    pub resp_code: i64,
}

/// Static configuration of a [`LoginCenter`](crate::LoginCenter).
///
/// Only `source` is mandatory; endpoints need a `base_url` unless given as absolute URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    /// Identifies the calling deployment to the backend.
    pub source: String,
    /// Value of the `t` credential cookie; defaults to `source`.
    pub t: Option<String>,
    /// Base URL relative endpoints are joined to.
    pub base_url: Option<String>,
    /// Backend endpoints.
    pub endpoints: Endpoints,
    /// Prompt shown when the user previously denied the profile consent.
    pub deny_tip: String,
    /// Entry channel forwarded to the account exchange for attribution.
    pub entry_channel: Option<String>,
    /// Additional auth-failure signatures.
    pub auth_fail_rules: Vec<AuthFailRule>,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            source: String::new(),
            t: None,
            base_url: None,
            endpoints: Endpoints::default(),
            deny_tip: DEFAULT_DENY_TIP.into(),
            entry_channel: None,
            auth_fail_rules: Vec::new(),
        }
    }
}

impl LoginConfig {
    /// Configuration for the deployment `source`.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    /// Set the base URL of the backend.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Replace the endpoints.
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Set the denial prompt text.
    pub fn with_deny_tip(mut self, deny_tip: impl Into<String>) -> Self {
        self.deny_tip = deny_tip.into();
        self
    }

    /// Set the entry channel.
    pub fn with_entry_channel(mut self, channel: impl Into<String>) -> Self {
        self.entry_channel = Some(channel.into());
        self
    }

    /// Add an auth-failure signature.
    pub fn with_auth_fail_rule(mut self, path_contains: impl Into<String>, resp_code: i64) -> Self {
        self.auth_fail_rules.push(AuthFailRule {
            path_contains: path_contains.into(),
            resp_code,
        });
        self
    }

    /// Read the configuration from `LOGINCENTER_*` environment variables.
    ///
    /// # Required env vars
    /// - `LOGINCENTER_SOURCE`
    ///
    /// # Optional env vars
    /// - `LOGINCENTER_T`, `LOGINCENTER_BASE_URL`, `LOGINCENTER_SILENT_LOGIN_URL`,
    ///   `LOGINCENTER_LOGIN_URL`, `LOGINCENTER_TRACKING_TOKEN_URL`, `LOGINCENTER_DENY_TIP`,
    ///   `LOGINCENTER_CHANNEL`
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = lookup("LOGINCENTER_SOURCE")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::Config("LOGINCENTER_SOURCE is not set".into()))?;

        let mut config = Self::new(source);
        config.t = lookup("LOGINCENTER_T");
        config.base_url = lookup("LOGINCENTER_BASE_URL");
        if let Some(url) = lookup("LOGINCENTER_SILENT_LOGIN_URL") {
            config.endpoints.silent_login = url;
        }
        if let Some(url) = lookup("LOGINCENTER_LOGIN_URL") {
            config.endpoints.login = url;
        }
        if let Some(url) = lookup("LOGINCENTER_TRACKING_TOKEN_URL") {
            config.endpoints.tracking_token = url;
        }
        if let Some(tip) = lookup("LOGINCENTER_DENY_TIP") {
            config.deny_tip = tip;
        }
        config.entry_channel = lookup("LOGINCENTER_CHANNEL");
        config.validate()?;
        Ok(config)
    }

    /// Check that the source is set and every endpoint resolves.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.source.is_empty() {
            return Err(AuthError::Config("source must be configured".into()));
        }
        self.silent_login_url()?;
        self.login_url()?;
        self.tracking_token_url()?;
        Ok(())
    }

    /// The `t` cookie value.
    pub fn t(&self) -> &str {
        self.t.as_deref().unwrap_or(&self.source)
    }

    /// Absolute silent-login URL.
    pub fn silent_login_url(&self) -> Result<Url, AuthError> {
        self.resolve(&self.endpoints.silent_login)
    }

    /// Absolute account-exchange URL.
    pub fn login_url(&self) -> Result<Url, AuthError> {
        self.resolve(&self.endpoints.login)
    }

    /// Absolute tracking-token URL.
    pub fn tracking_token_url(&self) -> Result<Url, AuthError> {
        self.resolve(&self.endpoints.tracking_token)
    }

    fn resolve(&self, endpoint: &str) -> Result<Url, AuthError> {
        if let Ok(url) = Url::parse(endpoint) {
            return Ok(url);
        }
        let base = self.base_url.as_deref().ok_or_else(|| {
            AuthError::Config(format!("endpoint `{endpoint}` is relative but no base_url is set"))
        })?;
        let mut base = Url::parse(base)
            .map_err(|e| AuthError::Config(format!("invalid base_url `{base}`: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(endpoint)
            .map_err(|e| AuthError::Config(format!("invalid endpoint `{endpoint}`: {e}")))
    }
}
