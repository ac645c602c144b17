//! The login pipeline.
//!
//! A login walks through a fixed sequence of steps. Every step that talks to the host or the
//! backend runs through the shared [`CallDeduplicator`], so concurrent logins collapse onto a
//! single execution per step and all of them observe the same outcome.

use crate::config::LoginConfig;
use crate::gateway::{Authenticate, RequestGateway};
use crate::hooks::{AddOnOutcome, Hooks};
use crate::request::{int_field, resp_code, RequestOptions};
use async_trait::async_trait;
use futures::FutureExt;
use logincenter_core::{
    AccountProfile, CallDeduplicator, ConsentFailure, ConsentOutcome, ConsentedProfile,
    HostPlatform, IdentityCode, LocalProfile, LoginCode, LoginMode, LoginResult,
    PermissionSettings, StepError,
};
use logincenter_session::SessionManager;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Deduplication key of the external identity exchange.
pub const EXTERNAL_IDENTITY_STEP: &str = "external_identity_exchange";
/// Deduplication key of the silent account resolution.
pub const SILENT_RESOLVE_STEP: &str = "silent_resolve";
/// Deduplication key of the explicit consent.
pub const EXPLICIT_CONSENT_STEP: &str = "explicit_consent";
/// Deduplication key of the account exchange.
pub const ACCOUNT_EXCHANGE_STEP: &str = "account_exchange";
/// Deduplication key of the add-on step.
pub const ADD_ON_STEP: &str = "add_on";

/// Profiles produced by a successful resolution, ready to persist.
type ResolvedSession = (LocalProfile, AccountProfile);

struct Steps {
    config: Arc<LoginConfig>,
    session: Arc<SessionManager>,
    gateway: Arc<RequestGateway>,
    platform: Arc<dyn HostPlatform>,
    hooks: Hooks,
}

/// Runs logins. Cloning is cheap and clones share the in-flight steps.
#[derive(Clone)]
pub struct LoginOrchestrator {
    steps: Arc<Steps>,
    dedupe: CallDeduplicator,
}

impl LoginOrchestrator {
    /// Create an orchestrator sending its backend calls through `gateway`.
    ///
    /// Steps are deduplicated with the gateway's deduplicator.
    pub fn new(
        config: Arc<LoginConfig>,
        session: Arc<SessionManager>,
        gateway: Arc<RequestGateway>,
        platform: Arc<dyn HostPlatform>,
        hooks: Hooks,
    ) -> Self {
        let dedupe = gateway.dedupe().clone();
        Self {
            steps: Arc::new(Steps {
                config,
                session,
                gateway,
                platform,
                hooks,
            }),
            dedupe,
        }
    }

    /// Log in with `mode`.
    ///
    /// Always produces a well-formed result: a panic anywhere in the pipeline is reported as
    /// [`LoginCode::Internal`]. Failures are logged and handed to the login-failed hook.
    pub async fn login(&self, mode: LoginMode) -> LoginResult {
        let result = match AssertUnwindSafe(self.run(mode)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                log::error!("[login] uncaught panic: {}", panic_message(&*panic));
                LoginResult::new(LoginCode::Internal, "internal error")
            }
        };

        if !result.is_ok() {
            log::error!("[login] failed: {result:?}");
            if let Some(hook) = &self.steps.hooks.login_failed {
                hook.login_failed(&result);
            }
        }
        result
    }

    async fn run(&self, mode: LoginMode) -> LoginResult {
        if mode != LoginMode::Force && self.steps.session.is_logged_in().await {
            return LoginResult::ok();
        }

        let code = match self.external_identity().await {
            Ok(code) => code,
            Err(e) => return LoginResult::from_step(LoginCode::ExternalIdentityFailed, e),
        };

        match self.silent_resolve(code).await {
            Ok((local, account)) => return self.finish(local, account).await,
            Err(e) => log::debug!("[login] silent resolve did not find an account: {e}"),
        }

        if mode == LoginMode::Silent {
            return LoginResult::new(LoginCode::Ok, "login failed silently");
        }

        // Identity codes are single use; the silent attempt consumed the first one.
        let code = match self.external_identity().await {
            Ok(code) => code,
            Err(e) => return LoginResult::from_step(LoginCode::ExternalIdentityFailed, e),
        };

        let consent = match self.explicit_consent().await {
            Ok(consent) => consent,
            Err(e) => return LoginResult::from_step(LoginCode::ConsentDenied, e),
        };

        let local = consent.user_info.clone();
        let account = match self.account_exchange(code, consent).await {
            Ok(account) => account,
            Err(e) => return LoginResult::from_step(LoginCode::AccountExchangeRejected, e),
        };

        self.finish(local, account).await
    }

    async fn external_identity(&self) -> Result<IdentityCode, StepError> {
        let steps = self.steps.clone();
        self.dedupe
            .dedupe(EXTERNAL_IDENTITY_STEP, move || async move {
                log::debug!("[login] requesting identity code");
                steps
                    .platform
                    .external_identity_code()
                    .await
                    .map_err(StepError::from)
            })
            .await
    }

    async fn silent_resolve(&self, code: IdentityCode) -> Result<ResolvedSession, StepError> {
        let steps = self.steps.clone();
        self.dedupe
            .dedupe(SILENT_RESOLVE_STEP, move || async move {
                steps.silent_resolve(code).await
            })
            .await
    }

    async fn explicit_consent(&self) -> Result<ConsentedProfile, StepError> {
        let steps = self.steps.clone();
        self.dedupe
            .dedupe(EXPLICIT_CONSENT_STEP, move || async move {
                steps.explicit_consent().await
            })
            .await
    }

    async fn account_exchange(
        &self,
        code: IdentityCode,
        consent: ConsentedProfile,
    ) -> Result<AccountProfile, StepError> {
        let steps = self.steps.clone();
        self.dedupe
            .dedupe(ACCOUNT_EXCHANGE_STEP, move || async move {
                steps.account_exchange(code, consent).await
            })
            .await
    }

    /// Persist a resolved session and run the add-on verification on it.
    async fn finish(&self, local: LocalProfile, account: AccountProfile) -> LoginResult {
        if !account.is_logged_in() {
            return LoginResult::new(LoginCode::NoResult, "login returned no session secret");
        }
        self.steps.session.persist(local, account).await;

        let steps = self.steps.clone();
        let outcome = self
            .dedupe
            .dedupe(ADD_ON_STEP, move || async move { steps.add_on().await })
            .await;
        if outcome.succeeded {
            return LoginResult::ok();
        }

        self.steps.session.clear().await;
        LoginResult {
            code: LoginCode::AddOnRejected,
            err_msg: outcome.err_msg.unwrap_or_else(|| "add on failed".into()),
            toast_msg: outcome.toast_msg,
        }
    }
}

impl Steps {
    async fn silent_resolve(&self, code: IdentityCode) -> Result<ResolvedSession, StepError> {
        let url = self.config.silent_login_url()?;
        let options = RequestOptions::post(url.as_str())
            .data("code", code.as_str())
            .data("source", self.config.source.as_str());
        let body = self.gateway.request(options).await?.body;

        let status = int_field(&body["respData"], "status");
        if resp_code(&body) != Some(0) || status != Some(0) {
            return Err(StepError::new(format!("silent login declined: {body}")));
        }
        let local = field(&body["respData"]["userInfo"])?;
        let account = field(&body["respData"]["accountInfo"])?;
        Ok((local, account))
    }

    async fn explicit_consent(&self) -> Result<ConsentedProfile, StepError> {
        let custom = match &self.hooks.consent_handler {
            Some(handler) => handler.request_consent().await,
            None => None,
        };
        let mut outcome = match custom {
            Some(outcome) => outcome,
            None => self.platform.consented_profile().await,
        };

        if !matches!(outcome, ConsentOutcome::Granted(_)) {
            let settings = self.recover_permission().await;
            if !settings.granted {
                let detail = "user refused to grant permission of the profile";
                self.consent_failed(ConsentFailure::Deny, detail);
                return Err(StepError::new(detail));
            }
            outcome = self.platform.consented_profile().await;
        }

        match outcome {
            ConsentOutcome::Granted(profile) => {
                if let Some(observer) = &self.hooks.consent_observer {
                    observer.consent_granted();
                }
                Ok(profile)
            }
            ConsentOutcome::Denied => {
                let detail = "profile consent failed: denied";
                self.consent_failed(ConsentFailure::Unknown, detail);
                Err(StepError::new(detail))
            }
            ConsentOutcome::Failed(reason) => {
                let detail = format!("profile consent failed: {reason}");
                self.consent_failed(ConsentFailure::Unknown, &detail);
                Err(StepError::new(detail))
            }
        }
    }

    /// Explain the denial and send the user to the permission settings.
    async fn recover_permission(&self) -> PermissionSettings {
        let deny_tip = self.config.deny_tip.as_str();
        if let Some(handler) = &self.hooks.deny_handler {
            if let Some(settings) = handler.on_denied(deny_tip).await {
                return settings;
            }
        }

        if let Err(e) = self.platform.show_denial_prompt(deny_tip).await {
            log::warn!("[login] failed to show the denial prompt: {e}");
        }
        self.platform
            .open_permission_settings()
            .await
            .unwrap_or_else(|e| {
                log::warn!("[login] failed to open the permission settings: {e}");
                PermissionSettings::default()
            })
    }

    fn consent_failed(&self, kind: ConsentFailure, detail: &str) {
        if let Some(observer) = &self.hooks.consent_observer {
            observer.consent_failed(kind, detail);
        }
    }

    async fn account_exchange(
        &self,
        code: IdentityCode,
        consent: ConsentedProfile,
    ) -> Result<AccountProfile, StepError> {
        let url = self.config.login_url()?;
        let mut options = RequestOptions::post(url.as_str())
            .data("code", code.as_str())
            .data("encryptedData", consent.encrypted_data)
            .data("iv", consent.iv)
            .data("source", self.config.source.as_str());
        if let Some(channel) = &self.config.entry_channel {
            options = options.data("channelId", channel.as_str());
        }
        let body = self.gateway.request(options).await?.body;

        if resp_code(&body) != Some(0) {
            let toast = body["respData"]["errMsg"].as_str().map(str::to_string);
            return Err(
                StepError::new(format!("account exchange rejected: {body}")).with_toast(toast)
            );
        }
        field(&body["respData"])
    }

    async fn add_on(&self) -> AddOnOutcome {
        let Some(step) = &self.hooks.add_on else {
            return AddOnOutcome::accept();
        };
        match step.run(&self.session).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("[login] add-on step did not produce an outcome: {e}");
                AddOnOutcome::default()
            }
        }
    }
}

#[async_trait]
impl Authenticate for LoginOrchestrator {
    async fn login(&self, mode: LoginMode) -> LoginResult {
        LoginOrchestrator::login(self, mode).await
    }
}

impl std::fmt::Debug for LoginOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginOrchestrator")
            .field("source", &self.steps.config.source)
            .field("hooks", &self.steps.hooks)
            .field("dedupe", &self.dedupe)
            .finish_non_exhaustive()
    }
}

/// Decode a profile out of a response; a missing profile decodes as empty.
fn field<T: DeserializeOwned + Default>(value: &Value) -> Result<T, StepError> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value.clone())
        .map_err(|e| StepError::new(format!("malformed profile in response: {e}")))
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_profile_decodes_empty() {
        let local: LocalProfile = field(&Value::Null).unwrap();
        assert!(local.is_empty());

        let account: AccountProfile = field(&json!({"uid": 7, "ppu": "s"})).unwrap();
        assert_eq!(account.account_id.as_deref(), Some("7"));

        let err = field::<AccountProfile>(&json!({"uid": [1]})).unwrap_err();
        assert!(err.err_msg.contains("malformed"));
    }

    #[test]
    fn panic_payloads_are_readable() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn Any + Send> = Box::new("borrowed");
        let other: Box<dyn Any + Send> = Box::new(3u8);
        assert_eq!(panic_message(&*owned), "owned");
        assert_eq!(panic_message(&*borrowed), "borrowed");
        assert_eq!(panic_message(&*other), "unknown panic");
    }
}
