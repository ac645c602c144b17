use crate::cookie::{
    CookieJar, ACCOUNT_ID_COOKIE, SESSION_SECRET_COOKIE, TRACKING_TOKEN_COOKIE,
};
use crate::{write_best_effort, KeyValueStore};
use logincenter_core::{AccountProfile, LocalProfile, SessionCredentials};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Storage key of the platform profile.
pub const LOCAL_PROFILE_KEY: &str = "userInfo";
/// Storage key of the account profile.
pub const ACCOUNT_PROFILE_KEY: &str = "accountInfo";
/// Storage key of the credential cookie jar.
pub const COOKIE_JAR_KEY: &str = "logincenter_cookie";

#[derive(Debug, Default)]
struct SessionState {
    local: LocalProfile,
    account: AccountProfile,
    jar: CookieJar,
}

/// The local session: both profiles plus the credential cookies, mirrored to a
/// [`KeyValueStore`].
///
/// Every mutation holds the state lock until its storage writes are done, so persist, clear
/// and response capture never interleave. Storage writes are best effort; the in-memory
/// state stays authoritative when they fail.
pub struct SessionManager {
    store: Arc<dyn KeyValueStore>,
    state: Mutex<SessionState>,
}

impl SessionManager {
    /// Create an empty session backed by `store`, without reading it.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Restore the session previously saved in `store`.
    ///
    /// Unreadable or corrupt records are logged and start out empty.
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let local = read_json(store.as_ref(), LOCAL_PROFILE_KEY).await;
        let account = read_json(store.as_ref(), ACCOUNT_PROFILE_KEY).await;
        let jar = match store.get(COOKIE_JAR_KEY).await {
            Ok(Some(bytes)) => CookieJar::parse(&String::from_utf8_lossy(&bytes)),
            Ok(None) => CookieJar::new(),
            Err(e) => {
                log::warn!("[session] failed to read {COOKIE_JAR_KEY}: {e}");
                CookieJar::new()
            }
        };
        Self {
            store,
            state: Mutex::new(SessionState {
                local,
                account,
                jar,
            }),
        }
    }

    /// Snapshot of the platform profile.
    pub async fn local_profile(&self) -> LocalProfile {
        self.state.lock().await.local.clone()
    }

    /// Snapshot of the account profile.
    pub async fn account_profile(&self) -> AccountProfile {
        self.state.lock().await.account.clone()
    }

    /// Whether a session secret is held. No backend round trip is made; expiry surfaces later
    /// through failed requests.
    pub async fn is_logged_in(&self) -> bool {
        self.state.lock().await.account.is_logged_in()
    }

    /// The credentials the next request will carry.
    pub async fn credentials(&self) -> SessionCredentials {
        self.state.lock().await.jar.credentials()
    }

    /// `Cookie` header value for the next request.
    pub async fn cookie_header(&self) -> String {
        self.state.lock().await.jar.header_value()
    }

    /// The anonymous tracking token, if provisioned.
    pub async fn tracking_token(&self) -> Option<String> {
        self.credentials().await.tracking_token
    }

    /// Store `token` unless a tracking token already exists. Returns whether it was stored.
    pub async fn set_tracking_token_if_absent(&self, token: &str) -> bool {
        let mut state = self.state.lock().await;
        if state.jar.credentials().tracking_token.is_some() {
            return false;
        }
        state.jar.set(TRACKING_TOKEN_COOKIE, token);
        self.save_jar(&state.jar).await;
        true
    }

    /// Set an arbitrary credential cookie.
    pub async fn set_cookie(&self, name: &str, value: &str) {
        let mut state = self.state.lock().await;
        state.jar.set(name, value);
        self.save_jar(&state.jar).await;
    }

    /// Replace both profiles after a successful login and sync the credential cookies.
    ///
    /// The account's session token fills the tracking-token slot only when no tracking token
    /// exists yet.
    pub async fn persist(&self, local: LocalProfile, mut account: AccountProfile) {
        account.logged_in_at = Some(chrono::Utc::now());

        let mut state = self.state.lock().await;
        state.local = local;
        state.account = account;

        let SessionState { account, jar, .. } = &mut *state;
        match &account.account_id {
            Some(id) => jar.set(ACCOUNT_ID_COOKIE, id),
            None => {
                jar.remove(ACCOUNT_ID_COOKIE);
            }
        }
        match &account.session_secret {
            Some(secret) => jar.set(SESSION_SECRET_COOKIE, secret),
            None => {
                jar.remove(SESSION_SECRET_COOKIE);
            }
        }
        if let Some(token) = &account.session_token {
            if jar.credentials().tracking_token.is_none() {
                jar.set(TRACKING_TOKEN_COOKIE, token);
            }
        }

        self.save_profiles(&state).await;
        self.save_jar(&state.jar).await;
        log::debug!(
            "[session] persisted account {}",
            state.account.account_id.as_deref().unwrap_or("<none>")
        );
    }

    /// Drop both profiles and the account credentials. The tracking token is kept.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.local = LocalProfile::default();
        state.account = AccountProfile::default();
        state.jar.remove(ACCOUNT_ID_COOKIE);
        state.jar.remove(SESSION_SECRET_COOKIE);

        self.save_profiles(&state).await;
        self.save_jar(&state.jar).await;
        log::debug!("[session] cleared");
    }

    /// Apply `Set-Cookie` values observed on a response.
    ///
    /// Refreshed account credentials are mirrored into the account profile when one exists.
    pub async fn absorb_set_cookies<'a, I>(&self, headers: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut state = self.state.lock().await;
        let mut updated = Vec::new();
        for header in headers {
            updated.extend(state.jar.absorb_set_cookie(header));
        }
        if updated.is_empty() {
            return;
        }

        let creds = state.jar.credentials();
        let mut account_changed = false;
        if state.account.is_logged_in() {
            if updated.iter().any(|n| n == SESSION_SECRET_COOKIE) && creds.session_secret.is_some()
            {
                state.account.session_secret = creds.session_secret.clone();
                account_changed = true;
            }
            if updated.iter().any(|n| n == ACCOUNT_ID_COOKIE) && creds.account_id.is_some() {
                state.account.account_id = creds.account_id.clone();
                account_changed = true;
            }
        }

        if account_changed {
            self.save_profiles(&state).await;
        }
        self.save_jar(&state.jar).await;
        log::debug!("[session] captured response cookies {updated:?}");
    }

    async fn save_profiles(&self, state: &SessionState) {
        save_json(
            self.store.as_ref(),
            LOCAL_PROFILE_KEY,
            &state.local,
            state.local.is_empty(),
        )
        .await;
        save_json(
            self.store.as_ref(),
            ACCOUNT_PROFILE_KEY,
            &state.account,
            state.account == AccountProfile::default(),
        )
        .await;
    }

    async fn save_jar(&self, jar: &CookieJar) {
        write_best_effort(
            self.store.as_ref(),
            COOKIE_JAR_KEY,
            jar.header_value().into_bytes(),
        )
        .await;
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager").finish_non_exhaustive()
    }
}

async fn read_json<T: DeserializeOwned + Default>(store: &dyn KeyValueStore, key: &str) -> T {
    match store.get(key).await {
        Ok(Some(bytes)) if !bytes.is_empty() => {
            serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                log::warn!("[session] discarding corrupt {key}: {e}");
                T::default()
            })
        }
        Ok(_) => T::default(),
        Err(e) => {
            log::warn!("[session] failed to read {key}: {e}");
            T::default()
        }
    }
}

async fn save_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T, empty: bool) {
    if empty {
        if let Err(e) = store.remove(key).await {
            log::warn!("[session] failed to remove {key}: {e}");
        }
        return;
    }
    match serde_json::to_vec(value) {
        Ok(bytes) => write_best_effort(store, key, bytes).await,
        Err(e) => log::warn!("[session] failed to encode {key}: {e}"),
    }
}
