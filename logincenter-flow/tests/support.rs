#![allow(dead_code)]

use async_trait::async_trait;
use http::header::{COOKIE, SET_COOKIE};
use http::HeaderMap;
use logincenter_core::{
    AuthError, ConsentOutcome, ConsentedProfile, HostPlatform, IdentityCode, LocalProfile,
    PermissionSettings, Transport, TransportError,
};
use logincenter_flow::{Configured, LoginCenter, LoginCenterBuilder, LoginConfig};
use logincenter_session::{KeyValueStore, MemoryStore};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BASE_URL: &str = "https://passport.example.com";
pub const API_URL: &str = "https://api.example.com/order/list";

pub const SILENT: &str = "mpSilenceLogin";
pub const EXCHANGE: &str = "/login";
pub const TOKEN: &str = "getTempToken";
pub const ORDER: &str = "/order/";

pub fn config() -> LoginConfig {
    LoginConfig::new("mp").with_base_url(BASE_URL)
}

pub fn silent_ok(name: &str, uid: &str, secret: &str) -> Value {
    json!({
        "respCode": 0,
        "respData": {
            "status": 0,
            "userInfo": {"nickName": name},
            "accountInfo": {"uid": uid, "ppu": secret}
        }
    })
}

pub fn silent_miss() -> Value {
    json!({"respCode": 0, "respData": {"status": 1}})
}

pub fn exchange_ok(uid: &str, secret: &str) -> Value {
    json!({"respCode": 0, "respData": {"uid": uid, "ppu": secret}})
}

pub fn token_ok(token: &str) -> Value {
    json!({"respCode": 0, "respData": {"result": token}})
}

pub fn please_log_in() -> Value {
    json!({"respCode": -1, "errMsg": "未登录，请登录"})
}

pub fn granted(name: &str) -> ConsentOutcome {
    ConsentOutcome::Granted(ConsentedProfile {
        user_info: LocalProfile {
            nick_name: Some(name.into()),
            ..Default::default()
        },
        encrypted_data: Some("enc".into()),
        iv: Some("iv".into()),
    })
}

/// What the scripted backend answers.
#[derive(Clone, Debug)]
pub enum Reply {
    Json { body: Value, set_cookies: Vec<String> },
    Fail(String),
}

impl Reply {
    pub fn fail(message: &str) -> Self {
        Reply::Fail(message.into())
    }

    pub fn with_cookie(self, cookie: &str) -> Self {
        match self {
            Reply::Json {
                body,
                mut set_cookies,
            } => {
                set_cookies.push(cookie.into());
                Reply::Json { body, set_cookies }
            }
            fail => fail,
        }
    }
}

impl From<Value> for Reply {
    fn from(body: Value) -> Self {
        Reply::Json {
            body,
            set_cookies: Vec::new(),
        }
    }
}

/// A request as the scripted backend saw it.
#[derive(Clone, Debug)]
pub struct Sent {
    pub method: String,
    pub url: String,
    pub headers: HeaderMap,
    pub body: String,
}

impl Sent {
    pub fn cookie(&self) -> Option<&str> {
        self.headers.get(COOKIE).and_then(|v| v.to_str().ok())
    }
}

/// Backend answering by URL fragment. The last reply of a route repeats forever.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<(String, VecDeque<Reply>)>>,
    sent: Mutex<Vec<Sent>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    /// Transport issuing tracking token `tk-1`.
    pub fn new() -> Self {
        let transport = Self::default();
        transport.route(TOKEN, token_ok("tk-1"));
        transport
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn route(&self, fragment: &str, reply: impl Into<Reply>) {
        self.route_seq(fragment, vec![reply.into()]);
    }

    pub fn route_seq(&self, fragment: &str, replies: Vec<Reply>) {
        let mut routes = self.routes.lock().unwrap();
        routes.retain(|(f, _)| f != fragment);
        routes.push((fragment.into(), replies.into()));
    }

    pub fn calls(&self, fragment: &str) -> usize {
        self.sent(fragment).len()
    }

    pub fn sent(&self, fragment: &str) -> Vec<Sent> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.url.contains(fragment))
            .cloned()
            .collect()
    }

    fn next_reply(&self, url: &str) -> Option<Reply> {
        let mut routes = self.routes.lock().unwrap();
        let (_, replies) = routes.iter_mut().find(|(f, _)| url.contains(f.as_str()))?;
        if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> Result<http::Response<Vec<u8>>, TransportError> {
        let url = request.uri().to_string();
        self.sent.lock().unwrap().push(Sent {
            method: request.method().to_string(),
            url: url.clone(),
            headers: request.headers().clone(),
            body: String::from_utf8_lossy(request.body()).into_owned(),
        });
        let reply = self.next_reply(&url);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Some(Reply::Json { body, set_cookies }) => {
                let mut builder = http::Response::builder().status(200);
                for cookie in set_cookies {
                    builder = builder.header(SET_COOKIE, cookie);
                }
                Ok(builder.body(body.to_string().into_bytes()).unwrap())
            }
            Some(Reply::Fail(message)) => Err(TransportError::Network(message)),
            None => Ok(http::Response::builder()
                .status(404)
                .body(Vec::new())
                .unwrap()),
        }
    }
}

/// Host platform handing out `code-1`, `code-2`, ... and granting consent unless scripted
/// otherwise.
#[derive(Default)]
pub struct ScriptedPlatform {
    codes: AtomicUsize,
    consents: AtomicUsize,
    prompts: AtomicUsize,
    settings: AtomicUsize,
    identity_fails: AtomicBool,
    settings_grant: AtomicBool,
    consent_script: Mutex<VecDeque<ConsentOutcome>>,
    delay: Option<Duration>,
}

impl ScriptedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_identity(&self) {
        self.identity_fails.store(true, Ordering::SeqCst);
    }

    pub fn grant_in_settings(&self) {
        self.settings_grant.store(true, Ordering::SeqCst);
    }

    pub fn push_consent(&self, outcome: ConsentOutcome) {
        self.consent_script.lock().unwrap().push_back(outcome);
    }

    pub fn code_calls(&self) -> usize {
        self.codes.load(Ordering::SeqCst)
    }

    pub fn consent_calls(&self) -> usize {
        self.consents.load(Ordering::SeqCst)
    }

    pub fn prompt_calls(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    pub fn settings_calls(&self) -> usize {
        self.settings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostPlatform for ScriptedPlatform {
    async fn external_identity_code(&self) -> Result<IdentityCode, AuthError> {
        let n = self.codes.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.identity_fails.load(Ordering::SeqCst) {
            return Err(AuthError::Platform("login:fail".into()));
        }
        Ok(IdentityCode(format!("code-{n}")))
    }

    async fn consented_profile(&self) -> ConsentOutcome {
        self.consents.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.consent_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| granted("B"))
    }

    async fn open_permission_settings(&self) -> Result<PermissionSettings, AuthError> {
        self.settings.fetch_add(1, Ordering::SeqCst);
        Ok(PermissionSettings {
            granted: self.settings_grant.load(Ordering::SeqCst),
        })
    }

    async fn show_denial_prompt(&self, _text: &str) -> Result<(), AuthError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub type ReadyBuilder = LoginCenterBuilder<
    Configured<Arc<dyn KeyValueStore>>,
    Configured<Arc<dyn HostPlatform>>,
    Configured<Arc<dyn Transport>>,
>;

/// A login center wired to scripted collaborators.
pub struct Harness {
    pub center: LoginCenter,
    pub transport: Arc<ScriptedTransport>,
    pub platform: Arc<ScriptedPlatform>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn builder(
        config: LoginConfig,
        transport: &Arc<ScriptedTransport>,
        platform: &Arc<ScriptedPlatform>,
        store: &Arc<MemoryStore>,
    ) -> ReadyBuilder {
        LoginCenter::builder(config)
            .store(store.clone())
            .platform(platform.clone())
            .transport(transport.clone())
    }

    pub async fn start(transport: ScriptedTransport, platform: ScriptedPlatform) -> Self {
        Self::start_with(transport, platform, |b| b).await
    }

    pub async fn start_with<F>(
        transport: ScriptedTransport,
        platform: ScriptedPlatform,
        f: F,
    ) -> Self
    where
        F: FnOnce(ReadyBuilder) -> ReadyBuilder,
    {
        Self::start_with_config(config(), transport, platform, f).await
    }

    pub async fn start_with_config<F>(
        config: LoginConfig,
        transport: ScriptedTransport,
        platform: ScriptedPlatform,
        f: F,
    ) -> Self
    where
        F: FnOnce(ReadyBuilder) -> ReadyBuilder,
    {
        let transport = Arc::new(transport);
        let platform = Arc::new(platform);
        let store = Arc::new(MemoryStore::new());
        let center = f(Self::builder(config, &transport, &platform, &store))
            .build()
            .await
            .expect("build login center");
        Self {
            center,
            transport,
            platform,
            store,
        }
    }
}
