//! Logs in against a real backend with the terminal standing in for the host platform.
//!
//! ```text
//! LOGINCENTER_SOURCE=mp LOGINCENTER_BASE_URL=https://passport.example.com \
//!     cargo run -p logincenter-examples --bin console_login -- https://api.example.com/me
//! ```

use async_trait::async_trait;
use logincenter::flow::{AddOnOutcome, AddOnStep, ConsentObserver};
use logincenter::session::FileStore;
use logincenter::{
    AuthError, ConsentFailure, ConsentOutcome, ConsentedProfile, HostPlatform, IdentityCode,
    LocalProfile, LoginCenter, LoginConfig, LoginMode, LoginResult, PermissionSettings,
    RequestOptions, SessionManager,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Reads identity codes and consent answers from stdin.
struct ConsolePlatform {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl ConsolePlatform {
    fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    async fn ask(&self, prompt: &str) -> Result<String, AuthError> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("{prompt} ").as_bytes())
            .await
            .map_err(|e| AuthError::Platform(e.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|e| AuthError::Platform(e.to_string()))?;
        match self.lines.lock().await.next_line().await {
            Ok(Some(line)) => Ok(line.trim().to_string()),
            Ok(None) => Err(AuthError::Platform("stdin closed".into())),
            Err(e) => Err(AuthError::Platform(e.to_string())),
        }
    }
}

#[async_trait]
impl HostPlatform for ConsolePlatform {
    async fn external_identity_code(&self) -> Result<IdentityCode, AuthError> {
        let code = self.ask("identity code:").await?;
        if code.is_empty() {
            return Err(AuthError::Platform("login:fail empty code".into()));
        }
        Ok(IdentityCode(code))
    }

    async fn consented_profile(&self) -> ConsentOutcome {
        match self.ask("share your profile? [y/N]").await {
            Ok(answer) if answer.eq_ignore_ascii_case("y") => {}
            Ok(_) => return ConsentOutcome::Denied,
            Err(e) => return ConsentOutcome::Failed(e.to_string()),
        }
        let nick_name = match self.ask("nickname:").await {
            Ok(name) => name,
            Err(e) => return ConsentOutcome::Failed(e.to_string()),
        };
        let encrypted_data = std::env::var("LOGINCENTER_DEMO_ENCRYPTED_DATA").ok();
        let iv = std::env::var("LOGINCENTER_DEMO_IV").ok();
        ConsentOutcome::Granted(ConsentedProfile {
            user_info: LocalProfile {
                nick_name: Some(nick_name),
                ..Default::default()
            },
            encrypted_data,
            iv,
        })
    }

    async fn open_permission_settings(&self) -> Result<PermissionSettings, AuthError> {
        let answer = self.ask("grant the profile permission now? [y/N]").await?;
        Ok(PermissionSettings {
            granted: answer.eq_ignore_ascii_case("y"),
        })
    }

    async fn show_denial_prompt(&self, text: &str) -> Result<(), AuthError> {
        println!("{text}");
        Ok(())
    }
}

struct PrintConsent;

impl ConsentObserver for PrintConsent {
    fn consent_failed(&self, kind: ConsentFailure, detail: &str) {
        println!("consent failed ({kind:?}): {detail}");
    }
}

/// Refuses sessions without an account id.
struct RequireAccountId;

#[async_trait]
impl AddOnStep for RequireAccountId {
    async fn run(&self, session: &SessionManager) -> Result<AddOnOutcome, AuthError> {
        if session.account_profile().await.account_id.is_some() {
            Ok(AddOnOutcome::accept())
        } else {
            Ok(AddOnOutcome::reject(
                "account id missing",
                Some("Please try again later".into()),
            ))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()))
        .init();

    let config = LoginConfig::from_env()?;
    let state_dir =
        std::env::var("LOGINCENTER_STATE_DIR").unwrap_or_else(|_| ".logincenter".to_string());

    let center = LoginCenter::builder(config)
        .store(Arc::new(FileStore::new(state_dir)))
        .platform(Arc::new(ConsolePlatform::new()))
        .reqwest_transport()
        .consent_observer(PrintConsent)
        .add_on(RequireAccountId)
        .login_failed(|res: &LoginResult| {
            println!("{}", res.toast_msg.as_deref().unwrap_or("Login failed"));
        })
        .build()
        .await?;

    let mode = match std::env::args().nth(2).as_deref() {
        Some("silent") => LoginMode::Silent,
        Some("force") => LoginMode::Force,
        _ => LoginMode::Common,
    };
    let result = center.login(mode).await;
    println!("login: {}", serde_json::to_string(&result)?);

    if let Some(url) = std::env::args().nth(1) {
        let body = center.request_with_login(RequestOptions::get(url)).await?;
        println!("{}", serde_json::to_string_pretty(&body)?);
    }

    println!("account: {:?}", center.account_info().await.account_id);
    Ok(())
}
