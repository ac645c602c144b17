use serde::{Deserialize, Serialize};

/// Outcome class of a login attempt.
///
/// The numeric values are part of the public contract and are what
/// [`LoginResult::code`] serializes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum LoginCode {
    /// Logged in (or, in silent mode, finished without interrupting the user).
    Ok,
    /// The host platform did not hand out an identity code.
    ExternalIdentityFailed,
    /// The user denied the profile consent, or it could not be obtained.
    ConsentDenied,
    /// The backend refused to create or resolve the account.
    AccountExchangeRejected,
    /// The configured add-on step rejected the fresh session; the session was rolled back.
    AddOnRejected,
    /// The pipeline finished without a usable session.
    NoResult,
    /// An unexpected error escaped the pipeline.
    Internal,
}

impl LoginCode {
    /// Numeric value of the code.
    pub fn as_i32(self) -> i32 {
        match self {
            LoginCode::Ok => 0,
            LoginCode::ExternalIdentityFailed => -1,
            LoginCode::ConsentDenied => -2,
            LoginCode::AccountExchangeRejected => -3,
            LoginCode::AddOnRejected => -4,
            LoginCode::NoResult => -100,
            LoginCode::Internal => -500,
        }
    }
}

impl From<LoginCode> for i32 {
    fn from(code: LoginCode) -> Self {
        code.as_i32()
    }
}

impl TryFrom<i32> for LoginCode {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(LoginCode::Ok),
            -1 => Ok(LoginCode::ExternalIdentityFailed),
            -2 => Ok(LoginCode::ConsentDenied),
            -3 => Ok(LoginCode::AccountExchangeRejected),
            -4 => Ok(LoginCode::AddOnRejected),
            -100 => Ok(LoginCode::NoResult),
            -500 => Ok(LoginCode::Internal),
            other => Err(format!("unknown login code {other}")),
        }
    }
}

/// The result handed back by every `login()` call, including deduplicated ones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    /// Outcome class.
    pub code: LoginCode,
    /// Detailed reason, intended for logs.
    pub err_msg: String,
    /// Optional message for the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toast_msg: Option<String>,
}

impl LoginResult {
    /// Successful login.
    pub fn ok() -> Self {
        Self::new(LoginCode::Ok, "ok")
    }

    /// Result with the given code and detail.
    pub fn new(code: LoginCode, err_msg: impl Into<String>) -> Self {
        Self {
            code,
            err_msg: err_msg.into(),
            toast_msg: None,
        }
    }

    /// Failure built from a step error, keeping its user-facing message.
    pub fn from_step(code: LoginCode, err: crate::error::StepError) -> Self {
        Self {
            code,
            err_msg: err.err_msg,
            toast_msg: err.toast_msg,
        }
    }

    /// Numeric code, `0` on success.
    pub fn code(&self) -> i32 {
        self.code.as_i32()
    }

    /// Whether the login succeeded.
    pub fn is_ok(&self) -> bool {
        self.code == LoginCode::Ok
    }
}

/// How hard `login()` is allowed to try.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginMode {
    /// Reuse an existing session, otherwise resolve silently and fall back to explicit consent.
    #[default]
    Common,
    /// Only try the silent resolution; never prompt the user.
    Silent,
    /// Ignore any existing session and run the full pipeline.
    Force,
}
