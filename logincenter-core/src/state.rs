use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// User attributes handed out by the host platform (nickname, avatar, platform ids).
///
/// Unknown attributes are kept in `extra` so the record survives a round trip through
/// storage untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalProfile {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nick_name: Option<String>,
    /// Avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Platform-scoped user id.
    #[serde(default, rename = "openid", skip_serializing_if = "Option::is_none")]
    pub open_id: Option<String>,
    /// Cross-application platform id.
    #[serde(default, rename = "unionid", skip_serializing_if = "Option::is_none")]
    pub union_id: Option<String>,
    /// Remaining platform attributes.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LocalProfile {
    /// Whether no attribute is set.
    pub fn is_empty(&self) -> bool {
        self.nick_name.is_none()
            && self.avatar_url.is_none()
            && self.open_id.is_none()
            && self.union_id.is_none()
            && self.extra.is_empty()
    }
}

/// The application account bound to the current user.
///
/// A present `session_secret` is what makes a session count as logged in.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountProfile {
    /// Account id.
    #[serde(
        default,
        rename = "uid",
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub account_id: Option<String>,
    /// Session secret sent with every authenticated request.
    #[serde(default, rename = "ppu", skip_serializing_if = "Option::is_none")]
    pub session_secret: Option<String>,
    /// Optional long-lived session token.
    #[serde(default, rename = "token", skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    /// When the profile was last persisted.
    #[serde(default, rename = "loggedInAt", skip_serializing_if = "Option::is_none")]
    pub logged_in_at: Option<DateTime<Utc>>,
    /// Remaining backend attributes.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AccountProfile {
    /// Whether this profile carries a usable session.
    pub fn is_logged_in(&self) -> bool {
        self.session_secret
            .as_deref()
            .is_some_and(|secret| !secret.is_empty())
    }
}

/// Backends hand out numeric and string account ids alike.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Null) | None => None,
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "expected string or number account id, got {other}"
            )))
        }
    })
}

/// The credentials carried by every outbound request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionCredentials {
    /// Account id.
    pub account_id: Option<String>,
    /// Session secret.
    pub session_secret: Option<String>,
    /// Anonymous tracking token.
    pub tracking_token: Option<String>,
}

/// Single-use code issued by the host platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityCode(pub String);

impl IdentityCode {
    /// The raw code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Profile released by the user through the platform consent prompt.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentedProfile {
    /// Plain user attributes.
    #[serde(default)]
    pub user_info: LocalProfile,
    /// Encrypted payload the backend decrypts to verify the identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_data: Option<String>,
    /// Initialisation vector for `encrypted_data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
}

/// What the platform answered when asked for the user's profile.
#[derive(Clone, Debug, PartialEq)]
pub enum ConsentOutcome {
    /// The user granted access.
    Granted(ConsentedProfile),
    /// The user denied access now or earlier.
    Denied,
    /// The call failed for another reason.
    Failed(String),
}

/// Result of opening the platform permission settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PermissionSettings {
    /// Whether the profile permission is granted after the user left the settings page.
    pub granted: bool,
}

/// Why explicit consent could not be obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentFailure {
    /// The user kept refusing.
    Deny,
    /// Any other failure.
    Unknown,
}
