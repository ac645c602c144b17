use logincenter_core::SessionCredentials;
use std::fmt;

/// Cookie carrying the account id.
pub const ACCOUNT_ID_COOKIE: &str = "uid";
/// Cookie carrying the session secret. Its value is always stored quoted.
pub const SESSION_SECRET_COOKIE: &str = "PPU";
/// Cookie carrying the anonymous tracking token.
pub const TRACKING_TOKEN_COOKIE: &str = "tk";
/// Cookie identifying the calling deployment.
pub const SOURCE_COOKIE: &str = "t";

/// `Set-Cookie` attributes that never describe a credential.
const ATTRIBUTE_PREFIXES: &[&str] = &[
    "expires=", "domain=", "path=", "secure", "max-age=", "version=", "httponly", "samesite=",
];

/// Ordered name/value credential store serialized as a `Cookie` header.
///
/// The wire form is `name=value;` repeated, which is also what gets persisted. Values may
/// contain `=`, so only the first `=` of a pair separates name and value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CookieJar {
    entries: Vec<(String, String)>,
}

impl CookieJar {
    /// Create an empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the persisted/header form.
    pub fn parse(raw: &str) -> Self {
        let mut jar = Self::new();
        for pair in raw.split(';') {
            let pair = pair.trim();
            if let Some((name, value)) = pair.split_once('=') {
                let name = name.trim();
                if !name.is_empty() {
                    jar.insert_raw(name, value);
                }
            }
        }
        jar
    }

    /// Value of the cookie `name`, exactly as stored.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set `name`, replacing any previous value. The session secret is quoted.
    pub fn set(&mut self, name: &str, value: &str) {
        if name == SESSION_SECRET_COOKIE && !value.is_empty() && !value.starts_with('"') {
            self.insert_raw(name, &format!("\"{value}\""));
        } else {
            self.insert_raw(name, value);
        }
    }

    /// Remove `name`. Returns whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| k != name);
        self.entries.len() != before
    }

    /// Apply one `Set-Cookie` header value, skipping attributes. Returns the names updated.
    pub fn absorb_set_cookie(&mut self, header: &str) -> Vec<String> {
        let mut updated = Vec::new();
        for item in header.split(';') {
            let item = item.trim();
            let lower = item.to_ascii_lowercase();
            if ATTRIBUTE_PREFIXES.iter().any(|p| lower.starts_with(p)) {
                continue;
            }
            if let Some((name, value)) = item.split_once('=') {
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                self.set(name, value);
                updated.push(name.to_string());
            }
        }
        updated
    }

    /// The session credentials currently held, unquoted.
    pub fn credentials(&self) -> SessionCredentials {
        SessionCredentials {
            account_id: self.non_empty(ACCOUNT_ID_COOKIE).map(str::to_string),
            session_secret: self
                .non_empty(SESSION_SECRET_COOKIE)
                .map(|v| v.trim_matches('"').to_string())
                .filter(|v| !v.is_empty()),
            tracking_token: self.non_empty(TRACKING_TOKEN_COOKIE).map(str::to_string),
        }
    }

    /// `Cookie` header value, empty when the jar is empty.
    pub fn header_value(&self) -> String {
        self.to_string()
    }

    /// Whether the jar holds no cookie.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }

    fn insert_raw(&mut self, name: &str, value: &str) {
        self.remove(name);
        self.entries.push((name.to_string(), value.to_string()));
    }
}

impl fmt::Display for CookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            write!(f, "{name}={value};")?;
        }
        Ok(())
    }
}
