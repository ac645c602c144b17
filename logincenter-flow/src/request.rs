use http::header::{CONTENT_TYPE, COOKIE};
use http::{HeaderMap, Method, StatusCode};
use logincenter_core::{AuthError, LoginMode};
use serde_json::{Map, Value};
use url::Url;

/// Content type used when the caller does not pick one.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A business request as seen by the gateway, before credentials are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    /// Absolute target URL.
    pub url: String,
    /// HTTP method.
    pub method: Method,
    /// Extra headers. A `cookie` header is appended to the session cookies.
    pub headers: Vec<(String, String)>,
    /// Parameters, sent as query string for `GET`/`HEAD` and as body otherwise.
    pub data: Map<String, Value>,
    /// Login mode used by [`request_with_login`](crate::LoginCenter::request_with_login).
    pub login_mode: LoginMode,
}

impl RequestOptions {
    /// Request with the given method.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: Vec::new(),
            data: Map::new(),
            login_mode: LoginMode::default(),
        }
    }

    /// `GET` request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// `POST` request.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add a parameter.
    pub fn data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Send parameters as a JSON body instead of a form.
    pub fn json(self) -> Self {
        self.header(CONTENT_TYPE.as_str(), "application/json")
    }

    /// Login mode to use before sending.
    pub fn login_mode(mut self, mode: LoginMode) -> Self {
        self.login_mode = mode;
        self
    }

    /// First value of header `name`, compared case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Build the transport request, attaching `session_cookies`.
    ///
    /// Without an explicit content type parameters are form encoded, and array or object
    /// values are sent as their JSON text.
    pub fn to_http_request(
        &self,
        session_cookies: &str,
    ) -> Result<http::Request<Vec<u8>>, AuthError> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| AuthError::InvalidRequest(format!("invalid url `{}`: {e}", self.url)))?;
        let content_type = self
            .header_value(CONTENT_TYPE.as_str())
            .unwrap_or(FORM_CONTENT_TYPE)
            .to_string();
        let is_form = content_type
            .split(';')
            .next()
            .is_some_and(|ct| ct.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE));

        let body = if self.method == Method::GET || self.method == Method::HEAD {
            if !self.data.is_empty() {
                let mut pairs = url.query_pairs_mut();
                for (key, value) in &self.data {
                    pairs.append_pair(key, &form_value(value));
                }
            }
            Vec::new()
        } else if is_form {
            let mut form = url::form_urlencoded::Serializer::new(String::new());
            for (key, value) in &self.data {
                form.append_pair(key, &form_value(value));
            }
            form.finish().into_bytes()
        } else if self.data.is_empty() {
            Vec::new()
        } else {
            serde_json::to_vec(&self.data)?
        };

        let mut cookie = session_cookies.to_string();
        let mut builder = http::Request::builder()
            .method(self.method.clone())
            .uri(url.as_str());
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case(COOKIE.as_str()) {
                cookie.push_str(value);
            } else if !name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        builder = builder.header(CONTENT_TYPE, content_type);
        if !cookie.is_empty() {
            builder = builder.header(COOKIE, cookie);
        }
        builder
            .body(body)
            .map_err(|e| AuthError::InvalidRequest(e.to_string()))
    }
}

fn form_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A response with its body decoded.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// JSON body; non-JSON bodies are kept as a string and empty ones as `null`.
    pub body: Value,
}

impl ApiResponse {
    /// Decode a transport response.
    pub fn from_http(response: http::Response<Vec<u8>>) -> Self {
        let (parts, bytes) = response.into_parts();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        Self {
            status: parts.status,
            headers: parts.headers,
            body,
        }
    }

    /// The backend's `respCode`, if any.
    pub fn resp_code(&self) -> Option<i64> {
        resp_code(&self.body)
    }
}

/// `respCode` of a backend envelope.
pub(crate) fn resp_code(body: &Value) -> Option<i64> {
    int_field(body, "respCode")
}

/// Integer field `key` of `value`. Some services send numbers as strings.
pub(crate) fn int_field(value: &Value, key: &str) -> Option<i64> {
    match value.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
