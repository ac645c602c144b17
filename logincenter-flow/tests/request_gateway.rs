mod support;

use async_trait::async_trait;
use logincenter_core::{AuthError, LoginCode, TransportError};
use logincenter_flow::{ApiResponse, RequestOptions, RetryHook, TransportRecovery};
use serde_json::{json, Value};
use std::time::Duration;
use support::*;

async fn logged_in(transport: ScriptedTransport) -> Harness {
    transport.route(SILENT, silent_ok("A", "u1", "s1"));
    let h = Harness::start(transport, ScriptedPlatform::new()).await;
    assert!(h.center.login(Default::default()).await.is_ok());
    h
}

#[tokio::test]
async fn tracking_token_is_provisioned_once() {
    let transport = ScriptedTransport::new().with_delay(Duration::from_millis(20));
    let h = Harness::start(transport, ScriptedPlatform::new()).await;

    tokio::join!(
        h.center.ensure_tracking_token(),
        h.center.ensure_tracking_token(),
        h.center.ensure_tracking_token(),
        h.center.ensure_tracking_token(),
        h.center.ensure_tracking_token(),
    );
    h.center.ensure_tracking_token().await;

    assert_eq!(h.transport.calls(TOKEN), 1);
    assert_eq!(
        h.center.session().tracking_token().await.as_deref(),
        Some("tk-1")
    );
    let sent = &h.transport.sent(TOKEN)[0];
    assert_eq!(sent.method, "GET");
    assert!(sent.url.starts_with(BASE_URL));
}

#[tokio::test]
async fn failed_provisioning_does_not_block_requests() {
    let transport = ScriptedTransport::new();
    transport.route(TOKEN, Reply::fail("connection reset"));
    transport.route(ORDER, json!({"respCode": 0, "respData": []}));
    let h = Harness::start(transport, ScriptedPlatform::new()).await;

    let first = h.center.request(RequestOptions::get(API_URL)).await.unwrap();
    let second = h.center.request(RequestOptions::get(API_URL)).await.unwrap();

    assert_eq!(first.resp_code(), Some(0));
    assert_eq!(second.resp_code(), Some(0));
    assert_eq!(h.transport.calls(TOKEN), 2);
    assert_eq!(h.center.session().tracking_token().await, None);
}

#[tokio::test]
async fn unusable_token_response_is_ignored() {
    let transport = ScriptedTransport::new();
    transport.route(TOKEN, json!({"respCode": -1, "respData": {"result": "nope"}}));
    let h = Harness::start(transport, ScriptedPlatform::new()).await;

    h.center.ensure_tracking_token().await;

    assert_eq!(h.center.session().tracking_token().await, None);
}

#[tokio::test]
async fn requests_carry_credentials_and_capture_refreshed_ones() {
    let transport = ScriptedTransport::new();
    transport.route(
        ORDER,
        Reply::from(json!({"respCode": 0}))
            .with_cookie("PPU=s2; Path=/; HttpOnly")
            .with_cookie("uid=u1; Max-Age=3600"),
    );
    let h = logged_in(transport).await;

    let response = h
        .center
        .request(RequestOptions::post(API_URL).data("page", 1))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.headers.get_all("set-cookie").iter().count(), 2);
    let sent = &h.transport.sent(ORDER)[0];
    let cookie = sent.cookie().unwrap_or_default();
    assert!(cookie.contains("uid=u1;"), "{cookie}");
    assert!(cookie.contains("PPU=\"s1\";"), "{cookie}");
    assert_eq!(sent.body, "page=1");

    assert_eq!(
        h.center.account_info().await.session_secret.as_deref(),
        Some("s2")
    );
    let header = h.center.session().cookie_header().await;
    assert!(header.contains("PPU=\"s2\";"), "{header}");
}

#[tokio::test]
async fn non_ascii_set_cookie_still_refreshes_credentials() {
    let transport = ScriptedTransport::new();
    transport.route(
        ORDER,
        Reply::from(json!({"respCode": 0})).with_cookie("PPU=s2; Path=/会话"),
    );
    let h = logged_in(transport).await;

    h.center.request(RequestOptions::get(API_URL)).await.unwrap();

    assert_eq!(
        h.center.account_info().await.session_secret.as_deref(),
        Some("s2")
    );
}

#[tokio::test]
async fn repeated_rejection_makes_two_attempts_and_surfaces_the_second() {
    let transport = ScriptedTransport::new();
    transport.route_seq(
        ORDER,
        vec![
            json!({"respCode": -1, "errMsg": "请登录", "attempt": 1}).into(),
            json!({"respCode": -1, "errMsg": "请登录", "attempt": 2}).into(),
        ],
    );
    let h = logged_in(transport).await;

    let err = h
        .center
        .request_with_login(RequestOptions::get(API_URL))
        .await
        .unwrap_err();

    match err {
        AuthError::SessionRejected { url, body } => {
            assert_eq!(url, API_URL);
            assert_eq!(body["attempt"], 2);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(h.transport.calls(ORDER), 2);
    assert_eq!(h.transport.calls(SILENT), 2);
    assert!(!h.center.check_login().await);
    assert_eq!(
        h.center.session().tracking_token().await.as_deref(),
        Some("tk-1")
    );
}

#[tokio::test]
async fn one_rejection_is_recovered_by_the_retry() {
    let transport = ScriptedTransport::new();
    transport.route_seq(
        ORDER,
        vec![
            please_log_in().into(),
            json!({"respCode": 0, "respData": {"orders": []}}).into(),
        ],
    );
    let h = logged_in(transport).await;

    let body = h
        .center
        .request_with_login(RequestOptions::get(API_URL))
        .await
        .unwrap();

    assert_eq!(body["respData"], json!({"orders": []}));
    assert_eq!(h.transport.calls(ORDER), 2);
    assert!(h.center.check_login().await);
}

#[tokio::test]
async fn disabled_retry_surfaces_the_first_rejection() {
    let transport = ScriptedTransport::new();
    transport.route(ORDER, please_log_in());
    let h = logged_in(transport).await;

    let err = h
        .center
        .request_with_login_opts(RequestOptions::get(API_URL), false)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::SessionRejected { .. }));
    assert_eq!(h.transport.calls(ORDER), 1);
    assert!(!h.center.check_login().await);
}

#[tokio::test]
async fn failed_login_does_not_send_the_request() {
    let platform = ScriptedPlatform::new();
    platform.fail_identity();
    let h = Harness::start(ScriptedTransport::new(), platform).await;

    let err = h
        .center
        .request_with_login(RequestOptions::get(API_URL))
        .await
        .unwrap_err();

    match err {
        AuthError::LoginRequired { url, result } => {
            assert_eq!(url, API_URL);
            assert_eq!(result.code, LoginCode::ExternalIdentityFailed);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(h.transport.calls(ORDER), 0);
}

#[tokio::test]
async fn configured_rule_detects_rejection_on_its_path() {
    let transport = ScriptedTransport::new();
    transport.route(SILENT, silent_ok("A", "u1", "s1"));
    transport.route(ORDER, json!({"respCode": -2}));
    transport.route("/user/", json!({"respCode": -2}));
    let config = config().with_auth_fail_rule("/order/", -2);
    let h = Harness::start_with_config(config, transport, ScriptedPlatform::new(), |b| b).await;

    let other = h
        .center
        .request_with_login(RequestOptions::get("https://api.example.com/user/info"))
        .await
        .unwrap();
    assert_eq!(other["respCode"], -2);

    let err = h
        .center
        .request_with_login(RequestOptions::get(API_URL))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionRejected { .. }));
    assert_eq!(h.transport.calls(ORDER), 2);
}

struct HookRetry;

#[async_trait]
impl RetryHook for HookRetry {
    async fn retry(&self, options: RequestOptions) -> Result<Value, AuthError> {
        Ok(json!({"retriedBy": "hook", "url": options.url}))
    }
}

#[tokio::test]
async fn custom_predicate_and_retry_hook() {
    let transport = ScriptedTransport::new();
    transport.route(SILENT, silent_ok("A", "u1", "s1"));
    transport.route(ORDER, json!({"respCode": 0, "expired": true}));
    let h = Harness::start_with(transport, ScriptedPlatform::new(), |b| {
        b.auth_failure_predicate(|body: &Value, _: &RequestOptions| body["expired"] == true)
            .retry_hook(HookRetry)
    })
    .await;

    let body = h
        .center
        .request_with_login(RequestOptions::get(API_URL))
        .await
        .unwrap();

    assert_eq!(body, json!({"retriedBy": "hook", "url": API_URL}));
    assert_eq!(h.transport.calls(ORDER), 1);
    assert!(!h.center.check_login().await);
}

struct Fallback;

#[async_trait]
impl TransportRecovery for Fallback {
    async fn recover(
        &self,
        error: TransportError,
        options: RequestOptions,
    ) -> Result<ApiResponse, AuthError> {
        let body = json!({"respCode": 0, "recovered": error.to_string(), "url": options.url});
        Ok(ApiResponse::from_http(
            http::Response::new(body.to_string().into_bytes()),
        ))
    }
}

#[tokio::test]
async fn transport_failure_without_recovery_is_returned() {
    let transport = ScriptedTransport::new();
    transport.route(ORDER, Reply::fail("timeout"));
    let h = Harness::start(transport, ScriptedPlatform::new()).await;

    let err = h.center.request(RequestOptions::get(API_URL)).await.unwrap_err();

    assert!(matches!(err, AuthError::Transport(TransportError::Network(_))));
}

#[tokio::test]
async fn transport_failure_is_handed_to_recovery() {
    let transport = ScriptedTransport::new();
    transport.route(ORDER, Reply::fail("timeout"));
    let h = Harness::start_with(transport, ScriptedPlatform::new(), |b| {
        b.transport_recovery(Fallback)
    })
    .await;

    let response = h.center.request(RequestOptions::get(API_URL)).await.unwrap();

    assert_eq!(response.body["recovered"], "request failed: timeout");
    assert_eq!(response.body["url"], API_URL);
}

#[tokio::test]
async fn before_request_rewrites_options() {
    let transport = ScriptedTransport::new();
    transport.route(ORDER, json!({"respCode": 0}));
    let h = Harness::start_with(transport, ScriptedPlatform::new(), |b| {
        b.before_request(|options: RequestOptions| {
            options.header("X-Client", "mp").data("ts", 42)
        })
    })
    .await;

    h.center
        .request(RequestOptions::get(API_URL).data("page", 2))
        .await
        .unwrap();

    let sent = &h.transport.sent(ORDER)[0];
    assert_eq!(
        sent.headers.get("x-client").and_then(|v| v.to_str().ok()),
        Some("mp")
    );
    assert!(sent.url.contains("page=2"), "{}", sent.url);
    assert!(sent.url.contains("ts=42"), "{}", sent.url);
}
