//! # Integration Tests for the Live Proxy
//!
//! Runs `LiveProxy` against wiremock servers standing in for the live web,
//! covering successful fetches, error statuses with and without
//! notifications, body forwarding, response cloning, and host-proxy policy.

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderValue, Method, StatusCode};
use parking_lot::Mutex;
use replay_core::{ArchiveRequest, NotifySink, ReplayError, ReplayNotification, ResourceStore};
use replay_live::{HostProxyEntry, LiveProxy, LiveProxyConfig};
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<ReplayNotification>>,
}

impl NotifySink for RecordingSink {
    fn notify(&self, message: ReplayNotification) {
        self.messages.lock().push(message);
    }
}

fn live(config: LiveProxyConfig, sink: Arc<RecordingSink>) -> LiveProxy {
    let client = LiveProxy::build_client(5).expect("client");
    LiveProxy::new(config, client, sink)
}

#[tokio::test]
async fn fetches_live_resource() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html>live</html>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let proxy = live(LiveProxyConfig::default(), sink.clone());
    let req = ArchiveRequest::new(format!("{}/page", server.uri()), "20230101000000", "mp_");

    let ex = proxy.lookup(&req, "/w/live/").await.unwrap().expect("exchange");
    assert_eq!(ex.status, StatusCode::OK);
    assert!(ex.is_live);
    assert_eq!(ex.body.as_ref(), b"<html>live</html>");
    assert!(ex.cloned_body.is_none());
    assert!(sink.messages.lock().is_empty());
}

#[tokio::test]
async fn error_status_notifies_once_and_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let proxy = live(
        LiveProxyConfig {
            message_on_proxy_errors: true,
            ..Default::default()
        },
        sink.clone(),
    );
    let url = format!("{}/gone", server.uri());
    let req = ArchiveRequest::new(url.clone(), "", "mp_");

    let err = proxy.lookup(&req, "/w/live/").await.unwrap_err();
    assert_eq!(
        err,
        ReplayError::LiveProxyFailure {
            url: url.clone(),
            status: Some(404)
        }
    );

    let messages = sink.messages.lock();
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0],
        ReplayNotification::LiveProxyError {
            kind: "status".into(),
            url,
            method: "GET".into(),
            status: Some(404),
        }
    );
}

#[tokio::test]
async fn error_status_is_silent_without_messaging() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let proxy = live(LiveProxyConfig::default(), sink.clone());
    let req = ArchiveRequest::new(format!("{}/x", server.uri()), "", "mp_");

    assert!(proxy.lookup(&req, "").await.is_err());
    assert!(sink.messages.lock().is_empty());
}

#[tokio::test]
async fn transport_failure_reports_fetch_error() {
    let sink = Arc::new(RecordingSink::default());
    let proxy = live(
        LiveProxyConfig {
            message_on_proxy_errors: true,
            ..Default::default()
        },
        sink.clone(),
    );
    // Guaranteed-closed port: connection refused.
    let req = ArchiveRequest::new("http://127.0.0.1:1/", "", "mp_");

    let err = proxy.lookup(&req, "").await.unwrap_err();
    assert!(matches!(err, ReplayError::LiveProxyFailure { status: None, .. }));

    let messages = sink.messages.lock();
    assert_eq!(messages.len(), 1);
    assert!(matches!(
        &messages[0],
        ReplayNotification::LiveProxyError { kind, status: None, .. } if kind == "fetch"
    ));
}

#[tokio::test]
async fn clone_response_retains_body_copy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("payload"))
        .expect(1)
        .mount(&server)
        .await;

    let proxy = live(
        LiveProxyConfig {
            clone_response: true,
            ..Default::default()
        },
        Arc::new(RecordingSink::default()),
    );
    let req = ArchiveRequest::new(format!("{}/data", server.uri()), "", "id_");
    let ex = proxy.lookup(&req, "").await.unwrap().unwrap();
    assert_eq!(ex.cloned_body.as_deref(), Some(b"payload".as_ref()));
    assert_eq!(ex.body, ex.cloned_body.unwrap());
}

#[tokio::test]
async fn body_forwarded_only_when_allowed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .and(body_string("a=1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("with body"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .respond_with(ResponseTemplate::new(200).set_body_string("no body"))
        .mount(&server)
        .await;

    let url = format!("{}/submit", server.uri());
    let req = ArchiveRequest::new(url, "", "mp_")
        .with_method(Method::POST, Some(Bytes::from_static(b"a=1")));

    let allowed = live(
        LiveProxyConfig {
            allow_body: true,
            ..Default::default()
        },
        Arc::new(RecordingSink::default()),
    );
    let ex = allowed.lookup(&req, "").await.unwrap().unwrap();
    assert_eq!(ex.body.as_ref(), b"with body");

    let denied = live(LiveProxyConfig::default(), Arc::new(RecordingSink::default()));
    let ex = denied.lookup(&req, "").await.unwrap().unwrap();
    assert_eq!(ex.body.as_ref(), b"no body");
}

#[tokio::test]
async fn host_proxy_routes_through_mirror() {
    let mirror = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(ResponseTemplate::new(200).set_body_string("mirrored"))
        .expect(1)
        .mount(&mirror)
        .await;

    let mut config = LiveProxyConfig {
        host_proxy_only: true,
        ..Default::default()
    };
    config.host_proxy.insert(
        "news.example".into(),
        HostProxyEntry {
            prefix: mirror.uri(),
            path_only: true,
            no_headers: false,
        },
    );
    let proxy = live(config, Arc::new(RecordingSink::default()));

    let req = ArchiveRequest::new("https://news.example/article", "", "mp_");
    let ex = proxy.lookup(&req, "").await.unwrap().unwrap();
    assert_eq!(ex.body.as_ref(), b"mirrored");

    // Unmapped host: refused without touching the network.
    let req = ArchiveRequest::new("https://other.example/", "", "mp_");
    assert!(proxy.lookup(&req, "").await.unwrap().is_none());
}

#[tokio::test]
async fn auth_headers_and_live_referrer_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer secret"))
        .and(header("x-proxy-referer", "https://example.com/from"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let proxy = live(
        LiveProxyConfig {
            archive_prefix: "/w/live/".into(),
            ..Default::default()
        },
        Arc::new(RecordingSink::default()),
    );
    let mut auth = http::HeaderMap::new();
    auth.insert("authorization", HeaderValue::from_static("Bearer secret"));
    proxy.update_headers(&auth);

    let req = ArchiveRequest::new(format!("{}/to", server.uri()), "", "mp_").with_header(
        http::header::REFERER,
        HeaderValue::from_static("http://localhost/w/live/2023mp_/https://example.com/from"),
    );
    let ex = proxy.lookup(&req, "").await.unwrap().unwrap();
    assert_eq!(ex.body.as_ref(), b"ok");
}

#[tokio::test]
async fn redirects_are_returned_not_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .mount(&server)
        .await;

    let proxy = live(LiveProxyConfig::default(), Arc::new(RecordingSink::default()));
    let req = ArchiveRequest::new(format!("{}/old", server.uri()), "", "mp_");
    let ex = proxy.lookup(&req, "").await.unwrap().unwrap();
    assert_eq!(ex.status, StatusCode::MOVED_PERMANENTLY);
    assert_eq!(ex.headers["location"], "/new");
}

#[tokio::test]
async fn live_proxy_has_no_index() {
    let proxy = live(LiveProxyConfig::default(), Arc::new(RecordingSink::default()));
    assert!(proxy.is_live());
    assert!(proxy.list_all().await.unwrap().is_empty());
}
