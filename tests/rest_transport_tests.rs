//! HTTP transport against an in-process axum server.

use axum::{
    extract::RawQuery,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use mbx_connector::core::errors::ExchangeError;
use mbx_connector::core::kernel::{
    Credential, HttpMiddleware, ParamPlacement, ParameterSet, RequestInfo, ResponseInfo,
    ReqwestRest, RestClient, RestClientBuilder, RestClientConfig, RestRequest,
};
use mbx_connector::core::types::SecurityType;
use reqwest::Method;
use rstest::rstest;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

const API_KEY: &str = "test-api-key";
const SECRET: &str = "test-secret";

/// Recompute the signature over everything before `&signature=`.
fn signature_is_valid(query: &str) -> bool {
    let Some((payload, signature)) = query.rsplit_once("&signature=") else {
        return false;
    };
    Credential::hmac(API_KEY, SECRET)
        .sign(payload.as_bytes())
        .is_ok_and(|expected| expected == signature)
}

fn create_router() -> Router {
    Router::new()
        .route("/api/v3/ping", get(|| async { "{}" }))
        .route(
            "/api/v3/account",
            get(|headers: HeaderMap, RawQuery(query): RawQuery| async move {
                let query = query.unwrap_or_default();
                let key = headers
                    .get("X-MBX-APIKEY")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if key != API_KEY {
                    return (StatusCode::UNAUTHORIZED, r#"{"code":-2015}"#.to_string())
                        .into_response();
                }
                if !query.contains("timestamp=") || !signature_is_valid(&query) {
                    return (StatusCode::BAD_REQUEST, r#"{"code":-1022}"#.to_string())
                        .into_response();
                }
                (StatusCode::OK, format!(r#"{{"query":"{}"}}"#, query)).into_response()
            }),
        )
        .route(
            "/api/v3/depth",
            get(|headers: HeaderMap, RawQuery(query): RawQuery| async move {
                // Public endpoint: no key, no signature
                let has_key = headers.contains_key("X-MBX-APIKEY");
                format!(
                    r#"{{"query":"{}","has_key":{}}}"#,
                    query.unwrap_or_default(),
                    has_key
                )
            }),
        )
        .route(
            "/api/v3/order",
            post(|headers: HeaderMap, RawQuery(query): RawQuery, body: String| async move {
                let form = headers
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|v| v == "application/x-www-form-urlencoded");
                if query.is_some() || !form || !signature_is_valid(&body) {
                    return (StatusCode::BAD_REQUEST, "bad body".to_string()).into_response();
                }
                (StatusCode::OK, r#"{"orderId":1}"#.to_string()).into_response()
            }),
        )
        .route(
            "/api/v3/error",
            get(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    r#"{"code":-1121,"msg":"Invalid symbol."}"#,
                )
            }),
        )
        .route(
            "/api/v3/headers",
            get(|headers: HeaderMap| async move {
                let value = |name: &str| {
                    headers
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string()
                };
                format!(
                    r#"{{"x-api-key":"{}","x-mbx-apikey":"{}","x-request-tag":"{}"}}"#,
                    value("x-api-key"),
                    value("x-mbx-apikey"),
                    value("x-request-tag")
                )
            }),
        )
        .route(
            "/api/v3/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "{}"
            }),
        )
}

async fn start_test_server() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test server");
    let addr = listener.local_addr().expect("missing local addr");

    tokio::spawn(async move {
        axum::serve(listener, create_router().into_make_service())
            .await
            .expect("test server failed");
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

fn rest_client(addr: SocketAddr, credential: Option<Credential>) -> ReqwestRest {
    let config = RestClientConfig::new(format!("http://{}", addr), "test".to_string());
    let mut builder = RestClientBuilder::new(config);
    if let Some(credential) = credential {
        builder = builder.with_credential(Arc::new(credential));
    }
    builder.build().expect("client builds")
}

#[tokio::test]
async fn test_public_request_returns_raw_body() {
    let addr = start_test_server().await;
    let rest = rest_client(addr, Some(Credential::hmac(API_KEY, SECRET)));

    assert_eq!(
        rest.get("/api/v3/ping", ParameterSet::new(), SecurityType::None)
            .await
            .unwrap(),
        "{}"
    );

    let body = rest
        .get(
            "/api/v3/depth",
            ParameterSet::new().with("symbol", "BTCUSDT").with("limit", 5_u32),
            SecurityType::None,
        )
        .await
        .unwrap();
    assert_eq!(body, r#"{"query":"symbol=BTCUSDT&limit=5","has_key":false}"#);
}

#[tokio::test]
async fn test_signed_request_is_accepted() {
    let addr = start_test_server().await;
    let rest = rest_client(addr, Some(Credential::hmac(API_KEY, SECRET)));

    let request = RestRequest::new(Method::GET, "/api/v3/account", SecurityType::Signed)
        .params(ParameterSet::new().with("omitZeroBalances", true))
        .recv_window(Some(5000));
    let body = rest.send_request(&request).await.unwrap();

    assert!(body.contains("omitZeroBalances=true&recvWindow=5000&timestamp="));
    assert!(body.contains("&signature="));
}

#[tokio::test]
async fn test_signed_body_placement() {
    let addr = start_test_server().await;
    let rest = rest_client(addr, Some(Credential::hmac(API_KEY, SECRET)));

    let request = RestRequest::new(Method::POST, "/api/v3/order", SecurityType::Signed)
        .params(
            ParameterSet::new()
                .with("symbol", "BTCUSDT")
                .with("side", "BUY"),
        )
        .placement(ParamPlacement::Body);
    assert_eq!(rest.send_request(&request).await.unwrap(), r#"{"orderId":1}"#);
}

#[tokio::test]
async fn test_wrong_key_is_transport_error() {
    let addr = start_test_server().await;
    let rest = rest_client(addr, Some(Credential::hmac("other-key", SECRET)));

    let err = rest
        .get("/api/v3/account", ParameterSet::new(), SecurityType::Signed)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ExchangeError::TransportError { status: 401, .. }
    ));
    assert!(err.was_sent());
}

#[tokio::test]
async fn test_non_2xx_carries_status_and_body() {
    let addr = start_test_server().await;
    let rest = rest_client(addr, None);

    match rest
        .get("/api/v3/error", ParameterSet::new(), SecurityType::None)
        .await
    {
        Err(ExchangeError::TransportError { status, body }) => {
            assert_eq!(status, 400);
            assert_eq!(body, r#"{"code":-1121,"msg":"Invalid symbol."}"#);
        }
        other => panic!("expected TransportError, got {:?}", other),
    }
}

#[rstest]
#[case::signed(SecurityType::Signed)]
#[case::api_key(SecurityType::ApiKey)]
#[tokio::test]
async fn test_keyed_request_without_credential_never_sent(#[case] security: SecurityType) {
    let addr = start_test_server().await;
    let rest = rest_client(addr, None);

    let err = rest
        .get("/api/v3/account", ParameterSet::new(), security)
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::AuthenticationRequired));
    assert!(!err.was_sent());
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let rest = rest_client(addr, None);
    let err = rest
        .get("/api/v3/ping", ParameterSet::new(), SecurityType::None)
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::NetworkError(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_cancellation_aborts_request() {
    let addr = start_test_server().await;
    let rest = rest_client(addr, None);
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let request = RestRequest::new(Method::GET, "/api/v3/slow", SecurityType::None);
    let started = std::time::Instant::now();
    let result = rest.send_cancellable(&request, &token).await;

    assert!(matches!(result, Err(ExchangeError::Cancelled(_))));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_http_timeout_is_retryable_network_error() {
    let addr = start_test_server().await;
    let rest = RestClientBuilder::new(
        RestClientConfig::new(format!("http://{}", addr), "test".to_string()).with_timeout(1),
    )
    .build()
    .unwrap();

    let started = std::time::Instant::now();
    let err = rest
        .get("/api/v3/slow", ParameterSet::new(), SecurityType::None)
        .await
        .unwrap_err();

    assert!(matches!(err, ExchangeError::NetworkError(_)), "{:?}", err);
    assert!(err.is_retryable());
    assert!(err.was_sent());
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_api_key_header_name_is_configurable() {
    let addr = start_test_server().await;
    let rest = RestClientBuilder::new(
        RestClientConfig::new(format!("http://{}", addr), "test".to_string())
            .with_api_key_header("X-API-KEY".to_string()),
    )
    .with_credential(Arc::new(Credential::hmac(API_KEY, SECRET)))
    .build()
    .unwrap();

    let body = rest
        .get("/api/v3/headers", ParameterSet::new(), SecurityType::ApiKey)
        .await
        .unwrap();
    let echoed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(echoed["x-api-key"], API_KEY);
    assert_eq!(echoed["x-mbx-apikey"], "");
}

#[tokio::test]
async fn test_request_headers_are_sent() {
    let addr = start_test_server().await;
    let rest = rest_client(addr, Some(Credential::hmac(API_KEY, SECRET)));

    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert("X-Request-Tag", "batch-7".parse().unwrap());
    let request = RestRequest::new(Method::GET, "/api/v3/headers", SecurityType::ApiKey)
        .headers(headers);
    let body = rest.send_request(&request).await.unwrap();

    let echoed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(echoed["x-request-tag"], "batch-7");
    assert_eq!(echoed["x-mbx-apikey"], API_KEY);
    assert_eq!(echoed["x-api-key"], "");
}

#[derive(Default)]
struct Recorder {
    queries: Mutex<Vec<String>>,
    statuses: Mutex<Vec<Option<u16>>>,
}

impl HttpMiddleware for Recorder {
    fn on_request(&self, request: &RequestInfo<'_>) {
        self.queries.lock().unwrap().push(request.query.clone());
    }

    fn on_response(&self, _request: &RequestInfo<'_>, response: &ResponseInfo<'_>) {
        self.statuses.lock().unwrap().push(response.status);
    }
}

#[tokio::test]
async fn test_middleware_sees_redacted_query() {
    let addr = start_test_server().await;
    let recorder = Arc::new(Recorder::default());
    let rest = RestClientBuilder::new(RestClientConfig::new(
        format!("http://{}", addr),
        "test".to_string(),
    ))
    .with_credential(Arc::new(Credential::hmac(API_KEY, SECRET)))
    .with_middleware(recorder.clone())
    .build()
    .unwrap();

    rest.get("/api/v3/account", ParameterSet::new(), SecurityType::Signed)
        .await
        .unwrap();
    let _ = rest
        .get("/api/v3/error", ParameterSet::new(), SecurityType::None)
        .await;

    let queries = recorder.queries.lock().unwrap().clone();
    assert!(queries[0].starts_with("timestamp="));
    assert!(queries[0].ends_with("&signature=[REDACTED]"));
    assert_eq!(*recorder.statuses.lock().unwrap(), vec![Some(200), Some(400)]);
}

/// Drops the first connection after reading its request, answers the second.
async fn start_flaky_server() -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let request_lines = Arc::new(Mutex::new(Vec::new()));
    let seen = request_lines.clone();

    tokio::spawn(async move {
        let mut attempt = 0;
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            attempt += 1;

            let mut buf = vec![0_u8; 8192];
            let mut read = 0;
            while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf[read..]).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => read += n,
                }
            }
            let head = String::from_utf8_lossy(&buf[..read]).to_string();
            if let Some(line) = head.lines().next() {
                seen.lock().unwrap().push(line.to_string());
            }

            if attempt == 1 {
                drop(socket);
                continue;
            }
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}")
                .await;
        }
    });

    (addr, request_lines)
}

#[tokio::test]
async fn test_send_with_retry_resigns_each_attempt() {
    let (addr, request_lines) = start_flaky_server().await;
    let config = RestClientConfig::new(format!("http://{}", addr), "test".to_string())
        .with_max_retries(2)
        .with_retry_base_delay_ms(20);
    let rest = RestClientBuilder::new(config)
        .with_credential(Arc::new(Credential::hmac(API_KEY, SECRET)))
        .build()
        .unwrap();

    let request = RestRequest::new(Method::GET, "/api/v3/account", SecurityType::Signed);
    assert_eq!(rest.send_with_retry(&request).await.unwrap(), "{}");

    let lines = request_lines.lock().unwrap().clone();
    assert_eq!(lines.len(), 2);
    assert_ne!(lines[0], lines[1], "retry must carry a fresh timestamp and signature");
}

#[tokio::test]
async fn test_plain_send_does_not_retry() {
    let (addr, request_lines) = start_flaky_server().await;
    let rest = rest_client(addr, Some(Credential::hmac(API_KEY, SECRET)));

    let result = rest
        .get("/api/v3/account", ParameterSet::new(), SecurityType::Signed)
        .await;
    assert!(matches!(result, Err(ExchangeError::NetworkError(_))));
    assert_eq!(request_lines.lock().unwrap().len(), 1);
}
