//! Integration tests using wiremock to simulate HTTP servers.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether::codec::{DefaultErrorDecoder, RetryOnStatus};
use tether::contract::jaxrs;
use tether::contract::{Headers, Param, RequestLine};
use tether::interceptor::BasicAuthRequestInterceptor;
use tether::retry::{Backoff, NeverRetry, PropagationPolicy};
use tether::transport::BlockingReqwestTransport;
use tether::{Client, Error, InterfaceDef, MethodDef, Options, ParamDef, ReturnShape};
use wiremock::matchers::{body_json, body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct TestData {
    id: u32,
    name: String,
}

fn test_data() -> TestData {
    TestData {
        id: 1,
        name: "Test".to_string(),
    }
}

/// `get()` and `create(data)` against `/test`.
fn test_api() -> InterfaceDef {
    InterfaceDef::new("TestApi")
        .method(
            MethodDef::new("get")
                .with(RequestLine::new("GET /test"))
                .returns(ReturnShape::Value),
        )
        .method(
            MethodDef::new("create")
                .with(RequestLine::new("POST /test"))
                .param(ParamDef::new("data"))
                .returns(ReturnShape::Value),
        )
}

fn fast_retries(max_attempts: u32) -> Backoff {
    Backoff::fixed(Duration::from_millis(10), max_attempts)
}

#[tokio::test]
async fn test_successful_get_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(test_data()))
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .build_async(&test_api(), &mock_server.uri())
        .unwrap();

    let data: TestData = client.call("get", &[]).await.unwrap();
    assert_eq!(data, test_data());
}

#[tokio::test]
async fn test_successful_post_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/test"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"id": 0, "name": "New"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(test_data()))
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .build_async(&test_api(), &mock_server.uri())
        .unwrap();

    let data: TestData = client
        .call("create", &[json!({"id": 0, "name": "New"})])
        .await
        .unwrap();
    assert_eq!(data.id, 1);
}

#[tokio::test]
async fn test_http_error_4xx() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(
            ResponseTemplate::new(404)
                .insert_header("x-request-id", "req-1")
                .set_body_string("Not found"),
        )
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .build_async(&test_api(), &mock_server.uri())
        .unwrap();

    let result = client.invoke("get", &[]).await;

    match result {
        Err(Error::Status {
            status,
            config_key,
            headers,
            raw_response,
            ..
        }) => {
            assert_eq!(status.as_u16(), 404);
            assert_eq!(config_key, "TestApi#get()");
            assert_eq!(headers.get("x-request-id").unwrap(), "req-1");
            assert_eq!(raw_response, "Not found");
        }
        other => panic!("Expected Status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_decode_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not valid json"))
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .build_async(&test_api(), &mock_server.uri())
        .unwrap();

    let result = client.invoke("get", &[]).await;

    match result {
        Err(Error::Decode {
            raw_response,
            status,
            ..
        }) => {
            assert_eq!(raw_response, "not valid json");
            assert_eq!(status.as_u16(), 200);
        }
        other => panic!("Expected Decode error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_retry_on_503() {
    let mock_server = MockServer::start().await;
    let attempt_count = Arc::new(AtomicUsize::new(0));
    let attempt_count_clone = attempt_count.clone();

    // First two requests fail with 503, third succeeds
    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(move |_req: &wiremock::Request| {
            let count = attempt_count_clone.fetch_add(1, Ordering::SeqCst);
            if count < 2 {
                ResponseTemplate::new(503).set_body_string("Server busy")
            } else {
                ResponseTemplate::new(200).set_body_json(test_data())
            }
        })
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .retryer(fast_retries(3))
        .error_decoder(RetryOnStatus::new(
            DefaultErrorDecoder,
            [StatusCode::SERVICE_UNAVAILABLE],
        ))
        .build_async(&test_api(), &mock_server.uri())
        .unwrap();

    let data: TestData = client.call("get", &[]).await.unwrap();

    assert_eq!(data.id, 1);
    assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_max_attempts_exceeded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Server busy"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .retryer(fast_retries(3))
        .error_decoder(RetryOnStatus::new(
            DefaultErrorDecoder,
            [StatusCode::SERVICE_UNAVAILABLE],
        ))
        .build_async(&test_api(), &mock_server.uri())
        .unwrap();

    let result = client.invoke("get", &[]).await;

    match result {
        Err(e @ Error::Retryable { .. }) => {
            assert_eq!(e.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
            assert_eq!(e.raw_response(), Some("Server busy"));
        }
        other => panic!("Expected Retryable error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unwrap_propagation_surfaces_status_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Server busy"))
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .retryer(fast_retries(2))
        .error_decoder(RetryOnStatus::new(
            DefaultErrorDecoder,
            [StatusCode::SERVICE_UNAVAILABLE],
        ))
        .propagation_policy(PropagationPolicy::Unwrap)
        .build_async(&test_api(), &mock_server.uri())
        .unwrap();

    let result = client.invoke("get", &[]).await;
    assert!(
        matches!(result, Err(Error::Status { .. })),
        "Expected Status error, got {:?}",
        result
    );
}

#[tokio::test]
async fn test_server_error_not_retried_by_default() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Server error"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .retryer(fast_retries(5))
        .build_async(&test_api(), &mock_server.uri())
        .unwrap();

    let err = client.invoke("get", &[]).await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
}

#[tokio::test]
async fn test_rate_limit_with_retry_after_seconds() {
    let mock_server = MockServer::start().await;
    let attempt_count = Arc::new(AtomicUsize::new(0));
    let attempt_count_clone = attempt_count.clone();

    // First request returns 429 with Retry-After, second succeeds
    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(move |_req: &wiremock::Request| {
            let count = attempt_count_clone.fetch_add(1, Ordering::SeqCst);
            if count == 0 {
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "1")
                    .set_body_string("Rate limited")
            } else {
                ResponseTemplate::new(200).set_body_json(test_data())
            }
        })
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .retryer(Backoff::new(
            Duration::from_millis(10),
            Duration::from_secs(5),
            3,
        ))
        .build_async(&test_api(), &mock_server.uri())
        .unwrap();

    let start = std::time::Instant::now();
    let data: TestData = client.call("get", &[]).await.unwrap();

    assert_eq!(data.id, 1);
    assert_eq!(attempt_count.load(Ordering::SeqCst), 2);
    // Should have waited about a second for the rate limit, not the 10ms backoff
    assert!(start.elapsed() >= Duration::from_millis(900));
}

#[tokio::test]
async fn test_path_query_and_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/42"))
        .and(query_param("active", "true"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42})))
        .mount(&mock_server)
        .await;

    let api = InterfaceDef::new("Users").with(Headers::new(["Accept: application/json"])).method(
        MethodDef::new("user")
            .with(RequestLine::new("GET /users/{id}?active={flag}"))
            .param(ParamDef::new("id").with(Param::new("id")))
            .param(ParamDef::new("flag").with(Param::new("flag")))
            .returns(ReturnShape::Map),
    );

    let client = Client::builder().build_async(&api, &mock_server.uri()).unwrap();

    let user = client
        .invoke("user", &[json!(42), json!(true)])
        .await
        .unwrap()
        .into_value()
        .unwrap();
    assert_eq!(user, json!({"id": 42}));
}

#[tokio::test]
async fn test_basic_auth_interceptor() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .and(header("authorization", "Basic dXNlcjpzZWNyZXQ="))
        .respond_with(ResponseTemplate::new(200).set_body_json(test_data()))
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .request_interceptor(BasicAuthRequestInterceptor::new("user", "secret"))
        .build_async(&test_api(), &mock_server.uri())
        .unwrap();

    let data: TestData = client.call("get", &[]).await.unwrap();
    assert_eq!(data, test_data());
}

#[tokio::test]
async fn test_dismiss_404_returns_empty_list() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such list"))
        .mount(&mock_server)
        .await;

    let api = InterfaceDef::new("Items").method(
        MethodDef::new("items")
            .with(RequestLine::new("GET /items"))
            .returns(ReturnShape::List),
    );

    let client = Client::builder()
        .dismiss_404()
        .build_async(&api, &mock_server.uri())
        .unwrap();

    let items: Vec<TestData> = client.call("items", &[]).await.unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_form_parameters() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login"))
        .and(header(
            "content-type",
            "application/x-www-form-urlencoded; charset=UTF-8",
        ))
        .and(body_string("password=s%26cret&user=ferris"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let api = InterfaceDef::new("Auth").method(
        MethodDef::new("login")
            .with(RequestLine::new("POST /login"))
            .param(ParamDef::new("user").with(Param::new("user")))
            .param(ParamDef::new("password").with(Param::new("password"))),
    );

    let client = Client::builder().build_async(&api, &mock_server.uri()).unwrap();

    let outcome = client
        .invoke("login", &[json!("ferris"), json!("s&cret")])
        .await
        .unwrap();
    assert!(matches!(outcome, tether::Outcome::Unit));
}

#[tokio::test]
async fn test_jaxrs_contract() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/repos/rust-lang/issues"))
        .and(query_param("state", "open"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"number": 1}])))
        .mount(&mock_server)
        .await;

    let api = InterfaceDef::new("Issues")
        .with(jaxrs::Path::new("/api/"))
        .with(jaxrs::Produces::new(["application/json"]))
        .method(
            MethodDef::new("issues")
                .with(jaxrs::GET)
                .with(jaxrs::Path::new("repos/{owner: [a-z-]+}/issues"))
                .param(ParamDef::new("owner").with(jaxrs::PathParam::new("owner")))
                .param(
                    ParamDef::new("state")
                        .with(jaxrs::QueryParam::new("state"))
                        .with(jaxrs::DefaultValue::new("open")),
                )
                .returns(ReturnShape::List),
        );

    let client = Client::builder()
        .contract(jaxrs::contract())
        .build_async(&api, &mock_server.uri())
        .unwrap();

    let issues = client
        .invoke("issues", &[json!("rust-lang"), serde_json::Value::Null])
        .await
        .unwrap()
        .into_value()
        .unwrap();
    assert_eq!(issues, json!([{"number": 1}]));
}

#[tokio::test]
async fn test_connection_refused_is_io_error() {
    let client = Client::builder()
        .retryer(NeverRetry)
        .build_async(&test_api(), "http://127.0.0.1:1")
        .unwrap();

    let err = client.invoke("get", &[]).await.unwrap_err();
    assert!(matches!(err, Error::Io { .. }), "Expected Io error, got {:?}", err);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_read_timeout_per_call() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(test_data())
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .retryer(NeverRetry)
        .build_async(&test_api(), &mock_server.uri())
        .unwrap();

    let options = Options::default().read_timeout(Duration::from_millis(50));
    let err = client
        .invoke_with_options("get", &[], options)
        .await
        .unwrap_err();

    match err {
        Error::Io { source, .. } => assert_eq!(source.kind(), io::ErrorKind::TimedOut),
        other => panic!("Expected Io error, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_blocking_client_streams_lines() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(200).set_body_string("first\nsecond\nthird\n"))
        .mount(&mock_server)
        .await;

    let api = InterfaceDef::new("Events").method(
        MethodDef::new("events")
            .with(RequestLine::new("GET /events"))
            .returns(ReturnShape::Stream),
    );
    let url = mock_server.uri();

    let lines = tokio::task::spawn_blocking(move || {
        let client = Client::builder()
            .transport(BlockingReqwestTransport::new())
            .build(&api, &url)
            .unwrap();
        client
            .invoke("events", &[])
            .unwrap()
            .into_stream()
            .unwrap()
            .collect::<io::Result<Vec<String>>>()
            .unwrap()
    })
    .await
    .unwrap();

    assert_eq!(lines, ["first", "second", "third"]);
}
