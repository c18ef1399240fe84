//! Dispatch tests against the in-memory transport: retries, interceptors, body lifecycle,
//! fallbacks and cancellation.

use http::{Method, StatusCode};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tether::codec::{DefaultErrorDecoder, RetryOnStatus};
use tether::contract::jaxrs;
use tether::contract::{Body, Headers, Param, RequestLine};
use tether::fallback::Fallback;
use tether::logger::LogLevel;
use tether::mock::{MockClient, MockResponse};
use tether::retry::{Backoff, NeverRetry};
use tether::template::RequestTemplate;
use tether::{AsyncClient, Client, Error, InterfaceDef, MethodDef, Outcome, ParamDef, ReturnShape};

const URL: &str = "http://localhost";

fn ping_api(shape: ReturnShape) -> InterfaceDef {
    InterfaceDef::new("Ping").method(
        MethodDef::new("ping")
            .with(RequestLine::new("GET /ping"))
            .returns(shape),
    )
}

fn client(mock: &MockClient, retryer: Backoff) -> Client {
    Client::builder()
        .transport(mock.clone())
        .retryer(retryer)
        .build(&ping_api(ReturnShape::Value), URL)
        .unwrap()
}

fn async_client(mock: &MockClient, retryer: Backoff) -> AsyncClient {
    Client::builder()
        .async_transport(mock.clone())
        .retryer(retryer)
        .build_async(&ping_api(ReturnShape::Value), URL)
        .unwrap()
}

#[test]
fn test_attempts_are_bounded() {
    let mock = MockClient::new().fail(Method::GET, "/ping", io::ErrorKind::ConnectionReset);
    let client = client(&mock, Backoff::fixed(Duration::from_millis(1), 4));

    let result = client.invoke("ping", &[]);

    match result {
        Err(Error::Io { source, method, .. }) => {
            assert_eq!(source.kind(), io::ErrorKind::ConnectionReset);
            assert_eq!(method, Method::GET);
        }
        other => panic!("Expected Io error, got {:?}", other),
    }
    mock.verify_times(&Method::GET, "/ping", 4);
}

#[test]
fn test_each_call_gets_its_own_attempts() {
    let mock = MockClient::new().fail(Method::GET, "/ping", io::ErrorKind::ConnectionReset);
    let client = client(&mock, Backoff::fixed(Duration::from_millis(1), 4));

    let results: Vec<tether::Result<Outcome>> = std::thread::scope(|scope| {
        let calls: Vec<_> = (0..3)
            .map(|_| scope.spawn(|| client.invoke("ping", &[])))
            .collect();
        calls.into_iter().map(|call| call.join().unwrap()).collect()
    });

    for result in results {
        assert!(
            matches!(result, Err(Error::Io { .. })),
            "Expected Io error, got {:?}",
            result
        );
    }
    assert_eq!(mock.request_count(), 12);

    // A later call on the same client starts over as well
    let err = client.invoke("ping", &[]).unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
    assert_eq!(mock.request_count(), 16);
}

#[test]
fn test_backoff_waits_between_attempts() {
    let mock = MockClient::new().fail(Method::GET, "/ping", io::ErrorKind::TimedOut);
    let client = client(&mock, Backoff::fixed(Duration::from_millis(100), 3));

    let start = Instant::now();
    let err = client.invoke("ping", &[]).unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(mock.request_count(), 3);
    // Two waits of 100ms between three attempts
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[test]
fn test_non_retryable_failure_is_not_retried() {
    let mock = MockClient::new().add(
        Method::GET,
        "/ping",
        MockResponse::new(StatusCode::BAD_REQUEST).body("bad"),
    );
    let client = client(&mock, Backoff::fixed(Duration::from_millis(1), 5));

    let err = client.invoke("ping", &[]).unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    assert_eq!(mock.request_count(), 1);
}

#[test]
fn test_retry_after_in_the_past_retries_immediately() {
    let past = httpdate::fmt_http_date(SystemTime::now() - Duration::from_secs(3600));
    let mock = MockClient::new()
        .add(
            Method::GET,
            "/ping",
            MockResponse::new(StatusCode::TOO_MANY_REQUESTS).header("Retry-After", &past),
        )
        .ok(Method::GET, "/ping", r#"{"pong": true}"#);
    // The computed backoff would be ten seconds; the past date overrides it
    let client = client(
        &mock,
        Backoff::new(Duration::from_secs(10), Duration::from_secs(10), 2),
    );

    let start = Instant::now();
    let outcome = client.invoke("ping", &[]).unwrap();

    assert_eq!(outcome.into_value().unwrap(), json!({"pong": true}));
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(mock.request_count(), 2);
}

#[test]
fn test_interceptors_run_for_every_attempt() {
    let mock = MockClient::new()
        .fail(Method::GET, "/ping", io::ErrorKind::ConnectionReset)
        .fail(Method::GET, "/ping", io::ErrorKind::ConnectionReset)
        .ok(Method::GET, "/ping", "{}");
    let counter = Arc::new(AtomicUsize::new(0));
    let stamp = counter.clone();

    let client = Client::builder()
        .transport(mock.clone())
        .retryer(Backoff::fixed(Duration::from_millis(1), 3))
        .request_interceptor(move |template: &mut RequestTemplate| {
            let n = stamp.fetch_add(1, Ordering::SeqCst);
            template.header("X-Attempt", [n.to_string()]);
        })
        .build(&ping_api(ReturnShape::Value), URL)
        .unwrap();

    client.invoke("ping", &[]).unwrap();

    let stamps: Vec<String> = mock
        .requests()
        .iter()
        .map(|request| request.header("x-attempt").unwrap().to_string())
        .collect();
    // Each attempt starts from the method's template, so headers never accumulate
    assert_eq!(stamps, ["0", "1", "2"]);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    let distinct: HashSet<&String> = stamps.iter().collect();
    assert_eq!(distinct.len(), 3);
}

#[test]
fn test_null_query_is_dropped() {
    let mock = MockClient::new()
        .ok(Method::GET, "/users/42?active=true", r#"{"id": 42, "active": true}"#)
        .ok(Method::GET, "/users/42", r#"{"id": 42}"#);
    let api = InterfaceDef::new("Users").method(
        MethodDef::new("user")
            .with(RequestLine::new("GET /users/{id}?active={flag}"))
            .with(Headers::new(["Accept: application/json"]))
            .param(ParamDef::new("id").with(Param::new("id")))
            .param(ParamDef::new("flag").with(Param::new("flag")))
            .returns(ReturnShape::Map),
    );
    let client = Client::builder()
        .transport(mock.clone())
        .build(&api, URL)
        .unwrap();

    let active = client
        .invoke("user", &[json!(42), json!(true)])
        .unwrap()
        .into_value()
        .unwrap();
    let any = client
        .invoke("user", &[json!(42), Value::Null])
        .unwrap()
        .into_value()
        .unwrap();

    assert_eq!(active["active"], json!(true));
    assert_eq!(any, json!({"id": 42}));
    mock.verify_times(&Method::GET, "/users/42?active=true", 1);
    mock.verify_times(&Method::GET, "/users/42", 1);
    let request = &mock.requests()[0];
    assert_eq!(request.header("accept"), Some("application/json"));
}

#[test]
fn test_variable_names_with_symbols() {
    let mock = MockClient::new();
    let default_api = InterfaceDef::new("Items").method(
        MethodDef::new("top")
            .with(RequestLine::new("GET /items?$top={$top}"))
            .param(ParamDef::new("top").with(Param::new("$top")))
            .returns(ReturnShape::Response),
    );
    let jaxrs_api = InterfaceDef::new("Items").method(
        MethodDef::new("filtered")
            .with(jaxrs::GET)
            .with(jaxrs::Path::new("/items"))
            .param(ParamDef::new("status").with(jaxrs::QueryParam::new("filter[status]")))
            .returns(ReturnShape::Response),
    );

    let default_client = Client::builder()
        .transport(mock.clone())
        .build(&default_api, URL)
        .unwrap();
    let jaxrs_client = Client::builder()
        .contract(jaxrs::contract())
        .transport(mock.clone())
        .build(&jaxrs_api, URL)
        .unwrap();

    default_client.invoke("top", &[json!(5)]).unwrap();
    jaxrs_client.invoke("filtered", &[json!("open")]).unwrap();

    let queries: Vec<Vec<(String, String)>> = mock
        .requests()
        .iter()
        .map(|request| request.url().query_pairs().into_owned().collect())
        .collect();
    assert_eq!(queries[0], [("$top".to_string(), "5".to_string())]);
    assert_eq!(
        queries[1],
        [("filter[status]".to_string(), "open".to_string())]
    );
    // Bound to the query, not turned into a form body
    assert!(mock.requests()[0].body().is_none());
}

#[test]
fn test_body_template_is_expanded() {
    let mock = MockClient::new().add(Method::POST, "/login", MockResponse::new(StatusCode::OK));
    let api = InterfaceDef::new("Auth").method(
        MethodDef::new("login")
            .with(RequestLine::new("POST /login"))
            .with(Headers::new(["Content-Type: application/json"]))
            .with(Body::new(r#"%7B"user": "{user}", "password": "{password}"%7D"#))
            .param(ParamDef::new("user").with(Param::new("user")))
            .param(ParamDef::new("password").with(Param::new("password"))),
    );
    let client = Client::builder()
        .transport(mock.clone())
        .build(&api, URL)
        .unwrap();

    client
        .invoke("login", &[json!("ferris"), json!("crab")])
        .unwrap();

    let request = &mock.requests()[0];
    assert_eq!(
        request.body().unwrap(),
        br#"{"user": "ferris", "password": "crab"}"#
    );
}

#[test]
fn test_404_handling_toggle() {
    let api = InterfaceDef::new("Items").method(
        MethodDef::new("item")
            .with(RequestLine::new("GET /items/{id}"))
            .param(ParamDef::new("id").with(Param::new("id")))
            .returns(ReturnShape::Value),
    );
    let mock = MockClient::new();

    let strict = Client::builder()
        .transport(mock.clone())
        .build(&api, URL)
        .unwrap();
    let lenient = Client::builder()
        .transport(mock.clone())
        .dismiss_404()
        .build(&api, URL)
        .unwrap();

    let err = strict.invoke("item", &[json!(7)]).unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));

    let outcome = lenient.invoke("item", &[json!(7)]).unwrap();
    assert_eq!(outcome.into_value().unwrap(), Value::Null);
}

mod body_lifecycle {
    use super::*;

    #[test]
    fn test_closed_once_on_success() {
        let mock = MockClient::new().ok(Method::GET, "/ping", "{}");
        client(&mock, Backoff::default()).invoke("ping", &[]).unwrap();
        assert_eq!(mock.body_closes(), 1);
    }

    #[test]
    fn test_closed_once_on_decode_error() {
        let mock = MockClient::new().ok(Method::GET, "/ping", "not json");
        let err = client(&mock, Backoff::default())
            .invoke("ping", &[])
            .unwrap_err();
        assert!(matches!(err, Error::Decode { .. }), "Expected Decode error, got {:?}", err);
        assert_eq!(mock.body_closes(), 1);
    }

    #[test]
    fn test_closed_once_on_error_status() {
        let mock = MockClient::new().add(
            Method::GET,
            "/ping",
            MockResponse::new(StatusCode::INTERNAL_SERVER_ERROR).body("boom"),
        );
        let err = client(&mock, Backoff::default())
            .invoke("ping", &[])
            .unwrap_err();
        assert_eq!(err.raw_response(), Some("boom"));
        assert_eq!(mock.body_closes(), 1);
    }

    #[test]
    fn test_each_attempt_closes_its_body() {
        let mock = MockClient::new()
            .add(
                Method::GET,
                "/ping",
                MockResponse::new(StatusCode::SERVICE_UNAVAILABLE).body("busy"),
            )
            .ok(Method::GET, "/ping", "{}");
        let client = Client::builder()
            .transport(mock.clone())
            .retryer(Backoff::fixed(Duration::from_millis(1), 3))
            .error_decoder(RetryOnStatus::new(
                DefaultErrorDecoder,
                [StatusCode::SERVICE_UNAVAILABLE],
            ))
            .build(&ping_api(ReturnShape::Value), URL)
            .unwrap();

        client.invoke("ping", &[]).unwrap();

        assert_eq!(mock.request_count(), 2);
        assert_eq!(mock.body_closes(), 2);
    }

    #[test]
    fn test_transport_failure_then_success() {
        let mock = MockClient::new()
            .fail(Method::GET, "/ping", io::ErrorKind::ConnectionReset)
            .ok(Method::GET, "/ping", "{}");
        client(&mock, Backoff::fixed(Duration::from_millis(1), 2))
            .invoke("ping", &[])
            .unwrap();
        assert_eq!(mock.body_closes(), 1);
    }

    #[test]
    fn test_full_logging_closes_once() {
        let mock = MockClient::new().ok(Method::GET, "/ping", r#"{"pong": true}"#);
        let client = Client::builder()
            .transport(mock.clone())
            .log_level(LogLevel::Full)
            .build(&ping_api(ReturnShape::Value), URL)
            .unwrap();

        let outcome = client.invoke("ping", &[]).unwrap();

        assert_eq!(outcome.into_value().unwrap(), json!({"pong": true}));
        assert_eq!(mock.body_closes(), 1);
    }

    #[test]
    fn test_stream_closes_when_consumed() {
        let mock = MockClient::new().ok(Method::GET, "/ping", "a\nb\n");
        let client = Client::builder()
            .transport(mock.clone())
            .build(&ping_api(ReturnShape::Stream), URL)
            .unwrap();

        let mut lines = client.invoke("ping", &[]).unwrap().into_stream().unwrap();
        assert_eq!(mock.body_closes(), 0);

        assert_eq!(lines.next().unwrap().unwrap(), "a");
        assert_eq!(lines.next().unwrap().unwrap(), "b");
        assert!(lines.next().is_none());
        assert_eq!(mock.body_closes(), 1);

        drop(lines);
        assert_eq!(mock.body_closes(), 1);
    }

    #[test]
    fn test_raw_response_belongs_to_caller() {
        let mock = MockClient::new().add(
            Method::GET,
            "/ping",
            MockResponse::new(StatusCode::BAD_GATEWAY).body("upstream down"),
        );
        let client = Client::builder()
            .transport(mock.clone())
            .build(&ping_api(ReturnShape::Response), URL)
            .unwrap();

        let mut response = client.invoke("ping", &[]).unwrap().into_response().unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.text().unwrap(), "upstream down");
        drop(response);
        assert_eq!(mock.body_closes(), 1);
    }
}

#[test]
fn test_fallback_replaces_failure() {
    let mock = MockClient::new().fail(Method::GET, "/ping", io::ErrorKind::ConnectionRefused);
    let client = Client::builder()
        .transport(mock.clone())
        .retryer(NeverRetry)
        .fallback(|method: &str, _args: &[Value], cause: Error| -> tether::Result<Outcome> {
            assert!(matches!(cause, Error::Io { .. }));
            Ok(Outcome::Value(json!({"fallback": method})))
        })
        .build(&ping_api(ReturnShape::Value), URL)
        .unwrap();

    let outcome = client.invoke("ping", &[]).unwrap();

    assert_eq!(outcome.into_value().unwrap(), json!({"fallback": "ping"}));
    assert_eq!(mock.request_count(), 1);
}

#[test]
fn test_fallback_factory_chooses_by_cause() {
    let mock = MockClient::new().add(
        Method::GET,
        "/ping",
        MockResponse::new(StatusCode::FORBIDDEN).body("nope"),
    );
    let client = Client::builder()
        .transport(mock.clone())
        .fallback_factory(|cause: &Error| -> Arc<dyn Fallback> {
            let status = cause.status().map(|s| s.as_u16());
            Arc::new(
                move |_: &str, _: &[Value], _: Error| -> tether::Result<Outcome> {
                    Ok(Outcome::Value(json!(status)))
                },
            )
        })
        .build(&ping_api(ReturnShape::Value), URL)
        .unwrap();

    let outcome = client.invoke("ping", &[]).unwrap();
    assert_eq!(outcome.into_value().unwrap(), json!(403));
}

#[test]
fn test_invalid_contracts_fail_at_build_time() {
    let mock = MockClient::new();

    let two_verbs = InterfaceDef::new("Api").method(
        MethodDef::new("get")
            .with(RequestLine::new("GET /a"))
            .with(RequestLine::new("POST /a")),
    );
    let unbound = InterfaceDef::new("Api").method(
        MethodDef::new("get").with(RequestLine::new("GET /users/{id}")),
    );
    let two_bodies = InterfaceDef::new("Api").method(
        MethodDef::new("post")
            .with(RequestLine::new("POST /a"))
            .param(ParamDef::new("first"))
            .param(ParamDef::new("second")),
    );

    for api in [two_verbs, unbound, two_bodies] {
        let result = Client::builder().transport(mock.clone()).build(&api, URL);
        match result {
            Err(Error::Contract(_)) => {}
            Err(other) => panic!("Expected Contract error, got {:?}", other),
            Ok(_) => panic!("Expected Contract error for {}", api.name()),
        }
    }
    mock.verify_zero_interactions();
}

#[tokio::test]
async fn test_async_retries() {
    let mock = MockClient::new()
        .fail(Method::GET, "/ping", io::ErrorKind::TimedOut)
        .fail(Method::GET, "/ping", io::ErrorKind::TimedOut)
        .ok(Method::GET, "/ping", r#"{"pong": true}"#);
    let client = async_client(&mock, Backoff::fixed(Duration::from_millis(5), 3));

    let outcome = client.invoke("ping", &[]).await.unwrap();

    assert_eq!(outcome.into_value().unwrap(), json!({"pong": true}));
    assert_eq!(mock.request_count(), 3);
    assert_eq!(mock.body_closes(), 1);
}

#[tokio::test]
async fn test_spawned_call_can_be_cancelled() {
    let mock = MockClient::new().add(
        Method::GET,
        "/ping",
        MockResponse::new(StatusCode::OK)
            .body("{}")
            .delay(Duration::from_secs(5)),
    );
    let client = async_client(&mock, Backoff::default());

    let call = client.spawn("ping", Vec::new());
    tokio::time::sleep(Duration::from_millis(50)).await;
    call.cancel();

    let result = call.await;
    assert!(
        matches!(result, Err(Error::Cancelled)),
        "Expected Cancelled, got {:?}",
        result
    );
    assert_eq!(mock.request_count(), 1);
}

#[tokio::test]
async fn test_dropped_call_stops_retrying() {
    let mock = MockClient::new().fail(Method::GET, "/ping", io::ErrorKind::ConnectionReset);
    let client = async_client(&mock, Backoff::fixed(Duration::from_millis(200), 10));

    let result = tokio::time::timeout(Duration::from_millis(50), client.invoke("ping", &[])).await;
    assert!(result.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(mock.request_count(), 1);
}
