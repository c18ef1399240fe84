//! Calling the GitHub REST API through a declarative interface.
//!
//! This example shows how to:
//! - Describe an API once with the default contract
//! - Call it through a blocking client and an async client
//! - Add an interceptor and retries for rate limits
//! - Handle errors and fall back to a cached answer
//!
//! Run with: `cargo run --example github`

use http::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tether::codec::{DefaultErrorDecoder, RetryOnStatus};
use tether::contract::{Headers, Param, RequestLine};
use tether::logger::LogLevel;
use tether::retry::Backoff;
use tether::template::RequestTemplate;
use tether::{Client, Error, InterfaceDef, MethodDef, Outcome, ParamDef, ReturnShape};

#[derive(Debug, Deserialize)]
struct Contributor {
    login: String,
    contributions: u32,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Issue {
    number: u64,
    title: String,
}

fn github() -> InterfaceDef {
    InterfaceDef::new("GitHub")
        .with(Headers::new([
            "Accept: application/vnd.github+json",
            "User-Agent: tether-demo",
        ]))
        .method(
            MethodDef::new("contributors")
                .with(RequestLine::new("GET /repos/{owner}/{repo}/contributors"))
                .param(ParamDef::new("owner").with(Param::new("owner")))
                .param(ParamDef::new("repo").with(Param::new("repo")))
                .returns(ReturnShape::List),
        )
        .method(
            MethodDef::new("issues")
                .with(RequestLine::new(
                    "GET /repos/{owner}/{repo}/issues?state={state}&per_page={per_page}",
                ))
                .param(ParamDef::new("owner").with(Param::new("owner")))
                .param(ParamDef::new("repo").with(Param::new("repo")))
                .param(ParamDef::new("state").with(Param::new("state")))
                .param(ParamDef::new("per_page").with(Param::new("per_page")))
                .returns(ReturnShape::List),
        )
}

fn blocking_call() -> Result<(), Error> {
    let client = Client::builder()
        .log_level(LogLevel::Headers)
        .build(&github(), "https://api.github.com")?;

    let contributors: Vec<Contributor> =
        client.call("contributors", &[json!("rust-lang"), json!("rust")])?;
    for contributor in contributors.iter().take(5) {
        println!("{} ({} contributions)", contributor.login, contributor.contributions);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter("tether=debug,github=info")
        .init();

    println!("=== Blocking Client ===");
    // The blocking transport must not run on the async runtime's threads
    tokio::task::spawn_blocking(blocking_call)
        .await
        .map_err(|e| Error::Configuration(e.to_string()))??;
    println!();

    println!("=== Async Client With Retries ===");
    let token = std::env::var("GITHUB_TOKEN").ok();
    let client = Client::builder()
        .request_interceptor(move |template: &mut RequestTemplate| {
            if let Some(token) = &token {
                template.set_header("Authorization", [format!("Bearer {}", token)]);
            }
        })
        // GitHub answers 403 when the anonymous rate limit is exhausted
        .error_decoder(RetryOnStatus::new(
            DefaultErrorDecoder,
            [StatusCode::FORBIDDEN, StatusCode::SERVICE_UNAVAILABLE],
        ))
        .retryer(
            Backoff::new(Duration::from_millis(250), Duration::from_secs(5), 3)
                .jitter(true)
                .deadline(Duration::from_secs(20)),
        )
        .fallback(|method: &str, _args: &[Value], cause: Error| -> tether::Result<Outcome> {
            eprintln!("{} failed ({}), using an empty list", method, cause);
            Ok(Outcome::Value(json!([])))
        })
        .build_async(&github(), "https://api.github.com")?;

    let issues: Vec<Issue> = client
        .call(
            "issues",
            &[json!("rust-lang"), json!("rust"), json!("open"), json!(5)],
        )
        .await?;
    for issue in &issues {
        println!("#{} {}", issue.number, issue.title);
    }
    println!();

    println!("=== Error Handling ===");
    let client = Client::builder().build_async(&github(), "https://api.github.com")?;
    match client
        .invoke("contributors", &[json!("rust-lang"), json!("no-such-repo-here")])
        .await
    {
        Ok(outcome) => println!("Unexpected success: {:?}", outcome),
        Err(Error::Status {
            status,
            config_key,
            raw_response,
            ..
        }) => {
            println!("{} returned {}", config_key, status);
            println!("Body: {}", raw_response);
        }
        Err(e) => println!("Other error: {}", e),
    }

    Ok(())
}
