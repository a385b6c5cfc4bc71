//! End-to-end: spawn the real `toolwire-github` binary and drive it through
//! the client session against a mocked GitHub API.

use std::collections::HashMap;

use serde_json::{json, Map, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use toolwire_client::{Invocation, Session};
use toolwire_core::config::ServerConfig;

fn backend_config(api_base: &str) -> ServerConfig {
    let mut env = HashMap::new();
    env.insert("TOOLWIRE_GITHUB__API_BASE".to_string(), api_base.to_string());
    env.insert("TOOLWIRE_GITHUB__TOKEN".to_string(), String::new());
    env.insert("RUST_LOG".to_string(), "warn".to_string());

    ServerConfig {
        name: "github".to_string(),
        command: env!("CARGO_BIN_EXE_toolwire-github").to_string(),
        // A config path that does not exist keeps the user's file out of the test.
        args: vec!["/nonexistent/toolwire/config.json".to_string()],
        env,
        request_timeout_secs: 10,
        ..Default::default()
    }
}

fn args(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn repo(name: &str, stars: u64) -> Value {
    json!({
        "name": name,
        "full_name": format!("octocat/{name}"),
        "description": "A test repository",
        "stargazers_count": stars,
        "forks_count": 3,
        "language": "Rust",
        "updated_at": "2024-06-01T12:00:00Z",
        "html_url": format!("https://github.com/octocat/{name}"),
        "private": false
    })
}

#[tokio::test]
async fn test_handshake_and_discovery() {
    let github = MockServer::start().await;
    let session = Session::connect(&backend_config(&github.uri()))
        .await
        .unwrap();

    assert_eq!(session.server_info().name, "toolwire-github");
    assert_eq!(
        session.capabilities().names(),
        vec![
            "get_repository_stars",
            "get_user_repositories",
            "get_user_stars_summary"
        ]
    );
    let stars = session.capabilities().get("get_repository_stars").unwrap();
    assert_eq!(stars.required_parameters(), vec!["owner", "repositoryName"]);

    session.shutdown().await;
    assert!(session.transport().is_closed());
}

#[tokio::test]
async fn test_repository_stars_round_trip() {
    let github = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/octocat/hello"))
        .respond_with(ResponseTemplate::new(200).set_body_json(repo("hello", 12_345)))
        .mount(&github)
        .await;

    let session = Session::connect(&backend_config(&github.uri()))
        .await
        .unwrap();
    let result = session
        .bridge()
        .invoke(
            "get_repository_stars",
            args(json!({ "owner": "octocat", "repositoryName": "hello" })),
        )
        .await
        .unwrap();

    assert!(!result.is_error);
    let text = result.to_text();
    assert!(text.contains("Repository: octocat/hello"));
    assert!(text.contains("Stars: 12,345"));
    assert!(text.contains("Last Updated: 2024-06-01"));

    session.shutdown().await;
}

#[tokio::test]
async fn test_missing_repository_and_concurrent_calls() {
    let github = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/octocat/repos"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([repo("a", 5), repo("b", 7)])),
        )
        .mount(&github)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octocat/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&github)
        .await;

    let session = Session::connect(&backend_config(&github.uri()))
        .await
        .unwrap();
    let results = session
        .bridge()
        .invoke_all(&[
            Invocation::new(
                "get_repository_stars",
                args(json!({ "owner": "octocat", "repositoryName": "missing" })),
            ),
            Invocation::new("get_user_stars_summary", args(json!({ "username": "octocat" }))),
        ])
        .await;

    let missing = results[0].as_ref().unwrap();
    assert_eq!(
        missing.to_text(),
        "Repository octocat/missing not found or is not accessible."
    );

    let summary = results[1].as_ref().unwrap().to_text();
    assert!(summary.contains("Total Public Repositories: 2"));
    assert!(summary.contains("Total Stars: 12"));
    assert!(summary.contains("Rust: 12 stars (2 repos)"));

    session.shutdown().await;
}

#[tokio::test]
async fn test_invalid_arguments_never_reach_backend() {
    let github = MockServer::start().await;
    let session = Session::connect(&backend_config(&github.uri()))
        .await
        .unwrap();

    let result = session
        .bridge()
        .invoke("get_user_repositories", args(json!({ "username": 7 })))
        .await
        .unwrap();
    assert!(result.is_error);
    assert!(github.received_requests().await.unwrap().is_empty());

    session.shutdown().await;
}
