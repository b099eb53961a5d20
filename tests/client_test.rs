/*!
 * Integration tests for the HTTP client and a full deployment against a
 * mock server
 */

use mockito::{Matcher, Server};
use rsconnect::api::{ConnectApi, ConnectClient, ContentRequest};
use rsconnect::core::{CancelToken, ContentKind};
use rsconnect::deploy::{BundleRequest, DeployRequest, Deployer};
use rsconnect::{DeployConfig, RsconnectError, TaskState};
use std::fs;
use tempfile::TempDir;

fn config_for(server: &Server, build_dir: &std::path::Path) -> DeployConfig {
    let mut config = DeployConfig::default();
    config.server = Some(server.url());
    config.api_key = Some("secret-key".to_string());
    config.build_dir = build_dir.to_path_buf();
    config.poll.interval_ms = 0;
    config
}

#[test]
fn test_non_connect_server_is_unreachable() {
    let mut server = Server::new();
    let _settings = server
        .mock("GET", "/__api__/server_settings")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html>not connect</html>")
        .create();

    let temp = TempDir::new().unwrap();
    let client = ConnectClient::new(&config_for(&server, temp.path())).unwrap();
    assert!(matches!(
        client.verify_server(),
        Err(RsconnectError::ServerUnreachable { .. })
    ));
}

#[test]
fn test_bad_key_is_authentication_error() {
    let mut server = Server::new();
    let _settings = server
        .mock("GET", "/__api__/server_settings")
        .with_status(200)
        .with_body(r#"{"version":"2024.05.0"}"#)
        .create();
    let me = server
        .mock("GET", "/__api__/me")
        .match_header("authorization", "Key secret-key")
        .with_status(401)
        .with_body(r#"{"error":"The specified API key is not valid.","code":30}"#)
        .create();

    let temp = TempDir::new().unwrap();
    let client = ConnectClient::new(&config_for(&server, temp.path())).unwrap();
    match client.verify_server() {
        Err(RsconnectError::Authentication(message)) => {
            assert_eq!(message, "The specified API key is not valid.");
        }
        other => panic!("expected an authentication error, got {:?}", other),
    }
    me.assert();
}

#[test]
fn test_verify_server() {
    let mut server = Server::new();
    let _settings = server
        .mock("GET", "/__api__/server_settings")
        .with_status(200)
        .with_body(r#"{"version":"2024.05.0"}"#)
        .create();
    let _me = server
        .mock("GET", "/__api__/me")
        .with_status(200)
        .with_body(r#"{"username":"alice","guid":"u-1"}"#)
        .create();

    let temp = TempDir::new().unwrap();
    let client = ConnectClient::new(&config_for(&server, temp.path())).unwrap();
    let info = client.verify_server().unwrap();
    assert_eq!(info.username, "alice");
    assert_eq!(info.version.as_deref(), Some("2024.05.0"));
}

#[test]
fn test_error_body_is_surfaced_verbatim() {
    let mut server = Server::new();
    let _get = server
        .mock("GET", "/__api__/applications/99")
        .with_status(404)
        .with_body(r#"{"error":"Content 99 could not be found.","code":4}"#)
        .create();

    let temp = TempDir::new().unwrap();
    let client = ConnectClient::new(&config_for(&server, temp.path())).unwrap();
    let request = ContentRequest {
        app_id: Some("99".to_string()),
        name: "report".to_string(),
        title: None,
    };
    match client.create_or_update_content(&request) {
        Err(RsconnectError::Application { message, hint }) => {
            assert_eq!(message, "Content 99 could not be found.");
            assert!(hint.unwrap().contains("--new"));
        }
        other => panic!("expected an application error, got {:?}", other),
    }
}

#[test]
fn test_deploy_conflict() {
    let mut server = Server::new();
    let _deploy = server
        .mock("POST", "/__api__/applications/5/deploy")
        .with_status(409)
        .with_body(r#"{"error":"A deployment is already in progress."}"#)
        .create();

    let temp = TempDir::new().unwrap();
    let client = ConnectClient::new(&config_for(&server, temp.path())).unwrap();
    assert!(matches!(
        client.deploy("5", "b-1", false),
        Err(RsconnectError::DeployInProgress { .. })
    ));
}

#[test]
fn test_task_status_passes_cursor() {
    let mut server = Server::new();
    let task = server
        .mock("GET", "/__api__/v1/tasks/t-1")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("wait".into(), "1".into()),
            Matcher::UrlEncoded("first".into(), "3".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"id":"t-1","output":["line 4"],"finished":false,"code":0,"last":4}"#)
        .create();

    let temp = TempDir::new().unwrap();
    let client = ConnectClient::new(&config_for(&server, temp.path())).unwrap();
    let status = client.task_status("t-1", Some(3), 1).unwrap();
    assert_eq!(status.output, vec!["line 4"]);
    assert_eq!(status.last, Some(4));
    assert_eq!(status.state(), TaskState::Running);
    task.assert();
}

#[test]
fn test_full_deployment() {
    let mut server = Server::new();
    let _settings = server
        .mock("GET", "/__api__/server_settings")
        .with_status(200)
        .with_body(r#"{"version":"2024.05.0"}"#)
        .create();
    let _me = server
        .mock("GET", "/__api__/me")
        .with_status(200)
        .with_body(r#"{"username":"alice"}"#)
        .create();
    let create = server
        .mock("POST", "/__api__/applications")
        .match_body(Matcher::PartialJsonString(r#"{"name":"site"}"#.to_string()))
        .with_status(200)
        .with_body(r#"{"id":42,"guid":"g-42","name":"site","url":"https://connect.example.com/content/g-42/"}"#)
        .create();
    let _title = server
        .mock("POST", "/__api__/applications/42")
        .with_status(200)
        .with_body(r#"{"id":42,"guid":"g-42","name":"site","title":"site","url":"https://connect.example.com/content/g-42/"}"#)
        .create();
    let upload = server
        .mock("POST", "/__api__/applications/42/upload")
        .match_header("content-type", "application/gzip")
        .with_status(200)
        .with_body(r#"{"id":"b-7"}"#)
        .create();
    let deploy = server
        .mock("POST", "/__api__/applications/42/deploy")
        .match_body(Matcher::PartialJsonString(r#"{"bundle":"b-7"}"#.to_string()))
        .with_status(200)
        .with_body(r#"{"id":"t-9"}"#)
        .create();
    let _task = server
        .mock("GET", "/__api__/v1/tasks/t-9")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"id":"t-9","output":["Bundle deployed"],"finished":true,"code":0,"last":1}"#)
        .create();
    let _config = server
        .mock("GET", "/__api__/applications/42/config")
        .with_status(200)
        .with_body(r#"{"config_url":"https://connect.example.com/connect/#/apps/g-42"}"#)
        .create();
    let _content = server
        .mock("GET", "/content/g-42/")
        .with_status(200)
        .with_body("<h1>hi</h1>")
        .create();

    let temp = TempDir::new().unwrap();
    let content = temp.path().join("site");
    fs::create_dir(&content).unwrap();
    fs::write(content.join("index.html"), "<h1>hi</h1>").unwrap();

    let config = config_for(&server, &temp.path().join("build"));
    let client = ConnectClient::new(&config).unwrap();
    let cancel = CancelToken::new();
    let request = DeployRequest::new(BundleRequest::new(&content, ContentKind::Html));

    let result = Deployer::new(&client, &config, &cancel)
        .deploy(&request)
        .unwrap();

    assert_eq!(result.status, TaskState::Success);
    assert_eq!(result.task_id, "t-9");
    assert_eq!(
        result.content_url.as_deref(),
        Some("https://connect.example.com/content/g-42/")
    );
    assert_eq!(
        result.dashboard_url.as_deref(),
        Some("https://connect.example.com/connect/#/apps/g-42")
    );
    assert_eq!(result.log_excerpt, vec!["Bundle deployed"]);
    create.assert();
    upload.assert();
    deploy.assert();

    // The deployment record lands next to the content
    assert!(content.join("rsconnect-python/site.json").exists());
}
