/*!
 * Blocking HTTP client for the Connect server API
 *
 * Every call maps failures into three classes: transport (the request never
 * got an answer), authentication (the server rejected the key) and
 * application (the server answered with an error body). None of them are
 * retried here.
 */

use std::error::Error as StdError;
use std::time::Duration;

use reqwest::blocking::{Body, Client, RequestBuilder, Response};
use reqwest::{Certificate, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use super::types::{
    AppConfigResponse, ContentItem, ContentRequest, EnvironmentVariable, IdRef, Integration,
    ServerErrorBody, ServerInfo, ServerSettings, TaskStatus, User,
};
use crate::config::{DeployConfig, TlsMode};
use crate::core::archive::Bundle;
use crate::error::{Result, RsconnectError};

/// Error code the server sends for an unknown or revoked API key
const INVALID_API_KEY_CODE: i64 = 30;

/// Operations the deployer needs from a server
pub trait ConnectApi: Send + Sync {
    /// Unauthenticated server settings request
    fn server_settings(&self) -> Result<ServerSettings>;

    /// The user owning the API key
    fn me(&self) -> Result<User>;

    /// Check the server first, then authenticate, so an unreachable server and a bad
    /// key produce different errors
    fn verify_server(&self) -> Result<ServerInfo> {
        let settings = self.server_settings()?;
        let user = self.me()?;
        Ok(ServerInfo {
            version: settings.version,
            username: user.username,
        })
    }

    fn create_or_update_content(&self, request: &ContentRequest) -> Result<ContentItem>;

    /// Returns the id of the stored bundle
    fn upload_bundle(&self, content_id: &str, bundle: &Bundle) -> Result<String>;

    /// Returns the id of the deployment task
    fn deploy(&self, content_id: &str, bundle_id: &str, force: bool) -> Result<String>;

    fn set_environment_variables(&self, guid: &str, vars: &[(String, String)]) -> Result<()>;

    fn task_status(&self, task_id: &str, first: Option<u64>, wait_secs: u64)
        -> Result<TaskStatus>;

    /// Dashboard URL for the content
    fn app_config(&self, content_id: &str) -> Result<String>;

    /// Fetch the deployed content once; a server error means it failed to start
    fn verify_content(&self, guid: &str) -> Result<()>;

    fn integrations(&self) -> Result<Vec<Integration>>;
}

/// `ConnectApi` over HTTP
#[derive(Debug, Clone)]
pub struct ConnectClient {
    http: Client,
    base: Url,
    api: Url,
    api_key: Option<String>,
}

impl ConnectClient {
    pub fn new(config: &DeployConfig) -> Result<Self> {
        let server = config.server.as_deref().ok_or_else(|| {
            RsconnectError::Config(
                "no server given; use --server or set CONNECT_SERVER".to_string(),
            )
        })?;
        let base = normalize_server_url(server)?;
        let api = base
            .join("__api__/")
            .map_err(|e| RsconnectError::Config(format!("invalid server URL '{}': {}", server, e)))?;

        let http = build_http_client(&config.tls, config.request_timeout())?;

        Ok(Self {
            http,
            base,
            api,
            api_key: config.api_key.clone(),
        })
    }

    /// Server root, always ending in `/`
    pub fn server_url(&self) -> &str {
        self.base.as_str()
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api
            .join(path)
            .map_err(|e| RsconnectError::Other(format!("invalid API path '{}': {}", path, e)))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Key {}", key)),
            None => builder,
        }
    }

    fn send(&self, builder: RequestBuilder, url: &Url) -> Result<Response> {
        debug!(url = %url, "Connect API request");
        builder.send().map_err(|e| transport_error(url, &e))
    }

    fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let url = self.endpoint(path)?;
        let mut builder = self.request(method, url.clone());
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let response = self.send(builder, &url)?;
        decode(response, &url)
    }
}

impl ConnectApi for ConnectClient {
    fn server_settings(&self) -> Result<ServerSettings> {
        let url = self.endpoint("server_settings")?;
        let response = self.send(self.http.get(url.clone()), &url)?;
        let status = response.status();
        if !status.is_success() {
            return Err(RsconnectError::ServerUnreachable {
                url: self.base.to_string(),
                reason: format!("server_settings answered {}", status),
            });
        }
        let text = response.text().map_err(|e| transport_error(&url, &e))?;
        serde_json::from_str(&text).map_err(|_| RsconnectError::ServerUnreachable {
            url: self.base.to_string(),
            reason: "response is not a Connect server settings document".to_string(),
        })
    }

    fn me(&self) -> Result<User> {
        if self.api_key.is_none() {
            return Err(RsconnectError::Authentication(
                "no API key given; use --api-key or set CONNECT_API_KEY".to_string(),
            ));
        }
        self.call(Method::GET, "me", None)
    }

    fn create_or_update_content(&self, request: &ContentRequest) -> Result<ContentItem> {
        let Some(app_id) = &request.app_id else {
            let mut item: ContentItem =
                self.call(Method::POST, "applications", Some(json!({ "name": request.name })))?;
            if let Some(title) = &request.title {
                item = self.call(
                    Method::POST,
                    &format!("applications/{}", item.id),
                    Some(json!({ "title": title })),
                )?;
            }
            return Ok(item);
        };

        let item: ContentItem = self
            .call(Method::GET, &format!("applications/{}", app_id), None)
            .map_err(|e| match e {
                RsconnectError::Application { message, .. } => RsconnectError::application(
                    message,
                    Some("Use --new to deploy as new content instead."),
                ),
                other => other,
            })?;

        match &request.title {
            Some(title) if item.title.as_deref() != Some(title.as_str()) => self.call(
                Method::POST,
                &format!("applications/{}", app_id),
                Some(json!({ "title": title })),
            ),
            _ => Ok(item),
        }
    }

    fn upload_bundle(&self, content_id: &str, bundle: &Bundle) -> Result<String> {
        let url = self.endpoint(&format!("applications/{}/upload", content_id))?;
        let body = Body::sized(bundle.reader()?, bundle.size());
        let builder = self
            .request(Method::POST, url.clone())
            .header("Content-Type", "application/gzip")
            .body(body);
        let response = self.send(builder, &url)?;
        let uploaded: IdRef = decode(response, &url)?;
        Ok(uploaded.id)
    }

    fn deploy(&self, content_id: &str, bundle_id: &str, force: bool) -> Result<String> {
        let url = self.endpoint(&format!("applications/{}/deploy", content_id))?;
        let mut body = json!({ "bundle": bundle_id });
        if force {
            body["force"] = json!(true);
        }
        let response = self.send(self.request(Method::POST, url.clone()).json(&body), &url)?;
        if response.status() == StatusCode::CONFLICT && !force {
            return Err(RsconnectError::DeployInProgress {
                content: content_id.to_string(),
            });
        }
        let task: IdRef = decode(response, &url)?;
        Ok(task.id)
    }

    fn set_environment_variables(&self, guid: &str, vars: &[(String, String)]) -> Result<()> {
        if vars.is_empty() {
            return Ok(());
        }
        let url = self.endpoint(&format!("v1/content/{}/environment", guid))?;
        let body: Vec<EnvironmentVariable<'_>> = vars
            .iter()
            .map(|(name, value)| EnvironmentVariable { name, value })
            .collect();
        let response = self.send(self.request(Method::PATCH, url.clone()).json(&body), &url)?;
        check_status(response, &url).map(|_| ())
    }

    fn task_status(
        &self,
        task_id: &str,
        first: Option<u64>,
        wait_secs: u64,
    ) -> Result<TaskStatus> {
        let url = self.endpoint(&format!("v1/tasks/{}", task_id))?;
        let mut builder = self
            .request(Method::GET, url.clone())
            .query(&[("wait", wait_secs)]);
        if let Some(first) = first {
            builder = builder.query(&[("first", first)]);
        }
        let response = self.send(builder, &url)?;
        decode(response, &url)
    }

    fn app_config(&self, content_id: &str) -> Result<String> {
        let config: AppConfigResponse =
            self.call(Method::GET, &format!("applications/{}/config", content_id), None)?;
        Ok(config.config_url)
    }

    fn verify_content(&self, guid: &str) -> Result<()> {
        let url = self
            .base
            .join(&format!("content/{}/", guid))
            .map_err(|e| RsconnectError::Other(e.to_string()))?;
        let response = self.send(self.request(Method::GET, url.clone()), &url)?;
        if response.status().is_server_error() {
            return Err(RsconnectError::application(
                format!(
                    "Could not access the deployed content ({}). The app might not have started successfully.",
                    response.status()
                ),
                Some("Open the content in the dashboard to view its logs."),
            ));
        }
        Ok(())
    }

    fn integrations(&self) -> Result<Vec<Integration>> {
        self.call(Method::GET, "v1/oauth/integrations", None)
    }
}

/// Accept `host`, `https://host/`, or `https://host/__api__`
fn normalize_server_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix("/__api__").unwrap_or(trimmed);
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    Url::parse(&format!("{}/", with_scheme))
        .map_err(|e| RsconnectError::Config(format!("invalid server URL '{}': {}", raw, e)))
}

fn build_http_client(tls: &TlsMode, timeout: Option<Duration>) -> Result<Client> {
    let mut builder = Client::builder()
        .user_agent(concat!("rsconnect/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout);

    match tls {
        TlsMode::System => {}
        TlsMode::CaBundle { path } => {
            let pem = std::fs::read(path).map_err(|e| RsconnectError::filesystem(path, e))?;
            let certs = Certificate::from_pem_bundle(&pem).map_err(|e| {
                RsconnectError::Config(format!(
                    "{} is not a PEM certificate bundle: {}",
                    path.display(),
                    e
                ))
            })?;
            if certs.is_empty() {
                return Err(RsconnectError::Config(format!(
                    "{} contains no certificates",
                    path.display()
                )));
            }
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }
        TlsMode::Insecure => {
            warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
    }

    builder
        .build()
        .map_err(|e| RsconnectError::Config(format!("could not build HTTP client: {}", e)))
}

fn transport_error(url: &Url, error: &reqwest::Error) -> RsconnectError {
    let mut message = if error.is_timeout() {
        "request timed out".to_string()
    } else {
        error.to_string()
    };
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    RsconnectError::Transport {
        url: url.to_string(),
        message,
    }
}

fn check_status(response: Response, url: &Url) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    debug!(url = %url, status = %status, "Connect API request failed");
    Err(classify_failure(status, &body))
}

fn decode<T: DeserializeOwned>(response: Response, url: &Url) -> Result<T> {
    let response = check_status(response, url)?;
    let text = response.text().map_err(|e| transport_error(url, &e))?;
    serde_json::from_str(&text).map_err(|e| {
        RsconnectError::application(
            format!("unexpected response from {}: {}", url, e),
            None,
        )
    })
}

/// Map a non-2xx answer onto the error taxonomy
fn classify_failure(status: StatusCode, body: &str) -> RsconnectError {
    let parsed: ServerErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .error
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| status.to_string());

    if parsed.code == Some(INVALID_API_KEY_CODE) {
        return RsconnectError::Authentication("The specified API key is not valid.".to_string());
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RsconnectError::Authentication(message)
        }
        StatusCode::NOT_FOUND => {
            RsconnectError::application(message, Some("Check the content id and server URL."))
        }
        s if s.is_server_error() => RsconnectError::application(
            message,
            Some("The server failed while handling the request; check its logs."),
        ),
        _ => RsconnectError::application(message, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_server_url() {
        assert_eq!(
            normalize_server_url("https://connect.example.com").unwrap().as_str(),
            "https://connect.example.com/"
        );
        assert_eq!(
            normalize_server_url("https://connect.example.com/__api__/").unwrap().as_str(),
            "https://connect.example.com/"
        );
        assert_eq!(
            normalize_server_url("connect.example.com/rsc").unwrap().as_str(),
            "https://connect.example.com/rsc/"
        );
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure(StatusCode::UNAUTHORIZED, r#"{"error": "Unauthorized", "code": 30}"#),
            RsconnectError::Authentication(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::FORBIDDEN, ""),
            RsconnectError::Authentication(_)
        ));
        match classify_failure(
            StatusCode::BAD_REQUEST,
            r#"{"error": "Python 3.6 is not available", "code": 59}"#,
        ) {
            RsconnectError::Application { message, hint } => {
                assert_eq!(message, "Python 3.6 is not available");
                assert!(hint.is_none());
            }
            other => panic!("unexpected error: {other}"),
        }
        match classify_failure(StatusCode::BAD_GATEWAY, "<html>") {
            RsconnectError::Application { message, hint } => {
                assert!(message.starts_with("502"));
                assert!(hint.is_some());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_server_is_config_error() {
        let config = DeployConfig::default();
        assert!(matches!(
            ConnectClient::new(&config),
            Err(RsconnectError::Config(_))
        ));
    }
}
