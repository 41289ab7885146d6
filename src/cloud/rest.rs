//! Google REST client driven by API discovery documents.
//!
//! A method such as `users.messages.list` is looked up in the service's
//! discovery document, its path template is expanded from the request
//! params, the remaining params go to the query string and a `body` param
//! becomes the JSON request body.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::Method;
use serde_json::{Map, Value};

use crate::cloud::client::{ApiClient, ClientError, ClientFactory};
use crate::cloud::credentials::{Credentials, TokenSource};
use crate::constants::{BODY_PARAM, DEFAULT_HTTP_TIMEOUT_SECS};
use crate::models::{ActionKind, Params};

lazy_static! {
    static ref PATH_PARAM: Regex = Regex::new(r"\{(\+?)([A-Za-z0-9_.]+)\}").unwrap();
}

/// A Google API and version, e.g. `admin` / `directory_v1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceEndpoint {
    pub api: String,
    pub version: String,
}

impl ServiceEndpoint {
    pub fn new(api: &str, version: &str) -> Self {
        Self {
            api: api.to_string(),
            version: version.to_string(),
        }
    }

    pub fn admin_directory() -> Self {
        Self::new("admin", "directory_v1")
    }

    pub fn admin_reports() -> Self {
        Self::new("admin", "reports_v1")
    }

    pub fn gmail() -> Self {
        Self::new("gmail", "v1")
    }

    pub fn logging() -> Self {
        Self::new("logging", "v2")
    }

    pub fn cloud_asset() -> Self {
        Self::new("cloudasset", "v1")
    }

    pub fn discovery_url(&self) -> String {
        format!(
            "https://{}.googleapis.com/$discovery/rest?version={}",
            self.api, self.version
        )
    }
}

/// Discovery documents fetched during one run, keyed by URL.
///
/// Shared by every client built for the run so delegated per-user clients
/// do not refetch the same document.
#[derive(Debug, Default)]
pub struct DiscoveryCache {
    documents: Mutex<HashMap<String, Arc<Value>>>,
}

impl DiscoveryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<Arc<Value>> {
        self.documents.lock().ok()?.get(url).cloned()
    }

    pub fn insert(&self, url: &str, document: Value) -> Arc<Value> {
        let document = Arc::new(document);
        if let Ok(mut documents) = self.documents.lock() {
            documents.insert(url.to_string(), Arc::clone(&document));
        }
        document
    }

    pub fn len(&self) -> usize {
        self.documents.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An HTTP request ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: String,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// Find the discovery entry for a call.
///
/// Standard actions live at `resources.<base..>.resources.<function>.methods.<action>`,
/// direct invocations at `resources.<base..>.methods.<function>`.
pub fn resolve_method<'a>(
    document: &'a Value,
    base: &[String],
    function: &str,
    action: ActionKind,
) -> Result<&'a Value, ClientError> {
    let unknown = || {
        ClientError::Other(format!(
            "Unknown method {}{}{} in discovery document",
            base.iter().map(|b| format!("{}.", b)).collect::<String>(),
            function,
            action.suffix()
        ))
    };

    let mut node = document;
    for segment in base {
        node = node
            .get("resources")
            .and_then(|r| r.get(segment))
            .ok_or_else(unknown)?;
    }

    let method = match action.method_name() {
        Some(name) => node
            .get("resources")
            .and_then(|r| r.get(function))
            .and_then(|r| r.get("methods"))
            .and_then(|m| m.get(name)),
        None => node.get("methods").and_then(|m| m.get(function)),
    };
    method.ok_or_else(unknown)
}

fn param_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Fill `{name}` and `{+name}` from params, removing the used entries
pub fn expand_path(template: &str, params: &mut Params) -> Result<String, ClientError> {
    let mut expanded = String::with_capacity(template.len());
    let mut last = 0;

    for captures in PATH_PARAM.captures_iter(template) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(2)) else {
            continue;
        };
        let reserved = captures.get(1).map(|m| !m.as_str().is_empty()).unwrap_or(false);
        let value = params.remove(name.as_str()).ok_or_else(|| {
            ClientError::Other(format!("Missing required path parameter '{}'", name.as_str()))
        })?;
        let value = param_to_string(&value);

        expanded.push_str(&template[last..whole.start()]);
        if reserved {
            let segments: Vec<String> = value
                .split('/')
                .map(|s| urlencoding::encode(s).into_owned())
                .collect();
            expanded.push_str(&segments.join("/"));
        } else {
            expanded.push_str(&urlencoding::encode(&value));
        }
        last = whole.end();
    }
    expanded.push_str(&template[last..]);
    Ok(expanded)
}

/// Turn a discovery method plus params into a concrete request
pub fn prepare_request(
    document: &Value,
    method: &Value,
    params: &Params,
) -> Result<PreparedRequest, ClientError> {
    let root = document.get("rootUrl").and_then(Value::as_str).unwrap_or_default();
    let service_path = document
        .get("servicePath")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let path = method
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::Other("Discovery method has no path".to_string()))?;
    let http_method = method
        .get("httpMethod")
        .and_then(Value::as_str)
        .unwrap_or("GET")
        .to_string();

    let mut remaining = params.clone();
    let body = remaining.remove(BODY_PARAM);
    let path = expand_path(path, &mut remaining)?;

    let mut query = Vec::new();
    for (key, value) in &remaining {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                query.extend(items.iter().map(|item| (key.clone(), param_to_string(item))));
            }
            other => query.push((key.clone(), param_to_string(other))),
        }
    }

    Ok(PreparedRequest {
        method: http_method,
        url: format!("{}{}{}", root, service_path, path),
        query,
        body,
    })
}

/// Pull the human-readable message out of a Google error payload
fn error_message(status: u16, text: &str) -> String {
    let message = serde_json::from_str::<Value>(text).ok().and_then(|v| {
        v.get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    format!("HTTP {}: {}", status, message.unwrap_or_else(|| text.trim().to_string()))
}

/// `ApiClient` over `reqwest::blocking`.
pub struct RestClient {
    endpoint: ServiceEndpoint,
    credentials: Arc<dyn Credentials>,
    tokens: Arc<dyn TokenSource>,
    cache: Arc<DiscoveryCache>,
    http: Client,
}

impl RestClient {
    pub fn new(
        endpoint: ServiceEndpoint,
        credentials: Arc<dyn Credentials>,
        tokens: Arc<dyn TokenSource>,
        cache: Arc<DiscoveryCache>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            endpoint,
            credentials,
            tokens,
            cache,
            http,
        })
    }

    fn discovery_document(&self) -> Result<Arc<Value>, ClientError> {
        let url = self.endpoint.discovery_url();
        if let Some(document) = self.cache.get(&url) {
            return Ok(document);
        }

        debug!("Fetching discovery document {}", url);
        let response = self
            .http
            .get(&url)
            .send()
            .map_err(transport_error)?;
        let status = response.status();
        let text = response
            .text()
            .map_err(transport_error)?;
        if !status.is_success() {
            return Err(ClientError::from_status(status.as_u16(), error_message(status.as_u16(), &text)));
        }

        let document: Value = serde_json::from_str(&text)
            .map_err(|e| ClientError::Other(format!("Invalid discovery document {}: {}", url, e)))?;
        Ok(self.cache.insert(&url, document))
    }

    fn execute(
        &self,
        action: ActionKind,
        base: &[String],
        function: &str,
        params: &Params,
    ) -> Result<Value, ClientError> {
        let document = self.discovery_document()?;
        let method = resolve_method(&document, base, function, action)?;
        let prepared = prepare_request(&document, method, params)?;

        let token = self
            .tokens
            .token(self.credentials.as_ref())
            .map_err(|e| ClientError::Other(format!("{:#}", e)))?;
        let http_method = Method::from_bytes(prepared.method.as_bytes())
            .map_err(|e| ClientError::Other(e.to_string()))?;

        debug!("{} {}", prepared.method, prepared.url);
        let mut request = self
            .http
            .request(http_method, &prepared.url)
            .bearer_auth(token)
            .query(&prepared.query);
        if let Some(body) = &prepared.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .map_err(transport_error)?;
        let status = response.status();
        let text = response
            .text()
            .map_err(transport_error)?;

        if !status.is_success() {
            return Err(ClientError::from_status(status.as_u16(), error_message(status.as_u16(), &text)));
        }
        if text.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        serde_json::from_str(&text).map_err(|e| ClientError::Other(format!("Invalid JSON response: {}", e)))
    }
}

/// Transport failures carry no status; classify them by their text
fn transport_error(error: reqwest::Error) -> ClientError {
    ClientError::from_message(error.to_string())
}

impl ApiClient for RestClient {
    fn list(&self, base: &[String], function: &str, params: &Params) -> Result<Value, ClientError> {
        self.execute(ActionKind::List, base, function, params)
    }

    fn get(&self, base: &[String], function: &str, params: &Params) -> Result<Value, ClientError> {
        self.execute(ActionKind::Get, base, function, params)
    }

    fn create(&self, base: &[String], function: &str, params: &Params) -> Result<Value, ClientError> {
        self.execute(ActionKind::Create, base, function, params)
    }

    fn invoke(&self, base: &[String], function: &str, params: &Params) -> Result<Value, ClientError> {
        self.execute(ActionKind::Invoke, base, function, params)
    }

    fn close(&self) {
        debug!("Closing {} client for {}", self.endpoint.api, self.credentials.identity());
    }
}

/// Builds `RestClient`s for one service, sharing tokens and discovery cache
pub struct RestClientFactory {
    endpoint: ServiceEndpoint,
    tokens: Arc<dyn TokenSource>,
    cache: Arc<DiscoveryCache>,
}

impl RestClientFactory {
    pub fn new(endpoint: ServiceEndpoint, tokens: Arc<dyn TokenSource>, cache: Arc<DiscoveryCache>) -> Self {
        Self { endpoint, tokens, cache }
    }
}

impl ClientFactory for RestClientFactory {
    fn build(&self, credentials: Arc<dyn Credentials>) -> Result<Box<dyn ApiClient>> {
        let client = RestClient::new(
            self.endpoint.clone(),
            credentials,
            Arc::clone(&self.tokens),
            Arc::clone(&self.cache),
        )?;
        Ok(Box::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn discovery() -> Value {
        json!({
            "rootUrl": "https://gmail.googleapis.com/",
            "servicePath": "",
            "resources": {
                "users": {
                    "methods": {
                        "getProfile": {"httpMethod": "GET", "path": "gmail/v1/users/{userId}/profile"}
                    },
                    "resources": {
                        "messages": {
                            "methods": {
                                "list": {"httpMethod": "GET", "path": "gmail/v1/users/{userId}/messages"}
                            }
                        },
                        "settings": {
                            "methods": {
                                "getImap": {"httpMethod": "GET", "path": "gmail/v1/users/{userId}/settings/imap"}
                            }
                        }
                    }
                },
                "entries": {
                    "methods": {
                        "list": {"httpMethod": "POST", "path": "v2/entries:list"}
                    }
                }
            }
        })
    }

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_discovery_url() {
        assert_eq!(
            ServiceEndpoint::admin_directory().discovery_url(),
            "https://admin.googleapis.com/$discovery/rest?version=directory_v1"
        );
    }

    #[test]
    fn test_resolve_nested_list() {
        let doc = discovery();
        let method = resolve_method(&doc, &["users".to_string()], "messages", ActionKind::List).unwrap();
        assert_eq!(method["path"], "gmail/v1/users/{userId}/messages");
    }

    #[test]
    fn test_resolve_invoke() {
        let doc = discovery();
        let base = vec!["users".to_string(), "settings".to_string()];
        let method = resolve_method(&doc, &base, "getImap", ActionKind::Invoke).unwrap();
        assert_eq!(method["path"], "gmail/v1/users/{userId}/settings/imap");
    }

    #[test]
    fn test_resolve_unknown_method() {
        let doc = discovery();
        let err = resolve_method(&doc, &[], "entries", ActionKind::Get).unwrap_err();
        assert!(matches!(err, ClientError::Other(_)));
        assert!(err.message().contains("entries.get"));
    }

    #[test]
    fn test_expand_path() {
        let mut p = params(json!({"userId": "a b@example.com", "q": "x"}));
        let path = expand_path("users/{userId}/messages", &mut p).unwrap();
        assert_eq!(path, "users/a%20b%40example.com/messages");
        assert!(!p.contains_key("userId"));
        assert!(p.contains_key("q"));

        let mut p = params(json!({"name": "projects/p1/logs/x"}));
        assert_eq!(expand_path("v2/{+name}", &mut p).unwrap(), "v2/projects/p1/logs/x");

        let mut p = Params::new();
        assert!(expand_path("v2/{+parent}/logs", &mut p).is_err());
    }

    #[test]
    fn test_prepare_get_request() {
        let doc = discovery();
        let method = resolve_method(&doc, &["users".to_string()], "messages", ActionKind::List).unwrap();
        let p = params(json!({"userId": "me", "includeSpamTrash": true, "labelIds": ["A", "B"]}));
        let request = prepare_request(&doc, method, &p).unwrap();

        assert_eq!(request.method, "GET");
        assert_eq!(request.url, "https://gmail.googleapis.com/gmail/v1/users/me/messages");
        assert!(request.query.contains(&("includeSpamTrash".to_string(), "true".to_string())));
        assert!(request.query.contains(&("labelIds".to_string(), "A".to_string())));
        assert!(request.query.contains(&("labelIds".to_string(), "B".to_string())));
        assert!(request.body.is_none());
    }

    #[test]
    fn test_prepare_post_request_with_body() {
        let doc = discovery();
        let method = resolve_method(&doc, &[], "entries", ActionKind::List).unwrap();
        let p = params(json!({"body": {"resourceNames": ["projects/p1"], "pageSize": 500}}));
        let request = prepare_request(&doc, method, &p).unwrap();

        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "https://gmail.googleapis.com/v2/entries:list");
        assert!(request.query.is_empty());
        assert_eq!(request.body.unwrap()["pageSize"], 500);
    }

    #[test]
    fn test_error_message_extracts_google_error() {
        let text = r#"{"error": {"code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND"}}"#;
        assert_eq!(error_message(404, text), "HTTP 404: Requested entity was not found.");
        assert_eq!(error_message(502, "bad gateway "), "HTTP 502: bad gateway");
    }

    #[test]
    fn test_discovery_cache_shared() {
        let cache = DiscoveryCache::new();
        assert!(cache.is_empty());
        cache.insert("u", json!({"a": 1}));
        assert_eq!(cache.get("u").unwrap()["a"], 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("other").is_none());
    }
}
