//! HTTP resource fetcher for the cloud management API.
//!
//! # Endpoints
//!
//! - GET `{endpoint}/api/{servers,server_arrays,clouds,deployments,server_templates}`
//! - GET `{endpoint}/api/clouds/{id}/{instances,datacenters,images,instance_types,ssh_keys}`
//! - GET `{array href}/current_instances`, `{instance href}/inputs`
//! - POST `{endpoint}/api/tags/by_resource` with `{"resource_hrefs": [href]}`
//! - GET `{href}` for a single resource (404 yields an empty collection)
//!
//! Every request carries basic credentials, the `X-Account` header and the
//! `X-Api-Version` header. Response objects become [`Resource`]s: scalar
//! fields are stringified, arrays of strings are comma-joined and the
//! `links` array becomes the link map, with the `self` link as href.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use cloudnodes_config::NodeSourceConfig;
use cloudnodes_core::populate::TAGS_ATTRIBUTE;
use cloudnodes_core::{
    FetchError, FetchScope, Resource, ResourceCollection, ResourceFetcher, ResourceKind,
};

/// API version sent with every request
const API_VERSION: &str = "1.5";

/// Default timeout when none is configured
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for [`HttpFetcher`].
#[derive(Clone)]
pub struct HttpFetcherConfig {
    /// API base URL
    pub endpoint: String,
    /// Account all requests are scoped to
    pub account_id: String,
    /// Basic credential identity
    pub identity: String,
    /// Basic credential secret
    pub secret: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl HttpFetcherConfig {
    /// Build from a node source configuration.
    pub fn from_config(config: &NodeSourceConfig) -> Self {
        Self {
            endpoint: config.endpoint().to_string(),
            account_id: config.account.id.clone(),
            identity: config.account.identity.clone(),
            secret: config.account.secret.clone(),
            timeout: config.fetch_timeout().unwrap_or(DEFAULT_TIMEOUT),
        }
    }
}

impl std::fmt::Debug for HttpFetcherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcherConfig")
            .field("endpoint", &self.endpoint)
            .field("account_id", &self.account_id)
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Request body for the tags-by-resource endpoint
#[derive(Debug, Serialize)]
struct TagsByResourceRequest<'a> {
    resource_hrefs: [&'a str; 1],
}

/// What to request for a (kind, scope) pair.
#[derive(Debug, PartialEq, Eq)]
enum Request {
    /// GET a listing at this path or href
    List(String),
    /// GET a single resource
    Single(String),
    /// POST for the tags of this resource href
    Tags(String),
}

fn request_for(kind: ResourceKind, scope: &FetchScope) -> Result<Request, FetchError> {
    let request = match (kind, scope) {
        (_, FetchScope::Href(href)) => Request::Single(href.clone()),
        (ResourceKind::Server, FetchScope::Account) => Request::List("/api/servers".into()),
        (ResourceKind::ServerArray, FetchScope::Account) => {
            Request::List("/api/server_arrays".into())
        }
        (ResourceKind::Cloud, FetchScope::Account) => Request::List("/api/clouds".into()),
        (ResourceKind::Deployment, FetchScope::Account) => Request::List("/api/deployments".into()),
        (ResourceKind::ServerTemplate, FetchScope::Account) => {
            Request::List("/api/server_templates".into())
        }
        (
            ResourceKind::Instance
            | ResourceKind::Datacenter
            | ResourceKind::Image
            | ResourceKind::InstanceType
            | ResourceKind::SshKey,
            FetchScope::Cloud(id),
        ) => Request::List(format!("/api/clouds/{}/{}s", id, kind.as_str())),
        (ResourceKind::Instance, FetchScope::Parent(href)) => {
            Request::List(format!("{}/current_instances", href))
        }
        (ResourceKind::Input, FetchScope::Parent(href)) => {
            Request::List(format!("{}/inputs", href))
        }
        (ResourceKind::Tag, FetchScope::Parent(href)) => Request::Tags(href.clone()),
        _ => return Err(FetchError::unsupported(kind, scope)),
    };
    Ok(request)
}

/// Resource fetcher talking to the management API over HTTP.
pub struct HttpFetcher {
    client: Client,
    config: HttpFetcherConfig,
}

impl HttpFetcher {
    /// Create a fetcher with its own HTTP client.
    pub fn new(config: HttpFetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FetchError::with_context("HTTP client", e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Create a fetcher from a node source configuration.
    pub fn from_config(config: &NodeSourceConfig) -> Result<Self, FetchError> {
        Self::new(HttpFetcherConfig::from_config(config))
    }

    /// Get the API base URL.
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Absolute URL for an API path or href.
    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.config.endpoint.trim_end_matches('/'), path)
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .basic_auth(&self.config.identity, Some(&self.config.secret))
            .header("X-Api-Version", API_VERSION)
            .header("X-Account", &self.config.account_id)
    }

    /// Send a request and decode its JSON body; `None` for 404.
    async fn send(&self, url: &str, request: RequestBuilder) -> Result<Option<Value>, FetchError> {
        let response = self.authorize(request).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Connection(format!("{}: {}", url, e))
            }
        })?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => {
                debug!(url = %url, "Resource not found");
                Ok(None)
            }
            _ if status.is_success() => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| FetchError::decode(url, e.to_string()))?;
                if body.trim().is_empty() {
                    return Ok(Some(Value::Array(Vec::new())));
                }
                serde_json::from_str(&body)
                    .map(Some)
                    .map_err(|e| FetchError::decode(url, e.to_string()))
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(FetchError::status(url, status.as_u16(), body))
            }
        }
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, FetchError> {
        let url = self.url(path);
        let request = self.client.get(&url);
        self.send(&url, request).await
    }

    async fn fetch_tags(&self, href: &str) -> Result<ResourceCollection, FetchError> {
        let url = self.url("/api/tags/by_resource");
        let request = self.client.post(&url).json(&TagsByResourceRequest {
            resource_hrefs: [href],
        });

        let Some(body) = self.send(&url, request).await? else {
            return Ok(ResourceCollection::new());
        };
        let Value::Array(entries) = body else {
            return Err(FetchError::decode(&url, "expected an array of tag sets"));
        };

        let mut collection = ResourceCollection::new();
        for entry in entries {
            let names: Vec<&str> = entry
                .get("tags")
                .and_then(Value::as_array)
                .map(|tags| {
                    tags.iter()
                        .filter_map(|tag| tag.get("name").and_then(Value::as_str))
                        .collect()
                })
                .unwrap_or_default();

            collection.insert(
                Resource::new(format!("{}/tags", href))
                    .with_attribute(TAGS_ATTRIBUTE, names.join(","))
                    .with_link("resource", href),
            );
        }
        Ok(collection)
    }
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(
        &self,
        kind: ResourceKind,
        scope: &FetchScope,
    ) -> Result<ResourceCollection, FetchError> {
        match request_for(kind, scope)? {
            Request::Tags(href) => self.fetch_tags(&href).await,
            Request::List(path) | Request::Single(path) => match self.get(&path).await? {
                None => Ok(ResourceCollection::new()),
                Some(body) => collection_from_json(&path, body),
            },
        }
    }
}

/// Convert a response body (one object or an array of objects) into resources.
///
/// `origin` is the requested path; resources without a `self` link (such as
/// inputs) get an href below it, named after their `name` field or position.
pub fn collection_from_json(origin: &str, body: Value) -> Result<ResourceCollection, FetchError> {
    match body {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| resource_from_json(origin, index, item))
            .collect(),
        Value::Object(_) => Ok(std::iter::once(resource_from_json(origin, 0, body)?).collect()),
        _ => Err(FetchError::decode(origin, "expected an object or an array")),
    }
}

fn resource_from_json(origin: &str, index: usize, value: Value) -> Result<Resource, FetchError> {
    let Value::Object(fields) = value else {
        return Err(FetchError::decode(origin, "expected a resource object"));
    };

    let links = links_from_json(&fields);
    let href = match links.iter().find(|(rel, _)| rel == "self") {
        Some((_, href)) => href.clone(),
        None => {
            let name = fields
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| index.to_string());
            format!("{}/{}", origin.trim_end_matches('/'), name)
        }
    };

    let mut resource = Resource::new(href);
    if let Some(id) = fields.get("id").and_then(scalar_to_string) {
        resource.id = id;
    }
    for (rel, target) in links {
        if rel != "self" {
            resource.links.insert(rel, target);
        }
    }

    for (name, value) in &fields {
        if name == "links" || name == "actions" {
            continue;
        }
        if let Some(text) = attribute_value(value) {
            resource.attributes.insert(name.clone(), text);
        }
    }
    Ok(resource)
}

fn links_from_json(fields: &Map<String, Value>) -> Vec<(String, String)> {
    fields
        .get("links")
        .and_then(Value::as_array)
        .map(|links| {
            links
                .iter()
                .filter_map(|link| {
                    let rel = link.get("rel")?.as_str()?;
                    let href = link.get("href")?.as_str()?;
                    Some((rel.to_string(), href.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn attribute_value(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar_to_string).collect();
            Some(parts.join(","))
        }
        other => scalar_to_string(other),
    }
}
