#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;
use url::Url;
use urlgate_core::ClientGroups;
use urlgate_resolver::observability::init_tracing;
use urlgate_resolver::{HttpPatternSource, ResolverEngine, ResolverEngineBuilder};
use urlgate_storage::{DynStore, FileStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PATTERNS_PATH: &str = "/api/url-patterns";

/// Pattern records in the shape the pattern source serves.
pub fn pattern_records() -> Value {
    json!([
        { "pattern": "/a/*", "resourceType": "wildcard" },
        { "pattern": "/a/.*", "resourceType": "regex" },
        { "pattern": "/a/:id", "resourceType": "param" },
        { "pattern": "/a/b", "resourceType": "exact", "authLevel": "public" },
        {
            "pattern": "/clients/:clientId/:projectId",
            "resourceType": "client-project",
            "components": ["ProjectHeader", { "name": "ChatWidget", "props": { "dock": "right" } }],
            "allowedGroups": ["education"]
        },
        {
            "pattern": "/shared/**",
            "resourceType": "shared",
            "allowedClients": ["*"]
        }
    ])
}

/// Starts a mock pattern source serving `body`, expecting `calls` requests.
pub async fn pattern_server(body: Value, calls: u64) -> MockServer {
    init_tracing("debug");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PATTERNS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(calls)
        .mount(&server)
        .await;
    server
}

pub fn http_source(server: &MockServer) -> Arc<HttpPatternSource> {
    let url = Url::parse(&format!("{}{PATTERNS_PATH}", server.uri())).unwrap();
    Arc::new(HttpPatternSource::new(url, Duration::from_secs(5)).unwrap())
}

pub fn file_store(dir: &TempDir) -> DynStore {
    Arc::new(FileStore::open(dir.path().join("urlgate-store.json")).unwrap())
}

pub fn client_groups() -> ClientGroups {
    ClientGroups::new()
        .with_client("elpl", ["education"])
        .with_client("mercy", ["healthcare"])
}

pub fn engine_builder(server: &MockServer, store: DynStore) -> ResolverEngineBuilder {
    ResolverEngine::builder(http_source(server))
        .store(store)
        .client_groups(client_groups())
        .fetch_timeout(Duration::from_secs(5))
}
