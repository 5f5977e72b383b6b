//! Common test utilities for grabbit end-to-end tests

use grabbit::{Config, JobConfiguration};
use std::path::Path;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// `admin:admin` as sent in a Basic `Authorization` header
pub const ADMIN_BASIC_AUTH: &str = "Basic YWRtaW46YWRtaW4=";

/// Configuration rooted in a temporary directory
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = root.join("grabbit.db");
    config.jobs.destination_root = root.join("repository");
    config.jobs.node_report_interval = 2;
    config
}

/// Job against the mock source server
pub fn job_for(server: &MockServer, path: &str) -> JobConfiguration {
    let address = server.address();
    serde_json::from_value(serde_json::json!({
        "path": path,
        "host": address.ip().to_string(),
        "port": address.port(),
        "serverUsername": "admin",
        "serverPassword": "admin",
        "clientUsername": "admin"
    }))
    .unwrap()
}

/// Newline-delimited node records
pub fn ndjson(nodes: &[serde_json::Value]) -> String {
    nodes.iter().map(|n| format!("{}\n", n)).collect()
}

/// Serve `body` for authenticated grab requests
pub async fn serve_grab(server: &MockServer, body: String) {
    Mock::given(method("GET"))
        .and(path("/grabbit/job"))
        .and(header("authorization", ADMIN_BASIC_AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}
