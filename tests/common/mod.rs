#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::Arc;
use tribecrm_mcp::auth::{Credentials, TokenEndpoint, TokenManager};
use tribecrm_mcp::config::Dialect;
use tribecrm_mcp::gateway::{EntityGateway, EntityPayload};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN_PATH: &str = "/oauth2/token";
pub const ACCESS_TOKEN: &str = "test-access-token";

/// Nothing listens here; connections are refused
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:9";

pub fn credentials(organization_id: Option<&str>) -> Credentials {
    Credentials {
        client_id: "my-client".to_string(),
        client_secret: "my-secret".to_string(),
        organization_id: organization_id.map(String::from),
    }
}

pub fn token_endpoint(server: &MockServer, scope: Option<&str>) -> TokenEndpoint {
    TokenEndpoint {
        url: format!("{}{}", server.uri(), TOKEN_PATH),
        scope: scope.map(String::from),
    }
}

pub fn token_body(expires_in: u64) -> Value {
    json!({
        "access_token": ACCESS_TOKEN,
        "token_type": "Bearer",
        "expires_in": expires_in,
        "scope": "read write offline"
    })
}

/// Token endpoint that answers with a long-lived token
pub async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(3600)))
        .mount(server)
        .await;
}

pub fn token_manager(server: &MockServer) -> Arc<TokenManager> {
    Arc::new(TokenManager::new(
        credentials(None),
        token_endpoint(server, Some("read write offline")),
        reqwest::Client::new(),
    ))
}

pub fn gateway(server: &MockServer, dialect: Dialect) -> EntityGateway {
    EntityGateway::new(
        token_manager(server),
        server.uri(),
        dialect,
        reqwest::Client::new(),
    )
}

pub fn payload(value: Value) -> EntityPayload {
    value.as_object().cloned().expect("payload must be an object")
}
