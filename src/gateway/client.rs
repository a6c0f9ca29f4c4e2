//! Entity gateway
//!
//! HTTP client for the CRM entity API. Generic CRUD and query operations are
//! shaped by the configured dialect and every failure is normalized into a
//! [`GatewayError`].

use super::dialect::{shaper_for, BackendRequest, RequestShaper};
use super::error::{ErrorContext, GatewayError, Operation};
use super::query::{Connector, EntityPayload, GetOptions, QueryResult, QuerySpec};
use crate::auth::TokenManager;
use crate::config::{Dialect, RuntimeConfig};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Build the HTTP client shared by the token manager and the gateway
pub fn build_http_client(config: &RuntimeConfig) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder();
    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }
    if config.insecure_ssl {
        builder = builder.danger_accept_invalid_certs(true);
    }
    builder.build()
}

/// Generic entity operations against the CRM
#[derive(Debug)]
pub struct EntityGateway {
    tokens: Arc<TokenManager>,
    base_url: String,
    shaper: Box<dyn RequestShaper>,
    http_client: Client,
}

impl EntityGateway {
    /// Create a new gateway
    ///
    /// # Arguments
    /// * `tokens` - Token manager supplying bearer tokens
    /// * `base_url` - API root URL (e.g., "https://api.tribecrm.nl")
    /// * `dialect` - Request-shaping convention of the backend
    /// * `http_client` - HTTP client for entity requests
    pub fn new(
        tokens: Arc<TokenManager>,
        base_url: String,
        dialect: Dialect,
        http_client: Client,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();

        Self {
            tokens,
            base_url,
            shaper: shaper_for(dialect),
            http_client,
        }
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get configured dialect
    pub fn dialect(&self) -> Dialect {
        self.shaper.dialect()
    }

    /// Send a shaped request and return the raw body of a success response
    async fn send(
        &self,
        context: &ErrorContext,
        request: BackendRequest,
    ) -> Result<(StatusCode, String), GatewayError> {
        let token = self
            .tokens
            .ensure_valid_token()
            .await
            .map_err(|e| GatewayError::authentication(context.clone(), e))?;

        let url = format!("{}{}", self.base_url, request.path);
        tracing::debug!("{} {} {:?}", request.method, url, request.query);

        let mut builder = self
            .http_client
            .request(request.method, &url)
            .header(AUTHORIZATION, token.authorization())
            .header(ACCEPT, "application/json");
        for (name, value) in self.shaper.headers() {
            builder = builder.header(*name, *value);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::transport(context.clone(), e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::transport(context.clone(), e))?;

        if !status.is_success() {
            tracing::warn!("{} failed with {}: {}", context, status, text);
            if status == StatusCode::UNAUTHORIZED {
                self.tokens.invalidate(&token).await;
            }
            return Err(GatewayError::from_status(context.clone(), status.as_u16(), &text));
        }

        Ok((status, text))
    }

    /// Send a shaped request and return the decoded JSON body, if any
    async fn execute(
        &self,
        context: &ErrorContext,
        request: BackendRequest,
    ) -> Result<Option<Value>, GatewayError> {
        let (status, text) = self.send(context, request).await?;

        if text.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| GatewayError::Transport {
                context: context.clone(),
                status: Some(status.as_u16()),
                message: format!("Failed to parse response: {}", e),
            })
    }

    /// Execute a request whose success response must carry a body
    async fn execute_json<T: DeserializeOwned>(
        &self,
        context: &ErrorContext,
        request: BackendRequest,
    ) -> Result<T, GatewayError> {
        let value = self.execute(context, request).await?.ok_or_else(|| {
            GatewayError::Transport {
                context: context.clone(),
                status: None,
                message: "Empty response body".to_string(),
            }
        })?;

        serde_json::from_value(value).map_err(|e| GatewayError::Transport {
            context: context.clone(),
            status: None,
            message: format!("Unexpected response shape: {}", e),
        })
    }

    /// Get single entity by id
    pub async fn get_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
        options: &GetOptions,
    ) -> Result<Value, GatewayError> {
        let context = ErrorContext::new(Operation::GetEntity)
            .entity_type(entity_type)
            .entity_id(entity_id);
        check_segments(&context)?;
        let request = self.shaper.get(entity_type, entity_id, options);
        self.execute_json(&context, request).await
    }

    /// Create a new entity; the payload must not carry an id
    pub async fn create_entity(
        &self,
        entity_type: &str,
        payload: &EntityPayload,
    ) -> Result<Value, GatewayError> {
        let context = ErrorContext::new(Operation::CreateEntity).entity_type(entity_type);
        check_segments(&context)?;
        let request = self.shaper.create(entity_type, payload);
        self.execute_json(&context, request).await
    }

    /// Update an existing entity
    pub async fn update_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
        payload: &EntityPayload,
    ) -> Result<Value, GatewayError> {
        let context = ErrorContext::new(Operation::UpdateEntity)
            .entity_type(entity_type)
            .entity_id(entity_id);
        check_segments(&context)?;
        let request = self.shaper.update(entity_type, entity_id, payload);
        self.execute_json(&context, request).await
    }

    /// Delete an entity
    pub async fn delete_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<(), GatewayError> {
        let context = ErrorContext::new(Operation::DeleteEntity)
            .entity_type(entity_type)
            .entity_id(entity_id);
        check_segments(&context)?;
        let request = self.shaper.delete(entity_type, entity_id);
        // Any success body is ignored
        self.send(&context, request).await.map(|_| ())
    }

    /// Query a collection with the dialect's query shape
    pub async fn query_entities(
        &self,
        entity_type: &str,
        spec: &QuerySpec,
    ) -> Result<QueryResult, GatewayError> {
        let context = ErrorContext::new(Operation::QueryEntities).entity_type(entity_type);
        check_segments(&context)?;
        let request = self.shaper.query(entity_type, spec).ok_or_else(|| {
            GatewayError::invalid_request(
                context.clone(),
                format!("query shape does not match the {} dialect", self.dialect()),
            )
        })?;

        let body = self.execute(&context, request).await?.unwrap_or(Value::Null);
        let result = self
            .shaper
            .parse_query(body)
            .map_err(|e| GatewayError::Transport {
                context: context.clone(),
                status: None,
                message: format!("Unexpected query response: {}", e),
            })?;

        tracing::debug!("Fetched {} records from {}", result.records().len(), entity_type);
        Ok(result)
    }

    /// Get the employee the credentials belong to (OData dialect)
    pub async fn get_current_employee(&self, expand: Option<&str>) -> Result<Value, GatewayError> {
        let context = ErrorContext::new(Operation::GetCurrentEmployee);
        let request = self
            .shaper
            .current_employee(expand)
            .ok_or_else(|| self.not_in_dialect(&context))?;
        self.execute_json(&context, request).await
    }

    /// List integration connectors (REST dialect)
    pub async fn list_connectors(&self) -> Result<Vec<Connector>, GatewayError> {
        let context = ErrorContext::new(Operation::ListConnectors);
        let request = self
            .shaper
            .list_connectors()
            .ok_or_else(|| self.not_in_dialect(&context))?;
        self.execute_json(&context, request).await
    }

    /// Get a single connector (REST dialect)
    pub async fn get_connector(&self, connector_id: &str) -> Result<Connector, GatewayError> {
        let context = ErrorContext::new(Operation::GetConnector).entity_id(connector_id);
        check_segments(&context)?;
        let request = self
            .shaper
            .get_connector(connector_id)
            .ok_or_else(|| self.not_in_dialect(&context))?;
        self.execute_json(&context, request).await
    }

    fn not_in_dialect(&self, context: &ErrorContext) -> GatewayError {
        GatewayError::invalid_request(
            context.clone(),
            format!(
                "{} is not available in the {} dialect",
                context.operation,
                self.dialect()
            ),
        )
    }
}

/// Reject entity types and ids that cannot be sent as a single path segment.
///
/// Encoding keeps `/`, `?` and `#` inside the segment, but `.` and `..` would
/// still be resolved as dot segments by the URL parser.
fn check_segments(context: &ErrorContext) -> Result<(), GatewayError> {
    let fields = [
        ("entity type", context.entity_type.as_deref()),
        ("entity id", context.entity_id.as_deref()),
    ];
    for (name, value) in fields {
        if let Some(value) = value {
            if value.is_empty() || value == "." || value == ".." {
                return Err(GatewayError::invalid_request(
                    context.clone(),
                    format!("invalid {}: {:?}", name, value),
                ));
            }
        }
    }
    Ok(())
}
