//! Request shaping per backend dialect
//!
//! Each dialect turns a generic entity operation into a [`BackendRequest`]:
//! method, path relative to the API base URL, query parameters and body.
//! Entity types and ids are percent-encoded into the path, so an id is never
//! read as URL syntax. No I/O happens here.

use super::query::{EntityPayload, GetOptions, QueryResult, QuerySpec};
use crate::config::Dialect;
use reqwest::Method;
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

/// Path prefix of the OData service
pub const ODATA_PREFIX: &str = "/v1/odata";

/// Key under which the OData dialect carries the id of an updated entity
pub const ODATA_ID_FIELD: &str = "ID";

/// A backend request, ready to be sent
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl BackendRequest {
    fn new(method: Method, path: String) -> Self {
        Self {
            method,
            path,
            query: Vec::new(),
            body: None,
        }
    }

    fn param(mut self, key: &str, value: Option<&str>) -> Self {
        if let Some(value) = value {
            self.query.push((key.to_string(), value.to_string()));
        }
        self
    }

    fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Builds backend requests for one dialect
///
/// Dialect-specific operations default to `None` and are overridden by the
/// dialect that supports them.
pub trait RequestShaper: Send + Sync + fmt::Debug {
    fn dialect(&self) -> Dialect;

    /// Extra headers sent with every entity request
    fn headers(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    fn get(&self, entity_type: &str, entity_id: &str, options: &GetOptions) -> BackendRequest;

    fn create(&self, entity_type: &str, payload: &EntityPayload) -> BackendRequest;

    fn update(&self, entity_type: &str, entity_id: &str, payload: &EntityPayload)
        -> BackendRequest;

    fn delete(&self, entity_type: &str, entity_id: &str) -> BackendRequest;

    /// `None` when the query shape belongs to the other dialect
    fn query(&self, entity_type: &str, spec: &QuerySpec) -> Option<BackendRequest>;

    fn parse_query(&self, body: Value) -> Result<QueryResult, serde_json::Error>;

    fn current_employee(&self, _expand: Option<&str>) -> Option<BackendRequest> {
        None
    }

    fn list_connectors(&self) -> Option<BackendRequest> {
        None
    }

    fn get_connector(&self, _connector_id: &str) -> Option<BackendRequest> {
        None
    }
}

/// Encode a caller-supplied value as (part of) one path segment
fn segment(raw: &str) -> Cow<'_, str> {
    urlencoding::encode(raw)
}

/// Select the request shaper for a dialect
pub fn shaper_for(dialect: Dialect) -> Box<dyn RequestShaper> {
    match dialect {
        Dialect::OData => Box::new(ODataShaper),
        Dialect::Rest => Box::new(RestShaper),
    }
}

/// OData dialect: `/{type}({id})` keys, `$`-prefixed query options, updates
/// posted to the collection with the id in the body.
#[derive(Debug, Clone, Copy, Default)]
pub struct ODataShaper;

impl ODataShaper {
    fn collection(entity_type: &str) -> String {
        format!("{}/{}", ODATA_PREFIX, segment(entity_type))
    }

    fn entity(entity_type: &str, entity_id: &str) -> String {
        format!(
            "{}/{}({})",
            ODATA_PREFIX,
            segment(entity_type),
            segment(entity_id)
        )
    }
}

impl RequestShaper for ODataShaper {
    fn dialect(&self) -> Dialect {
        Dialect::OData
    }

    fn headers(&self) -> &'static [(&'static str, &'static str)] {
        &[("OData-MaxVersion", "4.0"), ("OData-Version", "4.0")]
    }

    fn get(&self, entity_type: &str, entity_id: &str, options: &GetOptions) -> BackendRequest {
        BackendRequest::new(Method::GET, Self::entity(entity_type, entity_id))
            .param("$expand", options.expand.as_deref())
            .param("$select", options.select.as_deref())
    }

    fn create(&self, entity_type: &str, payload: &EntityPayload) -> BackendRequest {
        BackendRequest::new(Method::POST, Self::collection(entity_type))
            .body(Value::Object(payload.clone()))
    }

    fn update(
        &self,
        entity_type: &str,
        entity_id: &str,
        payload: &EntityPayload,
    ) -> BackendRequest {
        let mut body = payload.clone();
        body.insert(ODATA_ID_FIELD.to_string(), Value::String(entity_id.to_string()));
        BackendRequest::new(Method::POST, Self::collection(entity_type)).body(Value::Object(body))
    }

    fn delete(&self, entity_type: &str, entity_id: &str) -> BackendRequest {
        BackendRequest::new(Method::DELETE, Self::entity(entity_type, entity_id))
    }

    fn query(&self, entity_type: &str, spec: &QuerySpec) -> Option<BackendRequest> {
        match spec {
            QuerySpec::OData(options) => {
                let mut request = BackendRequest::new(Method::GET, Self::collection(entity_type));
                request.query = options.to_query_pairs();
                Some(request)
            }
            QuerySpec::Search(_) => None,
        }
    }

    fn parse_query(&self, body: Value) -> Result<QueryResult, serde_json::Error> {
        serde_json::from_value(body).map(QueryResult::OData)
    }

    fn current_employee(&self, expand: Option<&str>) -> Option<BackendRequest> {
        let path = format!("{}/GetCurrentEmployee()", ODATA_PREFIX);
        Some(BackendRequest::new(Method::GET, path).param("$expand", expand))
    }
}

/// REST dialect: `/{type}/{id}` paths, PUT updates, search through a POSTed
/// `/search` sub-resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestShaper;

impl RestShaper {
    fn collection(entity_type: &str) -> String {
        format!("/{}", segment(entity_type))
    }

    fn entity(entity_type: &str, entity_id: &str) -> String {
        format!("/{}/{}", segment(entity_type), segment(entity_id))
    }
}

impl RequestShaper for RestShaper {
    fn dialect(&self) -> Dialect {
        Dialect::Rest
    }

    fn get(&self, entity_type: &str, entity_id: &str, options: &GetOptions) -> BackendRequest {
        BackendRequest::new(Method::GET, Self::entity(entity_type, entity_id))
            .param("expand", options.expand.as_deref())
            .param("select", options.select.as_deref())
    }

    fn create(&self, entity_type: &str, payload: &EntityPayload) -> BackendRequest {
        BackendRequest::new(Method::POST, Self::collection(entity_type))
            .body(Value::Object(payload.clone()))
    }

    fn update(
        &self,
        entity_type: &str,
        entity_id: &str,
        payload: &EntityPayload,
    ) -> BackendRequest {
        BackendRequest::new(Method::PUT, Self::entity(entity_type, entity_id))
            .body(Value::Object(payload.clone()))
    }

    fn delete(&self, entity_type: &str, entity_id: &str) -> BackendRequest {
        BackendRequest::new(Method::DELETE, Self::entity(entity_type, entity_id))
    }

    fn query(&self, entity_type: &str, spec: &QuerySpec) -> Option<BackendRequest> {
        match spec {
            QuerySpec::Search(search) => {
                let body = serde_json::to_value(search).ok()?;
                let path = format!("{}/search", Self::collection(entity_type));
                Some(BackendRequest::new(Method::POST, path).body(body))
            }
            QuerySpec::OData(_) => None,
        }
    }

    fn parse_query(&self, body: Value) -> Result<QueryResult, serde_json::Error> {
        serde_json::from_value(body).map(QueryResult::Search)
    }

    fn list_connectors(&self) -> Option<BackendRequest> {
        Some(BackendRequest::new(Method::GET, "/connectors".to_string()))
    }

    fn get_connector(&self, connector_id: &str) -> Option<BackendRequest> {
        Some(BackendRequest::new(
            Method::GET,
            format!("/connectors/{}", segment(connector_id)),
        ))
    }
}
