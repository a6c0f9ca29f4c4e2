//! Query and result types
//!
//! Two query shapes exist, one per dialect. Expressions are passed through
//! to the backend untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Open field-name to value mapping sent as an entity body
pub type EntityPayload = Map<String, Value>;

/// Optional projections for a single-entity read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    pub expand: Option<String>,
    pub select: Option<String>,
}

/// Query options for OData collection reads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ODataQuery {
    pub filter: Option<String>,
    pub select: Option<String>,
    pub expand: Option<String>,
    pub orderby: Option<String>,
    pub top: Option<u64>,
    pub skip: Option<u64>,
    pub count: bool, // Include @odata.count in response
}

impl ODataQuery {
    /// Build query parameters from options
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();

        if let Some(ref filter) = self.filter {
            params.push(("$filter".to_string(), filter.clone()));
        }
        if let Some(ref select) = self.select {
            params.push(("$select".to_string(), select.clone()));
        }
        if let Some(ref expand) = self.expand {
            params.push(("$expand".to_string(), expand.clone()));
        }
        if let Some(ref orderby) = self.orderby {
            params.push(("$orderby".to_string(), orderby.clone()));
        }
        if let Some(top) = self.top {
            params.push(("$top".to_string(), top.to_string()));
        }
        if let Some(skip) = self.skip {
            params.push(("$skip".to_string(), skip.to_string()));
        }
        if self.count {
            params.push(("$count".to_string(), "true".to_string()));
        }

        params
    }
}

/// Body of a REST `/search` request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub filters: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u64>,
}

/// Dialect-specific query
#[derive(Debug, Clone, PartialEq)]
pub enum QuerySpec {
    OData(ODataQuery),
    Search(SearchQuery),
}

/// OData collection response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ODataResponse {
    #[serde(rename = "@odata.context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(rename = "@odata.nextLink", default, skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,

    #[serde(rename = "@odata.count", default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,

    #[serde(default)]
    pub value: Vec<Value>,
}

/// REST search response
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    #[serde(default)]
    pub items: Vec<Value>,
    pub total_count: u64,
    pub page: u64,
    pub page_size: u64,
}

/// Result of a collection query
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    OData(ODataResponse),
    Search(SearchPage),
}

impl QueryResult {
    /// Records on this page
    pub fn records(&self) -> &[Value] {
        match self {
            QueryResult::OData(r) => &r.value,
            QueryResult::Search(p) => &p.items,
        }
    }

    /// Total matching records, when the backend reported it
    pub fn total_count(&self) -> Option<u64> {
        match self {
            QueryResult::OData(r) => r.count,
            QueryResult::Search(p) => Some(p.total_count),
        }
    }
}

/// Integration connector (REST dialect)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Connector {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(rename = "type")]
    pub connector_type: String,
    pub enabled: bool,
}
