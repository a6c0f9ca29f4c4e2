//! MCP Server implementation for TribeCRM
//!
//! Exposes entity tools and entity-type resources for the configured dialect

use crate::config::Dialect;
use crate::gateway::{
    EntityGateway, EntityPayload, GetOptions, ODataQuery, QuerySpec, SearchQuery,
};
use crate::mcp::protocol::*;
use crate::mcp::resources;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// MCP Server for TribeCRM
pub struct TribeCrmMcpServer {
    gateway: Arc<EntityGateway>,
    server_name: String,
}

impl TribeCrmMcpServer {
    /// Create a new MCP server instance
    pub fn new(gateway: Arc<EntityGateway>, server_name: String) -> Self {
        Self {
            gateway,
            server_name,
        }
    }

    /// Get list of available tools
    pub fn get_tools(&self) -> Vec<Tool> {
        Self::tools_for(self.gateway.dialect())
    }

    /// Tools exposed by a dialect
    pub fn tools_for(dialect: Dialect) -> Vec<Tool> {
        let mut tools = vec![
            Tool {
                name: "get_entity".to_string(),
                description: "Get a single entity by ID. Common entity types: Relation_Organization, Relation_Person, Activity_Invoice, Product".to_string(),
                input_schema: create_tool_schema(vec![
                    ("entityType", ParamType::String, "Entity type, e.g., 'Relation_Organization', 'Relation_Person'", true),
                    ("entityId", ParamType::String, "Entity ID", true),
                    ("expand", ParamType::String, "Related entities to expand, e.g., 'Address'", false),
                    ("select", ParamType::String, "Comma-separated fields to return, e.g., 'Name,EmailAddress'", false),
                ]),
            },
        ];

        match dialect {
            Dialect::OData => tools.push(Tool {
                name: "query_entities".to_string(),
                description: "Query entities with OData options. Supports $filter, $select, $expand, $orderby, $top, $skip, $count".to_string(),
                input_schema: create_tool_schema(vec![
                    ("entityType", ParamType::String, "Entity type to query", true),
                    ("filter", ParamType::String, "OData $filter expression, e.g., \"Name eq 'John' or contains(Name,'tech')\"", false),
                    ("select", ParamType::String, "Comma-separated list of fields to return", false),
                    ("expand", ParamType::String, "Related entities to expand", false),
                    ("orderby", ParamType::String, "Sort order, e.g., 'Name desc'", false),
                    ("top", ParamType::Number, "Maximum records to return", false),
                    ("skip", ParamType::Number, "Number of records to skip (for pagination)", false),
                    ("count", ParamType::Boolean, "Include total record count in response", false),
                ]),
            }),
            Dialect::Rest => tools.push(Tool {
                name: "search_entities".to_string(),
                description: "Search entities by free text and field filters".to_string(),
                input_schema: create_tool_schema(vec![
                    ("entityType", ParamType::String, "Entity type to search, e.g., 'contact'", true),
                    ("query", ParamType::String, "Free-text search query", false),
                    ("filters", ParamType::Object, "Field filters, e.g., {\"status\": \"active\"}", false),
                    ("page", ParamType::Number, "Page number", false),
                    ("pageSize", ParamType::Number, "Records per page", false),
                ]),
            }),
        }

        tools.extend([
            Tool {
                name: "create_entity".to_string(),
                description: "Create a new entity".to_string(),
                input_schema: create_tool_schema(vec![
                    ("entityType", ParamType::String, "Entity type", true),
                    ("data", ParamType::Object, "Entity data (do not include ID)", true),
                ]),
            },
            Tool {
                name: "update_entity".to_string(),
                description: "Update an existing entity".to_string(),
                input_schema: create_tool_schema(vec![
                    ("entityType", ParamType::String, "Entity type", true),
                    ("entityId", ParamType::String, "ID of the entity to update", true),
                    ("data", ParamType::Object, "Updated entity data", true),
                ]),
            },
            Tool {
                name: "delete_entity".to_string(),
                description: "Delete an entity".to_string(),
                input_schema: create_tool_schema(vec![
                    ("entityType", ParamType::String, "Entity type", true),
                    ("entityId", ParamType::String, "ID of the entity to delete", true),
                ]),
            },
        ]);

        match dialect {
            Dialect::OData => tools.push(Tool {
                name: "get_current_employee".to_string(),
                description: "Get information about the currently authenticated employee".to_string(),
                input_schema: create_tool_schema(vec![
                    ("expand", ParamType::String, "Related entities to expand, e.g., 'Person'", false),
                ]),
            }),
            Dialect::Rest => tools.extend([
                Tool {
                    name: "list_connectors".to_string(),
                    description: "List configured integration connectors".to_string(),
                    input_schema: create_tool_schema(vec![]),
                },
                Tool {
                    name: "get_connector".to_string(),
                    description: "Get a single integration connector by ID".to_string(),
                    input_schema: create_tool_schema(vec![
                        ("connectorId", ParamType::String, "Connector ID", true),
                    ]),
                },
            ]),
        }

        tools
    }

    /// Handle a JSON-RPC request; notifications produce no response
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            tracing::debug!("Notification: {}", request.method);
            return None;
        }
        let id = request.id.clone();

        let response = match request.method.as_str() {
            "initialize" => {
                let result = InitializeResult {
                    protocol_version: PROTOCOL_VERSION.to_string(),
                    capabilities: ServerCapabilities {
                        tools: Some(ToolsCapability {
                            list_changed: Some(false),
                        }),
                        resources: Some(ResourcesCapability {
                            subscribe: Some(false),
                            list_changed: Some(false),
                        }),
                    },
                    server_info: ServerInfo {
                        name: self.server_name.clone(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    },
                };
                JsonRpcResponse::from_result(id, &result)
            }

            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),

            "tools/list" => {
                let result = ListToolsResult {
                    tools: self.get_tools(),
                };
                JsonRpcResponse::from_result(id, &result)
            }

            "tools/call" => {
                let params: CallToolParams = match parse_params(request.params) {
                    Ok(params) => params,
                    Err(message) => return Some(JsonRpcResponse::error(id, INVALID_PARAMS, &message)),
                };
                let args = params.arguments.unwrap_or_default();
                let result = self.call_tool(&params.name, &args).await;
                JsonRpcResponse::from_result(id, &result)
            }

            "resources/list" => {
                let result = ListResourcesResult {
                    resources: resources::list_resources(),
                };
                JsonRpcResponse::from_result(id, &result)
            }

            "resources/read" => {
                let params: ReadResourceParams = match parse_params(request.params) {
                    Ok(params) => params,
                    Err(message) => return Some(JsonRpcResponse::error(id, INVALID_PARAMS, &message)),
                };
                match resources::read_resource(&params.uri) {
                    Ok(result) => JsonRpcResponse::from_result(id, &result),
                    Err(message) => JsonRpcResponse::error(
                        id,
                        INVALID_PARAMS,
                        &format!("Error reading resource: {}", message),
                    ),
                }
            }

            _ => JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                &format!("Method not found: {}", request.method),
            ),
        };

        Some(response)
    }

    /// Handle a tool call
    pub async fn call_tool(&self, name: &str, args: &HashMap<String, Value>) -> CallToolResult {
        if !self.get_tools().iter().any(|t| t.name == name) {
            return CallToolResult::error(format!("Unknown tool: {}", name));
        }

        let result = match name {
            "get_entity" => self.get_entity(args).await,
            "query_entities" => self.query_entities(args).await,
            "search_entities" => self.search_entities(args).await,
            "create_entity" => self.create_entity(args).await,
            "update_entity" => self.update_entity(args).await,
            "delete_entity" => self.delete_entity(args).await,
            "get_current_employee" => self.get_current_employee(args).await,
            "list_connectors" => self.list_connectors().await,
            "get_connector" => self.get_connector(args).await,
            _ => Err(format!("Unknown tool: {}", name)),
        };

        match result {
            Ok(text) => CallToolResult::text(text),
            Err(message) => {
                tracing::warn!("Tool {} failed: {}", name, message);
                CallToolResult::error(message)
            }
        }
    }

    async fn get_entity(&self, args: &HashMap<String, Value>) -> Result<String, String> {
        let entity_type = required_str(args, "entityType")?;
        let entity_id = required_str(args, "entityId")?;
        let options = GetOptions {
            expand: optional_str(args, "expand"),
            select: optional_str(args, "select"),
        };

        let record = self
            .gateway
            .get_entity(entity_type, entity_id, &options)
            .await
            .map_err(|e| format!("Error: {}", e))?;
        Ok(to_pretty_json(&record))
    }

    async fn query_entities(&self, args: &HashMap<String, Value>) -> Result<String, String> {
        let entity_type = required_str(args, "entityType")?;
        let spec = QuerySpec::OData(ODataQuery {
            filter: optional_str(args, "filter"),
            select: optional_str(args, "select"),
            expand: optional_str(args, "expand"),
            orderby: optional_str(args, "orderby"),
            top: parse_number_arg(args, "top"),
            skip: parse_number_arg(args, "skip"),
            count: parse_bool_arg(args, "count"),
        });

        let result = self
            .gateway
            .query_entities(entity_type, &spec)
            .await
            .map_err(|e| format!("Error: {}", e))?;
        Ok(to_pretty_json(&result))
    }

    async fn search_entities(&self, args: &HashMap<String, Value>) -> Result<String, String> {
        let entity_type = required_str(args, "entityType")?;
        let spec = QuerySpec::Search(SearchQuery {
            query: optional_str(args, "query"),
            filters: parse_object_arg(args, "filters")?.unwrap_or_default(),
            page: parse_number_arg(args, "page"),
            page_size: parse_number_arg(args, "pageSize"),
        });

        let result = self
            .gateway
            .query_entities(entity_type, &spec)
            .await
            .map_err(|e| format!("Error: {}", e))?;
        Ok(to_pretty_json(&result))
    }

    async fn create_entity(&self, args: &HashMap<String, Value>) -> Result<String, String> {
        let entity_type = required_str(args, "entityType")?;
        let data = required_object(args, "data")?;

        let record = self
            .gateway
            .create_entity(entity_type, &data)
            .await
            .map_err(|e| format!("Error: {}", e))?;
        Ok(format!(
            "Entity created successfully:\n{}",
            to_pretty_json(&record)
        ))
    }

    async fn update_entity(&self, args: &HashMap<String, Value>) -> Result<String, String> {
        let entity_type = required_str(args, "entityType")?;
        let entity_id = required_str(args, "entityId")?;
        let data = required_object(args, "data")?;

        let record = self
            .gateway
            .update_entity(entity_type, entity_id, &data)
            .await
            .map_err(|e| format!("Error: {}", e))?;
        Ok(format!(
            "Entity updated successfully:\n{}",
            to_pretty_json(&record)
        ))
    }

    async fn delete_entity(&self, args: &HashMap<String, Value>) -> Result<String, String> {
        let entity_type = required_str(args, "entityType")?;
        let entity_id = required_str(args, "entityId")?;

        self.gateway
            .delete_entity(entity_type, entity_id)
            .await
            .map_err(|e| format!("Error: {}", e))?;
        Ok(format!("Entity {} deleted successfully", entity_id))
    }

    async fn get_current_employee(&self, args: &HashMap<String, Value>) -> Result<String, String> {
        let expand = optional_str(args, "expand");
        let employee = self
            .gateway
            .get_current_employee(expand.as_deref())
            .await
            .map_err(|e| format!("Error: {}", e))?;
        Ok(to_pretty_json(&employee))
    }

    async fn list_connectors(&self) -> Result<String, String> {
        let connectors = self
            .gateway
            .list_connectors()
            .await
            .map_err(|e| format!("Error: {}", e))?;
        Ok(to_pretty_json(&connectors))
    }

    async fn get_connector(&self, args: &HashMap<String, Value>) -> Result<String, String> {
        let connector_id = required_str(args, "connectorId")?;
        let connector = self
            .gateway
            .get_connector(connector_id)
            .await
            .map_err(|e| format!("Error: {}", e))?;
        Ok(to_pretty_json(&connector))
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T, String> {
    match params {
        Some(p) => serde_json::from_value(p).map_err(|e| format!("Invalid params: {}", e)),
        None => Err("Missing params".to_string()),
    }
}

fn to_pretty_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

fn required_str<'a>(args: &'a HashMap<String, Value>, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required parameter: {}", key))
}

fn optional_str(args: &HashMap<String, Value>, key: &str) -> Option<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Parse a number argument from JSON (handles both string and number types)
fn parse_number_arg(args: &HashMap<String, Value>, key: &str) -> Option<u64> {
    args.get(key).and_then(|v| {
        v.as_u64()
            .or_else(|| v.as_f64().filter(|n| *n >= 0.0).map(|n| n as u64))
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    })
}

fn parse_bool_arg(args: &HashMap<String, Value>, key: &str) -> bool {
    args.get(key)
        .and_then(|v| v.as_bool().or_else(|| v.as_str().map(|s| s == "true")))
        .unwrap_or(false)
}

/// Object argument, also accepted as a JSON-encoded string
fn parse_object_arg(
    args: &HashMap<String, Value>,
    key: &str,
) -> Result<Option<EntityPayload>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            _ => Err(format!("Parameter {} must be a JSON object", key)),
        },
        Some(_) => Err(format!("Parameter {} must be a JSON object", key)),
    }
}

fn required_object(args: &HashMap<String, Value>, key: &str) -> Result<EntityPayload, String> {
    parse_object_arg(args, key)?.ok_or_else(|| format!("Missing required parameter: {}", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credentials, TokenEndpoint, TokenManager};
    use serde_json::json;

    fn server(dialect: Dialect) -> TribeCrmMcpServer {
        let http = reqwest::Client::new();
        let tokens = Arc::new(TokenManager::new(
            Credentials {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                organization_id: None,
            },
            TokenEndpoint {
                url: "http://127.0.0.1:9/token".to_string(),
                scope: None,
            },
            http.clone(),
        ));
        let gateway = EntityGateway::new(tokens, "http://127.0.0.1:9".to_string(), dialect, http);
        TribeCrmMcpServer::new(Arc::new(gateway), "tribecrm-test".to_string())
    }

    fn args(value: Value) -> HashMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    fn request(id: Option<Value>, method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }

    fn tool_names(dialect: Dialect) -> Vec<String> {
        TribeCrmMcpServer::tools_for(dialect)
            .into_iter()
            .map(|t| t.name)
            .collect()
    }

    #[test]
    fn test_odata_tools() {
        assert_eq!(
            tool_names(Dialect::OData),
            vec![
                "get_entity",
                "query_entities",
                "create_entity",
                "update_entity",
                "delete_entity",
                "get_current_employee"
            ]
        );
    }

    #[test]
    fn test_rest_tools() {
        assert_eq!(
            tool_names(Dialect::Rest),
            vec![
                "get_entity",
                "search_entities",
                "create_entity",
                "update_entity",
                "delete_entity",
                "list_connectors",
                "get_connector"
            ]
        );
    }

    #[test]
    fn test_argument_parsing() {
        let a = args(json!({"top": "5", "skip": 10, "count": "true", "empty": ""}));
        assert_eq!(parse_number_arg(&a, "top"), Some(5));
        assert_eq!(parse_number_arg(&a, "skip"), Some(10));
        assert!(parse_bool_arg(&a, "count"));
        assert_eq!(optional_str(&a, "empty"), None);
        assert_eq!(required_str(&a, "entityType").unwrap_err(), "Missing required parameter: entityType");
    }

    #[test]
    fn test_object_argument_accepts_json_string() {
        let a = args(json!({"data": "{\"Name\": \"Acme\"}", "bad": "[1]"}));
        assert_eq!(required_object(&a, "data").unwrap()["Name"], "Acme");
        assert!(parse_object_arg(&a, "bad").is_err());
        assert_eq!(parse_object_arg(&a, "missing").unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_argument_is_error_result() {
        let result = server(Dialect::OData)
            .call_tool("get_entity", &args(json!({"entityType": "Product"})))
            .await;
        assert_eq!(result.is_error, Some(true));
        assert_eq!(result.content[0].text, "Missing required parameter: entityId");
    }

    #[tokio::test]
    async fn test_unreachable_identity_provider_is_error_result() {
        let result = server(Dialect::OData)
            .call_tool("get_entity", &args(json!({"entityType": "Product", "entityId": "1"})))
            .await;
        assert_eq!(result.is_error, Some(true));
        assert!(result.content[0]
            .text
            .starts_with("Error: Authentication failed (get_entity Product 1)"));
    }

    #[tokio::test]
    async fn test_tool_from_other_dialect_is_unknown() {
        let result = server(Dialect::OData)
            .call_tool("search_entities", &HashMap::new())
            .await;
        assert_eq!(result.is_error, Some(true));
        assert_eq!(result.content[0].text, "Unknown tool: search_entities");
    }

    #[tokio::test]
    async fn test_initialize_advertises_resources() {
        let response = server(Dialect::Rest)
            .handle_request(request(Some(json!(1)), "initialize", None))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "tribecrm-test");
        assert!(result["capabilities"]["resources"].is_object());
    }

    #[tokio::test]
    async fn test_notification_has_no_response() {
        let response = server(Dialect::OData)
            .handle_request(request(None, "notifications/initialized", None))
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_resources_read() {
        let srv = server(Dialect::OData);
        let ok = srv
            .handle_request(request(
                Some(json!(2)),
                "resources/read",
                Some(json!({"uri": "tribecrm://entity-types/Relation_Person"})),
            ))
            .await
            .unwrap();
        let text = ok.result.unwrap()["contents"][0]["text"].as_str().unwrap().to_string();
        assert!(text.contains("Relation_Person"));

        let missing = srv
            .handle_request(request(
                Some(json!(3)),
                "resources/read",
                Some(json!({"uri": "tribecrm://entity-types/Unknown"})),
            ))
            .await
            .unwrap();
        let error = missing.error.unwrap();
        assert_eq!(error.code, INVALID_PARAMS);
        assert!(error.message.contains("Entity type not found: Unknown"));
    }

    #[tokio::test]
    async fn test_unknown_method_and_bad_params() {
        let srv = server(Dialect::OData);
        let response = srv
            .handle_request(request(Some(json!(4)), "prompts/list", None))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);

        let response = srv
            .handle_request(request(Some(json!(5)), "tools/call", None))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
    }
}
