//! Gateway errors
//!
//! Every failure is collapsed into one of four kinds and carries the
//! operation and entity it was raised for.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Operations exposed by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetEntity,
    CreateEntity,
    UpdateEntity,
    DeleteEntity,
    QueryEntities,
    GetCurrentEmployee,
    ListConnectors,
    GetConnector,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::GetEntity => "get_entity",
            Operation::CreateEntity => "create_entity",
            Operation::UpdateEntity => "update_entity",
            Operation::DeleteEntity => "delete_entity",
            Operation::QueryEntities => "query_entities",
            Operation::GetCurrentEmployee => "get_current_employee",
            Operation::ListConnectors => "list_connectors",
            Operation::GetConnector => "get_connector",
        }
    }

    /// Whether a 4xx rejection means the payload was invalid
    fn writes_payload(&self) -> bool {
        matches!(self, Operation::CreateEntity | Operation::UpdateEntity)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What was being attempted when an error occurred
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub operation: Operation,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
}

impl ErrorContext {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            entity_type: None,
            entity_id: None,
        }
    }

    pub fn entity_type(mut self, entity_type: &str) -> Self {
        self.entity_type = Some(entity_type.to_string());
        self
    }

    pub fn entity_id(mut self, entity_id: &str) -> Self {
        self.entity_id = Some(entity_id.to_string());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operation)?;
        match (&self.entity_type, &self.entity_id) {
            (Some(t), Some(id)) => write!(f, " {} {}", t, id),
            (Some(t), None) => write!(f, " {}", t),
            (None, Some(id)) => write!(f, " {}", id),
            (None, None) => Ok(()),
        }
    }
}

/// A single field rejected by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Normalized failure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    NotFound,
    Validation,
    Transport,
}

/// Gateway errors
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Authentication failed ({context}): {message}")]
    Authentication { context: ErrorContext, message: String },

    #[error("Not found ({context}): {message}")]
    NotFound { context: ErrorContext, message: String },

    #[error("Validation failed ({context}): {message}{}", format_field_errors(.field_errors))]
    Validation {
        context: ErrorContext,
        message: String,
        field_errors: Vec<FieldError>,
    },

    #[error("Request failed ({context}){}: {message}", format_status(.status))]
    Transport {
        context: ErrorContext,
        status: Option<u16>,
        message: String,
    },
}

fn format_field_errors(errors: &[FieldError]) -> String {
    if errors.is_empty() {
        return String::new();
    }
    let fields: Vec<String> = errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect();
    format!(" [{}]", fields.join("; "))
}

fn format_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" status {}", s)).unwrap_or_default()
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Authentication { .. } => ErrorKind::Authentication,
            GatewayError::NotFound { .. } => ErrorKind::NotFound,
            GatewayError::Validation { .. } => ErrorKind::Validation,
            GatewayError::Transport { .. } => ErrorKind::Transport,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            GatewayError::Authentication { context, .. }
            | GatewayError::NotFound { context, .. }
            | GatewayError::Validation { context, .. }
            | GatewayError::Transport { context, .. } => context,
        }
    }

    pub(crate) fn authentication(context: ErrorContext, err: crate::auth::AuthError) -> Self {
        GatewayError::Authentication {
            context,
            message: err.to_string(),
        }
    }

    pub(crate) fn transport(context: ErrorContext, err: reqwest::Error) -> Self {
        GatewayError::Transport {
            context,
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }

    /// Caller asked for something that cannot be sent, e.g. an operation the
    /// configured dialect does not have
    pub(crate) fn invalid_request(context: ErrorContext, message: impl Into<String>) -> Self {
        GatewayError::Validation {
            context,
            message: message.into(),
            field_errors: Vec::new(),
        }
    }

    /// Map a non-success backend response to an error kind
    pub(crate) fn from_status(context: ErrorContext, status: u16, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let message = parsed
            .as_ref()
            .and_then(backend_message)
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!("HTTP {}", status)
                } else {
                    body.trim().to_string()
                }
            });

        match status {
            401 | 403 => GatewayError::Authentication { context, message },
            404 if context.entity_id.is_some() => GatewayError::NotFound { context, message },
            400..=499 if context.operation.writes_payload() => GatewayError::Validation {
                field_errors: parsed.as_ref().map(field_errors).unwrap_or_default(),
                context,
                message,
            },
            _ => GatewayError::Transport {
                context,
                status: Some(status),
                message,
            },
        }
    }
}

/// Extract the human-readable message from a backend error body
pub fn backend_message(body: &Value) -> Option<String> {
    let text = |v: Option<&Value>| v.and_then(Value::as_str).map(String::from);

    text(body.pointer("/error/message"))
        .or_else(|| text(body.get("error")))
        .or_else(|| text(body.get("message")))
        .or_else(|| text(body.get("error_description")))
        .or_else(|| text(body.get("title")))
}

/// Extract per-field errors from OData `error.details` or REST `errors`
pub fn field_errors(body: &Value) -> Vec<FieldError> {
    let mut out = Vec::new();

    if let Some(details) = body.pointer("/error/details").and_then(Value::as_array) {
        for detail in details {
            if let Some(message) = detail.get("message").and_then(Value::as_str) {
                out.push(FieldError {
                    field: detail
                        .get("target")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    message: message.to_string(),
                });
            }
        }
    }

    match body.get("errors") {
        Some(Value::Object(map)) => {
            for (field, messages) in map {
                match messages {
                    Value::String(message) => out.push(FieldError {
                        field: field.clone(),
                        message: message.clone(),
                    }),
                    Value::Array(items) => {
                        for item in items.iter().filter_map(Value::as_str) {
                            out.push(FieldError {
                                field: field.clone(),
                                message: item.to_string(),
                            });
                        }
                    }
                    _ => {}
                }
            }
        }
        Some(Value::Array(items)) => {
            for item in items {
                if let Some(message) = item.get("message").and_then(Value::as_str) {
                    out.push(FieldError {
                        field: item
                            .get("field")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        message: message.to_string(),
                    });
                }
            }
        }
        _ => {}
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn get_ctx() -> ErrorContext {
        ErrorContext::new(Operation::GetEntity)
            .entity_type("Relation_Person")
            .entity_id("42")
    }

    #[test]
    fn test_backend_message_precedence() {
        assert_eq!(
            backend_message(&json!({"error": {"code": "0x1", "message": "Bad filter"}})),
            Some("Bad filter".to_string())
        );
        assert_eq!(
            backend_message(&json!({"error": "invalid_request", "message": "ignored"})),
            Some("invalid_request".to_string())
        );
        assert_eq!(
            backend_message(&json!({"message": "Contact not found"})),
            Some("Contact not found".to_string())
        );
        assert_eq!(backend_message(&json!({"status": 500})), None);
    }

    #[test]
    fn test_field_errors_from_odata_details() {
        let body = json!({
            "error": {
                "message": "Validation failed",
                "details": [
                    {"target": "Name", "message": "Name is required"},
                    {"message": "General failure"}
                ]
            }
        });
        assert_eq!(
            field_errors(&body),
            vec![
                FieldError { field: "Name".into(), message: "Name is required".into() },
                FieldError { field: "".into(), message: "General failure".into() },
            ]
        );
    }

    #[test]
    fn test_field_errors_from_rest_shapes() {
        let map = json!({"errors": {"email": ["is invalid", "is taken"], "name": "is blank"}});
        let errors = field_errors(&map);
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&FieldError { field: "name".into(), message: "is blank".into() }));

        let list = json!({"errors": [{"field": "status", "message": "unknown value"}]});
        assert_eq!(
            field_errors(&list),
            vec![FieldError { field: "status".into(), message: "unknown value".into() }]
        );
    }

    #[test]
    fn test_404_with_id_is_not_found() {
        let err = GatewayError::from_status(get_ctx(), 404, r#"{"error":{"message":"No entity"}}"#);
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "Not found (get_entity Relation_Person 42): No entity");
    }

    #[test]
    fn test_404_on_query_is_transport() {
        let ctx = ErrorContext::new(Operation::QueryEntities).entity_type("Nope");
        let err = GatewayError::from_status(ctx, 404, "");
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(
            err.to_string(),
            "Request failed (query_entities Nope) status 404: HTTP 404"
        );
    }

    #[test]
    fn test_4xx_on_create_is_validation() {
        let ctx = ErrorContext::new(Operation::CreateEntity).entity_type("contact");
        let err = GatewayError::from_status(
            ctx,
            422,
            r#"{"message":"Invalid contact","errors":{"email":"is invalid"}}"#,
        );
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            err.to_string(),
            "Validation failed (create_entity contact): Invalid contact [email: is invalid]"
        );
    }

    #[test]
    fn test_4xx_on_get_is_transport() {
        let err = GatewayError::from_status(get_ctx(), 400, "bad request");
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().ends_with(": bad request"));
    }

    #[test]
    fn test_401_is_authentication() {
        let err = GatewayError::from_status(get_ctx(), 401, "");
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(err.context().operation, Operation::GetEntity);
    }

    #[test]
    fn test_5xx_is_transport() {
        let ctx = ErrorContext::new(Operation::UpdateEntity)
            .entity_type("contact")
            .entity_id("1");
        let err = GatewayError::from_status(ctx, 503, "");
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
