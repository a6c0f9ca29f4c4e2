//! Entity type resources
//!
//! A static catalogue of common entity types, each readable at
//! `tribecrm://entity-types/{code}`.

use super::protocol::{ReadResourceResult, Resource, ResourceContents};
use serde::Serialize;

pub const ENTITY_TYPE_URI_PREFIX: &str = "tribecrm://entity-types/";

const JSON_MIME: &str = "application/json";

/// Field of an entity type
#[derive(Debug, Clone, Serialize)]
pub struct EntityField {
    pub code: &'static str,
    pub name: &'static str,
    #[serde(rename = "type")]
    pub field_type: &'static str,
    pub required: bool,
}

/// Descriptor of a known entity type
#[derive(Debug, Clone, Serialize)]
pub struct EntityTypeDescriptor {
    pub code: &'static str,
    pub name: &'static str,
    pub fields: Vec<EntityField>,
}

/// Known entity types
pub fn entity_types() -> Vec<EntityTypeDescriptor> {
    [
        ("Relation_Organization", "Organizations"),
        ("Relation_Person", "Persons"),
        (
            "Relationship_Organization_CommercialRelationship_Customer",
            "Customers",
        ),
        (
            "Relationship_Organization_CommercialRelationship_Lead",
            "Leads",
        ),
        ("Activity_Invoice", "Invoices"),
        ("Activity_Appointment", "Appointments"),
        ("Product", "Products"),
    ]
    .into_iter()
    .map(|(code, name)| EntityTypeDescriptor {
        code,
        name,
        fields: Vec::new(),
    })
    .collect()
}

/// Resource listing for all known entity types
pub fn list_resources() -> Vec<Resource> {
    entity_types()
        .into_iter()
        .map(|t| Resource {
            uri: format!("{}{}", ENTITY_TYPE_URI_PREFIX, t.code),
            name: t.name.to_string(),
            description: Some(format!("Entity type: {}", t.name)),
            mime_type: Some(JSON_MIME.to_string()),
        })
        .collect()
}

/// Read one entity type resource by URI
pub fn read_resource(uri: &str) -> Result<ReadResourceResult, String> {
    let code = uri
        .strip_prefix(ENTITY_TYPE_URI_PREFIX)
        .ok_or_else(|| format!("Unknown resource URI: {}", uri))?;

    let descriptor = entity_types()
        .into_iter()
        .find(|t| t.code == code)
        .ok_or_else(|| format!("Entity type not found: {}", code))?;

    let text = serde_json::to_string_pretty(&descriptor)
        .map_err(|e| format!("Failed to encode entity type: {}", e))?;

    Ok(ReadResourceResult {
        contents: vec![ResourceContents {
            uri: uri.to_string(),
            mime_type: Some(JSON_MIME.to_string()),
            text,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_uris() {
        let resources = list_resources();
        assert_eq!(resources.len(), entity_types().len());
        assert_eq!(
            resources[0].uri,
            "tribecrm://entity-types/Relation_Organization"
        );
        assert_eq!(resources[0].description.as_deref(), Some("Entity type: Organizations"));
    }

    #[test]
    fn test_read_known_type() {
        let result = read_resource("tribecrm://entity-types/Product").unwrap();
        let value: serde_json::Value = serde_json::from_str(&result.contents[0].text).unwrap();
        assert_eq!(value["code"], "Product");
        assert_eq!(value["name"], "Products");
        assert_eq!(value["fields"], serde_json::json!([]));
    }

    #[test]
    fn test_read_unknown_type() {
        assert_eq!(
            read_resource("tribecrm://entity-types/Nope").unwrap_err(),
            "Entity type not found: Nope"
        );
        assert!(read_resource("file:///etc/passwd")
            .unwrap_err()
            .starts_with("Unknown resource URI"));
    }
}
