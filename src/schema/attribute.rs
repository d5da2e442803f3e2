// Attribute Schema - Declarative field definitions loaded from entity JSON
// Every attribute carries a `type` tag that selects exactly one variant below

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::permissions::Permissions;

/// Attribute definition - one named, typed field of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    #[serde(flatten)]
    pub kind: AttributeKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Permissions>,
}

impl AttributeSpec {
    pub fn new(kind: AttributeKind) -> Self {
        Self {
            kind,
            required: false,
            unique: false,
            default: None,
            permissions: None,
        }
    }

    /// Mark attribute as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark attribute as unique
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Add default value
    pub fn default_value(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Attach attribute-level permissions
    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Entity referenced by a `ref` or `user` attribute
    pub fn referenced_entity(&self) -> Option<&str> {
        match &self.kind {
            AttributeKind::Ref { entity } => Some(entity.as_str()),
            AttributeKind::User {} => Some(crate::schema::USERS_ENTITY),
            _ => None,
        }
    }
}

/// Closed set of attribute kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum AttributeKind {
    Boolean {},
    Email {},
    Enum {
        values: Vec<String>,
    },
    Id {},
    List {
        list_type: Box<AttributeSpec>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_items: Option<usize>,
    },
    Map {
        key_type: Box<AttributeSpec>,
        value_type: Box<AttributeSpec>,
    },
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    Ref {
        entity: String,
    },
    Slug {
        set_from: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix: Option<SlugAffix>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        suffix: Option<SlugAffix>,
    },
    String {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hash: Option<HashSpec>,
    },
    User {},
}

impl AttributeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeKind::Boolean {} => "boolean",
            AttributeKind::Email {} => "email",
            AttributeKind::Enum { .. } => "enum",
            AttributeKind::Id {} => "id",
            AttributeKind::List { .. } => "list",
            AttributeKind::Map { .. } => "map",
            AttributeKind::Number { .. } => "number",
            AttributeKind::Ref { .. } => "ref",
            AttributeKind::Slug { .. } => "slug",
            AttributeKind::String { .. } => "string",
            AttributeKind::User {} => "user",
        }
    }
}

/// Generated text joined to a slug
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SlugAffix {
    Random { chars: usize },
}

/// One-way transformation applied to a stored string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashSpec {
    pub algorithm: HashAlgorithm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt_rounds: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Bcrypt,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_attribute_variants() {
        let spec: AttributeSpec = serde_json::from_value(json!({
            "type": "number",
            "min": 0,
            "max": 10,
            "required": true,
            "default": 5
        }))
        .unwrap();
        assert_eq!(spec.kind, AttributeKind::Number { min: Some(0.0), max: Some(10.0) });
        assert!(spec.required);
        assert_eq!(spec.default, Some(json!(5)));

        let spec: AttributeSpec = serde_json::from_value(json!({
            "type": "list",
            "listType": { "type": "string", "maxLength": 3 },
            "maxItems": 2
        }))
        .unwrap();
        match spec.kind {
            AttributeKind::List { list_type, max_items } => {
                assert_eq!(max_items, Some(2));
                assert_eq!(list_type.kind, AttributeKind::String { max_length: Some(3), hash: None });
            }
            other => panic!("Expected list, got {:?}", other),
        }

        let spec: AttributeSpec = serde_json::from_value(json!({
            "type": "slug",
            "setFrom": "title",
            "prefix": { "type": "random", "chars": 8 }
        }))
        .unwrap();
        assert_eq!(
            spec.kind,
            AttributeKind::Slug {
                set_from: "title".to_string(),
                prefix: Some(SlugAffix::Random { chars: 8 }),
                suffix: None,
            }
        );

        let spec: AttributeSpec = serde_json::from_value(json!({
            "type": "string",
            "hash": { "algorithm": "bcrypt", "salt_rounds": 4 }
        }))
        .unwrap();
        assert_eq!(
            spec.kind,
            AttributeKind::String {
                max_length: None,
                hash: Some(HashSpec { algorithm: HashAlgorithm::Bcrypt, salt_rounds: Some(4) }),
            }
        );
    }

    #[test]
    fn test_unknown_type_is_configuration_error() {
        let result = serde_json::from_value::<AttributeSpec>(json!({ "type": "date" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_referenced_entity() {
        let spec = AttributeSpec::new(AttributeKind::Ref { entity: "items".to_string() });
        assert_eq!(spec.referenced_entity(), Some("items"));
        assert_eq!(AttributeSpec::new(AttributeKind::User {}).referenced_entity(), Some("users"));
        assert_eq!(AttributeSpec::new(AttributeKind::Boolean {}).referenced_entity(), None);
    }
}
