// Entity Schema - Collection-level configuration: attributes, joins, hooks, indexes
// Loaded once at startup and held by the registry for the process lifetime

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::permissions::Permissions;
use crate::schema::attribute::AttributeSpec;

/// Entity definition - a named collection with its declared schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityConfig {
    pub entity_name: String,
    pub collection_name: String,
    #[serde(default)]
    pub entity_singular_name: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Permissions>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeSpec>,
    #[serde(default)]
    pub join_attributes: BTreeMap<String, JoinSpec>,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
    #[serde(default)]
    pub hooks: HashMap<Lifecycle, Vec<Hook>>,
}

impl EntityConfig {
    pub fn new(entity_name: &str, collection_name: &str) -> Self {
        Self {
            entity_name: entity_name.to_string(),
            collection_name: collection_name.to_string(),
            entity_singular_name: String::new(),
            api_key: String::new(),
            permissions: None,
            attributes: BTreeMap::new(),
            join_attributes: BTreeMap::new(),
            indexes: Vec::new(),
            hooks: HashMap::new(),
        }
    }

    pub fn attribute(mut self, name: &str, spec: AttributeSpec) -> Self {
        self.attributes.insert(name.to_string(), spec);
        self
    }

    pub fn join(mut self, name: &str, spec: JoinSpec) -> Self {
        self.join_attributes.insert(name.to_string(), spec);
        self
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Fields that must hold distinct values across the collection
    pub fn unique_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self
            .attributes
            .iter()
            .filter(|(_, spec)| spec.unique)
            .map(|(name, _)| name.clone())
            .collect();

        for index in self.indexes.iter().filter(|i| i.unique && i.fields.len() == 1) {
            if !fields.contains(&index.fields[0]) {
                fields.push(index.fields[0].clone());
            }
        }
        fields
    }

    pub fn hooks_for(&self, lifecycle: Lifecycle) -> &[Hook] {
        self.hooks.get(&lifecycle).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Index definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub fields: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

/// The eight moments at which hooks may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Lifecycle {
    BeforeGet,
    AfterGet,
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::BeforeGet => "beforeGet",
            Lifecycle::AfterGet => "afterGet",
            Lifecycle::BeforeCreate => "beforeCreate",
            Lifecycle::AfterCreate => "afterCreate",
            Lifecycle::BeforeUpdate => "beforeUpdate",
            Lifecycle::AfterUpdate => "afterUpdate",
            Lifecycle::BeforeDelete => "beforeDelete",
            Lifecycle::AfterDelete => "afterDelete",
        }
    }
}

/// Declarative side effect run at a lifecycle point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hook {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(flatten)]
    pub action: HookAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum HookAction {
    Increment { target: String, value: Value },
    Set { target: String, value: Value },
}

impl HookAction {
    pub fn target(&self) -> &str {
        match self {
            HookAction::Increment { target, .. } | HookAction::Set { target, .. } => target,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub left: Value,
    pub right: Value,
    pub comparator: Comparator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
}

/// Virtual relation fetched from another entity at read time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSpec {
    #[serde(rename = "type")]
    pub join_type: JoinType,
    pub entity: String,
    #[serde(default)]
    pub query: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JoinType {
    FindOne,
    FindMany,
}
