//! Entity registry: the directory from entity name to configuration and
//! data-access handle.
//!
//! The registry is populated during bootstrap and then shared read-only
//! (`Arc<Registry>`) with every component that needs cross-entity lookups.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::permissions::{PermissionKind, PermissionRule, Permissions};
use crate::schema::{singularize, AttributeKind, AttributeSpec, EntityConfig};
use crate::store::{DataAccess, ID_FIELD};

pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// A registered entity: immutable configuration plus its store handle
#[derive(Clone)]
pub struct Entity {
    pub config: Arc<EntityConfig>,
    store: Option<Arc<dyn DataAccess>>,
}

impl Entity {
    pub fn name(&self) -> &str {
        &self.config.entity_name
    }

    /// Data-access handle, required for any read or write
    pub fn store(&self) -> AppResult<&Arc<dyn DataAccess>> {
        self.store.as_ref().ok_or_else(|| {
            AppError::ConfigurationError(format!(
                "entity {} has no data access handle",
                self.config.entity_name
            ))
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeSpec> {
        self.config.attributes.get(name)
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("config", &self.config)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    entities: HashMap<String, Entity>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity, completing its configuration with the injected
    /// `id`, `createdAt` and `updatedAt` attributes.
    pub fn register(
        &mut self,
        mut config: EntityConfig,
        store: Option<Arc<dyn DataAccess>>,
    ) -> AppResult<Entity> {
        if config.entity_name.trim().is_empty() {
            return Err(AppError::ConfigurationError("entityName is required".to_string()));
        }
        if config.collection_name.trim().is_empty() {
            return Err(AppError::ConfigurationError(format!(
                "collectionName is required for {}",
                config.entity_name
            )));
        }

        inject_default_attributes(&mut config);

        config.entity_singular_name = match singularize(&config.entity_name) {
            Some(singular) => singular,
            None => format!("{}Item", config.entity_name),
        };
        if config.api_key.is_empty() {
            config.api_key = ID_FIELD.to_string();
        }

        tracing::info!(
            "Registered entity {} (collection {}, {} attributes)",
            config.entity_name,
            config.collection_name,
            config.attributes.len()
        );

        let entity = Entity { config: Arc::new(config), store };
        self.entities.insert(entity.name().to_string(), entity.clone());
        Ok(entity)
    }

    pub fn get(&self, name: &str) -> AppResult<&Entity> {
        self.entities
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("entity {} not found", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Check cross-entity references once every entity is registered
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for entity in self.entities.values() {
            for (name, spec) in &entity.config.attributes {
                if let AttributeKind::Ref { entity: target } = &spec.kind {
                    if !self.entities.contains_key(target) {
                        errors.push(format!(
                            "Entity {} has ref '{}' pointing to undefined entity {}",
                            entity.name(),
                            name,
                            target
                        ));
                    }
                }
            }
            for (name, join) in &entity.config.join_attributes {
                if !self.entities.contains_key(&join.entity) {
                    errors.push(format!(
                        "Entity {} has join '{}' pointing to undefined entity {}",
                        entity.name(),
                        name,
                        join.entity
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn inject_default_attributes(config: &mut EntityConfig) {
    let get = config.permissions.as_ref().and_then(|p| p.get.clone());
    let server_managed = Permissions {
        get,
        create: Some(PermissionRule::One(PermissionKind::System)),
        update: Some(PermissionRule::One(PermissionKind::System)),
        delete: None,
    };

    let defaults = [
        (ID_FIELD, AttributeKind::Id {}),
        (CREATED_AT_FIELD, AttributeKind::Number { min: None, max: None }),
        (UPDATED_AT_FIELD, AttributeKind::Number { min: None, max: None }),
    ];
    for (name, kind) in defaults {
        config
            .attributes
            .entry(name.to_string())
            .or_insert_with(|| AttributeSpec::new(kind).with_permissions(server_managed.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::{allowed, Action};
    use crate::schema::JoinSpec;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_register_injects_defaults() {
        let mut registry = Registry::new();
        let config = EntityConfig::new("posts", "posts")
            .with_permissions(Permissions::all(PermissionKind::Anyone));
        let entity = registry
            .register(config, Some(Arc::new(MemoryStore::new("posts"))))
            .unwrap();

        assert_eq!(entity.config.entity_singular_name, "post");
        assert_eq!(entity.config.api_key, "id");
        for field in ["id", "createdAt", "updatedAt"] {
            let spec = entity.attribute(field).unwrap();
            let perms = spec.permissions.as_ref();
            assert!(allowed(perms, Action::Get, None), "{}", field);
            assert!(!allowed(perms, Action::Create, Some("1")), "{}", field);
            assert!(!allowed(perms, Action::Update, Some("1")), "{}", field);
        }
        assert!(entity.store().is_ok());
    }

    #[test]
    fn test_register_keeps_declared_attributes() {
        let mut registry = Registry::new();
        let config: EntityConfig = serde_json::from_value(json!({
            "entityName": "staff",
            "collectionName": "staff",
            "apiKey": "slug",
            "attributes": { "id": { "type": "string" } }
        }))
        .unwrap();
        let entity = registry.register(config, None).unwrap();

        assert_eq!(
            entity.attribute("id").unwrap().kind,
            AttributeKind::String { max_length: None, hash: None }
        );
        assert_eq!(entity.config.entity_singular_name, "staffItem");
        assert_eq!(entity.config.api_key, "slug");
        assert!(matches!(entity.store(), Err(AppError::ConfigurationError(_))));
        // no entity-level get permission to inherit
        assert!(!allowed(entity.attribute("createdAt").unwrap().permissions.as_ref(), Action::Get, None));
    }

    #[test]
    fn test_register_requires_names() {
        let mut registry = Registry::new();
        let err = registry.register(EntityConfig::new("", "items"), None).unwrap_err();
        assert!(matches!(err, AppError::ConfigurationError(_)));
        let err = registry.register(EntityConfig::new("items", " "), None).unwrap_err();
        assert!(matches!(err, AppError::ConfigurationError(_)));
    }

    #[test]
    fn test_get_unknown_entity() {
        let registry = Registry::new();
        assert!(matches!(registry.get("ghosts"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_validate_references() {
        let mut registry = Registry::new();
        let config = EntityConfig::new("comments", "comments")
            .attribute("post", AttributeSpec::new(AttributeKind::Ref { entity: "posts".to_string() }))
            .join(
                "author",
                JoinSpec {
                    join_type: crate::schema::JoinType::FindOne,
                    entity: "users".to_string(),
                    query: Default::default(),
                },
            );
        registry.register(config, None).unwrap();

        let errors = registry.validate().unwrap_err();
        assert_eq!(errors.len(), 2);

        registry.register(EntityConfig::new("posts", "posts"), None).unwrap();
        registry.register(EntityConfig::new("users", "users"), None).unwrap();
        assert!(registry.validate().is_ok());
    }
}
