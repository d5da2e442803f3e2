// Entity Service - Generic controller over every registered entity
// Inbound: permission filter -> coercion -> hooks -> store
// Outbound: store -> permission projection -> join expansion

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::attributes::{get_model_attribute, parse_model_attribute, CoercionContext};
use crate::capabilities::Capabilities;
use crate::context::RequestContext;
use crate::error::{AppError, AppResult};
use crate::expression::ExpressionResolver;
use crate::hooks::{CodeHook, HookEngine};
use crate::joins::JoinResolver;
use crate::permissions::{allowed, Action};
use crate::registry::{Entity, Registry, CREATED_AT_FIELD, UPDATED_AT_FIELD};
use crate::schema::{AttributeKind, Lifecycle};
use crate::store::{is_valid_id, Document, Filter, ID_FIELD};

#[derive(Clone)]
pub struct EntityService {
    registry: Arc<Registry>,
    capabilities: Capabilities,
    hooks: HookEngine,
    joins: JoinResolver,
}

impl EntityService {
    pub fn new(registry: Arc<Registry>, capabilities: Capabilities) -> Self {
        let resolver = ExpressionResolver::new(registry.clone());
        Self {
            hooks: HookEngine::new(resolver.clone()),
            joins: JoinResolver::new(resolver),
            registry,
            capabilities,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn register_code_hook(&mut self, entity: &str, lifecycle: Lifecycle, hook: Arc<dyn CodeHook>) {
        self.hooks.register_code_hook(entity, lifecycle, hook);
    }

    pub async fn create(&self, entity_name: &str, input: &Value, ctx: &RequestContext) -> AppResult<Document> {
        let entity = self.registry.get(entity_name)?;
        ensure_allowed(entity, Action::Create, ctx)?;

        let data = permitted_input(entity, input, Action::Create, ctx)?;
        let coercion = CoercionContext::new(&self.registry, &self.capabilities).with_user(ctx.user_id());

        let mut doc = Document::new();
        for (key, spec) in &entity.config.attributes {
            if is_managed(key) {
                continue;
            }
            if let Some(value) = get_model_attribute(spec, key, &data, &coercion).await? {
                doc.insert(key.clone(), value);
            }
        }

        let now = Value::from(chrono::Utc::now().timestamp_millis());
        doc.insert(CREATED_AT_FIELD.to_string(), now.clone());
        doc.insert(UPDATED_AT_FIELD.to_string(), now);

        self.hooks.run(entity_name, Lifecycle::BeforeCreate, &doc, ctx).await?;
        let stored = entity.store()?.insert_one(doc).await?;
        let id = stored
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AppError::Internal("stored document has no id".to_string()))?;
        tracing::info!("Created {} {} ({})", entity.config.entity_singular_name, id, ctx.request_id);
        self.hooks.run(entity_name, Lifecycle::AfterCreate, &stored, ctx).await?;

        // after-hooks may have written to this document
        let current = load(entity, &id).await?;
        self.present(entity, current, ctx).await
    }

    pub async fn get(&self, entity_name: &str, id: &str, ctx: &RequestContext) -> AppResult<Document> {
        let entity = self.registry.get(entity_name)?;
        ensure_allowed(entity, Action::Get, ctx)?;

        let doc = load(entity, id).await?;
        self.hooks.run(entity_name, Lifecycle::BeforeGet, &doc, ctx).await?;
        let presented = self.present(entity, doc.clone(), ctx).await?;
        self.hooks.run(entity_name, Lifecycle::AfterGet, &doc, ctx).await?;
        Ok(presented)
    }

    /// Equality query; filter values are converted through the attribute types
    pub async fn find(&self, entity_name: &str, query: &Filter, ctx: &RequestContext) -> AppResult<Vec<Document>> {
        let entity = self.registry.get(entity_name)?;
        ensure_allowed(entity, Action::Get, ctx)?;

        let mut filter = Filter::new();
        for (key, value) in query {
            let spec = entity
                .attribute(key)
                .ok_or_else(|| AppError::BadRequest(format!("{} is not a known field", key)))?;
            if !field_allowed(spec.permissions.as_ref(), Action::Get, ctx) {
                return Err(AppError::BadRequest(format!("{} is not a known field", key)));
            }
            filter.insert(key.clone(), parse_model_attribute(spec, value)?);
        }

        let docs = entity.store()?.find(&filter).await?;
        let mut results = Vec::with_capacity(docs.len());
        for doc in docs {
            self.hooks.run(entity_name, Lifecycle::BeforeGet, &doc, ctx).await?;
            let presented = self.present(entity, doc.clone(), ctx).await?;
            self.hooks.run(entity_name, Lifecycle::AfterGet, &doc, ctx).await?;
            results.push(presented);
        }
        Ok(results)
    }

    /// Partial update: only provided fields (and slugs derived from them) are coerced
    pub async fn update(
        &self,
        entity_name: &str,
        id: &str,
        input: &Value,
        ctx: &RequestContext,
    ) -> AppResult<Document> {
        let entity = self.registry.get(entity_name)?;
        ensure_allowed(entity, Action::Update, ctx)?;

        let existing = load(entity, id).await?;
        let data = permitted_input(entity, input, Action::Update, ctx)?;
        let coercion = CoercionContext::new(&self.registry, &self.capabilities)
            .with_user(ctx.user_id())
            .ignoring_defaults();

        let mut partial = Document::new();
        for (key, spec) in &entity.config.attributes {
            if is_managed(key) {
                continue;
            }
            let touched = match &spec.kind {
                AttributeKind::Slug { set_from, .. } => data.contains_key(set_from),
                _ => data.contains_key(key),
            };
            if !touched {
                continue;
            }
            let value = get_model_attribute(spec, key, &data, &coercion).await?;
            partial.insert(key.clone(), value.unwrap_or(Value::Null));
        }
        partial.insert(
            UPDATED_AT_FIELD.to_string(),
            Value::from(chrono::Utc::now().timestamp_millis()),
        );

        let mut merged = existing;
        for (key, value) in &partial {
            merged.insert(key.clone(), value.clone());
        }

        self.hooks.run(entity_name, Lifecycle::BeforeUpdate, &merged, ctx).await?;
        let store = entity.store()?;
        if !store.update_one(id, &partial).await? {
            return Err(not_found(entity));
        }
        let updated = load(entity, id).await?;
        tracing::info!("Updated {} {} ({})", entity.config.entity_singular_name, id, ctx.request_id);
        self.hooks.run(entity_name, Lifecycle::AfterUpdate, &updated, ctx).await?;

        let current = load(entity, id).await?;
        self.present(entity, current, ctx).await
    }

    /// Delete and return the last visible state of the document
    pub async fn delete(&self, entity_name: &str, id: &str, ctx: &RequestContext) -> AppResult<Document> {
        let entity = self.registry.get(entity_name)?;
        ensure_allowed(entity, Action::Delete, ctx)?;

        let existing = load(entity, id).await?;
        self.hooks.run(entity_name, Lifecycle::BeforeDelete, &existing, ctx).await?;
        if !entity.store()?.delete_one(id).await? {
            return Err(not_found(entity));
        }
        tracing::info!("Deleted {} {} ({})", entity.config.entity_singular_name, id, ctx.request_id);
        self.hooks.run(entity_name, Lifecycle::AfterDelete, &existing, ctx).await?;

        Ok(project(entity, existing, ctx))
    }

    async fn present(&self, entity: &Entity, doc: Document, ctx: &RequestContext) -> AppResult<Document> {
        let mut presented = project(entity, doc.clone(), ctx);

        for (name, spec) in &entity.config.join_attributes {
            let joined = self.joins.resolve_join(spec, &doc, ctx.user_id()).await?;
            let target = self.registry.get(&spec.entity)?;
            let joined = match joined {
                Value::Object(found) => Value::Object(project(target, found, ctx)),
                Value::Array(found) => Value::Array(
                    found
                        .into_iter()
                        .map(|item| match item {
                            Value::Object(found) => Value::Object(project(target, found, ctx)),
                            other => other,
                        })
                        .collect(),
                ),
                other => other,
            };
            presented.insert(name.clone(), joined);
        }

        Ok(presented)
    }
}

fn ensure_allowed(entity: &Entity, action: Action, ctx: &RequestContext) -> AppResult<()> {
    if allowed(entity.config.permissions.as_ref(), action, ctx.user_id()) {
        Ok(())
    } else {
        tracing::warn!(
            "Denied {:?} on {} for {} ({})",
            action,
            entity.name(),
            ctx.user_id().unwrap_or("anonymous"),
            ctx.request_id
        );
        Err(AppError::Forbidden(format!("not allowed to {} {}", action.as_str(), entity.name())))
    }
}

// Attribute-level permissions narrow the entity decision; absent ones inherit it.
fn field_allowed(
    permissions: Option<&crate::permissions::Permissions>,
    action: Action,
    ctx: &RequestContext,
) -> bool {
    match permissions {
        Some(permissions) => allowed(Some(permissions), action, ctx.user_id()),
        None => true,
    }
}

/// Inbound fields the caller may write; unknown keys are dropped
fn permitted_input(entity: &Entity, input: &Value, action: Action, ctx: &RequestContext) -> AppResult<Document> {
    let Value::Object(fields) = input else {
        return Err(AppError::BadRequest("request body must be a JSON object".to_string()));
    };

    let mut data = Map::new();
    for (key, value) in fields {
        match entity.attribute(key) {
            Some(spec) if field_allowed(spec.permissions.as_ref(), action, ctx) => {
                data.insert(key.clone(), value.clone());
            }
            Some(_) => tracing::debug!("Dropping {} on {}: not permitted", key, entity.name()),
            None => tracing::debug!("Dropping unknown field {} on {}", key, entity.name()),
        }
    }
    Ok(data)
}

/// Outbound projection by attribute get permissions
fn project(entity: &Entity, doc: Document, ctx: &RequestContext) -> Document {
    doc.into_iter()
        .filter(|(key, _)| {
            entity
                .attribute(key)
                .is_some_and(|spec| field_allowed(spec.permissions.as_ref(), Action::Get, ctx))
        })
        .collect()
}

async fn load(entity: &Entity, id: &str) -> AppResult<Document> {
    if !is_valid_id(id) {
        return Err(not_found(entity));
    }
    entity
        .store()?
        .find_one_by_id(id)
        .await?
        .ok_or_else(|| not_found(entity))
}

fn not_found(entity: &Entity) -> AppError {
    AppError::NotFound(format!("{} not found", entity.config.entity_singular_name))
}

fn is_managed(key: &str) -> bool {
    key == ID_FIELD || key == CREATED_AT_FIELD || key == UPDATED_AT_FIELD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{Hasher, RandomStringGenerator};
    use crate::schema::{EntityConfig, HashAlgorithm};
    use crate::store::{DataAccess, MemoryStore};
    use async_trait::async_trait;
    use serde_json::json;

    struct FakeHasher;

    #[async_trait]
    impl Hasher for FakeHasher {
        async fn hash(&self, _: HashAlgorithm, value: &str, _: Option<u32>) -> AppResult<String> {
            Ok(format!("hashed:{}", value))
        }
    }

    struct FakeRandom;

    impl RandomStringGenerator for FakeRandom {
        fn generate(&self, chars: usize) -> String {
            "x".repeat(chars)
        }
    }

    fn config(value: Value) -> EntityConfig {
        serde_json::from_value(value).unwrap()
    }

    fn service() -> (EntityService, Arc<MemoryStore>, Arc<MemoryStore>) {
        let posts = Arc::new(MemoryStore::new("posts"));
        let categories = Arc::new(MemoryStore::new("categories").with_unique_fields(vec!["name".to_string()]));

        let mut registry = Registry::new();
        registry
            .register(
                config(json!({
                    "entityName": "posts",
                    "collectionName": "posts",
                    "permissions": { "get": "anyone", "create": "user", "update": "user", "delete": "user" },
                    "attributes": {
                        "title": { "type": "string", "required": true, "maxLength": 20 },
                        "slug": { "type": "slug", "setFrom": "title", "suffix": { "type": "random", "chars": 3 } },
                        "author": { "type": "user", "required": true },
                        "category": { "type": "ref", "entity": "categories" },
                        "status": { "type": "enum", "values": ["draft", "live"], "default": "draft" },
                        "secret": {
                            "type": "string",
                            "hash": { "algorithm": "bcrypt" },
                            "permissions": { "get": "nobody", "create": "user", "update": "user" }
                        }
                    },
                    "hooks": {
                        "afterCreate": [{ "action": "increment", "target": "this.category.posts", "value": 1 }],
                        "afterDelete": [{ "action": "increment", "target": "this.category.posts", "value": -1 }]
                    }
                })),
                Some(posts.clone()),
            )
            .unwrap();
        registry
            .register(
                config(json!({
                    "entityName": "categories",
                    "collectionName": "categories",
                    "permissions": { "get": "anyone", "create": "anyone" },
                    "attributes": {
                        "name": { "type": "string", "unique": true },
                        "posts": { "type": "number", "default": 0 }
                    },
                    "joinAttributes": {
                        "postList": { "type": "findMany", "entity": "posts", "query": { "category": "{this.id}" } }
                    }
                })),
                Some(categories.clone()),
            )
            .unwrap();

        let capabilities = Capabilities::new(Arc::new(FakeHasher), Arc::new(FakeRandom));
        (EntityService::new(Arc::new(registry), capabilities), posts, categories)
    }

    #[tokio::test]
    async fn test_create_flow() {
        let (service, _, _) = service();
        let ctx = RequestContext::authenticated("42");

        let category = service.create("categories", &json!({ "name": "rust" }), &ctx).await.unwrap();
        let category_id = category["id"].as_str().unwrap().to_string();

        let post = service
            .create(
                "posts",
                &json!({ "title": "  Hello World ", "category": category_id, "secret": "s3", "author": "1", "id": "7" }),
                &ctx,
            )
            .await
            .unwrap();

        assert_eq!(post["title"], json!("Hello World"));
        assert_eq!(post["slug"], json!("hello-world-xxx"));
        assert_eq!(post["author"], json!("42"));
        assert_eq!(post["status"], json!("draft"));
        assert!(post.get("secret").is_none());
        assert_ne!(post["id"], json!("7"));
        assert!(post["createdAt"].is_i64());

        // afterCreate hook bumped the category counter, the join lists the post
        let category = service.get("categories", &category_id, &ctx).await.unwrap();
        assert_eq!(category["posts"], json!(1));
        let listed = category["postList"].as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["title"], json!("Hello World"));
        assert!(listed[0].get("secret").is_none());
    }

    #[tokio::test]
    async fn test_create_requires_user() {
        let (service, posts, _) = service();
        let err = service
            .create("posts", &json!({ "title": "x" }), &RequestContext::anonymous())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(posts.is_empty().await);

        let err = service
            .create("posts", &json!({ "title": "" }), &RequestContext::authenticated("1"))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "title is required");
    }

    #[tokio::test]
    async fn test_hidden_field_stored_hashed() {
        let (service, posts, _) = service();
        let ctx = RequestContext::authenticated("1");
        let post = service.create("posts", &json!({ "title": "a", "secret": "pw" }), &ctx).await.unwrap();

        let stored = posts.find_one_by_id(post["id"].as_str().unwrap()).await.unwrap().unwrap();
        assert_eq!(stored["secret"], json!("hashed:pw"));

        let fetched = service.get("posts", post["id"].as_str().unwrap(), &RequestContext::anonymous()).await.unwrap();
        assert!(fetched.get("secret").is_none());
        assert_eq!(fetched["title"], json!("a"));
    }

    #[tokio::test]
    async fn test_update_is_partial() {
        let (service, _, _) = service();
        let ctx = RequestContext::authenticated("1");
        let post = service
            .create("posts", &json!({ "title": "first", "status": "live" }), &ctx)
            .await
            .unwrap();
        let id = post["id"].as_str().unwrap();

        let updated = service.update("posts", id, &json!({ "title": "Second Take" }), &ctx).await.unwrap();
        assert_eq!(updated["title"], json!("Second Take"));
        assert_eq!(updated["slug"], json!("second-take-xxx"));
        // untouched fields keep their values, defaults are not reapplied
        assert_eq!(updated["status"], json!("live"));
        assert_eq!(updated["createdAt"], post["createdAt"]);

        let err = service.update("posts", id, &json!({ "status": "gone" }), &ctx).await.unwrap_err();
        assert_eq!(err.message(), "status must be one of: draft, live");

        let err = service.update("posts", "999", &json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m == "post not found"));
    }

    #[tokio::test]
    async fn test_find_and_delete() {
        let (service, posts, categories) = service();
        let ctx = RequestContext::authenticated("1");
        let category = service.create("categories", &json!({ "name": "news" }), &ctx).await.unwrap();
        let category_id = category["id"].as_str().unwrap();

        let first = service
            .create("posts", &json!({ "title": "one", "category": category_id }), &ctx)
            .await
            .unwrap();
        service.create("posts", &json!({ "title": "two" }), &ctx).await.unwrap();

        let found = service.find("posts", &Map::new(), &ctx).await.unwrap();
        assert_eq!(found.len(), 2);
        let found = service
            .find("posts", json!({ "title": "one" }).as_object().unwrap(), &ctx)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(service
            .find("posts", json!({ "secret": "x" }).as_object().unwrap(), &ctx)
            .await
            .is_err());

        let found = service
            .find("categories", json!({ "posts": "1" }).as_object().unwrap(), &ctx)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        service.delete("posts", first["id"].as_str().unwrap(), &ctx).await.unwrap();
        assert_eq!(posts.len().await, 1);
        let category = categories.find_one_by_id(category_id).await.unwrap().unwrap();
        assert_eq!(category["posts"], json!(0));
    }

    #[tokio::test]
    async fn test_response_reflects_after_hooks() {
        let counters = Arc::new(MemoryStore::new("counters"));
        let mut registry = Registry::new();
        registry
            .register(
                config(json!({
                    "entityName": "counters",
                    "collectionName": "counters",
                    "permissions": { "get": "anyone", "create": "anyone", "update": "anyone" },
                    "attributes": {
                        "label": { "type": "string" },
                        "revision": { "type": "number", "default": 0 }
                    },
                    "hooks": {
                        "afterCreate": [{ "action": "increment", "target": "this.revision", "value": 1 }],
                        "afterUpdate": [{ "action": "increment", "target": "this.revision", "value": 1 }]
                    }
                })),
                Some(counters.clone()),
            )
            .unwrap();
        let service = EntityService::new(
            Arc::new(registry),
            Capabilities::new(Arc::new(FakeHasher), Arc::new(FakeRandom)),
        );
        let ctx = RequestContext::anonymous();

        let created = service.create("counters", &json!({ "label": "a" }), &ctx).await.unwrap();
        assert_eq!(created["revision"], json!(1));

        let id = created["id"].as_str().unwrap();
        let updated = service.update("counters", id, &json!({ "label": "b" }), &ctx).await.unwrap();
        assert_eq!(updated["label"], json!("b"));
        assert_eq!(updated["revision"], json!(2));

        let stored = counters.find_one_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored["revision"], json!(2));
    }

    #[tokio::test]
    async fn test_missing_entity_permission_denies() {
        let (service, _, _) = service();
        let ctx = RequestContext::authenticated("1");
        let category = service.create("categories", &json!({ "name": "a" }), &ctx).await.unwrap();

        let err = service
            .delete("categories", category["id"].as_str().unwrap(), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = service.create("categories", &json!({ "name": "a" }), &ctx).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateKey(_)));
    }
}
