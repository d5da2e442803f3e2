//! Attribute type registry.
//!
//! [`get_model_attribute`] validates and converts one inbound field according
//! to its [`AttributeSpec`]: defaults, `required`, bounds, references and the
//! injected hashing / random-text capabilities. [`parse_model_attribute`] is
//! the pure conversion used for values that are already trusted.

mod coerce;
mod parse;

use serde_json::Value;

use crate::capabilities::Capabilities;
use crate::error::AppResult;
use crate::registry::Registry;
use crate::schema::AttributeSpec;
use crate::store::Document;

pub use coerce::slugify;
pub use parse::parse_model_attribute;
pub(crate) use parse::{scalar_to_string, to_number, NumberParse};

/// Everything coercion needs beyond the value itself
#[derive(Clone, Copy)]
pub struct CoercionContext<'a> {
    pub registry: &'a Registry,
    pub capabilities: &'a Capabilities,
    pub auth_user_id: Option<&'a str>,
    /// Leave absent values absent instead of applying defaults (updates)
    pub ignore_default: bool,
}

impl<'a> CoercionContext<'a> {
    pub fn new(registry: &'a Registry, capabilities: &'a Capabilities) -> Self {
        Self { registry, capabilities, auth_user_id: None, ignore_default: false }
    }

    pub fn with_user(mut self, auth_user_id: Option<&'a str>) -> Self {
        self.auth_user_id = auth_user_id;
        self
    }

    pub fn ignoring_defaults(mut self) -> Self {
        self.ignore_default = true;
        self
    }
}

/// Coerce `data[key]` through `spec`. `Ok(None)` means the field stays unset.
pub async fn get_model_attribute(
    spec: &AttributeSpec,
    key: &str,
    data: &Document,
    ctx: &CoercionContext<'_>,
) -> AppResult<Option<Value>> {
    coerce::coerce(spec, key, data.get(key), data, ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{Hasher, RandomStringGenerator};
    use crate::error::AppError;
    use crate::schema::{EntityConfig, HashAlgorithm};
    use crate::store::{DataAccess, MemoryStore};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct FakeRandom;

    impl RandomStringGenerator for FakeRandom {
        fn generate(&self, chars: usize) -> String {
            format!("RANDOM:{}", chars)
        }
    }

    struct FakeHasher;

    #[async_trait]
    impl Hasher for FakeHasher {
        async fn hash(&self, _algorithm: HashAlgorithm, value: &str, rounds: Option<u32>) -> AppResult<String> {
            Ok(format!("hashed:{}:{}", rounds.unwrap_or(0), value))
        }
    }

    fn capabilities() -> Capabilities {
        Capabilities::new(Arc::new(FakeHasher), Arc::new(FakeRandom))
    }

    fn spec(value: Value) -> AttributeSpec {
        serde_json::from_value(value).unwrap()
    }

    fn data(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    async fn run(spec_json: Value, key: &str, input: Value) -> AppResult<Option<Value>> {
        let registry = Registry::new();
        let caps = capabilities();
        let ctx = CoercionContext::new(&registry, &caps);
        get_model_attribute(&spec(spec_json), key, &data(input), &ctx).await
    }

    fn message(result: AppResult<Option<Value>>) -> String {
        result.unwrap_err().message()
    }

    #[tokio::test]
    async fn test_boolean() {
        let boolean = json!({ "type": "boolean" });
        assert_eq!(run(boolean.clone(), "key", json!({ "key": "true" })).await.unwrap(), Some(json!(true)));
        assert_eq!(run(boolean.clone(), "key", json!({ "key": "false" })).await.unwrap(), Some(json!(false)));
        assert_eq!(run(boolean.clone(), "key", json!({ "key": false })).await.unwrap(), Some(json!(false)));
        assert_eq!(run(boolean.clone(), "key", json!({})).await.unwrap(), None);
        assert_eq!(message(run(boolean, "key", json!({ "key": "yes" })).await), "key must be boolean");

        let required = json!({ "type": "boolean", "required": true });
        assert_eq!(message(run(required, "key", json!({})).await), "key is required");

        let defaulted = json!({ "type": "boolean", "required": true, "default": true });
        assert_eq!(run(defaulted, "key", json!({})).await.unwrap(), Some(json!(true)));
    }

    #[tokio::test]
    async fn test_number_bounds() {
        let number = json!({ "type": "number", "min": 1, "max": 10 });
        for v in [1, 5, 10] {
            assert_eq!(run(number.clone(), "n", json!({ "n": v })).await.unwrap(), Some(json!(v)));
        }
        assert_eq!(run(number.clone(), "n", json!({ "n": "7" })).await.unwrap(), Some(json!(7)));
        assert_eq!(message(run(number.clone(), "n", json!({ "n": 0 })).await), "n must be at least 1");
        assert_eq!(message(run(number.clone(), "n", json!({ "n": 10.5 })).await), "n must be at most 10");
        assert_eq!(message(run(number.clone(), "n", json!({ "n": true })).await), "n must be a number");
        assert_eq!(message(run(number, "n", json!({ "n": "abc" })).await), "n must be a number");
    }

    #[tokio::test]
    async fn test_string_length_and_hash() {
        let string = json!({ "type": "string", "maxLength": 5 });
        assert_eq!(run(string.clone(), "s", json!({ "s": "  abcde " })).await.unwrap(), Some(json!("abcde")));
        assert_eq!(
            message(run(string.clone(), "s", json!({ "s": "abcdef" })).await),
            "s must be at most 5 characters"
        );
        assert_eq!(run(string, "s", json!({ "s": "   " })).await.unwrap(), None);

        let required = json!({ "type": "string", "required": true });
        assert_eq!(message(run(required, "s", json!({ "s": " " })).await), "s is required");

        let hashed = json!({ "type": "string", "hash": { "algorithm": "bcrypt", "salt_rounds": 4 } });
        assert_eq!(
            run(hashed, "password", json!({ "password": " hunter2 " })).await.unwrap(),
            Some(json!("hashed:4:hunter2"))
        );
    }

    #[tokio::test]
    async fn test_email_and_enum() {
        let email = json!({ "type": "email" });
        assert_eq!(
            run(email.clone(), "email", json!({ "email": " a@b.co " })).await.unwrap(),
            Some(json!("a@b.co"))
        );
        assert_eq!(
            message(run(email.clone(), "email", json!({ "email": "nope" })).await),
            "email is not a valid email address"
        );
        assert_eq!(run(email, "email", json!({ "email": "" })).await.unwrap(), None);

        let colour = json!({ "type": "enum", "values": ["red", "green"] });
        assert_eq!(run(colour.clone(), "c", json!({ "c": "red" })).await.unwrap(), Some(json!("red")));
        assert_eq!(message(run(colour, "c", json!({ "c": "blue" })).await), "c must be one of: red, green");
    }

    #[tokio::test]
    async fn test_slug() {
        let slug = json!({ "type": "slug", "setFrom": "title" });
        assert_eq!(
            run(slug.clone(), "slug", json!({ "title": "  TEST  " })).await.unwrap(),
            Some(json!("test"))
        );
        assert_eq!(run(slug, "slug", json!({ "title": "" })).await.unwrap(), None);

        let prefixed = json!({ "type": "slug", "setFrom": "title", "prefix": { "type": "random", "chars": 8 } });
        assert_eq!(
            run(prefixed, "slug", json!({ "title": "  TEST  " })).await.unwrap(),
            Some(json!("RANDOM:8-test"))
        );

        let suffixed = json!({
            "type": "slug",
            "setFrom": "title",
            "suffix": { "type": "random", "chars": 4 },
            "default": "untitled"
        });
        assert_eq!(
            run(suffixed.clone(), "slug", json!({ "title": "Hello World" })).await.unwrap(),
            Some(json!("hello-world-RANDOM:4"))
        );
        assert_eq!(run(suffixed, "slug", json!({})).await.unwrap(), Some(json!("untitled")));
    }

    #[tokio::test]
    async fn test_list_reports_index() {
        let list = json!({ "type": "list", "listType": { "type": "number" }, "maxItems": 3 });
        assert_eq!(
            run(list.clone(), "scores", json!({ "scores": [1, "2"] })).await.unwrap(),
            Some(json!([1, 2]))
        );
        assert_eq!(
            message(run(list.clone(), "scores", json!({ "scores": [1, "x"] })).await),
            "scores index 1 must be a number"
        );
        assert_eq!(
            message(run(list.clone(), "scores", json!({ "scores": [1, 2, 3, 4] })).await),
            "scores cannot have more than 3 items"
        );
        assert_eq!(message(run(list, "scores", json!({ "scores": 1 })).await), "scores must be an array");
    }

    #[tokio::test]
    async fn test_map_prefixes_field() {
        let map = json!({
            "type": "map",
            "keyType": { "type": "string", "maxLength": 3 },
            "valueType": { "type": "number" }
        });
        assert_eq!(
            run(map.clone(), "stats", json!({ "stats": { "hp": "10" } })).await.unwrap(),
            Some(json!({ "hp": 10 }))
        );
        assert_eq!(
            message(run(map.clone(), "stats", json!({ "stats": { "hp": "x", "mana": 1 } })).await),
            "stats hp must be a number, stats mana must be at most 3 characters"
        );
        assert_eq!(message(run(map, "stats", json!({ "stats": [] })).await), "stats must be an object");
    }

    #[tokio::test]
    async fn test_user_uses_caller() {
        let registry = Registry::new();
        let caps = capabilities();
        let user = spec(json!({ "type": "user", "required": true }));

        let ctx = CoercionContext::new(&registry, &caps).with_user(Some("77"));
        let value = get_model_attribute(&user, "owner", &data(json!({ "owner": "99" })), &ctx).await;
        assert_eq!(value.unwrap(), Some(json!("77")));

        let anonymous = CoercionContext::new(&registry, &caps);
        let err = get_model_attribute(&user, "owner", &Document::new(), &anonymous).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_ref_lookup() {
        let store = Arc::new(MemoryStore::new("items"));
        let existing = store.insert_one(data(json!({ "name": "a" }))).await.unwrap();
        let mut registry = Registry::new();
        registry.register(EntityConfig::new("items", "items"), Some(store.clone())).unwrap();

        let caps = capabilities();
        let ctx = CoercionContext::new(&registry, &caps);
        let reference = spec(json!({ "type": "ref", "entity": "items" }));

        let id = existing["id"].clone();
        let found = get_model_attribute(&reference, "item", &data(json!({ "item": id })), &ctx).await;
        assert_eq!(found.unwrap(), Some(existing["id"].clone()));

        let err = get_model_attribute(&reference, "item", &data(json!({ "item": "12345" })), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m == "item not found"));

        let err = get_model_attribute(&reference, "item", &data(json!({ "item": "not-an-id" })), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m == "item is not a valid ID"));
    }

    #[tokio::test]
    async fn test_ignore_default() {
        let registry = Registry::new();
        let caps = capabilities();
        let ctx = CoercionContext::new(&registry, &caps).ignoring_defaults();
        let number = spec(json!({ "type": "number", "default": 3 }));
        assert_eq!(get_model_attribute(&number, "n", &Document::new(), &ctx).await.unwrap(), None);
    }
}
