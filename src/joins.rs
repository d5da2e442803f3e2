// Join Resolver - Virtual relations evaluated at read time
// Query values are templates resolved against the joined entity

use serde_json::{Map, Value};

use crate::error::AppResult;
use crate::expression::ExpressionResolver;
use crate::schema::{JoinSpec, JoinType};
use crate::store::{Document, Filter};

#[derive(Clone)]
pub struct JoinResolver {
    resolver: ExpressionResolver,
}

impl JoinResolver {
    pub fn new(resolver: ExpressionResolver) -> Self {
        Self { resolver }
    }

    /// `findOne` yields the document or `null`, `findMany` an array in store order
    pub async fn resolve_join(
        &self,
        spec: &JoinSpec,
        model: &Document,
        auth_user_id: Option<&str>,
    ) -> AppResult<Value> {
        let filter = self.build_filter(spec, model, auth_user_id).await?;
        let store = self.resolver.registry().get(&spec.entity)?.store()?;

        tracing::debug!("Resolving {:?} join on {} with {:?}", spec.join_type, spec.entity, filter);

        match spec.join_type {
            JoinType::FindOne => Ok(store
                .find_one(&filter)
                .await?
                .map(Value::Object)
                .unwrap_or(Value::Null)),
            JoinType::FindMany => Ok(Value::Array(
                store.find(&filter).await?.into_iter().map(Value::Object).collect(),
            )),
        }
    }

    async fn build_filter(
        &self,
        spec: &JoinSpec,
        model: &Document,
        auth_user_id: Option<&str>,
    ) -> AppResult<Filter> {
        let mut filter = Map::new();
        for (key, value) in &spec.query {
            let resolved = self
                .resolver
                .resolve_value(value, &spec.entity, model, auth_user_id)
                .await?;
            filter.insert(key.clone(), resolved);
        }
        Ok(filter)
    }
}
