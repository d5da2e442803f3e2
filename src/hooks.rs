// Lifecycle Hook Engine - Declarative increment/set side effects around entity operations
// Hooks run in declared order, each one finishing before the next starts

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::attributes::{parse_model_attribute, to_number, NumberParse};
use crate::context::RequestContext;
use crate::error::{AppError, AppResult};
use crate::expression::ExpressionResolver;
use crate::schema::{Comparator, Condition, Hook, HookAction, Lifecycle};
use crate::store::Document;

/// Application-supplied callback run after the declarative hooks
#[async_trait]
pub trait CodeHook: Send + Sync {
    async fn run(&self, lifecycle: Lifecycle, model: &Document, ctx: &RequestContext) -> AppResult<()>;
}

#[derive(Clone)]
pub struct HookEngine {
    resolver: ExpressionResolver,
    code_hooks: HashMap<(String, Lifecycle), Arc<dyn CodeHook>>,
}

impl HookEngine {
    pub fn new(resolver: ExpressionResolver) -> Self {
        Self { resolver, code_hooks: HashMap::new() }
    }

    /// Install the code hook for one entity and lifecycle point, replacing any previous one
    pub fn register_code_hook(&mut self, entity: &str, lifecycle: Lifecycle, hook: Arc<dyn CodeHook>) {
        self.code_hooks.insert((entity.to_string(), lifecycle), hook);
    }

    pub fn resolver(&self) -> &ExpressionResolver {
        &self.resolver
    }

    /// Run the configured hooks of `entity_name` for `lifecycle`, then its code hook.
    /// The first failure aborts the chain; effects already applied stay applied.
    pub async fn run(
        &self,
        entity_name: &str,
        lifecycle: Lifecycle,
        model: &Document,
        ctx: &RequestContext,
    ) -> AppResult<()> {
        let entity = self.resolver.registry().get(entity_name)?;
        let hooks = entity.config.hooks_for(lifecycle);

        for (index, hook) in hooks.iter().enumerate() {
            tracing::debug!(
                "Running {} hook {} on {} ({})",
                lifecycle.as_str(),
                index,
                entity_name,
                hook.action.target()
            );
            self.run_hook(hook, entity_name, model, ctx).await?;
        }

        if let Some(code_hook) = self.code_hooks.get(&(entity_name.to_string(), lifecycle)) {
            code_hook.run(lifecycle, model, ctx).await?;
        }

        Ok(())
    }

    async fn run_hook(
        &self,
        hook: &Hook,
        entity_name: &str,
        model: &Document,
        ctx: &RequestContext,
    ) -> AppResult<()> {
        if let Some(condition) = &hook.condition {
            if !self.check_condition(condition, entity_name, model, ctx).await? {
                tracing::debug!("Hook condition not met on {}, skipping", entity_name);
                return Ok(());
            }
        }

        let user = ctx.user_id();
        match &hook.action {
            HookAction::Increment { target, value } => {
                let variable = self.resolver.get_variable_data(target, entity_name, model, user).await?;
                let Some(id) = variable.id.as_deref() else {
                    tracing::debug!("Increment target {} has no id, skipping", target);
                    return Ok(());
                };

                let resolved = self.resolver.resolve_value(value, entity_name, model, user).await?;
                let parsed = parse_model_attribute(&variable.attribute, &resolved)?;
                let delta = match to_number(Some(&parsed)) {
                    NumberParse::Number(n) => n,
                    NumberParse::Absent | NumberParse::NaN => {
                        tracing::error!("Increment value for {} is not numeric: {}", target, resolved);
                        return Err(AppError::Internal("hook increment value is not a number".to_string()));
                    }
                };

                let mut deltas = Map::new();
                deltas.insert(variable.key.clone(), crate::store::number_value(delta));
                let store = self.resolver.registry().get(&variable.entity)?.store()?;
                store.increment_one(id, &deltas).await?;
            }
            HookAction::Set { target, value } => {
                let variable = self.resolver.get_variable_data(target, entity_name, model, user).await?;
                let Some(id) = variable.id.as_deref() else {
                    tracing::debug!("Set target {} has no id, skipping", target);
                    return Ok(());
                };

                let resolved = self.resolver.resolve_value(value, entity_name, model, user).await?;
                let parsed = parse_model_attribute(&variable.attribute, &resolved)?;

                let mut partial = Map::new();
                partial.insert(variable.key.clone(), parsed);
                let store = self.resolver.registry().get(&variable.entity)?.store()?;
                store.update_one(id, &partial).await?;
            }
        }

        Ok(())
    }

    async fn check_condition(
        &self,
        condition: &Condition,
        entity_name: &str,
        model: &Document,
        ctx: &RequestContext,
    ) -> AppResult<bool> {
        let user = ctx.user_id();
        let left = self.resolver.resolve_value(&condition.left, entity_name, model, user).await?;
        let right = self.resolver.resolve_value(&condition.right, entity_name, model, user).await?;
        Ok(compare(&left, condition.comparator, &right))
    }
}

/// Compare two resolved values; numeric when both sides read as numbers
pub fn compare(left: &Value, comparator: Comparator, right: &Value) -> bool {
    let ordering = order(left, right);
    match comparator {
        Comparator::Equal => ordering == Some(Ordering::Equal),
        Comparator::NotEqual => ordering != Some(Ordering::Equal),
        Comparator::Greater => ordering == Some(Ordering::Greater),
        Comparator::Less => ordering == Some(Ordering::Less),
        Comparator::GreaterOrEqual => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        Comparator::LessOrEqual => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    if let (NumberParse::Number(l), NumberParse::Number(r)) = (numeric(left), numeric(right)) {
        return l.partial_cmp(&r);
    }
    match (left, right) {
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ if left == right => Some(Ordering::Equal),
        _ => None,
    }
}

// Strings only count as numbers when the other side decides numerically.
fn numeric(value: &Value) -> NumberParse {
    match value {
        Value::Number(_) | Value::String(_) => to_number(Some(value)),
        _ => NumberParse::NaN,
    }
}
