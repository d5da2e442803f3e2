// Expression Resolver - `{...}` templates and variable paths against the registry
// Paths: `user.<attr>`, `this.<attr>`, `this.<ref>.<attr>`

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::attributes::scalar_to_string;
use crate::error::{AppError, AppResult};
use crate::expression::parser::{self, Expr};
use crate::registry::Registry;
use crate::schema::{AttributeKind, AttributeSpec, USERS_ENTITY};
use crate::store::{number_value, Document, ID_FIELD};

/// A resolved variable path: where the value lives and what it is
#[derive(Debug, Clone, PartialEq)]
pub struct VariableRef {
    pub entity: String,
    pub id: Option<String>,
    pub key: String,
    pub attribute: AttributeSpec,
    pub value: Option<Value>,
}

#[derive(Clone)]
pub struct ExpressionResolver {
    registry: Arc<Registry>,
}

impl ExpressionResolver {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Resolve a configured value: strings are templates, anything else is literal
    pub async fn resolve_value(
        &self,
        value: &Value,
        entity_name: &str,
        model: &Document,
        auth_user_id: Option<&str>,
    ) -> AppResult<Value> {
        match value {
            Value::String(template) => {
                self.resolve_template(template, entity_name, model, auth_user_id).await
            }
            literal => Ok(literal.clone()),
        }
    }

    /// Resolve every `{...}` span of `template`. A template that is exactly
    /// one span yields the typed value; otherwise spans are substituted as text.
    pub async fn resolve_template(
        &self,
        template: &str,
        entity_name: &str,
        model: &Document,
        auth_user_id: Option<&str>,
    ) -> AppResult<Value> {
        let spans = find_spans(template);
        if spans.is_empty() {
            return Ok(Value::String(template.to_string()));
        }

        let trimmed = template.trim();
        if spans.len() == 1 && spans[0].outer == trimmed {
            return self.evaluate(spans[0].inner, entity_name, model, auth_user_id).await;
        }

        let mut composed = String::with_capacity(template.len());
        let mut rest = template;
        for span in &spans {
            let Some(at) = rest.find(span.outer) else {
                continue;
            };
            composed.push_str(&rest[..at]);
            let value = self.evaluate(span.inner, entity_name, model, auth_user_id).await?;
            composed.push_str(&display(&value));
            rest = &rest[at + span.outer.len()..];
        }
        composed.push_str(rest);

        Ok(Value::String(composed))
    }

    /// Evaluate one inner expression: a bare path yields its value as-is,
    /// anything else is arithmetic over the referenced values.
    pub async fn evaluate(
        &self,
        expression: &str,
        entity_name: &str,
        model: &Document,
        auth_user_id: Option<&str>,
    ) -> AppResult<Value> {
        let expr = parser::parse(expression).map_err(|e| {
            tracing::error!("Failed to parse expression '{}': {}", expression, e);
            evaluation_failed()
        })?;

        if let Expr::Path(path) = &expr {
            let variable = self.get_variable_data(path, entity_name, model, auth_user_id).await?;
            return Ok(variable.value.unwrap_or(Value::Null));
        }

        let mut variables = HashMap::new();
        for path in expr.paths() {
            let variable = self.get_variable_data(path, entity_name, model, auth_user_id).await?;
            variables.insert(path.to_string(), variable.value.unwrap_or(Value::Null));
        }

        let result = expr.evaluate(&variables).map_err(|e| {
            tracing::error!("Failed to evaluate expression '{}': {}", expression, e);
            evaluation_failed()
        })?;
        Ok(number_value(result))
    }

    /// Resolve a dotted variable path to its entity, id, attribute and value
    pub async fn get_variable_data(
        &self,
        path: &str,
        entity_name: &str,
        model: &Document,
        auth_user_id: Option<&str>,
    ) -> AppResult<VariableRef> {
        let segments: Vec<&str> = path.split('.').collect();

        match segments.as_slice() {
            ["user", key] => self.user_variable(path, key, auth_user_id).await,

            ["this", key] => {
                let entity = self.registry.get(entity_name)?;
                let attribute = entity.attribute(key).cloned().ok_or_else(|| invalid_variable(path))?;
                Ok(VariableRef {
                    entity: entity_name.to_string(),
                    id: model.get(ID_FIELD).and_then(scalar_to_string),
                    key: key.to_string(),
                    attribute,
                    value: model.get(*key).cloned(),
                })
            }

            ["this", ref_key, key] => {
                let entity = self.registry.get(entity_name)?;
                let ref_spec = entity.attribute(ref_key).ok_or_else(|| invalid_variable(path))?;
                let target_name = ref_spec.referenced_entity().ok_or_else(|| invalid_variable(path))?;
                let target = self.registry.get(target_name)?;
                let attribute = target.attribute(key).cloned().ok_or_else(|| invalid_variable(path))?;

                let ref_id = model.get(*ref_key).and_then(scalar_to_string);
                let value = match &ref_id {
                    Some(id) => target
                        .store()?
                        .find_one_by_id(id)
                        .await?
                        .and_then(|doc| doc.get(*key).cloned()),
                    None => None,
                };

                Ok(VariableRef {
                    entity: target_name.to_string(),
                    id: ref_id,
                    key: key.to_string(),
                    attribute,
                    value,
                })
            }

            _ => Err(invalid_variable(path)),
        }
    }

    async fn user_variable(
        &self,
        path: &str,
        key: &str,
        auth_user_id: Option<&str>,
    ) -> AppResult<VariableRef> {
        let users = self.registry.get(USERS_ENTITY).ok();

        if key == ID_FIELD {
            let attribute = users
                .and_then(|u| u.attribute(ID_FIELD).cloned())
                .unwrap_or_else(|| AttributeSpec::new(AttributeKind::Id {}));
            return Ok(VariableRef {
                entity: USERS_ENTITY.to_string(),
                id: auth_user_id.map(str::to_string),
                key: key.to_string(),
                attribute,
                value: auth_user_id.map(|id| Value::String(id.to_string())),
            });
        }

        let users = users.ok_or_else(|| invalid_variable(path))?;
        let attribute = users.attribute(key).cloned().ok_or_else(|| invalid_variable(path))?;
        let value = match auth_user_id {
            Some(id) => users
                .store()?
                .find_one_by_id(id)
                .await?
                .and_then(|doc| doc.get(key).cloned()),
            None => None,
        };

        Ok(VariableRef {
            entity: USERS_ENTITY.to_string(),
            id: auth_user_id.map(str::to_string),
            key: key.to_string(),
            attribute,
            value,
        })
    }
}

struct Span<'a> {
    outer: &'a str,
    inner: &'a str,
}

/// Non-greedy `{...}` spans; an unclosed brace is plain text
fn find_spans(template: &str) -> Vec<Span<'_>> {
    let mut spans = Vec::new();
    let mut offset = 0;

    while let Some(open) = template[offset..].find('{') {
        let start = offset + open;
        let Some(close) = template[start + 1..].find('}') else {
            break;
        };
        let end = start + 1 + close;
        spans.push(Span {
            outer: &template[start..=end],
            inner: &template[start + 1..end],
        });
        offset = end + 1;
    }

    spans
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
        scalar => scalar_to_string(scalar).unwrap_or_default(),
    }
}

fn invalid_variable(path: &str) -> AppError {
    tracing::error!("Invalid variable '{}' on entity config", path);
    AppError::Internal("invalid variable on config".to_string())
}

fn evaluation_failed() -> AppError {
    AppError::Internal("failed to evaluate expression".to_string())
}
