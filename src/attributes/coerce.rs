// Attribute coercion - per-kind conversion, validation and defaults for
// inbound request data. Errors read "<field> <reason>".

use futures::future::{BoxFuture, FutureExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::attributes::parse::{scalar_to_string, to_number, NumberParse};
use crate::attributes::CoercionContext;
use crate::error::{AppError, AppResult};
use crate::schema::{AttributeKind, AttributeSpec, SlugAffix};
use crate::store::{is_valid_id, number_value, Document};

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .expect("email pattern is valid")
});

/// Coerce `raw` according to `spec`. `label` names the value in error
/// messages; `data` is the whole inbound document (slugs read siblings).
pub(crate) fn coerce<'a>(
    spec: &'a AttributeSpec,
    label: &'a str,
    raw: Option<&'a Value>,
    data: &'a Document,
    ctx: &'a CoercionContext<'a>,
) -> BoxFuture<'a, AppResult<Option<Value>>> {
    async move {
        let raw = raw.filter(|v| !v.is_null());

        match &spec.kind {
            AttributeKind::Boolean {} => match raw {
                None => absent(spec, label, ctx),
                Some(Value::Bool(b)) => Ok(Some(Value::Bool(*b))),
                Some(Value::String(s)) if s == "true" => Ok(Some(Value::Bool(true))),
                Some(Value::String(s)) if s == "false" => Ok(Some(Value::Bool(false))),
                Some(_) => Err(bad_request(label, "must be boolean")),
            },

            AttributeKind::Email {} => match raw {
                None => absent(spec, label, ctx),
                Some(Value::String(s)) => {
                    let email = s.trim();
                    if email.is_empty() {
                        absent(spec, label, ctx)
                    } else if EMAIL_PATTERN.is_match(email) {
                        Ok(Some(Value::String(email.to_string())))
                    } else {
                        Err(bad_request(label, "is not a valid email address"))
                    }
                }
                Some(_) => Err(bad_request(label, "is not a valid email address")),
            },

            AttributeKind::Enum { values } => match raw {
                None => absent(spec, label, ctx),
                Some(value) => match scalar_to_string(value) {
                    Some(s) if values.contains(&s) => Ok(Some(Value::String(s))),
                    _ => Err(bad_request(label, &format!("must be one of: {}", values.join(", ")))),
                },
            },

            AttributeKind::Number { min, max } => match to_number(raw) {
                NumberParse::Absent => absent(spec, label, ctx),
                NumberParse::NaN => Err(bad_request(label, "must be a number")),
                NumberParse::Number(n) => {
                    if let Some(min) = min {
                        if n < *min {
                            return Err(bad_request(label, &format!("must be at least {}", min)));
                        }
                    }
                    if let Some(max) = max {
                        if n > *max {
                            return Err(bad_request(label, &format!("must be at most {}", max)));
                        }
                    }
                    Ok(Some(number_value(n)))
                }
            },

            AttributeKind::String { max_length, hash } => {
                let text = match raw {
                    None => None,
                    Some(value) => Some(
                        scalar_to_string(value)
                            .ok_or_else(|| bad_request(label, "must be a string"))?,
                    ),
                };
                let text = text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
                let Some(text) = text else {
                    return absent(spec, label, ctx);
                };

                if let Some(max_length) = max_length {
                    if text.chars().count() > *max_length {
                        return Err(bad_request(
                            label,
                            &format!("must be at most {} characters", max_length),
                        ));
                    }
                }

                match hash {
                    Some(hash) => {
                        let hashed = ctx
                            .capabilities
                            .hasher
                            .hash(hash.algorithm, &text, hash.salt_rounds)
                            .await?;
                        Ok(Some(Value::String(hashed)))
                    }
                    None => Ok(Some(Value::String(text))),
                }
            }

            AttributeKind::Slug { set_from, prefix, suffix } => {
                let source = data.get(set_from).and_then(scalar_to_string).unwrap_or_default();
                let slug = slugify(&source);
                if slug.is_empty() {
                    return absent(spec, label, ctx);
                }

                let mut parts = Vec::with_capacity(3);
                if let Some(SlugAffix::Random { chars }) = prefix {
                    parts.push(ctx.capabilities.random.generate(*chars));
                }
                parts.push(slug);
                if let Some(SlugAffix::Random { chars }) = suffix {
                    parts.push(ctx.capabilities.random.generate(*chars));
                }
                Ok(Some(Value::String(parts.join("-"))))
            }

            AttributeKind::Ref { entity } => match raw {
                None => absent(spec, label, ctx),
                Some(value) => {
                    let id = scalar_to_string(value)
                        .filter(|id| is_valid_id(id))
                        .ok_or_else(|| bad_request(label, "is not a valid ID"))?;

                    let target = ctx.registry.get(entity)?;
                    match target.store()?.find_one_by_id(&id).await? {
                        Some(_) => Ok(Some(Value::String(id))),
                        None => Err(AppError::NotFound(format!("{} not found", label))),
                    }
                }
            },

            AttributeKind::User {} => match ctx.auth_user_id {
                Some(user_id) => Ok(Some(Value::String(user_id.to_string()))),
                None => absent(spec, label, ctx),
            },

            AttributeKind::List { list_type, max_items } => match raw {
                None => absent(spec, label, ctx),
                Some(Value::Array(items)) => {
                    if let Some(max_items) = max_items {
                        if items.len() > *max_items {
                            return Err(bad_request(
                                label,
                                &format!("cannot have more than {} items", max_items),
                            ));
                        }
                    }

                    let prefix = format!("{} ", label);
                    let mut coerced = Vec::with_capacity(items.len());
                    for (i, item) in items.iter().enumerate() {
                        let item_label = format!("index {}", i);
                        let value = coerce(list_type, &item_label, Some(item), data, ctx)
                            .await
                            .map_err(|e| e.prefixed(&prefix))?;
                        coerced.push(value.unwrap_or(Value::Null));
                    }
                    Ok(Some(Value::Array(coerced)))
                }
                Some(_) => Err(bad_request(label, "must be an array")),
            },

            AttributeKind::Map { key_type, value_type } => match raw {
                None => absent(spec, label, ctx),
                Some(Value::Object(entries)) => {
                    coerce_map(key_type, value_type, label, entries, data, ctx).await
                }
                Some(_) => Err(bad_request(label, "must be an object")),
            },

            AttributeKind::Id {} => Ok(raw.cloned()),
        }
    }
    .boxed()
}

async fn coerce_map(
    key_type: &AttributeSpec,
    value_type: &AttributeSpec,
    label: &str,
    entries: &Map<String, Value>,
    data: &Document,
    ctx: &CoercionContext<'_>,
) -> AppResult<Option<Value>> {
    let mut coerced = Map::new();
    let mut failures: Vec<AppError> = Vec::new();

    for (key, value) in entries {
        let key_value = Value::String(key.clone());
        let new_key = match coerce(key_type, key, Some(&key_value), data, ctx).await {
            Ok(Some(k)) => scalar_to_string(&k).unwrap_or_else(|| key.clone()),
            Ok(None) => key.clone(),
            Err(e) => {
                failures.push(check_client_error(e)?);
                continue;
            }
        };
        match coerce(value_type, key, Some(value), data, ctx).await {
            Ok(v) => {
                coerced.insert(new_key, v.unwrap_or(Value::Null));
            }
            Err(e) => failures.push(check_client_error(e)?),
        }
    }

    if failures.is_empty() {
        return Ok(Some(Value::Object(coerced)));
    }

    let prefix = format!("{} ", label);
    let message = failures
        .iter()
        .map(|e| format!("{}{}", prefix, e.message()))
        .collect::<Vec<_>>()
        .join(", ");
    if failures.iter().all(|e| matches!(e, AppError::NotFound(_))) {
        Err(AppError::NotFound(message))
    } else {
        Err(AppError::BadRequest(message))
    }
}

// Only client errors are aggregated; anything else aborts immediately.
fn check_client_error(err: AppError) -> AppResult<AppError> {
    match err {
        AppError::BadRequest(_) | AppError::NotFound(_) => Ok(err),
        other => Err(other),
    }
}

/// No usable value: fall back to the default, enforce `required`
fn absent(spec: &AttributeSpec, label: &str, ctx: &CoercionContext<'_>) -> AppResult<Option<Value>> {
    if !ctx.ignore_default {
        if let Some(default) = &spec.default {
            return Ok(Some(default.clone()));
        }
    }
    if spec.required {
        return Err(bad_request(label, "is required"));
    }
    Ok(None)
}

fn bad_request(label: &str, reason: &str) -> AppError {
    AppError::BadRequest(format!("{} {}", label, reason))
}

/// Lowercase, trim, and join whitespace-separated words with `-`
pub fn slugify(input: &str) -> String {
    input
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("  TEST  "), "test");
        assert_eq!(slugify("Hello   Big\tWorld"), "hello-big-world");
        assert_eq!(slugify("   "), "");
    }

    #[test]
    fn test_email_pattern() {
        assert!(EMAIL_PATTERN.is_match("jane.doe+tag@example.co.uk"));
        assert!(!EMAIL_PATTERN.is_match("jane@localhost"));
        assert!(!EMAIL_PATTERN.is_match("jane@@example.com"));
        assert!(!EMAIL_PATTERN.is_match("jane example@example.com"));
    }
}
