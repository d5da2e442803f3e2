// Request Context - Per-request identity handed to hooks, permissions and coercion
// Built at the HTTP boundary and passed explicitly through every operation

use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    /// Authenticated caller, absent for anonymous requests
    pub auth_user_id: Option<String>,
    /// Original request payload, if any
    pub body: Option<Value>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self {
            request_id: format!("req-{}", Uuid::new_v4()),
            auth_user_id: None,
            body: None,
        }
    }

    pub fn authenticated(user_id: impl Into<String>) -> Self {
        Self {
            auth_user_id: Some(user_id.into()),
            ..Self::anonymous()
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn user_id(&self) -> Option<&str> {
        self.auth_user_id.as_deref()
    }
}
