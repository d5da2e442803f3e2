// Request context middleware and extractor
// Identity comes from the `x-user-id` header; token validation happens upstream

use axum::{
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::context::RequestContext;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Build the request's `RequestContext` and store it in the extensions
pub async fn request_context_middleware(mut request: Request, next: Next) -> Result<Response, StatusCode> {
    let ctx = match extract_user_id(request.headers())? {
        Some(user_id) => RequestContext::authenticated(user_id),
        None => RequestContext::anonymous(),
    };

    tracing::debug!(
        "{} {} as {} ({})",
        request.method(),
        request.uri().path(),
        ctx.user_id().unwrap_or("anonymous"),
        ctx.request_id
    );

    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

fn extract_user_id(headers: &HeaderMap) -> Result<Option<String>, StatusCode> {
    let Some(value) = headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };
    let user_id = value.to_str().map_err(|_| StatusCode::BAD_REQUEST)?.trim();
    if user_id.is_empty() {
        Ok(None)
    } else {
        Ok(Some(user_id.to_string()))
    }
}

/// Handler-side access to the context installed by the middleware
#[derive(Debug, Clone)]
pub struct Ctx(pub RequestContext);

impl std::ops::Deref for Ctx {
    type Target = RequestContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let ctx = parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .map(Ctx)
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR);

        async move { ctx }
    }
}
