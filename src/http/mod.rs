// HTTP surface - axum router, request context middleware

pub mod middleware;
pub mod routes;

pub use middleware::{request_context_middleware, Ctx, USER_ID_HEADER};
pub use routes::create_entity_router;
