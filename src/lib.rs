// Entity Runtime - Declarative entities interpreted at request time

// Entity configuration surface
pub mod schema;

// Runtime core
pub mod attributes;
pub mod expression;
pub mod hooks;
pub mod joins;
pub mod permissions;
pub mod registry;

// Collaborators - storage, capabilities, request identity
pub mod capabilities;
pub mod context;
pub mod store;

// Application layer
pub mod app_state;
pub mod config;
pub mod http;
pub mod service;

// Common utilities
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult};
