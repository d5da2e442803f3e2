// Injected capabilities used during coercion: one-way hashing and random text
// Passed explicitly so tests can substitute deterministic fakes

use std::sync::Arc;

use async_trait::async_trait;
use rand::distr::Alphanumeric;
use rand::Rng;

use crate::error::{AppError, AppResult};
use crate::schema::HashAlgorithm;

const DEFAULT_SALT_ROUNDS: u32 = 10;

#[async_trait]
pub trait Hasher: Send + Sync {
    async fn hash(&self, algorithm: HashAlgorithm, value: &str, salt_rounds: Option<u32>) -> AppResult<String>;
}

pub trait RandomStringGenerator: Send + Sync {
    fn generate(&self, chars: usize) -> String;
}

/// bcrypt hashing on the blocking thread pool
#[derive(Debug, Default, Clone)]
pub struct BcryptHasher;

#[async_trait]
impl Hasher for BcryptHasher {
    async fn hash(&self, algorithm: HashAlgorithm, value: &str, salt_rounds: Option<u32>) -> AppResult<String> {
        match algorithm {
            HashAlgorithm::Bcrypt => {
                let value = value.to_string();
                let cost = salt_rounds.unwrap_or(DEFAULT_SALT_ROUNDS);
                tokio::task::spawn_blocking(move || bcrypt::hash(value, cost))
                    .await
                    .map_err(|e| AppError::Internal(format!("Hash task failed: {}", e)))?
                    .map_err(|e| AppError::Internal(format!("Failed to hash value: {}", e)))
            }
        }
    }
}

/// Alphanumeric strings from the thread-local RNG
#[derive(Debug, Default, Clone)]
pub struct AlphanumericGenerator;

impl RandomStringGenerator for AlphanumericGenerator {
    fn generate(&self, chars: usize) -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(chars)
            .map(char::from)
            .collect()
    }
}

/// Capability bundle handed to attribute coercion
#[derive(Clone)]
pub struct Capabilities {
    pub hasher: Arc<dyn Hasher>,
    pub random: Arc<dyn RandomStringGenerator>,
}

impl Capabilities {
    pub fn new(hasher: Arc<dyn Hasher>, random: Arc<dyn RandomStringGenerator>) -> Self {
        Self { hasher, random }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            hasher: Arc::new(BcryptHasher),
            random: Arc::new(AlphanumericGenerator),
        }
    }
}
