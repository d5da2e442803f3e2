use std::sync::Arc;

use crate::{
    capabilities::Capabilities,
    config::{load_entity_configs, Config},
    error::{AppError, AppResult},
    registry::Registry,
    schema::EntityConfig,
    service::EntityService,
    store::{sqlite::open_pool, DataAccess, DocumentIdGenerator, MemoryStore, SqliteDocumentStore},
};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<EntityService>,
}

impl AppState {
    pub fn new(service: EntityService) -> Self {
        Self { service: Arc::new(service) }
    }

    /// Load entity definitions and back every collection with the SQLite store
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let configs = load_entity_configs(&config.entities.dir)?;
        let pool = open_pool(&config.database.url).await?;
        let ids = Arc::new(DocumentIdGenerator::new(1));

        let registry = build_registry(configs, |entity| -> Arc<dyn DataAccess> {
            Arc::new(
                SqliteDocumentStore::new(pool.clone(), &entity.collection_name)
                    .with_unique_fields(entity.unique_fields())
                    .with_id_generator(ids.clone()),
            )
        })?;

        Ok(Self::new(EntityService::new(Arc::new(registry), Capabilities::default())))
    }
}

/// Register every entity with a store from `make_store`, then check cross references
pub fn build_registry<F>(configs: Vec<EntityConfig>, make_store: F) -> AppResult<Registry>
where
    F: Fn(&EntityConfig) -> Arc<dyn DataAccess>,
{
    let mut registry = Registry::new();
    for config in configs {
        let store = make_store(&config);
        registry.register(config, Some(store))?;
    }

    registry.validate().map_err(|errors| {
        for error in &errors {
            tracing::error!("{}", error);
        }
        AppError::ConfigurationError(errors.join("; "))
    })?;

    tracing::info!("Entity registry ready with {} entities", registry.entities().count());
    Ok(registry)
}

/// Registry backed by in-memory stores
pub fn memory_registry(configs: Vec<EntityConfig>) -> AppResult<Registry> {
    let ids = Arc::new(DocumentIdGenerator::new(1));
    build_registry(configs, |entity| -> Arc<dyn DataAccess> {
        Arc::new(
            MemoryStore::new(&entity.collection_name)
                .with_unique_fields(entity.unique_fields())
                .with_id_generator(ids.clone()),
        )
    })
}
