use crate::config::Config;
use crate::graphql::{build_schema, DirectorSchema, Services};
use director_core::context::default_tenant_loader;
use director_core::operation::{
    DatabaseScheduler, DisabledScheduler, OperationFinalizer, OperationStatusReader,
    ResourceRegistry, Scheduler,
};
use director_core::{ApplicationRepository, ResourceType, SqliteTransactioner, Transactioner};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub schema: DirectorSchema,
    pub status_reader: Arc<OperationStatusReader>,
    pub finalizer: Arc<OperationFinalizer>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        let transact: Arc<dyn Transactioner> = Arc::new(SqliteTransactioner::new(pool.clone()));
        let scheduler: Arc<dyn Scheduler> = if config.disable_async_mode {
            Arc::new(DisabledScheduler)
        } else {
            Arc::new(DatabaseScheduler)
        };

        let schema = build_schema(
            Services::new(transact.clone(), scheduler),
            config.director_url(),
        );
        let status_reader = OperationStatusReader::new(
            transact.clone(),
            Arc::new(ApplicationRepository::new()),
            default_tenant_loader(),
        );

        Self {
            pool,
            config: Arc::new(config),
            schema,
            status_reader: Arc::new(status_reader),
            finalizer: Arc::new(operation_finalizer(transact)),
        }
    }
}

/// Finalizer wired to every resource kind that supports asynchronous operations.
pub fn operation_finalizer(transact: Arc<dyn Transactioner>) -> OperationFinalizer {
    let applications = Arc::new(ApplicationRepository::new());
    let registry = ResourceRegistry::new()
        .with_updater(ResourceType::Application, applications.clone())
        .with_deleter(ResourceType::Application, applications);

    OperationFinalizer::new(transact, registry)
}
