//! Storage selection and service wiring.

use std::sync::Arc;

use tracing::{info, warn};

use repairdesk_infra::store::{InMemoryStore, PostgresStore};
use repairdesk_infra::{AppConfig, BillingService, BillingStore, StoreResult};

/// Everything handlers reach through `Extension<Arc<AppServices>>`.
#[derive(Clone)]
pub struct AppServices {
    pub billing: BillingService,
}

impl AppServices {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { billing: BillingService::new(store) }
    }
}

/// PostgreSQL when `DATABASE_URL` is configured, otherwise in-memory.
pub async fn build_services(config: &AppConfig) -> StoreResult<AppServices> {
    let store: Arc<dyn BillingStore> = match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url, config.db_max_connections).await?;
            if config.run_migrations {
                store.run_migrations().await?;
            }
            info!("using PostgreSQL store");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory store (data is lost on restart)");
            Arc::new(InMemoryStore::new())
        }
    };
    Ok(AppServices::new(store))
}
