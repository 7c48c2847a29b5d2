use std::sync::Arc;

use axum::Router;
use db::DbHandle;
use runtime::{ConfigProvider, ConfigProviderExt};
use tracing::{debug, info};
use utoipa::OpenApi;

use crate::api::rest::routes::{self, ApiDoc};
use crate::config::MembershipConfig;
use crate::contract::client::MembershipApi;
use crate::domain::ports::{Clock, NotificationPort, SystemClock};
use crate::domain::repo::MembershipRepository;
use crate::domain::service::{ServiceConfig, Services};
use crate::gateways::local::MembershipLocalClient;
use crate::infra::storage::{self, SqlxMembershipRepository, SqlxNotificationSink};

pub const MODULE_NAME: &str = "membership";

/// Membership module: consent gate and billing cycle behind one REST surface
/// and one in-process client.
#[derive(Clone)]
pub struct Membership {
    config: MembershipConfig,
    services: Services,
}

impl Membership {
    /// Load `modules.membership`, migrate the schema and wire the SQLite
    /// adapters into the services.
    pub async fn init(provider: &dyn ConfigProvider, db: &DbHandle) -> anyhow::Result<Self> {
        info!("Initializing membership module");

        let cfg = Self::load_config(provider)?;
        debug!(
            "Loaded membership config: tax_rate_percent={}, plans={}, batch_token_set={}",
            cfg.tax_rate_percent,
            cfg.plans.len(),
            cfg.batch_token.is_some()
        );

        info!("Running membership database migrations");
        storage::migrate(db).await?;

        let repo = Arc::new(SqlxMembershipRepository::new(db));
        let notifier = Arc::new(SqlxNotificationSink::new(db));
        Self::with_parts(cfg, repo, notifier, Arc::new(SystemClock))
    }

    /// Parse and validate `modules.membership` without touching storage.
    pub fn validate_config(provider: &dyn ConfigProvider) -> anyhow::Result<()> {
        let cfg = Self::load_config(provider)?;
        ServiceConfig::from_config(&cfg)?;
        Ok(())
    }

    fn load_config(provider: &dyn ConfigProvider) -> anyhow::Result<MembershipConfig> {
        Ok(provider.module_config(MODULE_NAME)?)
    }

    /// Wire explicit adapters; used by `init` and by tests.
    pub fn with_parts(
        config: MembershipConfig,
        repo: Arc<dyn MembershipRepository>,
        notifier: Arc<dyn NotificationPort>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let service_config = ServiceConfig::from_config(&config)?;
        let services = Services::new(repo, notifier, clock, service_config);
        Ok(Self { config, services })
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// In-process client for other modules and the batch command.
    pub fn client(&self) -> Arc<dyn MembershipApi> {
        Arc::new(MembershipLocalClient::new(self.services.clone()))
    }

    pub fn register_rest(&self, router: Router) -> Router {
        info!("Registering membership REST routes");
        routes::register_routes(router, &self.services, self.config.batch_token.clone())
    }

    pub fn openapi() -> utoipa::openapi::OpenApi {
        ApiDoc::openapi()
    }
}
