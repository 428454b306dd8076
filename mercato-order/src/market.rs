use mercato_core::{DeliveryService, MarketError, MarketRepository, MarketResult, PaymentGateway};
use mercato_store::{telemetry, Config, StoreManagement, StoreRegistry};
use std::sync::Arc;
use tracing::info;

use crate::cart::ShoppingCart;
use crate::orchestrator::PurchaseOrchestrator;

/// One marketplace: registry, staff entry point and checkout, wired from a [`Config`]
/// and sharing one repository.
pub struct Marketplace {
    config: Config,
    registry: Arc<StoreRegistry>,
    management: StoreManagement,
    orchestrator: PurchaseOrchestrator,
    repository: Arc<dyn MarketRepository>,
}

impl Marketplace {
    pub fn new(
        config: Config,
        payment: Arc<dyn PaymentGateway>,
        delivery: Arc<dyn DeliveryService>,
        repository: Arc<dyn MarketRepository>,
    ) -> Self {
        telemetry::init(&config.logging);
        let registry = Arc::new(StoreRegistry::with_config(config.notifications.clone()));
        let management = StoreManagement::with_repository(registry.clone(), repository.clone());
        let orchestrator = PurchaseOrchestrator::with_config(
            payment,
            delivery,
            repository.clone(),
            &config.checkout,
        );
        info!(
            "Marketplace ready (line cap {}, persist purchases: {})",
            config.checkout.max_line_quantity, config.checkout.persist_purchases
        );
        Self {
            config,
            registry,
            management,
            orchestrator,
            repository,
        }
    }

    /// Build from `config/*` files and `MERCATO__*` variables.
    pub fn from_env(
        payment: Arc<dyn PaymentGateway>,
        delivery: Arc<dyn DeliveryService>,
        repository: Arc<dyn MarketRepository>,
    ) -> MarketResult<Self> {
        let config = Config::load()
            .map_err(|e| MarketError::validation(format!("Invalid configuration: {}", e)))?;
        Ok(Self::new(config, payment, delivery, repository))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<StoreRegistry> {
        &self.registry
    }

    pub fn management(&self) -> &StoreManagement {
        &self.management
    }

    pub fn orchestrator(&self) -> &PurchaseOrchestrator {
        &self.orchestrator
    }

    /// `owner`'s cart, including bags saved in an earlier session.
    pub async fn cart(&self, owner: &str) -> MarketResult<ShoppingCart> {
        ShoppingCart::load(
            self.registry.clone(),
            &self.config.checkout,
            self.repository.clone(),
            owner,
        )
        .await
    }
}
