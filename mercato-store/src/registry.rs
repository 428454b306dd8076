use mercato_catalog::{Product, ProductId};
use mercato_core::{MarketError, MarketResult};
use mercato_shared::StoreSnapshot;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::app_config::NotificationConfig;
use crate::events::Publisher;
use crate::store::Store;

/// Owns every open store. Constructed once and shared through `Arc`.
pub struct StoreRegistry {
    stores: RwLock<HashMap<Uuid, Arc<Store>>>,
    notifications: NotificationConfig,
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::with_config(NotificationConfig::default())
    }

    pub fn with_config(notifications: NotificationConfig) -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
            notifications,
        }
    }

    /// Store names are unique across the marketplace.
    pub async fn open_store(&self, name: &str) -> MarketResult<Arc<Store>> {
        let store = Store::with_publisher(
            name,
            Publisher::new(self.notifications.channel_capacity),
        )?;
        self.insert(store).await
    }

    /// Re-open a store from a saved snapshot, keeping its id.
    pub async fn restore(&self, snapshot: &StoreSnapshot) -> MarketResult<Arc<Store>> {
        let store = Store::from_snapshot(
            snapshot,
            Publisher::new(self.notifications.channel_capacity),
        )?;
        self.insert(store).await
    }

    pub async fn insert(&self, store: Store) -> MarketResult<Arc<Store>> {
        let mut stores = self.stores.write().await;
        if stores.contains_key(&store.id()) {
            return Err(MarketError::conflict(format!(
                "Store {} is already registered",
                store.id()
            )));
        }
        if stores.values().any(|open| open.name() == store.name()) {
            return Err(MarketError::conflict(format!(
                "A store named {} already exists",
                store.name()
            )));
        }
        let store = Arc::new(store);
        stores.insert(store.id(), store.clone());
        info!("Opened store {} ({})", store.name(), store.id());
        Ok(store)
    }

    pub async fn get_store(&self, store_id: Uuid) -> MarketResult<Arc<Store>> {
        self.stores
            .read()
            .await
            .get(&store_id)
            .cloned()
            .ok_or_else(|| MarketError::not_found("Store", store_id))
    }

    pub async fn check_existence(&self, store_id: Uuid, product_id: ProductId) -> MarketResult<()> {
        let store = self.get_store(store_id).await?;
        if !store.contains_product(&product_id).await {
            return Err(MarketError::not_found("Product", product_id));
        }
        Ok(())
    }

    pub async fn contains_product(&self, store_id: Uuid, product_id: ProductId) -> bool {
        self.check_existence(store_id, product_id).await.is_ok()
    }

    pub async fn stores(&self) -> Vec<Arc<Store>> {
        self.stores.read().await.values().cloned().collect()
    }

    /// Matches across every store, tagged with the store they were found in.
    pub async fn search_products(&self, keyword: &str) -> Vec<(Uuid, Product)> {
        let mut found = Vec::new();
        for store in self.stores().await {
            for product in store.search_products(keyword).await {
                found.push((store.id(), product));
            }
        }
        found
    }

    pub async fn close_store(&self, store_id: Uuid) -> MarketResult<Arc<Store>> {
        let store = self
            .stores
            .write()
            .await
            .remove(&store_id)
            .ok_or_else(|| MarketError::not_found("Store", store_id))?;
        info!("Closed store {} ({})", store.name(), store_id);
        Ok(store)
    }
}
