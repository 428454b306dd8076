use chrono::{DateTime, Utc};
use mercato_core::MarketResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::inventory::ProductCatalog;
use crate::product::{Product, ProductEdit, ProductId, ProductLines};

/// Stock taken from one store by a successful [`ReservationEngine::check_and_acquire`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub store_id: Uuid,
    pub lines: ProductLines,
    pub reserved_at: DateTime<Utc>,
}

impl Reservation {
    pub fn quantities(&self) -> HashMap<ProductId, i32> {
        self.lines
            .iter()
            .map(|(id, line)| (*id, line.quantity))
            .collect()
    }

    pub fn total_quantity(&self) -> i32 {
        self.lines.values().map(|line| line.quantity).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Successful reservations and restores since the engine was built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReservationStats {
    pub reserved: u64,
    pub restored: u64,
}

/// Serializes all access to one store's catalog.
///
/// Every mutation holds the write lock for its whole duration. tokio's lock is fair, so
/// a queued writer is not starved by later readers.
pub struct ReservationEngine {
    store_id: Uuid,
    catalog: RwLock<ProductCatalog>,
    reserved: AtomicU64,
    restored: AtomicU64,
}

impl ReservationEngine {
    pub fn new(store_id: Uuid) -> Self {
        Self::with_catalog(store_id, ProductCatalog::new())
    }

    pub fn with_catalog(store_id: Uuid, catalog: ProductCatalog) -> Self {
        Self {
            store_id,
            catalog: RwLock::new(catalog),
            reserved: AtomicU64::new(0),
            restored: AtomicU64::new(0),
        }
    }

    pub async fn add_product(
        &self,
        name: &str,
        category: &str,
        price: f64,
        quantity: i32,
        keywords: Vec<String>,
    ) -> MarketResult<ProductId> {
        let mut catalog = self.catalog.write().await;
        catalog.add_product(name, category, price, quantity, keywords)
    }

    pub async fn remove_product(&self, product_id: &ProductId) -> MarketResult<i32> {
        self.catalog.write().await.remove_product(product_id)
    }

    pub async fn change_quantity(&self, product_id: &ProductId, quantity: i32) -> MarketResult<()> {
        self.catalog.write().await.change_quantity(product_id, quantity)
    }

    pub async fn set_product_name(&self, product_id: &ProductId, name: &str) -> MarketResult<()> {
        self.catalog.write().await.set_product_name(product_id, name)
    }

    pub async fn edit_product(&self, product_id: &ProductId, edit: ProductEdit) -> MarketResult<()> {
        self.catalog.write().await.edit_product(product_id, edit)
    }

    /// Reserve every requested line or none of them.
    pub async fn check_and_acquire(&self, requested: &[(ProductId, i32)]) -> MarketResult<Reservation> {
        let mut catalog = self.catalog.write().await;
        match catalog.acquire(requested) {
            Ok(lines) => {
                self.reserved.fetch_add(1, Ordering::Relaxed);
                debug!("Reserved {} product lines in store {}", lines.len(), self.store_id);
                Ok(Reservation {
                    store_id: self.store_id,
                    lines,
                    reserved_at: Utc::now(),
                })
            }
            Err(err) => {
                warn!("Reservation in store {} failed: {}", self.store_id, err);
                Err(err)
            }
        }
    }

    /// Put back stock taken by an earlier reservation
    pub async fn restore(&self, acquired: &ProductLines) {
        self.catalog.write().await.restore(acquired);
        self.restored.fetch_add(1, Ordering::Relaxed);
        debug!("Restored {} product lines in store {}", acquired.len(), self.store_id);
    }

    pub async fn products(&self) -> Vec<Product> {
        self.catalog.read().await.products()
    }

    pub async fn product(&self, product_id: &ProductId) -> Option<Product> {
        self.catalog
            .read()
            .await
            .get(product_id)
            .map(|line| line.product.clone())
    }

    pub async fn quantity(&self, product_id: &ProductId) -> Option<i32> {
        self.catalog.read().await.quantity(product_id)
    }

    pub async fn contains(&self, product_id: &ProductId) -> bool {
        self.catalog.read().await.contains(product_id)
    }

    pub async fn has_enough(&self, product_id: &ProductId, quantity: i32) -> bool {
        self.catalog.read().await.has_enough(product_id, quantity)
    }

    pub async fn search(&self, keyword: &str) -> Vec<Product> {
        self.catalog.read().await.search(keyword)
    }

    pub fn stats(&self) -> ReservationStats {
        ReservationStats {
            reserved: self.reserved.load(Ordering::Relaxed),
            restored: self.restored.load(Ordering::Relaxed),
        }
    }

    /// Copy of the catalog taken under the read lock
    pub async fn snapshot(&self) -> ProductCatalog {
        self.catalog.read().await.clone()
    }
}
