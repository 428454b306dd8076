use async_trait::async_trait;
use mercato_shared::{BagSnapshot, PurchaseDetails, StoreSnapshot};
use uuid::Uuid;

/// Persistence collaborator: load an aggregate by id, persist an aggregate.
#[async_trait]
pub trait MarketRepository: Send + Sync {
    async fn save_store(
        &self,
        snapshot: &StoreSnapshot,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn load_store(
        &self,
        id: Uuid,
    ) -> Result<Option<StoreSnapshot>, Box<dyn std::error::Error + Send + Sync>>;

    async fn save_bag(
        &self,
        bag: &BagSnapshot,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Every bag saved for `username`
    async fn load_bags(
        &self,
        username: &str,
    ) -> Result<Vec<BagSnapshot>, Box<dyn std::error::Error + Send + Sync>>;

    async fn remove_bag(
        &self,
        username: &str,
        store_id: Uuid,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn save_purchase(
        &self,
        details: &PurchaseDetails,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Undo a `save_purchase` whose checkout did not go through
    async fn remove_purchase(
        &self,
        purchase_id: Uuid,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn purchases_for_store(
        &self,
        store_id: Uuid,
    ) -> Result<Vec<PurchaseDetails>, Box<dyn std::error::Error + Send + Sync>>;
}
