use async_trait::async_trait;
use mercato_core::MarketRepository;
use mercato_shared::{BagSnapshot, PurchaseDetails, StoreSnapshot};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Process-local [`MarketRepository`]. `set_failing(true)` makes every call error, and
/// `fail_purchases_after(n)` lets only `n` more purchase saves through.
#[derive(Default)]
pub struct InMemoryRepository {
    stores: RwLock<HashMap<Uuid, StoreSnapshot>>,
    bags: RwLock<HashMap<(String, Uuid), BagSnapshot>>,
    purchases: RwLock<Vec<PurchaseDetails>>,
    failing: AtomicBool,
    purchase_quota: Mutex<Option<usize>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn fail_purchases_after(&self, saves: usize) {
        *self.purchase_quota.lock().await = Some(saves);
    }

    pub async fn bag(&self, username: &str, store_id: Uuid) -> Option<BagSnapshot> {
        self.bags
            .read()
            .await
            .get(&(username.to_string(), store_id))
            .cloned()
    }

    pub async fn purchase_count(&self) -> usize {
        self.purchases.read().await.len()
    }

    fn check(&self, operation: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(format!("Repository unavailable during {}", operation).into());
        }
        Ok(())
    }
}

#[async_trait]
impl MarketRepository for InMemoryRepository {
    async fn save_store(
        &self,
        snapshot: &StoreSnapshot,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.check("save_store")?;
        self.stores.write().await.insert(snapshot.id, snapshot.clone());
        Ok(())
    }

    async fn load_store(
        &self,
        id: Uuid,
    ) -> Result<Option<StoreSnapshot>, Box<dyn std::error::Error + Send + Sync>> {
        self.check("load_store")?;
        Ok(self.stores.read().await.get(&id).cloned())
    }

    async fn save_bag(
        &self,
        bag: &BagSnapshot,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.check("save_bag")?;
        self.bags
            .write()
            .await
            .insert((bag.username.clone(), bag.store_id), bag.clone());
        Ok(())
    }

    async fn load_bags(
        &self,
        username: &str,
    ) -> Result<Vec<BagSnapshot>, Box<dyn std::error::Error + Send + Sync>> {
        self.check("load_bags")?;
        Ok(self
            .bags
            .read()
            .await
            .values()
            .filter(|bag| bag.username == username)
            .cloned()
            .collect())
    }

    async fn remove_bag(
        &self,
        username: &str,
        store_id: Uuid,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.check("remove_bag")?;
        self.bags
            .write()
            .await
            .remove(&(username.to_string(), store_id));
        Ok(())
    }

    async fn save_purchase(
        &self,
        details: &PurchaseDetails,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.check("save_purchase")?;
        if let Some(remaining) = self.purchase_quota.lock().await.as_mut() {
            if *remaining == 0 {
                return Err("Repository is out of space for purchases".into());
            }
            *remaining -= 1;
        }
        self.purchases.write().await.push(details.clone());
        Ok(())
    }

    async fn remove_purchase(
        &self,
        purchase_id: Uuid,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.check("remove_purchase")?;
        self.purchases
            .write()
            .await
            .retain(|details| details.id() != purchase_id);
        Ok(())
    }

    async fn purchases_for_store(
        &self,
        store_id: Uuid,
    ) -> Result<Vec<PurchaseDetails>, Box<dyn std::error::Error + Send + Sync>> {
        self.check("purchases_for_store")?;
        Ok(self
            .purchases
            .read()
            .await
            .iter()
            .filter(|details| details.store_id() == store_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_round_trip() {
        let repo = InMemoryRepository::new();
        let snapshot = StoreSnapshot {
            id: Uuid::new_v4(),
            name: "Corner".to_string(),
            products: vec![],
        };
        repo.save_store(&snapshot).await.unwrap();
        assert_eq!(repo.load_store(snapshot.id).await.unwrap(), Some(snapshot));
        assert_eq!(repo.load_store(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_bags_and_purchases() {
        let repo = InMemoryRepository::new();
        let store_id = Uuid::new_v4();
        let bag = BagSnapshot {
            username: "alice".to_string(),
            store_id,
            lines: HashMap::from([(Uuid::new_v4(), 2)]),
        };
        repo.save_bag(&bag).await.unwrap();
        assert_eq!(repo.bag("alice", store_id).await, Some(bag.clone()));
        assert_eq!(repo.load_bags("alice").await.unwrap(), vec![bag]);
        assert!(repo.load_bags("bob").await.unwrap().is_empty());
        repo.remove_bag("alice", store_id).await.unwrap();
        assert_eq!(repo.bag("alice", store_id).await, None);

        let details = PurchaseDetails::new(store_id, "Corner".into(), "alice".into(), vec![], 0.0);
        repo.save_purchase(&details).await.unwrap();
        assert_eq!(repo.purchases_for_store(store_id).await.unwrap(), vec![details.clone()]);
        assert!(repo.purchases_for_store(Uuid::new_v4()).await.unwrap().is_empty());

        repo.remove_purchase(details.id()).await.unwrap();
        assert_eq!(repo.purchase_count().await, 0);
    }

    #[tokio::test]
    async fn test_purchase_quota() {
        let repo = InMemoryRepository::new();
        repo.fail_purchases_after(1).await;
        let first = PurchaseDetails::new(Uuid::new_v4(), "A".into(), "bob".into(), vec![], 1.0);
        let second = PurchaseDetails::new(Uuid::new_v4(), "B".into(), "bob".into(), vec![], 1.0);

        repo.save_purchase(&first).await.unwrap();
        let err = repo.save_purchase(&second).await.unwrap_err();
        assert!(err.to_string().contains("out of space"));
        assert_eq!(repo.purchase_count().await, 1);
    }

    #[tokio::test]
    async fn test_failure_switch() {
        let repo = InMemoryRepository::new();
        repo.set_failing(true);
        let details = PurchaseDetails::new(Uuid::new_v4(), "Corner".into(), "bob".into(), vec![], 1.0);
        let err = repo.save_purchase(&details).await.unwrap_err();
        assert!(err.to_string().contains("save_purchase"));
        assert_eq!(repo.purchase_count().await, 0);

        repo.set_failing(false);
        repo.save_purchase(&details).await.unwrap();
        assert_eq!(repo.purchase_count().await, 1);
    }
}
