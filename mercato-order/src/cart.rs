use mercato_catalog::ProductId;
use mercato_core::{MarketError, MarketRepository, MarketResult, UserContext};
use mercato_shared::PurchaseDetails;
use mercato_store::app_config::CheckoutConfig;
use mercato_store::StoreRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bag::ShoppingBag;
use crate::checkout::StoreCheckout;

/// Where a cart keeps its bags between sessions.
struct SavedBags {
    repository: Arc<dyn MarketRepository>,
    owner: String,
}

/// A shopper's bags, at most one per store.
///
/// With a repository attached, every bag edit is saved under the owner's name before it
/// counts. If the save fails, the edit is undone and the error is a `Conflict`.
pub struct ShoppingCart {
    registry: Arc<StoreRegistry>,
    bags: HashMap<Uuid, ShoppingBag>,
    max_line_quantity: i32,
    saved: Option<SavedBags>,
}

impl ShoppingCart {
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        Self::with_config(registry, &CheckoutConfig::default())
    }

    pub fn with_config(registry: Arc<StoreRegistry>, config: &CheckoutConfig) -> Self {
        Self {
            registry,
            bags: HashMap::new(),
            max_line_quantity: config.max_line_quantity,
            saved: None,
        }
    }

    pub fn with_repository(mut self, repository: Arc<dyn MarketRepository>, owner: &str) -> Self {
        self.saved = Some(SavedBags {
            repository,
            owner: owner.to_string(),
        });
        self
    }

    /// The owner's cart as last saved. Bags of stores that are no longer open, and lines
    /// whose product was delisted, are dropped.
    pub async fn load(
        registry: Arc<StoreRegistry>,
        config: &CheckoutConfig,
        repository: Arc<dyn MarketRepository>,
        owner: &str,
    ) -> MarketResult<Self> {
        let snapshots = repository
            .load_bags(owner)
            .await
            .map_err(MarketError::persistence)?;
        let mut cart = Self::with_config(registry, config).with_repository(repository, owner);

        for snapshot in snapshots {
            let store = match cart.registry.get_store(snapshot.store_id).await {
                Ok(store) => store,
                Err(err) => {
                    warn!("Skipping saved bag of {}: {}", owner, err);
                    continue;
                }
            };
            let mut bag = ShoppingBag::new(store.clone());
            for (product_id, quantity) in snapshot.lines {
                if store.contains_product(&product_id).await {
                    bag.add_product(product_id, quantity)?;
                }
            }
            if !bag.is_empty() {
                cart.bags.insert(snapshot.store_id, bag);
            }
        }
        Ok(cart)
    }

    fn check_quantity(&self, quantity: i32) -> MarketResult<()> {
        if quantity <= 0 {
            return Err(MarketError::validation(format!(
                "Quantity must be positive, got {}",
                quantity
            )));
        }
        if quantity > self.max_line_quantity {
            return Err(MarketError::validation(format!(
                "At most {} units of one product fit in a bag",
                self.max_line_quantity
            )));
        }
        Ok(())
    }

    pub async fn add_product(
        &mut self,
        store_id: Uuid,
        product_id: ProductId,
        quantity: i32,
    ) -> MarketResult<()> {
        self.check_quantity(quantity)?;
        self.registry.check_existence(store_id, product_id).await?;
        let previous = self.bags.get(&store_id).cloned();
        let mut bag = match &previous {
            Some(bag) => bag.clone(),
            None => ShoppingBag::new(self.registry.get_store(store_id).await?),
        };
        bag.add_product(product_id, quantity)?;
        self.bags.insert(store_id, bag);
        self.save_or_revert(store_id, previous).await
    }

    /// Emptied bags are dropped from the cart.
    pub async fn remove_product(
        &mut self,
        store_id: Uuid,
        product_id: ProductId,
    ) -> MarketResult<()> {
        let previous = self.bags.get(&store_id).cloned();
        let bag = self.bag_mut(store_id)?;
        bag.remove_product(&product_id)?;
        if bag.is_empty() {
            self.bags.remove(&store_id);
        }
        self.save_or_revert(store_id, previous).await
    }

    pub async fn change_product_quantity(
        &mut self,
        store_id: Uuid,
        product_id: ProductId,
        quantity: i32,
    ) -> MarketResult<()> {
        self.check_quantity(quantity)?;
        let previous = self.bags.get(&store_id).cloned();
        self.bag_mut(store_id)?
            .change_quantity(&product_id, quantity)?;
        self.save_or_revert(store_id, previous).await
    }

    /// Save the store's bag (or drop it once empty), putting `previous` back on failure.
    async fn save_or_revert(
        &mut self,
        store_id: Uuid,
        previous: Option<ShoppingBag>,
    ) -> MarketResult<()> {
        let Some(saved) = &self.saved else {
            return Ok(());
        };
        let result = match self.bags.get(&store_id) {
            Some(bag) => saved.repository.save_bag(&bag.snapshot(&saved.owner)).await,
            None => saved.repository.remove_bag(&saved.owner, store_id).await,
        };
        if let Err(e) = result {
            warn!("Could not save bag of {} in {}: {}", saved.owner, store_id, e);
            match previous {
                Some(bag) => self.bags.insert(store_id, bag),
                None => self.bags.remove(&store_id),
            };
            return Err(MarketError::persistence(e));
        }
        Ok(())
    }

    pub fn bag(&self, store_id: Uuid) -> Option<&ShoppingBag> {
        self.bags.get(&store_id)
    }

    pub fn bags(&self) -> impl Iterator<Item = &ShoppingBag> {
        self.bags.values()
    }

    pub fn is_empty(&self) -> bool {
        self.bags.is_empty()
    }

    fn bag_mut(&mut self, store_id: Uuid) -> MarketResult<&mut ShoppingBag> {
        self.bags
            .get_mut(&store_id)
            .ok_or_else(|| MarketError::not_found("Shopping bag", store_id))
    }

    /// Reserve, check and price every bag. On success the stock stays reserved until the
    /// returned checkout is committed or cancelled; bags are left untouched.
    pub async fn buy_products(&self, buyer: &UserContext) -> MarketResult<CartCheckout> {
        let bags: Vec<&ShoppingBag> = self.bags.values().collect();
        self.checkout_bags(bags, buyer).await
    }

    pub async fn buy_selected(
        &self,
        store_ids: &[Uuid],
        buyer: &UserContext,
    ) -> MarketResult<CartCheckout> {
        let bags = store_ids
            .iter()
            .map(|store_id| {
                self.bags
                    .get(store_id)
                    .ok_or_else(|| MarketError::not_found("Shopping bag", store_id))
            })
            .collect::<MarketResult<Vec<_>>>()?;
        self.checkout_bags(bags, buyer).await
    }

    async fn checkout_bags(
        &self,
        bags: Vec<&ShoppingBag>,
        buyer: &UserContext,
    ) -> MarketResult<CartCheckout> {
        if bags.is_empty() {
            return Err(MarketError::validation("Shopping cart is empty"));
        }

        let mut checkouts: Vec<StoreCheckout> = Vec::with_capacity(bags.len());
        for bag in bags {
            let mut checkout = StoreCheckout::new(bag.store().clone());
            if let Err(err) = run_checkout(&mut checkout, bag, buyer).await {
                warn!(
                    "Checkout for {} failed in store {}: {}",
                    buyer.username,
                    bag.store().name(),
                    err
                );
                checkout.fail().await?;
                for previous in checkouts.iter_mut() {
                    previous.fail().await?;
                }
                return Err(err);
            }
            checkouts.push(checkout);
        }

        let cart_checkout = CartCheckout {
            buyer: buyer.username.clone(),
            checkouts,
        };
        info!(
            "Reserved {} bags for {}, total {:.2}",
            cart_checkout.checkouts.len(),
            buyer.username,
            cart_checkout.total()
        );
        Ok(cart_checkout)
    }

    /// Drop the bags of stores whose purchase went through. Unknown ids are ignored.
    ///
    /// The sale has already happened, so a saved bag that cannot be removed is only logged.
    pub async fn delete_products_after_purchase(&mut self, store_ids: &[Uuid]) {
        for store_id in store_ids {
            if self.bags.remove(store_id).is_none() {
                continue;
            }
            if let Some(saved) = &self.saved {
                if let Err(e) = saved.repository.remove_bag(&saved.owner, *store_id).await {
                    warn!("Could not drop saved bag of {} in {}: {}", saved.owner, store_id, e);
                }
            }
        }
    }
}

async fn run_checkout(
    checkout: &mut StoreCheckout,
    bag: &ShoppingBag,
    buyer: &UserContext,
) -> MarketResult<()> {
    checkout.reserve(bag.lines()).await?;
    checkout.check_policy(buyer.age).await?;
    checkout.apply_pricing(&buyer.username, buyer.age).await?;
    Ok(())
}

/// Priced, reserved checkouts for every bag of a cart.
pub struct CartCheckout {
    buyer: String,
    checkouts: Vec<StoreCheckout>,
}

impl CartCheckout {
    pub fn buyer(&self) -> &str {
        &self.buyer
    }

    pub fn checkouts(&self) -> &[StoreCheckout] {
        &self.checkouts
    }

    pub fn store_ids(&self) -> Vec<Uuid> {
        self.checkouts.iter().map(|c| c.store_id()).collect()
    }

    pub fn total(&self) -> f64 {
        self.checkouts.iter().map(|c| c.total()).sum()
    }

    /// Reserved quantities across every store, as handed to delivery.
    pub fn quantities(&self) -> HashMap<ProductId, i32> {
        let mut merged = HashMap::new();
        for reservation in self.checkouts.iter().filter_map(|c| c.reservation()) {
            for (product_id, quantity) in reservation.quantities() {
                *merged.entry(product_id).or_insert(0) += quantity;
            }
        }
        merged
    }

    /// One record per store, in checkout order.
    pub fn purchase_details(&self) -> MarketResult<Vec<PurchaseDetails>> {
        self.checkouts
            .iter()
            .map(|c| c.purchase_details(&self.buyer))
            .collect()
    }

    /// Append each record to its store's history. `details` must come from
    /// [`CartCheckout::purchase_details`].
    pub async fn commit(&mut self, details: Vec<PurchaseDetails>) -> MarketResult<()> {
        if details.len() != self.checkouts.len() {
            return Err(MarketError::conflict(format!(
                "Expected {} purchase records, got {}",
                self.checkouts.len(),
                details.len()
            )));
        }
        for (checkout, details) in self.checkouts.iter_mut().zip(details) {
            checkout.commit(details).await?;
        }
        Ok(())
    }

    /// Give every reservation back, e.g. when payment is abandoned.
    pub async fn cancel(mut self) -> MarketResult<()> {
        for checkout in self.checkouts.iter_mut() {
            checkout.fail().await?;
        }
        info!("Cancelled checkout of {}", self.buyer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::CheckoutPhase;
    use mercato_core::ErrorKind;
    use mercato_store::InMemoryRepository;

    async fn registry_with_store() -> (Arc<StoreRegistry>, Uuid, ProductId) {
        let registry = Arc::new(StoreRegistry::new());
        let store = registry.open_store("Corner").await.unwrap();
        let milk = store
            .add_product("Milk", "dairy", 3.0, 10, vec![])
            .await
            .unwrap();
        (registry, store.id(), milk)
    }

    #[tokio::test]
    async fn test_add_product_checks_registry() {
        let (registry, store_id, milk) = registry_with_store().await;
        let mut cart = ShoppingCart::new(registry);

        let err = cart.add_product(store_id, milk, 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = cart
            .add_product(store_id, Uuid::new_v4(), 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = cart.add_product(Uuid::new_v4(), milk, 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(cart.is_empty());

        cart.add_product(store_id, milk, 2).await.unwrap();
        let err = cart.add_product(store_id, milk, 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(cart.bag(store_id).unwrap().quantity(&milk), Some(2));
    }

    #[tokio::test]
    async fn test_line_cap_from_config() {
        let (registry, store_id, milk) = registry_with_store().await;
        let config = CheckoutConfig {
            max_line_quantity: 3,
            ..CheckoutConfig::default()
        };
        let mut cart = ShoppingCart::with_config(registry, &config);
        let err = cart.add_product(store_id, milk, 4).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        cart.add_product(store_id, milk, 3).await.unwrap();
    }

    #[tokio::test]
    async fn test_edit_bags() {
        let (registry, store_id, milk) = registry_with_store().await;
        let mut cart = ShoppingCart::new(registry);
        assert_eq!(
            cart.change_product_quantity(store_id, milk, 1)
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );

        cart.add_product(store_id, milk, 2).await.unwrap();
        cart.change_product_quantity(store_id, milk, 7).await.unwrap();
        assert_eq!(cart.bag(store_id).unwrap().quantity(&milk), Some(7));

        cart.remove_product(store_id, milk).await.unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.bags().count(), 0);
    }

    #[tokio::test]
    async fn test_buy_then_cancel() {
        let (registry, store_id, milk) = registry_with_store().await;
        let store = registry.get_store(store_id).await.unwrap();
        let mut cart = ShoppingCart::new(registry);
        cart.add_product(store_id, milk, 4).await.unwrap();

        let buyer = UserContext::member("alice", 30);
        let checkout = cart.buy_products(&buyer).await.unwrap();
        assert_eq!(checkout.total(), 12.0);
        assert_eq!(checkout.checkouts()[0].phase(), CheckoutPhase::Priced);
        assert_eq!(checkout.quantities().get(&milk), Some(&4));
        assert_eq!(store.quantity(&milk).await, Some(6));
        assert!(!cart.is_empty());

        checkout.cancel().await.unwrap();
        assert_eq!(store.quantity(&milk).await, Some(10));
    }

    #[tokio::test]
    async fn test_empty_cart_and_missing_selection() {
        let (registry, store_id, _) = registry_with_store().await;
        let cart = ShoppingCart::new(registry);
        let buyer = UserContext::member("alice", 30);

        let err = cart.buy_products(&buyer).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = cart.buy_selected(&[store_id], &buyer).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_delete_after_purchase_is_idempotent() {
        let (registry, store_id, milk) = registry_with_store().await;
        let mut cart = ShoppingCart::new(registry);
        cart.add_product(store_id, milk, 1).await.unwrap();

        cart.delete_products_after_purchase(&[store_id]).await;
        cart.delete_products_after_purchase(&[store_id, Uuid::new_v4()]).await;
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn test_bags_are_saved_and_reloaded() {
        let (registry, store_id, milk) = registry_with_store().await;
        let store = registry.get_store(store_id).await.unwrap();
        let bread = store
            .add_product("Bread", "bakery", 2.0, 5, vec![])
            .await
            .unwrap();
        let repository = Arc::new(InMemoryRepository::new());
        let mut cart =
            ShoppingCart::new(registry.clone()).with_repository(repository.clone(), "alice");

        cart.add_product(store_id, milk, 2).await.unwrap();
        cart.add_product(store_id, bread, 1).await.unwrap();
        cart.change_product_quantity(store_id, milk, 5).await.unwrap();
        let saved = repository.bag("alice", store_id).await.unwrap();
        assert_eq!(saved.lines.get(&milk), Some(&5));
        assert_eq!(saved.lines.get(&bread), Some(&1));

        let reloaded = ShoppingCart::load(
            registry.clone(),
            &CheckoutConfig::default(),
            repository.clone(),
            "alice",
        )
        .await
        .unwrap();
        assert_eq!(reloaded.bag(store_id).unwrap().quantity(&milk), Some(5));
        assert_eq!(reloaded.bag(store_id).unwrap().total_quantity(), 6);

        cart.remove_product(store_id, milk).await.unwrap();
        cart.remove_product(store_id, bread).await.unwrap();
        assert_eq!(repository.bag("alice", store_id).await, None);
    }

    #[tokio::test]
    async fn test_failed_save_undoes_the_edit() {
        let (registry, store_id, milk) = registry_with_store().await;
        let repository = Arc::new(InMemoryRepository::new());
        let mut cart = ShoppingCart::new(registry).with_repository(repository.clone(), "alice");
        cart.add_product(store_id, milk, 2).await.unwrap();

        repository.set_failing(true);
        let err = cart
            .change_product_quantity(store_id, milk, 4)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(cart.bag(store_id).unwrap().quantity(&milk), Some(2));

        let err = cart.remove_product(store_id, milk).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(cart.bag(store_id).unwrap().quantity(&milk), Some(2));

        // the sale already went through, so cleanup proceeds anyway
        cart.delete_products_after_purchase(&[store_id]).await;
        assert!(cart.is_empty());
        repository.set_failing(false);
        assert!(repository.bag("alice", store_id).await.is_some());
    }
}
