use mercato_catalog::{ProductEdit, ProductId};
use mercato_core::{MarketError, MarketRepository, MarketResult, Permission, UserContext};
use mercato_policy::{
    Clause, CompositeKind, DecisionRule, DiscountSpec, DiscountView, DiscountWindow, PurchaseRule,
    RuleView, Target,
};
use mercato_shared::PurchaseDetails;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::offers::Offer;
use crate::registry::StoreRegistry;
use crate::store::Store;

/// Permission-checked entry point for store staff. Admins pass every check.
///
/// With a repository attached, every inventory change is followed by a save of the
/// store's snapshot. A failed save keeps the in-memory change and reports `Conflict`.
pub struct StoreManagement {
    registry: Arc<StoreRegistry>,
    repository: Option<Arc<dyn MarketRepository>>,
}

impl StoreManagement {
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        Self {
            registry,
            repository: None,
        }
    }

    pub fn with_repository(
        registry: Arc<StoreRegistry>,
        repository: Arc<dyn MarketRepository>,
    ) -> Self {
        Self {
            registry,
            repository: Some(repository),
        }
    }

    async fn persist(&self, store: &Store) -> MarketResult<()> {
        let Some(repository) = &self.repository else {
            return Ok(());
        };
        repository
            .save_store(&store.snapshot().await)
            .await
            .map_err(MarketError::persistence)?;
        debug!("Saved snapshot of store {}", store.id());
        Ok(())
    }

    /// Bring a saved store back into the registry. Policies, offers and history start empty.
    pub async fn load_store(&self, store_id: Uuid) -> MarketResult<Arc<Store>> {
        let repository = self
            .repository
            .as_ref()
            .ok_or_else(|| MarketError::not_found("Store", store_id))?;
        let snapshot = repository
            .load_store(store_id)
            .await
            .map_err(MarketError::persistence)?
            .ok_or_else(|| MarketError::not_found("Store", store_id))?;
        self.registry.restore(&snapshot).await
    }

    async fn authorize(
        &self,
        user: &UserContext,
        store_id: Uuid,
        permission: Permission,
    ) -> MarketResult<Arc<Store>> {
        if let Err(err) = user.require(store_id, permission) {
            warn!("{}", err);
            return Err(err);
        }
        self.registry.get_store(store_id).await
    }

    /// The opener becomes the store's owner.
    pub async fn open_store(&self, user: &mut UserContext, name: &str) -> MarketResult<Arc<Store>> {
        let store = self.registry.open_store(name).await?;
        user.grant_owner(store.id());
        self.persist(&store).await?;
        Ok(store)
    }

    /// Only owners (every permission) and admins may close a store.
    pub async fn close_store(&self, user: &UserContext, store_id: Uuid) -> MarketResult<()> {
        if !Permission::ALL.iter().all(|p| user.can(store_id, *p)) {
            return Err(MarketError::PermissionDenied(format!(
                "{} does not own store {}",
                user.username, store_id
            )));
        }
        self.registry.close_store(store_id).await.map(|_| ())
    }

    pub async fn add_product(
        &self,
        user: &UserContext,
        store_id: Uuid,
        name: &str,
        category: &str,
        price: f64,
        quantity: i32,
        keywords: Vec<String>,
    ) -> MarketResult<ProductId> {
        let store = self.authorize(user, store_id, Permission::ManageInventory).await?;
        let product_id = store
            .add_product(name, category, price, quantity, keywords)
            .await?;
        self.persist(&store).await?;
        Ok(product_id)
    }

    pub async fn remove_product(
        &self,
        user: &UserContext,
        store_id: Uuid,
        product_id: ProductId,
    ) -> MarketResult<i32> {
        let store = self.authorize(user, store_id, Permission::ManageInventory).await?;
        let removed = store.remove_product(&product_id).await?;
        self.persist(&store).await?;
        Ok(removed)
    }

    pub async fn change_product_quantity(
        &self,
        user: &UserContext,
        store_id: Uuid,
        product_id: ProductId,
        quantity: i32,
    ) -> MarketResult<()> {
        let store = self.authorize(user, store_id, Permission::ManageInventory).await?;
        store.change_product_quantity(&product_id, quantity).await?;
        self.persist(&store).await
    }

    pub async fn set_product_name(
        &self,
        user: &UserContext,
        store_id: Uuid,
        product_id: ProductId,
        name: &str,
    ) -> MarketResult<()> {
        let store = self.authorize(user, store_id, Permission::ManageInventory).await?;
        store.set_product_name(&product_id, name).await?;
        self.persist(&store).await
    }

    pub async fn edit_product_details(
        &self,
        user: &UserContext,
        store_id: Uuid,
        product_id: ProductId,
        edit: ProductEdit,
    ) -> MarketResult<()> {
        let store = self.authorize(user, store_id, Permission::ManageInventory).await?;
        store.edit_product_details(&product_id, edit).await?;
        self.persist(&store).await
    }

    // Offers are priced against inventory, so deciding them needs the inventory permission.

    pub async fn offers(&self, user: &UserContext, store_id: Uuid) -> MarketResult<Vec<Offer>> {
        Ok(self
            .authorize(user, store_id, Permission::ManageInventory)
            .await?
            .offers()
            .await)
    }

    pub async fn accept_offer(
        &self,
        user: &UserContext,
        store_id: Uuid,
        offer_id: Uuid,
    ) -> MarketResult<Offer> {
        self.authorize(user, store_id, Permission::ManageInventory)
            .await?
            .accept_offer(offer_id)
            .await
    }

    pub async fn reject_offer(
        &self,
        user: &UserContext,
        store_id: Uuid,
        offer_id: Uuid,
    ) -> MarketResult<Offer> {
        self.authorize(user, store_id, Permission::ManageInventory)
            .await?
            .reject_offer(offer_id)
            .await
    }

    pub async fn add_discount(
        &self,
        user: &UserContext,
        store_id: Uuid,
        spec: DiscountSpec,
        parent_id: Option<Uuid>,
        combine: Option<CompositeKind>,
    ) -> MarketResult<Uuid> {
        self.authorize(user, store_id, Permission::ManageDiscounts)
            .await?
            .add_discount(spec, parent_id, combine)
            .await
    }

    pub async fn remove_discount(
        &self,
        user: &UserContext,
        store_id: Uuid,
        discount_id: Uuid,
    ) -> MarketResult<()> {
        self.authorize(user, store_id, Permission::ManageDiscounts)
            .await?
            .remove_discount(discount_id)
            .await
    }

    pub async fn move_discount(
        &self,
        user: &UserContext,
        store_id: Uuid,
        discount_id: Uuid,
        new_parent_id: Uuid,
    ) -> MarketResult<()> {
        self.authorize(user, store_id, Permission::ManageDiscounts)
            .await?
            .move_discount(discount_id, new_parent_id)
            .await
    }

    pub async fn edit_simple_discount(
        &self,
        user: &UserContext,
        store_id: Uuid,
        discount_id: Uuid,
        percentage: Option<f64>,
        target: Option<Target>,
        window: Option<Option<DiscountWindow>>,
    ) -> MarketResult<()> {
        self.authorize(user, store_id, Permission::ManageDiscounts)
            .await?
            .edit_simple_discount(discount_id, percentage, target, window)
            .await
    }

    pub async fn edit_complex_discount(
        &self,
        user: &UserContext,
        store_id: Uuid,
        discount_id: Uuid,
        kind: Option<CompositeKind>,
        decision_rule: Option<DecisionRule>,
    ) -> MarketResult<()> {
        self.authorize(user, store_id, Permission::ManageDiscounts)
            .await?
            .edit_complex_discount(discount_id, kind, decision_rule)
            .await
    }

    pub async fn discounts(&self, user: &UserContext, store_id: Uuid) -> MarketResult<DiscountView> {
        Ok(self
            .authorize(user, store_id, Permission::ManageDiscounts)
            .await?
            .discounts()
            .await)
    }

    /// Rules attached to a discount's conditions need the discount permission.
    fn rule_permission(discount_id: Option<Uuid>) -> Permission {
        match discount_id {
            Some(_) => Permission::ManageDiscounts,
            None => Permission::ManagePurchasePolicy,
        }
    }

    pub async fn add_purchase_rule(
        &self,
        user: &UserContext,
        store_id: Uuid,
        rule: PurchaseRule,
        parent_id: Option<Uuid>,
        clause: Option<Clause>,
        discount_id: Option<Uuid>,
    ) -> MarketResult<Uuid> {
        self.authorize(user, store_id, Self::rule_permission(discount_id))
            .await?
            .add_purchase_rule(rule, parent_id, clause, discount_id)
            .await
    }

    pub async fn remove_purchase_rule(
        &self,
        user: &UserContext,
        store_id: Uuid,
        rule_id: Uuid,
        discount_id: Option<Uuid>,
    ) -> MarketResult<()> {
        self.authorize(user, store_id, Self::rule_permission(discount_id))
            .await?
            .remove_purchase_rule(rule_id, discount_id)
            .await
    }

    pub async fn edit_purchase_rule(
        &self,
        user: &UserContext,
        store_id: Uuid,
        rule_id: Uuid,
        rule: PurchaseRule,
        discount_id: Option<Uuid>,
    ) -> MarketResult<()> {
        self.authorize(user, store_id, Self::rule_permission(discount_id))
            .await?
            .edit_purchase_rule(rule_id, rule, discount_id)
            .await
    }

    pub async fn move_purchase_rule(
        &self,
        user: &UserContext,
        store_id: Uuid,
        rule_id: Uuid,
        new_parent_id: Uuid,
        discount_id: Option<Uuid>,
    ) -> MarketResult<()> {
        self.authorize(user, store_id, Self::rule_permission(discount_id))
            .await?
            .move_purchase_rule(rule_id, new_parent_id, discount_id)
            .await
    }

    pub async fn purchase_rules(
        &self,
        user: &UserContext,
        store_id: Uuid,
        discount_id: Option<Uuid>,
    ) -> MarketResult<RuleView> {
        self.authorize(user, store_id, Self::rule_permission(discount_id))
            .await?
            .purchase_rules(discount_id)
            .await
    }

    pub async fn purchase_history(
        &self,
        user: &UserContext,
        store_id: Uuid,
    ) -> MarketResult<Vec<PurchaseDetails>> {
        Ok(self
            .authorize(user, store_id, Permission::ViewHistory)
            .await?
            .purchase_history()
            .await)
    }
}
