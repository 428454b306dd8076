use mercato_catalog::{
    PriceBreakdown, Product, ProductCatalog, ProductEdit, ProductId, ProductLines, Reservation,
    ReservationEngine, ReservationStats,
};
use mercato_core::{MarketError, MarketResult};
use mercato_policy::{
    Clause, CompositeKind, DecisionRule, DiscountPolicy, DiscountSpec, DiscountView,
    DiscountWindow, PurchasePolicy, PurchaseRule, RuleView, Target,
};
use mercato_shared::{PurchaseCompletedEvent, PurchaseDetails, PurchasedLine, StoreSnapshot};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::Publisher;
use crate::offers::{Offer, OfferBook};

/// A store: its stock, discount and purchase policies, price offers and sales history.
///
/// Stock, each policy, the offer book and history sit behind separate locks, so recording
/// a sale never waits on a reservation in flight.
pub struct Store {
    id: Uuid,
    name: String,
    inventory: ReservationEngine,
    discounts: RwLock<DiscountPolicy>,
    purchase_policy: RwLock<PurchasePolicy>,
    offers: RwLock<OfferBook>,
    history: RwLock<Vec<PurchaseDetails>>,
    publisher: Publisher,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Store {
    pub fn new(name: &str) -> MarketResult<Self> {
        Self::with_publisher(name, Publisher::default())
    }

    pub fn with_publisher(name: &str, publisher: Publisher) -> MarketResult<Self> {
        Self::build(Uuid::new_v4(), name, ProductCatalog::new(), publisher)
    }

    /// Rebuild a store from persisted state. Policies, offers and history start empty.
    pub fn from_snapshot(snapshot: &StoreSnapshot, publisher: Publisher) -> MarketResult<Self> {
        let catalog = ProductCatalog::from_records(&snapshot.products)?;
        Self::build(snapshot.id, &snapshot.name, catalog, publisher)
    }

    fn build(
        id: Uuid,
        name: &str,
        catalog: ProductCatalog,
        publisher: Publisher,
    ) -> MarketResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MarketError::validation("Store name must not be empty"));
        }
        Ok(Self {
            id,
            name: name.to_string(),
            inventory: ReservationEngine::with_catalog(id, catalog),
            discounts: RwLock::new(DiscountPolicy::new()),
            purchase_policy: RwLock::new(PurchasePolicy::new()),
            offers: RwLock::new(OfferBook::new()),
            history: RwLock::new(Vec::new()),
            publisher,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            id: self.id,
            name: self.name.clone(),
            products: self.inventory.snapshot().await.records(),
        }
    }

    // --- inventory ---

    pub async fn add_product(
        &self,
        name: &str,
        category: &str,
        price: f64,
        quantity: i32,
        keywords: Vec<String>,
    ) -> MarketResult<ProductId> {
        let product_id = self
            .inventory
            .add_product(name, category, price, quantity, keywords)
            .await?;
        info!("Store {} listed {} ({}) x{}", self.name, name, product_id, quantity);
        Ok(product_id)
    }

    pub async fn remove_product(&self, product_id: &ProductId) -> MarketResult<i32> {
        let removed = self.inventory.remove_product(product_id).await?;
        info!("Store {} delisted product {}", self.name, product_id);
        Ok(removed)
    }

    pub async fn change_product_quantity(
        &self,
        product_id: &ProductId,
        quantity: i32,
    ) -> MarketResult<()> {
        self.inventory.change_quantity(product_id, quantity).await
    }

    pub async fn set_product_name(&self, product_id: &ProductId, name: &str) -> MarketResult<()> {
        self.inventory.set_product_name(product_id, name).await
    }

    pub async fn edit_product_details(
        &self,
        product_id: &ProductId,
        edit: ProductEdit,
    ) -> MarketResult<()> {
        self.inventory.edit_product(product_id, edit).await
    }

    pub async fn products(&self) -> Vec<Product> {
        self.inventory.products().await
    }

    pub async fn product(&self, product_id: &ProductId) -> Option<Product> {
        self.inventory.product(product_id).await
    }

    pub async fn contains_product(&self, product_id: &ProductId) -> bool {
        self.inventory.contains(product_id).await
    }

    pub async fn quantity(&self, product_id: &ProductId) -> Option<i32> {
        self.inventory.quantity(product_id).await
    }

    pub async fn has_enough(&self, product_id: &ProductId, quantity: i32) -> bool {
        self.inventory.has_enough(product_id, quantity).await
    }

    pub async fn search_products(&self, keyword: &str) -> Vec<Product> {
        self.inventory.search(keyword).await
    }

    // --- checkout pipeline ---

    pub async fn check_and_acquire_available_products(
        &self,
        requested: &[(ProductId, i32)],
    ) -> MarketResult<Reservation> {
        self.inventory.check_and_acquire(requested).await
    }

    /// Does not restore anything on rejection; the caller owns the reservation.
    pub async fn check_purchase(&self, lines: &ProductLines, buyer_age: u32) -> MarketResult<()> {
        let result = self
            .purchase_policy
            .read()
            .await
            .check_policy(lines, buyer_age);
        if let Err(err) = &result {
            warn!("Store {} rejected a purchase: {}", self.name, err);
        }
        result
    }

    /// Final price of `lines` after discounts, never below zero.
    pub async fn apply_discounts(&self, lines: &ProductLines, buyer_age: u32) -> f64 {
        self.price(lines, buyer_age).await.total
    }

    /// Amount the discount policy takes off `lines`, clamped to the subtotal.
    pub async fn discount_amount(&self, lines: &ProductLines, buyer_age: u32) -> f64 {
        self.price(lines, buyer_age).await.discount
    }

    pub async fn price(&self, lines: &ProductLines, buyer_age: u32) -> PriceBreakdown {
        let discount = self.discounts.read().await.apply_discount(lines, buyer_age);
        PriceBreakdown::for_lines(lines, discount)
    }

    /// `lines` with the buyer's accepted offers in place of the listed unit prices.
    pub async fn apply_offers(&self, buyer: &str, lines: &ProductLines) -> ProductLines {
        let offers = self.offers.read().await;
        let mut priced = lines.clone();
        for (product_id, line) in priced.iter_mut() {
            let Some(price) = offers.accepted_price(buyer, product_id) else {
                continue;
            };
            let edit = ProductEdit {
                price: Some(price),
                ..ProductEdit::default()
            };
            match line.product.edit_details(edit) {
                Ok(()) => debug!(
                    "Offer price {:.2} applies to {} for {}",
                    price, product_id, buyer
                ),
                Err(err) => warn!("Ignoring offer on {} for {}: {}", product_id, buyer, err),
            }
        }
        priced
    }

    /// Price for a named buyer: accepted offers set the unit prices, then discounts apply.
    /// Returns the repriced lines alongside the breakdown.
    pub async fn quote(
        &self,
        buyer: &str,
        lines: &ProductLines,
        buyer_age: u32,
    ) -> (ProductLines, PriceBreakdown) {
        let priced = self.apply_offers(buyer, lines).await;
        let price = self.price(&priced, buyer_age).await;
        (priced, price)
    }

    pub fn reservation_stats(&self) -> ReservationStats {
        self.inventory.stats()
    }

    pub async fn restore_products(&self, lines: &ProductLines) {
        self.inventory.restore(lines).await
    }

    /// Purchase record for `lines` sold to `buyer` at `total_price`.
    pub fn purchase_details(
        &self,
        buyer: &str,
        lines: &ProductLines,
        total_price: f64,
    ) -> PurchaseDetails {
        let mut purchased: Vec<PurchasedLine> = lines
            .values()
            .map(|line| PurchasedLine {
                product_id: line.product.id(),
                product_name: line.product.name().to_string(),
                unit_price: line.product.price(),
                quantity: line.quantity,
            })
            .collect();
        purchased.sort_by(|a, b| a.product_name.cmp(&b.product_name));
        PurchaseDetails::new(
            self.id,
            self.name.clone(),
            buyer.to_string(),
            purchased,
            total_price,
        )
    }

    /// Append a committed sale, use up the buyer's offers on it and tell subscribers.
    pub async fn update_store_history(&self, details: PurchaseDetails) -> MarketResult<()> {
        if details.store_id() != self.id {
            return Err(MarketError::conflict(format!(
                "Purchase {} belongs to store {}, not {}",
                details.id(),
                details.store_id(),
                self.id
            )));
        }
        let event = PurchaseCompletedEvent::from_details(&details);
        let product_ids: Vec<ProductId> =
            details.lines().iter().map(|line| line.product_id).collect();
        let redeemed = self
            .offers
            .write()
            .await
            .redeem(details.buyer(), &product_ids);
        if redeemed > 0 {
            debug!("Redeemed {} offers of {} in store {}", redeemed, details.buyer(), self.name);
        }
        self.history.write().await.push(details);
        info!(
            "Store {} recorded purchase {} by {} for {:.2}",
            self.name, event.purchase_id, event.buyer, event.total_price
        );
        self.publisher.notify_all(event);
        Ok(())
    }

    pub async fn purchase_history(&self) -> Vec<PurchaseDetails> {
        self.history.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PurchaseCompletedEvent> {
        self.publisher.subscribe()
    }

    // --- offers ---

    pub async fn place_offer(
        &self,
        buyer: &str,
        product_id: &ProductId,
        price: f64,
    ) -> MarketResult<Uuid> {
        let product = self
            .product(product_id)
            .await
            .ok_or_else(|| MarketError::not_found("Product", product_id))?;
        let offer = Offer::new(self.id, *product_id, product.name(), buyer, price)?;
        let offer_id = self.offers.write().await.place(offer)?;
        info!(
            "{} offered {:.2} for {} in store {}",
            buyer,
            price,
            product.name(),
            self.name
        );
        Ok(offer_id)
    }

    pub async fn accept_offer(&self, offer_id: Uuid) -> MarketResult<Offer> {
        let offer = self.offers.write().await.accept(offer_id)?.clone();
        info!("Store {} accepted offer {} from {}", self.name, offer_id, offer.username);
        Ok(offer)
    }

    pub async fn reject_offer(&self, offer_id: Uuid) -> MarketResult<Offer> {
        let offer = self.offers.write().await.reject(offer_id)?.clone();
        info!("Store {} rejected offer {} from {}", self.name, offer_id, offer.username);
        Ok(offer)
    }

    pub async fn offers(&self) -> Vec<Offer> {
        self.offers.read().await.all()
    }

    pub async fn offers_for(&self, buyer: &str) -> Vec<Offer> {
        let mut offers = self.offers().await;
        offers.retain(|offer| offer.username == buyer);
        offers
    }

    // --- discounts ---

    pub async fn add_discount(
        &self,
        spec: DiscountSpec,
        parent_id: Option<Uuid>,
        combine: Option<CompositeKind>,
    ) -> MarketResult<Uuid> {
        let id = self
            .discounts
            .write()
            .await
            .add_discount(spec, parent_id, combine)?;
        debug!("Store {} added discount {}", self.name, id);
        Ok(id)
    }

    pub async fn remove_discount(&self, discount_id: Uuid) -> MarketResult<()> {
        self.discounts.write().await.remove_discount(discount_id)
    }

    pub async fn move_discount(&self, discount_id: Uuid, new_parent_id: Uuid) -> MarketResult<()> {
        self.discounts
            .write()
            .await
            .move_discount(discount_id, new_parent_id)
    }

    pub async fn edit_simple_discount(
        &self,
        discount_id: Uuid,
        percentage: Option<f64>,
        target: Option<Target>,
        window: Option<Option<DiscountWindow>>,
    ) -> MarketResult<()> {
        self.discounts
            .write()
            .await
            .edit_simple_discount(discount_id, percentage, target, window)
    }

    pub async fn edit_complex_discount(
        &self,
        discount_id: Uuid,
        kind: Option<CompositeKind>,
        decision_rule: Option<DecisionRule>,
    ) -> MarketResult<()> {
        self.discounts
            .write()
            .await
            .edit_complex_discount(discount_id, kind, decision_rule)
    }

    pub async fn discounts(&self) -> DiscountView {
        self.discounts.read().await.discounts()
    }

    // --- purchase rules ---
    // `discount_id` routes the edit to that discount's own conditions instead of the
    // store-wide policy.

    pub async fn add_purchase_rule(
        &self,
        rule: PurchaseRule,
        parent_id: Option<Uuid>,
        clause: Option<Clause>,
        discount_id: Option<Uuid>,
    ) -> MarketResult<Uuid> {
        match discount_id {
            Some(discount_id) => self
                .discounts
                .write()
                .await
                .conditions_mut(discount_id)?
                .add_purchase_rule(rule, parent_id, clause),
            None => self
                .purchase_policy
                .write()
                .await
                .add_purchase_rule(rule, parent_id, clause),
        }
    }

    pub async fn remove_purchase_rule(
        &self,
        rule_id: Uuid,
        discount_id: Option<Uuid>,
    ) -> MarketResult<()> {
        match discount_id {
            Some(discount_id) => self
                .discounts
                .write()
                .await
                .conditions_mut(discount_id)?
                .remove_purchase_rule(rule_id),
            None => self.purchase_policy.write().await.remove_purchase_rule(rule_id),
        }
    }

    pub async fn edit_purchase_rule(
        &self,
        rule_id: Uuid,
        rule: PurchaseRule,
        discount_id: Option<Uuid>,
    ) -> MarketResult<()> {
        match discount_id {
            Some(discount_id) => self
                .discounts
                .write()
                .await
                .conditions_mut(discount_id)?
                .edit_purchase_rule(rule_id, rule),
            None => self
                .purchase_policy
                .write()
                .await
                .edit_purchase_rule(rule_id, rule),
        }
    }

    pub async fn move_purchase_rule(
        &self,
        rule_id: Uuid,
        new_parent_id: Uuid,
        discount_id: Option<Uuid>,
    ) -> MarketResult<()> {
        match discount_id {
            Some(discount_id) => self
                .discounts
                .write()
                .await
                .conditions_mut(discount_id)?
                .move_purchase_rule(rule_id, new_parent_id),
            None => self
                .purchase_policy
                .write()
                .await
                .move_purchase_rule(rule_id, new_parent_id),
        }
    }

    pub async fn purchase_rules(&self, discount_id: Option<Uuid>) -> MarketResult<RuleView> {
        match discount_id {
            Some(discount_id) => Ok(self.discounts.read().await.conditions(discount_id)?.rules()),
            None => Ok(self.purchase_policy.read().await.rules()),
        }
    }
}
