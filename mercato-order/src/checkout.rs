use mercato_catalog::{PriceBreakdown, ProductId, ProductLines, Reservation};
use mercato_core::{MarketError, MarketResult};
use mercato_shared::PurchaseDetails;
use mercato_store::Store;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutPhase {
    Pending,
    Reserved,
    PolicyChecked,
    Priced,
    Committed,
    Failed,
}

impl CheckoutPhase {
    pub fn can_transition_to(self, next: CheckoutPhase) -> bool {
        use CheckoutPhase::*;
        matches!(
            (self, next),
            (Pending, Reserved)
                | (Reserved, PolicyChecked)
                | (PolicyChecked, Priced)
                | (Priced, Committed)
                | (Pending | Reserved | PolicyChecked | Priced, Failed)
        )
    }
}

/// One store's part of a cart checkout.
///
/// Pending -> Reserved -> PolicyChecked -> Priced -> Committed. Failing after the
/// reservation puts the stock back.
pub struct StoreCheckout {
    store: Arc<Store>,
    phase: CheckoutPhase,
    reservation: Option<Reservation>,
    priced_lines: Option<ProductLines>,
    price: Option<PriceBreakdown>,
}

impl StoreCheckout {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            phase: CheckoutPhase::Pending,
            reservation: None,
            priced_lines: None,
            price: None,
        }
    }

    pub fn phase(&self) -> CheckoutPhase {
        self.phase
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn store_id(&self) -> Uuid {
        self.store.id()
    }

    pub fn reservation(&self) -> Option<&Reservation> {
        self.reservation.as_ref()
    }

    pub fn price(&self) -> Option<PriceBreakdown> {
        self.price
    }

    /// Final price once priced, zero before.
    pub fn total(&self) -> f64 {
        self.price.map(|price| price.total).unwrap_or(0.0)
    }

    fn ensure(&self, next: CheckoutPhase) -> MarketResult<()> {
        if self.phase.can_transition_to(next) {
            Ok(())
        } else {
            Err(MarketError::conflict(format!(
                "Invalid checkout transition from {:?} to {:?} in store {}",
                self.phase,
                next,
                self.store.id()
            )))
        }
    }

    fn reserved_lines(&self) -> MarketResult<&Reservation> {
        self.reservation
            .as_ref()
            .ok_or_else(|| MarketError::conflict("Checkout holds no reservation"))
    }

    pub async fn reserve(&mut self, requested: &[(ProductId, i32)]) -> MarketResult<()> {
        self.ensure(CheckoutPhase::Reserved)?;
        let reservation = self
            .store
            .check_and_acquire_available_products(requested)
            .await?;
        self.reservation = Some(reservation);
        self.phase = CheckoutPhase::Reserved;
        Ok(())
    }

    pub async fn check_policy(&mut self, buyer_age: u32) -> MarketResult<()> {
        self.ensure(CheckoutPhase::PolicyChecked)?;
        let reservation = self.reserved_lines()?;
        self.store
            .check_purchase(&reservation.lines, buyer_age)
            .await?;
        self.phase = CheckoutPhase::PolicyChecked;
        Ok(())
    }

    /// Prices the reserved lines for `buyer`, honouring their accepted offers.
    pub async fn apply_pricing(
        &mut self,
        buyer: &str,
        buyer_age: u32,
    ) -> MarketResult<PriceBreakdown> {
        self.ensure(CheckoutPhase::Priced)?;
        let reservation = self.reserved_lines()?;
        let (lines, price) = self.store.quote(buyer, &reservation.lines, buyer_age).await;
        self.priced_lines = Some(lines);
        self.price = Some(price);
        self.phase = CheckoutPhase::Priced;
        Ok(price)
    }

    /// Record of the sale this checkout would commit. Only available once priced.
    pub fn purchase_details(&self, buyer: &str) -> MarketResult<PurchaseDetails> {
        if self.phase != CheckoutPhase::Priced {
            return Err(MarketError::conflict(format!(
                "Checkout in store {} is {:?}, not priced",
                self.store.id(),
                self.phase
            )));
        }
        let lines = self
            .priced_lines
            .as_ref()
            .ok_or_else(|| MarketError::conflict("Checkout has not been priced"))?;
        Ok(self.store.purchase_details(buyer, lines, self.total()))
    }

    pub async fn commit(&mut self, details: PurchaseDetails) -> MarketResult<()> {
        self.ensure(CheckoutPhase::Committed)?;
        self.store.update_store_history(details).await?;
        self.phase = CheckoutPhase::Committed;
        Ok(())
    }

    /// Abandon the checkout, putting back anything reserved. Failing twice is a no-op.
    pub async fn fail(&mut self) -> MarketResult<()> {
        if self.phase == CheckoutPhase::Failed {
            return Ok(());
        }
        self.ensure(CheckoutPhase::Failed)?;
        if let Some(reservation) = self.reservation.take() {
            self.store.restore_products(&reservation.lines).await;
            debug!(
                "Released {} reserved units in store {}",
                reservation.total_quantity(),
                self.store.id()
            );
        }
        self.priced_lines = None;
        self.price = None;
        self.phase = CheckoutPhase::Failed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mercato_core::ErrorKind;

    async fn store_with_stock(quantity: i32) -> (Arc<Store>, ProductId) {
        let store = Arc::new(Store::new("Corner").unwrap());
        let id = store
            .add_product("Milk", "dairy", 2.5, quantity, vec![])
            .await
            .unwrap();
        (store, id)
    }

    #[test]
    fn test_transition_table() {
        use CheckoutPhase::*;
        assert!(Pending.can_transition_to(Reserved));
        assert!(Priced.can_transition_to(Committed));
        assert!(Reserved.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Priced));
        assert!(!Committed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Reserved));
    }

    #[tokio::test]
    async fn test_happy_path() {
        let (store, milk) = store_with_stock(5).await;
        let mut checkout = StoreCheckout::new(store.clone());

        checkout.reserve(&[(milk, 2)]).await.unwrap();
        assert_eq!(checkout.phase(), CheckoutPhase::Reserved);
        checkout.check_policy(30).await.unwrap();
        let price = checkout.apply_pricing("alice", 30).await.unwrap();
        assert_eq!(price.total, 5.0);

        let details = checkout.purchase_details("alice").unwrap();
        checkout.commit(details).await.unwrap();
        assert_eq!(checkout.phase(), CheckoutPhase::Committed);
        assert_eq!(store.quantity(&milk).await, Some(3));
        assert_eq!(store.purchase_history().await.len(), 1);

        let err = checkout.fail().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(store.quantity(&milk).await, Some(3));
    }

    #[tokio::test]
    async fn test_pricing_uses_buyers_accepted_offer() {
        let (store, milk) = store_with_stock(5).await;
        let offer = store.place_offer("alice", &milk, 2.0).await.unwrap();
        store.accept_offer(offer).await.unwrap();

        let mut checkout = StoreCheckout::new(store.clone());
        checkout.reserve(&[(milk, 2)]).await.unwrap();
        checkout.check_policy(30).await.unwrap();
        assert_eq!(checkout.apply_pricing("alice", 30).await.unwrap().total, 4.0);

        let details = checkout.purchase_details("alice").unwrap();
        assert_eq!(details.lines()[0].unit_price, 2.0);
        assert_eq!(details.total_price(), 4.0);

        let mut other = StoreCheckout::new(store);
        other.reserve(&[(milk, 1)]).await.unwrap();
        other.check_policy(30).await.unwrap();
        assert_eq!(other.apply_pricing("bob", 30).await.unwrap().total, 2.5);
    }

    #[tokio::test]
    async fn test_out_of_order_step_is_conflict() {
        let (store, _) = store_with_stock(5).await;
        let mut checkout = StoreCheckout::new(store);
        let err = checkout.apply_pricing("alice", 30).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(checkout.phase(), CheckoutPhase::Pending);
        assert!(checkout.purchase_details("alice").is_err());
    }

    #[tokio::test]
    async fn test_fail_restores_once() {
        let (store, milk) = store_with_stock(2).await;
        let mut checkout = StoreCheckout::new(store.clone());
        checkout.reserve(&[(milk, 2)]).await.unwrap();
        assert!(!store.contains_product(&milk).await);

        checkout.fail().await.unwrap();
        checkout.fail().await.unwrap();
        assert_eq!(checkout.phase(), CheckoutPhase::Failed);
        assert_eq!(store.quantity(&milk).await, Some(2));
        assert_eq!(checkout.total(), 0.0);
    }

    #[tokio::test]
    async fn test_failed_reservation_stays_pending() {
        let (store, milk) = store_with_stock(1).await;
        let mut checkout = StoreCheckout::new(store.clone());
        let err = checkout.reserve(&[(milk, 2)]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(checkout.phase(), CheckoutPhase::Pending);
        checkout.fail().await.unwrap();
        assert_eq!(store.quantity(&milk).await, Some(1));
    }
}
