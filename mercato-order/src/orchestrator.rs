use chrono::{DateTime, Utc};
use mercato_core::{
    DeliveryService, MarketError, MarketRepository, MarketResult, PaymentGateway, PaymentReceipt,
    UserContext,
};
use mercato_shared::{PurchaseDetails, Redacted};
use mercato_store::app_config::CheckoutConfig;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cart::{CartCheckout, ShoppingCart};

/// What the buyer gets back from a completed checkout.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseReceipt {
    pub buyer: String,
    pub total_price: f64,
    pub payment: PaymentReceipt,
    pub tracking_id: String,
    pub purchases: Vec<PurchaseDetails>,
    pub completed_at: DateTime<Utc>,
}

/// Sequences a cart checkout with its external side effects: pay, ship, persist, commit.
///
/// Any failure after stock was reserved gives every reservation back. Once the buyer has
/// paid, a later failure also refunds the payment, calls off the shipment and deletes
/// any purchase records already saved.
pub struct PurchaseOrchestrator {
    payment: Arc<dyn PaymentGateway>,
    delivery: Arc<dyn DeliveryService>,
    repository: Arc<dyn MarketRepository>,
    persist_purchases: bool,
}

impl PurchaseOrchestrator {
    pub fn new(
        payment: Arc<dyn PaymentGateway>,
        delivery: Arc<dyn DeliveryService>,
        repository: Arc<dyn MarketRepository>,
    ) -> Self {
        Self::with_config(payment, delivery, repository, &CheckoutConfig::default())
    }

    pub fn with_config(
        payment: Arc<dyn PaymentGateway>,
        delivery: Arc<dyn DeliveryService>,
        repository: Arc<dyn MarketRepository>,
        config: &CheckoutConfig,
    ) -> Self {
        Self {
            payment,
            delivery,
            repository,
            persist_purchases: config.persist_purchases,
        }
    }

    pub async fn checkout(
        &self,
        cart: &mut ShoppingCart,
        buyer: &UserContext,
        payment_details: &Redacted<String>,
        address: &Redacted<String>,
    ) -> MarketResult<PurchaseReceipt> {
        let mut checkout = cart.buy_products(buyer).await?;
        let total = checkout.total();

        let payment = match self.payment.pay(total, payment_details).await {
            Ok(receipt) => receipt,
            Err(e) => {
                error!("Payment of {:.2} for {} failed: {}", total, buyer.username, e);
                checkout.cancel().await?;
                return Err(MarketError::gateway("payment", e));
            }
        };

        let tracking_id = match self.delivery.deliver(&checkout.quantities(), address).await {
            Ok(tracking_id) => tracking_id,
            Err(e) => {
                error!("Delivery for {} failed: {}", buyer.username, e);
                self.refund(&payment, payment_details).await;
                checkout.cancel().await?;
                return Err(MarketError::gateway("delivery", e));
            }
        };

        let details = match self.persist(&checkout).await {
            Ok(details) => details,
            Err(err) => {
                self.cancel_delivery(&tracking_id).await;
                self.refund(&payment, payment_details).await;
                checkout.cancel().await?;
                return Err(err);
            }
        };
        checkout.commit(details.clone()).await?;
        self.save_stock(&checkout).await;

        let store_ids = checkout.store_ids();
        cart.delete_products_after_purchase(&store_ids).await;

        info!(
            "Purchase by {} completed in {} stores for {:.2}",
            buyer.username,
            store_ids.len(),
            total
        );
        Ok(PurchaseReceipt {
            buyer: buyer.username.clone(),
            total_price: total,
            payment,
            tracking_id,
            purchases: details,
            completed_at: Utc::now(),
        })
    }

    /// Save every record or none: records saved before a failing one are deleted again.
    async fn persist(&self, checkout: &CartCheckout) -> MarketResult<Vec<PurchaseDetails>> {
        let details = checkout.purchase_details()?;
        if !self.persist_purchases {
            return Ok(details);
        }
        for (saved, record) in details.iter().enumerate() {
            if let Err(e) = self.repository.save_purchase(record).await {
                error!("Could not persist purchase {}: {}", record.id(), e);
                for earlier in &details[..saved] {
                    if let Err(undo) = self.repository.remove_purchase(earlier.id()).await {
                        error!("Purchase {} stays saved: {}", earlier.id(), undo);
                    }
                }
                return Err(MarketError::persistence(e));
            }
        }
        Ok(details)
    }

    /// Stock levels after the sale. The sale stands even if this save fails.
    async fn save_stock(&self, checkout: &CartCheckout) {
        if !self.persist_purchases {
            return;
        }
        for store in checkout.checkouts().iter().map(|c| c.store()) {
            if let Err(e) = self.repository.save_store(&store.snapshot().await).await {
                warn!("Could not save stock of store {}: {}", store.id(), e);
            }
        }
    }

    /// Compensation only; the error that triggered it is what the caller sees.
    async fn refund(&self, receipt: &PaymentReceipt, payment_details: &Redacted<String>) {
        match self.payment.refund(receipt, payment_details).await {
            Ok(()) => info!("Refunded {:.2} ({})", receipt.amount, receipt.transaction_id),
            Err(e) => error!(
                "Refund of {:.2} ({}) failed: {}",
                receipt.amount, receipt.transaction_id, e
            ),
        }
    }

    async fn cancel_delivery(&self, tracking_id: &str) {
        if let Err(e) = self.delivery.cancel(tracking_id).await {
            warn!("Could not cancel shipment {}: {}", tracking_id, e);
        }
    }
}
