use chrono::{DateTime, Utc};
use mercato_catalog::ProductId;
use mercato_core::{MarketError, MarketResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
    /// Used by a committed purchase; it no longer prices anything.
    Redeemed,
}

/// A buyer's proposed unit price for one product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: Uuid,
    pub store_id: Uuid,
    pub product_id: ProductId,
    pub product_name: String,
    pub username: String,
    pub price: f64,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
}

impl Offer {
    pub fn new(
        store_id: Uuid,
        product_id: ProductId,
        product_name: &str,
        username: &str,
        price: f64,
    ) -> MarketResult<Self> {
        if username.trim().is_empty() {
            return Err(MarketError::validation("Offer needs a buyer"));
        }
        if !price.is_finite() || price <= 0.0 {
            return Err(MarketError::validation(format!(
                "Offered price must be positive, got {}",
                price
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            store_id,
            product_id,
            product_name: product_name.to_string(),
            username: username.to_string(),
            price,
            status: OfferStatus::Pending,
            created_at: Utc::now(),
        })
    }

    /// Pending or accepted offers still count against the one-offer-per-product limit.
    pub fn is_open(&self) -> bool {
        matches!(self.status, OfferStatus::Pending | OfferStatus::Accepted)
    }
}

/// Offers made to one store, keyed by id.
#[derive(Debug, Default)]
pub struct OfferBook {
    offers: HashMap<Uuid, Offer>,
}

impl OfferBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// A buyer holds at most one open offer per product.
    pub fn place(&mut self, offer: Offer) -> MarketResult<Uuid> {
        let duplicate = self.offers.values().any(|existing| {
            existing.is_open()
                && existing.username == offer.username
                && existing.product_id == offer.product_id
        });
        if duplicate {
            return Err(MarketError::conflict(format!(
                "{} already has an open offer on {}",
                offer.username, offer.product_name
            )));
        }
        let id = offer.id;
        self.offers.insert(id, offer);
        Ok(id)
    }

    pub fn accept(&mut self, offer_id: Uuid) -> MarketResult<&Offer> {
        self.decide(offer_id, OfferStatus::Accepted)
    }

    pub fn reject(&mut self, offer_id: Uuid) -> MarketResult<&Offer> {
        self.decide(offer_id, OfferStatus::Rejected)
    }

    fn decide(&mut self, offer_id: Uuid, status: OfferStatus) -> MarketResult<&Offer> {
        let offer = self
            .offers
            .get_mut(&offer_id)
            .ok_or_else(|| MarketError::not_found("Offer", offer_id))?;
        if offer.status != OfferStatus::Pending {
            return Err(MarketError::conflict(format!(
                "Offer {} was already {:?}",
                offer_id, offer.status
            )));
        }
        offer.status = status;
        Ok(offer)
    }

    /// Unit price agreed with `username` for `product_id`, if any.
    pub fn accepted_price(&self, username: &str, product_id: &ProductId) -> Option<f64> {
        self.offers
            .values()
            .find(|offer| {
                offer.status == OfferStatus::Accepted
                    && offer.username == username
                    && offer.product_id == *product_id
            })
            .map(|offer| offer.price)
    }

    /// Mark the buyer's accepted offers on these products as used. Returns how many were.
    pub fn redeem(&mut self, username: &str, product_ids: &[ProductId]) -> usize {
        let mut redeemed = 0;
        for offer in self.offers.values_mut() {
            if offer.status == OfferStatus::Accepted
                && offer.username == username
                && product_ids.contains(&offer.product_id)
            {
                offer.status = OfferStatus::Redeemed;
                redeemed += 1;
            }
        }
        redeemed
    }

    /// Oldest first
    pub fn all(&self) -> Vec<Offer> {
        let mut offers: Vec<Offer> = self.offers.values().cloned().collect();
        offers.sort_by_key(|offer| offer.created_at);
        offers
    }

    pub fn len(&self) -> usize {
        self.offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }
}
