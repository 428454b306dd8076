use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One product line of a committed sale, captured at purchase time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchasedLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: f64,
    pub quantity: i32,
}

/// Immutable record of a committed sale in one store.
///
/// Fields are only readable; a record is never changed once appended to a store's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseDetails {
    id: Uuid,
    store_id: Uuid,
    store_name: String,
    buyer: String,
    lines: Vec<PurchasedLine>,
    total_price: f64,
    purchased_at: DateTime<Utc>,
}

impl PurchaseDetails {
    pub fn new(
        store_id: Uuid,
        store_name: String,
        buyer: String,
        lines: Vec<PurchasedLine>,
        total_price: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            store_id,
            store_name,
            buyer,
            lines,
            total_price,
            purchased_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn store_id(&self) -> Uuid {
        self.store_id
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn buyer(&self) -> &str {
        &self.buyer
    }

    pub fn lines(&self) -> &[PurchasedLine] {
        &self.lines
    }

    pub fn total_price(&self) -> f64 {
        self.total_price
    }

    pub fn purchased_at(&self) -> DateTime<Utc> {
        self.purchased_at
    }

    /// Undiscounted value of the sale
    pub fn gross_price(&self) -> f64 {
        self.lines
            .iter()
            .map(|line| line.unit_price * line.quantity as f64)
            .sum()
    }
}
