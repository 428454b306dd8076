use uuid::Uuid;

use crate::models::purchase::PurchaseDetails;

/// Published to store subscribers once a sale has been committed to history.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct PurchaseCompletedEvent {
    pub purchase_id: Uuid,
    pub store_id: Uuid,
    pub store_name: String,
    pub buyer: String,
    pub total_price: f64,
    pub item_count: i32,
    pub timestamp: i64,
}

impl PurchaseCompletedEvent {
    pub fn from_details(details: &PurchaseDetails) -> Self {
        Self {
            purchase_id: details.id(),
            store_id: details.store_id(),
            store_name: details.store_name().to_string(),
            buyer: details.buyer().to_string(),
            total_price: details.total_price(),
            item_count: details.lines().iter().map(|line| line.quantity).sum(),
            timestamp: details.purchased_at().timestamp(),
        }
    }

    /// Human readable message for observers that only want text.
    pub fn message(&self) -> String {
        let payload = serde_json::to_string(self).unwrap_or_default();
        format!("A purchase has been made in {}:\n{}", self.store_name, payload)
    }
}
