use async_trait::async_trait;
use mercato_shared::Redacted;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

#[async_trait]
pub trait DeliveryService: Send + Sync {
    /// Ship the given products, returning a tracking reference
    async fn deliver(
        &self,
        product_ids_to_quantity: &HashMap<Uuid, i32>,
        address: &Redacted<String>,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;

    /// Call off a shipment that has not left yet
    async fn cancel(&self, tracking_id: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Default)]
pub struct MockDeliveryService {
    faulty: AtomicBool,
    undeliverable: Mutex<HashSet<String>>,
    shipments: Mutex<HashSet<String>>,
}

impl MockDeliveryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_faulty(&self, faulty: bool) {
        self.faulty.store(faulty, Ordering::SeqCst);
    }

    pub async fn block_address(&self, address: &str) {
        self.undeliverable.lock().await.insert(address.to_string());
    }

    /// Shipments delivered and not cancelled
    pub async fn active_shipments(&self) -> usize {
        self.shipments.lock().await.len()
    }
}

#[async_trait]
impl DeliveryService for MockDeliveryService {
    async fn deliver(
        &self,
        product_ids_to_quantity: &HashMap<Uuid, i32>,
        address: &Redacted<String>,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        if self.faulty.load(Ordering::SeqCst) {
            return Err("The delivery system is currently not working".into());
        }
        if self.undeliverable.lock().await.contains(address.expose()) {
            return Err("The client with this address cannot be delivered".into());
        }
        if product_ids_to_quantity.is_empty() {
            return Err("Nothing to deliver".into());
        }
        let tracking_id = format!("TRK-{}", Uuid::new_v4().simple());
        self.shipments.lock().await.insert(tracking_id.clone());
        Ok(tracking_id)
    }

    async fn cancel(&self, tracking_id: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.shipments.lock().await.remove(tracking_id) {
            Ok(())
        } else {
            Err(format!("No shipment with tracking id {}", tracking_id).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_delivery() {
        let service = MockDeliveryService::new();
        let parcel = HashMap::from([(Uuid::new_v4(), 2)]);

        let tracking = service.deliver(&parcel, &Redacted::from("1 Main St")).await.unwrap();
        assert!(tracking.starts_with("TRK-"));
        assert_eq!(service.active_shipments().await, 1);
        service.cancel(&tracking).await.unwrap();
        assert!(service.cancel(&tracking).await.is_err());
        assert_eq!(service.active_shipments().await, 0);

        service.block_address("Nowhere").await;
        assert!(service.deliver(&parcel, &Redacted::from("Nowhere")).await.is_err());
        assert!(service.deliver(&HashMap::new(), &Redacted::from("1 Main St")).await.is_err());

        service.set_faulty(true);
        assert!(service.deliver(&parcel, &Redacted::from("1 Main St")).await.is_err());
    }
}
