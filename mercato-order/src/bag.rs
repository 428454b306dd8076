use mercato_catalog::ProductId;
use mercato_core::{MarketError, MarketResult};
use mercato_shared::BagSnapshot;
use mercato_store::Store;
use std::sync::Arc;
use uuid::Uuid;

/// A shopper's staged products for one store, in the order they were added.
#[derive(Clone)]
pub struct ShoppingBag {
    store: Arc<Store>,
    lines: Vec<(ProductId, i32)>,
}

impl ShoppingBag {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            lines: Vec::new(),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn store_id(&self) -> Uuid {
        self.store.id()
    }

    pub fn add_product(&mut self, product_id: ProductId, quantity: i32) -> MarketResult<()> {
        validate_quantity(quantity)?;
        if self.quantity(&product_id).is_some() {
            return Err(MarketError::conflict(format!(
                "Product {} is already in the bag",
                product_id
            )));
        }
        self.lines.push((product_id, quantity));
        Ok(())
    }

    pub fn remove_product(&mut self, product_id: &ProductId) -> MarketResult<i32> {
        let index = self.position(product_id)?;
        Ok(self.lines.remove(index).1)
    }

    pub fn change_quantity(&mut self, product_id: &ProductId, quantity: i32) -> MarketResult<()> {
        validate_quantity(quantity)?;
        let index = self.position(product_id)?;
        self.lines[index].1 = quantity;
        Ok(())
    }

    pub fn quantity(&self, product_id: &ProductId) -> Option<i32> {
        self.lines
            .iter()
            .find(|(id, _)| id == product_id)
            .map(|(_, quantity)| *quantity)
    }

    pub fn lines(&self) -> &[(ProductId, i32)] {
        &self.lines
    }

    pub fn total_quantity(&self) -> i32 {
        self.lines.iter().map(|(_, quantity)| quantity).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn snapshot(&self, username: &str) -> BagSnapshot {
        BagSnapshot {
            username: username.to_string(),
            store_id: self.store.id(),
            lines: self.lines.iter().copied().collect(),
        }
    }

    fn position(&self, product_id: &ProductId) -> MarketResult<usize> {
        self.lines
            .iter()
            .position(|(id, _)| id == product_id)
            .ok_or_else(|| MarketError::not_found("Bag line", product_id))
    }
}

fn validate_quantity(quantity: i32) -> MarketResult<()> {
    if quantity <= 0 {
        return Err(MarketError::validation(format!(
            "Quantity must be positive, got {}",
            quantity
        )));
    }
    Ok(())
}
