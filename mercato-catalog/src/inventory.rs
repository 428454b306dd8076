use mercato_core::{MarketError, MarketResult};
use mercato_shared::ProductRecord;
use std::collections::HashMap;

use crate::product::{Product, ProductEdit, ProductId, ProductLines, StockLine};

/// One store's stock: product id to (product, quantity on hand).
///
/// Plain data, no locking. A product whose stock is fully reserved is removed from the map;
/// [`ProductCatalog::restore`] re-creates it from the product snapshot it is given.
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    entries: HashMap<ProductId, StockLine>,
}

impl ProductCatalog {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn from_records(records: &[ProductRecord]) -> MarketResult<Self> {
        let mut catalog = Self::new();
        for record in records {
            if record.quantity < 0 {
                return Err(MarketError::validation(format!(
                    "Stored quantity of {} is negative",
                    record.id
                )));
            }
            let product = Product::from_record(record)?;
            catalog
                .entries
                .insert(product.id(), StockLine::new(product, record.quantity));
        }
        Ok(catalog)
    }

    pub fn records(&self) -> Vec<ProductRecord> {
        self.entries
            .values()
            .map(|line| line.product.to_record(line.quantity))
            .collect()
    }

    /// List a new product
    pub fn add_product(
        &mut self,
        name: &str,
        category: &str,
        price: f64,
        quantity: i32,
        keywords: Vec<String>,
    ) -> MarketResult<ProductId> {
        if quantity < 0 {
            return Err(MarketError::validation("Product's quantity must be non-negative"));
        }
        let product = Product::new(name, category, price, keywords)?;
        if self.name_taken(product.name(), None) {
            return Err(MarketError::conflict(format!(
                "A product named {} is already in the store's inventory",
                product.name()
            )));
        }

        let product_id = product.id();
        self.entries
            .insert(product_id, StockLine::new(product, quantity));
        Ok(product_id)
    }

    /// Delist a product, returning what was on hand
    pub fn remove_product(&mut self, product_id: &ProductId) -> MarketResult<i32> {
        self.entries
            .remove(product_id)
            .map(|line| line.quantity)
            .ok_or_else(|| MarketError::not_found("Product", product_id))
    }

    /// Override the quantity on hand (does not add to it)
    pub fn change_quantity(&mut self, product_id: &ProductId, quantity: i32) -> MarketResult<()> {
        if quantity < 0 {
            return Err(MarketError::validation("Quantity must be non-negative"));
        }
        let line = self.line_mut(product_id)?;
        line.quantity = quantity;
        Ok(())
    }

    pub fn set_product_name(&mut self, product_id: &ProductId, name: &str) -> MarketResult<()> {
        if self.name_taken(name.trim(), Some(*product_id)) {
            return Err(MarketError::conflict(format!(
                "A product named {} is already in the store's inventory",
                name.trim()
            )));
        }
        self.line_mut(product_id)?.product.set_name(name)
    }

    pub fn edit_product(&mut self, product_id: &ProductId, edit: ProductEdit) -> MarketResult<()> {
        if let Some(name) = &edit.name {
            if self.name_taken(name.trim(), Some(*product_id)) {
                return Err(MarketError::conflict(format!(
                    "A product named {} is already in the store's inventory",
                    name.trim()
                )));
            }
        }
        self.line_mut(product_id)?.product.edit_details(edit)
    }

    /// Take every requested line or nothing.
    ///
    /// Lines are checked in the given order. On the first line that does not exist or has too
    /// little stock, everything taken so far in this call is put back and the error names the
    /// offending product. Entries that reach zero are removed.
    pub fn acquire(&mut self, requested: &[(ProductId, i32)]) -> MarketResult<ProductLines> {
        let mut taken: Vec<StockLine> = Vec::with_capacity(requested.len());

        for &(product_id, quantity) in requested {
            match self.take(product_id, quantity) {
                Ok(product) => taken.push(StockLine::new(product, quantity)),
                Err(err) => {
                    for line in &taken {
                        self.put_back(&line.product, line.quantity);
                    }
                    return Err(err);
                }
            }
        }

        let mut acquired = ProductLines::new();
        for line in taken {
            acquired
                .entry(line.product.id())
                .and_modify(|existing| {
                    existing.quantity = existing.quantity.saturating_add(line.quantity)
                })
                .or_insert(line);
        }
        Ok(acquired)
    }

    /// Add quantities back, re-creating entries that were removed in the meantime.
    pub fn restore(&mut self, lines: &ProductLines) {
        for line in lines.values() {
            if line.quantity > 0 {
                self.put_back(&line.product, line.quantity);
            }
        }
    }

    pub fn get(&self, product_id: &ProductId) -> Option<&StockLine> {
        self.entries.get(product_id)
    }

    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.entries.contains_key(product_id)
    }

    pub fn quantity(&self, product_id: &ProductId) -> Option<i32> {
        self.entries.get(product_id).map(|line| line.quantity)
    }

    /// False only when the product is listed with less than `quantity`
    pub fn has_enough(&self, product_id: &ProductId, quantity: i32) -> bool {
        self.entries
            .get(product_id)
            .map_or(true, |line| line.quantity >= quantity)
    }

    pub fn products(&self) -> Vec<Product> {
        self.entries.values().map(|line| line.product.clone()).collect()
    }

    pub fn lines(&self) -> impl Iterator<Item = &StockLine> {
        self.entries.values()
    }

    pub fn search(&self, keyword: &str) -> Vec<Product> {
        self.entries
            .values()
            .filter(|line| line.product.matches_keyword(keyword))
            .map(|line| line.product.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn take(&mut self, product_id: ProductId, quantity: i32) -> MarketResult<Product> {
        if quantity <= 0 {
            return Err(MarketError::validation(format!(
                "Requested quantity of {} must be positive",
                product_id
            )));
        }
        let line = self
            .entries
            .get_mut(&product_id)
            .ok_or_else(|| MarketError::not_found("Product", product_id))?;
        if line.quantity < quantity {
            return Err(MarketError::InsufficientStock {
                product_id,
                requested: quantity,
                available: line.quantity,
            });
        }

        line.quantity -= quantity;
        let product = line.product.clone();
        if line.quantity == 0 {
            self.entries.remove(&product_id);
        }
        Ok(product)
    }

    fn put_back(&mut self, product: &Product, quantity: i32) {
        self.entries
            .entry(product.id())
            .and_modify(|line| line.quantity = line.quantity.saturating_add(quantity))
            .or_insert_with(|| StockLine::new(product.clone(), quantity));
    }

    fn line_mut(&mut self, product_id: &ProductId) -> MarketResult<&mut StockLine> {
        self.entries
            .get_mut(product_id)
            .ok_or_else(|| MarketError::not_found("Product", product_id))
    }

    fn name_taken(&self, name: &str, except: Option<ProductId>) -> bool {
        self.entries
            .values()
            .any(|line| line.product.name() == name && Some(line.product.id()) != except)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mercato_core::ErrorKind;

    fn stocked() -> (ProductCatalog, ProductId, ProductId, ProductId) {
        let mut catalog = ProductCatalog::new();
        let apple = catalog.add_product("Apple", "fruit", 1.0, 10, vec![]).unwrap();
        let pear = catalog.add_product("Pear", "fruit", 1.5, 4, vec![]).unwrap();
        let plum = catalog.add_product("Plum", "fruit", 2.0, 1, vec![]).unwrap();
        (catalog, apple, pear, plum)
    }

    fn quantities(catalog: &ProductCatalog) -> HashMap<ProductId, i32> {
        catalog
            .lines()
            .map(|line| (line.product.id(), line.quantity))
            .collect()
    }

    #[test]
    fn test_add_product_validation() {
        let mut catalog = ProductCatalog::new();
        let err = catalog.add_product("", "misc", 1.0, 1, vec![]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = catalog.add_product("Box", "misc", -1.0, 1, vec![]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = catalog.add_product("Box", "misc", 1.0, -1, vec![]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        catalog.add_product("Box", "misc", 1.0, 0, vec![]).unwrap();
        let err = catalog.add_product("Box", "other", 2.0, 5, vec![]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_remove_and_change_quantity() {
        let (mut catalog, apple, pear, _) = stocked();

        assert_eq!(catalog.remove_product(&apple).unwrap(), 10);
        let err = catalog.remove_product(&apple).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = catalog.change_quantity(&pear, -1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(catalog.quantity(&pear), Some(4));

        catalog.change_quantity(&pear, 7).unwrap();
        assert_eq!(catalog.quantity(&pear), Some(7));

        let err = catalog.change_quantity(&apple, 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_acquire_decrements_and_removes_exhausted() {
        let (mut catalog, apple, _, plum) = stocked();

        let acquired = catalog.acquire(&[(apple, 3), (plum, 1)]).unwrap();
        assert_eq!(acquired[&apple].quantity, 3);
        assert_eq!(acquired[&plum].product.name(), "Plum");
        assert_eq!(catalog.quantity(&apple), Some(7));
        assert!(!catalog.contains(&plum));
    }

    #[test]
    fn test_acquire_rolls_back_when_last_line_fails() {
        let (mut catalog, apple, pear, plum) = stocked();
        let before = quantities(&catalog);

        let err = catalog.acquire(&[(apple, 2), (plum, 1), (pear, 5)]).unwrap_err();
        assert_eq!(
            err,
            MarketError::InsufficientStock {
                product_id: pear,
                requested: 5,
                available: 4,
            }
        );
        assert_eq!(quantities(&catalog), before);

        let ghost = ProductId::new_v4();
        let err = catalog.acquire(&[(plum, 1), (ghost, 1)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(quantities(&catalog), before);

        let err = catalog.acquire(&[(apple, 1), (pear, 0)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(quantities(&catalog), before);
    }

    #[test]
    fn test_restore_is_inverse_of_acquire() {
        let (mut catalog, apple, pear, plum) = stocked();
        let before = quantities(&catalog);

        let acquired = catalog.acquire(&[(apple, 10), (pear, 1), (plum, 1)]).unwrap();
        assert_eq!(catalog.len(), 1);
        catalog.restore(&acquired);
        assert_eq!(quantities(&catalog), before);
    }

    #[test]
    fn test_restore_recreates_deleted_product() {
        let (mut catalog, _, pear, _) = stocked();

        let acquired = catalog.acquire(&[(pear, 2)]).unwrap();
        catalog.remove_product(&pear).unwrap();
        catalog.restore(&acquired);

        let line = catalog.get(&pear).unwrap();
        assert_eq!(line.quantity, 2);
        assert_eq!(line.product.name(), "Pear");
    }

    #[test]
    fn test_restore_saturates_at_max_quantity() {
        let mut catalog = ProductCatalog::new();
        let p = catalog.add_product("P", "misc", 1.0, i32::MAX - 1, vec![]).unwrap();
        let acquired = catalog.acquire(&[(p, 5)]).unwrap();
        catalog.change_quantity(&p, i32::MAX - 2).unwrap();

        catalog.restore(&acquired);
        assert_eq!(catalog.quantity(&p), Some(i32::MAX));

        let mut huge = acquired.clone();
        huge.get_mut(&p).unwrap().quantity = i32::MAX;
        catalog.restore(&huge);
        assert_eq!(catalog.quantity(&p), Some(i32::MAX));
    }

    #[test]
    fn test_zero_stock_is_insufficient() {
        let mut catalog = ProductCatalog::new();
        let p = catalog.add_product("P", "misc", 1.0, 2, vec![]).unwrap();
        let q = catalog.add_product("Q", "misc", 1.0, 0, vec![]).unwrap();

        let err = catalog.acquire(&[(p, 1), (q, 1)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(catalog.quantity(&p), Some(2));
    }

    #[test]
    fn test_rename_conflicts() {
        let (mut catalog, apple, pear, _) = stocked();
        let err = catalog.set_product_name(&apple, "Pear").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        catalog.set_product_name(&apple, "Green Apple").unwrap();
        assert_eq!(catalog.get(&apple).unwrap().product.name(), "Green Apple");

        let edit = ProductEdit {
            name: Some("Green Apple".to_string()),
            ..Default::default()
        };
        let err = catalog.edit_product(&pear, edit).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_records_round_trip() {
        let (catalog, apple, _, _) = stocked();
        let loaded = ProductCatalog::from_records(&catalog.records()).unwrap();
        assert_eq!(quantities(&loaded), quantities(&catalog));
        assert_eq!(loaded.get(&apple).unwrap().product.price(), 1.0);
    }
}
