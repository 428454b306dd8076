use mercato_core::{MarketError, MarketResult};
use mercato_shared::ProductRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type ProductId = Uuid;

/// A product as listed by one store.
///
/// The id is generated once and never changes; everything else is edited in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    id: ProductId,
    name: String,
    category: String,
    price: f64,
    keywords: Vec<String>,
}

/// Partial update for [`Product::edit_details`]. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductEdit {
    pub name: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub keywords: Option<Vec<String>>,
}

impl Product {
    pub fn new(
        name: &str,
        category: &str,
        price: f64,
        keywords: Vec<String>,
    ) -> MarketResult<Self> {
        validate_name(name)?;
        validate_price(price)?;
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            category: category.to_string(),
            price,
            keywords,
        })
    }

    pub fn id(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn set_name(&mut self, name: &str) -> MarketResult<()> {
        validate_name(name)?;
        self.name = name.trim().to_string();
        Ok(())
    }

    /// Apply a partial edit; nothing changes if any supplied field is invalid.
    pub fn edit_details(&mut self, edit: ProductEdit) -> MarketResult<()> {
        if let Some(name) = &edit.name {
            validate_name(name)?;
        }
        if let Some(price) = edit.price {
            validate_price(price)?;
        }

        if let Some(name) = edit.name {
            self.name = name.trim().to_string();
        }
        if let Some(category) = edit.category {
            self.category = category;
        }
        if let Some(price) = edit.price {
            self.price = price;
        }
        if let Some(keywords) = edit.keywords {
            self.keywords = keywords;
        }
        Ok(())
    }

    /// Case-insensitive match on name, category or any keyword
    pub fn matches_keyword(&self, keyword: &str) -> bool {
        let needle = keyword.to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || self.category.to_lowercase() == needle
            || self.keywords.iter().any(|k| k.to_lowercase() == needle)
    }

    pub fn to_record(&self, quantity: i32) -> ProductRecord {
        ProductRecord {
            id: self.id,
            name: self.name.clone(),
            category: self.category.clone(),
            price: self.price,
            keywords: self.keywords.clone(),
            quantity,
        }
    }

    /// Rebuild a product loaded from persistence, keeping its stored id.
    pub fn from_record(record: &ProductRecord) -> MarketResult<Self> {
        validate_name(&record.name)?;
        validate_price(record.price)?;
        Ok(Self {
            id: record.id,
            name: record.name.clone(),
            category: record.category.clone(),
            price: record.price,
            keywords: record.keywords.clone(),
        })
    }
}

fn validate_name(name: &str) -> MarketResult<()> {
    if name.trim().is_empty() {
        return Err(MarketError::validation("Product's name can't be empty"));
    }
    Ok(())
}

fn validate_price(price: f64) -> MarketResult<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(MarketError::validation(format!(
            "Product's price must be non-negative, got {}",
            price
        )));
    }
    Ok(())
}

/// A product together with a quantity: stock on hand, a reservation line, or a purchase line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockLine {
    pub product: Product,
    pub quantity: i32,
}

impl StockLine {
    pub fn new(product: Product, quantity: i32) -> Self {
        Self { product, quantity }
    }

    pub fn line_total(&self) -> f64 {
        self.product.price() * self.quantity as f64
    }
}

/// Product id to (product, quantity), the shape policies and pricing evaluate.
pub type ProductLines = HashMap<ProductId, StockLine>;
