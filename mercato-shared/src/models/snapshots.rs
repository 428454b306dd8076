use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Flat product row as handed to the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductRecord {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub keywords: Vec<String>,
    pub quantity: i32,
}

/// Persistable state of a store's catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSnapshot {
    pub id: Uuid,
    pub name: String,
    pub products: Vec<ProductRecord>,
}

/// Persistable state of one shopper's bag in one store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BagSnapshot {
    pub username: String,
    pub store_id: Uuid,
    pub lines: HashMap<Uuid, i32>,
}
