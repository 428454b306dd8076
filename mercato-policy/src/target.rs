use mercato_catalog::{ProductLines, StockLine};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which lines of a purchase a rule or discount looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "obj", content = "id", rename_all = "snake_case")]
pub enum Target {
    Store,
    Category(String),
    Product(Uuid),
}

impl Target {
    pub fn matches(&self, line: &StockLine) -> bool {
        match self {
            Target::Store => true,
            Target::Category(category) => line.product.category() == category,
            Target::Product(product_id) => line.product.id() == *product_id,
        }
    }

    pub fn quantity(&self, lines: &ProductLines) -> i32 {
        lines
            .values()
            .filter(|line| self.matches(line))
            .map(|line| line.quantity)
            .sum()
    }

    /// Undiscounted total of the matching lines
    pub fn total(&self, lines: &ProductLines) -> f64 {
        lines
            .values()
            .filter(|line| self.matches(line))
            .map(|line| line.line_total())
            .sum()
    }

    pub fn describe(&self) -> String {
        match self {
            Target::Store => "the whole bag".to_string(),
            Target::Category(category) => format!("category {}", category),
            Target::Product(product_id) => format!("product {}", product_id),
        }
    }
}
