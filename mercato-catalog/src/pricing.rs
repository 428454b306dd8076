use serde::{Deserialize, Serialize};

use crate::product::ProductLines;

/// Undiscounted total: sum of unit price times quantity.
pub fn subtotal(lines: &ProductLines) -> f64 {
    lines.values().map(|line| line.line_total()).sum()
}

/// Price of one store's part of a checkout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceBreakdown {
    pub subtotal: f64,
    pub discount: f64,
    pub total: f64,
}

impl PriceBreakdown {
    /// The discount is clamped to `[0, subtotal]`, so the total is never negative.
    pub fn new(subtotal: f64, discount: f64) -> Self {
        let discount = if discount.is_finite() {
            discount.clamp(0.0, subtotal.max(0.0))
        } else {
            0.0
        };
        Self {
            subtotal,
            discount,
            total: (subtotal - discount).max(0.0),
        }
    }

    pub fn for_lines(lines: &ProductLines, discount: f64) -> Self {
        Self::new(subtotal(lines), discount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::{Product, StockLine};

    fn lines() -> ProductLines {
        let tea = Product::new("Tea", "drinks", 10.0, vec![]).unwrap();
        let cake = Product::new("Cake", "food", 2.5, vec![]).unwrap();
        ProductLines::from([
            (tea.id(), StockLine::new(tea, 3)),
            (cake.id(), StockLine::new(cake, 2)),
        ])
    }

    #[test]
    fn test_subtotal() {
        assert_eq!(subtotal(&lines()), 35.0);
        assert_eq!(subtotal(&ProductLines::new()), 0.0);
    }

    #[test]
    fn test_breakdown_never_negative() {
        let price = PriceBreakdown::for_lines(&lines(), 50.0);
        assert_eq!(price.discount, 35.0);
        assert_eq!(price.total, 0.0);

        let price = PriceBreakdown::for_lines(&lines(), -3.0);
        assert_eq!(price.discount, 0.0);
        assert_eq!(price.total, 35.0);

        let price = PriceBreakdown::new(30.0, 7.5);
        assert_eq!(price.total, 22.5);
    }
}
