pub mod product;
pub mod pricing;
pub mod inventory;
pub mod reservation;

pub use product::{Product, ProductEdit, ProductId, ProductLines, StockLine};
pub use pricing::{subtotal, PriceBreakdown};
pub use inventory::ProductCatalog;
pub use reservation::{Reservation, ReservationEngine, ReservationStats};
