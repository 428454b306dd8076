pub mod bag;
pub mod cart;
pub mod checkout;
pub mod market;
pub mod orchestrator;

pub use bag::ShoppingBag;
pub use cart::{CartCheckout, ShoppingCart};
pub use checkout::{CheckoutPhase, StoreCheckout};
pub use market::Marketplace;
pub use orchestrator::{PurchaseOrchestrator, PurchaseReceipt};
