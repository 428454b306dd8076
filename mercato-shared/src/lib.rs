pub mod models;
pub mod pii;

pub use models::events::PurchaseCompletedEvent;
pub use models::purchase::{PurchaseDetails, PurchasedLine};
pub use models::snapshots::{BagSnapshot, ProductRecord, StoreSnapshot};
pub use pii::Redacted;
