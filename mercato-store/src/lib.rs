pub mod app_config;
pub mod events;
pub mod management;
pub mod offers;
pub mod registry;
pub mod repo;
pub mod store;
pub mod telemetry;

pub use app_config::Config;
pub use events::Publisher;
pub use management::StoreManagement;
pub use offers::{Offer, OfferBook, OfferStatus};
pub use registry::StoreRegistry;
pub use repo::InMemoryRepository;
pub use store::Store;
