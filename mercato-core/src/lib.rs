pub mod delivery;
pub mod identity;
pub mod payment;
pub mod repository;

pub use delivery::{DeliveryService, MockDeliveryService};
pub use identity::{Permission, UserContext};
pub use payment::{MockPaymentGateway, PaymentGateway, PaymentReceipt};
pub use repository::MarketRepository;

use uuid::Uuid;

/// Error taxonomy shared by every marketplace operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MarketError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Purchase rejected by policy: {0}")]
    PolicyRejected(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("External service failure: {0}")]
    Gateway(String),
}

/// Fieldless discriminant of [`MarketError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    InsufficientStock,
    PolicyRejected,
    Conflict,
    PermissionDenied,
    Gateway,
}

impl MarketError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Persistence failures roll back like any other conflict
    pub fn persistence(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Conflict(format!("Persistence failure: {}", err))
    }

    pub fn gateway(service: &str, err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Gateway(format!("{}: {}", service, err))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MarketError::Validation(_) => ErrorKind::Validation,
            MarketError::NotFound { .. } => ErrorKind::NotFound,
            MarketError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            MarketError::PolicyRejected(_) => ErrorKind::PolicyRejected,
            MarketError::Conflict(_) => ErrorKind::Conflict,
            MarketError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            MarketError::Gateway(_) => ErrorKind::Gateway,
        }
    }
}

pub type MarketResult<T> = Result<T, MarketError>;
