//! OpenSASE Orders
//!
//! Order lifecycle for the self-hosted storefront.
//!
//! ## Features
//! - Cart resolution against live size-variant stock
//! - All-or-nothing stock reservation with atomic conditional decrements
//! - Immutable order snapshots with frozen pricing and delivery address
//! - Status state machine with real-time and email notifications
//! - Order history queries

pub mod api;
pub mod config;
pub mod domain;
pub mod notify;
pub mod service;
pub mod store;

use thiserror::Error;

pub use service::OrderService;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Selected color/size is not available for {product}")]
    InvalidSelection { product: String },

    #[error("Insufficient stock for {product}")]
    InsufficientStock { product: String },

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Admin role required")]
    Forbidden,

    #[error("Invalid order status: {0}")]
    InvalidStatus(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrderError {
    /// Stable machine-readable kind used in error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::InvalidSelection { .. } => "invalid_selection",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::InvalidStatus(_) => "invalid_status",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<store::StoreError> for OrderError {
    fn from(e: store::StoreError) -> Self {
        tracing::error!(error = %e, "Store error");
        OrderError::Internal(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrderError>;
