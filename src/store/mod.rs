//! Storage seams used by the order service.
//!
//! Two backends implement them: [`postgres::PgStore`] for deployments and
//! [`memory::MemoryStore`] for development and tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderStatus, Product, Transition, VariantSlot};
use crate::domain::value_objects::Quantity;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("store lock poisoned")]
    Poisoned,
}

/// Units to take from (or give back to) one size-variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StockReservation {
    pub product_id: Uuid,
    pub slot: VariantSlot,
    pub quantity: Quantity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved,
    /// Nothing was deducted; `index` is the first reservation that could not be covered.
    Shortfall { index: usize },
}

#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct Recipient {
    pub email: String,
    pub name: String,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn product(&self, id: Uuid) -> Result<Option<Product>, StoreError>;

    /// Deducts every reservation or none of them. Each deduction is a
    /// conditional decrement guarded by `quantity >= requested`.
    async fn reserve(&self, reservations: &[StockReservation]) -> Result<ReserveOutcome, StoreError>;

    async fn release(&self, reservations: &[StockReservation]) -> Result<(), StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<(), StoreError>;

    async fn find(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Writes the status fields and appends the timeline entry in one step.
    /// With `from` set, the write only happens while the current status is
    /// one of those listed. Returns `None` when nothing was written.
    async fn append_transition(
        &self,
        id: Uuid,
        transition: &Transition,
        from: Option<&[OrderStatus]>,
    ) -> Result<Option<Order>, StoreError>;

    async fn latest_for_user(&self, user_id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Newest first.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, StoreError>;

    /// Newest first.
    async fn list_all(&self) -> Result<Vec<Order>, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn recipient(&self, user_id: Uuid) -> Result<Option<Recipient>, StoreError>;
}
