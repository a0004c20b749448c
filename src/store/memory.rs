//! In-memory backend

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use super::{CatalogStore, OrderStore, Recipient, ReserveOutcome, StockReservation, StoreError, UserDirectory};
use crate::domain::aggregates::{Order, OrderStatus, Product, Transition, VariantSlot};
use crate::domain::value_objects::Quantity;

/// Thread-safe store keeping products, orders and users in process memory.
///
/// Stock checks and deductions for a whole batch happen under one lock, so
/// concurrent reservations never oversell.
#[derive(Clone, Default)]
pub struct MemoryStore {
    products: Arc<Mutex<HashMap<Uuid, Product>>>,
    // Insertion order doubles as the tie-breaker for equal timestamps.
    orders: Arc<RwLock<Vec<Order>>>,
    users: Arc<RwLock<HashMap<Uuid, Recipient>>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn insert_product(&self, product: Product) -> Result<(), StoreError> {
        self.products.lock().map_err(|_| StoreError::Poisoned)?.insert(product.id(), product);
        Ok(())
    }

    pub fn insert_user(&self, user_id: Uuid, recipient: Recipient) -> Result<(), StoreError> {
        self.users.write().map_err(|_| StoreError::Poisoned)?.insert(user_id, recipient);
        Ok(())
    }

    /// Current stock of one size-variant.
    pub fn stock(&self, product_id: Uuid, slot: VariantSlot) -> Result<Option<Quantity>, StoreError> {
        let products = self.products.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(products.get(&product_id).and_then(|p| p.size_variant(slot)).map(|s| s.quantity))
    }

    fn newest_first<'a>(orders: impl DoubleEndedIterator<Item = &'a Order>) -> Vec<Order> {
        let mut out: Vec<Order> = orders.rev().cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.products.lock().map_err(|_| StoreError::Poisoned)?.get(&id).cloned())
    }

    async fn reserve(&self, reservations: &[StockReservation]) -> Result<ReserveOutcome, StoreError> {
        let mut products = self.products.lock().map_err(|_| StoreError::Poisoned)?;

        // Lines hitting the same size-variant draw from the same stock.
        let mut demand: HashMap<(Uuid, VariantSlot), Quantity> = HashMap::new();
        for (index, r) in reservations.iter().enumerate() {
            let total = demand.entry((r.product_id, r.slot)).or_default();
            *total = total.add(r.quantity);
            let available = products.get(&r.product_id).and_then(|p| p.size_variant(r.slot)).map(|s| s.quantity);
            match available {
                Some(stock) if stock.covers(*total) => {}
                _ => return Ok(ReserveOutcome::Shortfall { index }),
            }
        }

        for r in reservations {
            if let Some(product) = products.get_mut(&r.product_id) {
                product.take_stock(r.slot, r.quantity).map_err(|e| StoreError::Corrupt(e.to_string()))?;
            }
        }
        Ok(ReserveOutcome::Reserved)
    }

    async fn release(&self, reservations: &[StockReservation]) -> Result<(), StoreError> {
        let mut products = self.products.lock().map_err(|_| StoreError::Poisoned)?;
        for r in reservations {
            match products.get_mut(&r.product_id) {
                Some(product) => product.restock(r.slot, r.quantity).map_err(|e| StoreError::Corrupt(e.to_string()))?,
                None => tracing::warn!(product_id = %r.product_id, "Released stock for a product that no longer exists"),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        let mut stored = order.clone();
        stored.events.clear();
        self.orders.write().map_err(|_| StoreError::Poisoned)?.push(stored);
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let orders = self.orders.read().map_err(|_| StoreError::Poisoned)?;
        Ok(orders.iter().find(|o| o.id == id).cloned())
    }

    async fn append_transition(
        &self,
        id: Uuid,
        transition: &Transition,
        from: Option<&[OrderStatus]>,
    ) -> Result<Option<Order>, StoreError> {
        let mut orders = self.orders.write().map_err(|_| StoreError::Poisoned)?;
        let Some(order) = orders.iter_mut().find(|o| o.id == id) else {
            return Ok(None);
        };
        if from.is_some_and(|allowed| !allowed.contains(&order.order_status)) {
            return Ok(None);
        }
        order.apply(transition);
        Ok(Some(order.clone()))
    }

    async fn latest_for_user(&self, user_id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.list_for_user(user_id).await?.into_iter().next())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().map_err(|_| StoreError::Poisoned)?;
        Ok(Self::newest_first(orders.iter().filter(|o| o.user_id == user_id)))
    }

    async fn list_all(&self) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().map_err(|_| StoreError::Poisoned)?;
        Ok(Self::newest_first(orders.iter()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut orders = self.orders.write().map_err(|_| StoreError::Poisoned)?;
        let before = orders.len();
        orders.retain(|o| o.id != id);
        Ok(orders.len() != before)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn recipient(&self, user_id: Uuid) -> Result<Option<Recipient>, StoreError> {
        Ok(self.users.read().map_err(|_| StoreError::Poisoned)?.get(&user_id).cloned())
    }
}
