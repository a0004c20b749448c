//! Order lifecycle: placement, status changes and history queries.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Cart, CartItem, DeliveryAddress, Order, OrderItem, OrderStatus, PaymentMethod};
use crate::domain::value_objects::{Caller, Money};
use crate::notify::NotificationDispatcher;
use crate::store::{CatalogStore, OrderStore, ReserveOutcome, StockReservation};
use crate::{OrderError, Result};

pub struct OrderService {
    catalog: Arc<dyn CatalogStore>,
    orders: Arc<dyn OrderStore>,
    notifications: NotificationDispatcher,
}

const WRITE_ATTEMPTS: usize = 3;
const CANCELLED: &[OrderStatus] = &[OrderStatus::Cancelled];

fn order_not_found(id: Uuid) -> OrderError {
    OrderError::NotFound(format!("Order {id}"))
}

impl OrderService {
    pub fn new(catalog: Arc<dyn CatalogStore>, orders: Arc<dyn OrderStore>, notifications: NotificationDispatcher) -> Self {
        Self { catalog, orders, notifications }
    }

    /// Resolves the cart against live stock, reserves every line at once and
    /// stores the order snapshot. A failed call leaves stock untouched.
    pub async fn place_order(
        &self,
        user_id: Uuid,
        items: Vec<CartItem>,
        delivery_address: DeliveryAddress,
        payment_method: PaymentMethod,
    ) -> Result<Order> {
        let cart = Cart::new(items).map_err(|e| OrderError::Validation(e.to_string()))?;
        delivery_address
            .validate()
            .map_err(|e| OrderError::Validation(format!("Delivery address incomplete: {e}")))?;

        let mut lines = Vec::with_capacity(cart.len());
        let mut reservations = Vec::with_capacity(cart.len());
        for item in cart.items() {
            let (line, reservation) = self.resolve(item).await?;
            lines.push(line);
            reservations.push(reservation);
        }

        // Shipping is not charged yet.
        let mut order = Order::place(user_id, lines, delivery_address, payment_method, Money::zero(), Utc::now())
            .map_err(|e| OrderError::Validation(e.to_string()))?;

        if let ReserveOutcome::Shortfall { index } = self.catalog.reserve(&reservations).await? {
            let product = order.items().get(index).map(|i| i.title.clone()).unwrap_or_default();
            tracing::info!(%user_id, %product, "Stock taken by a concurrent order");
            return Err(OrderError::InsufficientStock { product });
        }

        if let Err(e) = self.orders.insert(&order).await {
            self.release(&reservations, order.id()).await;
            return Err(e.into());
        }

        tracing::info!(order_id = %order.id(), %user_id, total = %order.pricing().total_amount, "Order created");
        let events = order.take_events();
        self.notifications.dispatch(&order, events);
        Ok(order)
    }

    async fn resolve(&self, item: &CartItem) -> Result<(OrderItem, StockReservation)> {
        let product = self
            .catalog
            .product(item.product_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(format!("Product {}", item.product_id)))?;

        let slot = product
            .locate(item.variant.color_id, item.variant.size_id)
            .map_err(|_| OrderError::InvalidSelection { product: product.title().to_string() })?;
        let (Some(variant), Some(size)) = (product.variant(slot), product.size_variant(slot)) else {
            return Err(OrderError::Internal(format!("product {} lost slot {slot:?}", product.id())));
        };

        if !size.quantity.covers(item.quantity) {
            return Err(OrderError::InsufficientStock { product: product.title().to_string() });
        }

        let line = OrderItem {
            product_id: product.id(),
            color_id: variant.color.id,
            size_id: size.size.id,
            title: product.title().to_string(),
            color: variant.color.name.clone(),
            size: size.size.name.clone(),
            sku: size.sku.clone(),
            price: size.price,
            old_price: size.old_price,
            quantity: item.quantity,
            image: variant.primary_image().to_string(),
        };
        Ok((line, StockReservation { product_id: product.id(), slot, quantity: item.quantity }))
    }

    async fn release(&self, reservations: &[StockReservation], order_id: Uuid) {
        if let Err(e) = self.catalog.release(reservations).await {
            tracing::error!(%order_id, error = %e, "Failed to release reserved stock");
        }
    }

    /// Admin-only. Any of the five statuses may be set from any other.
    ///
    /// Stock follows the status: moving into `cancelled` returns the units,
    /// moving out of it takes them again and fails with `InsufficientStock`
    /// when they are gone.
    pub async fn update_status(&self, order_id: Uuid, status: &str, caller: &Caller) -> Result<Order> {
        if !caller.is_admin() {
            return Err(OrderError::Forbidden);
        }
        let status: OrderStatus = status.parse().map_err(|_| OrderError::InvalidStatus(status.to_string()))?;

        for _ in 0..WRITE_ATTEMPTS {
            let mut order = self.orders.find(order_id).await?.ok_or_else(|| order_not_found(order_id))?;
            let held = order.holds_stock();
            let revived = if !held && status != OrderStatus::Cancelled {
                Some(self.retake(&order).await?)
            } else {
                None
            };

            // Only written while the stored order still holds (or lacks) stock as observed.
            let from = if held { Order::ACTIVE } else { CANCELLED };
            let transition = order.transition_to(status, caller.role, Utc::now());
            let written = self.orders.append_transition(order_id, &transition, Some(from)).await;
            let stored = match written {
                Ok(Some(stored)) => stored,
                not_written => {
                    if let Some(reservations) = &revived {
                        self.release(reservations, order_id).await;
                    }
                    not_written?;
                    tracing::debug!(%order_id, %status, "Order changed during status update, retrying");
                    continue;
                }
            };

            if held && !stored.holds_stock() {
                let reservations = self.reservations_for(stored.items()).await;
                self.release(&reservations, order_id).await;
            }

            tracing::info!(%order_id, %status, "Order status updated");
            let events = order.take_events();
            self.notifications.dispatch(&stored, events);
            return Ok(stored);
        }
        Err(OrderError::Validation("Order is being updated concurrently, try again".into()))
    }

    // Takes the units of a cancelled order out of stock again.
    async fn retake(&self, order: &Order) -> Result<Vec<StockReservation>> {
        let mut reservations = Vec::with_capacity(order.items().len());
        for item in order.items() {
            reservations.push(self.reservation_for(item).await?);
        }
        if let ReserveOutcome::Shortfall { index } = self.catalog.reserve(&reservations).await? {
            let product = order.items().get(index).map(|i| i.title.clone()).unwrap_or_default();
            return Err(OrderError::InsufficientStock { product });
        }
        Ok(reservations)
    }

    /// Withdraws a pending or confirmed order and returns its stock.
    pub async fn cancel_order(&self, order_id: Uuid, caller: &Caller) -> Result<Order> {
        let mut order = match self.orders.find(order_id).await? {
            Some(order) if caller.is_admin() || order.user_id() == caller.user_id => order,
            _ => return Err(order_not_found(order_id)),
        };
        if !order.is_cancellable() {
            return Err(OrderError::Validation(format!("Order is {} and can no longer be cancelled", order.status())));
        }

        let transition = order.transition_to(OrderStatus::Cancelled, caller.role, Utc::now());
        let Some(stored) = self.orders.append_transition(order_id, &transition, Some(Order::CANCELLABLE)).await? else {
            // Lost a race with another status change or a delete.
            return match self.orders.find(order_id).await? {
                Some(current) => Err(OrderError::Validation(format!(
                    "Order is {} and can no longer be cancelled",
                    current.status()
                ))),
                None => Err(order_not_found(order_id)),
            };
        };

        let reservations = self.reservations_for(stored.items()).await;
        self.release(&reservations, order_id).await;

        tracing::info!(%order_id, cancelled_by = %stored.cancelled_by(), "Order cancelled");
        let events = order.take_events();
        self.notifications.dispatch(&stored, events);
        Ok(stored)
    }

    // Items whose product or variant has since been removed from the catalog are skipped.
    async fn reservations_for(&self, items: &[OrderItem]) -> Vec<StockReservation> {
        let mut reservations = Vec::with_capacity(items.len());
        for item in items {
            match self.reservation_for(item).await {
                Ok(r) => reservations.push(r),
                Err(e) => tracing::warn!(product_id = %item.product_id, error = %e, "Cannot restock item"),
            }
        }
        reservations
    }

    async fn reservation_for(&self, item: &OrderItem) -> Result<StockReservation> {
        let product = self
            .catalog
            .product(item.product_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(format!("Product {}", item.product_id)))?;
        let slot = product
            .locate(item.color_id, item.size_id)
            .map_err(|_| OrderError::InvalidSelection { product: item.title.clone() })?;
        Ok(StockReservation { product_id: item.product_id, slot, quantity: item.quantity })
    }

    pub async fn get_order(&self, order_id: Uuid, caller: &Caller) -> Result<Order> {
        match self.orders.find(order_id).await? {
            Some(order) if caller.is_admin() || order.user_id() == caller.user_id => Ok(order),
            _ => Err(order_not_found(order_id)),
        }
    }

    pub async fn latest_order(&self, user_id: Uuid) -> Result<Order> {
        self.orders
            .latest_for_user(user_id)
            .await?
            .ok_or_else(|| OrderError::NotFound("Order".to_string()))
    }

    pub async fn list_user_orders(&self, user_id: Uuid) -> Result<Vec<Order>> {
        Ok(self.orders.list_for_user(user_id).await?)
    }

    pub async fn list_all_orders(&self, caller: &Caller) -> Result<Vec<Order>> {
        if !caller.is_admin() {
            return Err(OrderError::Forbidden);
        }
        Ok(self.orders.list_all().await?)
    }

    /// Hard delete. Reserved stock is not returned.
    pub async fn delete_order(&self, order_id: Uuid, caller: &Caller) -> Result<()> {
        if !caller.is_admin() {
            return Err(OrderError::Forbidden);
        }
        if !self.orders.delete(order_id).await? {
            return Err(order_not_found(order_id));
        }
        tracing::info!(%order_id, "Order deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
