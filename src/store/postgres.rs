//! PostgreSQL backend
//!
//! Variant and size positions are the array indices of the product document,
//! so a [`VariantSlot`](crate::domain::aggregates::VariantSlot) addresses a `product_variant_sizes` row directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{CatalogStore, OrderStore, Recipient, ReserveOutcome, StockReservation, StoreError, UserDirectory};
use crate::domain::aggregates::{
    DeliveryAddress, Order, OrderItem, OrderStatus, Pricing, Product, Reference, SizeVariant, TimelineEntry, Transition, Variant,
};
use crate::domain::value_objects::{Money, Quantity, Sku};

const ORDER_COLUMNS: &str = "id, user_id, items, delivery_address, subtotal, shipping, total_amount, payment_method, \
     payment_status, order_status, cancelled_by, timeline, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[derive(sqlx::FromRow)]
struct ProductRow { id: Uuid, title: String }

#[derive(sqlx::FromRow)]
struct VariantRow { color_id: Uuid, color_name: String, images: Vec<String> }

#[derive(sqlx::FromRow)]
struct SizeRow {
    variant_position: i32,
    size_id: Uuid,
    size_name: String,
    sku: String,
    price: Decimal,
    old_price: Option<Decimal>,
    quantity: i32,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    items: Json<Vec<OrderItem>>,
    delivery_address: Json<DeliveryAddress>,
    subtotal: Decimal,
    shipping: Decimal,
    total_amount: Decimal,
    payment_method: String,
    payment_status: String,
    order_status: String,
    cancelled_by: String,
    timeline: Json<Vec<TimelineEntry>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let corrupt = |e: crate::domain::aggregates::UnknownLiteral| StoreError::Corrupt(format!("order {}: {e}", row.id));
        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            items: row.items.0,
            delivery_address: row.delivery_address.0,
            pricing: Pricing {
                subtotal: Money::new(row.subtotal),
                shipping: Money::new(row.shipping),
                total_amount: Money::new(row.total_amount),
            },
            payment_method: row.payment_method.parse().map_err(corrupt)?,
            payment_status: row.payment_status.parse().map_err(corrupt)?,
            order_status: row.order_status.parse().map_err(corrupt)?,
            cancelled_by: row.cancelled_by.parse().map_err(corrupt)?,
            timeline: row.timeline.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            events: vec![],
        })
    }
}

fn slot_params(r: &StockReservation) -> Result<(i32, i32, i32), StoreError> {
    let position = |v: usize| i32::try_from(v).map_err(|_| StoreError::Corrupt(format!("position {v} out of range")));
    let qty = i32::try_from(r.quantity.value()).map_err(|_| StoreError::Corrupt(format!("quantity {} out of range", r.quantity)))?;
    Ok((position(r.slot.variant_index)?, position(r.slot.size_index)?, qty))
}

/// Row updates sorted by (product, variant, size) so concurrent batches lock
/// rows in the same order. Each entry keeps its index into `reservations`.
fn in_lock_order(reservations: &[StockReservation]) -> Result<Vec<(usize, (i32, i32, i32))>, StoreError> {
    let mut rows = reservations
        .iter()
        .enumerate()
        .map(|(index, r)| Ok((index, slot_params(r)?)))
        .collect::<Result<Vec<_>, StoreError>>()?;
    rows.sort_by_key(|(index, (variant_position, position, _))| (reservations[*index].product_id, *variant_position, *position, *index));
    Ok(rows)
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        let Some(row) = sqlx::query_as::<_, ProductRow>("SELECT id, title FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let variants = sqlx::query_as::<_, VariantRow>(
            "SELECT c.id AS color_id, c.name AS color_name, v.images FROM product_variants v \
             JOIN colors c ON c.id = v.color_id WHERE v.product_id = $1 ORDER BY v.position",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let sizes = sqlx::query_as::<_, SizeRow>(
            "SELECT s.variant_position, z.id AS size_id, z.name AS size_name, s.sku, s.price, s.old_price, s.quantity \
             FROM product_variant_sizes s JOIN sizes z ON z.id = s.size_id \
             WHERE s.product_id = $1 ORDER BY s.variant_position, s.position",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut variants: Vec<Variant> = variants
            .into_iter()
            .map(|v| Variant { color: Reference { id: v.color_id, name: v.color_name }, images: v.images, sizes: vec![] })
            .collect();

        for s in sizes {
            let variant = usize::try_from(s.variant_position)
                .ok()
                .and_then(|i| variants.get_mut(i))
                .ok_or_else(|| StoreError::Corrupt(format!("product {id}: size row for missing variant {}", s.variant_position)))?;
            let quantity = u32::try_from(s.quantity)
                .map_err(|_| StoreError::Corrupt(format!("product {id}: negative stock for {}", s.sku)))?;
            variant.sizes.push(SizeVariant {
                size: Reference { id: s.size_id, name: s.size_name },
                sku: Sku::new(s.sku).map_err(|e| StoreError::Corrupt(format!("product {id}: {e}")))?,
                price: Money::new(s.price),
                old_price: s.old_price.map(Money::new),
                quantity: Quantity::new(quantity),
            });
        }

        Ok(Some(variants.into_iter().fold(Product::new(row.id, row.title), Product::with_variant)))
    }

    async fn reserve(&self, reservations: &[StockReservation]) -> Result<ReserveOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        for (index, (variant_position, position, qty)) in in_lock_order(reservations)? {
            let result = sqlx::query(
                "UPDATE product_variant_sizes SET quantity = quantity - $4 \
                 WHERE product_id = $1 AND variant_position = $2 AND position = $3 AND quantity >= $4",
            )
            .bind(reservations[index].product_id)
            .bind(variant_position)
            .bind(position)
            .bind(qty)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() != 1 {
                tx.rollback().await?;
                return Ok(ReserveOutcome::Shortfall { index });
            }
        }
        tx.commit().await?;
        Ok(ReserveOutcome::Reserved)
    }

    async fn release(&self, reservations: &[StockReservation]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for (index, (variant_position, position, qty)) in in_lock_order(reservations)? {
            let r = &reservations[index];
            let result = sqlx::query(
                "UPDATE product_variant_sizes SET quantity = quantity + $4 \
                 WHERE product_id = $1 AND variant_position = $2 AND position = $3",
            )
            .bind(r.product_id)
            .bind(variant_position)
            .bind(position)
            .bind(qty)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tracing::warn!(product_id = %r.product_id, slot = ?r.slot, "Released stock for a size-variant that no longer exists");
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO orders (id, user_id, items, delivery_address, subtotal, shipping, total_amount, payment_method, \
             payment_status, order_status, cancelled_by, timeline, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(order.id())
        .bind(order.user_id())
        .bind(Json(order.items()))
        .bind(Json(order.delivery_address()))
        .bind(order.pricing().subtotal.amount())
        .bind(order.pricing().shipping.amount())
        .bind(order.pricing().total_amount.amount())
        .bind(order.payment_method().as_str())
        .bind(order.payment_status().as_str())
        .bind(order.status().as_str())
        .bind(order.cancelled_by().as_str())
        .bind(Json(order.timeline()))
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn append_transition(
        &self,
        id: Uuid,
        transition: &Transition,
        from: Option<&[OrderStatus]>,
    ) -> Result<Option<Order>, StoreError> {
        let from: Option<Vec<&str>> = from.map(|statuses| statuses.iter().map(OrderStatus::as_str).collect());
        sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders SET order_status = $2, payment_status = COALESCE($3::TEXT, payment_status), cancelled_by = $4, \
             timeline = timeline || $5, updated_at = $6 \
             WHERE id = $1 AND ($7::TEXT[] IS NULL OR order_status = ANY($7)) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(transition.status.as_str())
        .bind(transition.payment_status.map(|p| p.as_str()))
        .bind(transition.cancelled_by.as_str())
        .bind(Json([transition.entry]))
        .bind(transition.entry.timestamp)
        .bind(from)
        .fetch_optional(&self.pool)
        .await?
        .map(Order::try_from)
        .transpose()
    }

    async fn latest_for_user(&self, user_id: Uuid) -> Result<Option<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, seq DESC LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Order::try_from)
        .transpose()
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, seq DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Order::try_from)
        .collect()
    }

    async fn list_all(&self) -> Result<Vec<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, seq DESC"))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Order::try_from)
            .collect()
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn recipient(&self, user_id: Uuid) -> Result<Option<Recipient>, StoreError> {
        Ok(sqlx::query_as::<_, Recipient>("SELECT email, name FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }
}
