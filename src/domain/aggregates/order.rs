//! Order Aggregate
//!
//! An order is a frozen snapshot of what was bought, where it ships and what
//! it cost. After placement only the status fields and the timeline move.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use validator::{Validate, ValidationError};
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{Money, Quantity, Role, Sku};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub(crate) id: Uuid,
    pub(crate) user_id: Uuid,
    pub(crate) items: Vec<OrderItem>,
    pub(crate) delivery_address: DeliveryAddress,
    pub(crate) pricing: Pricing,
    pub(crate) payment_method: PaymentMethod,
    pub(crate) payment_status: PaymentStatus,
    pub(crate) order_status: OrderStatus,
    pub(crate) cancelled_by: CancelledBy,
    pub(crate) timeline: Vec<TimelineEntry>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<OrderEvent>,
}

/// Purchase-time copy of a cart line. The reference ids are for lookup only;
/// the display fields are never refreshed from the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: Uuid,
    pub color_id: Uuid,
    pub size_id: Uuid,
    pub title: String,
    pub color: String,
    pub size: String,
    pub sku: Sku,
    pub price: Money,
    pub old_price: Option<Money>,
    pub quantity: Quantity,
    pub image: String,
}

impl OrderItem {
    pub fn line_total(&self) -> Money { self.price.multiply(self.quantity) }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliveryAddress {
    #[validate(custom = "not_blank")]
    pub fullname: String,
    #[validate(custom = "not_blank")]
    pub mobile: String,
    #[validate(custom = "not_blank")]
    pub address: String,
    #[validate(custom = "not_blank")]
    pub city: String,
    #[validate(custom = "not_blank")]
    pub state: String,
    #[validate(custom = "not_blank")]
    pub country: String,
    #[validate(custom = "not_blank")]
    pub pincode: String,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() { return Err(ValidationError::new("blank")); }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing { pub subtotal: Money, pub shipping: Money, pub total_amount: Money }

impl Pricing {
    pub fn for_items(items: &[OrderItem], shipping: Money) -> Self {
        let subtotal = items.iter().fold(Money::zero(), |acc, i| acc.add(&i.line_total()));
        Self { subtotal, shipping, total_amount: subtotal.add(&shipping) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry { pub status: OrderStatus, pub timestamp: DateTime<Utc> }

/// Everything a store needs to persist one status change. It carries no
/// copy of the payment status, so applying it to a newer row keeps that row's payment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub status: OrderStatus,
    /// Set only when the new status forces a payment status.
    pub payment_status: Option<PaymentStatus>,
    pub cancelled_by: CancelledBy,
    pub entry: TimelineEntry,
}

impl Transition {
    pub fn new(status: OrderStatus, actor: Role, now: DateTime<Utc>) -> Self {
        let payment_status = (status == OrderStatus::Delivered).then_some(PaymentStatus::Complete);
        let cancelled_by = match (status, actor) {
            (OrderStatus::Cancelled, Role::Admin) => CancelledBy::Admin,
            (OrderStatus::Cancelled, Role::User) => CancelledBy::User,
            _ => CancelledBy::None,
        };
        Self { status, payment_status, cancelled_by, entry: TimelineEntry { status, timestamp: now } }
    }
}

macro_rules! literal_enum {
    ($name:ident { $($variant:ident => $lit:literal),+ $(,)? }) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name { $(#[serde(rename = $lit)] $variant),+ }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
            pub fn as_str(&self) -> &'static str { match self { $($name::$variant => $lit),+ } }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
        }

        impl FromStr for $name {
            type Err = UnknownLiteral;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s { $($lit => Ok($name::$variant),)+ _ => Err(UnknownLiteral { kind: stringify!($name), value: s.to_string() }) }
            }
        }
    };
}

literal_enum!(OrderStatus { Pending => "pending", Confirmed => "confirmed", Shipped => "shipped", Delivered => "delivered", Cancelled => "cancelled" });
literal_enum!(PaymentMethod { Cod => "COD", Upi => "UPI", Card => "Card", NetBanking => "NetBanking" });
literal_enum!(PaymentStatus { Pending => "pending", Paid => "paid", Failed => "failed", Refunded => "refunded", Complete => "complete" });
literal_enum!(CancelledBy { User => "user", Admin => "admin", None => "none" });

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind}: {value}")]
pub struct UnknownLiteral { pub kind: &'static str, pub value: String }

impl Order {
    pub fn place(
        user_id: Uuid,
        items: Vec<OrderItem>,
        delivery_address: DeliveryAddress,
        payment_method: PaymentMethod,
        shipping: Money,
        now: DateTime<Utc>,
    ) -> Result<Self, PlaceOrderError> {
        if items.is_empty() { return Err(PlaceOrderError::NoItems); }
        let pricing = Pricing::for_items(&items, shipping);
        let mut order = Self {
            id: Uuid::now_v7(), user_id, items, delivery_address, pricing, payment_method,
            payment_status: PaymentStatus::Pending, order_status: OrderStatus::Pending, cancelled_by: CancelledBy::None,
            timeline: vec![TimelineEntry { status: OrderStatus::Pending, timestamp: now }],
            created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(OrderEvent::Placed { order_id: order.id, user_id, total: pricing.total_amount });
        Ok(order)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn items(&self) -> &[OrderItem] { &self.items }
    pub fn delivery_address(&self) -> &DeliveryAddress { &self.delivery_address }
    pub fn pricing(&self) -> &Pricing { &self.pricing }
    pub fn payment_method(&self) -> PaymentMethod { self.payment_method }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn status(&self) -> OrderStatus { self.order_status }
    pub fn cancelled_by(&self) -> CancelledBy { self.cancelled_by }
    pub fn timeline(&self) -> &[TimelineEntry] { &self.timeline }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Moves the order to `status`. Any status may follow any other; each
    /// call appends exactly one timeline entry.
    pub fn transition_to(&mut self, status: OrderStatus, actor: Role, now: DateTime<Utc>) -> Transition {
        let transition = Transition::new(status, actor, now);
        self.apply(&transition);
        self.raise_event(OrderEvent::StatusChanged { order_id: self.id, user_id: self.user_id, status });
        transition
    }

    /// Writes `transition` onto this copy. Stores call this on the current row.
    pub(crate) fn apply(&mut self, transition: &Transition) {
        self.order_status = transition.status;
        if let Some(payment_status) = transition.payment_status {
            self.payment_status = payment_status;
        }
        self.cancelled_by = transition.cancelled_by;
        self.timeline.push(transition.entry);
        self.updated_at = transition.entry.timestamp;
    }

    /// Statuses from which an owner may still withdraw the order.
    pub const CANCELLABLE: &'static [OrderStatus] = &[OrderStatus::Pending, OrderStatus::Confirmed];

    pub fn is_cancellable(&self) -> bool { Self::CANCELLABLE.contains(&self.order_status) }

    /// Statuses in which the order's units are held out of stock.
    pub const ACTIVE: &'static [OrderStatus] =
        &[OrderStatus::Pending, OrderStatus::Confirmed, OrderStatus::Shipped, OrderStatus::Delivered];

    pub fn holds_stock(&self) -> bool { Self::ACTIVE.contains(&self.order_status) }

    pub fn take_events(&mut self) -> Vec<OrderEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: OrderEvent) { self.events.push(e); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceOrderError {
    #[error("No items")]
    NoItems,
}
