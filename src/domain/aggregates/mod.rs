//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::{Product, ProductError, Reference, SizeVariant, Variant, VariantSlot};
pub use order::{
    CancelledBy, DeliveryAddress, Order, OrderItem, OrderStatus, PaymentMethod, PaymentStatus, PlaceOrderError, Pricing,
    TimelineEntry, Transition, UnknownLiteral,
};
pub use cart::{Cart, CartError, CartItem, Selection};
