//! Product Aggregate
//!
//! Products belong to the catalog. Order placement only reads them and moves
//! size-variant stock through [`Product::take_stock`] / [`Product::restock`].

use thiserror::Error;
use uuid::Uuid;
use crate::domain::value_objects::{Money, Quantity, Sku};

#[derive(Clone, Debug)]
pub struct Product {
    id: Uuid,
    title: String,
    variants: Vec<Variant>,
}

/// Color or size reference together with its display name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference { pub id: Uuid, pub name: String }

#[derive(Clone, Debug)]
pub struct Variant { pub color: Reference, pub images: Vec<String>, pub sizes: Vec<SizeVariant> }

#[derive(Clone, Debug)]
pub struct SizeVariant { pub size: Reference, pub sku: Sku, pub price: Money, pub old_price: Option<Money>, pub quantity: Quantity }

/// Position of a size-variant inside its product document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VariantSlot { pub variant_index: usize, pub size_index: usize }

impl Product {
    pub fn new(id: Uuid, title: impl Into<String>) -> Self {
        Self { id, title: title.into(), variants: vec![] }
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variants.push(variant);
        self
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn title(&self) -> &str { &self.title }
    pub fn variants(&self) -> &[Variant] { &self.variants }

    /// Finds the size-variant for a color/size selection.
    pub fn locate(&self, color_id: Uuid, size_id: Uuid) -> Result<VariantSlot, ProductError> {
        let variant_index = self.variants.iter().position(|v| v.color.id == color_id).ok_or(ProductError::ColorUnavailable)?;
        let size_index = self.variants[variant_index].sizes.iter().position(|s| s.size.id == size_id).ok_or(ProductError::SizeUnavailable)?;
        Ok(VariantSlot { variant_index, size_index })
    }

    pub fn variant(&self, slot: VariantSlot) -> Option<&Variant> { self.variants.get(slot.variant_index) }

    pub fn size_variant(&self, slot: VariantSlot) -> Option<&SizeVariant> {
        self.variant(slot).and_then(|v| v.sizes.get(slot.size_index))
    }

    /// Decrements stock if and only if the slot holds at least `qty`.
    pub fn take_stock(&mut self, slot: VariantSlot, qty: Quantity) -> Result<(), ProductError> {
        let size = self.size_variant_mut(slot)?;
        size.quantity = size.quantity.subtract(qty).ok_or(ProductError::InsufficientStock)?;
        Ok(())
    }

    pub fn restock(&mut self, slot: VariantSlot, qty: Quantity) -> Result<(), ProductError> {
        let size = self.size_variant_mut(slot)?;
        size.quantity = size.quantity.add(qty);
        Ok(())
    }

    fn size_variant_mut(&mut self, slot: VariantSlot) -> Result<&mut SizeVariant, ProductError> {
        self.variants
            .get_mut(slot.variant_index)
            .and_then(|v| v.sizes.get_mut(slot.size_index))
            .ok_or(ProductError::UnknownSlot)
    }
}

impl Variant {
    /// Representative image for order snapshots; empty when the variant has none.
    pub fn primary_image(&self) -> &str {
        self.images.first().map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("Color not available")]
    ColorUnavailable,
    #[error("Size not available")]
    SizeUnavailable,
    #[error("Insufficient stock")]
    InsufficientStock,
    #[error("Unknown variant slot")]
    UnknownSlot,
}
