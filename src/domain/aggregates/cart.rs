//! Cart submitted for checkout

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::value_objects::Quantity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub color_id: Uuid,
    pub size_id: Uuid,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: Uuid,
    pub variant: Selection,
    pub quantity: Quantity,
}

/// A non-empty list of cart lines, each asking for at least one unit.
/// Lines are kept in submission order and never merged.
#[derive(Clone, Debug)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    pub fn new(items: Vec<CartItem>) -> Result<Self, CartError> {
        if items.is_empty() { return Err(CartError::Empty); }
        if let Some(line) = items.iter().position(|i| i.quantity.is_zero()) {
            return Err(CartError::ZeroQuantity { line });
        }
        Ok(Self { items })
    }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Cart is empty")]
    Empty,
    #[error("Cart line {line} has zero quantity")]
    ZeroQuantity { line: usize },
}
