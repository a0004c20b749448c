//! Domain events
use crate::domain::aggregates::OrderStatus;
use crate::domain::value_objects::Money;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq)]
pub enum OrderEvent {
    Placed { order_id: Uuid, user_id: Uuid, total: Money },
    StatusChanged { order_id: Uuid, user_id: Uuid, status: OrderStatus },
}

