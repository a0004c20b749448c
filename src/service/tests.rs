use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use super::OrderService;
use crate::domain::aggregates::{
    CancelledBy, CartItem, DeliveryAddress, OrderStatus, PaymentMethod, PaymentStatus, Product, Reference, Selection,
    SizeVariant, Variant, VariantSlot,
};
use crate::domain::value_objects::{Caller, Money, Quantity, Role, Sku};
use crate::notify::testing::{RecordingMailer, RecordingRealtime};
use crate::notify::{NotificationDispatcher, StatusEmail, StatusPayload};
use crate::store::{MemoryStore, OrderStore, Recipient};
use crate::OrderError;

const SLOT: VariantSlot = VariantSlot { variant_index: 0, size_index: 0 };

struct Harness {
    service: Arc<OrderService>,
    store: MemoryStore,
    pushed: UnboundedReceiver<(String, StatusPayload)>,
    mailed: UnboundedReceiver<StatusEmail>,
}

fn harness() -> Harness {
    let store = MemoryStore::new();
    let (realtime, pushed) = RecordingRealtime::new();
    let (mailer, mailed) = RecordingMailer::new();
    let dispatcher = NotificationDispatcher::new(Arc::new(realtime), Arc::new(mailer), Arc::new(store.clone()));
    let service = OrderService::new(Arc::new(store.clone()), Arc::new(store.clone()), dispatcher);
    Harness { service: Arc::new(service), store, pushed, mailed }
}

struct Listing {
    product_id: Uuid,
    color_id: Uuid,
    size_id: Uuid,
}

impl Listing {
    fn line(&self, qty: u32) -> CartItem {
        CartItem {
            product_id: self.product_id,
            variant: Selection { color_id: self.color_id, size_id: self.size_id },
            quantity: Quantity::new(qty),
        }
    }
}

fn listing(store: &MemoryStore, title: &str, price: i64, stock: u32) -> Listing {
    let (product_id, color_id, size_id) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let product = Product::new(product_id, title).with_variant(Variant {
        color: Reference { id: color_id, name: "Red".into() },
        images: vec![format!("{title}-front.jpg"), format!("{title}-back.jpg")],
        sizes: vec![SizeVariant {
            size: Reference { id: size_id, name: "M".into() },
            sku: Sku::new(format!("{title}-R-M")).unwrap(),
            price: Money::from(price),
            old_price: Some(Money::from(price + 20)),
            quantity: Quantity::new(stock),
        }],
    });
    store.insert_product(product).unwrap();
    Listing { product_id, color_id, size_id }
}

fn stock(store: &MemoryStore, listing: &Listing) -> u32 {
    store.stock(listing.product_id, SLOT).unwrap().unwrap().value()
}

fn address() -> DeliveryAddress {
    DeliveryAddress {
        fullname: "Asha Rao".into(), mobile: "9876543210".into(), address: "12 MG Road".into(), city: "Bengaluru".into(),
        state: "KA".into(), country: "India".into(), pincode: "560001".into(),
    }
}

#[tokio::test]
async fn test_two_units_of_a_hundred() {
    let h = harness();
    let tee = listing(&h.store, "Tee", 100, 5);
    let user = Uuid::new_v4();

    let order = h.service.place_order(user, vec![tee.line(2)], address(), PaymentMethod::Cod).await.unwrap();

    assert_eq!(order.items().len(), 1);
    let item = &order.items()[0];
    assert_eq!((item.price, item.quantity), (Money::from(100), Quantity::new(2)));
    assert_eq!((item.title.as_str(), item.color.as_str(), item.size.as_str()), ("Tee", "Red", "M"));
    assert_eq!(item.image, "Tee-front.jpg");
    assert_eq!(item.old_price, Some(Money::from(120)));
    assert_eq!(order.pricing().subtotal, Money::from(200));
    assert_eq!(order.pricing().total_amount, Money::from(200));
    assert_eq!(order.status(), OrderStatus::Pending);
    assert_eq!(order.payment_status(), PaymentStatus::Pending);
    assert_eq!(order.timeline().len(), 1);
    assert_eq!(stock(&h.store, &tee), 3);
}

#[tokio::test]
async fn test_pricing_sums_every_line() {
    let h = harness();
    let tee = listing(&h.store, "Tee", 100, 5);
    let cap = listing(&h.store, "Cap", 45, 5);

    let order = h.service.place_order(Uuid::new_v4(), vec![tee.line(1), cap.line(3)], address(), PaymentMethod::Upi).await.unwrap();

    let p = order.pricing();
    assert_eq!(p.subtotal, Money::from(235));
    assert_eq!(p.total_amount, p.subtotal.add(&p.shipping));
    assert_eq!(p.shipping, Money::zero());
}

#[tokio::test]
async fn test_stock_boundary() {
    let h = harness();
    let tee = listing(&h.store, "Tee", 100, 3);

    let err = h.service.place_order(Uuid::new_v4(), vec![tee.line(4)], address(), PaymentMethod::Card).await.unwrap_err();
    assert!(matches!(err, OrderError::InsufficientStock { ref product } if product == "Tee"));
    assert_eq!(stock(&h.store, &tee), 3);

    h.service.place_order(Uuid::new_v4(), vec![tee.line(3)], address(), PaymentMethod::Card).await.unwrap();
    assert_eq!(stock(&h.store, &tee), 0);
}

#[tokio::test]
async fn test_failed_cart_deducts_nothing() {
    let h = harness();
    let tee = listing(&h.store, "Tee", 100, 5);
    let cap = listing(&h.store, "Cap", 45, 1);
    let user = Uuid::new_v4();

    let err = h.service.place_order(user, vec![tee.line(2), cap.line(2)], address(), PaymentMethod::Cod).await.unwrap_err();
    assert!(matches!(err, OrderError::InsufficientStock { ref product } if product == "Cap"));

    // Same product twice: each line fits alone, together they do not.
    let err = h.service.place_order(user, vec![tee.line(3), tee.line(3)], address(), PaymentMethod::Cod).await.unwrap_err();
    assert!(matches!(err, OrderError::InsufficientStock { .. }));

    assert_eq!(stock(&h.store, &tee), 5);
    assert_eq!(stock(&h.store, &cap), 1);
    assert!(h.service.list_user_orders(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_product_and_selection() {
    let h = harness();
    let tee = listing(&h.store, "Tee", 100, 5);

    let missing = Listing { product_id: Uuid::new_v4(), color_id: tee.color_id, size_id: tee.size_id };
    let err = h.service.place_order(Uuid::new_v4(), vec![missing.line(1)], address(), PaymentMethod::Cod).await.unwrap_err();
    assert!(matches!(err, OrderError::NotFound(_)));

    let wrong_color = Listing { product_id: tee.product_id, color_id: Uuid::new_v4(), size_id: tee.size_id };
    let err = h.service.place_order(Uuid::new_v4(), vec![wrong_color.line(1)], address(), PaymentMethod::Cod).await.unwrap_err();
    assert!(matches!(err, OrderError::InvalidSelection { ref product } if product == "Tee"));

    let wrong_size = Listing { product_id: tee.product_id, color_id: tee.color_id, size_id: Uuid::new_v4() };
    let err = h.service.place_order(Uuid::new_v4(), vec![tee.line(1), wrong_size.line(1)], address(), PaymentMethod::Cod).await.unwrap_err();
    assert!(matches!(err, OrderError::InvalidSelection { .. }));

    assert_eq!(stock(&h.store, &tee), 5);
}

#[tokio::test]
async fn test_input_validation() {
    let h = harness();
    let tee = listing(&h.store, "Tee", 100, 5);

    let err = h.service.place_order(Uuid::new_v4(), vec![], address(), PaymentMethod::Cod).await.unwrap_err();
    assert!(matches!(err, OrderError::Validation(_)));

    let err = h.service.place_order(Uuid::new_v4(), vec![tee.line(0)], address(), PaymentMethod::Cod).await.unwrap_err();
    assert!(matches!(err, OrderError::Validation(_)));

    let mut incomplete = address();
    incomplete.city = String::new();
    let err = h.service.place_order(Uuid::new_v4(), vec![tee.line(1)], incomplete, PaymentMethod::Cod).await.unwrap_err();
    assert!(matches!(err, OrderError::Validation(_)));

    assert_eq!(stock(&h.store, &tee), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_orders_never_oversell() {
    const BUYERS: u32 = 8;
    let h = harness();
    let tee = listing(&h.store, "Tee", 100, BUYERS - 1);

    let mut tasks = Vec::new();
    for _ in 0..BUYERS {
        let service = h.service.clone();
        let line = tee.line(1);
        tasks.push(tokio::spawn(async move {
            service.place_order(Uuid::new_v4(), vec![line], address(), PaymentMethod::Cod).await
        }));
    }

    let mut placed = 0;
    let mut short = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => placed += 1,
            Err(OrderError::InsufficientStock { .. }) => short += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!((placed, short), (BUYERS - 1, 1));
    assert_eq!(stock(&h.store, &tee), 0);
}

#[tokio::test]
async fn test_latest_order_is_stable_and_newest() {
    let h = harness();
    let tee = listing(&h.store, "Tee", 100, 10);
    let user = Uuid::new_v4();

    assert!(matches!(h.service.latest_order(user).await, Err(OrderError::NotFound(_))));

    h.service.place_order(user, vec![tee.line(1)], address(), PaymentMethod::Cod).await.unwrap();
    let second = h.service.place_order(user, vec![tee.line(2)], address(), PaymentMethod::Upi).await.unwrap();
    h.service.place_order(Uuid::new_v4(), vec![tee.line(1)], address(), PaymentMethod::Cod).await.unwrap();

    let a = h.service.latest_order(user).await.unwrap();
    let b = h.service.latest_order(user).await.unwrap();
    assert_eq!(a.id(), second.id());
    assert_eq!(serde_json::to_value(&a).unwrap(), serde_json::to_value(&b).unwrap());

    let mine = h.service.list_user_orders(user).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].id(), second.id());
}

#[tokio::test]
async fn test_admin_ships_order_and_owner_is_notified() {
    let mut h = harness();
    let tee = listing(&h.store, "Tee", 100, 5);
    let user = Uuid::new_v4();
    h.store.insert_user(user, Recipient { email: "asha@example.com".into(), name: "Asha".into() }).unwrap();
    let order = h.service.place_order(user, vec![tee.line(1)], address(), PaymentMethod::Cod).await.unwrap();

    let updated = h.service.update_status(order.id(), "shipped", &Caller::admin(Uuid::new_v4())).await.unwrap();

    assert_eq!(updated.status(), OrderStatus::Shipped);
    assert_eq!(updated.timeline().len(), order.timeline().len() + 1);
    assert_eq!(updated.timeline().last().unwrap().status, OrderStatus::Shipped);
    assert_eq!(updated.items(), order.items());

    let (channel, payload) = tokio::time::timeout(Duration::from_secs(1), h.pushed.recv()).await.unwrap().unwrap();
    assert_eq!(channel, user.to_string());
    assert_eq!(payload, StatusPayload { order_id: order.id(), status: OrderStatus::Shipped });
    let email = tokio::time::timeout(Duration::from_secs(1), h.mailed.recv()).await.unwrap().unwrap();
    assert_eq!((email.to.as_str(), email.status), ("asha@example.com", OrderStatus::Shipped));
}

#[tokio::test]
async fn test_non_admin_cannot_change_status() {
    let mut h = harness();
    let tee = listing(&h.store, "Tee", 100, 5);
    let user = Uuid::new_v4();
    let order = h.service.place_order(user, vec![tee.line(1)], address(), PaymentMethod::Cod).await.unwrap();

    let err = h.service.update_status(order.id(), "shipped", &Caller::user(user)).await.unwrap_err();
    assert!(matches!(err, OrderError::Forbidden));

    let stored = h.service.get_order(order.id(), &Caller::user(user)).await.unwrap();
    assert_eq!(stored.status(), OrderStatus::Pending);
    assert_eq!(stored.timeline().len(), 1);
    tokio::task::yield_now().await;
    assert!(h.pushed.try_recv().is_err());
    assert!(h.mailed.try_recv().is_err());
}

#[tokio::test]
async fn test_unknown_status_and_order() {
    let h = harness();
    let tee = listing(&h.store, "Tee", 100, 5);
    let admin = Caller::admin(Uuid::new_v4());
    let order = h.service.place_order(Uuid::new_v4(), vec![tee.line(1)], address(), PaymentMethod::Cod).await.unwrap();

    let err = h.service.update_status(order.id(), "returned", &admin).await.unwrap_err();
    assert!(matches!(err, OrderError::InvalidStatus(ref s) if s == "returned"));
    let err = h.service.update_status(Uuid::new_v4(), "shipped", &admin).await.unwrap_err();
    assert!(matches!(err, OrderError::NotFound(_)));
}

#[tokio::test]
async fn test_delivered_completes_payment() {
    let h = harness();
    let tee = listing(&h.store, "Tee", 100, 5);
    let admin = Caller::admin(Uuid::new_v4());
    let order = h.service.place_order(Uuid::new_v4(), vec![tee.line(1)], address(), PaymentMethod::Card).await.unwrap();

    let delivered = h.service.update_status(order.id(), "delivered", &admin).await.unwrap();
    assert_eq!(delivered.payment_status(), PaymentStatus::Complete);

    // Backward moves are accepted and keep the history.
    let reopened = h.service.update_status(order.id(), "pending", &admin).await.unwrap();
    let statuses: Vec<_> = reopened.timeline().iter().map(|e| e.status).collect();
    assert_eq!(statuses, vec![OrderStatus::Pending, OrderStatus::Delivered, OrderStatus::Pending]);
}

#[tokio::test]
async fn test_owner_cancellation_returns_stock() {
    let h = harness();
    let tee = listing(&h.store, "Tee", 100, 5);
    let user = Uuid::new_v4();
    let order = h.service.place_order(user, vec![tee.line(2)], address(), PaymentMethod::Cod).await.unwrap();
    assert_eq!(stock(&h.store, &tee), 3);

    // Someone else's order looks the same as a missing one.
    let err = h.service.cancel_order(order.id(), &Caller::user(Uuid::new_v4())).await.unwrap_err();
    assert!(matches!(err, OrderError::NotFound(_)));
    assert_eq!(stock(&h.store, &tee), 3);

    let cancelled = h.service.cancel_order(order.id(), &Caller::user(user)).await.unwrap();
    assert_eq!(cancelled.status(), OrderStatus::Cancelled);
    assert_eq!(cancelled.cancelled_by(), CancelledBy::User);
    assert_eq!(stock(&h.store, &tee), 5);

    let err = h.service.cancel_order(order.id(), &Caller::user(user)).await.unwrap_err();
    assert!(matches!(err, OrderError::Validation(_)));
    assert_eq!(stock(&h.store, &tee), 5);
}

#[tokio::test]
async fn test_admin_cancel_through_status_update() {
    let h = harness();
    let tee = listing(&h.store, "Tee", 100, 5);
    let order = h.service.place_order(Uuid::new_v4(), vec![tee.line(1)], address(), PaymentMethod::Cod).await.unwrap();

    let admin = Caller::admin(Uuid::new_v4());

    let cancelled = h.service.update_status(order.id(), "cancelled", &admin).await.unwrap();
    assert_eq!(cancelled.cancelled_by(), CancelledBy::Admin);
    assert_eq!(stock(&h.store, &tee), 5);

    // Setting it again does not return the units twice.
    h.service.update_status(order.id(), "cancelled", &admin).await.unwrap();
    assert_eq!(stock(&h.store, &tee), 5);

    let revived = h.service.update_status(order.id(), "confirmed", &admin).await.unwrap();
    assert_eq!(revived.cancelled_by(), CancelledBy::None);
    assert_eq!(stock(&h.store, &tee), 4);
}

#[tokio::test]
async fn test_reviving_a_cancelled_order_needs_its_stock_back() {
    let h = harness();
    let tee = listing(&h.store, "Tee", 100, 2);
    let admin = Caller::admin(Uuid::new_v4());
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

    let first = h.service.place_order(alice, vec![tee.line(2)], address(), PaymentMethod::Cod).await.unwrap();
    h.service.cancel_order(first.id(), &Caller::user(alice)).await.unwrap();
    assert_eq!(stock(&h.store, &tee), 2);
    h.service.place_order(bob, vec![tee.line(2)], address(), PaymentMethod::Cod).await.unwrap();
    assert_eq!(stock(&h.store, &tee), 0);

    let err = h.service.update_status(first.id(), "shipped", &admin).await.unwrap_err();
    assert!(matches!(err, OrderError::InsufficientStock { ref product } if product == "Tee"));

    let stored = h.service.get_order(first.id(), &admin).await.unwrap();
    assert_eq!(stored.status(), OrderStatus::Cancelled);
    assert_eq!(stored.cancelled_by(), CancelledBy::User);
    assert_eq!(stored.timeline().len(), 2);
    assert_eq!(stock(&h.store, &tee), 0);
}

#[tokio::test]
async fn test_stale_status_write_keeps_completed_payment() {
    let h = harness();
    let tee = listing(&h.store, "Tee", 100, 5);
    let order = h.service.place_order(Uuid::new_v4(), vec![tee.line(1)], address(), PaymentMethod::Card).await.unwrap();

    let mut stale = h.store.find(order.id()).await.unwrap().unwrap();
    h.service.update_status(order.id(), "delivered", &Caller::admin(Uuid::new_v4())).await.unwrap();
    let transition = stale.transition_to(OrderStatus::Shipped, Role::Admin, Utc::now());
    let stored = h.store.append_transition(order.id(), &transition, None).await.unwrap().unwrap();

    assert_eq!(stored.status(), OrderStatus::Shipped);
    assert_eq!(stored.payment_status(), PaymentStatus::Complete);
    let statuses: Vec<_> = stored.timeline().iter().map(|e| e.status).collect();
    assert_eq!(statuses, vec![OrderStatus::Pending, OrderStatus::Delivered, OrderStatus::Shipped]);
}

#[tokio::test]
async fn test_snapshot_survives_catalog_changes() {
    let h = harness();
    let tee = listing(&h.store, "Tee", 100, 5);
    let user = Uuid::new_v4();
    let order = h.service.place_order(user, vec![tee.line(1)], address(), PaymentMethod::Cod).await.unwrap();

    let repriced = Product::new(tee.product_id, "Tee v2").with_variant(Variant {
        color: Reference { id: tee.color_id, name: "Crimson".into() },
        images: vec![],
        sizes: vec![SizeVariant {
            size: Reference { id: tee.size_id, name: "Medium".into() },
            sku: Sku::new("TEE2").unwrap(),
            price: Money::from(999),
            old_price: None,
            quantity: Quantity::new(50),
        }],
    });
    h.store.insert_product(repriced).unwrap();

    let stored = h.service.latest_order(user).await.unwrap();
    assert_eq!(stored.items(), order.items());
    assert_eq!(stored.pricing(), order.pricing());
}

#[tokio::test]
async fn test_admin_listing_and_delete() {
    let h = harness();
    let tee = listing(&h.store, "Tee", 100, 5);
    let user = Uuid::new_v4();
    let admin = Caller::admin(Uuid::new_v4());
    let first = h.service.place_order(user, vec![tee.line(1)], address(), PaymentMethod::Cod).await.unwrap();
    h.service.place_order(Uuid::new_v4(), vec![tee.line(1)], address(), PaymentMethod::Cod).await.unwrap();

    assert!(matches!(h.service.list_all_orders(&Caller::user(user)).await, Err(OrderError::Forbidden)));
    assert_eq!(h.service.list_all_orders(&admin).await.unwrap().len(), 2);

    assert!(matches!(h.service.delete_order(first.id(), &Caller::user(user)).await, Err(OrderError::Forbidden)));
    h.service.delete_order(first.id(), &admin).await.unwrap();
    assert!(matches!(h.service.delete_order(first.id(), &admin).await, Err(OrderError::NotFound(_))));
    assert!(matches!(h.service.get_order(first.id(), &admin).await, Err(OrderError::NotFound(_))));
    assert_eq!(stock(&h.store, &tee), 3);
}

#[tokio::test]
async fn test_foreign_orders_are_hidden() {
    let h = harness();
    let tee = listing(&h.store, "Tee", 100, 5);
    let owner = Uuid::new_v4();
    let order = h.service.place_order(owner, vec![tee.line(1)], address(), PaymentMethod::Cod).await.unwrap();

    assert!(h.service.get_order(order.id(), &Caller::user(owner)).await.is_ok());
    assert!(h.service.get_order(order.id(), &Caller::admin(Uuid::new_v4())).await.is_ok());
    let err = h.service.get_order(order.id(), &Caller::user(Uuid::new_v4())).await.unwrap_err();
    assert!(matches!(err, OrderError::NotFound(_)));
}
