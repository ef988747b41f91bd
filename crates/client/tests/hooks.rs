mod common;

use std::sync::Arc;

use serde_json::{Value, json};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tillwise_client::hooks::inventory::{ADJUST_PATH, INVENTORY, INVENTORY_SUMMARY, INVENTORY_VALUATION};
use tillwise_client::types::{Customer, CustomerInput, StockAdjustment, StockSettings};
use tillwise_client::{
    Credentials, Entry, InventoryHooks, Level, MemoryNotifier, Notification, QueryKey, ResourceHooks, SessionStore,
};
use tillwise_core::{ClientError, OptimisticError, RecordId};

use common::{fail, ok, ok_empty, page, store, tokens};

async fn signed_in(server: &MockServer, username: &str, permissions: &[&str]) -> SessionStore {
    let mut data = tokens("a1", "r1");
    data["user"] = json!({"id": 3, "username": username});
    data["permissions"] = json!(permissions);
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"username": username, "password": "pw"})))
        .respond_with(ok(data))
        .mount(server)
        .await;

    let (store, _) = store(server);
    store.login(&Credentials::new(username, "pw")).await.unwrap();
    store.shutdown();
    store
}

fn customer(id: i64, name: &str) -> Value {
    json!({"id": id, "name": name, "email": null, "is_active": true})
}

async fn mount_customers(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/customers"))
        .respond_with(ok(page(json!([customer(1, "Alice"), customer(2, "Bob")]))))
        .mount(server)
        .await;
}

fn names(hooks: &ResourceHooks<Customer>) -> Vec<String> {
    hooks.list().items().map(|c| c.name.clone()).collect()
}

fn charlie() -> CustomerInput {
    CustomerInput {
        name: "Charlie".into(),
        ..CustomerInput::default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resource hooks
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_shows_local_row_then_swaps_in_server_record() {
    let server = MockServer::start().await;
    mount_customers(&server).await;
    Mock::given(method("POST"))
        .and(path("/customers"))
        .and(body_json(json!({"name": "Charlie"})))
        .respond_with(ok(customer(99, "Charlie")))
        .expect(1)
        .mount(&server)
        .await;

    let session = signed_in(&server, "cashier", &["customers:view", "customers:create"]).await;
    let notifier = Arc::new(MemoryNotifier::new());
    let mut hooks = ResourceHooks::<Customer>::new(session.clone(), notifier.clone());
    hooks.fetch(&QueryKey::new("customers")).await.unwrap();
    assert!(hooks.visible());

    let input = charlie();
    let ticket = hooks.begin_create(&input).unwrap();
    assert_eq!(names(&hooks), ["Charlie", "Alice", "Bob"]);
    assert!(hooks.list().entries()[0].is_local());
    assert!(notifier.notifications().is_empty());

    let outcome = session.client().post::<Customer, _>("/customers", &input).await.map(Some);
    let created = hooks.finish(ticket, outcome).unwrap().unwrap();

    assert_eq!(created.id, RecordId::new(99));
    assert_eq!(names(&hooks), ["Charlie", "Alice", "Bob"]);
    assert!(matches!(&hooks.list().entries()[0], Entry::Persisted(c) if c.id == RecordId::new(99)));
    assert!(!hooks.list().is_pending());
    assert_eq!(notifier.notifications(), [Notification::success("Customer created")]);
}

#[tokio::test]
async fn failed_create_rolls_back_and_notifies_once() {
    let server = MockServer::start().await;
    mount_customers(&server).await;
    Mock::given(method("POST"))
        .and(path("/customers"))
        .respond_with(fail(409, "DUPLICATE_CUSTOMER", "Customer already exists"))
        .mount(&server)
        .await;

    let session = signed_in(&server, "cashier", &["all"]).await;
    let notifier = Arc::new(MemoryNotifier::new());
    let mut hooks = ResourceHooks::<Customer>::new(session, notifier.clone());
    hooks.fetch(&QueryKey::new("customers")).await.unwrap();

    let err = hooks.create(charlie()).await.unwrap_err();

    assert_eq!(err.status(), Some(409));
    assert_eq!(names(&hooks), ["Alice", "Bob"]);
    assert!(!hooks.list().is_pending());
    assert_eq!(
        notifier.notifications(),
        [Notification::error("Conflict: Customer already exists")]
    );
}

#[tokio::test]
async fn invalid_input_is_rejected_without_a_request() {
    let server = MockServer::start().await;
    mount_customers(&server).await;
    Mock::given(method("POST"))
        .and(path("/customers"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let session = signed_in(&server, "cashier", &["all"]).await;
    let notifier = Arc::new(MemoryNotifier::new());
    let mut hooks = ResourceHooks::<Customer>::new(session, notifier.clone());
    hooks.fetch(&QueryKey::new("customers")).await.unwrap();

    let err = hooks
        .create(CustomerInput {
            name: "   ".into(),
            ..CustomerInput::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Validation(ref v) if v.field == "name"));
    assert_eq!(names(&hooks), ["Alice", "Bob"]);
    let seen = notifier.notifications();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].level, Level::Error);
}

#[tokio::test]
async fn missing_permission_is_rejected_without_a_request() {
    let server = MockServer::start().await;
    mount_customers(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/customers/1"))
        .respond_with(ok_empty())
        .expect(0)
        .mount(&server)
        .await;

    let session = signed_in(&server, "cashier", &["customers:view", "customers:create"]).await;
    let notifier = Arc::new(MemoryNotifier::new());
    let mut hooks = ResourceHooks::<Customer>::new(session, notifier.clone());
    hooks.fetch(&QueryKey::new("customers")).await.unwrap();

    let err = hooks.delete(RecordId::new(1)).await.unwrap_err();

    assert_eq!(
        err,
        ClientError::Forbidden {
            missing: "customers:delete".into()
        }
    );
    assert_eq!(names(&hooks), ["Alice", "Bob"]);
    assert_eq!(
        notifier.notifications(),
        [Notification::error("You do not have permission to do that.")]
    );
}

#[tokio::test]
async fn update_and_delete_settle_against_the_server() {
    let server = MockServer::start().await;
    mount_customers(&server).await;
    Mock::given(method("PUT"))
        .and(path("/customers/2"))
        .respond_with(ok(json!({"id": 2, "name": "Robert", "phone": "555-0100", "is_active": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/customers/1"))
        .respond_with(ok_empty())
        .expect(1)
        .mount(&server)
        .await;

    let session = signed_in(&server, "cashier", &["customers:update", "customers:delete"]).await;
    let notifier = Arc::new(MemoryNotifier::new());
    let mut hooks = ResourceHooks::<Customer>::new(session, notifier.clone());
    hooks.fetch(&QueryKey::new("customers")).await.unwrap();

    let updated = hooks
        .update(
            RecordId::new(2),
            CustomerInput {
                name: "Robert".into(),
                ..CustomerInput::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.phone.as_deref(), Some("555-0100"));
    assert_eq!(names(&hooks), ["Alice", "Robert"]);

    hooks.delete(RecordId::new(1)).await.unwrap();
    assert_eq!(names(&hooks), ["Robert"]);

    let levels: Vec<Level> = notifier.notifications().iter().map(|n| n.level).collect();
    assert_eq!(levels, [Level::Success, Level::Success]);
}

#[tokio::test]
async fn failed_delete_restores_the_row_in_place() {
    let server = MockServer::start().await;
    mount_customers(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/customers/1"))
        .respond_with(fail(500, "INTERNAL", "boom"))
        .mount(&server)
        .await;

    let session = signed_in(&server, "cashier", &["all"]).await;
    let notifier = Arc::new(MemoryNotifier::new());
    let mut hooks = ResourceHooks::<Customer>::new(session, notifier.clone());
    hooks.fetch(&QueryKey::new("customers")).await.unwrap();

    hooks.delete(RecordId::new(1)).await.unwrap_err();

    assert_eq!(names(&hooks), ["Alice", "Bob"]);
    assert_eq!(notifier.notifications().len(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Inventory hooks
// ─────────────────────────────────────────────────────────────────────────────

async fn mount_inventory(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/inventory"))
        .respond_with(ok(page(json!([
            {"product_id": 5, "product_name": "Green tea", "sku": "TEA-5", "quantity": 10, "min_stock": 2},
            {"product_id": 6, "product_name": "Black tea", "sku": "TEA-6", "quantity": 4, "min_stock": 2},
        ]))))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/inventory/summary"))
        .respond_with(ok(json!({"total_products": 2, "total_quantity": 14})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/inventory/valuation"))
        .respond_with(ok(json!({"total_cost": 42.0, "total_retail": 70.0})))
        .mount(server)
        .await;
}

async fn loaded_inventory(session: SessionStore, notifier: Arc<MemoryNotifier>) -> InventoryHooks {
    let mut hooks = InventoryHooks::new(session, notifier);
    hooks.fetch_levels(QueryKey::new(INVENTORY)).await.unwrap();
    hooks.fetch_summary().await.unwrap();
    hooks.fetch_valuation().await.unwrap();
    hooks
}

fn quantity_of(hooks: &InventoryHooks, product: i64) -> i64 {
    hooks
        .levels
        .get(&QueryKey::new(INVENTORY))
        .and_then(|p| p.items.iter().find(|l| l.product_id == RecordId::new(product)))
        .map(|l| l.quantity)
        .unwrap()
}

fn summaries_stale(hooks: &InventoryHooks) -> bool {
    hooks.summary.is_stale(&QueryKey::new(INVENTORY_SUMMARY))
        && hooks.valuation.is_stale(&QueryKey::new(INVENTORY_VALUATION))
}

#[tokio::test]
async fn failed_adjustment_restores_quantity_and_invalidates_summaries() {
    let server = MockServer::start().await;
    mount_inventory(&server).await;
    Mock::given(method("POST"))
        .and(path(ADJUST_PATH))
        .respond_with(fail(500, "INTERNAL", "database unavailable"))
        .expect(1)
        .mount(&server)
        .await;

    let session = signed_in(&server, "cashier", &["inventory:view", "inventory:adjust"]).await;
    let notifier = Arc::new(MemoryNotifier::new());
    let mut hooks = loaded_inventory(session.clone(), notifier.clone()).await;
    assert!(!summaries_stale(&hooks));

    let adjustment = StockAdjustment {
        product_id: RecordId::new(5),
        quantity: -3,
        reason: Some("damaged".into()),
    };
    let change = hooks.begin_adjust(&adjustment).unwrap();
    assert_eq!(change.pages_touched(), 1);
    assert_eq!(quantity_of(&hooks, 5), 7);
    assert_eq!(quantity_of(&hooks, 6), 4);

    let outcome = session.client().post(ADJUST_PATH, &adjustment).await;
    hooks.finish(change, outcome).unwrap_err();

    assert_eq!(quantity_of(&hooks, 5), 10);
    assert!(summaries_stale(&hooks));
    let seen = notifier.notifications();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].level, Level::Error);
}

#[tokio::test]
async fn successful_adjustment_takes_the_server_quantity() {
    let server = MockServer::start().await;
    mount_inventory(&server).await;
    Mock::given(method("POST"))
        .and(path(ADJUST_PATH))
        .and(body_json(json!({"product_id": 5, "quantity": -3, "reason": "damaged"})))
        // Another till sold one meanwhile.
        .respond_with(ok(json!({"product_id": 5, "quantity": 6, "min_stock": 2})))
        .expect(1)
        .mount(&server)
        .await;

    let session = signed_in(&server, "cashier", &["inventory:adjust"]).await;
    let notifier = Arc::new(MemoryNotifier::new());
    let mut hooks = loaded_inventory(session, notifier.clone()).await;

    let level = hooks
        .adjust_stock(RecordId::new(5), -3, Some("damaged".into()))
        .await
        .unwrap();

    assert_eq!(level.quantity, 6);
    assert_eq!(quantity_of(&hooks, 5), 6);
    assert!(summaries_stale(&hooks));
    assert_eq!(notifier.notifications(), [Notification::success("Stock adjusted")]);

    // Display fields the response omitted are kept.
    let cached = hooks.levels.get(&QueryKey::new(INVENTORY)).unwrap();
    assert_eq!(cached.items[0].product_name.as_deref(), Some("Green tea"));
}

#[tokio::test]
async fn zero_adjustment_is_rejected_locally() {
    let server = MockServer::start().await;
    mount_inventory(&server).await;
    Mock::given(method("POST"))
        .and(path(ADJUST_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let session = signed_in(&server, "cashier", &["all"]).await;
    let notifier = Arc::new(MemoryNotifier::new());
    let mut hooks = loaded_inventory(session, notifier.clone()).await;

    let err = hooks.adjust_stock(RecordId::new(5), 0, None).await.unwrap_err();

    assert!(matches!(err, ClientError::Validation(_)));
    assert_eq!(quantity_of(&hooks, 5), 10);
    assert!(!summaries_stale(&hooks));
    assert_eq!(notifier.notifications().len(), 1);
}

#[tokio::test]
async fn settings_update_requires_permission_and_patches_thresholds() {
    let server = MockServer::start().await;
    mount_inventory(&server).await;
    Mock::given(method("PUT"))
        .and(path("/inventory/6/settings"))
        .respond_with(ok(json!({"product_id": 6, "quantity": 4, "min_stock": 5, "reorder_point": 6})))
        .expect(1)
        .mount(&server)
        .await;

    let settings = StockSettings {
        min_stock: 5,
        max_stock: None,
        reorder_point: Some(6),
    };

    // Adjust-only staff cannot change thresholds.
    let adjuster = signed_in(&server, "adjuster", &["inventory:adjust"]).await;
    let notifier = Arc::new(MemoryNotifier::new());
    let mut hooks = loaded_inventory(adjuster, notifier.clone()).await;
    let err = hooks
        .update_stock_settings(RecordId::new(6), settings.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Forbidden { .. }));
    assert_eq!(notifier.drain().len(), 1);

    let manager = signed_in(&server, "manager", &["inventory:update"]).await;
    let mut hooks = loaded_inventory(manager, notifier.clone()).await;
    let level = hooks.update_stock_settings(RecordId::new(6), settings).await.unwrap();

    assert!(level.is_low());
    let cached = hooks.levels.get(&QueryKey::new(INVENTORY)).unwrap();
    let tea = cached.items.iter().find(|l| l.product_id == RecordId::new(6)).unwrap();
    assert_eq!(tea.min_stock, 5);
    assert_eq!(tea.reorder_point, Some(6));
    assert_eq!(notifier.notifications(), [Notification::success("Stock settings updated")]);
}

#[tokio::test]
async fn second_stock_change_waits_for_the_first_to_settle() {
    let server = MockServer::start().await;
    mount_inventory(&server).await;

    let session = signed_in(&server, "cashier", &["all"]).await;
    let notifier = Arc::new(MemoryNotifier::new());
    let mut hooks = loaded_inventory(session, notifier.clone()).await;

    let first = hooks
        .begin_adjust(&StockAdjustment {
            product_id: RecordId::new(5),
            quantity: -3,
            reason: None,
        })
        .unwrap();
    assert!(hooks.is_pending());

    let err = hooks
        .begin_adjust(&StockAdjustment {
            product_id: RecordId::new(5),
            quantity: -2,
            reason: None,
        })
        .unwrap_err();
    assert_eq!(err, ClientError::Optimistic(OptimisticError::MutationPending));
    let err = hooks
        .begin_settings(
            RecordId::new(5),
            &StockSettings {
                min_stock: 1,
                max_stock: None,
                reorder_point: None,
            },
        )
        .unwrap_err();
    assert_eq!(err, ClientError::Optimistic(OptimisticError::MutationPending));
    assert_eq!(quantity_of(&hooks, 5), 7);

    hooks
        .finish(first, Err(ClientError::Network("connection reset".into())))
        .unwrap_err();
    assert_eq!(quantity_of(&hooks, 5), 10);
    assert!(!hooks.is_pending());

    let next = hooks
        .begin_adjust(&StockAdjustment {
            product_id: RecordId::new(5),
            quantity: -2,
            reason: None,
        })
        .unwrap();
    assert_eq!(quantity_of(&hooks, 5), 8);
    hooks
        .finish(next, Err(ClientError::Network("connection reset".into())))
        .unwrap_err();
    assert_eq!(quantity_of(&hooks, 5), 10);
}

#[tokio::test]
async fn oversized_adjustment_saturates_instead_of_overflowing() {
    let server = MockServer::start().await;
    mount_inventory(&server).await;

    let session = signed_in(&server, "cashier", &["all"]).await;
    let notifier = Arc::new(MemoryNotifier::new());
    let mut hooks = loaded_inventory(session, notifier).await;

    let change = hooks
        .begin_adjust(&StockAdjustment {
            product_id: RecordId::new(5),
            quantity: i64::MAX,
            reason: None,
        })
        .unwrap();
    assert_eq!(quantity_of(&hooks, 5), i64::MAX);

    hooks
        .finish(change, Err(ClientError::Network("connection reset".into())))
        .unwrap_err();
    assert_eq!(quantity_of(&hooks, 5), 10);
}
