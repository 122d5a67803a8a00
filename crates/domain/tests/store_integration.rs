//! Integration tests for the restaurant store.
//!
//! These tests drive [`RestaurantStore`] through checkout, the admin order
//! workflow, catalog management and restarts from persisted snapshots.

use std::sync::Arc;
use std::time::Duration;

use domain::{
    AdminError, CartError, CatalogError, DomainError, ImageSource, Money, OrderError, OrderFilters,
    OrderStatus, ProductForm, ProductId, ProductPatch, Rate, RestaurantStore, SettingsPatch,
};
use domain::{AdminSetupForm, LoginRateLimiter};
use persistence::{
    BearerToken, Collection, DocumentGateway, FileSnapshotSlot, IdentityError, IdentityService,
    ImageFile, InMemoryDocumentGateway, InMemoryIdentityService, InMemoryImageStorage,
    InMemorySnapshotSlot, SnapshotSlot,
};
use rust_decimal::Decimal;
use secrecy::SecretString;

async fn open_store(slot: Arc<dyn SnapshotSlot>) -> RestaurantStore {
    RestaurantStore::builder(slot)
        .with_debounce(Duration::ZERO)
        .open()
        .await
}

async fn memory_store() -> RestaurantStore {
    open_store(Arc::new(InMemorySnapshotSlot::new())).await
}

fn secret(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

mod checkout {
    use super::*;

    #[tokio::test]
    async fn cart_to_order_lifecycle() {
        let store = memory_store().await;

        store.add_to_cart(&ProductId::new("1"), 2).await.unwrap();
        store.add_to_cart(&ProductId::new("5"), 1).await.unwrap();
        let cart = store.add_to_cart(&ProductId::new("1"), 1).await.unwrap().value;

        assert_eq!(cart.items().len(), 2);
        assert_eq!(cart.item_count(), 4);
        assert_eq!(cart.total(), Money::from_cents(3 * 1299 + 299));

        let order = store
            .create_order(" 12 ")
            .await
            .unwrap()
            .synced()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(order.order_number, 1);
        assert_eq!(order.table_number.as_str(), "12");
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total, Money::from_cents(4196));
        assert_eq!(order.created_at, order.updated_at);

        assert!(store.cart().await.is_empty());
        assert_eq!(store.next_order_number().await, 2);
    }

    #[tokio::test]
    async fn order_numbers_are_sequential() {
        let store = memory_store().await;

        for expected in 1..=3 {
            store.add_to_cart(&ProductId::new("3"), 1).await.unwrap();
            let order = store.create_order("4").await.unwrap().value.unwrap();
            assert_eq!(order.order_number, expected);
        }
        assert_eq!(store.next_order_number().await, 4);
    }

    #[tokio::test]
    async fn failed_checkout_keeps_cart() {
        let store = memory_store().await;
        store.add_to_cart(&ProductId::new("2"), 1).await.unwrap();

        let err = store.create_order("   ").await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Table number is required");

        assert_eq!(store.cart().await.item_count(), 1);
        assert!(store.orders().await.is_empty());
        assert_eq!(store.next_order_number().await, 1);
    }

    #[tokio::test]
    async fn quantity_updates_and_removal() {
        let store = memory_store().await;
        let burger = ProductId::new("1");
        store.add_to_cart(&burger, 1).await.unwrap();

        let cart = store.update_cart_item(&burger, 4).await.unwrap().value;
        assert_eq!(cart.item_count(), 4);

        let cart = store.update_cart_item(&burger, 0).await.unwrap().value;
        assert!(cart.is_empty());
        assert_eq!(cart.total(), Money::zero());

        let err = store.update_cart_item(&burger, 2).await.unwrap_err();
        assert!(matches!(err, DomainError::Cart(CartError::ItemNotInCart(_))));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn unavailable_products_cannot_be_added() {
        let store = memory_store().await;
        let patch = ProductPatch {
            available: Some(false),
            ..Default::default()
        };
        store
            .update_product(&ProductId::new("4"), patch)
            .await
            .unwrap();

        let err = store
            .add_to_cart(&ProductId::new("4"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Cart(CartError::ProductUnavailable(_))));
        assert_eq!(store.available_products().await.len(), 4);
    }

    #[tokio::test]
    async fn cart_keeps_price_from_when_item_was_added() {
        let store = memory_store().await;
        let fries = ProductId::new("3");
        store.add_to_cart(&fries, 2).await.unwrap();

        let patch = ProductPatch {
            price: Some(Money::from_cents(599)),
            ..Default::default()
        };
        store.update_product(&fries, patch).await.unwrap();

        // Stale snapshot is kept until checkout
        assert_eq!(store.cart().await.total(), Money::from_cents(998));

        let order = store.create_order("7").await.unwrap().value.unwrap();
        assert_eq!(order.items[0].unit_price, Money::from_cents(499));
        assert_eq!(order.total, Money::from_cents(998));
    }

    #[tokio::test]
    async fn breakdown_follows_current_settings() {
        let store = memory_store().await;
        store.add_to_cart(&ProductId::new("1"), 1).await.unwrap();

        let breakdown = store.cart_breakdown().await;
        assert_eq!(breakdown.subtotal, Money::from_cents(1299));
        assert_eq!(breakdown.tax, Money::from_cents(104));
        assert_eq!(breakdown.service_charge, Money::from_cents(65));

        let patch = SettingsPatch {
            tax_rate: Some(Rate::zero()),
            ..Default::default()
        };
        store.update_settings(patch).await.unwrap();

        let breakdown = store.cart_breakdown().await;
        assert_eq!(breakdown.tax, Money::zero());
        assert_eq!(breakdown.total, Money::from_cents(1364));
    }
}

mod order_workflow {
    use super::*;

    async fn store_with_order() -> (RestaurantStore, domain::OrderId) {
        let store = memory_store().await;
        store.add_to_cart(&ProductId::new("2"), 1).await.unwrap();
        let order = store.create_order("9").await.unwrap().value.unwrap();
        (store, order.id)
    }

    #[tokio::test]
    async fn pending_order_can_be_completed_once() {
        let (store, id) = store_with_order().await;

        let order = store
            .update_order_status(&id, OrderStatus::Completed)
            .await
            .unwrap()
            .value
            .unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert!(order.updated_at >= order.created_at);

        let err = store
            .update_order_status(&id, OrderStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Order(OrderError::InvalidStatusTransition {
                from: OrderStatus::Completed,
                to: OrderStatus::Cancelled,
            })
        ));

        let order = store.find_order(&id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.total, Money::from_cents(1099));
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let store = memory_store().await;
        let err = store
            .update_order_status(&domain::OrderId::new("nope"), OrderStatus::Completed)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn filters_combine() {
        let store = memory_store().await;
        for table in ["5", "5", "12"] {
            store.add_to_cart(&ProductId::new("5"), 1).await.unwrap();
            store.create_order(table).await.unwrap();
        }
        let first = store.orders().await[0].id.clone();
        store
            .update_order_status(&first, OrderStatus::Cancelled)
            .await
            .unwrap();

        let filters = OrderFilters::new()
            .with_status(OrderStatus::Pending)
            .with_table_number("5");
        let matching = store.filtered_orders(&filters).await;
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].order_number, 2);

        assert_eq!(store.filtered_orders(&OrderFilters::new()).await.len(), 3);
    }

    #[tokio::test]
    async fn clearing_history_restarts_numbering() {
        let (store, _) = store_with_order().await;
        store.clear_order_history().await.unwrap();

        assert!(store.orders().await.is_empty());
        assert_eq!(store.next_order_number().await, 1);

        store.add_to_cart(&ProductId::new("1"), 1).await.unwrap();
        let order = store.create_order("1").await.unwrap().value.unwrap();
        assert_eq!(order.order_number, 1);
    }
}

mod catalog {
    use super::*;

    fn form() -> ProductForm {
        ProductForm::new("Veggie Wrap", "Grilled vegetables", Decimal::new(849, 2), "Mains")
    }

    fn image() -> ImageFile {
        ImageFile::new("Wrap Photo.PNG", "image/png", vec![0u8; 64])
    }

    fn token() -> BearerToken {
        BearerToken::from_header(Some("Bearer admin-token")).unwrap()
    }

    #[tokio::test]
    async fn add_product_with_uploaded_image() {
        let images = Arc::new(InMemoryImageStorage::new());
        let store = RestaurantStore::builder(Arc::new(InMemorySnapshotSlot::new()))
            .with_images(images.clone())
            .open()
            .await;

        let form = form().with_image(ImageSource::Upload {
            file: image(),
            token: token(),
        });
        let product = store.add_product(form).await.unwrap().value.unwrap();

        assert_eq!(product.price, Money::from_cents(849));
        assert!(product.available);
        let url = product.image.unwrap();
        assert!(url.starts_with("/uploads/wrap-photo-"));
        assert_eq!(images.image_count(), 1);
    }

    #[tokio::test]
    async fn failed_upload_adds_nothing() {
        let images = Arc::new(InMemoryImageStorage::new());
        images.set_fail_on_upload(true);
        let store = RestaurantStore::builder(Arc::new(InMemorySnapshotSlot::new()))
            .with_images(images)
            .open()
            .await;

        let form = form().with_image(ImageSource::Upload {
            file: image(),
            token: token(),
        });
        let err = store.add_product(form).await.unwrap_err();
        assert!(matches!(err, DomainError::Upload(_)));
        assert_eq!(store.products().await.len(), 5);
    }

    #[tokio::test]
    async fn invalid_form_is_rejected_before_upload() {
        let images = Arc::new(InMemoryImageStorage::new());
        let store = RestaurantStore::builder(Arc::new(InMemorySnapshotSlot::new()))
            .with_images(images.clone())
            .open()
            .await;

        let mut form = form().with_image(ImageSource::Upload {
            file: image(),
            token: token(),
        });
        form.name = "X".to_string();
        let err = store.add_product(form).await.unwrap_err();

        assert!(matches!(
            err,
            DomainError::Catalog(CatalogError::InvalidProductName { .. })
        ));
        assert_eq!(images.image_count(), 0);
    }

    #[tokio::test]
    async fn deleting_product_keeps_order_history() {
        let store = memory_store().await;
        let burger = ProductId::new("1");
        store.add_to_cart(&burger, 1).await.unwrap();
        store.create_order("3").await.unwrap();

        assert!(store.delete_product(&burger).await.unwrap().value);
        assert!(store.product(&burger).await.is_none());

        let orders = store.orders().await;
        assert_eq!(orders[0].items[0].product.name, "Classic Burger");
    }

    #[tokio::test]
    async fn categories_in_use_cannot_be_deleted() {
        let store = memory_store().await;
        let category = store
            .add_category("Mains", Some("Hearty plates".to_string()))
            .await
            .unwrap()
            .value
            .unwrap();

        let err = store.add_category(" mains ", None).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::Catalog(CatalogError::DuplicateCategory(_))
        ));

        store.add_product(form()).await.unwrap();
        assert_eq!(store.product_count("Mains").await, 1);
        assert_eq!(store.products_in_category("mains").await.len(), 1);

        let err = store.delete_category(&category.id).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::Catalog(CatalogError::CategoryInUse { product_count: 1, .. })
        ));

        let burgers = store.categories().await[1].clone();
        assert_eq!(burgers.name, "Burgers");
        store.delete_product(&ProductId::new("1")).await.unwrap();
        assert!(store.delete_category(&burgers.id).await.unwrap().value);
    }
}

mod persistence_roundtrip {
    use super::*;

    #[tokio::test]
    async fn state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("restaurant-state.json");

        let store = open_store(Arc::new(FileSnapshotSlot::new(&path))).await;
        store.add_to_cart(&ProductId::new("1"), 2).await.unwrap();
        store.create_order("8").await.unwrap();
        store.add_to_cart(&ProductId::new("5"), 3).await.unwrap();
        store
            .update_settings(SettingsPatch {
                name: Some("Harbor Bistro".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        store.flush().await.unwrap();
        drop(store);

        let reopened = open_store(Arc::new(FileSnapshotSlot::new(&path))).await;
        assert_eq!(reopened.orders().await.len(), 1);
        assert_eq!(reopened.next_order_number().await, 2);
        assert_eq!(reopened.cart().await.item_count(), 3);
        assert_eq!(reopened.settings().await.name, "Harbor Bistro");
        assert!(!reopened.admin().await.authenticated);
    }

    #[tokio::test]
    async fn corrupted_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("restaurant-state.json");
        std::fs::write(&path, "{\"products\": 42").unwrap();

        let store = open_store(Arc::new(FileSnapshotSlot::new(&path))).await;
        assert_eq!(store.products().await.len(), 5);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn non_object_snapshot_is_discarded() {
        let slot = Arc::new(InMemorySnapshotSlot::with_contents("[]"));
        let store = open_store(slot.clone()).await;

        assert_eq!(store.products().await.len(), 5);
        assert_eq!(store.categories().await.len(), 5);
        assert_eq!(slot.contents(), None);
    }

    #[tokio::test]
    async fn partial_legacy_snapshot_keeps_seeded_menu() {
        let slot = Arc::new(InMemorySnapshotSlot::with_contents(r#"{"nextOrderNumber": 4}"#));
        let store = open_store(slot).await;

        assert_eq!(store.products().await.len(), 5);
        assert_eq!(store.categories().await.len(), 5);
        assert_eq!(store.next_order_number().await, 4);
    }

    #[tokio::test]
    async fn legacy_browser_snapshot_is_loaded() {
        let legacy = r#"{
            "products": [{"id": "p1", "name": "Soup", "price": 6.5, "category": "Starters",
                          "available": true, "createdAt": "2024-01-02T10:00:00.000Z",
                          "updatedAt": "2024-01-02T10:00:00.000Z"}],
            "categories": [],
            "orders": [],
            "cart": {"items": [], "total": 0},
            "adminUser": {"username": "admin", "password": "admin123"},
            "isAuthenticated": true,
            "nextOrderNumber": 4
        }"#;
        let slot = Arc::new(InMemorySnapshotSlot::with_contents(legacy));
        let store = open_store(slot.clone()).await;

        let products = store.products().await;
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].price, Money::from_cents(650));
        assert_eq!(store.next_order_number().await, 4);
        assert!(store.admin().await.profile.is_none());

        // The next write upgrades the stored format
        store.flush().await.unwrap();
        let stored: serde_json::Value = serde_json::from_str(&slot.contents().unwrap()).unwrap();
        assert_eq!(stored["version"], 1);
        assert!(stored["adminUser"].is_null());
    }

    #[tokio::test]
    async fn mutations_are_mirrored_to_gateway() {
        let gateway = Arc::new(InMemoryDocumentGateway::new());
        let store = RestaurantStore::builder(Arc::new(InMemorySnapshotSlot::new()))
            .with_gateway(gateway.clone())
            .with_debounce(Duration::from_millis(5))
            .open()
            .await;

        store.add_to_cart(&ProductId::new("1"), 1).await.unwrap();
        let order = store.create_order("2").await.unwrap().value.unwrap();
        store
            .update_order_status(&order.id, OrderStatus::Completed)
            .await
            .unwrap()
            .sync
            .wait()
            .await
            .unwrap();

        let stored = gateway
            .get(Collection::Orders, order.id.as_str())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.body["status"], "completed");
        assert_eq!(stored.body["orderNumber"], 1);
        assert_eq!(gateway.counter_value(domain::store::ORDER_COUNTER).await, 1);

        store.clear_order_history().await.unwrap().synced().await.unwrap();
        assert_eq!(gateway.document_count(Collection::Orders).await, 0);
        assert_eq!(gateway.counter_value(domain::store::ORDER_COUNTER).await, 0);
    }

    #[tokio::test]
    async fn gateway_failure_keeps_memory_state() {
        let gateway = Arc::new(InMemoryDocumentGateway::new());
        gateway.set_fail_writes(true);
        let store = RestaurantStore::builder(Arc::new(InMemorySnapshotSlot::new()))
            .with_gateway(gateway)
            .with_debounce(Duration::ZERO)
            .open()
            .await;

        let result = store.delete_product(&ProductId::new("2")).await.unwrap();
        let err = result.sync.wait().await.unwrap_err();

        assert!(matches!(err, domain::SyncError::Mirror(_)));
        assert!(store.is_dirty());
        assert_eq!(store.products().await.len(), 4);
    }

    #[tokio::test]
    async fn rejected_mirror_writes_are_replayed_on_flush() {
        let gateway = Arc::new(InMemoryDocumentGateway::new());
        gateway.set_fail_writes(true);
        let store = RestaurantStore::builder(Arc::new(InMemorySnapshotSlot::new()))
            .with_gateway(gateway.clone())
            .with_debounce(Duration::ZERO)
            .open()
            .await;

        let deleted = store.delete_product(&ProductId::new("2")).await.unwrap();
        assert!(deleted.sync.wait().await.is_err());
        let category = store
            .add_category("Soups", None)
            .await
            .unwrap()
            .synced()
            .await;
        assert!(category.is_err());

        // Still unmirrored while the gateway is down
        assert!(store.flush().await.is_err());
        assert!(store.is_dirty());

        gateway.set_fail_writes(false);
        store.flush().await.unwrap();

        assert!(!store.is_dirty());
        let categories = gateway.document_count(Collection::Categories).await;
        assert_eq!(categories, 1);
    }
}

mod admin {
    use super::*;

    async fn store_with_identity(
        limiter: LoginRateLimiter,
    ) -> (RestaurantStore, Arc<InMemoryIdentityService>) {
        let identity = Arc::new(InMemoryIdentityService::new());
        let store = RestaurantStore::builder(Arc::new(InMemorySnapshotSlot::new()))
            .with_identity(identity.clone())
            .with_login_limiter(limiter)
            .with_debounce(Duration::ZERO)
            .open()
            .await;
        (store, identity)
    }

    fn setup_form(password: &str, confirm: &str) -> AdminSetupForm {
        AdminSetupForm {
            email: "owner@samplecafe.com".to_string(),
            username: Some("owner".to_string()),
            password: secret(password),
            confirm_password: secret(confirm),
        }
    }

    #[tokio::test]
    async fn setup_runs_once_and_signs_in() {
        let (store, identity) = store_with_identity(LoginRateLimiter::default()).await;
        assert!(!store.check_admin_exists().await.unwrap());

        let err = store
            .setup_admin(setup_form("secret1", "secret2"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Admin(AdminError::PasswordMismatch)));
        assert_eq!(identity.account_count(), 0);

        let profile = store
            .setup_admin(setup_form("secret1", "secret1"))
            .await
            .unwrap();
        assert_eq!(profile.username, "owner");

        let cache = store.admin().await;
        assert!(cache.authenticated);
        assert_eq!(cache.profile.unwrap().email, "owner@samplecafe.com");

        let err = store
            .setup_admin(setup_form("secret1", "secret1"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Admin(AdminError::AlreadyConfigured)));
    }

    #[tokio::test]
    async fn sign_out_and_back_in() {
        let (store, identity) = store_with_identity(LoginRateLimiter::default()).await;
        store
            .setup_admin(setup_form("secret1", "secret1"))
            .await
            .unwrap();

        store.sign_out().await.unwrap();
        let cache = store.admin().await;
        assert!(!cache.authenticated);
        assert!(cache.profile.is_none());
        assert!(!identity.is_authenticated().await);

        let err = store
            .sign_in("owner@samplecafe.com", &secret("wrong-pass"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Identity(IdentityError::InvalidCredentials)
        ));
        assert_eq!(err.to_string(), "Invalid email or password");

        store
            .sign_in("owner@samplecafe.com", &secret("secret1"))
            .await
            .unwrap();
        assert!(store.admin().await.authenticated);

        let token = identity.id_token().await.unwrap();
        assert!(store.verify_admin_token(&token).await);
        assert!(!store.verify_admin_token("forged").await);
    }

    #[tokio::test]
    async fn repeated_failures_lock_sign_in() {
        let limiter = LoginRateLimiter::new(2, Duration::from_secs(60));
        let (store, _) = store_with_identity(limiter).await;
        store
            .setup_admin(setup_form("secret1", "secret1"))
            .await
            .unwrap();

        for _ in 0..2 {
            store
                .sign_in("owner@samplecafe.com", &secret("nope-nope"))
                .await
                .unwrap_err();
        }

        // Even the right password is refused while locked
        let err = store
            .sign_in("owner@samplecafe.com", &secret("secret1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Admin(AdminError::TooManyAttempts { .. })
        ));
        assert!(!err.is_validation());
    }

    #[tokio::test]
    async fn refresh_mirrors_identity_service() {
        let (store, identity) = store_with_identity(LoginRateLimiter::default()).await;
        store
            .setup_admin(setup_form("secret1", "secret1"))
            .await
            .unwrap();

        identity.sign_out().await.unwrap();
        let cache = store.refresh_identity().await.unwrap();
        assert!(!cache.authenticated);
        assert!(cache.profile.is_none());
    }
}
