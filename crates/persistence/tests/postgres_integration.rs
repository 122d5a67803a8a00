//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p persistence --test postgres_integration
//! ```

use std::sync::Arc;

use persistence::{
    Collection, DocumentGateway, DocumentGatewayExt, PersistenceError, PostgresDocumentGateway,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_documents_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Fresh gateway with its own pool and emptied tables
async fn get_test_gateway() -> PostgresDocumentGateway {
    let info = get_container_info().await;
    let gateway = PostgresDocumentGateway::connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE documents, counters")
        .execute(gateway.pool())
        .await
        .unwrap();

    gateway
}

#[tokio::test]
#[serial]
async fn put_get_and_replace() {
    let gateway = get_test_gateway().await;

    gateway
        .put(Collection::Products, "1", json!({"name": "Classic Burger", "price": 1299}))
        .await
        .unwrap();
    gateway
        .put(Collection::Products, "1", json!({"name": "Classic Burger", "price": 1399}))
        .await
        .unwrap();

    let doc = gateway
        .get(Collection::Products, "1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.body["price"], 1399);

    assert!(gateway.get(Collection::Orders, "1").await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn list_is_scoped_to_collection() {
    let gateway = get_test_gateway().await;

    gateway
        .put(Collection::Categories, "burgers", json!({"name": "Burgers"}))
        .await
        .unwrap();
    gateway
        .put(Collection::Categories, "sides", json!({"name": "Sides"}))
        .await
        .unwrap();
    gateway
        .put(Collection::Products, "1", json!({"name": "Fries"}))
        .await
        .unwrap();

    let categories = gateway.list(Collection::Categories).await.unwrap();
    assert_eq!(categories.len(), 2);
}

#[tokio::test]
#[serial]
async fn update_merges_and_reports_missing() {
    let gateway = get_test_gateway().await;

    gateway
        .put(Collection::Orders, "o1", json!({"status": "pending", "total": 1299}))
        .await
        .unwrap();
    gateway
        .update(Collection::Orders, "o1", json!({"status": "completed"}))
        .await
        .unwrap();

    let doc = gateway.get(Collection::Orders, "o1").await.unwrap().unwrap();
    assert_eq!(doc.body, json!({"status": "completed", "total": 1299}));

    let missing = gateway
        .update(Collection::Orders, "o2", json!({"status": "completed"}))
        .await;
    assert!(matches!(missing, Err(PersistenceError::NotFound { .. })));
}

#[tokio::test]
#[serial]
async fn delete_and_clear() {
    let gateway = get_test_gateway().await;

    for id in ["o1", "o2", "o3"] {
        gateway
            .put(Collection::Orders, id, json!({}))
            .await
            .unwrap();
    }

    assert!(gateway.delete(Collection::Orders, "o1").await.unwrap());
    assert!(!gateway.delete(Collection::Orders, "o1").await.unwrap());
    assert_eq!(gateway.clear(Collection::Orders).await.unwrap(), 2);
    assert!(gateway.list(Collection::Orders).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn counters_are_monotonic_until_reset() {
    let gateway = get_test_gateway().await;

    assert_eq!(gateway.increment_counter("orderNumber").await.unwrap(), 1);
    assert_eq!(gateway.increment_counter("orderNumber").await.unwrap(), 2);
    assert_eq!(gateway.increment_counter("other").await.unwrap(), 1);

    gateway.reset_counter("orderNumber").await.unwrap();
    assert_eq!(gateway.increment_counter("orderNumber").await.unwrap(), 1);
}

#[tokio::test]
#[serial]
async fn typed_round_trip() {
    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Category {
        id: String,
        name: String,
    }

    let gateway = get_test_gateway().await;
    let category = Category {
        id: "drinks".to_string(),
        name: "Drinks".to_string(),
    };

    gateway
        .put_as(Collection::Categories, &category.id, &category)
        .await
        .unwrap();

    let loaded: Option<Category> = gateway
        .get_as(Collection::Categories, "drinks")
        .await
        .unwrap();
    assert_eq!(loaded, Some(category));
}
