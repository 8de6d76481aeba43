//! Bootstrap and handle lifecycle tests against a real MongoDB using testcontainers.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use mongoboot_core::{BootstrapConfig, BootstrapError, Handle, connect, connect_with};
use std::time::Duration;
use mongodb::IndexModel;
use mongodb::bson::{Document, doc};
use mongodb::options::{Acknowledgment, IndexOptions};
use testcontainers_modules::mongo::Mongo;
use testcontainers_modules::testcontainers::ContainerAsync;
use testcontainers_modules::testcontainers::runners::AsyncRunner;

/// Starts MongoDB and bootstraps a plain-transport handle bound to `test`.
async fn start_and_connect() -> (ContainerAsync<Mongo>, Handle) {
    let container = Mongo::default()
        .start()
        .await
        .expect("Failed to start MongoDB container");

    let uri = container_uri(&container, "").await;
    let handle = connect(&uri, "", "").await.expect("Failed to bootstrap");

    (container, handle)
}

/// Connection string for the container, with optional `user:password@` userinfo.
async fn container_uri(container: &ContainerAsync<Mongo>, userinfo: &str) -> String {
    let port = container
        .get_host_port_ipv4(27017)
        .await
        .expect("Failed to get MongoDB port");

    format!("mongodb://{}localhost:{}/test", userinfo, port)
}

fn named_index(name: &str, keys: Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().name(name.to_string()).build())
        .build()
}

async fn index_names(handle: &Handle, collection: &str) -> Vec<String> {
    handle
        .collection::<Document>(collection)
        .list_index_names()
        .await
        .unwrap_or_default()
}

#[tokio::test]
async fn test_mongodb_plain_connect_binds_database() {
    let (_container, handle) = start_and_connect().await;

    assert_eq!(handle.name(), "test");
    assert!(handle.owns_pool());
    assert_eq!(
        handle.write_concern().and_then(|w| w.w.clone()),
        Some(Acknowledgment::Majority)
    );
    assert!(handle.selection_criteria().is_some());

    handle
        .collection::<Document>("events")
        .insert_one(doc! { "kind": "boot" })
        .await
        .expect("Majority write on a single-node deployment should succeed");

    let found = handle
        .collection::<Document>("events")
        .find_one(doc! { "kind": "boot" })
        .await
        .unwrap();
    assert!(found.is_some());

    handle.close().await;
}

#[tokio::test]
async fn test_mongodb_clone_outlives_original() {
    let (_container, handle) = start_and_connect().await;

    let cloned = handle.clone_session().expect("Failed to clone session");
    assert_eq!(cloned.name(), "test");
    assert!(cloned.owns_pool());

    handle.close().await;

    cloned
        .ping()
        .await
        .expect("Clone must stay usable after the original closes");
    cloned
        .collection::<Document>("events")
        .insert_one(doc! { "kind": "after-close" })
        .await
        .unwrap();

    cloned.close().await;
}

#[tokio::test]
async fn test_mongodb_copy_shares_pool() {
    let (_container, handle) = start_and_connect().await;

    let copy = handle.copy_session();
    assert!(!copy.owns_pool());
    assert_eq!(copy.name(), "test");
    copy.ping().await.unwrap();

    // Closing a copy leaves the owner's pool alone
    copy.close().await;
    handle.ping().await.unwrap();

    handle.close().await;
}

#[tokio::test]
async fn test_mongodb_copy_fails_after_owner_closes() {
    let (_container, handle) = start_and_connect().await;

    let copy = handle.copy_session();
    copy.ping().await.unwrap();

    handle.close().await;

    let err = copy.ping().await.unwrap_err();
    assert!(matches!(err, BootstrapError::Connection { .. }));

    copy.close().await;
}

#[tokio::test]
async fn test_mongodb_wrong_password_is_auth_error() {
    let (container, handle) = start_and_connect().await;

    handle
        .client()
        .database("admin")
        .run_command(doc! {
            "createUser": "app",
            "pwd": "correct-horse",
            "roles": [{ "role": "readWrite", "db": "test" }],
        })
        .await
        .expect("Failed to create user");
    handle.close().await;

    let uri = format!(
        "{}?authSource=admin",
        container_uri(&container, "app:wrong-password@").await
    );
    let config = BootstrapConfig::new(uri).with_dial_timeout(Duration::from_secs(5));
    let err = connect_with(&config).await.unwrap_err();

    assert!(matches!(err, BootstrapError::Auth { .. }));
    assert!(!err.to_string().contains("wrong-password"));
}

#[tokio::test]
async fn test_mongodb_ensure_indexes_creates_all() {
    let (_container, handle) = start_and_connect().await;

    let plan = vec![
        (
            "users",
            vec![
                named_index("idxA", doc! { "email": 1 }),
                named_index("idxB", doc! { "login": 1, "created_at": -1 }),
            ],
        ),
        ("orders", vec![named_index("idxC", doc! { "placed_at": -1 })]),
    ];

    handle.ensure_indexes(plan).await.unwrap();

    let users = index_names(&handle, "users").await;
    assert!(users.contains(&"idxA".to_string()));
    assert!(users.contains(&"idxB".to_string()));
    assert!(index_names(&handle, "orders").await.contains(&"idxC".to_string()));

    handle.close().await;
}

#[tokio::test]
async fn test_mongodb_ensure_indexes_aborts_without_rollback() {
    let (_container, handle) = start_and_connect().await;

    let plan = vec![
        (
            "users",
            vec![
                named_index("idxA", doc! { "email": 1 }),
                named_index("idxB", doc! { "login": "no-such-index-type" }),
            ],
        ),
        ("orders", vec![named_index("idxC", doc! { "placed_at": -1 })]),
    ];

    let err = handle.ensure_indexes(plan).await.unwrap_err();
    assert!(matches!(err, BootstrapError::Index { .. }));
    assert!(err.to_string().contains("idxB"));

    assert!(index_names(&handle, "users").await.contains(&"idxA".to_string()));
    assert!(!index_names(&handle, "orders").await.contains(&"idxC".to_string()));

    handle.close().await;
}
