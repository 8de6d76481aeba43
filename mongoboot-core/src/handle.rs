//! Session handle over one bootstrapped cluster connection.
//!
//! A [`Handle`] owns a driver client bound to one database. Establish one at
//! startup, then derive a handle per unit of work:
//!
//! - [`Handle::clone_session`] builds an independent pool against the same
//!   cluster with the same credentials. Closing either handle leaves the
//!   other usable.
//! - [`Handle::copy_session`] shares the original's pool. Cheaper, but the copy
//!   stops working once the pool owner closes.
//!
//! Reads and writes on one handle follow the monotonic/majority policy installed
//! at bootstrap. No ordering holds across different handles.

use crate::error::{BootstrapError, BoxedCause};
use crate::Result;
use async_trait::async_trait;
use mongodb::bson::Document;
use mongodb::options::{ClientOptions, SelectionCriteria, WriteConcern};
use mongodb::{Client, Collection, Database, IndexModel};

/// Live, configured session bound to one target database.
///
/// Not `Clone`: duplicating a handle is an explicit choice between
/// [`clone_session`](Self::clone_session) and [`copy_session`](Self::copy_session).
pub struct Handle {
    client: Client,
    database: Database,
    options: ClientOptions,
    owns_pool: bool,
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("database", &self.database.name())
            .field("owns_pool", &self.owns_pool)
            // Note: options are omitted, they may carry credentials
            .finish_non_exhaustive()
    }
}

impl Handle {
    /// Wraps a driver client that owns its pool.
    pub(crate) fn new(client: Client, options: ClientOptions, database: &str) -> Self {
        let database = client.database(database);
        Self {
            client,
            database,
            options,
            owns_pool: true,
        }
    }

    /// Name of the bound database.
    pub fn name(&self) -> &str {
        self.database.name()
    }

    /// Bound database.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Underlying driver client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Typed collection in the bound database.
    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.database.collection(name)
    }

    /// Write concern presented to the server for writes through this handle.
    pub fn write_concern(&self) -> Option<&WriteConcern> {
        self.database.write_concern()
    }

    /// Read preference used for reads through this handle.
    pub fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        self.database.selection_criteria()
    }

    /// Whether closing this handle shuts down its connection pool.
    pub fn owns_pool(&self) -> bool {
        self.owns_pool
    }

    /// Round-trips a `ping` to verify the session is usable.
    ///
    /// # Errors
    /// Returns a connection error if the server cannot be reached.
    pub async fn ping(&self) -> Result<()> {
        self.ping_driver().await.map_err(|e| {
            BootstrapError::connection_failed(format!("pinging database '{}'", self.name()), e)
        })
    }

    pub(crate) async fn ping_driver(&self) -> mongodb::error::Result<()> {
        self.client
            .database("admin")
            .run_command(mongodb::bson::doc! { "ping": 1 })
            .await?;
        Ok(())
    }

    /// Creates a handle with its own connection pool, rebound to the same database.
    ///
    /// Connections are established lazily on first use. The new handle is
    /// unaffected by closing `self`.
    ///
    /// # Errors
    /// Returns a connection error if the driver rejects the retained options.
    pub fn clone_session(&self) -> Result<Self> {
        let client = Client::with_options(self.options.clone()).map_err(|e| {
            BootstrapError::connection_failed(
                format!("cloning session for database '{}'", self.name()),
                e,
            )
        })?;

        tracing::debug!("Cloned session for database '{}'", self.name());
        Ok(Self::new(client, self.options.clone(), self.name()))
    }

    /// Creates a handle sharing this handle's connection pool.
    pub fn copy_session(&self) -> Self {
        let client = self.client.clone();
        let database = client.database(self.name());
        Self {
            client,
            database,
            options: self.options.clone(),
            owns_pool: false,
        }
    }

    /// Releases the session.
    ///
    /// A pool owner shuts its pool down, which also invalidates copies made from
    /// it. A copy only drops its reference to the shared pool.
    pub async fn close(self) {
        tracing::debug!(
            "Closing session for database '{}' (owns_pool={})",
            self.name(),
            self.owns_pool
        );
        if self.owns_pool {
            self.client.shutdown().await;
        }
    }

    /// Ensures every declared index exists.
    ///
    /// See [`ensure_indexes`].
    ///
    /// # Errors
    /// Returns an index error for the first index that fails.
    pub async fn ensure_indexes<I, S>(&self, plan: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, Vec<IndexModel>)> + Send,
        I::IntoIter: Send,
        S: AsRef<str> + Send,
    {
        ensure_indexes(&self.database, plan).await
    }
}

/// Destination that can create one index on a named collection.
#[async_trait]
pub trait IndexTarget: Send + Sync {
    /// Requests creation of `index` on `collection`.
    async fn create_index(
        &self,
        collection: &str,
        index: IndexModel,
    ) -> std::result::Result<(), BoxedCause>;
}

#[async_trait]
impl IndexTarget for Database {
    async fn create_index(
        &self,
        collection: &str,
        index: IndexModel,
    ) -> std::result::Result<(), BoxedCause> {
        self.collection::<Document>(collection)
            .create_index(index)
            .await?;
        Ok(())
    }
}

/// Creates indexes collection by collection, in plan order.
///
/// Within a collection indexes are created in declared order. The first
/// failure stops the run; indexes created before it are kept.
///
/// # Errors
/// Returns an index error naming the collection and index that failed.
pub async fn ensure_indexes<T, I, S>(target: &T, plan: I) -> Result<()>
where
    T: IndexTarget + ?Sized,
    I: IntoIterator<Item = (S, Vec<IndexModel>)> + Send,
    I::IntoIter: Send,
    S: AsRef<str> + Send,
{
    let mut created: usize = 0;

    for (collection, indexes) in plan {
        let collection = collection.as_ref();
        for index in indexes {
            let label = index_label(&index);
            target.create_index(collection, index).await.map_err(|e| {
                BootstrapError::index_failed(
                    format!("creating index {} on collection '{}'", label, collection),
                    e,
                )
            })?;
            created = created.saturating_add(1);
            tracing::debug!("Ensured index {} on '{}'", label, collection);
        }
    }

    tracing::info!("Ensured {} index(es)", created);
    Ok(())
}

/// Index name if set, otherwise its key document.
fn index_label(index: &IndexModel) -> String {
    index
        .options
        .as_ref()
        .and_then(|o| o.name.clone())
        .unwrap_or_else(|| index.keys.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;
    use mongodb::options::IndexOptions;
    use std::sync::Mutex;

    /// Records every request and fails on one index name.
    #[derive(Default)]
    struct RecordingTarget {
        fail_on: Option<&'static str>,
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl IndexTarget for RecordingTarget {
        async fn create_index(
            &self,
            collection: &str,
            index: IndexModel,
        ) -> std::result::Result<(), BoxedCause> {
            let label = index_label(&index);
            self.calls
                .lock()
                .unwrap()
                .push((collection.to_string(), label.clone()));
            if self.fail_on == Some(label.as_str()) {
                return Err("E11000 duplicate key error".into());
            }
            Ok(())
        }
    }

    fn named(name: &str, field: &str) -> IndexModel {
        let mut keys = Document::new();
        keys.insert(field, 1);
        IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().name(name.to_string()).build())
            .build()
    }

    #[tokio::test]
    async fn test_ensure_indexes_in_declared_order() {
        let target = RecordingTarget::default();
        let plan = vec![
            ("users", vec![named("idxA", "email"), named("idxB", "login")]),
            ("orders", vec![named("idxC", "created_at")]),
        ];

        ensure_indexes(&target, plan).await.unwrap();

        let calls = target.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                ("users".to_string(), "idxA".to_string()),
                ("users".to_string(), "idxB".to_string()),
                ("orders".to_string(), "idxC".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_ensure_indexes_stops_at_first_failure() {
        let target = RecordingTarget {
            fail_on: Some("idxB"),
            ..RecordingTarget::default()
        };
        let plan = vec![
            ("users", vec![named("idxA", "email"), named("idxB", "login")]),
            ("orders", vec![named("idxC", "created_at")]),
        ];

        let err = ensure_indexes(&target, plan).await.unwrap_err();

        assert!(matches!(err, BootstrapError::Index { .. }));
        assert!(err.to_string().contains("creating index idxB"));
        assert!(err.to_string().contains("'users'"));

        let calls = target.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert!(!calls.iter().any(|(_, label)| label == "idxC"));
    }

    #[tokio::test]
    async fn test_ensure_indexes_empty_plan() {
        let target = RecordingTarget::default();
        let plan: Vec<(String, Vec<IndexModel>)> = Vec::new();
        ensure_indexes(&target, plan).await.unwrap();
        assert!(target.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_index_label_falls_back_to_keys() {
        let index = IndexModel::builder().keys(doc! { "sku": -1 }).build();
        assert!(index_label(&index).contains("sku"));
        assert_eq!(index_label(&named("by_email", "email")), "by_email");
    }
}
