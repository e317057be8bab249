use std::{collections::BTreeMap, fmt};

use async_trait::async_trait;
use bson::{Bson, Document};
use crawldb_core::{
    backend::{Namespace, StoreBackend, UpdateOutcome},
    error::{StoreError, StoreResult},
    index::IndexModel,
    query::{DeleteOptions, FindOptions, UpdateOptions},
};
use futures::TryStreamExt;
use mongodb::{
    Client, ClientSession, Collection as MongoCollection, Cursor, IndexModel as MongoIndexModel,
    SessionCursor,
    options::{Hint, IndexOptions},
};

use crate::error::MongoDbStoreError;

/// A [`StoreBackend`] over a pooled MongoDB [`Client`].
///
/// Cloning is cheap; every clone shares the driver's connection pool.
#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
}

impl MongoDbStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// The underlying driver client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn get_collection(&self, namespace: &Namespace) -> MongoCollection<Document> {
        self.client
            .database(&namespace.database)
            .collection(&namespace.collection)
    }
}

/// Cursor returned by [`MongoDbStore::find`](StoreBackend::find).
pub enum MongoDbCursor {
    Plain(Cursor<Document>),
    Session(SessionCursor<Document>),
}

impl fmt::Debug for MongoDbCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MongoDbCursor::Plain(_) => f.write_str("MongoDbCursor::Plain"),
            MongoDbCursor::Session(_) => f.write_str("MongoDbCursor::Session"),
        }
    }
}

fn to_mongo_index(index: IndexModel) -> MongoIndexModel {
    let name = index.resolved_name();

    MongoIndexModel::builder()
        .keys(index.keys)
        .options(
            IndexOptions::builder()
                .name(name)
                .unique(index.unique)
                .build()
        )
        .build()
}

fn outcome(result: mongodb::results::UpdateResult) -> UpdateOutcome {
    UpdateOutcome {
        matched: result.matched_count,
        modified: result.modified_count,
        upserted_id: result.upserted_id,
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    type Session = ClientSession;
    type Cursor = MongoDbCursor;

    async fn insert_one(
        &self,
        namespace: &Namespace,
        document: Document,
        session: Option<&mut ClientSession>,
    ) -> StoreResult<Bson> {
        let collection = self.get_collection(namespace);
        let mut action = collection.insert_one(document);
        if let Some(session) = session {
            action = action.session(session);
        }

        Ok(action
            .await
            .map_err(|e| StoreError::operation(e))?
            .inserted_id)
    }

    async fn insert_many(
        &self,
        namespace: &Namespace,
        documents: Vec<Document>,
        session: Option<&mut ClientSession>,
    ) -> StoreResult<Vec<Bson>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let collection = self.get_collection(namespace);
        let mut action = collection.insert_many(documents);
        if let Some(session) = session {
            action = action.session(session);
        }

        let result = action.await.map_err(|e| StoreError::operation(e))?;

        // The driver reports identifiers keyed by input position.
        Ok(result
            .inserted_ids
            .into_iter()
            .collect::<BTreeMap<usize, Bson>>()
            .into_values()
            .collect())
    }

    async fn update_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        options: UpdateOptions,
        session: Option<&mut ClientSession>,
    ) -> StoreResult<UpdateOutcome> {
        let collection = self.get_collection(namespace);
        let mut action = collection.update_one(filter, update).upsert(options.upsert);
        if let Some(session) = session {
            action = action.session(session);
        }

        Ok(outcome(action.await.map_err(|e| StoreError::operation(e))?))
    }

    async fn update_many(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        options: UpdateOptions,
        session: Option<&mut ClientSession>,
    ) -> StoreResult<UpdateOutcome> {
        let collection = self.get_collection(namespace);
        let mut action = collection.update_many(filter, update).upsert(options.upsert);
        if let Some(session) = session {
            action = action.session(session);
        }

        Ok(outcome(action.await.map_err(|e| StoreError::operation(e))?))
    }

    async fn replace_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        replacement: Document,
        options: UpdateOptions,
        session: Option<&mut ClientSession>,
    ) -> StoreResult<UpdateOutcome> {
        let collection = self.get_collection(namespace);
        let mut action = collection
            .replace_one(filter, replacement)
            .upsert(options.upsert);
        if let Some(session) = session {
            action = action.session(session);
        }

        Ok(outcome(action.await.map_err(|e| StoreError::operation(e))?))
    }

    async fn delete_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        options: DeleteOptions,
        session: Option<&mut ClientSession>,
    ) -> StoreResult<u64> {
        let collection = self.get_collection(namespace);
        let mut action = collection.delete_one(filter);
        if let Some(hint) = options.hint {
            action = action.hint(Hint::Name(hint));
        }
        if let Some(session) = session {
            action = action.session(session);
        }

        Ok(action
            .await
            .map_err(|e| StoreError::operation(e))?
            .deleted_count)
    }

    async fn delete_many(
        &self,
        namespace: &Namespace,
        filter: Document,
        options: DeleteOptions,
        session: Option<&mut ClientSession>,
    ) -> StoreResult<u64> {
        let collection = self.get_collection(namespace);
        let mut action = collection.delete_many(filter);
        if let Some(hint) = options.hint {
            action = action.hint(Hint::Name(hint));
        }
        if let Some(session) = session {
            action = action.session(session);
        }

        Ok(action
            .await
            .map_err(|e| StoreError::operation(e))?
            .deleted_count)
    }

    async fn find(
        &self,
        namespace: &Namespace,
        filter: Document,
        options: FindOptions,
        session: Option<&mut ClientSession>,
    ) -> StoreResult<MongoDbCursor> {
        let collection = self.get_collection(namespace);
        let mut action = collection
            .find(filter)
            .skip(options.skip)
            .limit(options.limit);
        if let Some(sort) = options.sort {
            action = action.sort(sort);
        }

        match session {
            Some(session) => action
                .session(session)
                .await
                .map(MongoDbCursor::Session)
                .map_err(|e| StoreError::operation(e)),
            None => action
                .await
                .map(MongoDbCursor::Plain)
                .map_err(|e| StoreError::operation(e)),
        }
    }

    async fn next_document(
        &self,
        cursor: &mut MongoDbCursor,
        session: Option<&mut ClientSession>,
    ) -> StoreResult<Option<Document>> {
        match cursor {
            MongoDbCursor::Plain(cursor) => cursor
                .try_next()
                .await
                .map_err(|e| StoreError::operation(e)),
            MongoDbCursor::Session(cursor) => {
                let session = session
                    .ok_or_else(|| StoreError::operation(MongoDbStoreError::SessionRequired))?;

                cursor
                    .next(session)
                    .await
                    .transpose()
                    .map_err(|e| StoreError::operation(e))
            }
        }
    }

    async fn find_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        session: Option<&mut ClientSession>,
    ) -> StoreResult<Option<Document>> {
        let collection = self.get_collection(namespace);
        let mut action = collection.find_one(filter);
        if let Some(session) = session {
            action = action.session(session);
        }

        action.await.map_err(|e| StoreError::operation(e))
    }

    async fn count_documents(
        &self,
        namespace: &Namespace,
        filter: Document,
        session: Option<&mut ClientSession>,
    ) -> StoreResult<u64> {
        let collection = self.get_collection(namespace);
        let mut action = collection.count_documents(filter);
        if let Some(session) = session {
            action = action.session(session);
        }

        action.await.map_err(|e| StoreError::operation(e))
    }

    async fn create_indexes(
        &self,
        namespace: &Namespace,
        indexes: Vec<IndexModel>,
    ) -> StoreResult<Vec<String>> {
        Ok(self
            .get_collection(namespace)
            .create_indexes(indexes.into_iter().map(to_mongo_index))
            .await
            .map_err(|e| StoreError::operation(e))?
            .index_names)
    }

    async fn drop_index(&self, namespace: &Namespace, name: &str) -> StoreResult<()> {
        self.get_collection(namespace)
            .drop_index(name)
            .await
            .map_err(|e| StoreError::operation(e))
    }

    async fn drop_indexes(&self, namespace: &Namespace) -> StoreResult<()> {
        self.get_collection(namespace)
            .drop_indexes()
            .await
            .map_err(|e| StoreError::operation(e))
    }

    async fn list_indexes(&self, namespace: &Namespace) -> StoreResult<Vec<Document>> {
        self.get_collection(namespace)
            .list_indexes()
            .await
            .map_err(|e| StoreError::operation(e))?
            .try_collect::<Vec<MongoIndexModel>>()
            .await
            .map_err(|e| StoreError::operation(e))?
            .iter()
            .map(|index| Ok(bson::ser::serialize_to_document(index)?))
            .collect()
    }

    async fn create_collection(&self, namespace: &Namespace) -> StoreResult<()> {
        self.client
            .database(&namespace.database)
            .create_collection(&namespace.collection)
            .await
            .map_err(|e| StoreError::operation(e))
    }

    async fn list_collection_names(&self, database: &str) -> StoreResult<Vec<String>> {
        self.client
            .database(database)
            .list_collection_names()
            .await
            .map_err(|e| StoreError::operation(e))
    }

    async fn drop_database(&self, database: &str) -> StoreResult<()> {
        self.client
            .database(database)
            .drop()
            .await
            .map_err(|e| StoreError::operation(e))
    }

    async fn start_session(&self) -> StoreResult<ClientSession> {
        self.client
            .start_session()
            .await
            .map_err(|e| StoreError::operation(e))
    }

    async fn start_transaction(&self, session: &mut ClientSession) -> StoreResult<()> {
        session
            .start_transaction()
            .await
            .map_err(|e| StoreError::operation(e))
    }

    async fn commit_transaction(&self, session: &mut ClientSession) -> StoreResult<()> {
        session
            .commit_transaction()
            .await
            .map_err(|e| StoreError::operation(e))
    }

    async fn abort_transaction(&self, session: &mut ClientSession) -> StoreResult<()> {
        session
            .abort_transaction()
            .await
            .map_err(|e| StoreError::operation(e))
    }

    async fn shutdown(&self) -> StoreResult<()> {
        self.client.clone().shutdown().await;

        Ok(())
    }
}
