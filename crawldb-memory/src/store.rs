//! In-memory storage implementation.
//!
//! Documents live in insertion order per collection, behind one async-aware
//! read-write lock. Transactions work on a private copy of the whole store
//! taken when the transaction starts; committing swaps the copy in, provided
//! nothing else wrote to the store in the meantime.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use bson::{Bson, Document, doc, oid::ObjectId};
use mea::rwlock::RwLock;
use tracing::debug;

use crawldb_core::{
    backend::{Namespace, StoreBackend, UpdateOutcome},
    error::{StoreError, StoreResult},
    index::{IndexModel, PRIMARY_INDEX_NAME},
    query::{DeleteOptions, FindOptions, UpdateOptions},
};

use crate::{
    error::MemoryStoreError,
    evaluator::{Comparable, compare_by, lookup, matches, parse_sort},
    update::{
        apply_replacement, apply_update, seed_from_filter, validate_replacement, validate_update,
    },
};

type Collections = BTreeMap<String, CollectionState>;

#[derive(Debug, Clone, Default)]
struct StoreState {
    /// Bumped by every write that changes the store and by every commit.
    revision: u64,
    databases: BTreeMap<String, Collections>,
}

#[derive(Debug, Clone, Default)]
struct CollectionState {
    documents: Vec<Document>,
    /// Secondary indexes; the primary key index is implicit.
    indexes: Vec<IndexModel>,
}

#[derive(Clone, Copy)]
enum Mutation<'a> {
    Update(&'a Document),
    Replace(&'a Document),
}

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, so
/// clones share the same data. Queries scan the whole collection; indexes are
/// tracked for listing and uniqueness only.
///
/// # Example
///
/// ```ignore
/// use crawldb_core::{backend::{Namespace, StoreBackend}, query::FindOptions};
/// use crawldb_memory::InMemoryStore;
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// let pages = Namespace::new("crawler", "pages");
/// let id = store.insert_one(&pages, doc! { "url": "/a" }, None).await?;
/// assert_eq!(store.count_documents(&pages, doc! {}, None).await?, 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

/// A session of the in-memory store.
#[derive(Debug, Default)]
pub struct MemorySession {
    transaction: Option<Transaction>,
}

impl MemorySession {
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }
}

#[derive(Debug)]
struct Transaction {
    base_revision: u64,
    working: StoreState,
}

/// Results of a find, materialized when the query ran.
#[derive(Debug, Default)]
pub struct MemoryCursor {
    documents: VecDeque<Document>,
}

impl MemoryCursor {
    /// Number of documents not yet consumed.
    pub fn remaining(&self) -> usize {
        self.documents.len()
    }
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs a write against the session's transaction, or against the shared
    /// state when there is none.
    async fn write<R, F>(&self, session: Option<&mut MemorySession>, operation: F) -> StoreResult<R>
    where
        F: FnOnce(&mut StoreState) -> Result<R, MemoryStoreError> + Send,
        R: Send,
    {
        if let Some(transaction) = session.and_then(|s| s.transaction.as_mut()) {
            return operation(&mut transaction.working).map_err(|e| StoreError::operation(e));
        }

        let mut state = self.state.write().await;
        operation(&mut *state).map_err(|e| StoreError::operation(e))
    }

    /// Runs a read against the session's transaction snapshot, or against the
    /// shared state when there is none.
    async fn read<R, F>(&self, session: Option<&mut MemorySession>, operation: F) -> StoreResult<R>
    where
        F: FnOnce(&StoreState) -> Result<R, MemoryStoreError> + Send,
        R: Send,
    {
        if let Some(transaction) = session.and_then(|s| s.transaction.as_ref()) {
            return operation(&transaction.working).map_err(|e| StoreError::operation(e));
        }

        let state = self.state.read().await;
        operation(&*state).map_err(|e| StoreError::operation(e))
    }
}

/// Ensures the document has an `_id`, generating an ObjectId in front when it
/// has none.
fn with_id(document: Document) -> (Bson, Document) {
    if let Some(id) = document.get("_id") {
        return (id.clone(), document);
    }

    let id = Bson::ObjectId(ObjectId::new());
    let mut identified = doc! { "_id": id.clone() };
    identified.extend(document);
    (id, identified)
}

fn index_key(document: &Document, keys: &Document) -> Vec<Bson> {
    keys.keys()
        .map(|path| {
            lookup(document, path)
                .first()
                .map(|value| (*value).clone())
                .unwrap_or(Bson::Null)
        })
        .collect()
}

fn same_key(a: &[Bson], b: &[Bson]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(a, b)| Comparable::from(a) == Comparable::from(b))
}

fn render_key(key: &[Bson]) -> String {
    key.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl StoreState {
    /// Records a change so open transactions can detect it at commit.
    fn touch(&mut self) {
        self.revision += 1;
    }

    fn collection(&self, namespace: &Namespace) -> Option<&CollectionState> {
        self.databases
            .get(&namespace.database)?
            .get(&namespace.collection)
    }

    fn collection_mut(&mut self, namespace: &Namespace) -> Option<&mut CollectionState> {
        self.databases
            .get_mut(&namespace.database)?
            .get_mut(&namespace.collection)
    }

    /// Collections spring into existence on first write.
    fn collection_or_create(&mut self, namespace: &Namespace) -> &mut CollectionState {
        if self.collection(namespace).is_none() {
            self.touch();
        }

        self.databases
            .entry(namespace.database.clone())
            .or_default()
            .entry(namespace.collection.clone())
            .or_default()
    }

    fn insert(
        &mut self,
        namespace: &Namespace,
        documents: Vec<Document>,
    ) -> Result<Vec<Bson>, MemoryStoreError> {
        let mut ids = Vec::with_capacity(documents.len());

        for document in documents {
            let (id, document) = with_id(document);
            let collection = self.collection_or_create(namespace);
            collection.check_unique(namespace, &document, None)?;
            collection.documents.push(document);
            self.touch();
            ids.push(id);
        }

        Ok(ids)
    }

    fn mutate(
        &mut self,
        namespace: &Namespace,
        filter: &Document,
        mutation: Mutation<'_>,
        options: &UpdateOptions,
        multi: bool,
    ) -> Result<UpdateOutcome, MemoryStoreError> {
        match mutation {
            Mutation::Update(update) => validate_update(update)?,
            Mutation::Replace(replacement) => validate_replacement(replacement)?,
        }

        let limit = if multi { usize::MAX } else { 1 };
        let matched = match self.collection(namespace) {
            Some(collection) => collection.matching(filter, limit)?,
            None => Vec::new(),
        };

        if matched.is_empty() {
            if !options.upsert {
                return Ok(UpdateOutcome::default());
            }
            return self.upsert(namespace, filter, mutation);
        }

        let mut modified = 0;
        for &position in &matched {
            let collection = self.collection_or_create(namespace);
            let mut updated = collection.documents[position].clone();
            match mutation {
                Mutation::Update(update) => apply_update(&mut updated, update, false)?,
                Mutation::Replace(replacement) => apply_replacement(&mut updated, replacement)?,
            }

            if updated != collection.documents[position] {
                collection.check_unique(namespace, &updated, Some(position))?;
                collection.documents[position] = updated;
                self.touch();
                modified += 1;
            }
        }

        Ok(UpdateOutcome {
            matched: matched.len() as u64,
            modified,
            upserted_id: None,
        })
    }

    fn upsert(
        &mut self,
        namespace: &Namespace,
        filter: &Document,
        mutation: Mutation<'_>,
    ) -> Result<UpdateOutcome, MemoryStoreError> {
        let seed = seed_from_filter(filter)?;
        let document = match mutation {
            Mutation::Update(update) => {
                let mut document = seed;
                apply_update(&mut document, update, true)?;
                document
            }
            Mutation::Replace(replacement) => {
                let mut document = Document::new();
                if let Some(id) = seed.get("_id") {
                    document.insert("_id", id.clone());
                }
                apply_replacement(&mut document, replacement)?;
                document
            }
        };

        let (id, document) = with_id(document);
        let collection = self.collection_or_create(namespace);
        collection.check_unique(namespace, &document, None)?;
        collection.documents.push(document);
        self.touch();

        Ok(UpdateOutcome {
            matched: 0,
            modified: 0,
            upserted_id: Some(id),
        })
    }

    fn delete(
        &mut self,
        namespace: &Namespace,
        filter: &Document,
        options: &DeleteOptions,
        multi: bool,
    ) -> Result<u64, MemoryStoreError> {
        let Some(collection) = self.collection_mut(namespace) else {
            return Ok(0);
        };

        if let Some(hint) = &options.hint {
            let known = hint == PRIMARY_INDEX_NAME
                || collection.indexes.iter().any(|i| &i.resolved_name() == hint);
            if !known {
                return Err(MemoryStoreError::BadHint(hint.clone()));
            }
        }

        let limit = if multi { usize::MAX } else { 1 };
        let matched = collection.matching(filter, limit)?;
        for &position in matched.iter().rev() {
            collection.documents.remove(position);
        }

        if !matched.is_empty() {
            self.touch();
        }
        Ok(matched.len() as u64)
    }

    fn find(
        &self,
        namespace: &Namespace,
        filter: &Document,
        options: &FindOptions,
    ) -> Result<Vec<Document>, MemoryStoreError> {
        let sort_keys = match &options.sort {
            Some(sort) => parse_sort(sort)?,
            None => Vec::new(),
        };
        let Some(collection) = self.collection(namespace) else {
            return Ok(Vec::new());
        };

        let mut documents: Vec<Document> = collection
            .matching(filter, usize::MAX)?
            .into_iter()
            .map(|position| collection.documents[position].clone())
            .collect();

        if !sort_keys.is_empty() {
            documents.sort_by(|a, b| compare_by(a, b, &sort_keys));
        }

        let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
        let take = match options.limit {
            0 => usize::MAX,
            limit => usize::try_from(limit.unsigned_abs()).unwrap_or(usize::MAX),
        };

        Ok(documents.into_iter().skip(skip).take(take).collect())
    }

    fn create_indexes(
        &mut self,
        namespace: &Namespace,
        indexes: Vec<IndexModel>,
    ) -> Result<Vec<String>, MemoryStoreError> {
        let mut names = Vec::with_capacity(indexes.len());

        for index in indexes {
            let name = index.resolved_name();
            if name == PRIMARY_INDEX_NAME {
                names.push(name);
                continue;
            }

            let collection = self.collection_or_create(namespace);
            match collection.indexes.iter().find(|i| i.resolved_name() == name) {
                Some(existing)
                    if existing.keys == index.keys && existing.unique == index.unique => {}
                Some(_) => {
                    return Err(MemoryStoreError::IndexConflict {
                        name,
                        namespace: namespace.to_string(),
                    });
                }
                None => {
                    if index.unique {
                        collection.validate_unique_index(namespace, &index)?;
                    }
                    collection.indexes.push(index);
                    self.touch();
                }
            }
            names.push(name);
        }

        Ok(names)
    }

    fn drop_index(&mut self, namespace: &Namespace, name: &str) -> Result<(), MemoryStoreError> {
        let collection = self
            .collection_mut(namespace)
            .ok_or_else(|| MemoryStoreError::NamespaceNotFound(namespace.to_string()))?;

        if name == PRIMARY_INDEX_NAME {
            return Err(MemoryStoreError::PrimaryIndex(namespace.to_string()));
        }

        let before = collection.indexes.len();
        collection.indexes.retain(|index| index.resolved_name() != name);
        if collection.indexes.len() == before {
            return Err(MemoryStoreError::IndexNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            });
        }

        self.touch();
        Ok(())
    }

    fn drop_indexes(&mut self, namespace: &Namespace) -> Result<(), MemoryStoreError> {
        let collection = self
            .collection_mut(namespace)
            .ok_or_else(|| MemoryStoreError::NamespaceNotFound(namespace.to_string()))?;

        if !collection.indexes.is_empty() {
            collection.indexes.clear();
            self.touch();
        }
        Ok(())
    }

    fn list_indexes(&self, namespace: &Namespace) -> Result<Vec<Document>, MemoryStoreError> {
        let collection = self
            .collection(namespace)
            .ok_or_else(|| MemoryStoreError::NamespaceNotFound(namespace.to_string()))?;

        let primary = IndexModel::new(doc! { "_id": 1 }).with_name(PRIMARY_INDEX_NAME);
        Ok(std::iter::once(&primary)
            .chain(collection.indexes.iter())
            .map(IndexModel::to_document)
            .collect())
    }

    fn create_collection(&mut self, namespace: &Namespace) -> Result<(), MemoryStoreError> {
        let collections = self.databases.entry(namespace.database.clone()).or_default();
        if collections.contains_key(&namespace.collection) {
            return Err(MemoryStoreError::NamespaceExists(namespace.to_string()));
        }

        collections.insert(namespace.collection.clone(), CollectionState::default());
        self.touch();
        Ok(())
    }
}

impl CollectionState {
    /// Positions of the matching documents in natural order, at most `limit`.
    fn matching(&self, filter: &Document, limit: usize) -> Result<Vec<usize>, MemoryStoreError> {
        let mut positions = Vec::new();
        for (position, document) in self.documents.iter().enumerate() {
            if positions.len() == limit {
                break;
            }
            if matches(document, filter)? {
                positions.push(position);
            }
        }
        Ok(positions)
    }

    /// Checks `candidate` against the primary key and every unique index,
    /// ignoring the document at `skip` (the one being rewritten).
    fn check_unique(
        &self,
        namespace: &Namespace,
        candidate: &Document,
        skip: Option<usize>,
    ) -> Result<(), MemoryStoreError> {
        let id = candidate.get("_id");
        let unique: Vec<_> = self
            .indexes
            .iter()
            .filter(|index| index.unique)
            .map(|index| (index, index_key(candidate, &index.keys)))
            .collect();

        for (position, existing) in self.documents.iter().enumerate() {
            if Some(position) == skip {
                continue;
            }

            if let (Some(id), Some(existing_id)) = (id, existing.get("_id")) {
                if Comparable::from(id) == Comparable::from(existing_id) {
                    return Err(MemoryStoreError::DuplicateKey {
                        namespace: namespace.to_string(),
                        index: PRIMARY_INDEX_NAME.to_string(),
                        key: id.to_string(),
                    });
                }
            }

            for (index, key) in &unique {
                if same_key(key, &index_key(existing, &index.keys)) {
                    return Err(MemoryStoreError::DuplicateKey {
                        namespace: namespace.to_string(),
                        index: index.resolved_name(),
                        key: render_key(key),
                    });
                }
            }
        }

        Ok(())
    }

    fn validate_unique_index(
        &self,
        namespace: &Namespace,
        index: &IndexModel,
    ) -> Result<(), MemoryStoreError> {
        let keys: Vec<_> = self
            .documents
            .iter()
            .map(|document| index_key(document, &index.keys))
            .collect();

        for (i, key) in keys.iter().enumerate() {
            if keys[i + 1..].iter().any(|other| same_key(key, other)) {
                return Err(MemoryStoreError::DuplicateKey {
                    namespace: namespace.to_string(),
                    index: index.resolved_name(),
                    key: render_key(key),
                });
            }
        }

        Ok(())
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    type Session = MemorySession;
    type Cursor = MemoryCursor;

    async fn insert_one(
        &self,
        namespace: &Namespace,
        document: Document,
        session: Option<&mut MemorySession>,
    ) -> StoreResult<Bson> {
        let mut ids = self
            .write(session, |state| state.insert(namespace, vec![document]))
            .await?;

        Ok(ids.pop().unwrap_or(Bson::Null))
    }

    async fn insert_many(
        &self,
        namespace: &Namespace,
        documents: Vec<Document>,
        session: Option<&mut MemorySession>,
    ) -> StoreResult<Vec<Bson>> {
        self.write(session, |state| state.insert(namespace, documents))
            .await
    }

    async fn update_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        options: UpdateOptions,
        session: Option<&mut MemorySession>,
    ) -> StoreResult<UpdateOutcome> {
        self.write(session, |state| {
            state.mutate(namespace, &filter, Mutation::Update(&update), &options, false)
        })
        .await
    }

    async fn update_many(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        options: UpdateOptions,
        session: Option<&mut MemorySession>,
    ) -> StoreResult<UpdateOutcome> {
        self.write(session, |state| {
            state.mutate(namespace, &filter, Mutation::Update(&update), &options, true)
        })
        .await
    }

    async fn replace_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        replacement: Document,
        options: UpdateOptions,
        session: Option<&mut MemorySession>,
    ) -> StoreResult<UpdateOutcome> {
        self.write(session, |state| {
            state.mutate(namespace, &filter, Mutation::Replace(&replacement), &options, false)
        })
        .await
    }

    async fn delete_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        options: DeleteOptions,
        session: Option<&mut MemorySession>,
    ) -> StoreResult<u64> {
        self.write(session, |state| state.delete(namespace, &filter, &options, false))
            .await
    }

    async fn delete_many(
        &self,
        namespace: &Namespace,
        filter: Document,
        options: DeleteOptions,
        session: Option<&mut MemorySession>,
    ) -> StoreResult<u64> {
        self.write(session, |state| state.delete(namespace, &filter, &options, true))
            .await
    }

    async fn find(
        &self,
        namespace: &Namespace,
        filter: Document,
        options: FindOptions,
        session: Option<&mut MemorySession>,
    ) -> StoreResult<MemoryCursor> {
        let documents = self
            .read(session, |state| state.find(namespace, &filter, &options))
            .await?;

        Ok(MemoryCursor {
            documents: documents.into(),
        })
    }

    async fn next_document(
        &self,
        cursor: &mut MemoryCursor,
        _session: Option<&mut MemorySession>,
    ) -> StoreResult<Option<Document>> {
        Ok(cursor.documents.pop_front())
    }

    async fn find_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        session: Option<&mut MemorySession>,
    ) -> StoreResult<Option<Document>> {
        let options = FindOptions::builder().limit(1).build();
        let mut documents = self
            .read(session, |state| state.find(namespace, &filter, &options))
            .await?;

        Ok(documents.pop())
    }

    async fn count_documents(
        &self,
        namespace: &Namespace,
        filter: Document,
        session: Option<&mut MemorySession>,
    ) -> StoreResult<u64> {
        self.read(session, |state| match state.collection(namespace) {
            Some(collection) => Ok(collection.matching(&filter, usize::MAX)?.len() as u64),
            None => Ok(0),
        })
        .await
    }

    async fn create_indexes(
        &self,
        namespace: &Namespace,
        indexes: Vec<IndexModel>,
    ) -> StoreResult<Vec<String>> {
        self.write(None, |state| state.create_indexes(namespace, indexes))
            .await
    }

    async fn drop_index(&self, namespace: &Namespace, name: &str) -> StoreResult<()> {
        self.write(None, |state| state.drop_index(namespace, name))
            .await
    }

    async fn drop_indexes(&self, namespace: &Namespace) -> StoreResult<()> {
        self.write(None, |state| state.drop_indexes(namespace))
            .await
    }

    async fn list_indexes(&self, namespace: &Namespace) -> StoreResult<Vec<Document>> {
        self.read(None, |state| state.list_indexes(namespace))
            .await
    }

    async fn create_collection(&self, namespace: &Namespace) -> StoreResult<()> {
        self.write(None, |state| state.create_collection(namespace))
            .await
    }

    async fn list_collection_names(&self, database: &str) -> StoreResult<Vec<String>> {
        self.read(None, |state| {
            Ok(state
                .databases
                .get(database)
                .map(|collections| collections.keys().cloned().collect())
                .unwrap_or_default())
        })
        .await
    }

    async fn drop_database(&self, database: &str) -> StoreResult<()> {
        self.write(None, |state| {
            if state.databases.remove(database).is_some() {
                state.touch();
            }
            Ok(())
        })
        .await
    }

    async fn start_session(&self) -> StoreResult<MemorySession> {
        Ok(MemorySession::default())
    }

    async fn start_transaction(&self, session: &mut MemorySession) -> StoreResult<()> {
        if session.transaction.is_some() {
            return Err(StoreError::operation(MemoryStoreError::TransactionInProgress));
        }

        let state = self.state.read().await;
        session.transaction = Some(Transaction {
            base_revision: state.revision,
            working: state.clone(),
        });
        debug!(revision = state.revision, "transaction started");

        Ok(())
    }

    async fn commit_transaction(&self, session: &mut MemorySession) -> StoreResult<()> {
        let transaction = session
            .transaction
            .take()
            .ok_or_else(|| StoreError::operation(MemoryStoreError::NoTransaction))?;

        let mut state = self.state.write().await;
        if state.revision != transaction.base_revision {
            return Err(StoreError::operation(MemoryStoreError::WriteConflict));
        }

        let mut working = transaction.working;
        working.revision = state.revision + 1;
        *state = working;
        debug!(revision = state.revision, "transaction committed");

        Ok(())
    }

    async fn abort_transaction(&self, session: &mut MemorySession) -> StoreResult<()> {
        session
            .transaction
            .take()
            .ok_or_else(|| StoreError::operation(MemoryStoreError::NoTransaction))?;

        Ok(())
    }
}
