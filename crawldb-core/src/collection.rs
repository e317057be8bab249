//! Collection handles for document CRUD, counting and index management.
//!
//! A [`Collection`] binds a collection name to a [`Database`] and an
//! [`ExecutionContext`]. Every operation runs in that context, so a collection
//! obtained inside a transaction joins the transaction.
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Page {
//!     url: String,
//!     depth: i32,
//! }
//!
//! # async fn example(database: &crawldb_core::database::Database<impl crawldb_core::backend::StoreBackend>) -> crawldb_core::error::StoreResult<()> {
//! let pages = database.collection("pages");
//! let id = pages.insert(&Page { url: "https://example.com".into(), depth: 0 }).await?;
//! let page: Page = pages.find_by_id(id).one().await?;
//! # Ok(()) }
//! ```
//!
//! # Filters
//!
//! Methods taking `Option<Document>` treat `None` as "match every document".
//! For [`update`](Collection::update), [`replace`](Collection::replace) and
//! [`delete`](Collection::delete) this means a bulk operation over the whole
//! collection.

use bson::{Bson, Document, oid::ObjectId};
use serde::Serialize;

use crate::{
    backend::{Namespace, StoreBackend},
    context::ExecutionContext,
    database::Database,
    error::{StoreError, StoreResult},
    index::IndexModel,
    query::{DeleteOptions, Filter, FindOptions, UpdateOptions},
    result::QueryResult,
};

/// A named collection bound to an execution context.
#[derive(Debug, Clone)]
pub struct Collection<B: StoreBackend> {
    context: ExecutionContext<B>,
    database: Database<B>,
    name: String,
}

impl<B: StoreBackend> Collection<B> {
    pub(crate) fn new(
        database: Database<B>,
        name: impl Into<String>,
        context: ExecutionContext<B>,
    ) -> Self {
        Self {
            context,
            database,
            name: name.into(),
        }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &ExecutionContext<B> {
        &self.context
    }

    pub fn database(&self) -> &Database<B> {
        &self.database
    }

    pub fn namespace(&self) -> Namespace {
        self.database.namespace(&self.name)
    }

    fn backend(&self) -> &B {
        self.database.backend()
    }

    /// Inserts one document and returns the identifier the store assigned.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TypeMismatch`] if the identifier is not an
    /// [`ObjectId`], and [`StoreError::StoreOperation`] if the store rejects
    /// the document.
    pub async fn insert<T>(&self, document: &T) -> StoreResult<ObjectId>
    where
        T: Serialize + ?Sized,
    {
        let document = to_document(document)?;
        let mut session = self.context.lock().await;
        let id = self
            .backend()
            .insert_one(&self.namespace(), document, session.as_deref_mut())
            .await?;

        expect_object_id(id)
    }

    /// Inserts documents in order and returns their identifiers in the same order.
    ///
    /// If any identifier is not an [`ObjectId`] the whole call fails with
    /// [`StoreError::TypeMismatch`]. The documents may still have been
    /// written; no rollback is attempted.
    pub async fn insert_many<I, T>(&self, documents: I) -> StoreResult<Vec<ObjectId>>
    where
        I: IntoIterator<Item = T>,
        T: Serialize,
    {
        let documents = documents
            .into_iter()
            .map(|document| to_document(&document))
            .collect::<StoreResult<Vec<_>>>()?;

        let mut session = self.context.lock().await;
        let ids = self
            .backend()
            .insert_many(&self.namespace(), documents, session.as_deref_mut())
            .await?;

        ids.into_iter().map(expect_object_id).collect()
    }

    /// Applies `update` to the document with the given identifier.
    pub async fn update_by_id(&self, id: impl Into<Bson>, update: Document) -> StoreResult<()> {
        let mut session = self.context.lock().await;
        self.backend()
            .update_one(
                &self.namespace(),
                Filter::by_id(id),
                update,
                UpdateOptions::default(),
                session.as_deref_mut(),
            )
            .await?;

        Ok(())
    }

    /// Applies `update` to every matching document. `None` updates all documents.
    pub async fn update(&self, filter: Option<Document>, update: Document) -> StoreResult<()> {
        self.update_with_options(filter, update, UpdateOptions::default())
            .await
    }

    pub async fn update_with_options(
        &self,
        filter: Option<Document>,
        update: Document,
        options: UpdateOptions,
    ) -> StoreResult<()> {
        let mut session = self.context.lock().await;
        self.backend()
            .update_many(
                &self.namespace(),
                filter.unwrap_or_default(),
                update,
                options,
                session.as_deref_mut(),
            )
            .await?;

        Ok(())
    }

    /// Replaces the document with the given identifier.
    pub async fn replace_by_id<T>(&self, id: impl Into<Bson>, replacement: &T) -> StoreResult<()>
    where
        T: Serialize + ?Sized,
    {
        self.replace_with_options(
            Some(Filter::by_id(id)),
            replacement,
            UpdateOptions::default(),
        )
        .await
    }

    /// Replaces the first matching document. `None` matches any document.
    pub async fn replace<T>(&self, filter: Option<Document>, replacement: &T) -> StoreResult<()>
    where
        T: Serialize + ?Sized,
    {
        self.replace_with_options(filter, replacement, UpdateOptions::default())
            .await
    }

    pub async fn replace_with_options<T>(
        &self,
        filter: Option<Document>,
        replacement: &T,
        options: UpdateOptions,
    ) -> StoreResult<()>
    where
        T: Serialize + ?Sized,
    {
        let replacement = to_document(replacement)?;
        let mut session = self.context.lock().await;
        self.backend()
            .replace_one(
                &self.namespace(),
                filter.unwrap_or_default(),
                replacement,
                options,
                session.as_deref_mut(),
            )
            .await?;

        Ok(())
    }

    /// Deletes the document with the given identifier.
    pub async fn delete_by_id(&self, id: impl Into<Bson>) -> StoreResult<()> {
        let mut session = self.context.lock().await;
        self.backend()
            .delete_one(
                &self.namespace(),
                Filter::by_id(id),
                DeleteOptions::default(),
                session.as_deref_mut(),
            )
            .await?;

        Ok(())
    }

    /// Deletes every matching document. `None` empties the collection.
    pub async fn delete(&self, filter: Option<Document>) -> StoreResult<()> {
        self.delete_with_options(filter, DeleteOptions::default())
            .await
    }

    pub async fn delete_with_options(
        &self,
        filter: Option<Document>,
        options: DeleteOptions,
    ) -> StoreResult<()> {
        let mut session = self.context.lock().await;
        self.backend()
            .delete_many(
                &self.namespace(),
                filter.unwrap_or_default(),
                options,
                session.as_deref_mut(),
            )
            .await?;

        Ok(())
    }

    /// Opens a cursor over the matching documents.
    ///
    /// Nothing is decoded until [`QueryResult::one`] or [`QueryResult::all`]
    /// is called. Failures are carried inside the returned result.
    ///
    /// # Arguments
    ///
    /// * `filter` - Filter document; `None` matches every document
    /// * `options` - Skip, limit and ordered sort keys
    pub async fn find(
        &self,
        filter: Option<Document>,
        options: Option<FindOptions>,
    ) -> QueryResult<B> {
        let cursor = {
            let mut session = self.context.lock().await;
            self.backend()
                .find(
                    &self.namespace(),
                    filter.unwrap_or_default(),
                    options.unwrap_or_default(),
                    session.as_deref_mut(),
                )
                .await
        };

        QueryResult::from_cursor(self.backend().clone(), self.context.clone(), cursor)
    }

    /// Fetches the document with the given identifier.
    ///
    /// A missing document yields a result whose [`QueryResult::one`] fails
    /// with [`StoreError::NoRecord`].
    pub async fn find_by_id(&self, id: impl Into<Bson>) -> QueryResult<B> {
        let mut session = self.context.lock().await;
        let document = self
            .backend()
            .find_one(&self.namespace(), Filter::by_id(id), session.as_deref_mut())
            .await;

        QueryResult::from_single(document)
    }

    /// Counts the matching documents. `None` counts all documents.
    pub async fn count(&self, filter: Option<Document>) -> StoreResult<u64> {
        let mut session = self.context.lock().await;
        self.backend()
            .count_documents(
                &self.namespace(),
                filter.unwrap_or_default(),
                session.as_deref_mut(),
            )
            .await
    }

    /// Creates one index and returns its name.
    pub async fn create_index(&self, index: IndexModel) -> StoreResult<String> {
        let mut names = self.create_indexes(vec![index]).await?;
        names
            .pop()
            .ok_or(StoreError::InvalidResultShape("store created no index"))
    }

    /// Creates indexes and returns their names.
    pub async fn create_indexes(&self, indexes: Vec<IndexModel>) -> StoreResult<Vec<String>> {
        self.backend()
            .create_indexes(&self.namespace(), indexes)
            .await
    }

    /// Drops one index by name.
    pub async fn delete_index(&self, name: &str) -> StoreResult<()> {
        self.backend().drop_index(&self.namespace(), name).await
    }

    /// Drops every index except the primary key index.
    pub async fn delete_all_indexes(&self) -> StoreResult<()> {
        self.backend().drop_indexes(&self.namespace()).await
    }

    /// Lists index specifications. The primary key index `_id_` is always included.
    pub async fn list_indexes(&self) -> StoreResult<Vec<Document>> {
        self.backend().list_indexes(&self.namespace()).await
    }
}

fn to_document<T: Serialize + ?Sized>(value: &T) -> StoreResult<Document> {
    Ok(bson::ser::serialize_to_document(value)?)
}

fn expect_object_id(id: Bson) -> StoreResult<ObjectId> {
    match id {
        Bson::ObjectId(id) => Ok(id),
        other => Err(StoreError::TypeMismatch {
            expected: "ObjectId",
            found: format!("{:?}", other.element_type()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_passes_through() {
        let id = ObjectId::new();
        assert_eq!(expect_object_id(Bson::ObjectId(id)).unwrap(), id);
    }

    #[test]
    fn other_identifier_types_are_rejected() {
        let err = expect_object_id(Bson::String("not-an-oid".into())).unwrap_err();

        match err {
            StoreError::TypeMismatch { expected, found } => {
                assert_eq!(expected, "ObjectId");
                assert_eq!(found, "String");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
