//! Runs against a live deployment named by `CRAWLDB_TEST_MONGO_URI`.
//!
//! Every test returns early when the variable is unset. Transactions need a
//! replica set, so the transaction test additionally checks
//! `CRAWLDB_TEST_MONGO_TRANSACTIONS`.

use bson::{doc, oid::ObjectId};
use serde::{Deserialize, Serialize};
use serial_test::serial;

use crawldb_core::{
    config::{ValueConfigSource, keys},
    connection::ConnectionManager,
    error::StoreError,
    index::IndexModel,
    query::{Filter, FindOptions, SortDirection},
};
use crawldb_mongodb::MongoDbConnector;

const TEST_DATABASE: &str = "crawldb_live_tests";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Page {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    url: String,
    depth: i32,
}

fn manager() -> Option<ConnectionManager<MongoDbConnector>> {
    let uri = std::env::var("CRAWLDB_TEST_MONGO_URI").ok()?;
    let mut source = ValueConfigSource::new();
    source.set(keys::URI, uri).set(keys::DB, TEST_DATABASE);

    Some(ConnectionManager::new(MongoDbConnector::new(), source))
}

#[tokio::test]
#[serial]
async fn crud_round_trip() {
    let Some(manager) = manager() else { return };
    let database = manager.database(TEST_DATABASE).await.unwrap();
    database.drop().await.unwrap();
    let pages = database.collection("pages");

    for depth in 0..10 {
        pages
            .insert(&Page { id: None, url: format!("/p/{depth}"), depth })
            .await
            .unwrap();
    }

    let deep: Vec<Page> = pages
        .find(
            Some(Filter::gte("depth", 5)),
            Some(FindOptions::builder().sort("depth", SortDirection::Asc).skip(1).limit(2).build()),
        )
        .await
        .all()
        .await
        .unwrap();
    assert_eq!(deep.iter().map(|p| p.depth).collect::<Vec<_>>(), vec![6, 7]);

    pages.update(None, doc! { "$set": { "visited": true } }).await.unwrap();
    assert_eq!(pages.count(Some(Filter::eq("visited", true))).await.unwrap(), 10);

    pages.delete(None).await.unwrap();
    assert_eq!(pages.count(None).await.unwrap(), 0);

    database.drop().await.unwrap();
}

#[tokio::test]
#[serial]
async fn index_lifecycle() {
    let Some(manager) = manager() else { return };
    let database = manager.database(TEST_DATABASE).await.unwrap();
    database.drop().await.unwrap();
    let pages = database.collection("pages");
    database.create_collection("pages").await.unwrap();

    assert_eq!(pages.list_indexes().await.unwrap().len(), 1);

    pages
        .create_indexes(vec![
            IndexModel::on("url", SortDirection::Asc).unique(),
            IndexModel::on("depth", SortDirection::Desc),
        ])
        .await
        .unwrap();
    assert_eq!(pages.list_indexes().await.unwrap().len(), 3);

    pages.delete_index("depth_-1").await.unwrap();
    assert_eq!(pages.list_indexes().await.unwrap().len(), 2);

    pages.delete_all_indexes().await.unwrap();
    assert_eq!(pages.list_indexes().await.unwrap().len(), 1);

    database.drop().await.unwrap();
}

#[tokio::test]
#[serial]
async fn failed_transaction_leaves_no_trace() {
    let Some(manager) = manager() else { return };
    if std::env::var("CRAWLDB_TEST_MONGO_TRANSACTIONS").is_err() {
        return;
    }
    let database = manager.database(TEST_DATABASE).await.unwrap();
    database.drop().await.unwrap();
    database.create_collection("pages").await.unwrap();

    let result: Result<(), StoreError> = manager
        .run_transaction(|context| {
            let pages = database.collection_with_context("pages", context);
            async move {
                pages.insert(&Page { id: None, url: "/tx".into(), depth: 0 }).await?;
                Err(StoreError::NoRecord)
            }
        })
        .await;

    assert!(matches!(result, Err(StoreError::TransactionAborted { .. })));
    assert_eq!(database.collection("pages").count(None).await.unwrap(), 0);

    database.drop().await.unwrap();
}
