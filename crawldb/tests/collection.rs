use bson::{Document, doc, oid::ObjectId};
use rstest::rstest;
use serde::{Deserialize, Serialize};

use crawldb::{
    memory::{InMemoryConnector, InMemoryStore, MemoryStoreError},
    prelude::*,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Page {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    url: String,
    depth: i32,
}

impl Page {
    fn new(url: impl Into<String>, depth: i32) -> Self {
        Self {
            id: None,
            url: url.into(),
            depth,
        }
    }
}

async fn pages() -> Collection<InMemoryStore> {
    ConnectionManager::new(InMemoryConnector::default(), ValueConfigSource::new())
        .collection("pages")
        .await
        .unwrap()
}

async fn seeded() -> Collection<InMemoryStore> {
    let pages = pages().await;
    pages
        .insert_many((0..10).map(|depth| Page::new(format!("https://example.com/{depth}"), depth)))
        .await
        .unwrap();
    pages
}

fn memory_error(err: &StoreError) -> &MemoryStoreError {
    err.store_source()
        .and_then(|source| source.downcast_ref::<MemoryStoreError>())
        .expect("memory store error")
}

#[tokio::test]
async fn filtered_sorted_window() {
    let pages = seeded().await;

    let window: Vec<Page> = pages
        .find(
            Some(Filter::gte("depth", 5)),
            Some(
                FindOptions::builder()
                    .sort("depth", SortDirection::Asc)
                    .skip(1)
                    .limit(2)
                    .build(),
            ),
        )
        .await
        .all()
        .await
        .unwrap();

    assert_eq!(window.iter().map(|p| p.depth).collect::<Vec<_>>(), vec![6, 7]);
    assert!(window.iter().all(|p| p.id.is_some()));
}

#[rstest]
#[case(None, (0..10).collect())]
#[case(Some(SortDirection::Asc), (0..10).collect())]
#[case(Some(SortDirection::Desc), (0..10).rev().collect())]
#[tokio::test]
async fn find_orders(#[case] direction: Option<SortDirection>, #[case] expected: Vec<i32>) {
    let pages = seeded().await;
    let options = direction.map(|d| FindOptions::builder().sort("depth", d).build());

    let found: Vec<Page> = pages.find(None, options).await.all().await.unwrap();

    assert_eq!(found.iter().map(|p| p.depth).collect::<Vec<_>>(), expected);
}

#[rstest]
#[case(Some(Filter::gte("depth", 5)), FindOptions::new(), 5)]
#[case(None, FindOptions::builder().skip(5).build(), 5)]
#[case(None, FindOptions::builder().limit(5).build(), 5)]
#[case(None, FindOptions::new(), 10)]
#[tokio::test]
async fn ten_document_windows(
    #[case] filter: Option<Document>,
    #[case] options: FindOptions,
    #[case] expected: usize,
) {
    let pages = seeded().await;

    let found: Vec<Page> = pages.find(filter, Some(options)).await.all().await.unwrap();

    assert_eq!(found.len(), expected);
}

#[tokio::test]
async fn multi_key_sort_keeps_key_order() {
    let pages = pages().await;
    pages
        .insert_many(vec![Page::new("/b", 1), Page::new("/a", 2), Page::new("/a", 1)])
        .await
        .unwrap();

    let found: Vec<Page> = pages
        .find(
            None,
            Some(
                FindOptions::builder()
                    .sort("url", SortDirection::Asc)
                    .sort("depth", SortDirection::Desc)
                    .build(),
            ),
        )
        .await
        .all()
        .await
        .unwrap();

    assert_eq!(
        found.iter().map(|p| (p.url.as_str(), p.depth)).collect::<Vec<_>>(),
        vec![("/a", 2), ("/a", 1), ("/b", 1)]
    );
}

#[tokio::test]
async fn one_reads_the_first_document_of_a_cursor() {
    let pages = seeded().await;

    let deepest: Page = pages
        .find(None, Some(FindOptions::builder().sort("depth", SortDirection::Desc).build()))
        .await
        .one()
        .await
        .unwrap();

    assert_eq!(deepest.depth, 9);
}

#[tokio::test]
async fn empty_cursor_has_no_record() {
    let pages = seeded().await;

    let result = pages
        .find(Some(Filter::gt("depth", 100)), None)
        .await
        .one::<Page>()
        .await;
    assert!(matches!(result, Err(StoreError::NoRecord)));

    let none: Vec<Page> = pages
        .find(Some(Filter::gt("depth", 100)), None)
        .await
        .all()
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn insert_then_find_by_id_round_trips() {
    let pages = pages().await;
    let page = Page::new("https://example.com/", 0);

    let id = pages.insert(&page).await.unwrap();
    let stored: Page = pages.find_by_id(id).await.one().await.unwrap();

    assert_eq!(stored, Page { id: Some(id), ..page });
}

#[tokio::test]
async fn missing_id_is_an_error_result() {
    let pages = seeded().await;

    let result = pages.find_by_id(ObjectId::new()).await;

    assert!(result.is_error());
    assert!(matches!(result.error(), Some(StoreError::NoRecord)));
    assert!(matches!(result.one::<Page>().await, Err(StoreError::NoRecord)));
}

#[tokio::test]
async fn single_results_cannot_be_read_as_lists() {
    let pages = pages().await;
    let id = pages.insert(&Page::new("/a", 0)).await.unwrap();

    let result = pages.find_by_id(id).await.all::<Page>().await;

    assert!(matches!(result, Err(StoreError::InvalidResultShape(_))));
}

#[tokio::test]
async fn non_object_id_is_a_type_mismatch() {
    let pages = pages().await;

    let result = pages.insert(&doc! { "_id": "custom", "url": "/a" }).await;

    assert!(matches!(result, Err(StoreError::TypeMismatch { expected: "ObjectId", .. })));
    assert_eq!(pages.count(None).await.unwrap(), 1);
}

#[tokio::test]
async fn insert_many_keeps_input_order() {
    let pages = pages().await;

    let ids = pages
        .insert_many(vec![Page::new("/a", 0), Page::new("/b", 1), Page::new("/c", 2)])
        .await
        .unwrap();

    for (id, url) in ids.iter().zip(["/a", "/b", "/c"]) {
        let page: Page = pages.find_by_id(*id).await.one().await.unwrap();
        assert_eq!(page.url, url);
    }
}

#[tokio::test]
async fn absent_filter_updates_and_deletes_everything() {
    let pages = seeded().await;

    pages
        .update(None, doc! { "$set": { "status": "queued" } })
        .await
        .unwrap();
    assert_eq!(pages.count(Some(Filter::eq("status", "queued"))).await.unwrap(), 10);

    pages.delete(None).await.unwrap();
    assert_eq!(pages.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn update_delete_and_replace_by_id() {
    let pages = seeded().await;
    let first: Page = pages.find(Some(Filter::eq("depth", 0)), None).await.one().await.unwrap();
    let id = first.id.unwrap();

    pages
        .update_by_id(id, doc! { "$inc": { "depth": 40 } })
        .await
        .unwrap();
    let updated: Page = pages.find_by_id(id).await.one().await.unwrap();
    assert_eq!(updated.depth, 40);

    pages
        .replace_by_id(id, &Page::new("https://example.com/moved", 1))
        .await
        .unwrap();
    let replaced: Page = pages.find_by_id(id).await.one().await.unwrap();
    assert_eq!(replaced, Page { id: Some(id), url: "https://example.com/moved".into(), depth: 1 });

    pages.delete_by_id(id).await.unwrap();
    assert!(pages.find_by_id(id).await.is_error());
    assert_eq!(pages.count(None).await.unwrap(), 9);
}

#[tokio::test]
async fn upsert_creates_missing_document() {
    let pages = pages().await;

    pages
        .update_with_options(
            Some(Filter::eq("url", "/robots.txt")),
            doc! { "$set": { "depth": 0 } },
            UpdateOptions::upsert(),
        )
        .await
        .unwrap();

    let robots: Page = pages
        .find(Some(Filter::eq("url", "/robots.txt")), None)
        .await
        .one()
        .await
        .unwrap();
    assert_eq!(robots.depth, 0);
}

#[tokio::test]
async fn index_lifecycle() {
    let pages = seeded().await;
    assert_eq!(pages.list_indexes().await.unwrap().len(), 1);

    let names = pages
        .create_indexes(vec![
            IndexModel::on("url", SortDirection::Asc).unique(),
            IndexModel::on("depth", SortDirection::Desc),
        ])
        .await
        .unwrap();
    assert_eq!(names, vec!["url_1".to_string(), "depth_-1".to_string()]);

    let listed: Vec<Document> = pages.list_indexes().await.unwrap();
    assert_eq!(listed.len(), 3);
    assert_eq!(listed[0].get_str("name").unwrap(), "_id_");

    pages.delete_index("depth_-1").await.unwrap();
    assert_eq!(pages.list_indexes().await.unwrap().len(), 2);

    pages.delete_all_indexes().await.unwrap();
    assert_eq!(pages.list_indexes().await.unwrap().len(), 1);
}

#[tokio::test]
async fn unique_index_rejects_duplicates() {
    let pages = seeded().await;
    pages
        .create_index(IndexModel::on("url", SortDirection::Asc).unique())
        .await
        .unwrap();

    let err = pages
        .insert(&Page::new("https://example.com/3", 99))
        .await
        .unwrap_err();

    assert!(matches!(memory_error(&err), MemoryStoreError::DuplicateKey { .. }));
    assert_eq!(pages.count(None).await.unwrap(), 10);
}

#[tokio::test]
async fn delete_hint_must_name_an_index() {
    let pages = seeded().await;

    let err = pages
        .delete_with_options(None, DeleteOptions::with_hint("missing_1"))
        .await
        .unwrap_err();

    assert_eq!(memory_error(&err), &MemoryStoreError::BadHint("missing_1".into()));
    assert_eq!(pages.count(None).await.unwrap(), 10);
}
