use std::time::Duration;

use rstest::rstest;

use crawldb::{
    config::keys,
    memory::InMemoryConnector,
    prelude::*,
};

#[tokio::test(start_paused = true)]
async fn rides_out_an_unavailable_store() {
    let connector = InMemoryConnector::default().refusing_first(4);
    let manager = ConnectionManager::new(connector.clone(), ValueConfigSource::new())
        .with_backoff(BackoffPolicy::new().with_initial_interval(Duration::from_millis(100)));

    assert!(!manager.is_connected());
    let pages = manager.collection("pages").await.unwrap();

    assert!(manager.is_connected());
    assert_eq!(connector.attempts(), 5);

    pages.insert(&bson::doc! { "url": "/" }).await.unwrap();
    assert_eq!(manager.collection("pages").await.unwrap().count(None).await.unwrap(), 1);
    assert_eq!(connector.attempts(), 5);
}

#[tokio::test(start_paused = true)]
async fn bounded_backoff_reports_the_last_failure() {
    let connector = InMemoryConnector::default().refusing_first(usize::MAX);
    let manager = ConnectionManager::new(connector.clone(), ValueConfigSource::new()).with_backoff(
        BackoffPolicy::new()
            .with_initial_interval(Duration::from_secs(1))
            .with_max_elapsed_time(Some(Duration::from_secs(5))),
    );

    let err = manager.client().await.unwrap_err();

    match err {
        StoreError::ConnectionTransient { attempts, source } => {
            assert_eq!(attempts, 3);
            assert_eq!(connector.attempts(), 3);
            assert!(source.is_store_operation());
        }
        other => panic!("expected a transient connection error, got {other:?}"),
    }
    assert!(!manager.is_connected());
}

#[rstest]
#[case(None, "crawl", "crawl")]
#[case(None, "", "test")]
#[case(Some("archive"), "", "archive")]
#[tokio::test]
async fn database_names_resolve(
    #[case] configured: Option<&str>,
    #[case] requested: &str,
    #[case] expected: &str,
) {
    let mut source = ValueConfigSource::new();
    if let Some(configured) = configured {
        source.set(keys::DB, configured);
    }
    let manager = ConnectionManager::new(InMemoryConnector::default(), source);

    assert_eq!(manager.database(requested).await.unwrap().name(), expected);
}

#[tokio::test]
async fn shutdown_without_a_client_is_a_no_op() {
    let manager = ConnectionManager::new(InMemoryConnector::default(), ValueConfigSource::new());

    manager.shutdown().await.unwrap();
}
