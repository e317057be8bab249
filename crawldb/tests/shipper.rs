use std::time::Duration;

use bson::Document;
use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;

use crawldb::{
    memory::InMemoryStore,
    prelude::*,
    shipper::{ShipReport, ShipperStop},
};

fn database() -> Database<InMemoryStore> {
    Database::new(InMemoryStore::new(), "logs")
}

#[tokio::test]
async fn ships_until_senders_are_gone() {
    let database = database();
    let (tx, mut rx) = mpsc::channel(8);
    for line in ["fetch started", "fetched 12 pages", "fetch done"] {
        tx.send(line.to_string()).await.unwrap();
    }
    drop(tx);

    let when = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let report = LogShipper::new(database.clone())
        .ship(when, &mut rx, "crawl-logs")
        .await;

    assert_eq!(report, ShipReport { shipped: 3, stop: ShipperStop::Closed });

    let records: Vec<Document> = database
        .collection("crawl-logs")
        .find(None, None)
        .await
        .all()
        .await
        .unwrap();
    let messages: Vec<&str> = records.iter().map(|r| r.get_str("@msg").unwrap()).collect();
    assert_eq!(messages, vec!["fetch started", "fetched 12 pages", "fetch done"]);

    for record in &records {
        assert_eq!(record.get_str("@timestamp").unwrap(), "2024-05-01T12:00:00Z");
        assert!(uuid::Uuid::parse_str(record.get_str("_id").unwrap()).is_ok());
    }
}

#[tokio::test(start_paused = true)]
async fn stops_when_the_producer_goes_quiet() {
    let database = database();
    let (tx, mut rx) = mpsc::channel(8);
    tx.send("only line".to_string()).await.unwrap();

    let report = LogShipper::new(database.clone())
        .with_idle_timeout(Duration::from_secs(2))
        .ship(Utc::now(), &mut rx, "crawl-logs")
        .await;

    assert_eq!(report, ShipReport { shipped: 1, stop: ShipperStop::Idle });
    assert_eq!(database.collection("crawl-logs").count(None).await.unwrap(), 1);
    drop(tx);
}

#[tokio::test]
async fn stops_at_the_first_failed_write() {
    let database = database();
    database
        .collection("crawl-logs")
        .create_index(IndexModel::on("@msg", SortDirection::Asc).unique())
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    for line in ["retrying", "retrying", "never shipped"] {
        tx.send(line.to_string()).await.unwrap();
    }
    drop(tx);

    let report = LogShipper::new(database.clone())
        .ship(Utc::now(), &mut rx, "crawl-logs")
        .await;

    assert_eq!(report, ShipReport { shipped: 1, stop: ShipperStop::Failed });
    assert_eq!(database.collection("crawl-logs").count(None).await.unwrap(), 1);
}
