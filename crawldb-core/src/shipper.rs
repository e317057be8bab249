//! Log shipping into a collection.
//!
//! A [`LogShipper`] drains a channel of log messages and stores each one as a
//! timestamped record. It is meant to run as a background task next to a
//! crawl job and stops by itself once the job goes quiet.

use std::time::Duration;

use bson::doc;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::{backend::StoreBackend, database::Database};

/// How long the shipper waits for the next message before it stops.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(6);

/// Why a shipping loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShipperStop {
    /// Every sender was dropped.
    Closed,
    /// No message arrived within the idle timeout.
    Idle,
    /// Writing a record failed; the error was logged.
    Failed,
}

/// Summary of one shipping loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShipReport {
    pub shipped: usize,
    pub stop: ShipperStop,
}

/// Writes log messages as `{ _id, "@timestamp", "@msg" }` records.
#[derive(Debug, Clone)]
pub struct LogShipper<B: StoreBackend> {
    database: Database<B>,
    idle_timeout: Duration,
}

impl<B: StoreBackend> LogShipper<B> {
    pub fn new(database: Database<B>) -> Self {
        Self {
            database,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Ships messages from `messages` into the collection `index` until the
    /// channel closes, a write fails, or the channel stays idle too long.
    ///
    /// Every record gets a fresh UUID identifier and `when` as its timestamp.
    pub async fn ship(
        &self,
        when: DateTime<Utc>,
        messages: &mut mpsc::Receiver<String>,
        index: &str,
    ) -> ShipReport {
        let namespace = self.database.namespace(index);
        let timestamp = when.to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut shipped = 0;

        loop {
            let message = match tokio::time::timeout(self.idle_timeout, messages.recv()).await {
                Ok(Some(message)) => message,
                Ok(None) => return self.report(shipped, ShipperStop::Closed),
                Err(_) => return self.report(shipped, ShipperStop::Idle),
            };

            let record = doc! {
                "_id": Uuid::new_v4().to_string(),
                "@timestamp": timestamp.as_str(),
                "@msg": message,
            };
            if let Err(err) = self
                .database
                .backend()
                .insert_one(&namespace, record, None)
                .await
            {
                error!(error = %err, index, "failed to ship log message");
                return self.report(shipped, ShipperStop::Failed);
            }
            shipped += 1;
        }
    }

    fn report(&self, shipped: usize, stop: ShipperStop) -> ShipReport {
        debug!(shipped, ?stop, "log shipper stopped");
        ShipReport { shipped, stop }
    }
}
