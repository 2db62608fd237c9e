//! Status and query-resolution events delivered to the host
//!
//! The coordinator never renders anything itself. Every phase change, batch
//! commit and autonomous query resolution is pushed to an [`EventSink`]; a CLI
//! draws a progress bar from them, a service could forward them as JSON.

use std::time::Duration;

use lookup_core::{Address, Amount};
use serde::Serialize;
use tokio::sync::mpsc;

/// Load phase reported in status events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Downloading the dataset blob
    Loading,
    Parsing,
    /// Importing batches into the persistent store
    Syncing,
    Complete,
    Stopped,
    Error,
}

/// Result of a point query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "amount", rename_all = "camelCase")]
pub enum QueryOutcome {
    Found(Amount),
    /// Not in the data loaded so far; re-evaluated as loading continues
    NotFoundPending,
    /// Not in the dataset, no further data is coming
    NotFoundFinal,
}

impl QueryOutcome {
    /// Whether the caller should keep waiting for a resolution event
    pub fn is_pending(&self) -> bool {
        matches!(self, QueryOutcome::NotFoundPending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub phase: Phase,
    pub processed: u64,
    pub total: u64,
    pub percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<f64>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum LoadEvent {
    Status(StatusEvent),
    /// A pending query was resolved without a further `query` call
    QueryResolved {
        address: Address,
        outcome: QueryOutcome,
    },
}

/// Receiver of coordinator events.
///
/// Called from the load task, never while coordinator state is locked, so a
/// sink may call back into the coordinator (e.g. `stop`).
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: LoadEvent);
}

impl<F> EventSink for F
where
    F: Fn(LoadEvent) + Send + Sync + 'static,
{
    fn emit(&self, event: LoadEvent) {
        self(event)
    }
}

/// Sink that drops every event
pub fn noop_sink() -> impl EventSink {
    |_event: LoadEvent| {}
}

/// Sink backed by an unbounded channel
pub fn channel_sink() -> (impl EventSink, mpsc::UnboundedReceiver<LoadEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = move |event: LoadEvent| {
        // Receiver gone means the host stopped listening
        let _ = tx.send(event);
    };
    (sink, rx)
}

/// Import progress counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Progress {
    pub processed: u64,
    pub total: u64,
    pub eta_seconds: Option<f64>,
}

impl Progress {
    pub fn new(processed: u64, total: u64) -> Self {
        Self {
            processed,
            total,
            eta_seconds: None,
        }
    }

    /// Completion percentage in `[0, 100]`
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.processed as f64 / self.total as f64 * 100.0).min(100.0)
        }
    }

    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.processed)
    }
}

/// ETA as `(elapsed / processed) * remaining`, in seconds
pub fn estimate_eta(elapsed: Duration, processed: u64, total: u64) -> Option<f64> {
    if processed == 0 {
        return None;
    }
    let per_record = elapsed.as_secs_f64() / processed as f64;
    Some(per_record * total.saturating_sub(processed) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eta() {
        assert_eq!(estimate_eta(Duration::from_secs(10), 0, 100), None);

        let eta = estimate_eta(Duration::from_secs(10), 5000, 20000).unwrap();
        assert!((eta - 30.0).abs() < 1e-9);

        let done = estimate_eta(Duration::from_secs(10), 20000, 20000).unwrap();
        assert_eq!(done, 0.0);
    }

    #[test]
    fn test_percent() {
        assert_eq!(Progress::new(0, 0).percent(), 0.0);
        assert_eq!(Progress::new(5000, 20000).percent(), 25.0);
        assert_eq!(Progress::new(20000, 20000).percent(), 100.0);
        assert_eq!(Progress::new(5000, 20000).remaining(), 15000);
    }

    #[test]
    fn test_event_json_shape() {
        let event = LoadEvent::Status(StatusEvent {
            phase: Phase::Syncing,
            processed: 5000,
            total: 10000,
            percent: 50.0,
            eta_seconds: Some(1.5),
            message: "Imported batch 1/2".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "status");
        assert_eq!(json["phase"], "syncing");
        assert_eq!(json["etaSeconds"], 1.5);

        let resolved = LoadEvent::QueryResolved {
            address: "g1abc".into(),
            outcome: QueryOutcome::Found(47_056_306),
        };
        let json = serde_json::to_value(&resolved).unwrap();
        assert_eq!(json["event"], "queryResolved");
        assert_eq!(json["outcome"]["kind"], "found");
        assert_eq!(json["outcome"]["amount"], 47_056_306);
    }

    #[tokio::test]
    async fn test_channel_sink_delivers() {
        let (sink, mut rx) = channel_sink();
        sink.emit(LoadEvent::QueryResolved {
            address: "g1abc".into(),
            outcome: QueryOutcome::NotFoundFinal,
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            LoadEvent::QueryResolved {
                outcome: QueryOutcome::NotFoundFinal,
                ..
            }
        ));
    }
}
