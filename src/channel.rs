//! Conference log and live notification channel

use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::protocol::{ConferenceEvent, ConferenceId, EventKind};

/// Sink for conference log lines. Fire-and-forget.
pub trait EventLog: Send + Sync {
    fn record_and_broadcast(&self, conference_id: ConferenceId, kind: EventKind, payload: String);
}

/// A stored log line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConferenceLog {
    pub added: DateTime<Local>,
    pub conference_id: ConferenceId,
    pub kind: EventKind,
    pub message: String,
}

impl std::fmt::Display for ConferenceLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.added.format("%Y-%m-%d %H:%M:%S"), self.message)
    }
}

/// Producer side: keeps the log and pushes events to the subscriber
#[derive(Clone)]
pub struct LogSink {
    logs: Arc<RwLock<Vec<ConferenceLog>>>,
    event_tx: mpsc::UnboundedSender<ConferenceEvent>,
}

impl LogSink {
    /// Log lines of one conference, oldest first
    pub fn logs(&self, conference_id: ConferenceId) -> Vec<ConferenceLog> {
        self.logs
            .read()
            .iter()
            .filter(|l| l.conference_id == conference_id)
            .cloned()
            .collect()
    }

    /// Drop the log lines of a conference
    pub fn clear(&self, conference_id: ConferenceId) {
        self.logs.write().retain(|l| l.conference_id != conference_id);
    }
}

impl EventLog for LogSink {
    fn record_and_broadcast(&self, conference_id: ConferenceId, kind: EventKind, payload: String) {
        // Unmute requests are pushed with the bare caller id; the log keeps
        // the readable line sent alongside them.
        if kind != EventKind::UnmuteRequest {
            self.logs.write().push(ConferenceLog {
                added: Local::now(),
                conference_id,
                kind,
                message: payload.clone(),
            });
        }

        let event = ConferenceEvent {
            conference_id,
            kind,
            payload,
        };
        if self.event_tx.send(event).is_err() {
            debug!(conference = %conference_id, "No live subscriber for conference events");
        }
    }
}

/// Subscriber side of the live channel
#[derive(Clone)]
pub struct NotifierChannel {
    event_rx: Arc<Mutex<mpsc::UnboundedReceiver<ConferenceEvent>>>,
}

impl NotifierChannel {
    /// Create a new channel pair
    ///
    /// Returns the subscriber channel and the sink handed to producers
    pub fn new() -> (Self, LogSink) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let channel = Self {
            event_rx: Arc::new(Mutex::new(event_rx)),
        };
        let sink = LogSink {
            logs: Arc::new(RwLock::new(Vec::new())),
            event_tx,
        };

        (channel, sink)
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv(&self) -> Option<ConferenceEvent> {
        self.event_rx.try_lock().ok()?.try_recv().ok()
    }

    /// Wait for the next event; `None` once every sink is dropped
    pub async fn recv(&self) -> Option<ConferenceEvent> {
        self.event_rx.lock().await.recv().await
    }

    /// Drain everything currently queued
    pub fn drain(&self) -> Vec<ConferenceEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
