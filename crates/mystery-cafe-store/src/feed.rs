//! Row-level change streams.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use mystery_cafe_core::{ChangeKind, Table};

/// A raw change as reported by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RowChange {
    /// Table the change happened in.
    pub table: Table,
    /// Kind of change.
    pub kind: ChangeKind,
    /// Row before the change.
    pub old: Option<Value>,
    /// Row after the change.
    pub new: Option<Value>,
    /// Commit time reported by the backend.
    pub committed_at: DateTime<Utc>,
}

/// Receiving end of a table subscription.
///
/// `recv` returns `None` once the underlying channel has failed or been
/// closed. Dropping the stream tears the channel down.
#[derive(Debug)]
pub struct ChangeStream {
    table: Table,
    rx: mpsc::UnboundedReceiver<RowChange>,
    pump: Option<JoinHandle<()>>,
}

impl ChangeStream {
    /// Stream fed directly by a sender the caller keeps.
    #[must_use]
    pub fn new(table: Table, rx: mpsc::UnboundedReceiver<RowChange>) -> Self {
        Self {
            table,
            rx,
            pump: None,
        }
    }

    /// Stream fed by a background task that is aborted with the stream.
    #[must_use]
    pub fn with_pump(
        table: Table,
        rx: mpsc::UnboundedReceiver<RowChange>,
        pump: JoinHandle<()>,
    ) -> Self {
        Self {
            table,
            rx,
            pump: Some(pump),
        }
    }

    /// Table this stream follows.
    #[must_use]
    pub const fn table(&self) -> Table {
        self.table
    }

    /// Wait for the next change.
    pub async fn recv(&mut self) -> Option<RowChange> {
        self.rx.recv().await
    }
}

impl Drop for ChangeStream {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}
