//! Progress events and the one-way sink the orchestrator publishes onto.
//!
//! The orchestrator owns the [`tokio::sync::mpsc::UnboundedSender`] half; a
//! host UI (out of scope here) owns the receiver. This is a one-way channel
//! rather than a shared/bidirectional handle on purpose — see the cyclic
//! state design note in SPEC_FULL.md §9.

use serde::Serialize;

pub type ProgressSink = tokio::sync::mpsc::UnboundedSender<ProgressEvent>;
pub type ProgressStream = tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "stage", rename_all = "camelCase")]
pub enum ProgressEvent {
    Init,
    Thumbnail,
    Waiting,
    Bundle {
        part: u64,
        total_parts: u64,
        platform_index: usize,
        total_platforms: usize,
    },
    Completed,
    Error {
        msg: String,
    },
}

/// Create a fresh progress channel. Convenience wrapper so call sites don't
/// need to spell out the tokio mpsc type twice.
pub fn channel() -> (ProgressSink, ProgressStream) {
    tokio::sync::mpsc::unbounded_channel()
}
