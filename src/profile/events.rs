use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::profile::result::ResolutionSource;

/// Progress notifications emitted while resolving profiles.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ResolutionEvent {
    Started {
        canonical_url: String,
        version: Option<String>,
    },
    SourceMiss {
        canonical_url: String,
        source: ResolutionSource,
    },
    SourceFailed {
        canonical_url: String,
        source: ResolutionSource,
        error: String,
    },
    Resolved {
        canonical_url: String,
        version: Option<String>,
        source: ResolutionSource,
        resolution_time_ms: u64,
        downloaded: bool,
    },
    NotFound {
        canonical_url: String,
        version: Option<String>,
    },
    CacheCleared {
        entries: usize,
    },
}

/// Optional event sink. A closed receiver is ignored.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink {
    sender: Option<UnboundedSender<ResolutionEvent>>,
}

impl EventSink {
    pub(crate) fn new(sender: UnboundedSender<ResolutionEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    pub(crate) fn emit(&self, event: ResolutionEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                tracing::trace!("Resolution event receiver dropped");
            }
        }
    }
}
