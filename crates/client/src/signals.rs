//! Error-signal channel.
//!
//! The transport publishes classification problems here and the host
//! coordinator listens for them, instead of anyone watching a global log.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorSignal {
    /// A resource arrived with the wrong content classification, e.g. a
    /// module script answered with an HTML page.
    MalformedResponse { url: String, expected: String, actual: String },
}

impl ErrorSignal {
    pub fn url(&self) -> &str {
        match self {
            ErrorSignal::MalformedResponse { url, .. } => url,
        }
    }
}

impl std::fmt::Display for ErrorSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSignal::MalformedResponse { url, expected, actual } => {
                write!(f, "{url}: expected {expected}, got {actual:?}")
            }
        }
    }
}

/// Broadcast handle; clones share one channel.
#[derive(Debug, Clone)]
pub struct ErrorSignals {
    tx: broadcast::Sender<ErrorSignal>,
}

impl ErrorSignals {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish a signal. Nobody listening is not an error.
    pub fn emit(&self, signal: ErrorSignal) {
        if self.tx.send(signal).is_err() {
            tracing::debug!("error signal dropped: no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ErrorSignal> {
        self.tx.subscribe()
    }
}

impl Default for ErrorSignals {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn malformed() -> ErrorSignal {
        ErrorSignal::MalformedResponse {
            url: "http://a/assets/app.js".into(),
            expected: "application/javascript".into(),
            actual: "text/html".into(),
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        ErrorSignals::new().emit(malformed());
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let signals = ErrorSignals::new();
        let mut a = signals.subscribe();
        let mut b = signals.clone().subscribe();

        signals.emit(malformed());

        assert_eq!(a.recv().await.unwrap(), malformed());
        assert_eq!(b.recv().await.unwrap().url(), "http://a/assets/app.js");
    }

    #[test]
    fn test_signal_serializes_tagged() {
        let json = serde_json::to_value(malformed()).unwrap();
        assert_eq!(json["kind"], "malformed_response");
        assert_eq!(json["actual"], "text/html");
    }
}
