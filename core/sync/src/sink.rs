//! Destination for freshly fetched payloads.

use serde_json::Value;
use tokio::sync::watch;

use dripsync_common::{Error, Result, UtcMillis};

/// A payload received from the companion.
///
/// The scheduler only checks that `raw` is well-formed JSON; what the
/// document contains is the data model's business.
#[derive(Debug, Clone, PartialEq)]
pub struct InfoPayload {
    /// Exactly what the companion sent; this is what gets persisted.
    pub raw: String,
    /// Parsed form of `raw`.
    pub value: Value,
    /// When the payload was received.
    pub received_at: UtcMillis,
}

impl InfoPayload {
    /// Parse a raw payload.
    ///
    /// # Errors
    /// - `PayloadParse` if `raw` is empty or not JSON
    pub fn parse(raw: impl Into<String>, received_at: UtcMillis) -> Result<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(Error::PayloadParse("empty payload".to_string()));
        }

        let value = serde_json::from_str(&raw).map_err(|e| Error::PayloadParse(e.to_string()))?;
        Ok(Self {
            raw,
            value,
            received_at,
        })
    }
}

/// Consumer of fetched payloads (the widget's data model).
pub trait DataSink: Send + Sync {
    /// Take a new payload.
    ///
    /// An error fails the fetch attempt; the cursor is then left untouched.
    fn set_data(&self, payload: &InfoPayload) -> Result<()>;
}

/// Sink that keeps the latest payload and lets renderers subscribe to it.
pub struct LatestPayload {
    tx: watch::Sender<Option<InfoPayload>>,
}

impl LatestPayload {
    /// Create an empty sink.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Most recent payload, if any.
    pub fn latest(&self) -> Option<InfoPayload> {
        self.tx.borrow().clone()
    }

    /// Watch for new payloads.
    pub fn subscribe(&self) -> watch::Receiver<Option<InfoPayload>> {
        self.tx.subscribe()
    }
}

impl Default for LatestPayload {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSink for LatestPayload {
    fn set_data(&self, payload: &InfoPayload) -> Result<()> {
        self.tx.send_replace(Some(payload.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            InfoPayload::parse("", 1),
            Err(Error::PayloadParse(_))
        ));
        assert!(matches!(
            InfoPayload::parse("{\"bg\":", 1),
            Err(Error::PayloadParse(_))
        ));
    }

    #[test]
    fn test_parse_keeps_raw_text() {
        let raw = r#"{ "bg": { "val": "6.1" } }"#;
        let payload = InfoPayload::parse(raw, 42).unwrap();
        assert_eq!(payload.raw, raw);
        assert_eq!(payload.value["bg"]["val"], "6.1");
        assert_eq!(payload.received_at, 42);
    }

    #[tokio::test]
    async fn test_latest_payload_notifies_subscribers() {
        let sink = LatestPayload::new();
        let mut rx = sink.subscribe();
        assert!(sink.latest().is_none());

        let payload = InfoPayload::parse("{}", 7).unwrap();
        sink.set_data(&payload).unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref(), Some(&payload));
        assert_eq!(sink.latest(), Some(payload));
    }
}
