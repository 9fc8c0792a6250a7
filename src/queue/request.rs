//! A caller-issued unit of work

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{BridgeError, Result};

/// A request accepted by the scheduler but not yet completed
///
/// Lives in exactly one queue: first on its pending list, then (once
/// dispatched) in its in-flight map. The responder is single-shot, which is
/// what makes completion exactly-once by construction.
pub struct PendingRequest {
    /// Server command this request targets
    pub command: String,
    /// Opaque payload, serialized as-is
    pub data: Option<Value>,
    /// Client-side identity, used for cancellation before and after dispatch
    pub handle: u64,
    responder: oneshot::Sender<Result<Value>>,
}

impl PendingRequest {
    /// Create a request and the receiver its caller awaits
    pub fn new(
        command: impl Into<String>,
        data: Option<Value>,
        handle: u64,
    ) -> (Self, oneshot::Receiver<Result<Value>>) {
        let (responder, rx) = oneshot::channel();
        (
            Self {
                command: command.into(),
                data,
                handle,
                responder,
            },
            rx,
        )
    }

    /// Resolve the caller with the response body
    pub fn resolve(self, body: Value) {
        // the caller may have stopped waiting; that is not an error
        let _ = self.responder.send(Ok(body));
    }

    /// Reject the caller
    pub fn reject(self, err: BridgeError) {
        let _ = self.responder.send(Err(err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_delivers_body() {
        let (request, mut rx) = PendingRequest::new("/findsymbols", None, 1);
        request.resolve(json!({"QuickFixes": []}));
        let outcome = rx.try_recv().unwrap();
        assert_eq!(outcome.unwrap(), json!({"QuickFixes": []}));
    }

    #[test]
    fn test_reject_delivers_error() {
        let (request, mut rx) = PendingRequest::new("/rename", None, 2);
        request.reject(BridgeError::Cancelled);
        let outcome = rx.try_recv().unwrap();
        assert!(matches!(outcome, Err(BridgeError::Cancelled)));
    }

    #[test]
    fn test_resolve_with_dropped_receiver_is_harmless() {
        let (request, rx) = PendingRequest::new("/codecheck", None, 3);
        drop(rx);
        request.resolve(json!(null));
    }
}
