use std::collections::HashMap;

use crate::transport::ConnectionId;

/// Key of an outstanding source-initiated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResponseId {
    pub conn: ConnectionId,
    pub cseq: u32,
}

/// What to do with the response to a request the source sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseHandler {
    /// M1 OPTIONS.
    CapabilityDiscovery,
    /// M3 GET_PARAMETER.
    ParameterQuery,
    /// M4 SET_PARAMETER.
    ParameterSet,
    /// M5 SET_PARAMETER `wfd_trigger_method: SETUP`.
    SetupTrigger,
    /// M16 GET_PARAMETER probe.
    KeepAlive,
}

/// Continuation registry for requests awaiting a response.
///
/// Entries are single-use: [`take`](Self::take) removes the entry, so a
/// duplicate or late response finds nothing. Entries whose response never
/// arrives stay until [`forget_connection`](Self::forget_connection) runs
/// at disconnect.
#[derive(Debug, Default)]
pub struct ResponseCorrelator {
    pending: HashMap<ResponseId, ResponseHandler>,
}

impl ResponseCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, conn: ConnectionId, cseq: u32, handler: ResponseHandler) {
        let id = ResponseId { conn, cseq };
        if let Some(previous) = self.pending.insert(id, handler) {
            tracing::error!(%conn, cseq, ?previous, ?handler, "CSeq reused while a request is outstanding");
        }
    }

    /// Remove and return the handler registered for `(conn, cseq)`.
    pub fn take(&mut self, conn: ConnectionId, cseq: u32) -> Option<ResponseHandler> {
        self.pending.remove(&ResponseId { conn, cseq })
    }

    /// Drop every entry of a connection. Returns how many were dropped.
    pub fn forget_connection(&mut self, conn: ConnectionId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|id, _| id.conn != conn);
        before - self.pending.len()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_single_use() {
        let mut responses = ResponseCorrelator::new();
        responses.register(ConnectionId(1), 1, ResponseHandler::CapabilityDiscovery);

        assert_eq!(
            responses.take(ConnectionId(1), 1),
            Some(ResponseHandler::CapabilityDiscovery)
        );
        assert_eq!(responses.take(ConnectionId(1), 1), None);
        assert!(responses.is_empty());
    }

    #[test]
    fn keyed_by_connection_and_cseq() {
        let mut responses = ResponseCorrelator::new();
        responses.register(ConnectionId(1), 5, ResponseHandler::ParameterQuery);

        assert_eq!(responses.take(ConnectionId(2), 5), None);
        assert_eq!(responses.take(ConnectionId(1), 6), None);
        assert_eq!(
            responses.take(ConnectionId(1), 5),
            Some(ResponseHandler::ParameterQuery)
        );
    }

    #[test]
    fn forget_connection_only_touches_that_connection() {
        let mut responses = ResponseCorrelator::new();
        responses.register(ConnectionId(1), 1, ResponseHandler::ParameterSet);
        responses.register(ConnectionId(1), 2, ResponseHandler::KeepAlive);
        responses.register(ConnectionId(2), 3, ResponseHandler::SetupTrigger);

        assert_eq!(responses.forget_connection(ConnectionId(1)), 2);
        assert_eq!(responses.len(), 1);
        assert_eq!(
            responses.take(ConnectionId(2), 3),
            Some(ResponseHandler::SetupTrigger)
        );
    }
}
