//! Error taxonomy for console operations.
//!
//! User-initiated operations surface one of these; background work
//! (poller firings, delivery forwarding) logs and keeps going instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsoleError {
    /// Discovery service unreachable or handshake rejected.
    #[error("connection to '{address}' failed: {reason}")]
    Connection { address: String, reason: String },

    /// Operation attempted while no session handle is live.
    #[error("not connected to any cluster")]
    NotConnected,

    /// The cluster metadata lists no registered broker.
    #[error("cluster has no registered broker")]
    NoBrokerAvailable,

    /// The cluster metadata lists no cluster name.
    #[error("cluster has no registered cluster name")]
    NoCluster,

    /// Publish rejected by the transport or the broker.
    #[error("send to topic '{topic}' failed: {reason}")]
    Send { topic: String, reason: String },

    /// Subscribe rejected, e.g. malformed filter expression.
    #[error("consumer start failed: {reason}")]
    Start { reason: String },

    /// Message id could not be resolved to a stored message.
    #[error("message '{id}' not found")]
    NotFound { id: String },

    /// One or more sub-clients failed to release during teardown.
    /// The session is still left disconnected.
    #[error("disconnect incomplete, failed steps: {steps}")]
    Disconnect { steps: String },

    /// Offset reset rejected because the group has online consumers
    /// and force mode is disabled.
    #[error("offset reset refused: group '{group}' has online consumers")]
    ResetRefused { group: String },

    /// Underlying SDK/network failure, tagged with the operation name.
    #[error("{op} failed: {reason}")]
    Transport { op: &'static str, reason: String },
}

impl ConsoleError {
    pub fn transport<S: Into<String>>(op: &'static str, reason: S) -> Self {
        Self::Transport { op, reason: reason.into() }
    }
}
