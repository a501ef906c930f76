// Author: Lukas Bower
// Purpose: Define the cohort client error taxonomy.

//! Error taxonomy for the coordination client.
//!
//! Three classes: protocol violations (never recoverable), membership
//! rejections (fatal with a distinct reason per cause), and connectivity
//! failures (fatal on required sessions, soft on the operator-command path).

use core::fmt;

use cohort_codec::CodecError;

/// Reason a coordinator refused a worker's handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The computation is not accepting new members right now.
    NotRunning,
    /// This process does not belong to the addressed computation group.
    WrongGroup,
    /// The installation prefix differs from the other members.
    WrongPrefix,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotRunning => {
                "computation not in the running state; is a checkpoint/restart in progress?"
            }
            Self::WrongGroup => "this process has a different computation group",
            Self::WrongPrefix => {
                "installation prefix does not match the other members of the computation"
            }
        };
        write!(f, "{text}")
    }
}

/// Errors surfaced by the coordination client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The peer violated the wire contract; the session is unusable.
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// Encoding or decoding failed; treated the same as a protocol violation.
    #[error("protocol violation: {0}")]
    Codec(#[from] CodecError),
    /// The coordinator rejected this worker's membership.
    #[error("connection rejected by the coordinator: {0}")]
    Rejected(RejectReason),
    /// No coordinator was reachable at the resolved endpoint.
    #[error("coordinator not found at {host}:{port}")]
    CoordinatorNotFound {
        /// Host the client tried to reach.
        host: String,
        /// Port the client tried to reach.
        port: u16,
    },
    /// New/Any mode resolved to a host this process cannot spawn on.
    #[error("refusing to start a coordinator: {0} is not the local host")]
    RemoteSpawn(String),
    /// Launching the coordinator executable failed.
    #[error("failed to launch coordinator `{bin}`: {detail}")]
    SpawnFailed {
        /// Executable the client tried to launch.
        bin: String,
        /// Underlying failure description.
        detail: String,
    },
    /// A required session is missing or was never established.
    #[error("no {0} session is established")]
    NoSession(&'static str),
    /// The caller supplied arguments that cannot form a valid request.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// Underlying transport failure.
    #[error("coordinator session i/o failure")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Build the protocol-violation error for an unexpected message kind.
    pub fn unexpected_kind(context: &str, kind: cohort_codec::MessageKind) -> Self {
        Self::Protocol(format!("unexpected {kind:?} while waiting for {context}"))
    }
}

/// Convenience alias used throughout the client.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_reasons_have_distinct_labels() {
        let labels = [
            RejectReason::NotRunning.to_string(),
            RejectReason::WrongGroup.to_string(),
            RejectReason::WrongPrefix.to_string(),
        ];
        assert_ne!(labels[0], labels[1]);
        assert_ne!(labels[1], labels[2]);
        assert_ne!(labels[0], labels[2]);
    }
}
