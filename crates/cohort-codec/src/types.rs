// Author: Lukas Bower
// Purpose: Define cohort wire types and constants shared across components.

//! Cohort coordination-protocol data model shared across codec users.

use core::fmt;

/// Byte length of the fixed message header on the wire.
pub const HEADER_LEN: usize = 66;

/// Byte length of the name-service namespace tag field.
pub const NSID_LEN: usize = 8;

/// Sentinel virtual process id meaning "not assigned by the coordinator".
pub const UNASSIGNED_VIRTUAL_PID: i32 = -1;

/// Closed set of message kinds understood by the coordination protocol.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Poison sentinel marking a message that has not been received yet.
    Invalid = 0,
    /// Worker hello for a fresh computation.
    NewWorker = 1,
    /// Worker hello when resuming a previously-known computation.
    RestartWorker = 2,
    /// Coordinator accepted the worker into the computation.
    Accept = 3,
    /// Rejection: computation is not accepting new members right now.
    RejectNotRunning = 4,
    /// Rejection: worker addressed the wrong computation group.
    RejectWrongGroup = 5,
    /// Rejection: installation prefix differs from the other members.
    RejectWrongPrefix = 6,
    /// Directive to terminate immediately; not negotiable.
    Kill = 7,
    /// Operator command carrying a single command character.
    UserCommand = 8,
    /// Structured reply to an operator command.
    UserCommandResult = 9,
    /// Fire-and-forget re-announcement after fork.
    UpdateAfterFork = 10,
    /// Fire-and-forget re-announcement after exec.
    UpdateAfterExec = 11,
    /// Request for the shared checkpoint directory.
    GetCkptDir = 12,
    /// Reply carrying the shared checkpoint directory path.
    GetCkptDirResult = 13,
    /// Fire-and-forget push of a new checkpoint directory path.
    UpdateCkptDir = 14,
    /// Fire-and-forget record of this worker's checkpoint filename.
    CkptFilename = 15,
    /// Register a name-service key/value pair.
    RegisterNsData = 16,
    /// Register a name-service key/value pair and wait for the ack.
    RegisterNsDataSync = 17,
    /// Acknowledgement for a synchronous name-service registration.
    RegisterNsDataSyncAck = 18,
    /// Query a name-service key.
    NsQuery = 19,
    /// Reply carrying the queried name-service value.
    NsQueryResult = 20,
    /// Announce this connection as a dedicated name-service peer.
    NsWorkerJoin = 21,
}

impl TryFrom<u32> for MessageKind {
    type Error = CodecError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        use MessageKind::*;
        Ok(match value {
            0 => Invalid,
            1 => NewWorker,
            2 => RestartWorker,
            3 => Accept,
            4 => RejectNotRunning,
            5 => RejectWrongGroup,
            6 => RejectWrongPrefix,
            7 => Kill,
            8 => UserCommand,
            9 => UserCommandResult,
            10 => UpdateAfterFork,
            11 => UpdateAfterExec,
            12 => GetCkptDir,
            13 => GetCkptDirResult,
            14 => UpdateCkptDir,
            15 => CkptFilename,
            16 => RegisterNsData,
            17 => RegisterNsDataSync,
            18 => RegisterNsDataSyncAck,
            19 => NsQuery,
            20 => NsQueryResult,
            21 => NsWorkerJoin,
            other => return Err(CodecError::Unsupported(other)),
        })
    }
}

/// Status codes carried in operator-command replies.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdStatus {
    /// Command executed without error.
    NoError = 0,
    /// The command character was not recognized.
    InvalidCommand = 1,
    /// The computation is not in the running state.
    NotRunningState = 2,
    /// No coordinator was reachable at the resolved endpoint.
    CoordinatorNotFound = 3,
}

impl TryFrom<u32> for CmdStatus {
    type Error = CodecError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => CmdStatus::NoError,
            1 => CmdStatus::InvalidCommand,
            2 => CmdStatus::NotRunningState,
            3 => CmdStatus::CoordinatorNotFound,
            other => return Err(CodecError::Unsupported(other)),
        })
    }
}

impl fmt::Display for CmdStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CmdStatus::NoError => "no error",
            CmdStatus::InvalidCommand => "invalid command",
            CmdStatus::NotRunningState => "computation not running",
            CmdStatus::CoordinatorNotFound => "coordinator not found",
        };
        write!(f, "{label}")
    }
}

/// Errors produced while encoding or decoding coordination messages.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    /// Input buffer was shorter than the fixed header or declared tail.
    #[error("truncated message")]
    Truncated,
    /// Encountered a tag value outside the closed enumeration.
    #[error("unsupported message tag {0}")]
    Unsupported(u32),
    /// Declared tail length does not match the bytes actually present.
    #[error("tail length mismatch: declared {declared} actual {actual}")]
    LengthMismatch {
        /// Tail length declared in the fixed header.
        declared: u32,
        /// Actual byte length observed after the header.
        actual: usize,
    },
    /// A received message still carries the poison sentinel kind.
    #[error("message still poisoned: nothing valid was received")]
    Poisoned,
    /// A tail string field contained malformed UTF-8.
    #[error("invalid utf8 in tail string")]
    InvalidUtf8,
    /// A tail string field was missing its NUL terminator.
    #[error("unterminated tail string")]
    Unterminated,
}

/// Fixed-header unit of wire communication.
///
/// Every scalar field is carried in every header; which fields are meaningful
/// depends on the kind. The trailing variable-length payload is declared by
/// `extra_bytes` and transferred as a separate ordered write/read on the same
/// connection, never interleaved with another message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    /// Message kind tag.
    pub kind: MessageKind,
    /// OS process id of the sender.
    pub real_pid: i32,
    /// Coordinator-assigned virtual process id, or [`UNASSIGNED_VIRTUAL_PID`].
    pub virtual_pid: i32,
    /// Checkpoint interval in seconds; zero means "leave unchanged".
    pub ckpt_interval: u32,
    /// Computation-group identifier.
    pub comp_group: u64,
    /// Expected or reported peer count.
    pub num_peers: u32,
    /// Coordinator start timestamp.
    pub coord_timestamp: u64,
    /// Observed worker IPv4 address as big-endian octets.
    pub ip_addr: u32,
    /// Name-service key length.
    pub key_len: u32,
    /// Name-service value length.
    pub val_len: u32,
    /// Operator-command status code.
    pub cmd_status: u32,
    /// Operator-command character.
    pub coord_cmd: u8,
    /// Computation running flag.
    pub is_running: u8,
    /// Name-service namespace tag, NUL padded.
    pub nsid: [u8; NSID_LEN],
    /// Declared trailing-payload length.
    pub extra_bytes: u32,
}

impl Message {
    /// Construct a message of the given kind with all other fields zeroed
    /// and the virtual pid left unassigned.
    #[must_use]
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            real_pid: 0,
            virtual_pid: UNASSIGNED_VIRTUAL_PID,
            ckpt_interval: 0,
            comp_group: 0,
            num_peers: 0,
            coord_timestamp: 0,
            ip_addr: 0,
            key_len: 0,
            val_len: 0,
            cmd_status: 0,
            coord_cmd: 0,
            is_running: 0,
            nsid: [0; NSID_LEN],
            extra_bytes: 0,
        }
    }

    /// Construct a poisoned message suitable only for receiving a reply.
    #[must_use]
    pub fn poisoned() -> Self {
        Self::new(MessageKind::Invalid)
    }

    /// Reset the kind to the poison sentinel ahead of a blocking receive.
    pub fn poison(&mut self) {
        self.kind = MessageKind::Invalid;
    }

    /// Check that something valid was actually received into this message.
    pub fn assert_valid(&self) -> Result<(), CodecError> {
        if self.kind == MessageKind::Invalid {
            return Err(CodecError::Poisoned);
        }
        Ok(())
    }
}
