// Author: Lukas Bower
// Purpose: Send single-character operator commands to a running coordinator.

//! Operator command client.
//!
//! Opens a throwaway session, sends one command character, and decodes the
//! structured status reply. An unreachable coordinator is a soft status on
//! this path so operator tooling can react, never a fatal error.

use log::debug;

use cohort_codec::{CmdStatus, Message, MessageKind};

use crate::config::{Config, ConnectMode};
use crate::error::{ClientError, Result};
use crate::session::Session;

/// Decoded reply to an operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandReply {
    /// Outcome status reported by the coordinator.
    pub status: CmdStatus,
    /// Number of peers currently in the computation.
    pub num_peers: u32,
    /// Whether the computation is in the running state.
    pub is_running: bool,
}

impl CommandReply {
    fn local(status: CmdStatus) -> Self {
        Self {
            status,
            num_peers: 0,
            is_running: false,
        }
    }
}

/// Connect to the resolved endpoint and send one command character.
pub fn connect_and_send_command(config: &mut Config, cmd: char) -> Result<CommandReply> {
    let (host, port) = config.resolve_endpoint(ConnectMode::Any);
    let mut session = match Session::connect(&host, port) {
        Ok(session) => session,
        Err(err) => {
            debug!("no coordinator at {host}:{port}: {err}");
            return Ok(CommandReply::local(CmdStatus::CoordinatorNotFound));
        }
    };
    send_command(&mut session, config, cmd)
}

/// Send one command character on an existing session and decode the reply.
///
/// For the quit/kill characters the remote end may close the connection as
/// its only signal, so no reply is awaited.
pub fn send_command(session: &mut Session, config: &mut Config, cmd: char) -> Result<CommandReply> {
    let mut msg = Message::new(MessageKind::UserCommand);
    msg.coord_cmd = cmd as u8;
    if matches!(cmd, 'i' | 'I') {
        if let Some(interval) = config.take_ckpt_interval() {
            msg.ckpt_interval = interval;
        }
    }
    session.send(&msg, None)?;

    if matches!(cmd, 'q' | 'Q' | 'k' | 'K') {
        return Ok(CommandReply::local(CmdStatus::NoError));
    }

    let (reply, _tail) = session.recv()?;
    if reply.kind != MessageKind::UserCommandResult {
        return Err(ClientError::unexpected_kind("a command result", reply.kind));
    }
    Ok(CommandReply {
        status: CmdStatus::try_from(reply.cmd_status)?,
        num_peers: reply.num_peers,
        is_running: reply.is_running != 0,
    })
}
