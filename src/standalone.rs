// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Serve operator commands when no external coordinator exists.
// Author: Lukas Bower

//! Standalone coordinator stub.
//!
//! Active only in `None` mode. A single-threaded accept loop reads exactly
//! one operator command per connection and replies before accepting the
//! next. The kill/quit commands terminate the process with no reply sent,
//! mirroring the kill directive's unconditional semantics.

use std::process;

use log::{debug, info, trace};

use cohort_codec::{CmdStatus, Message, MessageKind};

use crate::client::CoordinatorClient;
use crate::error::{ClientError, Result};
use crate::session::Session;
use crate::slots::Slot;

/// What to do with one received operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    /// Reply with the given status and keep serving.
    Acknowledge(CmdStatus),
    /// Exit the process immediately; no reply is sent.
    Quit,
}

/// Interpret a single operator-command character.
#[must_use]
pub fn interpret_command(cmd: u8) -> CommandAction {
    match cmd {
        b'c' | b'C' => CommandAction::Acknowledge(CmdStatus::NoError),
        b'k' | b'K' | b'q' | b'Q' => CommandAction::Quit,
        other => {
            debug!("unhandled user command {:?}", other as char);
            CommandAction::Acknowledge(CmdStatus::InvalidCommand)
        }
    }
}

/// Serve exactly one command on an accepted connection.
///
/// Anything other than a user command on this endpoint is a fatal
/// "unexpected connection". Quit is reported to the caller without a reply
/// having been written.
pub fn serve_connection(session: &mut Session) -> Result<CommandAction> {
    let (msg, _tail) = session.recv()?;
    if msg.kind != MessageKind::UserCommand {
        return Err(ClientError::Protocol(format!(
            "unexpected connection: {:?} on the standalone command endpoint",
            msg.kind
        )));
    }
    let action = interpret_command(msg.coord_cmd);
    if let CommandAction::Acknowledge(status) = action {
        trace!("acknowledging command {:?} with {status}", msg.coord_cmd as char);
        let mut reply = Message::new(MessageKind::UserCommandResult);
        reply.cmd_status = status as u32;
        session.send(&reply, None)?;
    }
    Ok(action)
}

impl CoordinatorClient {
    /// Accept one connection on the standalone listener and serve its
    /// command. Exits the process on a kill/quit command.
    pub fn wait_for_command(&mut self) -> Result<()> {
        let listener = self
            .slots
            .listener(Slot::Standalone)
            .ok_or(ClientError::NoSession("standalone listener"))?;
        let mut session = loop {
            let (stream, peer) = listener.accept()?;
            trace!("reading operator command from {peer}");
            match Session::from_stream(stream) {
                Ok(session) => break session,
                Err(_) => continue,
            }
        };
        match serve_connection(&mut session)? {
            CommandAction::Quit => {
                info!("received kill command from operator, exiting");
                process::exit(0);
            }
            CommandAction::Acknowledge(_) => Ok(()),
        }
    }
}
