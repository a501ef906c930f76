// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Drive the cohort worker handshake and interpret its outcome.
// Author: Lukas Bower

//! Worker handshake protocol.
//!
//! A worker moves UNCONNECTED → CONNECTED (session established) →
//! HANDSHAKING → MEMBER or TERMINATED. The hello carries the worker's real
//! pid, the consume-once checkpoint interval, and hostname / program name /
//! optional install prefix as NUL-terminated tail strings; the reply is one
//! of accept, three distinct rejections, or an unconditional kill.

use std::net::{Ipv4Addr, SocketAddr};
use std::process;

use log::{debug, info};

use cohort_codec::{push_cstr, Message, MessageKind, UNASSIGNED_VIRTUAL_PID};

use crate::config::Config;
use crate::error::{ClientError, RejectReason, Result};
use crate::session::Session;
use crate::util;

/// Computation membership established by a successful handshake.
///
/// Immutable for the lifetime of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    /// Identifier of the computation this worker belongs to.
    pub comp_group: u64,
    /// Virtual process id assigned by the coordinator.
    pub virtual_pid: i32,
    /// Coordinator start timestamp.
    pub coord_timestamp: u64,
    /// Network address of the coordinator end of the session.
    pub coord_addr: SocketAddr,
    /// This worker's address as observed by the coordinator.
    pub local_ip: Ipv4Addr,
}

/// How the coordinator answered a hello.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Admitted; the message carries the assigned identity.
    Accepted,
    /// Unconditional termination directive.
    Killed,
    /// Refused for one of the three distinct reasons.
    Rejected(RejectReason),
}

/// Classify a handshake reply. Exhaustive over the reply contract; any
/// other kind is a fatal protocol violation.
pub fn interpret_reply(reply: &Message) -> Result<HandshakeOutcome> {
    match reply.kind {
        MessageKind::Kill => Ok(HandshakeOutcome::Killed),
        MessageKind::RejectNotRunning => {
            Ok(HandshakeOutcome::Rejected(RejectReason::NotRunning))
        }
        MessageKind::RejectWrongGroup => Ok(HandshakeOutcome::Rejected(RejectReason::WrongGroup)),
        MessageKind::RejectWrongPrefix => {
            Ok(HandshakeOutcome::Rejected(RejectReason::WrongPrefix))
        }
        MessageKind::Accept => {
            if reply.virtual_pid == UNASSIGNED_VIRTUAL_PID {
                return Err(ClientError::Protocol(
                    "accept carried the unassigned virtual pid sentinel".to_owned(),
                ));
            }
            Ok(HandshakeOutcome::Accepted)
        }
        other => Err(ClientError::unexpected_kind("a handshake reply", other)),
    }
}

/// Announce a new worker and block for its membership.
pub fn hello_new(
    session: &mut Session,
    config: &mut Config,
    program_name: &str,
) -> Result<Membership> {
    let hello = Message::new(MessageKind::NewWorker);
    send_recv_handshake(session, config, hello, program_name)
}

/// Announce a restarting worker resuming a previously-known computation.
pub fn hello_restart(
    session: &mut Session,
    config: &mut Config,
    program_name: &str,
    comp_group: u64,
    num_peers: u32,
) -> Result<Membership> {
    let mut hello = Message::new(MessageKind::RestartWorker);
    hello.comp_group = comp_group;
    hello.num_peers = num_peers;
    send_recv_handshake(session, config, hello, program_name)
}

fn send_recv_handshake(
    session: &mut Session,
    config: &mut Config,
    mut hello: Message,
    program_name: &str,
) -> Result<Membership> {
    hello.real_pid = process::id() as i32;
    // Announce the interval only once; later changes go through the
    // operator-command path.
    hello.ckpt_interval = config.take_ckpt_interval().unwrap_or(0);

    let mut tail = Vec::new();
    push_cstr(&mut tail, &util::hostname());
    push_cstr(&mut tail, program_name);
    if let Some(prefix) = config.prefix_path.as_deref() {
        push_cstr(&mut tail, prefix);
    }
    hello.extra_bytes = tail.len() as u32;

    debug!("sending {:?} handshake for {program_name}", hello.kind);
    let (reply, _tail) = session.send_recv(&hello, Some(&tail))?;
    match interpret_reply(&reply)? {
        HandshakeOutcome::Killed => {
            info!("received kill directive from coordinator, exiting");
            process::exit(0);
        }
        HandshakeOutcome::Rejected(reason) => Err(ClientError::Rejected(reason)),
        HandshakeOutcome::Accepted => {
            let membership = Membership {
                comp_group: reply.comp_group,
                virtual_pid: reply.virtual_pid,
                coord_timestamp: reply.coord_timestamp,
                coord_addr: session.peer_addr(),
                local_ip: Ipv4Addr::from(reply.ip_addr.to_be_bytes()),
            };
            info!(
                "joined computation {:x} as virtual pid {}",
                membership.comp_group, membership.virtual_pid
            );
            Ok(membership)
        }
    }
}

/// Fire-and-forget re-announcement after fork; carries the child's own pid
/// and receives no reply.
pub fn update_after_fork(session: &mut Session) -> Result<()> {
    let mut msg = Message::new(MessageKind::UpdateAfterFork);
    msg.real_pid = process::id() as i32;
    session.notify(&msg, None)
}

/// Fire-and-forget re-announcement after exec; carries the new program name
/// and receives no reply.
pub fn update_after_exec(session: &mut Session, program_name: &str) -> Result<()> {
    let mut msg = Message::new(MessageKind::UpdateAfterExec);
    let mut tail = Vec::new();
    push_cstr(&mut tail, program_name);
    msg.extra_bytes = tail.len() as u32;
    session.notify(&msg, Some(&tail))
}
