// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Own the process-wide cohort coordination client context.
// Author: Lukas Bower

//! The coordination client context.
//!
//! One [`CoordinatorClient`] exists per process, owned by process start-up
//! and passed explicitly to whatever needs it. It holds the reserved slot
//! registry, the computation membership, and the memoized standalone probe.
//! Initialization is single-threaded by contract; there is no hidden global.

use std::net::SocketAddr;

use log::{debug, info};

use cohort_codec::{parse_cstr, push_cstr, Message, MessageKind};

use crate::config::{Config, ConnectMode};
use crate::error::{ClientError, Result};
use crate::handshake::{self, Membership};
use crate::session::{establish, Established, Session};
use crate::slots::{Slot, SlotHandle, SlotRegistry};
use crate::util;

/// Process-wide coordination client.
#[derive(Debug)]
pub struct CoordinatorClient {
    pub(crate) config: Config,
    pub(crate) slots: SlotRegistry,
    membership: Option<Membership>,
    pub(crate) running: bool,
    standalone: Option<bool>,
}

impl CoordinatorClient {
    /// Build a client around the supplied configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            slots: SlotRegistry::new(),
            membership: None,
            running: false,
            standalone: None,
        }
    }

    /// Inspect the reserved slot registry (embedders and tests).
    #[must_use]
    pub fn registry(&self) -> &SlotRegistry {
        &self.slots
    }

    /// Membership established by the last successful handshake.
    #[must_use]
    pub fn membership(&self) -> Option<&Membership> {
        self.membership.as_ref()
    }

    /// Whether the computation has been marked running by the embedder.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Record the computation's running state (drives name-service routing).
    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Whether this process runs the standalone stub instead of talking to
    /// an external coordinator. Probed once and memoized.
    pub fn no_coordinator(&mut self) -> bool {
        if self.standalone.is_none() {
            self.standalone = Some(self.slots.is_listening(Slot::Standalone));
        }
        self.standalone.unwrap_or(false)
    }

    pub(crate) fn coord_session(&mut self) -> Result<&mut Session> {
        self.slots
            .session_mut(Slot::Coordinator)
            .ok_or(ClientError::NoSession("coordinator"))
    }

    /// Establish the mode-selected session and run the new-worker handshake.
    ///
    /// In `None` mode this binds the standalone listener instead and returns
    /// no membership.
    pub fn connect_on_startup(
        &mut self,
        mode: ConnectMode,
        program_name: &str,
    ) -> Result<Option<Membership>> {
        match establish(mode, &mut self.config)? {
            Established::Local(listener) => {
                self.slots
                    .rebind(Slot::Standalone, SlotHandle::Listener(listener));
                self.standalone = Some(true);
                Ok(None)
            }
            Established::Remote(mut session) => {
                let membership =
                    handshake::hello_new(&mut session, &mut self.config, program_name)?;
                self.slots
                    .rebind(Slot::Coordinator, SlotHandle::Connection(session));
                self.membership = Some(membership);
                Ok(Some(membership))
            }
        }
    }

    /// Re-establish membership for a computation being restarted.
    ///
    /// The accepted group must match the supplied group; a mismatch from the
    /// coordinator is a protocol violation.
    pub fn connect_on_restart(
        &mut self,
        mode: ConnectMode,
        program_name: &str,
        comp_group: u64,
        num_peers: u32,
    ) -> Result<Option<Membership>> {
        if self.no_coordinator() {
            return Ok(None);
        }
        match establish(mode, &mut self.config)? {
            Established::Local(listener) => {
                self.slots
                    .rebind(Slot::Standalone, SlotHandle::Listener(listener));
                self.standalone = Some(true);
                Ok(None)
            }
            Established::Remote(mut session) => {
                let membership = handshake::hello_restart(
                    &mut session,
                    &mut self.config,
                    program_name,
                    comp_group,
                    num_peers,
                )?;
                if membership.comp_group != comp_group {
                    return Err(ClientError::Protocol(format!(
                        "restart accepted into group {:x}, expected {:x}",
                        membership.comp_group, comp_group
                    )));
                }
                self.slots
                    .rebind(Slot::Coordinator, SlotHandle::Connection(session));
                self.membership = Some(membership);
                Ok(Some(membership))
            }
        }
    }

    /// Open a second connection and run a fresh handshake, for handing to a
    /// child about to be forked.
    pub fn connect_before_fork(&mut self, program_name: &str) -> Result<(Session, Membership)> {
        let coord_addr = self.coordinator_addr()?;
        let mut session = Session::connect_addr(coord_addr)?;
        let membership = handshake::hello_new(&mut session, &mut self.config, program_name)?;
        Ok((session, membership))
    }

    /// Fork discipline: the child replaces its primary session wholesale,
    /// discards any inherited name-service session outright, and announces
    /// its own pid with a fire-and-forget update.
    pub fn reset_on_fork(&mut self, inherited: Session) -> Result<()> {
        self.slots
            .rebind(Slot::Coordinator, SlotHandle::Connection(inherited));
        // Not meaningfully shared across the fork; reopened lazily on next use.
        self.slots.clear(Slot::NameService);
        debug!("informing coordinator of forked process");
        handshake::update_after_fork(self.coord_session()?)
    }

    /// Exec discipline: re-wrap the connection that survived exec and send
    /// the exec update. No new handshake.
    pub fn init_on_exec(&mut self, surviving: Session, program_name: &str) -> Result<()> {
        self.slots
            .rebind(Slot::Coordinator, SlotHandle::Connection(surviving));
        debug!("informing coordinator of exec into {program_name}");
        handshake::update_after_exec(self.coord_session()?, program_name)
    }

    /// Ask the coordinator for the shared checkpoint directory.
    ///
    /// Returns an empty path when running standalone.
    pub fn coord_ckpt_dir(&mut self) -> Result<String> {
        if self.no_coordinator() {
            return Ok(String::new());
        }
        let msg = Message::new(MessageKind::GetCkptDir);
        let (reply, tail) = self.coord_session()?.send_recv(&msg, None)?;
        if reply.kind != MessageKind::GetCkptDirResult {
            return Err(ClientError::unexpected_kind("GetCkptDirResult", reply.kind));
        }
        Ok(parse_cstr(&tail)?.to_owned())
    }

    /// Push a new shared checkpoint directory to the coordinator.
    pub fn update_ckpt_dir(&mut self, dir: &str) -> Result<()> {
        if self.no_coordinator() {
            return Ok(());
        }
        let mut msg = Message::new(MessageKind::UpdateCkptDir);
        let mut tail = Vec::new();
        push_cstr(&mut tail, dir);
        msg.extra_bytes = tail.len() as u32;
        self.coord_session()?.notify(&msg, Some(&tail))
    }

    /// Record this worker's checkpoint filename with the coordinator.
    pub fn send_ckpt_filename(&mut self, filename: &str) -> Result<()> {
        if self.no_coordinator() {
            return Ok(());
        }
        let mut msg = Message::new(MessageKind::CkptFilename);
        let mut tail = Vec::new();
        push_cstr(&mut tail, filename);
        push_cstr(&mut tail, &util::hostname());
        msg.extra_bytes = tail.len() as u32;
        self.coord_session()?.notify(&msg, Some(&tail))
    }

    /// Drop the coordinator sessions on exit.
    pub fn close_connection(&mut self) {
        info!("disconnecting from coordinator");
        self.slots.clear(Slot::Coordinator);
        self.slots.clear(Slot::NameService);
    }

    fn coordinator_addr(&mut self) -> Result<SocketAddr> {
        if let Some(membership) = self.membership {
            return Ok(membership.coord_addr);
        }
        Err(ClientError::NoSession("coordinator"))
    }
}
