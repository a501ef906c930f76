// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Own the byte-stream session to the cohort coordinator.
// Author: Lukas Bower

//! Transport session and mode-driven connection establishment.
//!
//! A [`Session`] is one logical connection to the coordination service.
//! Messages travel as a fixed header optionally followed by one tail of the
//! declared length; the two writes (and reads) are ordered operations on the
//! same connection and never interleave with another message's data.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::process::Command;

use log::{debug, info, trace};

use cohort_codec::{decode_header, encode, Message, HEADER_LEN};

use crate::config::{Config, ConnectMode};
use crate::error::{ClientError, Result};
use crate::util;

/// One logical connection to the coordination service.
#[derive(Debug)]
pub struct Session {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Session {
    /// Open a new connection to the given endpoint. Never retries.
    pub fn connect(host: &str, port: u16) -> std::io::Result<Self> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::new(ErrorKind::NotFound, "no addresses resolved"))?;
        let stream = TcpStream::connect(addr)?;
        Self::from_stream(stream)
    }

    /// Open a new connection to an already-resolved address. Never retries.
    pub fn connect_addr(addr: SocketAddr) -> std::io::Result<Self> {
        Self::from_stream(TcpStream::connect(addr)?)
    }

    /// Wrap an already-connected stream (accepted or inherited).
    pub fn from_stream(stream: TcpStream) -> std::io::Result<Self> {
        let peer = stream.peer_addr()?;
        Ok(Self { stream, peer })
    }

    /// Address of the coordinator end of this session.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Send one message: header first, then the tail of the declared length.
    pub fn send(&mut self, msg: &Message, tail: Option<&[u8]>) -> Result<()> {
        let tail_len = tail.map_or(0, <[u8]>::len);
        if tail_len != msg.extra_bytes as usize {
            return Err(ClientError::InvalidArgument(
                "tail length does not match the declared extra_bytes",
            ));
        }
        trace!("send {:?} tail={}B to {}", msg.kind, tail_len, self.peer);
        self.stream.write_all(&encode(msg))?;
        if let Some(tail) = tail {
            self.stream.write_all(tail)?;
        }
        self.stream.flush()?;
        Ok(())
    }

    /// Send a notification that receives no reply.
    ///
    /// Distinct from [`Session::send_recv`] so that fire-and-forget updates
    /// can never be paired with an accidental blocking receive.
    pub fn notify(&mut self, msg: &Message, tail: Option<&[u8]>) -> Result<()> {
        self.send(msg, tail)
    }

    /// Block for one message and its tail.
    ///
    /// The reply starts out poisoned; if the connection yields nothing it
    /// stays poisoned and the validity check reports that no message was
    /// received. A tail that ends before the declared length is a protocol
    /// violation, never a silent truncation.
    pub fn recv(&mut self) -> Result<(Message, Vec<u8>)> {
        let mut reply = Message::poisoned();
        let mut header = [0u8; HEADER_LEN];
        match self.stream.read_exact(&mut header) {
            Ok(()) => reply = decode_header(&header)?,
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => {}
            Err(err) => return Err(err.into()),
        }
        reply.assert_valid()?;
        let mut tail = vec![0u8; reply.extra_bytes as usize];
        if !tail.is_empty() {
            self.stream.read_exact(&mut tail).map_err(|err| {
                if err.kind() == ErrorKind::UnexpectedEof {
                    ClientError::Codec(cohort_codec::CodecError::Truncated)
                } else {
                    ClientError::Io(err)
                }
            })?;
        }
        trace!("recv {:?} tail={}B from {}", reply.kind, tail.len(), self.peer);
        Ok((reply, tail))
    }

    /// Send one message and block for exactly one reply.
    pub fn send_recv(&mut self, msg: &Message, tail: Option<&[u8]>) -> Result<(Message, Vec<u8>)> {
        self.send(msg, tail)?;
        self.recv()
    }
}

/// Outcome of session establishment.
#[derive(Debug)]
pub enum Established {
    /// A live connection to a remote (or freshly spawned) coordinator.
    Remote(Session),
    /// The local listening endpoint backing the standalone stub.
    Local(TcpListener),
}

/// Seam for launching a coordinator process, so that the mode-fallback
/// policy can be exercised without exec'ing anything.
pub trait CoordinatorLauncher {
    /// Synchronously launch a coordinator listening on `port`.
    fn launch(&mut self, bin: &str, port: u16) -> Result<()>;
}

/// Launcher that spawns the real coordinator executable.
#[derive(Debug, Default)]
pub struct ProcessLauncher;

impl CoordinatorLauncher for ProcessLauncher {
    fn launch(&mut self, bin: &str, port: u16) -> Result<()> {
        info!("starting coordinator `{bin}` on port {port}");
        let status = Command::new(bin)
            .arg("--daemon")
            .arg("--exit-on-last")
            .arg("--port")
            .arg(port.to_string())
            .status()
            .map_err(|err| ClientError::SpawnFailed {
                bin: bin.to_owned(),
                detail: err.to_string(),
            })?;
        if !status.success() {
            return Err(ClientError::SpawnFailed {
                bin: bin.to_owned(),
                detail: format!("launch step exited with {status}"),
            });
        }
        Ok(())
    }
}

/// Establish a session according to the configured connection mode.
pub fn establish(mode: ConnectMode, config: &mut Config) -> Result<Established> {
    establish_with(mode, config, &mut ProcessLauncher)
}

/// Mode-driven establishment policy with an injectable launcher.
pub fn establish_with(
    mode: ConnectMode,
    config: &mut Config,
    launcher: &mut dyn CoordinatorLauncher,
) -> Result<Established> {
    let (host, port) = config.resolve_endpoint(mode);
    match mode {
        ConnectMode::None => {
            let listen_port = if port == 0 { crate::config::COORD_DEFAULT_PORT } else { port };
            let listener = TcpListener::bind(("0.0.0.0", listen_port))?;
            info!("standalone stub listening on port {listen_port}");
            Ok(Established::Local(listener))
        }
        ConnectMode::Join => {
            let session = Session::connect(&host, port)
                .map_err(|_| ClientError::CoordinatorNotFound { host: host.clone(), port })?;
            debug!("joined coordinator at {}", session.peer_addr());
            Ok(Established::Remote(session))
        }
        ConnectMode::New => {
            let port = start_new_coordinator(config, launcher, &host, port)?;
            let session = Session::connect(&host, port)
                .map_err(|_| ClientError::CoordinatorNotFound { host: host.clone(), port })?;
            Ok(Established::Remote(session))
        }
        ConnectMode::Any => match Session::connect(&host, port) {
            Ok(session) => Ok(Established::Remote(session)),
            Err(_) => {
                info!("coordinator not found at {host}:{port}, starting a new one");
                let port = start_new_coordinator(config, launcher, &host, port)?;
                let session = Session::connect(&host, port)
                    .map_err(|_| ClientError::CoordinatorNotFound { host: host.clone(), port })?;
                Ok(Established::Remote(session))
            }
        },
    }
}

/// Spawn a fresh coordinator bound to the resolved (or OS-chosen) port.
///
/// Only permitted when the resolved host is this machine; nothing can be
/// spawned remotely.
fn start_new_coordinator(
    config: &mut Config,
    launcher: &mut dyn CoordinatorLauncher,
    host: &str,
    port: u16,
) -> Result<u16> {
    if !util::host_is_local(host) {
        return Err(ClientError::RemoteSpawn(host.to_owned()));
    }
    let port = if port == 0 { free_local_port()? } else { port };
    // Later sessions (name service, operator commands) must resolve to the
    // port the coordinator actually took.
    config.port = Some(port);
    launcher.launch(config.coord_bin(), port)?;
    Ok(port)
}

/// Ask the OS for a currently-free loopback port.
fn free_local_port() -> Result<u16> {
    let probe = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(probe.local_addr()?.port())
}
