// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Defines the cohort library and public module surface.
// Author: Lukas Bower
#![warn(missing_docs)]

//! Client half of the cohort distributed checkpoint-coordination protocol.
//!
//! A worker process establishes a [`session::Session`] to the coordination
//! service (mode-selected, with standalone fallback), runs the
//! [`handshake`] to obtain its computation membership, and may then use the
//! [`nameservice`] rendezvous channel; operator tooling uses the
//! [`command`] client against the same wire contract.

pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod handshake;
pub mod nameservice;
pub mod session;
pub mod slots;
pub mod standalone;
pub mod util;

pub use client::CoordinatorClient;
pub use command::{connect_and_send_command, CommandReply};
pub use config::{Config, ConnectMode};
pub use error::{ClientError, RejectReason};
pub use handshake::{HandshakeOutcome, Membership};
pub use session::{establish, Established, Session};
pub use slots::{Slot, SlotHandle, SlotRegistry};
