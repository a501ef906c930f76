// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Resolve cohort coordinator configuration from the environment.
// Author: Lukas Bower

//! Coordinator endpoint and worker configuration.
//!
//! All values come from named environment variables with well-known
//! defaults; the operator CLI additionally layers flag overrides on top.

use std::env;
use std::str::FromStr;

use anyhow::{anyhow, Result};

/// Default coordinator hostname.
pub const COORD_DEFAULT_HOST: &str = "localhost";
/// Default coordinator TCP port.
pub const COORD_DEFAULT_PORT: u16 = 7779;
/// Default coordinator executable name, looked up on `PATH`.
pub const COORD_DEFAULT_BIN: &str = "cohort-coordinator";

/// Environment variable naming the coordinator host.
pub const ENV_COORD_HOST: &str = "COHORT_COORD_HOST";
/// Environment variable naming the coordinator port.
pub const ENV_COORD_PORT: &str = "COHORT_COORD_PORT";
/// Environment variable naming the coordinator executable.
pub const ENV_COORD_BIN: &str = "COHORT_COORD_BIN";
/// Environment variable carrying the one-shot checkpoint interval.
pub const ENV_CKPT_INTERVAL: &str = "COHORT_CKPT_INTERVAL";
/// Environment variable carrying the installation prefix path.
pub const ENV_PREFIX_PATH: &str = "COHORT_PREFIX_PATH";

/// How a worker attaches to the coordination service.
///
/// Read once at session-establishment time; this is configuration, not
/// runtime state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    /// Start a fresh coordinator, then attach to it.
    New,
    /// Attach to an existing coordinator; fail if none is reachable.
    Join,
    /// Attach if a coordinator is reachable, otherwise start a fresh one.
    Any,
    /// No external coordinator; this process runs the standalone stub.
    None,
}

/// Resolved client configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Coordinator host override; `None` means the default host.
    pub host: Option<String>,
    /// Coordinator port override; `None` means mode-dependent default.
    pub port: Option<u16>,
    /// Coordinator executable override.
    pub coord_bin: Option<String>,
    /// Installation prefix advertised during the handshake.
    pub prefix_path: Option<String>,
    /// Checkpoint interval, consumed exactly once by the first handshake.
    ckpt_interval: Option<u32>,
}

impl Config {
    /// Capture configuration from the environment.
    ///
    /// The checkpoint interval variable is removed from the environment once
    /// read so that it is only ever announced by the first handshake; later
    /// changes must go through the operator-command path.
    pub fn from_env() -> Result<Self> {
        let ckpt_interval = parse_env_number::<u32>(ENV_CKPT_INTERVAL)?;
        if ckpt_interval.is_some() {
            env::remove_var(ENV_CKPT_INTERVAL);
        }
        Ok(Self {
            host: non_empty_env(ENV_COORD_HOST),
            port: parse_env_number::<u16>(ENV_COORD_PORT)?,
            coord_bin: non_empty_env(ENV_COORD_BIN),
            prefix_path: non_empty_env(ENV_PREFIX_PATH),
            ckpt_interval,
        })
    }

    /// Configuration pointing at an explicit endpoint, bypassing the
    /// environment (embedders and tests).
    #[must_use]
    pub fn with_endpoint(host: &str, port: Option<u16>) -> Self {
        Self {
            host: Some(host.to_owned()),
            port,
            ..Self::default()
        }
    }

    /// Resolve the coordinator endpoint for the given mode.
    ///
    /// An unset port in `New` mode means "let the OS choose a free port";
    /// that is signalled here as port zero and resolved by the connector.
    #[must_use]
    pub fn resolve_endpoint(&self, mode: ConnectMode) -> (String, u16) {
        let host = self
            .host
            .clone()
            .unwrap_or_else(|| COORD_DEFAULT_HOST.to_owned());
        let port = match (self.port, mode) {
            (Some(port), _) => port,
            (None, ConnectMode::New) => 0,
            (None, _) => COORD_DEFAULT_PORT,
        };
        (host, port)
    }

    /// Coordinator executable to launch in `New`/`Any` fallback mode.
    #[must_use]
    pub fn coord_bin(&self) -> &str {
        self.coord_bin.as_deref().unwrap_or(COORD_DEFAULT_BIN)
    }

    /// Consume the one-shot checkpoint interval, if it was ever set.
    pub fn take_ckpt_interval(&mut self) -> Option<u32> {
        self.ckpt_interval.take()
    }

    /// Seed the one-shot checkpoint interval directly (tests and embedders).
    pub fn set_ckpt_interval(&mut self, seconds: u32) {
        self.ckpt_interval = Some(seconds);
    }
}

/// Read an environment variable, treating empty or whitespace as unset.
fn non_empty_env(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(_) => None,
    }
}

/// Parse a numeric environment variable, treating empty values as unset.
pub fn parse_env_number<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                trimmed
                    .parse::<T>()
                    .map(Some)
                    .map_err(|err| anyhow!("invalid {key} value '{trimmed}': {err}"))
            }
        }
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(anyhow!("failed to read {key}: {err}")),
    }
}
