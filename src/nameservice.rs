// Author: Lukas Bower
// Purpose: Client side of the cohort name-service rendezvous channel.

//! Name-service rendezvous client.
//!
//! Small key→value registrations and queries brokered by the coordinator.
//! Until the computation is running, traffic multiplexes on the primary
//! session; once running, the first use lazily opens a dedicated session
//! and announces it as a name-service peer.

use log::warn;

use cohort_codec::{Message, MessageKind, NSID_LEN};

use crate::client::CoordinatorClient;
use crate::config::ConnectMode;
use crate::error::{ClientError, Result};
use crate::session::Session;
use crate::slots::{Slot, SlotHandle};

impl CoordinatorClient {
    /// Register `key` → `value` under the namespace tag.
    ///
    /// With `sync`, blocks for the acknowledgement: any query another peer
    /// issues after observing the ack is guaranteed to see this value. The
    /// non-sync variant gives no ordering guarantee.
    pub fn register_ns_data(
        &mut self,
        nsid: &str,
        key: &[u8],
        value: &[u8],
        sync: bool,
    ) -> Result<()> {
        let kind = if sync {
            MessageKind::RegisterNsDataSync
        } else {
            MessageKind::RegisterNsData
        };
        let mut msg = Message::new(kind);
        msg.nsid = nsid_bytes(nsid);
        msg.key_len = key.len() as u32;
        msg.val_len = value.len() as u32;
        msg.extra_bytes = (key.len() + value.len()) as u32;
        let mut tail = Vec::with_capacity(key.len() + value.len());
        tail.extend_from_slice(key);
        tail.extend_from_slice(value);

        let session = self.ns_session()?;
        if sync {
            let (reply, _) = session.send_recv(&msg, Some(&tail))?;
            if reply.kind != MessageKind::RegisterNsDataSyncAck {
                return Err(ClientError::unexpected_kind(
                    "a sync registration ack",
                    reply.kind,
                ));
            }
        } else {
            session.notify(&msg, Some(&tail))?;
        }
        Ok(())
    }

    /// Query the value registered under `key` in the namespace.
    ///
    /// Empty keys and zero capacity are rejected locally without a round
    /// trip. A returned value longer than `capacity` is a fatal contract
    /// violation by the service, never a truncated result.
    pub fn query_ns_data(&mut self, nsid: &str, key: &[u8], capacity: usize) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Err(ClientError::InvalidArgument("name-service query needs a key"));
        }
        if capacity == 0 {
            return Err(ClientError::InvalidArgument(
                "name-service query needs buffer capacity",
            ));
        }
        let mut msg = Message::new(MessageKind::NsQuery);
        msg.nsid = nsid_bytes(nsid);
        msg.key_len = key.len() as u32;
        msg.extra_bytes = key.len() as u32;

        let session = self.ns_session()?;
        let (reply, tail) = session.send_recv(&msg, Some(key))?;
        if reply.kind != MessageKind::NsQueryResult {
            return Err(ClientError::unexpected_kind("a query result", reply.kind));
        }
        if reply.val_len as usize != tail.len() {
            return Err(ClientError::Protocol(format!(
                "query result declared {} value bytes but carried {}",
                reply.val_len,
                tail.len()
            )));
        }
        if tail.len() > capacity {
            return Err(ClientError::Protocol(format!(
                "query result of {} bytes exceeds caller capacity {capacity}",
                tail.len()
            )));
        }
        Ok(tail)
    }

    /// Session carrying name-service traffic: the primary session before the
    /// computation runs, a dedicated lazily-opened one afterwards.
    fn ns_session(&mut self) -> Result<&mut Session> {
        if !self.running {
            return self.coord_session();
        }
        if !self.slots.is_connected(Slot::NameService) {
            let (host, port) = self.config.resolve_endpoint(ConnectMode::Any);
            let mut session = Session::connect(&host, port)
                .map_err(|_| ClientError::CoordinatorNotFound { host, port })?;
            let join = Message::new(MessageKind::NsWorkerJoin);
            session.notify(&join, None)?;
            self.slots
                .rebind(Slot::NameService, SlotHandle::Connection(session));
        }
        self.slots
            .session_mut(Slot::NameService)
            .ok_or(ClientError::NoSession("name service"))
    }
}

/// Fit a namespace tag into the fixed header field.
///
/// Oversized tags are truncated with a warning; unlike the wire invariants
/// this is deliberately not fatal.
fn nsid_bytes(nsid: &str) -> [u8; NSID_LEN] {
    let raw = nsid.as_bytes();
    if raw.len() > NSID_LEN {
        warn!("namespace tag '{nsid}' exceeds {NSID_LEN} bytes, truncating");
    }
    let mut out = [0u8; NSID_LEN];
    let len = raw.len().min(NSID_LEN);
    out[..len].copy_from_slice(&raw[..len]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nsid_is_padded_or_truncated_to_the_field_width() {
        assert_eq!(&nsid_bytes("mpi"), b"mpi\0\0\0\0\0");
        assert_eq!(&nsid_bytes("rendezvous"), b"rendezvo");
    }
}
