// Author: Lukas Bower
// Purpose: Track the reserved connection slots held by a cohort process.

//! Reserved connection slots.
//!
//! Three well-known slots are reserved process-wide so the logical sessions
//! stay distinguishable from application-opened connections and survive
//! checkpoint-image save/restore. Slots are named handles in a registry, not
//! magic descriptor numbers; re-homing on fork/exec is a `rebind`.

use std::net::TcpListener;

use crate::session::Session;

/// The well-known reserved connection slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// The primary coordination session.
    Coordinator,
    /// The lazily-opened name-service session.
    NameService,
    /// The standalone stub's listening endpoint.
    Standalone,
}

/// What a slot currently holds.
#[derive(Debug)]
pub enum SlotHandle {
    /// An open connection to a coordinator.
    Connection(Session),
    /// A local accepting socket (standalone mode).
    Listener(TcpListener),
}

/// Registry mapping each reserved slot to its current handle.
///
/// At most one handle exists per slot; rebinding replaces the previous
/// handle wholesale.
#[derive(Debug, Default)]
pub struct SlotRegistry {
    coordinator: Option<SlotHandle>,
    name_service: Option<SlotHandle>,
    standalone: Option<SlotHandle>,
}

impl SlotRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, slot: Slot) -> &mut Option<SlotHandle> {
        match slot {
            Slot::Coordinator => &mut self.coordinator,
            Slot::NameService => &mut self.name_service,
            Slot::Standalone => &mut self.standalone,
        }
    }

    fn peek(&self, slot: Slot) -> Option<&SlotHandle> {
        match slot {
            Slot::Coordinator => self.coordinator.as_ref(),
            Slot::NameService => self.name_service.as_ref(),
            Slot::Standalone => self.standalone.as_ref(),
        }
    }

    /// Bind a handle onto a slot, replacing whatever was there.
    pub fn rebind(&mut self, slot: Slot, handle: SlotHandle) {
        *self.entry(slot) = Some(handle);
    }

    /// Remove and return the handle bound to a slot.
    pub fn take(&mut self, slot: Slot) -> Option<SlotHandle> {
        self.entry(slot).take()
    }

    /// Drop whatever the slot holds.
    pub fn clear(&mut self, slot: Slot) {
        *self.entry(slot) = None;
    }

    /// Borrow the session bound to a slot, if it holds a connection.
    pub fn session_mut(&mut self, slot: Slot) -> Option<&mut Session> {
        match self.entry(slot).as_mut() {
            Some(SlotHandle::Connection(session)) => Some(session),
            _ => None,
        }
    }

    /// Borrow the listener bound to a slot, if it holds one.
    pub fn listener(&self, slot: Slot) -> Option<&TcpListener> {
        match self.peek(slot) {
            Some(SlotHandle::Listener(listener)) => Some(listener),
            _ => None,
        }
    }

    /// Whether the slot currently holds an accepting socket.
    ///
    /// This is the standalone-mode probe: a listener on the standalone slot
    /// means no external coordinator is in play.
    #[must_use]
    pub fn is_listening(&self, slot: Slot) -> bool {
        matches!(self.peek(slot), Some(SlotHandle::Listener(_)))
    }

    /// Whether the slot currently holds an open connection.
    #[must_use]
    pub fn is_connected(&self, slot: Slot) -> bool {
        matches!(self.peek(slot), Some(SlotHandle::Connection(_)))
    }
}
