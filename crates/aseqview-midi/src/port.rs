//! Port bookkeeping shared by transport implementations.
//!
//! Index-based: a `PortId` is the slot index, assigned in attach order.

use crate::error::{Error, Result};
use crate::transport::{Direction, Lifecycle, PortCaps, PortId};

#[derive(Debug, Clone)]
pub struct PortInfo {
    pub id: PortId,
    pub name: String,
    pub caps: PortCaps,
    read_subscribers: usize,
    write_users: usize,
}

impl PortInfo {
    pub fn subscriber_count(&self, direction: Direction) -> usize {
        match direction {
            Direction::Read => self.read_subscribers,
            Direction::Write => self.write_users,
        }
    }
}

#[derive(Debug, Default)]
pub struct PortTable {
    ports: Vec<PortInfo>,
}

impl PortTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, name: impl Into<String>, caps: PortCaps) -> PortId {
        let name = name.into();
        let id = PortId(self.ports.len() as u32);
        tracing::debug!("Created sequencer port {}: {}", id, name);
        self.ports.push(PortInfo {
            id,
            name,
            caps,
            read_subscribers: 0,
            write_users: 0,
        });
        id
    }

    pub fn get(&self, port: PortId) -> Option<&PortInfo> {
        self.ports.get(port.0 as usize)
    }

    pub fn require(&self, port: PortId) -> Result<&PortInfo> {
        self.get(port).ok_or(Error::UnknownPort(port.0))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PortInfo> {
        self.ports.iter()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Applies a lifecycle signal to the subscription counters.
    /// Counters saturate at zero; returns `false` for unknown ports.
    pub fn apply(&mut self, port: PortId, signal: Lifecycle) -> bool {
        let Some(info) = self.ports.get_mut(port.0 as usize) else {
            return false;
        };
        match signal {
            Lifecycle::ReadSubscribed => info.read_subscribers += 1,
            Lifecycle::ReadUnsubscribed => {
                info.read_subscribers = info.read_subscribers.saturating_sub(1)
            }
            Lifecycle::WriteUsed => info.write_users += 1,
            Lifecycle::WriteUnused => info.write_users = info.write_users.saturating_sub(1),
        }
        tracing::trace!(
            "Port {} {:?}: read={} write={}",
            port,
            signal,
            info.read_subscribers,
            info.write_users
        );
        true
    }

    pub fn subscriber_count(&self, port: PortId, direction: Direction) -> usize {
        self.get(port)
            .map(|info| info.subscriber_count(direction))
            .unwrap_or(0)
    }
}
