//! Channel registry.
//!
//! Channels are owned by the registry and addressed by id; callers hold a
//! [`ChannelId`] rather than a reference. Id 0 is the connection control
//! channel, present from construction and never handed out by
//! [`ChannelRegistry::allocate`].

use std::collections::BTreeMap;

use crate::error::{BurrowError, Result};

/// Channel number on the wire.
pub type ChannelId = u16;

/// The connection control channel.
pub const CONTROL_CHANNEL: ChannelId = 0;

/// A logical multiplexing lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    id: ChannelId,
    open: bool,
}

impl Channel {
    /// New closed channel.
    pub fn new(id: ChannelId) -> Self {
        Self { id, open: false }
    }

    /// Channel number.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Whether channel.open-ok has been received and no close has completed.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Whether this is channel 0.
    pub fn is_control(&self) -> bool {
        self.id == CONTROL_CHANNEL
    }

    pub(crate) fn set_open(&mut self, open: bool) {
        self.open = open;
    }
}

/// Channels of one session, keyed by id.
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    channels: BTreeMap<ChannelId, Channel>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    /// Registry holding only the control channel.
    pub fn new() -> Self {
        let mut channels = BTreeMap::new();
        channels.insert(CONTROL_CHANNEL, Channel::new(CONTROL_CHANNEL));
        Self { channels }
    }

    /// Look up a channel.
    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(&id)
    }

    /// Look up a channel mutably.
    pub fn get_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels.get_mut(&id)
    }

    /// Insert `channel`, replacing any channel with the same id.
    pub fn register(&mut self, channel: Channel) {
        self.channels.insert(channel.id(), channel);
    }

    /// Pick a channel id for a new lane.
    ///
    /// Reuses the lowest closed non-control channel if any exists; otherwise
    /// registers a fresh channel one past the highest id in use, or the
    /// lowest unused id once 65535 is taken.
    pub fn allocate(&mut self) -> Result<ChannelId> {
        if let Some(reusable) = self
            .channels
            .values()
            .find(|c| !c.is_control() && !c.is_open())
        {
            return Ok(reusable.id());
        }

        let highest = self.channels.keys().next_back().copied().unwrap_or(CONTROL_CHANNEL);
        let next = match highest.checked_add(1) {
            Some(next) => next,
            None => (1..=ChannelId::MAX)
                .find(|id| !self.channels.contains_key(id))
                .ok_or_else(|| BurrowError::Connection("No free channel ids".to_string()))?,
        };
        self.register(Channel::new(next));
        Ok(next)
    }

    /// All channels in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    /// Ids of open non-control channels, in id order.
    pub fn open_ids(&self) -> Vec<ChannelId> {
        self.channels
            .values()
            .filter(|c| !c.is_control() && c.is_open())
            .map(Channel::id)
            .collect()
    }

    /// Number of registered channels, control channel included.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Always false; the control channel is never removed.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Mark every channel closed.
    pub(crate) fn close_all(&mut self) {
        for channel in self.channels.values_mut() {
            channel.set_open(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_channel_preregistered() {
        let registry = ChannelRegistry::new();
        let control = registry.get(CONTROL_CHANNEL).unwrap();
        assert!(control.is_control());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_allocate_without_closing_mints_increasing_ids() {
        let mut registry = ChannelRegistry::new();
        let first = registry.allocate().unwrap();
        registry.get_mut(first).unwrap().set_open(true);
        let second = registry.allocate().unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn test_allocate_reuses_closed_channel() {
        let mut registry = ChannelRegistry::new();
        let first = registry.allocate().unwrap();
        registry.get_mut(first).unwrap().set_open(true);
        registry.get_mut(first).unwrap().set_open(false);

        assert_eq!(registry.allocate().unwrap(), first);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_allocate_never_returns_control() {
        let mut registry = ChannelRegistry::new();
        // Control channel is closed before connect, yet must not be reused.
        assert_ne!(registry.allocate().unwrap(), CONTROL_CHANNEL);
    }

    #[test]
    fn test_open_ids_excludes_control() {
        let mut registry = ChannelRegistry::new();
        registry.get_mut(CONTROL_CHANNEL).unwrap().set_open(true);
        let id = registry.allocate().unwrap();
        registry.get_mut(id).unwrap().set_open(true);
        registry.register(Channel::new(7));

        assert_eq!(registry.open_ids(), vec![id]);

        registry.close_all();
        assert!(registry.open_ids().is_empty());
        assert!(!registry.get(CONTROL_CHANNEL).unwrap().is_open());
    }

    #[test]
    fn test_allocate_past_highest_id_fills_gap() {
        let mut registry = ChannelRegistry::new();
        let mut top = Channel::new(ChannelId::MAX);
        top.set_open(true);
        registry.register(top);

        let id = registry.allocate().unwrap();
        assert_eq!(id, 1);
        assert!(registry.get(ChannelId::MAX).unwrap().is_open());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_allocate_exhausted() {
        let mut registry = ChannelRegistry::new();
        for id in 1..=ChannelId::MAX {
            let mut channel = Channel::new(id);
            channel.set_open(true);
            registry.register(channel);
        }

        assert!(registry.allocate().unwrap_err().is_connection());
        assert_eq!(registry.len(), usize::from(ChannelId::MAX) + 1);
    }
}
