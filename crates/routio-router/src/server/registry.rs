// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Channel registry: named channels, membership sets, presence events.
//!
//! Channels hold peer ids only, never connection handles; the dispatcher
//! resolves ids back to connections through its own map. A channel lives
//! while at least one of its publisher/subscriber/watcher sets is
//! non-empty and is garbage-collected the moment all three drain.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use super::protocol::PresenceRole;

/// Peer identifier, unique for the daemon lifetime, never reused.
pub type PeerId = u32;

/// Channel identifier, assigned at channel creation.
pub type ChannelId = u32;

/// Per-channel traffic counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChannelStats {
    /// DATA frames accepted from publishers.
    pub frames_in: u64,
    /// Total wire bytes of accepted DATA frames (including frame header).
    pub bytes_in: u64,
    /// Frames dropped because a subscriber's outbound queue was full.
    pub frames_dropped: u64,
}

/// One named channel.
#[derive(Debug)]
pub struct Channel {
    id: ChannelId,
    name: String,
    type_tag: String,
    publishers: Vec<PeerId>,
    subscribers: Vec<PeerId>,
    watchers: Vec<PeerId>,
    stats: ChannelStats,
}

impl Channel {
    fn new(id: ChannelId, name: String, type_tag: String) -> Self {
        Self {
            id,
            name,
            type_tag,
            publishers: Vec::new(),
            subscribers: Vec::new(),
            watchers: Vec::new(),
            stats: ChannelStats::default(),
        }
    }

    /// Channel id.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type tag fixed at first registration.
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// Publishers in registration order.
    pub fn publishers(&self) -> &[PeerId] {
        &self.publishers
    }

    /// Subscribers in subscription order (delivery order).
    pub fn subscribers(&self) -> &[PeerId] {
        &self.subscribers
    }

    /// Watchers in registration order.
    pub fn watchers(&self) -> &[PeerId] {
        &self.watchers
    }

    /// Traffic counters.
    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    fn set_for(&mut self, role: PresenceRole) -> &mut Vec<PeerId> {
        match role {
            PresenceRole::Publisher => &mut self.publishers,
            PresenceRole::Subscriber => &mut self.subscribers,
        }
    }

    fn touches(&self, peer: PeerId) -> bool {
        self.publishers.contains(&peer)
            || self.subscribers.contains(&peer)
            || self.watchers.contains(&peer)
    }

    fn is_unused(&self) -> bool {
        self.publishers.is_empty() && self.subscribers.is_empty() && self.watchers.is_empty()
    }
}

/// Registry operation failure. All variants are advisory: the peer stays
/// connected and receives an `ERROR` frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Peer offered a type tag different from the channel's fixed tag.
    #[error("channel '{channel}' carries tag {expected}, peer offered {offered}")]
    TagMismatch {
        channel: String,
        expected: String,
        offered: String,
    },

    /// Channel id does not name a live channel.
    #[error("unknown channel id {0}")]
    UnknownChannel(ChannelId),

    /// DATA sender is not a registered publisher on the channel.
    #[error("peer {peer} is not a publisher on channel id {channel_id}")]
    NotPublisher { peer: PeerId, channel_id: ChannelId },
}

/// Presence notification owed to one watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEvent {
    /// Watcher the notification goes to.
    pub watcher: PeerId,
    pub channel_id: ChannelId,
    /// Peer that joined or left.
    pub peer: PeerId,
    pub role: PresenceRole,
    pub joined: bool,
}

/// The subscription graph: `name -> Channel` plus the reverse index
/// `peer -> channels touched`, used to tear a peer out of every set.
#[derive(Debug)]
pub struct ChannelRegistry {
    channels: HashMap<ChannelId, Channel>,
    by_name: HashMap<String, ChannelId>,
    peer_channels: HashMap<PeerId, HashSet<ChannelId>>,
    next_id: ChannelId,
}

impl ChannelRegistry {
    /// Fresh empty registry.
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
            by_name: HashMap::new(),
            peer_channels: HashMap::new(),
            next_id: 1,
        }
    }

    /// Number of live channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Look up a channel by id.
    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(&id)
    }

    /// Look up a channel by name.
    pub fn channel_by_name(&self, name: &str) -> Option<&Channel> {
        self.by_name.get(name).and_then(|id| self.channels.get(id))
    }

    /// Iterate live channels (order unspecified).
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    /// Register `peer` in `role` on the channel named `name`, creating the
    /// channel (and fixing its tag) if absent.
    ///
    /// Returns the channel id and the presence notifications owed to
    /// watchers. Re-registering an existing membership is idempotent and
    /// emits no events.
    pub fn register(
        &mut self,
        peer: PeerId,
        name: &str,
        type_tag: &str,
        role: PresenceRole,
    ) -> Result<(ChannelId, Vec<PresenceEvent>), RegistryError> {
        let id = match self.by_name.get(name) {
            Some(&id) => id,
            None => {
                let id = self.next_id;
                self.next_id += 1;
                self.channels
                    .insert(id, Channel::new(id, name.to_string(), type_tag.to_string()));
                self.by_name.insert(name.to_string(), id);
                id
            }
        };

        let channel = self
            .channels
            .get_mut(&id)
            .ok_or(RegistryError::UnknownChannel(id))?;

        if channel.type_tag != type_tag {
            return Err(RegistryError::TagMismatch {
                channel: name.to_string(),
                expected: channel.type_tag.clone(),
                offered: type_tag.to_string(),
            });
        }

        let members = channel.set_for(role);
        let newly_joined = if members.contains(&peer) {
            false
        } else {
            members.push(peer);
            true
        };

        self.peer_channels.entry(peer).or_default().insert(id);

        let events = if newly_joined {
            channel
                .watchers
                .iter()
                .filter(|&&w| w != peer)
                .map(|&watcher| PresenceEvent {
                    watcher,
                    channel_id: id,
                    peer,
                    role,
                    joined: true,
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok((id, events))
    }

    /// Remove `peer` from `role` on channel `id`. Idempotent: unknown ids
    /// and absent memberships are no-ops. Garbage-collects the channel if
    /// it ends up unused.
    pub fn unregister(
        &mut self,
        peer: PeerId,
        id: ChannelId,
        role: PresenceRole,
    ) -> Vec<PresenceEvent> {
        let Some(channel) = self.channels.get_mut(&id) else {
            return Vec::new();
        };

        let members = channel.set_for(role);
        let had = members.contains(&peer);
        members.retain(|&p| p != peer);

        let events = if had {
            channel
                .watchers
                .iter()
                .filter(|&&w| w != peer)
                .map(|&watcher| PresenceEvent {
                    watcher,
                    channel_id: id,
                    peer,
                    role,
                    joined: false,
                })
                .collect()
        } else {
            Vec::new()
        };

        self.release_if_detached(peer, id);
        self.collect_if_unused(id);
        events
    }

    /// Add `peer` to the channel's watcher set.
    pub fn watch(&mut self, peer: PeerId, id: ChannelId) -> Result<(), RegistryError> {
        let channel = self
            .channels
            .get_mut(&id)
            .ok_or(RegistryError::UnknownChannel(id))?;
        if !channel.watchers.contains(&peer) {
            channel.watchers.push(peer);
        }
        self.peer_channels.entry(peer).or_default().insert(id);
        Ok(())
    }

    /// Remove `peer` from the channel's watcher set. Idempotent.
    pub fn unwatch(&mut self, peer: PeerId, id: ChannelId) {
        let Some(channel) = self.channels.get_mut(&id) else {
            return;
        };
        channel.watchers.retain(|&p| p != peer);
        self.release_if_detached(peer, id);
        self.collect_if_unused(id);
    }

    /// Tear `peer` out of every set across every channel, emitting leave
    /// notifications for each publisher/subscriber role it held.
    pub fn forget_peer(&mut self, peer: PeerId) -> Vec<PresenceEvent> {
        let Some(ids) = self.peer_channels.remove(&peer) else {
            return Vec::new();
        };

        // Sorted for a deterministic notification order across channels.
        let mut ids: Vec<ChannelId> = ids.into_iter().collect();
        ids.sort_unstable();

        let mut events = Vec::new();
        for id in ids {
            let Some(channel) = self.channels.get_mut(&id) else {
                continue;
            };

            // The departing peer no longer observes anything.
            channel.watchers.retain(|&p| p != peer);

            for role in [PresenceRole::Publisher, PresenceRole::Subscriber] {
                let members = channel.set_for(role);
                if members.contains(&peer) {
                    members.retain(|&p| p != peer);
                    events.extend(channel.watchers.iter().map(|&watcher| PresenceEvent {
                        watcher,
                        channel_id: id,
                        peer,
                        role,
                        joined: false,
                    }));
                }
            }

            self.collect_if_unused(id);
        }
        events
    }

    /// Account one inbound DATA frame and return the subscriber fan-out
    /// list in subscription order.
    ///
    /// Fails `UnknownChannel` for dead ids and `NotPublisher` when the
    /// sender never registered as publisher; both leave the counters
    /// untouched.
    pub fn deliver(
        &mut self,
        sender: PeerId,
        id: ChannelId,
        frame_bytes: u64,
    ) -> Result<Vec<PeerId>, RegistryError> {
        let channel = self
            .channels
            .get_mut(&id)
            .ok_or(RegistryError::UnknownChannel(id))?;

        if !channel.publishers.contains(&sender) {
            return Err(RegistryError::NotPublisher {
                peer: sender,
                channel_id: id,
            });
        }

        channel.stats.frames_in += 1;
        channel.stats.bytes_in += frame_bytes;
        Ok(channel.subscribers.clone())
    }

    /// Count one frame dropped on the way to a slow subscriber.
    pub fn record_drop(&mut self, id: ChannelId) {
        if let Some(channel) = self.channels.get_mut(&id) {
            channel.stats.frames_dropped += 1;
        }
    }

    fn release_if_detached(&mut self, peer: PeerId, id: ChannelId) {
        let detached = self
            .channels
            .get(&id)
            .map(|c| !c.touches(peer))
            .unwrap_or(true);
        if detached {
            if let Some(ids) = self.peer_channels.get_mut(&peer) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.peer_channels.remove(&peer);
                }
            }
        }
    }

    fn collect_if_unused(&mut self, id: ChannelId) {
        let unused = self
            .channels
            .get(&id)
            .map(Channel::is_unused)
            .unwrap_or(false);
        if unused {
            if let Some(channel) = self.channels.remove(&id) {
                self.by_name.remove(&channel.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAG: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_register_creates_channel() {
        let mut reg = ChannelRegistry::new();
        let (id, events) = reg
            .register(1, "topic", TAG, PresenceRole::Publisher)
            .unwrap();
        assert_eq!(id, 1);
        assert!(events.is_empty());
        let channel = reg.channel(id).unwrap();
        assert_eq!(channel.name(), "topic");
        assert_eq!(channel.type_tag(), TAG);
        assert_eq!(channel.publishers(), &[1]);
    }

    #[test]
    fn test_channel_ids_monotonic() {
        let mut reg = ChannelRegistry::new();
        let (a, _) = reg.register(1, "a", TAG, PresenceRole::Publisher).unwrap();
        let (b, _) = reg.register(1, "b", TAG, PresenceRole::Publisher).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_tag_is_immutable() {
        let mut reg = ChannelRegistry::new();
        reg.register(1, "topic", TAG, PresenceRole::Publisher)
            .unwrap();
        let other_tag = "f".repeat(32);
        let err = reg
            .register(2, "topic", &other_tag, PresenceRole::Subscriber)
            .unwrap_err();
        assert!(matches!(err, RegistryError::TagMismatch { .. }));
        // The failed join must not have been recorded.
        assert!(reg.channel_by_name("topic").unwrap().subscribers().is_empty());
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut reg = ChannelRegistry::new();
        let (id1, _) = reg.register(1, "topic", TAG, PresenceRole::Publisher).unwrap();
        let (id2, _) = reg.register(1, "topic", TAG, PresenceRole::Publisher).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(reg.channel(id1).unwrap().publishers(), &[1]);
    }

    #[test]
    fn test_gc_when_all_sets_empty() {
        let mut reg = ChannelRegistry::new();
        let (id, _) = reg.register(1, "topic", TAG, PresenceRole::Subscriber).unwrap();
        reg.unregister(1, id, PresenceRole::Subscriber);
        assert_eq!(reg.channel_count(), 0);
        assert!(reg.channel_by_name("topic").is_none());
    }

    #[test]
    fn test_watcher_keeps_channel_alive() {
        let mut reg = ChannelRegistry::new();
        let (id, _) = reg.register(1, "topic", TAG, PresenceRole::Subscriber).unwrap();
        reg.watch(2, id).unwrap();
        reg.unregister(1, id, PresenceRole::Subscriber);
        assert_eq!(reg.channel_count(), 1);
        reg.unwatch(2, id);
        assert_eq!(reg.channel_count(), 0);
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let mut reg = ChannelRegistry::new();
        assert!(reg.unregister(1, 99, PresenceRole::Publisher).is_empty());
        reg.unwatch(1, 99);
    }

    #[test]
    fn test_presence_events_on_join_and_leave() {
        let mut reg = ChannelRegistry::new();
        let (id, _) = reg.register(1, "topic", TAG, PresenceRole::Subscriber).unwrap();
        reg.watch(9, id).unwrap();

        let (_, joins) = reg.register(2, "topic", TAG, PresenceRole::Publisher).unwrap();
        assert_eq!(
            joins,
            vec![PresenceEvent {
                watcher: 9,
                channel_id: id,
                peer: 2,
                role: PresenceRole::Publisher,
                joined: true,
            }]
        );

        let leaves = reg.unregister(2, id, PresenceRole::Publisher);
        assert_eq!(leaves.len(), 1);
        assert!(!leaves[0].joined);
        assert_eq!(leaves[0].watcher, 9);
    }

    #[test]
    fn test_no_events_for_rejoin() {
        let mut reg = ChannelRegistry::new();
        let (id, _) = reg.register(1, "topic", TAG, PresenceRole::Publisher).unwrap();
        reg.watch(9, id).unwrap();
        let (_, events) = reg.register(1, "topic", TAG, PresenceRole::Publisher).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_forget_peer_clears_everything() {
        let mut reg = ChannelRegistry::new();
        let (a, _) = reg.register(1, "a", TAG, PresenceRole::Publisher).unwrap();
        let (b, _) = reg.register(1, "b", TAG, PresenceRole::Subscriber).unwrap();
        reg.register(2, "b", TAG, PresenceRole::Subscriber).unwrap();
        reg.watch(9, a).unwrap();

        let events = reg.forget_peer(1);
        // Channel "a" loses its only member and is collected; channel "b"
        // survives through peer 2.
        assert_eq!(
            events,
            vec![PresenceEvent {
                watcher: 9,
                channel_id: a,
                peer: 1,
                role: PresenceRole::Publisher,
                joined: false,
            }]
        );
        assert!(reg.channel(b).is_some());
        assert_eq!(reg.channel_count(), 2); // "a" kept alive by watcher 9
        reg.forget_peer(9);
        assert_eq!(reg.channel_count(), 1);
    }

    #[test]
    fn test_deliver_orders_and_counts() {
        let mut reg = ChannelRegistry::new();
        let (id, _) = reg.register(1, "topic", TAG, PresenceRole::Publisher).unwrap();
        reg.register(3, "topic", TAG, PresenceRole::Subscriber).unwrap();
        reg.register(2, "topic", TAG, PresenceRole::Subscriber).unwrap();

        let subs = reg.deliver(1, id, 100).unwrap();
        assert_eq!(subs, vec![3, 2]); // subscription order, not id order

        let stats = reg.channel(id).unwrap().stats();
        assert_eq!(stats.frames_in, 1);
        assert_eq!(stats.bytes_in, 100);
    }

    #[test]
    fn test_deliver_rejects_non_publisher() {
        let mut reg = ChannelRegistry::new();
        let (id, _) = reg.register(1, "topic", TAG, PresenceRole::Publisher).unwrap();
        assert_eq!(
            reg.deliver(2, id, 10),
            Err(RegistryError::NotPublisher {
                peer: 2,
                channel_id: id
            })
        );
        assert_eq!(reg.channel(id).unwrap().stats().frames_in, 0);
    }

    #[test]
    fn test_deliver_unknown_channel() {
        let mut reg = ChannelRegistry::new();
        assert_eq!(reg.deliver(1, 5, 10), Err(RegistryError::UnknownChannel(5)));
    }

    #[test]
    fn test_record_drop() {
        let mut reg = ChannelRegistry::new();
        let (id, _) = reg.register(1, "topic", TAG, PresenceRole::Publisher).unwrap();
        reg.record_drop(id);
        reg.record_drop(id);
        assert_eq!(reg.channel(id).unwrap().stats().frames_dropped, 2);
    }

    #[test]
    fn test_watch_unknown_channel_fails() {
        let mut reg = ChannelRegistry::new();
        assert_eq!(reg.watch(1, 42), Err(RegistryError::UnknownChannel(42)));
    }
}
