//! Replay cache for game actions keyed by `(playerId, actionId)`.
//!
//! A key is reserved as pending before the engine runs and the exact reply is
//! stored once the action resolves, so every retry replays it. The server
//! holds the room lock from `begin` to `complete`, so a request there never
//! observes `Pending`; it only shows up for a caller that completes a key
//! outside that lock.

use std::collections::{BTreeMap, HashMap};

use hexlands_core::PlayerId;

use crate::protocol::Reply;

pub const CAPACITY: usize = 220;

#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// First sighting; the key is now reserved
    Fresh,
    Pending,
    Done(Reply),
}

#[derive(Debug, Clone)]
enum Slot {
    Pending,
    Done(Reply),
}

#[derive(Debug, Clone)]
struct Entry {
    slot: Slot,
    stamp: u64,
}

/// Bounded LRU of action replies
#[derive(Debug, Clone)]
pub struct IdempotencyCache {
    capacity: usize,
    entries: HashMap<String, Entry>,
    /// stamp -> key, oldest first
    order: BTreeMap<u64, String>,
    clock: u64,
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::with_capacity(CAPACITY)
    }
}

fn cache_key(player: PlayerId, action_id: &str) -> String {
    format!("{player}:{action_id}")
}

impl IdempotencyCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: BTreeMap::new(),
            clock: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look a key up, touching it; an unseen key is reserved as pending.
    pub fn begin(&mut self, player: PlayerId, action_id: &str) -> Lookup {
        let key = cache_key(player, action_id);
        let stamp = self.tick();
        match self.entries.get_mut(&key) {
            Some(entry) => {
                self.order.remove(&entry.stamp);
                entry.stamp = stamp;
                self.order.insert(stamp, key);
                match &entry.slot {
                    Slot::Pending => Lookup::Pending,
                    Slot::Done(reply) => Lookup::Done(reply.clone()),
                }
            }
            None => {
                self.entries.insert(
                    key.clone(),
                    Entry {
                        slot: Slot::Pending,
                        stamp,
                    },
                );
                self.order.insert(stamp, key);
                self.evict();
                Lookup::Fresh
            }
        }
    }

    /// Store the final reply for a reserved key.
    pub fn complete(&mut self, player: PlayerId, action_id: &str, reply: Reply) {
        let key = cache_key(player, action_id);
        let stamp = self.tick();
        if let Some(old) = self.entries.insert(
            key.clone(),
            Entry {
                slot: Slot::Done(reply),
                stamp,
            },
        ) {
            self.order.remove(&old.stamp);
        }
        self.order.insert(stamp, key);
        self.evict();
    }

    /// Drop every entry belonging to a player.
    pub fn forget_player(&mut self, player: PlayerId) {
        let prefix = format!("{player}:");
        let order = &mut self.order;
        self.entries.retain(|key, entry| {
            let keep = !key.starts_with(&prefix);
            if !keep {
                order.remove(&entry.stamp);
            }
            keep
        });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn evict(&mut self) {
        while self.entries.len() > self.capacity {
            let Some((_, key)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&key);
        }
    }
}

/// Client action ids are short opaque tokens
pub fn is_valid_action_id(id: &str) -> bool {
    (1..=120).contains(&id.len())
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}
