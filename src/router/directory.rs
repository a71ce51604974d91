//! Channel directory.
//!
//! The router's authoritative map of channels and their membership. The
//! directory exclusively owns [`Channel`] records; connections are known
//! to it only by [`ConnId`], and connections in turn hold only channel
//! numbers, which keeps ownership acyclic and garbage collection local.
//!
//! All operations are synchronous and run on the loop thread; no locks.

use std::collections::{HashMap, HashSet};
use std::time::SystemTime;

use crate::error::{Result, RoutioError};

/// Identifies a connection within the router process.
pub type ConnId = u64;

/// Role a declaration takes on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Declared via publish intent.
    Publisher,
    /// Declared via subscription.
    Subscriber,
}

/// Per-subscription options recorded at subscribe time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Deliver the client's own publishes back to it.
    pub loopback: bool,
    /// Oldest-first drops instead of disconnection under backpressure.
    pub lossy: bool,
}

/// A named, typed channel.
#[derive(Debug)]
pub struct Channel {
    /// Globally assigned channel number.
    pub number: u32,
    /// The alias the channel was first declared under.
    pub alias: String,
    /// Type identifier fixed at first declaration.
    pub type_id: String,
    /// Connections with publish intent.
    pub publishers: HashSet<ConnId>,
    /// Subscribed connections with their options.
    pub subscribers: HashMap<ConnId, SubscribeOptions>,
    /// When the channel was created.
    pub created_at: SystemTime,
}

impl Channel {
    fn new(number: u32, alias: String, type_id: String) -> Self {
        Self {
            number,
            alias,
            type_id,
            publishers: HashSet::new(),
            subscribers: HashMap::new(),
            created_at: SystemTime::now(),
        }
    }

    fn is_empty(&self) -> bool {
        self.publishers.is_empty() && self.subscribers.is_empty()
    }
}

/// In-memory map of channels, plus per-connection alias tables.
pub struct Directory {
    channels: HashMap<u32, Channel>,
    by_alias: HashMap<String, u32>,
    aliases: HashMap<ConnId, HashMap<String, u32>>,
    next_channel: u32,
}

impl Directory {
    /// Create an empty directory. Channel numbers start at 1; 0 is the
    /// control channel.
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
            by_alias: HashMap::new(),
            aliases: HashMap::new(),
            next_channel: 1,
        }
    }

    /// Find or create the channel for `alias` and record `conn` in the
    /// given role.
    ///
    /// The first declaration fixes the channel's type identifier; later
    /// declarations with a different identifier fail with `TypeMismatch`.
    /// Idempotent for a repeated (conn, alias, role, type_id).
    pub fn declare(
        &mut self,
        conn: ConnId,
        alias: &str,
        type_id: &str,
        role: Role,
        options: SubscribeOptions,
    ) -> Result<u32> {
        let number = match self.by_alias.get(alias) {
            Some(&number) => {
                let channel = self.channels.get(&number).expect("alias points at channel");
                if channel.type_id != type_id {
                    return Err(RoutioError::TypeMismatch {
                        alias: alias.to_string(),
                        declared: channel.type_id.clone(),
                        offered: type_id.to_string(),
                    });
                }
                number
            }
            None => {
                let number = self.next_channel;
                self.next_channel += 1;
                self.channels.insert(
                    number,
                    Channel::new(number, alias.to_string(), type_id.to_string()),
                );
                self.by_alias.insert(alias.to_string(), number);
                tracing::debug!(alias, number, type_id, "channel created");
                number
            }
        };

        let channel = self.channels.get_mut(&number).expect("just resolved");
        match role {
            Role::Publisher => {
                channel.publishers.insert(conn);
            }
            Role::Subscriber => {
                channel.subscribers.insert(conn, options);
            }
        }
        self.aliases
            .entry(conn)
            .or_default()
            .insert(alias.to_string(), number);

        Ok(number)
    }

    /// Remove `conn` from a channel's subscriber set; collects the
    /// channel if that left it empty.
    pub fn unsubscribe(&mut self, conn: ConnId, number: u32) {
        if let Some(channel) = self.channels.get_mut(&number) {
            channel.subscribers.remove(&conn);
            if channel.is_empty() {
                self.collect(number);
            }
        }
    }

    /// Resolve an alias to (channel number, type identifier).
    pub fn lookup(&self, alias: &str) -> Option<(u32, &str)> {
        let number = *self.by_alias.get(alias)?;
        let channel = self.channels.get(&number)?;
        Some((number, channel.type_id.as_str()))
    }

    /// Resolve a channel number a connection's alias table maps to.
    pub fn resolve_alias(&self, conn: ConnId, alias: &str) -> Option<u32> {
        self.aliases.get(&conn)?.get(alias).copied()
    }

    /// Access a channel record.
    pub fn channel(&self, number: u32) -> Option<&Channel> {
        self.channels.get(&number)
    }

    /// Subscribers of a channel, with options, excluding none.
    ///
    /// Returns an error if the channel is unknown.
    pub fn subscribers(&self, number: u32) -> Result<impl Iterator<Item = (ConnId, SubscribeOptions)> + '_> {
        let channel = self
            .channels
            .get(&number)
            .ok_or(RoutioError::UnknownChannel(number))?;
        Ok(channel.subscribers.iter().map(|(&id, &opts)| (id, opts)))
    }

    /// Remove a connection from every channel's publisher and subscriber
    /// sets, drop its alias table, and collect channels left empty.
    ///
    /// Returns the numbers of collected channels.
    pub fn drop_connection(&mut self, conn: ConnId) -> Vec<u32> {
        self.aliases.remove(&conn);

        let mut emptied = Vec::new();
        for (&number, channel) in self.channels.iter_mut() {
            channel.publishers.remove(&conn);
            channel.subscribers.remove(&conn);
            if channel.is_empty() {
                emptied.push(number);
            }
        }
        for number in &emptied {
            self.collect(*number);
        }
        emptied
    }

    /// Number of live channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn collect(&mut self, number: u32) {
        if let Some(channel) = self.channels.remove(&number) {
            self.by_alias.remove(&channel.alias);
            tracing::debug!(alias = %channel.alias, number, "channel collected");
        }
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T_INT: &str = "type-int32";
    const T_STR: &str = "type-string";

    fn opts() -> SubscribeOptions {
        SubscribeOptions::default()
    }

    #[test]
    fn test_declare_creates_channel() {
        let mut dir = Directory::new();
        let number = dir.declare(1, "tick", T_INT, Role::Publisher, opts()).unwrap();

        assert_eq!(number, 1);
        assert_eq!(dir.lookup("tick"), Some((1, T_INT)));
        assert!(dir.channel(number).unwrap().publishers.contains(&1));
    }

    #[test]
    fn test_same_alias_merges_onto_one_channel() {
        let mut dir = Directory::new();
        let a = dir.declare(1, "tick", T_INT, Role::Publisher, opts()).unwrap();
        let b = dir.declare(2, "tick", T_INT, Role::Subscriber, opts()).unwrap();

        assert_eq!(a, b);
        let channel = dir.channel(a).unwrap();
        assert!(channel.publishers.contains(&1));
        assert!(channel.subscribers.contains_key(&2));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut dir = Directory::new();
        dir.declare(1, "tick", T_INT, Role::Publisher, opts()).unwrap();

        let result = dir.declare(2, "tick", T_STR, Role::Subscriber, opts());
        assert!(matches!(result, Err(RoutioError::TypeMismatch { .. })));

        // First declaration wins; channel unchanged.
        assert_eq!(dir.lookup("tick"), Some((1, T_INT)));
        assert!(!dir.channel(1).unwrap().subscribers.contains_key(&2));
    }

    #[test]
    fn test_declare_is_idempotent() {
        let mut dir = Directory::new();
        let a = dir.declare(1, "tick", T_INT, Role::Subscriber, opts()).unwrap();
        let b = dir.declare(1, "tick", T_INT, Role::Subscriber, opts()).unwrap();

        assert_eq!(a, b);
        assert_eq!(dir.channel(a).unwrap().subscribers.len(), 1);
    }

    #[test]
    fn test_channel_numbers_unique_and_monotonic() {
        let mut dir = Directory::new();
        let a = dir.declare(1, "a", T_INT, Role::Publisher, opts()).unwrap();
        let b = dir.declare(1, "b", T_INT, Role::Publisher, opts()).unwrap();
        let c = dir.declare(1, "c", T_INT, Role::Publisher, opts()).unwrap();

        assert!(a < b && b < c);
        assert_ne!(a, 0, "0 is reserved for control");
    }

    #[test]
    fn test_unsubscribe_collects_empty_channel() {
        let mut dir = Directory::new();
        let number = dir.declare(1, "tick", T_INT, Role::Subscriber, opts()).unwrap();

        dir.unsubscribe(1, number);
        assert_eq!(dir.lookup("tick"), None);
        assert_eq!(dir.channel_count(), 0);
    }

    #[test]
    fn test_unsubscribe_keeps_channel_with_publisher() {
        let mut dir = Directory::new();
        let number = dir.declare(1, "tick", T_INT, Role::Publisher, opts()).unwrap();
        dir.declare(2, "tick", T_INT, Role::Subscriber, opts()).unwrap();

        dir.unsubscribe(2, number);
        assert!(dir.lookup("tick").is_some());
    }

    #[test]
    fn test_drop_connection_scrubs_membership() {
        let mut dir = Directory::new();
        let tick = dir.declare(1, "tick", T_INT, Role::Publisher, opts()).unwrap();
        dir.declare(2, "tick", T_INT, Role::Subscriber, opts()).unwrap();
        let solo = dir.declare(1, "solo", T_STR, Role::Publisher, opts()).unwrap();

        let collected = dir.drop_connection(1);

        // "solo" had only connection 1, so it is gone.
        assert_eq!(collected, vec![solo]);
        assert_eq!(dir.lookup("solo"), None);

        // "tick" lives on with its remaining subscriber.
        let channel = dir.channel(tick).unwrap();
        assert!(channel.publishers.is_empty());
        assert!(channel.subscribers.contains_key(&2));

        // Connection 1's alias table is gone.
        assert_eq!(dir.resolve_alias(1, "tick"), None);
        assert_eq!(dir.resolve_alias(2, "tick"), Some(tick));
    }

    #[test]
    fn test_gc_makes_number_unresolvable() {
        let mut dir = Directory::new();
        let number = dir.declare(1, "tick", T_INT, Role::Publisher, opts()).unwrap();
        dir.declare(2, "tick", T_INT, Role::Subscriber, opts()).unwrap();

        dir.drop_connection(1);
        dir.drop_connection(2);

        assert!(dir.channel(number).is_none());
        assert!(dir.subscribers(number).is_err());
        assert_eq!(dir.lookup("tick"), None);
    }

    #[test]
    fn test_subscribers_unknown_channel() {
        let dir = Directory::new();
        assert!(matches!(
            dir.subscribers(42).map(|_| ()),
            Err(RoutioError::UnknownChannel(42))
        ));
    }

    #[test]
    fn test_subscribe_options_recorded() {
        let mut dir = Directory::new();
        let options = SubscribeOptions {
            loopback: true,
            lossy: true,
        };
        let number = dir.declare(1, "tick", T_INT, Role::Subscriber, options).unwrap();

        let (id, got) = dir.subscribers(number).unwrap().next().unwrap();
        assert_eq!(id, 1);
        assert_eq!(got, options);
    }

    #[test]
    fn test_alias_reuse_after_gc_gets_fresh_number() {
        let mut dir = Directory::new();
        let first = dir.declare(1, "tick", T_INT, Role::Subscriber, opts()).unwrap();
        dir.unsubscribe(1, first);

        let second = dir.declare(1, "tick", T_STR, Role::Subscriber, opts()).unwrap();
        // The old channel is gone, so redeclaring with a new type succeeds
        // and gets a fresh number.
        assert_ne!(first, second);
    }
}
