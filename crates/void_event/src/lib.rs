//! # void_event - Synchronous Signals
//!
//! Single-threaded observer plumbing with:
//! - `SignalTable`: connections keyed by a signal key, each carrying a
//!   caller-defined payload that tells the dispatcher who to notify
//! - `EventQueue`: FIFO of pending events drained by the dispatcher
//!
//! There are no boxed callbacks. The owner of a `SignalTable` drains its
//! `EventQueue`, looks up the connections for each event's key and calls the
//! right handler itself. Handlers may connect or disconnect while an event is
//! being dispatched, so dispatchers iterate over [`SignalTable::listeners`]
//! (a snapshot) and skip connections that [`SignalTable::is_connected`]
//! reports as gone.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;

use void_core::{Handle, HandleMap};

/// Handle identifying one connection in a [`SignalTable`]
pub type ConnectionId<K, T> = Handle<Connection<K, T>>;

/// A registered connection
#[derive(Debug, Clone)]
pub struct Connection<K, T> {
    /// Signal the connection listens to
    pub key: K,
    /// Dispatcher payload
    pub payload: T,
}

/// Registry of connections grouped by signal key
pub struct SignalTable<K, T> {
    connections: HandleMap<Connection<K, T>>,
    by_key: HashMap<K, Vec<ConnectionId<K, T>>>,
}

impl<K, T> SignalTable<K, T>
where
    K: Clone + Eq + Hash,
    T: Clone,
{
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            connections: HandleMap::new(),
            by_key: HashMap::new(),
        }
    }

    /// Connect a payload to a signal
    pub fn connect(&mut self, key: K, payload: T) -> ConnectionId<K, T> {
        let id = self.connections.insert(Connection {
            key: key.clone(),
            payload,
        });
        self.by_key.entry(key).or_default().push(id);
        id
    }

    /// Disconnect; returns false if the connection was already gone
    pub fn disconnect(&mut self, id: ConnectionId<K, T>) -> bool {
        let Some(connection) = self.connections.remove(id) else {
            return false;
        };

        if let Some(ids) = self.by_key.get_mut(&connection.key) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_key.remove(&connection.key);
            }
        }
        true
    }

    /// Disconnect every connection whose payload matches
    pub fn disconnect_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> usize {
        let doomed: Vec<_> = self
            .connections
            .iter()
            .filter(|(_, c)| pred(&c.payload))
            .map(|(id, _)| id)
            .collect();

        for id in &doomed {
            self.disconnect(*id);
        }
        doomed.len()
    }

    /// Check if a connection is still live
    pub fn is_connected(&self, id: ConnectionId<K, T>) -> bool {
        self.connections.contains(id)
    }

    /// Snapshot of the connections for a key, in connection order
    pub fn listeners(&self, key: &K) -> Vec<(ConnectionId<K, T>, T)> {
        self.by_key
            .get(key)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.connections.get(*id).map(|c| (*id, c.payload.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of connections for a key
    pub fn connection_count(&self, key: &K) -> usize {
        self.by_key.get(key).map_or(0, Vec::len)
    }

    /// Number of connections whose payload matches
    pub fn count_where(&self, mut pred: impl FnMut(&K, &T) -> bool) -> usize {
        self.connections
            .iter()
            .filter(|(_, c)| pred(&c.key, &c.payload))
            .count()
    }

    /// Total number of live connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if there are no connections
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl<K, T> Default for SignalTable<K, T>
where
    K: Clone + Eq + Hash,
    T: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, T: fmt::Debug> fmt::Debug for SignalTable<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalTable")
            .field("connections", &self.connections.len())
            .field("keys", &self.by_key.len())
            .finish()
    }
}

/// FIFO queue of pending events
#[derive(Debug)]
pub struct EventQueue<E> {
    queue: VecDeque<E>,
}

impl<E> EventQueue<E> {
    /// Create a new queue
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Send an event
    pub fn send(&mut self, event: E) {
        self.queue.push_back(event);
    }

    /// Receive the oldest event
    pub fn receive(&mut self) -> Option<E> {
        self.queue.pop_front()
    }

    /// Drain all events
    pub fn drain(&mut self) -> Vec<E> {
        self.queue.drain(..).collect()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Get pending count
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Peek at pending events without consuming them
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.queue.iter()
    }
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Prelude
pub mod prelude {
    pub use crate::{Connection, ConnectionId, EventQueue, SignalTable};
}
