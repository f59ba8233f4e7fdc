//! Command socket bookkeeping

use std::fmt;

use crate::{
    constants::MAX_SOCKETS,
    error::{Error, Result},
};

/// Camera command socket (buffer) number
///
/// A camera runs at most two commands at once, each on its own socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Socket(u8);

impl Socket {
    pub fn new(value: u8) -> Result<Self> {
        if (1..=MAX_SOCKETS as u8).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::InvalidSocket(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// All sockets in ascending order
    pub fn all() -> impl Iterator<Item = Socket> {
        (1..=MAX_SOCKETS as u8).map(Socket)
    }

    fn index(self) -> usize {
        self.0 as usize - 1
    }
}

impl fmt::Display for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket {}", self.0)
    }
}

/// Per-camera table of values bound to sockets
///
/// Never holds more than two entries, one per socket.
#[derive(Debug, Clone)]
pub struct SocketTable<T> {
    slots: [Option<T>; MAX_SOCKETS],
}

impl<T> Default for SocketTable<T> {
    fn default() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }
}

impl<T> SocketTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowest socket with nothing bound to it
    pub fn free_socket(&self) -> Option<Socket> {
        Socket::all().find(|s| self.slots[s.index()].is_none())
    }

    /// Bind `value` to `socket`, returning what was bound before
    pub fn insert(&mut self, socket: Socket, value: T) -> Option<T> {
        self.slots[socket.index()].replace(value)
    }

    pub fn get(&self, socket: Socket) -> Option<&T> {
        self.slots[socket.index()].as_ref()
    }

    pub fn get_mut(&mut self, socket: Socket) -> Option<&mut T> {
        self.slots[socket.index()].as_mut()
    }

    pub fn remove(&mut self, socket: Socket) -> Option<T> {
        self.slots[socket.index()].take()
    }

    /// Move the value on `from` to `to`
    ///
    /// Returns whatever `to` held before. Does nothing when `from` is empty.
    pub fn relocate(&mut self, from: Socket, to: Socket) -> Option<T> {
        if from == to {
            return None;
        }
        let value = self.remove(from)?;
        self.insert(to, value)
    }

    /// Socket holding the first value matching `pred`
    pub fn find(&self, mut pred: impl FnMut(&T) -> bool) -> Option<Socket> {
        Socket::all().find(|s| self.slots[s.index()].as_ref().is_some_and(&mut pred))
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == MAX_SOCKETS
    }

    pub fn iter(&self) -> impl Iterator<Item = (Socket, &T)> {
        Socket::all().filter_map(|s| self.slots[s.index()].as_ref().map(|v| (s, v)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Socket, &mut T)> {
        self.slots
            .iter_mut()
            .zip(Socket::all())
            .filter_map(|(slot, s)| slot.as_mut().map(|v| (s, v)))
    }

    /// Empty the table, yielding every bound value
    pub fn drain(&mut self) -> Vec<(Socket, T)> {
        Socket::all()
            .filter_map(|s| self.slots[s.index()].take().map(|v| (s, v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn socket(n: u8) -> Socket {
        Socket::new(n).unwrap()
    }

    #[test]
    fn test_socket_range() {
        assert!(Socket::new(0).is_err());
        assert!(Socket::new(3).is_err());
        assert_eq!(Socket::all().map(Socket::get).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_free_socket_lowest_first() {
        let mut table = SocketTable::new();
        assert_eq!(table.free_socket(), Some(socket(1)));

        table.insert(socket(1), "pan");
        assert_eq!(table.free_socket(), Some(socket(2)));

        table.insert(socket(2), "zoom");
        assert!(table.is_full());
        assert_eq!(table.free_socket(), None);

        assert_eq!(table.remove(socket(1)), Some("pan"));
        assert_eq!(table.free_socket(), Some(socket(1)));
    }

    #[test]
    fn test_relocate() {
        let mut table = SocketTable::new();
        table.insert(socket(1), 10);
        table.insert(socket(2), 20);

        assert_eq!(table.relocate(socket(1), socket(2)), Some(20));
        assert_eq!(table.get(socket(2)), Some(&10));
        assert_eq!(table.len(), 1);

        assert_eq!(table.relocate(socket(1), socket(2)), None);
        assert_eq!(table.get(socket(2)), Some(&10));
    }

    #[test]
    fn test_find_and_drain() {
        let mut table = SocketTable::new();
        table.insert(socket(2), 7);
        assert_eq!(table.find(|v| *v == 7), Some(socket(2)));
        assert_eq!(table.find(|v| *v == 8), None);

        assert_eq!(table.drain(), vec![(socket(2), 7)]);
        assert!(table.is_empty());
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_socket_count(ops in proptest::collection::vec((any::<bool>(), 1u8..=2), 0..64)) {
            let mut table = SocketTable::new();
            for (i, (insert, n)) in ops.into_iter().enumerate() {
                if insert {
                    if let Some(free) = table.free_socket() {
                        table.insert(free, i);
                    }
                } else {
                    table.remove(socket(n));
                }
                prop_assert!(table.len() <= MAX_SOCKETS);
                prop_assert_eq!(table.free_socket().is_none(), table.is_full());
            }
        }
    }
}
