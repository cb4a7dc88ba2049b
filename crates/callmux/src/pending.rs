//! Table of calls awaiting replies, keyed by sync id.

use std::collections::HashMap;

use crate::request::Request;

/// In-flight call registry owned by a connection.
///
/// Entries move through exactly one of two exits: a matched reply removes
/// them one at a time, or a close drains them all. The table never
/// publishes replies itself; it only hands the handle back to whoever
/// holds the exit.
#[derive(Debug, Default)]
pub(crate) struct PendingTable {
    entries: HashMap<u64, Request>,
}

impl PendingTable {
    pub fn new() -> Self {
        PendingTable { entries: HashMap::new() }
    }

    /// Registers a call under its sync id. Ids are unique for the life of
    /// a connection, so a collision is a bug upstream.
    pub fn insert(&mut self, id: u64, handle: Request) {
        let previous = self.entries.insert(id, handle);
        debug_assert!(previous.is_none(), "sync id {id} already pending");
    }

    /// Removes and returns the entry for `id`, if one is pending.
    pub fn remove_and_get(&mut self, id: u64) -> Option<Request> {
        self.entries.remove(&id)
    }

    /// Empties the table, passing every handle to `visit`. Used on close
    /// to cancel whatever is still in flight.
    pub fn drain_all(&mut self, mut visit: impl FnMut(Request)) {
        for (_, handle) in self.entries.drain() {
            visit(handle);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn handle(id: u64) -> Request {
        Request::new(id, Arc::from("test"))
    }

    #[test]
    fn remove_returns_the_inserted_handle() {
        let mut table = PendingTable::new();
        let request = handle(7);
        table.insert(7, request.clone());
        assert_eq!(table.len(), 1);

        let removed = table.remove_and_get(7).unwrap();
        assert_eq!(removed, request);
        assert!(table.is_empty());
    }

    #[test]
    fn unknown_id_removes_nothing() {
        let mut table = PendingTable::new();
        table.insert(1, handle(1));
        assert!(table.remove_and_get(2).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn drain_visits_every_entry_and_empties() {
        let mut table = PendingTable::new();
        for id in 1..=4 {
            table.insert(id, handle(id));
        }

        let mut seen: Vec<u64> = Vec::new();
        table.drain_all(|request| seen.push(request.id()));
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3, 4]);
        assert!(table.is_empty());
    }

    #[test]
    fn drain_on_empty_table_is_a_no_op() {
        let mut table = PendingTable::new();
        let mut visits = 0;
        table.drain_all(|_| visits += 1);
        assert_eq!(visits, 0);
    }
}
