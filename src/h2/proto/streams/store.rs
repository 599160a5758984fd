//! Storage for the live stream table (spec.md §3 "streams: map<id ->
//! stream>").
//!
//! Grounded in the teacher's `proto/streams/store.rs`: a slab holding
//! the `Stream` values plus a hash index from `StreamId` to slab key,
//! generalized to use `fnv::FnvHashMap` (small-key hashing, same
//! rationale the teacher's sibling examples use `fnv`/`indexmap` for
//! stream/connection tables) instead of `std::collections::HashMap`.

use fnv::FnvHashMap;
use slab::Slab;

use crate::h2::frame::StreamId;

use super::stream::Stream;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Key(usize);

#[derive(Debug, Default)]
pub struct Store {
    slab: Slab<Stream>,
    ids: FnvHashMap<StreamId, Key>,
}

impl Store {
    pub fn new() -> Store {
        Store { slab: Slab::new(), ids: FnvHashMap::default() }
    }

    pub fn len(&self) -> usize {
        self.slab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slab.is_empty()
    }

    pub fn insert(&mut self, id: StreamId, stream: Stream) -> Key {
        let idx = self.slab.insert(stream);
        let key = Key(idx);
        self.ids.insert(id, key);
        key
    }

    pub fn get(&self, key: Key) -> &Stream {
        &self.slab[key.0]
    }

    pub fn get_mut(&mut self, key: Key) -> &mut Stream {
        &mut self.slab[key.0]
    }

    pub fn find_key(&self, id: StreamId) -> Option<Key> {
        self.ids.get(&id).copied()
    }

    pub fn find_mut(&mut self, id: StreamId) -> Option<&mut Stream> {
        let key = *self.ids.get(&id)?;
        Some(&mut self.slab[key.0])
    }

    pub fn remove(&mut self, id: StreamId) {
        if let Some(key) = self.ids.remove(&id) {
            self.slab.remove(key.0);
        }
    }

    pub fn for_each_mut<F: FnMut(&mut Stream)>(&mut self, mut f: F) {
        for stream in self.slab.iter_mut() {
            f(stream.1);
        }
    }

    /// Removes every stream in `CLOSED` state, per spec.md §3 "after
    /// CLOSED the stream may be removed".
    pub fn evict_closed(&mut self) {
        let closed: Vec<StreamId> = self
            .slab
            .iter()
            .filter(|(_, s)| s.is_closed())
            .map(|(_, s)| s.id)
            .collect();
        for id in closed {
            self.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h2::proto::streams::stream::Stream;

    #[test]
    fn insert_find_remove() {
        let mut store = Store::new();
        let id = StreamId::new(1);
        store.insert(id, Stream::new(id, 0, 0));
        assert!(store.find_mut(id).is_some());
        store.remove(id);
        assert!(store.find_mut(id).is_none());
    }
}
