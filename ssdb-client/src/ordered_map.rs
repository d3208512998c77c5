//! Insertion-ordered key/value results (hash and sorted-set scans, `multi_get`).
//!
//! Entries keep server order for iteration and positional access, and a side
//! index gives constant-time lookup by key.

use std::collections::HashMap;

use bytes::Bytes;

use crate::error::{ClientError, ClientResult};

/// Key/value pairs in the order the server returned them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedMap {
    entries: Vec<(Bytes, Bytes)>,
    index: HashMap<Bytes, usize>,
}

impl OrderedMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pairs up `key, value, key, value, ...` payload blocks.
    ///
    /// An odd number of blocks is an `UnexpectedResponse`.
    pub fn from_blocks(blocks: Vec<Bytes>) -> ClientResult<Self> {
        if blocks.len() % 2 != 0 {
            return Err(ClientError::UnexpectedResponse);
        }

        let mut map = OrderedMap {
            entries: Vec::with_capacity(blocks.len() / 2),
            index: HashMap::with_capacity(blocks.len() / 2),
        };
        let mut blocks = blocks.into_iter();
        while let (Some(key), Some(value)) = (blocks.next(), blocks.next()) {
            map.push(key, value);
        }
        Ok(map)
    }

    /// Appends a pair. Lookups keep resolving to the first occurrence of a key.
    pub fn push(&mut self, key: Bytes, value: Bytes) {
        let position = self.entries.len();
        self.index.entry(key.clone()).or_insert(position);
        self.entries.push((key, value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &[u8]) -> Option<&Bytes> {
        self.index.get(key).map(|&idx| &self.entries[idx].1)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }

    /// Pair at `idx` in server order.
    pub fn get_index(&self, idx: usize) -> Option<(&Bytes, &Bytes)> {
        self.entries.get(idx).map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Bytes> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Bytes> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &Bytes)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

impl IntoIterator for OrderedMap {
    type Item = (Bytes, Bytes);
    type IntoIter = std::vec::IntoIter<(Bytes, Bytes)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(items: &[&'static str]) -> Vec<Bytes> {
        items.iter().map(|s| Bytes::from(*s)).collect()
    }

    #[test]
    fn keeps_server_order_and_indexes_keys() {
        let map = OrderedMap::from_blocks(blocks(&["b", "2", "a", "1", "c", "3"])).unwrap();
        assert_eq!(map.len(), 3);
        let keys: Vec<&[u8]> = map.keys().map(|k| k.as_ref()).collect();
        assert_eq!(keys, vec![&b"b"[..], b"a", b"c"]);
        assert_eq!(map.get(b"a").map(|v| v.as_ref()), Some(&b"1"[..]));
        assert_eq!(map.get_index(2).map(|(k, _)| k.as_ref()), Some(&b"c"[..]));
        assert!(map.get(b"missing").is_none());
    }

    #[test]
    fn duplicate_keys_resolve_to_first() {
        let map = OrderedMap::from_blocks(blocks(&["k", "first", "k", "second"])).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(b"k").map(|v| v.as_ref()), Some(&b"first"[..]));
    }

    #[test]
    fn odd_block_count_is_rejected() {
        assert!(matches!(
            OrderedMap::from_blocks(blocks(&["k"])),
            Err(ClientError::UnexpectedResponse)
        ));
    }
}
