//! Consistent-Hash Ring
//!
//! Maps keys to peer identifiers. Each real peer is represented by a fixed
//! number of virtual nodes spread around a `u32` hash ring, which evens out
//! the key ranges between peers. Lookup walks clockwise to the first virtual
//! node at or past the key's hash, wrapping to the start of the ring.
//!
//! The virtual-node tag is `<decimal_i><peer_id>` hashed with CRC32-IEEE by
//! default. Every node in a cluster must agree on both, since they decide
//! routing.

use std::collections::HashMap;

/// Hash function over raw bytes.
pub type HashFn = Box<dyn Fn(&[u8]) -> u32 + Send + Sync>;

/// A consistent-hash ring over virtual nodes.
pub struct HashRing {
    replicas: usize,
    hash: HashFn,
    /// Sorted virtual-node hashes.
    keys: Vec<u32>,
    /// Virtual-node hash back to the real peer identifier.
    map: HashMap<u32, String>,
}

impl HashRing {
    /// Creates a ring placing `replicas` virtual nodes per peer. Passing
    /// `None` selects CRC32-IEEE.
    pub fn new(replicas: usize, hash: Option<HashFn>) -> Self {
        Self {
            replicas,
            hash: hash.unwrap_or_else(|| Box::new(crc32fast::hash)),
            keys: Vec::new(),
            map: HashMap::new(),
        }
    }

    /// Places `replicas` virtual nodes for each given peer.
    ///
    /// Not idempotent: adding a peer twice doubles its virtual nodes.
    pub fn add<S: AsRef<str>>(&mut self, peers: &[S]) {
        for peer in peers {
            let peer = peer.as_ref();
            for i in 0..self.replicas {
                let hash = (self.hash)(format!("{i}{peer}").as_bytes());
                self.keys.push(hash);
                self.map.insert(hash, peer.to_string());
            }
        }
        self.keys.sort_unstable();
    }

    /// Returns the peer owning `key`, or `None` on an empty ring.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }
        let hash = (self.hash)(key.as_bytes());
        // First virtual node clockwise from the key; wrap past the end.
        let idx = match self.keys.binary_search(&hash) {
            Ok(idx) => idx,
            Err(idx) => idx % self.keys.len(),
        };
        self.map.get(&self.keys[idx]).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ring with an identity-style hash: keys are decimal strings, hashed to
    /// their numeric value. Makes ownership assertions exact.
    fn decimal_ring() -> HashRing {
        let mut ring = HashRing::new(
            3,
            Some(Box::new(|data: &[u8]| {
                std::str::from_utf8(data).unwrap().parse::<u32>().unwrap()
            })),
        );
        // Virtual nodes: 2/12/22, 4/14/24, 6/16/26.
        ring.add(&["6", "4", "2"]);
        ring
    }

    #[test]
    fn test_empty_ring_returns_none() {
        let ring = HashRing::new(3, None);
        assert_eq!(ring.get("anything"), None);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_decimal_routing() {
        let ring = decimal_ring();

        let cases = [("2", "2"), ("11", "2"), ("23", "4"), ("25", "6")];
        for (key, want) in cases {
            assert_eq!(ring.get(key), Some(want), "key {key}");
        }
    }

    #[test]
    fn test_wraparound_past_largest_virtual_node() {
        let ring = decimal_ring();
        // 27 is beyond the largest virtual node (26), so the ring wraps to the
        // smallest one (2).
        assert_eq!(ring.get("27"), Some("2"));
    }

    #[test]
    fn test_add_extends_ownership() {
        let mut ring = decimal_ring();
        // 8/18/28 join; 27 now lands on the new peer instead of wrapping.
        ring.add(&["8"]);
        assert_eq!(ring.get("27"), Some("8"));
    }

    #[test]
    fn test_deterministic_for_fixed_add_order() {
        let build = || {
            let mut ring = HashRing::new(50, None);
            ring.add(&["peer-a", "peer-b", "peer-c"]);
            ring
        };
        let (a, b) = (build(), build());
        for i in 0..1000 {
            let key = format!("key-{i}");
            assert_eq!(a.get(&key), b.get(&key));
        }
    }

    #[test]
    fn test_distribution_roughly_uniform() {
        let mut ring = HashRing::new(3, None);
        ring.add(&["A", "B", "C"]);

        let mut counts: HashMap<String, usize> = HashMap::new();
        let total = 10_000;
        for _ in 0..total {
            let key = rand::random::<u64>();
            let peer = ring.get(&format!("key-{key}")).unwrap();
            *counts.entry(peer.to_string()).or_insert(0) += 1;
        }

        assert_eq!(counts.len(), 3, "every peer should own some keys");
        let expected = total / 3;
        for (peer, count) in counts {
            let deviation = (count as f64 - expected as f64).abs() / expected as f64;
            assert!(
                deviation <= 0.25,
                "peer {peer} owns {count} keys, more than 25% off uniform"
            );
        }
    }

    #[test]
    fn test_readd_duplicates_virtual_nodes() {
        let mut ring = HashRing::new(4, None);
        ring.add(&["solo"]);
        ring.add(&["solo"]);
        // Still routes fine, just with duplicated virtual nodes.
        assert_eq!(ring.get("whatever"), Some("solo"));
    }
}
