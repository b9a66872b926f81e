//! Peer cache — accumulates peers reported by DHT lookups.
//!
//! Keyed on hashed announce key. Because every announce key embeds its
//! timeslot bucket, stale entries fall out of lookups on their own once the
//! bucket is no longer among the keys being queried. Nothing is swept.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

/// Peers seen for one hashed key.
#[derive(Debug, Clone)]
pub struct CacheBucket {
    /// Last time a peer was recorded here.
    pub touched: Instant,
    /// `host:port` -> last time it was reported.
    pub peers: HashMap<String, Instant>,
}

/// Shared between the DHT event path and the discovery engine.
#[derive(Debug, Clone, Default)]
pub struct PeerCache {
    buckets: Arc<DashMap<String, CacheBucket>>,
}

impl PeerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `peer` under `hashed_key`. Idempotent per pair.
    pub fn record(&self, hashed_key: &str, peer: impl Into<String>) {
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(hashed_key.to_string())
            .or_insert_with(|| CacheBucket {
                touched: now,
                peers: HashMap::new(),
            });
        bucket.touched = now;
        bucket.peers.insert(peer.into(), now);
    }

    /// Peers recorded under `hashed_key`, ordered and de-duplicated.
    pub fn read(&self, hashed_key: &str) -> BTreeSet<String> {
        self.buckets
            .get(hashed_key)
            .map(|b| b.peers.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Total peer entries across all buckets.
    pub fn peer_count(&self) -> usize {
        self.buckets.iter().map(|b| b.peers.len()).sum()
    }
}
