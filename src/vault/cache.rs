//! Bounded, TTL-limited cache of decrypted items.
//!
//! Entries expire `ttl` after they were last touched, independently of
//! capacity.  When an insert pushes the cache over `capacity`, the least
//! recently touched entries are evicted first.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use super::item::DecryptedItem;

struct CacheEntry {
    item: DecryptedItem,
    touched_at: Instant,
    /// Tie-breaker for entries touched at the same instant.
    seq: u64,
}

pub struct DecryptedCache {
    entries: HashMap<String, CacheEntry>,
    capacity: usize,
    ttl: Duration,
    next_seq: u64,
}

impl DecryptedCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            ttl,
            next_seq: 0,
        }
    }

    fn bump(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn is_live(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.duration_since(entry.touched_at) < self.ttl
    }

    /// Return a live entry and refresh its access time.
    pub fn get(&mut self, item_id: &str) -> Option<DecryptedItem> {
        let now = Instant::now();
        let live = self.entries.get(item_id).map(|e| self.is_live(e, now))?;
        if !live {
            self.entries.remove(item_id);
            return None;
        }

        let seq = self.bump();
        let entry = self.entries.get_mut(item_id)?;
        entry.touched_at = now;
        entry.seq = seq;
        Some(entry.item.clone())
    }

    pub fn insert(&mut self, item: DecryptedItem) {
        let seq = self.bump();
        self.entries.insert(
            item.item_id.clone(),
            CacheEntry {
                item,
                touched_at: Instant::now(),
                seq,
            },
        );
        self.purge_expired();
        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| (e.touched_at, e.seq))
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    self.entries.remove(&id);
                }
                None => break,
            }
        }
    }

    pub fn remove(&mut self, item_id: &str) -> Option<DecryptedItem> {
        self.entries.remove(item_id).map(|e| e.item)
    }

    /// Drop every entry past its TTL.
    pub fn purge_expired(&mut self) {
        let now = Instant::now();
        let ttl = self.ttl;
        self.entries
            .retain(|_, e| now.duration_since(e.touched_at) < ttl);
    }

    /// When the next entry falls due.  An empty cache reports one TTL from
    /// now, the soonest anything inserted later can expire.  `None` when
    /// the TTL is zero, since nothing then survives an insert.
    pub fn next_expiry(&self) -> Option<Instant> {
        if self.ttl.is_zero() {
            return None;
        }
        let earliest = self.entries.values().map(|e| e.touched_at + self.ttl).min();
        Some(earliest.unwrap_or_else(|| Instant::now() + self.ttl))
    }

    /// Live items, without refreshing their access time.
    pub fn live_items(&mut self) -> Vec<DecryptedItem> {
        self.purge_expired();
        self.entries.values().map(|e| e.item.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{encrypt, EncryptOptions};
    use crate::vault::item::{ItemFields, ItemType, VaultItem};
    use chrono::Utc;

    fn item(id: &str) -> DecryptedItem {
        let record = VaultItem {
            item_id: id.to_string(),
            item_type: ItemType::Login,
            encrypted_data: encrypt(&[0u8; 32], b"{}", EncryptOptions::default()).unwrap(),
            folder_id: None,
            tags: Vec::new(),
            domain_hash: None,
            favorite: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        DecryptedItem::from_parts(&record, ItemFields::named(id))
    }

    #[tokio::test(start_paused = true)]
    async fn never_grows_past_capacity() {
        let mut cache = DecryptedCache::new(3, Duration::from_secs(300));
        for i in 0..10 {
            cache.insert(item(&format!("i{i}")));
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.len(), 3);
        assert!(cache.get("i9").is_some());
        assert!(cache.get("i0").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn evicts_least_recently_touched_first() {
        let mut cache = DecryptedCache::new(2, Duration::from_secs(300));
        cache.insert(item("a"));
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert(item("b"));
        tokio::time::advance(Duration::from_secs(1)).await;

        // Touching "a" makes "b" the oldest.
        assert!(cache.get("a").is_some());
        cache.insert(item("c"));

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn ties_break_by_insertion_order() {
        let mut cache = DecryptedCache::new(2, Duration::from_secs(300));
        cache.insert(item("first"));
        cache.insert(item("second"));
        cache.insert(item("third"));
        assert!(cache.get("first").is_none());
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_below_capacity() {
        let mut cache = DecryptedCache::new(10, Duration::from_secs(60));
        cache.insert(item("x"));
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("x").is_some());

        // The get above refreshed the entry.
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("x").is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get("x").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn live_items_skips_expired() {
        let mut cache = DecryptedCache::new(10, Duration::from_secs(60));
        cache.insert(item("old"));
        tokio::time::advance(Duration::from_secs(61)).await;
        cache.insert(item("new"));
        let live = cache.live_items();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].item_id, "new");
    }

    #[tokio::test(start_paused = true)]
    async fn next_expiry_tracks_the_oldest_entry() {
        let ttl = Duration::from_secs(60);
        let mut cache = DecryptedCache::new(10, ttl);
        let start = Instant::now();
        assert_eq!(cache.next_expiry(), Some(start + ttl));

        cache.insert(item("a"));
        tokio::time::advance(Duration::from_secs(10)).await;
        cache.insert(item("b"));
        assert_eq!(cache.next_expiry(), Some(start + ttl));

        cache.remove("a");
        assert_eq!(cache.next_expiry(), Some(start + Duration::from_secs(10) + ttl));
        assert_eq!(DecryptedCache::new(10, Duration::ZERO).next_expiry(), None);
    }
}
