//! Longest-suffix domain trie fronted by a bounded match cache.
//!
//! Domains are inserted reversed-by-label ("www.example.com" walks
//! com -> example -> www) so that searching a query name for the
//! deepest terminal along its own reversed-label path yields the
//! longest matching suffix.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

const MATCH_CACHE_TTL: Duration = Duration::from_secs(30);
const MATCH_CACHE_CAPACITY: usize = 10_000;

fn labels_reversed(domain: &str) -> Vec<&str> {
    let mut labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();
    labels.reverse();
    labels
}

struct TrieNode {
    children: HashMap<String, TrieNode>,
    group_id: Option<u32>,
}

impl TrieNode {
    fn new() -> Self {
        Self {
            children: HashMap::new(),
            group_id: None,
        }
    }
}

/// Reverse-label suffix trie mapping domain labels to forward-group ids.
pub struct DomainTrie {
    root: RwLock<TrieNode>,
}

impl DomainTrie {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(TrieNode::new()),
        }
    }

    pub fn insert(&self, domain: &str, group_id: u32) {
        let labels = labels_reversed(domain);
        let mut root = self.root.write().unwrap();
        let mut node = &mut *root;
        for label in labels {
            node = node
                .children
                .entry(label.to_ascii_lowercase())
                .or_insert_with(TrieNode::new);
        }
        node.group_id = Some(group_id);
    }

    /// Deletes a domain's terminal marker and prunes now-empty subtrees.
    pub fn delete(&self, domain: &str) {
        let labels: Vec<String> = labels_reversed(domain)
            .into_iter()
            .map(|l| l.to_ascii_lowercase())
            .collect();
        let mut root = self.root.write().unwrap();
        delete_recursive(&mut root, &labels);
    }

    /// Returns the group id of the deepest terminal node whose label path
    /// is a suffix of `qname`'s reversed labels.
    pub fn search(&self, qname: &str) -> Option<(u32, String)> {
        let labels = labels_reversed(qname);
        let root = self.root.read().unwrap();
        let mut node = &*root;
        let mut best: Option<(u32, usize)> = None;

        if let Some(gid) = node.group_id {
            best = Some((gid, 0));
        }

        for (depth, label) in labels.iter().enumerate() {
            let lowered = label.to_ascii_lowercase();
            match node.children.get(&lowered) {
                Some(child) => {
                    node = child;
                    if let Some(gid) = node.group_id {
                        best = Some((gid, depth + 1));
                    }
                }
                None => break,
            }
        }

        best.map(|(gid, depth)| {
            let zone = labels[..depth].iter().rev().cloned().collect::<Vec<_>>().join(".");
            (gid, zone)
        })
    }
}

impl Default for DomainTrie {
    fn default() -> Self {
        Self::new()
    }
}

fn delete_recursive(node: &mut TrieNode, labels: &[String]) -> bool {
    match labels.split_first() {
        None => {
            node.group_id = None;
        }
        Some((head, rest)) => {
            if let Some(child) = node.children.get_mut(head) {
                let prune = delete_recursive(child, rest);
                if prune {
                    node.children.remove(head);
                }
            }
        }
    }
    node.children.is_empty() && node.group_id.is_none()
}

struct MatchCacheEntry {
    group_id: u32,
    zone: String,
    expires_at: Instant,
    last_access: AtomicU64,
}

/// Bounded cache fronting the trie: `qname -> (group, zone)`, TTL 30s,
/// LRU eviction by last-access when over capacity. A group reload flushes it.
pub struct MatchCache {
    entries: DashMap<String, MatchCacheEntry>,
    trie: DomainTrie,
    epoch: Instant,
}

impl MatchCache {
    pub fn new(trie: DomainTrie) -> Self {
        Self {
            entries: DashMap::new(),
            trie,
            epoch: Instant::now(),
        }
    }

    pub fn trie(&self) -> &DomainTrie {
        &self.trie
    }

    fn now_ticks(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Resolves a query name to a group id, consulting the cache first
    /// and falling through to the trie on miss or expiry.
    pub fn resolve(&self, qname: &str) -> Option<u32> {
        let key = qname.to_ascii_lowercase();
        let now = Instant::now();

        if let Some(entry) = self.entries.get(&key) {
            if entry.expires_at > now {
                entry.last_access.store(self.now_ticks(), Ordering::Relaxed);
                return Some(entry.group_id);
            }
        }
        self.entries.remove(&key);

        let (group_id, zone) = self.trie.search(&key)?;
        self.insert_with_eviction(key, group_id, zone, now);
        Some(group_id)
    }

    fn insert_with_eviction(&self, key: String, group_id: u32, zone: String, now: Instant) {
        if self.entries.len() >= MATCH_CACHE_CAPACITY {
            self.evict_oldest();
        }
        self.entries.insert(
            key,
            MatchCacheEntry {
                group_id,
                zone,
                expires_at: now + MATCH_CACHE_TTL,
                last_access: AtomicU64::new(self.now_ticks()),
            },
        );
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.last_access.load(Ordering::Relaxed))
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    /// Flushes every cached resolution. Called after a group reload.
    pub fn flush(&self) {
        self.entries.clear();
    }

    /// Drops expired entries. Intended for a periodic sweeper job.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.expires_at <= now)
            .map(|e| e.key().clone())
            .collect();
        let count = expired.len();
        for key in expired {
            self.entries.remove(&key);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_trie() -> DomainTrie {
        let trie = DomainTrie::new();
        trie.insert("com", 100);
        trie.insert("example.com", 1);
        trie.insert("www.example.com", 2);
        trie
    }

    #[test]
    fn deepest_terminal_wins() {
        let trie = seeded_trie();
        assert_eq!(trie.search("www.example.com").map(|(g, _)| g), Some(2));
        assert_eq!(trie.search("mail.example.com").map(|(g, _)| g), Some(1));
        assert_eq!(trie.search("example.net").map(|(g, _)| g), Some(100));
    }

    #[test]
    fn exact_match_without_subdomain() {
        let trie = seeded_trie();
        assert_eq!(trie.search("example.com").map(|(g, _)| g), Some(1));
    }

    #[test]
    fn no_match_returns_none() {
        let trie = DomainTrie::new();
        trie.insert("example.com", 1);
        assert!(trie.search("org").is_none());
        assert!(trie.search("b.c").is_none());
    }

    #[test]
    fn delete_prunes_empty_subtree() {
        let trie = seeded_trie();
        trie.delete("www.example.com");
        assert_eq!(trie.search("www.example.com").map(|(g, _)| g), Some(1));
        trie.delete("example.com");
        assert_eq!(trie.search("mail.example.com").map(|(g, _)| g), Some(100));
    }

    #[test]
    fn match_cache_resolves_through_trie_on_miss() {
        let cache = MatchCache::new(seeded_trie());
        assert_eq!(cache.resolve("www.example.com"), Some(2));
        assert_eq!(cache.resolve("www.example.com"), Some(2));
    }

    #[test]
    fn flush_clears_cached_entries() {
        let cache = MatchCache::new(seeded_trie());
        cache.resolve("www.example.com");
        cache.flush();
        assert_eq!(cache.entries.len(), 0);
    }
}
