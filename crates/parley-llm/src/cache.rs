//! Response cache keyed by a request fingerprint.
//!
//! Entries live in a slab with an intrusive doubly-linked recency list, so
//! a hit promotes in O(1) and eviction pops the tail without reallocating.
//! Expiry is lazy: an entry past its TTL is treated as a miss and reclaimed
//! on the lookup that finds it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use parley_core::Message;
use sha2::{Digest, Sha256};

/// Stable identity of a generation request. Two requests with the same
/// backend, model, ordered (role, content) pairs and temperature (to the
/// hundredth) collapse to the same fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(backend: &str, model: &str, messages: &[Message], temperature: f64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(backend.as_bytes());
        hasher.update([0u8]);
        hasher.update(model.as_bytes());
        hasher.update([0u8]);
        for message in messages {
            hasher.update(message.role.as_str().as_bytes());
            hasher.update([0x1f]);
            hasher.update(message.content.as_bytes());
            hasher.update([0u8]);
        }
        let hundredths = (temperature * 100.0).round() as i64;
        hasher.update(hundredths.to_le_bytes());
        Fingerprint(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub text: String,
    pub tokens: u32,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub total_items: usize,
    pub active_items: usize,
    pub max_size: usize,
    pub ttl: Duration,
}

const NIL: usize = usize::MAX;

struct Entry {
    key: Fingerprint,
    response: CachedResponse,
    created_at: Instant,
    prev: usize,
    next: usize,
}

struct CacheInner {
    slab: Vec<Option<Entry>>,
    free: Vec<usize>,
    index: HashMap<Fingerprint, usize>,
    head: usize, // most recent
    tail: usize, // least recent
}

pub struct ResponseCache {
    max_size: usize,
    ttl: Duration,
    inner: Mutex<CacheInner>,
}

impl ResponseCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            max_size: max_size.max(1),
            ttl,
            inner: Mutex::new(CacheInner {
                slab: Vec::new(),
                free: Vec::new(),
                index: HashMap::new(),
                head: NIL,
                tail: NIL,
            }),
        }
    }

    pub fn get(&self, key: &Fingerprint) -> Option<CachedResponse> {
        let mut inner = self.inner.lock().unwrap();
        let slot = *inner.index.get(key)?;

        let expired = {
            let entry = inner.slab[slot].as_ref().unwrap();
            entry.created_at.elapsed() >= self.ttl
        };
        if expired {
            inner.remove_slot(slot);
            log::debug!("Cache entry expired: {}", key.as_str());
            return None;
        }

        inner.unlink(slot);
        inner.push_front(slot);
        let response = inner.slab[slot].as_ref().unwrap().response.clone();
        log::debug!("Cache hit: {}", key.as_str());
        Some(response)
    }

    pub fn insert(&self, key: Fingerprint, response: CachedResponse) {
        let mut inner = self.inner.lock().unwrap();

        if let Some(&slot) = inner.index.get(&key) {
            inner.unlink(slot);
            inner.push_front(slot);
            let entry = inner.slab[slot].as_mut().unwrap();
            entry.response = response;
            entry.created_at = Instant::now();
            return;
        }

        if inner.index.len() >= self.max_size {
            let tail = inner.tail;
            if tail != NIL {
                log::debug!("Cache full, evicting least recently used entry");
                inner.remove_slot(tail);
            }
        }

        let entry = Entry {
            key: key.clone(),
            response,
            created_at: Instant::now(),
            prev: NIL,
            next: NIL,
        };
        let slot = match inner.free.pop() {
            Some(slot) => {
                inner.slab[slot] = Some(entry);
                slot
            }
            None => {
                inner.slab.push(Some(entry));
                inner.slab.len() - 1
            }
        };
        inner.index.insert(key, slot);
        inner.push_front(slot);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.slab.clear();
        inner.free.clear();
        inner.index.clear();
        inner.head = NIL;
        inner.tail = NIL;
        log::info!("Response cache cleared");
    }

    /// Snapshot of occupancy. `active_items` counts entries still inside
    /// their TTL; `total_items` counts everything not yet reclaimed.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        let total_items = inner.index.len();
        let active_items = inner
            .slab
            .iter()
            .flatten()
            .filter(|e| e.created_at.elapsed() < self.ttl)
            .count();
        CacheStats {
            total_items,
            active_items,
            max_size: self.max_size,
            ttl: self.ttl,
        }
    }
}

impl CacheInner {
    fn push_front(&mut self, slot: usize) {
        let old_head = self.head;
        {
            let entry = self.slab[slot].as_mut().unwrap();
            entry.prev = NIL;
            entry.next = old_head;
        }
        if old_head != NIL {
            self.slab[old_head].as_mut().unwrap().prev = slot;
        }
        self.head = slot;
        if self.tail == NIL {
            self.tail = slot;
        }
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let entry = self.slab[slot].as_ref().unwrap();
            (entry.prev, entry.next)
        };
        if prev != NIL {
            self.slab[prev].as_mut().unwrap().next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.slab[next].as_mut().unwrap().prev = prev;
        } else {
            self.tail = prev;
        }
    }

    fn remove_slot(&mut self, slot: usize) {
        self.unlink(slot);
        let entry = self.slab[slot].take().unwrap();
        self.index.remove(&entry.key);
        self.free.push(slot);
    }
}
