//! Fixed-capacity in-memory cache with TTL and LRU eviction
//!
//! Keyed by request signature, one instance per resource type. Expired
//! entries are dropped lazily on access and swept periodically; when the
//! cache is full the least-recently-used key is evicted to make room.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub keys: Vec<String>,
}

struct Entry<T> {
    value: T,
    expiry: Instant,
}

struct Inner<T> {
    map: HashMap<String, Entry<T>>,
    // Front = least recently used.
    order: VecDeque<String>,
}

pub struct Cache<T> {
    inner: Mutex<Inner<T>>,
    ttl: Duration,
    max_size: usize,
}

impl<T: Clone> Cache<T> {
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            ttl,
            max_size: max_size.max(1),
        }
    }

    pub fn set(&self, key: &str, value: T) {
        self.set_with_ttl(key, value, self.ttl);
    }

    pub fn set_with_ttl(&self, key: &str, value: T, ttl: Duration) {
        let mut inner = self.inner.lock().unwrap();
        if inner.map.len() >= self.max_size && !inner.map.contains_key(key) {
            if let Some(oldest) = inner.order.pop_front() {
                inner.map.remove(&oldest);
            }
        }
        inner.map.insert(
            key.to_string(),
            Entry {
                value,
                expiry: Instant::now() + ttl,
            },
        );
        Self::touch(&mut inner.order, key);
    }

    pub fn get(&self, key: &str) -> Option<T> {
        let mut inner = self.inner.lock().unwrap();
        let expired = match inner.map.get(key) {
            None => return None,
            Some(entry) => Instant::now() > entry.expiry,
        };
        if expired {
            inner.map.remove(key);
            inner.order.retain(|k| k != key);
            return None;
        }
        Self::touch(&mut inner.order, key);
        inner.map.get(key).map(|entry| entry.value.clone())
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.order.retain(|k| k != key);
        inner.map.remove(key).is_some()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.map.clear();
        inner.order.clear();
    }

    /// Sweep expired entries; returns how many were removed. Meant to run
    /// on a periodic timer rather than per request.
    pub fn cleanup(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let expired: Vec<String> = inner
            .map
            .iter()
            .filter(|(_, entry)| now > entry.expiry)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.map.remove(key);
            inner.order.retain(|k| k != key);
        }
        expired.len()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        CacheStats {
            size: inner.map.len(),
            max_size: self.max_size,
            keys: inner.map.keys().cloned().collect(),
        }
    }

    // Move `key` to most-recently-used position.
    fn touch(order: &mut VecDeque<String>, key: &str) {
        order.retain(|k| k != key);
        order.push_back(key.to_string());
    }
}
