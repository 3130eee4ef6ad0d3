use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CAPACITY: usize = 200;

/// Key-value store with a hard entry cap. When full, the entry inserted
/// longest ago is evicted first; re-inserting a key refreshes its position.
#[derive(Debug, Clone)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    entries: HashMap<K, V>,
    order: VecDeque<K>,
}

impl<K: Eq + Hash + Clone, V> Default for BoundedCache<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<K: Eq + Hash + Clone, V> BoundedCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the evicted entry, if the insert pushed one out.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if self.entries.insert(key.clone(), value).is_some() {
            self.order.retain(|k| k != &key);
            self.order.push_back(key);
            return None;
        }
        self.order.push_back(key);

        if self.entries.len() <= self.capacity {
            return None;
        }
        let victim = self.order.pop_front()?;
        let value = self.entries.remove(&victim)?;
        Some((victim, value))
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.order
            .iter()
            .filter_map(|k| self.entries.get(k).map(|v| (k, v)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct TranslationCache {
    inner: BoundedCache<(String, String), String>,
}

impl TranslationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: BoundedCache::new(capacity),
        }
    }

    pub fn get(&self, lang: &str, text: &str) -> Option<&str> {
        self.inner
            .get(&(normalize_lang(lang), text.to_string()))
            .map(String::as_str)
    }

    pub fn insert(&mut self, lang: &str, text: &str, translated: impl Into<String>) {
        self.inner
            .insert((normalize_lang(lang), text.to_string()), translated.into());
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

fn normalize_lang(lang: &str) -> String {
    lang.trim().to_ascii_lowercase()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dismissal {
    pub id: String,
    pub dismissed_at: DateTime<Utc>,
}

/// Remembers which banners and notifications a user has dismissed.
#[derive(Debug, Clone, Default)]
pub struct DismissalStore {
    inner: BoundedCache<String, DateTime<Utc>>,
}

impl DismissalStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: BoundedCache::new(capacity),
        }
    }

    pub fn dismiss(&mut self, id: &str, at: DateTime<Utc>) {
        self.inner.insert(id.to_string(), at);
    }

    pub fn restore(&mut self, id: &str) -> bool {
        self.inner.remove(&id.to_string()).is_some()
    }

    pub fn is_dismissed(&self, id: &str) -> bool {
        self.inner.contains_key(&id.to_string())
    }

    /// True only while the dismissal is younger than `ttl`.
    pub fn is_dismissed_within(&self, id: &str, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.inner
            .get(&id.to_string())
            .is_some_and(|at| now.signed_duration_since(*at) < ttl)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Dismissal> {
        self.inner
            .iter()
            .map(|(id, at)| Dismissal {
                id: id.clone(),
                dismissed_at: *at,
            })
            .collect()
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = Dismissal>) {
        for item in items {
            self.inner.insert(item.id, item.dismissed_at);
        }
    }
}
