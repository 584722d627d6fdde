use std::collections::HashMap;
use std::time::{Duration, Instant};

pub type CacheKey = Vec<String>;

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    Fresh(T),
    /// Older than the refresh interval; usable, but should be recomputed.
    Stale(T),
    Missing,
}

/// Result cache consulted by the report service before recomputing.
pub trait ReportCache<T: Clone> {
    fn get(&self, key: &CacheKey) -> CacheLookup<T>;
    fn put(&mut self, key: CacheKey, value: T);
    fn invalidate(&mut self, key: &CacheKey);
    fn invalidate_all(&mut self);
    fn refresh_interval(&self) -> Duration;
}

#[derive(Debug)]
pub struct MemoryCache<T> {
    entries: HashMap<CacheKey, (Instant, T)>,
    refresh_interval: Duration,
}

impl<T> MemoryCache<T> {
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            refresh_interval,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Clone> ReportCache<T> for MemoryCache<T> {
    fn get(&self, key: &CacheKey) -> CacheLookup<T> {
        match self.entries.get(key) {
            Some((stored_at, value)) if stored_at.elapsed() < self.refresh_interval => {
                CacheLookup::Fresh(value.clone())
            }
            Some((_, value)) => CacheLookup::Stale(value.clone()),
            None => CacheLookup::Missing,
        }
    }

    fn put(&mut self, key: CacheKey, value: T) {
        self.entries.insert(key, (Instant::now(), value));
    }

    fn invalidate(&mut self, key: &CacheKey) {
        self.entries.remove(key);
    }

    fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }
}
