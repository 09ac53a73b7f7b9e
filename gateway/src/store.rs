// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Pluggable state for the session cache and the rate limiter.
//!
//! Both caches talk to a [`KeyValueStore`] instead of owning a map, so a
//! deployment running several gateway instances can swap the in-process
//! [`MemoryStore`] for a shared external store without touching call sites.
//! Time is read through [`Clock`] so expiry can be driven by tests.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn advance(&self, delta: TimeDelta) {
        self.millis
            .fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .unwrap_or(DateTime::UNIX_EPOCH)
    }
}

/// Key-value storage shared by concurrent requests.
///
/// Implementations must apply [`update`](KeyValueStore::update) atomically per
/// key; unrelated keys must not serialize behind each other.
#[async_trait]
pub trait KeyValueStore<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> anyhow::Result<Option<V>>;

    async fn set(&self, key: &str, value: V) -> anyhow::Result<()>;

    async fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// Replaces the value under `key` with `f(current)` and returns it.
    async fn update(
        &self,
        key: &str,
        f: &(dyn for<'a> Fn(Option<&'a V>) -> V + Send + Sync),
    ) -> anyhow::Result<V>;

    /// Drops every entry for which `retain` is false; returns how many went.
    async fn sweep(&self, retain: &(dyn for<'a> Fn(&'a V) -> bool + Send + Sync)) -> anyhow::Result<usize>;

    async fn len(&self) -> anyhow::Result<usize>;
}

/// Sharded in-process store backed by [`DashMap`].
#[derive(Debug)]
pub struct MemoryStore<V> {
    entries: DashMap<String, V>,
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

#[async_trait]
impl<V> KeyValueStore<V> for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> anyhow::Result<Option<V>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: V) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn update(
        &self,
        key: &str,
        f: &(dyn for<'a> Fn(Option<&'a V>) -> V + Send + Sync),
    ) -> anyhow::Result<V> {
        // the shard stays locked for the whole read-modify-write
        let value = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let next = f(Some(occupied.get()));
                occupied.insert(next.clone());
                next
            }
            Entry::Vacant(vacant) => {
                let next = f(None);
                vacant.insert(next.clone());
                next
            }
        };
        Ok(value)
    }

    async fn sweep(&self, retain: &(dyn for<'a> Fn(&'a V) -> bool + Send + Sync)) -> anyhow::Result<usize> {
        let before = self.entries.len();
        self.entries.retain(|_, value| retain(value));
        Ok(before.saturating_sub(self.entries.len()))
    }

    async fn len(&self) -> anyhow::Result<usize> {
        Ok(self.entries.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_get_set_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);

        store.set("a", 1u32).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(1));
        assert_eq!(store.len().await.unwrap(), 1);

        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_creates_and_modifies() {
        let store = MemoryStore::new();
        let bump = |current: Option<&u32>| current.map_or(1, |c| c + 1);

        assert_eq!(store.update("k", &bump).await.unwrap(), 1);
        assert_eq!(store.update("k", &bump).await.unwrap(), 2);
        assert_eq!(store.get("k").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_sweep_removes_rejected_entries() {
        let store = MemoryStore::new();
        for i in 0..10u32 {
            store.set(&i.to_string(), i).await.unwrap();
        }

        let removed = store.sweep(&|value| *value >= 4).await.unwrap();
        assert_eq!(removed, 4);
        assert_eq!(store.len().await.unwrap(), 6);
        assert_eq!(store.get("3").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_callbacks_through_trait_object() {
        let store: Arc<dyn KeyValueStore<String>> = Arc::new(MemoryStore::new());
        let suffix = String::from("!");

        // the callbacks borrow both the stored value and local state
        let append = |current: Option<&String>| match current {
            Some(value) => format!("{value}{suffix}"),
            None => String::from("hi"),
        };
        store.update("greeting", &append).await.unwrap();
        let updated = store.update("greeting", &append).await.unwrap();
        assert_eq!(updated, "hi!");

        store.set("other", String::from("x")).await.unwrap();
        let removed = store
            .sweep(&|value: &String| value.ends_with(suffix.as_str()))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.get("greeting").await.unwrap().as_deref(), Some("hi!"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_are_not_lost() {
        let store: Arc<MemoryStore<u32>> = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..250 {
                    store
                        .update("counter", &|c: Option<&u32>| c.map_or(1, |c| c + 1))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get("counter").await.unwrap(), Some(2000));
    }

    #[test]
    fn test_manual_clock_advances() {
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(TimeDelta::seconds(31));
        assert_eq!(clock.now(), start + TimeDelta::seconds(31));
    }
}
