//! Reference-counted resource cache.
//!
//! `ResourceCache` is the shared caching primitive of the engine: the page
//! cache, the data-item cache, and the entry cache are all instances of it.
//! A resource stays cached only while at least one handle to it is alive;
//! when the last handle drops the backend's write-back hook runs and the
//! resource leaves the cache.

use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};

/// Materializes resources on cache miss and writes them back on eviction.
pub trait CacheBackend {
    type Item;

    /// Loads the resource identified by `key`. Called outside the cache
    /// mutex; at most one load per key is in flight at any time.
    fn load(&self, key: u64) -> Result<Self::Item>;

    /// Write-back hook invoked when the last reference to a resource is
    /// released, or for every resource on `close`.
    fn evict(&self, key: u64, item: &Self::Item) -> Result<()>;
}

struct Slot<T> {
    value: Arc<T>,
    refs: usize,
}

struct CacheState<T> {
    entries: HashMap<u64, Slot<T>>,
    /// Keys currently being materialized by some caller.
    loading: HashSet<u64>,
}

struct CacheInner<B: CacheBackend> {
    backend: B,
    /// 0 means unbounded.
    max_resources: usize,
    state: Mutex<CacheState<B::Item>>,
    /// Broadcast whenever an in-flight load completes.
    loaded: Condvar,
}

pub struct ResourceCache<B: CacheBackend> {
    inner: Arc<CacheInner<B>>,
}

impl<B: CacheBackend> Clone for ResourceCache<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: CacheBackend> ResourceCache<B> {
    pub fn new(backend: B, max_resources: usize) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                backend,
                max_resources,
                state: Mutex::new(CacheState {
                    entries: HashMap::new(),
                    loading: HashSet::new(),
                }),
                loaded: Condvar::new(),
            }),
        }
    }

    /// Returns a handle to the resource, loading it through the backend on a
    /// miss. Blocks while another caller is materializing the same key.
    pub fn get(&self, key: u64) -> Result<CacheRef<B>> {
        let mut state = self.inner.state.lock();
        loop {
            if state.loading.contains(&key) {
                self.inner.loaded.wait(&mut state);
                continue;
            }

            if let Some(slot) = state.entries.get_mut(&key) {
                slot.refs += 1;
                let value = Arc::clone(&slot.value);
                return Ok(CacheRef {
                    cache: self.clone(),
                    key,
                    value,
                });
            }

            let max = self.inner.max_resources;
            if max > 0 && state.entries.len() + state.loading.len() >= max {
                return Err(Error::CacheFull);
            }

            state.loading.insert(key);
            break;
        }
        drop(state);

        // Load outside the mutex so unrelated keys are not blocked.
        let loaded = self.inner.backend.load(key);

        let mut state = self.inner.state.lock();
        state.loading.remove(&key);
        self.inner.loaded.notify_all();

        let value = Arc::new(loaded?);
        state.entries.insert(
            key,
            Slot {
                value: Arc::clone(&value),
                refs: 1,
            },
        );
        Ok(CacheRef {
            cache: self.clone(),
            key,
            value,
        })
    }

    fn release(&self, key: u64) {
        let evicted = {
            let mut state = self.inner.state.lock();
            let last_ref = match state.entries.get_mut(&key) {
                Some(slot) => {
                    slot.refs -= 1;
                    slot.refs == 0
                }
                None => false,
            };
            if last_ref {
                // The key stays reserved until the write-back lands, so a
                // concurrent get waits for it instead of reloading state
                // the backend has not persisted yet.
                state.loading.insert(key);
                state.entries.remove(&key)
            } else {
                None
            }
        };

        if let Some(slot) = evicted {
            let written_back = self.inner.backend.evict(key, &slot.value);

            let mut state = self.inner.state.lock();
            state.loading.remove(&key);
            self.inner.loaded.notify_all();
            drop(state);

            if let Err(e) = written_back {
                // Losing a write-back means losing durable state; there is
                // no caller left to report the failure to.
                panic!("failed to write back evicted resource {}: {}", key, e);
            }
        }
    }

    /// Evicts everything, ignoring reference counts. Shutdown only.
    pub fn close(&self) -> Result<()> {
        let drained: Vec<(u64, Slot<B::Item>)> = {
            let mut state = self.inner.state.lock();
            state.entries.drain().collect()
        };
        for (key, slot) in drained {
            self.inner.backend.evict(key, &slot.value)?;
        }
        Ok(())
    }
}

/// Shared handle to a cached resource. Dropping it decrements the reference
/// count; the last drop triggers the backend's write-back.
pub struct CacheRef<B: CacheBackend> {
    cache: ResourceCache<B>,
    key: u64,
    value: Arc<B::Item>,
}

impl<B: CacheBackend> CacheRef<B> {
    pub fn key(&self) -> u64 {
        self.key
    }
}

impl<B: CacheBackend> Deref for CacheRef<B> {
    type Target = B::Item;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<B: CacheBackend> Drop for CacheRef<B> {
    fn drop(&mut self) {
        self.cache.release(self.key);
    }
}
