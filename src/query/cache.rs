// SPDX-License-Identifier: Apache-2.0

//! Key-based async query cache
//!
//! One entry per `QueryKey`. A read either returns fresh data, joins the
//! request already in flight for that key, or starts a new one. Requests are
//! `Shared` futures, so every concurrent caller observes the same result and
//! the upstream is hit once. A failed request keeps the previously cached
//! data and records the error next to it. Entries nobody read for longer
//! than their `gc_time` are dropped.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::keys::{QueryKey, QueryOptions};
use crate::metrics;
use crate::{RelationsError, RelationsResult};

type FetchOutput<T> = Result<Arc<T>, RelationsError>;
type SharedFetch<T> = Shared<BoxFuture<'static, FetchOutput<T>>>;
type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, RelationsResult<T>> + Send + Sync>;

/// Snapshot of one cached read
#[derive(Debug)]
pub struct QueryState<T> {
    pub data: Option<Arc<T>>,
    pub error: Option<RelationsError>,
    /// A request for this key is in flight
    pub is_fetching: bool,
    /// In flight with nothing cached yet
    pub is_loading: bool,
}

impl<T> QueryState<T> {
    pub fn idle() -> Self {
        Self {
            data: None,
            error: None,
            is_fetching: false,
            is_loading: false,
        }
    }

    /// Derives a state over a projection of the cached data, keeping the
    /// flags. A failing projection yields no data and reports its error
    /// unless the read itself already failed.
    pub fn try_select<U, F>(self, selector: F) -> QueryState<U>
    where
        F: FnOnce(&T) -> RelationsResult<Option<U>>,
    {
        let (data, error) = match self.data.as_deref().map(selector) {
            None => (None, self.error),
            Some(Ok(data)) => (data.map(Arc::new), self.error),
            Some(Err(err)) => (None, self.error.or(Some(err))),
        };

        QueryState {
            data,
            error,
            is_fetching: self.is_fetching,
            is_loading: self.is_loading,
        }
    }
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            is_fetching: self.is_fetching,
            is_loading: self.is_loading,
        }
    }
}

struct InFlight<T> {
    generation: u64,
    fetch: SharedFetch<T>,
}

struct Entry<T> {
    data: Option<Arc<T>>,
    error: Option<RelationsError>,
    updated_at: Option<Instant>,
    invalidated: bool,
    options: QueryOptions,
    fetcher: Option<Fetcher<T>>,
    in_flight: Option<InFlight<T>>,
    /// Generation of the last request whose outcome was written here
    settled_generation: Option<u64>,
    last_read: Instant,
}

impl<T> Entry<T> {
    fn new(options: QueryOptions, now: Instant) -> Self {
        Self {
            data: None,
            error: None,
            updated_at: None,
            invalidated: false,
            options,
            fetcher: None,
            in_flight: None,
            settled_generation: None,
            last_read: now,
        }
    }

    fn is_idle(&self, now: Instant) -> bool {
        self.in_flight.is_none() && now.duration_since(self.last_read) >= self.options.gc_time
    }

    fn is_fresh(&self, now: Instant) -> bool {
        if self.invalidated || self.data.is_none() {
            return false;
        }
        matches!(self.updated_at, Some(at) if now.duration_since(at) < self.options.stale_time)
    }

    fn state(&self) -> QueryState<T> {
        let is_fetching = self.in_flight.is_some();
        QueryState {
            data: self.data.clone(),
            error: self.error.clone(),
            is_fetching,
            is_loading: is_fetching && self.data.is_none(),
        }
    }
}

struct Inner<T> {
    entries: Mutex<HashMap<QueryKey, Entry<T>>>,
    generation: AtomicU64,
}

pub struct QueryCache<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for QueryCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> Default for QueryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> QueryCache<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Current snapshot for `key`, without triggering any request.
    pub fn state(&self, key: &QueryKey) -> QueryState<T> {
        self.inner
            .entries
            .lock()
            .get(key)
            .map(Entry::state)
            .unwrap_or_else(QueryState::idle)
    }

    /// Reads `key`, awaiting the upstream only when the cached entry is
    /// missing, stale or invalidated.
    ///
    /// If the awaited request is superseded by an invalidation, the read
    /// starts over so the returned state always reflects a settled request.
    pub async fn fetch<F, Fut>(&self, key: QueryKey, options: QueryOptions, fetcher: F) -> QueryState<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RelationsResult<T>> + Send + 'static,
    {
        let fetcher = boxed_fetcher(fetcher);
        while let Some((generation, fetch)) = self.begin(&key, options, Arc::clone(&fetcher)) {
            let _ = fetch.await;
            if self.settled_with(&key, generation) {
                break;
            }
            debug!(key = %key, generation, "Request superseded, reading again");
        }
        self.state(&key)
    }

    /// Like `fetch` but returns immediately; a needed request runs on the
    /// current tokio runtime in the background.
    pub fn prefetch<F, Fut>(&self, key: &QueryKey, options: QueryOptions, fetcher: F) -> QueryState<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RelationsResult<T>> + Send + 'static,
    {
        if let Some((_, fetch)) = self.begin(key, options, boxed_fetcher(fetcher)) {
            spawn_fetch(key, fetch);
        }
        self.state(key)
    }

    /// Marks `key` stale and drops its in-flight request; the next read
    /// refetches. Returns whether the key was cached.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        match self.inner.entries.lock().get_mut(key) {
            Some(entry) => {
                entry.invalidated = true;
                entry.in_flight = None;
                true
            }
            None => false,
        }
    }

    pub fn invalidate_all(&self) {
        for entry in self.inner.entries.lock().values_mut() {
            entry.invalidated = true;
            entry.in_flight = None;
        }
    }

    /// Refetches in the background every stale entry whose options opt into
    /// focus refetching. Returns how many requests were started.
    pub fn on_window_focus(&self) -> usize {
        let now = Instant::now();
        let started: Vec<(QueryKey, SharedFetch<T>)> = {
            let mut entries = self.inner.entries.lock();
            entries
                .iter_mut()
                .filter(|(_, entry)| {
                    entry.options.refetch_on_window_focus
                        && entry.in_flight.is_none()
                        && !entry.is_fresh(now)
                })
                .filter_map(|(key, entry)| {
                    let fetcher = entry.fetcher.clone()?;
                    let (_, fetch) = self.start(key, entry, fetcher);
                    Some((key.clone(), fetch))
                })
                .collect()
        };

        for (key, fetch) in &started {
            spawn_fetch(key, fetch.clone());
        }
        started.len()
    }

    pub fn remove(&self, key: &QueryKey) -> bool {
        self.inner.entries.lock().remove(key).is_some()
    }

    /// Drops every entry with no request in flight that was not read within
    /// its `gc_time`. Returns how many were dropped.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.inner.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_idle(now));
        before - entries.len()
    }

    fn settled_with(&self, key: &QueryKey, generation: u64) -> bool {
        self.inner
            .entries
            .lock()
            .get(key)
            .is_some_and(|entry| entry.settled_generation == Some(generation))
    }

    /// Returns the request to await with its generation, or `None` when
    /// fresh data is cached.
    fn begin(
        &self,
        key: &QueryKey,
        options: QueryOptions,
        fetcher: Fetcher<T>,
    ) -> Option<(u64, SharedFetch<T>)> {
        let now = Instant::now();
        let mut entries = self.inner.entries.lock();

        let before = entries.len();
        entries.retain(|other, entry| other == key || !entry.is_idle(now));
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "Evicted idle cache entries");
        }

        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(options, now));
        entry.options = options;
        entry.fetcher = Some(Arc::clone(&fetcher));
        entry.last_read = now;

        if entry.is_fresh(now) {
            metrics::record_cache_hit();
            debug!(key = %key, "Serving fresh cached data");
            return None;
        }

        if let Some(in_flight) = &entry.in_flight {
            metrics::record_joined();
            debug!(key = %key, "Joining request in flight");
            return Some((in_flight.generation, in_flight.fetch.clone()));
        }

        Some(self.start(key, entry, fetcher))
    }

    fn start(
        &self,
        key: &QueryKey,
        entry: &mut Entry<T>,
        fetcher: Fetcher<T>,
    ) -> (u64, SharedFetch<T>) {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, generation, "Starting request");

        let fetch = settle(
            Arc::downgrade(&self.inner),
            key.clone(),
            generation,
            fetcher(),
        )
        .boxed()
        .shared();

        entry.in_flight = Some(InFlight {
            generation,
            fetch: fetch.clone(),
        });
        (generation, fetch)
    }
}

fn boxed_fetcher<T, F, Fut>(fetcher: F) -> Fetcher<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RelationsResult<T>> + Send + 'static,
{
    Arc::new(move || fetcher().boxed())
}

fn spawn_fetch<T: Send + Sync + 'static>(key: &QueryKey, fetch: SharedFetch<T>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(fetch);
        }
        Err(_) => warn!(key = %key, "No async runtime, request deferred until awaited"),
    }
}

/// Runs the request and writes its outcome into the entry, unless a newer
/// request or an invalidation superseded it meanwhile.
async fn settle<T>(
    inner: Weak<Inner<T>>,
    key: QueryKey,
    generation: u64,
    request: BoxFuture<'static, RelationsResult<T>>,
) -> FetchOutput<T> {
    let started = Instant::now();
    let result = request.await.map(Arc::new);
    metrics::record_fetch(started.elapsed().as_secs_f64() * 1000.0, result.is_ok());

    let Some(inner) = inner.upgrade() else {
        return result;
    };

    {
        let mut entries = inner.entries.lock();
        let current = entries.get_mut(&key).filter(|entry| {
            entry
                .in_flight
                .as_ref()
                .is_some_and(|in_flight| in_flight.generation == generation)
        });

        match current {
            Some(entry) => {
                entry.in_flight = None;
                entry.settled_generation = Some(generation);
                match &result {
                    Ok(data) => {
                        entry.data = Some(Arc::clone(data));
                        entry.error = None;
                        entry.updated_at = Some(Instant::now());
                        entry.invalidated = false;
                    }
                    Err(err) => {
                        warn!(key = %key, error = %err, "Request failed");
                        entry.error = Some(err.clone());
                    }
                }
            }
            None => debug!(key = %key, generation, "Discarding superseded result"),
        }
    }

    result
}
