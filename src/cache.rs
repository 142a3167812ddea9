use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Stamped<V> {
    at: Instant,
    value: V,
}

/// Pid-keyed cache with a TTL and amortized eviction: stale entries are
/// only removed by a sweep that runs at most once per `sweep_every`,
/// never per lookup. All operations take an explicit `now` so tests can
/// drive the clock.
pub struct TtlCache<V> {
    ttl: Duration,
    sweep_every: Duration,
    last_sweep: Instant,
    map: HashMap<u32, Stamped<V>>,
}

impl<V> TtlCache<V> {
    pub fn new(ttl: Duration, sweep_every: Duration) -> Self {
        Self {
            ttl,
            sweep_every,
            last_sweep: Instant::now(),
            map: HashMap::new(),
        }
    }

    pub fn get(&self, pid: u32, now: Instant) -> Option<&V> {
        self.map
            .get(&pid)
            .filter(|e| now.duration_since(e.at) < self.ttl)
            .map(|e| &e.value)
    }

    pub fn insert(&mut self, pid: u32, value: V, now: Instant) {
        self.map.insert(pid, Stamped { at: now, value });
    }

    /// Drops entries older than the TTL, at most once per sweep
    /// interval. Lookup cost stays flat between sweeps.
    pub fn maybe_sweep(&mut self, now: Instant) {
        if now.duration_since(self.last_sweep) < self.sweep_every {
            return;
        }
        //same strict bound as get: at exactly the TTL an entry is stale
        let ttl = self.ttl;
        self.map.retain(|_, e| now.duration_since(e.at) < ttl);
        self.last_sweep = now;
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.map.len()
    }
}
