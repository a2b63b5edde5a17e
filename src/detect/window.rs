// Per-actor sliding windows held in a concurrent map.
//
// Each detector owns one WindowStore, injected at construction, so window
// state lives exactly as long as the engine that created it. All mutation
// for a key happens inside a single DashMap entry guard: the
// prune -> append -> check sequence for one (tenant, actor) pair is
// serialized, while unrelated keys proceed in parallel. Guards are never
// held across an await point.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Identifies one actor inside one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub tenant_id: String,
    pub actor_id: String,
}

impl WindowKey {
    pub fn new(tenant_id: &str, actor_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            actor_id: actor_id.to_string(),
        }
    }
}

/// Window state that knows when it was last touched.
pub trait Tracked {
    fn last_seen(&self) -> Option<DateTime<Utc>>;
}

pub struct WindowStore<W> {
    windows: DashMap<WindowKey, W>,
}

impl<W> Default for WindowStore<W> {
    fn default() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }
}

impl<W: Default + Tracked> WindowStore<W> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the key's window, creating it if absent.
    ///
    /// The entry stays locked for the duration of `f`, so `f` must not block.
    pub fn with_window<R>(&self, key: WindowKey, f: impl FnOnce(&mut W) -> R) -> R {
        let mut entry = self.windows.entry(key).or_default();
        f(entry.value_mut())
    }

    /// Read the key's window without creating it.
    pub fn inspect<R>(&self, key: &WindowKey, f: impl FnOnce(&W) -> R) -> Option<R> {
        self.windows.get(key).map(|w| f(w.value()))
    }

    /// Drop all tracked state for one actor. Returns true if any existed.
    pub fn clear(&self, key: &WindowKey) -> bool {
        self.windows.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Remove windows that haven't seen an event for at least `max_idle`.
    /// Returns the number of windows evicted.
    pub fn evict_idle(&self, now: DateTime<Utc>, max_idle: Duration) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| w.last_seen().is_some_and(|seen| now - seen < max_idle));
        before.saturating_sub(self.windows.len())
    }
}

/// Drop every entry whose timestamp is at least `window` older than `now`.
///
/// Uses `retain` rather than popping from the front: concurrent callers can
/// deliver slightly out-of-order timestamps, and the invariant must hold
/// for every retained entry regardless of insertion order.
pub fn prune<T>(
    entries: &mut VecDeque<T>,
    now: DateTime<Utc>,
    window: Duration,
    at: impl Fn(&T) -> DateTime<Utc>,
) {
    entries.retain(|e| now - at(e) < window);
}

/// True when `count` reaches a configured limit. A limit of zero disables
/// the check.
pub fn crossed(count: usize, limit: u32) -> bool {
    limit > 0 && count >= limit as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Stamps {
        at: VecDeque<DateTime<Utc>>,
    }

    impl Tracked for Stamps {
        fn last_seen(&self) -> Option<DateTime<Utc>> {
            self.at.iter().max().copied()
        }
    }

    fn base() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_prune_keeps_only_entries_inside_window() {
        let now = base();
        let window = Duration::milliseconds(5_000);
        let mut entries: VecDeque<DateTime<Utc>> = [
            now - Duration::milliseconds(7_000),
            now - Duration::milliseconds(5_000), // exactly window length: expired
            now - Duration::milliseconds(4_999),
            now - Duration::milliseconds(100),
            now,
        ]
        .into_iter()
        .collect();

        prune(&mut entries, now, window, |t| *t);

        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|t| now - *t < window));
    }

    #[test]
    fn test_prune_handles_out_of_order_timestamps() {
        let now = base();
        let window = Duration::milliseconds(1_000);
        let mut entries: VecDeque<DateTime<Utc>> = [
            now - Duration::milliseconds(10),
            now - Duration::milliseconds(2_000),
            now - Duration::milliseconds(20),
        ]
        .into_iter()
        .collect();

        prune(&mut entries, now, window, |t| *t);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_crossed_treats_zero_as_disabled() {
        assert!(!crossed(100, 0));
        assert!(crossed(3, 3));
        assert!(!crossed(2, 3));
    }

    #[test]
    fn test_evict_idle_removes_only_stale_windows() {
        let store: WindowStore<Stamps> = WindowStore::new();
        let now = base();
        store.with_window(WindowKey::new("g1", "old"), |w| {
            w.at.push_back(now - Duration::seconds(700))
        });
        store.with_window(WindowKey::new("g1", "fresh"), |w| {
            w.at.push_back(now - Duration::seconds(5))
        });
        // Created but never fed: nothing to keep
        store.with_window(WindowKey::new("g2", "empty"), |_| ());

        let evicted = store.evict_idle(now, Duration::seconds(600));

        assert_eq!(evicted, 2);
        assert_eq!(store.len(), 1);
        assert!(store
            .inspect(&WindowKey::new("g1", "fresh"), |w| w.at.len())
            .is_some());
    }

    #[test]
    fn test_clear_reports_whether_state_existed() {
        let store: WindowStore<Stamps> = WindowStore::new();
        let key = WindowKey::new("g1", "u1");
        assert!(!store.clear(&key));
        store.with_window(key.clone(), |w| w.at.push_back(base()));
        assert!(store.clear(&key));
        assert!(store.is_empty());
    }
}
