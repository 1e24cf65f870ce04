//! # Time-Evicting Map
//!
//! [`ExpiringMap`] backs both the source-side pending registry and the
//! tracker's accumulators. Entries live in a hash map keyed by root id; a
//! single deadline-ordered queue drives eviction, so there is no per-entry
//! timer regardless of fan-out.
//!
//! Refreshing an entry pushes a new queue slot and bumps the entry's
//! generation; stale slots are skipped when they reach the front. Callers
//! pass a non-decreasing `now` so the queue stays ordered.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Slot<V> {
  value: V,
  generation: u64,
  touched_at: Instant,
}

/// Hash map whose entries are evicted `timeout` after their last refresh.
#[derive(Debug)]
pub struct ExpiringMap<K, V> {
  entries: HashMap<K, Slot<V>>,
  deadlines: VecDeque<(Instant, K, u64)>,
  timeout: Duration,
  next_generation: u64,
}

impl<K, V> ExpiringMap<K, V>
where
  K: Hash + Eq + Clone,
{
  /// Creates an empty map with the given entry lifetime.
  pub fn new(timeout: Duration) -> Self {
    Self {
      entries: HashMap::new(),
      deadlines: VecDeque::new(),
      timeout,
      next_generation: 0,
    }
  }

  /// Entry lifetime.
  pub fn timeout(&self) -> Duration {
    self.timeout
  }

  /// Number of live entries.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Returns true when no entry is live.
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Returns true when `key` is live.
  pub fn contains_key(&self, key: &K) -> bool {
    self.entries.contains_key(key)
  }

  /// Live value for `key`.
  pub fn get(&self, key: &K) -> Option<&V> {
    self.entries.get(key).map(|slot| &slot.value)
  }

  /// Mutable live value for `key`. Does not refresh the deadline.
  pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
    self.entries.get_mut(key).map(|slot| &mut slot.value)
  }

  /// When `key` was inserted or last refreshed.
  pub fn touched_at(&self, key: &K) -> Option<Instant> {
    self.entries.get(key).map(|slot| slot.touched_at)
  }

  /// Inserts `value`, replacing and returning any previous value.
  pub fn insert(&mut self, key: K, value: V, now: Instant) -> Option<V> {
    let generation = self.bump(key.clone(), now);
    let slot = Slot {
      value,
      generation,
      touched_at: now,
    };
    self.entries.insert(key, slot).map(|old| old.value)
  }

  /// Returns the value for `key`, inserting `default()` first if absent, and
  /// refreshes its deadline.
  pub fn upsert_with(&mut self, key: K, now: Instant, default: impl FnOnce() -> V) -> &mut V {
    let generation = self.bump(key.clone(), now);
    let slot = match self.entries.entry(key) {
      Entry::Occupied(occupied) => {
        let slot = occupied.into_mut();
        slot.generation = generation;
        slot.touched_at = now;
        slot
      }
      Entry::Vacant(vacant) => vacant.insert(Slot {
        value: default(),
        generation,
        touched_at: now,
      }),
    };
    &mut slot.value
  }

  /// Removes `key`, returning its value if it was live.
  pub fn remove(&mut self, key: &K) -> Option<V> {
    let removed = self.entries.remove(key).map(|slot| slot.value);
    self.compact();
    removed
  }

  /// Evicts and returns every entry whose deadline is at or before `now`.
  pub fn expire(&mut self, now: Instant) -> Vec<(K, V)> {
    let mut expired = Vec::new();
    while let Some((deadline, _, _)) = self.deadlines.front() {
      if *deadline > now {
        break;
      }
      let Some((_, key, generation)) = self.deadlines.pop_front() else {
        break;
      };
      let current = self
        .entries
        .get(&key)
        .is_some_and(|slot| slot.generation == generation);
      if current {
        if let Some(slot) = self.entries.remove(&key) {
          expired.push((key, slot.value));
        }
      }
    }
    expired
  }

  /// Iterates over live entries in arbitrary order.
  pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
    self.entries.iter().map(|(k, slot)| (k, &slot.value))
  }

  // Compacts before queueing so the new slot is never mistaken for stale.
  fn bump(&mut self, key: K, now: Instant) -> u64 {
    self.compact();
    self.next_generation = self.next_generation.wrapping_add(1);
    self
      .deadlines
      .push_back((now + self.timeout, key, self.next_generation));
    self.next_generation
  }

  // Stale slots accumulate when entries are refreshed or removed early.
  fn compact(&mut self) {
    if self.deadlines.len() <= 4 * self.entries.len() + 64 {
      return;
    }
    let entries = &self.entries;
    self.deadlines.retain(|(_, key, generation)| {
      entries
        .get(key)
        .is_some_and(|slot| slot.generation == *generation)
    });
  }
}
