/*!
Shadow (digital twin) store: the last accepted state of every vehicle
*/

use std::collections::{HashMap, HashSet, hash_map::Entry};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::trace;

use fleetlink_protocol::VehicleState;

/// Shadow record for a single vehicle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShadowEntry {
    /// Latest accepted state report
    pub state: VehicleState,
    /// When the store accepted `state`; only used for liveness
    pub observed_at: DateTime<Utc>,
}

/// What `ShadowStore::update` did with a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Inserted,
    Replaced,
    /// Older than the stored report, dropped
    Stale,
}

/// Thread-safe map from vehicle id to its shadow entry.
///
/// Every method takes `&self`; reads share the lock, `update` and `remove`
/// take it exclusively. Per vehicle, the stored `timestamp` never goes
/// backwards: reports carrying an older producer timestamp are ignored, equal
/// timestamps overwrite.
#[derive(Debug, Default)]
pub struct ShadowStore {
    shadows: RwLock<HashMap<String, ShadowEntry>>,
}

impl ShadowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `state` unless it is older than what we already hold.
    ///
    /// `state.vehicle_id` is not validated here; callers must reject empty
    /// ids before they reach the store.
    pub fn update(&self, state: VehicleState) -> UpdateOutcome {
        let mut shadows = self.shadows.write();
        let observed_at = Utc::now();

        match shadows.entry(state.vehicle_id.clone()) {
            Entry::Occupied(mut slot) => {
                let stored = slot.get().state.timestamp;
                if state.timestamp < stored {
                    trace!(
                        vehicle_id = %state.vehicle_id,
                        incoming = state.timestamp,
                        stored,
                        "dropping stale state report"
                    );
                    return UpdateOutcome::Stale;
                }
                slot.insert(ShadowEntry { state, observed_at });
                UpdateOutcome::Replaced
            }
            Entry::Vacant(slot) => {
                slot.insert(ShadowEntry { state, observed_at });
                UpdateOutcome::Inserted
            }
        }
    }

    /// Copy of the entry for `vehicle_id`, if any
    pub fn get(&self, vehicle_id: &str) -> Option<ShadowEntry> {
        self.shadows.read().get(vehicle_id).cloned()
    }

    /// Independent snapshot of every entry
    pub fn all(&self) -> HashMap<String, ShadowEntry> {
        self.shadows.read().clone()
    }

    /// Ids of vehicles whose last accepted report arrived within `max_age`.
    /// Iteration order is unspecified.
    pub fn active_vehicles(&self, max_age: Duration) -> HashSet<String> {
        let now = Utc::now();
        let cutoff = TimeDelta::from_std(max_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        self.shadows
            .read()
            .iter()
            .filter(|(_, entry)| entry.observed_at > cutoff)
            .map(|(vehicle_id, _)| vehicle_id.clone())
            .collect()
    }

    /// Forget `vehicle_id`. Returns whether an entry was present.
    pub fn remove(&self, vehicle_id: &str) -> bool {
        self.shadows.write().remove(vehicle_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.shadows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shadows.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use fleetlink_protocol::now_millis;

    use super::*;

    fn make_state(vehicle_id: &str, timestamp: i64) -> VehicleState {
        VehicleState {
            vehicle_id: vehicle_id.to_string(),
            timestamp,
            ..Default::default()
        }
    }

    #[test]
    fn update_and_get() {
        let store = ShadowStore::new();
        let outcome = store.update(make_state("car-001", now_millis()));
        assert_eq!(outcome, UpdateOutcome::Inserted);

        let entry = store.get("car-001").expect("entry should exist");
        assert_eq!(entry.state.vehicle_id, "car-001");
    }

    #[test]
    fn get_missing_returns_none() {
        let store = ShadowStore::new();
        assert!(store.get("unknown").is_none());
    }

    #[test]
    fn stale_update_is_dropped() {
        let store = ShadowStore::new();
        store.update(make_state("car-001", 1000));
        let before = store.get("car-001").unwrap();

        assert_eq!(store.update(make_state("car-001", 500)), UpdateOutcome::Stale);

        let after = store.get("car-001").unwrap();
        assert_eq!(after.state.timestamp, 1000);
        assert_eq!(after.observed_at, before.observed_at);
    }

    #[test]
    fn newer_update_overwrites() {
        let store = ShadowStore::new();
        store.update(make_state("car-001", 1000));
        assert_eq!(store.update(make_state("car-001", 2000)), UpdateOutcome::Replaced);
        assert_eq!(store.get("car-001").unwrap().state.timestamp, 2000);
    }

    #[test]
    fn equal_timestamp_last_writer_wins() {
        let store = ShadowStore::new();
        let mut first = make_state("car-001", 1000);
        first.speed = 1.0;
        let mut second = make_state("car-001", 1000);
        second.speed = 2.0;

        store.update(first);
        assert_eq!(store.update(second), UpdateOutcome::Replaced);
        assert_eq!(store.get("car-001").unwrap().state.speed, 2.0);
    }

    #[test]
    fn converges_to_max_timestamp_in_any_order() {
        let store = ShadowStore::new();
        for ts in [300, 100, 900, 200, 900, 50] {
            store.update(make_state("car-001", ts));
        }
        assert_eq!(store.get("car-001").unwrap().state.timestamp, 900);
    }

    #[test]
    fn returned_entry_is_a_copy() {
        let store = ShadowStore::new();
        store.update(make_state("car-001", 1000));

        let mut entry = store.get("car-001").unwrap();
        entry.state.timestamp = 0;
        assert_eq!(store.get("car-001").unwrap().state.timestamp, 1000);
    }

    #[test]
    fn all_returns_every_tracked_vehicle() {
        let store = ShadowStore::new();
        let now = now_millis();
        store.update(make_state("car-001", now));
        store.update(make_state("car-002", now));
        store.update(make_state("car-003", now));
        store.remove("car-003");

        let all = store.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all["car-001"].state.timestamp, now);
        assert!(all.contains_key("car-002"));
    }

    #[test]
    fn all_snapshot_is_decoupled_from_store() {
        let store = ShadowStore::new();
        store.update(make_state("car-001", 1000));

        let snapshot = store.all();
        store.update(make_state("car-001", 2000));
        store.update(make_state("car-002", 2000));
        store.remove("car-001");

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["car-001"].state.timestamp, 1000);
    }

    #[test]
    fn active_vehicles_excludes_backdated_entries() {
        let store = ShadowStore::new();
        store.update(make_state("car-001", now_millis()));

        // Current producer timestamp, but not observed for ten minutes.
        store.shadows.write().insert(
            "car-old".to_string(),
            ShadowEntry {
                state: make_state("car-old", now_millis()),
                observed_at: Utc::now() - TimeDelta::minutes(10),
            },
        );

        let active = store.active_vehicles(Duration::from_secs(60));
        assert_eq!(active, HashSet::from(["car-001".to_string()]));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn huge_window_includes_everything() {
        let store = ShadowStore::new();
        store.update(make_state("car-001", 1));
        assert_eq!(store.active_vehicles(Duration::MAX).len(), 1);
    }

    #[test]
    fn remove_deletes_entry_and_is_idempotent() {
        let store = ShadowStore::new();
        store.update(make_state("car-001", now_millis()));

        assert!(store.remove("car-001"));
        assert!(store.get("car-001").is_none());
        assert!(!store.remove("car-001"));
        assert!(!store.remove("never-seen"));
        assert!(store.is_empty());
    }

    #[test]
    fn empty_vehicle_id_is_stored_as_given() {
        let store = ShadowStore::new();
        store.update(make_state("", 1));
        assert!(store.get("").is_some());
    }

    #[test]
    fn concurrent_updates_converge_to_latest() {
        let store = Arc::new(ShadowStore::new());

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..500 {
                        let ts = i * 8 + worker;
                        store.update(make_state("car-001", ts));
                        store.update(make_state(&format!("car-{worker}"), ts));
                        let _ = store.get("car-001");
                        let _ = store.active_vehicles(Duration::from_secs(5));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get("car-001").unwrap().state.timestamp, 499 * 8 + 7);
        for worker in 0..8 {
            let id = format!("car-{worker}");
            assert_eq!(store.get(&id).unwrap().state.timestamp, 499 * 8 + worker);
        }
    }
}
