//! Versioned, optimistically-concurrent storage for key slot metadata.
//!
//! Two replicas racing to rotate the same slot must not both generate and
//! commit key material for the same rotation. The store hands back an
//! opaque, store-wide `version` with every read; a write must present the
//! version it read, and is rejected (not merged, not retried internally)
//! if the store has moved on. Callers treat rejection as
//! [`ParsecError::VersionMismatch`] and re-read before deciding whether to
//! yield or retry.

use crate::error::ParsecError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Which of the two alternating positions a slot occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotPosition {
    A,
    B,
}

impl SlotPosition {
    pub fn other(self) -> Self {
        match self {
            SlotPosition::A => SlotPosition::B,
            SlotPosition::B => SlotPosition::A,
        }
    }
}

/// Persisted metadata for one key slot. The signer keeps the key material
/// itself in the key provider; this store only tracks rotation timing and
/// position so replicas can coordinate without sharing key material.
#[derive(Debug, Clone, PartialEq)]
pub struct KeySlot {
    pub position: SlotPosition,
    pub namespace: String,
    pub key_provider_id: String,
    pub preparing_at: Option<DateTime<Utc>>,
    pub rotation_completed_at: Option<DateTime<Utc>>,
}

impl KeySlot {
    pub fn new(position: SlotPosition, namespace: impl Into<String>, key_provider_id: impl Into<String>) -> Self {
        Self {
            position,
            namespace: namespace.into(),
            key_provider_id: key_provider_id.into(),
            preparing_at: None,
            rotation_completed_at: None,
        }
    }

    /// A slot committed at `rotation_completed_at = t` is valid over
    /// `[t, t + key_ttl)`: a right-open interval, so `t + key_ttl` exactly
    /// is already expired.
    pub fn is_expired(&self, key_ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        match self.rotation_completed_at {
            Some(completed) => now >= completed + key_ttl,
            None => false,
        }
    }

    /// In-grace strictly before `t + grace_period`; at or after that
    /// instant the slot is past-grace.
    pub fn is_in_grace(&self, grace_period: chrono::Duration, now: DateTime<Utc>) -> bool {
        match self.rotation_completed_at {
            Some(completed) => now < completed + grace_period,
            None => false,
        }
    }

    pub fn is_rotation_eligible(
        &self,
        key_ttl: chrono::Duration,
        rotation_threshold: chrono::Duration,
        now: DateTime<Utc>,
    ) -> bool {
        match self.rotation_completed_at {
            Some(completed) => now >= completed + key_ttl - rotation_threshold,
            None => false,
        }
    }
}

/// An opaque, store-wide version stamp. Two reads of the same slot in the
/// same store state return equal versions; any write that succeeds bumps
/// it for the whole store, not just the written slot, matching the
/// store-wide optimistic concurrency the design calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version(pub u64);

/// Versioned compare-and-swap storage for [`KeySlot`]s.
pub trait SlotStore: Send + Sync {
    /// Reads a slot by `(namespace, key_provider_id, position)`, along with
    /// the version the read was made at. Returns `None` for the slot if it
    /// has never been written, but still returns a valid version so a
    /// first `compare_and_swap` has something to present.
    fn read(
        &self,
        namespace: &str,
        key_provider_id: &str,
        position: SlotPosition,
    ) -> (Option<KeySlot>, Version);

    /// Writes `slot` iff the store's current version still matches
    /// `expected_version`. On success returns the new version; on mismatch
    /// returns [`ParsecError::VersionMismatch`] without applying the write.
    fn compare_and_swap(
        &self,
        slot: KeySlot,
        expected_version: Version,
    ) -> Result<Version, ParsecError>;
}

#[derive(Debug, Default)]
struct State {
    version: u64,
    slots: HashMap<(String, String, SlotPosition), KeySlot>,
}

/// An in-process [`SlotStore`] guarded by a plain `Mutex` — all operations
/// are synchronous, so there's no reason to pay for an async-aware lock.
#[derive(Debug, Default)]
pub struct InMemorySlotStore {
    state: Mutex<State>,
}

impl InMemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SlotStore for InMemorySlotStore {
    fn read(
        &self,
        namespace: &str,
        key_provider_id: &str,
        position: SlotPosition,
    ) -> (Option<KeySlot>, Version) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let key = (namespace.to_string(), key_provider_id.to_string(), position);
        (state.slots.get(&key).cloned(), Version(state.version))
    }

    fn compare_and_swap(
        &self,
        slot: KeySlot,
        expected_version: Version,
    ) -> Result<Version, ParsecError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.version != expected_version.0 {
            return Err(ParsecError::VersionMismatch);
        }
        let key = (slot.namespace.clone(), slot.key_provider_id.clone(), slot.position);
        state.slots.insert(key, slot);
        state.version += 1;
        Ok(Version(state.version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(minute)
    }

    #[test]
    fn preparing_at_and_rotation_completed_at_never_decrease() {
        let store = InMemorySlotStore::new();
        let (_, v0) = store.read("ns", "kp", SlotPosition::A);

        let mut slot = KeySlot::new(SlotPosition::A, "ns", "kp");
        slot.preparing_at = Some(t(0));
        let v1 = store.compare_and_swap(slot.clone(), v0).unwrap();

        slot.rotation_completed_at = Some(t(1));
        let v2 = store.compare_and_swap(slot, v1).unwrap();
        assert!(v2 > v1);

        let (read_back, _) = store.read("ns", "kp", SlotPosition::A);
        let read_back = read_back.unwrap();
        assert_eq!(read_back.preparing_at, Some(t(0)));
        assert_eq!(read_back.rotation_completed_at, Some(t(1)));
    }

    #[test]
    fn compare_and_swap_rejects_stale_version() {
        let store = InMemorySlotStore::new();
        let (_, v0) = store.read("ns", "kp", SlotPosition::A);
        let slot = KeySlot::new(SlotPosition::A, "ns", "kp");
        store.compare_and_swap(slot.clone(), v0).unwrap();

        // v0 is now stale; a second writer presenting it must be rejected.
        let result = store.compare_and_swap(slot, v0);
        assert!(matches!(result, Err(ParsecError::VersionMismatch)));
    }

    #[test]
    fn racing_writers_exactly_one_succeeds() {
        let store = InMemorySlotStore::new();
        let (_, v0) = store.read("ns", "kp", SlotPosition::A);

        let mut slot_a = KeySlot::new(SlotPosition::A, "ns", "kp");
        slot_a.preparing_at = Some(t(0));
        let mut slot_b = slot_a.clone();
        slot_b.preparing_at = Some(t(0));

        let first = store.compare_and_swap(slot_a, v0);
        let second = store.compare_and_swap(slot_b, v0);

        assert!(first.is_ok());
        assert!(matches!(second, Err(ParsecError::VersionMismatch)));
    }

    #[test]
    fn expiry_boundary_is_right_open() {
        let slot = KeySlot {
            rotation_completed_at: Some(t(0)),
            ..KeySlot::new(SlotPosition::A, "ns", "kp")
        };
        let key_ttl = chrono::Duration::minutes(30);

        assert!(!slot.is_expired(key_ttl, t(29)));
        assert!(slot.is_expired(key_ttl, t(30)));
    }

    #[test]
    fn grace_boundary_is_past_grace_at_exact_instant() {
        let slot = KeySlot {
            rotation_completed_at: Some(t(0)),
            ..KeySlot::new(SlotPosition::A, "ns", "kp")
        };
        let grace = chrono::Duration::minutes(2);

        assert!(slot.is_in_grace(grace, t(2) - chrono::Duration::seconds(1)));
        assert!(!slot.is_in_grace(grace, t(2)));
    }

    #[test]
    fn read_of_unwritten_slot_returns_none_with_valid_version() {
        let store = InMemorySlotStore::new();
        let (slot, version) = store.read("ns", "kp", SlotPosition::A);
        assert!(slot.is_none());
        assert_eq!(version, Version(0));
    }
}
