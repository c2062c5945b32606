use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use wayfare_core::{AggregateId, UserId};
use wayfare_events::EventEnvelope;
use wayfare_inventory::PackageId;
use wayfare_waitlist::{WaitingListEvent, queue::AGGREGATE_TYPE};

use crate::read_model::KeyValueStore;

/// One active waiting-list entry as seen by the read side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverviewEntry {
    pub user_id: UserId,
    pub entry_no: u64,
    pub joined_at: DateTime<Utc>,
    pub offered_at: Option<DateTime<Utc>>,
}

impl OverviewEntry {
    fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.joined_at, self.entry_no)
    }
}

/// Per-package waiting-list read model: entry count, per-guest position and
/// the display-only estimated availability date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitlistOverview {
    pub package_id: PackageId,
    pub entries: Vec<OverviewEntry>,
}

impl WaitlistOverview {
    pub fn waiting_count(&self) -> usize {
        self.entries.len()
    }

    /// Active entries in FIFO order.
    pub fn ordered(&self) -> Vec<&OverviewEntry> {
        let mut ordered: Vec<&OverviewEntry> = self.entries.iter().collect();
        ordered.sort_by_key(|e| e.order_key());
        ordered
    }

    /// 1-based rank among active entries.
    pub fn position(&self, user_id: UserId) -> Option<usize> {
        let own = self.entries.iter().find(|e| e.user_id == user_id)?;
        let ahead = self
            .entries
            .iter()
            .filter(|e| e.order_key() < own.order_key())
            .count();
        Some(ahead + 1)
    }

    /// Display-only estimate: two days per queue position. Never a promise.
    pub fn estimated_available_date(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let position = self.position(user_id)?;
        Some(now + Duration::days(2) * position as i32)
    }
}

#[derive(Debug, Error)]
pub enum WaitlistProjectionError {
    #[error("failed to deserialize waiting-list event: {0}")]
    Deserialize(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Waiting-list overview projection (admin stats + guest-facing position).
#[derive(Debug)]
pub struct WaitlistOverviewProjection<S>
where
    S: KeyValueStore<PackageId, WaitlistOverview>,
{
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl<S> WaitlistOverviewProjection<S>
where
    S: KeyValueStore<PackageId, WaitlistOverview>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, package_id: &PackageId) -> Option<WaitlistOverview> {
        self.store.get(package_id)
    }

    pub fn waiting_count(&self, package_id: &PackageId) -> usize {
        self.store
            .get(package_id)
            .map(|o| o.waiting_count())
            .unwrap_or(0)
    }

    pub fn position(&self, package_id: &PackageId, user_id: UserId) -> Option<usize> {
        self.store.get(package_id)?.position(user_id)
    }

    /// Apply a published envelope into the projection.
    ///
    /// - Ignores envelopes from other aggregate types
    /// - Enforces monotonic sequence per aggregate stream
    /// - Idempotent for at-least-once delivery (replays <= cursor are ignored)
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), WaitlistProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if let Ok(mut cursors) = self.cursors.write() {
            let last = *cursors.get(&aggregate_id).unwrap_or(&0);

            if seq == 0 {
                return Err(WaitlistProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(WaitlistProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let ev: WaitingListEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| WaitlistProjectionError::Deserialize(e.to_string()))?;

            match ev {
                WaitingListEvent::EntryJoined(e) => {
                    let mut overview = self.store.get(&e.package_id).unwrap_or(WaitlistOverview {
                        package_id: e.package_id,
                        entries: Vec::new(),
                    });
                    overview.entries.push(OverviewEntry {
                        user_id: e.user_id,
                        entry_no: e.entry_no,
                        joined_at: e.occurred_at,
                        offered_at: None,
                    });
                    self.store.upsert(e.package_id, overview);
                }
                WaitingListEvent::EntryWithdrawn(e) => {
                    if let Some(mut overview) = self.store.get(&e.package_id) {
                        overview.entries.retain(|q| q.user_id != e.user_id);
                        self.store.upsert(e.package_id, overview);
                    }
                }
                WaitingListEvent::OfferIssued(e) => {
                    if let Some(mut overview) = self.store.get(&e.package_id) {
                        if let Some(entry) =
                            overview.entries.iter_mut().find(|q| q.user_id == e.user_id)
                        {
                            entry.offered_at = Some(e.occurred_at);
                        }
                        self.store.upsert(e.package_id, overview);
                    }
                }
                WaitingListEvent::OfferExpired(e) => {
                    if let Some(mut overview) = self.store.get(&e.package_id) {
                        overview.entries.retain(|q| q.user_id != e.user_id);
                        self.store.upsert(e.package_id, overview);
                    }
                }
                WaitingListEvent::EntryBooked(e) => {
                    if let Some(mut overview) = self.store.get(&e.package_id) {
                        overview.entries.retain(|q| q.user_id != e.user_id);
                        self.store.upsert(e.package_id, overview);
                    }
                }
            }

            // Advance cursor after successful apply.
            cursors.insert(aggregate_id, seq);
        }

        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), WaitlistProjectionError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }
        self.store.clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid().as_bytes(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
