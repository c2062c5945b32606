use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use wayfare_core::AggregateId;
use wayfare_events::EventEnvelope;
use wayfare_inventory::{PackageId, TravelPackageEvent, package::AGGREGATE_TYPE};

use crate::read_model::KeyValueStore;

/// Queryable package read model: room counts and booking windows per package.
///
/// Doubles as the package roster the periodic sweep iterates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageAvailability {
    pub package_id: PackageId,
    pub destination: String,
    pub country: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub capacity: u32,
    pub available: u32,
    pub last_booking_date: Option<DateTime<Utc>>,
    pub cancellation_deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum AvailabilityProjectionError {
    #[error("failed to deserialize package event: {0}")]
    Deserialize(String),

    #[error("stream mismatch: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Package availability projection.
///
/// Consumes published envelopes (JSON payloads) and maintains a read model
/// keyed by package. Read models are disposable and rebuildable from the
/// event stream.
#[derive(Debug)]
pub struct PackageAvailabilityProjection<S>
where
    S: KeyValueStore<PackageId, PackageAvailability>,
{
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl<S> PackageAvailabilityProjection<S>
where
    S: KeyValueStore<PackageId, PackageAvailability>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// Query the read model for one package.
    pub fn get(&self, package_id: &PackageId) -> Option<PackageAvailability> {
        self.store.get(package_id)
    }

    /// List all known packages (disposable read model).
    pub fn list(&self) -> Vec<PackageAvailability> {
        self.store.list()
    }

    /// Apply a published envelope into the projection.
    ///
    /// - Ignores envelopes from other aggregate types
    /// - Enforces monotonic sequence per aggregate stream
    /// - Idempotent for at-least-once delivery (replays <= cursor are ignored)
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), AvailabilityProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if let Ok(mut cursors) = self.cursors.write() {
            let last = *cursors.get(&aggregate_id).unwrap_or(&0);

            if seq == 0 {
                return Err(AvailabilityProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(AvailabilityProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let ev: TravelPackageEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| AvailabilityProjectionError::Deserialize(e.to_string()))?;

            let package_id = match &ev {
                TravelPackageEvent::PackageCreated(e) => e.package_id,
                TravelPackageEvent::RoomsReserved(e) => e.package_id,
                TravelPackageEvent::RoomsReleased(e) => e.package_id,
                TravelPackageEvent::CapacityAdjusted(e) => e.package_id,
            };

            if package_id.0 != aggregate_id {
                return Err(AvailabilityProjectionError::StreamMismatch(
                    "event package_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match ev {
                TravelPackageEvent::PackageCreated(e) => {
                    self.store.upsert(
                        e.package_id,
                        PackageAvailability {
                            package_id: e.package_id,
                            destination: e.destination,
                            country: e.country,
                            start_date: e.start_date,
                            end_date: e.end_date,
                            capacity: e.capacity,
                            available: e.capacity,
                            last_booking_date: e.last_booking_date,
                            cancellation_deadline: e.cancellation_deadline,
                        },
                    );
                }
                TravelPackageEvent::RoomsReserved(e) => {
                    if let Some(mut rm) = self.store.get(&e.package_id) {
                        rm.available = rm.available.saturating_sub(e.rooms);
                        self.store.upsert(e.package_id, rm);
                    }
                }
                TravelPackageEvent::RoomsReleased(e) => {
                    if let Some(mut rm) = self.store.get(&e.package_id) {
                        rm.available = (rm.available + e.rooms).min(rm.capacity);
                        self.store.upsert(e.package_id, rm);
                    }
                }
                TravelPackageEvent::CapacityAdjusted(e) => {
                    if let Some(mut rm) = self.store.get(&e.package_id) {
                        rm.capacity = (rm.capacity as i64 + e.delta).max(0) as u32;
                        rm.available = (rm.available as i64 + e.delta).max(0) as u32;
                        self.store.upsert(e.package_id, rm);
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
    ) -> Result<(), AvailabilityProjectionError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }
        self.store.clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        // Deterministic replay order: aggregate, sequence.
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid().as_bytes(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
