use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use wayfare_booking::{BookingEvent, BookingId, BookingStatus, booking::AGGREGATE_TYPE};
use wayfare_core::{AggregateId, UserId};
use wayfare_events::EventEnvelope;
use wayfare_inventory::PackageId;

use crate::read_model::KeyValueStore;

/// Queryable booking read model.
///
/// Cancelled bookings stay in the store (history); the `active_*` queries
/// filter them out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRecord {
    pub booking_id: BookingId,
    pub package_id: PackageId,
    pub user_id: UserId,
    pub rooms: u32,
    pub status: BookingStatus,
    pub reminder_sent: bool,
    pub booked_at: DateTime<Utc>,
}

impl BookingRecord {
    pub fn is_active(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }
}

#[derive(Debug, Error)]
pub enum BookingsProjectionError {
    #[error("failed to deserialize booking event: {0}")]
    Deserialize(String),

    #[error("stream mismatch: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Bookings projection: all bookings, indexed queries per guest.
///
/// Serves the duplicate-booking and future-bookings-cap checks and the trip
/// reminder sweep.
#[derive(Debug)]
pub struct BookingsProjection<S>
where
    S: KeyValueStore<BookingId, BookingRecord>,
{
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl<S> BookingsProjection<S>
where
    S: KeyValueStore<BookingId, BookingRecord>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, booking_id: &BookingId) -> Option<BookingRecord> {
        self.store.get(booking_id)
    }

    pub fn list(&self) -> Vec<BookingRecord> {
        self.store.list()
    }

    /// All non-cancelled bookings held by a guest.
    pub fn active_for_user(&self, user_id: UserId) -> Vec<BookingRecord> {
        self.store
            .list()
            .into_iter()
            .filter(|b| b.user_id == user_id && b.is_active())
            .collect()
    }

    /// The guest's non-cancelled booking for one package, if any.
    pub fn active_booking_for(
        &self,
        user_id: UserId,
        package_id: PackageId,
    ) -> Option<BookingRecord> {
        self.store
            .list()
            .into_iter()
            .find(|b| b.user_id == user_id && b.package_id == package_id && b.is_active())
    }

    /// Apply a published envelope into the projection.
    ///
    /// - Ignores envelopes from other aggregate types
    /// - Enforces monotonic sequence per aggregate stream
    /// - Idempotent for at-least-once delivery (replays <= cursor are ignored)
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), BookingsProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if let Ok(mut cursors) = self.cursors.write() {
            let last = *cursors.get(&aggregate_id).unwrap_or(&0);

            if seq == 0 {
                return Err(BookingsProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(BookingsProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let ev: BookingEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| BookingsProjectionError::Deserialize(e.to_string()))?;

            let booking_id = match &ev {
                BookingEvent::BookingConfirmed(e) => e.booking_id,
                BookingEvent::BookingPaid(e) => e.booking_id,
                BookingEvent::ReminderSent(e) => e.booking_id,
                BookingEvent::BookingCancelled(e) => e.booking_id,
            };

            if booking_id.0 != aggregate_id {
                return Err(BookingsProjectionError::StreamMismatch(
                    "event booking_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match ev {
                BookingEvent::BookingConfirmed(e) => {
                    self.store.upsert(
                        e.booking_id,
                        BookingRecord {
                            booking_id: e.booking_id,
                            package_id: e.package_id,
                            user_id: e.user_id,
                            rooms: e.rooms,
                            status: BookingStatus::Unpaid,
                            reminder_sent: false,
                            booked_at: e.occurred_at,
                        },
                    );
                }
                BookingEvent::BookingPaid(e) => {
                    if let Some(mut rm) = self.store.get(&e.booking_id) {
                        rm.status = BookingStatus::Paid;
                        self.store.upsert(e.booking_id, rm);
                    }
                }
                BookingEvent::ReminderSent(e) => {
                    if let Some(mut rm) = self.store.get(&e.booking_id) {
                        rm.reminder_sent = true;
                        self.store.upsert(e.booking_id, rm);
                    }
                }
                BookingEvent::BookingCancelled(e) => {
                    if let Some(mut rm) = self.store.get(&e.booking_id) {
                        rm.status = BookingStatus::Cancelled;
                        self.store.upsert(e.booking_id, rm);
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
    ) -> Result<(), BookingsProjectionError> {
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
