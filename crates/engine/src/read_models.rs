//! Read-model bundle for the single-process deployment.
//!
//! The engine applies committed events to these projections inline, under
//! the per-package lock, so its precondition checks always see their own
//! writes. The same envelopes also arrive through the event bus; the
//! projections' idempotent cursors make the overlap harmless.

use std::sync::Arc;

use tracing::error;

use wayfare_booking::BookingId;
use wayfare_infra::InMemoryKeyValueStore;
use wayfare_infra::StoredEvent;
use wayfare_infra::projections::{
    BookingRecord, BookingsProjection, PackageAvailability, PackageAvailabilityProjection,
    WaitlistOverview, WaitlistOverviewProjection,
};
use wayfare_inventory::PackageId;

pub type AvailabilityReadModel =
    PackageAvailabilityProjection<Arc<InMemoryKeyValueStore<PackageId, PackageAvailability>>>;
pub type BookingsReadModel =
    BookingsProjection<Arc<InMemoryKeyValueStore<BookingId, BookingRecord>>>;
pub type WaitlistReadModel =
    WaitlistOverviewProjection<Arc<InMemoryKeyValueStore<PackageId, WaitlistOverview>>>;

/// The engine's query side: availability roster, bookings index, waiting-list
/// overview.
#[derive(Clone)]
pub struct ReadModels {
    pub availability: Arc<AvailabilityReadModel>,
    pub bookings: Arc<BookingsReadModel>,
    pub waitlist: Arc<WaitlistReadModel>,
}

impl ReadModels {
    pub fn in_memory() -> Self {
        Self {
            availability: Arc::new(PackageAvailabilityProjection::new(Arc::new(
                InMemoryKeyValueStore::new(),
            ))),
            bookings: Arc::new(BookingsProjection::new(Arc::new(InMemoryKeyValueStore::new()))),
            waitlist: Arc::new(WaitlistOverviewProjection::new(Arc::new(
                InMemoryKeyValueStore::new(),
            ))),
        }
    }

    /// Apply freshly committed events to every projection.
    ///
    /// Projection failures are logged, not propagated: read models are
    /// disposable and rebuildable, and the write side has already committed.
    pub fn apply_committed(&self, committed: &[StoredEvent]) {
        for stored in committed {
            let envelope = stored.to_envelope();
            if let Err(e) = self.availability.apply_envelope(&envelope) {
                error!(error = %e, "availability projection rejected an envelope");
            }
            if let Err(e) = self.bookings.apply_envelope(&envelope) {
                error!(error = %e, "bookings projection rejected an envelope");
            }
            if let Err(e) = self.waitlist.apply_envelope(&envelope) {
                error!(error = %e, "waitlist projection rejected an envelope");
            }
        }
    }
}
