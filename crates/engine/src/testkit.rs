//! Shared wiring for engine tests: in-memory stack, manual clock, recording
//! notifier.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::Value as JsonValue;

use wayfare_core::{Clock, ManualClock, UserId};
use wayfare_events::{EventEnvelope, InMemoryEventBus};
use wayfare_infra::InMemoryEventStore;
use wayfare_inventory::PackageId;

use crate::booking_service::NewPackage;
use crate::contact::InMemoryContactDirectory;
use crate::notifier::{Notifier, RecordingNotifier};
use crate::{OFFER_WINDOW_HOURS, ReservationEngine};

pub(crate) type TestStore = InMemoryEventStore;
pub(crate) type TestBus = InMemoryEventBus<EventEnvelope<JsonValue>>;

pub(crate) struct Harness {
    pub engine: ReservationEngine<TestStore, TestBus>,
    pub store: Arc<TestStore>,
    pub bus: Arc<TestBus>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub contacts: Arc<InMemoryContactDirectory>,
}

pub(crate) fn harness() -> Harness {
    let notifier = Arc::new(RecordingNotifier::new());
    harness_with(notifier.clone(), Some(notifier))
}

pub(crate) fn harness_with_notifier(notifier: Arc<dyn Notifier>) -> Harness {
    harness_with(notifier, None)
}

fn harness_with(
    notifier: Arc<dyn Notifier>,
    recording: Option<Arc<RecordingNotifier>>,
) -> Harness {
    wayfare_observability::init();

    let store = Arc::new(InMemoryEventStore::new());
    let bus: Arc<TestBus> = Arc::new(InMemoryEventBus::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let contacts = Arc::new(InMemoryContactDirectory::new());

    let engine = ReservationEngine::new(
        store.clone(),
        bus.clone(),
        notifier,
        contacts.clone(),
        clock.clone(),
        Duration::hours(OFFER_WINDOW_HOURS),
    );

    Harness {
        engine,
        store,
        bus,
        clock,
        notifier: recording.unwrap_or_default(),
        contacts,
    }
}

pub(crate) fn guest(h: &Harness, email: &str) -> UserId {
    let user = UserId::new();
    h.contacts.register(user, email);
    user
}

pub(crate) fn package(h: &Harness, capacity: u32) -> PackageId {
    package_with(h, capacity, |_| {})
}

pub(crate) fn package_with(
    h: &Harness,
    capacity: u32,
    customize: impl FnOnce(&mut NewPackage),
) -> PackageId {
    let mut new_package = NewPackage {
        destination: "Santorini".to_string(),
        country: "Greece".to_string(),
        start_date: h.clock.now() + Duration::days(30),
        end_date: h.clock.now() + Duration::days(37),
        capacity,
        last_booking_date: None,
        cancellation_deadline: None,
    };
    customize(&mut new_package);
    h.engine.bookings.create_package(new_package).unwrap()
}

/// A package whose rooms are fully booked by a filler guest.
///
/// Returns the package and the filler's booking (cancel it to free rooms).
pub(crate) fn sold_out_package(
    h: &Harness,
    capacity: u32,
) -> (PackageId, wayfare_booking::BookingId) {
    let package_id = package(h, capacity);
    let filler = guest(h, "filler@example.com");
    let booking_id = h.engine.bookings.book(package_id, filler, capacity).unwrap();
    (package_id, booking_id)
}
