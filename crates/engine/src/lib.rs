//! Reservation offer engine.
//!
//! The policy layer of the booking back-end: waiting-list admission
//! ([`OfferCoordinator`]), the booking trigger surface ([`BookingService`]),
//! the per-package serialization discipline ([`PackageLocks`]) and the
//! periodic background sweep ([`Sweeper`]). External collaborators (email
//! transport, identity) are consumed through the [`Notifier`] and
//! [`ContactDirectory`] traits.

pub mod booking_service;
pub mod contact;
pub mod coordinator;
pub mod error;
pub mod locks;
pub mod notifier;
pub mod read_models;
pub mod sweep;

#[cfg(test)]
pub(crate) mod testkit;

use std::sync::Arc;

use chrono::Duration;
use serde_json::Value as JsonValue;

use wayfare_core::Clock;
use wayfare_events::{EventBus, EventEnvelope};
use wayfare_infra::{CommandDispatcher, EventStore};

pub use booking_service::{BookingService, FUTURE_BOOKING_CAP, NewPackage, REMINDER_LEAD_DAYS};
pub use contact::{ContactDirectory, InMemoryContactDirectory};
pub use coordinator::{OFFER_WINDOW_HOURS, OfferCoordinator, ReevaluationOutcome};
pub use error::EngineError;
pub use locks::PackageLocks;
pub use notifier::{
    FailingNotifier, LoggingNotifier, Notification, Notifier, NotifyError, RecordingNotifier,
};
pub use read_models::{AvailabilityReadModel, BookingsReadModel, ReadModels, WaitlistReadModel};
pub use sweep::{SWEEP_PERIOD, SweepReport, Sweeper, SweeperHandle};

/// Composition root: the engine wired over one event store and bus.
pub struct ReservationEngine<S, B> {
    pub coordinator: Arc<OfferCoordinator<S, B>>,
    pub bookings: Arc<BookingService<S, B>>,
    pub read_models: ReadModels,
}

impl<S, B> ReservationEngine<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        store: Arc<S>,
        bus: Arc<B>,
        notifier: Arc<dyn Notifier>,
        contacts: Arc<dyn ContactDirectory>,
        clock: Arc<dyn Clock>,
        offer_window: Duration,
    ) -> Self {
        let locks = Arc::new(PackageLocks::new());
        let read_models = ReadModels::in_memory();
        let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), bus));

        let coordinator = Arc::new(OfferCoordinator::new(
            store.clone(),
            dispatcher.clone(),
            locks.clone(),
            read_models.clone(),
            notifier.clone(),
            contacts.clone(),
            clock.clone(),
            offer_window,
        ));

        let bookings = Arc::new(BookingService::new(
            store,
            dispatcher,
            locks,
            read_models.clone(),
            coordinator.clone(),
            notifier,
            contacts,
            clock,
        ));

        Self {
            coordinator,
            bookings,
            read_models,
        }
    }

    /// The engine with the standard 24-hour offer window.
    pub fn with_default_window(
        store: Arc<S>,
        bus: Arc<B>,
        notifier: Arc<dyn Notifier>,
        contacts: Arc<dyn ContactDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            store,
            bus,
            notifier,
            contacts,
            clock,
            Duration::hours(OFFER_WINDOW_HOURS),
        )
    }
}
