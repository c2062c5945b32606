//! Booking trigger surface: book, cancel, pay, plus the admin capacity and
//! catalog hooks the surrounding screens invoke.
//!
//! Precondition checks run under the package's mutex in a fixed order; the
//! first failure wins and is surfaced with its reason code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

use tracing::{error, info, warn};

use wayfare_booking::{
    Booking, BookingCommand, BookingId, BookingStatus, CancelBooking, ConfirmBooking, MarkPaid,
    MarkReminderSent, booking as booking_mod,
};
use wayfare_core::{AggregateId, Clock, DomainError, UserId};
use wayfare_events::{EventBus, EventEnvelope};
use wayfare_infra::{CommandDispatcher, DispatchError, EventStore, load_aggregate};
use wayfare_inventory::{
    AdjustCapacity, CreatePackage, PackageId, ReleaseRooms, ReserveRooms, TravelPackage,
    TravelPackageCommand, package as package_mod,
};
use wayfare_waitlist::{ConvertToBooking, WaitingList, WaitingListCommand, WaitingListId, queue};

use crate::contact::ContactDirectory;
use crate::coordinator::{OfferCoordinator, usable_rooms};
use crate::error::EngineError;
use crate::locks::PackageLocks;
use crate::notifier::Notifier;
use crate::read_models::ReadModels;

/// Cap on a guest's simultaneous bookings for future departures.
pub const FUTURE_BOOKING_CAP: u32 = 3;

/// Trip reminders go out this many days before departure.
pub const REMINDER_LEAD_DAYS: i64 = 5;

/// Catalog input for a new travel package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPackage {
    pub destination: String,
    pub country: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub capacity: u32,
    pub last_booking_date: Option<DateTime<Utc>>,
    pub cancellation_deadline: Option<DateTime<Utc>>,
}

/// Booking ledger glue: converts guest intent into inventory, booking and
/// waiting-list transitions.
pub struct BookingService<S, B> {
    store: Arc<S>,
    dispatcher: Arc<CommandDispatcher<Arc<S>, Arc<B>>>,
    locks: Arc<PackageLocks>,
    read_models: ReadModels,
    coordinator: Arc<OfferCoordinator<S, B>>,
    notifier: Arc<dyn Notifier>,
    contacts: Arc<dyn ContactDirectory>,
    clock: Arc<dyn Clock>,
}

impl<S, B> BookingService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        dispatcher: Arc<CommandDispatcher<Arc<S>, Arc<B>>>,
        locks: Arc<PackageLocks>,
        read_models: ReadModels,
        coordinator: Arc<OfferCoordinator<S, B>>,
        notifier: Arc<dyn Notifier>,
        contacts: Arc<dyn ContactDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            locks,
            read_models,
            coordinator,
            notifier,
            contacts,
            clock,
        }
    }

    fn load_package(&self, package_id: PackageId) -> Result<TravelPackage, EngineError> {
        let (package, _) = load_aggregate(&self.store, package_id.0, |id| {
            TravelPackage::empty(PackageId::new(id))
        })?;
        if !package.is_created() {
            return Err(DomainError::not_found().into());
        }
        Ok(package)
    }

    fn load_list(&self, package_id: PackageId) -> Result<WaitingList, EngineError> {
        let list_id = WaitingListId::for_package(package_id);
        let (list, _) =
            load_aggregate(&self.store, list_id.0, |_| WaitingList::empty(list_id))?;
        Ok(list)
    }

    fn dispatch_package_command(
        &self,
        package_id: PackageId,
        command: TravelPackageCommand,
    ) -> Result<(), DispatchError> {
        let committed = self.dispatcher.dispatch(
            package_id.0,
            package_mod::AGGREGATE_TYPE,
            command,
            |id| TravelPackage::empty(PackageId::new(id)),
        )?;
        self.read_models.apply_committed(&committed);
        Ok(())
    }

    fn dispatch_booking_command(
        &self,
        booking_id: BookingId,
        command: BookingCommand,
    ) -> Result<(), DispatchError> {
        let committed = self.dispatcher.dispatch(
            booking_id.0,
            booking_mod::AGGREGATE_TYPE,
            command,
            |id| Booking::empty(BookingId::new(id)),
        )?;
        self.read_models.apply_committed(&committed);
        Ok(())
    }

    /// Register a new travel package (admin catalog hook).
    pub fn create_package(&self, new_package: NewPackage) -> Result<PackageId, EngineError> {
        let package_id = PackageId::new(AggregateId::new());
        let now = self.clock.now();

        self.dispatch_package_command(
            package_id,
            TravelPackageCommand::CreatePackage(CreatePackage {
                package_id,
                destination: new_package.destination,
                country: new_package.country,
                start_date: new_package.start_date,
                end_date: new_package.end_date,
                capacity: new_package.capacity,
                last_booking_date: new_package.last_booking_date,
                cancellation_deadline: new_package.cancellation_deadline,
                occurred_at: now,
            }),
        )?;

        info!(%package_id, "package created");
        Ok(package_id)
    }

    /// Change a package's total capacity (admin hook).
    ///
    /// A capacity increase frees rooms, so it triggers queue re-evaluation.
    pub fn adjust_capacity(&self, package_id: PackageId, delta: i64) -> Result<(), EngineError> {
        {
            let lock = self.locks.for_package(package_id);
            let _guard = lock
                .lock()
                .map_err(|_| EngineError::Infra("package lock poisoned".to_string()))?;

            self.dispatch_package_command(
                package_id,
                TravelPackageCommand::AdjustCapacity(AdjustCapacity {
                    package_id,
                    delta,
                    occurred_at: self.clock.now(),
                }),
            )?;
            info!(%package_id, delta, "capacity adjusted");
        }

        if delta > 0 {
            self.coordinator.on_capacity_changed(package_id)?;
        }
        Ok(())
    }

    /// Book `rooms` rooms of a package for a guest.
    ///
    /// Preconditions, in order, first failure wins:
    /// 1. the guest holds no active booking for this package;
    /// 2. the package's last booking date (if set) has not passed;
    /// 3. the guest is under the future-departure booking cap;
    /// 4. the rooms fit the usable availability (the room earmarked for an
    ///    outstanding offer held by someone else is not bookable).
    ///
    /// On success the guest's waiting-list entry, if any, is removed:
    /// booking supersedes queueing.
    pub fn book(
        &self,
        package_id: PackageId,
        user_id: UserId,
        rooms: u32,
    ) -> Result<BookingId, EngineError> {
        let lock = self.locks.for_package(package_id);
        let _guard = lock
            .lock()
            .map_err(|_| EngineError::Infra("package lock poisoned".to_string()))?;

        let now = self.clock.now();
        let package = self.load_package(package_id)?;
        let list = self.load_list(package_id)?;

        // (1) no duplicate bookings
        if self
            .read_models
            .bookings
            .active_booking_for(user_id, package_id)
            .is_some()
        {
            return Err(DomainError::DuplicateBooking.into());
        }

        // (2) booking window
        if !package.booking_open(now) {
            return Err(DomainError::deadline_passed("last booking date has passed").into());
        }

        // (3) future-departure cap
        let future_bookings = self
            .read_models
            .bookings
            .active_for_user(user_id)
            .into_iter()
            .filter(|b| {
                self.read_models
                    .availability
                    .get(&b.package_id)
                    .map(|p| p.start_date > now)
                    .unwrap_or(false)
            })
            .count() as u32;
        if future_bookings >= FUTURE_BOOKING_CAP {
            return Err(DomainError::BookingCapReached {
                cap: FUTURE_BOOKING_CAP,
            }
            .into());
        }

        // (4) capacity, net of the room earmarked for someone else's offer
        let usable = usable_rooms(&package, &list, Some(user_id));
        if rooms > usable {
            return Err(DomainError::InsufficientCapacity {
                requested: rooms,
                available: usable,
            }
            .into());
        }

        self.dispatch_package_command(
            package_id,
            TravelPackageCommand::ReserveRooms(ReserveRooms {
                package_id,
                rooms,
                occurred_at: now,
            }),
        )?;

        let booking_id = BookingId::new(AggregateId::new());
        if let Err(e) = self.dispatch_booking_command(
            booking_id,
            BookingCommand::ConfirmBooking(ConfirmBooking {
                booking_id,
                package_id,
                user_id,
                rooms,
                occurred_at: now,
            }),
        ) {
            // Compensate the reserve so the rooms are not stranded.
            error!(%package_id, user = %user_id, error = ?e, "booking append failed after reserve; releasing rooms");
            if let Err(release_err) = self.dispatch_package_command(
                package_id,
                TravelPackageCommand::ReleaseRooms(ReleaseRooms {
                    package_id,
                    rooms,
                    occurred_at: now,
                }),
            ) {
                error!(%package_id, error = ?release_err, "compensating release failed");
            }
            return Err(e.into());
        }

        // Booking supersedes queueing.
        if list.entry_state(user_id).is_some() {
            let list_id = WaitingListId::for_package(package_id);
            match self.dispatcher.dispatch(
                list_id.0,
                queue::AGGREGATE_TYPE,
                WaitingListCommand::ConvertToBooking(ConvertToBooking {
                    package_id,
                    user_id,
                    occurred_at: now,
                }),
                |_| WaitingList::empty(list_id),
            ) {
                Ok(committed) => self.read_models.apply_committed(&committed),
                Err(e) => {
                    // The booking stands; the stale entry falls out on the
                    // next re-evaluation.
                    warn!(%package_id, user = %user_id, error = ?e, "failed to remove waiting-list entry after booking");
                }
            }
        }

        info!(%package_id, user = %user_id, rooms, %booking_id, "booking confirmed");
        Ok(booking_id)
    }

    /// Cancel a booking, release its rooms and advance the waiting list.
    pub fn cancel(&self, booking_id: BookingId) -> Result<(), EngineError> {
        let (booking, _) = load_aggregate(&self.store, booking_id.0, |id| {
            Booking::empty(BookingId::new(id))
        })?;
        if !booking.is_created() {
            return Err(DomainError::not_found().into());
        }
        let package_id = booking
            .package_id()
            .ok_or_else(|| EngineError::Infra("booking has no package".to_string()))?;

        {
            let lock = self.locks.for_package(package_id);
            let _guard = lock
                .lock()
                .map_err(|_| EngineError::Infra("package lock poisoned".to_string()))?;

            let now = self.clock.now();
            let package = self.load_package(package_id)?;

            if !package.cancellation_open(now) {
                return Err(
                    DomainError::deadline_passed("cancellation deadline has passed").into(),
                );
            }

            self.dispatch_booking_command(
                booking_id,
                BookingCommand::CancelBooking(CancelBooking {
                    booking_id,
                    occurred_at: now,
                }),
            )?;

            if let Err(e) = self.dispatch_package_command(
                package_id,
                TravelPackageCommand::ReleaseRooms(ReleaseRooms {
                    package_id,
                    rooms: booking.rooms(),
                    occurred_at: now,
                }),
            ) {
                if let DispatchError::Domain(DomainError::Consistency(msg)) = &e {
                    error!(%package_id, %booking_id, message = %msg, "release exceeded capacity; per-package serialization is broken");
                }
                return Err(e.into());
            }

            info!(%package_id, %booking_id, rooms = booking.rooms(), "booking cancelled");
        }

        // Freed capacity: hand the room to the queue (lock re-acquired inside).
        self.coordinator.on_booking_cancelled(package_id)?;
        Ok(())
    }

    /// Payment simulation hook: mark an unpaid booking paid.
    pub fn mark_paid(&self, booking_id: BookingId) -> Result<(), EngineError> {
        self.dispatch_booking_command(
            booking_id,
            BookingCommand::MarkPaid(MarkPaid {
                booking_id,
                occurred_at: self.clock.now(),
            }),
        )?;
        info!(%booking_id, "booking paid");
        Ok(())
    }

    /// Send trip reminders for paid bookings departing in exactly
    /// [`REMINDER_LEAD_DAYS`] days. At most one reminder per booking; a
    /// failed delivery stays unmarked and is retried by the next sweep.
    ///
    /// Returns the number of reminders delivered.
    pub fn send_due_reminders(&self) -> Result<usize, EngineError> {
        let now = self.clock.now();
        let target = (now + chrono::Duration::days(REMINDER_LEAD_DAYS)).date_naive();
        let mut delivered = 0;

        for record in self.read_models.bookings.list() {
            if !record.is_active() || record.status != BookingStatus::Paid || record.reminder_sent {
                continue;
            }
            let Some(package) = self.read_models.availability.get(&record.package_id) else {
                continue;
            };
            if package.start_date.date_naive() != target {
                continue;
            }

            let Some(address) = self.contacts.email_of(record.user_id) else {
                warn!(user = %record.user_id, "no contact address on file; reminder skipped");
                continue;
            };

            let subject = format!("Trip reminder: {} days to go", REMINDER_LEAD_DAYS);
            let body = format!(
                "This is a reminder that your trip to {} starts in {} days.\n\n\
                 Start date: {}\nEnd date: {}\nBooking: {}",
                package.destination,
                REMINDER_LEAD_DAYS,
                package.start_date.format("%d/%m/%Y"),
                package.end_date.format("%d/%m/%Y"),
                record.booking_id,
            );

            match self.notifier.notify(&address, &subject, &body) {
                Ok(()) => {
                    self.dispatch_booking_command(
                        record.booking_id,
                        BookingCommand::MarkReminderSent(MarkReminderSent {
                            booking_id: record.booking_id,
                            occurred_at: now,
                        }),
                    )?;
                    delivered += 1;
                }
                Err(e) => {
                    // Left unmarked: the next sweep retries naturally.
                    warn!(booking_id = %record.booking_id, error = %e, "reminder delivery failed");
                }
            }
        }

        Ok(delivered)
    }
}
