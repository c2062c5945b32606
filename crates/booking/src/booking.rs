use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wayfare_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use wayfare_events::Event;
use wayfare_inventory::PackageId;

/// Stream type identifier for booking aggregates.
pub const AGGREGATE_TYPE: &str = "booking.booking";

/// Booking identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(pub AggregateId);

impl BookingId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for BookingId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Booking payment/lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Unpaid,
    Paid,
    Cancelled,
}

/// Aggregate root: Booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    id: BookingId,
    package_id: Option<PackageId>,
    user_id: Option<UserId>,
    rooms: u32,
    status: BookingStatus,
    booked_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    reminder_sent: bool,
    version: u64,
    created: bool,
}

impl Booking {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: BookingId) -> Self {
        Self {
            id,
            package_id: None,
            user_id: None,
            rooms: 0,
            status: BookingStatus::Unpaid,
            booked_at: None,
            paid_at: None,
            reminder_sent: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> BookingId {
        self.id
    }

    pub fn package_id(&self) -> Option<PackageId> {
        self.package_id
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn rooms(&self) -> u32 {
        self.rooms
    }

    pub fn status(&self) -> BookingStatus {
        self.status
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_active(&self) -> bool {
        self.created && self.status != BookingStatus::Cancelled
    }

    pub fn is_paid(&self) -> bool {
        self.status == BookingStatus::Paid
    }

    pub fn reminder_sent(&self) -> bool {
        self.reminder_sent
    }

    pub fn booked_at(&self) -> Option<DateTime<Utc>> {
        self.booked_at
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }
}

impl AggregateRoot for Booking {
    type Id = BookingId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: ConfirmBooking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmBooking {
    pub booking_id: BookingId,
    pub package_id: PackageId,
    pub user_id: UserId,
    pub rooms: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkPaid (payment simulation hook).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPaid {
    pub booking_id: BookingId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkReminderSent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkReminderSent {
    pub booking_id: BookingId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelBooking.
///
/// The cancellation-deadline check lives with the caller, which has the
/// package at hand; the aggregate enforces only its own lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelBooking {
    pub booking_id: BookingId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingCommand {
    ConfirmBooking(ConfirmBooking),
    MarkPaid(MarkPaid),
    MarkReminderSent(MarkReminderSent),
    CancelBooking(CancelBooking),
}

/// Event: BookingConfirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfirmed {
    pub booking_id: BookingId,
    pub package_id: PackageId,
    pub user_id: UserId,
    pub rooms: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BookingPaid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingPaid {
    pub booking_id: BookingId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReminderSent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderSent {
    pub booking_id: BookingId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BookingCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingCancelled {
    pub booking_id: BookingId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingEvent {
    BookingConfirmed(BookingConfirmed),
    BookingPaid(BookingPaid),
    ReminderSent(ReminderSent),
    BookingCancelled(BookingCancelled),
}

impl Event for BookingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BookingEvent::BookingConfirmed(_) => "booking.confirmed",
            BookingEvent::BookingPaid(_) => "booking.paid",
            BookingEvent::ReminderSent(_) => "booking.reminder_sent",
            BookingEvent::BookingCancelled(_) => "booking.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BookingEvent::BookingConfirmed(e) => e.occurred_at,
            BookingEvent::BookingPaid(e) => e.occurred_at,
            BookingEvent::ReminderSent(e) => e.occurred_at,
            BookingEvent::BookingCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Booking {
    type Command = BookingCommand;
    type Event = BookingEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BookingEvent::BookingConfirmed(e) => {
                self.id = e.booking_id;
                self.package_id = Some(e.package_id);
                self.user_id = Some(e.user_id);
                self.rooms = e.rooms;
                self.status = BookingStatus::Unpaid;
                self.booked_at = Some(e.occurred_at);
                self.created = true;
            }
            BookingEvent::BookingPaid(e) => {
                self.status = BookingStatus::Paid;
                self.paid_at = Some(e.occurred_at);
            }
            BookingEvent::ReminderSent(_) => {
                self.reminder_sent = true;
            }
            BookingEvent::BookingCancelled(_) => {
                self.status = BookingStatus::Cancelled;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BookingCommand::ConfirmBooking(cmd) => self.handle_confirm(cmd),
            BookingCommand::MarkPaid(cmd) => self.handle_mark_paid(cmd),
            BookingCommand::MarkReminderSent(cmd) => self.handle_mark_reminder_sent(cmd),
            BookingCommand::CancelBooking(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Booking {
    fn ensure_booking_id(&self, booking_id: BookingId) -> Result<(), DomainError> {
        if self.id != booking_id {
            return Err(DomainError::invariant("booking_id mismatch"));
        }
        Ok(())
    }

    fn handle_confirm(&self, cmd: &ConfirmBooking) -> Result<Vec<BookingEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("booking already exists"));
        }
        if cmd.rooms == 0 {
            return Err(DomainError::validation("rooms must be positive"));
        }

        Ok(vec![BookingEvent::BookingConfirmed(BookingConfirmed {
            booking_id: cmd.booking_id,
            package_id: cmd.package_id,
            user_id: cmd.user_id,
            rooms: cmd.rooms,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_paid(&self, cmd: &MarkPaid) -> Result<Vec<BookingEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_booking_id(cmd.booking_id)?;

        match self.status {
            BookingStatus::Cancelled => {
                Err(DomainError::invariant("cannot pay a cancelled booking"))
            }
            BookingStatus::Paid => Err(DomainError::invariant("booking already paid")),
            BookingStatus::Unpaid => Ok(vec![BookingEvent::BookingPaid(BookingPaid {
                booking_id: cmd.booking_id,
                occurred_at: cmd.occurred_at,
            })]),
        }
    }

    fn handle_mark_reminder_sent(
        &self,
        cmd: &MarkReminderSent,
    ) -> Result<Vec<BookingEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_booking_id(cmd.booking_id)?;

        if self.status != BookingStatus::Paid {
            return Err(DomainError::invariant(
                "reminders only go to paid bookings",
            ));
        }
        if self.reminder_sent {
            return Err(DomainError::invariant("reminder already sent"));
        }

        Ok(vec![BookingEvent::ReminderSent(ReminderSent {
            booking_id: cmd.booking_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelBooking) -> Result<Vec<BookingEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_booking_id(cmd.booking_id)?;

        if self.status == BookingStatus::Cancelled {
            return Err(DomainError::invariant("booking already cancelled"));
        }

        Ok(vec![BookingEvent::BookingCancelled(BookingCancelled {
            booking_id: cmd.booking_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfare_events::execute;

    fn test_booking_id() -> BookingId {
        BookingId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn confirmed_booking(rooms: u32) -> Booking {
        let id = test_booking_id();
        let mut booking = Booking::empty(id);
        execute(
            &mut booking,
            &BookingCommand::ConfirmBooking(ConfirmBooking {
                booking_id: id,
                package_id: PackageId::new(AggregateId::new()),
                user_id: UserId::new(),
                rooms,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        booking
    }

    #[test]
    fn full_lifecycle_unpaid_to_paid_to_cancelled() {
        let mut booking = confirmed_booking(2);
        let id = booking.id_typed();
        assert_eq!(booking.status(), BookingStatus::Unpaid);
        assert_eq!(booking.rooms(), 2);

        execute(
            &mut booking,
            &BookingCommand::MarkPaid(MarkPaid {
                booking_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(booking.status(), BookingStatus::Paid);
        assert!(booking.paid_at().is_some());

        execute(
            &mut booking,
            &BookingCommand::CancelBooking(CancelBooking {
                booking_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(booking.status(), BookingStatus::Cancelled);
        assert!(!booking.is_active());
    }

    #[test]
    fn confirm_rejects_zero_rooms() {
        let id = test_booking_id();
        let booking = Booking::empty(id);
        let err = booking
            .handle(&BookingCommand::ConfirmBooking(ConfirmBooking {
                booking_id: id,
                package_id: PackageId::new(AggregateId::new()),
                user_id: UserId::new(),
                rooms: 0,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn cannot_cancel_twice() {
        let mut booking = confirmed_booking(1);
        let id = booking.id_typed();

        execute(
            &mut booking,
            &BookingCommand::CancelBooking(CancelBooking {
                booking_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = booking
            .handle(&BookingCommand::CancelBooking(CancelBooking {
                booking_id: id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn cannot_pay_a_cancelled_booking() {
        let mut booking = confirmed_booking(1);
        let id = booking.id_typed();

        execute(
            &mut booking,
            &BookingCommand::CancelBooking(CancelBooking {
                booking_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = booking
            .handle(&BookingCommand::MarkPaid(MarkPaid {
                booking_id: id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn reminder_requires_payment_and_fires_at_most_once() {
        let mut booking = confirmed_booking(1);
        let id = booking.id_typed();

        let err = booking
            .handle(&BookingCommand::MarkReminderSent(MarkReminderSent {
                booking_id: id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        execute(
            &mut booking,
            &BookingCommand::MarkPaid(MarkPaid {
                booking_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        execute(
            &mut booking,
            &BookingCommand::MarkReminderSent(MarkReminderSent {
                booking_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert!(booking.reminder_sent());

        let err = booking
            .handle(&BookingCommand::MarkReminderSent(MarkReminderSent {
                booking_id: id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn version_increments_on_apply() {
        let booking = confirmed_booking(1);
        assert_eq!(booking.version(), 1);
    }
}
