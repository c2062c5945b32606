//! Booking domain module (event-sourced).
//!
//! A `Booking` records a confirmed allocation of rooms to a guest. It owns
//! the rooms it reserved from the package inventory until cancelled.

pub mod booking;

pub use booking::{
    Booking, BookingCancelled, BookingCommand, BookingConfirmed, BookingEvent, BookingId,
    BookingPaid, BookingStatus, CancelBooking, ConfirmBooking, MarkPaid, MarkReminderSent,
    ReminderSent,
};
