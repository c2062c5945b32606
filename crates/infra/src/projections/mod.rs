//! Projection implementations (read model builders).
//!
//! Projections consume domain events and build query-optimized read models.
//! All projections are:
//! - **Rebuildable**: can be reconstructed from the event stream
//! - **Idempotent**: safe for at-least-once delivery (cursor per stream)
//!
//! The reservation engine also applies committed events inline (under the
//! per-package lock) so its precondition checks always see their own writes;
//! the idempotent cursors make the overlapping bus deliveries harmless.

pub mod bookings;
pub mod package_availability;
pub mod waitlist_overview;

pub use bookings::{BookingRecord, BookingsProjection, BookingsProjectionError};
pub use package_availability::{
    AvailabilityProjectionError, PackageAvailability, PackageAvailabilityProjection,
};
pub use waitlist_overview::{
    OverviewEntry, WaitlistOverview, WaitlistOverviewProjection, WaitlistProjectionError,
};
