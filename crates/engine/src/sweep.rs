//! Periodic background sweep.
//!
//! A low-frequency loop (default period: one day) that re-runs offer
//! re-evaluation across every known package and sends due trip reminders.
//! It compensates for offers that expire with no intervening request to
//! trigger re-evaluation; the sweep has no timeout of its own beyond its
//! period.

use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{error, info};

use wayfare_events::{EventBus, EventEnvelope};
use wayfare_infra::EventStore;

use crate::booking_service::BookingService;
use crate::coordinator::OfferCoordinator;

/// Default sweep period: once a day.
pub const SWEEP_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Summary of one sweep pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub offers_expired: usize,
    pub offer_issued: bool,
    pub reminders_sent: usize,
}

/// Runs the re-evaluation + reminder pass, on demand or on a timer.
pub struct Sweeper<S, B> {
    coordinator: Arc<OfferCoordinator<S, B>>,
    bookings: Arc<BookingService<S, B>>,
}

impl<S, B> Sweeper<S, B>
where
    S: EventStore + 'static,
    B: EventBus<EventEnvelope<JsonValue>> + 'static,
{
    pub fn new(
        coordinator: Arc<OfferCoordinator<S, B>>,
        bookings: Arc<BookingService<S, B>>,
    ) -> Self {
        Self {
            coordinator,
            bookings,
        }
    }

    /// One full pass: re-evaluate every package, then send due reminders.
    pub fn run_once(&self) -> SweepReport {
        let outcome = self.coordinator.reevaluate_all();

        let reminders_sent = match self.bookings.send_due_reminders() {
            Ok(count) => count,
            Err(e) => {
                error!(error = %e, "reminder pass failed");
                0
            }
        };

        let report = SweepReport {
            offers_expired: outcome.expired.len(),
            offer_issued: outcome.offered.is_some(),
            reminders_sent,
        };
        info!(?report, "sweep pass complete");
        report
    }

    /// Run the sweep on a background thread every `period`.
    ///
    /// The thread wakes early only to shut down; dropping or calling
    /// [`SweeperHandle::stop`] ends the loop.
    pub fn spawn(self, period: Duration) -> SweeperHandle {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = std::thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(period) {
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        self.run_once();
                    }
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        SweeperHandle {
            stop_tx,
            handle: Some(handle),
        }
    }
}

/// Handle to a running background sweep.
pub struct SweeperHandle {
    stop_tx: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the loop and wait for the thread to finish.
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{guest, harness, sold_out_package};
    use chrono::Duration as ChronoDuration;

    #[test]
    fn sweep_expires_stale_offers_and_advances_the_queue() {
        let h = harness();
        let (package_id, booking_id) = sold_out_package(&h, 1);
        let a = guest(&h, "a@example.com");
        let b = guest(&h, "b@example.com");

        h.engine.coordinator.join_queue(package_id, a).unwrap();
        h.clock.advance(ChronoDuration::minutes(1));
        h.engine.coordinator.join_queue(package_id, b).unwrap();
        h.engine.bookings.cancel(booking_id).unwrap();

        h.clock.advance(ChronoDuration::hours(24) + ChronoDuration::minutes(1));

        let sweeper = Sweeper::new(h.engine.coordinator.clone(), h.engine.bookings.clone());
        let report = sweeper.run_once();

        assert_eq!(report.offers_expired, 1);
        assert!(report.offer_issued);
        assert_eq!(report.reminders_sent, 0);
    }

    #[test]
    fn sweep_with_nothing_to_do_reports_a_noop() {
        let h = harness();
        let _ = sold_out_package(&h, 1);

        let sweeper = Sweeper::new(h.engine.coordinator.clone(), h.engine.bookings.clone());
        let report = sweeper.run_once();
        assert_eq!(report, SweepReport::default());
    }

    #[test]
    fn background_sweeper_shuts_down_cleanly() {
        let h = harness();
        let sweeper = Sweeper::new(h.engine.coordinator.clone(), h.engine.bookings.clone());

        let handle = sweeper.spawn(Duration::from_secs(3600));
        handle.stop();
    }
}
