//! The offer coordinator: waiting-list admission policy.
//!
//! When a room frees up, the coordinator decides who gets offered it, for
//! how long, and what happens when they do not act. Offers are issued
//! strictly one at a time in FIFO order; an unexpired offer blocks the queue
//! even when more capacity exists.
//!
//! All decisions happen under the package's mutex; the offer notification is
//! dispatched after the lock is released and its outcome never rolls back
//! the recorded transition.

use chrono::Duration;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use tracing::{error, info, warn};

use wayfare_core::{Clock, DomainError, UserId};
use wayfare_events::{EventBus, EventEnvelope};
use wayfare_infra::{CommandDispatcher, EventStore, load_aggregate};
use wayfare_inventory::{PackageId, TravelPackage};
use wayfare_waitlist::{
    EntryState, ExpireOffer, IssueOffer, Join, Leave, WaitingList, WaitingListCommand,
    WaitingListId, queue,
};

use crate::contact::ContactDirectory;
use crate::error::EngineError;
use crate::locks::PackageLocks;
use crate::notifier::Notifier;
use crate::read_models::ReadModels;

/// Default offer window: how long an entrant has to act on an offer.
pub const OFFER_WINDOW_HOURS: i64 = 24;

/// Rooms a caller can actually book right now: current availability minus
/// the room earmarked for an outstanding offer held by someone else.
pub(crate) fn usable_rooms(
    package: &TravelPackage,
    list: &WaitingList,
    for_user: Option<UserId>,
) -> u32 {
    let earmarked = match list.outstanding_offer() {
        Some(entry) if Some(entry.user_id) != for_user => 1,
        _ => 0,
    };
    package.available().saturating_sub(earmarked)
}

/// What a re-evaluation did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReevaluationOutcome {
    /// Entries removed because their offer window elapsed (cascade order).
    pub expired: Vec<UserId>,
    /// The entrant who received a fresh offer, if any.
    pub offered: Option<UserId>,
}

impl ReevaluationOutcome {
    pub fn is_noop(&self) -> bool {
        self.expired.is_empty() && self.offered.is_none()
    }
}

/// Policy engine for waiting-list admission.
pub struct OfferCoordinator<S, B> {
    store: Arc<S>,
    dispatcher: Arc<CommandDispatcher<Arc<S>, Arc<B>>>,
    locks: Arc<PackageLocks>,
    read_models: ReadModels,
    notifier: Arc<dyn Notifier>,
    contacts: Arc<dyn ContactDirectory>,
    clock: Arc<dyn Clock>,
    offer_window: Duration,
}

impl<S, B> OfferCoordinator<S, B>
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
        notifier: Arc<dyn Notifier>,
        contacts: Arc<dyn ContactDirectory>,
        clock: Arc<dyn Clock>,
        offer_window: Duration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            locks,
            read_models,
            notifier,
            contacts,
            clock,
            offer_window,
        }
    }

    pub fn offer_window(&self) -> Duration {
        self.offer_window
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

    fn dispatch_list_command(
        &self,
        package_id: PackageId,
        command: WaitingListCommand,
    ) -> Result<(), EngineError> {
        let list_id = WaitingListId::for_package(package_id);
        let committed = self.dispatcher.dispatch(
            list_id.0,
            queue::AGGREGATE_TYPE,
            command,
            |_| WaitingList::empty(list_id),
        )?;
        self.read_models.apply_committed(&committed);
        Ok(())
    }

    /// Idempotent check-and-advance for one package.
    ///
    /// Under the package lock:
    /// 1. an outstanding offer on a sold-out package is a consistency
    ///    violation (the offered room must stay earmarked until consumed);
    /// 2. elapsed offers expire, cascading to the next earliest entry;
    /// 3. with capacity free and no offer outstanding, the earliest active
    ///    entry gets the one new offer.
    ///
    /// Calling this again with no intervening state change does nothing.
    pub fn reevaluate(&self, package_id: PackageId) -> Result<ReevaluationOutcome, EngineError> {
        let lock = self.locks.for_package(package_id);
        let guard = lock
            .lock()
            .map_err(|_| EngineError::Infra("package lock poisoned".to_string()))?;

        let now = self.clock.now();
        let package = self.load_package(package_id)?;
        let mut outcome = ReevaluationOutcome::default();

        loop {
            let list = self.load_list(package_id)?;

            let Some(offer) = list.outstanding_offer() else {
                if package.is_sold_out() {
                    break;
                }
                let Some(next) = list.peek_next() else {
                    break;
                };
                let user = next.user_id;
                self.dispatch_list_command(
                    package_id,
                    WaitingListCommand::IssueOffer(IssueOffer {
                        package_id,
                        user_id: user,
                        occurred_at: now,
                    }),
                )?;
                info!(%package_id, user = %user, "offer issued");
                outcome.offered = Some(user);
                break;
            };

            if package.is_sold_out() {
                error!(
                    %package_id,
                    user = %offer.user_id,
                    "outstanding offer on a sold-out package; per-package serialization is broken"
                );
                return Err(DomainError::consistency(
                    "outstanding offer on a package with zero availability",
                )
                .into());
            }

            let Some(since) = offer.offered_at else {
                break;
            };

            if now - since > self.offer_window {
                let user = offer.user_id;
                self.dispatch_list_command(
                    package_id,
                    WaitingListCommand::ExpireOffer(ExpireOffer {
                        package_id,
                        user_id: user,
                        occurred_at: now,
                    }),
                )?;
                info!(%package_id, user = %user, "offer expired, advancing queue");
                outcome.expired.push(user);
                continue;
            }

            // Live offer outstanding: nothing to do.
            break;
        }

        drop(guard);

        // Notify after the state transition is durably recorded and the lock
        // released; delivery is best-effort.
        if let Some(user) = outcome.offered {
            self.notify_offer(&package, user);
        }

        Ok(outcome)
    }

    /// Trigger: a booking for this package was cancelled.
    pub fn on_booking_cancelled(
        &self,
        package_id: PackageId,
    ) -> Result<ReevaluationOutcome, EngineError> {
        self.reevaluate(package_id)
    }

    /// Trigger: the package's capacity changed.
    pub fn on_capacity_changed(
        &self,
        package_id: PackageId,
    ) -> Result<ReevaluationOutcome, EngineError> {
        self.reevaluate(package_id)
    }

    /// Join the waiting list for a sold-out package.
    ///
    /// Returns the guest's 1-based queue position.
    pub fn join_queue(
        &self,
        package_id: PackageId,
        user_id: UserId,
    ) -> Result<usize, EngineError> {
        let lock = self.locks.for_package(package_id);
        let _guard = lock
            .lock()
            .map_err(|_| EngineError::Infra("package lock poisoned".to_string()))?;

        let now = self.clock.now();
        let package = self.load_package(package_id)?;
        let list = self.load_list(package_id)?;

        if usable_rooms(&package, &list, Some(user_id)) > 0 {
            return Err(DomainError::validation(
                "package still has rooms available; book instead of queueing",
            )
            .into());
        }

        self.dispatch_list_command(
            package_id,
            WaitingListCommand::Join(Join {
                package_id,
                user_id,
                occurred_at: now,
            }),
        )?;

        let list = self.load_list(package_id)?;
        let position = list.position(user_id).unwrap_or(list.len());
        info!(%package_id, user = %user_id, position, "joined waiting list");
        Ok(position)
    }

    /// Withdraw from the waiting list, from any state.
    ///
    /// If the withdrawn entry held the outstanding offer, the freed room is
    /// immediately re-offered to the next entrant.
    pub fn leave_queue(&self, package_id: PackageId, user_id: UserId) -> Result<(), EngineError> {
        let lock = self.locks.for_package(package_id);
        let guard = lock
            .lock()
            .map_err(|_| EngineError::Infra("package lock poisoned".to_string()))?;

        let now = self.clock.now();
        let list = self.load_list(package_id)?;
        let held_offer = matches!(
            list.entry_state(user_id),
            Some(EntryState::Offered { .. })
        );

        self.dispatch_list_command(
            package_id,
            WaitingListCommand::Leave(Leave {
                package_id,
                user_id,
                occurred_at: now,
            }),
        )?;
        info!(%package_id, user = %user_id, "left waiting list");

        drop(guard);

        if held_offer {
            if let Err(e) = self.reevaluate(package_id) {
                warn!(%package_id, error = %e, "re-evaluation after withdrawal failed");
            }
        }

        Ok(())
    }

    /// The guest's current 1-based queue position, from the aggregate.
    pub fn queue_position(
        &self,
        package_id: PackageId,
        user_id: UserId,
    ) -> Result<Option<usize>, EngineError> {
        let list = self.load_list(package_id)?;
        Ok(list.position(user_id))
    }

    /// Re-run the admission check across every known package.
    ///
    /// Compensates for offers that expire with no intervening request.
    /// Per-package failures are logged and do not stop the sweep.
    pub fn reevaluate_all(&self) -> ReevaluationOutcome {
        let mut total = ReevaluationOutcome::default();
        for package in self.read_models.availability.list() {
            match self.reevaluate(package.package_id) {
                Ok(outcome) => {
                    total.expired.extend(outcome.expired);
                    if outcome.offered.is_some() {
                        // At most one offer per package; across packages we
                        // keep the last for the summary.
                        total.offered = outcome.offered;
                    }
                }
                Err(e) => {
                    error!(package_id = %package.package_id, error = %e, "sweep re-evaluation failed");
                }
            }
        }
        total
    }

    fn notify_offer(&self, package: &TravelPackage, user: UserId) {
        let Some(address) = self.contacts.email_of(user) else {
            warn!(user = %user, "no contact address on file; offer notification skipped");
            return;
        };

        let subject = "A room is now available!";
        let body = format!(
            "Good news! A room is now available for the trip to {}, {}.\n\n\
             Please note: the room is reserved for you for the next {} hours.",
            package.destination(),
            package.country(),
            self.offer_window.num_hours()
        );

        if let Err(e) = self.notifier.notify(&address, subject, &body) {
            // Fire-and-forget: the offer stands; the next sweep is the retry.
            warn!(user = %user, error = %e, "offer notification failed");
        }
    }
}
