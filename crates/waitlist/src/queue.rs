use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use wayfare_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use wayfare_events::Event;
use wayfare_inventory::PackageId;

/// Stream type identifier for waiting-list aggregates.
pub const AGGREGATE_TYPE: &str = "waitlist.queue";

/// Waiting-list identifier.
///
/// Derived deterministically from the package id (UUIDv5), so the list's
/// stream is addressable without a lookup table: one list per package.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaitingListId(pub AggregateId);

impl WaitingListId {
    pub fn for_package(package_id: PackageId) -> Self {
        let name = format!("wayfare:waitlist:{}", package_id.0.as_uuid());
        Self(AggregateId::from_uuid(Uuid::new_v5(
            &Uuid::NAMESPACE_URL,
            name.as_bytes(),
        )))
    }
}

impl core::fmt::Display for WaitingListId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Per-entry state machine.
///
/// `Waiting` and `Offered` are the active states held by the aggregate;
/// the terminal states correspond to removal events and are reported back
/// to callers when an entry leaves the list.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryState {
    Waiting,
    Offered { since: DateTime<Utc> },
    Booked,
    Expired,
    Withdrawn,
}

/// A guest's standing position in the waiting list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub entry_no: u64,
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
    pub offered_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    pub fn state(&self) -> EntryState {
        match self.offered_at {
            Some(since) => EntryState::Offered { since },
            None => EntryState::Waiting,
        }
    }

    /// FIFO ordering key: enqueue time ascending, ties broken by entry
    /// number (insertion order), which guarantees a total order.
    fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.joined_at, self.entry_no)
    }
}

/// Aggregate root: WaitingList (one per travel package).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingList {
    id: WaitingListId,
    package_id: Option<PackageId>,
    entries: Vec<QueueEntry>,
    next_entry_no: u64,
    version: u64,
}

impl WaitingList {
    /// Create an empty aggregate instance for rehydration.
    ///
    /// A waiting list has no explicit creation step; the first `Join`
    /// initializes it.
    pub fn empty(id: WaitingListId) -> Self {
        Self {
            id,
            package_id: None,
            entries: Vec::new(),
            next_entry_no: 1,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> WaitingListId {
        self.id
    }

    pub fn package_id(&self) -> Option<PackageId> {
        self.package_id
    }

    /// Number of active entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(&self, user_id: UserId) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.user_id == user_id)
    }

    /// Active entries in FIFO order.
    pub fn ordered_entries(&self) -> Vec<&QueueEntry> {
        let mut ordered: Vec<&QueueEntry> = self.entries.iter().collect();
        ordered.sort_by_key(|e| e.order_key());
        ordered
    }

    /// The earliest active entry, if any.
    pub fn peek_next(&self) -> Option<&QueueEntry> {
        self.entries.iter().min_by_key(|e| e.order_key())
    }

    /// The single entry holding an unconsumed offer, if any.
    pub fn outstanding_offer(&self) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.offered_at.is_some())
    }

    /// The guest's current state, if they hold an active entry.
    pub fn entry_state(&self, user_id: UserId) -> Option<EntryState> {
        self.find(user_id).map(QueueEntry::state)
    }

    /// 1-based rank among active entries: the number of entries strictly
    /// ahead of the guest's own, plus one.
    pub fn position(&self, user_id: UserId) -> Option<usize> {
        let own = self.find(user_id)?;
        let ahead = self
            .entries
            .iter()
            .filter(|e| e.order_key() < own.order_key())
            .count();
        Some(ahead + 1)
    }

    /// Display-only estimate of when a room might free up for this guest:
    /// two days per queue position. Never a promise.
    pub fn estimated_available_date(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let position = self.position(user_id)?;
        Some(now + Duration::days(2) * position as i32)
    }
}

impl AggregateRoot for WaitingList {
    type Id = WaitingListId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: Join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    pub package_id: PackageId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Leave (voluntary withdrawal, allowed at any time).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leave {
    pub package_id: PackageId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: IssueOffer (grant the time-boxed offer to the queue head).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueOffer {
    pub package_id: PackageId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ExpireOffer.
///
/// The window decision belongs to the coordinator; the aggregate only
/// validates that there is an offer to expire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireOffer {
    pub package_id: PackageId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConvertToBooking (the guest booked; queueing is superseded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertToBooking {
    pub package_id: PackageId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitingListCommand {
    Join(Join),
    Leave(Leave),
    IssueOffer(IssueOffer),
    ExpireOffer(ExpireOffer),
    ConvertToBooking(ConvertToBooking),
}

/// Event: EntryJoined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryJoined {
    pub package_id: PackageId,
    pub user_id: UserId,
    pub entry_no: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EntryWithdrawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryWithdrawn {
    pub package_id: PackageId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OfferIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferIssued {
    pub package_id: PackageId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OfferExpired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferExpired {
    pub package_id: PackageId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EntryBooked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryBooked {
    pub package_id: PackageId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitingListEvent {
    EntryJoined(EntryJoined),
    EntryWithdrawn(EntryWithdrawn),
    OfferIssued(OfferIssued),
    OfferExpired(OfferExpired),
    EntryBooked(EntryBooked),
}

impl Event for WaitingListEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WaitingListEvent::EntryJoined(_) => "waitlist.entry.joined",
            WaitingListEvent::EntryWithdrawn(_) => "waitlist.entry.withdrawn",
            WaitingListEvent::OfferIssued(_) => "waitlist.offer.issued",
            WaitingListEvent::OfferExpired(_) => "waitlist.offer.expired",
            WaitingListEvent::EntryBooked(_) => "waitlist.entry.booked",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WaitingListEvent::EntryJoined(e) => e.occurred_at,
            WaitingListEvent::EntryWithdrawn(e) => e.occurred_at,
            WaitingListEvent::OfferIssued(e) => e.occurred_at,
            WaitingListEvent::OfferExpired(e) => e.occurred_at,
            WaitingListEvent::EntryBooked(e) => e.occurred_at,
        }
    }
}

impl Aggregate for WaitingList {
    type Command = WaitingListCommand;
    type Event = WaitingListEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            WaitingListEvent::EntryJoined(e) => {
                self.package_id = Some(e.package_id);
                self.entries.push(QueueEntry {
                    entry_no: e.entry_no,
                    user_id: e.user_id,
                    joined_at: e.occurred_at,
                    offered_at: None,
                });
                self.next_entry_no = e.entry_no + 1;
            }
            WaitingListEvent::EntryWithdrawn(e) => {
                self.entries.retain(|q| q.user_id != e.user_id);
            }
            WaitingListEvent::OfferIssued(e) => {
                if let Some(entry) = self.entries.iter_mut().find(|q| q.user_id == e.user_id) {
                    entry.offered_at = Some(e.occurred_at);
                }
            }
            WaitingListEvent::OfferExpired(e) => {
                self.entries.retain(|q| q.user_id != e.user_id);
            }
            WaitingListEvent::EntryBooked(e) => {
                self.entries.retain(|q| q.user_id != e.user_id);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            WaitingListCommand::Join(cmd) => self.handle_join(cmd),
            WaitingListCommand::Leave(cmd) => self.handle_leave(cmd),
            WaitingListCommand::IssueOffer(cmd) => self.handle_issue_offer(cmd),
            WaitingListCommand::ExpireOffer(cmd) => self.handle_expire_offer(cmd),
            WaitingListCommand::ConvertToBooking(cmd) => self.handle_convert(cmd),
        }
    }
}

impl WaitingList {
    fn ensure_package(&self, package_id: PackageId) -> Result<(), DomainError> {
        if WaitingListId::for_package(package_id) != self.id {
            return Err(DomainError::invariant("package_id mismatch"));
        }
        if let Some(own) = self.package_id {
            if own != package_id {
                return Err(DomainError::invariant("package_id mismatch"));
            }
        }
        Ok(())
    }

    fn handle_join(&self, cmd: &Join) -> Result<Vec<WaitingListEvent>, DomainError> {
        self.ensure_package(cmd.package_id)?;

        if self.find(cmd.user_id).is_some() {
            return Err(DomainError::AlreadyQueued);
        }

        Ok(vec![WaitingListEvent::EntryJoined(EntryJoined {
            package_id: cmd.package_id,
            user_id: cmd.user_id,
            entry_no: self.next_entry_no,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_leave(&self, cmd: &Leave) -> Result<Vec<WaitingListEvent>, DomainError> {
        self.ensure_package(cmd.package_id)?;

        if self.find(cmd.user_id).is_none() {
            return Err(DomainError::not_found());
        }

        Ok(vec![WaitingListEvent::EntryWithdrawn(EntryWithdrawn {
            package_id: cmd.package_id,
            user_id: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_issue_offer(&self, cmd: &IssueOffer) -> Result<Vec<WaitingListEvent>, DomainError> {
        self.ensure_package(cmd.package_id)?;

        let entry = self.find(cmd.user_id).ok_or(DomainError::NotFound)?;

        if let Some(offered) = self.outstanding_offer() {
            return Err(DomainError::invariant(format!(
                "an offer is already outstanding (entry {})",
                offered.entry_no
            )));
        }

        // Offers advance strictly in FIFO order.
        let head = self.peek_next().ok_or(DomainError::NotFound)?;
        if head.user_id != entry.user_id {
            return Err(DomainError::invariant(
                "offer must go to the earliest waiting entry",
            ));
        }

        Ok(vec![WaitingListEvent::OfferIssued(OfferIssued {
            package_id: cmd.package_id,
            user_id: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_expire_offer(&self, cmd: &ExpireOffer) -> Result<Vec<WaitingListEvent>, DomainError> {
        self.ensure_package(cmd.package_id)?;

        let entry = self.find(cmd.user_id).ok_or(DomainError::NotFound)?;
        if entry.offered_at.is_none() {
            return Err(DomainError::invariant(
                "cannot expire an entry with no outstanding offer",
            ));
        }

        Ok(vec![WaitingListEvent::OfferExpired(OfferExpired {
            package_id: cmd.package_id,
            user_id: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_convert(&self, cmd: &ConvertToBooking) -> Result<Vec<WaitingListEvent>, DomainError> {
        self.ensure_package(cmd.package_id)?;

        // Valid from both Waiting and Offered: booking supersedes queueing.
        if self.find(cmd.user_id).is_none() {
            return Err(DomainError::not_found());
        }

        Ok(vec![WaitingListEvent::EntryBooked(EntryBooked {
            package_id: cmd.package_id,
            user_id: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use wayfare_events::execute;

    fn test_package_id() -> PackageId {
        PackageId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn list_for(package_id: PackageId) -> WaitingList {
        WaitingList::empty(WaitingListId::for_package(package_id))
    }

    fn join(list: &mut WaitingList, package_id: PackageId, user: UserId, at: DateTime<Utc>) {
        execute(
            list,
            &WaitingListCommand::Join(Join {
                package_id,
                user_id: user,
                occurred_at: at,
            }),
        )
        .unwrap();
    }

    #[test]
    fn waiting_list_id_is_deterministic_per_package() {
        let package_id = test_package_id();
        assert_eq!(
            WaitingListId::for_package(package_id),
            WaitingListId::for_package(package_id)
        );
        assert_ne!(
            WaitingListId::for_package(package_id),
            WaitingListId::for_package(test_package_id())
        );
    }

    #[test]
    fn join_appends_in_fifo_order() {
        let package_id = test_package_id();
        let mut list = list_for(package_id);
        let t0 = test_time();
        let (a, b) = (UserId::new(), UserId::new());

        join(&mut list, package_id, a, t0);
        join(&mut list, package_id, b, t0 + Duration::minutes(1));

        assert_eq!(list.len(), 2);
        assert_eq!(list.peek_next().unwrap().user_id, a);
        assert_eq!(list.position(a), Some(1));
        assert_eq!(list.position(b), Some(2));
    }

    #[test]
    fn equal_timestamps_fall_back_to_insertion_order() {
        let package_id = test_package_id();
        let mut list = list_for(package_id);
        let t0 = test_time();
        let (a, b) = (UserId::new(), UserId::new());

        join(&mut list, package_id, a, t0);
        join(&mut list, package_id, b, t0);

        assert_eq!(list.peek_next().unwrap().user_id, a);
        assert_eq!(list.position(a), Some(1));
        assert_eq!(list.position(b), Some(2));
    }

    #[test]
    fn duplicate_join_is_rejected() {
        let package_id = test_package_id();
        let mut list = list_for(package_id);
        let user = UserId::new();

        join(&mut list, package_id, user, test_time());

        let err = list
            .handle(&WaitingListCommand::Join(Join {
                package_id,
                user_id: user,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::AlreadyQueued);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn leave_removes_the_entry() {
        let package_id = test_package_id();
        let mut list = list_for(package_id);
        let (a, b) = (UserId::new(), UserId::new());
        let t0 = test_time();

        join(&mut list, package_id, a, t0);
        join(&mut list, package_id, b, t0 + Duration::minutes(1));

        execute(
            &mut list,
            &WaitingListCommand::Leave(Leave {
                package_id,
                user_id: a,
                occurred_at: t0 + Duration::minutes(2),
            }),
        )
        .unwrap();

        assert_eq!(list.len(), 1);
        assert_eq!(list.position(b), Some(1));
        assert_eq!(list.entry_state(a), None);
    }

    #[test]
    fn offer_goes_to_the_head_only() {
        let package_id = test_package_id();
        let mut list = list_for(package_id);
        let (a, b) = (UserId::new(), UserId::new());
        let t0 = test_time();

        join(&mut list, package_id, a, t0);
        join(&mut list, package_id, b, t0 + Duration::minutes(1));

        let err = list
            .handle(&WaitingListCommand::IssueOffer(IssueOffer {
                package_id,
                user_id: b,
                occurred_at: t0 + Duration::minutes(2),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        execute(
            &mut list,
            &WaitingListCommand::IssueOffer(IssueOffer {
                package_id,
                user_id: a,
                occurred_at: t0 + Duration::minutes(2),
            }),
        )
        .unwrap();
        assert_eq!(list.outstanding_offer().unwrap().user_id, a);
        assert!(matches!(
            list.entry_state(a),
            Some(EntryState::Offered { .. })
        ));
    }

    #[test]
    fn at_most_one_offer_is_outstanding() {
        let package_id = test_package_id();
        let mut list = list_for(package_id);
        let (a, b) = (UserId::new(), UserId::new());
        let t0 = test_time();

        join(&mut list, package_id, a, t0);
        join(&mut list, package_id, b, t0 + Duration::minutes(1));

        execute(
            &mut list,
            &WaitingListCommand::IssueOffer(IssueOffer {
                package_id,
                user_id: a,
                occurred_at: t0 + Duration::minutes(2),
            }),
        )
        .unwrap();

        let err = list
            .handle(&WaitingListCommand::IssueOffer(IssueOffer {
                package_id,
                user_id: b,
                occurred_at: t0 + Duration::minutes(3),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn expired_offer_clears_the_way_for_the_next_entry() {
        let package_id = test_package_id();
        let mut list = list_for(package_id);
        let (a, b) = (UserId::new(), UserId::new());
        let t0 = test_time();

        join(&mut list, package_id, a, t0);
        join(&mut list, package_id, b, t0 + Duration::minutes(1));

        execute(
            &mut list,
            &WaitingListCommand::IssueOffer(IssueOffer {
                package_id,
                user_id: a,
                occurred_at: t0 + Duration::minutes(2),
            }),
        )
        .unwrap();
        execute(
            &mut list,
            &WaitingListCommand::ExpireOffer(ExpireOffer {
                package_id,
                user_id: a,
                occurred_at: t0 + Duration::hours(25),
            }),
        )
        .unwrap();

        assert_eq!(list.len(), 1);
        assert!(list.outstanding_offer().is_none());
        assert_eq!(list.peek_next().unwrap().user_id, b);
    }

    #[test]
    fn expire_without_offer_is_rejected() {
        let package_id = test_package_id();
        let mut list = list_for(package_id);
        let a = UserId::new();

        join(&mut list, package_id, a, test_time());

        let err = list
            .handle(&WaitingListCommand::ExpireOffer(ExpireOffer {
                package_id,
                user_id: a,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn booking_converts_waiting_and_offered_entries() {
        let package_id = test_package_id();
        let mut list = list_for(package_id);
        let (a, b) = (UserId::new(), UserId::new());
        let t0 = test_time();

        join(&mut list, package_id, a, t0);
        join(&mut list, package_id, b, t0 + Duration::minutes(1));

        execute(
            &mut list,
            &WaitingListCommand::IssueOffer(IssueOffer {
                package_id,
                user_id: a,
                occurred_at: t0 + Duration::minutes(2),
            }),
        )
        .unwrap();

        // Offered entry converts.
        execute(
            &mut list,
            &WaitingListCommand::ConvertToBooking(ConvertToBooking {
                package_id,
                user_id: a,
                occurred_at: t0 + Duration::minutes(3),
            }),
        )
        .unwrap();
        // Waiting entry converts too (booked through the normal flow).
        execute(
            &mut list,
            &WaitingListCommand::ConvertToBooking(ConvertToBooking {
                package_id,
                user_id: b,
                occurred_at: t0 + Duration::minutes(4),
            }),
        )
        .unwrap();

        assert!(list.is_empty());
    }

    #[test]
    fn estimated_availability_scales_with_position() {
        let package_id = test_package_id();
        let mut list = list_for(package_id);
        let (a, b) = (UserId::new(), UserId::new());
        let t0 = test_time();

        join(&mut list, package_id, a, t0);
        join(&mut list, package_id, b, t0 + Duration::minutes(1));

        let now = t0 + Duration::hours(1);
        assert_eq!(
            list.estimated_available_date(a, now),
            Some(now + Duration::days(2))
        );
        assert_eq!(
            list.estimated_available_date(b, now),
            Some(now + Duration::days(4))
        );
        assert_eq!(list.estimated_available_date(UserId::new(), now), None);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let package_id = test_package_id();
        let mut list = list_for(package_id);
        let a = UserId::new();
        join(&mut list, package_id, a, test_time());

        let cmd = WaitingListCommand::IssueOffer(IssueOffer {
            package_id,
            user_id: a,
            occurred_at: test_time(),
        });

        let before = list.clone();
        let events1 = list.handle(&cmd).unwrap();
        let events2 = list.handle(&cmd).unwrap();

        assert_eq!(list, before);
        assert_eq!(events1, events2);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: whatever the join timestamps look like (including
        /// duplicates), active entries occupy positions 1..=n exactly once.
        #[test]
        fn positions_form_a_contiguous_ranking(
            offsets in prop::collection::vec(0i64..1000, 1..20)
        ) {
            let package_id = test_package_id();
            let mut list = list_for(package_id);
            let base = test_time();

            let mut users = Vec::new();
            for offset in offsets {
                let user = UserId::new();
                join(&mut list, package_id, user, base + Duration::seconds(offset));
                users.push(user);
            }

            let mut positions: Vec<usize> = users
                .iter()
                .map(|u| list.position(*u).unwrap())
                .collect();
            positions.sort_unstable();
            let expected: Vec<usize> = (1..=users.len()).collect();
            prop_assert_eq!(positions, expected);
        }
    }
}
