use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wayfare_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use wayfare_events::Event;

/// Stream type identifier for travel package aggregates.
pub const AGGREGATE_TYPE: &str = "inventory.package";

/// Travel package identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(pub AggregateId);

impl PackageId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PackageId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: TravelPackage.
///
/// Owns the room counts: `0 <= available <= capacity` at all times, and only
/// reserve/release/adjust events may move them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TravelPackage {
    id: PackageId,
    destination: String,
    country: String,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    capacity: u32,
    available: u32,
    last_booking_date: Option<DateTime<Utc>>,
    cancellation_deadline: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl TravelPackage {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PackageId) -> Self {
        Self {
            id,
            destination: String::new(),
            country: String::new(),
            start_date: DateTime::<Utc>::MIN_UTC,
            end_date: DateTime::<Utc>::MIN_UTC,
            capacity: 0,
            available: 0,
            last_booking_date: None,
            cancellation_deadline: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PackageId {
        self.id
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }

    pub fn end_date(&self) -> DateTime<Utc> {
        self.end_date
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn available(&self) -> u32 {
        self.available
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_sold_out(&self) -> bool {
        self.available == 0
    }

    pub fn last_booking_date(&self) -> Option<DateTime<Utc>> {
        self.last_booking_date
    }

    pub fn cancellation_deadline(&self) -> Option<DateTime<Utc>> {
        self.cancellation_deadline
    }

    /// True while bookings are still accepted (no deadline, or not yet passed).
    pub fn booking_open(&self, now: DateTime<Utc>) -> bool {
        match self.last_booking_date {
            Some(deadline) => now <= deadline,
            None => true,
        }
    }

    /// True while cancellations are still accepted.
    pub fn cancellation_open(&self, now: DateTime<Utc>) -> bool {
        match self.cancellation_deadline {
            Some(deadline) => now <= deadline,
            None => true,
        }
    }
}

impl AggregateRoot for TravelPackage {
    type Id = PackageId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePackage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePackage {
    pub package_id: PackageId,
    pub destination: String,
    pub country: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub capacity: u32,
    pub last_booking_date: Option<DateTime<Utc>>,
    pub cancellation_deadline: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveRooms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveRooms {
    pub package_id: PackageId,
    pub rooms: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseRooms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRooms {
    pub package_id: PackageId,
    pub rooms: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustCapacity (admin capacity change).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustCapacity {
    pub package_id: PackageId,
    pub delta: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TravelPackageCommand {
    CreatePackage(CreatePackage),
    ReserveRooms(ReserveRooms),
    ReleaseRooms(ReleaseRooms),
    AdjustCapacity(AdjustCapacity),
}

/// Event: PackageCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageCreated {
    pub package_id: PackageId,
    pub destination: String,
    pub country: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub capacity: u32,
    pub last_booking_date: Option<DateTime<Utc>>,
    pub cancellation_deadline: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RoomsReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomsReserved {
    pub package_id: PackageId,
    pub rooms: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RoomsReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomsReleased {
    pub package_id: PackageId,
    pub rooms: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CapacityAdjusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityAdjusted {
    pub package_id: PackageId,
    pub delta: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TravelPackageEvent {
    PackageCreated(PackageCreated),
    RoomsReserved(RoomsReserved),
    RoomsReleased(RoomsReleased),
    CapacityAdjusted(CapacityAdjusted),
}

impl Event for TravelPackageEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TravelPackageEvent::PackageCreated(_) => "inventory.package.created",
            TravelPackageEvent::RoomsReserved(_) => "inventory.package.rooms_reserved",
            TravelPackageEvent::RoomsReleased(_) => "inventory.package.rooms_released",
            TravelPackageEvent::CapacityAdjusted(_) => "inventory.package.capacity_adjusted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TravelPackageEvent::PackageCreated(e) => e.occurred_at,
            TravelPackageEvent::RoomsReserved(e) => e.occurred_at,
            TravelPackageEvent::RoomsReleased(e) => e.occurred_at,
            TravelPackageEvent::CapacityAdjusted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for TravelPackage {
    type Command = TravelPackageCommand;
    type Event = TravelPackageEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TravelPackageEvent::PackageCreated(e) => {
                self.id = e.package_id;
                self.destination = e.destination.clone();
                self.country = e.country.clone();
                self.start_date = e.start_date;
                self.end_date = e.end_date;
                self.capacity = e.capacity;
                self.available = e.capacity;
                self.last_booking_date = e.last_booking_date;
                self.cancellation_deadline = e.cancellation_deadline;
                self.created = true;
            }
            TravelPackageEvent::RoomsReserved(e) => {
                self.available = self.available.saturating_sub(e.rooms);
            }
            TravelPackageEvent::RoomsReleased(e) => {
                self.available = (self.available + e.rooms).min(self.capacity);
            }
            TravelPackageEvent::CapacityAdjusted(e) => {
                // Consumed rooms stay constant; capacity and available move together.
                self.capacity = (self.capacity as i64 + e.delta).max(0) as u32;
                self.available = (self.available as i64 + e.delta).max(0) as u32;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TravelPackageCommand::CreatePackage(cmd) => self.handle_create(cmd),
            TravelPackageCommand::ReserveRooms(cmd) => self.handle_reserve(cmd),
            TravelPackageCommand::ReleaseRooms(cmd) => self.handle_release(cmd),
            TravelPackageCommand::AdjustCapacity(cmd) => self.handle_adjust(cmd),
        }
    }
}

impl TravelPackage {
    fn ensure_package_id(&self, package_id: PackageId) -> Result<(), DomainError> {
        if self.id != package_id {
            return Err(DomainError::invariant("package_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreatePackage) -> Result<Vec<TravelPackageEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("package already exists"));
        }
        if cmd.destination.trim().is_empty() {
            return Err(DomainError::validation("destination cannot be empty"));
        }
        if cmd.capacity == 0 {
            return Err(DomainError::validation("capacity must be positive"));
        }
        if cmd.end_date < cmd.start_date {
            return Err(DomainError::validation("end_date must not precede start_date"));
        }

        Ok(vec![TravelPackageEvent::PackageCreated(PackageCreated {
            package_id: cmd.package_id,
            destination: cmd.destination.clone(),
            country: cmd.country.clone(),
            start_date: cmd.start_date,
            end_date: cmd.end_date,
            capacity: cmd.capacity,
            last_booking_date: cmd.last_booking_date,
            cancellation_deadline: cmd.cancellation_deadline,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve(&self, cmd: &ReserveRooms) -> Result<Vec<TravelPackageEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_package_id(cmd.package_id)?;

        if cmd.rooms == 0 {
            return Err(DomainError::validation("rooms must be positive"));
        }
        if cmd.rooms > self.available {
            return Err(DomainError::InsufficientCapacity {
                requested: cmd.rooms,
                available: self.available,
            });
        }

        Ok(vec![TravelPackageEvent::RoomsReserved(RoomsReserved {
            package_id: cmd.package_id,
            rooms: cmd.rooms,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseRooms) -> Result<Vec<TravelPackageEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_package_id(cmd.package_id)?;

        if cmd.rooms == 0 {
            return Err(DomainError::validation("rooms must be positive"));
        }

        // Correct callers release exactly what they reserved; an over-release
        // means the per-package serialization broke somewhere upstream.
        if self.available + cmd.rooms > self.capacity {
            return Err(DomainError::consistency(format!(
                "release of {} rooms would exceed capacity ({} available of {})",
                cmd.rooms, self.available, self.capacity
            )));
        }

        Ok(vec![TravelPackageEvent::RoomsReleased(RoomsReleased {
            package_id: cmd.package_id,
            rooms: cmd.rooms,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustCapacity) -> Result<Vec<TravelPackageEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_package_id(cmd.package_id)?;

        if cmd.delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }

        let consumed = (self.capacity - self.available) as i64;
        let new_capacity = self.capacity as i64 + cmd.delta;
        if new_capacity < consumed {
            return Err(DomainError::invariant(
                "cannot reduce capacity below booked rooms",
            ));
        }

        Ok(vec![TravelPackageEvent::CapacityAdjusted(CapacityAdjusted {
            package_id: cmd.package_id,
            delta: cmd.delta,
            occurred_at: cmd.occurred_at,
        })])
    }
}
