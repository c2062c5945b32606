//! Travel package inventory domain module (event-sourced).
//!
//! This crate is the single source of truth for room availability. Business
//! rules are implemented purely as deterministic domain logic (no IO, no
//! HTTP, no storage).

pub mod package;

pub use package::{
    AdjustCapacity, CapacityAdjusted, CreatePackage, PackageCreated, PackageId, ReleaseRooms,
    ReserveRooms, RoomsReleased, RoomsReserved, TravelPackage, TravelPackageCommand,
    TravelPackageEvent,
};
