//! Waiting-list domain module (event-sourced).
//!
//! One `WaitingList` aggregate per travel package: an ordered FIFO of
//! pending guests, with the single-outstanding-offer invariant enforced
//! inside the aggregate.

pub mod queue;

pub use queue::{
    ConvertToBooking, EntryBooked, EntryJoined, EntryState, EntryWithdrawn, ExpireOffer,
    IssueOffer, Join, Leave, OfferExpired, OfferIssued, QueueEntry, WaitingList,
    WaitingListCommand, WaitingListEvent, WaitingListId,
};
