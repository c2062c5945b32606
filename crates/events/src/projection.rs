use crate::{Event, EventEnvelope};

/// A projection builds a read model from an append-only event stream.
///
/// Projections implement the CQRS read-model pattern: they transform events
/// (write model) into queryable state (read model). Read models are
/// **disposable** - they can be deleted and rebuilt from events at any time;
/// events are the source of truth.
///
/// ## Idempotency
///
/// Projections must be **idempotent**: applying the same event multiple
/// times should produce the same result. This is what makes at-least-once
/// delivery, replay and crash recovery safe. The `ProjectionRunner` helps by
/// tracking sequence numbers and skipping duplicates, but projections should
/// still be designed to be idempotent at the domain level.
///
/// ## Persistence
///
/// This trait doesn't define how read models are stored - that's an
/// infrastructure concern (in-memory maps for tests, SQL tables for
/// production). Projections are pure event consumers.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the projection, updating the read model.
    ///
    /// This method doesn't return errors - if an event cannot be processed,
    /// the projection should either ignore it (not relevant to this
    /// projection) or log and continue. For structured error handling, use
    /// `ProjectionRunner::apply()` which returns `ProjectionError`.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
