//! Command execution pipeline (application-level orchestration).
//!
//! This module implements the command dispatch pattern for event-sourced
//! aggregates:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store
//!   ↓
//! 2. Rehydrate aggregate (apply historical events to rebuild state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events to store (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to bus (for projections, handlers, etc.)
//! ```
//!
//! The dispatch pattern is consistent across all aggregates, so it is
//! centralized here rather than duplicated in every caller. The dispatcher
//! composes the `EventStore` and `EventBus` traits, which makes it testable
//! with in-memory implementations and swappable with real backends.
//!
//! If event publication fails after a successful append, the error is
//! returned to the caller; the events are already persisted, so retrying is
//! idempotent. This gives **at-least-once** delivery semantics.
//!
//! This module contains no IO itself; it composes infrastructure traits.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use wayfare_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use wayfare_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug)]
pub enum DispatchError {
    /// Deterministic domain rejection (validation, invariant, capacity,
    /// queueing and deadline rules). Reason codes are preserved so the
    /// caller can surface them.
    Domain(DomainError),
    /// Optimistic concurrency failure (e.g. stale aggregate version).
    Concurrency(String),
    /// Failed to deserialize historical event payloads into the aggregate event type.
    Deserialize(String),
    /// Persisting to the event store failed.
    Store(EventStoreError),
    /// Publication failed after a successful append (at-least-once; retry may duplicate).
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            _ => DispatchError::Store(value),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        DispatchError::Domain(value)
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Sits between the application layer (the reservation engine) and the
/// infrastructure layer (event store, event bus), providing a consistent
/// execution model while keeping domain code pure and testable.
///
/// ## Execution Guarantees
///
/// - **Atomicity**: events are persisted before publication (if append fails, nothing is published)
/// - **Isolation**: each command operates on a single aggregate instance
/// - **Concurrency**: optimistic, via the stream version loaded at step 1
///
/// Aggregates used with the dispatcher must be deterministic, side-effect
/// free and version-aware (+1 per applied event).
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full event-sourcing pipeline.
    ///
    /// The `make_aggregate` closure enables the dispatcher to work with any
    /// aggregate type without knowing how to construct it (e.g.
    /// `|id| TravelPackage::empty(PackageId::new(id))`).
    ///
    /// Returns the committed `StoredEvent`s (with assigned sequence numbers),
    /// or `DispatchError` if any step fails. On a concurrency error the
    /// caller may reload and re-execute the command.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: wayfare_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history + 2) rehydrate
        let (mut aggregate, version) = load_aggregate(&self.store, aggregate_id, make_aggregate)?;
        let expected = ExpectedVersion::Exact(version);

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist (append-only, optimistic)
        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        // 5) Publish committed events (after append)
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }
}

/// Load and rehydrate an aggregate from its stream.
///
/// Returns the aggregate and the stream version it was rehydrated at. Used
/// by the dispatcher and by read-side callers (e.g. the offer coordinator)
/// that need current aggregate state for decisions.
pub fn load_aggregate<A>(
    store: &impl EventStore,
    aggregate_id: AggregateId,
    make_aggregate: impl FnOnce(AggregateId) -> A,
) -> Result<(A, u64), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    let history = store.load_stream(aggregate_id)?;
    validate_loaded_stream(aggregate_id, &history)?;
    let version = stream_version(&history);

    let mut aggregate = make_aggregate(aggregate_id);
    apply_history::<A>(&mut aggregate, &history)?;

    Ok((aggregate, version))
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Defense in depth: ensure the backend returned the right stream and the
    // sequence numbers are strictly increasing.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                format!("loaded stream contains wrong aggregate_id at index {idx}"),
            )));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stored event has sequence_number=0".to_string(),
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    // Ensure deterministic ordering.
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
