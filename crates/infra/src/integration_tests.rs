//! Integration tests for the full event-sourced pipeline.
//!
//! Tests: Command → EventStore → EventBus → Projection → ReadModel
//!
//! Verifies:
//! - Commands produce events that update read models correctly
//! - Optimistic concurrency conflicts are detected
//! - Projections stay idempotent under duplicate delivery

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;

use wayfare_core::{AggregateId, ExpectedVersion, UserId};
use wayfare_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use wayfare_inventory::{
    CreatePackage, PackageId, ReserveRooms, TravelPackage, TravelPackageCommand, package,
};
use wayfare_waitlist::{Join, WaitingList, WaitingListCommand, WaitingListId, queue};

use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};
use crate::projections::package_availability::PackageAvailabilityProjection;
use crate::projections::waitlist_overview::WaitlistOverviewProjection;
use crate::read_model::InMemoryKeyValueStore;

type JsonEnvelope = EventEnvelope<serde_json::Value>;

fn setup() -> (
    CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<JsonEnvelope>>>,
    Subscription<JsonEnvelope>,
) {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Arc<InMemoryEventBus<JsonEnvelope>> = Arc::new(InMemoryEventBus::new());
    // Subscribe before any events are published.
    let subscription = bus.subscribe();
    let dispatcher = CommandDispatcher::new(store, bus);
    (dispatcher, subscription)
}

fn drain(subscription: &Subscription<JsonEnvelope>) -> Vec<JsonEnvelope> {
    let mut envelopes = Vec::new();
    while let Ok(env) = subscription.recv_timeout(StdDuration::from_millis(10)) {
        envelopes.push(env);
    }
    envelopes
}

fn create_package_command(package_id: PackageId, capacity: u32) -> TravelPackageCommand {
    TravelPackageCommand::CreatePackage(CreatePackage {
        package_id,
        destination: "Kyoto".to_string(),
        country: "Japan".to_string(),
        start_date: Utc::now() + chrono::Duration::days(60),
        end_date: Utc::now() + chrono::Duration::days(67),
        capacity,
        last_booking_date: None,
        cancellation_deadline: None,
        occurred_at: Utc::now(),
    })
}

#[test]
fn command_creates_package_and_updates_read_model() {
    let (dispatcher, subscription) = setup();
    let package_id = PackageId::new(AggregateId::new());

    dispatcher
        .dispatch(
            package_id.0,
            package::AGGREGATE_TYPE,
            create_package_command(package_id, 5),
            |id| TravelPackage::empty(PackageId::new(id)),
        )
        .unwrap();

    let projection = PackageAvailabilityProjection::new(Arc::new(InMemoryKeyValueStore::new()));
    for env in drain(&subscription) {
        projection.apply_envelope(&env).unwrap();
    }

    let rm = projection.get(&package_id).unwrap();
    assert_eq!(rm.destination, "Kyoto");
    assert_eq!(rm.capacity, 5);
    assert_eq!(rm.available, 5);
}

#[test]
fn reserve_flows_through_to_the_read_model() {
    let (dispatcher, subscription) = setup();
    let package_id = PackageId::new(AggregateId::new());

    dispatcher
        .dispatch(
            package_id.0,
            package::AGGREGATE_TYPE,
            create_package_command(package_id, 3),
            |id| TravelPackage::empty(PackageId::new(id)),
        )
        .unwrap();
    dispatcher
        .dispatch(
            package_id.0,
            package::AGGREGATE_TYPE,
            TravelPackageCommand::ReserveRooms(ReserveRooms {
                package_id,
                rooms: 2,
                occurred_at: Utc::now(),
            }),
            |id| TravelPackage::empty(PackageId::new(id)),
        )
        .unwrap();

    let projection = PackageAvailabilityProjection::new(Arc::new(InMemoryKeyValueStore::new()));
    for env in drain(&subscription) {
        projection.apply_envelope(&env).unwrap();
    }

    let rm = projection.get(&package_id).unwrap();
    assert_eq!(rm.available, 1);
}

#[test]
fn projection_ignores_duplicate_deliveries() {
    let (dispatcher, subscription) = setup();
    let package_id = PackageId::new(AggregateId::new());

    dispatcher
        .dispatch(
            package_id.0,
            package::AGGREGATE_TYPE,
            create_package_command(package_id, 4),
            |id| TravelPackage::empty(PackageId::new(id)),
        )
        .unwrap();
    dispatcher
        .dispatch(
            package_id.0,
            package::AGGREGATE_TYPE,
            TravelPackageCommand::ReserveRooms(ReserveRooms {
                package_id,
                rooms: 1,
                occurred_at: Utc::now(),
            }),
            |id| TravelPackage::empty(PackageId::new(id)),
        )
        .unwrap();

    let projection = PackageAvailabilityProjection::new(Arc::new(InMemoryKeyValueStore::new()));
    let envelopes = drain(&subscription);
    for env in &envelopes {
        projection.apply_envelope(env).unwrap();
    }
    // Redeliver everything (at-least-once).
    for env in &envelopes {
        projection.apply_envelope(env).unwrap();
    }

    let rm = projection.get(&package_id).unwrap();
    assert_eq!(rm.available, 3);
}

#[test]
fn stale_expected_version_is_a_concurrency_error() {
    let store = InMemoryEventStore::new();
    let package_id = PackageId::new(AggregateId::new());

    let event = wayfare_inventory::TravelPackageEvent::PackageCreated(
        wayfare_inventory::PackageCreated {
            package_id,
            destination: "Oslo".to_string(),
            country: "Norway".to_string(),
            start_date: Utc::now(),
            end_date: Utc::now(),
            capacity: 2,
            last_booking_date: None,
            cancellation_deadline: None,
            occurred_at: Utc::now(),
        },
    );
    let uncommitted = UncommittedEvent::from_typed(
        package_id.0,
        package::AGGREGATE_TYPE,
        uuid::Uuid::now_v7(),
        &event,
    )
    .unwrap();

    let err = store
        .append(vec![uncommitted], ExpectedVersion::Exact(5))
        .unwrap_err();
    assert!(matches!(
        err,
        crate::event_store::EventStoreError::Concurrency(_)
    ));
}

#[test]
fn publishing_store_publishes_only_after_append_succeeds() {
    use crate::event_store::PublishingEventStore;

    let bus: Arc<InMemoryEventBus<JsonEnvelope>> = Arc::new(InMemoryEventBus::new());
    let subscription = bus.subscribe();
    let store = PublishingEventStore::new(InMemoryEventStore::new(), bus);

    let package_id = PackageId::new(AggregateId::new());
    let event = wayfare_inventory::TravelPackageEvent::PackageCreated(
        wayfare_inventory::PackageCreated {
            package_id,
            destination: "Lima".to_string(),
            country: "Peru".to_string(),
            start_date: Utc::now(),
            end_date: Utc::now(),
            capacity: 2,
            last_booking_date: None,
            cancellation_deadline: None,
            occurred_at: Utc::now(),
        },
    );
    let uncommitted = UncommittedEvent::from_typed(
        package_id.0,
        package::AGGREGATE_TYPE,
        uuid::Uuid::now_v7(),
        &event,
    )
    .unwrap();

    // A failed append (stale version) publishes nothing.
    let err = store
        .append(vec![uncommitted.clone()], ExpectedVersion::Exact(7))
        .unwrap_err();
    assert!(matches!(
        err,
        crate::event_store::EventStoreError::Concurrency(_)
    ));
    assert!(subscription.try_recv().is_err());

    // A successful append publishes the committed envelope.
    store
        .append(vec![uncommitted], ExpectedVersion::Exact(0))
        .unwrap();
    let envelope = subscription.recv_timeout(StdDuration::from_millis(10)).unwrap();
    assert_eq!(envelope.aggregate_id(), package_id.0);
    assert_eq!(envelope.sequence_number(), 1);
}

#[test]
fn waitlist_events_shape_the_overview() {
    let (dispatcher, subscription) = setup();
    let package_id = PackageId::new(AggregateId::new());
    let list_id = WaitingListId::for_package(package_id);
    let (a, b) = (UserId::new(), UserId::new());

    for (user, offset_minutes) in [(a, 0), (b, 1)] {
        dispatcher
            .dispatch(
                list_id.0,
                queue::AGGREGATE_TYPE,
                WaitingListCommand::Join(Join {
                    package_id,
                    user_id: user,
                    occurred_at: Utc::now() + chrono::Duration::minutes(offset_minutes),
                }),
                |_| WaitingList::empty(list_id),
            )
            .unwrap();
    }

    let projection = WaitlistOverviewProjection::new(Arc::new(InMemoryKeyValueStore::new()));
    for env in drain(&subscription) {
        projection.apply_envelope(&env).unwrap();
    }

    assert_eq!(projection.waiting_count(&package_id), 2);
    assert_eq!(projection.position(&package_id, a), Some(1));
    assert_eq!(projection.position(&package_id, b), Some(2));

    // Display-only estimate: two days per queue position.
    let overview = projection.get(&package_id).unwrap();
    let now = Utc::now();
    assert_eq!(
        overview.estimated_available_date(b, now),
        Some(now + chrono::Duration::days(4))
    );
}

#[test]
fn read_model_rebuild_matches_incremental_application() {
    let (dispatcher, subscription) = setup();
    let package_id = PackageId::new(AggregateId::new());

    dispatcher
        .dispatch(
            package_id.0,
            package::AGGREGATE_TYPE,
            create_package_command(package_id, 6),
            |id| TravelPackage::empty(PackageId::new(id)),
        )
        .unwrap();
    dispatcher
        .dispatch(
            package_id.0,
            package::AGGREGATE_TYPE,
            TravelPackageCommand::ReserveRooms(ReserveRooms {
                package_id,
                rooms: 4,
                occurred_at: Utc::now(),
            }),
            |id| TravelPackage::empty(PackageId::new(id)),
        )
        .unwrap();

    let envelopes = drain(&subscription);

    let incremental = PackageAvailabilityProjection::new(Arc::new(InMemoryKeyValueStore::new()));
    for env in &envelopes {
        incremental.apply_envelope(env).unwrap();
    }

    // Rebuild from an unordered copy of the history; the replay sorts.
    let rebuilt = PackageAvailabilityProjection::new(Arc::new(InMemoryKeyValueStore::new()));
    let mut shuffled = envelopes.clone();
    shuffled.reverse();
    rebuilt.rebuild_from_scratch(shuffled).unwrap();

    assert_eq!(incremental.get(&package_id), rebuilt.get(&package_id));
    assert_eq!(rebuilt.get(&package_id).unwrap().available, 2);
}
