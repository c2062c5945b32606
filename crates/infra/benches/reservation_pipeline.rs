//! Dispatch-pipeline benchmarks: event-sourced reserve/release against a
//! naive CRUD counter, plus rehydration cost as streams grow.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use wayfare_core::AggregateId;
use wayfare_events::{EventEnvelope, InMemoryEventBus};
use wayfare_infra::command_dispatcher::CommandDispatcher;
use wayfare_infra::event_store::InMemoryEventStore;
use wayfare_inventory::{
    CreatePackage, PackageId, ReleaseRooms, ReserveRooms, TravelPackage, TravelPackageCommand,
    package,
};

type JsonEnvelope = EventEnvelope<serde_json::Value>;

/// Naive CRUD simulation: direct key-value updates (no events, no history).
#[derive(Debug, Clone)]
struct NaiveCrudStore {
    inner: Arc<RwLock<HashMap<AggregateId, (u32, u32)>>>,
}

impl NaiveCrudStore {
    fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn create(&self, id: AggregateId, capacity: u32) {
        let mut map = self.inner.write().unwrap();
        map.insert(id, (capacity, capacity));
    }

    fn reserve(&self, id: AggregateId, rooms: u32) -> Result<(), ()> {
        let mut map = self.inner.write().unwrap();
        let (_capacity, available) = map.get_mut(&id).ok_or(())?;
        if rooms > *available {
            return Err(());
        }
        *available -= rooms;
        Ok(())
    }

    fn release(&self, id: AggregateId, rooms: u32) -> Result<(), ()> {
        let mut map = self.inner.write().unwrap();
        let (capacity, available) = map.get_mut(&id).ok_or(())?;
        if *available + rooms > *capacity {
            return Err(());
        }
        *available += rooms;
        Ok(())
    }
}

fn dispatcher() -> CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<JsonEnvelope>>> {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Arc<InMemoryEventBus<JsonEnvelope>> = Arc::new(InMemoryEventBus::new());
    CommandDispatcher::new(store, bus)
}

fn created_package(
    dispatcher: &CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<JsonEnvelope>>>,
    capacity: u32,
) -> PackageId {
    let package_id = PackageId::new(AggregateId::new());
    dispatcher
        .dispatch(
            package_id.0,
            package::AGGREGATE_TYPE,
            TravelPackageCommand::CreatePackage(CreatePackage {
                package_id,
                destination: "Bench".to_string(),
                country: "Bench".to_string(),
                start_date: Utc::now(),
                end_date: Utc::now(),
                capacity,
                last_booking_date: None,
                cancellation_deadline: None,
                occurred_at: Utc::now(),
            }),
            |id| TravelPackage::empty(PackageId::new(id)),
        )
        .unwrap();
    package_id
}

fn bench_reserve_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("reserve_release_cycle");
    group.throughput(Throughput::Elements(2));

    group.bench_function("event_sourced_dispatch", |b| {
        let dispatcher = dispatcher();
        let package_id = created_package(&dispatcher, 100);

        b.iter(|| {
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
            dispatcher
                .dispatch(
                    package_id.0,
                    package::AGGREGATE_TYPE,
                    TravelPackageCommand::ReleaseRooms(ReleaseRooms {
                        package_id,
                        rooms: 1,
                        occurred_at: Utc::now(),
                    }),
                    |id| TravelPackage::empty(PackageId::new(id)),
                )
                .unwrap();
        });
    });

    group.bench_function("naive_crud", |b| {
        let store = NaiveCrudStore::new();
        let id = AggregateId::new();
        store.create(id, 100);

        b.iter(|| {
            store.reserve(black_box(id), 1).unwrap();
            store.release(black_box(id), 1).unwrap();
        });
    });

    group.finish();
}

fn bench_rehydration_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("rehydration_depth");

    for depth in [10u32, 100, 500] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let dispatcher = dispatcher();
            let package_id = created_package(&dispatcher, depth * 2);

            // Grow the stream: depth reserve events.
            for _ in 0..depth {
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
            }

            b.iter(|| {
                // Each dispatch rehydrates the full stream before deciding.
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
                dispatcher
                    .dispatch(
                        package_id.0,
                        package::AGGREGATE_TYPE,
                        TravelPackageCommand::ReleaseRooms(ReleaseRooms {
                            package_id,
                            rooms: 1,
                            occurred_at: Utc::now(),
                        }),
                        |id| TravelPackage::empty(PackageId::new(id)),
                    )
                    .unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reserve_release, bench_rehydration_depth);
criterion_main!(benches);
