use common::AggregateId;
use criterion::{Criterion, criterion_group, criterion_main};
use event_store::{EventStore, InMemoryEventStore, StoredEvent, Version};
use serde_json::{Map, Value};

fn make_event(aggregate_id: AggregateId, version: i64) -> StoredEvent {
    let mut payload = Map::new();
    payload.insert("order_id".into(), Value::from(aggregate_id.to_string()));
    payload.insert(
        "customer_id".into(),
        Value::from("00000000-0000-0000-0000-000000000001"),
    );

    StoredEvent::builder()
        .aggregate_id(aggregate_id)
        .aggregate_type("Order")
        .event_type("OrderCreatedEvent")
        .version(Version::new(version))
        .payload(payload)
        .build()
        .unwrap()
}

fn bench_append_single_event(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/append_single_event", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                store
                    .append(make_event(AggregateId::new(), 1))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_append_sequence_10(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/append_sequence_10", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                let agg_id = AggregateId::new();
                for version in 1..=10 {
                    store.append(make_event(agg_id, version)).await.unwrap();
                }
            });
        });
    });
}

fn bench_get_events_for_aggregate(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let agg_id = AggregateId::new();

    rt.block_on(async {
        for version in 1..=100 {
            store.append(make_event(agg_id, version)).await.unwrap();
        }
    });

    c.bench_function("event_store/get_events_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.get_events_for_aggregate(agg_id).await.unwrap();
            });
        });
    });
}

fn bench_get_events_by_type(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();

    // 1000 events across 10 aggregates
    rt.block_on(async {
        for _ in 0..10 {
            let agg_id = AggregateId::new();
            for version in 1..=100 {
                store.append(make_event(agg_id, version)).await.unwrap();
            }
        }
    });

    c.bench_function("event_store/get_events_by_type_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                let events = store.get_events_by_type("OrderCreatedEvent").await.unwrap();
                assert_eq!(events.len(), 1000);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_append_single_event,
    bench_append_sequence_10,
    bench_get_events_for_aggregate,
    bench_get_events_by_type,
);
criterion_main!(benches);
