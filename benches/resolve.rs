use std::sync::Arc;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use asset_resolution::policy::{resolve_dominant, resolve_trackable};
use asset_resolution::{
    Accuracy, Coordinate, Destination, EngineConfig, LocationFix, Proximity, Resolution,
    ResolutionConstraints, ResolutionEngine, ResolutionSet, ResolutionState, SubscriberId,
    Trackable, TrackableId, TrackableResolutionRequest,
};

const ACCURACIES: [Accuracy; 5] = [
    Accuracy::Minimum,
    Accuracy::Low,
    Accuracy::Balanced,
    Accuracy::High,
    Accuracy::Maximum,
];

fn demands(n: u64) -> Vec<Resolution> {
    (0..n)
        .map(|i| {
            let accuracy = ACCURACIES[usize::try_from(i % 5).unwrap_or(0)];
            Resolution::from_millis(accuracy, 100 + (i * 37) % 10_000, (i % 50) as f64).unwrap()
        })
        .collect()
}

fn constrained(id: &str) -> Trackable {
    let constraints = ResolutionConstraints::new(
        ResolutionSet::far_near(
            Resolution::from_millis(Accuracy::Low, 10_000, 100.0).unwrap(),
            Resolution::from_millis(Accuracy::High, 1000, 10.0).unwrap(),
        ),
        Proximity::spatial(50.0).unwrap(),
        20.0,
        3.0,
    )
    .unwrap();
    Trackable::new(TrackableId::new(id).unwrap())
        .with_destination(Destination::at(Coordinate::new(0.0, 0.0).unwrap()))
        .with_constraints(constraints)
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    for n in [4u64, 64, 1024] {
        let set = demands(n);
        group.throughput(Throughput::Elements(n));
        group.bench_function(format!("resolve_dominant_{n}"), |b| {
            b.iter(|| black_box(resolve_dominant(black_box(&set))));
        });
    }

    let trackable = constrained("bench");
    let remote = demands(16);
    let default_resolution = EngineConfig::default().default_resolution;
    group.bench_function("resolve_trackable_16_remote_low_battery", |b| {
        b.iter(|| {
            let request = TrackableResolutionRequest {
                trackable: &trackable,
                local: None,
                remote: &remote,
                state: ResolutionState {
                    proximity_reached: true,
                    subscriber_present: true,
                    battery_level: Some(5.0),
                },
            };
            black_box(resolve_trackable(black_box(&request), default_resolution))
        });
    });
    group.finish();
}

fn bench_engine(c: &mut Criterion) {
    let engine = Arc::new(ResolutionEngine::with_default_policy(EngineConfig::default()).unwrap());
    let id = TrackableId::new("bench").unwrap();
    engine.add_trackable(constrained("bench")).unwrap();
    for r in demands(8) {
        engine.add_subscriber(&id, SubscriberId::new(), Some(r)).unwrap();
    }

    let mut group = c.benchmark_group("engine");
    group.throughput(Throughput::Elements(1));
    let mut lat = 0.009_f64;
    group.bench_function("ingest_location", |b| {
        b.iter(|| {
            lat = if lat > 0.0089 { 0.0088 } else { 0.009 };
            let fix = LocationFix::new(Coordinate::new(lat, 0.0).unwrap(), Utc::now());
            black_box(engine.ingest_location(&id, fix).unwrap())
        });
    });
    group.finish();
}

criterion_group!(benches, bench_merge, bench_engine);
criterion_main!(benches);
