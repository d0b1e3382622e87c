#![allow(dead_code)]

use frame_ecs::query::QuerySpec;
use frame_ecs::World;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

#[derive(Debug, Clone, Copy)]
struct Position(f32, f32, f32);

#[derive(Debug, Clone, Copy)]
struct Velocity(f32, f32, f32);

#[derive(Debug, Clone, Copy)]
struct Health(u32);

fn spawn_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn");

    group.bench_function("spawn_2_components", |b| {
        let mut world = World::new();
        b.iter(|| {
            for _ in 0..1000 {
                black_box(world.spawn((Position(1.0, 2.0, 3.0), Velocity(1.0, 0.0, 0.0))).unwrap());
            }
        });
    });

    group.bench_function("spawn_3_components", |b| {
        let mut world = World::new();
        b.iter(|| {
            for _ in 0..1000 {
                black_box(
                    world
                        .spawn((Position(1.0, 2.0, 3.0), Velocity(1.0, 0.0, 0.0), Health(100)))
                        .unwrap(),
                );
            }
        });
    });

    group.finish();
}

fn query_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");

    group.bench_function("required_two_of_ten_thousand", |b| {
        let mut world = World::new();
        let position_tag = world.register_component::<Position>().unwrap();
        let velocity_tag = world.register_component::<Velocity>().unwrap();
        for i in 0..10_000 {
            if i % 3 == 0 {
                world.spawn((Position(1.0, 2.0, 3.0),)).unwrap();
            } else {
                world.spawn((Position(1.0, 2.0, 3.0), Velocity(1.0, 0.0, 0.0))).unwrap();
            }
        }

        b.iter(|| {
            let spec = QuerySpec::new().require(position_tag).require(velocity_tag);
            black_box(world.query(spec).unwrap());
        });
    });

    group.bench_function("cached_repeat_query", |b| {
        let mut world = World::new();
        let tag = world.register_component::<Position>().unwrap();
        for _ in 0..10_000 {
            world.spawn((Position(1.0, 2.0, 3.0),)).unwrap();
        }

        b.iter(|| {
            black_box(world.query(QuerySpec::new().require(tag)).unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, spawn_benchmark, query_benchmark);
criterion_main!(benches);
