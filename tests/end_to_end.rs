//! End-to-end scenarios exercising the public `World`/`Schedule`/`ModSandbox` surface
//! together, rather than one subsystem in isolation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use frame_ecs::component::RegistrationOptions;
use frame_ecs::dependency::DependencyGraph;
use frame_ecs::error::EcsError;
use frame_ecs::event_bus::{Event, EventSubscriber};
use frame_ecs::mod_sandbox::{ModContext, ModSandbox};
use frame_ecs::query::QuerySpec;
use frame_ecs::schedule::Schedule;
use frame_ecs::system::{System, SystemAccess};
use frame_ecs::world::World;

#[derive(Debug, Clone, Copy)]
struct Transform {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy)]
struct Sprite {
    texture_id: u32,
}

#[test]
fn query_required_transform_and_sprite_returns_matching_entities() {
    let mut world = World::new();
    let e1 = world.spawn((Transform { x: 0.0, y: 0.0 }, Sprite { texture_id: 1 })).unwrap();
    let e2 = world.spawn((Transform { x: 1.0, y: 1.0 }, Sprite { texture_id: 2 })).unwrap();
    world.spawn((Transform { x: 2.0, y: 2.0 },)).unwrap();

    let transform_tag = world.register_component::<Transform>().unwrap();
    let sprite_tag = world.register_component::<Sprite>().unwrap();

    let result = world.query(QuerySpec::new().require(transform_tag).require(sprite_tag)).unwrap();

    let mut found = result.entities.clone();
    found.sort_by_key(|e| format!("{e:?}"));
    let mut expected = vec![e1, e2];
    expected.sort_by_key(|e| format!("{e:?}"));
    assert_eq!(found, expected);
}

struct RecordingSystem {
    name: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl System for RecordingSystem {
    fn access(&self) -> SystemAccess {
        SystemAccess::empty()
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn update(&mut self, _world: &mut World, _dt: f32) -> frame_ecs::error::Result<()> {
        self.log.lock().unwrap().push(self.name);
        Ok(())
    }
}

#[test]
fn system_b_runs_after_its_declared_dependency_a() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut schedule = Schedule::new();
    schedule.add_system(Box::new(RecordingSystem { name: "A", log: log.clone() }), 0).unwrap();
    schedule.add_system_after(Box::new(RecordingSystem { name: "B", log: log.clone() }), 0, "A").unwrap();

    let mut world = World::new();
    schedule.run_update(&mut world, 0.016);

    assert_eq!(&*log.lock().unwrap(), &["A", "B"]);
}

#[test]
fn circular_dependency_is_rejected_and_existing_order_still_runs() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut schedule = Schedule::new();
    schedule.add_system(Box::new(RecordingSystem { name: "A", log: log.clone() }), 0).unwrap();
    schedule.add_system_after(Box::new(RecordingSystem { name: "B", log: log.clone() }), 0, "A").unwrap();

    // A standalone graph mirroring the schedule's two systems shows the direct cycle
    // rejection the schedule's name-resolved constraints can't easily provoke through
    // its own public surface.
    let mut graph = DependencyGraph::new();
    let a = frame_ecs::system::SystemId(0);
    let b = frame_ecs::system::SystemId(1);
    graph.add_system(a, SystemAccess::empty(), frame_ecs::system::ThreadSafety::None, 0).unwrap();
    graph.add_system(b, SystemAccess::empty(), frame_ecs::system::ThreadSafety::None, 0).unwrap();
    graph.add_dependency(a, b).unwrap();
    assert!(matches!(graph.add_dependency(b, a), Err(EcsError::CircularDependency { .. })));

    log.lock().unwrap().clear();
    let mut world = World::new();
    schedule.run_update(&mut world, 0.016);
    assert_eq!(&*log.lock().unwrap(), &["A", "B"]);
}

#[test]
fn dirty_set_drains_once_per_modification() {
    let mut world = World::new();
    assert!(world.config().enable_change_tracking, "change tracking defaults to enabled");
    let tag = world.register_component::<Transform>().unwrap();
    let e1 = world.spawn((Transform { x: 0.0, y: 0.0 },)).unwrap();

    world.get_component_mut::<Transform>(e1).unwrap().x = 5.0;

    assert_eq!(world.drain_dirty(), vec![(e1, tag)]);
    assert_eq!(world.drain_dirty(), Vec::new());
}

struct SleepingSubscriber {
    log: Arc<Mutex<Vec<u32>>>,
}

struct NumberedEvent(u32);

impl Event for NumberedEvent {
    fn event_type_id(&self) -> std::any::TypeId {
        std::any::TypeId::of::<Self>()
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl EventSubscriber for SleepingSubscriber {
    fn on_event(&mut self, event: &dyn Event) -> frame_ecs::error::Result<()> {
        std::thread::sleep(Duration::from_millis(5));
        let n = event.as_any().downcast_ref::<NumberedEvent>().unwrap().0;
        self.log.lock().unwrap().push(n);
        Ok(())
    }

    fn name(&self) -> &str {
        "SleepingSubscriber"
    }
}

#[test]
fn async_events_are_delivered_fifo_per_subscriber_after_flush() {
    let mut world = World::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    world.event_bus_mut().subscribe::<NumberedEvent>(Box::new(SleepingSubscriber { log: log.clone() }));
    world.event_bus_mut().start(8, 2);

    world.event_bus_mut().publish_async(NumberedEvent(1)).unwrap();
    world.event_bus_mut().publish_async(NumberedEvent(2)).unwrap();
    world.event_bus_mut().publish_async(NumberedEvent(3)).unwrap();
    world.event_bus_mut().flush();

    assert_eq!(&*log.lock().unwrap(), &[1, 2, 3]);
    world.event_bus_mut().stop();
}

#[derive(Debug, Clone, Copy)]
struct ModHealth(f32);

#[test]
fn mod_sandbox_hits_memory_limit_before_entity_limit() {
    let mut world = World::new();
    world
        .register_component_with::<ModHealth>(RegistrationOptions {
            persistable: false,
            allowed_in_mod: true,
            validator: None,
        })
        .unwrap();

    let context = ModContext {
        mod_id: "physics_mod".into(),
        max_entities: 100,
        max_memory_bytes: 500,
        max_system_update_time: Duration::from_millis(10),
        allowed_components: vec![std::any::type_name::<ModHealth>()],
        max_queries_per_frame: 10,
    };
    let mut sandbox = ModSandbox::new(&mut world, context);

    for _ in 0..7 {
        sandbox.spawn(ModHealth(1.0)).unwrap();
    }
    let eighth = sandbox.spawn(ModHealth(1.0));
    assert!(matches!(eighth, Err(EcsError::MemoryLimitExceeded { .. })));
}

#[test]
fn synchronous_publish_returns_only_after_every_handler_runs() {
    let mut bus = frame_ecs::event_bus::EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));

    struct CountingSubscriber {
        count: Arc<AtomicUsize>,
    }
    impl EventSubscriber for CountingSubscriber {
        fn on_event(&mut self, _event: &dyn Event) -> frame_ecs::error::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    bus.subscribe::<NumberedEvent>(Box::new(CountingSubscriber { count: count.clone() }));
    bus.subscribe::<NumberedEvent>(Box::new(CountingSubscriber { count: count.clone() }));
    bus.publish(NumberedEvent(1)).unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 2);
}
