// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! High-performance Entity Component System for a 2D game engine runtime.
//!
//! `World` is the composition root: archetype storage keyed by component signature,
//! a cached query engine, hierarchy/tag/group bookkeeping, a deferred lifecycle-event
//! queue, a pub/sub event bus, and singleton resources.

pub mod admin;
pub mod archetype;
pub mod bitset;
pub mod command;
pub mod component;
pub mod config;
pub mod dependency;
pub mod entity;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod executor;
pub mod memory;
pub mod metrics;
pub mod mod_sandbox;
pub mod observer;
pub mod persistence;
pub mod query;
pub mod schedule;
pub mod spatial;
pub mod storage;
pub mod system;
pub mod transform;
#[cfg(feature = "parallel")]
pub mod worker_pool;
pub mod world;

pub mod prelude;

pub use archetype::{Archetype, ComponentColumn};
pub use bitset::Signature;
pub use command::{Command, CommandBuffer};
pub use component::{Bundle, Component, ComponentRegistry, ComponentTag};
pub use config::WorldConfig;
pub use entity::{EntityId, EntityLocation, EntityManager};
pub use error::{EcsError, Result};
pub use event::{EntityEvent, EventQueue};
pub use executor::{Executor, SystemProfiler};
pub use memory::MemoryManager;
pub use mod_sandbox::{ModContext, ModSandbox};
pub use observer::{Observer, ObserverRegistry};
pub use query::{QueryCacheStats, QueryEngine, QueryResult, QuerySpec};
pub use schedule::Schedule;
pub use system::{BoxedSystem, System, SystemAccess, SystemId};
pub use world::World;
