//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use frame_ecs::prelude::*;
//! ```

pub use crate::command::{Command, CommandBuffer};
pub use crate::component::{Bundle, Component, ComponentTag};
pub use crate::entity::EntityId;
pub use crate::error::{EcsError, Result};
pub use crate::query::{QueryResult, QuerySpec};
pub use crate::schedule::Schedule;
pub use crate::system::{System, SystemId};
pub use crate::transform::{GlobalTransform, LocalTransform, Quat, Vec3};
pub use crate::world::World;
