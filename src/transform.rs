//! Position/rotation/scale transform type used as the built-in spatial payload: the
//! grid index in `spatial.rs` and the spatial query constraints in `query.rs` both read
//! entities' `GlobalTransform` positions. Gameplay code can register its own transform
//! component instead; these are a convenience, not a mandated layout.

use serde::{Deserialize, Serialize};

pub use glam::{Mat4, Quat, Vec3};

/// Transform relative to a parent entity's `GlobalTransform`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl LocalTransform {
    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    pub fn with_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    pub fn with_rotation(rotation: Quat) -> Self {
        Self {
            position: Vec3::ZERO,
            rotation,
            scale: Vec3::ONE,
        }
    }

    pub fn with_scale(scale: Vec3) -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale,
        }
    }

    pub fn from_translation(position: Vec3) -> Self {
        Self::with_position(position)
    }
}

impl Default for LocalTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Transform in world space, the coordinate system the spatial grid index is built over.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl GlobalTransform {
    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    /// Combine parent global + local child → global child
    pub fn from_local(parent: &GlobalTransform, child: &LocalTransform) -> Self {
        // Correct order: Scale -> Rotate -> Translate
        // Global = ParentGlobal * Local
        let rotated_pos = parent.rotation * (child.position * parent.scale);
        let new_position = parent.position + rotated_pos;
        let new_rotation = parent.rotation * child.rotation;
        let new_scale = parent.scale * child.scale;

        GlobalTransform {
            position: new_position,
            rotation: new_rotation,
            scale: new_scale,
        }
    }

    /// Convert global to local (inverse operation)
    pub fn to_local(&self, parent: &GlobalTransform) -> LocalTransform {
        let rel_pos = self.position - parent.position;
        let inv_rot = parent.rotation.inverse();

        // Reciprocal handle potential zero scale safely
        let inv_scale = Vec3::new(
            if parent.scale.x != 0.0 {
                1.0 / parent.scale.x
            } else {
                0.0
            },
            if parent.scale.y != 0.0 {
                1.0 / parent.scale.y
            } else {
                0.0
            },
            if parent.scale.z != 0.0 {
                1.0 / parent.scale.z
            } else {
                0.0
            },
        );

        let position = (inv_rot * rel_pos) * inv_scale;
        let rotation = inv_rot * self.rotation;
        let scale = self.scale * inv_scale;

        LocalTransform {
            position,
            rotation,
            scale,
        }
    }

    /// Returns the position vector
    pub fn translation(&self) -> Vec3 {
        self.position
    }
}

impl Default for GlobalTransform {
    fn default() -> Self {
        Self::identity()
    }
}
